// author: kodeholic (powered by Claude)
// Floor Control 상태머신 모듈 (MBCP TS 24.380)
//
// arbitrator  — 서버측 G: 상태머신 + 선점 판정
// dual        — Dual Floor 보조 발언 슬롯
// participant — 단말측 U: 상태머신
// outbox      — 한 스텝의 부수효과 수집 (메시지 / 타이머 / 통지)

pub mod arbitrator;
pub mod dual;
pub mod outbox;
pub mod participant;

pub use arbitrator::{is_preemptive, ArbitratorState, FloorArbitrator, StoredHolder, TowardsParticipant};
pub use dual::DualFloor;
pub use outbox::{Outbox, Outgoing};
pub use participant::{FloorParticipant, ParticipantState};
