// author: kodeholic (powered by Claude)
//
// TraceHub — Floor 이벤트 실시간 관찰 버스
//
// 구조:
//   CallSession (상태 전이 / 메시지 송신 / 실패 통지)
//       └── FloorObserver::on_event(ts, event)   (구독자 수 제한 없음)
//               ├── TraceHub  → broadcast::Sender → floorsim, 테스트 수신자 ...
//               └── 사용자 정의 observer (PTT 앱 콜백 등)
//
// 구독자가 없을 때 publish는 그냥 drop (엔진 동작에 무영향)
// 구독자가 느리면 lagged 에러 반환 — 구독자 쪽에서 처리

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::broadcast;

use crate::protocol::cause::{DenyCause, RevokeCause};
use crate::protocol::message::{CallId, FloorMsg, Ssrc};

/// 브로드캐스트 채널 버퍼 크기
/// 구독자가 느릴 때 최대 보유 이벤트 수 — 초과 시 오래된 이벤트 drop
const TRACE_BUF: usize = 512;

// ----------------------------------------------------------------------------
// [FloorEvent] — 관찰 가능한 Floor 이벤트
// ----------------------------------------------------------------------------

/// 상태 전이를 일으킨 상태머신 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Machine {
    Arbitrator,
    Participant,
}

/// 메시지 송수신 끝점
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Endpoint {
    Arbitrator,
    Participant(Ssrc),
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Endpoint::Arbitrator     => write!(f, "arbitrator"),
            Endpoint::Participant(s) => write!(f, "{}", s),
        }
    }
}

/// 재전송 한계 초과로 포기한 동작
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// C101 — Request 무응답
    RequestUnanswered,
    /// C100 — Release 확인 없음
    ReleaseUnconfirmed,
    /// C104 — Queue Position Request 무응답
    QueuePositionUnanswered,
    /// T132 — 대기열 Grant를 사용자가 수락하지 않음
    GrantNotAccepted,
    /// C20 — Dual Floor Granted Ack 없음
    DualGrantUnacknowledged,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum FloorEvent {
    StateChanged {
        call_id: CallId,
        ssrc:    Ssrc,
        machine: Machine,
        from:    &'static str,
        to:      &'static str,
    },
    MessageSent {
        call_id: CallId,
        from:    Endpoint,
        to:      Endpoint,
        msg:     FloorMsg,
    },
    /// 로컬 앱 발언권 획득 통지
    FloorGranted { call_id: CallId, ssrc: Ssrc },
    /// 대기열 Grant 수신 — AcceptGrant 대기
    GrantPending { call_id: CallId, ssrc: Ssrc },
    /// local=true: 메시지 없이 단말에서 거부 (Broadcast 착신 등)
    FloorDenied { call_id: CallId, ssrc: Ssrc, cause: DenyCause, local: bool },
    FloorRevoked { call_id: CallId, ssrc: Ssrc, cause: RevokeCause },
    Failure { call_id: CallId, ssrc: Ssrc, kind: FailureKind },
    CallReleased { call_id: CallId },
}

impl FloorEvent {
    pub fn call_id(&self) -> CallId {
        match self {
            FloorEvent::StateChanged { call_id, .. }
            | FloorEvent::MessageSent { call_id, .. }
            | FloorEvent::FloorGranted { call_id, .. }
            | FloorEvent::GrantPending { call_id, .. }
            | FloorEvent::FloorDenied { call_id, .. }
            | FloorEvent::FloorRevoked { call_id, .. }
            | FloorEvent::Failure { call_id, .. }
            | FloorEvent::CallReleased { call_id } => *call_id,
        }
    }

    /// 송신된 Floor 메시지 (MessageSent일 때만)
    pub fn message(&self) -> Option<&FloorMsg> {
        match self {
            FloorEvent::MessageSent { msg, .. } => Some(msg),
            _ => None,
        }
    }
}

/// 하나의 관찰 이벤트 — 논리 시각 포함
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TraceEvent {
    /// 논리 시각 (ms)
    pub ts:    u64,
    #[serde(flatten)]
    pub event: FloorEvent,
}

// ----------------------------------------------------------------------------
// [FloorObserver] — 다중 구독 observer 인터페이스
// ----------------------------------------------------------------------------

pub trait FloorObserver: Send + Sync {
    fn on_event(&self, ts: u64, event: &FloorEvent);
}

// ----------------------------------------------------------------------------
// [TraceHub]
// ----------------------------------------------------------------------------

pub struct TraceHub {
    tx: broadcast::Sender<TraceEvent>,
}

impl TraceHub {
    pub fn new() -> Arc<Self> {
        let (tx, _) = broadcast::channel(TRACE_BUF);
        Arc::new(Self { tx })
    }

    /// 이벤트 publish — 구독자가 없으면 조용히 무시
    pub fn publish(&self, event: TraceEvent) {
        // send 실패(구독자 없음)는 정상 케이스 — 무시
        let _ = self.tx.send(event);
    }

    /// 구독자 생성 — 관찰자마다 호출
    pub fn subscribe(&self) -> broadcast::Receiver<TraceEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl FloorObserver for TraceHub {
    fn on_event(&self, ts: u64, event: &FloorEvent) {
        self.publish(TraceEvent { ts, event: event.clone() });
    }
}
