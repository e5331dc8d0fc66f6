// author: kodeholic (powered by Claude)
// 네트워크/시계와 분리된 Floor 엔진 기본 요소 — 스케줄러, 타이머, 카운터, 대기열

pub mod counter;
pub mod queue;
pub mod scheduler;
pub mod timer;

pub use counter::Counter;
pub use queue::{FloorQueue, QueueEntry};
pub use scheduler::Scheduler;
pub use timer::{Timer, TimerId, TimerOwner, TimerService, TimerTicket};
