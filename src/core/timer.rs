// author: kodeholic (powered by Claude)
// Floor 타이머 — 세대(generation) 번호로 취소/재시작을 보장
//
// start(): 세대 증가 후 티켓 1개 예약. 실행 중 재시작해도 이전 티켓은 무효화
// stop():  세대 증가. 이미 예약된 티켓이 만기되어도 accept()가 false → 콜백 없음

use std::fmt;

use serde::Serialize;

use crate::core::scheduler::Scheduler;
use crate::protocol::message::Ssrc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TimerId {
    // Arbitrator
    T1,
    T2,
    T3,
    T4,
    T7,
    T20,
    // Participant
    T100,
    T101,
    T104,
    T132,
}

impl fmt::Display for TimerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// 타이머 소유 상태머신 — 세션 안에서의 주소
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TimerOwner {
    Arbitrator,
    Participant(Ssrc),
}

/// 예약 1건 — 만기 시 소유자에게 그대로 돌아옴
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerTicket {
    pub owner:      TimerOwner,
    pub id:         TimerId,
    pub generation: u64,
}

/// 타이머 예약 포트 — Scheduler 또는 Outbox가 구현
pub trait TimerService {
    fn arm(&mut self, ticket: TimerTicket, delay: u64);
}

impl<E: From<TimerTicket>> TimerService for Scheduler<E> {
    fn arm(&mut self, ticket: TimerTicket, delay: u64) {
        self.schedule(delay, E::from(ticket));
    }
}

#[derive(Debug, Clone)]
pub struct Timer {
    id:         TimerId,
    owner:      TimerOwner,
    delay:      u64,
    generation: u64,
    running:    bool,
}

impl Timer {
    pub fn new(id: TimerId, owner: TimerOwner, delay: u64) -> Self {
        Self { id, owner, delay, generation: 0, running: false }
    }

    pub fn id(&self) -> TimerId {
        self.id
    }

    pub fn delay(&self) -> u64 {
        self.delay
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// 시작 (실행 중이면 재시작) — 항상 유효 티켓은 1개
    pub fn start(&mut self, svc: &mut dyn TimerService) {
        self.generation += 1;
        self.running = true;
        svc.arm(
            TimerTicket { owner: self.owner, id: self.id, generation: self.generation },
            self.delay,
        );
    }

    /// 정지 — 이미 예약된 티켓은 만기되어도 무시됨
    pub fn stop(&mut self) {
        if self.running {
            self.generation += 1;
            self.running = false;
        }
    }

    /// 만기 티켓 검증 — 현재 세대의 실행 중 타이머일 때만 true (그리고 정지 상태로)
    pub fn accept(&mut self, ticket: &TimerTicket) -> bool {
        if self.running
            && ticket.owner == self.owner
            && ticket.id == self.id
            && ticket.generation == self.generation
        {
            self.running = false;
            true
        } else {
            false
        }
    }
}
