// author: kodeholic (powered by Claude)
// Outbox — 상태머신 한 스텝의 부수효과 모음
//
// 사용 패턴 (결정 → 일괄 반영):
//   let mut out = Outbox::new();
//   machine.handle(..., &mut out);      // 상태 변경 + 메시지/타이머/통지 생성
//   session.dispatch(out);              // 스텝 종료 후 일괄 반영
//
// 상태머신은 스케줄러/구독자를 직접 호출하지 않으므로 콜백 안에서
// 다시 상태머신으로 진입하는 재진입이 구조적으로 불가능함.

use crate::core::timer::{TimerService, TimerTicket};
use crate::protocol::message::FloorMsg;
use crate::trace::{Endpoint, FloorEvent};

/// 송신 대기 메시지 1건
#[derive(Debug, Clone, PartialEq)]
pub struct Outgoing {
    pub from: Endpoint,
    pub to:   Endpoint,
    pub msg:  FloorMsg,
}

#[derive(Debug, Default)]
pub struct Outbox {
    pub messages: Vec<Outgoing>,
    pub timers:   Vec<(TimerTicket, u64)>,
    pub events:   Vec<FloorEvent>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn send(&mut self, from: Endpoint, to: Endpoint, msg: FloorMsg) {
        self.messages.push(Outgoing { from, to, msg });
    }

    pub fn notify(&mut self, event: FloorEvent) {
        self.events.push(event);
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty() && self.timers.is_empty() && self.events.is_empty()
    }

    /// 특정 수신자 앞 메시지만 (테스트/진단용)
    pub fn messages_to(&self, to: Endpoint) -> impl Iterator<Item = &FloorMsg> {
        self.messages.iter().filter(move |o| o.to == to).map(|o| &o.msg)
    }
}

impl TimerService for Outbox {
    fn arm(&mut self, ticket: TimerTicket, delay: u64) {
        self.timers.push((ticket, delay));
    }
}
