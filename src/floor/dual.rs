// author: kodeholic (powered by Claude)
// Dual Floor 보조 제어기 — 주 발언자와 별도로 두 번째 holder 1명을 추적
//
// 주 holder 슬롯은 Arbitrator가, 보조 슬롯은 여기서 관리.
// ACK 요구 설정이면 보조 Granted를 Ack 수신까지 T20 주기로 재전송 (최대 C20회)

use tracing::trace;

use crate::core::{Counter, Timer, TimerId, TimerOwner, TimerTicket};
use crate::floor::outbox::Outbox;
use crate::protocol::message::{FloorGranted, FloorMsg, FloorTaken};
use crate::trace::Endpoint;

use super::arbitrator::StoredHolder;

#[derive(Debug, Clone)]
pub struct DualFloor {
    secondary: Option<StoredHolder>,
    duration:  u64,
    ack:       bool,
    t20:       Timer,
    c20:       Counter,
}

/// T20 만기 처리 결과
#[derive(Debug, Clone, PartialEq)]
pub enum DualExpiry {
    /// 재전송함
    Retransmitted,
    /// C20 소진 — 보조 holder 회수 필요
    Exhausted(StoredHolder),
    /// 무효 티켓 / 보조 holder 없음
    Ignored,
}

impl DualFloor {
    pub fn new(t20_ms: u64, c20_limit: u32, duration: u64, ack: bool) -> Self {
        Self {
            secondary: None,
            duration,
            ack,
            t20: Timer::new(TimerId::T20, TimerOwner::Arbitrator, t20_ms),
            c20: Counter::new("C20", c20_limit),
        }
    }

    /// 보조 발언 진행 중 여부
    pub fn is_started(&self) -> bool {
        self.secondary.is_some()
    }

    pub fn secondary(&self) -> Option<&StoredHolder> {
        self.secondary.as_ref()
    }

    pub fn is_secondary(&self, ssrc: u32) -> bool {
        self.secondary.as_ref().map(|h| h.ssrc) == Some(ssrc)
    }

    pub fn t20(&self) -> &Timer {
        &self.t20
    }

    fn granted_msg(&self, holder: &StoredHolder) -> FloorMsg {
        FloorMsg::Granted(FloorGranted {
            ssrc:          holder.ssrc,
            priority:      holder.priority,
            duration_hint: self.duration,
            dual_floor:    true,
            ack:           self.ack,
        })
    }

    /// 보조 Granted 송신 + 나머지(bystander 포함, 주 holder 포함)에게 dual Taken
    pub fn grant(&mut self, holder: StoredHolder, others: &[u32], out: &mut Outbox) {
        trace!("Dual floor grant: ssrc={} priority={}", holder.ssrc, holder.priority);
        out.send(Endpoint::Arbitrator, Endpoint::Participant(holder.ssrc), self.granted_msg(&holder));
        for &ssrc in others.iter().filter(|&&s| s != holder.ssrc) {
            out.send(Endpoint::Arbitrator, Endpoint::Participant(ssrc), FloorMsg::Taken(FloorTaken {
                ssrc:       holder.ssrc,
                dual_floor: true,
                ack:        self.ack,
            }));
        }
        self.c20.reset();
        if self.ack {
            self.t20.start(out);
        }
        self.secondary = Some(holder);
    }

    /// 보조 holder의 Granted 재요청 — 같은 Granted 재전송
    pub fn resend_grant(&self, out: &mut Outbox) {
        if let Some(h) = &self.secondary {
            out.send(Endpoint::Arbitrator, Endpoint::Participant(h.ssrc), self.granted_msg(h));
        }
    }

    /// Ack(Granted) 수신 — 재전송 중단
    pub fn acknowledge(&mut self, ssrc: u32) {
        if self.is_secondary(ssrc) {
            self.t20.stop();
        }
    }

    /// 보조 슬롯 비우기 (Release / 승격 / 호 종료)
    pub fn take(&mut self) -> Option<StoredHolder> {
        self.t20.stop();
        self.secondary.take()
    }

    pub fn stop(&mut self) {
        self.t20.stop();
    }

    pub fn on_t20(&mut self, ticket: &TimerTicket, out: &mut Outbox) -> DualExpiry {
        if !self.t20.accept(ticket) || self.secondary.is_none() {
            return DualExpiry::Ignored;
        }
        if self.c20.increment() {
            self.secondary.take().map(DualExpiry::Exhausted).unwrap_or(DualExpiry::Ignored)
        } else {
            self.resend_grant(out);
            self.t20.start(out);
            DualExpiry::Retransmitted
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::message::FloorIndicator;

    fn holder(ssrc: u32) -> StoredHolder {
        StoredHolder { ssrc, priority: 9, indicator: FloorIndicator::Emergency }
    }

    #[test]
    fn grant_notifies_others_with_dual_taken() {
        let mut d = DualFloor::new(100, 3, 30_000, false);
        let mut out = Outbox::new();
        d.grant(holder(2), &[1, 2, 3], &mut out);
        assert!(d.is_started());
        assert_eq!(out.messages.len(), 3);
        assert!(matches!(&out.messages[0].msg, FloorMsg::Granted(g) if g.dual_floor && g.ssrc == 2));
        assert!(out.messages_to(Endpoint::Participant(1))
            .any(|m| matches!(m, FloorMsg::Taken(t) if t.dual_floor && t.ssrc == 2)));
        // ACK 미요구 → T20 없음
        assert!(out.timers.is_empty());
    }

    #[test]
    fn t20_retransmits_until_c20() {
        let mut d = DualFloor::new(100, 2, 30_000, true);
        let mut out = Outbox::new();
        d.grant(holder(5), &[1, 5], &mut out);
        let (ticket, _) = *out.timers.last().unwrap();

        let mut out = Outbox::new();
        assert_eq!(d.on_t20(&ticket, &mut out), DualExpiry::Retransmitted);
        let (ticket, _) = *out.timers.last().unwrap();

        let mut out = Outbox::new();
        assert_eq!(d.on_t20(&ticket, &mut out), DualExpiry::Exhausted(holder(5)));
        assert!(!d.is_started());
    }

    #[test]
    fn ack_stops_retransmission() {
        let mut d = DualFloor::new(100, 2, 30_000, true);
        let mut out = Outbox::new();
        d.grant(holder(5), &[5], &mut out);
        let (ticket, _) = *out.timers.last().unwrap();
        d.acknowledge(5);
        assert!(!d.t20().is_running());
        assert_eq!(d.on_t20(&ticket, &mut Outbox::new()), DualExpiry::Ignored);
        assert!(d.is_started());
    }
}
