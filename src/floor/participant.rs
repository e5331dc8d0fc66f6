// author: kodeholic (powered by Claude)
// MBCP TS 24.380 기반 Floor Participant (단말측 상태머신)
//
// 상태머신 (참가자별):
//   U: Start-Stop        → CallInitialized      → U: has no permission
//   U: has no permission → PTT push              → U: pending Request   (T101/C101)
//   U: pending Request   → Granted               → U: has permission
//   U: pending Request   → QueuePositionInfo     → U: queued
//   U: queued            → Granted               → grant_pending (T132) → AcceptGrant → U: has permission
//   U: has permission    → PTT release / Revoke  → U: pending Release   (T100/C100)
//   U: pending Release   → Idle / Taken          → U: has no permission
//
// ACK 요구 메시지는 처리 전에 Ack부터 회신.

use serde::Serialize;
use tracing::{info, trace, warn};

use crate::config::ParticipantConfig;
use crate::core::{Counter, Timer, TimerId, TimerOwner, TimerTicket};
use crate::error::{FloorError, FloorResult};
use crate::floor::outbox::Outbox;
use crate::protocol::cause::DenyCause;
use crate::protocol::message::{
    CallId, CallType, FloorAck, FloorIndicator, FloorMsg, FloorQueuePositionRequest, FloorRelease, FloorRequest,
    MediaMsg, Priority, Ssrc,
};
use crate::trace::{Endpoint, FailureKind, FloorEvent, Machine};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ParticipantState {
    StartStop,
    Idle,
    PendingRequest,
    Queued,
    HasPermission,
    PendingRelease,
}

impl ParticipantState {
    pub fn name(&self) -> &'static str {
        match self {
            ParticipantState::StartStop      => "U: Start-Stop",
            ParticipantState::Idle           => "U: has no permission",
            ParticipantState::PendingRequest => "U: pending Request",
            ParticipantState::Queued         => "U: queued",
            ParticipantState::HasPermission  => "U: has permission",
            ParticipantState::PendingRelease => "U: pending Release",
        }
    }
}

#[derive(Debug)]
pub struct FloorParticipant {
    call_id:        CallId,
    ssrc:           Ssrc,
    call_type:      CallType,
    config:         ParticipantConfig,
    state:          ParticipantState,
    priority:       Priority,
    originator:     bool,
    dual_floor:     bool,
    /// 호 유형 대신 Request에 실을 indicator (긴급 상향 등)
    indicator:      Option<FloorIndicator>,
    /// 보조(dual) 발언권 보유 중
    overriding:     bool,
    /// 내 발언 위에 보조 발언자가 겹침
    overridden:     bool,
    /// 대기열 Grant 수신 후 사용자 수락 대기
    grant_pending:  bool,
    released:       bool,
    current_talker: Option<Ssrc>,
    queue_position: Option<usize>,
    t100:           Timer,
    t101:           Timer,
    t104:           Timer,
    t132:           Timer,
    c100:           Counter,
    c101:           Counter,
    c104:           Counter,
}

impl FloorParticipant {
    pub fn new(
        call_id:    CallId,
        ssrc:       Ssrc,
        call_type:  CallType,
        priority:   Priority,
        originator: bool,
        config:     ParticipantConfig,
    ) -> Self {
        let owner = TimerOwner::Participant(ssrc);
        Self {
            call_id,
            ssrc,
            call_type,
            state:          ParticipantState::StartStop,
            priority,
            originator,
            dual_floor:     false,
            indicator:      None,
            overriding:     false,
            overridden:     false,
            grant_pending:  false,
            released:       false,
            current_talker: None,
            queue_position: None,
            t100:           Timer::new(TimerId::T100, owner, config.t100_ms),
            t101:           Timer::new(TimerId::T101, owner, config.t101_ms),
            t104:           Timer::new(TimerId::T104, owner, config.t104_ms),
            t132:           Timer::new(TimerId::T132, owner, config.t132_ms),
            c100:           Counter::new("C100", config.c100_limit),
            c101:           Counter::new("C101", config.c101_limit),
            c104:           Counter::new("C104", config.c104_limit),
            config,
        }
    }

    pub fn ssrc(&self) -> Ssrc { self.ssrc }
    pub fn state(&self) -> ParticipantState { self.state }
    pub fn priority(&self) -> Priority { self.priority }
    pub fn is_originator(&self) -> bool { self.originator }
    pub fn grant_pending(&self) -> bool { self.grant_pending }
    pub fn is_overriding(&self) -> bool { self.overriding }
    pub fn is_overridden(&self) -> bool { self.overridden }
    pub fn is_released(&self) -> bool { self.released }
    pub fn current_talker(&self) -> Option<Ssrc> { self.current_talker }
    pub fn queue_position(&self) -> Option<usize> { self.queue_position }

    /// Broadcast 호의 착신자는 수신 전용
    pub fn is_receive_only(&self) -> bool {
        self.call_type == CallType::Broadcast && !self.originator
    }

    /// 다음 Request에 dual floor 표시
    pub fn set_dual_floor(&mut self, dual_floor: bool) {
        self.dual_floor = dual_floor;
    }

    /// Request indicator — None이면 호 유형 기본값
    pub fn set_indicator(&mut self, indicator: Option<FloorIndicator>) {
        self.indicator = indicator;
    }

    pub fn indicator(&self) -> FloorIndicator {
        self.indicator.unwrap_or_else(|| self.call_type.indicator())
    }

    pub fn running_timers(&self) -> Vec<TimerId> {
        [&self.t100, &self.t101, &self.t104, &self.t132]
            .iter()
            .filter(|t| t.is_running())
            .map(|t| t.id())
            .collect()
    }

    // ------------------------------------------------------------------
    // 호 제어 / 로컬 앱 이벤트
    // ------------------------------------------------------------------

    pub fn call_initialized(&mut self, out: &mut Outbox) {
        if self.state == ParticipantState::StartStop {
            self.released = false;
            self.set_state(ParticipantState::Idle, out);
        }
    }

    /// 호 수립 완료 — granted면 발신자 암묵적 발언권
    pub fn call_established(&mut self, granted: bool, priority: Priority, out: &mut Outbox) {
        self.priority = priority;
        if granted && self.state == ParticipantState::Idle {
            self.current_talker = Some(self.ssrc);
            self.set_state(ParticipantState::HasPermission, out);
            out.notify(FloorEvent::FloorGranted { call_id: self.call_id, ssrc: self.ssrc });
        }
    }

    pub fn ptt_push(&mut self, out: &mut Outbox) {
        if self.is_receive_only() {
            trace!("PTT push local deny (receive-only): call={} ssrc={}", self.call_id, self.ssrc);
            out.notify(FloorEvent::FloorDenied {
                call_id: self.call_id,
                ssrc:    self.ssrc,
                cause:   DenyCause::ReceiveOnly,
                local:   true,
            });
            return;
        }

        match self.state {
            ParticipantState::Idle => {
                self.send(self.request_msg(), out);
                self.c101.reset();
                self.t101.start(out);
                self.set_state(ParticipantState::PendingRequest, out);
            }
            _ => trace!("PTT push ignored in {}: ssrc={}", self.state.name(), self.ssrc),
        }
    }

    pub fn ptt_release(&mut self, out: &mut Outbox) {
        match self.state {
            ParticipantState::HasPermission => {}
            ParticipantState::PendingRequest => self.t101.stop(),
            ParticipantState::Queued => {
                self.t104.stop();
                self.t132.stop();
                self.grant_pending = false;
                self.queue_position = None;
            }
            _ => {
                trace!("PTT release ignored in {}: ssrc={}", self.state.name(), self.ssrc);
                return;
            }
        }
        self.start_release(out);
    }

    /// 대기열 Grant 수락 — grant_pending일 때만 유효
    pub fn accept_grant(&mut self, out: &mut Outbox) {
        if self.state != ParticipantState::Queued || !self.grant_pending {
            trace!("AcceptGrant without pending grant: ssrc={} state={}", self.ssrc, self.state.name());
            return;
        }
        self.grant_pending = false;
        self.queue_position = None;
        self.t132.stop();
        self.current_talker = Some(self.ssrc);
        self.set_state(ParticipantState::HasPermission, out);
        out.notify(FloorEvent::FloorGranted { call_id: self.call_id, ssrc: self.ssrc });
    }

    pub fn send_floor_queue_position_request(&mut self, out: &mut Outbox) {
        if self.state != ParticipantState::Queued {
            trace!("Queue position request ignored in {}: ssrc={}", self.state.name(), self.ssrc);
            return;
        }
        self.send(FloorMsg::QueuePositionRequest(FloorQueuePositionRequest { ssrc: self.ssrc }), out);
        self.c104.reset();
        self.t104.start(out);
    }

    /// 송신 미디어에 발신자 도장 — 발언권 없으면 거부
    pub fn media_ready(&self, mut media: MediaMsg) -> FloorResult<MediaMsg> {
        if self.state != ParticipantState::HasPermission {
            return Err(FloorError::NoFloorPermission(self.ssrc));
        }
        media.ssrc = self.ssrc;
        Ok(media)
    }

    // ------------------------------------------------------------------
    // 수신 메시지
    // ------------------------------------------------------------------

    pub fn receive(&mut self, msg: FloorMsg, out: &mut Outbox) {
        if self.state == ParticipantState::StartStop {
            trace!("Participant not started, drop: ssrc={} msg={}", self.ssrc, msg);
            return;
        }
        if msg.requires_ack() {
            self.send(FloorMsg::Ack(FloorAck { ssrc: self.ssrc, acked: msg.subtype() }), out);
        }

        match (self.state, msg) {
            // ---- pending Request
            (ParticipantState::PendingRequest, FloorMsg::Granted(g)) => {
                self.t101.stop();
                self.overriding = g.dual_floor;
                self.current_talker = Some(self.ssrc);
                self.set_state(ParticipantState::HasPermission, out);
                out.notify(FloorEvent::FloorGranted { call_id: self.call_id, ssrc: self.ssrc });
            }
            (ParticipantState::PendingRequest, FloorMsg::Denied(d)) => {
                self.t101.stop();
                self.set_state(ParticipantState::Idle, out);
                self.notify_denied(d.cause, out);
            }
            (ParticipantState::PendingRequest, FloorMsg::QueuePositionInfo(q)) => {
                self.t101.stop();
                self.queue_position = Some(q.position);
                self.set_state(ParticipantState::Queued, out);
            }

            // ---- queued
            (ParticipantState::Queued, FloorMsg::Granted(_)) => {
                if !self.grant_pending {
                    self.grant_pending = true;
                    self.t104.stop();
                    self.t132.start(out);
                    out.notify(FloorEvent::GrantPending { call_id: self.call_id, ssrc: self.ssrc });
                }
            }
            (ParticipantState::Queued, FloorMsg::Denied(d)) => {
                self.leave_queue();
                self.set_state(ParticipantState::Idle, out);
                self.notify_denied(d.cause, out);
            }
            (ParticipantState::Queued, FloorMsg::QueuePositionInfo(q)) => {
                self.t104.stop();
                self.queue_position = Some(q.position);
            }
            (ParticipantState::Queued, FloorMsg::Idle(_)) => {
                self.leave_queue();
                self.current_talker = None;
                self.set_state(ParticipantState::Idle, out);
            }
            // 수락 전 회수 — Arbitrator 쪽 holder이므로 Release로 정리
            (ParticipantState::Queued, FloorMsg::Revoke(r)) if self.grant_pending => {
                self.leave_queue();
                out.notify(FloorEvent::FloorRevoked { call_id: self.call_id, ssrc: self.ssrc, cause: r.cause });
                self.start_release(out);
            }

            // ---- has permission
            (ParticipantState::HasPermission, FloorMsg::Revoke(r)) => {
                warn!("Floor revoked: call={} ssrc={} cause={}", self.call_id, self.ssrc, r.cause);
                out.notify(FloorEvent::FloorRevoked { call_id: self.call_id, ssrc: self.ssrc, cause: r.cause });
                self.start_release(out);
            }
            (ParticipantState::HasPermission, FloorMsg::Taken(t)) => {
                if t.ssrc == self.ssrc {
                    self.overridden = false;
                } else if t.dual_floor {
                    self.overridden = true;
                } else {
                    // T3 강제 종료 등으로 이미 다른 holder에게 넘어감
                    warn!("Floor lost to {}: call={} ssrc={}", t.ssrc, self.call_id, self.ssrc);
                    self.overriding = false;
                    self.overridden = false;
                    self.current_talker = Some(t.ssrc);
                    self.set_state(ParticipantState::Idle, out);
                }
            }
            (ParticipantState::HasPermission, FloorMsg::Idle(_)) => {
                warn!("Floor idle while holding: call={} ssrc={}", self.call_id, self.ssrc);
                self.overriding = false;
                self.overridden = false;
                self.current_talker = None;
                self.set_state(ParticipantState::Idle, out);
            }

            // ---- pending Release
            (ParticipantState::PendingRelease, FloorMsg::Idle(_)) => {
                self.t100.stop();
                self.current_talker = None;
                self.set_state(ParticipantState::Idle, out);
            }
            (ParticipantState::PendingRelease, FloorMsg::Taken(t)) => {
                self.t100.stop();
                self.current_talker = Some(t.ssrc);
                self.set_state(ParticipantState::Idle, out);
            }
            (ParticipantState::PendingRelease, FloorMsg::Denied(_)) => {
                self.t100.stop();
                self.set_state(ParticipantState::Idle, out);
            }

            // ---- 포기한 Request에 늦게 온 Grant — 즉시 반납
            (ParticipantState::Idle, FloorMsg::Granted(g)) if g.ssrc == self.ssrc => {
                warn!("Late Granted after giving up, release: call={} ssrc={}", self.call_id, self.ssrc);
                self.start_release(out);
            }

            // ---- 공통: 발언자 추적
            (_, FloorMsg::Taken(t)) => self.current_talker = Some(t.ssrc),
            (ParticipantState::Idle, FloorMsg::Idle(_)) => self.current_talker = None,

            (state, other) => trace!("Participant ignores {} in {}: ssrc={}", other, state.name(), self.ssrc),
        }
    }

    // ------------------------------------------------------------------
    // 타이머 만기
    // ------------------------------------------------------------------

    pub fn on_timer(&mut self, ticket: &TimerTicket, out: &mut Outbox) {
        match ticket.id {
            TimerId::T101 => {
                if !self.t101.accept(ticket) || self.state != ParticipantState::PendingRequest { return; }
                if self.c101.increment() {
                    warn!("Floor Request unanswered (C101): call={} ssrc={}", self.call_id, self.ssrc);
                    self.set_state(ParticipantState::Idle, out);
                    self.notify_failure(FailureKind::RequestUnanswered, out);
                } else {
                    self.send(self.request_msg(), out);
                    self.t101.start(out);
                }
            }
            TimerId::T100 => {
                if !self.t100.accept(ticket) || self.state != ParticipantState::PendingRelease { return; }
                if self.c100.increment() {
                    warn!("Floor Release unconfirmed (C100): call={} ssrc={}", self.call_id, self.ssrc);
                    self.set_state(ParticipantState::Idle, out);
                    self.notify_failure(FailureKind::ReleaseUnconfirmed, out);
                } else {
                    self.send(FloorMsg::Release(FloorRelease { ssrc: self.ssrc }), out);
                    self.t100.start(out);
                }
            }
            TimerId::T104 => {
                if !self.t104.accept(ticket) || self.state != ParticipantState::Queued { return; }
                if self.c104.increment() {
                    warn!("Queue position unanswered (C104): call={} ssrc={}", self.call_id, self.ssrc);
                    self.leave_queue();
                    self.set_state(ParticipantState::Idle, out);
                    self.notify_failure(FailureKind::QueuePositionUnanswered, out);
                } else {
                    self.send(FloorMsg::QueuePositionRequest(FloorQueuePositionRequest { ssrc: self.ssrc }), out);
                    self.t104.start(out);
                }
            }
            TimerId::T132 => {
                if !self.t132.accept(ticket) || !self.grant_pending { return; }
                info!("Queued grant not accepted (T132): call={} ssrc={}", self.call_id, self.ssrc);
                self.grant_pending = false;
                self.queue_position = None;
                self.notify_failure(FailureKind::GrantNotAccepted, out);
                self.start_release(out);
            }
            other => trace!("Participant ignores timer {}: ssrc={}", other, self.ssrc),
        }
    }

    // ------------------------------------------------------------------
    // 호 종료
    // ------------------------------------------------------------------

    pub fn call_release_1(&mut self, out: &mut Outbox) {
        self.stop_timers();
        self.grant_pending = false;
        self.overriding = false;
        self.overridden = false;
        self.queue_position = None;
        self.current_talker = None;
        self.set_state(ParticipantState::StartStop, out);
    }

    pub fn call_release_2(&mut self) {
        self.released = true;
        trace!("Participant released: call={} ssrc={}", self.call_id, self.ssrc);
    }

    pub fn stop_timers(&mut self) {
        self.t100.stop();
        self.t101.stop();
        self.t104.stop();
        self.t132.stop();
    }

    // ------------------------------------------------------------------
    // 내부
    // ------------------------------------------------------------------

    fn request_msg(&self) -> FloorMsg {
        FloorMsg::Request(FloorRequest {
            ssrc:       self.ssrc,
            priority:   self.priority,
            indicator:  self.indicator(),
            dual_floor: self.dual_floor,
            queueing:   self.config.queueing,
        })
    }

    fn start_release(&mut self, out: &mut Outbox) {
        self.overriding = false;
        self.overridden = false;
        self.send(FloorMsg::Release(FloorRelease { ssrc: self.ssrc }), out);
        self.c100.reset();
        self.t100.start(out);
        self.set_state(ParticipantState::PendingRelease, out);
    }

    fn leave_queue(&mut self) {
        self.t104.stop();
        self.t132.stop();
        self.grant_pending = false;
        self.queue_position = None;
    }

    fn set_state(&mut self, next: ParticipantState, out: &mut Outbox) {
        let prev = self.state;
        if prev == next {
            return;
        }
        self.state = next;
        trace!("Participant state: call={} ssrc={} {} → {}", self.call_id, self.ssrc, prev.name(), next.name());
        out.notify(FloorEvent::StateChanged {
            call_id: self.call_id,
            ssrc:    self.ssrc,
            machine: Machine::Participant,
            from:    prev.name(),
            to:      next.name(),
        });
    }

    fn send(&self, msg: FloorMsg, out: &mut Outbox) {
        out.send(Endpoint::Participant(self.ssrc), Endpoint::Arbitrator, msg);
    }

    fn notify_denied(&self, cause: DenyCause, out: &mut Outbox) {
        out.notify(FloorEvent::FloorDenied { call_id: self.call_id, ssrc: self.ssrc, cause, local: false });
    }

    fn notify_failure(&self, kind: FailureKind, out: &mut Outbox) {
        out.notify(FloorEvent::Failure { call_id: self.call_id, ssrc: self.ssrc, kind });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::cause::RevokeCause;
    use crate::protocol::message::{FloorDeny, FloorGranted, FloorIdle, FloorQueuePositionInfo, FloorRevoke, FloorTaken};
    use crate::protocol::opcode::FloorSubtype;

    fn started(call_type: CallType, originator: bool) -> FloorParticipant {
        let mut p = FloorParticipant::new(1, 10, call_type, 1, originator, ParticipantConfig::default());
        p.call_initialized(&mut Outbox::new());
        p
    }

    fn granted(ack: bool) -> FloorMsg {
        FloorMsg::Granted(FloorGranted { ssrc: 10, priority: 1, duration_hint: 30_000, dual_floor: false, ack })
    }

    fn position(pos: usize) -> FloorMsg {
        FloorMsg::QueuePositionInfo(FloorQueuePositionInfo { ssrc: 10, position: pos, priority: 1 })
    }

    fn ticket(out: &Outbox, id: TimerId) -> TimerTicket {
        out.timers.iter().rev().find(|(t, _)| t.id == id).map(|(t, _)| *t).unwrap()
    }

    fn failures(out: &Outbox) -> usize {
        out.events.iter().filter(|e| matches!(e, FloorEvent::Failure { .. })).count()
    }

    #[test]
    fn push_sends_request() {
        let mut p = started(CallType::Basic, false);
        let mut out = Outbox::new();
        p.ptt_push(&mut out);
        assert_eq!(p.state(), ParticipantState::PendingRequest);
        assert!(matches!(&out.messages[0].msg, FloorMsg::Request(r) if r.ssrc == 10 && r.queueing));
        assert_eq!(out.messages[0].to, Endpoint::Arbitrator);
        assert_eq!(p.running_timers(), vec![TimerId::T101]);
    }

    #[test]
    fn request_retries_then_fails_once() {
        let mut p = started(CallType::Basic, false);
        let mut out = Outbox::new();
        p.ptt_push(&mut out);
        let mut t = ticket(&out, TimerId::T101);

        let mut total_failures = 0;
        let mut retransmits = 0;
        for _ in 0..3 {
            let mut out = Outbox::new();
            p.on_timer(&t, &mut out);
            total_failures += failures(&out);
            retransmits += out.messages.len();
            if let Some((next, _)) = out.timers.last() {
                t = *next;
            }
        }
        assert_eq!(p.state(), ParticipantState::Idle);
        assert_eq!(total_failures, 1);
        assert_eq!(retransmits, 2);
        assert!(p.running_timers().is_empty());
    }

    #[test]
    fn broadcast_receiver_local_deny() {
        let mut p = started(CallType::Broadcast, false);
        let mut out = Outbox::new();
        p.ptt_push(&mut out);
        assert!(out.messages.is_empty());
        assert_eq!(p.state(), ParticipantState::Idle);
        assert!(matches!(out.events[0], FloorEvent::FloorDenied { local: true, cause: DenyCause::ReceiveOnly, .. }));
    }

    #[test]
    fn granted_gives_permission_and_media() {
        let mut p = started(CallType::Basic, false);
        let mut out = Outbox::new();
        assert_eq!(p.media_ready(MediaMsg::new(1, vec![0])), Err(FloorError::NoFloorPermission(10)));
        p.ptt_push(&mut out);
        p.receive(granted(false), &mut out);
        assert_eq!(p.state(), ParticipantState::HasPermission);
        assert!(p.running_timers().is_empty());
        assert_eq!(p.media_ready(MediaMsg::new(1, vec![0])).unwrap().ssrc, 10);
    }

    #[test]
    fn denied_returns_to_idle() {
        let mut p = started(CallType::Basic, false);
        let mut out = Outbox::new();
        p.ptt_push(&mut out);
        let mut out = Outbox::new();
        p.receive(FloorMsg::Denied(FloorDeny { ssrc: 10, cause: DenyCause::AnotherUserHasPermission, ack: false }), &mut out);
        assert_eq!(p.state(), ParticipantState::Idle);
        assert!(out.events.iter().any(|e| matches!(e, FloorEvent::FloorDenied { local: false, .. })));
    }

    #[test]
    fn queued_grant_needs_accept() {
        let mut p = started(CallType::Basic, false);
        let mut out = Outbox::new();
        p.ptt_push(&mut out);
        p.receive(position(2), &mut out);
        assert_eq!(p.state(), ParticipantState::Queued);
        assert_eq!(p.queue_position(), Some(2));

        let mut out = Outbox::new();
        p.receive(granted(false), &mut out);
        assert_eq!(p.state(), ParticipantState::Queued);
        assert!(p.grant_pending());
        assert!(p.running_timers().contains(&TimerId::T132));

        p.accept_grant(&mut out);
        assert_eq!(p.state(), ParticipantState::HasPermission);
        assert!(!p.grant_pending());
        assert!(p.running_timers().is_empty());
    }

    #[test]
    fn unaccepted_grant_is_released() {
        let mut p = started(CallType::Basic, false);
        let mut out = Outbox::new();
        p.ptt_push(&mut out);
        p.receive(position(1), &mut out);
        let mut out = Outbox::new();
        p.receive(granted(false), &mut out);
        let t132 = ticket(&out, TimerId::T132);

        let mut out = Outbox::new();
        p.on_timer(&t132, &mut out);
        assert_eq!(p.state(), ParticipantState::PendingRelease);
        assert!(matches!(&out.messages[0].msg, FloorMsg::Release(r) if r.ssrc == 10));
        assert_eq!(failures(&out), 1);
    }

    #[test]
    fn accept_grant_without_pending_is_noop() {
        let mut p = started(CallType::Basic, false);
        let mut out = Outbox::new();
        p.accept_grant(&mut out);
        assert!(out.is_empty());
        assert_eq!(p.state(), ParticipantState::Idle);
    }

    #[test]
    fn revoke_triggers_release() {
        let mut p = started(CallType::Basic, false);
        let mut out = Outbox::new();
        p.ptt_push(&mut out);
        p.receive(granted(false), &mut out);
        let mut out = Outbox::new();
        p.receive(FloorMsg::Revoke(FloorRevoke { ssrc: 10, cause: RevokeCause::Preempted, ack: false }), &mut out);
        assert_eq!(p.state(), ParticipantState::PendingRelease);
        assert!(matches!(&out.messages[0].msg, FloorMsg::Release(_)));
        assert!(out.events.iter().any(|e| matches!(e, FloorEvent::FloorRevoked { cause: RevokeCause::Preempted, .. })));

        let mut out = Outbox::new();
        p.receive(FloorMsg::Idle(FloorIdle { ack: false }), &mut out);
        assert_eq!(p.state(), ParticipantState::Idle);
        assert!(p.running_timers().is_empty());
    }

    #[test]
    fn ack_required_answered_first() {
        let mut p = started(CallType::Basic, false);
        let mut out = Outbox::new();
        p.receive(FloorMsg::Taken(FloorTaken { ssrc: 7, dual_floor: false, ack: true }), &mut out);
        assert!(matches!(&out.messages[0].msg, FloorMsg::Ack(a) if a.acked == FloorSubtype::Taken && a.ssrc == 10));
        assert_eq!(p.current_talker(), Some(7));
    }

    #[test]
    fn dual_taken_marks_overridden() {
        let mut p = started(CallType::Basic, false);
        let mut out = Outbox::new();
        p.ptt_push(&mut out);
        p.receive(granted(false), &mut out);
        p.receive(FloorMsg::Taken(FloorTaken { ssrc: 7, dual_floor: true, ack: false }), &mut out);
        assert!(p.is_overridden());
        p.receive(FloorMsg::Taken(FloorTaken { ssrc: 10, dual_floor: false, ack: false }), &mut out);
        assert!(!p.is_overridden());
    }

    #[test]
    fn revoke_before_accept_releases() {
        let mut p = started(CallType::Basic, false);
        let mut out = Outbox::new();
        p.ptt_push(&mut out);
        p.receive(position(1), &mut out);
        p.receive(granted(false), &mut out);
        let mut out = Outbox::new();
        p.receive(FloorMsg::Revoke(FloorRevoke { ssrc: 10, cause: RevokeCause::Preempted, ack: false }), &mut out);
        assert_eq!(p.state(), ParticipantState::PendingRelease);
        assert!(!p.grant_pending());
        assert_eq!(p.running_timers(), vec![TimerId::T100]);
    }

    #[test]
    fn holder_steps_down_when_floor_moves_on() {
        let mut p = started(CallType::Basic, false);
        let mut out = Outbox::new();
        p.ptt_push(&mut out);
        p.receive(granted(false), &mut out);
        p.receive(FloorMsg::Taken(FloorTaken { ssrc: 7, dual_floor: false, ack: false }), &mut out);
        assert_eq!(p.state(), ParticipantState::Idle);
        assert_eq!(p.current_talker(), Some(7));
    }

    #[test]
    fn late_grant_in_idle_is_released() {
        let mut p = started(CallType::Basic, false);
        let mut out = Outbox::new();
        p.receive(granted(false), &mut out);
        assert_eq!(p.state(), ParticipantState::PendingRelease);
        assert!(matches!(&out.messages[0].msg, FloorMsg::Release(r) if r.ssrc == 10));
        assert!(!out.events.iter().any(|e| matches!(e, FloorEvent::FloorGranted { .. })));
    }

    #[test]
    fn indicator_override_carried_in_request() {
        let mut p = started(CallType::Basic, false);
        p.set_indicator(Some(FloorIndicator::Emergency));
        let mut out = Outbox::new();
        p.ptt_push(&mut out);
        assert!(matches!(&out.messages[0].msg, FloorMsg::Request(r) if r.indicator == FloorIndicator::Emergency));

        p.set_indicator(None);
        assert_eq!(p.indicator(), FloorIndicator::Normal);
    }

    #[test]
    fn release_unconfirmed_gives_up() {
        let mut p = started(CallType::Basic, false);
        let mut out = Outbox::new();
        p.ptt_push(&mut out);
        p.receive(granted(false), &mut out);
        let mut out = Outbox::new();
        p.ptt_release(&mut out);
        let mut t = ticket(&out, TimerId::T100);
        let mut total = 0;
        while p.state() == ParticipantState::PendingRelease {
            let mut out = Outbox::new();
            p.on_timer(&t, &mut out);
            total += failures(&out);
            if let Some((next, _)) = out.timers.last() {
                t = *next;
            }
        }
        assert_eq!(p.state(), ParticipantState::Idle);
        assert_eq!(total, 1);
    }

    #[test]
    fn call_release_stops_timers() {
        let mut p = started(CallType::Basic, false);
        let mut out = Outbox::new();
        p.ptt_push(&mut out);
        let t101 = ticket(&out, TimerId::T101);
        p.call_release_1(&mut out);
        p.call_release_2();
        assert_eq!(p.state(), ParticipantState::StartStop);
        assert!(p.is_released());
        let mut out = Outbox::new();
        p.on_timer(&t101, &mut out);
        assert!(out.is_empty());
    }

    #[test]
    fn originator_implicit_grant() {
        let mut p = started(CallType::Emergency, true);
        let mut out = Outbox::new();
        p.call_established(true, 5, &mut out);
        assert_eq!(p.state(), ParticipantState::HasPermission);
        assert_eq!(p.priority(), 5);
        assert!(out.events.iter().any(|e| matches!(e, FloorEvent::FloorGranted { ssrc: 10, .. })));
    }
}
