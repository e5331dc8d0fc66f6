// author: kodeholic (powered by Claude)
// MBCP TS 24.380 기반 Floor Arbitrator (서버측 상태머신)
//
// 상태머신 (호별):
//   G: Start-Stop      → CallInitialized        → G: Initialising
//   G: Initialising    → 모든 참가자 준비 완료  → G: Floor Idle
//   G: Floor Idle      → Floor Request          → G: Floor Taken
//   G: Floor Taken     → Floor Release          → G: Floor Idle  (또는 다음 Queue Grant)
//   G: Floor Taken     → Floor Request(高)      → Revoke → G: Pending Floor Revoke
//   G: Floor Taken     → T2 만료 (최대 발언)    → Revoke → G: Pending Floor Revoke
//   G: Pending Revoke  → Release / T3 만료      → 선점자 Grant 또는 G: Floor Idle
//   (any)              → CallRelease1 → G: Releasing → CallRelease2 → G: Start-Stop
//
// 모든 핸들러는 순수 동기: 상태 변경 + Outbox에 메시지/타이머/통지 적재만 함.
// 실제 전달은 CallSession이 스텝 종료 후 수행.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{info, trace, warn};

use crate::config::ArbitratorConfig;
use crate::core::{Counter, FloorQueue, Timer, TimerId, TimerOwner, TimerTicket};
use crate::error::{FloorError, FloorResult};
use crate::floor::dual::{DualExpiry, DualFloor};
use crate::floor::outbox::Outbox;
use crate::protocol::cause::{DenyCause, RevokeCause};
use crate::protocol::message::{
    CallId, CallType, FloorAck, FloorDeny, FloorGranted, FloorIdle, FloorIndicator, FloorMsg,
    FloorQueuePositionInfo, FloorRequest, FloorRevoke, FloorTaken, Priority, Ssrc,
};
use crate::protocol::opcode::FloorSubtype;
use crate::trace::{Endpoint, FailureKind, FloorEvent, Machine};

// ----------------------------------------------------------------------------
// [상태 / 참가자 프록시]
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ArbitratorState {
    StartStop,
    Initialising,
    Idle,
    Taken,
    PendingRevoke,
    Releasing,
}

impl ArbitratorState {
    pub fn name(&self) -> &'static str {
        match self {
            ArbitratorState::StartStop     => "G: Start-Stop",
            ArbitratorState::Initialising  => "G: Initialising",
            ArbitratorState::Idle          => "G: Floor Idle",
            ArbitratorState::Taken         => "G: Floor Taken",
            ArbitratorState::PendingRevoke => "G: Pending Floor Revoke",
            ArbitratorState::Releasing     => "G: Releasing",
        }
    }
}

/// 참가자별 Arbitrator 측 프록시 (TS 24.380 "towards floor participant")
#[derive(Debug, Clone, PartialEq)]
pub struct TowardsParticipant {
    pub ssrc:         Ssrc,
    pub priority:     Priority,
    pub originator:   bool,
    /// Broadcast 호의 착신자 — 발언 불가
    pub receive_only: bool,
    /// CallInitialized 수신 여부
    pub ready:        bool,
}

/// 현재 holder(또는 대기 중인 선점자)의 발언 자격
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StoredHolder {
    pub ssrc:      Ssrc,
    pub priority:  Priority,
    pub indicator: FloorIndicator,
}

impl StoredHolder {
    fn from_request(req: &FloorRequest) -> Self {
        Self { ssrc: req.ssrc, priority: req.priority, indicator: req.indicator }
    }
}

/// 선점 판정 — 등급(precedence)이 높으면 선점, 같으면 priority가 엄격히 클 때만
pub fn is_preemptive(
    req_indicator: FloorIndicator,
    req_priority:  Priority,
    cur_indicator: FloorIndicator,
    cur_priority:  Priority,
) -> bool {
    match req_indicator.precedence().cmp(&cur_indicator.precedence()) {
        Ordering::Greater => true,
        Ordering::Less    => false,
        Ordering::Equal   => req_priority > cur_priority,
    }
}

// ----------------------------------------------------------------------------
// [FloorArbitrator]
// ----------------------------------------------------------------------------

#[derive(Debug)]
pub struct FloorArbitrator {
    call_id:          CallId,
    call_type:        CallType,
    config:           ArbitratorConfig,
    state:            ArbitratorState,
    participants:     BTreeMap<Ssrc, TowardsParticipant>,
    queue:            FloorQueue,
    holder:           Option<StoredHolder>,
    /// Revoke 진행 중 다음 Grant 대상 (대기열보다 우선)
    preemptor:        Option<StoredHolder>,
    dual:             DualFloor,
    pending_implicit: Option<Ssrc>,
    revoke_cause:     RevokeCause,
    t1:               Timer,
    t2:               Timer,
    t3:               Timer,
    t4:               Timer,
    t7:               Timer,
    c7:               Counter,
}

impl FloorArbitrator {
    pub fn new(call_id: CallId, call_type: CallType, config: ArbitratorConfig) -> Self {
        let owner = TimerOwner::Arbitrator;
        Self {
            call_id,
            call_type,
            state:            ArbitratorState::StartStop,
            participants:     BTreeMap::new(),
            queue:            FloorQueue::new(config.queue_capacity),
            holder:           None,
            preemptor:        None,
            dual:             DualFloor::new(config.t20_ms, config.c20_limit, config.t2_ms, config.ack_required),
            pending_implicit: None,
            revoke_cause:     RevokeCause::Preempted,
            t1:               Timer::new(TimerId::T1, owner, config.t1_ms),
            t2:               Timer::new(TimerId::T2, owner, config.t2_ms),
            t3:               Timer::new(TimerId::T3, owner, config.t3_ms),
            t4:               Timer::new(TimerId::T4, owner, config.t4_ms),
            t7:               Timer::new(TimerId::T7, owner, config.t7_ms),
            c7:               Counter::new("C7", config.c7_limit),
            config,
        }
    }

    // ------------------------------------------------------------------
    // 조회
    // ------------------------------------------------------------------

    pub fn call_id(&self) -> CallId { self.call_id }
    pub fn call_type(&self) -> CallType { self.call_type }
    pub fn state(&self) -> ArbitratorState { self.state }
    pub fn queue(&self) -> &FloorQueue { &self.queue }

    pub fn holder(&self) -> Option<Ssrc> {
        self.holder.map(|h| h.ssrc)
    }

    pub fn stored_holder(&self) -> Option<&StoredHolder> {
        self.holder.as_ref()
    }

    pub fn secondary(&self) -> Option<Ssrc> {
        self.dual.secondary().map(|h| h.ssrc)
    }

    pub fn participant(&self, ssrc: Ssrc) -> Option<&TowardsParticipant> {
        self.participants.get(&ssrc)
    }

    pub fn participants(&self) -> impl Iterator<Item = &TowardsParticipant> {
        self.participants.values()
    }

    /// Taken / PendingRevoke
    pub fn is_floor_occupied(&self) -> bool {
        matches!(self.state, ArbitratorState::Taken | ArbitratorState::PendingRevoke)
    }

    fn is_holder(&self, ssrc: Ssrc) -> bool {
        self.holder() == Some(ssrc)
    }

    /// 현재 holder 대비 선점 여부 (holder 없으면 false)
    pub fn is_preemptive(&self, indicator: FloorIndicator, priority: Priority) -> bool {
        match &self.holder {
            Some(h) => is_preemptive(indicator, priority, h.indicator, h.priority),
            None    => false,
        }
    }

    /// 실행 중 타이머 목록 (진단/테스트용)
    pub fn running_timers(&self) -> Vec<TimerId> {
        [&self.t1, &self.t2, &self.t3, &self.t4, &self.t7, self.dual.t20()]
            .iter()
            .filter(|t| t.is_running())
            .map(|t| t.id())
            .collect()
    }

    // ------------------------------------------------------------------
    // 참가자 관리
    // ------------------------------------------------------------------

    pub fn add_participant(&mut self, ssrc: Ssrc, priority: Priority, originator: bool) -> FloorResult<()> {
        if self.participants.contains_key(&ssrc) {
            return Err(FloorError::DuplicateParticipant(ssrc));
        }
        let receive_only = self.call_type == CallType::Broadcast && !originator;
        self.participants.insert(ssrc, TowardsParticipant { ssrc, priority, originator, receive_only, ready: false });
        trace!("Arbitrator roster add: call={} ssrc={} priority={} originator={}", self.call_id, ssrc, priority, originator);
        Ok(())
    }

    /// 호 설정 완료 통지 — 참가자 준비 표시. 늦게 합류한 참가자에게는 현재 floor 상태 전달
    pub fn call_initialized(&mut self, ssrc: Ssrc, out: &mut Outbox) -> FloorResult<()> {
        let proxy = self.participants.get_mut(&ssrc).ok_or(FloorError::ParticipantNotFound(ssrc))?;
        proxy.ready = true;

        match self.state {
            ArbitratorState::StartStop => {
                self.set_state(ArbitratorState::Initialising, out);
                self.check_ready(out);
            }
            ArbitratorState::Initialising => self.check_ready(out),
            ArbitratorState::Idle => {
                self.send_to(ssrc, FloorMsg::Idle(FloorIdle { ack: self.config.ack_required }), out);
            }
            ArbitratorState::Taken | ArbitratorState::PendingRevoke => {
                if let Some(h) = self.holder {
                    self.send_to(ssrc, self.taken_msg(h.ssrc, false), out);
                }
            }
            ArbitratorState::Releasing => {
                trace!("CallInitialized ignored while releasing: call={} ssrc={}", self.call_id, ssrc);
            }
        }
        Ok(())
    }

    /// 발신자 암묵적 Floor Request (호 설정 시 발언권 포함)
    pub fn implicit_floor_request(&mut self, ssrc: Ssrc, out: &mut Outbox) -> FloorResult<()> {
        if !self.participants.contains_key(&ssrc) {
            return Err(FloorError::ParticipantNotFound(ssrc));
        }
        match self.state {
            ArbitratorState::Idle         => self.implicit_grant(ssrc, out),
            ArbitratorState::Initialising => self.pending_implicit = Some(ssrc),
            _ => trace!("Implicit floor request ignored in {}: call={} ssrc={}", self.state.name(), self.call_id, ssrc),
        }
        Ok(())
    }

    /// 참가자 이탈 — 대기열/holder 정리 후 roster에서 제거
    pub fn client_release(&mut self, ssrc: Ssrc, out: &mut Outbox) -> FloorResult<()> {
        if self.participants.remove(&ssrc).is_none() {
            return Err(FloorError::ParticipantNotFound(ssrc));
        }
        info!("Arbitrator client release: call={} ssrc={}", self.call_id, ssrc);

        self.queue.remove(ssrc);
        if self.preemptor.map(|p| p.ssrc) == Some(ssrc) {
            self.preemptor = None;
        }
        if self.pending_implicit == Some(ssrc) {
            self.pending_implicit = None;
        }
        if self.dual.is_secondary(ssrc) {
            self.dual.take();
        }

        if self.is_holder(ssrc) && self.is_floor_occupied() {
            warn!("Floor holder left: call={} ssrc={}", self.call_id, ssrc);
            self.end_holder(out);
        } else {
            self.refresh_t4(out);
        }

        if self.state == ArbitratorState::Initialising {
            self.check_ready(out);
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // 수신 메시지 디스패치
    // ------------------------------------------------------------------

    pub fn receive(&mut self, msg: FloorMsg, out: &mut Outbox) {
        match msg {
            FloorMsg::Request(req)              => self.receive_floor_request(req, out),
            FloorMsg::Release(rel)              => self.receive_floor_release(rel.ssrc, out),
            FloorMsg::QueuePositionRequest(req) => self.receive_queue_position_request(req.ssrc, out),
            FloorMsg::Ack(ack)                  => self.receive_ack(ack),
            other => warn!("Arbitrator got participant-bound message: call={} msg={}", self.call_id, other),
        }
    }

    pub fn receive_floor_request(&mut self, req: FloorRequest, out: &mut Outbox) {
        trace!("FLOOR_REQUEST call={} ssrc={} priority={} indicator={:?}", self.call_id, req.ssrc, req.priority, req.indicator);

        let Some(proxy) = self.participants.get(&req.ssrc) else {
            warn!("Floor Request from unknown ssrc: call={} ssrc={}", self.call_id, req.ssrc);
            return;
        };
        let receive_only = proxy.receive_only;

        match self.state {
            ArbitratorState::Idle => {
                if receive_only {
                    self.deny(req.ssrc, DenyCause::ReceiveOnly, out);
                    return;
                }
                trace!("Floor Granted (Idle→Taken): call={} ssrc={}", self.call_id, req.ssrc);
                self.grant(StoredHolder::from_request(&req), out);
            }
            ArbitratorState::Taken | ArbitratorState::PendingRevoke => {
                self.request_while_occupied(req, receive_only, out);
            }
            _ => trace!("Floor Request ignored in {}: call={} ssrc={}", self.state.name(), self.call_id, req.ssrc),
        }
    }

    fn request_while_occupied(&mut self, req: FloorRequest, receive_only: bool, out: &mut Outbox) {
        // 재전송 처리
        if let Some(h) = self.holder.filter(|h| h.ssrc == req.ssrc) {
            self.send_to(h.ssrc, self.granted_msg(&h), out);
            return;
        }
        if self.dual.is_secondary(req.ssrc) {
            self.dual.resend_grant(out);
            return;
        }
        if let Some(position) = self.queue.position_of(req.ssrc) {
            self.send_position(req.ssrc, position, out);
            return;
        }
        if let Some(p) = self.preemptor.filter(|p| p.ssrc == req.ssrc) {
            // 재전송 — 대기열 맨 앞으로 응답해 C101 소진 방지
            trace!("Preemptor retransmission, answer head position: call={} ssrc={}", self.call_id, req.ssrc);
            self.send_preemptor_position(&p, out);
            return;
        }

        if receive_only {
            self.deny(req.ssrc, DenyCause::ReceiveOnly, out);
            return;
        }

        let cand = StoredHolder::from_request(&req);
        if self.is_preemptive(cand.indicator, cand.priority) {
            if req.dual_floor
                && self.config.dual_floor_supported
                && !self.dual.is_started()
                && self.state == ArbitratorState::Taken
            {
                let everyone: Vec<Ssrc> = self.participants.keys().copied().collect();
                self.dual.grant(cand, &everyone, out);
                return;
            }

            match (self.state, self.preemptor) {
                (ArbitratorState::Taken, prev) => {
                    warn!("Floor Preempted: call={} old={:?} new={}", self.call_id, self.holder(), cand.ssrc);
                    if let Some(prev) = prev {
                        self.queue_or_deny(prev, true, out);
                    }
                    self.preemptor = Some(cand);
                    self.revoke_holder(RevokeCause::Preempted, out);
                    return;
                }
                (ArbitratorState::PendingRevoke, None) => {
                    self.preemptor = Some(cand);
                    return;
                }
                (ArbitratorState::PendingRevoke, Some(prev))
                    if is_preemptive(cand.indicator, cand.priority, prev.indicator, prev.priority) =>
                {
                    // 밀려난 선점자는 대기열로
                    self.preemptor = Some(cand);
                    self.queue_or_deny(prev, true, out);
                    return;
                }
                _ => {}
            }
        }

        self.queue_or_deny(cand, req.queueing, out);
    }

    pub fn receive_floor_release(&mut self, ssrc: Ssrc, out: &mut Outbox) {
        trace!("FLOOR_RELEASE call={} ssrc={}", self.call_id, ssrc);

        if !self.is_floor_occupied() {
            if self.state == ArbitratorState::Idle {
                // 늦은 Release 재전송 — Idle로 확인
                self.send_to(ssrc, FloorMsg::Idle(FloorIdle { ack: self.config.ack_required }), out);
            } else {
                trace!("Floor Release ignored in {}: call={} ssrc={}", self.state.name(), self.call_id, ssrc);
            }
            return;
        }

        if self.is_holder(ssrc) {
            self.end_holder(out);
        } else if self.dual.is_secondary(ssrc) {
            // 보조 발언 종료 — 주 holder 포함 전원에게 단독 Taken 재공지
            self.dual.take();
            if let Some(h) = self.holder {
                self.broadcast(self.taken_msg(h.ssrc, false), None, out);
            }
        } else {
            let queued = self.queue.remove(ssrc);
            if self.preemptor.map(|p| p.ssrc) == Some(ssrc) {
                self.preemptor = None;
            } else if !queued {
                warn!("FLOOR_RELEASE non-holder: call={} ssrc={}", self.call_id, ssrc);
            }
            // 대기 취소 / 회수된 보조 holder 모두 현재 holder로 확인
            if let Some(h) = self.holder {
                self.send_to(ssrc, self.taken_msg(h.ssrc, false), out);
            }
            self.refresh_t4(out);
        }
    }

    pub fn receive_queue_position_request(&mut self, ssrc: Ssrc, out: &mut Outbox) {
        match self.queue.position_of(ssrc) {
            Some(position) => self.send_position(ssrc, position, out),
            None if self.preemptor.map(|p| p.ssrc) == Some(ssrc) => {
                if let Some(p) = self.preemptor {
                    self.send_preemptor_position(&p, out);
                }
            }
            None => trace!("Queue position request from non-queued: call={} ssrc={}", self.call_id, ssrc),
        }
    }

    pub fn receive_ack(&mut self, ack: FloorAck) {
        match ack.acked {
            FloorSubtype::Granted => self.dual.acknowledge(ack.ssrc),
            other => trace!("Ack({}) from ssrc={} call={}", other, ack.ssrc, self.call_id),
        }
    }

    /// 미디어 릴레이 게이트 — 현재 holder(주/보조)만 true
    pub fn receive_media(&self, ssrc: Ssrc) -> bool {
        let allowed = self.is_floor_occupied() && (self.is_holder(ssrc) || self.dual.is_secondary(ssrc));
        if !allowed {
            warn!("Media from non-holder dropped: call={} ssrc={}", self.call_id, ssrc);
        }
        allowed
    }

    // ------------------------------------------------------------------
    // 타이머 만기
    // ------------------------------------------------------------------

    pub fn on_timer(&mut self, ticket: &TimerTicket, out: &mut Outbox) {
        match ticket.id {
            TimerId::T1 => {
                if !self.t1.accept(ticket) { return; }
                if let (ArbitratorState::PendingRevoke, Some(h)) = (self.state, self.holder) {
                    trace!("T1 expired, Revoke retransmit: call={} ssrc={}", self.call_id, h.ssrc);
                    self.send_to(h.ssrc, self.revoke_msg(h.ssrc, self.revoke_cause), out);
                    self.t1.start(out);
                }
            }
            TimerId::T2 => {
                if !self.t2.accept(ticket) { return; }
                if self.state == ArbitratorState::Taken {
                    warn!("Floor Revoke (max duration): call={} ssrc={:?}", self.call_id, self.holder());
                    self.revoke_holder(RevokeCause::MaxDuration, out);
                }
            }
            TimerId::T3 => {
                if !self.t3.accept(ticket) { return; }
                if self.state == ArbitratorState::PendingRevoke {
                    warn!("Floor forced release (T3): call={} ssrc={:?}", self.call_id, self.holder());
                    self.end_holder(out);
                }
            }
            TimerId::T4 => {
                if !self.t4.accept(ticket) { return; }
                let entries: Vec<(Ssrc, usize)> = self.queue.iter()
                    .enumerate()
                    .map(|(i, e)| (e.ssrc, i + 1))
                    .collect();
                for (ssrc, position) in entries {
                    self.send_position(ssrc, position, out);
                }
                self.refresh_t4(out);
            }
            TimerId::T7 => {
                if !self.t7.accept(ticket) { return; }
                if self.state != ArbitratorState::Idle { return; }
                if self.c7.increment() {
                    trace!("C7 limit reached, Idle re-announce stop: call={}", self.call_id);
                } else {
                    self.broadcast(FloorMsg::Idle(FloorIdle { ack: self.config.ack_required }), None, out);
                    self.t7.start(out);
                }
            }
            TimerId::T20 => {
                if let DualExpiry::Exhausted(sec) = self.dual.on_t20(ticket, out) {
                    warn!("Dual floor Granted unacknowledged, revoke: call={} ssrc={}", self.call_id, sec.ssrc);
                    self.send_to(sec.ssrc, self.revoke_msg(sec.ssrc, RevokeCause::NoResources), out);
                    out.notify(FloorEvent::Failure {
                        call_id: self.call_id,
                        ssrc:    sec.ssrc,
                        kind:    FailureKind::DualGrantUnacknowledged,
                    });
                }
            }
            other => trace!("Arbitrator ignores timer {}: call={}", other, self.call_id),
        }
    }

    // ------------------------------------------------------------------
    // 호 종료
    // ------------------------------------------------------------------

    /// 1단계 — holder에게 Revoke, 대기자에게 Deny 후 Releasing
    pub fn call_release_1(&mut self, out: &mut Outbox) {
        info!("Arbitrator call release: call={} state={}", self.call_id, self.state.name());
        self.stop_timers();

        if let Some(h) = self.holder.take() {
            self.send_to(h.ssrc, self.revoke_msg(h.ssrc, RevokeCause::CallReleased), out);
        }
        if let Some(s) = self.dual.take() {
            self.send_to(s.ssrc, self.revoke_msg(s.ssrc, RevokeCause::CallReleased), out);
        }
        if let Some(p) = self.preemptor.take() {
            self.deny(p.ssrc, DenyCause::CallReleased, out);
        }
        for entry in self.queue.drain() {
            self.deny(entry.ssrc, DenyCause::CallReleased, out);
        }
        self.pending_implicit = None;
        self.set_state(ArbitratorState::Releasing, out);
    }

    /// 2단계 — roster 정리 후 Start-Stop
    pub fn call_release_2(&mut self, out: &mut Outbox) {
        if self.state != ArbitratorState::Releasing {
            warn!("CallRelease2 outside Releasing ignored: call={} state={}", self.call_id, self.state.name());
            return;
        }
        self.participants.clear();
        self.set_state(ArbitratorState::StartStop, out);
    }

    pub fn stop_timers(&mut self) {
        self.t1.stop();
        self.t2.stop();
        self.t3.stop();
        self.t4.stop();
        self.t7.stop();
        self.dual.stop();
    }

    // ------------------------------------------------------------------
    // 내부 전이
    // ------------------------------------------------------------------

    fn set_state(&mut self, next: ArbitratorState, out: &mut Outbox) {
        let prev = self.state;
        if prev == next {
            return;
        }

        match prev {
            ArbitratorState::Idle          => self.t7.stop(),
            ArbitratorState::Taken         => self.t2.stop(),
            ArbitratorState::PendingRevoke => { self.t1.stop(); self.t3.stop(); }
            _ => {}
        }

        self.state = next;
        trace!("Arbitrator state: call={} {} → {}", self.call_id, prev.name(), next.name());
        out.notify(FloorEvent::StateChanged {
            call_id: self.call_id,
            ssrc:    self.config.tx_ssrc,
            machine: Machine::Arbitrator,
            from:    prev.name(),
            to:      next.name(),
        });

        match next {
            ArbitratorState::Idle => {
                self.t4.stop();
                self.c7.reset();
                self.t7.start(out);
                if let Some(ssrc) = self.pending_implicit.take() {
                    self.implicit_grant(ssrc, out);
                }
            }
            ArbitratorState::PendingRevoke => {
                self.t1.start(out);
                self.t3.start(out);
            }
            _ => {}
        }
    }

    /// Initialising 중 모든 참가자 준비 완료 → Idle 공지
    fn check_ready(&mut self, out: &mut Outbox) {
        if self.participants.values().all(|p| p.ready) {
            self.broadcast(FloorMsg::Idle(FloorIdle { ack: self.config.ack_required }), None, out);
            self.set_state(ArbitratorState::Idle, out);
        }
    }

    fn implicit_grant(&mut self, ssrc: Ssrc, out: &mut Outbox) {
        let Some(proxy) = self.participants.get(&ssrc) else { return; };
        if proxy.receive_only {
            warn!("Implicit floor request from receive-only party: call={} ssrc={}", self.call_id, ssrc);
            return;
        }
        let holder = StoredHolder { ssrc, priority: proxy.priority, indicator: self.call_type.indicator() };
        trace!("Floor Granted (implicit): call={} ssrc={}", self.call_id, ssrc);
        self.grant(holder, out);
    }

    /// holder 지정 + Granted/Taken 송신 + T2 (재)시작
    fn grant(&mut self, holder: StoredHolder, out: &mut Outbox) {
        self.queue.remove(holder.ssrc);
        self.holder = Some(holder);
        self.send_to(holder.ssrc, self.granted_msg(&holder), out);
        self.broadcast(self.taken_msg(holder.ssrc, false), Some(holder.ssrc), out);
        self.t2.start(out);
        self.set_state(ArbitratorState::Taken, out);
        self.refresh_t4(out);
    }

    fn revoke_holder(&mut self, cause: RevokeCause, out: &mut Outbox) {
        let Some(h) = self.holder else { return; };
        self.revoke_cause = cause;
        self.send_to(h.ssrc, self.revoke_msg(h.ssrc, cause), out);
        self.set_state(ArbitratorState::PendingRevoke, out);
    }

    /// 주 holder 발언 종료 — 보조 승격, 선점자, 대기열 순으로 다음 holder 결정
    fn end_holder(&mut self, out: &mut Outbox) {
        let released = self.holder.take();
        let idle = FloorMsg::Idle(FloorIdle { ack: self.config.ack_required });

        if let Some(sec) = self.dual.take() {
            trace!("Dual secondary promoted: call={} ssrc={}", self.call_id, sec.ssrc);
            if let Some(r) = released {
                self.send_to(r.ssrc, idle, out);
            }
            self.holder = Some(sec);
            self.broadcast(self.taken_msg(sec.ssrc, false), Some(sec.ssrc), out);
            self.t2.start(out);
            self.set_state(ArbitratorState::Taken, out);
            self.refresh_t4(out);

            // 대기 중인 선점자는 승격된 holder 기준으로 재판정
            if let Some(p) = self.preemptor {
                if is_preemptive(p.indicator, p.priority, sec.indicator, sec.priority) {
                    warn!("Floor Preempted (promoted): call={} old={} new={}", self.call_id, sec.ssrc, p.ssrc);
                    self.revoke_holder(RevokeCause::Preempted, out);
                } else {
                    self.preemptor = None;
                    self.queue_or_deny(p, true, out);
                }
            }
            return;
        }

        let next = self.preemptor.take().or_else(|| {
            self.queue.dequeue_highest().map(|e| StoredHolder {
                ssrc:      e.ssrc,
                priority:  e.priority,
                indicator: e.indicator,
            })
        });

        match next {
            Some(next) => {
                trace!("Floor Queue → Grant: call={} ssrc={}", self.call_id, next.ssrc);
                if let Some(r) = released {
                    self.send_to(r.ssrc, idle, out);
                }
                self.grant(next, out);
            }
            None => {
                trace!("Floor Idle: call={}", self.call_id);
                self.broadcast(idle, None, out);
                self.set_state(ArbitratorState::Idle, out);
            }
        }
    }

    fn queue_or_deny(&mut self, cand: StoredHolder, requester_queueing: bool, out: &mut Outbox) {
        if !(self.config.queueing_supported && requester_queueing) {
            self.deny(cand.ssrc, DenyCause::AnotherUserHasPermission, out);
            return;
        }
        match self.queue.enqueue(cand.ssrc, cand.priority, cand.indicator) {
            Ok(position) => {
                trace!("Floor queued: call={} ssrc={} position={}", self.call_id, cand.ssrc, position);
                self.send_position(cand.ssrc, position, out);
                self.refresh_t4(out);
            }
            Err(e) => {
                warn!("Floor queue rejected: call={} ssrc={} reason={}", self.call_id, cand.ssrc, e);
                self.deny(cand.ssrc, DenyCause::NoResources, out);
            }
        }
    }

    /// 점유 중이고 대기자가 있을 때만 T4 유지
    fn refresh_t4(&mut self, out: &mut Outbox) {
        if self.is_floor_occupied() && !self.queue.is_empty() {
            if !self.t4.is_running() {
                self.t4.start(out);
            }
        } else {
            self.t4.stop();
        }
    }

    // ------------------------------------------------------------------
    // 메시지 생성 / 송신
    // ------------------------------------------------------------------

    fn granted_msg(&self, h: &StoredHolder) -> FloorMsg {
        FloorMsg::Granted(FloorGranted {
            ssrc:          h.ssrc,
            priority:      h.priority,
            duration_hint: self.config.t2_ms,
            dual_floor:    false,
            ack:           self.config.ack_required,
        })
    }

    fn taken_msg(&self, ssrc: Ssrc, dual_floor: bool) -> FloorMsg {
        FloorMsg::Taken(FloorTaken { ssrc, dual_floor, ack: self.config.ack_required })
    }

    fn revoke_msg(&self, ssrc: Ssrc, cause: RevokeCause) -> FloorMsg {
        FloorMsg::Revoke(FloorRevoke { ssrc, cause, ack: self.config.ack_required })
    }

    fn deny(&self, ssrc: Ssrc, cause: DenyCause, out: &mut Outbox) {
        trace!("Floor Deny: call={} ssrc={} cause={}", self.call_id, ssrc, cause);
        self.send_to(ssrc, FloorMsg::Denied(FloorDeny { ssrc, cause, ack: self.config.ack_required }), out);
    }

    fn send_position(&self, ssrc: Ssrc, position: usize, out: &mut Outbox) {
        let priority = self.queue.get(ssrc).map(|e| e.priority).unwrap_or_default();
        self.send_to(ssrc, FloorMsg::QueuePositionInfo(FloorQueuePositionInfo { ssrc, position, priority }), out);
    }

    /// 선점 대기자는 대기열보다 앞 — 항상 1번
    fn send_preemptor_position(&self, p: &StoredHolder, out: &mut Outbox) {
        let info = FloorQueuePositionInfo { ssrc: p.ssrc, position: 1, priority: p.priority };
        self.send_to(p.ssrc, FloorMsg::QueuePositionInfo(info), out);
    }

    fn send_to(&self, ssrc: Ssrc, msg: FloorMsg, out: &mut Outbox) {
        if self.participants.contains_key(&ssrc) {
            out.send(Endpoint::Arbitrator, Endpoint::Participant(ssrc), msg);
        } else {
            trace!("Skip send to departed ssrc={}: {}", ssrc, msg);
        }
    }

    fn broadcast(&self, msg: FloorMsg, except: Option<Ssrc>, out: &mut Outbox) {
        for &ssrc in self.participants.keys().filter(|&&s| Some(s) != except) {
            out.send(Endpoint::Arbitrator, Endpoint::Participant(ssrc), msg.clone());
        }
    }
}
