// author: kodeholic (powered by Claude)
// CallSession — 호 1개 = Arbitrator 1 + Participant N + 전용 스케줄러
//
// 실행 모델:
//   공개 API / 이벤트 1건 처리 → Outbox 수집 → dispatch()
//     ├── 타이머 arm → Scheduler (Expiry)
//     ├── 메시지     → Scheduler (link_delay 후 ToArbitrator / ToParticipant)
//     └── 통지       → FloorObserver 전원
//   advance_to()가 만기 이벤트를 하나씩 꺼내 처리 → 콜백 중첩 없음, 전달은 FIFO
//
// release() 후 스케줄러를 비우므로 폐기된 호로 만기 이벤트가 들어오는 일은 없음.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{info, trace};

use crate::config::SessionConfig;
use crate::core::{Scheduler, TimerOwner, TimerTicket};
use crate::error::{FloorError, FloorResult};
use crate::floor::{ArbitratorState, FloorArbitrator, FloorParticipant, Outbox, ParticipantState};
use crate::protocol::message::{CallId, CallType, FloorIndicator, FloorMsg, MediaMsg, Priority, Ssrc};
use crate::trace::{Endpoint, FloorEvent, FloorObserver};

/// 스케줄러에 적재되는 세션 내부 이벤트
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Expiry(TimerTicket),
    ToArbitrator(FloorMsg),
    ToParticipant(Ssrc, FloorMsg),
}

impl From<TimerTicket> for SessionEvent {
    fn from(ticket: TimerTicket) -> Self {
        SessionEvent::Expiry(ticket)
    }
}

pub struct CallSession {
    call_id:      CallId,
    call_type:    CallType,
    config:       SessionConfig,
    arbitrator:   FloorArbitrator,
    participants: BTreeMap<Ssrc, FloorParticipant>,
    scheduler:    Scheduler<SessionEvent>,
    observers:    Vec<Arc<dyn FloorObserver>>,
    active:       bool,
}

impl CallSession {
    pub fn new(call_id: CallId, call_type: CallType, config: SessionConfig) -> Self {
        trace!("Creating CallSession: call={} type={}", call_id, call_type);
        Self {
            call_id,
            call_type,
            arbitrator:   FloorArbitrator::new(call_id, call_type, config.arbitrator.clone()),
            participants: BTreeMap::new(),
            scheduler:    Scheduler::new(),
            observers:    Vec::new(),
            active:       true,
            config,
        }
    }

    // ------------------------------------------------------------------
    // 조회
    // ------------------------------------------------------------------

    pub fn call_id(&self) -> CallId { self.call_id }
    pub fn call_type(&self) -> CallType { self.call_type }
    pub fn now(&self) -> u64 { self.scheduler.now() }
    pub fn is_active(&self) -> bool { self.active }
    pub fn arbitrator(&self) -> &FloorArbitrator { &self.arbitrator }
    pub fn pending_events(&self) -> usize { self.scheduler.pending() }

    pub fn arbitrator_state(&self) -> ArbitratorState {
        self.arbitrator.state()
    }

    pub fn holder(&self) -> Option<Ssrc> {
        self.arbitrator.holder()
    }

    pub fn participant(&self, ssrc: Ssrc) -> Option<&FloorParticipant> {
        self.participants.get(&ssrc)
    }

    pub fn participants(&self) -> impl Iterator<Item = &FloorParticipant> {
        self.participants.values()
    }

    pub fn participant_state(&self, ssrc: Ssrc) -> Option<ParticipantState> {
        self.participants.get(&ssrc).map(|p| p.state())
    }

    /// 관찰자 등록 — 등록 이후 이벤트부터 수신
    pub fn subscribe(&mut self, observer: Arc<dyn FloorObserver>) {
        self.observers.push(observer);
    }

    // ------------------------------------------------------------------
    // 호 제어
    // ------------------------------------------------------------------

    /// roster 등록 — Arbitrator 프록시 + Participant 상태머신 동시 생성
    pub fn join(&mut self, ssrc: Ssrc, priority: Priority, originator: bool) -> FloorResult<()> {
        self.ensure_active()?;
        self.arbitrator.add_participant(ssrc, priority, originator)?;
        let participant = FloorParticipant::new(
            self.call_id, ssrc, self.call_type, priority, originator, self.config.participant.clone(),
        );
        self.participants.insert(ssrc, participant);
        info!("Participant joined: call={} ssrc={} priority={}", self.call_id, ssrc, priority);
        Ok(())
    }

    /// 참가자 1명의 호 설정 완료 (늦은 합류 포함)
    pub fn initialize(&mut self, ssrc: Ssrc) -> FloorResult<()> {
        self.ensure_active()?;
        let participant = self.participants.get_mut(&ssrc).ok_or(FloorError::ParticipantNotFound(ssrc))?;
        let mut out = Outbox::new();
        participant.call_initialized(&mut out);
        self.arbitrator.call_initialized(ssrc, &mut out)?;
        self.dispatch(out);
        Ok(())
    }

    /// roster 전원 호 설정 완료
    pub fn initialize_all(&mut self) -> FloorResult<()> {
        let ssrcs: Vec<Ssrc> = self.participants.keys().copied().collect();
        for ssrc in ssrcs {
            self.initialize(ssrc)?;
        }
        Ok(())
    }

    /// 호 수립 — granted면 발신자 암묵적 Floor Request
    pub fn establish(&mut self, ssrc: Ssrc, granted: bool) -> FloorResult<()> {
        self.ensure_active()?;
        let participant = self.participants.get_mut(&ssrc).ok_or(FloorError::ParticipantNotFound(ssrc))?;
        let mut out = Outbox::new();
        let priority = participant.priority();
        participant.call_established(granted, priority, &mut out);
        if granted {
            self.arbitrator.implicit_floor_request(ssrc, &mut out)?;
        }
        self.dispatch(out);
        Ok(())
    }

    pub fn ptt_push(&mut self, ssrc: Ssrc) -> FloorResult<()> {
        self.with_participant(ssrc, |p, out| p.ptt_push(out))
    }

    pub fn ptt_release(&mut self, ssrc: Ssrc) -> FloorResult<()> {
        self.with_participant(ssrc, |p, out| p.ptt_release(out))
    }

    pub fn accept_grant(&mut self, ssrc: Ssrc) -> FloorResult<()> {
        self.with_participant(ssrc, |p, out| p.accept_grant(out))
    }

    pub fn queue_position_request(&mut self, ssrc: Ssrc) -> FloorResult<()> {
        self.with_participant(ssrc, |p, out| p.send_floor_queue_position_request(out))
    }

    /// 다음 Request에 dual floor 표시 설정
    pub fn set_dual_floor(&mut self, ssrc: Ssrc, dual_floor: bool) -> FloorResult<()> {
        self.with_participant(ssrc, |p, _| p.set_dual_floor(dual_floor))
    }

    /// Request indicator 지정 (None이면 호 유형 기본값) — 일반 호에서 긴급 상향 등
    pub fn set_indicator(&mut self, ssrc: Ssrc, indicator: Option<FloorIndicator>) -> FloorResult<()> {
        self.with_participant(ssrc, |p, _| p.set_indicator(indicator))
    }

    /// 송신 미디어 준비 — 발신자 도장. 발언권 없으면 NoFloorPermission
    pub fn media_ready(&self, ssrc: Ssrc, media: MediaMsg) -> FloorResult<MediaMsg> {
        self.ensure_active()?;
        let participant = self.participants.get(&ssrc).ok_or(FloorError::ParticipantNotFound(ssrc))?;
        participant.media_ready(media)
    }

    /// Arbitrator 미디어 릴레이 게이트
    pub fn relay_media(&self, media: &MediaMsg) -> bool {
        self.active && self.arbitrator.receive_media(media.ssrc)
    }

    /// 참가자 이탈 — Arbitrator roster + Participant 상태머신 정리
    pub fn client_release(&mut self, ssrc: Ssrc) -> FloorResult<()> {
        self.ensure_active()?;
        let mut out = Outbox::new();
        self.arbitrator.client_release(ssrc, &mut out)?;
        if let Some(mut participant) = self.participants.remove(&ssrc) {
            participant.call_release_1(&mut out);
            participant.call_release_2();
        }
        self.dispatch(out);
        info!("Participant left: call={} ssrc={}", self.call_id, ssrc);
        Ok(())
    }

    /// 호 종료 — 2단계 해제 후 스케줄러 비움
    pub fn release(&mut self) {
        if !self.active {
            return;
        }
        let mut out = Outbox::new();
        self.arbitrator.call_release_1(&mut out);
        for participant in self.participants.values_mut() {
            participant.call_release_1(&mut out);
        }
        self.dispatch(out);
        self.run_until_idle();

        let mut out = Outbox::new();
        self.arbitrator.call_release_2(&mut out);
        for participant in self.participants.values_mut() {
            participant.call_release_2();
        }
        self.dispatch(out);

        self.scheduler.clear();
        self.active = false;
        self.emit(FloorEvent::CallReleased { call_id: self.call_id });
        info!("Call released: call={}", self.call_id);
    }

    // ------------------------------------------------------------------
    // 논리 시계
    // ------------------------------------------------------------------

    /// 현재 시각에 만기된 이벤트를 모두 처리 (시계는 전진하지 않음)
    pub fn run_until_idle(&mut self) {
        let now = self.scheduler.now();
        self.advance_to(now);
    }

    /// t까지 만기 이벤트를 deadline 순으로 하나씩 처리
    pub fn advance_to(&mut self, t: u64) {
        while let Some(event) = self.scheduler.pop_due(t) {
            self.step(event);
        }
        self.scheduler.settle(t);
    }

    pub fn advance_by(&mut self, delta: u64) {
        let target = self.scheduler.now().saturating_add(delta);
        self.advance_to(target);
    }

    pub fn next_deadline(&self) -> Option<u64> {
        self.scheduler.next_deadline()
    }

    // ------------------------------------------------------------------
    // 내부
    // ------------------------------------------------------------------

    fn ensure_active(&self) -> FloorResult<()> {
        if self.active { Ok(()) } else { Err(FloorError::CallNotActive(self.call_id)) }
    }

    fn with_participant<F>(&mut self, ssrc: Ssrc, f: F) -> FloorResult<()>
    where
        F: FnOnce(&mut FloorParticipant, &mut Outbox),
    {
        self.ensure_active()?;
        let participant = self.participants.get_mut(&ssrc).ok_or(FloorError::ParticipantNotFound(ssrc))?;
        let mut out = Outbox::new();
        f(participant, &mut out);
        self.dispatch(out);
        Ok(())
    }

    fn step(&mut self, event: SessionEvent) {
        let mut out = Outbox::new();
        match event {
            SessionEvent::Expiry(ticket) => match ticket.owner {
                TimerOwner::Arbitrator => self.arbitrator.on_timer(&ticket, &mut out),
                TimerOwner::Participant(ssrc) => match self.participants.get_mut(&ssrc) {
                    Some(p) => p.on_timer(&ticket, &mut out),
                    None    => trace!("Expiry for departed ssrc={} dropped: {}", ssrc, ticket.id),
                },
            },
            SessionEvent::ToArbitrator(msg) => self.arbitrator.receive(msg, &mut out),
            SessionEvent::ToParticipant(ssrc, msg) => match self.participants.get_mut(&ssrc) {
                Some(p) => p.receive(msg, &mut out),
                None    => trace!("Message for departed ssrc={} dropped: {}", ssrc, msg),
            },
        }
        self.dispatch(out);
    }

    fn dispatch(&mut self, out: Outbox) {
        let Outbox { messages, timers, events } = out;

        for (ticket, delay) in timers {
            self.scheduler.schedule(delay, SessionEvent::Expiry(ticket));
        }

        for sent in messages {
            self.emit(FloorEvent::MessageSent {
                call_id: self.call_id,
                from:    sent.from,
                to:      sent.to,
                msg:     sent.msg.clone(),
            });
            let event = match sent.to {
                Endpoint::Arbitrator        => SessionEvent::ToArbitrator(sent.msg),
                Endpoint::Participant(ssrc) => SessionEvent::ToParticipant(ssrc, sent.msg),
            };
            self.scheduler.schedule(self.config.link_delay_ms, event);
        }

        for event in events {
            self.emit(event);
        }
    }

    fn emit(&self, event: FloorEvent) {
        let ts = self.scheduler.now();
        for observer in &self.observers {
            observer.on_event(ts, &event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// 테스트용 관찰자 — 이벤트를 그대로 적재
    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<FloorEvent>>,
    }

    impl FloorObserver for Recorder {
        fn on_event(&self, _ts: u64, event: &FloorEvent) {
            self.events.lock().unwrap().push(event.clone());
        }
    }

    fn session(n: u32) -> CallSession {
        let mut s = CallSession::new(7, CallType::Basic, SessionConfig::default());
        for ssrc in 1..=n {
            s.join(ssrc, 1, ssrc == 1).unwrap();
        }
        s.initialize_all().unwrap();
        s.run_until_idle();
        s
    }

    #[test]
    fn push_grants_through_scheduler() {
        let mut s = session(2);
        s.ptt_push(1).unwrap();
        // 처리 전에는 전달되지 않음
        assert_eq!(s.holder(), None);
        s.run_until_idle();
        assert_eq!(s.holder(), Some(1));
        assert_eq!(s.participant_state(1), Some(ParticipantState::HasPermission));
        assert_eq!(s.participant(2).and_then(|p| p.current_talker()), Some(1));
    }

    #[test]
    fn link_delay_defers_delivery() {
        let config = SessionConfig { link_delay_ms: 5, ..Default::default() };
        let mut s = CallSession::new(1, CallType::Basic, config);
        s.join(1, 1, true).unwrap();
        s.join(2, 1, false).unwrap();
        s.initialize_all().unwrap();
        s.advance_by(5);
        s.ptt_push(1).unwrap();
        s.advance_by(4);
        assert_eq!(s.holder(), None);
        s.advance_by(1);
        assert_eq!(s.holder(), Some(1));
        s.advance_by(5);
        assert_eq!(s.participant_state(1), Some(ParticipantState::HasPermission));
    }

    #[test]
    fn unknown_participant_is_error() {
        let mut s = session(1);
        assert_eq!(s.ptt_push(9), Err(FloorError::ParticipantNotFound(9)));
        assert_eq!(s.join(1, 1, false), Err(FloorError::DuplicateParticipant(1)));
    }

    #[test]
    fn observers_see_messages() {
        let mut s = session(2);
        let rec = Arc::new(Recorder::default());
        s.subscribe(rec.clone());
        s.ptt_push(2).unwrap();
        s.run_until_idle();
        let labels: Vec<String> = rec.events.lock().unwrap().iter()
            .filter_map(|e| e.message().map(|m| m.label()))
            .collect();
        assert_eq!(labels, vec!["Request(2)", "Granted(2)", "Taken(2)"]);
    }

    #[test]
    fn media_gate_follows_permission() {
        let mut s = session(2);
        assert!(s.media_ready(1, MediaMsg::new(1, vec![1])).is_err());
        s.ptt_push(1).unwrap();
        s.run_until_idle();
        let media = s.media_ready(1, MediaMsg::new(1, vec![1])).unwrap();
        assert!(s.relay_media(&media));
        let forged = MediaMsg { ssrc: 2, ..media };
        assert!(!s.relay_media(&forged));
    }

    #[test]
    fn release_clears_scheduler_and_blocks_api() {
        let mut s = session(2);
        s.ptt_push(1).unwrap();
        s.run_until_idle();
        assert!(s.pending_events() > 0);
        s.release();
        assert_eq!(s.pending_events(), 0);
        assert!(!s.is_active());
        assert_eq!(s.arbitrator_state(), ArbitratorState::StartStop);
        assert!(s.participants().all(|p| p.is_released()));
        assert_eq!(s.ptt_push(1), Err(FloorError::CallNotActive(7)));
        s.advance_by(100_000);
        assert_eq!(s.holder(), None);
    }

    #[test]
    fn client_release_promotes_queue() {
        let mut s = session(3);
        s.ptt_push(1).unwrap();
        s.run_until_idle();
        s.ptt_push(2).unwrap();
        s.run_until_idle();
        assert_eq!(s.participant_state(2), Some(ParticipantState::Queued));
        s.client_release(1).unwrap();
        s.run_until_idle();
        assert!(s.participant(1).is_none());
        assert_eq!(s.holder(), Some(2));
        assert!(s.participant(2).map(|p| p.grant_pending()).unwrap_or(false));
        s.accept_grant(2).unwrap();
        assert_eq!(s.participant_state(2), Some(ParticipantState::HasPermission));
    }
}
