// author: kodeholic (powered by Claude)
//
// CallSession / FloorServer 시나리오 테스트 — TraceHub 구독으로 메시지 흐름 검증

use std::sync::Arc;

use tokio::sync::broadcast::Receiver;

use mcptt_floor::config::SessionConfig;
use mcptt_floor::trace::FailureKind;
use mcptt_floor::{
    ArbitratorState, CallSession, CallType, FloorError, FloorEvent, FloorIndicator, FloorMsg, FloorServer,
    ParticipantState, TraceEvent, TraceHub,
};

// ----------------------------------------------------------------------------
// [테스트 헬퍼]
// ----------------------------------------------------------------------------

/// (ssrc, priority) 목록으로 호 생성 + 전원 초기화
fn setup(call_type: CallType, config: SessionConfig, parties: &[(u32, u8)]) -> CallSession {
    let mut call = CallSession::new(1, call_type, config);
    for (i, &(ssrc, priority)) in parties.iter().enumerate() {
        call.join(ssrc, priority, i == 0).unwrap();
    }
    call.initialize_all().unwrap();
    call.run_until_idle();
    call
}

fn observe(call: &mut CallSession) -> Receiver<TraceEvent> {
    let hub = TraceHub::new();
    let rx = hub.subscribe();
    call.subscribe(hub);
    rx
}

fn drain(rx: &mut Receiver<TraceEvent>) -> Vec<FloorEvent> {
    std::iter::from_fn(|| rx.try_recv().ok()).map(|e| e.event).collect()
}

/// 송신 메시지 label 목록 (bystander Taken 제외)
fn message_labels(events: &[FloorEvent]) -> Vec<String> {
    events.iter()
        .filter_map(|e| e.message())
        .filter(|m| !matches!(m, FloorMsg::Taken(_)))
        .map(|m| m.label())
        .collect()
}

// ----------------------------------------------------------------------------
// [시나리오 1] 선점 — A(Normal, 3) 발언 중 B(Emergency, 5) 요청
// ----------------------------------------------------------------------------

#[test]
fn test_preemption_message_sequence() {
    let mut call = setup(CallType::Basic, SessionConfig::default(), &[(100, 3), (200, 5), (300, 1)]);
    call.set_indicator(200, Some(FloorIndicator::Emergency)).unwrap();
    let mut rx = observe(&mut call);

    call.ptt_push(100).unwrap();
    call.run_until_idle();
    call.ptt_push(200).unwrap();
    call.run_until_idle();

    let events = drain(&mut rx);
    assert_eq!(
        message_labels(&events),
        vec!["Request(100)", "Granted(100)", "Request(200)", "Revoke(100)", "Release(100)", "Idle()", "Granted(200)"]
    );
    assert_eq!(call.holder(), Some(200));
    assert_eq!(call.participant_state(200), Some(ParticipantState::HasPermission));
    assert_eq!(call.participant_state(100), Some(ParticipantState::Idle));
    assert_eq!(call.participant(300).and_then(|p| p.current_talker()), Some(200));
    assert!(events.iter().any(|e| matches!(e, FloorEvent::FloorRevoked { ssrc: 100, .. })));
}

// ----------------------------------------------------------------------------
// [시나리오 1-1] 느린 링크에서의 선점 — 선점 대기자 응답 / 늦은 Grant 반납
// ----------------------------------------------------------------------------

/// 1 발언 중(링크 지연 적용) 2가 긴급 선점 요청
fn preempt_over_link(link_delay_ms: u64) -> (CallSession, Receiver<TraceEvent>) {
    let config = SessionConfig { link_delay_ms, ..Default::default() };
    let mut call = setup(CallType::Basic, config, &[(1, 1), (2, 5)]);
    call.set_indicator(2, Some(FloorIndicator::Emergency)).unwrap();
    call.ptt_push(1).unwrap();
    call.advance_by(500);
    assert_eq!(call.participant_state(1), Some(ParticipantState::HasPermission));

    let rx = observe(&mut call);
    call.ptt_push(2).unwrap();
    call.advance_by(500);
    (call, rx)
}

fn failures_of(events: &[FloorEvent], kind: FailureKind) -> usize {
    events.iter().filter(|e| matches!(e, FloorEvent::Failure { kind: k, .. } if *k == kind)).count()
}

#[test]
fn test_preemptor_answered_before_retries_run_out() {
    let (mut call, mut rx) = preempt_over_link(30);
    let events = drain(&mut rx);

    assert_eq!(failures_of(&events, FailureKind::RequestUnanswered), 0);
    assert!(events.iter().any(|e| matches!(e.message(),
        Some(FloorMsg::QueuePositionInfo(q)) if q.ssrc == 2 && q.position == 1)));
    assert_eq!(call.holder(), Some(2));
    assert_eq!(call.participant_state(2), Some(ParticipantState::Queued));
    assert!(call.participant(2).map(|p| p.grant_pending()).unwrap_or(false));

    call.accept_grant(2).unwrap();
    call.run_until_idle();
    assert_eq!(call.participant_state(2), Some(ParticipantState::HasPermission));
    assert_eq!(call.participant_state(1), Some(ParticipantState::Idle));
}

#[test]
fn test_grant_after_give_up_frees_floor() {
    let (call, mut rx) = preempt_over_link(40);
    let events = drain(&mut rx);

    // 2는 C101 소진으로 포기 — 늦게 온 Granted는 반납되어 floor가 남지 않음
    assert_eq!(failures_of(&events, FailureKind::RequestUnanswered), 1);
    assert_eq!(failures_of(&events, FailureKind::ReleaseUnconfirmed), 0);
    assert_eq!(call.holder(), None);
    assert_eq!(call.arbitrator_state(), ArbitratorState::Idle);
    assert_eq!(call.participant_state(1), Some(ParticipantState::Idle));
    assert_eq!(call.participant_state(2), Some(ParticipantState::Idle));
}

// ----------------------------------------------------------------------------
// [시나리오 2] 동일 priority 2건 → 두 번째는 대기열 1번
// ----------------------------------------------------------------------------

#[test]
fn test_equal_requests_second_queued() {
    let mut call = setup(CallType::Basic, SessionConfig::default(), &[(1, 3), (2, 3)]);
    call.ptt_push(1).unwrap();
    call.ptt_push(2).unwrap();
    call.run_until_idle();

    assert_eq!(call.holder(), Some(1));
    assert_eq!(call.participant_state(2), Some(ParticipantState::Queued));
    assert_eq!(call.participant(2).and_then(|p| p.queue_position()), Some(1));
    assert_eq!(call.arbitrator().queue().position_of(2), Some(1));
}

#[test]
fn test_queue_handover_after_release() {
    let mut config = SessionConfig::default();
    config.arbitrator.t4_ms = 5_000;
    let mut call = setup(CallType::Basic, config, &[(1, 3), (2, 3), (3, 3)]);
    for ssrc in [1, 2, 3] {
        call.ptt_push(ssrc).unwrap();
    }
    call.run_until_idle();
    assert_eq!(call.participant(3).and_then(|p| p.queue_position()), Some(2));

    call.ptt_release(1).unwrap();
    call.run_until_idle();
    assert_eq!(call.holder(), Some(2));
    assert!(call.participant(2).map(|p| p.grant_pending()).unwrap_or(false));
    call.accept_grant(2).unwrap();
    assert_eq!(call.participant_state(2), Some(ParticipantState::HasPermission));

    // T4 keep-alive로 3의 순위 갱신
    call.advance_by(5_000);
    assert_eq!(call.participant(3).and_then(|p| p.queue_position()), Some(1));
}

// ----------------------------------------------------------------------------
// [시나리오 3] Request 무응답 → C101 소진 → 실패 통지 1회
// ----------------------------------------------------------------------------

#[test]
fn test_request_unanswered_single_failure() {
    let mut config = SessionConfig::default();
    config.participant.c101_limit = 3;
    let mut call = CallSession::new(1, CallType::Basic, config.clone());
    call.join(1, 1, true).unwrap();
    call.join(2, 1, false).unwrap();
    // 2가 준비되지 않아 Arbitrator는 Initialising — Request 무시
    call.initialize(1).unwrap();
    call.run_until_idle();
    assert_eq!(call.arbitrator_state(), ArbitratorState::Initialising);

    let mut rx = observe(&mut call);
    call.ptt_push(1).unwrap();
    call.advance_by(config.participant.t101_ms * 10);

    let events = drain(&mut rx);
    let failures: Vec<_> = events.iter()
        .filter(|e| matches!(e, FloorEvent::Failure { ssrc: 1, kind: FailureKind::RequestUnanswered, .. }))
        .collect();
    assert_eq!(failures.len(), 1);
    assert_eq!(message_labels(&events), vec!["Request(1)"; 3]);
    assert_eq!(call.participant_state(1), Some(ParticipantState::Idle));
}

// ----------------------------------------------------------------------------
// [시나리오 4] 최대 발언 시간 → Revoke(MaxDuration)
// ----------------------------------------------------------------------------

#[test]
fn test_max_duration_revoke() {
    let mut config = SessionConfig::default();
    config.arbitrator.t2_ms = 1_000;
    let mut call = setup(CallType::Basic, config, &[(1, 1), (2, 1)]);
    let mut rx = observe(&mut call);

    call.ptt_push(1).unwrap();
    call.run_until_idle();
    call.advance_by(999);
    assert_eq!(call.holder(), Some(1));
    call.advance_by(1);

    let events = drain(&mut rx);
    assert!(events.iter().any(|e| matches!(e.message(),
        Some(FloorMsg::Revoke(r)) if r.cause == mcptt_floor::protocol::RevokeCause::MaxDuration)));
    assert_eq!(call.holder(), None);
    assert_eq!(call.arbitrator_state(), ArbitratorState::Idle);
    assert_eq!(call.participant_state(1), Some(ParticipantState::Idle));
}

// ----------------------------------------------------------------------------
// [시나리오 5] Broadcast 착신자 로컬 Deny
// ----------------------------------------------------------------------------

#[test]
fn test_broadcast_receiver_denied_locally() {
    let mut call = setup(CallType::Broadcast, SessionConfig::default(), &[(1, 1), (2, 1)]);
    let mut rx = observe(&mut call);
    call.ptt_push(2).unwrap();
    call.run_until_idle();

    let events = drain(&mut rx);
    assert!(message_labels(&events).is_empty());
    assert!(events.iter().any(|e| matches!(e, FloorEvent::FloorDenied { ssrc: 2, local: true, .. })));

    call.ptt_push(1).unwrap();
    call.run_until_idle();
    assert_eq!(call.holder(), Some(1));
}

// ----------------------------------------------------------------------------
// [시나리오 6] 임의 이벤트 열에서도 holder는 최대 1명
// ----------------------------------------------------------------------------

#[test]
fn test_at_most_one_holder() {
    let mut call = setup(CallType::Basic, SessionConfig::default(), &[(1, 1), (2, 4), (3, 2), (4, 4)]);

    // 선형 합동 생성기 — 재현 가능한 의사 난수
    let mut seed: u64 = 0x2545_F491_4F6C_DD1D;
    let mut next = move |bound: u64| {
        seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        (seed >> 33) % bound
    };

    for _ in 0..400 {
        let ssrc = next(4) as u32 + 1;
        match next(5) {
            0 | 1 => call.ptt_push(ssrc).unwrap(),
            2     => call.ptt_release(ssrc).unwrap(),
            3     => call.accept_grant(ssrc).unwrap(),
            _     => call.advance_by(next(3_000)),
        }
        call.run_until_idle();

        let holders: Vec<u32> = call.participants()
            .filter(|p| p.state() == ParticipantState::HasPermission)
            .map(|p| p.ssrc())
            .collect();
        assert!(holders.len() <= 1, "동시 발언자 발생: {:?}", holders);
        if let Some(&h) = holders.first() {
            assert_eq!(call.holder(), Some(h));
        }
        if let Some(h) = call.holder() {
            assert!(!call.arbitrator().queue().contains(h), "holder가 대기열에 동시에 존재");
        }
    }
}

// ----------------------------------------------------------------------------
// [시나리오 7] 호 종료 — 잔여 타이머 없음, 이후 이벤트 없음
// ----------------------------------------------------------------------------

#[test]
fn test_call_release_leaves_nothing_behind() {
    let hub = TraceHub::new();
    let mut rx = hub.subscribe();
    let mut server = FloorServer::new(SessionConfig::default());
    server.subscribe(Arc::clone(&hub) as Arc<dyn mcptt_floor::FloorObserver>);

    let id = server.create_call(CallType::Emergency).unwrap();
    {
        let call = server.call_mut(id).unwrap();
        call.join(1, 1, true).unwrap();
        call.join(2, 1, false).unwrap();
        call.initialize_all().unwrap();
        call.ptt_push(1).unwrap();
        call.ptt_push(2).unwrap();
    }
    server.advance_by(10);
    assert_eq!(server.count_floor_taken(), 1);

    server.release_call(id).unwrap();
    let before = drain(&mut rx);
    assert!(matches!(before.last(), Some(FloorEvent::CallReleased { call_id }) if *call_id == id));

    server.advance_by(120_000);
    assert!(drain(&mut rx).is_empty());
    assert_eq!(server.count_floor_taken(), 0);
    assert_eq!(server.call(id).err(), Some(FloorError::CallNotFound(id)));
    assert!(matches!(server.call(id + 100).err(), Some(FloorError::CallIdOutOfRange(_))));
}

// ----------------------------------------------------------------------------
// [시나리오 8] 늦게 합류한 참가자는 현재 floor 상태를 받음
// ----------------------------------------------------------------------------

#[test]
fn test_late_joiner_learns_talker() {
    let mut call = setup(CallType::Basic, SessionConfig::default(), &[(1, 1), (2, 1)]);
    call.ptt_push(1).unwrap();
    call.run_until_idle();

    call.join(9, 1, false).unwrap();
    call.initialize(9).unwrap();
    call.run_until_idle();
    assert_eq!(call.participant(9).and_then(|p| p.current_talker()), Some(1));
    assert_eq!(call.participant_state(9), Some(ParticipantState::Idle));
}
