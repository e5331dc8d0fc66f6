// author: kodeholic (powered by Claude)
// 매직 넘버를 배제하고 Floor 엔진 전체의 타이머/카운터 한계를 제어하는 상수 모음입니다.
// 모든 시간 값은 논리 시계 기준 밀리초.

use serde::{Deserialize, Serialize};

use crate::error::{FloorError, FloorResult};

// ----------------------------------------------------------------------------
// Floor Arbitrator (MBCP TS 24.380 서버측)
// ----------------------------------------------------------------------------

/// T1 — Revoke 후 Release 대기 (재전송 주기)
pub const ARBITRATOR_T1_MS: u64 = 4_000;

/// T2 — 최대 발언 점유 시간. 만료 시 Revoke (cause=MaxDuration)
pub const ARBITRATOR_T2_MS: u64 = 30_000;

/// T3 — Pending Revoke 강제 종료. 만료 시 holder 무조건 회수
pub const ARBITRATOR_T3_MS: u64 = 3_000;

/// T4 — 대기열 keep-alive (QueuePositionInfo 재통지 주기)
pub const ARBITRATOR_T4_MS: u64 = 30_000;

/// T7 — Idle 재통지 주기 (첫 Request 유예)
pub const ARBITRATOR_T7_MS: u64 = 1_000;

/// T20 — Dual Floor Granted 재전송 주기
pub const ARBITRATOR_T20_MS: u64 = 1_000;

/// C7 — Idle 재통지 최대 횟수
pub const ARBITRATOR_C7_LIMIT: u32 = 10;

/// C20 — Dual Floor Granted 재전송 최대 횟수
pub const ARBITRATOR_C20_LIMIT: u32 = 3;

/// 대기열 최대 길이 — 초과 시 Deny(NoResources)
pub const FLOOR_QUEUE_CAPACITY: usize = 32;

// ----------------------------------------------------------------------------
// Floor Participant (MBCP TS 24.380 단말측)
// ----------------------------------------------------------------------------

/// T100 — Floor Release 응답 대기
pub const PARTICIPANT_T100_MS: u64 = 40;

/// T101 — Floor Request 응답 대기
pub const PARTICIPANT_T101_MS: u64 = 40;

/// T104 — Queue Position Request 응답 대기
pub const PARTICIPANT_T104_MS: u64 = 80;

/// T132 — 대기열 Grant 이후 사용자 수락 대기
pub const PARTICIPANT_T132_MS: u64 = 2_000;

/// C100 — Release 재전송 한계
pub const PARTICIPANT_C100_LIMIT: u32 = 3;

/// C101 — Request 재전송 한계
pub const PARTICIPANT_C101_LIMIT: u32 = 3;

/// C104 — Queue Position Request 재전송 한계
pub const PARTICIPANT_C104_LIMIT: u32 = 3;

// ----------------------------------------------------------------------------
// Session
// ----------------------------------------------------------------------------

/// Arbitrator ↔ Participant 간 메시지 전달 지연 (논리 시계)
pub const DEFAULT_LINK_DELAY_MS: u64 = 0;

/// 드라이버가 논리 시계를 전진시키는 주기
pub const DRIVER_TICK_MS: u64 = 10;

// ----------------------------------------------------------------------------
// Server
// ----------------------------------------------------------------------------

/// CallIdAllocator 발급 범위 (양끝 포함)
pub const CALL_ID_FIRST: u16 = 1;
pub const CALL_ID_LAST:  u16 = u16::MAX;

/// Arbitrator 타이머/카운터/정책 설정
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArbitratorConfig {
    pub t1_ms:                 u64,
    pub t2_ms:                 u64,
    pub t3_ms:                 u64,
    pub t4_ms:                 u64,
    pub t7_ms:                 u64,
    pub t20_ms:                u64,
    pub c7_limit:              u32,
    pub c20_limit:             u32,
    pub queue_capacity:        usize,
    /// 대기열 지원 여부 — false면 점유 중 Request는 모두 Deny
    pub queueing_supported:    bool,
    pub dual_floor_supported:  bool,
    /// 송신 메시지에 ACK 요구 플래그를 실을지 여부
    pub ack_required:          bool,
    /// Arbitrator 자신의 SSRC (상태 변경 통지 키)
    pub tx_ssrc:               u32,
}

impl Default for ArbitratorConfig {
    fn default() -> Self {
        Self {
            t1_ms:                ARBITRATOR_T1_MS,
            t2_ms:                ARBITRATOR_T2_MS,
            t3_ms:                ARBITRATOR_T3_MS,
            t4_ms:                ARBITRATOR_T4_MS,
            t7_ms:                ARBITRATOR_T7_MS,
            t20_ms:               ARBITRATOR_T20_MS,
            c7_limit:             ARBITRATOR_C7_LIMIT,
            c20_limit:            ARBITRATOR_C20_LIMIT,
            queue_capacity:       FLOOR_QUEUE_CAPACITY,
            queueing_supported:   true,
            dual_floor_supported: false,
            ack_required:         false,
            tx_ssrc:              0,
        }
    }
}

/// Participant 타이머/카운터 설정
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParticipantConfig {
    pub t100_ms:    u64,
    pub t101_ms:    u64,
    pub t104_ms:    u64,
    pub t132_ms:    u64,
    pub c100_limit: u32,
    pub c101_limit: u32,
    pub c104_limit: u32,
    /// Request에 대기열 수용 가능 표시를 실을지 여부
    pub queueing:   bool,
}

impl Default for ParticipantConfig {
    fn default() -> Self {
        Self {
            t100_ms:    PARTICIPANT_T100_MS,
            t101_ms:    PARTICIPANT_T101_MS,
            t104_ms:    PARTICIPANT_T104_MS,
            t132_ms:    PARTICIPANT_T132_MS,
            c100_limit: PARTICIPANT_C100_LIMIT,
            c101_limit: PARTICIPANT_C101_LIMIT,
            c104_limit: PARTICIPANT_C104_LIMIT,
            queueing:   true,
        }
    }
}

/// CallSession 단위 설정 (arbitrator + 모든 participant 공용)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub arbitrator:    ArbitratorConfig,
    pub participant:   ParticipantConfig,
    pub link_delay_ms: u64,
}

impl SessionConfig {
    /// JSON 문자열에서 로드 — 누락 필드는 기본값
    pub fn from_json(json: &str) -> FloorResult<Self> {
        let cfg: SessionConfig = serde_json::from_str(json)
            .map_err(|e| FloorError::ConfigError(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// 0 한계 카운터는 첫 만료에 곧바로 포기 — 의미 없는 설정이므로 거부
    pub fn validate(&self) -> FloorResult<()> {
        let limits = [
            ("c7_limit",   self.arbitrator.c7_limit),
            ("c20_limit",  self.arbitrator.c20_limit),
            ("c100_limit", self.participant.c100_limit),
            ("c101_limit", self.participant.c101_limit),
            ("c104_limit", self.participant.c104_limit),
        ];
        for (name, limit) in limits {
            if limit == 0 {
                return Err(FloorError::ConfigError(format!("{} must be at least 1", name)));
            }
        }
        if self.arbitrator.queue_capacity == 0 && self.arbitrator.queueing_supported {
            return Err(FloorError::ConfigError("queue_capacity must be at least 1 when queueing".into()));
        }
        Ok(())
    }
}
