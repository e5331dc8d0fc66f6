// author: kodeholic (powered by Claude)

use serde::{Deserialize, Serialize};

/// Floor Deny 원인 코드 (MBCP Reject Cause)
pub const DENY_ANOTHER_USER_HAS_PERMISSION: u16 = 101;
pub const DENY_INTERNAL_ERROR:              u16 = 102;
pub const DENY_ONLY_ONE_PARTICIPANT:        u16 = 103;
pub const DENY_RETRY_AFTER_TIMER:           u16 = 104;
pub const DENY_RECEIVE_ONLY:                u16 = 105;
pub const DENY_NO_RESOURCES:                u16 = 106;
pub const DENY_CALL_RELEASED:               u16 = 107;

/// Floor Revoke 원인 코드
pub const REVOKE_ONLY_ONE_PARTICIPANT:      u16 = 1;
pub const REVOKE_MAX_DURATION:              u16 = 2;
pub const REVOKE_PREEMPTED:                 u16 = 3;
pub const REVOKE_NO_RESOURCES:              u16 = 4;
pub const REVOKE_CALL_RELEASED:             u16 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenyCause {
    AnotherUserHasPermission,
    InternalError,
    OnlyOneParticipant,
    RetryAfterTimer,
    ReceiveOnly,
    NoResources,
    CallReleased,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RevokeCause {
    OnlyOneParticipant,
    MaxDuration,
    Preempted,
    NoResources,
    CallReleased,
}

impl DenyCause {
    /// DenyCause → 원인 코드 변환
    pub fn code(&self) -> u16 {
        match self {
            DenyCause::AnotherUserHasPermission => DENY_ANOTHER_USER_HAS_PERMISSION,
            DenyCause::InternalError            => DENY_INTERNAL_ERROR,
            DenyCause::OnlyOneParticipant       => DENY_ONLY_ONE_PARTICIPANT,
            DenyCause::RetryAfterTimer          => DENY_RETRY_AFTER_TIMER,
            DenyCause::ReceiveOnly              => DENY_RECEIVE_ONLY,
            DenyCause::NoResources              => DENY_NO_RESOURCES,
            DenyCause::CallReleased             => DENY_CALL_RELEASED,
        }
    }
}

impl RevokeCause {
    pub fn code(&self) -> u16 {
        match self {
            RevokeCause::OnlyOneParticipant => REVOKE_ONLY_ONE_PARTICIPANT,
            RevokeCause::MaxDuration        => REVOKE_MAX_DURATION,
            RevokeCause::Preempted          => REVOKE_PREEMPTED,
            RevokeCause::NoResources        => REVOKE_NO_RESOURCES,
            RevokeCause::CallReleased       => REVOKE_CALL_RELEASED,
        }
    }
}

impl std::fmt::Display for DenyCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}({})", self, self.code())
    }
}

impl std::fmt::Display for RevokeCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}({})", self, self.code())
    }
}
