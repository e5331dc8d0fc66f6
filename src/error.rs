// author: kodeholic (powered by Gemini)

use std::fmt;

use crate::protocol::message::{CallId, Ssrc};

/// Floor 엔진 API 경계에서 반환되는 치명 오류
/// 네트워크에서 들어온 이상 메시지는 여기로 오지 않음 — 로그 후 no-op
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FloorError {
    CallIdOutOfRange(CallId),
    CallNotFound(CallId),
    ParticipantNotFound(Ssrc),
    DuplicateParticipant(Ssrc),
    AlreadyQueued(Ssrc),
    QueueFull(usize),
    NoFloorPermission(Ssrc),
    CallNotActive(CallId),
    InvalidOpcode(u8),
    InvalidPayload(String),
    ConfigError(String),
}

impl fmt::Display for FloorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FloorError::CallIdOutOfRange(id)     => write!(f, "Call id out of allocated range: {}", id),
            FloorError::CallNotFound(id)         => write!(f, "Call not found: {}", id),
            FloorError::ParticipantNotFound(s)   => write!(f, "Participant not in roster: {}", s),
            FloorError::DuplicateParticipant(s)  => write!(f, "Participant already in roster: {}", s),
            FloorError::AlreadyQueued(s)         => write!(f, "Requester already queued: {}", s),
            FloorError::QueueFull(cap)           => write!(f, "Floor queue full (capacity {})", cap),
            FloorError::NoFloorPermission(s)     => write!(f, "Participant {} has no floor permission", s),
            FloorError::CallNotActive(id)        => write!(f, "Call {} is not active", id),
            FloorError::InvalidOpcode(op)        => write!(f, "Invalid floor opcode: {}", op),
            FloorError::InvalidPayload(msg)      => write!(f, "Invalid floor payload: {}", msg),
            FloorError::ConfigError(msg)         => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl std::error::Error for FloorError {}

pub type FloorResult<T> = Result<T, FloorError>;
