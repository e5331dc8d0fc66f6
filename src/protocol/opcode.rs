// author: kodeholic (powered by Claude)
// MBCP TS 24.380 Floor 메시지 subtype 코드

use serde::{Deserialize, Serialize};

pub const FLOOR_REQUEST:           u8 = 0;
pub const FLOOR_GRANTED:           u8 = 1;
pub const FLOOR_TAKEN:             u8 = 2;
pub const FLOOR_DENY:              u8 = 3;
pub const FLOOR_RELEASE:           u8 = 4;
pub const FLOOR_IDLE:              u8 = 5;
pub const FLOOR_REVOKE:            u8 = 6;
pub const FLOOR_QUEUE_POS_REQUEST: u8 = 8;
pub const FLOOR_QUEUE_POS_INFO:    u8 = 9;
pub const FLOOR_ACK:               u8 = 10;

/// subtype 태그 — Ack 메시지가 어떤 메시지에 대한 응답인지 표시할 때도 사용
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FloorSubtype {
    Request,
    Granted,
    Taken,
    Deny,
    Release,
    Idle,
    Revoke,
    QueuePositionRequest,
    QueuePositionInfo,
    Ack,
}

impl FloorSubtype {
    pub fn code(&self) -> u8 {
        match self {
            FloorSubtype::Request              => FLOOR_REQUEST,
            FloorSubtype::Granted              => FLOOR_GRANTED,
            FloorSubtype::Taken                => FLOOR_TAKEN,
            FloorSubtype::Deny                 => FLOOR_DENY,
            FloorSubtype::Release              => FLOOR_RELEASE,
            FloorSubtype::Idle                 => FLOOR_IDLE,
            FloorSubtype::Revoke               => FLOOR_REVOKE,
            FloorSubtype::QueuePositionRequest => FLOOR_QUEUE_POS_REQUEST,
            FloorSubtype::QueuePositionInfo    => FLOOR_QUEUE_POS_INFO,
            FloorSubtype::Ack                  => FLOOR_ACK,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            FLOOR_REQUEST           => Some(FloorSubtype::Request),
            FLOOR_GRANTED           => Some(FloorSubtype::Granted),
            FLOOR_TAKEN             => Some(FloorSubtype::Taken),
            FLOOR_DENY              => Some(FloorSubtype::Deny),
            FLOOR_RELEASE           => Some(FloorSubtype::Release),
            FLOOR_IDLE              => Some(FloorSubtype::Idle),
            FLOOR_REVOKE            => Some(FloorSubtype::Revoke),
            FLOOR_QUEUE_POS_REQUEST => Some(FloorSubtype::QueuePositionRequest),
            FLOOR_QUEUE_POS_INFO    => Some(FloorSubtype::QueuePositionInfo),
            FLOOR_ACK               => Some(FloorSubtype::Ack),
            _                       => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            FloorSubtype::Request              => "FLOOR_REQUEST",
            FloorSubtype::Granted              => "FLOOR_GRANTED",
            FloorSubtype::Taken                => "FLOOR_TAKEN",
            FloorSubtype::Deny                 => "FLOOR_DENY",
            FloorSubtype::Release              => "FLOOR_RELEASE",
            FloorSubtype::Idle                 => "FLOOR_IDLE",
            FloorSubtype::Revoke               => "FLOOR_REVOKE",
            FloorSubtype::QueuePositionRequest => "FLOOR_QUEUE_POS_REQUEST",
            FloorSubtype::QueuePositionInfo    => "FLOOR_QUEUE_POS_INFO",
            FloorSubtype::Ack                  => "FLOOR_ACK",
        }
    }
}

impl std::fmt::Display for FloorSubtype {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}
