// author: kodeholic (powered by Claude)

use serde::{Deserialize, Serialize};

use crate::protocol::cause::{DenyCause, RevokeCause};
use crate::protocol::opcode::FloorSubtype;

/// 참가자 식별자 — Floor 메시지의 유일한 주소 키
pub type Ssrc = u32;

/// Call 식별자 — CallIdAllocator가 발급
pub type CallId = u16;

/// Floor 우선순위 (높을수록 우선)
pub type Priority = u8;

// ----------------------------------------------------------------------------
// [Call Type / Floor Indicator]
// ----------------------------------------------------------------------------

/// 그룹/개별 호 종류 — Call Control이 호 설정 시 전달
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallType {
    Basic,
    Broadcast,
    Emergency,
    ImminentPeril,
    Private,
    EmergencyPrivate,
}

impl CallType {
    /// 호 종류에서 파생되는 우선순위 등급
    pub fn indicator(&self) -> FloorIndicator {
        match self {
            CallType::Basic | CallType::Private                => FloorIndicator::Normal,
            CallType::Broadcast                                => FloorIndicator::Broadcast,
            CallType::Emergency | CallType::EmergencyPrivate   => FloorIndicator::Emergency,
            CallType::ImminentPeril                            => FloorIndicator::ImminentPeril,
        }
    }

    pub fn from_str_lossy(s: &str) -> Self {
        match s.to_lowercase().replace('-', "_").as_str() {
            "broadcast"         => CallType::Broadcast,
            "emergency"         => CallType::Emergency,
            "imminent_peril"    => CallType::ImminentPeril,
            "private"           => CallType::Private,
            "emergency_private" => CallType::EmergencyPrivate,
            _                   => CallType::Basic,
        }
    }
}

impl std::fmt::Display for CallType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            CallType::Basic            => "basic",
            CallType::Broadcast        => "broadcast",
            CallType::Emergency        => "emergency",
            CallType::ImminentPeril    => "imminent_peril",
            CallType::Private          => "private",
            CallType::EmergencyPrivate => "emergency_private",
        };
        write!(f, "{}", name)
    }
}

/// Floor 표시자 — 발언의 성격/우선순위 등급 (MBCP Floor Indicator)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FloorIndicator {
    Normal,        // 일반 발언
    Broadcast,     // 단방향 방송 — 등급은 Normal과 동일
    ImminentPeril, // 임박한 위험
    Emergency,     // 긴급 — 최고 등급
}

impl FloorIndicator {
    /// Emergency > ImminentPeril > Normal = Broadcast
    pub fn precedence(&self) -> u8 {
        match self {
            FloorIndicator::Normal | FloorIndicator::Broadcast => 0,
            FloorIndicator::ImminentPeril                      => 1,
            FloorIndicator::Emergency                          => 2,
        }
    }
}

// ----------------------------------------------------------------------------
// [Floor 메시지 payload]
// ----------------------------------------------------------------------------

/// Participant → Arbitrator: 발언권 요청
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FloorRequest {
    pub ssrc:       Ssrc,
    pub priority:   Priority,
    pub indicator:  FloorIndicator,
    #[serde(default)]
    pub dual_floor: bool,
    /// 요청자가 대기열 진입을 수용하는지 여부
    #[serde(default = "default_true")]
    pub queueing:   bool,
}

/// Arbitrator → Participant: 발언권 허가
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FloorGranted {
    pub ssrc:          Ssrc,
    pub priority:      Priority,
    /// 허용 발언 시간 (T2)
    pub duration_hint: u64,
    #[serde(default)]
    pub dual_floor:    bool,
    #[serde(default)]
    pub ack:           bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FloorDeny {
    pub ssrc:  Ssrc,
    pub cause: DenyCause,
    #[serde(default)]
    pub ack:   bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FloorRelease {
    pub ssrc: Ssrc,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FloorIdle {
    #[serde(default)]
    pub ack: bool,
}

/// 소속 호에 누군가 발언 중 — holder 외 참가자에게
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FloorTaken {
    pub ssrc:       Ssrc,
    #[serde(default)]
    pub dual_floor: bool,
    #[serde(default)]
    pub ack:        bool,
}

/// 발언권 강제 회수 — ssrc는 회수 대상
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FloorRevoke {
    pub ssrc:  Ssrc,
    pub cause: RevokeCause,
    #[serde(default)]
    pub ack:   bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FloorQueuePositionRequest {
    pub ssrc: Ssrc,
}

/// 대기열 순위 통지 (1-based)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FloorQueuePositionInfo {
    pub ssrc:     Ssrc,
    pub position: usize,
    pub priority: Priority,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FloorAck {
    pub ssrc:  Ssrc,
    pub acked: FloorSubtype,
}

fn default_true() -> bool { true }

// ----------------------------------------------------------------------------
// [Floor 메시지]
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FloorMsg {
    Request(FloorRequest),
    Granted(FloorGranted),
    Denied(FloorDeny),
    Release(FloorRelease),
    Idle(FloorIdle),
    Taken(FloorTaken),
    Revoke(FloorRevoke),
    QueuePositionRequest(FloorQueuePositionRequest),
    QueuePositionInfo(FloorQueuePositionInfo),
    Ack(FloorAck),
}

impl FloorMsg {
    /// 디스패치용 subtype 태그
    pub fn subtype(&self) -> FloorSubtype {
        match self {
            FloorMsg::Request(_)              => FloorSubtype::Request,
            FloorMsg::Granted(_)              => FloorSubtype::Granted,
            FloorMsg::Denied(_)               => FloorSubtype::Deny,
            FloorMsg::Release(_)              => FloorSubtype::Release,
            FloorMsg::Idle(_)                 => FloorSubtype::Idle,
            FloorMsg::Taken(_)                => FloorSubtype::Taken,
            FloorMsg::Revoke(_)               => FloorSubtype::Revoke,
            FloorMsg::QueuePositionRequest(_) => FloorSubtype::QueuePositionRequest,
            FloorMsg::QueuePositionInfo(_)    => FloorSubtype::QueuePositionInfo,
            FloorMsg::Ack(_)                  => FloorSubtype::Ack,
        }
    }

    /// ACK-required 변형 여부 — 수신 측은 Ack로 응답해야 함
    pub fn requires_ack(&self) -> bool {
        match self {
            FloorMsg::Granted(m) => m.ack,
            FloorMsg::Denied(m)  => m.ack,
            FloorMsg::Idle(m)    => m.ack,
            FloorMsg::Taken(m)   => m.ack,
            FloorMsg::Revoke(m)  => m.ack,
            _                    => false,
        }
    }

    /// 트레이스용 한 줄 요약 — 예: "Granted(100)"
    pub fn label(&self) -> String {
        match self {
            FloorMsg::Request(m)              => format!("Request({})", m.ssrc),
            FloorMsg::Granted(m)              => format!("Granted({})", m.ssrc),
            FloorMsg::Denied(m)               => format!("Denied({})", m.ssrc),
            FloorMsg::Release(m)              => format!("Release({})", m.ssrc),
            FloorMsg::Idle(_)                 => "Idle()".to_string(),
            FloorMsg::Taken(m)                => format!("Taken({})", m.ssrc),
            FloorMsg::Revoke(m)               => format!("Revoke({})", m.ssrc),
            FloorMsg::QueuePositionRequest(m) => format!("QueuePositionRequest({})", m.ssrc),
            FloorMsg::QueuePositionInfo(m)    => format!("QueuePositionInfo({}, #{})", m.ssrc, m.position),
            FloorMsg::Ack(m)                  => format!("Ack({}, {})", m.ssrc, m.acked),
        }
    }
}

impl std::fmt::Display for FloorMsg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

// ----------------------------------------------------------------------------
// [미디어]
// ----------------------------------------------------------------------------

/// 송신 대기 미디어 프레임 — 내용은 다루지 않고 발신자 도장만 찍음
#[derive(Debug, Clone, PartialEq)]
pub struct MediaMsg {
    pub ssrc:     Ssrc,
    pub sequence: u32,
    pub payload:  Vec<u8>,
}

impl MediaMsg {
    pub fn new(sequence: u32, payload: Vec<u8>) -> Self {
        Self { ssrc: 0, sequence, payload }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn call_type_indicator_mapping() {
        assert_eq!(CallType::Basic.indicator(), FloorIndicator::Normal);
        assert_eq!(CallType::Private.indicator(), FloorIndicator::Normal);
        assert_eq!(CallType::Broadcast.indicator(), FloorIndicator::Broadcast);
        assert_eq!(CallType::Emergency.indicator(), FloorIndicator::Emergency);
        assert_eq!(CallType::EmergencyPrivate.indicator(), FloorIndicator::Emergency);
        assert_eq!(CallType::ImminentPeril.indicator(), FloorIndicator::ImminentPeril);
    }

    #[test]
    fn precedence_order() {
        assert!(FloorIndicator::Emergency.precedence() > FloorIndicator::ImminentPeril.precedence());
        assert!(FloorIndicator::ImminentPeril.precedence() > FloorIndicator::Normal.precedence());
        assert_eq!(FloorIndicator::Normal.precedence(), FloorIndicator::Broadcast.precedence());
    }

    #[test]
    fn call_type_from_str_lossy() {
        assert_eq!(CallType::from_str_lossy("imminent-peril"), CallType::ImminentPeril);
        assert_eq!(CallType::from_str_lossy("Emergency"), CallType::Emergency);
        assert_eq!(CallType::from_str_lossy("???"), CallType::Basic);
    }

    #[test]
    fn requires_ack_only_for_flagged() {
        let idle = FloorMsg::Idle(FloorIdle { ack: true });
        assert!(idle.requires_ack());
        let rel = FloorMsg::Release(FloorRelease { ssrc: 1 });
        assert!(!rel.requires_ack());
    }

    #[test]
    fn label_format() {
        let msg = FloorMsg::Granted(FloorGranted { ssrc: 7, priority: 3, duration_hint: 0, dual_floor: false, ack: false });
        assert_eq!(msg.label(), "Granted(7)");
        assert_eq!(FloorMsg::Idle(FloorIdle { ack: false }).to_string(), "Idle()");
    }
}
