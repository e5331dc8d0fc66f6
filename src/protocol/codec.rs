// author: kodeholic (powered by Claude)
// Floor 메시지 ↔ JSON 봉투 변환 — 전송 계층(collaborator)용 어댑터
//
// 예시:
//   { "op": 0, "d": { "ssrc": 100, "priority": 3, "indicator": "normal" } }

use serde::{Deserialize, Serialize};

use crate::error::FloorError;
use crate::protocol::message::FloorMsg;
use crate::protocol::opcode::FloorSubtype;

/// 모든 Floor 메시지의 최상위 구조체
/// payload는 op에 따라 해석합니다.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct GatewayPacket {
    /// subtype 코드 (protocol::opcode 참조)
    pub op: u8,
    /// payload. op에 따라 구조가 달라지므로 raw JSON으로 보관
    pub d: Option<serde_json::Value>,
}

impl GatewayPacket {
    pub fn new(op: u8, payload: impl Serialize) -> Self {
        Self {
            op,
            d: Some(serde_json::to_value(payload).unwrap_or(serde_json::Value::Null)),
        }
    }
}

/// FloorMsg → GatewayPacket
pub fn encode(msg: &FloorMsg) -> GatewayPacket {
    let op = msg.subtype().code();
    match msg {
        FloorMsg::Request(p)              => GatewayPacket::new(op, p),
        FloorMsg::Granted(p)              => GatewayPacket::new(op, p),
        FloorMsg::Denied(p)               => GatewayPacket::new(op, p),
        FloorMsg::Release(p)              => GatewayPacket::new(op, p),
        FloorMsg::Idle(p)                 => GatewayPacket::new(op, p),
        FloorMsg::Taken(p)                => GatewayPacket::new(op, p),
        FloorMsg::Revoke(p)               => GatewayPacket::new(op, p),
        FloorMsg::QueuePositionRequest(p) => GatewayPacket::new(op, p),
        FloorMsg::QueuePositionInfo(p)    => GatewayPacket::new(op, p),
        FloorMsg::Ack(p)                  => GatewayPacket::new(op, p),
    }
}

/// GatewayPacket → FloorMsg
pub fn decode(packet: GatewayPacket) -> Result<FloorMsg, FloorError> {
    let subtype = FloorSubtype::from_code(packet.op)
        .ok_or(FloorError::InvalidOpcode(packet.op))?;

    let msg = match subtype {
        FloorSubtype::Request              => FloorMsg::Request(parse_payload(packet.d)?),
        FloorSubtype::Granted              => FloorMsg::Granted(parse_payload(packet.d)?),
        FloorSubtype::Deny                 => FloorMsg::Denied(parse_payload(packet.d)?),
        FloorSubtype::Release              => FloorMsg::Release(parse_payload(packet.d)?),
        FloorSubtype::Idle                 => FloorMsg::Idle(parse_payload(packet.d)?),
        FloorSubtype::Taken                => FloorMsg::Taken(parse_payload(packet.d)?),
        FloorSubtype::Revoke               => FloorMsg::Revoke(parse_payload(packet.d)?),
        FloorSubtype::QueuePositionRequest => FloorMsg::QueuePositionRequest(parse_payload(packet.d)?),
        FloorSubtype::QueuePositionInfo    => FloorMsg::QueuePositionInfo(parse_payload(packet.d)?),
        FloorSubtype::Ack                  => FloorMsg::Ack(parse_payload(packet.d)?),
    };
    Ok(msg)
}

/// 직렬화된 JSON 문자열로 바로 변환
pub fn to_json(msg: &FloorMsg) -> String {
    serde_json::to_string(&encode(msg)).unwrap_or_default()
}

pub fn from_json(json: &str) -> Result<FloorMsg, FloorError> {
    let packet: GatewayPacket = serde_json::from_str(json)
        .map_err(|e| FloorError::InvalidPayload(e.to_string()))?;
    decode(packet)
}

// ----------------------------------------------------------------------------
// [내부 파싱 유틸]
// ----------------------------------------------------------------------------

fn parse_payload<T: serde::de::DeserializeOwned>(
    d: Option<serde_json::Value>,
) -> Result<T, FloorError> {
    let value = d.ok_or_else(|| FloorError::InvalidPayload("missing payload".to_string()))?;
    serde_json::from_value(value).map_err(|e| FloorError::InvalidPayload(e.to_string()))
}
