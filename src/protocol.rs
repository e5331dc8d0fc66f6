// author: kodeholic (powered by Claude)

pub mod cause;
pub mod codec;
pub mod message;
pub mod opcode;

pub use cause::{DenyCause, RevokeCause};
pub use codec::GatewayPacket;
pub use message::{
    CallId, CallType, FloorAck, FloorDeny, FloorGranted, FloorIdle, FloorIndicator, FloorMsg,
    FloorQueuePositionInfo, FloorQueuePositionRequest, FloorRelease, FloorRequest, FloorRevoke,
    FloorTaken, MediaMsg, Priority, Ssrc,
};
pub use opcode::FloorSubtype;
