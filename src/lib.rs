// author: kodeholic (powered by Claude)

pub mod config;
pub mod core;
pub mod driver;
pub mod error;
pub mod floor;
pub mod protocol;
pub mod server;
pub mod session;
pub mod trace;

pub use crate::config::{ArbitratorConfig, ParticipantConfig, SessionConfig};
pub use crate::error::{FloorError, FloorResult};
pub use crate::floor::{is_preemptive, ArbitratorState, FloorArbitrator, FloorParticipant, ParticipantState};
pub use crate::protocol::message::{CallId, CallType, FloorIndicator, FloorMsg, MediaMsg, Priority, Ssrc};
pub use crate::server::{CallIdAllocator, FloorServer};
pub use crate::session::{CallSession, SessionEvent};
pub use crate::trace::{FloorEvent, FloorObserver, TraceEvent, TraceHub};
