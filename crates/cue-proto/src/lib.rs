//! Shared types for the cue bridge: configuration, the QLab OSC address
//! scheme, reply decoding and the control-socket protocol.

pub mod address;
pub mod config;
pub mod error;
pub mod platform;
pub mod protocol;
pub mod reply;
pub mod role;
pub mod state;

pub use address::{cue_id_in, EngineAddresses, EventKind, TransportAction};
pub use error::{ProtoError, ProtoResult};
pub use role::SourceRole;
