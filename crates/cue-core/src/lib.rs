//! Protocol interpretation and failover logic for the cue bridge.
//!
//! Everything in this crate is synchronous and free of IO: inputs go in as
//! method calls on [`Bridge`], and the requests, display updates and timer
//! changes come back out as [`Effect`]s for the runtime to carry out.

pub mod bridge;
pub mod effect;
pub mod emitter;
pub mod error;
pub mod selector;
pub mod tracker;

pub use bridge::{Bridge, BridgeSettings};
pub use effect::{DisplayUpdate, Effect};
pub use error::BridgeError;
