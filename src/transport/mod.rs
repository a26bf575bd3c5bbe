//! Signaling transport
//!
//! Message-oriented duplex connection to the signaling relay.

pub mod channel;

pub use channel::{ChannelEvent, SignalingChannel};
