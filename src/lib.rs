//! peerview-core - client-side peer session establishment and resilience
//!
//! Negotiates a real-time media session with a remote peer through a
//! WebSocket signaling relay, then keeps it alive by detecting failure and
//! transparently restarting negotiation.

pub mod client;
pub mod config;
pub mod error;
pub mod render;
pub mod transport;
pub mod webrtc;

// Re-exports
pub use client::{Client, ConnectedCallback, DisconnectedCallback};
pub use config::Config;
pub use error::Error;
pub use render::{LogSink, RenderSink};
