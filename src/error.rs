//! Error types for the connection lifecycle.
//!
//! Nothing here propagates past the client run loop: transport, negotiation
//! and peer failures all funnel into the restart path, and only
//! configuration errors are raised synchronously at construction.

use std::error::Error as StdError;
use std::fmt;

#[derive(Debug)]
pub enum Error {
    /// Missing or invalid construction parameter
    Config(String),
    /// Signaling channel open failure, unexpected close, or send-after-close
    Transport(String),
    /// Malformed or unexpected message for the current negotiation phase
    Negotiation(String),
    /// Peer connection capability failure
    Peer(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Config(msg) => write!(f, "Configuration error: {}", msg),
            Error::Transport(msg) => write!(f, "Transport error: {}", msg),
            Error::Negotiation(msg) => write!(f, "Negotiation error: {}", msg),
            Error::Peer(msg) => write!(f, "Peer connection error: {}", msg),
        }
    }
}

impl StdError for Error {}
