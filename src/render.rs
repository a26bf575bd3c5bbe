//! Render target collaborator
//!
//! The protocol hands incoming media tracks to an external surface. This
//! is a single assignment from the session's point of view; what the
//! surface does with the track is out of scope here.

use log::info;
use std::sync::Arc;
use webrtc::track::track_remote::TrackRemote;

/// Receives incoming remote media tracks
pub trait RenderSink: Send + Sync {
    /// Called once per received track, from the session task.
    fn attach(&self, track: Arc<TrackRemote>);
}

/// Render sink that only logs track arrival, used by the standalone binary.
#[derive(Debug, Default)]
pub struct LogSink;

impl RenderSink for LogSink {
    fn attach(&self, track: Arc<TrackRemote>) {
        info!(
            "received {:?} track (ssrc {})",
            track.kind(),
            track.ssrc()
        );
    }
}
