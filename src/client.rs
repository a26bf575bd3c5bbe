//! Client aggregate and restart scheduling
//!
//! One [`Client`] owns the whole connection lifecycle: it runs one session
//! incarnation at a time and, when an incarnation fails, arms a single
//! fixed pause before starting the next. Termination is permanent and
//! cancels both a pending pause and an in-flight session.

use crate::config::Config;
use crate::error::Error;
use crate::render::RenderSink;
use crate::transport::SignalingChannel;
use crate::webrtc::negotiation::{self, SessionContext, SessionOutcome};
use crate::webrtc::peer_session::PeerEvent;
use log::{info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Notify};
use uuid::Uuid;

/// Invoked once per successful negotiation (again after a later
/// restart-and-reconnect cycle)
pub type ConnectedCallback = Box<dyn Fn() + Send + Sync>;

/// Invoked on every transition away from a connected or negotiating state
pub type DisconnectedCallback = Box<dyn Fn() + Send + Sync>;

/// Resilient peer connection client
pub struct Client {
    relay_uri: String,
    restart_pause: Duration,
    render: Arc<dyn RenderSink>,
    on_connected: ConnectedCallback,
    on_disconnected: DisconnectedCallback,
    terminated: AtomicBool,
    shutdown: Notify,
}

impl Client {
    /// Create a client for the given relay and render target. Fails fast
    /// when the relay URI is missing.
    pub fn new(
        config: &Config,
        render: Arc<dyn RenderSink>,
        on_connected: ConnectedCallback,
        on_disconnected: DisconnectedCallback,
    ) -> Result<Self, Error> {
        if config.signaling.relay_uri.is_empty() {
            return Err(Error::Config("signaling relay URI is required".to_string()));
        }

        Ok(Self {
            relay_uri: config.signaling.relay_uri.clone(),
            restart_pause: Duration::from_millis(config.session.restart_pause_ms),
            render,
            on_connected,
            on_disconnected,
            terminated: AtomicBool::new(false),
            shutdown: Notify::new(),
        })
    }

    /// Run connection attempts until terminated. Every failed attempt is
    /// followed by the fixed restart pause; at most one pause is ever
    /// pending.
    pub async fn run(&self) {
        loop {
            if self.terminated.load(Ordering::SeqCst) {
                break;
            }

            match self.run_session().await {
                SessionOutcome::Terminated => break,
                SessionOutcome::Restart => {
                    tokio::select! {
                        _ = tokio::time::sleep(self.restart_pause) => {}
                        _ = self.shutdown.notified() => break,
                    }
                }
            }
        }

        info!("client stopped");
    }

    /// Drive one session incarnation from connect to completion.
    async fn run_session(&self) -> SessionOutcome {
        let id = Uuid::new_v4().to_string();
        info!("session {}: connecting to {}", id, self.relay_uri);

        let channel = match SignalingChannel::open(&self.relay_uri).await {
            Ok(channel) => channel,
            Err(e) => {
                warn!("session {}: {}", id, e);
                (self.on_disconnected)();
                return SessionOutcome::Restart;
            }
        };

        let (events_tx, events_rx) = mpsc::unbounded_channel::<PeerEvent>();
        let ctx = SessionContext {
            id: &id,
            shutdown: &self.shutdown,
            render: self.render.clone(),
            on_connected: &*self.on_connected,
            on_disconnected: &*self.on_disconnected,
        };

        negotiation::drive(channel, events_tx, events_rx, &ctx).await
    }

    /// Permanently stop the client: cancels a pending restart pause, tears
    /// down the current session, and prevents any further attempt.
    pub fn terminate(&self) {
        self.terminated.store(true, Ordering::SeqCst);
        self.shutdown.notify_one();
    }
}
