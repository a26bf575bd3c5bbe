//! Peer connection session
//!
//! Wraps one RTCPeerConnection and funnels its observer callbacks into the
//! session's event channel so all protocol work happens on a single task.

use crate::error::Error;
use crate::webrtc::signaling::IceServerEntry;
use log::debug;
use std::sync::Arc;
use tokio::sync::mpsc;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::APIBuilder;
use webrtc::ice_transport::ice_candidate::RTCIceCandidateInit;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;
use webrtc::rtp_transceiver::rtp_transceiver_direction::RTCRtpTransceiverDirection;
use webrtc::rtp_transceiver::RTCRtpTransceiverInit;
use webrtc::track::track_remote::TrackRemote;

/// Observer callback output, re-entering the session's event loop
pub enum PeerEvent {
    /// A locally discovered ICE candidate; `None` marks end of gathering
    Candidate(Option<RTCIceCandidateInit>),
    /// Peer connection state transition
    StateChange(RTCPeerConnectionState),
    /// An incoming remote media track
    Track(Arc<TrackRemote>),
}

/// One negotiated peer connection, exclusively owned by a session
pub struct PeerSession {
    pc: Option<Arc<RTCPeerConnection>>,
}

impl PeerSession {
    /// Create the underlying peer connection configured with the given ICE
    /// servers, register the candidate/state/track observers, and declare
    /// bidirectional video and audio capability for the upcoming offer.
    pub async fn connect(
        ice_servers: &[IceServerEntry],
        events: mpsc::UnboundedSender<PeerEvent>,
    ) -> Result<Self, Error> {
        let mut media_engine = MediaEngine::default();
        media_engine
            .register_default_codecs()
            .map_err(|e| Error::Peer(format!("failed to register codecs: {}", e)))?;

        let mut registry = Registry::new();
        registry = register_default_interceptors(registry, &mut media_engine)
            .map_err(|e| Error::Peer(format!("failed to register interceptors: {}", e)))?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        let rtc_config = RTCConfiguration {
            ice_servers: ice_servers.iter().map(IceServerEntry::to_rtc).collect(),
            ..Default::default()
        };

        let pc = api
            .new_peer_connection(rtc_config)
            .await
            .map(Arc::new)
            .map_err(|e| Error::Peer(format!("failed to create peer connection: {}", e)))?;

        let tx = events.clone();
        pc.on_ice_candidate(Box::new(move |candidate| {
            let tx = tx.clone();
            Box::pin(async move {
                let init = candidate.and_then(|c| c.to_json().ok());
                let _ = tx.send(PeerEvent::Candidate(init));
            })
        }));

        let tx = events.clone();
        pc.on_peer_connection_state_change(Box::new(move |state| {
            let tx = tx.clone();
            Box::pin(async move {
                let _ = tx.send(PeerEvent::StateChange(state));
            })
        }));

        let tx = events;
        pc.on_track(Box::new(move |track, _receiver, _transceiver| {
            let tx = tx.clone();
            Box::pin(async move {
                let _ = tx.send(PeerEvent::Track(track));
            })
        }));

        // Both media kinds must be declared before the offer is created.
        for (label, kind) in [("video", RTPCodecType::Video), ("audio", RTPCodecType::Audio)] {
            let init = RTCRtpTransceiverInit {
                direction: RTCRtpTransceiverDirection::Sendrecv,
                send_encodings: Vec::new(),
            };
            pc.add_transceiver_from_kind(kind, Some(init))
                .await
                .map_err(|e| {
                    Error::Peer(format!("failed to add {} transceiver: {}", label, e))
                })?;
        }

        Ok(Self { pc: Some(pc) })
    }

    /// Create a local offer and commit it as the local description. The
    /// caller must not set it again.
    pub async fn create_offer(&self) -> Result<RTCSessionDescription, Error> {
        let pc = match &self.pc {
            Some(pc) => pc,
            None => return Err(Error::Peer("peer session is closed".to_string())),
        };

        let offer = pc
            .create_offer(None)
            .await
            .map_err(|e| Error::Peer(format!("failed to create offer: {}", e)))?;

        pc.set_local_description(offer.clone())
            .await
            .map_err(|e| Error::Peer(format!("failed to set local description: {}", e)))?;

        Ok(offer)
    }

    /// Apply the remote session description. No-op after close, since the
    /// remote answer can race a restart.
    pub async fn set_remote_description(&self, desc: RTCSessionDescription) -> Result<(), Error> {
        let pc = match &self.pc {
            Some(pc) => pc,
            None => return Ok(()),
        };

        pc.set_remote_description(desc)
            .await
            .map_err(|e| Error::Negotiation(format!("failed to apply remote description: {}", e)))
    }

    /// Apply a remote ICE candidate. No-op after close.
    pub async fn add_ice_candidate(&self, init: RTCIceCandidateInit) -> Result<(), Error> {
        let pc = match &self.pc {
            Some(pc) => pc,
            None => return Ok(()),
        };

        pc.add_ice_candidate(init)
            .await
            .map_err(|e| Error::Negotiation(format!("failed to add ICE candidate: {}", e)))
    }

    /// Release the native peer connection. Idempotent.
    pub async fn close(&mut self) {
        if let Some(pc) = self.pc.take() {
            if let Err(e) = pc.close().await {
                debug!("peer connection close: {}", e);
            }
        }
    }
}
