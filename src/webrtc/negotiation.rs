//! Negotiation orchestrator
//!
//! Drives one session incarnation: a single event loop multiplexing the
//! signaling channel, peer connection observer events, and shutdown. The
//! handshake advances through an explicit phase enum; each phase decodes
//! only the message shape it expects. Handler state is owned by the loop,
//! so a message arriving after a phase transition is always routed by the
//! new phase.

use crate::error::Error;
use crate::render::RenderSink;
use crate::transport::{ChannelEvent, SignalingChannel};
use crate::webrtc::peer_session::{PeerEvent, PeerSession};
use crate::webrtc::signaling::{self, CandidateEntry, Description};
use log::{debug, info, warn};
use std::sync::Arc;
use tokio::sync::{mpsc, Notify};
use webrtc::ice_transport::ice_candidate::RTCIceCandidateInit;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;

/// How a session incarnation ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SessionOutcome {
    /// The session failed; the scheduler should retry after the pause
    Restart,
    /// The client was terminated; no retry
    Terminated,
}

/// Negotiation phase. Entering `Connected` disables all inbound signaling
/// routing for the incarnation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    AwaitingIceServers,
    AwaitingAnswer,
    ExchangingCandidates,
    Connected,
}

/// Per-incarnation context handed down from the client
pub(crate) struct SessionContext<'a> {
    pub id: &'a str,
    pub shutdown: &'a Notify,
    pub render: Arc<dyn RenderSink>,
    pub on_connected: &'a (dyn Fn() + Send + Sync),
    pub on_disconnected: &'a (dyn Fn() + Send + Sync),
}

/// Drive one incarnation to completion. Owns the channel and the peer
/// session it creates; both are released before returning.
pub(crate) async fn drive(
    mut channel: SignalingChannel,
    events_tx: mpsc::UnboundedSender<PeerEvent>,
    mut events_rx: mpsc::UnboundedReceiver<PeerEvent>,
    ctx: &SessionContext<'_>,
) -> SessionOutcome {
    let mut phase = Phase::AwaitingIceServers;
    let mut peer: Option<PeerSession> = None;

    let outcome = loop {
        tokio::select! {
            _ = ctx.shutdown.notified() => {
                info!("session {}: terminated", ctx.id);
                break SessionOutcome::Terminated;
            }

            event = channel.recv(), if phase != Phase::Connected => match event {
                ChannelEvent::Message(text) => {
                    if let Err(e) = handle_signal(
                        &mut phase,
                        &mut peer,
                        &mut channel,
                        &events_tx,
                        ctx,
                        &text,
                    )
                    .await
                    {
                        warn!("session {}: {}", ctx.id, e);
                        (ctx.on_disconnected)();
                        break SessionOutcome::Restart;
                    }
                }
                ChannelEvent::Closed => {
                    info!("session {}: signaling channel closed", ctx.id);
                    (ctx.on_disconnected)();
                    break SessionOutcome::Restart;
                }
            },

            event = events_rx.recv() => match event {
                Some(PeerEvent::Candidate(init)) => {
                    if let Err(e) = forward_candidate(&mut channel, phase, ctx, init).await {
                        warn!("session {}: {}", ctx.id, e);
                        (ctx.on_disconnected)();
                        break SessionOutcome::Restart;
                    }
                }
                Some(PeerEvent::StateChange(state)) => {
                    info!("session {}: peer connection state: {:?}", ctx.id, state);
                    match state {
                        RTCPeerConnectionState::Connected => {
                            if phase != Phase::Connected {
                                // Quiesce signaling: stop routing inbound
                                // messages and candidates. The transport is
                                // left open so the remote peer can observe
                                // the connected state before any teardown.
                                phase = Phase::Connected;
                                (ctx.on_connected)();
                            }
                        }
                        RTCPeerConnectionState::Disconnected => {
                            (ctx.on_disconnected)();
                            break SessionOutcome::Restart;
                        }
                        _ => {}
                    }
                }
                Some(PeerEvent::Track(track)) => {
                    info!("session {}: new track {:?}", ctx.id, track.kind());
                    ctx.render.attach(track);
                }
                // Unreachable while the loop holds events_tx.
                None => break SessionOutcome::Restart,
            },
        }
    };

    channel.close().await;
    if let Some(mut peer) = peer.take() {
        peer.close().await;
    }

    outcome
}

/// Route an inbound relay message to the current phase's handler.
async fn handle_signal(
    phase: &mut Phase,
    peer: &mut Option<PeerSession>,
    channel: &mut SignalingChannel,
    events_tx: &mpsc::UnboundedSender<PeerEvent>,
    ctx: &SessionContext<'_>,
    text: &str,
) -> Result<(), Error> {
    match *phase {
        Phase::AwaitingIceServers => {
            let servers = signaling::decode_ice_servers(text)?;
            let session = PeerSession::connect(&servers, events_tx.clone()).await?;
            let offer = session.create_offer().await?;

            info!("session {}: sending offer", ctx.id);
            channel.send_json(&Description::offer(offer.sdp)).await?;

            *peer = Some(session);
            *phase = Phase::AwaitingAnswer;
        }

        Phase::AwaitingAnswer => {
            let desc = signaling::decode_answer(text)?;
            let answer = RTCSessionDescription::answer(desc.sdp)
                .map_err(|e| Error::Negotiation(format!("invalid answer description: {}", e)))?;

            if let Some(session) = peer.as_ref() {
                session.set_remote_description(answer).await?;
            }
            *phase = Phase::ExchangingCandidates;
        }

        Phase::ExchangingCandidates => {
            if let Some(entry) = signaling::decode_candidate(text)? {
                if let Some(session) = peer.as_ref() {
                    session.add_ice_candidate(entry.into_init()).await?;
                }
            }
        }

        // Inbound routing is disabled once connected; the select guard
        // keeps this arm from being reached.
        Phase::Connected => {}
    }

    Ok(())
}

/// Send a locally discovered candidate to the remote peer. The empty
/// candidate string is the local end-of-gathering sentinel and never goes
/// on the wire; nothing is sent once the session is connected.
async fn forward_candidate(
    channel: &mut SignalingChannel,
    phase: Phase,
    ctx: &SessionContext<'_>,
    init: Option<RTCIceCandidateInit>,
) -> Result<(), Error> {
    if phase == Phase::Connected {
        return Ok(());
    }

    let init = match init {
        Some(init) => init,
        None => {
            debug!("session {}: candidate gathering complete", ctx.id);
            return Ok(());
        }
    };

    if init.candidate.is_empty() {
        return Ok(());
    }

    channel.send_json(&CandidateEntry::from_init(init)).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::{SinkExt, StreamExt};
    use std::net::SocketAddr;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::net::TcpListener;
    use tokio::sync::oneshot;
    use tokio_tungstenite::tungstenite::protocol::Message;

    struct NullSink;

    impl RenderSink for NullSink {
        fn attach(&self, _track: Arc<webrtc::track::track_remote::TrackRemote>) {}
    }

    const ICE_SERVERS: &str = r#"[{"urls":"stun:stun.example"}]"#;

    async fn open_channel(addr: SocketAddr) -> SignalingChannel {
        SignalingChannel::open(&format!("ws://{}", addr))
            .await
            .unwrap()
    }

    struct Counters {
        connected: AtomicUsize,
        disconnected: AtomicUsize,
    }

    impl Counters {
        fn new() -> Self {
            Self {
                connected: AtomicUsize::new(0),
                disconnected: AtomicUsize::new(0),
            }
        }
    }

    #[tokio::test]
    async fn ice_servers_trigger_offer_first() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let relay = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            ws.send(Message::Text(ICE_SERVERS.into())).await.unwrap();

            // The very first outbound frame must be the local offer; the
            // relay drops the connection afterwards, ending the session.
            match ws.next().await {
                Some(Ok(Message::Text(text))) => text.to_string(),
                other => panic!("expected offer frame, got {:?}", other),
            }
        });

        let channel = open_channel(addr).await;
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let shutdown = Notify::new();
        let counters = Counters::new();
        let on_connected = || {
            counters.connected.fetch_add(1, Ordering::SeqCst);
        };
        let on_disconnected = || {
            counters.disconnected.fetch_add(1, Ordering::SeqCst);
        };
        let ctx = SessionContext {
            id: "test",
            shutdown: &shutdown,
            render: Arc::new(NullSink),
            on_connected: &on_connected,
            on_disconnected: &on_disconnected,
        };

        let outcome = drive(channel, events_tx, events_rx, &ctx).await;
        assert_eq!(outcome, SessionOutcome::Restart);
        assert_eq!(counters.connected.load(Ordering::SeqCst), 0);
        assert_eq!(counters.disconnected.load(Ordering::SeqCst), 1);

        let offer: serde_json::Value = serde_json::from_str(&relay.await.unwrap()).unwrap();
        assert_eq!(offer["type"], "offer");
        assert!(offer["sdp"].as_str().unwrap().starts_with("v=0"));
    }

    #[tokio::test]
    async fn connected_state_quiesces_signaling() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (offer_seen_tx, offer_seen_rx) = oneshot::channel();
        let (go_tx, go_rx) = oneshot::channel::<()>();

        let relay = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            ws.send(Message::Text(ICE_SERVERS.into())).await.unwrap();

            match ws.next().await {
                Some(Ok(Message::Text(_))) => {}
                other => panic!("expected offer frame, got {:?}", other),
            }
            offer_seen_tx.send(()).unwrap();
            go_rx.await.unwrap();

            // Sent after the session connected: with routing quiesced these
            // must not tear the channel down.
            ws.send(Message::Text(r#"{"bogus":true}"#.into()))
                .await
                .unwrap();
            ws.send(Message::Text(r#"{"type":"answer","sdp":"junk"}"#.into()))
                .await
                .unwrap();

            // Candidates discovered before the connected transition may
            // still trail in; only a close frame counts as teardown.
            let saw_close = tokio::time::timeout(Duration::from_millis(200), async {
                loop {
                    match ws.next().await {
                        Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                        Some(Ok(_)) => continue,
                    }
                }
            })
            .await;
            saw_close.is_err()
        });

        let channel = open_channel(addr).await;
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let inject = events_tx.clone();
        let shutdown = Notify::new();
        let counters = Counters::new();
        let on_connected = || {
            counters.connected.fetch_add(1, Ordering::SeqCst);
        };
        let on_disconnected = || {
            counters.disconnected.fetch_add(1, Ordering::SeqCst);
        };
        let ctx = SessionContext {
            id: "test",
            shutdown: &shutdown,
            render: Arc::new(NullSink),
            on_connected: &on_connected,
            on_disconnected: &on_disconnected,
        };

        let (outcome, stayed_open) = tokio::join!(drive(channel, events_tx, events_rx, &ctx), async {
            offer_seen_rx.await.unwrap();
            inject
                .send(PeerEvent::StateChange(RTCPeerConnectionState::Connected))
                .unwrap();
            // A duplicate connected transition must not re-notify.
            inject
                .send(PeerEvent::StateChange(RTCPeerConnectionState::Connected))
                .unwrap();
            go_tx.send(()).unwrap();
            let stayed_open = relay.await.unwrap();
            inject
                .send(PeerEvent::StateChange(RTCPeerConnectionState::Disconnected))
                .unwrap();
            stayed_open
        });

        assert_eq!(outcome, SessionOutcome::Restart);
        assert!(stayed_open);
        assert_eq!(counters.connected.load(Ordering::SeqCst), 1);
        assert_eq!(counters.disconnected.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn empty_candidate_sentinel_is_not_forwarded() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        // No ICE servers are sent, so the session holds no real peer
        // connection and the only candidate traffic is what the test
        // injects.
        let relay = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            match ws.next().await {
                Some(Ok(Message::Text(text))) => text.to_string(),
                other => panic!("expected candidate frame, got {:?}", other),
            }
        });

        let channel = open_channel(addr).await;
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let inject = events_tx.clone();
        let shutdown = Notify::new();
        let on_connected = || {};
        let on_disconnected = || {};
        let ctx = SessionContext {
            id: "test",
            shutdown: &shutdown,
            render: Arc::new(NullSink),
            on_connected: &on_connected,
            on_disconnected: &on_disconnected,
        };

        let real = "candidate:1 1 udp 2130706431 192.0.2.1 54400 typ host";
        let (outcome, frame) = tokio::join!(drive(channel, events_tx, events_rx, &ctx), async {
            inject
                .send(PeerEvent::Candidate(Some(RTCIceCandidateInit {
                    candidate: String::new(),
                    sdp_mid: None,
                    sdp_mline_index: None,
                    username_fragment: None,
                })))
                .unwrap();
            inject.send(PeerEvent::Candidate(None)).unwrap();
            inject
                .send(PeerEvent::Candidate(Some(RTCIceCandidateInit {
                    candidate: real.to_string(),
                    sdp_mid: Some("0".to_string()),
                    sdp_mline_index: Some(0),
                    username_fragment: None,
                })))
                .unwrap();
            let frame = relay.await.unwrap();
            inject
                .send(PeerEvent::StateChange(RTCPeerConnectionState::Disconnected))
                .unwrap();
            frame
        });

        assert_eq!(outcome, SessionOutcome::Restart);
        let sent: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(sent["candidate"], real);
        assert_eq!(sent["sdpMid"], "0");
    }

    #[tokio::test]
    async fn phase_mismatch_fails_the_session() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let relay = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            ws.send(Message::Text(ICE_SERVERS.into())).await.unwrap();

            match ws.next().await {
                Some(Ok(Message::Text(_))) => {}
                other => panic!("expected offer frame, got {:?}", other),
            }

            // A candidate delivered while an answer is expected is a phase
            // mismatch and must fail the session.
            ws.send(Message::Text(
                r#"{"candidate":"candidate:1 1 udp 2130706431 192.0.2.1 54400 typ host"}"#.into(),
            ))
            .await
            .unwrap();
        });

        let channel = open_channel(addr).await;
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let shutdown = Notify::new();
        let counters = Counters::new();
        let on_connected = || {};
        let on_disconnected = || {
            counters.disconnected.fetch_add(1, Ordering::SeqCst);
        };
        let ctx = SessionContext {
            id: "test",
            shutdown: &shutdown,
            render: Arc::new(NullSink),
            on_connected: &on_connected,
            on_disconnected: &on_disconnected,
        };

        let outcome = drive(channel, events_tx, events_rx, &ctx).await;
        assert_eq!(outcome, SessionOutcome::Restart);
        assert_eq!(counters.disconnected.load(Ordering::SeqCst), 1);
        relay.await.unwrap();
    }

    #[tokio::test]
    async fn termination_ends_the_session_without_offline_notice() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let relay = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            // Keep the connection open without sending anything.
            let _ = tokio::time::timeout(Duration::from_secs(5), ws.next()).await;
        });

        let channel = open_channel(addr).await;
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let shutdown = Notify::new();
        let counters = Counters::new();
        let on_connected = || {};
        let on_disconnected = || {
            counters.disconnected.fetch_add(1, Ordering::SeqCst);
        };
        let ctx = SessionContext {
            id: "test",
            shutdown: &shutdown,
            render: Arc::new(NullSink),
            on_connected: &on_connected,
            on_disconnected: &on_disconnected,
        };

        shutdown.notify_one();
        let outcome = drive(channel, events_tx, events_rx, &ctx).await;
        assert_eq!(outcome, SessionOutcome::Terminated);
        assert_eq!(counters.disconnected.load(Ordering::SeqCst), 0);
        relay.abort();
    }
}

