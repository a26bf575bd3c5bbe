//! WebSocket signaling channel
//!
//! Wraps a single client WebSocket connection to the relay. Transport
//! errors are converted to a close at this layer; retrying is the
//! orchestrator's responsibility.

use crate::error::Error;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use log::debug;
use serde::Serialize;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Inbound event from the relay
#[derive(Debug)]
pub enum ChannelEvent {
    /// A text message payload
    Message(String),
    /// The connection closed, cleanly or not
    Closed,
}

/// Duplex JSON-text message channel to the signaling relay
pub struct SignalingChannel {
    write: SplitSink<WsStream, Message>,
    read: SplitStream<WsStream>,
    open: bool,
}

impl SignalingChannel {
    /// Open a connection to the relay at the given URI.
    pub async fn open(uri: &str) -> Result<Self, Error> {
        let (stream, _response) = connect_async(uri)
            .await
            .map_err(|e| Error::Transport(format!("failed to connect to {}: {}", uri, e)))?;

        let (write, read) = stream.split();
        Ok(Self {
            write,
            read,
            open: true,
        })
    }

    /// Serialize a payload as JSON and send it as one text message.
    pub async fn send_json<T: Serialize>(&mut self, payload: &T) -> Result<(), Error> {
        if !self.open {
            return Err(Error::Transport(
                "send on closed signaling channel".to_string(),
            ));
        }

        let text = serde_json::to_string(payload)
            .map_err(|e| Error::Transport(format!("failed to encode message: {}", e)))?;

        self.write
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| {
                self.open = false;
                Error::Transport(format!("failed to send message: {}", e))
            })
    }

    /// Receive the next text message. Errors and close frames both surface
    /// as [`ChannelEvent::Closed`]; non-text frames are skipped.
    pub async fn recv(&mut self) -> ChannelEvent {
        if !self.open {
            return ChannelEvent::Closed;
        }

        loop {
            match self.read.next().await {
                Some(Ok(Message::Text(text))) => return ChannelEvent::Message(text.to_string()),
                Some(Ok(Message::Ping(payload))) => {
                    let _ = self.write.send(Message::Pong(payload)).await;
                }
                Some(Ok(Message::Close(_))) | None => {
                    self.open = false;
                    return ChannelEvent::Closed;
                }
                Some(Ok(other)) => {
                    debug!("ignoring non-text signaling frame: {:?}", other);
                }
                Some(Err(e)) => {
                    debug!("signaling transport error: {}", e);
                    self.open = false;
                    return ChannelEvent::Closed;
                }
            }
        }
    }

    /// Close the channel. Idempotent; the close frame is best-effort.
    pub async fn close(&mut self) {
        if !self.open {
            return;
        }
        self.open = false;
        let _ = self.write.send(Message::Close(None)).await;
    }
}
