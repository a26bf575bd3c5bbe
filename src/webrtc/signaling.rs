//! Signaling wire messages
//!
//! The relay protocol is phase-implicit: payloads carry no message-kind
//! tag, so the receiver classifies them by the current negotiation phase.
//! Each phase has its own decode function; a payload that does not match
//! the phase's expected shape is a negotiation error, not a silent
//! misroute.

use crate::error::Error;
use serde::{Deserialize, Serialize};
use webrtc::ice_transport::ice_candidate::RTCIceCandidateInit;
use webrtc::ice_transport::ice_server::RTCIceServer;

/// ICE server `urls` field as relays emit it: a bare string or a list.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UrlList {
    One(String),
    Many(Vec<String>),
}

impl UrlList {
    pub fn into_vec(self) -> Vec<String> {
        match self {
            UrlList::One(url) => vec![url],
            UrlList::Many(urls) => urls,
        }
    }
}

/// One ICE server descriptor from the relay's server list
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IceServerEntry {
    pub urls: UrlList,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
}

impl IceServerEntry {
    /// Convert to the peer connection configuration form.
    pub fn to_rtc(&self) -> RTCIceServer {
        RTCIceServer {
            urls: self.urls.clone().into_vec(),
            username: self.username.clone().unwrap_or_default(),
            credential: self.credential.clone().unwrap_or_default(),
            ..Default::default()
        }
    }
}

/// Session description kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpKind {
    Offer,
    Answer,
}

impl SdpKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SdpKind::Offer => "offer",
            SdpKind::Answer => "answer",
        }
    }
}

/// Session description wire form: `{"type": ..., "sdp": ...}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Description {
    #[serde(rename = "type")]
    pub kind: SdpKind,
    pub sdp: String,
}

impl Description {
    /// Wrap a local offer for transmission.
    pub fn offer(sdp: String) -> Self {
        Self {
            kind: SdpKind::Offer,
            sdp,
        }
    }
}

/// ICE candidate wire form
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateEntry {
    pub candidate: String,

    #[serde(rename = "sdpMid", default, skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,

    #[serde(
        rename = "sdpMLineIndex",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub sdp_mline_index: Option<u16>,

    #[serde(
        rename = "usernameFragment",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub username_fragment: Option<String>,
}

impl CandidateEntry {
    pub fn from_init(init: RTCIceCandidateInit) -> Self {
        Self {
            candidate: init.candidate,
            sdp_mid: init.sdp_mid,
            sdp_mline_index: init.sdp_mline_index,
            username_fragment: init.username_fragment,
        }
    }

    pub fn into_init(self) -> RTCIceCandidateInit {
        RTCIceCandidateInit {
            candidate: self.candidate,
            sdp_mid: self.sdp_mid,
            sdp_mline_index: self.sdp_mline_index,
            username_fragment: self.username_fragment,
        }
    }
}

/// Decode the relay's opening message: a list of ICE server descriptors.
pub fn decode_ice_servers(text: &str) -> Result<Vec<IceServerEntry>, Error> {
    serde_json::from_str(text)
        .map_err(|e| Error::Negotiation(format!("expected ICE server list: {}", e)))
}

/// Decode the remote session description, which must be an answer.
pub fn decode_answer(text: &str) -> Result<Description, Error> {
    let desc: Description = serde_json::from_str(text)
        .map_err(|e| Error::Negotiation(format!("expected session description: {}", e)))?;

    if desc.kind != SdpKind::Answer {
        return Err(Error::Negotiation(format!(
            "expected answer description, got {}",
            desc.kind.as_str()
        )));
    }

    Ok(desc)
}

/// Decode a remote ICE candidate. A JSON `null` or an entry with an empty
/// candidate string is the end-of-candidates sentinel and yields `None`.
pub fn decode_candidate(text: &str) -> Result<Option<CandidateEntry>, Error> {
    let entry: Option<CandidateEntry> = serde_json::from_str(text)
        .map_err(|e| Error::Negotiation(format!("expected ICE candidate: {}", e)))?;

    Ok(entry.filter(|c| !c.candidate.is_empty()))
}
