//! Peer connection abstraction
//!
//! `ViewerConnection` drives negotiation through the [`PeerConnection`] trait.
//! Events raised by the connection (local ICE candidates, remote tracks,
//! remote data channels, state changes) are delivered on the event sender
//! handed to [`PeerConnectionFactory::create`], so the negotiation driver
//! consumes them in order from a single task.

pub mod rtc;

pub use rtc::{RtcPeerConnection, RtcPeerConnectionFactory};

use crate::channels::DataChannel;
use crate::diagnostics::ConnectionStats;
use crate::media::MediaTrack;
use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;

/// SDP description type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    /// Offer
    Offer,
    /// Answer
    Answer,
}

/// SDP session description
///
/// Serialized as `{"type": "offer"|"answer", "sdp": "..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    /// Description type
    #[serde(rename = "type")]
    pub sdp_type: SdpType,
    /// SDP body
    pub sdp: String,
}

impl SessionDescription {
    /// Create an offer description
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: SdpType::Offer,
            sdp: sdp.into(),
        }
    }

    /// Create an answer description
    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: SdpType::Answer,
            sdp: sdp.into(),
        }
    }
}

/// ICE candidate in its JSON form
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidate {
    /// Candidate attribute line
    pub candidate: String,
    /// Media stream identification tag
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,
    /// Index of the media description
    #[serde(rename = "sdpMLineIndex", default, skip_serializing_if = "Option::is_none")]
    pub sdp_m_line_index: Option<u16>,
    /// ICE username fragment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username_fragment: Option<String>,
}

/// STUN or TURN server
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct IceServer {
    /// Server URLs (stun:, turn:, turns:)
    pub urls: Vec<String>,
    /// TURN username
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// TURN credential
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
}

impl IceServer {
    /// STUN server without credentials
    pub fn stun(url: impl Into<String>) -> Self {
        Self {
            urls: vec![url.into()],
            ..Default::default()
        }
    }
}

/// Which candidates ICE may use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IceTransportPolicy {
    /// Host, reflexive and relay candidates
    #[default]
    All,
    /// Relay candidates only
    Relay,
}

/// Peer connection construction parameters
#[derive(Debug, Clone, Default)]
pub struct PeerConfig {
    /// ICE servers, STUN first
    pub ice_servers: Vec<IceServer>,
    /// ICE transport policy
    pub ice_transport_policy: IceTransportPolicy,
}

/// What the offer asks the remote side to send
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OfferOptions {
    /// Request an audio stream
    pub receive_audio: bool,
    /// Request a video stream
    pub receive_video: bool,
}

impl OfferOptions {
    /// Request both audio and video
    pub fn receive_all() -> Self {
        Self {
            receive_audio: true,
            receive_video: true,
        }
    }
}

/// Peer connection state as reported by the ICE/DTLS transports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerConnectionState {
    /// Created, nothing started
    New,
    /// Transports connecting
    Connecting,
    /// Transports connected
    Connected,
    /// Connectivity lost, may recover
    Disconnected,
    /// Connectivity failed
    Failed,
    /// Connection closed
    Closed,
}

impl fmt::Display for PeerConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PeerConnectionState::New => "new",
            PeerConnectionState::Connecting => "connecting",
            PeerConnectionState::Connected => "connected",
            PeerConnectionState::Disconnected => "disconnected",
            PeerConnectionState::Failed => "failed",
            PeerConnectionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Events raised by a peer connection
pub enum PeerEvent {
    /// Local candidate gathered; `None` once gathering is complete
    IceCandidate(Option<IceCandidate>),
    /// Remote media track arrived
    Track {
        /// The remote track
        track: Arc<dyn MediaTrack>,
        /// Id of the stream the track belongs to
        stream_id: String,
    },
    /// Remote side opened a data channel
    DataChannel(Arc<dyn DataChannel>),
    /// Connection state changed
    ConnectionStateChange(PeerConnectionState),
}

impl fmt::Debug for PeerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PeerEvent::IceCandidate(c) => f.debug_tuple("IceCandidate").field(c).finish(),
            PeerEvent::Track { track, stream_id } => f
                .debug_struct("Track")
                .field("track_id", &track.id())
                .field("kind", &track.kind())
                .field("stream_id", stream_id)
                .finish(),
            PeerEvent::DataChannel(dc) => f.debug_tuple("DataChannel").field(&dc.label()).finish(),
            PeerEvent::ConnectionStateChange(s) => {
                f.debug_tuple("ConnectionStateChange").field(s).finish()
            }
        }
    }
}

/// Sender half for peer events
pub type PeerEventSender = mpsc::UnboundedSender<PeerEvent>;

/// One WebRTC peer connection
#[async_trait]
pub trait PeerConnection: Send + Sync {
    /// Create an SDP offer
    async fn create_offer(&self, options: OfferOptions) -> Result<SessionDescription>;

    /// Apply a local description
    async fn set_local_description(&self, description: SessionDescription) -> Result<()>;

    /// Current local description, including gathered candidates
    async fn local_description(&self) -> Option<SessionDescription>;

    /// Apply the remote description
    async fn set_remote_description(&self, description: SessionDescription) -> Result<()>;

    /// Add a remote ICE candidate
    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()>;

    /// Create an ordered, reliable outbound data channel
    async fn create_data_channel(&self, label: &str) -> Result<Arc<dyn DataChannel>>;

    /// Snapshot of transport statistics
    async fn stats(&self) -> Result<ConnectionStats>;

    /// Close the connection
    async fn close(&self) -> Result<()>;
}

/// Builds peer connections
#[async_trait]
pub trait PeerConnectionFactory: Send + Sync {
    /// Create a peer connection that reports its events on `events`
    async fn create(
        &self,
        config: &PeerConfig,
        events: PeerEventSender,
    ) -> Result<Arc<dyn PeerConnection>>;
}
