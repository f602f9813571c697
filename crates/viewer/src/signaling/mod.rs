//! Signaling channel access
//!
//! A [`SignalingProvider`] resolves a named channel into everything needed to
//! negotiate with its master: the channel id, the endpoints for the viewer
//! role, ICE servers, and finally a live [`SignalingSession`]. Session events
//! arrive on the sender given to [`SignalingProvider::connect`].

pub mod client;
pub mod http;
pub mod protocol;

pub use client::WsSignalingSession;
pub use http::HttpChannelProvider;

use crate::peer::{IceCandidate, IceServer, SessionDescription};
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Format of the `X-Amz-Date` header and query parameter
pub const AMZ_DATE_FORMAT: &str = "%Y%m%dT%H%M%SZ";

/// Channel role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    /// Publishes media
    Master,
    /// Receives media
    Viewer,
}

impl Role {
    /// Wire name of the role
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Master => "MASTER",
            Role::Viewer => "VIEWER",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Difference between the service clock and the local clock
///
/// Computed once per channel from the service's `Date` response header and
/// applied to every timestamp the viewer sends afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ClockOffset {
    millis: i64,
}

impl ClockOffset {
    /// Offset of `millis` milliseconds (positive when the service is ahead)
    pub fn from_millis(millis: i64) -> Self {
        Self { millis }
    }

    /// Offset between a server timestamp and the local time it was observed at
    pub fn between(server: DateTime<Utc>, local: DateTime<Utc>) -> Self {
        Self {
            millis: (server - local).num_milliseconds(),
        }
    }

    /// Offset from an HTTP `Date` header value, zero if it cannot be parsed
    pub fn from_http_date(header: &str, local: DateTime<Utc>) -> Self {
        match DateTime::parse_from_rfc2822(header) {
            Ok(server) => Self::between(server.with_timezone(&Utc), local),
            Err(_) => Self::default(),
        }
    }

    /// Offset in milliseconds
    pub fn as_millis(&self) -> i64 {
        self.millis
    }

    /// Apply the offset to a local timestamp
    pub fn correct(&self, local: DateTime<Utc>) -> DateTime<Utc> {
        local + ChronoDuration::milliseconds(self.millis)
    }

    /// Corrected current time
    pub fn now(&self) -> DateTime<Utc> {
        self.correct(Utc::now())
    }

    /// Corrected current time in `X-Amz-Date` format
    pub fn amz_date(&self) -> String {
        self.now().format(AMZ_DATE_FORMAT).to_string()
    }
}

/// Resolved signaling channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelDescription {
    /// Channel name
    pub name: String,
    /// Channel identifier (ARN)
    pub channel_id: String,
    /// Clock offset observed while describing the channel
    pub clock_offset: ClockOffset,
}

/// Endpoints of a channel for one role
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelEndpoints {
    /// Secure websocket endpoint
    pub wss: String,
    /// HTTPS endpoint
    pub https: String,
}

/// Parameters for opening a signaling session
#[derive(Debug, Clone)]
pub struct SignalingParams {
    /// Channel identifier
    pub channel_id: String,
    /// Websocket endpoint
    pub endpoint: String,
    /// Client id of this viewer
    pub client_id: String,
    /// Role of this side
    pub role: Role,
    /// Clock offset for request timestamps
    pub clock_offset: ClockOffset,
}

/// Events raised by a signaling session
#[derive(Debug, Clone, PartialEq)]
pub enum SignalingEvent {
    /// Session is open and ready to carry messages
    Open,
    /// Master answered the offer
    SdpAnswer(SessionDescription),
    /// Master sent an ICE candidate
    IceCandidate(IceCandidate),
    /// Session closed
    Close,
    /// Service reported an error
    Error(String),
}

/// Sender half for signaling events
pub type SignalingEventSender = mpsc::UnboundedSender<SignalingEvent>;

/// A live signaling session
#[async_trait]
pub trait SignalingSession: Send + Sync {
    /// Open the session; `SignalingEvent::Open` follows once ready
    async fn open(&self) -> Result<()>;

    /// Close the session
    async fn close(&self) -> Result<()>;

    /// Send an SDP offer to the master
    async fn send_sdp_offer(&self, offer: &SessionDescription) -> Result<()>;

    /// Send a local ICE candidate to the master
    async fn send_ice_candidate(&self, candidate: &IceCandidate) -> Result<()>;
}

/// Control plane of the signaling service
#[async_trait]
pub trait SignalingProvider: Send + Sync {
    /// Resolve a channel name
    async fn describe_channel(&self, channel_name: &str) -> Result<ChannelDescription>;

    /// Resolve the channel endpoints for `role`
    async fn resolve_endpoints(
        &self,
        channel: &ChannelDescription,
        role: Role,
    ) -> Result<ChannelEndpoints>;

    /// ICE servers for the channel, STUN first
    async fn ice_servers(
        &self,
        channel: &ChannelDescription,
        endpoints: &ChannelEndpoints,
        client_id: &str,
    ) -> Result<Vec<IceServer>>;

    /// Construct (but do not open) a signaling session
    async fn connect(
        &self,
        params: SignalingParams,
        events: SignalingEventSender,
    ) -> Result<Arc<dyn SignalingSession>>;
}
