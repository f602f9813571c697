//! WebRTC viewer for managed signaling channels
//!
//! This crate joins a named signaling channel as a VIEWER, negotiates a
//! receive-only peer connection with the channel's MASTER, and hands the
//! remote media stream to a caller-provided sink.
//!
//! # Features
//!
//! - **Channel discovery**: channel id, WSS/HTTPS endpoints and ICE servers
//!   from the HTTPS control plane, with clock-skew correction
//! - **Trickle ICE**: candidates are exchanged as they are gathered; remote
//!   candidates that arrive before the answer are buffered
//! - **Data channel**: text messages to the master, callbacks for messages
//!   on channels the master opens
//! - **Deterministic teardown**: every resource is released in a fixed order
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │  ViewerConnection                                    │
//! │  ├─ SignalingProvider (control plane, HTTPS)         │
//! │  │   └─ SignalingSession (WSS, offer/answer/ICE)     │
//! │  ├─ PeerConnectionFactory                            │
//! │  │   └─ PeerConnection (webrtc-rs, recvonly A/V)     │
//! │  │       └─ DataChannel                              │
//! │  ├─ negotiation driver (one task per session)        │
//! │  └─ MediaSink ← MediaStream ← remote tracks          │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use livestream_viewer::ViewerConfig;
//!
//! let config = ViewerConfig {
//!     region: "ap-northeast-1".to_string(),
//!     ..Default::default()
//! };
//!
//! assert!(config.validate().is_ok());
//! assert_eq!(
//!     config.control_endpoint(),
//!     "https://kinesisvideo.ap-northeast-1.amazonaws.com"
//! );
//! ```
//!
//! ## Async Usage
//!
//! ```no_run
//! use livestream_viewer::{SourceSlot, VideoQuality, ViewerConfig, ViewerConnection};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # async fn example() -> livestream_viewer::Result<()> {
//! let viewer = ViewerConnection::from_config(ViewerConfig::default())?;
//! let sink = Arc::new(SourceSlot::new());
//!
//! viewer
//!     .start_viewer(sink, "my-channel", "viewer-1", VideoQuality::High, |msg| {
//!         println!("master says {:?}", msg.as_text());
//!     })
//!     .await?;
//!
//! viewer.wait_for_connection(Duration::from_secs(30)).await?;
//! viewer.send_master_message("hello").await?;
//! viewer.stop_viewer().await?;
//! # Ok(())
//! # }
//! ```

#![warn(clippy::all)]

pub mod channels;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod media;
pub mod peer;
pub mod signaling;
mod viewer;

pub use channels::{DataChannel, DataChannelMessage, MessageHandler};
pub use config::{MediaConstraints, VideoQuality, ViewerConfig};
pub use diagnostics::{ConnectionStats, DiagnosticsSink, TracingDiagnostics};
pub use error::{Error, Result, SetupStage};
pub use media::{MediaSink, MediaStream, MediaTrack, SourceSlot, TrackKind};
pub use peer::{
    IceCandidate, IceServer, PeerConnection, PeerConnectionFactory, PeerConnectionState,
    PeerEvent, SessionDescription,
};
pub use signaling::{Role, SignalingEvent, SignalingProvider, SignalingSession};
pub use viewer::{ViewerConnection, ViewerState};

/// Get the version of this crate
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
