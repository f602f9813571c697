//! Connection diagnostics

use crate::peer::PeerConnectionState;
use crate::signaling::Role;
use tracing::{debug, info, warn};

/// Inbound transport counters of one peer connection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectionStats {
    /// Audio payload bytes received
    pub audio_bytes_received: u64,
    /// Audio RTP packets received
    pub audio_packets_received: u64,
    /// Video payload bytes received
    pub video_bytes_received: u64,
    /// Video RTP packets received
    pub video_packets_received: u64,
}

impl ConnectionStats {
    /// Bytes received across all media
    pub fn total_bytes_received(&self) -> u64 {
        self.audio_bytes_received + self.video_bytes_received
    }

    /// Packets received across all media
    pub fn total_packets_received(&self) -> u64 {
        self.audio_packets_received + self.video_packets_received
    }
}

/// Receives connection state changes and periodic stats
pub trait DiagnosticsSink: Send + Sync {
    /// Peer connection state changed
    fn connection_state_changed(&self, role: Role, state: PeerConnectionState);

    /// Periodic stats snapshot
    fn stats_reported(&self, _role: Role, _stats: &ConnectionStats) {}
}

/// Diagnostics sink that writes to `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingDiagnostics;

impl DiagnosticsSink for TracingDiagnostics {
    fn connection_state_changed(&self, role: Role, state: PeerConnectionState) {
        match state {
            PeerConnectionState::Failed => warn!(%role, %state, "Peer connection failed"),
            PeerConnectionState::Disconnected => {
                warn!(%role, %state, "Peer connection disconnected")
            }
            _ => info!(%role, %state, "Peer connection state changed"),
        }
    }

    fn stats_reported(&self, role: Role, stats: &ConnectionStats) {
        debug!(
            %role,
            audio_bytes = stats.audio_bytes_received,
            audio_packets = stats.audio_packets_received,
            video_bytes = stats.video_bytes_received,
            video_packets = stats.video_packets_received,
            "Connection stats"
        );
    }
}
