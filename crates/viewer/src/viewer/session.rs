//! Per-session resource record and teardown

use crate::channels::DataChannel;
use crate::config::MediaConstraints;
use crate::media::{MediaSink, MediaStream};
use crate::peer::PeerConnection;
use crate::signaling::SignalingSession;
use crate::{Error, Result};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Remote stream slot shared between the session and the negotiation driver
pub(crate) type RemoteStreamSlot = Arc<Mutex<Option<Arc<MediaStream>>>>;

/// Resources of one live viewer session
pub(crate) struct ViewerSession {
    pub channel_name: String,
    pub client_id: String,
    pub constraints: MediaConstraints,
    pub media_sink: Option<Arc<dyn MediaSink>>,
    pub signaling: Option<Arc<dyn SignalingSession>>,
    pub peer: Option<Arc<dyn PeerConnection>>,
    pub data_channel: Option<Arc<dyn DataChannel>>,
    pub local_stream: Option<Arc<MediaStream>>,
    pub remote_stream: RemoteStreamSlot,
    pub stats_poll: Option<JoinHandle<()>>,
    pub driver: Option<JoinHandle<()>>,
}

impl ViewerSession {
    pub fn new(channel_name: &str, client_id: &str, constraints: MediaConstraints) -> Self {
        Self {
            channel_name: channel_name.to_string(),
            client_id: client_id.to_string(),
            constraints,
            media_sink: None,
            signaling: None,
            peer: None,
            data_channel: None,
            local_stream: None,
            remote_stream: Arc::new(Mutex::new(None)),
            stats_poll: None,
            driver: None,
        }
    }

    /// Whether every resource has been released
    pub fn is_released(&self) -> bool {
        self.media_sink.is_none()
            && self.signaling.is_none()
            && self.peer.is_none()
            && self.data_channel.is_none()
            && self.local_stream.is_none()
            && self.remote_stream.lock().is_none()
            && self.stats_poll.is_none()
            && self.driver.is_none()
    }

    /// Release every resource in order
    ///
    /// Each step only runs if its resource is still held, and every step is
    /// attempted even if an earlier one failed, so calling this again after a
    /// failure never releases anything twice.
    pub async fn teardown(&mut self) -> Result<()> {
        let mut failures = Vec::new();

        if let Some(driver) = self.driver.take() {
            driver.abort();
            match driver.await {
                Err(e) if e.is_panic() => failures.push(format!("negotiation task panicked: {}", e)),
                _ => debug!("Negotiation task stopped"),
            }
        }

        if let Some(signaling) = self.signaling.take() {
            if let Err(e) = signaling.close().await {
                warn!("Failed to close signaling session: {}", e);
                failures.push(format!("signaling: {}", e));
            }
        }

        if let Some(peer) = self.peer.take() {
            if let Err(e) = peer.close().await {
                warn!("Failed to close peer connection: {}", e);
                failures.push(format!("peer connection: {}", e));
            }
        }

        if let Some(local) = self.local_stream.take() {
            let stopped = local.stop_all();
            debug!(stopped, "Stopped local tracks");
        }

        let remote = self.remote_stream.lock().take();
        if let Some(remote) = remote {
            let stopped = remote.stop_all();
            debug!(stream_id = %remote.id(), stopped, "Stopped remote tracks");
        }

        if let Some(stats_poll) = self.stats_poll.take() {
            stats_poll.abort();
        }

        if let Some(sink) = self.media_sink.take() {
            sink.set_source(None);
        }

        // Closing the peer connection already invalidated it
        self.data_channel = None;

        if failures.is_empty() {
            Ok(())
        } else {
            Err(Error::TeardownFailed(failures.join("; ")))
        }
    }
}

impl Drop for ViewerSession {
    fn drop(&mut self) {
        // Only reached with tasks still set when a start was abandoned mid-setup
        if let Some(driver) = self.driver.take() {
            driver.abort();
        }
        if let Some(stats_poll) = self.stats_poll.take() {
            stats_poll.abort();
        }
    }
}
