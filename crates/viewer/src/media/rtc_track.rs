//! Remote track backed by webrtc-rs

use super::{MediaTrack, TrackKind};
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::debug;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;
use webrtc::track::track_remote::TrackRemote;

/// Remote media track received from the master
pub struct RtcRemoteTrack {
    track: Arc<TrackRemote>,
    stopped: watch::Sender<bool>,
}

impl RtcRemoteTrack {
    /// Wrap a remote track
    pub fn new(track: Arc<TrackRemote>) -> Self {
        let (stopped, _) = watch::channel(false);
        Self { track, stopped }
    }

    /// Stream id the track was announced with
    pub fn stream_id(&self) -> String {
        self.track.stream_id()
    }
}

#[async_trait]
impl MediaTrack for RtcRemoteTrack {
    fn id(&self) -> String {
        self.track.id()
    }

    fn kind(&self) -> TrackKind {
        match self.track.kind() {
            RTPCodecType::Audio => TrackKind::Audio,
            _ => TrackKind::Video,
        }
    }

    fn stop(&self) {
        self.stopped.send_replace(true);
    }

    fn is_stopped(&self) -> bool {
        *self.stopped.borrow()
    }

    async fn next_packet(&self) -> Option<Bytes> {
        let mut stopped = self.stopped.subscribe();
        if *stopped.borrow_and_update() {
            return None;
        }

        tokio::select! {
            _ = stopped.changed() => None,
            result = self.track.read_rtp() => match result {
                Ok((packet, _attributes)) => Some(packet.payload),
                Err(e) => {
                    debug!(track_id = %self.track.id(), "Remote track ended: {}", e);
                    None
                }
            },
        }
    }
}
