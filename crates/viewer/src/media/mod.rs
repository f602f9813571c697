//! Media model: sinks, streams and tracks
//!
//! The viewer never renders anything itself. Remote tracks are grouped into a
//! [`MediaStream`] which is handed to the caller's [`MediaSink`] exactly once
//! per session.

pub mod rtc_track;

pub use rtc_track::RtcRemoteTrack;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Kind of media carried by a track
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    /// Audio
    Audio,
    /// Video
    Video,
}

impl fmt::Display for TrackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackKind::Audio => f.write_str("audio"),
            TrackKind::Video => f.write_str("video"),
        }
    }
}

/// A single media track
#[async_trait]
pub trait MediaTrack: Send + Sync {
    /// Track id
    fn id(&self) -> String;

    /// Track kind
    fn kind(&self) -> TrackKind;

    /// Stop the track; further reads return `None`
    fn stop(&self);

    /// Whether `stop` has been called
    fn is_stopped(&self) -> bool;

    /// Next RTP payload, or `None` once the track is stopped or ended
    async fn next_packet(&self) -> Option<Bytes>;
}

/// Group of tracks sharing a stream id
pub struct MediaStream {
    id: String,
    tracks: Mutex<Vec<Arc<dyn MediaTrack>>>,
}

impl MediaStream {
    /// Create an empty stream
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            tracks: Mutex::new(Vec::new()),
        }
    }

    /// Stream id
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Add a track to the stream
    pub fn add_track(&self, track: Arc<dyn MediaTrack>) {
        self.tracks.lock().push(track);
    }

    /// Snapshot of the stream's tracks
    pub fn tracks(&self) -> Vec<Arc<dyn MediaTrack>> {
        self.tracks.lock().clone()
    }

    /// Number of tracks
    pub fn track_count(&self) -> usize {
        self.tracks.lock().len()
    }

    /// Stop every track and empty the stream
    ///
    /// Returns the number of tracks stopped. Each track is stopped once even
    /// if this is called repeatedly.
    pub fn stop_all(&self) -> usize {
        let tracks: Vec<_> = std::mem::take(&mut *self.tracks.lock());
        for track in &tracks {
            debug!(track_id = %track.id(), kind = %track.kind(), "Stopping track");
            track.stop();
        }
        tracks.len()
    }
}

impl fmt::Debug for MediaStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaStream")
            .field("id", &self.id)
            .field("tracks", &self.track_count())
            .finish()
    }
}

/// Caller-provided rendering surface
pub trait MediaSink: Send + Sync {
    /// Whether a stream is currently bound
    fn has_source(&self) -> bool;

    /// Bind a stream, or detach with `None`
    fn set_source(&self, stream: Option<Arc<MediaStream>>);
}

/// Minimal sink that only remembers the bound stream
#[derive(Debug, Default)]
pub struct SourceSlot {
    source: Mutex<Option<Arc<MediaStream>>>,
}

impl SourceSlot {
    /// Create an empty slot
    pub fn new() -> Self {
        Self::default()
    }

    /// Currently bound stream
    pub fn source(&self) -> Option<Arc<MediaStream>> {
        self.source.lock().clone()
    }
}

impl MediaSink for SourceSlot {
    fn has_source(&self) -> bool {
        self.source.lock().is_some()
    }

    fn set_source(&self, stream: Option<Arc<MediaStream>>) {
        *self.source.lock() = stream;
    }
}
