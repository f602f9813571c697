//! Fake media tracks and sink

use async_trait::async_trait;
use bytes::Bytes;
use livestream_viewer::{MediaSink, MediaStream, MediaTrack, TrackKind};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// Track that counts how often it was stopped
pub struct FakeTrack {
    id: String,
    kind: TrackKind,
    stopped: AtomicBool,
    stops: AtomicUsize,
}

impl FakeTrack {
    pub fn new(id: &str, kind: TrackKind) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_string(),
            kind,
            stopped: AtomicBool::new(false),
            stops: AtomicUsize::new(0),
        })
    }

    pub fn stop_count(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MediaTrack for FakeTrack {
    fn id(&self) -> String {
        self.id.clone()
    }

    fn kind(&self) -> TrackKind {
        self.kind
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        self.stops.fetch_add(1, Ordering::SeqCst);
    }

    fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    async fn next_packet(&self) -> Option<Bytes> {
        if self.is_stopped() {
            None
        } else {
            Some(Bytes::from_static(&[0x80, 0x60, 0x00, 0x01]))
        }
    }
}

/// Sink that records every binding
#[derive(Default)]
pub struct RecordingSink {
    source: Mutex<Option<Arc<MediaStream>>>,
    binds: AtomicUsize,
    detaches: AtomicUsize,
}

impl RecordingSink {
    pub fn source(&self) -> Option<Arc<MediaStream>> {
        self.source.lock().clone()
    }

    /// Give the sink a source of its own without counting a bind
    pub fn preset_source(&self, stream: Arc<MediaStream>) {
        *self.source.lock() = Some(stream);
    }

    /// Number of `set_source(Some(..))` calls
    pub fn bind_count(&self) -> usize {
        self.binds.load(Ordering::SeqCst)
    }

    /// Number of `set_source(None)` calls
    pub fn detach_count(&self) -> usize {
        self.detaches.load(Ordering::SeqCst)
    }
}

impl MediaSink for RecordingSink {
    fn has_source(&self) -> bool {
        self.source.lock().is_some()
    }

    fn set_source(&self, stream: Option<Arc<MediaStream>>) {
        if stream.is_some() {
            self.binds.fetch_add(1, Ordering::SeqCst);
        } else {
            self.detaches.fetch_add(1, Ordering::SeqCst);
        }
        *self.source.lock() = stream;
    }
}
