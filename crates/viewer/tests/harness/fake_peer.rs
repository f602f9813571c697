//! Fake peer connection and data channel

use super::CallLog;
use async_trait::async_trait;
use livestream_viewer::channels::DataChannelState;
use livestream_viewer::peer::{OfferOptions, PeerConfig, PeerEventSender};
use livestream_viewer::{
    ConnectionStats, DataChannel, DataChannelMessage, Error, IceCandidate, MessageHandler,
    PeerConnection, PeerConnectionFactory, PeerEvent, Result, SessionDescription,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

/// Factory producing `FakePeer`s
pub struct FakePeerFactory {
    log: CallLog,
    fail: AtomicBool,
    data_channel_fails: AtomicBool,
    close_fails: AtomicBool,
    peers: Mutex<Vec<Arc<FakePeer>>>,
    configs: Mutex<Vec<PeerConfig>>,
}

impl FakePeerFactory {
    pub fn new(log: CallLog) -> Self {
        Self {
            log,
            fail: AtomicBool::new(false),
            data_channel_fails: AtomicBool::new(false),
            close_fails: AtomicBool::new(false),
            peers: Mutex::new(Vec::new()),
            configs: Mutex::new(Vec::new()),
        }
    }

    /// Make `create` fail
    pub fn fail_create(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }

    /// Make `create_data_channel` fail on new peers
    pub fn fail_data_channel(&self) {
        self.data_channel_fails.store(true, Ordering::SeqCst);
    }

    /// Make `close` fail on new peers
    pub fn fail_close(&self) {
        self.close_fails.store(true, Ordering::SeqCst);
    }

    pub fn created(&self) -> usize {
        self.peers.lock().len()
    }

    pub fn last_peer(&self) -> Option<Arc<FakePeer>> {
        self.peers.lock().last().cloned()
    }

    pub fn configs(&self) -> Vec<PeerConfig> {
        self.configs.lock().clone()
    }
}

#[async_trait]
impl PeerConnectionFactory for FakePeerFactory {
    async fn create(
        &self,
        config: &PeerConfig,
        events: PeerEventSender,
    ) -> Result<Arc<dyn PeerConnection>> {
        self.log.push("peers.create");
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::PeerConnectionError("injected create failure".to_string()));
        }

        let peer = Arc::new(FakePeer {
            log: self.log.clone(),
            events,
            data_channel_fails: self.data_channel_fails.load(Ordering::SeqCst),
            close_fails: self.close_fails.load(Ordering::SeqCst),
            local: Mutex::new(None),
            remote: Mutex::new(None),
            added_candidates: Mutex::new(Vec::new()),
            data_channels: Mutex::new(Vec::new()),
            offers_created: AtomicUsize::new(0),
            closes: AtomicUsize::new(0),
        });
        self.peers.lock().push(Arc::clone(&peer));
        self.configs.lock().push(config.clone());
        Ok(peer)
    }
}

/// Peer connection that records calls and lets tests raise events
pub struct FakePeer {
    log: CallLog,
    events: PeerEventSender,
    data_channel_fails: bool,
    close_fails: bool,
    local: Mutex<Option<SessionDescription>>,
    remote: Mutex<Option<SessionDescription>>,
    added_candidates: Mutex<Vec<IceCandidate>>,
    data_channels: Mutex<Vec<Arc<FakeDataChannel>>>,
    offers_created: AtomicUsize,
    closes: AtomicUsize,
}

impl FakePeer {
    /// Raise an event as if it came from the WebRTC stack
    ///
    /// Returns `false` once the viewer stopped listening.
    pub fn emit(&self, event: PeerEvent) -> bool {
        self.events.send(event).is_ok()
    }

    pub fn added_candidates(&self) -> Vec<IceCandidate> {
        self.added_candidates.lock().clone()
    }

    pub fn remote_description(&self) -> Option<SessionDescription> {
        self.remote.lock().clone()
    }

    /// Outbound data channel created by the viewer
    pub fn data_channel(&self) -> Arc<FakeDataChannel> {
        self.data_channels
            .lock()
            .first()
            .cloned()
            .expect("no data channel was created")
    }

    pub fn offers_created(&self) -> usize {
        self.offers_created.load(Ordering::SeqCst)
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PeerConnection for FakePeer {
    async fn create_offer(&self, options: OfferOptions) -> Result<SessionDescription> {
        self.log.push("peer.create_offer");
        self.offers_created.fetch_add(1, Ordering::SeqCst);
        let mut sdp = String::from("v=0\r\n");
        if options.receive_audio {
            sdp.push_str("m=audio 9 UDP/TLS/RTP/SAVPF 111\r\na=recvonly\r\n");
        }
        if options.receive_video {
            sdp.push_str("m=video 9 UDP/TLS/RTP/SAVPF 96\r\na=recvonly\r\n");
        }
        Ok(SessionDescription::offer(sdp))
    }

    async fn set_local_description(&self, description: SessionDescription) -> Result<()> {
        self.log.push("peer.set_local_description");
        *self.local.lock() = Some(description);
        Ok(())
    }

    async fn local_description(&self) -> Option<SessionDescription> {
        self.local.lock().clone()
    }

    async fn set_remote_description(&self, description: SessionDescription) -> Result<()> {
        self.log.push("peer.set_remote_description");
        *self.remote.lock() = Some(description);
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()> {
        self.log.push(format!("peer.add_ice_candidate:{}", candidate.candidate));
        if self.remote.lock().is_none() {
            return Err(Error::IceCandidateError(
                "remote description not set".to_string(),
            ));
        }
        self.added_candidates.lock().push(candidate);
        Ok(())
    }

    async fn create_data_channel(&self, label: &str) -> Result<Arc<dyn DataChannel>> {
        self.log.push(format!("peer.create_data_channel:{}", label));
        if self.data_channel_fails {
            return Err(Error::DataChannelError("injected failure".to_string()));
        }
        let channel = Arc::new(FakeDataChannel::new(label, true));
        self.data_channels.lock().push(Arc::clone(&channel));
        Ok(channel)
    }

    async fn stats(&self) -> Result<ConnectionStats> {
        Ok(ConnectionStats {
            video_bytes_received: 12_000,
            video_packets_received: 10,
            ..Default::default()
        })
    }

    async fn close(&self) -> Result<()> {
        self.log.push("peer.close");
        self.closes.fetch_add(1, Ordering::SeqCst);
        if self.close_fails {
            return Err(Error::PeerConnectionError("injected close failure".to_string()));
        }
        Ok(())
    }
}

/// In-memory data channel
pub struct FakeDataChannel {
    label: String,
    state: watch::Sender<DataChannelState>,
    sent: Mutex<Vec<String>>,
    handler: Mutex<Option<MessageHandler>>,
}

impl FakeDataChannel {
    pub fn new(label: &str, open: bool) -> Self {
        let initial = if open {
            DataChannelState::Open
        } else {
            DataChannelState::Connecting
        };
        Self {
            label: label.to_string(),
            state: watch::channel(initial).0,
            sent: Mutex::new(Vec::new()),
            handler: Mutex::new(None),
        }
    }

    /// Open the channel, or put it back to connecting
    pub fn set_open(&self, open: bool) {
        self.state.send_replace(if open {
            DataChannelState::Open
        } else {
            DataChannelState::Connecting
        });
    }

    /// Close the channel as the remote side would
    pub fn close(&self) {
        self.state.send_replace(DataChannelState::Closed);
    }

    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().clone()
    }

    pub fn has_handler(&self) -> bool {
        self.handler.lock().is_some()
    }

    /// Deliver a message to the registered handler
    pub fn deliver(&self, msg: DataChannelMessage) {
        let handler = self.handler.lock().clone();
        if let Some(handler) = handler {
            handler(msg);
        }
    }
}

#[async_trait]
impl DataChannel for FakeDataChannel {
    fn label(&self) -> &str {
        &self.label
    }

    fn is_open(&self) -> bool {
        *self.state.borrow() == DataChannelState::Open
    }

    async fn wait_open(&self) -> Result<()> {
        let mut rx = self.state.subscribe();
        let state = *rx
            .wait_for(|state| *state != DataChannelState::Connecting)
            .await
            .map_err(|_| Error::DataChannelError("channel dropped".to_string()))?;
        match state {
            DataChannelState::Open => Ok(()),
            other => Err(Error::DataChannelError(format!(
                "Data channel '{}' did not open (state: {:?})",
                self.label, other
            ))),
        }
    }

    async fn send_text(&self, text: &str) -> Result<()> {
        if !self.is_open() {
            return Err(Error::DataChannelError(format!(
                "Data channel '{}' is not open",
                self.label
            )));
        }
        self.sent.lock().push(text.to_string());
        Ok(())
    }

    fn on_message(&self, handler: MessageHandler) {
        *self.handler.lock() = Some(handler);
    }
}
