//! webrtc-rs backed data channel

use super::messages::{DataChannelMessage, MAX_MESSAGE_SIZE};
use super::{DataChannel, MessageHandler};
use crate::{Error, Result};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, warn};
use webrtc::data_channel::data_channel_state::RTCDataChannelState;
use webrtc::data_channel::RTCDataChannel;

/// Data channel state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataChannelState {
    /// Channel is being created
    Connecting,
    /// Channel is open and ready for messages
    Open,
    /// Channel is closing
    Closing,
    /// Channel is closed
    Closed,
}

impl From<RTCDataChannelState> for DataChannelState {
    fn from(state: RTCDataChannelState) -> Self {
        match state {
            RTCDataChannelState::Open => DataChannelState::Open,
            RTCDataChannelState::Closing => DataChannelState::Closing,
            RTCDataChannelState::Closed => DataChannelState::Closed,
            _ => DataChannelState::Connecting,
        }
    }
}

/// Messages held until a handler is registered
pub const MAX_PENDING_MESSAGES: usize = 256;

#[derive(Default)]
struct Counters {
    bytes_sent: AtomicU64,
    bytes_received: AtomicU64,
    messages_sent: AtomicU64,
    messages_received: AtomicU64,
}

/// Inbound delivery: buffered until a handler is set
#[derive(Default)]
struct Inbound {
    handler: Option<MessageHandler>,
    pending: Vec<DataChannelMessage>,
}

/// Wrapper around an `RTCDataChannel`
///
/// Used both for the outbound channel created by the viewer and for channels
/// opened by the master. The webrtc read loop starts as soon as the channel
/// is announced, so inbound messages are captured from construction and held
/// until [`DataChannel::on_message`] registers a handler.
pub struct RtcDataChannel {
    label: String,
    rtc_channel: Arc<RTCDataChannel>,
    state: Arc<watch::Sender<DataChannelState>>,
    inbound: Arc<Mutex<Inbound>>,
    counters: Arc<Counters>,
}

impl RtcDataChannel {
    /// Wrap an `RTCDataChannel` and start tracking its state and messages
    pub fn new(rtc_channel: Arc<RTCDataChannel>) -> Self {
        let label = rtc_channel.label().to_string();
        let (state, _) = watch::channel(DataChannelState::from(rtc_channel.ready_state()));

        let channel = Self {
            label,
            rtc_channel,
            state: Arc::new(state),
            inbound: Arc::new(Mutex::new(Inbound::default())),
            counters: Arc::new(Counters::default()),
        };
        channel.setup_state_handler();
        channel.setup_message_handler();
        channel
    }

    fn setup_state_handler(&self) {
        let state = Arc::clone(&self.state);
        let label = self.label.clone();
        self.rtc_channel.on_open(Box::new(move || {
            debug!("Data channel '{}' opened", label);
            state.send_replace(DataChannelState::Open);
            Box::pin(async {})
        }));

        let state = Arc::clone(&self.state);
        let label = self.label.clone();
        self.rtc_channel.on_close(Box::new(move || {
            debug!("Data channel '{}' closed", label);
            state.send_replace(DataChannelState::Closed);
            Box::pin(async {})
        }));

        let label = self.label.clone();
        self.rtc_channel.on_error(Box::new(move |err| {
            error!("Data channel '{}' error: {}", label, err);
            Box::pin(async {})
        }));
    }

    fn setup_message_handler(&self) {
        let inbound = Arc::clone(&self.inbound);
        let counters = Arc::clone(&self.counters);
        let label = self.label.clone();

        self.rtc_channel.on_message(Box::new(move |msg| {
            Self::dispatch(&inbound, &counters, &label, msg.data, msg.is_string);
            Box::pin(async {})
        }));
    }

    fn dispatch(
        inbound: &Mutex<Inbound>,
        counters: &Counters,
        label: &str,
        data: Bytes,
        is_string: bool,
    ) {
        let len = data.len();
        counters
            .bytes_received
            .fetch_add(len as u64, Ordering::Relaxed);
        counters.messages_received.fetch_add(1, Ordering::Relaxed);

        let parsed = DataChannelMessage::from_payload(data, is_string);
        if parsed.exceeds_max_size() {
            warn!("Dropping oversized message on channel '{}': {} bytes", label, len);
            return;
        }

        let handler = {
            let mut inbound = inbound.lock();
            match inbound.handler.clone() {
                Some(handler) => handler,
                None if inbound.pending.len() < MAX_PENDING_MESSAGES => {
                    debug!("Holding message on channel '{}' until a handler is set", label);
                    inbound.pending.push(parsed);
                    return;
                }
                None => {
                    warn!("No handler on channel '{}', dropping message", label);
                    return;
                }
            }
        };

        debug!("Received {} bytes on data channel '{}'", len, label);
        handler(parsed);
    }

    /// Current channel state
    pub fn state(&self) -> DataChannelState {
        *self.state.borrow()
    }

    /// Messages received before a handler was registered
    pub fn pending_messages(&self) -> usize {
        self.inbound.lock().pending.len()
    }

    /// Total bytes sent
    pub fn bytes_sent(&self) -> u64 {
        self.counters.bytes_sent.load(Ordering::Relaxed)
    }

    /// Total bytes received
    pub fn bytes_received(&self) -> u64 {
        self.counters.bytes_received.load(Ordering::Relaxed)
    }

    /// Messages sent count
    pub fn messages_sent(&self) -> u64 {
        self.counters.messages_sent.load(Ordering::Relaxed)
    }

    /// Messages received count
    pub fn messages_received(&self) -> u64 {
        self.counters.messages_received.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl DataChannel for RtcDataChannel {
    fn label(&self) -> &str {
        &self.label
    }

    async fn send_text(&self, text: &str) -> Result<()> {
        if text.len() > MAX_MESSAGE_SIZE {
            return Err(Error::DataChannelError(format!(
                "Message size {} exceeds maximum {} bytes",
                text.len(),
                MAX_MESSAGE_SIZE
            )));
        }

        let state = self.state();
        if state != DataChannelState::Open {
            return Err(Error::DataChannelError(format!(
                "Data channel '{}' is not open (state: {:?})",
                self.label, state
            )));
        }

        self.rtc_channel
            .send_text(text.to_string())
            .await
            .map_err(|e| Error::DataChannelError(format!("Failed to send message: {}", e)))?;

        self.counters
            .bytes_sent
            .fetch_add(text.len() as u64, Ordering::Relaxed);
        self.counters.messages_sent.fetch_add(1, Ordering::Relaxed);

        debug!("Sent {} bytes on data channel '{}'", text.len(), self.label);

        Ok(())
    }

    fn is_open(&self) -> bool {
        self.state() == DataChannelState::Open
    }

    async fn wait_open(&self) -> Result<()> {
        let mut rx = self.state.subscribe();
        let state = *rx
            .wait_for(|state| *state != DataChannelState::Connecting)
            .await
            .map_err(|_| Error::DataChannelError(format!("Data channel '{}' dropped", self.label)))?;

        match state {
            DataChannelState::Open => Ok(()),
            other => Err(Error::DataChannelError(format!(
                "Data channel '{}' did not open (state: {:?})",
                self.label, other
            ))),
        }
    }

    fn on_message(&self, handler: MessageHandler) {
        // Replay held messages before the handler becomes visible to the read loop
        let mut inbound = self.inbound.lock();
        let pending = std::mem::take(&mut inbound.pending);
        if !pending.is_empty() {
            debug!(
                count = pending.len(),
                "Delivering held messages on channel '{}'", self.label
            );
        }
        for msg in pending {
            handler(msg);
        }
        inbound.handler = Some(handler);
    }
}
