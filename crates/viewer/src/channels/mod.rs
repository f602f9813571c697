//! Data channels to the master

pub mod data_channel;
pub mod messages;

pub use data_channel::{DataChannelState, RtcDataChannel, MAX_PENDING_MESSAGES};
pub use messages::{DataChannelMessage, MAX_MESSAGE_SIZE};

use crate::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Callback for inbound data-channel messages
pub type MessageHandler = Arc<dyn Fn(DataChannelMessage) + Send + Sync>;

/// A bidirectional data channel
#[async_trait]
pub trait DataChannel: Send + Sync {
    /// Channel label
    fn label(&self) -> &str;

    /// Whether the channel accepts messages
    fn is_open(&self) -> bool;

    /// Wait until the channel opens; fails if it closes first
    async fn wait_open(&self) -> Result<()>;

    /// Send a text message
    async fn send_text(&self, text: &str) -> Result<()>;

    /// Route inbound messages to `handler`, replacing any previous handler
    ///
    /// Messages that arrived before the first handler are delivered to it
    /// first, in arrival order.
    fn on_message(&self, handler: MessageHandler);
}
