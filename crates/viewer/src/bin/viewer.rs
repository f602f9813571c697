//! Live-stream viewer binary entry point
//!
//! Joins a signaling channel as a viewer, counts the media it receives, and
//! logs messages the master sends over data channels.
//!
//! # Usage
//!
//! ```bash
//! # Watch a channel in the default region
//! cargo run --bin livestream_viewer -- --channel my-channel
//!
//! # HD profile, custom region, greet the master once connected
//! cargo run --bin livestream_viewer -- \
//!   --channel my-channel \
//!   --region ap-northeast-1 \
//!   --hd \
//!   --message "hello"
//!
//! # Load settings from a TOML file
//! cargo run --bin livestream_viewer -- --channel my-channel --config viewer.toml
//! ```

use anyhow::Context;
use clap::Parser;
use livestream_viewer::{
    DataChannelMessage, MediaSink, MediaStream, VideoQuality, ViewerConfig, ViewerConnection,
};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Live-stream viewer
///
/// Receives audio and video from the master of a signaling channel.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Signaling channel name
    #[arg(long, env = "VIEWER_CHANNEL")]
    channel: String,

    /// Client id (random when omitted)
    #[arg(long, env = "VIEWER_CLIENT_ID")]
    client_id: Option<String>,

    /// Service region
    #[arg(long, env = "VIEWER_REGION")]
    region: Option<String>,

    /// Control-plane endpoint override
    #[arg(long, env = "VIEWER_CONTROL_ENDPOINT")]
    control_endpoint: Option<String>,

    /// Request the 1280x720 capture profile
    #[arg(long, default_value_t = false, env = "VIEWER_HD")]
    hd: bool,

    /// TOML configuration file
    #[arg(long, env = "VIEWER_CONFIG")]
    config: Option<PathBuf>,

    /// Bearer token for the control plane
    #[arg(long, env = "VIEWER_AUTH_TOKEN")]
    auth_token: Option<String>,

    /// Seconds to wait for the peer connection
    #[arg(long, env = "VIEWER_NEGOTIATION_TIMEOUT_SECS")]
    negotiation_timeout_secs: Option<u64>,

    /// Text message to send to the master once connected
    #[arg(long, env = "VIEWER_MESSAGE")]
    message: Option<String>,

    /// Seconds between receive counter reports
    #[arg(long, default_value_t = 5, env = "VIEWER_REPORT_INTERVAL_SECS")]
    report_interval_secs: u64,
}

impl Args {
    fn load_config(&self) -> anyhow::Result<ViewerConfig> {
        let mut config = match &self.config {
            Some(path) => ViewerConfig::from_file(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => ViewerConfig::default(),
        };

        if let Some(region) = &self.region {
            config.region = region.clone();
        }
        if let Some(endpoint) = &self.control_endpoint {
            config.control_endpoint = Some(endpoint.clone());
        }
        if let Some(token) = &self.auth_token {
            config.auth_token = Some(token.clone());
        }
        if let Some(secs) = self.negotiation_timeout_secs {
            config.negotiation_timeout_secs = Some(secs);
        }

        config.validate()?;
        Ok(config)
    }
}

/// Sink that drains every bound track and counts what arrives
#[derive(Default)]
struct PacketCounter {
    source: Mutex<Option<Arc<MediaStream>>>,
    readers: Mutex<HashSet<String>>,
    packets: Arc<AtomicU64>,
    bytes: Arc<AtomicU64>,
}

impl PacketCounter {
    /// Start a reader for every track not read yet
    fn spawn_readers(&self) {
        let Some(stream) = self.source.lock().clone() else {
            return;
        };

        for track in stream.tracks() {
            if !self.readers.lock().insert(track.id()) {
                continue;
            }

            info!(track_id = %track.id(), kind = %track.kind(), "Reading remote track");
            let packets = Arc::clone(&self.packets);
            let bytes = Arc::clone(&self.bytes);
            tokio::spawn(async move {
                while let Some(payload) = track.next_packet().await {
                    packets.fetch_add(1, Ordering::Relaxed);
                    bytes.fetch_add(payload.len() as u64, Ordering::Relaxed);
                }
            });
        }
    }
}

impl MediaSink for PacketCounter {
    fn has_source(&self) -> bool {
        self.source.lock().is_some()
    }

    fn set_source(&self, stream: Option<Arc<MediaStream>>) {
        if stream.is_none() {
            self.readers.lock().clear();
        }
        *self.source.lock() = stream;
        self.spawn_readers();
    }
}

fn log_remote_message(msg: DataChannelMessage) {
    match msg.as_text() {
        Some(text) => info!(message = %text, "Message from master"),
        None => info!(bytes = msg.size(), "Binary message from master"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let args = Args::parse();
    let config = args.load_config()?;
    let client_id = args
        .client_id
        .clone()
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let wait_timeout = config
        .negotiation_timeout()
        .unwrap_or(Duration::from_secs(30));

    info!(
        channel = %args.channel,
        client_id = %client_id,
        region = %config.region,
        "Starting live-stream viewer"
    );

    let viewer = ViewerConnection::from_config(config)?;
    let sink = Arc::new(PacketCounter::default());

    viewer
        .start_viewer(
            sink.clone(),
            &args.channel,
            &client_id,
            VideoQuality::from(args.hd),
            log_remote_message,
        )
        .await?;

    if let Err(e) = viewer.wait_for_connection(wait_timeout).await {
        warn!("Viewer did not connect: {}", e);
        viewer.stop_viewer().await?;
        return Err(e.into());
    }
    info!("Connected to master");

    if let Some(message) = &args.message {
        // The data channel may open slightly after the peer connection
        let sent = match viewer.wait_for_data_channel(wait_timeout).await {
            Ok(()) => viewer.send_master_message(message).await,
            Err(e) => Err(e),
        };
        if let Err(e) = sent {
            warn!("Failed to send message: {}", e);
        }
    }

    let mut report = tokio::time::interval(Duration::from_secs(args.report_interval_secs.max(1)));
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal");
                break;
            }
            _ = report.tick() => {
                sink.spawn_readers();
                info!(
                    state = %viewer.state(),
                    packets = sink.packets.load(Ordering::Relaxed),
                    bytes = sink.bytes.load(Ordering::Relaxed),
                    "Receive counters"
                );
            }
        }
    }

    viewer.stop_viewer().await?;
    info!("Viewer stopped");
    Ok(())
}

fn init_tracing() {
    // Initialize tracing with EnvFilter for RUST_LOG support
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info,livestream_viewer=debug"))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
