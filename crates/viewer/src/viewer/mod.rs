//! Viewer connection lifecycle
//!
//! [`ViewerConnection`] owns at most one viewer session at a time. Starting a
//! session resolves the channel, builds the peer connection and data channel,
//! then opens signaling; the offer/answer exchange continues on a background
//! task. Stopping releases everything in a fixed order.

mod negotiation;
mod session;

use crate::channels::{DataChannelMessage, MessageHandler};
use crate::config::{VideoQuality, ViewerConfig};
use crate::diagnostics::{DiagnosticsSink, TracingDiagnostics};
use crate::error::SetupStage;
use crate::media::MediaSink;
use crate::peer::{
    IceTransportPolicy, PeerConfig, PeerConnection, PeerConnectionFactory,
    RtcPeerConnectionFactory,
};
use crate::signaling::{HttpChannelProvider, Role, SignalingParams, SignalingProvider};
use crate::{Error, Result};
use negotiation::NegotiationContext;
use session::ViewerSession;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

/// Observable state of the viewer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewerState {
    /// No session has been started
    Idle,
    /// Setup done or in progress, peer not yet connected
    Negotiating,
    /// Peer connection established
    Connected,
    /// Setup, negotiation or the connection failed
    Failed,
    /// Session stopped
    Closed,
}

impl fmt::Display for ViewerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ViewerState::Idle => "idle",
            ViewerState::Negotiating => "negotiating",
            ViewerState::Connected => "connected",
            ViewerState::Failed => "failed",
            ViewerState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Move to `next` unless the viewer is idle or closed
///
/// Background tasks use this so a late event cannot revive a stopped session.
pub(crate) fn transition(state: &watch::Sender<ViewerState>, next: ViewerState) -> bool {
    state.send_if_modified(|current| {
        if matches!(current, ViewerState::Idle | ViewerState::Closed) || *current == next {
            return false;
        }
        debug!(from = %current, to = %next, "Viewer state transition");
        *current = next;
        true
    })
}

/// WebRTC viewer for one signaling channel at a time
pub struct ViewerConnection {
    provider: Arc<dyn SignalingProvider>,
    peers: Arc<dyn PeerConnectionFactory>,
    diagnostics: Arc<dyn DiagnosticsSink>,
    config: ViewerConfig,
    session: Mutex<Option<ViewerSession>>,
    pending: parking_lot::Mutex<Option<PendingStart>>,
    state: Arc<watch::Sender<ViewerState>>,
}

/// A `start_viewer` call that has not stored its session yet
struct PendingStart {
    channel_name: String,
    cancel: Arc<Notify>,
}

/// Gives the pending marker back when `start_viewer` ends or is dropped
struct PendingGuard<'a> {
    pending: &'a parking_lot::Mutex<Option<PendingStart>>,
    cancel: Arc<Notify>,
    state: &'a watch::Sender<ViewerState>,
}

impl PendingGuard<'_> {
    /// Clear the marker if it is still ours; `false` if `stop_viewer` took it
    fn finish(&self) -> bool {
        let mut pending = self.pending.lock();
        match pending.as_ref() {
            Some(starting) if Arc::ptr_eq(&starting.cancel, &self.cancel) => {
                *pending = None;
                true
            }
            _ => false,
        }
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        if self.finish() {
            warn!("Viewer start abandoned before completing");
            transition(self.state, ViewerState::Failed);
        }
    }
}

impl ViewerConnection {
    /// Create a viewer over the given provider and peer factory
    ///
    /// # Arguments
    ///
    /// * `provider` - Resolves channels and opens signaling sessions
    /// * `peers` - Builds peer connections
    /// * `config` - Viewer configuration
    pub fn new(
        provider: Arc<dyn SignalingProvider>,
        peers: Arc<dyn PeerConnectionFactory>,
        config: ViewerConfig,
    ) -> Self {
        let (state, _) = watch::channel(ViewerState::Idle);
        Self {
            provider,
            peers,
            diagnostics: Arc::new(TracingDiagnostics),
            config,
            session: Mutex::new(None),
            pending: parking_lot::Mutex::new(None),
            state: Arc::new(state),
        }
    }

    /// Create a viewer using the HTTPS control plane and webrtc-rs
    pub fn from_config(config: ViewerConfig) -> Result<Self> {
        let provider = HttpChannelProvider::new(&config)?;
        Ok(Self::new(
            Arc::new(provider),
            Arc::new(RtcPeerConnectionFactory::new()),
            config,
        ))
    }

    /// Replace the diagnostics sink
    pub fn with_diagnostics(mut self, diagnostics: Arc<dyn DiagnosticsSink>) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    /// Viewer configuration
    pub fn config(&self) -> &ViewerConfig {
        &self.config
    }

    /// Current state
    pub fn state(&self) -> ViewerState {
        *self.state.borrow()
    }

    /// Watch state changes
    pub fn subscribe_state(&self) -> watch::Receiver<ViewerState> {
        self.state.subscribe()
    }

    /// Whether a session is live
    pub async fn is_started(&self) -> bool {
        self.session.lock().await.is_some()
    }

    /// Start viewing a channel
    ///
    /// Returns once signaling is open and the handshake has been kicked off;
    /// media may not be flowing yet. Use [`wait_for_connection`] or
    /// [`subscribe_state`] to follow the negotiation.
    ///
    /// # Arguments
    ///
    /// * `sink` - Receives the first remote stream
    /// * `channel_name` - Signaling channel to join
    /// * `client_id` - Identifies this viewer to the channel
    /// * `quality` - Local capture profile
    /// * `on_remote_message` - Called for messages on channels opened by the master
    ///
    /// # Errors
    ///
    /// `AlreadyStarted` if a session is live or starting, `InvalidConfig` for
    /// empty names, `SetupFailed` naming the step that failed,
    /// `StartCancelled` if `stop_viewer` ran meanwhile. Resources acquired
    /// before a failed step are released.
    ///
    /// [`wait_for_connection`]: ViewerConnection::wait_for_connection
    /// [`subscribe_state`]: ViewerConnection::subscribe_state
    #[instrument(skip_all, fields(channel = %channel_name, client_id = %client_id))]
    pub async fn start_viewer<F>(
        &self,
        sink: Arc<dyn MediaSink>,
        channel_name: &str,
        client_id: &str,
        quality: VideoQuality,
        on_remote_message: F,
    ) -> Result<()>
    where
        F: Fn(DataChannelMessage) + Send + Sync + 'static,
    {
        if channel_name.trim().is_empty() {
            return Err(Error::InvalidConfig("channel name must not be empty".to_string()));
        }
        if client_id.trim().is_empty() {
            return Err(Error::InvalidConfig("client id must not be empty".to_string()));
        }

        let cancel = Arc::new(Notify::new());
        {
            let guard = self.session.lock().await;
            if let Some(existing) = guard.as_ref() {
                warn!(active = %existing.channel_name, "Viewer already started");
                return Err(Error::AlreadyStarted(existing.channel_name.clone()));
            }

            let mut pending = self.pending.lock();
            if let Some(starting) = pending.as_ref() {
                warn!(active = %starting.channel_name, "Viewer start already in progress");
                return Err(Error::AlreadyStarted(starting.channel_name.clone()));
            }
            *pending = Some(PendingStart {
                channel_name: channel_name.to_string(),
                cancel: Arc::clone(&cancel),
            });
            self.state.send_replace(ViewerState::Negotiating);
        }
        let pending = PendingGuard {
            pending: &self.pending,
            cancel: Arc::clone(&cancel),
            state: &self.state,
        };

        info!("Starting viewer");

        let mut session = ViewerSession::new(channel_name, client_id, quality.constraints());
        let handler: MessageHandler = Arc::new(on_remote_message);

        // Network stages run without the session lock so stop_viewer can cancel them
        let outcome = tokio::select! {
            result = self.establish(&mut session, &sink, handler) => result,
            _ = cancel.notified() => Err(Error::StartCancelled(channel_name.to_string())),
        };

        let mut guard = self.session.lock().await;
        // Losing the pending marker means stop_viewer ran while we were setting up
        let owned = pending.finish();
        let outcome = match outcome {
            Ok(()) if !owned => Err(Error::StartCancelled(channel_name.to_string())),
            other => other,
        };

        match outcome {
            Ok(()) => {
                session.media_sink = Some(sink);
                *guard = Some(session);
                info!("Viewer started, negotiating");
                Ok(())
            }
            Err(e) => {
                drop(guard);
                if owned {
                    error!("Failed to start viewer: {}", e);
                } else {
                    info!("Viewer start cancelled");
                }
                if let Err(cleanup) = session.teardown().await {
                    warn!("Cleanup after failed start: {}", cleanup);
                }
                if owned {
                    self.state.send_replace(ViewerState::Failed);
                }
                Err(e)
            }
        }
    }

    async fn establish(
        &self,
        session: &mut ViewerSession,
        sink: &Arc<dyn MediaSink>,
        on_remote_message: MessageHandler,
    ) -> Result<()> {
        debug!(
            width = session.constraints.width,
            height = session.constraints.height,
            "Local capture constraints"
        );

        let channel = self
            .provider
            .describe_channel(&session.channel_name)
            .await
            .map_err(|e| Error::setup(SetupStage::ResolveChannel, e))?;

        let endpoints = self
            .provider
            .resolve_endpoints(&channel, Role::Viewer)
            .await
            .map_err(|e| Error::setup(SetupStage::ResolveEndpoints, e))?;

        let ice_servers = self
            .provider
            .ice_servers(&channel, &endpoints, &session.client_id)
            .await
            .map_err(|e| Error::setup(SetupStage::FetchIceServers, e))?;
        if ice_servers.is_empty() {
            return Err(Error::setup(SetupStage::FetchIceServers, "no ICE servers returned"));
        }

        let (signaling_tx, signaling_rx) = mpsc::unbounded_channel();
        let params = SignalingParams {
            channel_id: channel.channel_id.clone(),
            endpoint: endpoints.wss.clone(),
            client_id: session.client_id.clone(),
            role: Role::Viewer,
            clock_offset: channel.clock_offset,
        };
        let signaling = self
            .provider
            .connect(params, signaling_tx)
            .await
            .map_err(|e| Error::setup(SetupStage::CreateSignaling, e))?;
        session.signaling = Some(Arc::clone(&signaling));

        let (peer_tx, peer_rx) = mpsc::unbounded_channel();
        let peer_config = PeerConfig {
            ice_servers,
            ice_transport_policy: IceTransportPolicy::All,
        };
        let peer = self
            .peers
            .create(&peer_config, peer_tx)
            .await
            .map_err(|e| Error::setup(SetupStage::CreatePeerConnection, e))?;
        session.peer = Some(Arc::clone(&peer));

        let data_channel = peer
            .create_data_channel(&self.config.data_channel_label)
            .await
            .map_err(|e| Error::setup(SetupStage::CreateDataChannel, e))?;
        session.data_channel = Some(data_channel);

        let ctx = NegotiationContext {
            signaling: Arc::clone(&signaling),
            peer: Arc::clone(&peer),
            sink: Arc::clone(sink),
            remote_stream: Arc::clone(&session.remote_stream),
            on_remote_message,
            diagnostics: Arc::clone(&self.diagnostics),
            state: Arc::clone(&self.state),
            deadline: self.config.negotiation_timeout(),
        };
        session.driver = Some(tokio::spawn(negotiation::drive(
            ctx,
            signaling_rx,
            peer_rx,
        )));

        signaling
            .open()
            .await
            .map_err(|e| Error::setup(SetupStage::OpenSignaling, e))?;

        if let Some(interval) = self.config.stats_interval() {
            session.stats_poll = Some(self.spawn_stats_poll(peer, interval));
        }

        Ok(())
    }

    fn spawn_stats_poll(&self, peer: Arc<dyn PeerConnection>, period: Duration) -> JoinHandle<()> {
        let diagnostics = Arc::clone(&self.diagnostics);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // First tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                match peer.stats().await {
                    Ok(stats) => diagnostics.stats_reported(Role::Viewer, &stats),
                    Err(e) => debug!("Stats unavailable: {}", e),
                }
            }
        })
    }

    /// Stop the current session
    ///
    /// Every release step is attempted even if an earlier one fails. Calling
    /// this without a live session does nothing and returns `Ok`. A
    /// `start_viewer` still in progress is cancelled; it releases what it had
    /// acquired and returns `StartCancelled`.
    ///
    /// # Example
    ///
    /// ```
    /// use livestream_viewer::{ViewerConfig, ViewerConnection, ViewerState};
    ///
    /// # tokio_test::block_on(async {
    /// let viewer = ViewerConnection::from_config(ViewerConfig::default()).unwrap();
    /// viewer.stop_viewer().await.unwrap();
    /// assert_eq!(viewer.state(), ViewerState::Idle);
    /// # });
    /// ```
    pub async fn stop_viewer(&self) -> Result<()> {
        let starting = self.pending.lock().take();
        if let Some(starting) = &starting {
            info!(channel = %starting.channel_name, "Cancelling viewer start");
            starting.cancel.notify_one();
        }

        let mut guard = self.session.lock().await;
        let Some(mut session) = guard.take() else {
            if starting.is_some() {
                self.state.send_replace(ViewerState::Closed);
            } else {
                debug!("No viewer session to stop");
            }
            return Ok(());
        };

        info!(channel = %session.channel_name, "Stopping viewer");
        let result = session.teardown().await;
        debug_assert!(session.is_released());
        self.state.send_replace(ViewerState::Closed);

        if let Err(e) = &result {
            warn!("Viewer stopped with errors: {}", e);
        }
        result
    }

    /// Send a text message to the master over the outbound data channel
    ///
    /// # Errors
    ///
    /// `NotConnected` when no session is live, `DataChannelError` if the
    /// channel refuses the message (for example before it opens).
    pub async fn send_master_message(&self, message: &str) -> Result<()> {
        let channel = {
            let guard = self.session.lock().await;
            guard.as_ref().and_then(|s| s.data_channel.clone())
        };

        let Some(channel) = channel else {
            warn!("Cannot send message, viewer is not connected");
            return Err(Error::NotConnected);
        };

        channel.send_text(message).await.map_err(|e| {
            warn!("Failed to send message to master: {}", e);
            e
        })
    }

    /// Wait until the outbound data channel accepts messages
    ///
    /// # Errors
    ///
    /// `NotConnected` when no session is live, `DataChannelError` if the
    /// channel closes before opening, `NegotiationTimedOut` after `timeout`.
    pub async fn wait_for_data_channel(&self, timeout: Duration) -> Result<()> {
        let channel = {
            let guard = self.session.lock().await;
            guard.as_ref().and_then(|s| s.data_channel.clone())
        };
        let Some(channel) = channel else {
            return Err(Error::NotConnected);
        };

        match tokio::time::timeout(timeout, channel.wait_open()).await {
            Ok(result) => result,
            Err(_) => Err(Error::NegotiationTimedOut(format!(
                "data channel '{}' not open after {:?}",
                channel.label(),
                timeout
            ))),
        }
    }

    /// Wait until the peer connection is established
    ///
    /// # Errors
    ///
    /// `NegotiationFailed` if the session fails, `NotConnected` if the viewer
    /// is idle or gets stopped, `NegotiationTimedOut` after `timeout`.
    pub async fn wait_for_connection(&self, timeout: Duration) -> Result<()> {
        let mut rx = self.state.subscribe();

        let wait = async {
            loop {
                let current = *rx.borrow_and_update();
                match current {
                    ViewerState::Connected => return Ok(()),
                    ViewerState::Failed => {
                        return Err(Error::NegotiationFailed(
                            "peer connection failed".to_string(),
                        ))
                    }
                    ViewerState::Idle | ViewerState::Closed => return Err(Error::NotConnected),
                    ViewerState::Negotiating => {}
                }
                if rx.changed().await.is_err() {
                    return Err(Error::NotConnected);
                }
            }
        };

        match tokio::time::timeout(timeout, wait).await {
            Ok(result) => result,
            Err(_) => Err(Error::NegotiationTimedOut(format!(
                "not connected after {:?}",
                timeout
            ))),
        }
    }
}
