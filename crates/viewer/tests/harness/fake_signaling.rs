//! Fake signaling provider and session

use super::CallLog;
use async_trait::async_trait;
use livestream_viewer::signaling::{
    ChannelDescription, ChannelEndpoints, ClockOffset, SignalingEventSender, SignalingParams,
};
use livestream_viewer::{
    Error, IceCandidate, IceServer, Result, Role, SessionDescription, SetupStage, SignalingEvent,
    SignalingProvider, SignalingSession,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// Provider returning canned channel data and `FakeSignalingSession`s
pub struct FakeProvider {
    log: CallLog,
    fail_at: Mutex<Option<SetupStage>>,
    hang_at: Mutex<Option<SetupStage>>,
    close_fails: AtomicBool,
    sessions: Mutex<Vec<Arc<FakeSignalingSession>>>,
    params: Mutex<Vec<SignalingParams>>,
}

impl FakeProvider {
    pub fn new(log: CallLog) -> Self {
        Self {
            log,
            fail_at: Mutex::new(None),
            hang_at: Mutex::new(None),
            close_fails: AtomicBool::new(false),
            sessions: Mutex::new(Vec::new()),
            params: Mutex::new(Vec::new()),
        }
    }

    /// Make the given setup stage fail
    ///
    /// Supports the stages the provider owns plus `OpenSignaling`.
    pub fn fail_at(&self, stage: SetupStage) {
        *self.fail_at.lock() = Some(stage);
    }

    /// Make the given setup stage never complete
    ///
    /// Supports the same stages as `fail_at`.
    pub fn hang_at(&self, stage: SetupStage) {
        *self.hang_at.lock() = Some(stage);
    }

    /// Let every stage complete again
    pub fn clear_hang(&self) {
        *self.hang_at.lock() = None;
    }

    /// Make `close` fail on new sessions
    pub fn fail_close(&self) {
        self.close_fails.store(true, Ordering::SeqCst);
    }

    async fn check(&self, stage: SetupStage) -> Result<()> {
        let hangs = *self.hang_at.lock() == Some(stage);
        if hangs {
            std::future::pending::<()>().await;
        }
        if *self.fail_at.lock() == Some(stage) {
            return Err(Error::HttpError(format!("injected failure at {:?}", stage)));
        }
        Ok(())
    }

    pub fn sessions(&self) -> Vec<Arc<FakeSignalingSession>> {
        self.sessions.lock().clone()
    }

    pub fn last_session(&self) -> Option<Arc<FakeSignalingSession>> {
        self.sessions.lock().last().cloned()
    }

    /// Parameters passed to `connect`
    pub fn connect_params(&self) -> Vec<SignalingParams> {
        self.params.lock().clone()
    }
}

#[async_trait]
impl SignalingProvider for FakeProvider {
    async fn describe_channel(&self, channel_name: &str) -> Result<ChannelDescription> {
        self.log.push(format!("provider.describe_channel:{}", channel_name));
        self.check(SetupStage::ResolveChannel).await?;
        Ok(ChannelDescription {
            name: channel_name.to_string(),
            channel_id: format!("arn:fake:channel/{}", channel_name),
            clock_offset: ClockOffset::from_millis(1500),
        })
    }

    async fn resolve_endpoints(
        &self,
        _channel: &ChannelDescription,
        role: Role,
    ) -> Result<ChannelEndpoints> {
        self.log.push(format!("provider.resolve_endpoints:{}", role));
        self.check(SetupStage::ResolveEndpoints).await?;
        Ok(ChannelEndpoints {
            wss: "wss://signaling.fake".to_string(),
            https: "https://signaling.fake".to_string(),
        })
    }

    async fn ice_servers(
        &self,
        _channel: &ChannelDescription,
        _endpoints: &ChannelEndpoints,
        _client_id: &str,
    ) -> Result<Vec<IceServer>> {
        self.log.push("provider.ice_servers");
        self.check(SetupStage::FetchIceServers).await?;
        Ok(vec![IceServer::stun("stun:stun.fake:443")])
    }

    async fn connect(
        &self,
        params: SignalingParams,
        events: SignalingEventSender,
    ) -> Result<Arc<dyn SignalingSession>> {
        self.log.push("provider.connect");
        self.check(SetupStage::CreateSignaling).await?;

        let session = Arc::new(FakeSignalingSession {
            log: self.log.clone(),
            events,
            open_fails: *self.fail_at.lock() == Some(SetupStage::OpenSignaling),
            open_hangs: *self.hang_at.lock() == Some(SetupStage::OpenSignaling),
            close_fails: self.close_fails.load(Ordering::SeqCst),
            closes: AtomicUsize::new(0),
            offers: Mutex::new(Vec::new()),
            candidates: Mutex::new(Vec::new()),
        });
        self.sessions.lock().push(Arc::clone(&session));
        self.params.lock().push(params);
        Ok(session)
    }
}

/// Signaling session that records what the viewer sends
pub struct FakeSignalingSession {
    log: CallLog,
    events: SignalingEventSender,
    open_fails: bool,
    open_hangs: bool,
    close_fails: bool,
    closes: AtomicUsize,
    offers: Mutex<Vec<SessionDescription>>,
    candidates: Mutex<Vec<IceCandidate>>,
}

impl FakeSignalingSession {
    /// Deliver an event as if it came from the service
    ///
    /// Returns `false` once the viewer stopped listening.
    pub fn emit(&self, event: SignalingEvent) -> bool {
        self.events.send(event).is_ok()
    }

    pub fn offers(&self) -> Vec<SessionDescription> {
        self.offers.lock().clone()
    }

    pub fn candidates(&self) -> Vec<IceCandidate> {
        self.candidates.lock().clone()
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SignalingSession for FakeSignalingSession {
    async fn open(&self) -> Result<()> {
        self.log.push("signaling.open");
        if self.open_hangs {
            std::future::pending::<()>().await;
        }
        if self.open_fails {
            return Err(Error::WebSocketError("injected open failure".to_string()));
        }
        let _ = self.events.send(SignalingEvent::Open);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.log.push("signaling.close");
        self.closes.fetch_add(1, Ordering::SeqCst);
        if self.close_fails {
            return Err(Error::WebSocketError("injected close failure".to_string()));
        }
        Ok(())
    }

    async fn send_sdp_offer(&self, offer: &SessionDescription) -> Result<()> {
        self.log.push("signaling.send_sdp_offer");
        self.offers.lock().push(offer.clone());
        Ok(())
    }

    async fn send_ice_candidate(&self, candidate: &IceCandidate) -> Result<()> {
        self.log.push("signaling.send_ice_candidate");
        self.candidates.lock().push(candidate.clone());
        Ok(())
    }
}
