//! Offer/answer and ICE exchange driver
//!
//! One task per session consumes signaling and peer events in arrival order.
//! It owns the offer flag and the buffer of remote candidates that arrived
//! before the answer, so no locking is needed for either.

use super::session::RemoteStreamSlot;
use super::{transition, ViewerState};
use crate::channels::MessageHandler;
use crate::diagnostics::DiagnosticsSink;
use crate::media::{MediaSink, MediaStream, MediaTrack};
use crate::peer::{
    IceCandidate, OfferOptions, PeerConnection, PeerConnectionState, PeerEvent,
    SessionDescription,
};
use crate::signaling::{Role, SignalingEvent, SignalingSession};
use crate::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

/// Everything the driver needs from the session
pub(crate) struct NegotiationContext {
    pub signaling: Arc<dyn SignalingSession>,
    pub peer: Arc<dyn PeerConnection>,
    pub sink: Arc<dyn MediaSink>,
    pub remote_stream: RemoteStreamSlot,
    pub on_remote_message: MessageHandler,
    pub diagnostics: Arc<dyn DiagnosticsSink>,
    pub state: Arc<watch::Sender<ViewerState>>,
    pub deadline: Option<Duration>,
}

struct Negotiator {
    ctx: NegotiationContext,
    offer_sent: bool,
    remote_description_set: bool,
    pending_candidates: Vec<IceCandidate>,
}

/// Run until both event streams end or the task is aborted
pub(crate) async fn drive(
    ctx: NegotiationContext,
    mut signaling_rx: mpsc::UnboundedReceiver<SignalingEvent>,
    mut peer_rx: mpsc::UnboundedReceiver<PeerEvent>,
) {
    let mut deadline_armed = ctx.deadline.is_some();
    let deadline = tokio::time::sleep(ctx.deadline.unwrap_or_default());
    tokio::pin!(deadline);

    let mut negotiator = Negotiator {
        ctx,
        offer_sent: false,
        remote_description_set: false,
        pending_candidates: Vec::new(),
    };

    let mut signaling_done = false;
    let mut peer_done = false;

    while !(signaling_done && peer_done) {
        tokio::select! {
            event = signaling_rx.recv(), if !signaling_done => match event {
                Some(event) => negotiator.on_signaling_event(event).await,
                None => signaling_done = true,
            },
            event = peer_rx.recv(), if !peer_done => match event {
                Some(event) => negotiator.on_peer_event(event).await,
                None => peer_done = true,
            },
            _ = &mut deadline, if deadline_armed => {
                deadline_armed = false;
                negotiator.on_deadline();
            }
        }
    }

    debug!("Negotiation driver finished");
}

impl Negotiator {
    async fn on_signaling_event(&mut self, event: SignalingEvent) {
        match event {
            SignalingEvent::Open => {
                if self.offer_sent {
                    debug!("Signaling reopened, offer already sent");
                    return;
                }
                self.offer_sent = true;
                if let Err(e) = self.send_offer().await {
                    error!("Failed to send SDP offer: {}", e);
                    self.fail();
                }
            }
            SignalingEvent::SdpAnswer(answer) => {
                if let Err(e) = self.apply_answer(answer).await {
                    error!("Failed to apply SDP answer: {}", e);
                    self.fail();
                }
            }
            SignalingEvent::IceCandidate(candidate) => {
                if self.remote_description_set {
                    self.add_remote_candidate(candidate).await;
                } else {
                    debug!("Buffering remote ICE candidate until answer arrives");
                    self.pending_candidates.push(candidate);
                }
            }
            SignalingEvent::Close => info!("Signaling session closed"),
            SignalingEvent::Error(reason) => warn!("Signaling error: {}", reason),
        }
    }

    async fn on_peer_event(&mut self, event: PeerEvent) {
        match event {
            PeerEvent::IceCandidate(Some(candidate)) => {
                debug!(candidate = %candidate.candidate, "Sending local ICE candidate");
                if let Err(e) = self.ctx.signaling.send_ice_candidate(&candidate).await {
                    warn!("Failed to send ICE candidate: {}", e);
                }
            }
            PeerEvent::IceCandidate(None) => {
                // Gathering complete: resend the offer with every candidate in it
                match self.ctx.peer.local_description().await {
                    Some(description) => {
                        debug!("ICE gathering complete, resending offer");
                        if let Err(e) = self.ctx.signaling.send_sdp_offer(&description).await {
                            warn!("Failed to resend SDP offer: {}", e);
                        }
                    }
                    None => debug!("ICE gathering complete without local description"),
                }
            }
            PeerEvent::Track { track, stream_id } => self.bind_track(track, stream_id),
            PeerEvent::DataChannel(channel) => {
                info!(label = %channel.label(), "Master opened data channel");
                channel.on_message(Arc::clone(&self.ctx.on_remote_message));
            }
            PeerEvent::ConnectionStateChange(state) => self.on_connection_state(state),
        }
    }

    async fn send_offer(&self) -> Result<()> {
        let offer = self.ctx.peer.create_offer(OfferOptions::receive_all()).await?;
        self.ctx.peer.set_local_description(offer.clone()).await?;
        self.ctx.signaling.send_sdp_offer(&offer).await?;
        info!("Sent SDP offer");
        Ok(())
    }

    async fn apply_answer(&mut self, answer: SessionDescription) -> Result<()> {
        self.ctx.peer.set_remote_description(answer).await?;
        self.remote_description_set = true;
        info!("Applied SDP answer");

        let pending = std::mem::take(&mut self.pending_candidates);
        if !pending.is_empty() {
            debug!(count = pending.len(), "Flushing buffered ICE candidates");
        }
        for candidate in pending {
            self.add_remote_candidate(candidate).await;
        }
        Ok(())
    }

    async fn add_remote_candidate(&self, candidate: IceCandidate) {
        if let Err(e) = self.ctx.peer.add_ice_candidate(candidate).await {
            warn!("Failed to add remote ICE candidate: {}", e);
        }
    }

    fn bind_track(&self, track: Arc<dyn MediaTrack>, stream_id: String) {
        let mut slot = self.ctx.remote_stream.lock();

        if let Some(stream) = slot.as_ref() {
            if stream.id() == stream_id {
                debug!(stream_id = %stream_id, kind = %track.kind(), "Adding track to bound stream");
                stream.add_track(track);
            } else {
                debug!(stream_id = %stream_id, "Ignoring track of a second stream");
                track.stop();
            }
            return;
        }

        if self.ctx.sink.has_source() {
            debug!(stream_id = %stream_id, "Ignoring track, sink already has a source");
            track.stop();
            return;
        }

        let stream = Arc::new(MediaStream::new(stream_id));
        stream.add_track(track);
        *slot = Some(Arc::clone(&stream));
        drop(slot);

        info!(stream_id = %stream.id(), "Binding remote stream to sink");
        self.ctx.sink.set_source(Some(stream));
    }

    fn on_connection_state(&self, state: PeerConnectionState) {
        self.ctx
            .diagnostics
            .connection_state_changed(Role::Viewer, state);

        match state {
            PeerConnectionState::Connected => {
                transition(&self.ctx.state, ViewerState::Connected);
            }
            PeerConnectionState::Failed => self.fail(),
            _ => {}
        }
    }

    fn on_deadline(&self) {
        if *self.ctx.state.borrow() == ViewerState::Negotiating {
            warn!("Negotiation deadline passed without a connection");
            self.fail();
        }
    }

    fn fail(&self) {
        transition(&self.ctx.state, ViewerState::Failed);
    }
}
