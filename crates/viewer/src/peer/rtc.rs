//! webrtc-rs backed peer connection

use super::{
    IceCandidate, IceTransportPolicy, OfferOptions, PeerConfig, PeerConnection,
    PeerConnectionFactory, PeerConnectionState, PeerEvent, PeerEventSender, SdpType,
    SessionDescription,
};
use crate::channels::{DataChannel, RtcDataChannel};
use crate::diagnostics::ConnectionStats;
use crate::media::RtcRemoteTrack;
use crate::{Error, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::APIBuilder;
use webrtc::data_channel::data_channel_init::RTCDataChannelInit;
use webrtc::data_channel::RTCDataChannel;
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::policy::ice_transport_policy::RTCIceTransportPolicy;
use webrtc::peer_connection::sdp::sdp_type::RTCSdpType;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;
use webrtc::rtp_transceiver::rtp_transceiver_direction::RTCRtpTransceiverDirection;
use webrtc::rtp_transceiver::RTCRtpTransceiverInit;
use webrtc::stats::StatsReportType;
use webrtc::track::track_remote::TrackRemote;

impl From<RTCIceCandidateInit> for IceCandidate {
    fn from(init: RTCIceCandidateInit) -> Self {
        Self {
            candidate: init.candidate,
            sdp_mid: init.sdp_mid,
            sdp_m_line_index: init.sdp_mline_index,
            username_fragment: init.username_fragment,
        }
    }
}

impl From<IceCandidate> for RTCIceCandidateInit {
    fn from(candidate: IceCandidate) -> Self {
        Self {
            candidate: candidate.candidate,
            sdp_mid: candidate.sdp_mid,
            sdp_mline_index: candidate.sdp_m_line_index,
            username_fragment: candidate.username_fragment,
        }
    }
}

impl From<RTCPeerConnectionState> for PeerConnectionState {
    fn from(state: RTCPeerConnectionState) -> Self {
        match state {
            RTCPeerConnectionState::Connecting => PeerConnectionState::Connecting,
            RTCPeerConnectionState::Connected => PeerConnectionState::Connected,
            RTCPeerConnectionState::Disconnected => PeerConnectionState::Disconnected,
            RTCPeerConnectionState::Failed => PeerConnectionState::Failed,
            RTCPeerConnectionState::Closed => PeerConnectionState::Closed,
            _ => PeerConnectionState::New,
        }
    }
}

impl From<IceTransportPolicy> for RTCIceTransportPolicy {
    fn from(policy: IceTransportPolicy) -> Self {
        match policy {
            IceTransportPolicy::All => RTCIceTransportPolicy::All,
            IceTransportPolicy::Relay => RTCIceTransportPolicy::Relay,
        }
    }
}

fn to_rtc_description(description: SessionDescription) -> Result<RTCSessionDescription> {
    match description.sdp_type {
        SdpType::Offer => RTCSessionDescription::offer(description.sdp),
        SdpType::Answer => RTCSessionDescription::answer(description.sdp),
    }
    .map_err(|e| Error::SdpError(format!("Failed to parse SDP: {}", e)))
}

fn from_rtc_description(description: RTCSessionDescription) -> SessionDescription {
    let sdp_type = match description.sdp_type {
        RTCSdpType::Answer => SdpType::Answer,
        _ => SdpType::Offer,
    };
    SessionDescription {
        sdp_type,
        sdp: description.sdp,
    }
}

/// Builds webrtc-rs peer connections with default codecs and interceptors
#[derive(Debug, Default, Clone, Copy)]
pub struct RtcPeerConnectionFactory;

impl RtcPeerConnectionFactory {
    /// Create a new factory
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl PeerConnectionFactory for RtcPeerConnectionFactory {
    #[instrument(skip_all, fields(ice_servers = config.ice_servers.len()))]
    async fn create(
        &self,
        config: &PeerConfig,
        events: PeerEventSender,
    ) -> Result<Arc<dyn PeerConnection>> {
        let connection = RtcPeerConnection::new(config, events).await?;
        Ok(Arc::new(connection))
    }
}

/// Peer connection wrapping `RTCPeerConnection`
pub struct RtcPeerConnection {
    inner: Arc<RTCPeerConnection>,
    audio_transceiver_added: AtomicBool,
    video_transceiver_added: AtomicBool,
}

impl RtcPeerConnection {
    /// Create a peer connection and wire its event handlers to `events`
    ///
    /// # Arguments
    ///
    /// * `config` - ICE servers and transport policy
    /// * `events` - Receives candidates, tracks, data channels and state changes
    pub async fn new(config: &PeerConfig, events: PeerEventSender) -> Result<Self> {
        let mut media_engine = MediaEngine::default();
        media_engine.register_default_codecs().map_err(|e| {
            Error::PeerConnectionError(format!("Failed to register codecs: {}", e))
        })?;

        let interceptor_registry =
            register_default_interceptors(Default::default(), &mut media_engine).map_err(|e| {
                Error::PeerConnectionError(format!("Failed to register interceptors: {}", e))
            })?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(interceptor_registry)
            .build();

        let ice_servers: Vec<RTCIceServer> = config
            .ice_servers
            .iter()
            .map(|server| {
                #[allow(clippy::needless_update)]
                RTCIceServer {
                    urls: server.urls.clone(),
                    username: server.username.clone().unwrap_or_default(),
                    credential: server.credential.clone().unwrap_or_default(),
                    ..Default::default()
                }
            })
            .collect();

        let rtc_config = RTCConfiguration {
            ice_servers,
            ice_transport_policy: config.ice_transport_policy.into(),
            ..Default::default()
        };

        let inner = Arc::new(api.new_peer_connection(rtc_config).await.map_err(|e| {
            Error::PeerConnectionError(format!("Failed to create peer connection: {}", e))
        })?);

        Self::wire_events(&inner, events);

        info!("Created peer connection");

        Ok(Self {
            inner,
            audio_transceiver_added: AtomicBool::new(false),
            video_transceiver_added: AtomicBool::new(false),
        })
    }

    fn wire_events(inner: &RTCPeerConnection, events: PeerEventSender) {
        let tx = events.clone();
        inner.on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
            let event = match candidate {
                Some(candidate) => match candidate.to_json() {
                    Ok(init) => Some(PeerEvent::IceCandidate(Some(init.into()))),
                    Err(e) => {
                        warn!("Failed to serialize local ICE candidate: {}", e);
                        None
                    }
                },
                None => Some(PeerEvent::IceCandidate(None)),
            };
            if let Some(event) = event {
                let _ = tx.send(event);
            }
            Box::pin(async {})
        }));

        let tx = events.clone();
        inner.on_track(Box::new(move |track: Arc<TrackRemote>, _receiver, _transceiver| {
            let remote = RtcRemoteTrack::new(track);
            let stream_id = remote.stream_id();
            debug!(stream_id = %stream_id, "Remote track received");
            let _ = tx.send(PeerEvent::Track {
                track: Arc::new(remote),
                stream_id,
            });
            Box::pin(async {})
        }));

        let tx = events.clone();
        inner.on_data_channel(Box::new(move |channel: Arc<RTCDataChannel>| {
            debug!(label = %channel.label(), "Remote data channel opened");
            let _ = tx.send(PeerEvent::DataChannel(Arc::new(RtcDataChannel::new(channel))));
            Box::pin(async {})
        }));

        let tx = events;
        inner.on_peer_connection_state_change(Box::new(move |state: RTCPeerConnectionState| {
            let _ = tx.send(PeerEvent::ConnectionStateChange(state.into()));
            Box::pin(async {})
        }));
    }

    async fn add_recvonly_transceiver(&self, kind: RTPCodecType) -> Result<()> {
        self.inner
            .add_transceiver_from_kind(
                kind,
                Some(RTCRtpTransceiverInit {
                    direction: RTCRtpTransceiverDirection::Recvonly,
                    send_encodings: vec![],
                }),
            )
            .await
            .map_err(|e| {
                Error::PeerConnectionError(format!("Failed to add {} transceiver: {}", kind, e))
            })?;
        Ok(())
    }

    /// Underlying webrtc-rs connection
    pub fn inner(&self) -> &Arc<RTCPeerConnection> {
        &self.inner
    }
}

#[async_trait]
impl PeerConnection for RtcPeerConnection {
    async fn create_offer(&self, options: OfferOptions) -> Result<SessionDescription> {
        if options.receive_audio && !self.audio_transceiver_added.swap(true, Ordering::SeqCst) {
            self.add_recvonly_transceiver(RTPCodecType::Audio).await?;
        }
        if options.receive_video && !self.video_transceiver_added.swap(true, Ordering::SeqCst) {
            self.add_recvonly_transceiver(RTPCodecType::Video).await?;
        }

        let offer = self
            .inner
            .create_offer(None)
            .await
            .map_err(|e| Error::SdpError(format!("Failed to create offer: {}", e)))?;

        Ok(from_rtc_description(offer))
    }

    async fn set_local_description(&self, description: SessionDescription) -> Result<()> {
        let description = to_rtc_description(description)?;
        self.inner
            .set_local_description(description)
            .await
            .map_err(|e| Error::SdpError(format!("Failed to set local description: {}", e)))
    }

    async fn local_description(&self) -> Option<SessionDescription> {
        self.inner.local_description().await.map(from_rtc_description)
    }

    async fn set_remote_description(&self, description: SessionDescription) -> Result<()> {
        let description = to_rtc_description(description)?;
        self.inner
            .set_remote_description(description)
            .await
            .map_err(|e| Error::SdpError(format!("Failed to set remote description: {}", e)))
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()> {
        self.inner
            .add_ice_candidate(candidate.into())
            .await
            .map_err(|e| Error::IceCandidateError(format!("Failed to add ICE candidate: {}", e)))
    }

    async fn create_data_channel(&self, label: &str) -> Result<Arc<dyn DataChannel>> {
        let init = RTCDataChannelInit {
            ordered: Some(true),
            ..Default::default()
        };

        let channel = self
            .inner
            .create_data_channel(label, Some(init))
            .await
            .map_err(|e| {
                Error::DataChannelError(format!("Failed to create data channel: {}", e))
            })?;

        Ok(Arc::new(RtcDataChannel::new(channel)))
    }

    async fn stats(&self) -> Result<ConnectionStats> {
        let report = self.inner.get_stats().await;
        let mut stats = ConnectionStats::default();

        for report in report.reports.values() {
            if let StatsReportType::InboundRTP(inbound) = report {
                if inbound.kind == "audio" {
                    stats.audio_bytes_received += inbound.bytes_received;
                    stats.audio_packets_received += inbound.packets_received;
                } else {
                    stats.video_bytes_received += inbound.bytes_received;
                    stats.video_packets_received += inbound.packets_received;
                }
            }
        }

        Ok(stats)
    }

    async fn close(&self) -> Result<()> {
        info!("Closing peer connection");
        self.inner.close().await.map_err(|e| {
            Error::PeerConnectionError(format!("Failed to close connection: {}", e))
        })
    }
}
