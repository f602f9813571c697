//! Websocket signaling wire format
//!
//! Outbound frames carry an `action` and a base64-encoded JSON payload.
//! Inbound frames carry a `messageType`, an optional base64 payload and,
//! for status responses, an error description.

use super::SignalingEvent;
use crate::peer::{IceCandidate, SessionDescription};
use crate::{Error, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

/// Outbound action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    /// SDP offer to the master
    SdpOffer,
    /// ICE candidate to the master
    IceCandidate,
}

/// Frame sent to the signaling service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundMessage {
    /// What the payload is
    pub action: Action,
    /// Base64-encoded JSON payload
    pub message_payload: String,
    /// Target client, only used by masters
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient_client_id: Option<String>,
}

impl OutboundMessage {
    /// Wrap an SDP offer
    pub fn sdp_offer(offer: &SessionDescription) -> Result<Self> {
        Ok(Self {
            action: Action::SdpOffer,
            message_payload: encode_payload(offer)?,
            recipient_client_id: None,
        })
    }

    /// Wrap an ICE candidate
    pub fn ice_candidate(candidate: &IceCandidate) -> Result<Self> {
        Ok(Self {
            action: Action::IceCandidate,
            message_payload: encode_payload(candidate)?,
            recipient_client_id: None,
        })
    }

    /// Convert to JSON string
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| {
            Error::SerializationError(format!("Failed to serialize signaling message: {}", e))
        })
    }
}

/// Inbound message type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageType {
    /// SDP answer from the master
    SdpAnswer,
    /// SDP offer (only delivered to masters)
    SdpOffer,
    /// ICE candidate from the master
    IceCandidate,
    /// Response to a previous frame, usually an error
    StatusResponse,
    /// Service is about to close the connection
    GoAway,
    /// ICE server credentials should be refreshed
    ReconnectIceServer,
}

/// Status attached to a `STATUS_RESPONSE` frame
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    /// Correlation id of the failed frame
    #[serde(default)]
    pub correlation_id: Option<String>,
    /// Error type
    #[serde(default)]
    pub error_type: Option<String>,
    /// Status code
    #[serde(default)]
    pub status_code: Option<String>,
    /// Human-readable description
    #[serde(default)]
    pub description: Option<String>,
}

impl std::fmt::Display for StatusResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} ({}): {}",
            self.error_type.as_deref().unwrap_or("UnknownError"),
            self.status_code.as_deref().unwrap_or("?"),
            self.description.as_deref().unwrap_or("no description")
        )
    }
}

/// Frame received from the signaling service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundMessage {
    /// What the frame carries
    pub message_type: MessageType,
    /// Base64-encoded JSON payload
    #[serde(default)]
    pub message_payload: Option<String>,
    /// Client id of the sender
    #[serde(default)]
    pub sender_client_id: Option<String>,
    /// Status of a previous frame
    #[serde(default)]
    pub status_response: Option<StatusResponse>,
}

impl InboundMessage {
    /// Parse from JSON string
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| {
            Error::SignalingError(format!("Invalid signaling message: {}", e))
        })
    }

    /// Translate into a session event
    ///
    /// Returns `Ok(None)` for frames a viewer ignores.
    pub fn into_event(self) -> Result<Option<SignalingEvent>> {
        match self.message_type {
            MessageType::SdpAnswer => {
                let answer: SessionDescription = decode_payload(self.payload()?)?;
                Ok(Some(SignalingEvent::SdpAnswer(answer)))
            }
            MessageType::IceCandidate => {
                let candidate: IceCandidate = decode_payload(self.payload()?)?;
                Ok(Some(SignalingEvent::IceCandidate(candidate)))
            }
            MessageType::StatusResponse => {
                let status = self.status_response.unwrap_or_default();
                Ok(Some(SignalingEvent::Error(status.to_string())))
            }
            MessageType::GoAway => Ok(Some(SignalingEvent::Error(
                "Service requested the connection to close (GO_AWAY)".to_string(),
            ))),
            MessageType::ReconnectIceServer | MessageType::SdpOffer => Ok(None),
        }
    }

    fn payload(&self) -> Result<&str> {
        self.message_payload.as_deref().ok_or_else(|| {
            Error::SignalingError(format!("{:?} message without payload", self.message_type))
        })
    }
}

/// Serialize to JSON and base64-encode
pub fn encode_payload<T: Serialize>(value: &T) -> Result<String> {
    let json = serde_json::to_vec(value)?;
    Ok(STANDARD.encode(json))
}

/// Base64-decode and deserialize from JSON
pub fn decode_payload<T: DeserializeOwned>(payload: &str) -> Result<T> {
    let json = STANDARD
        .decode(payload.trim())
        .map_err(|e| Error::SignalingError(format!("Invalid base64 payload: {}", e)))?;
    Ok(serde_json::from_slice(&json)?)
}
