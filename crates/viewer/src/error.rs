//! Error types for the viewer client

use std::fmt;

/// Result type alias using the viewer Error
pub type Result<T> = std::result::Result<T, Error>;

/// Setup step that failed inside `ViewerConnection::start_viewer`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupStage {
    /// Resolving the channel identifier from its name
    ResolveChannel,
    /// Resolving the WSS/HTTPS endpoints for the viewer role
    ResolveEndpoints,
    /// Fetching the ICE server configuration
    FetchIceServers,
    /// Constructing the signaling session
    CreateSignaling,
    /// Constructing the peer connection
    CreatePeerConnection,
    /// Creating the outbound data channel
    CreateDataChannel,
    /// Opening the signaling session
    OpenSignaling,
}

impl fmt::Display for SetupStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SetupStage::ResolveChannel => "could not resolve channel",
            SetupStage::ResolveEndpoints => "could not resolve signaling endpoints",
            SetupStage::FetchIceServers => "could not fetch ICE servers",
            SetupStage::CreateSignaling => "could not create signaling session",
            SetupStage::CreatePeerConnection => "could not create peer connection",
            SetupStage::CreateDataChannel => "could not create data channel",
            SetupStage::OpenSignaling => "could not open signaling session",
        };
        f.write_str(name)
    }
}

/// Errors that can occur while running a viewer session
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid configuration parameter
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A session is already live on this viewer
    #[error("Viewer already started on channel {0}")]
    AlreadyStarted(String),

    /// One of the start-up steps failed
    #[error("Setup failed, {stage}: {reason}")]
    SetupFailed {
        /// Step that failed
        stage: SetupStage,
        /// Underlying failure
        reason: String,
    },

    /// `stop_viewer` was called while the start was still in progress
    #[error("Start on channel {0} was cancelled")]
    StartCancelled(String),

    /// No live session or data channel
    #[error("Viewer is not connected")]
    NotConnected,

    /// Negotiation did not complete in time
    #[error("Negotiation timed out: {0}")]
    NegotiationTimedOut(String),

    /// The peer connection reported failure
    #[error("Negotiation failed: {0}")]
    NegotiationFailed(String),

    /// One or more teardown steps failed
    #[error("Teardown failed: {0}")]
    TeardownFailed(String),

    /// Signaling channel error
    #[error("Signaling error: {0}")]
    SignalingError(String),

    /// WebSocket error
    #[error("WebSocket error: {0}")]
    WebSocketError(String),

    /// Control-plane HTTP error
    #[error("HTTP error: {0}")]
    HttpError(String),

    /// WebRTC peer connection error
    #[error("Peer connection error: {0}")]
    PeerConnectionError(String),

    /// SDP negotiation error
    #[error("SDP negotiation error: {0}")]
    SdpError(String),

    /// ICE candidate error
    #[error("ICE candidate error: {0}")]
    IceCandidateError(String),

    /// Data channel error
    #[error("Data channel error: {0}")]
    DataChannelError(String),

    /// Media track error
    #[error("Media track error: {0}")]
    MediaTrackError(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Any other error
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Wrap a failure as a setup error at the given stage
    pub fn setup(stage: SetupStage, err: impl fmt::Display) -> Self {
        Error::SetupFailed {
            stage,
            reason: err.to_string(),
        }
    }

    /// Check if this error is worth retrying (network-side failures)
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::SetupFailed { stage, .. } => !matches!(stage, SetupStage::ResolveChannel),
            Error::SignalingError(_)
            | Error::WebSocketError(_)
            | Error::HttpError(_)
            | Error::NegotiationTimedOut(_)
            | Error::NegotiationFailed(_)
            | Error::IoError(_) => true,
            _ => false,
        }
    }

    /// Check if this error came from `start_viewer` setup
    pub fn is_setup_failure(&self) -> bool {
        matches!(self, Error::SetupFailed { .. })
    }

    /// Check if this error is a configuration error
    pub fn is_config_error(&self) -> bool {
        matches!(self, Error::InvalidConfig(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::SerializationError(err.to_string())
    }
}
