//! Configuration types for the viewer client

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default label of the outbound data channel
pub const DEFAULT_DATA_CHANNEL_LABEL: &str = "kvsDataChannel";

/// Main configuration for a `ViewerConnection` and its providers
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    /// Region of the signaling service (default: us-west-2)
    pub region: String,

    /// Control-plane endpoint (derived from `region` when unset)
    pub control_endpoint: Option<String>,

    /// STUN server URL (derived from `region` when unset)
    pub stun_url: Option<String>,

    /// Request TURN servers from the signaling service (default: true)
    pub use_turn: bool,

    /// Label of the outbound data channel
    pub data_channel_label: String,

    /// Mark the session failed if not connected within this many seconds
    pub negotiation_timeout_secs: Option<u64>,

    /// Connection stats polling interval in milliseconds (None disables polling)
    pub stats_interval_ms: Option<u64>,

    /// Timeout for each control-plane HTTP request in seconds (default: 10)
    pub request_timeout_secs: u64,

    /// Optional bearer token sent to the control plane
    pub auth_token: Option<String>,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            region: "us-west-2".to_string(),
            control_endpoint: None,
            stun_url: None,
            use_turn: true,
            data_channel_label: DEFAULT_DATA_CHANNEL_LABEL.to_string(),
            negotiation_timeout_secs: Some(30),
            stats_interval_ms: Some(5000),
            request_timeout_secs: 10,
            auth_token: None,
        }
    }
}

impl ViewerConfig {
    /// Parse a configuration from TOML text
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| Error::InvalidConfig(format!("Invalid TOML: {}", e)))
    }

    /// Load a configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&text)
    }

    /// Control-plane endpoint, derived from the region if not configured
    pub fn control_endpoint(&self) -> String {
        self.control_endpoint
            .clone()
            .unwrap_or_else(|| format!("https://kinesisvideo.{}.amazonaws.com", self.region))
    }

    /// STUN server URL, derived from the region if not configured
    pub fn stun_url(&self) -> String {
        self.stun_url
            .clone()
            .unwrap_or_else(|| format!("stun:stun.kinesisvideo.{}.amazonaws.com:443", self.region))
    }

    /// Negotiation deadline
    pub fn negotiation_timeout(&self) -> Option<Duration> {
        self.negotiation_timeout_secs.map(Duration::from_secs)
    }

    /// Stats polling interval
    pub fn stats_interval(&self) -> Option<Duration> {
        self.stats_interval_ms.map(Duration::from_millis)
    }

    /// Per-request HTTP timeout
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Validate configuration parameters
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `region` is empty
    /// - `control_endpoint` is set and not an http(s) URL
    /// - `stun_url` is set and does not start with `stun:` or `stuns:`
    /// - `data_channel_label` is empty
    /// - `negotiation_timeout_secs`, `stats_interval_ms` or `request_timeout_secs` is zero
    pub fn validate(&self) -> Result<()> {
        if self.region.trim().is_empty() {
            return Err(Error::InvalidConfig("region must not be empty".to_string()));
        }

        if let Some(endpoint) = &self.control_endpoint {
            if !endpoint.starts_with("https://") && !endpoint.starts_with("http://") {
                return Err(Error::InvalidConfig(format!(
                    "control_endpoint must start with http:// or https://, got {}",
                    endpoint
                )));
            }
        }

        if let Some(stun) = &self.stun_url {
            if !stun.starts_with("stun:") && !stun.starts_with("stuns:") {
                return Err(Error::InvalidConfig(format!(
                    "stun_url must start with stun: or stuns:, got {}",
                    stun
                )));
            }
        }

        if self.data_channel_label.is_empty() {
            return Err(Error::InvalidConfig(
                "data_channel_label must not be empty".to_string(),
            ));
        }

        if self.negotiation_timeout_secs == Some(0) {
            return Err(Error::InvalidConfig(
                "negotiation_timeout_secs must be greater than 0".to_string(),
            ));
        }

        if self.stats_interval_ms == Some(0) {
            return Err(Error::InvalidConfig(
                "stats_interval_ms must be greater than 0".to_string(),
            ));
        }

        if self.request_timeout_secs == 0 {
            return Err(Error::InvalidConfig(
                "request_timeout_secs must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

/// Capture profile selected by the caller's quality hint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum VideoQuality {
    /// 640x480
    #[default]
    #[serde(rename = "480p")]
    Standard,
    /// 1280x720
    #[serde(rename = "720p")]
    High,
}

impl VideoQuality {
    /// Local media constraints for this profile
    pub fn constraints(self) -> MediaConstraints {
        let (width, height) = match self {
            VideoQuality::Standard => (640, 480),
            VideoQuality::High => (1280, 720),
        };
        MediaConstraints {
            width,
            height,
            audio: true,
        }
    }
}

impl From<bool> for VideoQuality {
    fn from(high: bool) -> Self {
        if high {
            VideoQuality::High
        } else {
            VideoQuality::Standard
        }
    }
}

/// Locally offered media constraints
///
/// Only shapes what this side would capture; decoding of the remote stream
/// does not depend on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaConstraints {
    /// Capture width in pixels
    pub width: u32,
    /// Capture height in pixels
    pub height: u32,
    /// Capture audio
    pub audio: bool,
}
