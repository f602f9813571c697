//! Control-plane signaling provider over HTTPS

use super::client::WsSignalingSession;
use super::{
    ChannelDescription, ChannelEndpoints, ClockOffset, Role, SignalingEventSender,
    SignalingParams, SignalingProvider, SignalingSession,
};
use crate::config::ViewerConfig;
use crate::peer::IceServer;
use crate::{Error, Result};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::DATE;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument};

#[derive(Debug, Deserialize)]
struct DescribeChannelResponse {
    #[serde(rename = "ChannelInfo")]
    channel_info: ChannelInfo,
}

#[derive(Debug, Deserialize)]
struct ChannelInfo {
    #[serde(rename = "ChannelARN")]
    channel_arn: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct EndpointResponse {
    #[serde(default)]
    resource_endpoint_list: Vec<ResourceEndpoint>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ResourceEndpoint {
    protocol: String,
    resource_endpoint: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct IceServerConfigResponse {
    #[serde(default)]
    ice_server_list: Vec<IceServerEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct IceServerEntry {
    #[serde(default)]
    uris: Vec<String>,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    password: Option<String>,
    #[serde(default)]
    ttl: Option<u64>,
}

/// Signaling provider talking to the managed control-plane API
///
/// Channel and endpoint lookups go to the control endpoint; ICE server
/// configuration goes to the channel's HTTPS endpoint. Sessions are
/// [`WsSignalingSession`]s.
pub struct HttpChannelProvider {
    client: reqwest::Client,
    control_endpoint: String,
    stun_url: String,
    use_turn: bool,
    auth_token: Option<String>,
    connect_timeout: Duration,
}

impl HttpChannelProvider {
    /// Create a provider from the viewer configuration
    pub fn new(config: &ViewerConfig) -> Result<Self> {
        config.validate()?;

        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| Error::HttpError(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            control_endpoint: config.control_endpoint().trim_end_matches('/').to_string(),
            stun_url: config.stun_url(),
            use_turn: config.use_turn,
            auth_token: config.auth_token.clone(),
            connect_timeout: config.request_timeout(),
        })
    }

    /// Control endpoint in use
    pub fn control_endpoint(&self) -> &str {
        &self.control_endpoint
    }

    async fn post<T: DeserializeOwned>(
        &self,
        url: &str,
        body: serde_json::Value,
        clock: Option<ClockOffset>,
    ) -> Result<(T, Option<String>)> {
        debug!(url = %url, "POST");

        let mut request = self.client.post(url).json(&body);
        if let Some(clock) = clock {
            request = request.header("X-Amz-Date", clock.amz_date());
        }
        if let Some(token) = &self.auth_token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::HttpError(format!("Request to {} failed: {}", url, e)))?;

        let status = response.status();
        let date = response
            .headers()
            .get(DATE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(Error::HttpError(format!("{} returned {}: {}", url, status, text)));
        }

        let parsed = response
            .json::<T>()
            .await
            .map_err(|e| Error::HttpError(format!("Invalid response from {}: {}", url, e)))?;

        Ok((parsed, date))
    }
}

#[async_trait]
impl SignalingProvider for HttpChannelProvider {
    #[instrument(skip(self))]
    async fn describe_channel(&self, channel_name: &str) -> Result<ChannelDescription> {
        let url = format!("{}/describeSignalingChannel", self.control_endpoint);
        let (response, date): (DescribeChannelResponse, _) = self
            .post(&url, json!({ "ChannelName": channel_name }), None)
            .await?;

        let clock_offset = date
            .map(|d| ClockOffset::from_http_date(&d, Utc::now()))
            .unwrap_or_default();

        info!(
            channel_arn = %response.channel_info.channel_arn,
            clock_offset_ms = clock_offset.as_millis(),
            "Resolved signaling channel"
        );

        Ok(ChannelDescription {
            name: channel_name.to_string(),
            channel_id: response.channel_info.channel_arn,
            clock_offset,
        })
    }

    #[instrument(skip(self, channel), fields(channel = %channel.name))]
    async fn resolve_endpoints(
        &self,
        channel: &ChannelDescription,
        role: Role,
    ) -> Result<ChannelEndpoints> {
        let url = format!("{}/getSignalingChannelEndpoint", self.control_endpoint);
        let body = json!({
            "ChannelARN": channel.channel_id,
            "SingleMasterChannelEndpointConfiguration": {
                "Protocols": ["WSS", "HTTPS"],
                "Role": role.as_str(),
            }
        });
        let (response, _): (EndpointResponse, _) =
            self.post(&url, body, Some(channel.clock_offset)).await?;

        let find = |protocol: &str| {
            response
                .resource_endpoint_list
                .iter()
                .find(|e| e.protocol.eq_ignore_ascii_case(protocol))
                .map(|e| e.resource_endpoint.clone())
                .ok_or_else(|| Error::HttpError(format!("No {} endpoint for channel", protocol)))
        };

        let endpoints = ChannelEndpoints {
            wss: find("WSS")?,
            https: find("HTTPS")?,
        };

        debug!(wss = %endpoints.wss, https = %endpoints.https, "Resolved endpoints");
        Ok(endpoints)
    }

    #[instrument(skip(self, channel, endpoints), fields(channel = %channel.name))]
    async fn ice_servers(
        &self,
        channel: &ChannelDescription,
        endpoints: &ChannelEndpoints,
        client_id: &str,
    ) -> Result<Vec<IceServer>> {
        let mut servers = vec![IceServer::stun(self.stun_url.clone())];

        if !self.use_turn {
            return Ok(servers);
        }

        let url = format!(
            "{}/v1/get-ice-server-config",
            endpoints.https.trim_end_matches('/')
        );
        let body = json!({
            "ChannelARN": channel.channel_id,
            "ClientId": client_id,
            "Service": "TURN",
        });
        let (response, _): (IceServerConfigResponse, _) =
            self.post(&url, body, Some(channel.clock_offset)).await?;

        for entry in response.ice_server_list {
            if entry.uris.is_empty() {
                continue;
            }
            debug!(uris = ?entry.uris, ttl = ?entry.ttl, "TURN server");
            servers.push(IceServer {
                urls: entry.uris,
                username: entry.username,
                credential: entry.password,
            });
        }

        info!(count = servers.len(), "Fetched ICE servers");
        Ok(servers)
    }

    async fn connect(
        &self,
        params: SignalingParams,
        events: SignalingEventSender,
    ) -> Result<Arc<dyn SignalingSession>> {
        let session =
            WsSignalingSession::new(&params, events)?.with_connect_timeout(self.connect_timeout);
        Ok(Arc::new(session))
    }
}
