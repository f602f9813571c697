//! Loopback control-plane server
//!
//! Serves canned channel, endpoint and ICE server responses and records
//! every request it receives.

use axum::extract::{Json, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::Router;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::net::TcpListener;

pub const CHANNEL_ARN: &str =
    "arn:aws:kinesisvideo:us-west-2:123456789012:channel/demo/1700000000000";

pub const TURN_USERNAME: &str = "1700000300:djE6YXJu";

/// Request as seen by the mock server
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub path: String,
    pub body: Value,
    pub authorization: Option<String>,
    pub amz_date: Option<String>,
}

/// How the mock answers
pub struct ControlPlaneOptions {
    /// `Date` header on channel descriptions
    pub server_date: Option<String>,
    /// Answer channel descriptions with 404
    pub missing_channel: bool,
    /// WSS endpoint handed out for the channel
    pub signaling_endpoint: String,
}

impl Default for ControlPlaneOptions {
    fn default() -> Self {
        Self {
            server_date: None,
            missing_channel: false,
            signaling_endpoint: "wss://v-1234.kinesisvideo.example.com".to_string(),
        }
    }
}

pub struct MockControlPlane {
    /// Base URL, also used as the channel's HTTPS endpoint
    pub base: String,
    options: ControlPlaneOptions,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl MockControlPlane {
    /// Bind to a loopback port and start serving
    pub async fn start(options: ControlPlaneOptions) -> Arc<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());

        let mock = Arc::new(Self {
            base,
            options,
            requests: Mutex::new(Vec::new()),
        });

        let router = Router::new()
            .route("/describeSignalingChannel", post(describe_channel))
            .route("/getSignalingChannelEndpoint", post(get_endpoint))
            .route("/v1/get-ice-server-config", post(get_ice_server_config))
            .with_state(Arc::clone(&mock));

        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        mock
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().clone()
    }

    fn record(&self, path: &str, headers: &HeaderMap, body: Value) {
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        self.requests.lock().push(RecordedRequest {
            path: path.to_string(),
            body,
            authorization: header("authorization"),
            amz_date: header("x-amz-date"),
        });
    }
}

async fn describe_channel(
    State(mock): State<Arc<MockControlPlane>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    mock.record("/describeSignalingChannel", &headers, body);

    if mock.options.missing_channel {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({"message": "The requested channel is not found or not active."})),
        )
            .into_response();
    }

    let body = Json(json!({
        "ChannelInfo": {
            "ChannelARN": CHANNEL_ARN,
            "ChannelName": "demo",
            "ChannelStatus": "ACTIVE",
            "ChannelType": "SINGLE_MASTER",
        }
    }));

    match &mock.options.server_date {
        Some(date) => ([(header::DATE, date.clone())], body).into_response(),
        None => body.into_response(),
    }
}

async fn get_endpoint(
    State(mock): State<Arc<MockControlPlane>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    mock.record("/getSignalingChannelEndpoint", &headers, body);
    Json(json!({
        "ResourceEndpointList": [
            {"Protocol": "HTTPS", "ResourceEndpoint": mock.base.clone()},
            {"Protocol": "WSS", "ResourceEndpoint": mock.options.signaling_endpoint.clone()},
        ]
    }))
    .into_response()
}

async fn get_ice_server_config(
    State(mock): State<Arc<MockControlPlane>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    mock.record("/v1/get-ice-server-config", &headers, body);
    Json(json!({
        "IceServerList": [
            {
                "Uris": [
                    "turn:127.0.0.1:3478?transport=udp",
                    "turns:127.0.0.1:5349?transport=tcp",
                ],
                "Username": TURN_USERNAME,
                "Password": "secret",
                "Ttl": 300,
            },
            {"Uris": [], "Username": "empty", "Password": "empty", "Ttl": 300},
        ]
    }))
    .into_response()
}
