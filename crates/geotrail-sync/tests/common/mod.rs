//! Shared fixtures: a local upload endpoint and scripted collaborators.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU16, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::Router;
use tokio::sync::oneshot;

use geotrail_core::Fix;
use geotrail_sync::{CaptureConfig, LocationSensor, SensorError};

// =============================================================================
// Upload Endpoint
// =============================================================================

/// One request as the endpoint saw it.
#[derive(Debug, Clone)]
pub struct Received {
    pub content_type: Option<String>,
    pub body: String,
}

struct EndpointState {
    status: AtomicU16,
    delay_ms: AtomicU64,
    received: Mutex<Vec<Received>>,
}

/// HTTP endpoint on 127.0.0.1 that records every POST to `/upload`.
pub struct Endpoint {
    pub url: String,
    state: Arc<EndpointState>,
    shutdown: Option<oneshot::Sender<()>>,
}

impl Endpoint {
    pub async fn spawn() -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let state = Arc::new(EndpointState {
            status: AtomicU16::new(200),
            delay_ms: AtomicU64::new(0),
            received: Mutex::new(Vec::new()),
        });
        let app = Router::new()
            .route("/upload", post(handle_upload))
            .with_state(Arc::clone(&state));

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.await;
                })
                .await;
        });

        Endpoint {
            url: format!("http://{addr}/upload"),
            state,
            shutdown: Some(shutdown_tx),
        }
    }

    /// Status code for subsequent requests.
    pub fn respond_with(&self, status: u16) {
        self.state.status.store(status, Ordering::SeqCst);
    }

    /// Delay before answering subsequent requests.
    pub fn delay(&self, delay: Duration) {
        self.state
            .delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn received(&self) -> Vec<Received> {
        self.state.received.lock().unwrap().clone()
    }

    /// Timestamps in every JSON body received, in arrival order.
    pub fn json_timestamps(&self, param: &str) -> Vec<Vec<i64>> {
        self.received()
            .iter()
            .map(|r| {
                let body: serde_json::Value = serde_json::from_str(&r.body).unwrap();
                body[param]
                    .as_array()
                    .unwrap()
                    .iter()
                    .map(|s| s["timestamp"].as_i64().unwrap())
                    .collect()
            })
            .collect()
    }
}

impl Drop for Endpoint {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
    }
}

async fn handle_upload(
    State(state): State<Arc<EndpointState>>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    let content_type = headers
        .get(axum::http::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(ToString::to_string);
    state.received.lock().unwrap().push(Received {
        content_type,
        body: String::from_utf8_lossy(&body).into_owned(),
    });

    let delay = state.delay_ms.load(Ordering::SeqCst);
    if delay > 0 {
        tokio::time::sleep(Duration::from_millis(delay)).await;
    }

    StatusCode::from_u16(state.status.load(Ordering::SeqCst))
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

// =============================================================================
// Collaborators
// =============================================================================

/// Sensor that replays a fixed script, then reports no provider.
#[derive(Default)]
pub struct ScriptedSensor {
    script: Mutex<VecDeque<Result<Fix, SensorError>>>,
}

impl ScriptedSensor {
    pub fn new(script: impl IntoIterator<Item = Result<Fix, SensorError>>) -> Self {
        ScriptedSensor {
            script: Mutex::new(script.into_iter().collect()),
        }
    }
}

#[async_trait]
impl LocationSensor for ScriptedSensor {
    async fn current_fix(&self) -> Result<Fix, SensorError> {
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(SensorError::Unavailable("script exhausted".into())))
    }
}

/// A capture time an hour ago, well inside the default retention window.
pub fn recent() -> i64 {
    chrono::Utc::now().timestamp() - 3_600
}

/// In-memory config that uploads to `url`.
pub fn upload_config(url: &str) -> CaptureConfig {
    CaptureConfig {
        database_path: Some(":memory:".into()),
        upload_enabled: true,
        upload_url: Some(url.to_string()),
        upload_timeout_secs: 5,
        ..CaptureConfig::default()
    }
}
