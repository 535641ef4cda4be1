//! In-process render backend
//!
//! Serves both render endpoints on an ephemeral port. The session id selects
//! the behavior:
//! - `fail`: 500 with a text body
//! - `slow`: answers after `SLOW_DELAY`
//! - `garbage`: 200 with bytes that are not audio
//! - `hires`: 48 kHz WAV
//! - anything else: 44.1 kHz WAV of `DEFAULT_DURATION_SECS`

use super::audio_generator::sine_wav;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::Router;
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;

pub const DEFAULT_DURATION_SECS: f64 = 2.0;
pub const SLOW_DELAY: Duration = Duration::from_secs(2);

/// One request as the backend saw it
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub path: String,
    pub session_id: String,
    pub body: Value,
}

#[derive(Default)]
struct BackendState {
    hits: AtomicUsize,
    requests: Mutex<Vec<RecordedRequest>>,
}

pub struct MockBackend {
    base_url: String,
    state: Arc<BackendState>,
    server: JoinHandle<()>,
}

impl MockBackend {
    pub async fn start() -> Self {
        let state = Arc::new(BackendState::default());

        let router = Router::new()
            .route("/api/mix/preview/:session_id", post(mix_preview))
            .route(
                "/api/genre_mixing/sessions/:session_id/preview/",
                post(genre_preview),
            )
            .with_state(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        Self {
            base_url: format!("http://{}", addr),
            state,
            server,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Requests served so far, including failed ones
    pub fn hits(&self) -> usize {
        self.state.hits.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.requests.lock().unwrap().clone()
    }

    /// The WAV served for an ordinary session
    pub fn default_payload() -> Vec<u8> {
        sine_wav(44100, DEFAULT_DURATION_SECS, 440.0)
    }
}

impl Drop for MockBackend {
    fn drop(&mut self) {
        self.server.abort();
    }
}

async fn mix_preview(
    State(state): State<Arc<BackendState>>,
    Path(session_id): Path<String>,
    body: Bytes,
) -> Response {
    let path = format!("/api/mix/preview/{}", session_id);
    render(&state, path, session_id, body).await
}

async fn genre_preview(
    State(state): State<Arc<BackendState>>,
    Path(session_id): Path<String>,
    body: Bytes,
) -> Response {
    let path = format!("/api/genre_mixing/sessions/{}/preview/", session_id);
    render(&state, path, session_id, body).await
}

async fn render(state: &BackendState, path: String, session_id: String, body: Bytes) -> Response {
    state.hits.fetch_add(1, Ordering::SeqCst);
    let body: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
    state.requests.lock().unwrap().push(RecordedRequest {
        path,
        session_id: session_id.clone(),
        body,
    });

    match session_id.as_str() {
        "fail" => (StatusCode::INTERNAL_SERVER_ERROR, "render failed").into_response(),
        "garbage" => (StatusCode::OK, b"definitely not audio".to_vec()).into_response(),
        "hires" => wav_response(sine_wav(48000, DEFAULT_DURATION_SECS, 440.0)),
        "slow" => {
            tokio::time::sleep(SLOW_DELAY).await;
            wav_response(MockBackend::default_payload())
        }
        _ => wav_response(MockBackend::default_payload()),
    }
}

fn wav_response(bytes: Vec<u8>) -> Response {
    (
        StatusCode::OK,
        [(axum::http::header::CONTENT_TYPE, "audio/wav")],
        bytes,
    )
        .into_response()
}
