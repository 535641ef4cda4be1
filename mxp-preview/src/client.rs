//! Render backend HTTP client
//!
//! Two endpoints render the same preview contract:
//! - `POST /api/mix/preview/{sessionId}` (used for playback)
//! - `POST /api/genre_mixing/sessions/{sessionId}/preview/` (used to fetch bytes)
//!
//! Both take the preview options as JSON and answer with encoded audio bytes.
//! Non-2xx answers become `Error::HttpStatus`; nothing is retried.

use crate::error::{Error, Result};
use crate::options::PreviewRequest;
use reqwest::Url;
use std::time::Duration;
use tracing::debug;

const USER_AGENT: &str = concat!("mxp-preview/", env!("CARGO_PKG_VERSION"));

/// HTTP client for the mixing backend render endpoints
#[derive(Clone)]
pub struct RenderClient {
    http_client: reqwest::Client,
    base_url: Url,
}

impl RenderClient {
    /// Create a client for `base_url`.
    ///
    /// `timeout` of `None` leaves requests unbounded, matching a backend that may
    /// take arbitrarily long to render.
    pub fn new(base_url: &str, timeout: Option<Duration>) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| Error::Config(format!("Invalid API base URL '{}': {}", base_url, e)))?;

        if base_url.cannot_be_a_base() {
            return Err(Error::Config(format!(
                "API base URL '{}' cannot carry a path",
                base_url
            )));
        }

        let mut builder = reqwest::Client::builder().user_agent(USER_AGENT);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let http_client = builder
            .build()
            .map_err(|e| Error::Network(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            base_url,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Render via the mix preview endpoint
    pub async fn render_mix_preview(&self, request: &PreviewRequest) -> Result<Vec<u8>> {
        let url = self.endpoint(&["api", "mix", "preview", request.session_id()], false)?;
        self.post_render(url, request).await
    }

    /// Render via the genre mixing session endpoint
    pub async fn render_genre_preview(&self, request: &PreviewRequest) -> Result<Vec<u8>> {
        let url = self.endpoint(
            &[
                "api",
                "genre_mixing",
                "sessions",
                request.session_id(),
                "preview",
            ],
            true,
        )?;
        self.post_render(url, request).await
    }

    fn endpoint(&self, segments: &[&str], trailing_slash: bool) -> Result<Url> {
        let mut url = self.base_url.clone();
        {
            let mut path = url.path_segments_mut().map_err(|_| {
                Error::Config(format!("API base URL '{}' cannot carry a path", self.base_url))
            })?;
            path.pop_if_empty().extend(segments);
            if trailing_slash {
                path.push("");
            }
        }
        Ok(url)
    }

    async fn post_render(&self, url: Url, request: &PreviewRequest) -> Result<Vec<u8>> {
        debug!(session_id = %request.session_id(), url = %url, "Requesting preview render");

        let response = self
            .http_client
            .post(url.clone())
            .header(reqwest::header::ACCEPT, request.format().content_type())
            .json(request)
            .send()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::HttpStatus {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;

        debug!(
            session_id = %request.session_id(),
            bytes = bytes.len(),
            "Preview render received"
        );
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::AudioPreviewOptions;

    fn request(session_id: &str) -> PreviewRequest {
        PreviewRequest::new(session_id, &AudioPreviewOptions::default(), 5.0)
    }

    #[test]
    fn test_invalid_base_url_rejected() {
        assert!(matches!(
            RenderClient::new("not a url", None),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            RenderClient::new("mailto:someone@example.com", None),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_mix_endpoint_path() {
        let client = RenderClient::new("http://localhost:8000", None).unwrap();
        let url = client
            .endpoint(&["api", "mix", "preview", request("s1").session_id()], false)
            .unwrap();
        assert_eq!(url.as_str(), "http://localhost:8000/api/mix/preview/s1");
    }

    #[test]
    fn test_genre_endpoint_keeps_base_path_and_trailing_slash() {
        let client = RenderClient::new("http://localhost:8000/backend/", None).unwrap();
        let url = client
            .endpoint(&["api", "genre_mixing", "sessions", "s 2", "preview"], true)
            .unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:8000/backend/api/genre_mixing/sessions/s%202/preview/"
        );
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_network_error() {
        // Port 9 (discard) on localhost is not expected to accept HTTP
        let client = RenderClient::new("http://127.0.0.1:9", Some(Duration::from_secs(2))).unwrap();
        let err = client.render_mix_preview(&request("s1")).await.unwrap_err();
        assert!(err.is_network());
    }
}
