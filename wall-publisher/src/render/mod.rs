//! Rendering of submissions into a single publishable image.
//!
//! Layout is owned by an external render service; this module only speaks
//! its contract.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client;
use serde::Serialize;
use tracing::debug;
use url::Url;

use crate::domain::Submission;

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    /// No renderer is configured or reachable.
    #[error("renderer unavailable: {0}")]
    Unavailable(String),

    #[error("render request failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("renderer returned an invalid image: {0}")]
    InvalidImage(String),
}

#[async_trait]
pub trait Renderer: Send + Sync {
    /// Render `submission` (with resolved image URLs) to encoded image bytes.
    async fn render_post(&self, submission: &Submission) -> Result<Bytes, RenderError>;
}

/// Renderer used when none is configured. Always fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableRenderer;

#[async_trait]
impl Renderer for UnavailableRenderer {
    async fn render_post(&self, _submission: &Submission) -> Result<Bytes, RenderError> {
        Err(RenderError::Unavailable("no render service configured".to_string()))
    }
}

#[derive(Debug, Serialize)]
struct RenderRequest<'a> {
    id: i64,
    author_id: i64,
    author_name: &'a str,
    anonymous: bool,
    text: &'a str,
    images: &'a [String],
    created_at: i64,
}

/// Posts the submission as JSON to a render service and returns the image body.
#[derive(Debug, Clone)]
pub struct HttpRenderer {
    http: Client,
    url: Url,
}

impl HttpRenderer {
    pub fn new(http: Client, url: &str) -> Result<Self, RenderError> {
        let url =
            Url::parse(url).map_err(|e| RenderError::Unavailable(format!("bad render url: {e}")))?;
        Ok(Self { http, url })
    }
}

#[async_trait]
impl Renderer for HttpRenderer {
    async fn render_post(&self, submission: &Submission) -> Result<Bytes, RenderError> {
        let request = RenderRequest {
            id: submission.id,
            author_id: if submission.anonymous { 0 } else { submission.author_id },
            author_name: if submission.anonymous { "" } else { &submission.author_name },
            anonymous: submission.anonymous,
            text: &submission.text,
            images: &submission.images,
            created_at: submission.created_at.timestamp(),
        };

        let response = self
            .http
            .post(self.url.clone())
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    RenderError::Unavailable(e.to_string())
                } else {
                    RenderError::Network(e)
                }
            })?
            .error_for_status()?;
        let body = response.bytes().await?;

        image::guess_format(&body).map_err(|e| RenderError::InvalidImage(e.to_string()))?;
        debug!(submission_id = submission.id, bytes = body.len(), "Submission rendered");
        Ok(body)
    }
}
