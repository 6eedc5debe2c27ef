//! Liveness probe for remote images.

use std::io::Cursor;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};

/// Largest prefix of a body read while probing.
pub const MAX_PROBE_BYTES: usize = 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("request failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("probe timed out")]
    Timeout,

    #[error("unexpected status {0}")]
    Status(StatusCode),

    #[error("empty body")]
    Empty,

    #[error("not an image: {0}")]
    Decode(String),
}

/// Checks whether a URL currently serves a decodable image.
#[async_trait]
pub trait ImageProber: Send + Sync {
    async fn probe(&self, url: &str) -> Result<(), ProbeError>;
}

/// Fetches up to [`MAX_PROBE_BYTES`] and decodes the image header.
#[derive(Debug, Clone)]
pub struct HttpImageProber {
    http: Client,
    timeout: Duration,
}

impl HttpImageProber {
    pub fn new(http: Client, timeout: Duration) -> Self {
        Self { http, timeout }
    }

    async fn fetch_prefix(&self, url: &str) -> Result<Vec<u8>, ProbeError> {
        let mut response = self.http.get(url).send().await?;
        if response.status() != StatusCode::OK {
            return Err(ProbeError::Status(response.status()));
        }

        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            let room = MAX_PROBE_BYTES - body.len();
            body.extend_from_slice(&chunk[..chunk.len().min(room)]);
            if body.len() >= MAX_PROBE_BYTES {
                break;
            }
        }
        Ok(body)
    }
}

#[async_trait]
impl ImageProber for HttpImageProber {
    async fn probe(&self, url: &str) -> Result<(), ProbeError> {
        let body = tokio::time::timeout(self.timeout, self.fetch_prefix(url))
            .await
            .map_err(|_| ProbeError::Timeout)??;
        decode_header(&body)
    }
}

/// Succeeds when `data` starts with a recognisable, decodable image header.
pub fn decode_header(data: &[u8]) -> Result<(), ProbeError> {
    if data.is_empty() {
        return Err(ProbeError::Empty);
    }
    image::ImageReader::new(Cursor::new(data))
        .with_guessed_format()
        .map_err(|e| ProbeError::Decode(e.to_string()))?
        .into_dimensions()
        .map(|_| ())
        .map_err(|e| ProbeError::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use image::{ImageFormat, Rgb, RgbImage};

    use super::*;

    fn png() -> Vec<u8> {
        let img = RgbImage::from_pixel(4, 3, Rgb([200, 10, 10]));
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, ImageFormat::Png).unwrap();
        buf.into_inner()
    }

    #[test]
    fn test_decode_header_accepts_image() {
        assert!(decode_header(&png()).is_ok());
    }

    #[test]
    fn test_decode_header_rejects_html() {
        assert!(matches!(
            decode_header(b"<html>403 Forbidden</html>"),
            Err(ProbeError::Decode(_))
        ));
        assert!(matches!(decode_header(b""), Err(ProbeError::Empty)));
    }
}
