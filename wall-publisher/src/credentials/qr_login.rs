//! QR code login fallback.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use super::{CredentialError, EndpointError, PublishEndpoint, QrPollStatus};

/// Default delay between polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);
/// Default poll budget (four minutes at the default interval).
pub const DEFAULT_MAX_POLLS: u32 = 120;

pub struct QrLogin {
    endpoint: Arc<dyn PublishEndpoint>,
    poll_interval: Duration,
    max_polls: u32,
    call_timeout: Duration,
}

impl QrLogin {
    pub fn new(endpoint: Arc<dyn PublishEndpoint>, call_timeout: Duration) -> Self {
        Self {
            endpoint,
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_polls: DEFAULT_MAX_POLLS,
            call_timeout,
        }
    }

    pub fn with_polling(mut self, poll_interval: Duration, max_polls: u32) -> Self {
        self.poll_interval = poll_interval;
        self.max_polls = max_polls;
        self
    }

    /// Show a QR code in the terminal and wait for it to be confirmed.
    ///
    /// Returns the cookie of the logged-in account.
    pub async fn login(&self) -> Result<String, CredentialError> {
        info!("Requesting login QR code");
        let qr = self.timed(self.endpoint.request_qr()).await?;
        match render_qr_terminal(&qr.image) {
            Some(art) => info!("Scan the QR code below to log in:\n{art}"),
            None => warn!("Could not decode the QR image for terminal output"),
        }

        for _ in 0..self.max_polls {
            tokio::time::sleep(self.poll_interval).await;
            match self.timed(self.endpoint.poll_qr(&qr.token)).await? {
                QrPollStatus::Waiting => {}
                QrPollStatus::Scanned => info!("QR code scanned, waiting for confirmation"),
                QrPollStatus::Success(cookie) => {
                    info!("QR login succeeded");
                    return Ok(cookie);
                }
                QrPollStatus::Expired => return Err(CredentialError::QrExpired),
            }
        }
        Err(CredentialError::QrTimeout {
            polls: self.max_polls,
        })
    }

    async fn timed<T>(
        &self,
        call: impl Future<Output = Result<T, EndpointError>>,
    ) -> Result<T, CredentialError> {
        tokio::time::timeout(self.call_timeout, call)
            .await
            .map_err(|_| EndpointError::Timeout(self.call_timeout))?
            .map_err(CredentialError::from)
    }
}

/// Render a QR image as terminal block art, one pixel per two columns.
pub fn render_qr_terminal(png: &[u8]) -> Option<String> {
    let img = image::load_from_memory(png).ok()?.to_luma8();
    let (width, height) = img.dimensions();
    if width == 0 || height == 0 {
        return None;
    }

    let margin = "  ".repeat(width as usize + 4);
    let mut out = String::with_capacity((width as usize * 2 + 8) * (height as usize + 2) * 3);
    out.push_str(&margin);
    out.push('\n');
    for y in 0..height {
        out.push_str("    ");
        for x in 0..width {
            let dark = img.get_pixel(x, y).0[0] < 0x80;
            out.push_str(if dark { "██" } else { "  " });
        }
        out.push_str("    \n");
    }
    out.push_str(&margin);
    Some(out)
}
