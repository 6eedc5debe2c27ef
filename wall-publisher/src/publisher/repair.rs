//! Repair of expired media signatures.

use std::sync::Arc;

use tracing::{debug, info, warn};

use super::ImageProber;
use crate::domain::Submission;
use crate::signature::SignatureCache;

/// Rewrites dead signed image URLs with a token that the CDN accepts.
pub struct ImageRepairer {
    prober: Arc<dyn ImageProber>,
    signatures: Arc<SignatureCache>,
}

impl ImageRepairer {
    pub fn new(prober: Arc<dyn ImageProber>, signatures: Arc<SignatureCache>) -> Self {
        Self { prober, signatures }
    }

    async fn first_live(&self, url: &str) -> Option<String> {
        for candidate in self.signatures.candidates_for_url(url) {
            match self.prober.probe(&candidate).await {
                Ok(()) => return Some(candidate),
                Err(e) => debug!(candidate = %candidate, error = %e, "Candidate rejected"),
            }
        }
        None
    }

    /// Find a working variant of a dead `url`.
    ///
    /// Cached tokens are tried first; bots are asked for fresh ones only when
    /// none of them works.
    pub async fn repair_url(&self, url: &str) -> Option<String> {
        if let Some(fixed) = self.first_live(url).await {
            return Some(fixed);
        }
        self.signatures.refresh_from_bots().await;
        self.first_live(url).await
    }

    /// Probe every signed image of `submission` and repair the dead ones in
    /// place. Returns how many references were rewritten.
    pub async fn repair_submission(&self, submission: &mut Submission) -> usize {
        let signed: Vec<(usize, String)> = submission
            .signed_images()
            .map(|(i, url)| (i, url.trim().to_string()))
            .collect();

        let mut repaired = 0;
        for (index, url) in signed {
            match self.prober.probe(&url).await {
                Ok(()) => continue,
                Err(e) => debug!(submission_id = submission.id, error = %e, "Signed image is dead"),
            }
            match self.repair_url(&url).await {
                Some(fixed) => {
                    info!(submission_id = submission.id, url = %fixed, "Image signature refreshed");
                    submission.images[index] = fixed;
                    repaired += 1;
                }
                None => warn!(
                    submission_id = submission.id,
                    url = %url,
                    "No signing key revived this image; leaving it as-is"
                ),
            }
        }
        repaired
    }
}
