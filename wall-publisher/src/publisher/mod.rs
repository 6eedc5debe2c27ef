//! Publish pipeline: claim, repair, render, publish, record.

mod probe;
mod publish;
mod rate_limit;
mod repair;
mod worker_pool;

pub use probe::{HttpImageProber, ImageProber, MAX_PROBE_BYTES, ProbeError, decode_header};
pub use publish::{RetryPolicy, SubmissionPublisher};
pub use rate_limit::{PublishRateLimiter, RatePermit};
pub use repair::ImageRepairer;
pub use worker_pool::{PublishWorkerPool, WorkerPoolConfig, poll_once};

use crate::credentials::CredentialError;
use crate::render::RenderError;

/// Failure of a single publish attempt.
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("render: {0}")]
    Render(#[from] RenderError),

    #[error("publish: {0}")]
    Credential(#[from] CredentialError),

    #[error("claim lost")]
    ClaimLost,
}
