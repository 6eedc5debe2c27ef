//! Processing of a single claimed submission.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, instrument, warn};

use super::{ImageRepairer, PublishError, PublishRateLimiter};
use crate::bots::BotRegistry;
use crate::credentials::CredentialSession;
use crate::database::SubmissionStore;
use crate::domain::{Submission, SubmissionStatus, is_remote};
use crate::render::Renderer;

/// Retry budget of a publish.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub retry_count: u32,
    pub retry_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retry_count: 2,
            retry_delay: Duration::from_secs(5),
        }
    }
}

/// Moves one approved submission to the publish endpoint and records the outcome.
pub struct SubmissionPublisher {
    store: Arc<dyn SubmissionStore>,
    session: Arc<CredentialSession>,
    renderer: Arc<dyn Renderer>,
    repairer: ImageRepairer,
    bots: Arc<dyn BotRegistry>,
    rate_limiter: Arc<PublishRateLimiter>,
    retry: RetryPolicy,
    show_author: bool,
    bot_timeout: Duration,
}

impl SubmissionPublisher {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn SubmissionStore>,
        session: Arc<CredentialSession>,
        renderer: Arc<dyn Renderer>,
        repairer: ImageRepairer,
        bots: Arc<dyn BotRegistry>,
        rate_limiter: Arc<PublishRateLimiter>,
        retry: RetryPolicy,
        bot_timeout: Duration,
    ) -> Self {
        Self {
            store,
            session,
            renderer,
            repairer,
            bots,
            rate_limiter,
            retry,
            show_author: false,
            bot_timeout,
        }
    }

    /// Prefix published text with the author's name for non-anonymous posts.
    pub fn with_show_author(mut self, show_author: bool) -> Self {
        self.show_author = show_author;
        self
    }

    pub fn store(&self) -> &Arc<dyn SubmissionStore> {
        &self.store
    }

    /// Publish `submission` with retries and persist the final status.
    ///
    /// The claim is renewed at the start of every attempt. Once another worker
    /// holds it, or the row has been finished elsewhere, processing stops
    /// without publishing.
    #[instrument(skip(self, submission), fields(submission_id = submission.id))]
    pub async fn process(&self, worker_id: usize, mut submission: Submission) -> SubmissionStatus {
        if self.repairer.repair_submission(&mut submission).await > 0 {
            match self.store.save(&mut submission).await {
                Ok(()) => {}
                Err(e) if e.is_claim_lost() => {
                    warn!(worker_id, "Submission changed hands before publishing");
                    return submission.status;
                }
                Err(e) => warn!(worker_id, error = %e, "Failed to persist repaired image links"),
            }
        }

        let render_view = self.resolve_local_tokens(&submission).await;
        let text = submission.publish_text(self.show_author);

        let mut last_error = None;
        for attempt in 0..=self.retry.retry_count {
            if attempt > 0 {
                info!(worker_id, attempt, "Retrying publish");
                tokio::time::sleep(self.retry.retry_delay).await;
            }
            match self
                .attempt(worker_id, &mut submission, &render_view, &text)
                .await
            {
                Ok(()) => return submission.status,
                Err(PublishError::ClaimLost) => {
                    warn!(worker_id, attempt, "Claim lost, leaving the submission to its new owner");
                    return submission.status;
                }
                Err(e) => {
                    warn!(worker_id, attempt, error = %e, "Publish attempt failed");
                    last_error = Some(e);
                }
            }
        }

        let reason = last_error.map_or_else(|| "no attempt made".to_string(), |e| e.to_string());
        error!(worker_id, reason = %reason, "Giving up on submission");
        self.record(&mut submission, Err(reason)).await;
        submission.status
    }

    /// One rate-limited render-and-publish attempt.
    ///
    /// A successful publish is persisted before the permit is released, so the
    /// next permit holder already sees the row as published.
    async fn attempt(
        &self,
        worker_id: usize,
        submission: &mut Submission,
        view: &Submission,
        text: &str,
    ) -> Result<(), PublishError> {
        let permit = self.rate_limiter.acquire().await;
        self.renew_claim(worker_id, submission).await?;

        let image = self.renderer.render_post(view).await?;
        let external_id = self.session.publish(text, &[image]).await?;
        info!(worker_id, external_id = %external_id, "Submission published");

        self.record(submission, Ok(external_id)).await;
        permit.record_success();
        Ok(())
    }

    async fn renew_claim(&self, worker_id: usize, submission: &Submission) -> Result<(), PublishError> {
        match self.store.renew_claim(submission).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(PublishError::ClaimLost),
            Err(e) => {
                // The final save still refuses rows finished elsewhere.
                warn!(worker_id, error = %e, "Failed to renew claim");
                Ok(())
            }
        }
    }

    async fn record(&self, submission: &mut Submission, outcome: Result<String, String>) {
        let transition = match outcome {
            Ok(external_id) => submission.mark_published(external_id),
            Err(reason) => submission.mark_failed(format!("publish failed: {reason}")),
        };
        if let Err(e) = transition {
            error!(error = %e, "Submission left the approved state while publishing");
            return;
        }
        match self.store.save(submission).await {
            Ok(()) => {}
            Err(e) if e.is_claim_lost() => {
                warn!(status = %submission.status, "Row was finished elsewhere, outcome not recorded");
            }
            Err(e) => {
                error!(status = %submission.status, error = %e, "Failed to persist publish outcome");
            }
        }
    }

    /// Copy of `submission` with bot-local file tokens turned into URLs.
    async fn resolve_local_tokens(&self, submission: &Submission) -> Submission {
        let mut view = submission.clone();
        if view.images.iter().all(|image| is_remote(image)) {
            return view;
        }

        let bots = self.bots.list();
        for image in view.images.iter_mut().filter(|image| !is_remote(image)) {
            for bot in &bots {
                match tokio::time::timeout(self.bot_timeout, bot.resolve_local_token(image)).await {
                    Ok(Ok(url)) => {
                        debug!(bot_id = bot.self_id(), "Local image token resolved");
                        *image = url;
                        break;
                    }
                    Ok(Err(e)) => debug!(bot_id = bot.self_id(), error = %e, "Token not resolved"),
                    Err(_) => debug!(bot_id = bot.self_id(), "Token resolution timed out"),
                }
            }
        }
        view
    }
}
