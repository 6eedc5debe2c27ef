//! Submission entity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::SubmissionStatus;
use crate::Error;

/// A unit of user-contributed content moving through moderation and publishing.
///
/// `images` holds either remote URLs (possibly carrying an `rkey` signature) or
/// opaque local file tokens issued by the bot that received the submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Submission {
    /// Store-assigned identifier. `0` until the first save.
    pub id: i64,
    pub author_id: i64,
    pub author_name: String,
    pub text: String,
    pub images: Vec<String>,
    pub anonymous: bool,
    pub group_id: i64,
    pub status: SubmissionStatus,
    pub rejection_reason: Option<String>,
    pub external_id: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Claim handed out by the store to the worker processing this submission.
    #[serde(skip)]
    pub claim: Option<i64>,
}

impl Submission {
    /// Create a new pending submission.
    pub fn new(author_id: i64, author_name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: 0,
            author_id,
            author_name: author_name.into(),
            text: text.into(),
            images: Vec::new(),
            anonymous: false,
            group_id: 0,
            status: SubmissionStatus::Pending,
            rejection_reason: None,
            external_id: None,
            created_at: Utc::now(),
            claim: None,
        }
    }

    pub fn with_images<I, S>(mut self, images: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.images = images.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_group(mut self, group_id: i64) -> Self {
        self.group_id = group_id;
        self
    }

    pub fn with_anonymous(mut self, anonymous: bool) -> Self {
        self.anonymous = anonymous;
        self
    }

    /// Whether the store has assigned an id yet.
    pub fn is_new(&self) -> bool {
        self.id <= 0
    }

    pub fn approve(&mut self) -> Result<(), Error> {
        self.status = self.status.transition_to(SubmissionStatus::Approved)?;
        self.rejection_reason = None;
        Ok(())
    }

    pub fn reject(&mut self, reason: impl Into<String>) -> Result<(), Error> {
        self.status = self.status.transition_to(SubmissionStatus::Rejected)?;
        self.rejection_reason = Some(reason.into());
        Ok(())
    }

    /// Send a failed or rejected submission back to the moderation queue.
    pub fn requeue(&mut self) -> Result<(), Error> {
        self.status = self.status.transition_to(SubmissionStatus::Pending)?;
        self.rejection_reason = None;
        Ok(())
    }

    /// Record a successful publish.
    pub fn mark_published(&mut self, external_id: impl Into<String>) -> Result<(), Error> {
        self.status = self.status.transition_to(SubmissionStatus::Published)?;
        self.external_id = Some(external_id.into());
        self.rejection_reason = None;
        Ok(())
    }

    /// Record an exhausted publish attempt.
    pub fn mark_failed(&mut self, reason: impl Into<String>) -> Result<(), Error> {
        self.status = self.status.transition_to(SubmissionStatus::Failed)?;
        self.rejection_reason = Some(reason.into());
        Ok(())
    }

    /// Image references carrying a CDN signature.
    pub fn signed_images(&self) -> impl Iterator<Item = (usize, &str)> {
        self.images
            .iter()
            .enumerate()
            .filter(|(_, url)| is_remote(url) && url.contains("rkey="))
            .map(|(i, url)| (i, url.as_str()))
    }

    /// Text as it should appear on the wall.
    pub fn publish_text(&self, show_author: bool) -> String {
        if !show_author || self.anonymous {
            return self.text.clone();
        }
        let name = if self.author_name.trim().is_empty() {
            self.author_id.to_string()
        } else {
            self.author_name.clone()
        };
        format!("【来自 {name} 的投稿】\n\n{}", self.text)
    }
}

/// Remote references are fetched over HTTP; anything else is a bot-local token.
pub fn is_remote(reference: &str) -> bool {
    reference.starts_with("http://") || reference.starts_with("https://")
}
