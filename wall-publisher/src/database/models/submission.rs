//! Submission database model.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::database::time::{ms_to_datetime, now_ms};
use crate::domain::{Submission, SubmissionStatus};
use crate::{Error, Result};

/// Row of the `submissions` table.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct SubmissionDbModel {
    pub id: i64,
    pub author_id: i64,
    pub author_name: String,
    pub text: String,
    /// JSON array of image references
    pub images: String,
    pub anonymous: bool,
    pub group_id: i64,
    /// Status: PENDING, APPROVED, REJECTED, PUBLISHED, FAILED
    pub status: String,
    pub rejection_reason: Option<String>,
    pub external_id: Option<String>,
    /// Unix epoch milliseconds
    pub created_at: i64,
    /// Unix epoch milliseconds of the last worker claim
    pub claimed_at: Option<i64>,
    pub claim_id: i64,
}

impl SubmissionDbModel {
    pub fn from_domain(submission: &Submission) -> Result<Self> {
        Ok(Self {
            id: submission.id,
            author_id: submission.author_id,
            author_name: submission.author_name.clone(),
            text: submission.text.clone(),
            images: serde_json::to_string(&submission.images)?,
            anonymous: submission.anonymous,
            group_id: submission.group_id,
            status: submission.status.as_str().to_string(),
            rejection_reason: submission.rejection_reason.clone(),
            external_id: submission.external_id.clone(),
            created_at: submission.created_at.timestamp_millis(),
            claimed_at: None,
            claim_id: submission.claim.unwrap_or_default(),
        })
    }

    pub fn into_domain(self) -> Result<Submission> {
        let status = SubmissionStatus::parse(&self.status).ok_or_else(|| {
            Error::validation(format!(
                "submission {} has unknown status '{}'",
                self.id, self.status
            ))
        })?;
        Ok(Submission {
            id: self.id,
            author_id: self.author_id,
            author_name: self.author_name,
            text: self.text,
            images: serde_json::from_str(&self.images)?,
            anonymous: self.anonymous,
            group_id: self.group_id,
            status,
            rejection_reason: self.rejection_reason,
            external_id: self.external_id,
            created_at: if self.created_at > 0 {
                ms_to_datetime(self.created_at)
            } else {
                ms_to_datetime(now_ms())
            },
            claim: None,
        })
    }
}
