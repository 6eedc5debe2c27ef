//! Submission status state machine.

use serde::{Deserialize, Serialize};

use crate::Error;

/// Moderation and publish states of a submission.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubmissionStatus {
    /// Waiting for a moderator.
    #[default]
    Pending,
    /// Accepted by a moderator, queued for publishing.
    Approved,
    /// Refused by a moderator.
    Rejected,
    /// Published to the external endpoint. Terminal.
    Published,
    /// Publishing failed after all retries.
    Failed,
}

impl SubmissionStatus {
    pub const ALL: [SubmissionStatus; 5] = [
        Self::Pending,
        Self::Approved,
        Self::Rejected,
        Self::Published,
        Self::Failed,
    ];

    /// Convert to database string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Approved => "APPROVED",
            Self::Rejected => "REJECTED",
            Self::Published => "PUBLISHED",
            Self::Failed => "FAILED",
        }
    }

    /// Parse from database string representation.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(Self::Pending),
            "APPROVED" => Some(Self::Approved),
            "REJECTED" => Some(Self::Rejected),
            "PUBLISHED" => Some(Self::Published),
            "FAILED" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Published never changes again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Published)
    }

    /// Validate a state transition.
    pub fn can_transition_to(&self, target: SubmissionStatus) -> bool {
        use SubmissionStatus::*;

        match (self, target) {
            // Same state is always allowed
            (from, to) if from == &to => true,

            // Moderation
            (Pending, Approved | Rejected) => true,

            // Publishing outcome
            (Approved, Published | Failed) => true,

            // Moderator sends the submission back to the queue
            (Failed | Rejected, Pending) => true,

            _ => false,
        }
    }

    /// Attempt to transition to a new state.
    pub fn transition_to(&self, target: SubmissionStatus) -> Result<SubmissionStatus, Error> {
        if self.can_transition_to(target) {
            Ok(target)
        } else {
            Err(Error::InvalidStateTransition {
                from: *self,
                to: target,
            })
        }
    }
}
