//! Crate-wide error type.
//!
//! Covers storage, configuration and the submission state machine. The
//! credential and publish paths have their own error enums, see
//! [`crate::credentials::CredentialError`] and [`crate::publisher::PublishError`].

use thiserror::Error;

use crate::domain::SubmissionStatus;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("malformed JSON column: {0}")]
    Json(#[from] serde_json::Error),

    #[error("submission cannot move from {from} to {to}")]
    InvalidStateTransition {
        from: SubmissionStatus,
        to: SubmissionStatus,
    },

    #[error("{entity} {id} does not exist")]
    NotFound { entity: &'static str, id: i64 },

    #[error("submission {id} was claimed by another worker or already finished")]
    ClaimLost { id: i64 },

    #[error("invalid record: {0}")]
    Validation(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("logging setup failed: {0}")]
    Logging(String),
}

impl Error {
    pub fn not_found(entity: &'static str, id: i64) -> Self {
        Self::NotFound { entity, id }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_claim_lost(&self) -> bool {
        matches!(self, Self::ClaimLost { .. })
    }
}
