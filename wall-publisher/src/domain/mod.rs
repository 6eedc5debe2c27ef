//! Domain layer for wall-publisher.
//!
//! This module contains the submission entity and its status state machine.

pub mod submission;

pub use submission::{Submission, SubmissionStatus, is_remote};
