//! Submission domain module.

mod entity;
mod status;

pub use entity::{Submission, is_remote};
pub use status::SubmissionStatus;
