//! Database models.

mod submission;

pub use submission::SubmissionDbModel;
