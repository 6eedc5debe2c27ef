//! Repository layer.

pub mod submission;

pub use submission::{MemorySubmissionStore, SqliteSubmissionStore, SubmissionStore};
