//! wall-publisher library crate.
//!
//! Moves approved wall submissions to the external publish endpoint and keeps
//! the credentials that path depends on alive:
//! - [`publisher`]: worker pool, rate limiter, signed-media repair
//! - [`credentials`]: credential session, keep-alive monitor, cookie bootstrap
//! - [`signature`]: per-resource-type signing key cache
//! - [`bots`]: registry of live inbound bot connections

pub mod bots;
pub mod config;
pub mod credentials;
pub mod database;
pub mod domain;
pub mod error;
pub mod logging;
pub mod notification;
pub mod publisher;
pub mod render;
pub mod signature;
pub mod utils;

pub use error::{Error, Result};
