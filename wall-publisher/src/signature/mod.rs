//! Media signing keys ("rkeys").
//!
//! CDN links for chat media carry a short-lived `rkey` query parameter tied to
//! the kind of chat the media came from. [`SignatureCache`] keeps the freshest
//! known token per kind and rebuilds URLs with it.

mod blob;
mod cache;
pub mod url;

pub use blob::{ParsedKey, parse_blob};
pub use cache::{SignatureCache, SignatureEntry};

use std::fmt;

/// Resource-type code of a signing key. Unknown codes are kept as-is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceType(pub i32);

impl ResourceType {
    /// Direct-message media.
    pub const PRIVATE: Self = Self(10);
    /// Group media.
    pub const GROUP: Self = Self(20);

    /// Guess the key type from the `appid` query parameter of a media URL.
    pub fn from_appid(appid: &str) -> Option<Self> {
        match appid {
            "1406" => Some(Self::PRIVATE),
            "1407" => Some(Self::GROUP),
            _ => None,
        }
    }

    pub fn code(&self) -> i32 {
        self.0
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::PRIVATE => write!(f, "private"),
            Self::GROUP => write!(f, "group"),
            Self(code) => write!(f, "type-{code}"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SignatureError {
    #[error("malformed signature blob: {0}")]
    Parse(String),
}
