//! Minimal OneBot v11 HTTP action client.
//!
//! Only the handful of actions needed to borrow credentials and media links
//! from a running bot are covered:
//! - `get_login_info`: identity of the logged-in bot account
//! - `get_cookies`: web cookies for a domain
//! - `nc_get_rkey`: raw media signing keys (NapCat extension)
//! - `get_image`: resolve a cached image token to a download URL
//! - `send_group_msg`: plain-text group message

mod client;
mod error;
mod models;

pub use client::OneBotClient;
pub use error::OneBotError;
pub use models::{ActionResponse, CookiesData, ImageData, LoginInfo, MessageId};
