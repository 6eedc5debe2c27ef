//! Credentials of the publish session.
//!
//! - [`CredentialSession`]: the authenticated client and its cookie swap
//! - [`KeepAliveMonitor`]: periodic validation and bot-sourced refresh
//! - [`CookieBootstrap`] / [`QrLogin`]: obtaining the first real cookie
//! - [`GatewayEndpoint`]: HTTP implementation of [`PublishEndpoint`]

mod bootstrap;
mod endpoint;
mod error;
mod gateway;
mod monitor;
mod qr_login;
mod refresh;
mod session;

pub use bootstrap::{BootstrapPolicy, CookieBootstrap};
pub use endpoint::{PublishEndpoint, PublishResponse, QrCode, QrPollStatus, UserInfo};
pub use error::{CredentialError, EndpointError};
pub use gateway::GatewayEndpoint;
pub use monitor::{
    DEFAULT_STARTUP_RECHECK_DELAY, FailureTracker, KeepAliveMonitor, SessionState,
    ensure_valid_on_startup,
};
pub use qr_login::{QrLogin, render_qr_terminal};
pub use refresh::{BotCookieRefresher, DEFAULT_COOKIE_DOMAIN, ManualRefresher, SessionRefresher};
pub use session::{Credential, CredentialSession, PLACEHOLDER_COOKIE, SessionPolicy, cookie_value};
