use std::{sync::OnceLock, time::Duration};

use tracing::{debug, warn};

const USER_AGENT: &str = concat!("wall-publisher/", env!("CARGO_PKG_VERSION"));

/// reqwest is built without a bundled crypto provider; install aws-lc-rs once.
pub fn install_rustls_provider() {
    static PROVIDER_INSTALLED: OnceLock<()> = OnceLock::new();
    PROVIDER_INSTALLED.get_or_init(|| {
        if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
            debug!(existing_provider = ?e, "rustls CryptoProvider already installed");
        }
    });
}

/// Build a `reqwest::Client` whose requests all carry `request_timeout`.
pub fn build_http_client(request_timeout: Duration) -> reqwest::Client {
    install_rustls_provider();

    let mut builder = reqwest::Client::builder().user_agent(USER_AGENT);
    if request_timeout > Duration::ZERO {
        builder = builder
            .timeout(request_timeout)
            .connect_timeout(request_timeout.min(Duration::from_secs(10)));
    }

    builder.build().unwrap_or_else(|error| {
        warn!(error = %error, "Failed to build HTTP client; falling back to reqwest defaults");
        reqwest::Client::new()
    })
}
