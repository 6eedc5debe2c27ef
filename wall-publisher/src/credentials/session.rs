//! Authenticated access to the publish endpoint.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::Utc;
use parking_lot::RwLock;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use super::{CredentialError, EndpointError, PublishEndpoint, SessionRefresher, UserInfo};

/// Inert cookie the session starts with until a real one is obtained.
pub const PLACEHOLDER_COOKIE: &str = "uin=o1;skey=@bootstrap;p_skey=bootstrap";

/// A parsed cookie plus the account it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    cookie: String,
    uin: i64,
    generation: u64,
}

impl Credential {
    /// Parse a `k=v; k=v` cookie string.
    ///
    /// The cookie must carry a positive `uin` (the `o` prefix and leading
    /// zeros are ignored) and a non-empty `skey` or `p_skey`.
    pub fn parse(cookie: &str) -> Result<Self, CredentialError> {
        let cookie = cookie.trim();
        let uin = cookie_value(cookie, "uin")
            .ok_or_else(|| CredentialError::InvalidCookie("missing uin".to_string()))?;
        let uin = parse_uin(uin)
            .ok_or_else(|| CredentialError::InvalidCookie(format!("unparseable uin '{uin}'")))?;

        let has_key = ["skey", "p_skey"]
            .iter()
            .any(|name| cookie_value(cookie, name).is_some_and(|v| !v.is_empty()));
        if !has_key {
            return Err(CredentialError::InvalidCookie(
                "missing skey and p_skey".to_string(),
            ));
        }

        Ok(Self {
            cookie: cookie.to_string(),
            uin,
            generation: 0,
        })
    }

    pub fn cookie(&self) -> &str {
        &self.cookie
    }

    pub fn uin(&self) -> i64 {
        self.uin
    }

    /// Incremented on every swap; `0` for the credential the session started with.
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Value of `name` in a `k=v; k=v` cookie string.
pub fn cookie_value<'a>(cookie: &'a str, name: &str) -> Option<&'a str> {
    cookie
        .split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(k, _)| k.trim() == name)
        .map(|(_, v)| v.trim())
}

fn parse_uin(raw: &str) -> Option<i64> {
    let digits = raw.trim_start_matches(['o', 'O']).trim_start_matches('0');
    digits.parse::<i64>().ok().filter(|uin| *uin > 0)
}

/// Timeout and retry policy of a [`CredentialSession`].
#[derive(Debug, Clone, Copy)]
pub struct SessionPolicy {
    /// Applied to every endpoint call.
    pub timeout: Duration,
    /// Retries after an authentication failure.
    pub max_retry: u32,
}

impl Default for SessionPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_retry: 2,
        }
    }
}

/// Single point of authenticated access to the publish endpoint.
///
/// The active [`Credential`] is swapped atomically. Every call captures the
/// credential once when it starts, so a swap never affects a call in flight.
pub struct CredentialSession {
    endpoint: Arc<dyn PublishEndpoint>,
    current: RwLock<Arc<Credential>>,
    refresher: Arc<dyn SessionRefresher>,
    refresh_lock: Mutex<()>,
    policy: SessionPolicy,
}

impl CredentialSession {
    pub fn new(
        endpoint: Arc<dyn PublishEndpoint>,
        cookie: &str,
        policy: SessionPolicy,
        refresher: Arc<dyn SessionRefresher>,
    ) -> Result<Self, CredentialError> {
        let credential = Credential::parse(cookie)?;
        Ok(Self {
            endpoint,
            current: RwLock::new(Arc::new(credential)),
            refresher,
            refresh_lock: Mutex::new(()),
            policy,
        })
    }

    /// Session holding [`PLACEHOLDER_COOKIE`].
    pub fn with_placeholder(
        endpoint: Arc<dyn PublishEndpoint>,
        policy: SessionPolicy,
        refresher: Arc<dyn SessionRefresher>,
    ) -> Result<Self, CredentialError> {
        Self::new(endpoint, PLACEHOLDER_COOKIE, policy, refresher)
    }

    pub fn current(&self) -> Arc<Credential> {
        self.current.read().clone()
    }

    pub fn uin(&self) -> i64 {
        self.current().uin()
    }

    pub fn cookie(&self) -> String {
        self.current().cookie().to_string()
    }

    pub fn generation(&self) -> u64 {
        self.current().generation()
    }

    pub fn endpoint(&self) -> &Arc<dyn PublishEndpoint> {
        &self.endpoint
    }

    pub fn policy(&self) -> SessionPolicy {
        self.policy
    }

    /// Validate and swap in a new cookie.
    pub fn update_cookie(&self, cookie: &str) -> Result<Arc<Credential>, CredentialError> {
        let mut credential = Credential::parse(cookie)?;
        let credential = {
            let mut current = self.current.write();
            credential.generation = current.generation() + 1;
            let credential = Arc::new(credential);
            *current = credential.clone();
            credential
        };
        info!(
            uin = credential.uin(),
            generation = credential.generation(),
            "Session cookie updated"
        );
        Ok(credential)
    }

    /// Check whether the current cookie is accepted.
    ///
    /// This reports the endpoint's verdict as-is; it never triggers a refresh.
    pub async fn identity_check(&self) -> Result<UserInfo, CredentialError> {
        let credential = self.current();
        let info = self
            .timed(self.endpoint.user_info(credential.cookie()))
            .await?;
        debug!(uin = info.uin, nickname = %info.nickname, "Identity check passed");
        Ok(info)
    }

    /// Publish `text` with already-rendered images.
    ///
    /// Returns the external identifier, or `published_<unix>` when the
    /// endpoint does not supply one.
    #[instrument(skip(self, text, images), fields(images = images.len()))]
    pub async fn publish(&self, text: &str, images: &[Bytes]) -> Result<String, CredentialError> {
        self.call_with_refresh(|credential| async move {
            let response = self
                .timed(self.endpoint.publish(credential.cookie(), text, images))
                .await?;
            if !response.ok {
                return Err(EndpointError::Api {
                    code: response.code,
                    message: response.message,
                });
            }
            Ok(response
                .external_id
                .unwrap_or_else(|| format!("published_{}", Utc::now().timestamp())))
        })
        .await
    }

    async fn timed<T>(
        &self,
        call: impl Future<Output = Result<T, EndpointError>>,
    ) -> Result<T, EndpointError> {
        tokio::time::timeout(self.policy.timeout, call)
            .await
            .map_err(|_| EndpointError::Timeout(self.policy.timeout))?
    }

    async fn call_with_refresh<T, F, Fut>(&self, call: F) -> Result<T, CredentialError>
    where
        F: Fn(Arc<Credential>) -> Fut,
        Fut: Future<Output = Result<T, EndpointError>>,
    {
        let mut retries = 0;
        loop {
            let credential = self.current();
            let error = match call(credential.clone()).await {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };
            if !error.is_auth_expired() || retries >= self.policy.max_retry {
                return Err(error.into());
            }
            retries += 1;
            warn!(
                uin = credential.uin(),
                retry = retries,
                error = %error,
                "Endpoint rejected the session cookie"
            );
            if let Err(refresh_error) = self.refresh_after(&credential).await {
                warn!(error = %refresh_error, "Session refresh failed");
                return Err(error.into());
            }
        }
    }

    /// Single-flight refresh. A caller whose credential was already replaced
    /// just retries with the current one.
    async fn refresh_after(&self, stale: &Credential) -> Result<(), CredentialError> {
        let _guard = self.refresh_lock.lock().await;
        if self.generation() != stale.generation() {
            debug!("Session already refreshed by another caller");
            return Ok(());
        }
        let cookie = self.refresher.refresh().await?;
        self.update_cookie(&cookie)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cookie() {
        let credential = Credential::parse("uin=o0012345; skey=@abc; p_skey=xyz").unwrap();
        assert_eq!(credential.uin(), 12345);
        assert_eq!(credential.generation(), 0);
    }

    #[test]
    fn test_parse_placeholder() {
        let credential = Credential::parse(PLACEHOLDER_COOKIE).unwrap();
        assert_eq!(credential.uin(), 1);
    }

    #[test]
    fn test_p_skey_alone_is_enough() {
        assert!(Credential::parse("uin=12345; p_skey=xyz").is_ok());
    }

    #[test]
    fn test_invalid_cookies() {
        for cookie in [
            "",
            "skey=abc",
            "uin=o0; skey=abc",
            "uin=oabc; skey=abc",
            "uin=o123",
            "uin=o123; skey=; p_skey=",
        ] {
            assert!(
                matches!(Credential::parse(cookie), Err(CredentialError::InvalidCookie(_))),
                "{cookie:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_cookie_value() {
        let cookie = "uin=o1; skey=a=b; p_skey=c";
        assert_eq!(cookie_value(cookie, "skey"), Some("a=b"));
        assert_eq!(cookie_value(cookie, "p_skey"), Some("c"));
        assert_eq!(cookie_value(cookie, "missing"), None);
    }
}
