use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::{debug, info, instrument, warn};
use url::Url;

use super::url::{RKEY_PARAM, query_param, replace_query_param};
use super::{ParsedKey, ResourceType, SignatureError, parse_blob};
use crate::bots::BotRegistry;

/// Attempts made by [`SignatureCache::warm_up`].
pub const WARM_UP_ATTEMPTS: u32 = 60;
/// Delay between warm-up attempts.
pub const WARM_UP_INTERVAL: Duration = Duration::from_secs(1);

/// Latest token known for one resource type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureEntry {
    pub token: String,
    pub fetched_at: DateTime<Utc>,
    /// Bot account the token was pulled from.
    pub source_bot: i64,
}

/// In-memory cache of signing tokens, keyed by resource type.
///
/// Entries never expire on their own; a token is only known to be stale when a
/// probe using it fails.
pub struct SignatureCache {
    entries: DashMap<ResourceType, SignatureEntry>,
    bots: Arc<dyn BotRegistry>,
    call_timeout: Duration,
}

impl SignatureCache {
    pub fn new(bots: Arc<dyn BotRegistry>, call_timeout: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            bots,
            call_timeout,
        }
    }

    /// Fold a raw blob into the cache. Returns the pairs that were stored.
    pub fn update_from_raw(
        &self,
        raw: &[u8],
        source_bot: i64,
    ) -> Result<Vec<(ResourceType, String)>, SignatureError> {
        let keys = parse_blob(raw)?;
        let now = Utc::now();
        Ok(keys
            .into_iter()
            .map(|ParsedKey { resource_type, token, .. }| {
                self.entries.insert(
                    resource_type,
                    SignatureEntry {
                        token: token.clone(),
                        fetched_at: now,
                        source_bot,
                    },
                );
                (resource_type, token)
            })
            .collect())
    }

    /// Store a single token.
    pub fn insert(&self, resource_type: ResourceType, token: impl Into<String>, source_bot: i64) {
        self.entries.insert(
            resource_type,
            SignatureEntry {
                token: token.into(),
                fetched_at: Utc::now(),
                source_bot,
            },
        );
    }

    pub fn get(&self, resource_type: ResourceType) -> Option<String> {
        self.entries
            .get(&resource_type)
            .map(|entry| entry.token.clone())
    }

    pub fn entry(&self, resource_type: ResourceType) -> Option<SignatureEntry> {
        self.entries.get(&resource_type).map(|e| e.value().clone())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Cached tokens in type-code order.
    fn tokens_by_type(&self) -> Vec<(ResourceType, String)> {
        let mut tokens: Vec<_> = self
            .entries
            .iter()
            .map(|e| (*e.key(), e.value().token.clone()))
            .collect();
        tokens.sort_by_key(|(resource_type, _)| *resource_type);
        tokens
    }

    /// Re-signed variants of `url`, best guess first.
    ///
    /// Only URLs that already carry an `rkey` parameter are considered. The
    /// input itself is never returned.
    pub fn candidates_for_url(&self, url: &str) -> Vec<String> {
        let Ok(parsed) = Url::parse(url) else {
            return Vec::new();
        };
        if query_param(&parsed, RKEY_PARAM).is_none() {
            return Vec::new();
        }

        let primary = query_param(&parsed, "appid")
            .as_deref()
            .and_then(ResourceType::from_appid);
        let mut tokens = self.tokens_by_type();
        if let Some(primary) = primary {
            // Stable sort keeps the rest in type-code order.
            tokens.sort_by_key(|(resource_type, _)| *resource_type != primary);
        }

        let mut out: Vec<String> = Vec::with_capacity(tokens.len());
        for (_, token) in tokens {
            let Some(candidate) = replace_query_param(&parsed, RKEY_PARAM, &token) else {
                continue;
            };
            let candidate = candidate.to_string();
            if candidate != url && candidate != parsed.as_str() && !out.contains(&candidate) {
                out.push(candidate);
            }
        }
        out
    }

    /// Pull blobs from every connected bot and fold them in.
    ///
    /// Returns the freshest token obtained, or `None` if no bot yielded one.
    #[instrument(skip(self))]
    pub async fn refresh_from_bots(&self) -> Option<String> {
        let bots = self.bots.list();
        if bots.is_empty() {
            debug!("No bot connected; signature refresh skipped");
            return None;
        }

        let mut freshest = None;
        for bot in bots {
            let bot_id = bot.self_id();
            let raw = match tokio::time::timeout(self.call_timeout, bot.raw_signature_blob()).await
            {
                Ok(Ok(raw)) => raw,
                Ok(Err(e)) => {
                    debug!(bot_id, error = %e, "Bot did not return a signature blob");
                    continue;
                }
                Err(_) => {
                    debug!(bot_id, "Signature blob request timed out");
                    continue;
                }
            };
            match self.update_from_raw(&raw, bot_id) {
                Ok(pairs) if !pairs.is_empty() => {
                    debug!(bot_id, keys = pairs.len(), "Signature keys refreshed");
                    // Group media is the common case, so prefer its token.
                    freshest = pairs
                        .iter()
                        .find(|(t, _)| *t == ResourceType::GROUP)
                        .or_else(|| pairs.first())
                        .map(|(_, token)| token.clone());
                }
                Ok(_) => debug!(bot_id, "Signature blob carried no keys"),
                Err(e) => warn!(bot_id, error = %e, "Ignoring malformed signature blob"),
            }
        }
        freshest
    }

    /// Poll the bots until the cache holds any token, with the default schedule.
    pub async fn warm_up(&self) -> bool {
        self.warm_up_with(WARM_UP_ATTEMPTS, WARM_UP_INTERVAL).await
    }

    pub async fn warm_up_with(&self, attempts: u32, interval: Duration) -> bool {
        for attempt in 1..=attempts {
            if !self.is_empty() || self.refresh_from_bots().await.is_some() {
                info!(attempt, "Signature cache warmed");
                return true;
            }
            tokio::time::sleep(interval).await;
        }
        warn!(attempts, "Signature cache warm-up gave up: no bot yielded a key");
        false
    }
}
