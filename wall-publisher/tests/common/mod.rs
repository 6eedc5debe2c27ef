//! Hand-written stubs for the collaborator traits.
#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::time::Instant;

use wall_publisher::bots::{BotConnection, BotError, BotRegistry, ConnectionRegistry};
use wall_publisher::credentials::{
    CredentialError, CredentialSession, EndpointError, PublishEndpoint, PublishResponse, QrCode,
    QrPollStatus, SessionPolicy, SessionRefresher, UserInfo, cookie_value,
};
use wall_publisher::domain::Submission;
use wall_publisher::publisher::{ImageProber, ProbeError};
use wall_publisher::render::{RenderError, Renderer};

pub const COOKIE_A: &str = "uin=o10001; skey=@aaaa; p_skey=aaaa";
pub const COOKIE_B: &str = "uin=o10002; skey=@bbbb; p_skey=bbbb";

/// One recorded publish call.
#[derive(Debug, Clone)]
pub struct PublishCall {
    pub cookie: String,
    pub text: String,
    pub images: usize,
    pub at: Instant,
}

/// Publish endpoint that accepts a configurable set of cookies.
#[derive(Default)]
pub struct StubEndpoint {
    accepted: Mutex<HashSet<String>>,
    fail_publish: AtomicBool,
    calls: Mutex<Vec<PublishCall>>,
    user_info_calls: AtomicUsize,
    next_id: AtomicUsize,
    /// When set, `publish` signals `entered` and waits for `release`.
    hold: AtomicBool,
    pub entered: Notify,
    pub release: Notify,
    qr_script: Mutex<VecDeque<QrPollStatus>>,
}

impl StubEndpoint {
    pub fn accepting(cookies: &[&str]) -> Arc<Self> {
        let endpoint = Self::default();
        endpoint.accept(cookies);
        Arc::new(endpoint)
    }

    pub fn accept(&self, cookies: &[&str]) {
        let mut accepted = self.accepted.lock();
        accepted.clear();
        accepted.extend(cookies.iter().map(|c| c.to_string()));
    }

    pub fn set_fail_publish(&self, fail: bool) {
        self.fail_publish.store(fail, Ordering::SeqCst);
    }

    pub fn set_hold(&self, hold: bool) {
        self.hold.store(hold, Ordering::SeqCst);
    }

    pub fn script_qr(&self, statuses: impl IntoIterator<Item = QrPollStatus>) {
        self.qr_script.lock().extend(statuses);
    }

    pub fn calls(&self) -> Vec<PublishCall> {
        self.calls.lock().clone()
    }

    pub fn publish_count(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn user_info_count(&self) -> usize {
        self.user_info_calls.load(Ordering::SeqCst)
    }

    fn check(&self, cookie: &str) -> Result<(), EndpointError> {
        if self.accepted.lock().contains(cookie) {
            Ok(())
        } else {
            Err(EndpointError::AuthExpired("cookie rejected".to_string()))
        }
    }
}

#[async_trait]
impl PublishEndpoint for StubEndpoint {
    async fn publish(
        &self,
        cookie: &str,
        text: &str,
        images: &[Bytes],
    ) -> Result<PublishResponse, EndpointError> {
        self.calls.lock().push(PublishCall {
            cookie: cookie.to_string(),
            text: text.to_string(),
            images: images.len(),
            at: Instant::now(),
        });
        if self.hold.load(Ordering::SeqCst) {
            self.entered.notify_one();
            self.release.notified().await;
        }
        self.check(cookie)?;
        if self.fail_publish.load(Ordering::SeqCst) {
            return Ok(PublishResponse {
                ok: false,
                code: -1,
                message: "endpoint unavailable".to_string(),
                external_id: None,
            });
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(PublishResponse {
            ok: true,
            code: 0,
            message: String::new(),
            external_id: Some(format!("post-{id}")),
        })
    }

    async fn user_info(&self, cookie: &str) -> Result<UserInfo, EndpointError> {
        self.user_info_calls.fetch_add(1, Ordering::SeqCst);
        self.check(cookie)?;
        let uin = cookie_value(cookie, "uin")
            .map(|v| v.trim_start_matches('o'))
            .and_then(|v| v.parse().ok())
            .unwrap_or_default();
        Ok(UserInfo {
            uin,
            nickname: "wall".to_string(),
        })
    }

    async fn request_qr(&self) -> Result<QrCode, EndpointError> {
        Ok(QrCode {
            image: Bytes::from_static(b"not a png"),
            token: "qr-token".to_string(),
        })
    }

    async fn poll_qr(&self, _token: &str) -> Result<QrPollStatus, EndpointError> {
        Ok(self
            .qr_script
            .lock()
            .pop_front()
            .unwrap_or(QrPollStatus::Waiting))
    }
}

/// Refresher handing out a fixed cookie, or failing when it has none.
pub struct StubRefresher {
    cookie: Mutex<Option<String>>,
    delay: Duration,
    calls: AtomicUsize,
}

impl StubRefresher {
    pub fn new(cookie: Option<&str>) -> Arc<Self> {
        Self::with_delay(cookie, Duration::ZERO)
    }

    pub fn with_delay(cookie: Option<&str>, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            cookie: Mutex::new(cookie.map(str::to_string)),
            delay,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn set_cookie(&self, cookie: Option<&str>) {
        *self.cookie.lock() = cookie.map(str::to_string);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionRefresher for StubRefresher {
    async fn refresh(&self) -> Result<String, CredentialError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.cookie
            .lock()
            .clone()
            .ok_or(CredentialError::NoBotAvailable)
    }
}

/// Renderer that records the image references it was asked to lay out.
#[derive(Default)]
pub struct StubRenderer {
    fail: AtomicBool,
    seen: Mutex<Vec<Vec<String>>>,
}

impl StubRenderer {
    pub fn failing() -> Arc<Self> {
        let renderer = Self::default();
        renderer.fail.store(true, Ordering::SeqCst);
        Arc::new(renderer)
    }

    pub fn seen(&self) -> Vec<Vec<String>> {
        self.seen.lock().clone()
    }
}

#[async_trait]
impl Renderer for StubRenderer {
    async fn render_post(&self, submission: &Submission) -> Result<Bytes, RenderError> {
        self.seen.lock().push(submission.images.clone());
        if self.fail.load(Ordering::SeqCst) {
            return Err(RenderError::Unavailable("stub renderer down".to_string()));
        }
        Ok(Bytes::from_static(b"\x89PNG\r\n\x1a\nrendered"))
    }
}

/// Accepts URLs containing any of the configured fragments.
#[derive(Default)]
pub struct StubProber {
    live: Mutex<Vec<String>>,
    probes: AtomicUsize,
}

impl StubProber {
    pub fn accepting(fragments: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            live: Mutex::new(fragments.iter().map(|f| f.to_string()).collect()),
            probes: AtomicUsize::new(0),
        })
    }

    pub fn probes(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ImageProber for StubProber {
    async fn probe(&self, url: &str) -> Result<(), ProbeError> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        if self.live.lock().iter().any(|fragment| url.contains(fragment)) {
            Ok(())
        } else {
            Err(ProbeError::Decode("stub: dead link".to_string()))
        }
    }
}

/// Bot with canned answers.
#[derive(Default)]
pub struct StubBot {
    pub self_id: i64,
    pub cookie: Option<String>,
    pub blob: Option<Vec<u8>>,
    pub tokens: HashMap<String, String>,
    pub blob_calls: AtomicUsize,
    pub sent: Mutex<Vec<(i64, String)>>,
}

impl StubBot {
    pub fn new(self_id: i64) -> Self {
        Self {
            self_id,
            ..Self::default()
        }
    }

    pub fn with_cookie(mut self, cookie: &str) -> Self {
        self.cookie = Some(cookie.to_string());
        self
    }

    pub fn with_blob(mut self, blob: &str) -> Self {
        self.blob = Some(blob.as_bytes().to_vec());
        self
    }

    pub fn with_token(mut self, token: &str, url: &str) -> Self {
        self.tokens.insert(token.to_string(), url.to_string());
        self
    }

    pub fn blob_calls(&self) -> usize {
        self.blob_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BotConnection for StubBot {
    fn self_id(&self) -> i64 {
        self.self_id
    }

    async fn get_cookies(&self, _domain: &str) -> Result<String, BotError> {
        self.cookie.clone().ok_or(BotError::Empty("cookies"))
    }

    async fn raw_signature_blob(&self) -> Result<Vec<u8>, BotError> {
        self.blob_calls.fetch_add(1, Ordering::SeqCst);
        self.blob.clone().ok_or(BotError::Empty("signature blob"))
    }

    async fn resolve_local_token(&self, token: &str) -> Result<String, BotError> {
        self.tokens
            .get(token)
            .cloned()
            .ok_or(BotError::Empty("image url"))
    }

    async fn send_group_message(&self, group_id: i64, text: &str) -> Result<(), BotError> {
        self.sent.lock().push((group_id, text.to_string()));
        Ok(())
    }
}

pub fn registry_with(bots: Vec<Arc<StubBot>>) -> Arc<ConnectionRegistry> {
    let registry = Arc::new(ConnectionRegistry::new());
    for bot in bots {
        registry.register(bot);
    }
    registry
}

pub fn empty_registry() -> Arc<dyn BotRegistry> {
    Arc::new(ConnectionRegistry::new())
}

pub fn session_with(
    endpoint: Arc<StubEndpoint>,
    cookie: &str,
    refresher: Arc<StubRefresher>,
) -> Arc<CredentialSession> {
    let policy = SessionPolicy {
        timeout: Duration::from_secs(5),
        max_retry: 2,
    };
    Arc::new(CredentialSession::new(endpoint, cookie, policy, refresher).unwrap())
}

/// An approved submission with the given image references.
pub fn approved(text: &str, images: &[&str]) -> Submission {
    let mut submission = Submission::new(42, "alice", text).with_images(images.iter().copied());
    submission.approve().unwrap();
    submission
}
