mod common;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use common::{COOKIE_A, COOKIE_B, StubEndpoint, StubRefresher, session_with};
use wall_publisher::credentials::{
    BootstrapPolicy, CookieBootstrap, CredentialError, KeepAliveMonitor, QrLogin, QrPollStatus,
    SessionState, ensure_valid_on_startup,
};
use wall_publisher::notification::AlertSink;

#[derive(Default)]
struct RecordingAlert {
    sent: Mutex<Vec<String>>,
}

#[async_trait]
impl AlertSink for RecordingAlert {
    fn sink_type(&self) -> &'static str {
        "recording"
    }

    async fn alert(&self, text: &str) {
        self.sent.lock().push(text.to_string());
    }
}

fn fast_bootstrap() -> BootstrapPolicy {
    BootstrapPolicy {
        warmup: Duration::from_millis(10),
        bot_attempts: 2,
        bot_retry_delay: Duration::from_millis(10),
        startup_recheck_delay: Duration::from_millis(10),
    }
}

#[tokio::test(start_paused = true)]
async fn expired_session_is_restored_within_one_interval() {
    let endpoint = StubEndpoint::accepting(&[COOKIE_B]);
    let refresher = StubRefresher::new(Some(COOKIE_B));
    let session = session_with(endpoint, COOKIE_A, StubRefresher::new(None));
    let alerts = Arc::new(RecordingAlert::default());
    let interval = Duration::from_secs(60);

    let monitor = Arc::new(KeepAliveMonitor::new(
        session.clone(),
        refresher.clone(),
        alerts.clone(),
        interval,
    ));
    let mut states = monitor.subscribe();
    let cancel = CancellationToken::new();
    let handle = monitor.start(cancel.clone()).unwrap();

    assert_eq!(monitor.state(), SessionState::Unknown);
    let restored = tokio::time::timeout(interval + Duration::from_secs(1), async {
        states
            .wait_for(|state| *state == SessionState::Valid)
            .await
            .is_ok()
    })
    .await;
    assert!(matches!(restored, Ok(true)), "session was not restored in time");

    assert_eq!(session.cookie(), COOKIE_B);
    assert_eq!(refresher.calls(), 1);
    assert!(alerts.sent.lock().is_empty());

    cancel.cancel();
    handle.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn repeated_failures_alert_on_first_and_every_third() {
    let endpoint = StubEndpoint::accepting(&[]);
    let session = session_with(endpoint, COOKIE_A, StubRefresher::new(None));
    let alerts = Arc::new(RecordingAlert::default());
    let monitor = KeepAliveMonitor::new(
        session,
        StubRefresher::new(None),
        alerts.clone(),
        Duration::from_secs(60),
    );

    for _ in 0..4 {
        assert_eq!(monitor.check_once().await, SessionState::Expired);
    }
    assert_eq!(alerts.sent.lock().len(), 2);
    assert_eq!(monitor.state(), SessionState::Expired);
}

#[tokio::test]
async fn disabled_monitor_does_not_start() {
    let session = session_with(
        StubEndpoint::accepting(&[COOKIE_A]),
        COOKIE_A,
        StubRefresher::new(None),
    );
    let monitor = Arc::new(KeepAliveMonitor::new(
        session,
        StubRefresher::new(None),
        Arc::new(RecordingAlert::default()),
        Duration::ZERO,
    ));
    assert!(monitor.start(CancellationToken::new()).is_none());
}

#[tokio::test(start_paused = true)]
async fn startup_check_refreshes_after_recheck() {
    let endpoint = StubEndpoint::accepting(&[COOKIE_B]);
    let session = session_with(endpoint.clone(), COOKIE_A, StubRefresher::new(None));
    let refresher = StubRefresher::new(Some(COOKIE_B));

    let info = ensure_valid_on_startup(&session, refresher.as_ref(), Duration::from_millis(500))
        .await
        .unwrap();

    assert_eq!(info.uin, 10002);
    assert_eq!(endpoint.user_info_count(), 3);
    assert_eq!(refresher.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn bootstrap_installs_cookie_even_when_validation_fails() {
    let endpoint = StubEndpoint::accepting(&[]);
    let session = session_with(endpoint.clone(), COOKIE_A, StubRefresher::new(None));
    let bots = StubRefresher::new(Some(COOKIE_B));
    let qr = QrLogin::new(endpoint.clone(), Duration::from_secs(5));

    let result = CookieBootstrap::new(bots, qr, fast_bootstrap())
        .spawn(session.clone())
        .await
        .unwrap();

    assert_eq!(result.unwrap(), COOKIE_B);
    assert_eq!(session.cookie(), COOKIE_B);
}

#[tokio::test(start_paused = true)]
async fn bootstrap_falls_back_to_qr_login() {
    let endpoint = StubEndpoint::accepting(&[COOKIE_A]);
    endpoint.script_qr([
        QrPollStatus::Waiting,
        QrPollStatus::Scanned,
        QrPollStatus::Success(COOKIE_A.to_string()),
    ]);
    let session = session_with(endpoint.clone(), COOKIE_B, StubRefresher::new(None));
    let bots = StubRefresher::new(None);
    let qr = QrLogin::new(endpoint.clone(), Duration::from_secs(5))
        .with_polling(Duration::from_secs(2), 10);

    let result = CookieBootstrap::new(bots.clone(), qr, fast_bootstrap())
        .spawn(session.clone())
        .await
        .unwrap();

    assert_eq!(result.unwrap(), COOKIE_A);
    assert_eq!(bots.calls(), 2);
    assert_eq!(session.uin(), 10001);
}

#[tokio::test(start_paused = true)]
async fn qr_login_reports_expiry_and_timeout() {
    let endpoint = StubEndpoint::accepting(&[]);
    endpoint.script_qr([QrPollStatus::Scanned, QrPollStatus::Expired]);
    let qr = QrLogin::new(endpoint.clone(), Duration::from_secs(5))
        .with_polling(Duration::from_secs(2), 10);
    assert!(matches!(qr.login().await, Err(CredentialError::QrExpired)));

    let qr = QrLogin::new(endpoint, Duration::from_secs(5)).with_polling(Duration::from_secs(2), 3);
    assert!(matches!(
        qr.login().await,
        Err(CredentialError::QrTimeout { polls: 3 })
    ));
}

#[tokio::test(start_paused = true)]
async fn bootstrap_error_when_every_source_fails() {
    let endpoint = StubEndpoint::accepting(&[]);
    endpoint.script_qr([QrPollStatus::Expired]);
    let session = session_with(endpoint.clone(), COOKIE_A, StubRefresher::new(None));
    let qr = QrLogin::new(endpoint, Duration::from_secs(5)).with_polling(Duration::from_secs(1), 5);

    let result = CookieBootstrap::new(StubRefresher::new(None), qr, fast_bootstrap())
        .spawn(session.clone())
        .await
        .unwrap();

    assert!(matches!(result, Err(CredentialError::QrExpired)));
    assert_eq!(session.cookie(), COOKIE_A);
    assert_eq!(session.generation(), 0);
}
