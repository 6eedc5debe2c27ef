mod common;

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;

use common::{
    COOKIE_A, COOKIE_B, StubBot, StubEndpoint, StubRefresher, registry_with, session_with,
};
use wall_publisher::credentials::{
    BotCookieRefresher, CredentialError, CredentialSession, PLACEHOLDER_COOKIE, SessionPolicy,
    SessionRefresher,
};
use wall_publisher::signature::{ResourceType, SignatureCache};

#[tokio::test]
async fn publish_in_flight_keeps_the_cookie_it_started_with() {
    let endpoint = StubEndpoint::accepting(&[COOKIE_A, COOKIE_B]);
    let session = session_with(endpoint.clone(), COOKIE_A, StubRefresher::new(None));

    endpoint.set_hold(true);
    let in_flight = {
        let session = session.clone();
        tokio::spawn(async move { session.publish("before swap", &[]).await })
    };
    endpoint.entered.notified().await;

    let swapped = session.update_cookie(COOKIE_B).unwrap();
    assert_eq!(swapped.generation(), 1);
    assert_eq!(session.uin(), 10002);

    endpoint.set_hold(false);
    endpoint.release.notify_one();
    assert!(in_flight.await.unwrap().is_ok());

    session.publish("after swap", &[]).await.unwrap();
    let calls = endpoint.calls();
    assert_eq!(calls[0].cookie, COOKIE_A);
    assert_eq!(calls[1].cookie, COOKIE_B);
}

#[tokio::test(start_paused = true)]
async fn concurrent_auth_failures_refresh_once() {
    let endpoint = StubEndpoint::accepting(&[COOKIE_B]);
    let refresher = StubRefresher::with_delay(Some(COOKIE_B), Duration::from_millis(100));
    let session = session_with(endpoint.clone(), COOKIE_A, refresher.clone());

    let mut tasks = JoinSet::new();
    for i in 0..5 {
        let session = session.clone();
        tasks.spawn(async move { session.publish(&format!("post {i}"), &[]).await });
    }
    while let Some(result) = tasks.join_next().await {
        assert!(result.unwrap().is_ok());
    }

    assert_eq!(refresher.calls(), 1);
    assert_eq!(session.generation(), 1);
    assert_eq!(session.cookie(), COOKIE_B);
}

#[tokio::test]
async fn refresh_failure_surfaces_the_auth_error() {
    let endpoint = StubEndpoint::accepting(&[]);
    let refresher = StubRefresher::new(None);
    let session = session_with(endpoint.clone(), COOKIE_A, refresher.clone());

    let err = session.publish("nope", &[]).await.unwrap_err();
    assert!(err.is_auth_expired(), "{err}");
    assert_eq!(refresher.calls(), 1);
    assert_eq!(endpoint.publish_count(), 1);
    assert_eq!(session.cookie(), COOKIE_A);
}

#[tokio::test]
async fn auth_retries_are_bounded() {
    // The refreshed cookie is rejected too.
    let endpoint = StubEndpoint::accepting(&[]);
    let refresher = StubRefresher::new(Some(COOKIE_B));
    let session = session_with(endpoint.clone(), COOKIE_A, refresher.clone());

    let err = session.publish("still rejected", &[]).await.unwrap_err();
    assert!(err.is_auth_expired());
    assert_eq!(refresher.calls(), 2);
    assert_eq!(endpoint.publish_count(), 3);
}

#[tokio::test]
async fn identity_check_never_refreshes() {
    let endpoint = StubEndpoint::accepting(&[COOKIE_B]);
    let refresher = StubRefresher::new(Some(COOKIE_B));
    let session = session_with(endpoint, COOKIE_A, refresher.clone());

    assert!(session.identity_check().await.is_err());
    assert_eq!(refresher.calls(), 0);
    assert_eq!(session.generation(), 0);
}

#[test]
fn placeholder_session_and_invalid_updates() {
    let session = CredentialSession::with_placeholder(
        StubEndpoint::accepting(&[]),
        SessionPolicy::default(),
        StubRefresher::new(None),
    )
    .unwrap();
    assert_eq!(session.cookie(), PLACEHOLDER_COOKIE);
    assert_eq!(session.uin(), 1);

    let err = session.update_cookie("skey=@abc").unwrap_err();
    assert!(matches!(err, CredentialError::InvalidCookie(_)));
    assert_eq!(session.cookie(), PLACEHOLDER_COOKIE);
    assert_eq!(session.generation(), 0);
}

#[test]
fn concurrent_swaps_keep_the_newest_generation() {
    const THREADS: u64 = 8;
    const SWAPS: u64 = 50;

    let session = session_with(
        StubEndpoint::accepting(&[]),
        COOKIE_A,
        StubRefresher::new(None),
    );
    std::thread::scope(|scope| {
        for i in 0..THREADS {
            let session = &session;
            scope.spawn(move || {
                let cookie = if i % 2 == 0 { COOKIE_A } else { COOKIE_B };
                for _ in 0..SWAPS {
                    session.update_cookie(cookie).unwrap();
                }
            });
        }
        scope.spawn(|| {
            let mut seen = 0;
            for _ in 0..THREADS * SWAPS {
                let generation = session.generation();
                assert!(generation >= seen, "generation went back from {seen} to {generation}");
                seen = generation;
            }
        });
    });

    assert_eq!(session.generation(), THREADS * SWAPS);
}

#[tokio::test]
async fn bot_refresher_takes_first_usable_cookie_and_folds_keys() {
    let without_cookie = Arc::new(
        StubBot::new(1).with_blob(r#"{"private_rkey":"&rkey=priv1","group_rkey":"&rkey=grp1"}"#),
    );
    let unusable = Arc::new(StubBot::new(2).with_cookie("uin=; skey="));
    let good = Arc::new(StubBot::new(3).with_cookie(COOKIE_B));
    let registry = registry_with(vec![without_cookie, unusable, good]);
    let signatures = Arc::new(SignatureCache::new(registry.clone(), Duration::from_secs(1)));

    let refresher = BotCookieRefresher::new(registry, "qzone.qq.com", Duration::from_secs(1))
        .with_signatures(signatures.clone());

    assert_eq!(refresher.refresh().await.unwrap(), COOKIE_B);
    assert_eq!(signatures.get(ResourceType::PRIVATE).as_deref(), Some("priv1"));
    assert_eq!(signatures.get(ResourceType::GROUP).as_deref(), Some("grp1"));
    assert_eq!(signatures.entry(ResourceType::GROUP).unwrap().source_bot, 1);
}

#[tokio::test]
async fn bot_refresher_without_bots() {
    let refresher = BotCookieRefresher::new(
        common::empty_registry(),
        "qzone.qq.com",
        Duration::from_secs(1),
    );
    assert!(matches!(
        refresher.refresh().await,
        Err(CredentialError::NoBotAvailable)
    ));
}
