//! 계좌 폴러: 참조 카운트, 조회 간격 제한, 주소 변경, 지난 세대 결과.

mod common;

use common::{margin_json, settle, GatedSource, PanicOnceSource, RecordingSink, ScriptedSource};
use feed_stream::{AccountPoller, AccountStore, HttpMarginSource, MarginSource, StreamError};
use mockito::Matcher;
use rust_decimal_macros::dec;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

fn poller(sink: Arc<dyn feed_stream::AccountSink>) -> AccountPoller {
    AccountPoller::new(
        sink,
        "perp",
        Duration::from_millis(1000),
        Duration::from_millis(900),
    )
}

#[tokio::test(start_paused = true)]
async fn test_reference_counting_stops_on_last_unsubscribe() {
    let store = Arc::new(AccountStore::new());
    let source = ScriptedSource::new(margin_json("100"));
    let poller = poller(store.clone());

    for _ in 0..3 {
        poller.subscribe(source.clone(), "0xabc");
    }
    settle().await;
    assert_eq!(poller.subscriber_count(), 3);
    assert_eq!(source.call_count(), 1);
    assert!(store.current().balance.is_some());

    poller.unsubscribe();
    poller.unsubscribe();
    assert!(poller.is_active());
    assert!(store.current().balance.is_some());

    poller.unsubscribe();
    assert!(!poller.is_active());
    assert_eq!(poller.target_address(), None);
    let state = store.current();
    assert!(state.balance.is_none());
    assert!(state.positions.is_empty());
    assert!(state.error.is_none());

    // 중지 후에는 더 이상 조회하지 않음
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(source.call_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_ticks_inside_min_interval_are_throttled() {
    let store = Arc::new(AccountStore::new());
    let source = ScriptedSource::new(margin_json("100"));
    let poller = AccountPoller::new(
        store,
        "perp",
        Duration::from_millis(100),
        Duration::from_millis(900),
    );

    poller.subscribe(source.clone(), "0xabc");
    tokio::time::sleep(Duration::from_millis(450)).await;
    assert_eq!(source.call_count(), 1);

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(source.call_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_force_refresh_bypasses_throttle() {
    let store = Arc::new(AccountStore::new());
    let source = ScriptedSource::new(margin_json("100"));
    source.push_response(Ok(margin_json("100")));
    source.push_response(Ok(margin_json("250")));
    let poller = poller(store.clone());

    poller.subscribe(source.clone(), "0xabc");
    settle().await;
    assert_eq!(source.call_count(), 1);

    let snapshot = poller.force_refresh().await.expect("refresh");
    assert_eq!(snapshot.balance.account_value, dec!(250));
    assert_eq!(source.call_count(), 2);
    assert_eq!(
        store.current().balance.map(|b| b.account_value),
        Some(dec!(250))
    );
}

#[tokio::test(start_paused = true)]
async fn test_force_refresh_without_subscription() {
    let poller = poller(Arc::new(AccountStore::new()));
    let result = poller.force_refresh().await;
    assert!(matches!(result, Err(StreamError::NoActiveSubscription)));
}

#[tokio::test(start_paused = true)]
async fn test_fetch_error_keeps_previous_data() {
    let store = Arc::new(AccountStore::new());
    let source = ScriptedSource::new(margin_json("100"));
    source.push_response(Ok(margin_json("100")));
    source.push_response(Err(StreamError::Fetch("boom".into())));
    let poller = poller(store.clone());

    poller.subscribe(source.clone(), "0xabc");
    settle().await;
    tokio::time::sleep(Duration::from_millis(1000)).await;
    assert_eq!(source.call_count(), 2);

    let state = store.current();
    assert_eq!(state.balance.map(|b| b.account_value), Some(dec!(100)));
    assert_eq!(state.positions.len(), 1);
    assert!(state.error.as_deref().is_some_and(|e| e.contains("boom")));
    assert!(!state.loading);

    // 다음 성공 조회가 오류를 지움
    tokio::time::sleep(Duration::from_millis(1000)).await;
    assert!(store.current().error.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_overflowing_margin_is_recorded_and_polling_continues() {
    let store = Arc::new(AccountStore::new());
    let source = ScriptedSource::new(margin_json("100"));
    source.push_response(Ok(json!({
        "accountValue": "79228162514264337593543950335",
        "marginUsed": "-1"
    })));
    let poller = poller(store.clone());

    poller.subscribe(source.clone(), "0xabc");
    settle().await;
    let state = store.current();
    assert!(state.balance.is_none());
    assert!(state.error.as_deref().is_some_and(|e| e.contains("marginUsed")));
    assert!(!state.loading);

    tokio::time::sleep(Duration::from_millis(1000)).await;
    assert_eq!(source.call_count(), 2);
    assert_eq!(
        store.current().balance.map(|b| b.account_value),
        Some(dec!(100))
    );
}

#[tokio::test(start_paused = true)]
async fn test_panicking_fetch_keeps_timer_alive() {
    let store = Arc::new(AccountStore::new());
    let source = PanicOnceSource::new();
    let poller = poller(store.clone());

    poller.subscribe(source.clone(), "0xabc");
    settle().await;
    let state = store.current();
    assert!(state.error.is_some());
    assert!(!state.loading);
    assert!(poller.is_active());

    tokio::time::sleep(Duration::from_millis(1000)).await;
    assert_eq!(source.call_count(), 2);
    let state = store.current();
    assert_eq!(state.balance.map(|b| b.account_value), Some(dec!(77)));
    assert!(state.error.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_rate_limited_fetch_waits_for_retry_delay() {
    let store = Arc::new(AccountStore::new());
    let source = ScriptedSource::new(margin_json("100"));
    source.push_response(Ok(margin_json("100")));
    source.push_response(Err(StreamError::Http {
        status: 429,
        message: "too many requests".into(),
    }));
    let poller = poller(store.clone());

    poller.subscribe(source.clone(), "0xabc");
    settle().await;
    tokio::time::sleep(Duration::from_millis(1000)).await;
    assert_eq!(source.call_count(), 2);

    // 429 이후 10초 동안은 틱이 와도 조회하지 않음
    tokio::time::sleep(Duration::from_millis(9000)).await;
    assert_eq!(source.call_count(), 2);

    tokio::time::sleep(Duration::from_millis(1000)).await;
    assert_eq!(source.call_count(), 3);
    assert!(store.current().error.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_address_change_clears_and_restarts() {
    let sink = Arc::new(RecordingSink::default());
    let source = ScriptedSource::new(margin_json("100"));
    source.push_response(Ok(margin_json("100")));
    source.push_response(Ok(margin_json("200")));
    let poller = poller(sink.clone());

    poller.subscribe(source.clone(), "0xaaa");
    settle().await;
    poller.subscribe(source.clone(), "0xbbb");
    settle().await;

    assert_eq!(source.calls(), vec!["0xaaa", "0xbbb"]);
    assert_eq!(
        sink.events(),
        vec![
            "loading:true",
            "snapshot:100",
            "clear",
            "loading:true",
            "snapshot:200",
        ]
    );
    assert_eq!(poller.target_address().as_deref(), Some("0xbbb"));
    assert_eq!(poller.subscriber_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_result_after_stop_is_discarded() {
    let store = Arc::new(AccountStore::new());
    let source = GatedSource::new();
    let poller = poller(store.clone());

    poller.subscribe(source.clone(), "0xabc");
    settle().await;
    assert!(store.current().balance.is_some());

    let refreshing = {
        let poller = poller.clone();
        tokio::spawn(async move { poller.force_refresh().await })
    };
    settle().await;

    poller.unsubscribe();
    assert!(store.current().balance.is_none());

    source.release();
    let result = refreshing.await.expect("refresh task");
    assert!(matches!(result, Err(StreamError::NoActiveSubscription)));
    assert_eq!(store.current(), Default::default());
}

// ============================================================================
// HTTP 마진 조회
// ============================================================================

#[tokio::test]
async fn test_http_margin_source_posts_request() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/info")
        .match_body(Matcher::PartialJson(json!({
            "type": "accountMargin",
            "user": "0xabc",
            "market": "perp",
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(margin_json("321").to_string())
        .create_async()
        .await;

    let source = HttpMarginSource::new(format!("{}/info", server.url()));
    let raw = source.fetch_margin("0xabc", "perp").await.expect("margin");

    assert_eq!(raw["accountValue"], "321");
    mock.assert_async().await;
}

#[tokio::test]
async fn test_http_margin_source_maps_status() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/info")
        .with_status(500)
        .with_body("internal error")
        .create_async()
        .await;

    let source = HttpMarginSource::new(format!("{}/info", server.url()));
    match source.fetch_margin("0xabc", "perp").await {
        Err(StreamError::Http { status, message }) => {
            assert_eq!(status, 500);
            assert_eq!(message, "internal error");
        }
        other => panic!("expected HTTP error, got {other:?}"),
    }
}
