//! Streaming connection lifecycle against the in-memory venue.

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod support;

use std::sync::Arc;
use std::time::Duration;

use market_stream_pool::application::ports::{
    ConnectionCallbacks, StatusData, StatusForward, TickForward,
};
use market_stream_pool::{
    ConnectionId, ConnectionStatus, EventType, ReconnectConfig, StreamConnection,
    StreamConnectionConfig, TickRecord,
};
use rust_decimal::Decimal;
use support::{FakeVenue, Recorder, credentials, settle, wait_until};

const WAIT: Duration = Duration::from_secs(30);

fn backoff(max_attempts: u32) -> ReconnectConfig {
    ReconnectConfig {
        initial_delay: Duration::from_secs(1),
        max_delay: Duration::from_secs(60),
        multiplier: 2.0,
        jitter_factor: 0.1,
        max_attempts,
    }
}

fn connection(venue: &FakeVenue, recorder: &Recorder, reconnect: ReconnectConfig) -> StreamConnection {
    let id = ConnectionId::new(1);
    let mut config =
        StreamConnectionConfig::new(id, "primary", "wss://venue.test/stocks", credentials());
    config.reconnect = reconnect;

    let on_tick = recorder.on_tick();
    let on_status = recorder.on_status();
    let tick: Arc<TickForward> =
        Arc::new(move |record: TickRecord, _: ConnectionId| on_tick(record));
    let status: Arc<StatusForward> =
        Arc::new(move |name: &str, data: StatusData, _: ConnectionId| on_status(name, data));

    StreamConnection::new(
        config,
        venue.connector(),
        ConnectionCallbacks::tagged(id, &tick, &status),
    )
}

fn sorted(mut symbols: Vec<String>) -> Vec<String> {
    symbols.sort();
    symbols
}

#[tokio::test(start_paused = true)]
async fn connect_authenticates_subscribes_and_streams() {
    let venue = FakeVenue::new();
    let recorder = Recorder::default();
    let connection = connection(&venue, &recorder, backoff(3));

    assert!(connection.subscribe(["aapl"]));
    assert!(connection.connect().await);
    assert_eq!(connection.status(), ConnectionStatus::Connected);

    let auth: serde_json::Value = serde_json::from_str(&venue.sent(0)[0]).unwrap();
    assert_eq!(auth["action"], "auth");
    assert_eq!(auth["params"], "test-key");

    wait_until(WAIT, || venue.subscribed(0) == ["AAPL"]).await;
    wait_until(WAIT, || connection.subscriptions().confirmed_count() == 1).await;

    venue.push_trade(0, "AAPL", 189.5);
    wait_until(WAIT, || recorder.ticks().len() == 1).await;

    let tick = &recorder.ticks()[0];
    assert_eq!(tick.symbol(), "AAPL");
    assert_eq!(tick.price(), Decimal::new(1895, 1));
    assert_eq!(tick.size(), 100);
    assert_eq!(tick.source(), "polygon");
    assert_eq!(tick.event_type(), EventType::Trade);
    assert!((tick.timestamp() - 1_700_000_000.123).abs() < 1e-6);

    assert_eq!(recorder.status_names(), ["connecting", "connected"]);
    assert_eq!(connection.stats().messages, 1);

    connection.disconnect().await;
}

#[tokio::test(start_paused = true)]
async fn subscriptions_replayed_exactly_once_after_reconnect() {
    let venue = FakeVenue::new();
    let recorder = Recorder::default();
    let connection = connection(&venue, &recorder, backoff(5));

    connection.subscribe(["A", "B"]);
    assert!(connection.connect().await);
    connection.subscribe(["C", "B"]);
    wait_until(WAIT, || venue.subscribed(0).len() == 3).await;

    venue.kill(0);
    wait_until(WAIT, || venue.session_count() == 2).await;
    wait_until(WAIT, || connection.status() == ConnectionStatus::Connected).await;
    wait_until(WAIT, || venue.subscribed(1).len() == 3).await;
    settle().await;

    assert_eq!(sorted(venue.subscribed(1)), ["A", "B", "C"]);
    assert_eq!(connection.subscriptions().len(), 3);
    assert_eq!(connection.stats().reconnect_attempts, 0);

    let names = recorder.status_names();
    assert_eq!(
        names,
        ["connecting", "connected", "error", "connecting", "connected"]
    );

    venue.push_trade(1, "C", 10.0);
    wait_until(WAIT, || recorder.tick_symbols() == ["C"]).await;

    connection.disconnect().await;
}

#[tokio::test(start_paused = true)]
async fn exhausted_reconnects_end_in_failed() {
    let venue = FakeVenue::new();
    let recorder = Recorder::default();
    let connection = connection(&venue, &recorder, backoff(3));

    assert!(connection.connect().await);
    venue.refuse_connections(true);

    let started = tokio::time::Instant::now();
    venue.kill(0);
    wait_until(Duration::from_secs(60), || {
        connection.status() == ConnectionStatus::Failed
    })
    .await;

    // One initial open plus three reconnect attempts
    assert_eq!(venue.open_count(), 4);
    assert!(started.elapsed() >= Duration::from_secs(7));

    let statuses = recorder.statuses();
    let (last, data) = statuses.last().unwrap();
    assert_eq!(last, "failed");
    assert_eq!(data["attempts"], 3);

    // Terminal: no further attempts and connect refuses.
    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(venue.open_count(), 4);
    assert!(!connection.connect().await);
    assert!(!connection.subscribe(["AAPL"]));

    connection.disconnect().await;
    assert_eq!(connection.status(), ConnectionStatus::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn failed_initial_connect_recovers_in_background() {
    let venue = FakeVenue::new();
    venue.refuse_connections(true);
    let recorder = Recorder::default();
    let connection = connection(&venue, &recorder, backoff(5));

    connection.subscribe(["AAPL"]);
    assert!(!connection.connect().await);
    assert_eq!(connection.status(), ConnectionStatus::Error);
    assert_eq!(venue.open_count(), 1);

    // Still retrying: a second connect reports the state without opening.
    assert!(!connection.connect().await);
    assert_eq!(venue.open_count(), 1);

    venue.refuse_connections(false);
    wait_until(WAIT, || connection.status() == ConnectionStatus::Connected).await;
    wait_until(WAIT, || venue.subscribed(0) == ["AAPL"]).await;

    assert_eq!(venue.open_count(), 2);
    assert_eq!(connection.stats().reconnect_attempts, 0);
    assert_eq!(
        recorder.status_names(),
        ["connecting", "error", "connecting", "connected"]
    );

    venue.push_trade(0, "AAPL", 190.0);
    wait_until(WAIT, || recorder.tick_symbols() == ["AAPL"]).await;

    connection.disconnect().await;
}

#[tokio::test(start_paused = true)]
async fn failed_initial_connect_ends_in_failed() {
    let venue = FakeVenue::new();
    venue.refuse_connections(true);
    let recorder = Recorder::default();
    let connection = connection(&venue, &recorder, backoff(3));

    assert!(!connection.connect().await);
    wait_until(WAIT, || connection.status() == ConnectionStatus::Failed).await;

    // One initial open plus three attempts
    assert_eq!(venue.open_count(), 4);
    assert_eq!(connection.stats().connection_errors, 4);
    assert_eq!(recorder.status_names().last().unwrap(), "failed");

    connection.disconnect().await;
    assert_eq!(connection.status(), ConnectionStatus::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn disconnect_cancels_retry_after_failed_connect() {
    let venue = FakeVenue::new();
    venue.refuse_connections(true);
    let recorder = Recorder::default();
    let connection = connection(&venue, &recorder, backoff(0));

    assert!(!connection.connect().await);
    connection.disconnect().await;
    venue.refuse_connections(false);
    tokio::time::sleep(Duration::from_secs(300)).await;

    assert_eq!(venue.open_count(), 1);
    assert_eq!(connection.status(), ConnectionStatus::Disconnected);
    assert_eq!(recorder.status_names(), ["connecting", "error", "disconnected"]);

    // A later explicit connect starts over.
    assert!(connection.connect().await);
    connection.disconnect().await;
}

#[tokio::test(start_paused = true)]
async fn rejected_auth_is_an_error() {
    let venue = FakeVenue::new();
    venue.reject_auth(true);
    let recorder = Recorder::default();
    let connection = connection(&venue, &recorder, backoff(3));

    assert!(!connection.connect().await);
    assert_eq!(connection.status(), ConnectionStatus::Error);

    let statuses = recorder.statuses();
    let (last, data) = statuses.last().unwrap();
    assert_eq!(last, "error");
    assert!(data["error"].as_str().unwrap().contains("auth"));
}

#[tokio::test(start_paused = true)]
async fn double_disconnect_is_harmless() {
    let venue = FakeVenue::new();
    let recorder = Recorder::default();
    let connection = connection(&venue, &recorder, backoff(3));

    connection.subscribe(["AAPL"]);
    assert!(connection.connect().await);

    connection.disconnect().await;
    connection.disconnect().await;

    assert_eq!(connection.status(), ConnectionStatus::Disconnected);
    assert!(connection.subscriptions().is_empty());
    let disconnects = recorder
        .status_names()
        .iter()
        .filter(|name| *name == "disconnected")
        .count();
    assert_eq!(disconnects, 1);

    // Never connected: disconnect stays silent.
    let idle = self::connection(&venue, &Recorder::default(), backoff(3));
    idle.disconnect().await;
    assert_eq!(idle.status(), ConnectionStatus::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn disconnect_cancels_pending_reconnect() {
    let venue = FakeVenue::new();
    let recorder = Recorder::default();
    let connection = connection(&venue, &recorder, backoff(0));

    assert!(connection.connect().await);
    venue.refuse_connections(true);
    venue.kill(0);
    wait_until(WAIT, || connection.stats().reconnect_attempts >= 2).await;

    connection.disconnect().await;
    let opens = venue.open_count();
    tokio::time::sleep(Duration::from_secs(300)).await;

    assert_eq!(venue.open_count(), opens);
    assert_eq!(connection.status(), ConnectionStatus::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn malformed_frame_does_not_stop_delivery() {
    let venue = FakeVenue::new();
    let recorder = Recorder::default();
    let connection = connection(&venue, &recorder, backoff(3));

    assert!(connection.connect().await);
    venue.push(0, "{not json");
    venue.push(0, r#"[{"ev":"XX","sym":"AAPL"},{"ev":"T","sym":"MSFT","p":1,"s":1,"t":1700000000}]"#);
    venue.push_trade(0, "AAPL", 2.0);

    wait_until(WAIT, || recorder.ticks().len() == 2).await;
    assert_eq!(recorder.tick_symbols(), ["MSFT", "AAPL"]);
    assert_eq!(connection.stats().dropped_frames, 2);
    assert_eq!(connection.status(), ConnectionStatus::Connected);

    connection.disconnect().await;
}

#[tokio::test(start_paused = true)]
async fn panicking_tick_callback_is_contained() {
    let venue = FakeVenue::new();
    let recorder = Recorder::default();
    let id = ConnectionId::new(1);
    let config =
        StreamConnectionConfig::new(id, "primary", "wss://venue.test/stocks", credentials());
    let on_tick = recorder.on_tick();
    let tick: Arc<TickForward> = Arc::new(move |record: TickRecord, _: ConnectionId| {
        assert_ne!(record.symbol(), "BOOM", "callback failure");
        on_tick(record);
    });
    let status: Arc<StatusForward> = Arc::new(|_: &str, _: StatusData, _: ConnectionId| {});
    let connection = StreamConnection::new(
        config,
        venue.connector(),
        ConnectionCallbacks::tagged(id, &tick, &status),
    );

    assert!(connection.connect().await);
    venue.push_trade(0, "BOOM", 1.0);
    venue.push_trade(0, "AAPL", 1.0);

    wait_until(WAIT, || recorder.ticks().len() == 1).await;
    assert_eq!(connection.stats().dropped_frames, 1);
    assert_eq!(connection.status(), ConnectionStatus::Connected);

    connection.disconnect().await;
}

#[tokio::test(start_paused = true)]
async fn live_subscribe_and_unsubscribe_send_frames() {
    let venue = FakeVenue::new();
    let recorder = Recorder::default();
    let connection = connection(&venue, &recorder, backoff(3));

    assert!(connection.connect().await);
    assert!(connection.subscribe(["MSFT", "MSFT"]));
    wait_until(WAIT, || venue.subscribed(0) == ["MSFT"]).await;

    assert!(connection.unsubscribe(["MSFT", "UNKNOWN"]));
    wait_until(WAIT, || {
        venue
            .sent(0)
            .iter()
            .any(|frame| frame.contains(r#""action":"unsubscribe""#))
    })
    .await;
    assert!(connection.subscriptions().is_empty());

    connection.disconnect().await;
}
