//! Connection pool behavior against the in-memory venue.

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod support;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use market_stream_pool::{
    ConnectionId, ConnectionPool, ConnectionStatus, HealthSource, HealthStatus, PoolSettings,
    ReconnectConfig, RoutingPolicy, SlotConfig, StaticUniverse, StreamConnectionConfig,
};
use serde_json::json;
use support::{FakeVenue, Recorder, credentials, settle, wait_until};

const WAIT: Duration = Duration::from_secs(60);

fn pool(venue: &FakeVenue, recorder: &Recorder, settings: &PoolSettings) -> ConnectionPool {
    let mut template = StreamConnectionConfig::new(
        ConnectionId::new(0),
        "template",
        "wss://venue.test/stocks",
        credentials(),
    );
    template.reconnect = ReconnectConfig {
        initial_delay: Duration::from_secs(1),
        max_delay: Duration::from_secs(60),
        multiplier: 2.0,
        jitter_factor: 0.1,
        max_attempts: 3,
    };
    let universe = StaticUniverse::from_map(HashMap::from([(
        "sector_etfs",
        vec!["XLK", "XLF"],
    )]));

    ConnectionPool::new(
        settings,
        template,
        venue.connector(),
        Arc::new(universe),
        recorder.on_tick(),
        recorder.on_status(),
    )
}

fn sorted(mut symbols: Vec<String>) -> Vec<String> {
    symbols.sort();
    symbols
}

fn id(n: u16) -> ConnectionId {
    ConnectionId::new(n)
}

#[tokio::test(start_paused = true)]
async fn ticks_from_two_connections_arrive_once_each() {
    let venue = FakeVenue::new();
    let recorder = Recorder::default();
    let pool = pool(&venue, &recorder, &PoolSettings::default());

    let configured = pool.configure(&[
        SlotConfig::symbols(1, "tech", ["AAPL", "MSFT"]),
        SlotConfig::symbols(2, "autos", ["GOOGL", "TSLA"]),
    ]);
    assert_eq!(configured, 2);
    assert!(pool.connect_all().await);

    for symbol in ["AAPL", "MSFT", "GOOGL", "TSLA"] {
        wait_until(WAIT, || venue.session_for(symbol).is_some()).await;
    }
    let tech = venue.session_for("AAPL").unwrap();
    let autos = venue.session_for("TSLA").unwrap();
    assert_ne!(tech, autos);
    assert_eq!(sorted(venue.subscribed(tech)), ["AAPL", "MSFT"]);
    assert_eq!(sorted(venue.subscribed(autos)), ["GOOGL", "TSLA"]);

    venue.push_trade(tech, "AAPL", 1.0);
    venue.push_trade(autos, "TSLA", 2.0);
    venue.push_trade(tech, "MSFT", 3.0);
    venue.push_trade(autos, "GOOGL", 4.0);

    wait_until(WAIT, || recorder.ticks().len() == 4).await;
    settle().await;
    assert_eq!(sorted(recorder.tick_symbols()), ["AAPL", "GOOGL", "MSFT", "TSLA"]);

    let snapshot = pool.health_snapshot();
    assert_eq!(snapshot.status, HealthStatus::Healthy);
    assert_eq!(snapshot.total_messages, 4);
    assert_eq!(snapshot.total_tickers, 4);
    assert!(snapshot.connections.iter().all(|c| c.message_count == 2));

    pool.disconnect_all().await;
}

#[tokio::test(start_paused = true)]
async fn status_events_carry_connection_identity() {
    let venue = FakeVenue::new();
    let recorder = Recorder::default();
    let pool = pool(&venue, &recorder, &PoolSettings::default());

    pool.configure(&[SlotConfig::symbols(2, "energy", ["XOM"])]);
    assert!(pool.connect_all().await);

    let statuses = recorder.statuses();
    let (name, data) = statuses
        .iter()
        .find(|(name, _)| name == "connected")
        .unwrap();
    assert_eq!(name, "connected");
    assert_eq!(data["connection_id"], json!(2));
    assert_eq!(data["connection_name"], json!("energy"));

    pool.disconnect_all().await;
}

#[tokio::test(start_paused = true)]
async fn one_dead_connection_leaves_the_others_streaming() {
    let venue = FakeVenue::new();
    let recorder = Recorder::default();
    let pool = pool(&venue, &recorder, &PoolSettings::default());

    pool.configure(&[
        SlotConfig::symbols(1, "a", ["AAPL"]),
        SlotConfig::symbols(2, "b", ["TSLA"]),
        SlotConfig::symbols(3, "c", ["XOM"]),
    ]);
    assert!(pool.connect_all().await);
    for symbol in ["AAPL", "TSLA", "XOM"] {
        wait_until(WAIT, || venue.session_for(symbol).is_some()).await;
    }
    let first = venue.session_for("AAPL").unwrap();
    let second = venue.session_for("TSLA").unwrap();
    let third = venue.session_for("XOM").unwrap();
    let messages = |n| pool.record(id(n)).unwrap().message_count;

    venue.push_trade(first, "AAPL", 1.0);
    venue.push_trade(third, "XOM", 1.0);
    wait_until(WAIT, || recorder.ticks().len() == 2).await;
    assert_eq!((messages(1), messages(3)), (1, 1));

    venue.refuse_connections(true);
    venue.kill(second);
    wait_until(WAIT, || {
        pool.record(id(2)).unwrap().status == ConnectionStatus::Error
    })
    .await;

    venue.push_trade(first, "AAPL", 2.0);
    venue.push_trade(third, "XOM", 2.0);
    wait_until(WAIT, || recorder.ticks().len() == 4).await;
    assert_eq!((messages(1), messages(3)), (2, 2), "survivors keep counting");
    assert_eq!(messages(2), 0);
    assert_eq!(pool.route("AAPL"), Some(id(1)));
    assert_eq!(pool.route("XOM"), Some(id(3)));
    assert_eq!(pool.route("TSLA"), Some(id(2)), "reconnecting keeps its tickers");

    let snapshot = pool.health_snapshot();
    assert_eq!(snapshot.status, HealthStatus::Degraded);
    assert_eq!(snapshot.connected_connections, 2);

    // Retries exhausted: the pool moves TSLA to the first connected connection.
    wait_until(WAIT, || {
        pool.record(id(2)).unwrap().status == ConnectionStatus::Failed
    })
    .await;
    wait_until(WAIT, || venue.subscribed(first).contains(&"TSLA".to_string())).await;
    assert_eq!(pool.route("TSLA"), Some(id(1)));
    assert!(pool.record(id(2)).unwrap().assigned_tickers.is_empty());

    venue.push_trade(first, "TSLA", 5.0);
    wait_until(WAIT, || recorder.ticks().len() == 5).await;
    assert_eq!((messages(1), messages(3)), (3, 2));
    assert_eq!(recorder.tick_symbols().last().unwrap(), "TSLA");

    let failed = recorder
        .statuses()
        .into_iter()
        .find(|(name, _)| name == "failed")
        .unwrap();
    assert_eq!(failed.1["connection_id"], json!(2));

    pool.disconnect_all().await;
}

#[tokio::test(start_paused = true)]
async fn connect_all_succeeds_if_any_connection_does() {
    let venue = FakeVenue::new();
    venue.limit_sessions(1);
    let recorder = Recorder::default();
    let settings = PoolSettings {
        parallel_connect: false,
        ..PoolSettings::default()
    };
    let pool = pool(&venue, &recorder, &settings);

    pool.configure(&[
        SlotConfig::symbols(1, "a", ["AAPL"]),
        SlotConfig::symbols(2, "b", ["TSLA"]),
    ]);
    assert!(pool.connect_all().await);
    assert_eq!(pool.connected_count(), 1);
    assert_eq!(pool.route("TSLA"), Some(id(2)), "retrying slot keeps its tickers");

    // The refused slot exhausts its retries; failover then moves TSLA.
    wait_until(WAIT, || {
        pool.record(id(2)).unwrap().status == ConnectionStatus::Failed
    })
    .await;
    assert_eq!(pool.route("TSLA"), Some(id(1)));
    wait_until(WAIT, || sorted(venue.subscribed(0)) == ["AAPL", "TSLA"]).await;
    assert_eq!(venue.session_count(), 1);

    pool.disconnect_all().await;
}

#[tokio::test(start_paused = true)]
async fn slot_refused_at_startup_recovers() {
    let venue = FakeVenue::new();
    venue.limit_sessions(1);
    let recorder = Recorder::default();
    let settings = PoolSettings {
        parallel_connect: false,
        ..PoolSettings::default()
    };
    let pool = pool(&venue, &recorder, &settings);

    pool.configure(&[
        SlotConfig::symbols(1, "a", ["AAPL"]),
        SlotConfig::symbols(2, "b", ["TSLA"]),
    ]);
    assert!(pool.connect_all().await);
    assert_eq!(pool.connected_count(), 1);
    assert_eq!(
        pool.record(id(2)).unwrap().status,
        ConnectionStatus::Error
    );

    venue.limit_sessions(usize::MAX);
    wait_until(WAIT, || {
        pool.record(id(2)).unwrap().status == ConnectionStatus::Connected
    })
    .await;
    wait_until(WAIT, || venue.session_for("TSLA") == Some(1)).await;

    assert_eq!(pool.connected_count(), 2);
    assert_eq!(pool.route("TSLA"), Some(id(2)));
    assert_eq!(venue.subscribed(0), ["AAPL"]);
    assert_eq!(pool.health_snapshot().status, HealthStatus::Healthy);

    venue.push_trade(1, "TSLA", 250.0);
    wait_until(WAIT, || recorder.tick_symbols() == ["TSLA"]).await;
    assert_eq!(pool.record(id(2)).unwrap().message_count, 1);

    pool.disconnect_all().await;
}

#[tokio::test(start_paused = true)]
async fn connect_all_fails_when_nothing_connects() {
    let venue = FakeVenue::new();
    venue.refuse_connections(true);
    let recorder = Recorder::default();
    let pool = pool(&venue, &recorder, &PoolSettings::default());

    pool.configure(&[
        SlotConfig::symbols(1, "a", ["AAPL"]),
        SlotConfig::symbols(2, "b", ["TSLA"]),
    ]);
    assert!(!pool.connect_all().await);

    let snapshot = pool.health_snapshot();
    assert_eq!(snapshot.status, HealthStatus::Unhealthy);
    assert_eq!(pool.route("TSLA"), Some(id(2)), "no target, tickers stay");
}

#[tokio::test(start_paused = true)]
async fn pool_reconnects_after_disconnect_all() {
    let venue = FakeVenue::new();
    let recorder = Recorder::default();
    let pool = pool(&venue, &recorder, &PoolSettings::default());

    pool.configure(&[SlotConfig::universe(1, "etfs", "sector_etfs")]);
    assert!(pool.connect_all().await);
    wait_until(WAIT, || venue.subscribed(0).len() == 2).await;

    pool.disconnect_all().await;
    pool.disconnect_all().await;
    let snapshot = pool.health_snapshot();
    assert!(
        snapshot
            .connections
            .iter()
            .all(|c| c.status == ConnectionStatus::Disconnected)
    );

    assert!(pool.connect_all().await);
    wait_until(WAIT, || venue.session_count() == 2).await;
    wait_until(WAIT, || sorted(venue.subscribed(1)) == ["XLF", "XLK"]).await;

    pool.disconnect_all().await;
}

#[tokio::test(start_paused = true)]
async fn new_symbols_follow_the_routing_strategy() {
    let venue = FakeVenue::new();
    let recorder = Recorder::default();
    let settings = PoolSettings {
        routing: RoutingPolicy::LeastLoaded,
        ..PoolSettings::default()
    };
    let pool = pool(&venue, &recorder, &settings);

    pool.configure(&[
        SlotConfig::symbols(1, "a", ["AAPL", "MSFT"]),
        SlotConfig::symbols(2, "b", ["TSLA"]),
    ]);
    assert!(pool.connect_all().await);
    wait_until(WAIT, || venue.session_for("TSLA").is_some()).await;
    let second = venue.session_for("TSLA").unwrap();

    assert!(pool.subscribe(["NVDA", "AAPL"]));
    assert_eq!(pool.route("NVDA"), Some(id(2)));
    assert_eq!(pool.route("AAPL"), Some(id(1)), "existing route kept");
    wait_until(WAIT, || venue.subscribed(second).contains(&"NVDA".to_string())).await;

    assert!(pool.unsubscribe(["NVDA"]));
    assert_eq!(pool.route("NVDA"), None);
    wait_until(WAIT, || {
        venue
            .sent(second)
            .iter()
            .any(|frame| frame.contains(r#""action":"unsubscribe""#))
    })
    .await;

    pool.disconnect_all().await;
}
