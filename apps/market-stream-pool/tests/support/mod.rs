//! In-memory venue for integration tests.
//!
//! Every `open` creates a scripted session: the venue greets with
//! `connected`, answers the auth frame, and acknowledges subscribes. Tests
//! can inject frames into a session, kill it, or refuse new connections.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::{sink, stream};
use market_stream_pool::application::ports::{FrameSink, FrameStream};
use market_stream_pool::{Connector, Credentials, StatusData, TickRecord, TransportError};
use parking_lot::Mutex;
use serde_json::json;
use tokio::sync::mpsc;

type Inbound = mpsc::UnboundedSender<Result<String, TransportError>>;

struct Session {
    inbound: Inbound,
    sent: Arc<Mutex<Vec<String>>>,
}

struct Inner {
    opens: AtomicUsize,
    accept_limit: AtomicUsize,
    refuse: AtomicBool,
    reject_auth: AtomicBool,
    sessions: Mutex<Vec<Session>>,
}

impl Default for Inner {
    fn default() -> Self {
        Self {
            opens: AtomicUsize::new(0),
            accept_limit: AtomicUsize::new(usize::MAX),
            refuse: AtomicBool::new(false),
            reject_auth: AtomicBool::new(false),
            sessions: Mutex::new(Vec::new()),
        }
    }
}

/// Scripted venue shared by every connection under test.
#[derive(Clone, Default)]
pub struct FakeVenue {
    inner: Arc<Inner>,
}

impl FakeVenue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connector(&self) -> Arc<dyn Connector> {
        Arc::new(self.clone())
    }

    /// Refuse (or accept again) every new connection.
    pub fn refuse_connections(&self, refuse: bool) {
        self.inner.refuse.store(refuse, Ordering::SeqCst);
    }

    /// Accept at most `limit` sessions in total; refuse the rest.
    pub fn limit_sessions(&self, limit: usize) {
        self.inner.accept_limit.store(limit, Ordering::SeqCst);
    }

    /// Answer auth frames with `auth_failed`.
    pub fn reject_auth(&self, reject: bool) {
        self.inner.reject_auth.store(reject, Ordering::SeqCst);
    }

    /// Number of `open` calls, refused ones included.
    pub fn open_count(&self) -> usize {
        self.inner.opens.load(Ordering::SeqCst)
    }

    pub fn session_count(&self) -> usize {
        self.inner.sessions.lock().len()
    }

    /// Frames the client wrote on session `index`.
    pub fn sent(&self, index: usize) -> Vec<String> {
        self.inner.sessions.lock()[index].sent.lock().clone()
    }

    /// Symbols subscribed on session `index`, in order.
    pub fn subscribed(&self, index: usize) -> Vec<String> {
        self.sent(index)
            .iter()
            .filter_map(|frame| {
                let value: serde_json::Value = serde_json::from_str(frame).ok()?;
                (value["action"] == "subscribe").then(|| channel_symbol(&value["params"]))
            })
            .collect()
    }

    /// Latest session that subscribed `symbol`.
    pub fn session_for(&self, symbol: &str) -> Option<usize> {
        (0..self.session_count())
            .rev()
            .find(|&index| self.subscribed(index).iter().any(|s| s == symbol))
    }

    /// Push a raw frame to the client on session `index`.
    pub fn push(&self, index: usize, frame: impl Into<String>) {
        let _ = self.inner.sessions.lock()[index].inbound.send(Ok(frame.into()));
    }

    /// Push a trade for `symbol` on session `index`.
    pub fn push_trade(&self, index: usize, symbol: &str, price: f64) {
        let frame = json!([{
            "ev": "T",
            "sym": symbol,
            "p": price,
            "s": 100,
            "t": 1_700_000_000_123_i64,
        }]);
        self.push(index, frame.to_string());
    }

    /// Fail the socket of session `index`.
    pub fn kill(&self, index: usize) {
        let _ = self.inner.sessions.lock()[index]
            .inbound
            .send(Err(TransportError::Receive("connection reset".to_string())));
    }
}

#[async_trait]
impl Connector for FakeVenue {
    async fn open(&self, _url: &str) -> Result<(FrameSink, FrameStream), TransportError> {
        self.inner.opens.fetch_add(1, Ordering::SeqCst);
        if self.inner.refuse.load(Ordering::SeqCst)
            || self.session_count() >= self.inner.accept_limit.load(Ordering::SeqCst)
        {
            return Err(TransportError::Connect("connection refused".to_string()));
        }

        let (inbound, rx) = mpsc::unbounded_channel();
        let sent = Arc::new(Mutex::new(Vec::new()));
        let _ = inbound.send(Ok(status("connected", "Connected Successfully")));

        let reject = Arc::clone(&self.inner);
        let frames: FrameSink = Box::pin(sink::unfold(
            (inbound.clone(), Arc::clone(&sent)),
            move |(inbound, sent), frame: String| {
                let reject_auth = reject.reject_auth.load(Ordering::SeqCst);
                async move {
                    respond(&inbound, &frame, reject_auth);
                    sent.lock().push(frame);
                    Ok::<_, TransportError>((inbound, sent))
                }
            },
        ));
        let events: FrameStream = Box::pin(stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        }));

        self.inner.sessions.lock().push(Session { inbound, sent });
        Ok((frames, events))
    }
}

fn respond(inbound: &Inbound, frame: &str, reject_auth: bool) {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(frame) else {
        return;
    };
    let reply = match value["action"].as_str() {
        Some("auth") if reject_auth => status("auth_failed", "authentication failed"),
        Some("auth") => status("auth_success", "authenticated"),
        Some("subscribe") => status(
            "success",
            &format!("subscribed to: {}", value["params"].as_str().unwrap_or_default()),
        ),
        Some("unsubscribe") => status(
            "success",
            &format!("unsubscribed to: {}", value["params"].as_str().unwrap_or_default()),
        ),
        _ => return,
    };
    let _ = inbound.send(Ok(reply));
}

fn status(status: &str, message: &str) -> String {
    json!([{ "ev": "status", "status": status, "message": message }]).to_string()
}

/// `"T.AAPL,AM.AAPL"` -> `"AAPL"`.
fn channel_symbol(params: &serde_json::Value) -> String {
    params
        .as_str()
        .and_then(|p| p.split(',').next())
        .and_then(|entry| entry.split_once('.'))
        .map(|(_, symbol)| symbol.to_string())
        .unwrap_or_default()
}

// =============================================================================
// Recorders
// =============================================================================

/// Records every tick and status delivered to the callbacks.
#[derive(Clone, Default)]
pub struct Recorder {
    ticks: Arc<Mutex<Vec<TickRecord>>>,
    statuses: Arc<Mutex<Vec<(String, StatusData)>>>,
}

impl Recorder {
    pub fn on_tick(&self) -> Arc<dyn Fn(TickRecord) + Send + Sync> {
        let ticks = Arc::clone(&self.ticks);
        Arc::new(move |tick| ticks.lock().push(tick))
    }

    pub fn on_status(&self) -> Arc<dyn Fn(&str, StatusData) + Send + Sync> {
        let statuses = Arc::clone(&self.statuses);
        Arc::new(move |status: &str, data| statuses.lock().push((status.to_string(), data)))
    }

    pub fn ticks(&self) -> Vec<TickRecord> {
        self.ticks.lock().clone()
    }

    pub fn tick_symbols(&self) -> Vec<String> {
        self.ticks
            .lock()
            .iter()
            .map(|tick| tick.symbol().to_string())
            .collect()
    }

    pub fn statuses(&self) -> Vec<(String, StatusData)> {
        self.statuses.lock().clone()
    }

    pub fn status_names(&self) -> Vec<String> {
        self.statuses
            .lock()
            .iter()
            .map(|(status, _)| status.clone())
            .collect()
    }
}

pub fn credentials() -> Credentials {
    Credentials::new("test-key").unwrap()
}

/// Poll `condition` until it holds, panicking after `timeout`.
pub async fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + timeout;
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not met within {timeout:?}"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Let spawned tasks drain their queues.
pub async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
    tokio::time::sleep(Duration::from_millis(20)).await;
}
