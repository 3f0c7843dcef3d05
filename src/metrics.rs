// Prometheus metrics definitions for the arena backend.

use lazy_static::lazy_static;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    // ── Gauges ───────────────────────────────────────────────────────

    /// Currently running matches.
    pub static ref ACTIVE_MATCHES: IntGauge =
        IntGauge::new("arena_active_matches", "Currently running matches").unwrap();

    /// Bots waiting in the matchmaking queue.
    pub static ref MATCHMAKING_QUEUE_DEPTH: IntGauge =
        IntGauge::new("arena_matchmaking_queue_depth", "Bots waiting in the matchmaking queue").unwrap();

    /// Live WebSocket connections.
    pub static ref CONNECTED_WEBSOCKETS: IntGauge =
        IntGauge::new("arena_connected_websockets", "Live WebSocket connections").unwrap();

    /// Tournaments currently in progress.
    pub static ref ACTIVE_TOURNAMENTS: IntGauge =
        IntGauge::new("arena_active_tournaments", "Tournaments currently in progress").unwrap();

    // ── Counters ─────────────────────────────────────────────────────

    /// Total matches started, by origin (matchmaking, challenge, tournament).
    pub static ref MATCHES_STARTED_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("arena_matches_started_total", "Total matches started"),
        &["origin"],
    )
    .unwrap();

    /// Total matches completed, by result (win, draw).
    pub static ref MATCHES_COMPLETED_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("arena_matches_completed_total", "Total matches completed"),
        &["result"],
    )
    .unwrap();

    /// Total WebSocket messages sent to clients.
    pub static ref WEBSOCKET_MESSAGES_SENT_TOTAL: IntCounter = IntCounter::new(
        "arena_websocket_messages_sent_total",
        "Total WebSocket messages sent",
    )
    .unwrap();

    /// Total bots registered over the wire.
    pub static ref BOTS_REGISTERED_TOTAL: IntCounter = IntCounter::new(
        "arena_bots_registered_total",
        "Bots registered",
    )
    .unwrap();

    /// Total failed AUTH attempts.
    pub static ref AUTH_FAILURES_TOTAL: IntCounter = IntCounter::new(
        "arena_auth_failures_total",
        "Failed AUTH attempts",
    )
    .unwrap();

    /// Total inputs substituted because the decision deadline lapsed.
    pub static ref INPUT_TIMEOUTS_TOTAL: IntCounter = IntCounter::new(
        "arena_input_timeouts_total",
        "Default inputs substituted on decision timeout",
    )
    .unwrap();

    // ── Histograms ───────────────────────────────────────────────────

    /// Match duration in seconds.
    pub static ref MATCH_DURATION_SECONDS: Histogram = Histogram::with_opts(
        HistogramOpts::new("arena_match_duration_seconds", "Match duration in seconds")
            .buckets(vec![10.0, 30.0, 60.0, 120.0, 300.0, 600.0]),
    )
    .unwrap();

    /// Per-tick processing time in milliseconds.
    pub static ref TICK_DURATION_MS: Histogram = Histogram::with_opts(
        HistogramOpts::new("arena_tick_duration_ms", "Per-tick processing time in ms")
            .buckets(vec![0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 16.0]),
    )
    .unwrap();
}

/// Register all metrics with the custom registry. Call once at startup.
pub fn register_metrics() {
    let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(ACTIVE_MATCHES.clone()),
        Box::new(MATCHMAKING_QUEUE_DEPTH.clone()),
        Box::new(CONNECTED_WEBSOCKETS.clone()),
        Box::new(ACTIVE_TOURNAMENTS.clone()),
        Box::new(MATCHES_STARTED_TOTAL.clone()),
        Box::new(MATCHES_COMPLETED_TOTAL.clone()),
        Box::new(WEBSOCKET_MESSAGES_SENT_TOTAL.clone()),
        Box::new(BOTS_REGISTERED_TOTAL.clone()),
        Box::new(AUTH_FAILURES_TOTAL.clone()),
        Box::new(INPUT_TIMEOUTS_TOTAL.clone()),
        Box::new(MATCH_DURATION_SECONDS.clone()),
        Box::new(TICK_DURATION_MS.clone()),
    ];

    for c in collectors {
        REGISTRY.register(c).expect("failed to register metric");
    }
}

/// Serialize all registered metrics to the Prometheus text exposition format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer).unwrap();
    String::from_utf8(buffer).unwrap()
}
