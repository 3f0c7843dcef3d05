// End-to-end match scenarios: deterministic simulation runs, the decision
// deadline's default-input substitution, rating updates, and replay capture.

use std::sync::Arc;

use arena_backend::config::Config;
use arena_backend::controller::Controller;
use arena_backend::engine::fighter::{FighterInput, FighterState};
use arena_backend::engine::runtime::{spawn_match, MatchEndSink, RuntimeConfig};
use arena_backend::engine::sim::{MatchPhase, SimConfig, SimEvent, Simulation};
use arena_backend::protocol::FinalScore;
use arena_backend::rate_limit::RateLimiter;
use arena_backend::registry::{ConnectionRegistry, SessionKind};
use arena_backend::replay::{compress_replay, decompress_replay, Replay, ReplayRecorder};
use arena_backend::store::{BotStore, MatchStore, MemoryBotStore, MemoryMatchStore};

fn aggressor() -> FighterInput {
    FighterInput {
        right: true,
        attack2: true,
        ..Default::default()
    }
}

fn idle() -> FighterInput {
    FighterInput::default()
}

// ── Simulation scenarios ─────────────────────────────────────────────

#[test]
fn test_minimal_ko_round() {
    let mut sim = Simulation::new(
        "m-ko",
        "p1",
        "p2",
        SimConfig {
            tick_rate: 60,
            rounds_to_win: 1,
            round_seconds: 99,
        },
    );

    let mut events = Vec::new();
    let mut guard = 0;
    while !sim.is_over() {
        events.extend(sim.tick([aggressor(), idle()]));
        guard += 1;
        assert!(guard < 60 * 90, "expected a KO well before the round timer");
    }

    // KO, then round end, then match end, in order.
    let ko_pos = events
        .iter()
        .position(|e| matches!(e, SimEvent::Ko { .. }))
        .expect("ko event");
    let round_end_pos = events
        .iter()
        .position(|e| matches!(e, SimEvent::RoundEnd { .. }))
        .expect("round end event");
    let match_end_pos = events
        .iter()
        .position(|e| matches!(e, SimEvent::MatchEnd { .. }))
        .expect("match end event");
    assert!(ko_pos < round_end_pos && round_end_pos < match_end_pos);

    assert_eq!(sim.winner_id(), Some("p1"));
    assert_eq!(sim.rounds_won(), (1, 0));
    assert!(matches!(
        events[match_end_pos],
        SimEvent::MatchEnd {
            p1_rounds: 1,
            p2_rounds: 0,
            ..
        }
    ));
}

#[test]
fn test_determinism_across_independent_runs() {
    let script = |tick: u64| -> [FighterInput; 2] {
        [
            FighterInput {
                right: tick % 2 == 0,
                attack1: tick % 5 == 0,
                jump: tick % 41 == 0,
                ..Default::default()
            },
            FighterInput {
                left: tick % 3 == 0,
                attack2: tick % 13 == 0,
                down: tick % 17 == 0,
                ..Default::default()
            },
        ]
    };

    let mut a = Simulation::new("m-det", "p1", "p2", SimConfig::default());
    let mut b = Simulation::new("m-det", "p1", "p2", SimConfig::default());
    for tick in 0..3000u64 {
        let ea = a.tick(script(tick));
        let eb = b.tick(script(tick));
        assert_eq!(ea, eb, "events diverged at tick {tick}");
        assert_eq!(a.snapshot(), b.snapshot(), "state diverged at tick {tick}");
    }
}

#[test]
fn test_health_bounds_hold_for_full_match() {
    let mut sim = Simulation::new(
        "m-bounds",
        "p1",
        "p2",
        SimConfig {
            rounds_to_win: 1,
            ..Default::default()
        },
    );
    while !sim.is_over() {
        sim.tick([aggressor(), aggressor()]);
        let snap = sim.snapshot();
        for fighter in [&snap.p1, &snap.p2] {
            assert!(fighter.health >= 0);
            assert!(fighter.health <= fighter.max_health);
        }
    }
}

#[test]
fn test_jump_is_airborne_one_frame_later() {
    let mut sim = Simulation::new("m-jump", "p1", "p2", SimConfig::default());
    while sim.phase() != MatchPhase::Fighting {
        sim.tick([idle(), idle()]);
    }
    assert!(sim.snapshot().p1.grounded);

    sim.tick([
        FighterInput {
            jump: true,
            ..Default::default()
        },
        idle(),
    ]);
    let snap = sim.snapshot();
    assert!(!snap.p1.grounded);
    assert_eq!(snap.p1.state, FighterState::Jumping);
}

#[test]
fn test_round_timer_counts_seconds() {
    let mut sim = Simulation::new("m-timer", "p1", "p2", SimConfig::default());
    while sim.phase() != MatchPhase::Fighting {
        sim.tick([idle(), idle()]);
    }
    let start = sim.time_remaining();
    for _ in 0..60 {
        sim.tick([idle(), idle()]);
    }
    assert_eq!(sim.time_remaining(), start - 1);
    for _ in 0..120 {
        sim.tick([idle(), idle()]);
    }
    assert_eq!(sim.time_remaining(), start - 3);
}

// ── Replay ───────────────────────────────────────────────────────────

#[test]
fn test_replay_round_trip_equality() {
    let mut sim = Simulation::new(
        "m-replay",
        "p1",
        "p2",
        SimConfig {
            rounds_to_win: 1,
            ..Default::default()
        },
    );
    let mut recorder = ReplayRecorder::new("m-replay", "p1", "p2", 60);
    while !sim.is_over() {
        let events = sim.tick([aggressor(), idle()]);
        recorder.record(sim.snapshot(), &events);
    }
    let (p1_rounds, p2_rounds) = sim.rounds_won();
    let replay = recorder.finalize(
        sim.winner_id().map(String::from),
        FinalScore {
            p1_rounds,
            p2_rounds,
        },
    );

    let bytes = compress_replay(&replay).unwrap();
    let restored = decompress_replay(&bytes).unwrap();
    assert_eq!(restored, replay);

    // Key frames cover round start, the KO, and match end.
    assert!(replay.key_frames.len() >= 3);
    assert_eq!(replay.winner_id.as_deref(), Some("p1"));
    assert_eq!(replay.frame_count, replay.frames.len());
}

// ── Match runtime ────────────────────────────────────────────────────

struct EndProbe {
    replays: std::sync::Mutex<Vec<Replay>>,
    notify: tokio::sync::Notify,
}

impl EndProbe {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            replays: std::sync::Mutex::new(Vec::new()),
            notify: tokio::sync::Notify::new(),
        })
    }
}

impl MatchEndSink for EndProbe {
    fn on_match_end(&self, _match_id: &str, replay: Replay) {
        self.replays.lock().unwrap().push(replay);
        self.notify.notify_waiters();
    }
}

#[tokio::test(start_paused = true)]
async fn test_decision_timeout_substitutes_default_input() {
    let registry = Arc::new(ConnectionRegistry::new());
    let probe = EndProbe::new();

    // Neither bot ever sends an input; the loop substitutes the no-op
    // default each tick and the simulation advances to its natural end.
    spawn_match(
        "m-default".into(),
        "p1".into(),
        "p2".into(),
        RuntimeConfig {
            sim: SimConfig {
                tick_rate: 60,
                rounds_to_win: 1,
                round_seconds: 2,
            },
            decision_timeout_ms: 100,
        },
        registry,
        probe.clone(),
    );

    probe.notify.notified().await;
    let replays = probe.replays.lock().unwrap();
    let replay = &replays[0];
    // Every round timed out with full health on both sides: a draw.
    assert!(replay.winner_id.is_none());
    // The loop kept ticking the whole way through three idle rounds.
    assert!(replay.frame_count > 3 * 2 * 60);
}

#[tokio::test(start_paused = true)]
async fn test_slow_spectator_does_not_block_match() {
    let registry = Arc::new(ConnectionRegistry::new());
    let probe = EndProbe::new();

    // A spectator that accepts the connection but never drains its queue.
    let (spectator, _undrained_rx) = registry.add(SessionKind::Spectator, "slow-peer");
    registry.add_spectator(spectator, "m-slow");

    spawn_match(
        "m-slow".into(),
        "p1".into(),
        "p2".into(),
        RuntimeConfig {
            sim: SimConfig {
                tick_rate: 60,
                rounds_to_win: 1,
                round_seconds: 2,
            },
            decision_timeout_ms: 100,
        },
        registry.clone(),
        probe.clone(),
    );

    let started = tokio::time::Instant::now();
    probe.notify.notified().await;
    let replays = probe.replays.lock().unwrap();
    let frames = replays[0].frame_count as f64;

    // Virtual elapsed time tracks the tick rate, not the stuck spectator.
    let elapsed = started.elapsed().as_secs_f64();
    assert!(elapsed < frames / 60.0 + 1.0, "match was delayed: {elapsed}s for {frames} frames");
    assert_eq!(registry.spectator_count("m-slow"), 1);
}

// ── Rating pipeline ──────────────────────────────────────────────────

#[test]
fn test_rating_update_on_win() {
    let bot_store = Arc::new(MemoryBotStore::new());
    let match_store = Arc::new(MemoryMatchStore::new());
    let registry = Arc::new(ConnectionRegistry::new());
    let controller = Controller::new(
        Config::default(),
        registry,
        bot_store.clone(),
        match_store.clone(),
        RateLimiter::default(),
    );

    let a = bot_store.create("EloA", "owner").unwrap();
    let b = bot_store.create("EloB", "owner").unwrap();
    bot_store.update_rating(&a.bot_id, 1200);
    bot_store.update_rating(&b.bot_id, 1200);

    let replay = ReplayRecorder::new("m-elo", &a.bot_id, &b.bot_id, 60).finalize(
        Some(a.bot_id.clone()),
        FinalScore {
            p1_rounds: 2,
            p2_rounds: 0,
        },
    );
    controller.finish_match("m-elo", replay);

    assert_eq!(bot_store.get_by_id(&a.bot_id).unwrap().rating, 1216);
    assert_eq!(bot_store.get_by_id(&b.bot_id).unwrap().rating, 1184);

    let record = match_store.get_match("m-elo").unwrap();
    assert_eq!(record.winner_id.as_deref(), Some(a.bot_id.as_str()));
    assert_eq!(record.p1_name, "EloA");
}
