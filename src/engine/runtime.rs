// Match runtime: owns one simulation, runs the fixed-rate tick loop on its
// own task, gathers per-tick inputs, pushes observations, broadcasts to
// spectators, records the replay, and reports match end exactly once.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::MissedTickBehavior;

use crate::metrics;
use crate::protocol::{FinalScore, ServerMessage};
use crate::registry::ConnectionRegistry;
use crate::replay::{Replay, ReplayRecorder};

use super::fighter::FighterInput;
use super::sim::{MatchPhase, PlayerSide, SimConfig, SimEvent, SimSnapshot, Simulation};

/// Where a finished match's replay goes. Injected at construction; invoked
/// exactly once per match, after the replay is finalized and both bots have
/// been notified.
pub trait MatchEndSink: Send + Sync {
    fn on_match_end(&self, match_id: &str, replay: Replay);
}

/// Runtime tuning for one match.
#[derive(Debug, Clone, Copy)]
pub struct RuntimeConfig {
    pub sim: SimConfig,
    pub decision_timeout_ms: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        RuntimeConfig {
            sim: SimConfig::default(),
            decision_timeout_ms: 100,
        }
    }
}

#[derive(Default)]
struct PendingInputs {
    p1: Option<FighterInput>,
    p2: Option<FighterInput>,
}

/// Shared handle to a running match. Input arrival and termination go through
/// here; the tick loop owns everything else.
pub struct MatchHandle {
    pub match_id: String,
    pub p1_id: String,
    pub p2_id: String,
    pending: Mutex<PendingInputs>,
    stopped: AtomicBool,
    latest_state: Mutex<Option<SimSnapshot>>,
}

impl MatchHandle {
    /// Store a bot's input for the next tick. Latest input wins; inputs from
    /// bots not in this match are ignored.
    pub fn receive_input(&self, bot_id: &str, input: FighterInput) {
        let mut pending = self.pending.lock().unwrap();
        if bot_id == self.p1_id {
            pending.p1 = Some(input);
        } else if bot_id == self.p2_id {
            pending.p2 = Some(input);
        }
    }

    /// Ask the tick loop to terminate at the next tick boundary.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Relaxed);
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Relaxed)
    }

    /// Most recent state snapshot, for spectator catch-up.
    pub fn latest_state(&self) -> Option<SimSnapshot> {
        self.latest_state.lock().unwrap().clone()
    }

    pub fn involves(&self, bot_id: &str) -> bool {
        bot_id == self.p1_id || bot_id == self.p2_id
    }
}

/// Spawn the tick loop for a new match and return its handle.
pub fn spawn_match(
    match_id: String,
    p1_id: String,
    p2_id: String,
    config: RuntimeConfig,
    registry: Arc<ConnectionRegistry>,
    sink: Arc<dyn MatchEndSink>,
) -> Arc<MatchHandle> {
    let handle = Arc::new(MatchHandle {
        match_id: match_id.clone(),
        p1_id: p1_id.clone(),
        p2_id: p2_id.clone(),
        pending: Mutex::new(PendingInputs::default()),
        stopped: AtomicBool::new(false),
        latest_state: Mutex::new(None),
    });

    let loop_handle = handle.clone();
    tokio::spawn(async move {
        run_tick_loop(loop_handle, config, registry, sink).await;
    });

    handle
}

async fn run_tick_loop(
    handle: Arc<MatchHandle>,
    config: RuntimeConfig,
    registry: Arc<ConnectionRegistry>,
    sink: Arc<dyn MatchEndSink>,
) {
    let match_id = handle.match_id.clone();
    let mut sim = Simulation::new(&match_id, &handle.p1_id, &handle.p2_id, config.sim);
    let mut recorder = ReplayRecorder::new(
        &match_id,
        &handle.p1_id,
        &handle.p2_id,
        config.sim.tick_rate,
    );

    let tick_duration = Duration::from_secs_f64(1.0 / config.sim.tick_rate as f64);
    let mut interval = tokio::time::interval(tick_duration);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    metrics::ACTIVE_MATCHES.inc();
    let started = std::time::Instant::now();
    tracing::info!(match_id, p1 = handle.p1_id, p2 = handle.p2_id, "Match started");

    loop {
        interval.tick().await;
        if handle.is_stopped() {
            tracing::info!(match_id, "Match stopped before completion");
            break;
        }
        let tick_start = std::time::Instant::now();
        let fighting = sim.phase() == MatchPhase::Fighting;

        // Missing inputs are substituted inline with the no-op default, so a
        // silent bot can never stall the loop.
        let (p1_input, p2_input) = {
            let mut pending = handle.pending.lock().unwrap();
            (pending.p1.take(), pending.p2.take())
        };
        if fighting {
            if p1_input.is_none() {
                metrics::INPUT_TIMEOUTS_TOTAL.inc();
            }
            if p2_input.is_none() {
                metrics::INPUT_TIMEOUTS_TOTAL.inc();
            }
        }

        let events = sim.tick([p1_input.unwrap_or_default(), p2_input.unwrap_or_default()]);

        let snapshot = sim.snapshot();
        recorder.record(snapshot.clone(), &events);
        *handle.latest_state.lock().unwrap() = Some(snapshot.clone());
        registry.broadcast_to_spectators(&match_id, &ServerMessage::MatchState { state: snapshot });

        for event in &events {
            match event {
                SimEvent::RoundStart { round, .. } => {
                    let msg = ServerMessage::RoundStart {
                        round_number: *round,
                    };
                    registry.send_to_bot(&handle.p1_id, &msg);
                    registry.send_to_bot(&handle.p2_id, &msg);
                    registry.broadcast_to_spectators(&match_id, &msg);
                }
                SimEvent::Damage { .. } => {
                    registry.broadcast_to_spectators(
                        &match_id,
                        &ServerMessage::Damage {
                            event: event.clone(),
                        },
                    );
                }
                SimEvent::Ko { .. } => {
                    registry.broadcast_to_spectators(
                        &match_id,
                        &ServerMessage::Ko {
                            event: event.clone(),
                        },
                    );
                }
                _ => {}
            }
        }

        if sim.phase() == MatchPhase::Fighting {
            let deadline_ms =
                chrono::Utc::now().timestamp_millis() as u64 + config.decision_timeout_ms;
            for (side, bot_id) in [
                (PlayerSide::P1, &handle.p1_id),
                (PlayerSide::P2, &handle.p2_id),
            ] {
                let mut observation = sim.observation(side);
                observation.decision_deadline_ms = deadline_ms;
                registry.send_to_bot(
                    bot_id,
                    &ServerMessage::Observation {
                        observation,
                        requires_response: true,
                    },
                );
            }
        }

        metrics::TICK_DURATION_MS.observe(tick_start.elapsed().as_secs_f64() * 1000.0);

        if sim.is_over() {
            break;
        }
    }

    // Termination: finalize the replay, notify everyone, then hand the
    // replay to the sink. The sink fires exactly once per match.
    let (p1_rounds, p2_rounds) = sim.rounds_won();
    let final_score = FinalScore {
        p1_rounds,
        p2_rounds,
    };
    let winner_id = sim.winner_id().map(|s| s.to_string());
    let replay = recorder.finalize(winner_id.clone(), final_score);

    let end_msg = ServerMessage::MatchEnd {
        match_id: match_id.clone(),
        winner_id: winner_id.clone(),
        final_score,
    };
    registry.send_to_bot(&handle.p1_id, &end_msg);
    registry.send_to_bot(&handle.p2_id, &end_msg);
    registry.broadcast_to_spectators(&match_id, &end_msg);
    registry.clear_bot_match(&handle.p1_id);
    registry.clear_bot_match(&handle.p2_id);

    metrics::ACTIVE_MATCHES.dec();
    metrics::MATCH_DURATION_SECONDS.observe(started.elapsed().as_secs_f64());
    let result_label = if winner_id.is_some() { "win" } else { "draw" };
    metrics::MATCHES_COMPLETED_TOTAL
        .with_label_values(&[result_label])
        .inc();
    tracing::info!(match_id, winner = ?winner_id, "Match ended");

    handle.stop();
    sink.on_match_end(&match_id, replay);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::SessionKind;
    use std::sync::atomic::AtomicUsize;

    struct CollectingSink {
        calls: AtomicUsize,
        replays: Mutex<Vec<Replay>>,
        notify: tokio::sync::Notify,
    }

    impl CollectingSink {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                replays: Mutex::new(Vec::new()),
                notify: tokio::sync::Notify::new(),
            })
        }

        async fn wait(&self) {
            self.notify.notified().await;
        }
    }

    impl MatchEndSink for CollectingSink {
        fn on_match_end(&self, _match_id: &str, replay: Replay) {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.replays.lock().unwrap().push(replay);
            self.notify.notify_waiters();
        }
    }

    fn fast_config() -> RuntimeConfig {
        RuntimeConfig {
            sim: SimConfig {
                tick_rate: 60,
                rounds_to_win: 1,
                round_seconds: 1,
            },
            decision_timeout_ms: 100,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_bots_still_reach_match_end() {
        let registry = Arc::new(ConnectionRegistry::new());
        let sink = CollectingSink::new();

        let handle = spawn_match(
            "m-silent".into(),
            "bot-a".into(),
            "bot-b".into(),
            fast_config(),
            registry,
            sink.clone(),
        );

        sink.wait().await;
        assert_eq!(sink.calls.load(Ordering::SeqCst), 1);
        assert!(handle.is_stopped());

        let replays = sink.replays.lock().unwrap();
        let replay = &replays[0];
        // Nobody pressed anything: every round timed out even, so no winner.
        assert!(replay.winner_id.is_none());
        assert!(replay.frame_count > 0);
        assert_eq!(replay.frames.len(), replay.frame_count);
    }

    #[tokio::test(start_paused = true)]
    async fn test_attacking_bot_wins_and_bots_are_notified() {
        let registry = Arc::new(ConnectionRegistry::new());
        let sink = CollectingSink::new();

        // Both bots connected so MATCH_END lands in their queues; drain the
        // queues as a real socket write task would.
        let (conn_a, mut rx_a) = registry.add(SessionKind::Bot, "peer-a");
        registry.set_session(conn_a, "bot-a");
        let (conn_b, mut rx_b) = registry.add(SessionKind::Bot, "peer-b");
        registry.set_session(conn_b, "bot-b");

        let msgs_a: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let msgs_b: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let sink_a = msgs_a.clone();
        let sink_b = msgs_b.clone();
        tokio::spawn(async move {
            while let Some(json) = rx_a.recv().await {
                sink_a.lock().unwrap().push(json);
            }
        });
        tokio::spawn(async move {
            while let Some(json) = rx_b.recv().await {
                sink_b.lock().unwrap().push(json);
            }
        });

        let config = RuntimeConfig {
            sim: SimConfig {
                tick_rate: 60,
                rounds_to_win: 1,
                round_seconds: 99,
            },
            decision_timeout_ms: 100,
        };
        let handle = spawn_match(
            "m-win".into(),
            "bot-a".into(),
            "bot-b".into(),
            config,
            registry.clone(),
            sink.clone(),
        );

        // Drive p1 from a task: hold right+heavy every few ms.
        let driver_handle = handle.clone();
        let driver = tokio::spawn(async move {
            let input = FighterInput {
                right: true,
                attack2: true,
                ..Default::default()
            };
            while !driver_handle.is_stopped() {
                driver_handle.receive_input("bot-a", input);
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        });

        sink.wait().await;
        driver.abort();
        // Let the drain tasks catch up with the final messages.
        tokio::time::sleep(Duration::from_millis(50)).await;

        let replays = sink.replays.lock().unwrap();
        assert_eq!(replays[0].winner_id.as_deref(), Some("bot-a"));
        assert_eq!(replays[0].final_score.p1_rounds, 1);

        // Both bots got observations while fighting and the MATCH_END at the end.
        for msgs in [&msgs_a, &msgs_b] {
            let msgs = msgs.lock().unwrap();
            assert!(msgs.iter().any(|j| j.contains("\"type\":\"OBSERVATION\"")));
            assert!(msgs.iter().any(|j| j.contains("\"type\":\"MATCH_END\"")));
        }
        assert_eq!(registry.bot_match("bot-a"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_terminates_early_and_sink_still_fires() {
        let registry = Arc::new(ConnectionRegistry::new());
        let sink = CollectingSink::new();

        let config = RuntimeConfig::default(); // 99s rounds, first to 2
        let handle = spawn_match(
            "m-stop".into(),
            "bot-a".into(),
            "bot-b".into(),
            config,
            registry,
            sink.clone(),
        );

        tokio::time::sleep(Duration::from_millis(500)).await;
        handle.stop();
        sink.wait().await;

        assert_eq!(sink.calls.load(Ordering::SeqCst), 1);
        let replays = sink.replays.lock().unwrap();
        assert!(replays[0].winner_id.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_inputs_from_strangers_ignored() {
        let registry = Arc::new(ConnectionRegistry::new());
        let sink = CollectingSink::new();
        let handle = spawn_match(
            "m-stranger".into(),
            "bot-a".into(),
            "bot-b".into(),
            fast_config(),
            registry,
            sink.clone(),
        );

        handle.receive_input(
            "bot-intruder",
            FighterInput {
                attack2: true,
                ..Default::default()
            },
        );
        assert!(handle.pending.lock().unwrap().p1.is_none());
        assert!(handle.pending.lock().unwrap().p2.is_none());

        handle.stop();
        sink.wait().await;
    }
}
