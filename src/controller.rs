// Controller: dispatches client messages to the matchmaking queue, the
// tournament manager, and match runtimes, and runs the match-end pipeline
// (persist record, update ratings, advance brackets).

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::config::Config;
use crate::elo;
use crate::engine::fighter::FighterInput;
use crate::engine::runtime::{spawn_match, MatchEndSink, MatchHandle, RuntimeConfig};
use crate::engine::sim::SimConfig;
use crate::error::ArenaError;
use crate::matchmaking::MatchmakingQueue;
use crate::metrics;
use crate::protocol::{
    ClientMessage, LeaderboardEntry, OpponentInfo, ServerMessage, CLOSE_AUTH_FAILED,
    CLOSE_RATE_LIMITED,
};
use crate::rate_limit::{RateLimitType, RateLimiter};
use crate::registry::{ConnId, ConnectionRegistry};
use crate::replay::Replay;
use crate::store::{BotIdentity, BotStore, MatchStore};
use crate::tournament::{CreateMatch, TournamentManager};

/// What the socket loop should do after a message was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostAction {
    Continue,
    Close(u16),
}

pub struct Controller {
    config: Config,
    registry: Arc<ConnectionRegistry>,
    bot_store: Arc<dyn BotStore>,
    match_store: Arc<dyn MatchStore>,
    rate_limiter: RateLimiter,
    pub queue: MatchmakingQueue,
    pub tournaments: TournamentManager,
    active_matches: Mutex<HashMap<String, Arc<MatchHandle>>>,
}

impl Controller {
    pub fn new(
        config: Config,
        registry: Arc<ConnectionRegistry>,
        bot_store: Arc<dyn BotStore>,
        match_store: Arc<dyn MatchStore>,
        rate_limiter: RateLimiter,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            registry,
            bot_store,
            match_store,
            rate_limiter,
            queue: MatchmakingQueue::new(),
            tournaments: TournamentManager::new(),
            active_matches: Mutex::new(HashMap::new()),
        })
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    pub fn active_match_count(&self) -> usize {
        self.active_matches.lock().unwrap().len()
    }

    pub fn match_handle(&self, match_id: &str) -> Option<Arc<MatchHandle>> {
        self.active_matches.lock().unwrap().get(match_id).cloned()
    }

    /// Parse and dispatch one inbound frame.
    pub fn handle_text(self: &Arc<Self>, conn: ConnId, text: &str) -> PostAction {
        let value: serde_json::Value = match serde_json::from_str(text) {
            Ok(value) => value,
            Err(e) => {
                self.reply_error(conn, &ArenaError::InvalidMessage(e.to_string()));
                return PostAction::Continue;
            }
        };
        let message: ClientMessage = match serde_json::from_value(value) {
            Ok(message) => message,
            Err(e) => {
                let err = if e.to_string().contains("unknown variant") {
                    ArenaError::UnknownType
                } else {
                    ArenaError::InvalidMessage(e.to_string())
                };
                self.reply_error(conn, &err);
                return PostAction::Continue;
            }
        };
        self.handle_message(conn, message)
    }

    pub fn handle_message(self: &Arc<Self>, conn: ConnId, message: ClientMessage) -> PostAction {
        match message {
            ClientMessage::Auth { api_key } => return self.handle_auth(conn, &api_key),
            ClientMessage::Ping => {
                self.registry.send(
                    conn,
                    &ServerMessage::Pong {
                        timestamp: chrono::Utc::now().timestamp_millis(),
                    },
                );
            }
            ClientMessage::Input { input, .. } => self.handle_input(conn, input),
            ClientMessage::JoinMatchmaking => self.handle_join_matchmaking(conn),
            ClientMessage::LeaveMatchmaking => self.handle_leave_matchmaking(conn),
            ClientMessage::Challenge { target_bot_id } => {
                self.handle_challenge(conn, &target_bot_id)
            }
            ClientMessage::Spectate { match_id } => self.handle_spectate(conn, &match_id),
            ClientMessage::GetLeaderboard => self.handle_leaderboard(conn),
            ClientMessage::GetMatches { bot_id, limit } => {
                self.handle_get_matches(conn, bot_id.as_deref(), limit)
            }
            ClientMessage::RegisterBot { bot_name, owner_id } => {
                self.handle_register_bot(conn, &bot_name, &owner_id)
            }
            ClientMessage::CreateTournament {
                name,
                format,
                max_bots,
                buy_in,
                prize_distribution,
            } => self.handle_create_tournament(conn, &name, &format, max_bots, buy_in, prize_distribution),
            ClientMessage::JoinTournament { tournament_id } => {
                self.handle_join_tournament(conn, &tournament_id)
            }
            ClientMessage::StartTournament { tournament_id } => {
                self.handle_start_tournament(conn, &tournament_id)
            }
            ClientMessage::GetBracket { tournament_id } => {
                match self.tournaments.get(&tournament_id) {
                    Some(tournament) => self
                        .registry
                        .send(conn, &ServerMessage::Bracket { tournament }),
                    None => self.reply_error(conn, &ArenaError::TournamentNotFound),
                }
            }
            ClientMessage::ListTournaments => {
                self.registry.send(
                    conn,
                    &ServerMessage::TournamentList {
                        tournaments: self.tournaments.list(),
                    },
                );
            }
        }
        PostAction::Continue
    }

    fn reply_error(&self, conn: ConnId, err: &ArenaError) {
        self.registry.send(conn, &ServerMessage::error(err));
    }

    /// The authenticated bot behind a connection, or an error reply.
    fn authed_bot(&self, conn: ConnId) -> Result<BotIdentity, ArenaError> {
        let bot_id = self
            .registry
            .bot_for_conn(conn)
            .ok_or(ArenaError::NotAuthenticated)?;
        self.bot_store
            .get_by_id(&bot_id)
            .ok_or(ArenaError::BotNotFound)
    }

    fn handle_auth(self: &Arc<Self>, conn: ConnId, api_key: &str) -> PostAction {
        if let Some(peer) = self.registry.peer(conn) {
            if let Err(e) = self.rate_limiter.check_limit(&peer, RateLimitType::Auth) {
                self.reply_error(conn, &ArenaError::RateLimited(e.to_string()));
                return PostAction::Close(CLOSE_RATE_LIMITED);
            }
        }

        match self.bot_store.get_by_credential(api_key) {
            Some(bot) => {
                self.registry.set_session(conn, &bot.bot_id);
                self.bot_store.update_last_seen(&bot.bot_id);
                // A bot reconnecting mid-match resumes driving its fighter.
                let live_match = self
                    .active_matches
                    .lock()
                    .unwrap()
                    .values()
                    .find(|h| h.involves(&bot.bot_id))
                    .map(|h| h.match_id.clone());
                if let Some(match_id) = live_match {
                    self.registry.assign_bot_to_match(&bot.bot_id, &match_id);
                }
                self.registry.send(
                    conn,
                    &ServerMessage::AuthSuccess {
                        bot_id: bot.bot_id.clone(),
                        bot_name: bot.name.clone(),
                        rating: bot.rating,
                    },
                );
                tracing::info!(bot_id = bot.bot_id, name = bot.name, "Bot authenticated");
                PostAction::Continue
            }
            None => {
                metrics::AUTH_FAILURES_TOTAL.inc();
                self.reply_error(conn, &ArenaError::AuthFailed);
                PostAction::Close(CLOSE_AUTH_FAILED)
            }
        }
    }

    fn handle_input(&self, conn: ConnId, input: FighterInput) {
        let Some(bot_id) = self.registry.bot_for_conn(conn) else {
            self.reply_error(conn, &ArenaError::NotAuthenticated);
            return;
        };
        // Inputs outside a match are dropped; late inputs for a finished
        // match land here too and are equally harmless.
        let Some(match_id) = self.registry.bot_match(&bot_id) else {
            return;
        };
        if let Some(handle) = self.match_handle(&match_id) {
            handle.receive_input(&bot_id, input);
        }
    }

    fn handle_join_matchmaking(&self, conn: ConnId) {
        let bot = match self.authed_bot(conn) {
            Ok(bot) => bot,
            Err(e) => return self.reply_error(conn, &e),
        };
        if self.registry.bot_match(&bot.bot_id).is_some() {
            return self.reply_error(conn, &ArenaError::AlreadyInMatch);
        }
        match self.queue.join(&bot.bot_id, bot.rating) {
            Ok(()) => self.registry.send(conn, &ServerMessage::MatchmakingJoined),
            Err(e) => self.reply_error(conn, &e),
        }
    }

    fn handle_leave_matchmaking(&self, conn: ConnId) {
        let bot = match self.authed_bot(conn) {
            Ok(bot) => bot,
            Err(e) => return self.reply_error(conn, &e),
        };
        // Leaving when not queued is a no-op.
        self.queue.leave(&bot.bot_id);
        self.registry.send(conn, &ServerMessage::MatchmakingLeft);
    }

    fn handle_challenge(self: &Arc<Self>, conn: ConnId, target_bot_id: &str) {
        let challenger = match self.authed_bot(conn) {
            Ok(bot) => bot,
            Err(e) => return self.reply_error(conn, &e),
        };
        let Some(target) = self.bot_store.get_by_id(target_bot_id) else {
            return self.reply_error(conn, &ArenaError::BotNotFound);
        };
        if !self.registry.is_bot_online(&target.bot_id) {
            return self.reply_error(conn, &ArenaError::BotOffline);
        }
        if self.registry.bot_match(&challenger.bot_id).is_some()
            || self.registry.bot_match(&target.bot_id).is_some()
        {
            return self.reply_error(conn, &ArenaError::AlreadyInMatch);
        }
        self.start_match(&challenger, &target, "challenge");
    }

    fn handle_spectate(&self, conn: ConnId, match_id: &str) {
        let Some(handle) = self.match_handle(match_id) else {
            return self.reply_error(conn, &ArenaError::MatchNotFound);
        };
        self.registry.add_spectator(conn, match_id);
        self.registry.send(
            conn,
            &ServerMessage::SpectateJoined {
                match_id: match_id.to_string(),
            },
        );
        // Catch the spectator up with the latest snapshot.
        if let Some(state) = handle.latest_state() {
            self.registry
                .send(conn, &ServerMessage::MatchState { state });
        }
    }

    fn handle_leaderboard(&self, conn: ConnId) {
        let bots = self
            .bot_store
            .list()
            .into_iter()
            .enumerate()
            .map(|(i, bot)| LeaderboardEntry {
                rank: i + 1,
                bot_id: bot.bot_id,
                bot_name: bot.name,
                rating: bot.rating,
            })
            .collect();
        self.registry
            .send(conn, &ServerMessage::Leaderboard { bots });
    }

    fn handle_get_matches(&self, conn: ConnId, bot_id: Option<&str>, limit: Option<usize>) {
        let limit = limit.unwrap_or(20).min(100);
        let matches = match bot_id {
            Some(bot_id) => self.match_store.get_bot_matches(bot_id, limit),
            None => self.match_store.get_recent_matches(limit),
        };
        self.registry
            .send(conn, &ServerMessage::MatchHistory { matches });
    }

    fn handle_register_bot(&self, conn: ConnId, bot_name: &str, owner_id: &str) {
        if bot_name.trim().is_empty() {
            return self.reply_error(
                conn,
                &ArenaError::InvalidMessage("botName is required".to_string()),
            );
        }
        match self.bot_store.create(bot_name, owner_id) {
            Ok(issued) => {
                metrics::BOTS_REGISTERED_TOTAL.inc();
                tracing::info!(bot_id = issued.bot_id, name = bot_name, "Bot registered");
                self.registry.send(
                    conn,
                    &ServerMessage::BotRegistered {
                        bot_id: issued.bot_id,
                        api_key: issued.api_key,
                        bot_name: issued.bot_name,
                        rating: issued.rating,
                    },
                );
            }
            Err(e) => self.reply_error(conn, &e),
        }
    }

    fn handle_create_tournament(
        &self,
        conn: ConnId,
        name: &str,
        format: &str,
        max_bots: usize,
        buy_in: i64,
        prize_distribution: Vec<f64>,
    ) {
        if let Err(e) = self.authed_bot(conn) {
            return self.reply_error(conn, &e);
        }
        match self
            .tournaments
            .create(name, format, max_bots, buy_in, prize_distribution)
        {
            Ok(tournament) => self
                .registry
                .send(conn, &ServerMessage::TournamentCreated { tournament }),
            Err(e) => self.reply_error(conn, &e),
        }
    }

    fn handle_join_tournament(&self, conn: ConnId, tournament_id: &str) {
        let bot = match self.authed_bot(conn) {
            Ok(bot) => bot,
            Err(e) => return self.reply_error(conn, &e),
        };
        match self.tournaments.join(tournament_id, &bot.bot_id) {
            Ok(tournament) => self.registry.send(
                conn,
                &ServerMessage::TournamentJoined {
                    tournament_id: tournament.tournament_id,
                },
            ),
            Err(e) => self.reply_error(conn, &e),
        }
    }

    fn handle_start_tournament(self: &Arc<Self>, conn: ConnId, tournament_id: &str) {
        if let Err(e) = self.authed_bot(conn) {
            return self.reply_error(conn, &e);
        }
        let mut rng = StdRng::from_entropy();
        let creator = MatchCreator(self.clone());
        match self.tournaments.start(tournament_id, &mut rng, &creator) {
            Ok(tournament) => self
                .registry
                .send(conn, &ServerMessage::TournamentStarted { tournament }),
            Err(e) => self.reply_error(conn, &e),
        }
    }

    /// Spawn a match runtime between two bots and notify both.
    pub fn start_match(self: &Arc<Self>, p1: &BotIdentity, p2: &BotIdentity, origin: &str) -> String {
        let match_id = uuid::Uuid::new_v4().to_string();

        // A bot entering a match leaves the queue, whichever path got it here.
        self.queue.leave(&p1.bot_id);
        self.queue.leave(&p2.bot_id);

        self.registry.assign_bot_to_match(&p1.bot_id, &match_id);
        self.registry.assign_bot_to_match(&p2.bot_id, &match_id);

        let runtime_config = RuntimeConfig {
            sim: SimConfig {
                tick_rate: self.config.tick_rate,
                ..Default::default()
            },
            decision_timeout_ms: self.config.decision_timeout_ms,
        };
        let handle = spawn_match(
            match_id.clone(),
            p1.bot_id.clone(),
            p2.bot_id.clone(),
            runtime_config,
            self.registry.clone(),
            Arc::new(ControllerSink(self.clone())),
        );
        self.active_matches
            .lock()
            .unwrap()
            .insert(match_id.clone(), handle);
        metrics::MATCHES_STARTED_TOTAL
            .with_label_values(&[origin])
            .inc();

        self.registry.send_to_bot(
            &p1.bot_id,
            &ServerMessage::MatchStarting {
                match_id: match_id.clone(),
                opponent: OpponentInfo {
                    bot_id: p2.bot_id.clone(),
                    bot_name: p2.name.clone(),
                    rating: p2.rating,
                },
            },
        );
        self.registry.send_to_bot(
            &p2.bot_id,
            &ServerMessage::MatchStarting {
                match_id: match_id.clone(),
                opponent: OpponentInfo {
                    bot_id: p1.bot_id.clone(),
                    bot_name: p1.name.clone(),
                    rating: p1.rating,
                },
            },
        );

        match_id
    }

    /// One matchmaking pairing pass: pair rating-adjacent queued bots and
    /// start their matches.
    pub fn run_pairing_pass(self: &Arc<Self>) {
        for (a, b) in self.queue.pairing_pass() {
            let (Some(bot_a), Some(bot_b)) = (
                self.bot_store.get_by_id(&a.bot_id),
                self.bot_store.get_by_id(&b.bot_id),
            ) else {
                tracing::warn!("Queued bot vanished from the store, dropping pair");
                continue;
            };
            // A bot that went offline while queued is skipped; its opponent
            // goes back to the front of the queue.
            if !self.registry.is_bot_online(&bot_a.bot_id) {
                let _ = self.queue.join(&bot_b.bot_id, b.rating);
                continue;
            }
            if !self.registry.is_bot_online(&bot_b.bot_id) {
                let _ = self.queue.join(&bot_a.bot_id, a.rating);
                continue;
            }
            self.start_match(&bot_a, &bot_b, "matchmaking");
        }
    }

    /// Terminate all live matches (used on shutdown).
    pub fn shutdown(&self) {
        let handles: Vec<Arc<MatchHandle>> = self
            .active_matches
            .lock()
            .unwrap()
            .values()
            .cloned()
            .collect();
        for handle in handles {
            handle.stop();
        }
    }
}

/// Spawn the periodic matchmaking pairing task.
pub fn spawn_matchmaking_worker(
    controller: Arc<Controller>,
    interval_ms: u64,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let period = tokio::time::Duration::from_millis(interval_ms);
        loop {
            tokio::time::sleep(period).await;
            controller.run_pairing_pass();
        }
    })
}

/// Spawn the periodic stale-session sweep.
pub fn spawn_housekeeping(
    registry: Arc<ConnectionRegistry>,
    stale_ms: u64,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let period = tokio::time::Duration::from_millis(stale_ms.max(1000) / 2);
        let age_limit = std::time::Duration::from_millis(stale_ms);
        loop {
            tokio::time::sleep(period).await;
            let evicted = registry.cleanup_stale(age_limit);
            if evicted > 0 {
                tracing::info!(evicted, "Closed stale connections");
            }
        }
    })
}

/// The create-match capability handed to the tournament manager.
struct MatchCreator(Arc<Controller>);

impl CreateMatch for MatchCreator {
    fn create_match(&self, tournament_id: &str, bot1: &str, bot2: &str) -> Option<String> {
        let controller = &self.0;
        let (Some(p1), Some(p2)) = (
            controller.bot_store.get_by_id(bot1),
            controller.bot_store.get_by_id(bot2),
        ) else {
            tracing::error!(tournament_id, bot1, bot2, "Bracket bot missing from store");
            return None;
        };
        // Offline bots still play; their fighter runs on default inputs.
        Some(controller.start_match(&p1, &p2, "tournament"))
    }
}

/// Adapter handed to match runtimes; forwards into the match-end pipeline.
struct ControllerSink(Arc<Controller>);

impl MatchEndSink for ControllerSink {
    fn on_match_end(&self, match_id: &str, replay: Replay) {
        self.0.finish_match(match_id, replay);
    }
}

impl Controller {
    /// Match-end pipeline: persist the record, update ratings on a decided
    /// match, and advance the bracket if the match belonged to one.
    pub fn finish_match(self: &Arc<Self>, match_id: &str, replay: Replay) {
        self.active_matches.lock().unwrap().remove(match_id);

        let p1 = self.bot_store.get_by_id(&replay.p1_id);
        let p2 = self.bot_store.get_by_id(&replay.p2_id);
        let p1_name = p1.as_ref().map(|b| b.name.clone()).unwrap_or_default();
        let p2_name = p2.as_ref().map(|b| b.name.clone()).unwrap_or_default();

        self.match_store.save_match(&replay, &p1_name, &p2_name);

        // Ratings move only on a decided match.
        if let (Some(winner_id), Some(p1), Some(p2)) = (&replay.winner_id, &p1, &p2) {
            let (winner, loser) = if winner_id == &p1.bot_id {
                (p1, p2)
            } else {
                (p2, p1)
            };
            let (new_winner, new_loser) = elo::rate_match(winner.rating, loser.rating);
            self.bot_store.update_rating(&winner.bot_id, new_winner);
            self.bot_store.update_rating(&loser.bot_id, new_loser);
            tracing::info!(
                match_id,
                winner = winner.name,
                winner_rating = new_winner,
                loser = loser.name,
                loser_rating = new_loser,
                "Ratings updated"
            );
        }

        // Bracket advancement, when the match belonged to one.
        match (&replay.winner_id, self.tournaments.tournament_for_match(match_id)) {
            (Some(winner_id), Some(_)) => {
                let creator = MatchCreator(self.clone());
                if let Some(done) = self
                    .tournaments
                    .report_match_result(match_id, winner_id, &creator)
                {
                    tracing::info!(
                        tournament_id = done.tournament_id,
                        prize_pool = done.prize_pool,
                        placements = ?done.placements,
                        "Tournament finished"
                    );
                }
            }
            (None, Some(_)) => {
                tracing::warn!(match_id, "Drawn bracket match cannot advance; slot stays open");
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::FinalScore;
    use crate::registry::SessionKind;
    use crate::replay::ReplayRecorder;
    use crate::store::{MemoryBotStore, MemoryMatchStore};
    use tokio::sync::mpsc;

    struct Harness {
        controller: Arc<Controller>,
        bot_store: Arc<MemoryBotStore>,
        match_store: Arc<MemoryMatchStore>,
    }

    fn harness() -> Harness {
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
        Harness {
            controller,
            bot_store,
            match_store,
        }
    }

    fn drain(rx: &mut mpsc::Receiver<String>) -> Vec<String> {
        let mut out = Vec::new();
        while let Ok(json) = rx.try_recv() {
            out.push(json);
        }
        out
    }

    fn connect_bot(
        h: &Harness,
        name: &str,
    ) -> (ConnId, mpsc::Receiver<String>, String) {
        let key = format!("arena_key_{name}");
        let issued = h.bot_store.create_with_key(name, "owner", &key).unwrap();
        let (conn, mut rx) = h
            .controller
            .registry()
            .add(SessionKind::Bot, &format!("peer-{name}"));
        let action = h.controller.handle_text(
            conn,
            &format!(r#"{{"type":"AUTH","apiKey":"{key}"}}"#),
        );
        assert_eq!(action, PostAction::Continue);
        let msgs = drain(&mut rx);
        assert!(msgs.iter().any(|m| m.contains("AUTH_SUCCESS")));
        (conn, rx, issued.bot_id)
    }

    #[tokio::test]
    async fn test_auth_failure_closes_with_4001() {
        let h = harness();
        let (conn, mut rx) = h.controller.registry().add(SessionKind::Bot, "peer");
        let action = h
            .controller
            .handle_text(conn, r#"{"type":"AUTH","apiKey":"arena_nope"}"#);
        assert_eq!(action, PostAction::Close(CLOSE_AUTH_FAILED));
        let msgs = drain(&mut rx);
        assert!(msgs.iter().any(|m| m.contains("AUTH_FAILED")));
    }

    #[tokio::test]
    async fn test_malformed_and_unknown_messages() {
        let h = harness();
        let (conn, mut rx) = h.controller.registry().add(SessionKind::Bot, "peer");

        h.controller.handle_text(conn, "{not json");
        h.controller.handle_text(conn, r#"{"type":"NO_SUCH_TYPE"}"#);
        h.controller.handle_text(conn, r#"{"type":"AUTH"}"#);

        let msgs = drain(&mut rx);
        assert!(msgs[0].contains("INVALID_MESSAGE"));
        assert!(msgs[1].contains("UNKNOWN_TYPE"));
        assert!(msgs[2].contains("INVALID_MESSAGE"));
    }

    #[tokio::test]
    async fn test_actions_require_auth() {
        let h = harness();
        let (conn, mut rx) = h.controller.registry().add(SessionKind::Bot, "peer");
        h.controller
            .handle_text(conn, r#"{"type":"JOIN_MATCHMAKING"}"#);
        h.controller.handle_text(
            conn,
            r#"{"type":"INPUT","input":{"jump":true},"frameNumber":1}"#,
        );
        let msgs = drain(&mut rx);
        assert_eq!(
            msgs.iter()
                .filter(|m| m.contains("NOT_AUTHENTICATED"))
                .count(),
            2
        );
    }

    #[tokio::test]
    async fn test_ping_pong() {
        let h = harness();
        let (conn, mut rx) = h.controller.registry().add(SessionKind::Spectator, "peer");
        h.controller.handle_text(conn, r#"{"type":"PING"}"#);
        let msgs = drain(&mut rx);
        assert!(msgs[0].contains("\"type\":\"PONG\""));
        assert!(msgs[0].contains("timestamp"));
    }

    #[tokio::test]
    async fn test_register_bot_issues_key() {
        let h = harness();
        let (conn, mut rx) = h.controller.registry().add(SessionKind::Bot, "peer");
        h.controller.handle_text(
            conn,
            r#"{"type":"REGISTER_BOT","botName":"Fresh","ownerId":"owner-9"}"#,
        );
        let msgs = drain(&mut rx);
        assert!(msgs[0].contains("BOT_REGISTERED"));
        assert!(msgs[0].contains("arena_"));
        assert!(msgs[0].contains("\"rating\":1000"));
        assert!(h.bot_store.get_by_name("Fresh").is_some());
    }

    #[tokio::test]
    async fn test_matchmaking_pairing_creates_match() {
        let h = harness();
        let (_c1, mut rx1, id1) = connect_bot(&h, "Alpha");
        let (_c2, mut rx2, id2) = connect_bot(&h, "Beta");

        h.controller
            .handle_text(_c1, r#"{"type":"JOIN_MATCHMAKING"}"#);
        h.controller
            .handle_text(_c2, r#"{"type":"JOIN_MATCHMAKING"}"#);
        assert_eq!(h.controller.queue.len(), 2);

        h.controller.run_pairing_pass();
        assert_eq!(h.controller.queue.len(), 0);
        assert_eq!(h.controller.active_match_count(), 1);

        let msgs1 = drain(&mut rx1);
        assert!(msgs1.iter().any(|m| m.contains("MATCHMAKING_JOINED")));
        assert!(msgs1
            .iter()
            .any(|m| m.contains("MATCH_STARTING") && m.contains("Beta")));
        let msgs2 = drain(&mut rx2);
        assert!(msgs2
            .iter()
            .any(|m| m.contains("MATCH_STARTING") && m.contains("Alpha")));

        assert!(h.controller.registry().bot_match(&id1).is_some());
        assert_eq!(
            h.controller.registry().bot_match(&id1),
            h.controller.registry().bot_match(&id2)
        );
        h.controller.shutdown();
    }

    #[tokio::test]
    async fn test_join_matchmaking_twice_rejected() {
        let h = harness();
        let (conn, mut rx, _) = connect_bot(&h, "Solo");
        h.controller.handle_text(conn, r#"{"type":"JOIN_MATCHMAKING"}"#);
        h.controller.handle_text(conn, r#"{"type":"JOIN_MATCHMAKING"}"#);
        let msgs = drain(&mut rx);
        assert!(msgs.iter().any(|m| m.contains("ALREADY_IN_QUEUE")));

        // Leaving twice is harmless.
        h.controller.handle_text(conn, r#"{"type":"LEAVE_MATCHMAKING"}"#);
        h.controller.handle_text(conn, r#"{"type":"LEAVE_MATCHMAKING"}"#);
        let msgs = drain(&mut rx);
        assert_eq!(
            msgs.iter().filter(|m| m.contains("MATCHMAKING_LEFT")).count(),
            2
        );
        assert_eq!(h.controller.queue.len(), 0);
    }

    #[tokio::test]
    async fn test_challenge_requires_online_target() {
        let h = harness();
        let (conn, mut rx, _) = connect_bot(&h, "Challenger");
        let offline = h.bot_store.create("Sleeper", "owner").unwrap();

        h.controller.handle_text(
            conn,
            &format!(r#"{{"type":"CHALLENGE","targetBotId":"{}"}}"#, offline.bot_id),
        );
        let msgs = drain(&mut rx);
        assert!(msgs.iter().any(|m| m.contains("BOT_OFFLINE")));

        h.controller
            .handle_text(conn, r#"{"type":"CHALLENGE","targetBotId":"ghost"}"#);
        let msgs = drain(&mut rx);
        assert!(msgs.iter().any(|m| m.contains("BOT_NOT_FOUND")));
    }

    #[tokio::test]
    async fn test_challenge_starts_match() {
        let h = harness();
        let (c1, mut rx1, _id1) = connect_bot(&h, "Challenger");
        let (_c2, _rx2, id2) = connect_bot(&h, "Target");

        h.controller.handle_text(
            c1,
            &format!(r#"{{"type":"CHALLENGE","targetBotId":"{id2}"}}"#),
        );
        assert_eq!(h.controller.active_match_count(), 1);
        let msgs = drain(&mut rx1);
        assert!(msgs.iter().any(|m| m.contains("MATCH_STARTING")));

        // A second challenge while playing is rejected.
        h.controller.handle_text(
            c1,
            &format!(r#"{{"type":"CHALLENGE","targetBotId":"{id2}"}}"#),
        );
        let msgs = drain(&mut rx1);
        assert!(msgs.iter().any(|m| m.contains("ALREADY_IN_MATCH")));
        h.controller.shutdown();
    }

    #[tokio::test]
    async fn test_spectate_unknown_match() {
        let h = harness();
        let (conn, mut rx) = h.controller.registry().add(SessionKind::Spectator, "peer");
        h.controller
            .handle_text(conn, r#"{"type":"SPECTATE","matchId":"nope"}"#);
        let msgs = drain(&mut rx);
        assert!(msgs[0].contains("MATCH_NOT_FOUND"));
    }

    #[tokio::test]
    async fn test_finish_match_updates_ratings() {
        let h = harness();
        let a = h.bot_store.create("RatedA", "o").unwrap();
        let b = h.bot_store.create("RatedB", "o").unwrap();
        h.bot_store.update_rating(&a.bot_id, 1200);
        h.bot_store.update_rating(&b.bot_id, 1200);

        let replay = ReplayRecorder::new("m-elo", &a.bot_id, &b.bot_id, 60).finalize(
            Some(a.bot_id.clone()),
            FinalScore {
                p1_rounds: 2,
                p2_rounds: 0,
            },
        );
        h.controller.finish_match("m-elo", replay);

        assert_eq!(h.bot_store.get_by_id(&a.bot_id).unwrap().rating, 1216);
        assert_eq!(h.bot_store.get_by_id(&b.bot_id).unwrap().rating, 1184);
        assert!(h.match_store.get_match("m-elo").is_some());
    }

    #[tokio::test]
    async fn test_finish_match_draw_leaves_ratings() {
        let h = harness();
        let a = h.bot_store.create("DrawA", "o").unwrap();
        let b = h.bot_store.create("DrawB", "o").unwrap();

        let replay = ReplayRecorder::new("m-draw", &a.bot_id, &b.bot_id, 60).finalize(
            None,
            FinalScore {
                p1_rounds: 1,
                p2_rounds: 1,
            },
        );
        h.controller.finish_match("m-draw", replay);

        assert_eq!(h.bot_store.get_by_id(&a.bot_id).unwrap().rating, 1000);
        assert_eq!(h.bot_store.get_by_id(&b.bot_id).unwrap().rating, 1000);
        let record = h.match_store.get_match("m-draw").unwrap();
        assert!(record.winner_id.is_none());
    }

    #[tokio::test]
    async fn test_leaderboard_and_history() {
        let h = harness();
        let (conn, mut rx, _) = connect_bot(&h, "Looker");
        h.controller.handle_text(conn, r#"{"type":"GET_LEADERBOARD"}"#);
        h.controller.handle_text(conn, r#"{"type":"GET_MATCHES"}"#);
        let msgs = drain(&mut rx);
        assert!(msgs.iter().any(|m| m.contains("LEADERBOARD") && m.contains("Looker")));
        assert!(msgs.iter().any(|m| m.contains("MATCH_HISTORY")));
    }

    #[tokio::test]
    async fn test_tournament_over_the_wire() {
        let h = harness();
        let mut conns = Vec::new();
        for i in 0..8 {
            conns.push(connect_bot(&h, &format!("T{i}")));
        }
        let (host_conn, host_rx, _) = &mut conns[0];
        let host_conn = *host_conn;

        h.controller.handle_text(
            host_conn,
            r#"{"type":"CREATE_TOURNAMENT","name":"Cup","format":"single_elimination","maxBots":8,"buyIn":5,"prizeDistribution":[60,40]}"#,
        );
        let msgs = drain(host_rx);
        let created = msgs
            .iter()
            .find(|m| m.contains("TOURNAMENT_CREATED"))
            .expect("created");
        let value: serde_json::Value = serde_json::from_str(created).unwrap();
        let tid = value["tournament"]["tournamentId"].as_str().unwrap().to_string();

        for (conn, rx, _) in conns.iter_mut() {
            h.controller.handle_text(
                *conn,
                &format!(r#"{{"type":"JOIN_TOURNAMENT","tournamentId":"{tid}"}}"#),
            );
            let msgs = drain(rx);
            assert!(msgs.iter().any(|m| m.contains("TOURNAMENT_JOINED")));
        }

        h.controller.handle_text(
            conns[0].0,
            &format!(r#"{{"type":"START_TOURNAMENT","tournamentId":"{tid}"}}"#),
        );
        let msgs = drain(&mut conns[0].1);
        assert!(msgs.iter().any(|m| m.contains("TOURNAMENT_STARTED")));

        // Four round-0 matches are live.
        assert_eq!(h.controller.active_match_count(), 4);

        h.controller.handle_text(
            conns[1].0,
            &format!(r#"{{"type":"GET_BRACKET","tournamentId":"{tid}"}}"#),
        );
        let msgs = drain(&mut conns[1].1);
        assert!(msgs.iter().any(|m| m.contains("\"type\":\"BRACKET\"")));

        h.controller.handle_text(conns[2].0, r#"{"type":"LIST_TOURNAMENTS"}"#);
        let msgs = drain(&mut conns[2].1);
        assert!(msgs.iter().any(|m| m.contains("TOURNAMENT_LIST")));

        h.controller.shutdown();
    }
}
