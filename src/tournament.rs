// Single-elimination tournaments: registration, seeded bracket generation
// with byes, winner advancement, placements, and prize-pool bookkeeping.
//
// The bracket, the active-match index, and the placements map are mutated
// together under one lock per advancement, so a result is applied atomically.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::ArenaError;
use crate::metrics;

pub const VALID_BRACKET_SIZES: [usize; 2] = [8, 16];
const PRIZE_SUM_TOLERANCE: f64 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TournamentStatus {
    Registration,
    InProgress,
    Completed,
    Cancelled,
}

/// One pairing in a bracket round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BracketSlot {
    pub slot: usize,
    pub match_id: Option<String>,
    pub bot1: Option<String>,
    pub bot2: Option<String>,
    pub winner: Option<String>,
}

impl BracketSlot {
    fn empty(slot: usize) -> Self {
        BracketSlot {
            slot,
            match_id: None,
            bot1: None,
            bot2: None,
            winner: None,
        }
    }

    /// A slot is resolved once it has a winner, or can never produce one.
    fn resolved(&self) -> bool {
        self.winner.is_some() || (self.bot1.is_none() && self.bot2.is_none())
    }
}

struct Tournament {
    id: String,
    name: String,
    bracket_size: usize,
    buy_in: i64,
    prize_distribution: Vec<f64>,
    status: TournamentStatus,
    participants: Vec<String>,
    /// rounds[r] holds the slots of round r; round counts halve, minimum 1.
    bracket: Vec<Vec<BracketSlot>>,
    current_round: usize,
    /// match id -> (round, slot) for matches currently in flight.
    active_matches: HashMap<String, (usize, usize)>,
    placements: HashMap<String, usize>,
    created_at: DateTime<Utc>,
}

/// Serializable snapshot of a tournament for wire responses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TournamentView {
    pub tournament_id: String,
    pub name: String,
    pub format: String,
    pub max_bots: usize,
    pub buy_in: i64,
    pub prize_distribution: Vec<f64>,
    pub status: TournamentStatus,
    pub participants: Vec<String>,
    pub bracket: Vec<Vec<BracketSlot>>,
    pub current_round: usize,
    pub total_rounds: usize,
    pub placements: HashMap<String, usize>,
    pub prize_pool: i64,
    pub created_at: DateTime<Utc>,
}

/// Outcome handed back to the caller when a result completes a tournament.
#[derive(Debug, Clone)]
pub struct CompletedTournament {
    pub tournament_id: String,
    pub placements: HashMap<String, usize>,
    pub prize_pool: i64,
    pub prize_distribution: Vec<f64>,
}

/// Capability to start a match between two bots, injected by the controller.
pub trait CreateMatch: Send + Sync {
    /// Returns the new match id, or None if the match could not be started.
    fn create_match(&self, tournament_id: &str, bot1: &str, bot2: &str) -> Option<String>;
}

pub struct TournamentManager {
    tournaments: Mutex<HashMap<String, Tournament>>,
}

impl Tournament {
    fn total_rounds(&self) -> usize {
        (self.bracket_size as f64).log2() as usize
    }

    fn view(&self) -> TournamentView {
        TournamentView {
            tournament_id: self.id.clone(),
            name: self.name.clone(),
            format: "single_elimination".to_string(),
            max_bots: self.bracket_size,
            buy_in: self.buy_in,
            prize_distribution: self.prize_distribution.clone(),
            status: self.status,
            participants: self.participants.clone(),
            bracket: self.bracket.clone(),
            current_round: self.current_round,
            total_rounds: self.total_rounds(),
            placements: self.placements.clone(),
            prize_pool: self.buy_in * self.participants.len() as i64,
            created_at: self.created_at,
        }
    }

    /// Slots a bot eliminated in `round`, slot `slot_idx` still had ahead of
    /// it: every slot of the strictly-later rounds (counted structurally, so
    /// rounds not populated yet still count in full) plus the other slots of
    /// its own round that are still open. The decided slot itself is
    /// excluded by index, not by its resolution state.
    fn slots_remaining_after(&self, round: usize, slot_idx: usize) -> usize {
        let later: usize = self.bracket[round + 1..].iter().map(|r| r.len()).sum();
        let open_in_round = self.bracket[round]
            .iter()
            .enumerate()
            .filter(|(i, slot)| *i != slot_idx && !slot.resolved())
            .count();
        later + open_in_round
    }

    fn round_complete(&self, round: usize) -> bool {
        self.bracket[round].iter().all(|s| s.resolved())
    }
}

impl TournamentManager {
    pub fn new() -> Self {
        Self {
            tournaments: Mutex::new(HashMap::new()),
        }
    }

    /// Create a tournament in registration. Validates the bracket size and
    /// that the prize distribution sums to 100.
    pub fn create(
        &self,
        name: &str,
        format: &str,
        bracket_size: usize,
        buy_in: i64,
        prize_distribution: Vec<f64>,
    ) -> Result<TournamentView, ArenaError> {
        if format != "single_elimination" {
            return Err(ArenaError::InvalidTournament(format!(
                "unsupported format '{format}'"
            )));
        }
        if !VALID_BRACKET_SIZES.contains(&bracket_size) {
            return Err(ArenaError::InvalidTournament(format!(
                "bracket size must be one of {VALID_BRACKET_SIZES:?}"
            )));
        }
        let sum: f64 = prize_distribution.iter().sum();
        if (sum - 100.0).abs() > PRIZE_SUM_TOLERANCE {
            return Err(ArenaError::InvalidTournament(format!(
                "prize distribution sums to {sum}, expected 100"
            )));
        }

        let tournament = Tournament {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            bracket_size,
            buy_in,
            prize_distribution,
            status: TournamentStatus::Registration,
            participants: Vec::new(),
            bracket: Vec::new(),
            current_round: 0,
            active_matches: HashMap::new(),
            placements: HashMap::new(),
            created_at: Utc::now(),
        };
        let view = tournament.view();
        self.tournaments
            .lock()
            .unwrap()
            .insert(tournament.id.clone(), tournament);
        Ok(view)
    }

    /// Join a tournament still in registration.
    pub fn join(&self, tournament_id: &str, bot_id: &str) -> Result<TournamentView, ArenaError> {
        let mut tournaments = self.tournaments.lock().unwrap();
        let tournament = tournaments
            .get_mut(tournament_id)
            .ok_or(ArenaError::TournamentNotFound)?;
        if tournament.status != TournamentStatus::Registration {
            return Err(ArenaError::InvalidTournament(
                "registration is closed".to_string(),
            ));
        }
        if tournament.participants.iter().any(|p| p == bot_id) {
            return Err(ArenaError::AlreadyRegistered);
        }
        if tournament.participants.len() >= tournament.bracket_size {
            return Err(ArenaError::TournamentFull);
        }
        tournament.participants.push(bot_id.to_string());
        Ok(tournament.view())
    }

    /// Start a tournament: shuffle the seeding, pad with byes, build the
    /// bracket, and kick off the first round's matches.
    pub fn start<R: Rng>(
        &self,
        tournament_id: &str,
        rng: &mut R,
        create: &dyn CreateMatch,
    ) -> Result<TournamentView, ArenaError> {
        let mut tournaments = self.tournaments.lock().unwrap();
        let tournament = tournaments
            .get_mut(tournament_id)
            .ok_or(ArenaError::TournamentNotFound)?;
        if tournament.status != TournamentStatus::Registration {
            return Err(ArenaError::InvalidTournament(
                "tournament already started".to_string(),
            ));
        }
        if tournament.participants.len() < 2 {
            return Err(ArenaError::InvalidTournament(
                "need at least 2 participants".to_string(),
            ));
        }

        tournament.status = TournamentStatus::InProgress;
        metrics::ACTIVE_TOURNAMENTS.inc();

        let mut seeded: Vec<Option<String>> = tournament
            .participants
            .iter()
            .cloned()
            .map(Some)
            .collect();
        seeded.shuffle(rng);
        seeded.resize(tournament.bracket_size, None);

        // Round 0 pairs adjacent seeds; later rounds start empty and halve.
        let mut bracket = Vec::new();
        let mut slots_in_round = tournament.bracket_size / 2;
        let round0: Vec<BracketSlot> = (0..slots_in_round)
            .map(|i| BracketSlot {
                slot: i,
                match_id: None,
                bot1: seeded[i * 2].clone(),
                bot2: seeded[i * 2 + 1].clone(),
                winner: None,
            })
            .collect();
        bracket.push(round0);
        while slots_in_round > 1 {
            slots_in_round /= 2;
            bracket.push((0..slots_in_round).map(BracketSlot::empty).collect());
        }
        tournament.bracket = bracket;
        tournament.current_round = 0;

        Self::auto_advance_byes(tournament, 0);
        // A fully-byed first round cascades straight into the next.
        while tournament.round_complete(tournament.current_round)
            && tournament.current_round + 1 < tournament.bracket.len()
        {
            let next = tournament.current_round + 1;
            Self::populate_round(tournament, next);
            tournament.current_round = next;
        }

        Self::start_round_matches(tournament, create);
        Ok(tournament.view())
    }

    /// Auto-advance slots with exactly one participant.
    fn auto_advance_byes(tournament: &mut Tournament, round: usize) {
        for slot in &mut tournament.bracket[round] {
            if slot.winner.is_some() {
                continue;
            }
            match (&slot.bot1, &slot.bot2) {
                (Some(bot), None) | (None, Some(bot)) => {
                    slot.winner = Some(bot.clone());
                }
                _ => {}
            }
        }
    }

    /// Pair winners of `round - 1` into `round`, then resolve its byes.
    fn populate_round(tournament: &mut Tournament, round: usize) {
        for i in 0..tournament.bracket[round].len() {
            let bot1 = tournament.bracket[round - 1][i * 2].winner.clone();
            let bot2 = tournament.bracket[round - 1][i * 2 + 1].winner.clone();
            let slot = &mut tournament.bracket[round][i];
            slot.bot1 = bot1;
            slot.bot2 = bot2;
        }
        Self::auto_advance_byes(tournament, round);
    }

    /// Create matches for every playable, not-yet-started slot of the
    /// current round.
    fn start_round_matches(tournament: &mut Tournament, create: &dyn CreateMatch) {
        let round = tournament.current_round;
        for i in 0..tournament.bracket[round].len() {
            let (bot1, bot2) = {
                let slot = &tournament.bracket[round][i];
                if slot.winner.is_some() || slot.match_id.is_some() {
                    continue;
                }
                match (&slot.bot1, &slot.bot2) {
                    (Some(a), Some(b)) => (a.clone(), b.clone()),
                    _ => continue,
                }
            };
            match create.create_match(&tournament.id, &bot1, &bot2) {
                Some(match_id) => {
                    tournament.bracket[round][i].match_id = Some(match_id.clone());
                    tournament.active_matches.insert(match_id, (round, i));
                }
                None => {
                    tracing::warn!(
                        tournament_id = tournament.id,
                        round,
                        slot = i,
                        "Failed to start bracket match"
                    );
                }
            }
        }
    }

    /// Whether a match belongs to a running tournament.
    pub fn tournament_for_match(&self, match_id: &str) -> Option<String> {
        let tournaments = self.tournaments.lock().unwrap();
        tournaments
            .values()
            .find(|t| t.active_matches.contains_key(match_id))
            .map(|t| t.id.clone())
    }

    /// Apply a match result. Returns the completion record when this result
    /// decided the tournament. A result for an unknown or already-resolved
    /// slot is a no-op.
    pub fn report_match_result(
        &self,
        match_id: &str,
        winner_id: &str,
        create: &dyn CreateMatch,
    ) -> Option<CompletedTournament> {
        let mut tournaments = self.tournaments.lock().unwrap();
        let tournament = tournaments
            .values_mut()
            .find(|t| t.active_matches.contains_key(match_id))?;
        let (round, slot_idx) = tournament.active_matches.remove(match_id)?;

        {
            let slot = &mut tournament.bracket[round][slot_idx];
            if slot.winner.is_some() {
                return None;
            }
            slot.winner = Some(winner_id.to_string());
        }

        // Eliminated bot's placement. The runner-up is always second; other
        // placements count the slots still ahead of the loser when it fell.
        let loser = {
            let slot = &tournament.bracket[round][slot_idx];
            [&slot.bot1, &slot.bot2]
                .into_iter()
                .flatten()
                .find(|b| *b != winner_id)
                .cloned()
        };
        let final_round = round + 1 == tournament.bracket.len();
        if let Some(loser) = loser {
            let placement = if final_round {
                2
            } else {
                tournament.slots_remaining_after(round, slot_idx) + 1
            };
            tournament.placements.insert(loser, placement);
        }

        if !tournament.round_complete(round) {
            return None;
        }

        if final_round {
            tournament.placements.insert(winner_id.to_string(), 1);
            tournament.status = TournamentStatus::Completed;
            metrics::ACTIVE_TOURNAMENTS.dec();
            tracing::info!(tournament_id = tournament.id, winner = winner_id, "Tournament completed");
            return Some(CompletedTournament {
                tournament_id: tournament.id.clone(),
                placements: tournament.placements.clone(),
                prize_pool: tournament.buy_in * tournament.participants.len() as i64,
                prize_distribution: tournament.prize_distribution.clone(),
            });
        }

        // Move to the next round, cascading through any byed-out rounds.
        let mut next = round + 1;
        Self::populate_round(tournament, next);
        tournament.current_round = next;
        while tournament.round_complete(next) && next + 1 < tournament.bracket.len() {
            next += 1;
            Self::populate_round(tournament, next);
            tournament.current_round = next;
        }
        Self::start_round_matches(tournament, create);
        None
    }

    /// Cancel a tournament unless it is already terminal. Matches already in
    /// flight are not stopped; their results will no longer find a slot.
    pub fn cancel(&self, tournament_id: &str) -> Result<TournamentView, ArenaError> {
        let mut tournaments = self.tournaments.lock().unwrap();
        let tournament = tournaments
            .get_mut(tournament_id)
            .ok_or(ArenaError::TournamentNotFound)?;
        match tournament.status {
            TournamentStatus::Completed | TournamentStatus::Cancelled => {
                return Err(ArenaError::InvalidTournament(
                    "tournament already finished".to_string(),
                ));
            }
            TournamentStatus::InProgress => metrics::ACTIVE_TOURNAMENTS.dec(),
            TournamentStatus::Registration => {}
        }
        tournament.status = TournamentStatus::Cancelled;
        tournament.active_matches.clear();
        Ok(tournament.view())
    }

    pub fn get(&self, tournament_id: &str) -> Option<TournamentView> {
        self.tournaments
            .lock()
            .unwrap()
            .get(tournament_id)
            .map(|t| t.view())
    }

    pub fn list(&self) -> Vec<TournamentView> {
        let tournaments = self.tournaments.lock().unwrap();
        let mut views: Vec<TournamentView> = tournaments.values().map(|t| t.view()).collect();
        views.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        views
    }
}

impl Default for TournamentManager {
    fn default() -> Self {
        Self::new()
    }
}
