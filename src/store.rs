// External collaborator interfaces: the bot identity store and the match
// history store, plus the in-memory implementations the server runs with.
//
// API keys are prefixed with "arena_" and stored only as SHA-256 hashes.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::elo::STARTING_RATING;
use crate::error::ArenaError;
use crate::protocol::FinalScore;
use crate::replay::Replay;

/// A registered bot's identity and rating.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BotIdentity {
    pub bot_id: String,
    pub name: String,
    pub rating: i32,
    pub owner_id: String,
    pub created_at: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

/// Returned once at registration; the raw API key is never stored.
#[derive(Debug, Clone)]
pub struct IssuedBot {
    pub bot_id: String,
    pub api_key: String,
    pub bot_name: String,
    pub rating: i32,
}

/// Persisted summary of a finished match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchRecord {
    pub match_id: String,
    pub p1_id: String,
    pub p2_id: String,
    pub p1_name: String,
    pub p2_name: String,
    pub winner_id: Option<String>,
    pub final_score: FinalScore,
    pub frame_count: usize,
    pub duration_ms: i64,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
}

/// Bot identity store interface.
pub trait BotStore: Send + Sync {
    fn get_by_credential(&self, api_key: &str) -> Option<BotIdentity>;
    fn get_by_id(&self, bot_id: &str) -> Option<BotIdentity>;
    fn get_by_name(&self, name: &str) -> Option<BotIdentity>;
    fn update_last_seen(&self, bot_id: &str);
    fn update_rating(&self, bot_id: &str, new_rating: i32);
    fn create(&self, bot_name: &str, owner_id: &str) -> Result<IssuedBot, ArenaError>;
    /// All bots, ordered by rating descending.
    fn list(&self) -> Vec<BotIdentity>;
}

/// Match history store interface. The core only depends on `save_match`
/// returning; durability is the store's problem.
pub trait MatchStore: Send + Sync {
    fn save_match(&self, replay: &Replay, p1_name: &str, p2_name: &str);
    fn get_match(&self, match_id: &str) -> Option<MatchRecord>;
    fn get_recent_matches(&self, limit: usize) -> Vec<MatchRecord>;
    fn get_bot_matches(&self, bot_id: &str, limit: usize) -> Vec<MatchRecord>;
}

/// Hash a raw API key with SHA-256 for at-rest storage and lookup.
fn hash_api_key(key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    hex::encode(hasher.finalize())
}

#[derive(Default)]
struct BotStoreInner {
    bots: HashMap<String, BotIdentity>,
    by_key_hash: HashMap<String, String>,
    by_name: HashMap<String, String>,
}

/// In-memory bot registry.
#[derive(Default)]
pub struct MemoryBotStore {
    inner: Mutex<BotStoreInner>,
}

impl MemoryBotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a bot with a caller-chosen API key. Used by tests and seeding.
    pub fn create_with_key(
        &self,
        bot_name: &str,
        owner_id: &str,
        api_key: &str,
    ) -> Result<IssuedBot, ArenaError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.by_name.contains_key(bot_name) {
            return Err(ArenaError::NameTaken);
        }
        let bot_id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now();
        inner.bots.insert(
            bot_id.clone(),
            BotIdentity {
                bot_id: bot_id.clone(),
                name: bot_name.to_string(),
                rating: STARTING_RATING,
                owner_id: owner_id.to_string(),
                created_at: now,
                last_seen: now,
            },
        );
        inner
            .by_key_hash
            .insert(hash_api_key(api_key), bot_id.clone());
        inner.by_name.insert(bot_name.to_string(), bot_id.clone());
        Ok(IssuedBot {
            bot_id,
            api_key: api_key.to_string(),
            bot_name: bot_name.to_string(),
            rating: STARTING_RATING,
        })
    }
}

impl BotStore for MemoryBotStore {
    fn get_by_credential(&self, api_key: &str) -> Option<BotIdentity> {
        let inner = self.inner.lock().unwrap();
        let bot_id = inner.by_key_hash.get(&hash_api_key(api_key))?;
        inner.bots.get(bot_id).cloned()
    }

    fn get_by_id(&self, bot_id: &str) -> Option<BotIdentity> {
        self.inner.lock().unwrap().bots.get(bot_id).cloned()
    }

    fn get_by_name(&self, name: &str) -> Option<BotIdentity> {
        let inner = self.inner.lock().unwrap();
        let bot_id = inner.by_name.get(name)?;
        inner.bots.get(bot_id).cloned()
    }

    fn update_last_seen(&self, bot_id: &str) {
        if let Some(bot) = self.inner.lock().unwrap().bots.get_mut(bot_id) {
            bot.last_seen = Utc::now();
        }
    }

    fn update_rating(&self, bot_id: &str, new_rating: i32) {
        if let Some(bot) = self.inner.lock().unwrap().bots.get_mut(bot_id) {
            bot.rating = new_rating;
        }
    }

    fn create(&self, bot_name: &str, owner_id: &str) -> Result<IssuedBot, ArenaError> {
        let api_key = format!("arena_{}", uuid::Uuid::new_v4().simple());
        self.create_with_key(bot_name, owner_id, &api_key)
    }

    fn list(&self) -> Vec<BotIdentity> {
        let inner = self.inner.lock().unwrap();
        let mut bots: Vec<BotIdentity> = inner.bots.values().cloned().collect();
        bots.sort_by(|a, b| b.rating.cmp(&a.rating).then(a.name.cmp(&b.name)));
        bots
    }
}

/// In-memory match history, newest first.
#[derive(Default)]
pub struct MemoryMatchStore {
    matches: Mutex<Vec<MatchRecord>>,
}

impl MemoryMatchStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MatchStore for MemoryMatchStore {
    fn save_match(&self, replay: &Replay, p1_name: &str, p2_name: &str) {
        let record = MatchRecord {
            match_id: replay.match_id.clone(),
            p1_id: replay.p1_id.clone(),
            p2_id: replay.p2_id.clone(),
            p1_name: p1_name.to_string(),
            p2_name: p2_name.to_string(),
            winner_id: replay.winner_id.clone(),
            final_score: replay.final_score,
            frame_count: replay.frame_count,
            duration_ms: replay.duration_ms,
            started_at: replay.started_at,
            ended_at: replay.ended_at,
        };
        self.matches.lock().unwrap().push(record);
    }

    fn get_match(&self, match_id: &str) -> Option<MatchRecord> {
        self.matches
            .lock()
            .unwrap()
            .iter()
            .find(|m| m.match_id == match_id)
            .cloned()
    }

    fn get_recent_matches(&self, limit: usize) -> Vec<MatchRecord> {
        self.matches
            .lock()
            .unwrap()
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect()
    }

    fn get_bot_matches(&self, bot_id: &str, limit: usize) -> Vec<MatchRecord> {
        self.matches
            .lock()
            .unwrap()
            .iter()
            .rev()
            .filter(|m| m.p1_id == bot_id || m.p2_id == bot_id)
            .take(limit)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::replay::ReplayRecorder;

    fn replay_for(match_id: &str, p1: &str, p2: &str, winner: Option<&str>) -> Replay {
        ReplayRecorder::new(match_id, p1, p2, 60).finalize(
            winner.map(|s| s.to_string()),
            FinalScore {
                p1_rounds: 2,
                p2_rounds: 1,
            },
        )
    }

    #[test]
    fn test_create_and_authenticate() {
        let store = MemoryBotStore::new();
        let issued = store.create("CrusherBot", "owner-1").unwrap();
        assert!(issued.api_key.starts_with("arena_"));
        assert_eq!(issued.rating, STARTING_RATING);

        let found = store.get_by_credential(&issued.api_key).unwrap();
        assert_eq!(found.bot_id, issued.bot_id);
        assert_eq!(found.name, "CrusherBot");

        assert!(store.get_by_credential("arena_wrong").is_none());
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let store = MemoryBotStore::new();
        store.create("SameName", "owner-1").unwrap();
        let err = store.create("SameName", "owner-2");
        assert!(matches!(err, Err(ArenaError::NameTaken)));
    }

    #[test]
    fn test_update_rating() {
        let store = MemoryBotStore::new();
        let issued = store.create("Rated", "owner-1").unwrap();
        store.update_rating(&issued.bot_id, 1216);
        assert_eq!(store.get_by_id(&issued.bot_id).unwrap().rating, 1216);
    }

    #[test]
    fn test_list_ordered_by_rating_desc() {
        let store = MemoryBotStore::new();
        let low = store.create("Low", "o").unwrap();
        let high = store.create("High", "o").unwrap();
        let mid = store.create("Mid", "o").unwrap();
        store.update_rating(&low.bot_id, 900);
        store.update_rating(&high.bot_id, 1400);
        store.update_rating(&mid.bot_id, 1100);

        let names: Vec<String> = store.list().into_iter().map(|b| b.name).collect();
        assert_eq!(names, vec!["High", "Mid", "Low"]);
    }

    #[test]
    fn test_get_by_name() {
        let store = MemoryBotStore::new();
        let issued = store.create("Lookup", "o").unwrap();
        assert_eq!(store.get_by_name("Lookup").unwrap().bot_id, issued.bot_id);
        assert!(store.get_by_name("Nope").is_none());
    }

    #[test]
    fn test_match_store_save_and_query() {
        let store = MemoryMatchStore::new();
        store.save_match(&replay_for("m-1", "a", "b", Some("a")), "Alpha", "Beta");
        store.save_match(&replay_for("m-2", "a", "c", None), "Alpha", "Gamma");
        store.save_match(&replay_for("m-3", "b", "c", Some("c")), "Beta", "Gamma");

        let rec = store.get_match("m-2").unwrap();
        assert_eq!(rec.p2_name, "Gamma");
        assert!(rec.winner_id.is_none());

        let recent = store.get_recent_matches(2);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].match_id, "m-3");

        let for_a = store.get_bot_matches("a", 10);
        assert_eq!(for_a.len(), 2);
        let for_c = store.get_bot_matches("c", 1);
        assert_eq!(for_c.len(), 1);
        assert_eq!(for_c[0].match_id, "m-3");
    }
}
