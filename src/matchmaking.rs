// Rating-sorted matchmaking queue with a periodic pairing pass.

use chrono::{DateTime, Utc};
use std::sync::Mutex;

use crate::error::ArenaError;
use crate::metrics;

/// One waiting bot, with its rating snapshotted at join time.
#[derive(Debug, Clone)]
pub struct QueueEntry {
    pub bot_id: String,
    pub rating: i32,
    pub enqueued_at: DateTime<Utc>,
}

/// FIFO queue of waiting bots; the pairing pass sorts by rating so adjacent
/// entries are the closest matchups.
pub struct MatchmakingQueue {
    entries: Mutex<Vec<QueueEntry>>,
}

impl MatchmakingQueue {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
        }
    }

    /// Add a bot to the queue. A bot can be queued at most once; callers
    /// reject bots that are currently in a match before getting here.
    pub fn join(&self, bot_id: &str, rating: i32) -> Result<(), ArenaError> {
        let mut entries = self.entries.lock().unwrap();
        if entries.iter().any(|e| e.bot_id == bot_id) {
            return Err(ArenaError::AlreadyInQueue);
        }
        entries.push(QueueEntry {
            bot_id: bot_id.to_string(),
            rating,
            enqueued_at: Utc::now(),
        });
        metrics::MATCHMAKING_QUEUE_DEPTH.set(entries.len() as i64);
        Ok(())
    }

    /// Remove a bot from the queue. Idempotent; returns whether it was queued.
    pub fn leave(&self, bot_id: &str) -> bool {
        let mut entries = self.entries.lock().unwrap();
        let before = entries.len();
        entries.retain(|e| e.bot_id != bot_id);
        metrics::MATCHMAKING_QUEUE_DEPTH.set(entries.len() as i64);
        entries.len() != before
    }

    pub fn contains(&self, bot_id: &str) -> bool {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .any(|e| e.bot_id == bot_id)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// One pairing pass: sort waiting bots by rating ascending and pop
    /// adjacent pairs off the front. An odd bot stays queued.
    pub fn pairing_pass(&self) -> Vec<(QueueEntry, QueueEntry)> {
        let mut entries = self.entries.lock().unwrap();
        if entries.len() < 2 {
            return Vec::new();
        }
        entries.sort_by_key(|e| e.rating);

        let mut pairs = Vec::new();
        while entries.len() >= 2 {
            let a = entries.remove(0);
            let b = entries.remove(0);
            pairs.push((a, b));
        }
        metrics::MATCHMAKING_QUEUE_DEPTH.set(entries.len() as i64);
        pairs
    }
}

impl Default for MatchmakingQueue {
    fn default() -> Self {
        Self::new()
    }
}
