// Connection registry: every live bot and spectator session, indexed by
// connection id, with a secondary bot-identity index (one session per bot)
// and per-match spectator sets.
//
// Outbound delivery goes through a bounded per-session queue; a send to a
// closed or full queue is a silent no-op so a dead or slow peer can never
// stall a match.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;

use crate::metrics;
use crate::protocol::ServerMessage;

pub type ConnId = u64;

/// Capacity of each session's outbound queue. Overflow drops the message.
pub const OUTBOUND_QUEUE_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionKind {
    Bot,
    Spectator,
}

struct Session {
    kind: SessionKind,
    /// Bound bot identity, set after a successful AUTH.
    bot_id: Option<String>,
    /// The match a bot session is currently playing in.
    match_id: Option<String>,
    /// The match a spectator session is currently watching.
    watching: Option<String>,
    peer: String,
    last_activity: Instant,
    sender: mpsc::Sender<String>,
}

#[derive(Default)]
struct RegistryInner {
    sessions: HashMap<ConnId, Session>,
    /// bot identity -> connection id; enforces one session per bot.
    bots: HashMap<String, ConnId>,
    /// match id -> spectator connection ids.
    spectators: HashMap<String, HashSet<ConnId>>,
}

pub struct ConnectionRegistry {
    inner: Mutex<RegistryInner>,
    next_id: AtomicU64,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(RegistryInner::default()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Insert a new session and return its id plus the receiving half of its
    /// outbound queue, which the socket write task drains.
    pub fn add(&self, kind: SessionKind, peer: &str) -> (ConnId, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(OUTBOUND_QUEUE_CAPACITY);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut inner = self.inner.lock().unwrap();
        inner.sessions.insert(
            id,
            Session {
                kind,
                bot_id: None,
                match_id: None,
                watching: None,
                peer: peer.to_string(),
                last_activity: Instant::now(),
                sender: tx,
            },
        );
        metrics::CONNECTED_WEBSOCKETS.set(inner.sessions.len() as i64);
        (id, rx)
    }

    /// Bind a bot identity to a session after authentication. Any prior
    /// session bound to the same bot is evicted (its transport closes when
    /// its queue sender is dropped).
    pub fn set_session(&self, id: ConnId, bot_id: &str) {
        let mut guard = self.inner.lock().unwrap();
        let inner = &mut *guard;
        let evicted = match inner.bots.get(bot_id) {
            Some(&old) if old != id => Some(old),
            _ => None,
        };
        if let Some(old) = evicted {
            Self::remove_locked(inner, old);
            tracing::info!(bot_id, old_conn = old, new_conn = id, "Evicted prior bot session");
        }
        if let Some(session) = inner.sessions.get_mut(&id) {
            // Re-AUTH as a different bot drops the old binding for this
            // connection from the index.
            if let Some(prev) = session.bot_id.replace(bot_id.to_string()) {
                if prev != bot_id && inner.bots.get(&prev) == Some(&id) {
                    inner.bots.remove(&prev);
                }
            }
            inner.bots.insert(bot_id.to_string(), id);
        }
        metrics::CONNECTED_WEBSOCKETS.set(inner.sessions.len() as i64);
    }

    pub fn assign_bot_to_match(&self, bot_id: &str, match_id: &str) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(&conn) = inner.bots.get(bot_id) {
            if let Some(session) = inner.sessions.get_mut(&conn) {
                session.match_id = Some(match_id.to_string());
            }
        }
    }

    pub fn clear_bot_match(&self, bot_id: &str) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(&conn) = inner.bots.get(bot_id) {
            if let Some(session) = inner.sessions.get_mut(&conn) {
                session.match_id = None;
            }
        }
    }

    /// The match a bot is currently playing in, if any.
    pub fn bot_match(&self, bot_id: &str) -> Option<String> {
        let inner = self.inner.lock().unwrap();
        let conn = inner.bots.get(bot_id)?;
        inner.sessions.get(conn)?.match_id.clone()
    }

    pub fn is_bot_online(&self, bot_id: &str) -> bool {
        self.inner.lock().unwrap().bots.contains_key(bot_id)
    }

    /// The bot identity bound to a connection, if authenticated.
    pub fn bot_for_conn(&self, id: ConnId) -> Option<String> {
        self.inner
            .lock()
            .unwrap()
            .sessions
            .get(&id)
            .and_then(|s| s.bot_id.clone())
    }

    pub fn add_spectator(&self, id: ConnId, match_id: &str) {
        let mut inner = self.inner.lock().unwrap();
        let previous = match inner.sessions.get_mut(&id) {
            Some(session) => session.watching.replace(match_id.to_string()),
            None => return,
        };
        if let Some(prev) = previous {
            if let Some(set) = inner.spectators.get_mut(&prev) {
                set.remove(&id);
            }
        }
        inner
            .spectators
            .entry(match_id.to_string())
            .or_default()
            .insert(id);
    }

    pub fn remove_spectator(&self, id: ConnId) {
        let mut inner = self.inner.lock().unwrap();
        let watching = match inner.sessions.get_mut(&id) {
            Some(session) => session.watching.take(),
            None => None,
        };
        if let Some(match_id) = watching {
            if let Some(set) = inner.spectators.get_mut(&match_id) {
                set.remove(&id);
            }
        }
    }

    pub fn spectator_count(&self, match_id: &str) -> usize {
        self.inner
            .lock()
            .unwrap()
            .spectators
            .get(match_id)
            .map(|s| s.len())
            .unwrap_or(0)
    }

    /// Serialize and push a message to one session. Drops silently if the
    /// session is gone or its queue is full.
    pub fn send(&self, id: ConnId, message: &ServerMessage) {
        let json = match serde_json::to_string(message) {
            Ok(json) => json,
            Err(e) => {
                tracing::error!("Failed to serialize outbound message: {e}");
                return;
            }
        };
        let inner = self.inner.lock().unwrap();
        if let Some(session) = inner.sessions.get(&id) {
            if session.sender.try_send(json).is_ok() {
                metrics::WEBSOCKET_MESSAGES_SENT_TOTAL.inc();
            }
        }
    }

    /// Resolve a bot identity through the secondary index and send.
    pub fn send_to_bot(&self, bot_id: &str, message: &ServerMessage) {
        let id = {
            let inner = self.inner.lock().unwrap();
            inner.bots.get(bot_id).copied()
        };
        if let Some(id) = id {
            self.send(id, message);
        }
    }

    /// Serialize once and fan out to every spectator of a match.
    pub fn broadcast_to_spectators(&self, match_id: &str, message: &ServerMessage) {
        let json = match serde_json::to_string(message) {
            Ok(json) => json,
            Err(e) => {
                tracing::error!("Failed to serialize spectator broadcast: {e}");
                return;
            }
        };
        let inner = self.inner.lock().unwrap();
        let Some(ids) = inner.spectators.get(match_id) else {
            return;
        };
        for id in ids {
            if let Some(session) = inner.sessions.get(id) {
                if session.sender.try_send(json.clone()).is_ok() {
                    metrics::WEBSOCKET_MESSAGES_SENT_TOTAL.inc();
                }
            }
        }
    }

    /// Update a session's last-activity timestamp.
    pub fn touch(&self, id: ConnId) {
        if let Some(session) = self.inner.lock().unwrap().sessions.get_mut(&id) {
            session.last_activity = Instant::now();
        }
    }

    pub fn peer(&self, id: ConnId) -> Option<String> {
        self.inner
            .lock()
            .unwrap()
            .sessions
            .get(&id)
            .map(|s| s.peer.clone())
    }

    pub fn session_kind(&self, id: ConnId) -> Option<SessionKind> {
        self.inner.lock().unwrap().sessions.get(&id).map(|s| s.kind)
    }

    /// Remove a session and all its index entries. Idempotent.
    pub fn remove(&self, id: ConnId) {
        let mut inner = self.inner.lock().unwrap();
        Self::remove_locked(&mut inner, id);
        metrics::CONNECTED_WEBSOCKETS.set(inner.sessions.len() as i64);
    }

    fn remove_locked(inner: &mut RegistryInner, id: ConnId) {
        let Some(session) = inner.sessions.remove(&id) else {
            return;
        };
        if let Some(bot_id) = &session.bot_id {
            if inner.bots.get(bot_id) == Some(&id) {
                inner.bots.remove(bot_id);
            }
        }
        if let Some(match_id) = &session.watching {
            if let Some(set) = inner.spectators.get_mut(match_id) {
                set.remove(&id);
                if set.is_empty() {
                    inner.spectators.remove(match_id);
                }
            }
        }
        // Dropping the session (and its queue sender) closes the write task.
    }

    /// Close and remove every session idle longer than `age_limit`.
    /// Returns the number of sessions evicted.
    pub fn cleanup_stale(&self, age_limit: Duration) -> usize {
        let mut inner = self.inner.lock().unwrap();
        let now = Instant::now();
        let stale: Vec<ConnId> = inner
            .sessions
            .iter()
            .filter(|(_, s)| now.duration_since(s.last_activity) > age_limit)
            .map(|(&id, _)| id)
            .collect();
        for id in &stale {
            Self::remove_locked(&mut inner, *id);
        }
        if !stale.is_empty() {
            metrics::CONNECTED_WEBSOCKETS.set(inner.sessions.len() as i64);
        }
        stale.len()
    }

    pub fn session_count(&self) -> usize {
        self.inner.lock().unwrap().sessions.len()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
