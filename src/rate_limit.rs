// In-memory per-peer rate limiter for connection, auth, and message traffic.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::config::RateLimits;

/// Different rate limit types with their windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RateLimitType {
    /// Connection attempts per peer address.
    Connection,
    /// AUTH attempts per peer address.
    Auth,
    /// Inbound messages per peer address.
    Message,
}

impl RateLimitType {
    /// Time window for the rate limit.
    pub fn window(&self) -> Duration {
        match self {
            RateLimitType::Connection => Duration::from_secs(60),
            RateLimitType::Auth => Duration::from_secs(60),
            RateLimitType::Message => Duration::from_secs(1),
        }
    }
}

impl std::fmt::Display for RateLimitType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RateLimitType::Connection => write!(f, "connections per minute"),
            RateLimitType::Auth => write!(f, "auth attempts per minute"),
            RateLimitType::Message => write!(f, "messages per second"),
        }
    }
}

/// Error returned when a rate limit is exceeded.
#[derive(Debug, Clone)]
pub struct RateLimitError {
    pub limit_type: RateLimitType,
    pub max: usize,
}

impl std::fmt::Display for RateLimitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "max {} {}", self.max, self.limit_type)
    }
}

/// Key for the rate limit map: (peer address, limit type).
type LimitKey = (String, RateLimitType);

/// Thread-safe in-memory rate limiter keyed by peer address.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    limits: RateLimits,
    inner: Arc<Mutex<HashMap<LimitKey, Vec<Instant>>>>,
}

impl RateLimiter {
    pub fn new(limits: RateLimits) -> Self {
        Self {
            limits,
            inner: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn max_count(&self, limit_type: RateLimitType) -> usize {
        match limit_type {
            RateLimitType::Connection => self.limits.connection,
            RateLimitType::Auth => self.limits.auth,
            RateLimitType::Message => self.limits.message,
        }
    }

    /// Check if the peer is within the rate limit for the given type.
    /// If within limits, records the event and returns Ok(()).
    pub fn check_limit(
        &self,
        peer: &str,
        limit_type: RateLimitType,
    ) -> Result<(), RateLimitError> {
        let mut map = self.inner.lock().unwrap();
        let key = (peer.to_string(), limit_type);
        let window = limit_type.window();
        let max = self.max_count(limit_type);
        let now = Instant::now();

        let entries = map.entry(key).or_insert_with(Vec::new);

        // Remove expired entries
        entries.retain(|t| now.duration_since(*t) < window);

        if entries.len() >= max {
            return Err(RateLimitError { limit_type, max });
        }

        entries.push(now);
        Ok(())
    }

    /// Drop all records for a peer (e.g. after its last connection closes).
    pub fn forget(&self, peer: &str) {
        let mut map = self.inner.lock().unwrap();
        map.retain(|(p, _), _| p != peer);
    }

    /// Current in-window count for a peer and limit type.
    pub fn current_count(&self, peer: &str, limit_type: RateLimitType) -> usize {
        let mut map = self.inner.lock().unwrap();
        let key = (peer.to_string(), limit_type);
        let window = limit_type.window();
        let now = Instant::now();

        if let Some(entries) = map.get_mut(&key) {
            entries.retain(|t| now.duration_since(*t) < window);
            entries.len()
        } else {
            0
        }
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(RateLimits::default())
    }
}
