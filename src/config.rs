// Application configuration, loaded from environment variables and CLI flags.

/// Per-peer rate limits (events per window, see `rate_limit`).
#[derive(Debug, Clone, Copy)]
pub struct RateLimits {
    /// Connection attempts per peer per minute.
    pub connection: usize,
    /// AUTH attempts per peer per minute.
    pub auth: usize,
    /// Messages per peer per second.
    pub message: usize,
}

impl Default for RateLimits {
    fn default() -> Self {
        RateLimits {
            connection: 10,
            auth: 5,
            message: 120,
        }
    }
}

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Port to bind the HTTP/WebSocket server to.
    pub port: u16,
    /// Simulation tick rate in Hz.
    pub tick_rate: u32,
    /// Per-bot per-tick input deadline in milliseconds.
    pub decision_timeout_ms: u64,
    /// Matchmaking pairing pass period in milliseconds.
    pub matchmaking_interval_ms: u64,
    /// Inactive connection eviction threshold in milliseconds.
    pub connection_stale_ms: u64,
    /// Per-peer rate limits.
    pub rate_limits: RateLimits,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            port: 3000,
            tick_rate: 60,
            decision_timeout_ms: 100,
            matchmaking_interval_ms: 1000,
            connection_stale_ms: 30_000,
            rate_limits: RateLimits::default(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables and CLI arguments.
    ///
    /// Environment variables:
    /// - `PORT` - HTTP server port (default: 3000)
    /// - `TICK_RATE` - simulation Hz (default: 60)
    /// - `DECISION_TIMEOUT_MS` - per-tick input deadline (default: 100)
    /// - `MATCHMAKING_INTERVAL_MS` - pairing pass period (default: 1000)
    /// - `CONNECTION_STALE_MS` - stale session threshold (default: 30000)
    /// - `RATE_LIMIT_CONNECTION` / `RATE_LIMIT_AUTH` / `RATE_LIMIT_MESSAGE`
    ///
    /// CLI flags:
    /// - `--port <PORT>` - Override the port
    pub fn load() -> Self {
        let args: Vec<String> = std::env::args().collect();
        let defaults = Config::default();
        let default_limits = RateLimits::default();

        // Port: CLI flag --port takes precedence, then env var, then default
        let port = Self::parse_cli_value(&args, "--port")
            .and_then(|v| v.parse().ok())
            .or_else(|| env_parse("PORT"))
            .unwrap_or(defaults.port);

        Config {
            port,
            tick_rate: env_parse("TICK_RATE").unwrap_or(defaults.tick_rate),
            decision_timeout_ms: env_parse("DECISION_TIMEOUT_MS")
                .unwrap_or(defaults.decision_timeout_ms),
            matchmaking_interval_ms: env_parse("MATCHMAKING_INTERVAL_MS")
                .unwrap_or(defaults.matchmaking_interval_ms),
            connection_stale_ms: env_parse("CONNECTION_STALE_MS")
                .unwrap_or(defaults.connection_stale_ms),
            rate_limits: RateLimits {
                connection: env_parse("RATE_LIMIT_CONNECTION").unwrap_or(default_limits.connection),
                auth: env_parse("RATE_LIMIT_AUTH").unwrap_or(default_limits.auth),
                message: env_parse("RATE_LIMIT_MESSAGE").unwrap_or(default_limits.message),
            },
        }
    }

    /// Parse a CLI flag value like `--port 8080`.
    fn parse_cli_value(args: &[String], flag: &str) -> Option<String> {
        args.windows(2).find_map(|pair| {
            if pair[0] == flag {
                Some(pair[1].clone())
            } else {
                None
            }
        })
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}
