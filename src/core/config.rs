use std::time::Duration;

use tracing::warn;

// ---------------------------------------------------------------------------
// ProxyConfig — process-wide config loaded from the environment at startup.
// ---------------------------------------------------------------------------

/// Process-wide configuration, read once at startup (spec §6).
#[derive(Clone, Debug)]
pub struct ProxyConfig {
    /// Shared secret callers must present via `X-API-Key`. Empty means the
    /// auth middleware rejects every request (a warning is logged once at
    /// startup so this can't silently happen in a production deploy).
    pub api_key: String,
    pub session_ttl: Duration,
    pub max_sessions: usize,
    pub port: u16,
    pub request_timeout: Duration,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            session_ttl: Duration::from_secs(3600),
            max_sessions: 100,
            port: 8000,
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl ProxyConfig {
    /// Load from environment variables, falling back to the spec §6 defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let api_key = std::env::var("API_KEY").unwrap_or_default();
        if api_key.is_empty() {
            warn!("API_KEY is not set — every /proxy/* request will be rejected with 401");
        }

        let session_ttl = env_u64("SESSION_TTL")
            .map(Duration::from_secs)
            .unwrap_or(defaults.session_ttl);
        let max_sessions = env_parse::<usize>("MAX_SESSIONS").unwrap_or(defaults.max_sessions);
        let port = env_parse::<u16>("PORT").unwrap_or(defaults.port);
        let request_timeout = env_u64("REQUEST_TIMEOUT")
            .map(Duration::from_secs)
            .unwrap_or(defaults.request_timeout);

        Self {
            api_key,
            session_ttl,
            max_sessions,
            port,
            request_timeout,
        }
    }

    /// Sweep interval: `TTL / 10`, floored at 10 seconds (spec §4.5).
    pub fn sweep_interval(&self) -> Duration {
        let tenth = self.session_ttl / 10;
        tenth.max(Duration::from_secs(10))
    }

    pub fn summarize_for_logs(&self) -> String {
        format!(
            "port={} session_ttl={}s max_sessions={} request_timeout={}s api_key_set={}",
            self.port,
            self.session_ttl.as_secs(),
            self.max_sessions,
            self.request_timeout.as_secs(),
            !self.api_key.is_empty()
        )
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

fn env_u64(key: &str) -> Option<u64> {
    env_parse::<u64>(key)
}
