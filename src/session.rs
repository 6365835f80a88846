//! Session Registry (C5) — handle-keyed storage for per-session cookie jars
//! and transport client caches, with TTL sweep and capacity enforcement
//! (spec §4.5).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::sync::{Mutex, RwLock};
use tracing::debug;
use uuid::Uuid;

use crate::cookie_jar::CookieJar;
use crate::core::error::ProxyError;
use crate::transport::FingerprintedTransport;

/// The mutable state a session owns: its cookie jar and its cached
/// fingerprinted clients. Held behind a per-session mutex so two concurrent
/// requests against the same handle serialize rather than race (spec §4.5).
pub struct SessionState {
    pub jar: CookieJar,
    pub transport: FingerprintedTransport,
}

impl SessionState {
    pub fn new() -> Self {
        Self {
            jar: CookieJar::new(),
            transport: FingerprintedTransport::new(),
        }
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

pub struct SessionEntry {
    pub state: Mutex<SessionState>,
    created_at: u64,
    last_access: AtomicU64,
}

impl SessionEntry {
    fn new(now: u64) -> Self {
        Self {
            state: Mutex::new(SessionState::new()),
            created_at: now,
            last_access: AtomicU64::new(now),
        }
    }

    fn touch(&self, now: u64) {
        self.last_access.store(now, Ordering::Relaxed);
    }

    fn is_expired(&self, now: u64, ttl: Duration) -> bool {
        let last = self.last_access.load(Ordering::Relaxed);
        now.saturating_sub(last) >= ttl.as_secs()
    }
}

pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Arc<SessionEntry>>>,
    ttl: Duration,
    max_sessions: usize,
}

impl SessionRegistry {
    pub fn new(ttl: Duration, max_sessions: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            ttl,
            max_sessions,
        }
    }

    /// Allocate a new, empty session and return its handle (spec §6
    /// `POST /proxy/session/create`). Fails with `capacity_exhausted` only
    /// after a sweep has had a chance to free up room (spec §4.5).
    pub async fn create(&self) -> Result<String, ProxyError> {
        self.sweep().await;
        let mut sessions = self.sessions.write().await;
        if sessions.len() >= self.max_sessions {
            return Err(ProxyError::CapacityExhausted);
        }
        let handle = Uuid::new_v4().to_string();
        sessions.insert(handle.clone(), Arc::new(SessionEntry::new(now_secs())));
        Ok(handle)
    }

    /// Look up an existing session by handle, refreshing its last-access
    /// timestamp. Returns `SessionNotFound` for an unknown or expired handle.
    pub async fn get(&self, handle: &str) -> Result<Arc<SessionEntry>, ProxyError> {
        let sessions = self.sessions.read().await;
        let entry = sessions.get(handle).cloned().ok_or(ProxyError::SessionNotFound)?;
        entry.touch(now_secs());
        Ok(entry)
    }

    /// Return the session bound to `handle`, or create one under that exact
    /// handle if none exists yet (spec §4.5). Used when a caller supplies a
    /// `session_id` the orchestrator hasn't seen before — unlike `create`,
    /// the handle is the caller's, not a generated UUID.
    pub async fn get_or_create(&self, handle: &str) -> Result<Arc<SessionEntry>, ProxyError> {
        {
            let sessions = self.sessions.read().await;
            if let Some(entry) = sessions.get(handle) {
                entry.touch(now_secs());
                return Ok(entry.clone());
            }
        }
        self.sweep().await;
        let mut sessions = self.sessions.write().await;
        if let Some(entry) = sessions.get(handle) {
            entry.touch(now_secs());
            return Ok(entry.clone());
        }
        if sessions.len() >= self.max_sessions {
            return Err(ProxyError::CapacityExhausted);
        }
        let entry = Arc::new(SessionEntry::new(now_secs()));
        sessions.insert(handle.to_string(), entry.clone());
        Ok(entry)
    }

    /// Remove a session. Idempotent at this layer: deleting an already-gone
    /// handle is reported as `SessionNotFound`; the HTTP layer maps both the
    /// first and a repeat delete to 200 (spec §11).
    pub async fn delete(&self, handle: &str) -> Result<(), ProxyError> {
        let mut sessions = self.sessions.write().await;
        sessions.remove(handle).map(|_| ()).ok_or(ProxyError::SessionNotFound)
    }

    pub async fn cookies(&self, handle: &str) -> Result<HashMap<String, String>, ProxyError> {
        let entry = self.get(handle).await?;
        let state = entry.state.lock().await;
        Ok(state.jar.snapshot())
    }

    pub async fn active_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Evict sessions idle past the TTL. A session whose mutex is currently
    /// held by an in-flight request is skipped this round and re-examined on
    /// the next sweep rather than blocking on it (spec §4.5).
    pub async fn sweep(&self) {
        let now = now_secs();
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, entry| {
            if !entry.is_expired(now, self.ttl) {
                return true;
            }
            entry.state.try_lock().is_err()
        });
        let evicted = before - sessions.len();
        if evicted > 0 {
            debug!("session_registry: swept {} expired session(s)", evicted);
        }
    }

    /// Run `sweep()` on `interval` until the returned task is aborted.
    pub fn spawn_sweeper(self: Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                self.sweep().await;
            }
        })
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
