//! Cookie Jar (C2) — per-session cookie storage with RFC 6265 domain/path
//! matching. One [`CookieJar`] belongs to exactly one session (spec §3); it
//! is never shared across sessions.

use std::collections::HashMap;
use std::time::{Duration, SystemTime};

use tracing::debug;
use url::Url;

/// Key a jar entry is stored and upserted under (spec §3 invariant).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CookieKey {
    domain: String,
    path: String,
    name: String,
}

#[derive(Debug, Clone)]
struct CookieEntry {
    value: String,
    /// `None` domain attribute ⇒ host-only cookie (exact host match only).
    host_only: bool,
    secure: bool,
    http_only: bool,
    same_site: Option<String>,
    /// `None` ⇒ session cookie, never expires on its own.
    expires_at: Option<SystemTime>,
    ingested_at: SystemTime,
}

impl CookieEntry {
    fn is_expired(&self, now: SystemTime) -> bool {
        matches!(self.expires_at, Some(exp) if exp <= now)
    }
}

#[derive(Debug, Default)]
pub struct CookieJar {
    entries: HashMap<CookieKey, CookieEntry>,
}

impl CookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    /// `select(url)` — cookies applicable to this request (spec §4.2).
    pub fn select(&self, url: &Url) -> Vec<(String, String)> {
        let now = SystemTime::now();
        let host = url.host_str().unwrap_or_default();
        let is_secure = url.scheme() == "https";
        let path = request_path(url);

        let mut matches: Vec<_> = self
            .entries
            .iter()
            .filter(|(key, entry)| {
                !entry.is_expired(now)
                    && domain_matches(host, &key.domain, entry.host_only)
                    && path_matches(&path, &key.path)
                    && (is_secure || !entry.secure)
            })
            .collect();

        // Longer path first, matching the snapshot/select precedence RFC
        // 6265 recommends for the Cookie header ordering.
        matches.sort_by(|a, b| b.0.path.len().cmp(&a.0.path.len()));

        matches
            .into_iter()
            .map(|(key, entry)| (key.name.clone(), entry.value.clone()))
            .collect()
    }

    /// `ingest(url, set_cookie_lines)` — apply raw `Set-Cookie` header
    /// values observed for `url` (spec §4.2).
    pub fn ingest<I, S>(&mut self, url: &Url, set_cookie_lines: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for line in set_cookie_lines {
            if let Err(e) = self.ingest_one(url, line.as_ref()) {
                debug!("cookie_jar: dropping unparsable Set-Cookie ({})", e);
            }
        }
    }

    fn ingest_one(&mut self, url: &Url, line: &str) -> Result<(), String> {
        let parsed = cookie::Cookie::parse(line.to_string()).map_err(|e| e.to_string())?;

        let request_host = url
            .host_str()
            .ok_or_else(|| "request URL has no host".to_string())?;

        let (domain, host_only) = match parsed.domain() {
            Some(d) => {
                let normalized = d.trim_start_matches('.').to_lowercase();
                if is_public_suffix(&normalized) && !normalized.eq_ignore_ascii_case(request_host) {
                    return Err(format!("refusing public-suffix cookie domain '{normalized}'"));
                }
                (normalized, false)
            }
            None => (request_host.to_lowercase(), true),
        };

        let path = parsed
            .path()
            .map(|p| p.to_string())
            .unwrap_or_else(|| default_path(url));

        let now = SystemTime::now();
        let expires_at = effective_expiry(&parsed, now);

        let key = CookieKey {
            domain,
            path,
            name: parsed.name().to_string(),
        };

        // A cookie whose effective expiry is already past deletes any
        // matching entry rather than inserting (spec §4.2).
        if let Some(exp) = expires_at {
            if exp <= now {
                self.entries.remove(&key);
                return Ok(());
            }
        }

        self.entries.insert(
            key,
            CookieEntry {
                value: parsed.value().to_string(),
                host_only,
                secure: parsed.secure().unwrap_or(false),
                http_only: parsed.http_only().unwrap_or(false),
                same_site: parsed.same_site().map(|s| s.to_string()),
                expires_at,
                ingested_at: now,
            },
        );
        Ok(())
    }

    /// `snapshot()` — flat name→value projection for the cookies read
    /// endpoint (spec §4.2). Collisions across (domain, path) resolve to
    /// the longest path, ties broken by most-recent ingest.
    pub fn snapshot(&self) -> HashMap<String, String> {
        let now = SystemTime::now();
        let mut best: HashMap<&str, (&CookieKey, &CookieEntry)> = HashMap::new();

        for (key, entry) in self.entries.iter().filter(|(_, e)| !e.is_expired(now)) {
            match best.get(key.name.as_str()) {
                Some((cur_key, cur_entry)) => {
                    let better = key.path.len() > cur_key.path.len()
                        || (key.path.len() == cur_key.path.len()
                            && entry.ingested_at > cur_entry.ingested_at);
                    if better {
                        best.insert(&key.name, (key, entry));
                    }
                }
                None => {
                    best.insert(&key.name, (key, entry));
                }
            }
        }

        best.into_iter()
            .map(|(name, (_, entry))| (name.to_string(), entry.value.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn request_path(url: &Url) -> String {
    let p = url.path();
    if p.is_empty() {
        "/".to_string()
    } else {
        p.to_string()
    }
}

/// RFC 6265 §5.1.4 default-path algorithm.
fn default_path(url: &Url) -> String {
    let p = url.path();
    match p.rfind('/') {
        Some(0) | None => "/".to_string(),
        Some(idx) => p[..idx].to_string(),
    }
}

/// RFC 6265 §5.1.3 domain-match.
fn domain_matches(host: &str, cookie_domain: &str, host_only: bool) -> bool {
    let host = host.to_lowercase();
    let cookie_domain = cookie_domain.to_lowercase();
    if host_only {
        return host == cookie_domain;
    }
    host == cookie_domain || (host.ends_with(&cookie_domain) && host.len() > cookie_domain.len() && {
        let prefix_end = host.len() - cookie_domain.len();
        host.as_bytes()[prefix_end - 1] == b'.'
    })
}

/// RFC 6265 §5.1.4 path-match.
fn path_matches(request_path: &str, cookie_path: &str) -> bool {
    if request_path == cookie_path {
        return true;
    }
    if !request_path.starts_with(cookie_path) {
        return false;
    }
    cookie_path.ends_with('/') || request_path.as_bytes().get(cookie_path.len()) == Some(&b'/')
}

fn effective_expiry(parsed: &cookie::Cookie<'_>, now: SystemTime) -> Option<SystemTime> {
    if let Some(max_age) = parsed.max_age() {
        let secs = max_age.whole_seconds().max(0) as u64;
        return Some(now + Duration::from_secs(secs));
    }
    match parsed.expires() {
        Some(cookie::Expiration::DateTime(dt)) => {
            SystemTime::UNIX_EPOCH.checked_add(Duration::from_secs(dt.unix_timestamp().max(0) as u64))
        }
        Some(cookie::Expiration::Session) | None => None,
    }
}

/// Reject cookie `Domain` attributes that name a public-suffix-like
/// super-domain (spec §9), e.g. `Domain=.com`.
fn is_public_suffix(domain: &str) -> bool {
    match psl::suffix(domain.as_bytes()) {
        Some(suffix) => suffix.as_bytes().eq_ignore_ascii_case(domain.as_bytes()),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn ingest_then_select_roundtrip() {
        let mut jar = CookieJar::new();
        jar.ingest(&url("https://example.com/app/"), ["k=v; Path=/; Domain=example.com"]);
        let selected = jar.select(&url("https://example.com/app/page"));
        assert_eq!(selected, vec![("k".to_string(), "v".to_string())]);
    }

    #[test]
    fn snapshot_reflects_ingested_cookie() {
        let mut jar = CookieJar::new();
        jar.ingest(&url("https://example.com/"), ["k=v; Path=/; Domain=example.com"]);
        let snap = jar.snapshot();
        assert_eq!(snap.get("k"), Some(&"v".to_string()));
    }

    #[test]
    fn host_only_cookie_does_not_match_subdomain() {
        let mut jar = CookieJar::new();
        jar.ingest(&url("https://example.com/"), ["k=v"]);
        assert!(jar.select(&url("https://www.example.com/")).is_empty());
        assert!(!jar.select(&url("https://example.com/")).is_empty());
    }

    #[test]
    fn domain_cookie_matches_subdomains() {
        let mut jar = CookieJar::new();
        jar.ingest(&url("https://example.com/"), ["k=v; Domain=example.com"]);
        assert_eq!(jar.select(&url("https://www.example.com/")).len(), 1);
    }

    #[test]
    fn secure_cookie_excluded_from_plain_http() {
        let mut jar = CookieJar::new();
        jar.ingest(&url("https://example.com/"), ["k=v; Secure"]);
        assert!(jar.select(&url("http://example.com/")).is_empty());
        assert_eq!(jar.select(&url("https://example.com/")).len(), 1);
    }

    #[test]
    fn expired_cookie_is_removed_not_selected() {
        let mut jar = CookieJar::new();
        jar.ingest(
            &url("https://example.com/"),
            ["k=v; Expires=Thu, 01 Jan 1970 00:00:00 GMT"],
        );
        assert!(jar.select(&url("https://example.com/")).is_empty());
        assert!(jar.is_empty());
    }

    #[test]
    fn later_set_cookie_replaces_earlier_for_same_key() {
        let mut jar = CookieJar::new();
        jar.ingest(&url("https://example.com/"), ["k=first; Domain=example.com; Path=/"]);
        jar.ingest(&url("https://example.com/"), ["k=second; Domain=example.com; Path=/"]);
        assert_eq!(jar.len(), 1);
        assert_eq!(jar.snapshot().get("k"), Some(&"second".to_string()));
    }

    #[test]
    fn public_suffix_domain_is_rejected() {
        let mut jar = CookieJar::new();
        jar.ingest(&url("https://example.com/"), ["k=v; Domain=.com"]);
        assert!(jar.is_empty());
    }

    #[test]
    fn longest_path_wins_snapshot_collision() {
        let mut jar = CookieJar::new();
        jar.ingest(&url("https://example.com/"), ["k=short; Domain=example.com; Path=/"]);
        jar.ingest(
            &url("https://example.com/app/"),
            ["k=long; Domain=example.com; Path=/app"],
        );
        assert_eq!(jar.snapshot().get("k"), Some(&"long".to_string()));
    }
}
