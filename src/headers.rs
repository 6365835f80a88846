//! Header Composer (C3) — builds the outbound header set for a URL by
//! merging the Chrome-133 default set, URL-derived headers, and caller
//! overrides (spec §4.3).

use std::collections::HashMap;

use url::Url;

/// The Chrome 133 desktop default header set (spec §4.3), applied before
/// anything derived from the URL or supplied by the caller.
pub fn default_headers() -> Vec<(&'static str, &'static str)> {
    vec![
        ("Accept", "application/json, text/plain, */*"),
        ("Accept-Language", "tr-TR,tr;q=0.9,en-US;q=0.8,en;q=0.7"),
        ("Accept-Encoding", "gzip, deflate, br, zstd"),
        ("Cache-Control", "no-cache"),
        ("Pragma", "no-cache"),
        (
            "User-Agent",
            "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/133.0.0.0 Safari/537.36",
        ),
        (
            "Sec-Ch-Ua",
            "\"Not(A:Brand\";v=\"99\", \"Google Chrome\";v=\"133\", \"Chromium\";v=\"133\"",
        ),
        ("Sec-Ch-Ua-Mobile", "?0"),
        ("Sec-Ch-Ua-Platform", "\"macOS\""),
        ("Sec-Fetch-Dest", "empty"),
        ("Sec-Fetch-Mode", "cors"),
        ("Sec-Fetch-Site", "same-site"),
    ]
}

/// Compose the outbound header set for `url`, given the caller's overrides
/// (last write wins, case-insensitive name comparison). An override whose
/// value is empty suppresses that header entirely (spec §4.3).
///
/// Returns an ordered `(name, value)` list — `Host` is intentionally absent;
/// the transport sets it implicitly from the URL authority.
pub fn compose(url: &Url, overrides: &HashMap<String, String>) -> Vec<(String, String)> {
    let mut merged: Vec<(String, String)> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    let mut set = |merged: &mut Vec<(String, String)>, index: &mut HashMap<String, usize>, name: &str, value: String| {
        let key = name.to_ascii_lowercase();
        if let Some(&i) = index.get(&key) {
            merged[i].1 = value;
        } else {
            index.insert(key, merged.len());
            merged.push((name.to_string(), value));
        }
    };

    for (name, value) in default_headers() {
        set(&mut merged, &mut index, name, value.to_string());
    }

    let origin = derive_origin(url);
    set(&mut merged, &mut index, "Origin", origin.clone());
    set(&mut merged, &mut index, "Referer", format!("{origin}/"));

    for (name, value) in overrides {
        let key = name.to_ascii_lowercase();
        if value.is_empty() {
            if let Some(&i) = index.get(&key) {
                merged.remove(i);
                index.remove(&key);
                // Shift indices after the removed entry.
                for v in index.values_mut() {
                    if *v > i {
                        *v -= 1;
                    }
                }
            }
            continue;
        }
        set(&mut merged, &mut index, name, value.clone());
    }

    merged
}

fn derive_origin(url: &Url) -> String {
    let scheme = url.scheme();
    let host = url.host_str().unwrap_or_default();
    match url.port() {
        Some(port) if !is_default_port(scheme, port) => format!("{scheme}://{host}:{port}"),
        _ => format!("{scheme}://{host}"),
    }
}

fn is_default_port(scheme: &str, port: u16) -> bool {
    matches!((scheme, port), ("http", 80) | ("https", 443))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn get<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
        headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    #[test]
    fn derives_origin_and_referer() {
        let url = Url::parse("https://api.example.com/v1/thing").unwrap();
        let merged = compose(&url, &HashMap::new());
        assert_eq!(get(&merged, "origin"), Some("https://api.example.com"));
        assert_eq!(get(&merged, "referer"), Some("https://api.example.com/"));
    }

    #[test]
    fn non_default_port_kept_in_origin() {
        let url = Url::parse("http://localhost:8080/x").unwrap();
        let merged = compose(&url, &HashMap::new());
        assert_eq!(get(&merged, "origin"), Some("http://localhost:8080"));
    }

    #[test]
    fn caller_override_dominates_default() {
        let url = Url::parse("https://example.com/").unwrap();
        let mut overrides = HashMap::new();
        overrides.insert("accept".to_string(), "text/html".to_string());
        let merged = compose(&url, &overrides);
        assert_eq!(get(&merged, "Accept"), Some("text/html"));
        // Only one entry for the header, not two.
        assert_eq!(merged.iter().filter(|(n, _)| n.eq_ignore_ascii_case("accept")).count(), 1);
    }

    #[test]
    fn empty_override_suppresses_header() {
        let url = Url::parse("https://example.com/").unwrap();
        let mut overrides = HashMap::new();
        overrides.insert("Pragma".to_string(), String::new());
        let merged = compose(&url, &overrides);
        assert!(get(&merged, "pragma").is_none());
    }
}
