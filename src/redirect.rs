//! Redirect Resolver (C4) — drives the Fingerprinted Transport iteratively,
//! rewriting method/body per status class, enforcing the hop limit and loop
//! detection (spec §4.4).

use std::collections::{HashMap, HashSet};

use bytes::Bytes;
use tracing::debug;
use url::Url;

use crate::cookie_jar::CookieJar;
use crate::core::error::ProxyError;
use crate::headers;
use crate::transport::{FingerprintedTransport, OutboundRequest};

pub const MAX_REDIRECTS: usize = 5;

const REDIRECT_STATUSES: [u16; 5] = [301, 302, 303, 307, 308];

/// One redirect-resolution frame (spec §3's "Redirect frame").
#[derive(Debug, Clone)]
struct Frame {
    url: Url,
    method: String,
    body: Option<Bytes>,
    /// Caller-supplied header overrides, mutated across cross-origin hops.
    overrides: HashMap<String, String>,
}

pub struct Terminal {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
    pub final_url: Url,
    pub redirect_chain: Vec<String>,
}

pub struct RedirectResolver<'a> {
    transport: &'a mut FingerprintedTransport,
    jar: &'a mut CookieJar,
    proxy: Option<&'a str>,
    request_timeout: std::time::Duration,
}

impl<'a> RedirectResolver<'a> {
    pub fn new(
        transport: &'a mut FingerprintedTransport,
        jar: &'a mut CookieJar,
        proxy: Option<&'a str>,
        request_timeout: std::time::Duration,
    ) -> Self {
        Self {
            transport,
            jar,
            proxy,
            request_timeout,
        }
    }

    pub async fn run(
        &mut self,
        url: Url,
        method: String,
        body: Option<Bytes>,
        overrides: HashMap<String, String>,
    ) -> Result<Terminal, ProxyError> {
        let mut frame = Frame {
            url,
            method,
            body,
            overrides,
        };
        let mut chain: Vec<String> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        seen.insert(loop_key(&frame.url));
        let mut hop_index = 0usize;

        loop {
            let mut outbound_headers = headers::compose(&frame.url, &frame.overrides);
            let cookie_header = build_cookie_header(self.jar, &frame.url);
            if let Some(cookie_header) = cookie_header {
                outbound_headers.push(("Cookie".to_string(), cookie_header));
            }

            let response = self
                .transport
                .execute(
                    OutboundRequest {
                        method: &frame.method,
                        url: frame.url.as_str(),
                        headers: &outbound_headers,
                        body: frame.body.clone(),
                        proxy: self.proxy,
                    },
                    self.request_timeout,
                )
                .await?;

            self.jar.ingest(&frame.url, &response.set_cookie_lines);

            if !REDIRECT_STATUSES.contains(&response.status) {
                return Ok(Terminal {
                    status: response.status,
                    headers: response.headers,
                    body: response.body,
                    final_url: frame.url,
                    redirect_chain: chain,
                });
            }

            let location = response
                .headers
                .iter()
                .find(|(name, _)| name.eq_ignore_ascii_case("location"))
                .map(|(_, v)| v.as_str())
                .ok_or_else(|| ProxyError::MalformedRedirect("missing Location header".to_string()))?;

            let next_url = frame
                .url
                .join(location)
                .map_err(|e| ProxyError::MalformedRedirect(format!("unparsable Location '{location}': {e}")))?;

            if !matches!(next_url.scheme(), "http" | "https") {
                return Err(ProxyError::MalformedRedirect(format!(
                    "redirect to unsupported scheme '{}'",
                    next_url.scheme()
                )));
            }

            let next_key = loop_key(&next_url);
            if seen.contains(&next_key) {
                return Err(ProxyError::RedirectLoop);
            }

            chain.push(frame.url.to_string());
            hop_index += 1;
            if hop_index > MAX_REDIRECTS {
                return Err(ProxyError::TooManyRedirects);
            }
            seen.insert(next_key);

            let cross_origin = origin_of(&frame.url) != origin_of(&next_url);

            let (next_method, next_body, drop_body_headers) = rewrite_for_status(
                response.status,
                &frame.method,
                frame.body.clone(),
            );

            let mut next_overrides = frame.overrides.clone();
            if drop_body_headers {
                for h in ["content-type", "content-length", "transfer-encoding"] {
                    remove_header(&mut next_overrides, h);
                }
            }
            if cross_origin {
                for h in ["authorization", "cookie"] {
                    remove_header(&mut next_overrides, h);
                }
            }

            debug!(
                "redirect: hop={} {} -> {} ({} {})",
                hop_index, frame.url, next_url, response.status, next_method
            );

            frame = Frame {
                url: next_url,
                method: next_method,
                body: next_body,
                overrides: next_overrides,
            };
        }
    }
}

/// Method/body rewrite rules for the 301/302/303/307/308 status classes
/// (spec §4.4). Returns `(method, body, drop_body_headers)`.
fn rewrite_for_status(status: u16, method: &str, body: Option<Bytes>) -> (String, Option<Bytes>, bool) {
    match status {
        303 => ("GET".to_string(), None, true),
        301 | 302 => (method.to_string(), body, false),
        307 | 308 => (method.to_string(), body, false),
        _ => (method.to_string(), body, false),
    }
}

fn build_cookie_header(jar: &CookieJar, url: &Url) -> Option<String> {
    let cookies = jar.select(url);
    if cookies.is_empty() {
        return None;
    }
    Some(
        cookies
            .into_iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect::<Vec<_>>()
            .join("; "),
    )
}

fn remove_header(map: &mut HashMap<String, String>, lowercase_name: &str) {
    map.retain(|k, _| !k.eq_ignore_ascii_case(lowercase_name));
}

fn origin_of(url: &Url) -> (String, String, Option<u16>) {
    (
        url.scheme().to_lowercase(),
        url.host_str().unwrap_or_default().to_lowercase(),
        url.port(),
    )
}

/// Loop-detection key: case-normalized origin + raw path and query
/// (spec §4.4 — "case-normalized origin, raw path+query").
fn loop_key(url: &Url) -> String {
    let origin = format!(
        "{}://{}",
        url.scheme().to_lowercase(),
        url.host_str().unwrap_or_default().to_lowercase()
    );
    let port = url.port().map(|p| format!(":{p}")).unwrap_or_default();
    format!("{origin}{port}{}?{}", url.path(), url.query().unwrap_or(""))
}
