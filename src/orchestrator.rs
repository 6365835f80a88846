//! Request Orchestrator (C6) — validates an inbound request descriptor,
//! drives the redirect resolver against the right session's jar/transport,
//! and assembles the response descriptor (spec §4.1, §4.6).

use std::collections::HashMap;
use std::time::{Duration, Instant};

use bytes::Bytes;
use tracing::info;
use url::Url;
use uuid::Uuid;

use crate::core::error::ProxyError;
use crate::core::types::{RequestBody, RequestDescriptor, ResponseBody, ResponseDescriptor};
use crate::redirect::{RedirectResolver, Terminal};
use crate::session::{SessionRegistry, SessionState};

const ALLOWED_METHODS: [&str; 7] = ["GET", "POST", "PUT", "PATCH", "DELETE", "HEAD", "OPTIONS"];

pub struct Orchestrator<'a> {
    registry: &'a SessionRegistry,
    request_timeout: Duration,
}

impl<'a> Orchestrator<'a> {
    pub fn new(registry: &'a SessionRegistry, request_timeout: Duration) -> Self {
        Self {
            registry,
            request_timeout,
        }
    }

    pub async fn handle(&self, req: RequestDescriptor) -> Result<ResponseDescriptor, ProxyError> {
        let method = validate_method(&req.method)?;
        let url = Url::parse(&req.url)?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ProxyError::BadRequest(format!(
                "unsupported URL scheme '{}'",
                url.scheme()
            )));
        }
        if let Some(proxy) = &req.proxy {
            validate_proxy_scheme(proxy)?;
        }

        let (overrides, body) = split_body(req.headers, req.body)?;
        let started = Instant::now();

        let (session_id, terminal) = match &req.session_id {
            Some(handle) => {
                // A caller-supplied handle is bound on first use (spec §4.5
                // `get_or_create`) rather than requiring a prior
                // `session/create` call.
                let entry = self.registry.get_or_create(handle).await?;
                let mut state = entry.state.lock().await;
                let terminal = self
                    .run(&mut state, url, method, body, overrides, req.proxy.as_deref())
                    .await?;
                (handle.clone(), terminal)
            }
            None => {
                let mut state = SessionState::new();
                let terminal = self
                    .run(&mut state, url, method, body, overrides, req.proxy.as_deref())
                    .await?;
                (Uuid::new_v4().to_string(), terminal)
            }
        };

        let elapsed_ms = started.elapsed().as_millis() as u64;
        let redirect_count = terminal.redirect_chain.len();
        let body = decode_body(&terminal.headers, &terminal.body);

        info!(
            "orchestrator: method={} final_status={} redirects={} elapsed_ms={} session={}",
            method, terminal.status, redirect_count, elapsed_ms, session_id
        );

        Ok(ResponseDescriptor {
            status_code: terminal.status,
            headers: terminal.headers.into_iter().collect(),
            body,
            session_id,
            final_url: terminal.final_url.to_string(),
            redirect_count,
            redirect_chain: terminal.redirect_chain,
            elapsed_ms,
        })
    }

    async fn run(
        &self,
        state: &mut SessionState,
        url: Url,
        method: &'static str,
        body: Option<Bytes>,
        overrides: HashMap<String, String>,
        proxy: Option<&str>,
    ) -> Result<Terminal, ProxyError> {
        let mut resolver = RedirectResolver::new(
            &mut state.transport,
            &mut state.jar,
            proxy,
            self.request_timeout,
        );
        resolver.run(url, method.to_string(), body, overrides).await
    }
}

fn validate_method(method: &str) -> Result<&'static str, ProxyError> {
    let upper = method.to_ascii_uppercase();
    ALLOWED_METHODS
        .iter()
        .find(|m| **m == upper)
        .copied()
        .ok_or_else(|| ProxyError::BadRequest(format!("unsupported method '{method}'")))
}

fn validate_proxy_scheme(proxy: &str) -> Result<(), ProxyError> {
    let scheme = proxy.split("://").next().unwrap_or_default();
    if matches!(scheme, "http" | "https" | "socks5") {
        Ok(())
    } else {
        Err(ProxyError::BadRequest(format!("unsupported proxy scheme '{scheme}'")))
    }
}

/// Split the caller's descriptor into header overrides and an outbound byte
/// body. A structured JSON body is serialized and tagged `application/json`
/// unless the caller already set `Content-Type`; a raw string is sent
/// byte-for-byte, defaulting to `text/plain; charset=utf-8` under the same
/// condition (spec §7).
fn split_body(
    mut overrides: HashMap<String, String>,
    body: Option<RequestBody>,
) -> Result<(HashMap<String, String>, Option<Bytes>), ProxyError> {
    let has_content_type = overrides.keys().any(|k| k.eq_ignore_ascii_case("content-type"));

    let bytes = match body {
        None => None,
        Some(RequestBody::Raw(s)) => {
            if !has_content_type {
                overrides.insert("Content-Type".to_string(), "text/plain; charset=utf-8".to_string());
            }
            Some(Bytes::from(s.into_bytes()))
        }
        Some(RequestBody::Json(value)) => {
            let encoded = serde_json::to_vec(&value)
                .map_err(|e| ProxyError::BadRequest(format!("unserializable JSON body: {e}")))?;
            if !has_content_type {
                overrides.insert("Content-Type".to_string(), "application/json".to_string());
            }
            Some(Bytes::from(encoded))
        }
    };

    Ok((overrides, bytes))
}

fn decode_body(headers: &[(String, String)], body: &Bytes) -> ResponseBody {
    let content_type = headers
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case("content-type"))
        .map(|(_, v)| v.to_ascii_lowercase())
        .unwrap_or_default();
    let media_type = content_type.split(';').next().unwrap_or("").trim();

    if media_type == "application/json" {
        if let Ok(value) = serde_json::from_slice::<serde_json::Value>(body) {
            return ResponseBody::Json(value);
        }
    }

    match std::str::from_utf8(body) {
        Ok(text) => ResponseBody::Text(text.to_string()),
        Err(_) => ResponseBody::Binary {
            _binary: true,
            data: base64::Engine::encode(&base64::engine::general_purpose::STANDARD, body),
        },
    }
}
