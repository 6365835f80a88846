use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Request descriptor — what a caller submits to `POST /proxy/request`
/// (spec §3).
#[derive(Debug, Clone, Deserialize)]
pub struct RequestDescriptor {
    pub method: String,
    pub url: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub body: Option<RequestBody>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub proxy: Option<String>,
}

/// A caller-supplied body is either a JSON-serializable value or a raw
/// string. The ambiguity is resolved per spec §7's open question: a
/// structured value is sent as JSON (and gets `Content-Type:
/// application/json` unless overridden); a string is sent as-is.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RequestBody {
    Raw(String),
    Json(serde_json::Value),
}

/// Response descriptor — what the orchestrator returns (spec §3).
#[derive(Debug, Clone, Serialize)]
pub struct ResponseDescriptor {
    pub status_code: u16,
    pub headers: HashMap<String, String>,
    pub body: ResponseBody,
    pub session_id: String,
    pub final_url: String,
    pub redirect_count: usize,
    pub redirect_chain: Vec<String>,
    pub elapsed_ms: u64,
}

/// Decoded response body (spec §4.1). JSON content types are parsed into
/// structured data; everything else is returned as UTF-8 text, or as
/// base64 tagged `_binary` when the bytes aren't valid UTF-8.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ResponseBody {
    Json(serde_json::Value),
    Text(String),
    Binary { _binary: bool, data: String },
}

#[derive(Debug, Serialize)]
pub struct ErrorEnvelope {
    pub error: String,
    pub detail: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub active_sessions: usize,
    pub max_sessions: usize,
    pub session_ttl_secs: u64,
    pub version: &'static str,
}

#[derive(Debug, Serialize)]
pub struct SessionCreatedResponse {
    pub session_id: String,
    pub message: &'static str,
}

#[derive(Debug, Serialize)]
pub struct SessionDeletedResponse {
    pub session_id: String,
    pub message: &'static str,
}

#[derive(Debug, Serialize)]
pub struct SessionCookiesResponse {
    pub session_id: String,
    pub cookies: HashMap<String, String>,
}
