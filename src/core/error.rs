use axum::http::StatusCode;
use thiserror::Error;

/// Every error kind the engine can produce, mapped to its HTTP status per
/// spec §7. `kind()` is the short machine code used in the error envelope's
/// `"error"` field; `Display` (via `#[error(...)]`) is the `"detail"` field.
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("{0}")]
    BadRequest(String),

    #[error("session registry is at capacity")]
    CapacityExhausted,

    #[error("unknown session handle")]
    SessionNotFound,

    #[error("redirect loop detected")]
    RedirectLoop,

    #[error("too many redirects (limit is 5)")]
    TooManyRedirects,

    #[error("malformed or missing Location header: {0}")]
    MalformedRedirect(String),

    #[error("failed to reach upstream: {0}")]
    UpstreamDial(String),

    #[error("TLS handshake with upstream failed: {0}")]
    UpstreamTls(String),

    #[error("proxy protocol failure: {0}")]
    ProxyProtocol(String),

    #[error("request timed out")]
    Timeout,

    #[error("failed to decode response body: {0}")]
    Decode(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ProxyError {
    /// Short machine code for the `{"error": "<code>"}` envelope field.
    pub fn kind(&self) -> &'static str {
        match self {
            ProxyError::BadRequest(_) => "bad_request",
            ProxyError::CapacityExhausted => "capacity_exhausted",
            ProxyError::SessionNotFound => "session_not_found",
            ProxyError::RedirectLoop => "redirect_loop",
            ProxyError::TooManyRedirects => "too_many_redirects",
            ProxyError::MalformedRedirect(_) => "malformed_redirect",
            ProxyError::UpstreamDial(_) => "upstream_dial",
            ProxyError::UpstreamTls(_) => "upstream_tls",
            ProxyError::ProxyProtocol(_) => "proxy_protocol",
            ProxyError::Timeout => "timeout",
            ProxyError::Decode(_) => "decode",
            ProxyError::Internal(_) => "internal",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ProxyError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ProxyError::CapacityExhausted => StatusCode::BAD_REQUEST,
            ProxyError::SessionNotFound => StatusCode::NOT_FOUND,
            ProxyError::RedirectLoop
            | ProxyError::TooManyRedirects
            | ProxyError::MalformedRedirect(_)
            | ProxyError::UpstreamDial(_)
            | ProxyError::UpstreamTls(_)
            | ProxyError::ProxyProtocol(_)
            | ProxyError::Decode(_) => StatusCode::BAD_GATEWAY,
            ProxyError::Timeout => StatusCode::GATEWAY_TIMEOUT,
            ProxyError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<url::ParseError> for ProxyError {
    fn from(e: url::ParseError) -> Self {
        ProxyError::BadRequest(format!("invalid URL: {e}"))
    }
}

impl From<wreq::Error> for ProxyError {
    fn from(e: wreq::Error) -> Self {
        if e.is_timeout() {
            ProxyError::Timeout
        } else if e.is_connect() {
            ProxyError::UpstreamDial(e.to_string())
        } else if e.is_redirect() {
            ProxyError::MalformedRedirect(e.to_string())
        } else if e.is_decode() {
            ProxyError::Decode(e.to_string())
        } else {
            ProxyError::UpstreamDial(e.to_string())
        }
    }
}
