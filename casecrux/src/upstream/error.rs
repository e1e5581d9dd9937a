//! Classified upstream failures

use std::time::Duration;

use serde_json::Value;

/// Why an upstream call failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Connection refused, DNS failure, reset
    Connection,
    /// Client-side timeout fired
    Timeout,
    /// Upstream answered 5xx
    Server,
    /// Upstream rejected the request (4xx)
    Client,
    /// Anything else, including undecodable responses
    Other,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connection => "connection",
            Self::Timeout => "timeout",
            Self::Server => "server",
            Self::Client => "client",
            Self::Other => "unknown",
        }
    }

    pub fn from_status(status: u16) -> Self {
        match status {
            500..=599 => Self::Server,
            400..=499 => Self::Client,
            _ => Self::Other,
        }
    }
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("ML service request to {url} failed ({}): {message}", .kind.as_str())]
pub struct UpstreamFailure {
    pub kind: FailureKind,
    /// HTTP status when the upstream answered
    pub status: Option<u16>,
    pub message: String,
    /// Response body when the upstream answered
    pub details: Option<Value>,
    pub url: String,
    pub duration: Duration,
}

impl UpstreamFailure {
    pub(crate) fn from_reqwest(err: &reqwest::Error, url: &str, duration: Duration) -> Self {
        let kind = if err.is_timeout() {
            FailureKind::Timeout
        } else if err.is_connect() {
            FailureKind::Connection
        } else if let Some(status) = err.status() {
            FailureKind::from_status(status.as_u16())
        } else {
            FailureKind::Other
        };

        Self {
            kind,
            status: err.status().map(|s| s.as_u16()),
            message: err.to_string(),
            details: None,
            url: url.to_string(),
            duration,
        }
    }

    pub(crate) fn from_response(status: u16, body: Value, url: &str, duration: Duration) -> Self {
        Self {
            kind: FailureKind::from_status(status),
            status: Some(status),
            message: format!("Request failed with status code {}", status),
            details: Some(body),
            url: url.to_string(),
            duration,
        }
    }

    /// Bad input rather than unavailability; never masked by a fallback
    pub fn is_client_error(&self) -> bool {
        self.kind == FailureKind::Client
    }

    /// Most specific human-readable explanation available
    pub fn detail_text(&self) -> String {
        let from_body = self.details.as_ref().and_then(|body| match body {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Object(map) => map
                .get("detail")
                .or_else(|| map.get("error"))
                .map(|v| match v {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                }),
            _ => None,
        });
        from_body.unwrap_or_else(|| self.message.clone())
    }

    pub fn duration_ms(&self) -> u64 {
        self.duration.as_millis() as u64
    }
}
