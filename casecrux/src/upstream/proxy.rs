//! Turning upstream results into handler replies

use axum::http::StatusCode;
use serde_json::{json, Value};

use super::client::MlClient;
use super::error::UpstreamFailure;
use crate::cache::middleware::{timestamp, HandlerReply};

/// Map an upstream result onto a reply.
///
/// Client errors are relayed with the upstream status and body. Other failures
/// become a demo payload from `fallback` when the environment allows it, and a
/// diagnostic error otherwise. Demo payloads are never cacheable.
pub fn proxy_reply<F>(
    client: &MlClient,
    action: &str,
    result: Result<Value, UpstreamFailure>,
    fallback: F,
) -> HandlerReply
where
    F: FnOnce(&UpstreamFailure) -> Value,
{
    let failure = match result {
        Ok(body) => return HandlerReply::ok(body),
        Err(failure) => failure,
    };

    if !failure.is_client_error() && client.environment().allows_fallback() {
        tracing::warn!(
            "Serving demo response for {} ({} failure)",
            action,
            failure.kind.as_str()
        );
        metrics::counter!("casecrux_demo_responses_total", "action" => action.to_string())
            .increment(1);
        return HandlerReply::uncached(fallback(&failure));
    }

    failure_reply(client, action, &failure)
}

/// Map an upstream result onto a reply without any demo fallback
pub fn relay_reply(
    client: &MlClient,
    action: &str,
    result: Result<Value, UpstreamFailure>,
) -> HandlerReply {
    match result {
        Ok(body) => HandlerReply::ok(body),
        Err(failure) => failure_reply(client, action, &failure),
    }
}

fn failure_reply(client: &MlClient, action: &str, failure: &UpstreamFailure) -> HandlerReply {
    let status = failure.status.and_then(|s| StatusCode::from_u16(s).ok());

    if failure.is_client_error() {
        let status = status.unwrap_or(StatusCode::BAD_REQUEST);
        let body = failure
            .details
            .clone()
            .unwrap_or_else(|| json!({ "error": failure.message }));
        tracing::warn!("ML service rejected {} request with {}", action, status);
        return HandlerReply::error(status, body);
    }

    HandlerReply::error(
        status.unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
        json!({
            "error": format!("Failed to {}", action),
            "details": failure.detail_text(),
            "error_type": failure.kind.as_str(),
            "ml_service_url": client.base_url(),
            "target_url": failure.url,
            "ml_service_status": failure.status,
            "duration_ms": failure.duration_ms(),
        }),
    )
}

/// Add request context to an error reply; successful replies pass through
pub fn with_request_context(mut reply: HandlerReply, category: Option<&str>) -> HandlerReply {
    if reply.status.is_success() {
        return reply;
    }
    if let Value::Object(map) = &mut reply.body {
        if let Some(category) = category {
            map.insert("category".to_string(), Value::String(category.to_string()));
        }
        map.insert(
            "timestamp".to_string(),
            Value::String(timestamp()),
        );
    }
    reply
}
