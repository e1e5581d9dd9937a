//! ML proxy routes mounted under `/api/ml`

use std::time::Instant;

use axum::extract::{Multipart, State};
use axum::Json;
use serde_json::{json, Map, Value};

use super::error::ApiError;
use super::server::AppState;
use crate::cache::middleware::{
    serve_cached, timestamp, CacheRequest, HandlerReply, UploadedFile, KEY_OPTIONS,
};
use crate::cache::CacheType;
use crate::upstream::{
    fallback, proxy_reply, relay_reply, with_request_context, TimeoutTier, UpstreamFailure,
};

const HEALTH_CHECK_URL: &str = "https://httpbin.org/status/200";

fn requested_urls(body: &Value) -> Vec<String> {
    body.get("urls")
        .and_then(Value::as_array)
        .map(|urls| {
            urls.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn category_of(body: &Value) -> Option<String> {
    body.get("category")
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// POST /summarize_from_urls
pub async fn summarize_from_urls(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> HandlerReply {
    let cache = state.cache.clone();
    serve_cached(
        &cache,
        CacheType::UrlSummary,
        CacheRequest::json(body),
        |req| async move {
            let urls = requested_urls(&req.body);
            tracing::info!("Summarizing {} URL(s) via ML service", urls.len());
            let result = state
                .ml
                .post_json("summarize_from_urls", &req.body, TimeoutTier::Extended)
                .await;
            proxy_reply(&state.ml, "get summary from ML service", result, |failure| {
                fallback::url_summary(failure, state.ml.base_url(), &urls)
            })
        },
    )
    .await
}

/// POST /summarize (multipart upload with a `file` field)
///
/// The uploaded bytes are the only content source. Other form fields are kept
/// only when they are key options, so a `text` or `content` field can never
/// stand in for the file when the cache key is derived.
pub async fn summarize(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<HandlerReply, ApiError> {
    let mut file = None;
    let mut fields = Map::new();

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        if name == "file" {
            let filename = field.file_name().unwrap_or("upload").to_string();
            let content_type = field.content_type().map(str::to_string);
            let bytes = field.bytes().await?;
            file = Some(UploadedFile {
                filename,
                content_type,
                bytes,
            });
        } else if KEY_OPTIONS.contains(&name.as_str()) {
            let text = field.text().await?;
            fields.insert(name, Value::String(text));
        } else {
            tracing::debug!("Ignoring form field '{}' on file upload", name);
        }
    }

    let file = file.ok_or_else(|| ApiError::BadRequest("No file uploaded".to_string()))?;
    tracing::info!("Summarizing uploaded file {} ({} bytes)", file.filename, file.size());

    let cache = state.cache.clone();
    let request = CacheRequest::upload(file.clone(), Value::Object(fields));
    let reply = serve_cached(&cache, CacheType::BasicSummary, request, |_| async move {
        let result = state
            .ml
            .post_file("summarize", &file, TimeoutTier::Document)
            .await;
        proxy_reply(&state.ml, "get summary from ML service", result, |failure| {
            fallback::file_summary(failure, state.ml.base_url(), &file)
        })
    })
    .await;
    Ok(reply)
}

/// POST /advanced_summarize
pub async fn advanced_summarize(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> HandlerReply {
    let cache = state.cache.clone();
    serve_cached(
        &cache,
        CacheType::AdvancedSummary,
        CacheRequest::json(body),
        |req| async move {
            let result = state
                .ml
                .post_json("advanced_summarize", &req.body, TimeoutTier::Extended)
                .await;
            proxy_reply(
                &state.ml,
                "get advanced summary from ML service",
                result,
                |failure| fallback::generic(failure, state.ml.base_url(), "advanced_summarize"),
            )
        },
    )
    .await
}

/// POST /summarize_category
pub async fn summarize_category(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> HandlerReply {
    let category = category_of(&body);
    let cache = state.cache.clone();
    let reply = serve_cached(
        &cache,
        CacheType::CategorySummary,
        CacheRequest::json(body),
        |req| async move {
            let result = state
                .ml
                .post_json("summarize_category", &req.body, TimeoutTier::Extended)
                .await;
            proxy_reply(
                &state.ml,
                "summarize category",
                result,
                |failure| fallback::generic(failure, state.ml.base_url(), "summarize_category"),
            )
        },
    )
    .await;
    with_request_context(reply, category.as_deref())
}

/// POST /advanced_summarize_with_sections
///
/// Checks upstream health first and answers with a demo section analysis when
/// the service is down and demo payloads are allowed.
pub async fn advanced_summarize_with_sections(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> HandlerReply {
    let allows_fallback = state.ml.environment().allows_fallback();
    if allows_fallback && state.ml.probe("health", TimeoutTier::Quick).await.is_err() {
        tracing::warn!("ML service unhealthy, serving demo section analysis");
        metrics::counter!("casecrux_demo_responses_total", "action" => "summarize with sections")
            .increment(1);
        return HandlerReply::uncached(fallback::section_summary());
    }

    let result = state
        .ml
        .post_json("advanced_summarize_with_sections", &body, TimeoutTier::Extended)
        .await;
    proxy_reply(&state.ml, "summarize with sections", result, |_| {
        fallback::section_summary()
    })
}

/// POST /compare_summaries
pub async fn compare_summaries(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> HandlerReply {
    let result = state
        .ml
        .post_json("compare_summaries", &body, TimeoutTier::Extended)
        .await;
    relay_reply(&state.ml, "get summary comparison from ML service", result)
}

/// GET /summary_options
pub async fn summary_options(State(state): State<AppState>) -> HandlerReply {
    let result = state.ml.get_json("summary_options", TimeoutTier::Quick).await;
    relay_reply(&state.ml, "get summary options from ML service", result)
}

/// POST /batch_advanced_summarize
pub async fn batch_advanced_summarize(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> HandlerReply {
    let result = state
        .ml
        .post_json("batch_advanced_summarize", &body, TimeoutTier::Heavy)
        .await;
    relay_reply(&state.ml, "get batch advanced summary from ML service", result)
}

async fn category_passthrough(
    state: &AppState,
    path: &str,
    action: &str,
    tier: TimeoutTier,
    body: Value,
) -> HandlerReply {
    let category = category_of(&body);
    let result = state.ml.post_json(path, &body, tier).await;
    with_request_context(relay_reply(&state.ml, action, result), category.as_deref())
}

/// POST /summarize_category_overall
pub async fn summarize_category_overall(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> HandlerReply {
    category_passthrough(
        &state,
        "summarize_category_overall",
        "summarize category overall",
        TimeoutTier::Heavy,
        body,
    )
    .await
}

/// POST /list_pdfs_in_category
pub async fn list_pdfs_in_category(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> HandlerReply {
    category_passthrough(
        &state,
        "list_pdfs_in_category",
        "list PDFs in category",
        TimeoutTier::Quick,
        body,
    )
    .await
}

/// POST /summarize_category_download
pub async fn summarize_category_download(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> HandlerReply {
    category_passthrough(
        &state,
        "summarize_category_download",
        "summarize category download",
        TimeoutTier::Heavy,
        body,
    )
    .await
}

fn probe_outcome(result: Result<u16, UpstreamFailure>) -> (bool, Value) {
    match result {
        Ok(status) => (true, json!({"status": "pass", "response_status": status})),
        Err(failure) => (
            false,
            json!({
                "status": "fail",
                "error": failure.message,
                "error_type": failure.kind.as_str(),
                "response_status": failure.status,
                "response_data": failure.details,
            }),
        ),
    }
}

/// GET /health: probe the ML service and grade the result
pub async fn health(State(state): State<AppState>) -> Json<Value> {
    let start = Instant::now();
    let ml = &state.ml;

    let docs = ml.probe("docs", TimeoutTier::Quick).await;
    let root = ml.probe("", TimeoutTier::Quick).await;
    let summarize = ml
        .post_json(
            "summarize_from_urls",
            &json!({ "urls": [HEALTH_CHECK_URL] }),
            TimeoutTier::Quick,
        )
        .await
        .map(|_| 200);

    let mut tests = Map::new();
    let mut passed = 0;
    for (name, result) in [
        ("docs", docs),
        ("root", root),
        ("summarize_from_urls", summarize),
    ] {
        let (ok, report) = probe_outcome(result);
        if ok {
            passed += 1;
        }
        tests.insert(name.to_string(), report);
    }
    let total = tests.len();

    let overall_status = if passed == total {
        "healthy"
    } else if passed > 0 {
        "partial"
    } else {
        "unhealthy"
    };
    tracing::info!("ML service health: {} ({}/{})", overall_status, passed, total);

    Json(json!({
        "ml_service_url": ml.base_url(),
        "timestamp": timestamp(),
        "tests": tests,
        "overall_status": overall_status,
        "tests_passed": passed,
        "tests_total": total,
        "duration_ms": start.elapsed().as_millis() as u64,
    }))
}

const ENDPOINTS: [&str; 16] = [
    "/api/ml/health",
    "/api/ml/diagnostics",
    "/api/ml/summarize_from_urls",
    "/api/ml/summarize",
    "/api/ml/advanced_summarize",
    "/api/ml/advanced_summarize_with_sections",
    "/api/ml/compare_summaries",
    "/api/ml/summary_options",
    "/api/ml/batch_advanced_summarize",
    "/api/ml/summarize_category",
    "/api/ml/summarize_category_overall",
    "/api/ml/list_pdfs_in_category",
    "/api/ml/summarize_category_download",
    "/api/ml/cache/stats",
    "/api/ml/cache/clear",
    "/metrics",
];

/// GET /diagnostics: static view of how this gateway is configured
pub async fn diagnostics(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "timestamp": timestamp(),
        "environment": state.ml.environment().as_str(),
        "ml_service_config": {
            "url": state.ml.base_url(),
            "url_source": state.ml.url_source(),
            "reachable": Value::Null,
        },
        "server_config": {
            "bind_addr": state.server.bind_addr,
            "cors_enabled": state.server.cors.enabled,
            "max_body_size": state.server.max_body_size,
            "cache_available": state.cache.is_available(),
        },
        "endpoints_available": ENDPOINTS,
    }))
}
