//! Cache lookup before, and capture after, an expensive handler
//!
//! A request moves through `lookup` (derive key, query store), then on a miss
//! through the handler, then through `capture` (store cacheable reply, annotate
//! it). `serve_cached` strings the three together. Handlers never touch the
//! cache themselves; they only say whether their reply may be stored.

use std::future::Future;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use bytes::Bytes;
use chrono::{SecondsFormat, Utc};
use serde_json::{json, Value};

use super::adapter::ResponseCache;
use super::hasher::{content_hash, md5_hex};
use super::key::{CacheKey, CacheOptions, CacheType};

/// Body fields that change what the upstream produces, and so belong in the key
pub const KEY_OPTIONS: [&str; 4] = ["summary_type", "language", "max_length", "category"];

/// A file received in a multipart upload
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub filename: String,
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

impl UploadedFile {
    pub fn size(&self) -> usize {
        self.bytes.len()
    }
}

/// What the cache sees of an incoming request
#[derive(Debug, Clone, Default)]
pub struct CacheRequest {
    pub body: Value,
    pub file: Option<UploadedFile>,
}

impl CacheRequest {
    pub fn json(body: Value) -> Self {
        Self { body, file: None }
    }

    pub fn upload(file: UploadedFile, fields: Value) -> Self {
        Self {
            body: fields,
            file: Some(file),
        }
    }

    fn field(&self, name: &str) -> Option<&Value> {
        self.body.get(name)
    }
}

type Extractor = fn(&CacheRequest) -> Option<String>;

/// Content sources in priority order; the first that yields wins.
const CONTENT_EXTRACTORS: [(&str, Extractor); 6] = [
    ("text", text_field),
    ("urls", urls_field),
    ("content", content_field),
    ("file", uploaded_file),
    ("category", category_field),
    ("body", whole_body),
];

fn non_empty_str(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn text_field(req: &CacheRequest) -> Option<String> {
    non_empty_str(req.field("text"))
}

fn urls_field(req: &CacheRequest) -> Option<String> {
    let urls = req.field("urls")?.as_array()?;
    let mut urls: Vec<String> = urls
        .iter()
        .map(|u| match u {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
        .collect();
    if urls.is_empty() {
        return None;
    }
    urls.sort();
    Some(urls.join("|"))
}

fn content_field(req: &CacheRequest) -> Option<String> {
    non_empty_str(req.field("content"))
}

/// Uploaded bytes are represented by their length and digest rather than a lossy
/// text decoding, so distinct binaries never collapse to the same content.
fn uploaded_file(req: &CacheRequest) -> Option<String> {
    let file = req.file.as_ref().filter(|f| !f.bytes.is_empty())?;
    Some(format!("file:{}:{}", file.size(), md5_hex(&file.bytes)))
}

fn category_field(req: &CacheRequest) -> Option<String> {
    non_empty_str(req.field("category"))
}

fn whole_body(req: &CacheRequest) -> Option<String> {
    match &req.body {
        Value::Object(map) if !map.is_empty() => serde_json::to_string(&req.body).ok(),
        _ => None,
    }
}

/// Pick the content to fingerprint, returning the source name alongside it
pub fn extract_content(req: &CacheRequest) -> Option<(&'static str, String)> {
    CONTENT_EXTRACTORS
        .iter()
        .find_map(|(source, extract)| extract(req).map(|content| (*source, content)))
}

/// Collect the key-relevant options present in the body.
///
/// Only truthy primitive values count; nulls, empty strings, `false` and `0` are skipped.
pub fn extract_options(req: &CacheRequest) -> CacheOptions {
    let mut options = CacheOptions::new();
    for name in KEY_OPTIONS {
        let Some(value) = req.field(name) else {
            continue;
        };
        let keep = match value {
            Value::String(s) => !s.is_empty(),
            Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
            Value::Bool(b) => *b,
            Value::Null | Value::Array(_) | Value::Object(_) => false,
        };
        if keep {
            options.insert(name.to_string(), value.clone());
        }
    }
    options
}

/// Derive the cache key for a request, or `None` when it should bypass the cache
pub fn derive_key(cache_type: &CacheType, req: &CacheRequest) -> Option<CacheKey> {
    let Some((source, content)) = extract_content(req) else {
        tracing::debug!("No content found for cache key generation");
        return None;
    };
    let options = extract_options(req);

    let hash = content_hash(&content, &options)?;
    let key = CacheKey::build(cache_type, &hash, &options);
    tracing::debug!("Generated cache key from {}: {}", source, key);
    Some(key)
}

/// Request-scoped state carried from lookup to capture
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheContext {
    pub key: CacheKey,
    pub cache_type: CacheType,
}

/// Outcome of the pre-handler lookup
#[derive(Debug)]
pub enum Lookup {
    /// Cached body, already annotated; respond and stop
    Hit(Value),
    /// Run the handler, then capture with this context
    Miss(CacheContext),
    /// Caching does not apply to this request
    Bypass,
}

/// Reply produced by a handler, with an explicit cacheability flag
#[derive(Debug, Clone)]
pub struct HandlerReply {
    pub status: StatusCode,
    pub body: Value,
    pub cacheable: bool,
}

impl HandlerReply {
    /// Successful upstream result; eligible for caching
    pub fn ok(body: Value) -> Self {
        Self {
            status: StatusCode::OK,
            body,
            cacheable: true,
        }
    }

    /// Successful reply that must not be stored (demo payloads, diagnostics)
    pub fn uncached(body: Value) -> Self {
        Self {
            status: StatusCode::OK,
            body,
            cacheable: false,
        }
    }

    pub fn error(status: StatusCode, body: Value) -> Self {
        Self {
            status,
            body,
            cacheable: false,
        }
    }

    fn is_storable(&self) -> bool {
        self.cacheable && self.status.is_success() && !has_error_field(&self.body)
    }
}

impl IntoResponse for HandlerReply {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

fn has_error_field(body: &Value) -> bool {
    match body.get("error") {
        None | Some(Value::Null) | Some(Value::Bool(false)) => false,
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
        Some(_) => true,
    }
}

pub(crate) fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn annotate(body: &mut Value, metadata: Value) {
    if let Value::Object(map) = body {
        map.insert("_cache".to_string(), metadata);
    }
}

/// Pre-handler step: derive the key and consult the store
pub async fn lookup(cache: &ResponseCache, cache_type: &CacheType, req: &CacheRequest) -> Lookup {
    let Some(key) = derive_key(cache_type, req) else {
        tracing::debug!("Could not generate cache key - proceeding without cache");
        return Lookup::Bypass;
    };

    match cache.get(key.as_str()).await {
        Some(mut cached) => {
            tracing::info!("Cache HIT for {} - returning cached result", cache_type);
            annotate(
                &mut cached,
                json!({
                    "hit": true,
                    "key": key.truncated(),
                    "timestamp": timestamp(),
                }),
            );
            Lookup::Hit(cached)
        }
        None => {
            tracing::info!("Cache MISS for {} - proceeding to ML service", cache_type);
            Lookup::Miss(CacheContext {
                key,
                cache_type: cache_type.clone(),
            })
        }
    }
}

/// Post-handler step: store a cacheable reply and annotate it.
///
/// The reply is always returned; a failed write only shows up in the logs.
pub async fn capture(
    cache: &ResponseCache,
    context: Option<&CacheContext>,
    mut reply: HandlerReply,
) -> HandlerReply {
    let Some(context) = context else {
        return reply;
    };
    if !reply.is_storable() {
        return reply;
    }

    let ttl = cache.ttl_policy().ttl_for(&context.cache_type);
    tracing::info!("Caching ML response for {}", context.cache_type);
    cache.set(context.key.as_str(), &reply.body, ttl).await;

    annotate(
        &mut reply.body,
        json!({
            "hit": false,
            "key": context.key.truncated(),
            "timestamp": timestamp(),
            "ttl": ttl,
        }),
    );
    reply
}

/// Run `handler` behind the cache: serve hits directly, store cacheable misses.
pub async fn serve_cached<F, Fut>(
    cache: &ResponseCache,
    cache_type: CacheType,
    req: CacheRequest,
    handler: F,
) -> HandlerReply
where
    F: FnOnce(CacheRequest) -> Fut,
    Fut: Future<Output = HandlerReply>,
{
    let context = match lookup(cache, &cache_type, &req).await {
        Lookup::Hit(body) => return HandlerReply::uncached(body),
        Lookup::Miss(context) => Some(context),
        Lookup::Bypass => None,
    };

    let reply = handler(req).await;
    capture(cache, context.as_ref(), reply).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn file(bytes: &'static [u8]) -> UploadedFile {
        UploadedFile {
            filename: "case.pdf".to_string(),
            content_type: Some("application/pdf".to_string()),
            bytes: Bytes::from_static(bytes),
        }
    }

    #[test]
    fn test_extractor_priority() {
        let req = CacheRequest::json(json!({"text": "t", "urls": ["u"], "content": "c"}));
        assert_eq!(extract_content(&req), Some(("text", "t".to_string())));

        let req = CacheRequest::json(json!({"urls": ["b", "a"], "content": "c"}));
        assert_eq!(extract_content(&req), Some(("urls", "a|b".to_string())));

        let req = CacheRequest::json(json!({"content": "c", "category": "tax"}));
        assert_eq!(extract_content(&req), Some(("content", "c".to_string())));

        let req = CacheRequest::upload(file(b"%PDF-1.4"), json!({"category": "tax"}));
        assert_eq!(extract_content(&req).map(|(s, _)| s), Some("file"));

        let req = CacheRequest::json(json!({"category": "tax"}));
        assert_eq!(extract_content(&req), Some(("category", "tax".to_string())));

        let req = CacheRequest::json(json!({"question": "why"}));
        assert_eq!(extract_content(&req).map(|(s, _)| s), Some("body"));
    }

    #[test]
    fn test_no_content_sources() {
        assert_eq!(extract_content(&CacheRequest::json(json!({}))), None);
        assert_eq!(extract_content(&CacheRequest::json(Value::Null)), None);
        assert_eq!(extract_content(&CacheRequest::json(json!("just a string"))), None);
        assert_eq!(
            extract_content(&CacheRequest::upload(file(b""), json!({}))),
            None
        );
    }

    #[test]
    fn test_empty_fields_fall_through() {
        let req = CacheRequest::json(json!({"text": "", "urls": [], "content": "c"}));
        assert_eq!(extract_content(&req), Some(("content", "c".to_string())));
    }

    #[test]
    fn test_distinct_files_have_distinct_content() {
        let a = CacheRequest::upload(file(b"\xff\xfe binary one"), Value::Null);
        let b = CacheRequest::upload(file(b"\xff\xfd binary one"), Value::Null);
        assert_ne!(extract_content(&a), extract_content(&b));
    }

    #[test]
    fn test_options_extraction() {
        let req = CacheRequest::json(json!({
            "text": "t",
            "summary_type": "concise",
            "language": "",
            "max_length": 300,
            "category": "tax",
            "document_id": "ignored",
        }));
        let options = extract_options(&req);
        assert_eq!(options.len(), 3);
        assert_eq!(options["summary_type"], json!("concise"));
        assert_eq!(options["max_length"], json!(300));
        assert_eq!(options["category"], json!("tax"));
        assert!(!options.contains_key("document_id"));
    }

    #[test]
    fn test_irrelevant_fields_do_not_fragment_keys() {
        let a = CacheRequest::json(json!({"text": "Hello", "request_id": 1}));
        let b = CacheRequest::json(json!({"text": "hello", "request_id": 2}));
        assert_eq!(
            derive_key(&CacheType::BasicSummary, &a),
            derive_key(&CacheType::BasicSummary, &b)
        );
    }

    #[test]
    fn test_error_field_detection() {
        assert!(has_error_field(&json!({"error": "boom"})));
        assert!(has_error_field(&json!({"error": {"code": 1}})));
        assert!(!has_error_field(&json!({"error": null})));
        assert!(!has_error_field(&json!({"error": ""})));
        assert!(!has_error_field(&json!({"summary": "ok"})));
    }

    #[tokio::test]
    async fn test_bypass_does_not_touch_store() {
        let cache = ResponseCache::memory();
        let lookup = lookup(&cache, &CacheType::BasicSummary, &CacheRequest::json(json!({}))).await;
        assert!(matches!(lookup, Lookup::Bypass));
        assert_eq!(cache.counters().hits() + cache.counters().misses(), 0);
    }

    #[tokio::test]
    async fn test_miss_then_hit() {
        let cache = ResponseCache::memory();
        let calls = AtomicUsize::new(0);
        let calls = &calls;
        let body = json!({"text": "Hello World", "summary_type": "concise"});

        for _ in 0..2 {
            let reply = serve_cached(
                &cache,
                CacheType::BasicSummary,
                CacheRequest::json(body.clone()),
                move |_| async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    HandlerReply::ok(json!({"summary": "A greeting."}))
                },
            )
            .await;
            assert_eq!(reply.body["summary"], "A greeting.");
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_capture_annotates_with_ttl() {
        let cache = ResponseCache::memory();
        let req = CacheRequest::json(json!({"text": "chunk of text"}));
        let Lookup::Miss(context) = lookup(&cache, &CacheType::Chunk, &req).await else {
            panic!("expected a miss");
        };

        let reply = capture(&cache, Some(&context), HandlerReply::ok(json!({"summary": "s"}))).await;
        assert_eq!(reply.body["_cache"]["hit"], false);
        assert_eq!(reply.body["_cache"]["ttl"], 604_800);

        // Stored value carries no metadata
        let stored = cache.get(context.key.as_str()).await.unwrap();
        assert_eq!(stored, json!({"summary": "s"}));
    }

    #[tokio::test]
    async fn test_uncacheable_replies_are_not_stored() {
        let cache = ResponseCache::memory();
        let req = CacheRequest::json(json!({"text": "x"}));

        for reply in [
            HandlerReply::uncached(json!({"demo_mode": true})),
            HandlerReply::ok(json!({"error": "upstream said no"})),
            HandlerReply::error(StatusCode::BAD_GATEWAY, json!({"detail": "bad"})),
        ] {
            let Lookup::Miss(context) = lookup(&cache, &CacheType::BasicSummary, &req).await else {
                panic!("expected a miss");
            };
            let out = capture(&cache, Some(&context), reply).await;
            assert!(out.body.get("_cache").is_none());
        }
        assert_eq!(cache.counters().writes(), 0);
    }

    #[tokio::test]
    async fn test_unavailable_store_still_serves() {
        let cache = ResponseCache::disabled();
        let reply = serve_cached(
            &cache,
            CacheType::UrlSummary,
            CacheRequest::json(json!({"urls": ["https://a"]})),
            |_| async { HandlerReply::ok(json!({"overall_summary": "ok"})) },
        )
        .await;
        assert_eq!(reply.status, StatusCode::OK);
        assert_eq!(reply.body["overall_summary"], "ok");
    }
}
