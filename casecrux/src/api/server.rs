use crate::cache::ResponseCache;
use crate::config::ServerConfig;
use crate::upstream::MlClient;
use crate::Result;
use axum::{
    extract::DefaultBodyLimit,
    http::{HeaderValue, Method},
    routing::{delete, get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use super::{cache_admin, ml};

#[derive(Clone)]
pub struct AppState {
    pub cache: Arc<ResponseCache>,
    pub ml: Arc<MlClient>,
    pub server: Arc<ServerConfig>,
}

pub struct ApiServer {
    state: AppState,
    metrics: Option<PrometheusHandle>,
}

impl ApiServer {
    pub fn new(server: ServerConfig, cache: ResponseCache, ml: MlClient) -> Self {
        Self {
            state: AppState {
                cache: Arc::new(cache),
                ml: Arc::new(ml),
                server: Arc::new(server),
            },
            metrics: None,
        }
    }

    /// Expose the given recorder at GET /metrics
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Build CORS layer from configuration
    fn build_cors_layer(&self) -> CorsLayer {
        let cors_config = &self.state.server.cors;
        if !cors_config.enabled {
            return CorsLayer::new();
        }

        let origins: Vec<HeaderValue> = cors_config
            .origins
            .iter()
            .filter(|o| *o != "*")
            .filter_map(|o| o.parse().ok())
            .collect();

        let has_wildcard = cors_config.origins.iter().any(|o| o == "*");

        let cors = if has_wildcard {
            CorsLayer::new().allow_origin(tower_http::cors::Any)
        } else if origins.is_empty() {
            CorsLayer::new()
        } else {
            CorsLayer::new().allow_origin(origins)
        };

        cors.allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
            .allow_headers(tower_http::cors::Any)
    }

    pub fn router(&self) -> Router {
        let ml_routes = Router::new()
            .route("/summarize", post(ml::summarize))
            .route("/summarize_from_urls", post(ml::summarize_from_urls))
            .route("/advanced_summarize", post(ml::advanced_summarize))
            .route(
                "/advanced_summarize_with_sections",
                post(ml::advanced_summarize_with_sections),
            )
            .route("/compare_summaries", post(ml::compare_summaries))
            .route("/summary_options", get(ml::summary_options))
            .route("/batch_advanced_summarize", post(ml::batch_advanced_summarize))
            .route("/summarize_category", post(ml::summarize_category))
            .route(
                "/summarize_category_overall",
                post(ml::summarize_category_overall),
            )
            .route("/list_pdfs_in_category", post(ml::list_pdfs_in_category))
            .route(
                "/summarize_category_download",
                post(ml::summarize_category_download),
            )
            .route("/health", get(ml::health))
            .route("/diagnostics", get(ml::diagnostics))
            .route("/cache/stats", get(cache_admin::stats))
            .route("/cache/clear", delete(cache_admin::clear));

        let mut router = Router::new()
            .route("/", get(|| async { "CaseCrux API Running" }))
            .route("/healthz", get(|| async { "ok" }))
            .nest("/api/ml", ml_routes)
            .with_state(self.state.clone());

        if let Some(handle) = self.metrics.clone() {
            router = router.route(
                "/metrics",
                get(move || std::future::ready(handle.render())),
            );
        }

        router
            .layer(DefaultBodyLimit::max(self.state.server.max_body_size))
            .layer(self.build_cors_layer())
            .layer(TraceLayer::new_for_http())
    }

    pub async fn serve(self, addr: &str) -> Result<()> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!("Server listening on {}", addr);

        axum::serve(listener, self.router())
            .await
            .map_err(|e| crate::Error::Server(e.to_string()))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CorsConfig;
    use crate::upstream::UpstreamConfig;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn server(cors: CorsConfig) -> ApiServer {
        let config = ServerConfig {
            cors,
            ..ServerConfig::default()
        };
        let ml = MlClient::new(&UpstreamConfig::default()).unwrap();
        ApiServer::new(config, ResponseCache::memory(), ml)
    }

    async fn body_text(response: axum::response::Response) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_root_and_liveness() {
        let app = server(CorsConfig::default()).router();

        let response = app
            .clone()
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "CaseCrux API Running");

        let response = app
            .oneshot(Request::get("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_metrics_route_only_when_enabled() {
        let app = server(CorsConfig::default()).router();
        let response = app
            .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_cors_allows_configured_origin() {
        let app = server(CorsConfig {
            enabled: true,
            origins: vec!["http://localhost:3000".to_string()],
        })
        .router();

        let response = app
            .oneshot(
                Request::get("/healthz")
                    .header("Origin", "http://localhost:3000")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(
            response.headers().get("access-control-allow-origin").unwrap(),
            "http://localhost:3000"
        );
    }

    #[tokio::test]
    async fn test_clear_on_empty_cache() {
        let app = server(CorsConfig::default()).router();
        let response = app
            .oneshot(
                Request::delete("/api/ml/cache/clear?pattern=casecrux:v1:chunk:*")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body: serde_json::Value =
            serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(body["pattern"], "casecrux:v1:chunk:*");
        assert_eq!(body["keysCleared"], 0);
    }
}
