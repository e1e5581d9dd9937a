//! HTTP client for the ML summarization service

use std::time::{Duration, Instant};

use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder};
use serde_json::Value;

use super::error::UpstreamFailure;
use super::{Environment, TimeoutConfig, TimeoutTier, UpstreamConfig, UrlSource};
use crate::cache::middleware::UploadedFile;

/// ML service client. Every call carries an explicit timeout.
pub struct MlClient {
    client: Client,
    base_url: String,
    environment: Environment,
    timeouts: TimeoutConfig,
    url_source: UrlSource,
}

impl MlClient {
    pub fn new(config: &UpstreamConfig) -> crate::Result<Self> {
        let client = Client::builder().user_agent(&config.user_agent).build()?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            environment: config.environment,
            timeouts: config.timeouts.clone(),
            url_source: config.url_source,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn environment(&self) -> Environment {
        self.environment
    }

    pub fn url_source(&self) -> UrlSource {
        self.url_source
    }

    pub fn timeout(&self, tier: TimeoutTier) -> Duration {
        self.timeouts.for_tier(tier)
    }

    pub fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// POST a JSON body
    pub async fn post_json(
        &self,
        path: &str,
        body: &Value,
        tier: TimeoutTier,
    ) -> Result<Value, UpstreamFailure> {
        let url = self.endpoint(path);
        let request = self
            .client
            .post(&url)
            .header("Accept", "application/json")
            .json(body)
            .timeout(self.timeout(tier));
        self.execute(&url, request).await
    }

    /// POST a single file as multipart field `file`
    pub async fn post_file(
        &self,
        path: &str,
        file: &UploadedFile,
        tier: TimeoutTier,
    ) -> Result<Value, UpstreamFailure> {
        let url = self.endpoint(path);

        let part = Part::bytes(file.bytes.to_vec()).file_name(file.filename.clone());
        let part = match &file.content_type {
            Some(mime) => match part.mime_str(mime) {
                Ok(part) => part,
                Err(e) => {
                    tracing::warn!("Ignoring invalid content type '{}': {}", mime, e);
                    Part::bytes(file.bytes.to_vec()).file_name(file.filename.clone())
                }
            },
            None => part,
        };
        let form = Form::new().part("file", part);

        let request = self
            .client
            .post(&url)
            .multipart(form)
            .timeout(self.timeout(tier));
        self.execute(&url, request).await
    }

    /// GET a JSON document
    pub async fn get_json(&self, path: &str, tier: TimeoutTier) -> Result<Value, UpstreamFailure> {
        let url = self.endpoint(path);
        let request = self.client.get(&url).timeout(self.timeout(tier));
        self.execute(&url, request).await
    }

    /// GET any document and report only the status; used by health probes
    pub async fn probe(&self, path: &str, tier: TimeoutTier) -> Result<u16, UpstreamFailure> {
        let url = self.endpoint(path);
        let start = Instant::now();

        let response = self
            .client
            .get(&url)
            .timeout(self.timeout(tier))
            .send()
            .await
            .map_err(|e| self.failed(UpstreamFailure::from_reqwest(&e, &url, start.elapsed())))?;

        let status = response.status().as_u16();
        if response.status().is_success() {
            Ok(status)
        } else {
            let body = read_body(response).await;
            Err(self.failed(UpstreamFailure::from_response(status, body, &url, start.elapsed())))
        }
    }

    async fn execute(&self, url: &str, request: RequestBuilder) -> Result<Value, UpstreamFailure> {
        let start = Instant::now();

        let response = request
            .send()
            .await
            .map_err(|e| self.failed(UpstreamFailure::from_reqwest(&e, url, start.elapsed())))?;

        let status = response.status();
        if !status.is_success() {
            let body = read_body(response).await;
            return Err(self.failed(UpstreamFailure::from_response(
                status.as_u16(),
                body,
                url,
                start.elapsed(),
            )));
        }

        let value = response
            .json::<Value>()
            .await
            .map_err(|e| self.failed(UpstreamFailure::from_reqwest(&e, url, start.elapsed())))?;

        tracing::debug!("ML service {} answered in {:?}", url, start.elapsed());
        Ok(value)
    }

    fn failed(&self, failure: UpstreamFailure) -> UpstreamFailure {
        metrics::counter!("casecrux_upstream_failures_total", "kind" => failure.kind.as_str())
            .increment(1);
        tracing::error!(
            "ML service call to {} failed after {:?} ({}): {}",
            failure.url,
            failure.duration,
            failure.kind.as_str(),
            failure.message
        );
        failure
    }
}

/// Error bodies are usually JSON; fall back to the raw text.
async fn read_body(response: reqwest::Response) -> Value {
    let text = response.text().await.unwrap_or_default();
    serde_json::from_str(&text).unwrap_or(Value::String(text))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_joining() {
        let config = UpstreamConfig {
            url: "http://ml.local:8000/".to_string(),
            ..UpstreamConfig::default()
        };
        let client = MlClient::new(&config).unwrap();
        assert_eq!(client.base_url(), "http://ml.local:8000");
        assert_eq!(client.endpoint("/summarize"), "http://ml.local:8000/summarize");
        assert_eq!(client.endpoint("health"), "http://ml.local:8000/health");
    }
}
