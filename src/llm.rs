//! HTTP client for the local inference server.
//!
//! [`LlmClient`] resolves the endpoint URL for an [`ApiType`], builds the
//! payload through the configured [`ModelRouter`], and posts it through a
//! [`Transport`]. The default transport is [`HttpTransport`] over
//! `reqwest`; tests and alternative back-ends can plug in their own.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::config::Config;
use crate::parse::ParseError;
use crate::request::{build_request, ApiType, ResponseFormat};
use crate::router::{ModelRouter, StaticRouter};

/// Why a single request produced no result.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ChunkFailure {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("HTTP {status} from {url}: {snippet}")]
    HttpStatus {
        status: u16,
        url: String,
        snippet: String,
    },
    #[error("failed to decode response: {0}")]
    Decode(String),
    #[error("failed to parse model output: {0}")]
    Parse(#[from] ParseError),
    #[error("cancelled before dispatch")]
    Cancelled,
    #[error("worker panicked: {0}")]
    Panicked(String),
}

/// Posts a JSON body and returns the decoded JSON response.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn post_json(&self, url: &str, body: &Value) -> Result<Value, ChunkFailure>;
}

/// [`Transport`] backed by a shared `reqwest::Client`.
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Without a timeout the client's defaults apply.
    pub fn new(timeout: Option<Duration>) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(t) = timeout {
            builder = builder.timeout(t);
        }
        Ok(Self {
            client: builder.build()?,
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn post_json(&self, url: &str, body: &Value) -> Result<Value, ChunkFailure> {
        debug!("POST {}", url);
        let response = self
            .client
            .post(url)
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| ChunkFailure::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ChunkFailure::HttpStatus {
                status: status.as_u16(),
                url: url.to_string(),
                snippet: text.chars().take(240).collect(),
            });
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| ChunkFailure::Decode(e.to_string()))
    }
}

/// Client for the three inference endpoints.
pub struct LlmClient {
    base_url: String,
    router: Arc<dyn ModelRouter>,
    transport: Arc<dyn Transport>,
}

impl LlmClient {
    pub fn new(
        base_url: &str,
        router: Arc<dyn ModelRouter>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            base_url: base_url.trim().trim_end_matches('/').to_string(),
            router,
            transport,
        }
    }

    /// HTTP client with the static router from `[llm]`.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let transport = HttpTransport::new(config.llm.timeout_secs.map(Duration::from_secs))?;
        Ok(Self::new(
            &config.llm.base_url,
            Arc::new(StaticRouter::from_config(config)),
            Arc::new(transport),
        ))
    }

    pub fn endpoint(&self, api_type: ApiType) -> String {
        format!("{}{}", self.base_url, api_type.path())
    }

    pub fn router(&self) -> &dyn ModelRouter {
        self.router.as_ref()
    }

    /// Build and send one request.
    pub async fn send(
        &self,
        instruction: &str,
        chunk: &str,
        api_type: ApiType,
        format: ResponseFormat,
    ) -> Result<Value, ChunkFailure> {
        let body = build_request(self.router(), instruction, chunk, api_type, format);
        self.post(api_type, &body).await
    }

    /// Send a prebuilt body to the endpoint for `api_type`.
    pub async fn post(&self, api_type: ApiType, body: &Value) -> Result<Value, ChunkFailure> {
        self.transport.post_json(&self.endpoint(api_type), body).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoints_join_base_url() {
        let client = LlmClient::new(
            "http://localhost:11434/",
            Arc::new(StaticRouter::new("m")),
            Arc::new(HttpTransport::new(None).unwrap()),
        );
        assert_eq!(
            client.endpoint(ApiType::Chat),
            "http://localhost:11434/api/chat"
        );
        assert_eq!(
            client.endpoint(ApiType::Embeddings),
            "http://localhost:11434/api/embeddings"
        );
    }
}
