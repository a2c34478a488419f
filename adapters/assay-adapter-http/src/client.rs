//! HTTP client for the agent service.

use std::time::Duration;

use assay_agent::{AgentError, AgentResult, AnalysisOutput, AnalysisRequest, Analyzer};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, instrument};

/// Connection settings for [`HttpAnalyzer`].
#[derive(Clone)]
pub struct HttpAnalyzerConfig {
    /// Service base URL (without trailing slash).
    pub base_url: String,
    /// Optional bearer token.
    pub token: Option<String>,
    /// Whole-request timeout. `None` leaves long analyses unbounded.
    pub request_timeout: Option<Duration>,
    /// TCP connect timeout.
    pub connect_timeout: Duration,
}

impl HttpAnalyzerConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: None,
            request_timeout: None,
            connect_timeout: Duration::from_secs(10),
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }
}

impl std::fmt::Debug for HttpAnalyzerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpAnalyzerConfig")
            .field("base_url", &self.base_url)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("request_timeout", &self.request_timeout)
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct AnalyzeResponse {
    text: String,
}

/// Analyzer backed by a remote agent service.
#[derive(Debug)]
pub struct HttpAnalyzer {
    client: Client,
    config: HttpAnalyzerConfig,
}

impl HttpAnalyzer {
    /// Build a client from the given configuration.
    pub fn new(config: HttpAnalyzerConfig) -> AgentResult<Self> {
        if config.base_url.is_empty() {
            return Err(AgentError::Configuration(
                "agent service URL is empty".to_string(),
            ));
        }

        let mut builder = Client::builder().connect_timeout(config.connect_timeout);
        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build()?;

        Ok(Self { client, config })
    }

    fn endpoint(&self) -> String {
        format!("{}/analyze", self.config.base_url)
    }
}

#[async_trait]
impl Analyzer for HttpAnalyzer {
    fn name(&self) -> &str {
        "agent-http"
    }

    #[instrument(skip(self, request))]
    async fn analyze(&self, request: &AnalysisRequest) -> AgentResult<AnalysisOutput> {
        let url = self.endpoint();
        debug!("POST {}", url);

        let mut req = self.client.post(&url).json(request);
        if let Some(token) = &self.config.token {
            req = req.bearer_auth(token);
        }

        let resp = req.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(AgentError::Service {
                status: status.as_u16(),
                message,
            });
        }

        let body = resp.bytes().await?;
        let parsed: AnalyzeResponse = serde_json::from_slice(&body)?;
        Ok(AnalysisOutput::new(parsed.text))
    }
}
