//! Static HTTP fetch strategy.
//!
//! Fetches server-rendered markup with reqwest. No session state
//! beyond the last fetched document; navigation is just another
//! fetch. Retryable failures (timeouts, connect errors, 5xx, 429)
//! get one retry after a short backoff.

use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{ConfigError, ConfigResult, FetchError, FetchResult};
use crate::types::config::FetcherConfig;
use crate::types::document::{Document, ResponseDocument};

use super::{classify_transport_error, DomainPolicy, FetchRequest, Fetcher};

const USER_AGENT: &str = concat!("oddsight-collector/", env!("CARGO_PKG_VERSION"));
const RETRY_BACKOFF: Duration = Duration::from_millis(500);

pub struct StaticFetcher {
    client: reqwest::Client,
    policy: DomainPolicy,
    last: Option<ResponseDocument>,
}

impl StaticFetcher {
    pub fn new(config: &FetcherConfig, policy: DomainPolicy) -> ConfigResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| ConfigError::Invalid(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            policy,
            last: None,
        })
    }

    async fn execute(&self, request: &FetchRequest) -> FetchResult<ResponseDocument> {
        self.policy.check(&request.url)?;

        let method = reqwest::Method::from_bytes(request.method.as_bytes())
            .unwrap_or(reqwest::Method::GET);

        let mut builder = self
            .client
            .request(method, &request.url)
            .timeout(request.timeout);
        for (key, value) in &request.headers {
            builder = builder.header(key, value);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| classify_transport_error(e, &request.url))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                url: request.url.clone(),
            });
        }

        let final_url = response.url().to_string();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        let text = response.text().await.map_err(|e| FetchError::Body {
            url: request.url.clone(),
            source: Box::new(e),
        })?;

        let document = if content_type.contains("json") {
            Document::json_text(&text)
        } else {
            Document::html(text)
        };

        debug!(url = %final_url, status = status.as_u16(), "fetched document");
        Ok(ResponseDocument::new(final_url, document)
            .with_status(status.as_u16())
            .with_header("content-type", content_type))
    }
}

#[async_trait]
impl Fetcher for StaticFetcher {
    async fn fetch(&mut self, request: &FetchRequest) -> FetchResult<ResponseDocument> {
        let document = match self.execute(request).await {
            Ok(document) => document,
            Err(e) if e.is_retryable() => {
                warn!(url = %request.url, error = %e, "retrying fetch");
                tokio::time::sleep(RETRY_BACKOFF).await;
                self.execute(request).await?
            }
            Err(e) => return Err(e),
        };

        self.last = Some(document.clone());
        Ok(document)
    }

    async fn current_document(&mut self) -> FetchResult<ResponseDocument> {
        self.last.clone().ok_or(FetchError::NoDocument)
    }

    fn name(&self) -> &'static str {
        "static"
    }
}
