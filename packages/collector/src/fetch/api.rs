//! API fetch strategy for JSON endpoints.
//!
//! Same transport as the static strategy plus JSON accept headers,
//! configured auth, and method/body support. Responses are parsed as
//! JSON; anything that fails to parse degrades to an HTML document so
//! extraction misses instead of the run failing.

use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{ConfigError, ConfigResult, FetchError, FetchResult};
use crate::types::config::{AuthConfig, FetcherConfig};
use crate::types::document::{Document, ResponseDocument};

use super::{classify_transport_error, DomainPolicy, FetchRequest, Fetcher};

const USER_AGENT: &str = concat!("oddsight-collector/", env!("CARGO_PKG_VERSION"));
const RETRY_BACKOFF: Duration = Duration::from_millis(500);

pub struct ApiFetcher {
    client: reqwest::Client,
    policy: DomainPolicy,
    auth: Option<AuthConfig>,
    last: Option<ResponseDocument>,
}

impl ApiFetcher {
    pub fn new(config: &FetcherConfig, policy: DomainPolicy) -> ConfigResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| ConfigError::Invalid(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            policy,
            auth: config.auth.clone(),
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
            .timeout(request.timeout)
            .header(reqwest::header::ACCEPT, "application/json");
        for (key, value) in &request.headers {
            builder = builder.header(key, value);
        }

        builder = match &self.auth {
            Some(AuthConfig::Basic { username, password }) => {
                builder.basic_auth(username, Some(password))
            }
            Some(AuthConfig::Bearer { token }) => builder.bearer_auth(token),
            Some(AuthConfig::ApiKey { header, key }) => builder.header(header, key),
            None => builder,
        };

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
        let text = response.text().await.map_err(|e| FetchError::Body {
            url: request.url.clone(),
            source: Box::new(e),
        })?;

        debug!(url = %final_url, status = status.as_u16(), bytes = text.len(), "fetched API response");
        Ok(ResponseDocument::new(final_url, Document::json_text(&text))
            .with_status(status.as_u16()))
    }
}

#[async_trait]
impl Fetcher for ApiFetcher {
    async fn fetch(&mut self, request: &FetchRequest) -> FetchResult<ResponseDocument> {
        let document = match self.execute(request).await {
            Ok(document) => document,
            Err(e) if e.is_retryable() => {
                warn!(url = %request.url, error = %e, "retrying API fetch");
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
        "api"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::config::FetcherKind;
    use crate::types::document::DocumentKind;
    use wiremock::matchers::{header, header_exists, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_json_body_parsed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(header("accept", "application/json"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"markets": []}"#))
            .mount(&server)
            .await;

        let config = FetcherConfig::new(FetcherKind::Api);
        let mut fetcher = ApiFetcher::new(&config, DomainPolicy::allow_all()).unwrap();
        let doc = fetcher.fetch(&FetchRequest::get(server.uri())).await.unwrap();
        assert_eq!(doc.document.kind(), DocumentKind::Json);
    }

    #[tokio::test]
    async fn test_bearer_auth_header_sent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(header("authorization", "Bearer sekrit"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
            .expect(1)
            .mount(&server)
            .await;

        let config = FetcherConfig::new(FetcherKind::Api).with_auth(AuthConfig::Bearer {
            token: "sekrit".into(),
        });
        let mut fetcher = ApiFetcher::new(&config, DomainPolicy::allow_all()).unwrap();
        fetcher.fetch(&FetchRequest::get(server.uri())).await.unwrap();
    }

    #[tokio::test]
    async fn test_api_key_header_sent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(header_exists("x-api-key"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
            .expect(1)
            .mount(&server)
            .await;

        let config = FetcherConfig::new(FetcherKind::Api).with_auth(AuthConfig::ApiKey {
            header: "X-Api-Key".into(),
            key: "k1".into(),
        });
        let mut fetcher = ApiFetcher::new(&config, DomainPolicy::allow_all()).unwrap();
        fetcher.fetch(&FetchRequest::get(server.uri())).await.unwrap();
    }

    #[tokio::test]
    async fn test_non_json_degrades_to_html_document() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let config = FetcherConfig::new(FetcherKind::Api);
        let mut fetcher = ApiFetcher::new(&config, DomainPolicy::allow_all()).unwrap();
        let doc = fetcher.fetch(&FetchRequest::get(server.uri())).await.unwrap();
        assert_eq!(doc.document.kind(), DocumentKind::Html);
    }
}
