//! Fetch strategies - how documents get into the engine.
//!
//! Four strategies share one trait: `static` (plain HTTP), `api`
//! (JSON endpoints with auth), `browser` (rendered pages), and
//! `interactive` (a persistent browser session that supports page
//! actions). The orchestrator holds exactly one fetcher per run.

pub mod api;
pub mod browser;
#[cfg(feature = "browser")]
pub mod cdp;
pub mod driver;
pub mod policy;
pub mod static_http;

pub use api::ApiFetcher;
pub use browser::{BrowserFetcher, InteractiveFetcher};
pub use driver::{BoxedDriver, DriverFactory, DriverFuture, PageDriver};
pub use policy::DomainPolicy;
pub use static_http::StaticFetcher;

use async_trait::async_trait;
use indexmap::IndexMap;
use serde_json::Value;
use std::time::Duration;

use crate::error::{ConfigError, EngineError, EngineResult, FetchError, FetchResult};
use crate::types::config::{FetcherConfig, FetcherKind, ScrollDirection, SelectChoice};
use crate::types::document::ResponseDocument;

/// One outbound request, built from config plus a target URL.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub url: String,
    pub method: String,
    pub headers: IndexMap<String, String>,
    pub body: Option<Value>,
    pub timeout: Duration,
}

impl FetchRequest {
    /// A plain GET with the default timeout.
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: "GET".to_string(),
            headers: IndexMap::new(),
            body: None,
            timeout: Duration::from_secs(30),
        }
    }

    /// Build a request for a URL using the config's method, headers,
    /// body, and timeout.
    pub fn from_config(url: impl Into<String>, config: &FetcherConfig) -> Self {
        Self {
            url: url.into(),
            method: config.method.clone(),
            headers: config.headers.clone(),
            body: config.body.clone(),
            timeout: Duration::from_millis(config.timeout_ms),
        }
    }
}

/// A page interaction forwarded to the driver.
#[derive(Debug, Clone)]
pub enum PageAction {
    Click {
        selector: String,
        all_matching: bool,
    },
    Fill {
        selector: String,
        value: String,
        clear_first: bool,
    },
    SelectOption {
        selector: String,
        choice: SelectChoice,
    },
    Scroll {
        direction: ScrollDirection,
        amount: Option<u32>,
        selector: Option<String>,
    },
    WaitForSelector {
        selector: String,
        timeout: Duration,
    },
}

impl PageAction {
    pub fn describe(&self) -> String {
        match self {
            PageAction::Click { selector, .. } => format!("click {selector}"),
            PageAction::Fill { selector, .. } => format!("fill {selector}"),
            PageAction::SelectOption { selector, .. } => format!("select {selector}"),
            PageAction::Scroll { .. } => "scroll".to_string(),
            PageAction::WaitForSelector { selector, .. } => format!("wait for {selector}"),
        }
    }
}

/// A fetch strategy. Held exclusively by the orchestrator, hence
/// `&mut self` throughout: session strategies mutate page state.
#[async_trait]
pub trait Fetcher: Send {
    /// Fetch a URL and make it the current document.
    async fn fetch(&mut self, request: &FetchRequest) -> FetchResult<ResponseDocument>;

    /// The current document. Never touches the network for HTTP
    /// strategies; session strategies re-read the live page.
    async fn current_document(&mut self) -> FetchResult<ResponseDocument>;

    /// Perform a page action. Returns the number of elements
    /// affected; zero means the selector missed.
    async fn perform(&mut self, action: &PageAction) -> FetchResult<usize> {
        Err(FetchError::Unsupported {
            strategy: self.name().to_string(),
            action: action.describe(),
        })
    }

    /// Release any session resources. Must be called on every exit
    /// path; fetchers tolerate repeated calls.
    async fn close(&mut self) -> FetchResult<()> {
        Ok(())
    }

    fn name(&self) -> &'static str;
}

/// Classify a reqwest transport error into the fetch taxonomy.
pub(crate) fn classify_transport_error(e: reqwest::Error, url: &str) -> FetchError {
    if e.is_timeout() {
        FetchError::Timeout {
            url: url.to_string(),
        }
    } else {
        FetchError::Connect {
            url: url.to_string(),
            source: Box::new(e),
        }
    }
}

/// Build the fetcher a config asks for.
///
/// Browser-backed strategies need a driver factory; without one the
/// config is rejected before anything runs.
pub async fn build_fetcher(
    config: &FetcherConfig,
    policy: DomainPolicy,
    driver_factory: Option<&DriverFactory>,
) -> EngineResult<Box<dyn Fetcher>> {
    match config.kind {
        FetcherKind::Static => Ok(Box::new(StaticFetcher::new(config, policy)?)),
        FetcherKind::Api => Ok(Box::new(ApiFetcher::new(config, policy)?)),
        FetcherKind::Browser | FetcherKind::Interactive => {
            let factory = driver_factory.ok_or_else(|| {
                EngineError::Config(ConfigError::DriverRequired {
                    kind: config.kind.as_str().to_string(),
                })
            })?;
            let driver = factory(config).await.map_err(EngineError::Fetch)?;
            if config.kind == FetcherKind::Browser {
                Ok(Box::new(BrowserFetcher::new(driver, policy)))
            } else {
                Ok(Box::new(InteractiveFetcher::new(driver, policy)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_build_fetcher_requires_driver_for_browser() {
        let config = FetcherConfig::new(FetcherKind::Browser);
        let err = build_fetcher(&config, DomainPolicy::allow_all(), None)
            .await
            .err()
            .map(|e| e.to_string())
            .unwrap_or_default();
        assert!(err.contains("requires a page driver"), "got: {err}");
    }

    #[test]
    fn test_request_from_config() {
        let config = FetcherConfig::new(FetcherKind::Api)
            .with_timeout_ms(5_000)
            .with_header("X-Client", "collector");
        let request = FetchRequest::from_config("https://example.com/api", &config);
        assert_eq!(request.timeout, Duration::from_millis(5_000));
        assert_eq!(request.headers["X-Client"], "collector");
    }
}
