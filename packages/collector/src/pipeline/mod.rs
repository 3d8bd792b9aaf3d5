//! Run orchestration - the core of the library.
//!
//! A [`Pipeline`] takes a validated [`ScrapeConfig`] end to end:
//! - Validate against the processor registry
//! - Build the domain policy and the configured fetcher
//! - Fetch the start URL
//! - Walk the instruction tree
//! - Close the fetcher on every exit path
//! - Classify the outcome from records and the failure manifest

use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

use crate::engine::{ExecutionContext, Executor};
use crate::error::{EngineError, EngineResult};
use crate::fetch::{build_fetcher, DomainPolicy, DriverFactory, FetchRequest, Fetcher};
use crate::process::Registry;
use crate::types::config::ScrapeConfig;
use crate::types::record::{FailureKind, RunFailure, ScrapeOutcome};

const DEFAULT_RUN_DEADLINE: Duration = Duration::from_secs(600);

/// Executes scrape configs and produces outcomes.
///
/// One pipeline can run many configs; each run builds its own fetcher
/// session. Browser-backed configs need a driver factory plugged in.
pub struct Pipeline {
    registry: Arc<Registry>,
    driver_factory: Option<DriverFactory>,
    run_deadline: Duration,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl Pipeline {
    pub fn new() -> Self {
        Self {
            registry: Arc::new(Registry::with_builtins()),
            driver_factory: None,
            run_deadline: DEFAULT_RUN_DEADLINE,
        }
    }

    /// Use a custom processor registry instead of the builtins.
    pub fn with_registry(mut self, registry: Arc<Registry>) -> Self {
        self.registry = registry;
        self
    }

    /// Plug in a page driver factory for browser-backed configs.
    pub fn with_driver_factory(mut self, factory: DriverFactory) -> Self {
        self.driver_factory = Some(factory);
        self
    }

    /// Cap the total wall-clock time of a run.
    pub fn with_run_deadline(mut self, deadline: Duration) -> Self {
        self.run_deadline = deadline;
        self
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Run a config to completion.
    ///
    /// Config problems return `Err` before anything is fetched.
    /// Runtime failures never return `Err`: they are recorded in the
    /// outcome's failure manifest, and a run that aborts mid-walk
    /// still carries the records collected up to that point.
    pub async fn run(&self, config: &ScrapeConfig) -> EngineResult<ScrapeOutcome> {
        let run_id = Uuid::new_v4();
        let started_at = chrono::Utc::now();
        info!(
            run_id = %run_id,
            config = %config.meta.name,
            fetcher = config.fetcher.kind.as_str(),
            "starting run"
        );

        config.validate(&self.registry).into_result()?;

        let policy = DomainPolicy::new(config.meta.allowed_domains.clone());
        let mut fetcher =
            build_fetcher(&config.fetcher, policy, self.driver_factory.as_ref()).await?;

        let (records, failures, aborted) = self.walk(config, fetcher.as_mut()).await;

        if let Err(e) = fetcher.close().await {
            warn!(error = %e, "fetcher close failed");
        }

        let status = ScrapeOutcome::classify(&records, &failures, aborted);
        let finished_at = chrono::Utc::now();
        let outcome = ScrapeOutcome {
            run_id,
            config_name: config.meta.name.clone(),
            status,
            records,
            failures,
            started_at,
            finished_at,
        };

        info!(
            run_id = %run_id,
            status = ?outcome.status,
            records = outcome.record_count(),
            failures = outcome.failures.len(),
            duration_ms = outcome.duration_ms(),
            "run finished"
        );
        Ok(outcome)
    }

    /// Fetch the start URL and walk the instruction tree.
    ///
    /// Returns whatever was collected plus whether the walk aborted.
    async fn walk(
        &self,
        config: &ScrapeConfig,
        fetcher: &mut dyn Fetcher,
    ) -> (Vec<crate::types::record::ScrapedRecord>, Vec<RunFailure>, bool) {
        let request = FetchRequest::from_config(&config.meta.start_url, &config.fetcher);
        let document = match fetcher.fetch(&request).await {
            Ok(document) => document,
            Err(e) => {
                warn!(url = %config.meta.start_url, error = %e, "start URL fetch failed");
                let failure = RunFailure::new(
                    "meta.start_url",
                    start_failure_kind(&e),
                    e.to_string(),
                );
                return (Vec::new(), vec![failure], true);
            }
        };

        let mut ctx = ExecutionContext::new(document, self.run_deadline);
        let executor = Executor::new(config, &self.registry);
        let result = executor
            .run_all(
                &config.instructions,
                "instructions".to_string(),
                &mut ctx,
                fetcher,
            )
            .await;

        let aborted = match result {
            Ok(()) => false,
            Err(e) => {
                warn!(error = %e, "run aborted");
                let kind = match &e {
                    EngineError::DeadlineExceeded { .. } => FailureKind::Timeout,
                    EngineError::Fetch(_) => FailureKind::Fetch,
                    EngineError::Config(_) => FailureKind::Unsupported,
                };
                ctx.failures.push(RunFailure::new("run", kind, e.to_string()));
                true
            }
        };

        (ctx.records, ctx.failures, aborted)
    }
}

fn start_failure_kind(error: &crate::error::FetchError) -> FailureKind {
    match error {
        crate::error::FetchError::Policy(_) => FailureKind::Policy,
        crate::error::FetchError::Timeout { .. } => FailureKind::Timeout,
        _ => FailureKind::Fetch,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::config::{
        CollectSpec, FetcherConfig, FetcherKind, FieldMap, FieldSpec, Instruction, WaitCondition,
    };
    use crate::types::record::RunStatus;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn markets_config(start_url: &str) -> ScrapeConfig {
        let mut fields = FieldMap::new();
        fields.insert("market_id".into(), FieldSpec::new("$.id").required());
        fields.insert("question".into(), FieldSpec::new("$.question"));

        ScrapeConfig::new("markets-test", start_url)
            .with_fetcher(FetcherConfig::new(FetcherKind::Api))
            .with_instruction(Instruction::Collect(CollectSpec {
                name: "markets".into(),
                container_selector: "$".into(),
                item_selector: "$[*]".into(),
                fields,
                collection: None,
                limit: None,
            }))
    }

    #[tokio::test]
    async fn test_run_collects_from_api() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/markets"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"id": "m1", "question": "Will it rain?"},
                {"id": "m2", "question": "Will it snow?"},
            ])))
            .mount(&server)
            .await;

        let config = markets_config(&format!("{}/markets", server.uri()));
        let outcome = Pipeline::new().run(&config).await.unwrap();

        assert_eq!(outcome.status, RunStatus::Completed);
        assert_eq!(outcome.record_count(), 2);
        assert_eq!(outcome.config_name, "markets-test");
        assert_eq!(
            outcome.records[0].field_value("market_id"),
            Some(&json!("m1"))
        );
    }

    #[tokio::test]
    async fn test_invalid_config_rejected_before_fetching() {
        let server = MockServer::start().await;
        // No mocks mounted: any request would 404 and fail the test
        // assertion on status below.

        let mut config = markets_config(&format!("{}/markets", server.uri()));
        config.meta.name = String::new();

        let err = Pipeline::new().run(&config).await.unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unfetchable_start_url_fails_run() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/markets"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let config = markets_config(&format!("{}/markets", server.uri()));
        let outcome = Pipeline::new().run(&config).await.unwrap();

        assert_eq!(outcome.status, RunStatus::Failed);
        assert!(outcome.records.is_empty());
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].at, "meta.start_url");
    }

    #[tokio::test]
    async fn test_partial_run_keeps_records_and_failures() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/markets"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"id": "m1", "question": "ok"},
                {"question": "missing id"},
            ])))
            .mount(&server)
            .await;

        let config = markets_config(&format!("{}/markets", server.uri()));
        let outcome = Pipeline::new().run(&config).await.unwrap();

        assert_eq!(outcome.status, RunStatus::Partial);
        assert_eq!(outcome.record_count(), 1);
        assert_eq!(outcome.failures.len(), 1);
    }

    #[tokio::test]
    async fn test_run_deadline_truncates_fixed_wait() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/markets"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!([{"id": "m1", "question": "q"}])),
            )
            .mount(&server)
            .await;

        let mut config = markets_config(&format!("{}/markets", server.uri()));
        config.instructions.insert(
            0,
            Instruction::Wait {
                condition: WaitCondition::Timeout { value: 5_000 },
            },
        );

        let started = std::time::Instant::now();
        let outcome = Pipeline::new()
            .with_run_deadline(Duration::from_millis(100))
            .run(&config)
            .await
            .unwrap();

        // The fixed pause stops at the run deadline.
        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(outcome.status, RunStatus::Failed);
        assert!(outcome
            .failures
            .iter()
            .any(|f| f.kind == FailureKind::Timeout));
    }
}
