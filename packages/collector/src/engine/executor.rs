//! The instruction interpreter.
//!
//! Walks the instruction tree depth-first against a single fetcher
//! session. Recoverable failures land in the context's manifest and
//! execution continues; only dead sessions, config bugs, and the run
//! deadline abort the walk.

use futures::future::BoxFuture;
use serde_json::json;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::error::{EngineError, EngineResult, FetchError};
use crate::extract::{self, dom};
use crate::fetch::{FetchRequest, Fetcher, PageAction};
use crate::process::{ProcessorChain, Registry};
use crate::types::config::{
    ClickSpec, CollectSpec, FieldSpec, IfSpec, Instruction, LoopKind, LoopSpec, ScrapeConfig,
    SelectChoice, WaitCondition,
};
use crate::types::document::Document;
use crate::types::record::{FailureKind, FieldOutcome, ScrapedRecord};

use super::context::ExecutionContext;

const CONDITION_POLL: Duration = Duration::from_millis(50);
const URL_WAIT_BUDGET: Duration = Duration::from_millis(10_000);

/// Executes instruction trees for one config.
pub struct Executor<'a> {
    config: &'a ScrapeConfig,
    registry: &'a Registry,
}

/// A field with its processor chain resolved, so chain lookup happens
/// once per collect instruction rather than once per record.
struct CompiledField {
    name: String,
    spec: FieldSpec,
    chain: ProcessorChain,
}

/// Map a recoverable fetch error onto a manifest classification.
fn failure_kind(error: &FetchError) -> FailureKind {
    match error {
        FetchError::Policy(_) => FailureKind::Policy,
        FetchError::Timeout { .. } => FailureKind::Timeout,
        FetchError::Unsupported { .. } => FailureKind::Unsupported,
        _ => FailureKind::Fetch,
    }
}

fn describe_condition(condition: &WaitCondition) -> String {
    match condition {
        WaitCondition::Timeout { value } => format!("timeout {value}ms"),
        WaitCondition::Selector { value, .. } => format!("selector '{value}'"),
        WaitCondition::UrlContains { value } => format!("url contains '{value}'"),
        WaitCondition::ElementCount { selector, min, .. } => {
            format!("at least {min} of '{selector}'")
        }
    }
}

/// Enumerate a select element's options from an HTML snapshot.
fn dropdown_options(document: &Document, selector: &str) -> Vec<(String, String)> {
    let Document::Html(markup) = document else {
        return Vec::new();
    };
    let option_selector = format!("{selector} option");
    let values = dom::select_values(markup, &option_selector, "value");
    let labels = dom::select_values(markup, &option_selector, "text");

    values
        .iter()
        .zip(labels.iter())
        .map(|(value, label)| {
            (
                value.as_str().unwrap_or_default().to_string(),
                label.as_str().unwrap_or_default().trim().to_string(),
            )
        })
        .collect()
}

impl<'a> Executor<'a> {
    pub fn new(config: &'a ScrapeConfig, registry: &'a Registry) -> Self {
        Self { config, registry }
    }

    /// Execute a block of instructions in order.
    ///
    /// Boxed so loop and branch bodies can recurse through it.
    pub fn run_all<'f>(
        &'f self,
        instructions: &'f [Instruction],
        prefix: String,
        ctx: &'f mut ExecutionContext,
        fetcher: &'f mut dyn Fetcher,
    ) -> BoxFuture<'f, EngineResult<()>> {
        Box::pin(async move {
            for (i, instruction) in instructions.iter().enumerate() {
                let path = format!("{prefix}[{i}].{}", instruction.kind_name());
                self.execute(instruction, &path, ctx, fetcher).await?;
            }
            Ok(())
        })
    }

    async fn execute(
        &self,
        instruction: &Instruction,
        path: &str,
        ctx: &mut ExecutionContext,
        fetcher: &mut dyn Fetcher,
    ) -> EngineResult<()> {
        if ctx.expired() {
            return Err(EngineError::DeadlineExceeded {
                elapsed_ms: ctx.elapsed_ms(),
            });
        }
        debug!(at = %path, "executing instruction");

        match instruction {
            Instruction::Collect(spec) => self.handle_collect(spec, path, ctx),
            Instruction::Loop(spec) => self.handle_loop(spec, path, ctx, fetcher).await,
            Instruction::If(spec) => self.handle_if(spec, path, ctx, fetcher).await,
            Instruction::Click(spec) => self.handle_click(spec, path, ctx, fetcher).await,
            Instruction::Wait { condition } => {
                self.handle_wait(condition, path, ctx, fetcher).await
            }
            Instruction::Navigate { url, wait_after } => {
                self.handle_navigate(url, wait_after.as_ref(), path, ctx, fetcher)
                    .await
            }
            Instruction::Input {
                selector,
                value,
                clear_first,
            } => {
                let action = PageAction::Fill {
                    selector: selector.clone(),
                    value: ctx.interpolate(value),
                    clear_first: *clear_first,
                };
                self.handle_action(action, path, ctx, fetcher).await
            }
            Instruction::Select { selector, choice } => {
                let action = PageAction::SelectOption {
                    selector: selector.clone(),
                    choice: choice.clone(),
                };
                self.handle_action(action, path, ctx, fetcher).await
            }
            Instruction::Scroll {
                direction,
                amount,
                selector,
            } => {
                let action = PageAction::Scroll {
                    direction: *direction,
                    amount: *amount,
                    selector: selector.clone(),
                };
                self.handle_action(action, path, ctx, fetcher).await
            }
        }
    }

    fn handle_collect(
        &self,
        spec: &CollectSpec,
        path: &str,
        ctx: &mut ExecutionContext,
    ) -> EngineResult<()> {
        // Validation already checked collection refs and processor
        // names, so resolution failures here are config bugs.
        let fields = spec.resolved_fields(&self.config.collections)?;
        let mut compiled = Vec::with_capacity(fields.len());
        for (name, field) in fields {
            let chain = ProcessorChain::resolve(&field.processors, self.registry)?;
            compiled.push(CompiledField {
                name,
                spec: field,
                chain,
            });
        }

        let items = extract::extract_items(
            &ctx.document.document,
            &spec.container_selector,
            &spec.item_selector,
        );
        let source_url = ctx.document.url.clone();
        let limit = spec.limit.unwrap_or(usize::MAX);
        let mut emitted = 0usize;

        for item in &items {
            if emitted >= limit {
                break;
            }

            let mut record = ScrapedRecord::new(spec.name.clone(), source_url.clone());
            let mut dropped = false;

            for field in &compiled {
                let raw = extract::extract_field(item, &field.spec.selector, &field.spec.attribute);
                let outcome = match raw.into_iter().next() {
                    Some(value) => match field.chain.run(value) {
                        Ok(processed) => FieldOutcome::Present(processed),
                        Err(failure) => {
                            debug!(field = %field.name, error = %failure, "processor chain failed");
                            match &field.spec.default {
                                Some(default) => FieldOutcome::Defaulted(default.clone()),
                                None => FieldOutcome::Missing,
                            }
                        }
                    },
                    None => match &field.spec.default {
                        Some(default) => FieldOutcome::Defaulted(default.clone()),
                        None => FieldOutcome::Missing,
                    },
                };

                if outcome.is_missing() && field.spec.required {
                    ctx.fail(
                        format!("{path}.fields.{}", field.name),
                        FailureKind::RequiredFieldMissing,
                        format!(
                            "required field '{}' missing in collection '{}'",
                            field.name, spec.name
                        ),
                    );
                    dropped = true;
                }
                record.set_field(field.name.clone(), outcome);
            }

            if !dropped {
                ctx.records.push(record);
                emitted += 1;
            }
        }

        info!(
            collection = %spec.name,
            items = items.len(),
            records = emitted,
            "collected records"
        );
        Ok(())
    }

    async fn handle_loop(
        &self,
        spec: &LoopSpec,
        path: &str,
        ctx: &mut ExecutionContext,
        fetcher: &mut dyn Fetcher,
    ) -> EngineResult<()> {
        match &spec.iterator {
            LoopKind::Count { count } => {
                let total = (*count).min(spec.max_iterations);
                for i in 0..total {
                    ctx.bind("loop_index", json!(i));
                    self.run_all(&spec.instructions, format!("{path}.loop"), ctx, fetcher)
                        .await?;
                }
            }

            LoopKind::While { condition } => {
                for i in 0..spec.max_iterations {
                    self.refresh_document(ctx, fetcher).await?;
                    if !self.condition_met(condition, ctx) {
                        break;
                    }
                    ctx.bind("loop_index", json!(i));
                    self.run_all(&spec.instructions, format!("{path}.loop"), ctx, fetcher)
                        .await?;
                }
            }

            LoopKind::Pagination {
                next_selector,
                break_condition,
            } => {
                for i in 0..spec.max_iterations {
                    ctx.bind("loop_index", json!(i));
                    self.run_all(&spec.instructions, format!("{path}.loop"), ctx, fetcher)
                        .await?;

                    if let Some(condition) = break_condition {
                        self.refresh_document(ctx, fetcher).await?;
                        if self.condition_met(condition, ctx) {
                            break;
                        }
                    }

                    let action = PageAction::Click {
                        selector: next_selector.clone(),
                        all_matching: false,
                    };
                    match fetcher.perform(&action).await {
                        Ok(0) => {
                            debug!(selector = %next_selector, page = i, "next control gone, pagination done");
                            break;
                        }
                        Ok(_) => self.refresh_document(ctx, fetcher).await?,
                        Err(e) if e.is_fatal_session() => return Err(EngineError::Fetch(e)),
                        Err(e) => {
                            ctx.fail(path, failure_kind(&e), e.to_string());
                            break;
                        }
                    }
                }
            }

            LoopKind::DropdownOptions {
                dropdown_selector,
                skip_first_option,
            } => {
                self.refresh_document(ctx, fetcher).await?;
                let options = dropdown_options(&ctx.document.document, dropdown_selector);
                let skip = usize::from(*skip_first_option);

                for (i, (value, label)) in options
                    .into_iter()
                    .skip(skip)
                    .take(spec.max_iterations)
                    .enumerate()
                {
                    let action = PageAction::SelectOption {
                        selector: dropdown_selector.clone(),
                        choice: SelectChoice::Value {
                            value: value.clone(),
                        },
                    };
                    match fetcher.perform(&action).await {
                        Ok(_) => self.refresh_document(ctx, fetcher).await?,
                        Err(e) if e.is_fatal_session() => return Err(EngineError::Fetch(e)),
                        Err(e) => {
                            ctx.fail(path, failure_kind(&e), e.to_string());
                            continue;
                        }
                    }

                    ctx.bind("loop_index", json!(i));
                    ctx.bind("option_value", json!(value));
                    ctx.bind("option_label", json!(label));
                    self.run_all(&spec.instructions, format!("{path}.loop"), ctx, fetcher)
                        .await?;
                }
            }
        }
        Ok(())
    }

    async fn handle_if(
        &self,
        spec: &IfSpec,
        path: &str,
        ctx: &mut ExecutionContext,
        fetcher: &mut dyn Fetcher,
    ) -> EngineResult<()> {
        self.refresh_document(ctx, fetcher).await?;

        if self.condition_met(&spec.condition, ctx) {
            self.run_all(&spec.then_instructions, format!("{path}.then"), ctx, fetcher)
                .await
        } else {
            self.run_all(&spec.else_instructions, format!("{path}.else"), ctx, fetcher)
                .await
        }
    }

    async fn handle_click(
        &self,
        spec: &ClickSpec,
        path: &str,
        ctx: &mut ExecutionContext,
        fetcher: &mut dyn Fetcher,
    ) -> EngineResult<()> {
        let action = PageAction::Click {
            selector: spec.selector.clone(),
            all_matching: spec.all_matching,
        };

        match fetcher.perform(&action).await {
            Ok(0) => {
                if spec.optional {
                    debug!(selector = %spec.selector, "optional click matched nothing");
                } else {
                    ctx.fail(
                        path,
                        FailureKind::Fetch,
                        format!("no element matched: {}", spec.selector),
                    );
                }
                Ok(())
            }
            Ok(count) => {
                debug!(selector = %spec.selector, count, "clicked");
                self.refresh_document(ctx, fetcher).await?;
                if let Some(condition) = &spec.wait_after {
                    self.handle_wait(condition, path, ctx, fetcher).await?;
                }
                Ok(())
            }
            Err(e) if e.is_fatal_session() => Err(EngineError::Fetch(e)),
            Err(e) => {
                ctx.fail(path, failure_kind(&e), e.to_string());
                Ok(())
            }
        }
    }

    async fn handle_wait(
        &self,
        condition: &WaitCondition,
        path: &str,
        ctx: &mut ExecutionContext,
        fetcher: &mut dyn Fetcher,
    ) -> EngineResult<()> {
        let budget = match condition {
            WaitCondition::Timeout { value } => {
                // A fixed pause still honors the run deadline.
                let pause = Duration::from_millis(*value);
                let remaining = ctx.remaining();
                if pause >= remaining {
                    tokio::time::sleep(remaining).await;
                    return Err(EngineError::DeadlineExceeded {
                        elapsed_ms: ctx.elapsed_ms(),
                    });
                }
                tokio::time::sleep(pause).await;
                return Ok(());
            }
            WaitCondition::Selector { timeout_ms, .. }
            | WaitCondition::ElementCount { timeout_ms, .. } => Duration::from_millis(*timeout_ms),
            WaitCondition::UrlContains { .. } => URL_WAIT_BUDGET,
        };

        let deadline = Instant::now() + budget;
        loop {
            self.refresh_document(ctx, fetcher).await?;
            if self.condition_met(condition, ctx) {
                return Ok(());
            }
            if Instant::now() >= deadline {
                ctx.fail(
                    path,
                    FailureKind::Timeout,
                    format!(
                        "condition not met within {}ms: {}",
                        budget.as_millis(),
                        describe_condition(condition)
                    ),
                );
                return Ok(());
            }
            if ctx.expired() {
                return Err(EngineError::DeadlineExceeded {
                    elapsed_ms: ctx.elapsed_ms(),
                });
            }
            tokio::time::sleep(CONDITION_POLL.min(budget)).await;
        }
    }

    async fn handle_navigate(
        &self,
        url: &str,
        wait_after: Option<&WaitCondition>,
        path: &str,
        ctx: &mut ExecutionContext,
        fetcher: &mut dyn Fetcher,
    ) -> EngineResult<()> {
        let resolved = ctx.interpolate(url);
        let request = FetchRequest::from_config(resolved, &self.config.fetcher);

        match fetcher.fetch(&request).await {
            Ok(document) => {
                ctx.document = document;
                if let Some(condition) = wait_after {
                    self.handle_wait(condition, path, ctx, fetcher).await?;
                }
                Ok(())
            }
            Err(e) if e.is_fatal_session() => Err(EngineError::Fetch(e)),
            Err(e) => {
                ctx.fail(path, failure_kind(&e), e.to_string());
                Ok(())
            }
        }
    }

    async fn handle_action(
        &self,
        action: PageAction,
        path: &str,
        ctx: &mut ExecutionContext,
        fetcher: &mut dyn Fetcher,
    ) -> EngineResult<()> {
        match fetcher.perform(&action).await {
            Ok(_) => self.refresh_document(ctx, fetcher).await,
            Err(e) if e.is_fatal_session() => Err(EngineError::Fetch(e)),
            Err(e) => {
                ctx.fail(path, failure_kind(&e), e.to_string());
                Ok(())
            }
        }
    }

    /// Re-snapshot the current document from the fetcher.
    ///
    /// Session strategies re-read the live page; HTTP strategies return
    /// the last response. A missing document keeps the current snapshot.
    async fn refresh_document(
        &self,
        ctx: &mut ExecutionContext,
        fetcher: &mut dyn Fetcher,
    ) -> EngineResult<()> {
        match fetcher.current_document().await {
            Ok(document) => {
                ctx.document = document;
                Ok(())
            }
            Err(e) if e.is_fatal_session() => Err(EngineError::Fetch(e)),
            Err(_) => Ok(()),
        }
    }

    /// Evaluate a condition against the current document snapshot.
    /// A bare timeout is a pause, not a predicate, so it reads as met.
    fn condition_met(&self, condition: &WaitCondition, ctx: &ExecutionContext) -> bool {
        match condition {
            WaitCondition::Timeout { .. } => true,
            WaitCondition::Selector { value, .. } => {
                extract::count_matches(&ctx.document.document, value) > 0
            }
            WaitCondition::UrlContains { value } => ctx.document.url.contains(value),
            WaitCondition::ElementCount { selector, min, .. } => {
                extract::count_matches(&ctx.document.document, selector) >= *min
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::{DomainPolicy, InteractiveFetcher};
    use crate::testing::{sample_markets_json, MockFetcher, PageState, ScriptedDriver};
    use crate::types::config::{FieldMap, ScrapeConfig};
    use crate::types::document::ResponseDocument;
    use serde_json::json;

    const START_URL: &str = "https://markets.test/list";

    fn json_ctx(value: serde_json::Value) -> ExecutionContext {
        ExecutionContext::new(
            ResponseDocument::new(START_URL, Document::json_value(value)),
            Duration::from_secs(30),
        )
    }

    fn html_ctx(markup: &str) -> ExecutionContext {
        ExecutionContext::new(
            ResponseDocument::new(START_URL, Document::html(markup)),
            Duration::from_secs(30),
        )
    }

    fn collect_markets(limit: Option<usize>) -> Instruction {
        let mut fields = FieldMap::new();
        fields.insert("market_id".into(), FieldSpec::new("$.id").required());
        fields.insert("question".into(), FieldSpec::new("$.question"));

        Instruction::Collect(CollectSpec {
            name: "markets".into(),
            container_selector: "$".into(),
            item_selector: "$[*]".into(),
            fields,
            collection: None,
            limit,
        })
    }

    async fn run(
        config: &ScrapeConfig,
        ctx: &mut ExecutionContext,
        fetcher: &mut dyn Fetcher,
    ) -> EngineResult<()> {
        let registry = Registry::with_builtins();
        let executor = Executor::new(config, &registry);
        executor
            .run_all(&config.instructions, "instructions".to_string(), ctx, fetcher)
            .await
    }

    #[tokio::test]
    async fn test_collect_emits_record_per_item() {
        let config =
            ScrapeConfig::new("t", START_URL).with_instruction(collect_markets(None));
        let mut ctx = json_ctx(sample_markets_json(2));
        let mut fetcher = MockFetcher::new();

        run(&config, &mut ctx, &mut fetcher).await.unwrap();

        assert_eq!(ctx.records.len(), 2);
        assert!(ctx.failures.is_empty());
        assert_eq!(ctx.records[0].field_value("market_id"), Some(&json!("1000")));
        assert_eq!(ctx.records[0].source_url, START_URL);
    }

    #[tokio::test]
    async fn test_collect_limit_truncates_in_order() {
        let config =
            ScrapeConfig::new("t", START_URL).with_instruction(collect_markets(Some(2)));
        let mut ctx = json_ctx(sample_markets_json(5));
        let mut fetcher = MockFetcher::new();

        run(&config, &mut ctx, &mut fetcher).await.unwrap();

        assert_eq!(ctx.records.len(), 2);
        assert_eq!(ctx.records[1].field_value("market_id"), Some(&json!("1001")));
    }

    #[tokio::test]
    async fn test_required_field_missing_drops_record() {
        let config =
            ScrapeConfig::new("t", START_URL).with_instruction(collect_markets(None));
        let mut ctx = json_ctx(json!([
            {"id": "1", "question": "a"},
            {"question": "no id here"},
        ]));
        let mut fetcher = MockFetcher::new();

        run(&config, &mut ctx, &mut fetcher).await.unwrap();

        assert_eq!(ctx.records.len(), 1);
        assert_eq!(ctx.failures.len(), 1);
        assert_eq!(ctx.failures[0].kind, FailureKind::RequiredFieldMissing);
    }

    #[tokio::test]
    async fn test_default_applies_on_miss() {
        let mut fields = FieldMap::new();
        fields.insert(
            "volume".into(),
            FieldSpec::new("$.volume").with_default(json!(0)),
        );
        let config = ScrapeConfig::new("t", START_URL).with_instruction(Instruction::Collect(
            CollectSpec {
                name: "markets".into(),
                container_selector: "$".into(),
                item_selector: "$[*]".into(),
                fields,
                collection: None,
                limit: None,
            },
        ));
        let mut ctx = json_ctx(json!([{"id": "1"}]));
        let mut fetcher = MockFetcher::new();

        run(&config, &mut ctx, &mut fetcher).await.unwrap();

        assert_eq!(ctx.records.len(), 1);
        assert_eq!(
            ctx.records[0].fields["volume"],
            FieldOutcome::Defaulted(json!(0))
        );
    }

    #[tokio::test]
    async fn test_wait_selector_timeout_records_failure() {
        let config = ScrapeConfig::new("t", START_URL).with_instruction(Instruction::Wait {
            condition: WaitCondition::Selector {
                value: ".never-appears".into(),
                timeout_ms: 100,
            },
        });
        let mut ctx = html_ctx("<div class='present'></div>");
        let mut fetcher = MockFetcher::new();

        let started = Instant::now();
        run(&config, &mut ctx, &mut fetcher).await.unwrap();

        assert!(started.elapsed() >= Duration::from_millis(100));
        assert_eq!(ctx.failures.len(), 1);
        assert_eq!(ctx.failures[0].kind, FailureKind::Timeout);
    }

    #[tokio::test]
    async fn test_wait_selector_present_returns_immediately() {
        let config = ScrapeConfig::new("t", START_URL).with_instruction(Instruction::Wait {
            condition: WaitCondition::Selector {
                value: ".present".into(),
                timeout_ms: 5_000,
            },
        });
        let mut ctx = html_ctx("<div class='present'></div>");
        let mut fetcher = MockFetcher::new();

        run(&config, &mut ctx, &mut fetcher).await.unwrap();
        assert!(ctx.failures.is_empty());
    }

    #[tokio::test]
    async fn test_navigate_policy_violation_goes_to_manifest() {
        let config = ScrapeConfig::new("t", START_URL).with_instruction(Instruction::Navigate {
            url: "https://elsewhere.test/data".into(),
            wait_after: None,
        });
        let mut ctx = html_ctx("");
        let mut fetcher =
            MockFetcher::new().with_policy(DomainPolicy::new(vec!["markets.test".into()]));

        run(&config, &mut ctx, &mut fetcher).await.unwrap();

        assert_eq!(ctx.failures.len(), 1);
        assert_eq!(ctx.failures[0].kind, FailureKind::Policy);
        assert!(ctx.records.is_empty());
    }

    #[tokio::test]
    async fn test_navigate_interpolates_variables() {
        let page_url = "https://markets.test/page/3";
        let config = ScrapeConfig::new("t", START_URL).with_instruction(Instruction::Navigate {
            url: "https://markets.test/page/{{loop_index}}".into(),
            wait_after: None,
        });
        let mut ctx = html_ctx("");
        ctx.bind("loop_index", json!(3));
        let mut fetcher =
            MockFetcher::new().with_document(page_url, Document::html("<p>page 3</p>"));

        run(&config, &mut ctx, &mut fetcher).await.unwrap();

        assert!(ctx.failures.is_empty());
        assert_eq!(ctx.document.url, page_url);
    }

    #[tokio::test]
    async fn test_count_loop_respects_max_iterations() {
        let config = ScrapeConfig::new("t", START_URL).with_instruction(Instruction::Loop(
            LoopSpec {
                iterator: LoopKind::Count { count: 50 },
                max_iterations: 3,
                instructions: vec![collect_markets(None)],
            },
        ));
        let mut ctx = json_ctx(sample_markets_json(1));
        let mut fetcher = MockFetcher::new();

        run(&config, &mut ctx, &mut fetcher).await.unwrap();

        // One record per iteration, capped by the ceiling.
        assert_eq!(ctx.records.len(), 3);
        assert_eq!(ctx.variables["loop_index"], json!(2));
    }

    #[tokio::test]
    async fn test_if_takes_else_branch() {
        let config = ScrapeConfig::new("t", START_URL).with_instruction(Instruction::If(IfSpec {
            condition: WaitCondition::Selector {
                value: ".missing".into(),
                timeout_ms: 10,
            },
            then_instructions: vec![],
            else_instructions: vec![Instruction::Wait {
                condition: WaitCondition::Timeout { value: 1 },
            }],
        }));
        let mut ctx = html_ctx("<div class='other'></div>");
        let mut fetcher = MockFetcher::new();

        // The else branch runs without recording a timeout failure,
        // because if evaluates immediately instead of waiting.
        run(&config, &mut ctx, &mut fetcher).await.unwrap();
        assert!(ctx.failures.is_empty());
    }

    #[tokio::test]
    async fn test_deadline_aborts_execution() {
        let config = ScrapeConfig::new("t", START_URL).with_instruction(collect_markets(None));
        let mut ctx = ExecutionContext::new(
            ResponseDocument::new(START_URL, Document::json_value(sample_markets_json(1))),
            Duration::ZERO,
        );
        let mut fetcher = MockFetcher::new();

        let err = run(&config, &mut ctx, &mut fetcher).await.unwrap_err();
        assert!(matches!(err, EngineError::DeadlineExceeded { .. }));
    }

    #[tokio::test]
    async fn test_fixed_wait_truncated_by_deadline() {
        let config = ScrapeConfig::new("t", START_URL).with_instruction(Instruction::Wait {
            condition: WaitCondition::Timeout { value: 5_000 },
        });
        let mut ctx = ExecutionContext::new(
            ResponseDocument::new(START_URL, Document::html("")),
            Duration::from_millis(100),
        );
        let mut fetcher = MockFetcher::new();

        let started = Instant::now();
        let err = run(&config, &mut ctx, &mut fetcher).await.unwrap_err();

        // The pause stops at the run deadline instead of sleeping out.
        assert!(matches!(err, EngineError::DeadlineExceeded { .. }));
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    fn market_page(url: &str, name: &str, with_next: bool) -> PageState {
        let next = if with_next {
            r#"<a class="next">more</a>"#
        } else {
            ""
        };
        PageState::new(
            url,
            format!(
                r#"<div class="markets"><div class="market"><span class="name">{name}</span></div></div>{next}"#
            ),
        )
    }

    fn collect_html_markets() -> Instruction {
        let mut fields = FieldMap::new();
        fields.insert("name".into(), FieldSpec::new(".name").required());
        Instruction::Collect(CollectSpec {
            name: "markets".into(),
            container_selector: ".markets".into(),
            item_selector: ".market".into(),
            fields,
            collection: None,
            limit: None,
        })
    }

    #[tokio::test]
    async fn test_pagination_loop_stops_when_next_disappears() {
        let driver = ScriptedDriver::new(market_page("https://book.test/p1", "Alpha", true))
            .on_click(".next", market_page("https://book.test/p2", "Beta", true))
            .on_click(".next", market_page("https://book.test/p3", "Gamma", false));
        let mut fetcher = InteractiveFetcher::new(Box::new(driver), DomainPolicy::allow_all());

        let initial = fetcher
            .fetch(&FetchRequest::get("https://book.test/p1"))
            .await
            .unwrap();
        let mut ctx = ExecutionContext::new(initial, Duration::from_secs(30));

        let config = ScrapeConfig::new("t", "https://book.test/p1").with_instruction(
            Instruction::Loop(LoopSpec {
                iterator: LoopKind::Pagination {
                    next_selector: ".next".into(),
                    break_condition: None,
                },
                max_iterations: 10,
                instructions: vec![collect_html_markets()],
            }),
        );

        run(&config, &mut ctx, &mut fetcher).await.unwrap();

        assert_eq!(ctx.records.len(), 3);
        assert_eq!(ctx.records[2].field_value("name"), Some(&json!("Gamma")));
        assert!(ctx.failures.is_empty());
    }

    #[tokio::test]
    async fn test_dropdown_loop_skips_placeholder_and_binds_options() {
        let driver = ScriptedDriver::new(PageState::new(
            "https://book.test/odds",
            r#"<select id="league">
                 <option value="">All leagues</option>
                 <option value="nba">NBA</option>
                 <option value="nfl">NFL</option>
               </select>"#,
        ));
        let actions = driver.actions();
        let mut fetcher = InteractiveFetcher::new(Box::new(driver), DomainPolicy::allow_all());

        let initial = fetcher
            .fetch(&FetchRequest::get("https://book.test/odds"))
            .await
            .unwrap();
        let mut ctx = ExecutionContext::new(initial, Duration::from_secs(30));

        let config = ScrapeConfig::new("t", "https://book.test/odds").with_instruction(
            Instruction::Loop(LoopSpec {
                iterator: LoopKind::DropdownOptions {
                    dropdown_selector: "#league".into(),
                    skip_first_option: true,
                },
                max_iterations: 10,
                instructions: vec![Instruction::Wait {
                    condition: WaitCondition::Timeout { value: 1 },
                }],
            }),
        );

        run(&config, &mut ctx, &mut fetcher).await.unwrap();

        let selects = actions
            .read()
            .unwrap()
            .iter()
            .filter(|a| a.starts_with("select"))
            .count();
        assert_eq!(selects, 2);
        assert_eq!(ctx.variables["option_value"], json!("nfl"));
        assert_eq!(ctx.variables["option_label"], json!("NFL"));
    }
}
