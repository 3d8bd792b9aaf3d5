//! Configuration types for declarative scrape definitions.
//!
//! A `ScrapeConfig` is the entire description of a collection job:
//! where to fetch from, how to fetch it, the instruction tree to walk,
//! and where records go. Configs are YAML on disk and validated in
//! full before anything is fetched.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;

use crate::error::{ConfigError, ConfigResult};
use crate::fetch::DomainPolicy;
use crate::process::Registry;

/// Ordered field name → field spec map.
pub type FieldMap = IndexMap<String, FieldSpec>;

fn default_true() -> bool {
    true
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_wait_timeout_ms() -> u64 {
    10_000
}

fn default_max_iterations() -> usize {
    100
}

fn default_min_count() -> usize {
    1
}

fn default_method() -> String {
    "GET".to_string()
}

fn default_attribute() -> String {
    "text".to_string()
}

/// Top-level scrape configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapeConfig {
    pub meta: MetaConfig,

    pub fetcher: FetcherConfig,

    /// Persistence target; None means the caller handles records itself
    #[serde(default)]
    pub sink: Option<SinkConfig>,

    /// Named reusable field groups, referenced by collect instructions
    #[serde(default)]
    pub collections: IndexMap<String, FieldMap>,

    /// The instruction tree executed against the fetched document
    pub instructions: Vec<Instruction>,
}

/// Identity and scope of a scrape job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaConfig {
    /// Job name, used in outcomes and logs
    pub name: String,

    #[serde(default)]
    pub description: String,

    /// First URL fetched when the run starts
    pub start_url: String,

    /// Domains requests may touch. Empty = no restriction.
    #[serde(default)]
    pub allowed_domains: Vec<String>,
}

/// Which fetch strategy a config uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetcherKind {
    /// Plain HTTP fetch of server-rendered markup
    Static,
    /// JSON API endpoint with optional auth
    Api,
    /// Rendered page via a browser driver, fetched per navigation
    Browser,
    /// Persistent browser session supporting page interactions
    Interactive,
}

impl FetcherKind {
    /// Browser-backed strategies need a page driver plugged in.
    pub fn requires_driver(&self) -> bool {
        matches!(self, FetcherKind::Browser | FetcherKind::Interactive)
    }

    /// Whether configs with this strategy may use page interactions.
    pub fn supports_interaction(&self) -> bool {
        matches!(self, FetcherKind::Interactive)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FetcherKind::Static => "static",
            FetcherKind::Api => "api",
            FetcherKind::Browser => "browser",
            FetcherKind::Interactive => "interactive",
        }
    }
}

/// Fetch strategy configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetcherConfig {
    #[serde(rename = "type")]
    pub kind: FetcherKind,

    /// Per-request budget; also the default run deadline
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Extra request headers
    #[serde(default)]
    pub headers: IndexMap<String, String>,

    /// HTTP method for static/api strategies
    #[serde(default = "default_method")]
    pub method: String,

    /// Request body for api strategies
    #[serde(default)]
    pub body: Option<Value>,

    #[serde(default)]
    pub auth: Option<AuthConfig>,

    /// Run browser drivers without a visible window
    #[serde(default = "default_true")]
    pub headless: bool,

    #[serde(default)]
    pub viewport: Option<Viewport>,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            kind: FetcherKind::Static,
            timeout_ms: default_timeout_ms(),
            headers: IndexMap::new(),
            method: default_method(),
            body: None,
            auth: None,
            headless: true,
            viewport: None,
        }
    }
}

impl FetcherConfig {
    pub fn new(kind: FetcherKind) -> Self {
        Self {
            kind,
            ..Default::default()
        }
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub fn with_auth(mut self, auth: AuthConfig) -> Self {
        self.auth = Some(auth);
        self
    }
}

/// Browser viewport dimensions.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

/// Authentication for API fetches.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuthConfig {
    Basic { username: String, password: String },
    Bearer { token: String },
    ApiKey { header: String, key: String },
}

/// Where persisted records go.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SinkConfig {
    /// Append records as JSON lines to a file
    Jsonl {
        path: String,
        #[serde(default)]
        bookmaker: String,
        #[serde(default)]
        category: String,
    },
    /// SQLite database keyed by mapping hash
    Sqlite {
        url: String,
        bookmaker: String,
        category: String,
    },
    /// In-process buffer, for dry runs and tests
    Memory {
        #[serde(default)]
        bookmaker: String,
        #[serde(default)]
        category: String,
    },
}

/// One node of the instruction tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Instruction {
    Collect(CollectSpec),
    Loop(LoopSpec),
    If(IfSpec),
    Click(ClickSpec),
    Wait {
        condition: WaitCondition,
    },
    Navigate {
        url: String,
        #[serde(default)]
        wait_after: Option<WaitCondition>,
    },
    Input {
        selector: String,
        value: String,
        #[serde(default = "default_true")]
        clear_first: bool,
    },
    Select {
        selector: String,
        #[serde(flatten)]
        choice: SelectChoice,
    },
    Scroll {
        #[serde(default)]
        direction: ScrollDirection,
        #[serde(default)]
        amount: Option<u32>,
        #[serde(default)]
        selector: Option<String>,
    },
}

impl Instruction {
    /// Short name used in failure manifest paths and logs.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Instruction::Collect(_) => "collect",
            Instruction::Loop(_) => "loop",
            Instruction::If(_) => "if",
            Instruction::Click(_) => "click",
            Instruction::Wait { .. } => "wait",
            Instruction::Navigate { .. } => "navigate",
            Instruction::Input { .. } => "input",
            Instruction::Select { .. } => "select",
            Instruction::Scroll { .. } => "scroll",
        }
    }

    /// Whether this instruction drives the page rather than reading it.
    pub fn is_interaction(&self) -> bool {
        matches!(
            self,
            Instruction::Click(_)
                | Instruction::Input { .. }
                | Instruction::Select { .. }
                | Instruction::Scroll { .. }
        )
    }
}

/// Extract records from the current document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectSpec {
    /// Collection name stamped on every emitted record
    pub name: String,

    /// Selector for the element/value holding all items
    pub container_selector: String,

    /// Selector for one item within the container
    pub item_selector: String,

    /// Inline field definitions
    #[serde(default)]
    pub fields: FieldMap,

    /// Named field group to merge beneath the inline fields
    #[serde(default)]
    pub collection: Option<String>,

    /// Keep at most this many records, in document order
    #[serde(default)]
    pub limit: Option<usize>,
}

impl CollectSpec {
    /// Merge a referenced named field group beneath the inline fields.
    /// Inline definitions win on name clashes.
    pub fn resolved_fields(
        &self,
        collections: &IndexMap<String, FieldMap>,
    ) -> ConfigResult<FieldMap> {
        let mut fields = match &self.collection {
            Some(name) => collections
                .get(name)
                .cloned()
                .ok_or_else(|| ConfigError::UnknownCollection { name: name.clone() })?,
            None => FieldMap::new(),
        };
        for (name, spec) in &self.fields {
            fields.insert(name.clone(), spec.clone());
        }
        Ok(fields)
    }
}

/// Repeat a block of instructions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoopSpec {
    #[serde(flatten)]
    pub iterator: LoopKind,

    /// Hard ceiling on iterations regardless of break conditions
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,

    pub instructions: Vec<Instruction>,
}

/// What drives a loop forward.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "iterator", rename_all = "snake_case")]
pub enum LoopKind {
    /// Fixed iteration count
    Count { count: usize },

    /// Click a "next" control until it disappears or the break fires
    Pagination {
        next_selector: String,
        #[serde(default)]
        break_condition: Option<WaitCondition>,
    },

    /// One iteration per option of a select element
    DropdownOptions {
        dropdown_selector: String,
        #[serde(default)]
        skip_first_option: bool,
    },

    /// Iterate while a condition holds
    While { condition: WaitCondition },
}

impl LoopKind {
    /// Pagination and dropdown loops drive the page between iterations.
    pub fn needs_interaction(&self) -> bool {
        matches!(
            self,
            LoopKind::Pagination { .. } | LoopKind::DropdownOptions { .. }
        )
    }
}

/// Run one of two branches depending on a condition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IfSpec {
    /// Evaluated immediately against the current document, no waiting
    pub condition: WaitCondition,

    #[serde(default)]
    pub then_instructions: Vec<Instruction>,

    #[serde(default)]
    pub else_instructions: Vec<Instruction>,
}

/// Click an element.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClickSpec {
    pub selector: String,

    /// Click every match instead of the first
    #[serde(default)]
    pub all_matching: bool,

    /// Missing element is recorded but does not fail the run
    #[serde(default)]
    pub optional: bool,

    #[serde(default)]
    pub wait_after: Option<WaitCondition>,
}

/// A condition the engine can wait on or branch on.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WaitCondition {
    /// Unconditional pause in milliseconds
    Timeout { value: u64 },

    /// An element matching the selector exists
    Selector {
        value: String,
        #[serde(default = "default_wait_timeout_ms")]
        timeout_ms: u64,
    },

    /// The current URL contains a substring
    UrlContains { value: String },

    /// At least `min` elements match the selector
    ElementCount {
        selector: String,
        #[serde(default = "default_min_count")]
        min: usize,
        #[serde(default = "default_wait_timeout_ms")]
        timeout_ms: u64,
    },
}

/// How a select instruction picks an option.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SelectChoice {
    Value { value: String },
    Text { text: String },
    Index { index: usize },
}

/// Scroll direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScrollDirection {
    Up,
    #[default]
    Down,
    ToElement,
}

/// One or more selectors tried in order; first non-empty match wins.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SelectorList {
    One(String),
    Many(Vec<String>),
}

impl SelectorList {
    pub fn candidates(&self) -> Vec<&str> {
        match self {
            SelectorList::One(s) => vec![s.as_str()],
            SelectorList::Many(v) => v.iter().map(String::as_str).collect(),
        }
    }
}

impl From<&str> for SelectorList {
    fn from(s: &str) -> Self {
        SelectorList::One(s.to_string())
    }
}

/// A processor invocation in a field's chain.
///
/// Deserializes from either the string shorthand (`- trim`) or the
/// map form (`- { name: split, args: { delimiter: "-", index: 0 } }`).
#[derive(Debug, Clone, Serialize)]
pub struct ProcessorSpec {
    pub name: String,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub args: serde_json::Map<String, Value>,
}

impl ProcessorSpec {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: serde_json::Map::new(),
        }
    }

    pub fn with_arg(mut self, key: impl Into<String>, value: Value) -> Self {
        self.args.insert(key.into(), value);
        self
    }
}

impl<'de> Deserialize<'de> for ProcessorSpec {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Name(String),
            Full {
                name: String,
                #[serde(default)]
                args: serde_json::Map<String, Value>,
            },
        }

        Ok(match Repr::deserialize(deserializer)? {
            Repr::Name(name) => ProcessorSpec {
                name,
                args: serde_json::Map::new(),
            },
            Repr::Full { name, args } => ProcessorSpec { name, args },
        })
    }
}

/// How to extract and shape one field of a record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldSpec {
    pub selector: SelectorList,

    /// "text" (default), "html", or an attribute name
    #[serde(default = "default_attribute")]
    pub attribute: String,

    /// Processors applied left to right
    #[serde(default)]
    pub processors: Vec<ProcessorSpec>,

    /// A missing required field fails the record (not the run)
    #[serde(default)]
    pub required: bool,

    /// Fallback when extraction misses or a processor fails. A field
    /// with a default always resolves, so `required` never fires on it.
    #[serde(default)]
    pub default: Option<Value>,
}

impl FieldSpec {
    pub fn new(selector: impl Into<SelectorList>) -> Self {
        Self {
            selector: selector.into(),
            attribute: default_attribute(),
            processors: Vec::new(),
            required: false,
            default: None,
        }
    }

    pub fn with_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.attribute = attribute.into();
        self
    }

    pub fn with_processor(mut self, spec: ProcessorSpec) -> Self {
        self.processors.push(spec);
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_default(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }
}

/// A single validation problem, located in the config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Violation {
    /// Where in the config, e.g. "instructions[1].collect.fields.price"
    pub path: String,
    pub message: String,
}

/// Everything wrong with a config, gathered in one pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationReport {
    pub violations: Vec<Violation>,
}

impl ValidationReport {
    pub fn is_ok(&self) -> bool {
        self.violations.is_empty()
    }

    fn push(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.violations.push(Violation {
            path: path.into(),
            message: message.into(),
        });
    }

    /// Collapse into a `ConfigError` if any violation was found.
    pub fn into_result(self) -> ConfigResult<()> {
        if self.is_ok() {
            Ok(())
        } else {
            let summary = self
                .violations
                .iter()
                .map(|v| format!("{}: {}", v.path, v.message))
                .collect::<Vec<_>>()
                .join("; ");
            Err(ConfigError::Invalid(summary))
        }
    }
}

impl ScrapeConfig {
    /// Parse a config from YAML text.
    pub fn from_yaml(yaml: &str) -> ConfigResult<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Read and parse a config file.
    pub fn from_path(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml(&text)
    }

    /// Minimal config for programmatic construction.
    pub fn new(name: impl Into<String>, start_url: impl Into<String>) -> Self {
        Self {
            meta: MetaConfig {
                name: name.into(),
                description: String::new(),
                start_url: start_url.into(),
                allowed_domains: Vec::new(),
            },
            fetcher: FetcherConfig::default(),
            sink: None,
            collections: IndexMap::new(),
            instructions: Vec::new(),
        }
    }

    pub fn with_fetcher(mut self, fetcher: FetcherConfig) -> Self {
        self.fetcher = fetcher;
        self
    }

    pub fn with_allowed_domains(
        mut self,
        domains: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.meta.allowed_domains = domains.into_iter().map(|d| d.into()).collect();
        self
    }

    pub fn with_instruction(mut self, instruction: Instruction) -> Self {
        self.instructions.push(instruction);
        self
    }

    pub fn with_collection(mut self, name: impl Into<String>, fields: FieldMap) -> Self {
        self.collections.insert(name.into(), fields);
        self
    }

    /// Check the whole config against the processor registry.
    ///
    /// Gathers every problem instead of stopping at the first so the
    /// operator can fix a config in one pass. A report with violations
    /// means nothing will be fetched.
    pub fn validate(&self, registry: &Registry) -> ValidationReport {
        let mut report = ValidationReport::default();

        if self.meta.name.trim().is_empty() {
            report.push("meta.name", "must not be empty");
        }

        match url::Url::parse(&self.meta.start_url) {
            Ok(_) => {
                let policy = DomainPolicy::new(self.meta.allowed_domains.clone());
                if let Err(violation) = policy.check(&self.meta.start_url) {
                    report.push("meta.start_url", violation.to_string());
                }
            }
            Err(e) => report.push("meta.start_url", format!("invalid URL: {e}")),
        }

        if self.instructions.is_empty() {
            report.push("instructions", "must contain at least one instruction");
        }

        for (name, fields) in &self.collections {
            self.validate_fields(fields, &format!("collections.{name}"), registry, &mut report);
        }

        for (i, instruction) in self.instructions.iter().enumerate() {
            self.validate_instruction(
                instruction,
                &format!("instructions[{i}]"),
                registry,
                &mut report,
            );
        }

        report
    }

    fn validate_instruction(
        &self,
        instruction: &Instruction,
        path: &str,
        registry: &Registry,
        report: &mut ValidationReport,
    ) {
        if instruction.is_interaction() && !self.fetcher.kind.supports_interaction() {
            report.push(
                path,
                format!(
                    "'{}' requires an interactive fetcher, config uses '{}'",
                    instruction.kind_name(),
                    self.fetcher.kind.as_str()
                ),
            );
        }

        match instruction {
            Instruction::Collect(spec) => {
                if let Some(name) = &spec.collection {
                    if !self.collections.contains_key(name) {
                        report.push(
                            format!("{path}.collection"),
                            format!("unknown collection '{name}'"),
                        );
                    }
                }
                if spec.limit == Some(0) {
                    report.push(format!("{path}.limit"), "must be at least 1");
                }
                self.validate_fields(&spec.fields, &format!("{path}.fields"), registry, report);
            }
            Instruction::Loop(spec) => {
                if spec.max_iterations == 0 {
                    report.push(format!("{path}.max_iterations"), "must be at least 1");
                }
                if spec.iterator.needs_interaction() && !self.fetcher.kind.supports_interaction() {
                    report.push(
                        format!("{path}.iterator"),
                        format!(
                            "loop iterator requires an interactive fetcher, config uses '{}'",
                            self.fetcher.kind.as_str()
                        ),
                    );
                }
                if let LoopKind::Count { count: 0 } = spec.iterator {
                    report.push(format!("{path}.count"), "must be at least 1");
                }
                for (i, inner) in spec.instructions.iter().enumerate() {
                    self.validate_instruction(
                        inner,
                        &format!("{path}.loop[{i}]"),
                        registry,
                        report,
                    );
                }
            }
            Instruction::If(spec) => {
                for (i, inner) in spec.then_instructions.iter().enumerate() {
                    self.validate_instruction(
                        inner,
                        &format!("{path}.then[{i}]"),
                        registry,
                        report,
                    );
                }
                for (i, inner) in spec.else_instructions.iter().enumerate() {
                    self.validate_instruction(
                        inner,
                        &format!("{path}.else[{i}]"),
                        registry,
                        report,
                    );
                }
            }
            Instruction::Navigate { url, .. } => {
                // Templated URLs are resolved at run time; only check literal ones.
                if !url.contains("{{") {
                    if let Err(e) = url::Url::parse(url) {
                        report.push(format!("{path}.url"), format!("invalid URL: {e}"));
                    }
                }
            }
            Instruction::Scroll {
                direction: ScrollDirection::ToElement,
                selector: None,
                ..
            } => {
                report.push(
                    format!("{path}.selector"),
                    "scroll to_element requires a selector",
                );
            }
            _ => {}
        }
    }

    fn validate_fields(
        &self,
        fields: &FieldMap,
        path: &str,
        registry: &Registry,
        report: &mut ValidationReport,
    ) {
        for (name, field) in fields {
            for spec in &field.processors {
                if registry.get(&spec.name).is_none() {
                    report.push(
                        format!("{path}.{name}"),
                        format!("unknown processor '{}'", spec.name),
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::Registry;

    const MINIMAL_YAML: &str = r#"
meta:
  name: polymarket-politics
  start_url: https://gamma-api.example.com/markets
  allowed_domains: [example.com]
fetcher:
  type: api
instructions:
  - type: collect
    name: markets
    container_selector: "$"
    item_selector: "$[*]"
    fields:
      market_id:
        selector: "$.id"
        required: true
      question:
        selector: "$.question"
        processors: [trim]
"#;

    #[test]
    fn test_parse_minimal_yaml() {
        let config = ScrapeConfig::from_yaml(MINIMAL_YAML).unwrap();
        assert_eq!(config.meta.name, "polymarket-politics");
        assert_eq!(config.fetcher.kind, FetcherKind::Api);
        assert_eq!(config.instructions.len(), 1);

        match &config.instructions[0] {
            Instruction::Collect(spec) => {
                assert_eq!(spec.name, "markets");
                assert_eq!(spec.fields.len(), 2);
                assert!(spec.fields["market_id"].required);
                assert_eq!(spec.fields["question"].processors[0].name, "trim");
            }
            other => panic!("expected collect, got {}", other.kind_name()),
        }
    }

    #[test]
    fn test_processor_spec_both_forms() {
        let yaml = r#"
- trim
- name: split
  args:
    delimiter: " - "
    index: 0
"#;
        let specs: Vec<ProcessorSpec> = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(specs[0].name, "trim");
        assert!(specs[0].args.is_empty());
        assert_eq!(specs[1].name, "split");
        assert_eq!(specs[1].args["index"], 0);
    }

    #[test]
    fn test_selector_list_forms() {
        let one: SelectorList = serde_yaml::from_str(r#"".price""#).unwrap();
        assert_eq!(one.candidates(), vec![".price"]);

        let many: SelectorList = serde_yaml::from_str(r#"[".price", ".odds"]"#).unwrap();
        assert_eq!(many.candidates(), vec![".price", ".odds"]);
    }

    #[test]
    fn test_validate_accepts_clean_config() {
        let config = ScrapeConfig::from_yaml(MINIMAL_YAML).unwrap();
        let registry = Registry::with_builtins();
        assert!(config.validate(&registry).is_ok());
    }

    #[test]
    fn test_validate_rejects_unknown_processor() {
        let mut config = ScrapeConfig::from_yaml(MINIMAL_YAML).unwrap();
        if let Instruction::Collect(spec) = &mut config.instructions[0] {
            spec.fields["question"]
                .processors
                .push(ProcessorSpec::named("no_such_processor"));
        }
        let report = config.validate(&Registry::with_builtins());
        assert!(!report.is_ok());
        assert!(report.violations[0].message.contains("no_such_processor"));
    }

    #[test]
    fn test_validate_rejects_unknown_collection_reference() {
        let mut config = ScrapeConfig::from_yaml(MINIMAL_YAML).unwrap();
        if let Instruction::Collect(spec) = &mut config.instructions[0] {
            spec.collection = Some("odds_fields".into());
        }
        let report = config.validate(&Registry::with_builtins());
        assert!(!report.is_ok());
    }

    #[test]
    fn test_validate_rejects_interaction_on_static_fetcher() {
        let config = ScrapeConfig::new("t", "https://example.com").with_instruction(
            Instruction::Click(ClickSpec {
                selector: ".more".into(),
                all_matching: false,
                optional: false,
                wait_after: None,
            }),
        );
        let report = config.validate(&Registry::with_builtins());
        assert!(report
            .violations
            .iter()
            .any(|v| v.message.contains("interactive")));
    }

    #[test]
    fn test_validate_rejects_scroll_to_element_without_selector() {
        let config = ScrapeConfig::new("t", "https://example.com")
            .with_fetcher(FetcherConfig::new(FetcherKind::Interactive))
            .with_instruction(Instruction::Scroll {
                direction: ScrollDirection::ToElement,
                amount: None,
                selector: None,
            });
        let report = config.validate(&Registry::with_builtins());
        assert!(report
            .violations
            .iter()
            .any(|v| v.message.contains("requires a selector")));
    }

    #[test]
    fn test_validate_allows_required_field_with_default() {
        let mut config = ScrapeConfig::from_yaml(MINIMAL_YAML).unwrap();
        if let Instruction::Collect(spec) = &mut config.instructions[0] {
            spec.fields.insert(
                "volume".into(),
                FieldSpec::new("$.volume")
                    .required()
                    .with_default(serde_json::json!(0)),
            );
        }
        assert!(config.validate(&Registry::with_builtins()).is_ok());
    }

    #[test]
    fn test_validate_rejects_disallowed_start_url() {
        let config = ScrapeConfig::new("t", "https://other.net")
            .with_allowed_domains(["example.com"])
            .with_instruction(Instruction::Wait {
                condition: WaitCondition::Timeout { value: 1 },
            });
        let report = config.validate(&Registry::with_builtins());
        assert!(!report.is_ok());
    }

    #[test]
    fn test_resolved_fields_merges_named_collection() {
        let mut shared = FieldMap::new();
        shared.insert("price".into(), FieldSpec::new(".price"));
        shared.insert("name".into(), FieldSpec::new(".name"));

        let mut collections = IndexMap::new();
        collections.insert("odds_fields".to_string(), shared);

        let mut spec = CollectSpec {
            name: "markets".into(),
            container_selector: ".markets".into(),
            item_selector: ".market".into(),
            fields: FieldMap::new(),
            collection: Some("odds_fields".into()),
            limit: None,
        };
        // Inline override wins.
        spec.fields
            .insert("name".into(), FieldSpec::new(".title").required());

        let fields = spec.resolved_fields(&collections).unwrap();
        assert_eq!(fields.len(), 2);
        assert!(fields["name"].required);
        assert_eq!(fields["name"].selector.candidates(), vec![".title"]);
    }

    #[test]
    fn test_wait_condition_variants() {
        let yaml = r#"
- type: timeout
  value: 2000
- type: selector
  value: ".loaded"
- type: url_contains
  value: results
- type: element_count
  selector: ".row"
  min: 3
"#;
        let conditions: Vec<WaitCondition> = serde_yaml::from_str(yaml).unwrap();
        assert!(matches!(
            conditions[0],
            WaitCondition::Timeout { value: 2000 }
        ));
        assert!(matches!(
            conditions[3],
            WaitCondition::ElementCount { min: 3, .. }
        ));
    }

    #[test]
    fn test_loop_kind_parsing() {
        let yaml = r#"
type: loop
iterator: pagination
next_selector: ".next"
max_iterations: 5
instructions:
  - type: wait
    condition:
      type: timeout
      value: 100
"#;
        let instruction: Instruction = serde_yaml::from_str(yaml).unwrap();
        match instruction {
            Instruction::Loop(spec) => {
                assert_eq!(spec.max_iterations, 5);
                assert!(matches!(spec.iterator, LoopKind::Pagination { .. }));
            }
            other => panic!("expected loop, got {}", other.kind_name()),
        }
    }
}
