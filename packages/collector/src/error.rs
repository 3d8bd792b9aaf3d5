//! Typed errors for the collection engine.
//!
//! Uses `thiserror` for library errors (not `anyhow`) to provide
//! strongly-typed, composable error handling. Each layer has its own
//! enum so callers can match on exactly the failures they care about.

use thiserror::Error;

/// Errors raised while loading or validating a scrape config.
///
/// These are always fatal: nothing is fetched until the config is clean.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parsing failed
    #[error("config parse error: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// Processor name not present in the registry
    #[error("unknown processor: {name}")]
    UnknownProcessor { name: String },

    /// Processor registered twice under the same name
    #[error("duplicate processor: {name}")]
    DuplicateProcessor { name: String },

    /// Collect instruction references an undefined named collection
    #[error("unknown collection reference: {name}")]
    UnknownCollection { name: String },

    /// Fetcher kind requires a page driver that was not supplied
    #[error("fetcher '{kind}' requires a page driver")]
    DriverRequired { kind: String },

    /// Validation found one or more violations
    #[error("config validation failed: {0}")]
    Invalid(String),
}

/// Domain policy rejections.
///
/// Raised before any request leaves the engine. An empty allow-list
/// permits every domain, so these only occur for configured lists.
#[derive(Debug, Error)]
pub enum PolicyViolation {
    /// URL scheme not allowed (e.g., file://, ftp://)
    #[error("disallowed URL scheme: {0}")]
    DisallowedScheme(String),

    /// Host is not on the allow-list
    #[error("domain not allowed: {host}")]
    DomainNotAllowed { host: String },

    /// URL has no host
    #[error("URL has no host")]
    NoHost,

    /// URL parsing failed
    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),
}

/// Errors raised by fetch strategies.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Request blocked by the domain policy
    #[error("policy violation: {0}")]
    Policy(#[from] PolicyViolation),

    /// Connection could not be established
    #[error("connect failed for {url}: {source}")]
    Connect {
        url: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Request or wait exceeded its time budget
    #[error("timeout fetching: {url}")]
    Timeout { url: String },

    /// Server responded with a non-success status
    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },

    /// Response body could not be read
    #[error("failed to read body from {url}: {source}")]
    Body {
        url: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Strategy does not support the requested page action
    #[error("action not supported by {strategy} fetcher: {action}")]
    Unsupported { strategy: String, action: String },

    /// A page action's selector matched nothing
    #[error("no element matched: {selector}")]
    ElementNotFound { selector: String },

    /// Browser session died or the driver lost its page
    #[error("session error: {0}")]
    Session(String),

    /// No document fetched yet
    #[error("no current document")]
    NoDocument,
}

impl FetchError {
    /// Whether retrying the same request could plausibly succeed.
    ///
    /// 5xx and 429 responses, timeouts, and connect failures are
    /// transient; 4xx responses and policy rejections are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Timeout { .. } | FetchError::Connect { .. } => true,
            FetchError::Status { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }

    /// Whether the fetcher session is unusable after this error.
    ///
    /// A dead session aborts the run; everything else is recorded in
    /// the failure manifest and execution continues.
    pub fn is_fatal_session(&self) -> bool {
        matches!(self, FetchError::Session(_))
    }
}

/// A field processor rejected its input.
///
/// Never aborts a run: the field falls back to its default (if any)
/// or is reported missing.
#[derive(Debug, Error)]
#[error("processor '{processor}' failed: {reason}")]
pub struct ProcessorFailure {
    /// Registry name of the processor that failed
    pub processor: String,
    /// Human-readable cause
    pub reason: String,
}

impl ProcessorFailure {
    pub fn new(processor: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            processor: processor.into(),
            reason: reason.into(),
        }
    }
}

/// Errors raised by persistence sinks.
#[derive(Debug, Error)]
pub enum SinkError {
    /// Filesystem write failed
    #[error("sink I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Record could not be serialized
    #[error("record serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Database operation failed
    #[error("database error: {0}")]
    Database(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Sink target descriptor is unusable
    #[error("invalid sink target: {reason}")]
    InvalidTarget { reason: String },
}

/// Run-level errors from the instruction engine and pipeline.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Config failed to load or validate
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// A fatal fetch failure (dead session, unfetchable start URL)
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),

    /// The run exceeded its overall deadline
    #[error("run deadline exceeded after {elapsed_ms}ms")]
    DeadlineExceeded { elapsed_ms: u64 },
}

/// Result type alias for config operations.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for fetch operations.
pub type FetchResult<T> = std::result::Result<T, FetchError>;

/// Result type alias for sink operations.
pub type SinkResult<T> = std::result::Result<T, SinkError>;

/// Result type alias for engine and pipeline operations.
pub type EngineResult<T> = std::result::Result<T, EngineError>;
