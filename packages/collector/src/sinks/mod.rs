//! Persistence sinks for scraped records.
//!
//! Sinks receive finished records plus a target descriptor and report
//! how many were written versus skipped. Identity is the record's
//! mapping hash, so re-running a config against an idempotent sink is
//! safe.

pub mod jsonl;
pub mod memory;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use jsonl::JsonlSink;
pub use memory::MemorySink;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteSink;

use async_trait::async_trait;

use crate::error::SinkResult;
use crate::types::config::SinkConfig;
use crate::types::record::ScrapedRecord;

/// Where records are filed within a sink.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PersistTarget {
    /// Source label, e.g. a bookmaker or exchange name
    pub bookmaker: String,

    /// Grouping label, e.g. a sport or market category
    pub category: String,

    /// Backend locator: file path for jsonl, database URL for sqlite
    pub locator: String,
}

impl PersistTarget {
    pub fn new(
        bookmaker: impl Into<String>,
        category: impl Into<String>,
        locator: impl Into<String>,
    ) -> Self {
        Self {
            bookmaker: bookmaker.into(),
            category: category.into(),
            locator: locator.into(),
        }
    }
}

/// What a persist call accomplished.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PersistOutcome {
    /// Records newly written
    pub written: usize,

    /// Records skipped as already present
    pub skipped: usize,
}

/// A destination for scraped records.
#[async_trait]
pub trait RecordSink: Send + Sync {
    /// Persist a batch of records under the given target.
    async fn persist(
        &self,
        records: &[ScrapedRecord],
        target: &PersistTarget,
    ) -> SinkResult<PersistOutcome>;

    fn name(&self) -> &'static str;
}

/// The persist target a sink config describes.
pub fn target_for(config: &SinkConfig) -> PersistTarget {
    match config {
        SinkConfig::Jsonl {
            path,
            bookmaker,
            category,
        } => PersistTarget::new(bookmaker, category, path),
        SinkConfig::Sqlite {
            url,
            bookmaker,
            category,
        } => PersistTarget::new(bookmaker, category, url),
        SinkConfig::Memory {
            bookmaker,
            category,
        } => PersistTarget::new(bookmaker, category, ""),
    }
}

/// Build the sink a config asks for.
pub async fn build_sink(config: &SinkConfig) -> SinkResult<Box<dyn RecordSink>> {
    match config {
        SinkConfig::Jsonl { .. } => Ok(Box::new(JsonlSink::new())),
        SinkConfig::Memory { .. } => Ok(Box::new(MemorySink::new())),
        #[cfg(feature = "sqlite")]
        SinkConfig::Sqlite { url, .. } => Ok(Box::new(SqliteSink::new(url).await?)),
        #[cfg(not(feature = "sqlite"))]
        SinkConfig::Sqlite { .. } => Err(crate::error::SinkError::InvalidTarget {
            reason: "sqlite sink requires the 'sqlite' feature".to_string(),
        }),
    }
}
