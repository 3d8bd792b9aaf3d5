//! Record types - scraped records, run failures, and run outcomes.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

/// How a field got its value.
///
/// `Defaulted` and `Missing` are kept distinct so downstream consumers
/// can tell a configured fallback apart from a genuine extraction miss.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "provenance", content = "value", rename_all = "snake_case")]
pub enum FieldOutcome {
    /// Extracted from the document and processed successfully
    Present(Value),
    /// Extraction missed or a processor failed; the configured default applied
    Defaulted(Value),
    /// Extraction missed and no default was configured
    Missing,
}

impl FieldOutcome {
    /// The effective value, if any.
    pub fn value(&self) -> Option<&Value> {
        match self {
            FieldOutcome::Present(v) | FieldOutcome::Defaulted(v) => Some(v),
            FieldOutcome::Missing => None,
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, FieldOutcome::Missing)
    }
}

/// One record emitted by a collect instruction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapedRecord {
    /// Name of the collect instruction that produced this record
    pub collection: String,

    /// URL of the document the record was extracted from
    pub source_url: String,

    /// When the record was assembled
    pub scraped_at: DateTime<Utc>,

    /// Field values in config order
    pub fields: IndexMap<String, FieldOutcome>,
}

impl ScrapedRecord {
    pub fn new(collection: impl Into<String>, source_url: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            source_url: source_url.into(),
            scraped_at: Utc::now(),
            fields: IndexMap::new(),
        }
    }

    /// Set a field outcome, replacing any previous value.
    pub fn set_field(&mut self, name: impl Into<String>, outcome: FieldOutcome) {
        self.fields.insert(name.into(), outcome);
    }

    /// Look up the effective value of a field.
    pub fn field_value(&self, name: &str) -> Option<&Value> {
        self.fields.get(name).and_then(|f| f.value())
    }

    /// Stable identity hash over the collection name and ordered
    /// effective values. Used by sinks for idempotent writes.
    pub fn mapping_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.collection.as_bytes());
        for (name, outcome) in &self.fields {
            hasher.update(name.as_bytes());
            if let Some(value) = outcome.value() {
                hasher.update(value.to_string().as_bytes());
            }
        }
        hex::encode(hasher.finalize())
    }
}

/// Classification of a recoverable failure recorded during a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Fetch,
    Policy,
    Timeout,
    Processor,
    RequiredFieldMissing,
    Unsupported,
}

/// A manifest entry describing a failure that did not abort the run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunFailure {
    /// Where in the instruction tree the failure happened,
    /// e.g. "instructions[2].loop[0].collect"
    pub at: String,

    pub kind: FailureKind,

    pub message: String,
}

impl RunFailure {
    pub fn new(at: impl Into<String>, kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            at: at.into(),
            kind,
            message: message.into(),
        }
    }
}

/// Overall classification of a finished run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Every instruction completed without recorded failures
    Completed,
    /// Records were produced but some failures were recorded
    Partial,
    /// The run aborted or produced nothing but failures
    Failed,
}

/// The result of a pipeline run: records plus the failure manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapeOutcome {
    /// Unique id for this run
    pub run_id: uuid::Uuid,

    /// Config name from the meta block
    pub config_name: String,

    pub status: RunStatus,

    pub records: Vec<ScrapedRecord>,

    /// Recoverable failures encountered during the run
    pub failures: Vec<RunFailure>,

    pub started_at: DateTime<Utc>,

    pub finished_at: DateTime<Utc>,
}

impl ScrapeOutcome {
    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    pub fn is_partial(&self) -> bool {
        self.status == RunStatus::Partial
    }

    pub fn duration_ms(&self) -> i64 {
        (self.finished_at - self.started_at).num_milliseconds()
    }

    /// Classify a finished run from its records and failures.
    pub fn classify(records: &[ScrapedRecord], failures: &[RunFailure], aborted: bool) -> RunStatus {
        if aborted || (records.is_empty() && !failures.is_empty()) {
            RunStatus::Failed
        } else if failures.is_empty() {
            RunStatus::Completed
        } else {
            RunStatus::Partial
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_field_outcome_values() {
        assert_eq!(
            FieldOutcome::Present(json!("a")).value(),
            Some(&json!("a"))
        );
        assert_eq!(
            FieldOutcome::Defaulted(json!(0)).value(),
            Some(&json!(0))
        );
        assert_eq!(FieldOutcome::Missing.value(), None);
        assert!(FieldOutcome::Missing.is_missing());
    }

    #[test]
    fn test_mapping_hash_stable_and_distinct() {
        let mut a = ScrapedRecord::new("markets", "https://example.com");
        a.set_field("id", FieldOutcome::Present(json!("1")));

        let mut b = ScrapedRecord::new("markets", "https://example.com");
        b.set_field("id", FieldOutcome::Present(json!("1")));

        assert_eq!(a.mapping_hash(), b.mapping_hash());

        b.set_field("id", FieldOutcome::Present(json!("2")));
        assert_ne!(a.mapping_hash(), b.mapping_hash());
    }

    #[test]
    fn test_defaulted_and_present_hash_alike() {
        // Identity is about effective values, not provenance.
        let mut a = ScrapedRecord::new("markets", "u");
        a.set_field("price", FieldOutcome::Present(json!(0)));

        let mut b = ScrapedRecord::new("markets", "u");
        b.set_field("price", FieldOutcome::Defaulted(json!(0)));

        assert_eq!(a.mapping_hash(), b.mapping_hash());
    }

    #[test]
    fn test_outcome_classification() {
        let record = ScrapedRecord::new("m", "u");
        let failure = RunFailure::new("instructions[0]", FailureKind::Timeout, "slow");

        assert_eq!(
            ScrapeOutcome::classify(&[record.clone()], &[], false),
            RunStatus::Completed
        );
        assert_eq!(
            ScrapeOutcome::classify(&[record], &[failure.clone()], false),
            RunStatus::Partial
        );
        assert_eq!(
            ScrapeOutcome::classify(&[], &[failure], false),
            RunStatus::Failed
        );
        assert_eq!(ScrapeOutcome::classify(&[], &[], true), RunStatus::Failed);
    }
}
