//! JSON-lines file sink.

use async_trait::async_trait;
use serde::Serialize;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::error::{SinkError, SinkResult};
use crate::types::record::ScrapedRecord;

use super::{PersistOutcome, PersistTarget, RecordSink};

/// Appends records as one JSON object per line.
///
/// Append-only: the file is never rewritten, so repeated runs produce
/// duplicate lines. Downstream consumers dedupe on `mapping_hash`.
#[derive(Default)]
pub struct JsonlSink;

#[derive(Serialize)]
struct JsonlRow<'a> {
    mapping_hash: String,
    bookmaker: &'a str,
    category: &'a str,
    #[serde(flatten)]
    record: &'a ScrapedRecord,
}

impl JsonlSink {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl RecordSink for JsonlSink {
    async fn persist(
        &self,
        records: &[ScrapedRecord],
        target: &PersistTarget,
    ) -> SinkResult<PersistOutcome> {
        if target.locator.is_empty() {
            return Err(SinkError::InvalidTarget {
                reason: "jsonl sink needs a file path".to_string(),
            });
        }

        let mut lines = String::new();
        for record in records {
            let row = JsonlRow {
                mapping_hash: record.mapping_hash(),
                bookmaker: &target.bookmaker,
                category: &target.category,
                record,
            };
            lines.push_str(&serde_json::to_string(&row)?);
            lines.push('\n');
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&target.locator)
            .await?;
        file.write_all(lines.as_bytes()).await?;
        file.flush().await?;

        debug!(path = %target.locator, records = records.len(), "appended records");
        Ok(PersistOutcome {
            written: records.len(),
            skipped: 0,
        })
    }

    fn name(&self) -> &'static str {
        "jsonl"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::record::FieldOutcome;
    use serde_json::json;

    #[tokio::test]
    async fn test_appends_one_line_per_record() {
        let dir = std::env::temp_dir().join(format!("collector-jsonl-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("records.jsonl");

        let mut record = ScrapedRecord::new("markets", "https://example.com");
        record.set_field("id", FieldOutcome::Present(json!("m1")));

        let sink = JsonlSink::new();
        let target = PersistTarget::new("betfair", "tennis", path.to_string_lossy());

        sink.persist(&[record.clone()], &target).await.unwrap();
        sink.persist(&[record], &target).await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);

        let row: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(row["bookmaker"], "betfair");
        assert_eq!(row["collection"], "markets");
        assert!(row["mapping_hash"].as_str().unwrap().len() == 64);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn test_empty_path_rejected() {
        let sink = JsonlSink::new();
        let err = sink
            .persist(&[], &PersistTarget::default())
            .await
            .unwrap_err();
        assert!(matches!(err, SinkError::InvalidTarget { .. }));
    }
}
