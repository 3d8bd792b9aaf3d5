//! SQLite sink, behind the `sqlite` feature.
//!
//! Records are keyed by mapping hash, so persisting the same batch
//! twice writes nothing the second time. Bookmaker and category rows
//! are upserted on demand.

use async_trait::async_trait;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use sqlx::Row;

use crate::error::{SinkError, SinkResult};
use crate::types::record::ScrapedRecord;

use super::{PersistOutcome, PersistTarget, RecordSink};

pub struct SqliteSink {
    pool: SqlitePool,
}

fn db_err(e: sqlx::Error) -> SinkError {
    SinkError::Database(Box::new(e))
}

impl SqliteSink {
    /// Connect and run migrations.
    ///
    /// URL examples: `sqlite::memory:`, `sqlite://./records.db?mode=rwc`.
    pub async fn new(database_url: &str) -> SinkResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .map_err(db_err)?;

        let sink = Self { pool };
        sink.run_migrations().await?;
        Ok(sink)
    }

    /// In-memory database, for testing.
    pub async fn in_memory() -> SinkResult<Self> {
        Self::new("sqlite::memory:").await
    }

    async fn run_migrations(&self) -> SinkResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS bookmakers (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE
            );

            CREATE TABLE IF NOT EXISTS categories (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE
            );

            CREATE TABLE IF NOT EXISTS records (
                mapping_hash TEXT PRIMARY KEY,
                collection TEXT NOT NULL,
                bookmaker_id INTEGER NOT NULL REFERENCES bookmakers(id),
                category_id INTEGER NOT NULL REFERENCES categories(id),
                source_url TEXT NOT NULL,
                scraped_at TEXT NOT NULL,
                fields TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_records_collection ON records(collection);
            CREATE INDEX IF NOT EXISTS idx_records_bookmaker ON records(bookmaker_id);
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn upsert_name(&self, table: &str, name: &str) -> SinkResult<i64> {
        // Table names come from this module, never from input.
        let insert = format!("INSERT OR IGNORE INTO {table} (name) VALUES (?1)");
        sqlx::query(&insert)
            .bind(name)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;

        let select = format!("SELECT id FROM {table} WHERE name = ?1");
        let row = sqlx::query(&select)
            .bind(name)
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;
        row.try_get("id").map_err(db_err)
    }
}

#[async_trait]
impl RecordSink for SqliteSink {
    async fn persist(
        &self,
        records: &[ScrapedRecord],
        target: &PersistTarget,
    ) -> SinkResult<PersistOutcome> {
        let bookmaker_id = self.upsert_name("bookmakers", &target.bookmaker).await?;
        let category_id = self.upsert_name("categories", &target.category).await?;

        let mut outcome = PersistOutcome::default();
        for record in records {
            let fields = serde_json::to_string(&record.fields)?;
            let result = sqlx::query(
                r#"
                INSERT OR IGNORE INTO records
                    (mapping_hash, collection, bookmaker_id, category_id,
                     source_url, scraped_at, fields)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                "#,
            )
            .bind(record.mapping_hash())
            .bind(&record.collection)
            .bind(bookmaker_id)
            .bind(category_id)
            .bind(&record.source_url)
            .bind(record.scraped_at.to_rfc3339())
            .bind(fields)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;

            if result.rows_affected() > 0 {
                outcome.written += 1;
            } else {
                outcome.skipped += 1;
            }
        }
        Ok(outcome)
    }

    fn name(&self) -> &'static str {
        "sqlite"
    }
}
