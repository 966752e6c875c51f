//! Savings ledger — durable record of verified/estimated token-and-cost
//! savings. An injected trait object backed by a `sqlx` SQLite pool; a
//! no-op implementation backs tests and environments with no database.

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::SqlitePool;
use tracing::warn;

use crate::types::{Path, SavingsLedgerRecord, SavingsType};

#[async_trait]
pub trait SavingsLedger: Send + Sync {
    async fn record(&self, record: SavingsLedgerRecord) -> Result<()>;
}

pub struct SqliteSavingsLedger {
    db: SqlitePool,
}

impl SqliteSavingsLedger {
    pub async fn new(db: SqlitePool) -> Result<Self> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS savings_ledger (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                workload_key TEXT NOT NULL,
                path TEXT NOT NULL,
                provider TEXT NOT NULL,
                model TEXT NOT NULL,
                optimization_level INTEGER NOT NULL,
                baseline_tokens INTEGER NOT NULL,
                optimized_tokens INTEGER NOT NULL,
                baseline_cost REAL NOT NULL,
                optimized_cost REAL NOT NULL,
                confidence REAL NOT NULL,
                savings_type TEXT NOT NULL,
                created_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&db)
        .await?;
        Ok(Self { db })
    }
}

#[async_trait]
impl SavingsLedger for SqliteSavingsLedger {
    async fn record(&self, record: SavingsLedgerRecord) -> Result<()> {
        let path = match record.path {
            Path::Talk => "talk",
            Path::Code => "code",
        };
        let savings_type = match record.savings_type {
            SavingsType::Estimated => "estimated",
            SavingsType::Verified => "verified",
            SavingsType::ShadowVerified => "shadow_verified",
        };
        sqlx::query(
            r#"
            INSERT INTO savings_ledger (
                workload_key, path, provider, model, optimization_level,
                baseline_tokens, optimized_tokens, baseline_cost, optimized_cost,
                confidence, savings_type, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.workload_key)
        .bind(path)
        .bind(&record.provider)
        .bind(&record.model)
        .bind(record.optimization_level as i64)
        .bind(record.baseline_tokens as i64)
        .bind(record.optimized_tokens as i64)
        .bind(record.baseline_cost)
        .bind(record.optimized_cost)
        .bind(record.confidence)
        .bind(savings_type)
        .bind(record.created_at)
        .execute(&self.db)
        .await?;
        Ok(())
    }
}

/// No-op ledger for tests and dry runs.
pub struct NoopSavingsLedger;

#[async_trait]
impl SavingsLedger for NoopSavingsLedger {
    async fn record(&self, _record: SavingsLedgerRecord) -> Result<()> {
        Ok(())
    }
}

/// Writes `record` fire-and-forget: ledger writes are an external
/// collaborator with its own transaction semantics, so failures are logged
/// and never surfaced to the caller.
pub async fn write_fire_and_forget(
    ledger: std::sync::Arc<dyn SavingsLedger>,
    record: SavingsLedgerRecord,
) {
    tokio::spawn(async move {
        if let Err(err) = ledger.record(record).await {
            warn!(%err, "failed to write savings ledger record");
        }
    });
}

/// Deterministic digest of `(path, provider, model, prompt length)` used to
/// group ledger records by workload for aggregation.
pub fn workload_key(path: Path, provider: &str, model: &str, prompt_len_chars: usize) -> String {
    let path_str = match path {
        Path::Talk => "talk",
        Path::Code => "code",
    };
    let canonical = format!("{path_str}|{provider}|{model}|{prompt_len_chars}");
    spectyra_core::hash_prefix(&canonical)
}

pub fn now_timestamp() -> i64 {
    Utc::now().timestamp()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn workload_key_is_deterministic() {
        let k1 = workload_key(Path::Talk, "openai", "gpt-4", 100);
        let k2 = workload_key(Path::Talk, "openai", "gpt-4", 100);
        assert_eq!(k1, k2);
    }

    #[test]
    fn workload_key_differs_by_path() {
        let k1 = workload_key(Path::Talk, "openai", "gpt-4", 100);
        let k2 = workload_key(Path::Code, "openai", "gpt-4", 100);
        assert_ne!(k1, k2);
    }

    #[tokio::test]
    async fn sqlite_ledger_persists_and_counts_records() {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let ledger = SqliteSavingsLedger::new(pool.clone()).await.unwrap();
        let record = SavingsLedgerRecord {
            workload_key: workload_key(Path::Talk, "openai", "gpt-4", 500),
            path: Path::Talk,
            provider: "openai".into(),
            model: "gpt-4".into(),
            optimization_level: 2,
            baseline_tokens: 500,
            optimized_tokens: 300,
            baseline_cost: 0.05,
            optimized_cost: 0.03,
            confidence: 0.6,
            savings_type: SavingsType::Estimated,
            created_at: now_timestamp(),
        };
        ledger.record(record).await.unwrap();

        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM savings_ledger")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count.0, 1);
    }

    #[tokio::test]
    async fn noop_ledger_always_succeeds() {
        let ledger = NoopSavingsLedger;
        let record = SavingsLedgerRecord {
            workload_key: "k".into(),
            path: Path::Talk,
            provider: "openai".into(),
            model: "gpt-4".into(),
            optimization_level: 2,
            baseline_tokens: 100,
            optimized_tokens: 80,
            baseline_cost: 0.01,
            optimized_cost: 0.008,
            confidence: 0.9,
            savings_type: SavingsType::Estimated,
            created_at: now_timestamp(),
        };
        assert!(ledger.record(record).await.is_ok());
    }
}
