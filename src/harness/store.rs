//! Comparison results in a local SQLite database.

use std::path::Path;

use anyhow::Result;
use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;

use super::RunRecord;

/// Per-configuration aggregate across every stored round.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ConfigSummary {
    pub label: String,
    pub runs: i64,
    pub calls: i64,
    /// Over all calls, probes included
    pub success_rate: f64,
    /// Over calls that do not probe error paths
    pub scripted_success_rate: f64,
    pub mean_latency_ms: f64,
    pub contract_pass_rate: f64,
    pub failed_runs: i64,
}

#[derive(Clone)]
pub struct ResultStore {
    pool: SqlitePool,
}

impl ResultStore {
    /// Open (or create) the store at the given path.
    pub async fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let opts = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(2)
            .connect_with(opts)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS runs (
                id                TEXT PRIMARY KEY,
                label             TEXT NOT NULL,
                round             INTEGER NOT NULL,
                started_at        INTEGER NOT NULL,
                contract_passed   INTEGER,
                notification_seen INTEGER,
                contract_detail   TEXT,
                error             TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS calls (
                run_id         TEXT NOT NULL REFERENCES runs(id),
                seq            INTEGER NOT NULL,
                step           TEXT NOT NULL,
                tool           TEXT NOT NULL,
                latency_ms     REAL NOT NULL,
                success        INTEGER NOT NULL,
                expected_error INTEGER NOT NULL,
                excerpt        TEXT NOT NULL,
                PRIMARY KEY (run_id, seq)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Insert one run and its calls atomically.
    pub async fn insert_run(&self, run: &RunRecord) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let (passed, seen, detail) = match &run.contract {
            Some(c) => (Some(c.passed), Some(c.notification_seen), Some(c.detail.clone())),
            None => (None, None, None),
        };
        sqlx::query(
            "INSERT INTO runs (id, label, round, started_at, contract_passed, notification_seen, contract_detail, error)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&run.id)
        .bind(&run.label)
        .bind(run.round as i64)
        .bind(run.started_at)
        .bind(passed)
        .bind(seen)
        .bind(detail)
        .bind(&run.error)
        .execute(&mut *tx)
        .await?;

        for (seq, call) in run.calls.iter().enumerate() {
            sqlx::query(
                "INSERT INTO calls (run_id, seq, step, tool, latency_ms, success, expected_error, excerpt)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&run.id)
            .bind(seq as i64)
            .bind(&call.step)
            .bind(&call.tool)
            .bind(call.latency_ms)
            .bind(call.success)
            .bind(call.expected_error)
            .bind(call.excerpt.to_string())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Calls of one run in script order.
    #[cfg(test)]
    pub async fn calls(&self, run_id: &str) -> Result<Vec<super::CallRecord>> {
        let rows = sqlx::query(
            "SELECT step, tool, latency_ms, success, expected_error, excerpt
             FROM calls WHERE run_id = ? ORDER BY seq",
        )
        .bind(run_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| {
                let excerpt: String = r.get("excerpt");
                super::CallRecord {
                    step: r.get("step"),
                    tool: r.get("tool"),
                    latency_ms: r.get("latency_ms"),
                    success: r.get("success"),
                    expected_error: r.get("expected_error"),
                    excerpt: serde_json::from_str(&excerpt).unwrap_or(serde_json::Value::Null),
                }
            })
            .collect())
    }

    /// Aggregates per configuration label, ordered by label.
    pub async fn summary(&self) -> Result<Vec<ConfigSummary>> {
        let rows = sqlx::query(
            r#"
            SELECT r.label AS label,
                   COUNT(DISTINCT r.id) AS runs,
                   COUNT(c.run_id) AS calls,
                   COALESCE(AVG(c.success), 0.0) AS success_rate,
                   COALESCE(AVG(CASE WHEN c.expected_error = 0 THEN c.success END), 0.0) AS scripted_success_rate,
                   COALESCE(AVG(c.latency_ms), 0.0) AS mean_latency_ms
            FROM runs r
            LEFT JOIN calls c ON c.run_id = r.id
            GROUP BY r.label
            ORDER BY r.label
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut out = Vec::with_capacity(rows.len());
        for r in rows {
            let label: String = r.get("label");
            let contract = sqlx::query(
                r#"
                SELECT COALESCE(AVG(COALESCE(contract_passed, 0)), 0.0) AS pass_rate,
                       SUM(CASE WHEN error IS NOT NULL THEN 1 ELSE 0 END) AS failed
                FROM runs WHERE label = ?
                "#,
            )
            .bind(&label)
            .fetch_one(&self.pool)
            .await?;

            out.push(ConfigSummary {
                label,
                runs: r.get("runs"),
                calls: r.get("calls"),
                success_rate: r.get("success_rate"),
                scripted_success_rate: r.get("scripted_success_rate"),
                mean_latency_ms: r.get("mean_latency_ms"),
                contract_pass_rate: contract.get("pass_rate"),
                failed_runs: contract.get::<Option<i64>, _>("failed").unwrap_or(0),
            });
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::harness::{CallRecord, ContractVerdict};
    use serde_json::json;

    fn call(step: &str, success: bool, expected_error: bool, latency_ms: f64) -> CallRecord {
        CallRecord {
            step: step.into(),
            tool: "discover_tools".into(),
            latency_ms,
            success,
            expected_error,
            excerpt: json!({ "top": ["send_email"] }),
        }
    }

    fn run(id: &str, label: &str, passed: bool, calls: Vec<CallRecord>) -> RunRecord {
        RunRecord {
            id: id.into(),
            label: label.into(),
            round: 1,
            started_at: 0,
            calls,
            contract: Some(ContractVerdict {
                passed,
                notification_seen: passed,
                toolset: "web".into(),
                direction: "load_first".into(),
                detail: String::new(),
            }),
            error: None,
        }
    }

    #[tokio::test]
    async fn test_summary_aggregates_per_label() {
        let dir = tempfile::tempdir().unwrap();
        let store = ResultStore::open(&dir.path().join("results.sqlite")).await.unwrap();

        store
            .insert_run(&run(
                "a",
                "dynamic",
                true,
                vec![call("one", true, false, 10.0), call("probe", true, true, 30.0)],
            ))
            .await
            .unwrap();
        store
            .insert_run(&run(
                "b",
                "dynamic",
                false,
                vec![call("one", false, false, 20.0), call("probe", true, true, 40.0)],
            ))
            .await
            .unwrap();
        store
            .insert_run(&run("c", "static", true, vec![call("one", true, false, 5.0)]))
            .await
            .unwrap();

        let summary = store.summary().await.unwrap();
        assert_eq!(summary.len(), 2);
        let dynamic = &summary[0];
        assert_eq!(dynamic.label, "dynamic");
        assert_eq!(dynamic.runs, 2);
        assert_eq!(dynamic.calls, 4);
        assert!((dynamic.success_rate - 0.75).abs() < 1e-9);
        assert!((dynamic.scripted_success_rate - 0.5).abs() < 1e-9);
        assert!((dynamic.mean_latency_ms - 25.0).abs() < 1e-9);
        assert!((dynamic.contract_pass_rate - 0.5).abs() < 1e-9);
        assert_eq!(summary[1].label, "static");
        assert_eq!(summary[1].failed_runs, 0);

        let calls = store.calls("a").await.unwrap();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1].step, "probe");
        assert_eq!(calls[0].excerpt["top"][0], "send_email");
    }

    #[tokio::test]
    async fn test_failed_run_without_contract() {
        let dir = tempfile::tempdir().unwrap();
        let store = ResultStore::open(&dir.path().join("nested/results.sqlite")).await.unwrap();
        let mut failed = run("x", "static", false, Vec::new());
        failed.contract = None;
        failed.error = Some("spawn failed".into());
        store.insert_run(&failed).await.unwrap();

        let summary = store.summary().await.unwrap();
        assert_eq!(summary[0].runs, 1);
        assert_eq!(summary[0].calls, 0);
        assert_eq!(summary[0].failed_runs, 1);
        assert_eq!(summary[0].contract_pass_rate, 0.0);
    }
}
