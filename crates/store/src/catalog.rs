//! Instances, run listings, evaluations and aggregate statistics.

use chrono::Utc;
use patchwright_core::error::StoreError;
use patchwright_core::instance::Instance;
use patchwright_core::store::TrajectoryStore;
use patchwright_core::trajectory::{Evaluation, Run, RunId, RunStatus};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use tracing::info;

use crate::sqlite::{SqliteStore, column, parse_status, parse_timestamp, timestamp};

/// Aggregate counts over the whole database.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreStatistics {
    pub instances: u64,
    pub runs: u64,
    pub running: u64,
    pub completed: u64,
    pub failed: u64,
    pub exhausted: u64,
    pub actions: u64,
    pub evaluations: u64,
    pub resolved: u64,

    /// Mean step count over finished runs
    pub average_steps: f64,
}

impl StoreStatistics {
    /// Share of evaluated runs that resolved their instance.
    pub fn resolve_rate(&self) -> f64 {
        if self.evaluations == 0 {
            0.0
        } else {
            self.resolved as f64 / self.evaluations as f64
        }
    }
}

/// A run as listed, with the verdict of its evaluation if one exists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    #[serde(flatten)]
    pub run: Run,
    pub verdict: Option<bool>,
}

impl SqliteStore {
    pub async fn list_instances(&self, limit: usize) -> Result<Vec<Instance>, StoreError> {
        let rows = sqlx::query("SELECT * FROM instances ORDER BY instance_id ASC LIMIT ?1")
            .bind(limit as i64)
            .fetch_all(self.pool())
            .await
            .map_err(|e| StoreError::QueryFailed(format!("LIST instances: {e}")))?;

        rows.iter().map(row_to_instance).collect()
    }

    /// Most recent runs first, optionally for one instance.
    pub async fn list_runs(
        &self,
        instance_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<RunSummary>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT runs.*, evaluations.resolved AS verdict
            FROM runs
            LEFT JOIN evaluations ON evaluations.run_id = runs.run_id
            WHERE ?1 IS NULL OR runs.instance_id = ?1
            ORDER BY runs.started_at DESC
            LIMIT ?2
            "#,
        )
        .bind(instance_id)
        .bind(limit as i64)
        .fetch_all(self.pool())
        .await
        .map_err(|e| StoreError::QueryFailed(format!("LIST runs: {e}")))?;

        rows.iter()
            .map(|row| {
                Ok(RunSummary {
                    run: Self::row_to_run(row)?,
                    verdict: column::<Option<i64>>(row, "verdict")?.map(|v| v != 0),
                })
            })
            .collect()
    }

    /// Record the external verdict for a finished run. The run row itself
    /// is left alone. Recording again replaces the earlier verdict.
    pub async fn record_evaluation(
        &self,
        run_id: &RunId,
        resolved: bool,
        details: Option<&str>,
    ) -> Result<Evaluation, StoreError> {
        let run = self
            .get_run(run_id)
            .await?
            .ok_or_else(|| StoreError::RunNotFound(run_id.clone()))?;
        if !run.status.is_terminal() {
            return Err(StoreError::RunNotFinished(run_id.clone()));
        }

        let evaluation = Evaluation {
            instance_id: run.instance_id,
            run_id: run_id.clone(),
            resolved,
            oracle_id: run.oracle_id,
            details: details.map(String::from),
            timestamp: Utc::now(),
        };

        sqlx::query(
            r#"
            INSERT INTO evaluations (run_id, instance_id, oracle_id, resolved, details, timestamp)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(run_id) DO UPDATE SET
                resolved = excluded.resolved,
                details = excluded.details,
                timestamp = excluded.timestamp
            "#,
        )
        .bind(evaluation.run_id.as_str())
        .bind(&evaluation.instance_id)
        .bind(&evaluation.oracle_id)
        .bind(evaluation.resolved)
        .bind(&evaluation.details)
        .bind(timestamp(&evaluation.timestamp))
        .execute(self.pool())
        .await
        .map_err(|e| StoreError::Storage(format!("INSERT evaluation failed: {e}")))?;

        info!(run_id = %run_id, resolved, "Evaluation recorded");
        Ok(evaluation)
    }

    pub async fn get_evaluation(&self, run_id: &RunId) -> Result<Option<Evaluation>, StoreError> {
        let row = sqlx::query("SELECT * FROM evaluations WHERE run_id = ?1")
            .bind(run_id.as_str())
            .fetch_optional(self.pool())
            .await
            .map_err(|e| StoreError::QueryFailed(format!("GET evaluation: {e}")))?;

        let Some(row) = row else {
            return Ok(None);
        };
        Ok(Some(Evaluation {
            instance_id: column(&row, "instance_id")?,
            run_id: RunId(column(&row, "run_id")?),
            resolved: column::<i64>(&row, "resolved")? != 0,
            oracle_id: column(&row, "oracle_id")?,
            details: column(&row, "details")?,
            timestamp: parse_timestamp(&column::<String>(&row, "timestamp")?)?,
        }))
    }

    pub async fn statistics(&self) -> Result<StoreStatistics, StoreError> {
        let mut stats = StoreStatistics {
            instances: self.count("SELECT COUNT(*) AS cnt FROM instances").await?,
            actions: self.count("SELECT COUNT(*) AS cnt FROM actions").await?,
            evaluations: self.count("SELECT COUNT(*) AS cnt FROM evaluations").await?,
            resolved: self
                .count("SELECT COUNT(*) AS cnt FROM evaluations WHERE resolved != 0")
                .await?,
            ..StoreStatistics::default()
        };

        let rows = sqlx::query("SELECT status, COUNT(*) AS cnt FROM runs GROUP BY status")
            .fetch_all(self.pool())
            .await
            .map_err(|e| StoreError::QueryFailed(format!("status counts: {e}")))?;
        for row in &rows {
            let count = column::<i64>(row, "cnt")? as u64;
            stats.runs += count;
            match parse_status(&column::<String>(row, "status")?)? {
                RunStatus::Running => stats.running = count,
                RunStatus::Completed => stats.completed = count,
                RunStatus::Failed => stats.failed = count,
                RunStatus::Exhausted => stats.exhausted = count,
            }
        }

        let row = sqlx::query("SELECT AVG(steps) AS avg_steps FROM runs WHERE status != 'running'")
            .fetch_one(self.pool())
            .await
            .map_err(|e| StoreError::QueryFailed(format!("average steps: {e}")))?;
        stats.average_steps = column::<Option<f64>>(&row, "avg_steps")?.unwrap_or(0.0);

        Ok(stats)
    }

    async fn count(&self, sql: &str) -> Result<u64, StoreError> {
        let row = sqlx::query(sql)
            .fetch_one(self.pool())
            .await
            .map_err(|e| StoreError::QueryFailed(format!("COUNT: {e}")))?;
        Ok(column::<i64>(&row, "cnt")? as u64)
    }
}

pub(crate) fn row_to_instance(row: &SqliteRow) -> Result<Instance, StoreError> {
    let fail_to_pass: String = column(row, "fail_to_pass")?;
    let pass_to_pass: String = column(row, "pass_to_pass")?;
    Ok(Instance {
        instance_id: column(row, "instance_id")?,
        repo: column(row, "repo")?,
        base_commit: column(row, "base_commit")?,
        problem_statement: column(row, "problem_statement")?,
        hints: column(row, "hints")?,
        test_patch: column(row, "test_patch")?,
        version: column(row, "version")?,
        fail_to_pass: serde_json::from_str(&fail_to_pass)
            .map_err(|e| StoreError::QueryFailed(format!("fail_to_pass column: {e}")))?,
        pass_to_pass: serde_json::from_str(&pass_to_pass)
            .map_err(|e| StoreError::QueryFailed(format!("pass_to_pass column: {e}")))?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use patchwright_core::store::{Finalization, NewAction};
    use patchwright_core::tool::ToolOutcome;

    async fn seeded() -> (SqliteStore, RunId, RunId) {
        let store = SqliteStore::open("sqlite::memory:").await.unwrap();
        for id in ["demo__a-1", "demo__b-2"] {
            store
                .register_instance(&Instance::new(id, "demo/demo", "abc", "bug"))
                .await
                .unwrap();
        }
        let done = store.create_run("demo__a-1", "scripted").await.unwrap();
        for step in 1..=4 {
            store
                .append_action(&NewAction::new(
                    done.clone(),
                    step,
                    "get_diff",
                    serde_json::json!({}),
                    ToolOutcome::ok("No changes"),
                ))
                .await
                .unwrap();
        }
        store
            .finalize_run(&done, &Finalization::completed("diff"))
            .await
            .unwrap();
        let live = store.create_run("demo__b-2", "scripted").await.unwrap();
        (store, done, live)
    }

    #[tokio::test]
    async fn list_instances_is_sorted_and_limited() {
        let (store, _, _) = seeded().await;
        let all = store.list_instances(10).await.unwrap();
        assert_eq!(
            all.iter().map(|i| i.instance_id.as_str()).collect::<Vec<_>>(),
            vec!["demo__a-1", "demo__b-2"]
        );
        assert_eq!(store.list_instances(1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn list_runs_filters_by_instance() {
        let (store, done, _) = seeded().await;
        assert_eq!(store.list_runs(None, 10).await.unwrap().len(), 2);

        let only_a = store.list_runs(Some("demo__a-1"), 10).await.unwrap();
        assert_eq!(only_a.len(), 1);
        assert_eq!(only_a[0].run.run_id, done);
        assert_eq!(only_a[0].verdict, None);

        store.record_evaluation(&done, true, None).await.unwrap();
        let only_a = store.list_runs(Some("demo__a-1"), 10).await.unwrap();
        assert_eq!(only_a[0].verdict, Some(true));
    }

    #[tokio::test]
    async fn evaluation_is_stored_apart_from_the_run() {
        let (store, done, _) = seeded().await;
        let evaluation = store
            .record_evaluation(&done, true, Some("2/2 FAIL_TO_PASS passing"))
            .await
            .unwrap();
        assert_eq!(evaluation.instance_id, "demo__a-1");
        assert_eq!(evaluation.oracle_id, "scripted");

        let loaded = store.get_evaluation(&done).await.unwrap().unwrap();
        assert!(loaded.resolved);
        assert_eq!(loaded.details.as_deref(), Some("2/2 FAIL_TO_PASS passing"));
        assert!(!store.get_run(&done).await.unwrap().unwrap().resolved);

        // Re-evaluation replaces the verdict
        store.record_evaluation(&done, false, None).await.unwrap();
        assert!(!store.get_evaluation(&done).await.unwrap().unwrap().resolved);
    }

    #[tokio::test]
    async fn finalize_retry_still_matches_after_evaluation() {
        let (store, _, live) = seeded().await;
        let exhausted = Finalization::exhausted(Some("partial diff".into()));
        store.finalize_run(&live, &exhausted).await.unwrap();
        store.record_evaluation(&live, true, None).await.unwrap();

        store.finalize_run(&live, &exhausted).await.unwrap();
        let run = store.get_run(&live).await.unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Exhausted);
        assert!(!run.resolved);
        assert!(store.get_evaluation(&live).await.unwrap().unwrap().resolved);
    }

    #[tokio::test]
    async fn running_or_unknown_runs_cannot_be_evaluated() {
        let (store, _, live) = seeded().await;
        assert!(matches!(
            store.record_evaluation(&live, true, None).await,
            Err(StoreError::RunNotFinished(_))
        ));
        assert!(matches!(
            store.record_evaluation(&RunId::from("ghost"), true, None).await,
            Err(StoreError::RunNotFound(_))
        ));
        assert!(store.get_evaluation(&live).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn statistics_aggregate_counts() {
        let (store, done, _) = seeded().await;
        store.record_evaluation(&done, true, None).await.unwrap();

        let stats = store.statistics().await.unwrap();
        assert_eq!(stats.instances, 2);
        assert_eq!(stats.runs, 2);
        assert_eq!(stats.running, 1);
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.failed, 0);
        assert_eq!(stats.actions, 4);
        assert_eq!(stats.evaluations, 1);
        assert_eq!(stats.resolved, 1);
        assert!((stats.average_steps - 4.0).abs() < f64::EPSILON);
        assert!((stats.resolve_rate() - 1.0).abs() < f64::EPSILON);
    }
}
