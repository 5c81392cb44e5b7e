//! SQLite implementation of [`TrajectoryStore`] and [`FileCache`].
//!
//! Timestamps are stored as RFC 3339 text with fixed microsecond precision
//! so lexical order is chronological.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use patchwright_core::error::StoreError;
use patchwright_core::instance::Instance;
use patchwright_core::store::{FileCache, Finalization, NewAction, TrajectoryStore};
use patchwright_core::tool::{ToolErrorCode, ToolOutcome};
use patchwright_core::trajectory::{Action, CacheEntry, Run, RunId, RunStatus};
use sha2::{Digest, Sha256};
use sqlx::sqlite::{
    Sqlite, SqliteConnectOptions, SqliteConnection, SqliteJournalMode, SqlitePoolOptions,
    SqliteRow, SqliteSynchronous,
};
use sqlx::{Row, SqlitePool};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

use crate::catalog::row_to_instance;

/// The production trajectory store.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if missing) a database from a SQLite URL or bare path.
    ///
    /// Pass `"sqlite::memory:"` for an ephemeral database (useful for tests).
    pub async fn open(url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| StoreError::Storage(format!("Invalid SQLite path: {e}")))?;
        let store = Self::connect(options, url.contains(":memory:")).await?;
        info!("SQLite trajectory store initialized at {url}");
        Ok(store)
    }

    /// Open a database file, creating parent directories as needed.
    pub async fn open_file(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                StoreError::Storage(format!("Failed to create {}: {e}", parent.display()))
            })?;
        }
        let options = SqliteConnectOptions::new().filename(path);
        let store = Self::connect(options, false).await?;
        info!("SQLite trajectory store initialized at {}", path.display());
        Ok(store)
    }

    async fn connect(options: SqliteConnectOptions, in_memory: bool) -> Result<Self, StoreError> {
        let options = options
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(10))
            .pragma("foreign_keys", "ON");

        // Every connection to `:memory:` is its own database
        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(4)
        };

        let pool = pool_options
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Storage(format!("Failed to open SQLite: {e}")))?;

        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Wait for in-flight queries and close every connection.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn run_migrations(&self) -> Result<(), StoreError> {
        let statements: [(&str, &str); 8] = [
            (
                "instances table",
                r#"
                CREATE TABLE IF NOT EXISTS instances (
                    instance_id       TEXT PRIMARY KEY,
                    repo              TEXT NOT NULL,
                    base_commit       TEXT NOT NULL,
                    problem_statement TEXT NOT NULL,
                    hints             TEXT,
                    test_patch        TEXT NOT NULL DEFAULT '',
                    version           TEXT,
                    fail_to_pass      TEXT NOT NULL DEFAULT '[]',
                    pass_to_pass      TEXT NOT NULL DEFAULT '[]',
                    created_at        TEXT NOT NULL
                )
                "#,
            ),
            (
                "runs table",
                r#"
                CREATE TABLE IF NOT EXISTS runs (
                    run_id      TEXT PRIMARY KEY,
                    instance_id TEXT NOT NULL REFERENCES instances(instance_id),
                    oracle_id   TEXT NOT NULL,
                    status      TEXT NOT NULL,
                    steps       INTEGER NOT NULL DEFAULT 0,
                    final_patch TEXT,
                    resolved    INTEGER NOT NULL DEFAULT 0,
                    error       TEXT,
                    started_at  TEXT NOT NULL,
                    finished_at TEXT
                )
                "#,
            ),
            (
                "single running run index",
                r#"
                CREATE UNIQUE INDEX IF NOT EXISTS idx_runs_one_running
                ON runs(instance_id, oracle_id) WHERE status = 'running'
                "#,
            ),
            (
                "runs started_at index",
                "CREATE INDEX IF NOT EXISTS idx_runs_started_at ON runs(started_at DESC)",
            ),
            (
                "actions table",
                r#"
                CREATE TABLE IF NOT EXISTS actions (
                    run_id    TEXT NOT NULL REFERENCES runs(run_id),
                    step      INTEGER NOT NULL,
                    tool_name TEXT NOT NULL,
                    input     TEXT NOT NULL,
                    success   INTEGER NOT NULL,
                    output    TEXT NOT NULL,
                    error     TEXT,
                    code      TEXT,
                    timestamp TEXT NOT NULL,
                    PRIMARY KEY (run_id, step)
                )
                "#,
            ),
            (
                "evaluations table",
                r#"
                CREATE TABLE IF NOT EXISTS evaluations (
                    run_id      TEXT PRIMARY KEY REFERENCES runs(run_id),
                    instance_id TEXT NOT NULL,
                    oracle_id   TEXT NOT NULL,
                    resolved    INTEGER NOT NULL,
                    details     TEXT,
                    timestamp   TEXT NOT NULL
                )
                "#,
            ),
            (
                "file cache table",
                r#"
                CREATE TABLE IF NOT EXISTS file_cache (
                    repo      TEXT NOT NULL,
                    revision  TEXT NOT NULL,
                    path      TEXT NOT NULL,
                    content   TEXT NOT NULL,
                    digest    TEXT NOT NULL,
                    cached_at TEXT NOT NULL,
                    PRIMARY KEY (repo, revision, path)
                )
                "#,
            ),
            (
                "file cache digest index",
                "CREATE INDEX IF NOT EXISTS idx_file_cache_digest ON file_cache(digest)",
            ),
        ];

        for (name, sql) in statements {
            sqlx::query(sql)
                .execute(&self.pool)
                .await
                .map_err(|e| StoreError::MigrationFailed(format!("{name}: {e}")))?;
        }

        debug!("SQLite migrations complete");
        Ok(())
    }

    /// Explain why a guarded run update matched no rows.
    async fn diagnose(conn: &mut SqliteConnection, run_id: &RunId, got: u32) -> StoreError {
        let row = sqlx::query("SELECT status, steps FROM runs WHERE run_id = ?1")
            .bind(run_id.as_str())
            .fetch_optional(&mut *conn)
            .await;

        let row = match row {
            Ok(Some(row)) => row,
            Ok(None) => return StoreError::RunNotFound(run_id.clone()),
            Err(e) => return StoreError::QueryFailed(format!("run lookup: {e}")),
        };
        let status = match column::<String>(&row, "status").and_then(|s| parse_status(&s)) {
            Ok(status) => status,
            Err(e) => return e,
        };
        if status != RunStatus::Running {
            return StoreError::NotRunning {
                run_id: run_id.clone(),
                status,
            };
        }
        match column::<i64>(&row, "steps") {
            Ok(steps) => StoreError::NonContiguousStep {
                run_id: run_id.clone(),
                expected: steps as u32 + 1,
                got,
            },
            Err(e) => e,
        }
    }

    /// Advance a running run by one step and insert the action.
    ///
    /// The guarded UPDATE runs first so the transaction holds the write
    /// lock before it reads anything.
    async fn advance(
        conn: &mut SqliteConnection,
        action: &NewAction,
        finalization: Option<&Finalization>,
    ) -> Result<(), StoreError> {
        let previous = i64::from(action.step) - 1;

        let updated = match finalization {
            None => sqlx::query(
                "UPDATE runs SET steps = ?1 WHERE run_id = ?2 AND status = 'running' AND steps = ?3",
            )
            .bind(i64::from(action.step))
            .bind(action.run_id.as_str())
            .bind(previous)
            .execute(&mut *conn)
            .await,
            Some(fin) => sqlx::query(
                r#"
                UPDATE runs
                SET steps = ?1, status = ?4, final_patch = ?5, resolved = ?6, error = ?7, finished_at = ?8
                WHERE run_id = ?2 AND status = 'running' AND steps = ?3
                "#,
            )
            .bind(i64::from(action.step))
            .bind(action.run_id.as_str())
            .bind(previous)
            .bind(fin.status.as_str())
            .bind(&fin.final_patch)
            .bind(fin.resolved)
            .bind(&fin.error)
            .bind(timestamp(&Utc::now()))
            .execute(&mut *conn)
            .await,
        }
        .map_err(|e| StoreError::Storage(format!("UPDATE run failed: {e}")))?;

        if updated.rows_affected() != 1 {
            return Err(Self::diagnose(conn, &action.run_id, action.step).await);
        }

        let input = serde_json::to_string(&action.input)
            .map_err(|e| StoreError::Storage(format!("Input serialization: {e}")))?;
        sqlx::query(
            r#"
            INSERT INTO actions (run_id, step, tool_name, input, success, output, error, code, timestamp)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(action.run_id.as_str())
        .bind(i64::from(action.step))
        .bind(&action.tool_name)
        .bind(&input)
        .bind(action.outcome.success)
        .bind(&action.outcome.output)
        .bind(&action.outcome.error)
        .bind(action.outcome.code.map(|c| c.as_str()))
        .bind(timestamp(&action.timestamp))
        .execute(&mut *conn)
        .await
        .map_err(|e| StoreError::Storage(format!("INSERT action failed: {e}")))?;

        Ok(())
    }

    fn check_transition(run_id: &RunId, finalization: &Finalization) -> Result<(), StoreError> {
        if RunStatus::Running.can_transition_to(finalization.status) {
            Ok(())
        } else {
            Err(StoreError::InvalidTransition {
                run_id: run_id.clone(),
                status: finalization.status,
            })
        }
    }

    pub(crate) fn row_to_run(row: &SqliteRow) -> Result<Run, StoreError> {
        let finished_at: Option<String> = column(row, "finished_at")?;
        Ok(Run {
            run_id: RunId(column(row, "run_id")?),
            instance_id: column(row, "instance_id")?,
            oracle_id: column(row, "oracle_id")?,
            status: parse_status(&column::<String>(row, "status")?)?,
            steps: column::<i64>(row, "steps")? as u32,
            final_patch: column(row, "final_patch")?,
            resolved: column::<i64>(row, "resolved")? != 0,
            error: column(row, "error")?,
            started_at: parse_timestamp(&column::<String>(row, "started_at")?)?,
            finished_at: finished_at.as_deref().map(parse_timestamp).transpose()?,
        })
    }

    fn row_to_action(row: &SqliteRow) -> Result<Action, StoreError> {
        let input: String = column(row, "input")?;
        let code: Option<String> = column(row, "code")?;
        Ok(Action {
            run_id: RunId(column(row, "run_id")?),
            step: column::<i64>(row, "step")? as u32,
            tool_name: column(row, "tool_name")?,
            input: serde_json::from_str(&input)
                .map_err(|e| StoreError::QueryFailed(format!("input column: {e}")))?,
            outcome: ToolOutcome {
                success: column::<i64>(row, "success")? != 0,
                output: column(row, "output")?,
                error: column(row, "error")?,
                code: code
                    .as_deref()
                    .map(ToolErrorCode::from_str)
                    .transpose()
                    .map_err(StoreError::QueryFailed)?,
            },
            timestamp: parse_timestamp(&column::<String>(row, "timestamp")?)?,
        })
    }
}

impl SqliteStore {
    /// Overwrite a stored instance with `instance`. Runs already recorded
    /// against the old row keep pointing at the same id.
    pub async fn replace_instance(&self, instance: &Instance) -> Result<(), StoreError> {
        self.write_instance(instance, true).await?;
        info!(instance_id = %instance.instance_id, "Instance replaced");
        Ok(())
    }

    /// Insert `instance`, overwriting an existing row only when `replace`
    /// is set. Returns whether a row was written.
    async fn write_instance(&self, instance: &Instance, replace: bool) -> Result<bool, StoreError> {
        let fail_to_pass = serde_json::to_string(&instance.fail_to_pass)
            .map_err(|e| StoreError::Storage(format!("fail_to_pass serialization: {e}")))?;
        let pass_to_pass = serde_json::to_string(&instance.pass_to_pass)
            .map_err(|e| StoreError::Storage(format!("pass_to_pass serialization: {e}")))?;

        let on_conflict = if replace {
            r#"DO UPDATE SET
                repo = excluded.repo,
                base_commit = excluded.base_commit,
                problem_statement = excluded.problem_statement,
                hints = excluded.hints,
                test_patch = excluded.test_patch,
                version = excluded.version,
                fail_to_pass = excluded.fail_to_pass,
                pass_to_pass = excluded.pass_to_pass"#
        } else {
            "DO NOTHING"
        };
        let sql = format!(
            r#"
            INSERT INTO instances (instance_id, repo, base_commit, problem_statement, hints,
                                   test_patch, version, fail_to_pass, pass_to_pass, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            ON CONFLICT(instance_id) {on_conflict}
            "#
        );

        let result = sqlx::query(&sql)
            .bind(&instance.instance_id)
            .bind(&instance.repo)
            .bind(&instance.base_commit)
            .bind(&instance.problem_statement)
            .bind(&instance.hints)
            .bind(&instance.test_patch)
            .bind(&instance.version)
            .bind(&fail_to_pass)
            .bind(&pass_to_pass)
            .bind(timestamp(&Utc::now()))
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Storage(format!("INSERT instance failed: {e}")))?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl TrajectoryStore for SqliteStore {
    async fn register_instance(&self, instance: &Instance) -> Result<(), StoreError> {
        let inserted = self.write_instance(instance, false).await?;
        if inserted {
            debug!(instance_id = %instance.instance_id, "Stored instance");
            return Ok(());
        }

        match self.get_instance(&instance.instance_id).await? {
            Some(stored) if stored == *instance => Ok(()),
            Some(_) => Err(StoreError::InstanceConflict(instance.instance_id.clone())),
            None => Err(StoreError::InstanceNotFound(instance.instance_id.clone())),
        }
    }

    async fn get_instance(&self, instance_id: &str) -> Result<Option<Instance>, StoreError> {
        let row = sqlx::query("SELECT * FROM instances WHERE instance_id = ?1")
            .bind(instance_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("GET instance: {e}")))?;

        row.as_ref().map(row_to_instance).transpose()
    }

    async fn create_run(&self, instance_id: &str, oracle_id: &str) -> Result<RunId, StoreError> {
        let run_id = RunId::new();
        let result = sqlx::query(
            r#"
            INSERT INTO runs (run_id, instance_id, oracle_id, status, steps, resolved, started_at)
            VALUES (?1, ?2, ?3, 'running', 0, 0, ?4)
            "#,
        )
        .bind(run_id.as_str())
        .bind(instance_id)
        .bind(oracle_id)
        .bind(timestamp(&Utc::now()))
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => {
                info!(run_id = %run_id, instance_id, oracle_id, "Run created");
                Ok(run_id)
            }
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                let existing = self.latest_running_run(instance_id, oracle_id).await?;
                Err(StoreError::RunConflict {
                    instance_id: instance_id.to_string(),
                    oracle_id: oracle_id.to_string(),
                    run_id: existing.map_or_else(|| RunId::from("unknown"), |r| r.run_id),
                })
            }
            Err(sqlx::Error::Database(db)) if db.is_foreign_key_violation() => {
                Err(StoreError::InstanceNotFound(instance_id.to_string()))
            }
            Err(e) => Err(StoreError::Storage(format!("INSERT run failed: {e}"))),
        }
    }

    async fn append_action(&self, action: &NewAction) -> Result<(), StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::Storage(format!("BEGIN failed: {e}")))?;
        Self::advance(&mut tx, action, None).await?;
        tx.commit()
            .await
            .map_err(|e| StoreError::Storage(format!("COMMIT failed: {e}")))?;

        debug!(
            run_id = %action.run_id,
            step = action.step,
            tool = %action.tool_name,
            success = action.outcome.success,
            "Action committed"
        );
        Ok(())
    }

    async fn append_final_action(
        &self,
        action: &NewAction,
        finalization: &Finalization,
    ) -> Result<(), StoreError> {
        Self::check_transition(&action.run_id, finalization)?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::Storage(format!("BEGIN failed: {e}")))?;
        match Self::advance(&mut tx, action, Some(finalization)).await {
            Ok(()) => {}
            Err(StoreError::NotRunning { run_id, status }) => {
                drop(tx);
                // A retry of a commit that already landed is a no-op
                if let Some(run) = self.get_run(&run_id).await?
                    && run.steps == action.step
                    && finalization.matches(&run)
                {
                    return Ok(());
                }
                return Err(StoreError::NotRunning { run_id, status });
            }
            Err(e) => return Err(e),
        }
        tx.commit()
            .await
            .map_err(|e| StoreError::Storage(format!("COMMIT failed: {e}")))?;

        info!(
            run_id = %action.run_id,
            steps = action.step,
            status = %finalization.status,
            "Run finalized"
        );
        Ok(())
    }

    async fn finalize_run(&self, run_id: &RunId, finalization: &Finalization) -> Result<(), StoreError> {
        Self::check_transition(run_id, finalization)?;

        let updated = sqlx::query(
            r#"
            UPDATE runs
            SET status = ?2, final_patch = ?3, resolved = ?4, error = ?5, finished_at = ?6
            WHERE run_id = ?1 AND status = 'running'
            "#,
        )
        .bind(run_id.as_str())
        .bind(finalization.status.as_str())
        .bind(&finalization.final_patch)
        .bind(finalization.resolved)
        .bind(&finalization.error)
        .bind(timestamp(&Utc::now()))
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("UPDATE run failed: {e}")))?;

        if updated.rows_affected() == 1 {
            info!(run_id = %run_id, status = %finalization.status, "Run finalized");
            return Ok(());
        }

        match self.get_run(run_id).await? {
            None => Err(StoreError::RunNotFound(run_id.clone())),
            Some(run) if finalization.matches(&run) => Ok(()),
            Some(run) => Err(StoreError::NotRunning {
                run_id: run_id.clone(),
                status: run.status,
            }),
        }
    }

    async fn get_run(&self, run_id: &RunId) -> Result<Option<Run>, StoreError> {
        let row = sqlx::query("SELECT * FROM runs WHERE run_id = ?1")
            .bind(run_id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("GET run: {e}")))?;

        row.as_ref().map(Self::row_to_run).transpose()
    }

    async fn get_run_actions(&self, run_id: &RunId) -> Result<Vec<Action>, StoreError> {
        let rows = sqlx::query("SELECT * FROM actions WHERE run_id = ?1 ORDER BY step ASC")
            .bind(run_id.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("GET actions: {e}")))?;

        rows.iter().map(Self::row_to_action).collect()
    }

    async fn latest_running_run(
        &self,
        instance_id: &str,
        oracle_id: &str,
    ) -> Result<Option<Run>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT * FROM runs
            WHERE instance_id = ?1 AND oracle_id = ?2 AND status = 'running'
            ORDER BY started_at DESC
            LIMIT 1
            "#,
        )
        .bind(instance_id)
        .bind(oracle_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("running run lookup: {e}")))?;

        row.as_ref().map(Self::row_to_run).transpose()
    }
}

#[async_trait]
impl FileCache for SqliteStore {
    async fn cached_file(
        &self,
        repo: &str,
        revision: &str,
        path: &str,
    ) -> Result<Option<CacheEntry>, StoreError> {
        let row = sqlx::query(
            "SELECT * FROM file_cache WHERE repo = ?1 AND revision = ?2 AND path = ?3",
        )
        .bind(repo)
        .bind(revision)
        .bind(path)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("cache lookup: {e}")))?;

        let Some(row) = row else {
            return Ok(None);
        };
        Ok(Some(CacheEntry {
            repo: column(&row, "repo")?,
            revision: column(&row, "revision")?,
            path: column(&row, "path")?,
            content: column(&row, "content")?,
            digest: column(&row, "digest")?,
            cached_at: parse_timestamp(&column::<String>(&row, "cached_at")?)?,
        }))
    }

    async fn cache_file(
        &self,
        repo: &str,
        revision: &str,
        path: &str,
        content: &str,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO file_cache (repo, revision, path, content, digest, cached_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(repo, revision, path) DO UPDATE SET
                content = excluded.content,
                digest = excluded.digest,
                cached_at = excluded.cached_at
            "#,
        )
        .bind(repo)
        .bind(revision)
        .bind(path)
        .bind(content)
        .bind(content_digest(content))
        .bind(timestamp(&Utc::now()))
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("cache store failed: {e}")))?;

        Ok(())
    }
}

/// Hex SHA-256 of file content.
pub fn content_digest(content: &str) -> String {
    Sha256::digest(content.as_bytes())
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

pub(crate) fn column<'r, T>(row: &'r SqliteRow, name: &str) -> Result<T, StoreError>
where
    T: sqlx::Decode<'r, Sqlite> + sqlx::Type<Sqlite>,
{
    row.try_get(name)
        .map_err(|e| StoreError::QueryFailed(format!("{name} column: {e}")))
}

pub(crate) fn timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::QueryFailed(format!("bad timestamp '{raw}': {e}")))
}

pub(crate) fn parse_status(raw: &str) -> Result<RunStatus, StoreError> {
    raw.parse().map_err(StoreError::QueryFailed)
}
