use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, SecondsFormat, Utc};
use futures::future::BoxFuture;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use braid_core::error::{BraidError, Result};
use braid_core::traits::StateRepository;
use braid_core::types::{RunFilter, RunId, RunSummary, WorkflowState, WorkflowStatus};

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS workflow_runs (
        run_id TEXT PRIMARY KEY,
        workflow_id TEXT NOT NULL,
        status TEXT NOT NULL,
        current_node TEXT,
        state_json TEXT NOT NULL,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_runs_status
        ON workflow_runs(status, updated_at DESC);

    CREATE INDEX IF NOT EXISTS idx_runs_workflow
        ON workflow_runs(workflow_id, updated_at DESC);";

/// Durable repository backed by SQLite.
///
/// One row per run, upserted on every save (latest wins). The full state is
/// stored as JSON; status, workflow and timestamps are duplicated into
/// columns for listing.
pub struct SqliteStateRepository {
    conn: Mutex<Connection>,
}

impl SqliteStateRepository {
    /// Open or create the database at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                BraidError::Database(format!("Failed to create db directory: {}", e))
            })?;
        }

        let conn = Connection::open(path).map_err(db_err)?;

        // WAL keeps readers (the CLI) from blocking a running engine
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(db_err)?;
        conn.execute_batch(SCHEMA).map_err(db_err)?;

        debug!(path = %path.display(), "Run store opened");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database (for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        conn.execute_batch(SCHEMA).map_err(db_err)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| BraidError::Database(e.to_string()))
    }
}

fn db_err(e: rusqlite::Error) -> BraidError {
    BraidError::Database(e.to_string())
}

/// Fixed-width so `ORDER BY updated_at` sorts chronologically.
fn timestamp(t: &DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_time(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

impl StateRepository for SqliteStateRepository {
    fn save<'a>(&'a self, state: &'a WorkflowState) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let json = serde_json::to_string(state)?;
            let conn = self.lock()?;
            conn.execute(
                "INSERT INTO workflow_runs
                     (run_id, workflow_id, status, current_node, state_json, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(run_id) DO UPDATE SET
                     workflow_id = excluded.workflow_id,
                     status = excluded.status,
                     current_node = excluded.current_node,
                     state_json = excluded.state_json,
                     updated_at = excluded.updated_at",
                params![
                    state.run_id.as_str(),
                    state.workflow_id,
                    state.status.as_str(),
                    state.current_node,
                    json,
                    timestamp(&state.created_at),
                    timestamp(&state.updated_at),
                ],
            )
            .map_err(db_err)?;
            Ok(())
        })
    }

    fn find<'a>(&'a self, run_id: &'a RunId) -> BoxFuture<'a, Result<Option<WorkflowState>>> {
        Box::pin(async move {
            let json: Option<String> = {
                let conn = self.lock()?;
                conn.query_row(
                    "SELECT state_json FROM workflow_runs WHERE run_id = ?1",
                    params![run_id.as_str()],
                    |row| row.get(0),
                )
                .optional()
                .map_err(db_err)?
            };
            match json {
                Some(json) => Ok(Some(serde_json::from_str(&json)?)),
                None => Ok(None),
            }
        })
    }

    fn list<'a>(&'a self, filter: &'a RunFilter) -> BoxFuture<'a, Result<Vec<RunSummary>>> {
        Box::pin(async move {
            let conn = self.lock()?;
            let mut stmt = conn
                .prepare(
                    "SELECT run_id, workflow_id, status, current_node, updated_at
                     FROM workflow_runs
                     WHERE (?1 IS NULL OR status = ?1)
                       AND (?2 IS NULL OR workflow_id = ?2)
                     ORDER BY updated_at DESC
                     LIMIT ?3",
                )
                .map_err(db_err)?;

            let limit = filter.limit.map(|l| l as i64).unwrap_or(-1);
            let rows = stmt
                .query_map(
                    params![
                        filter.status.map(|s| s.as_str()),
                        filter.workflow_id.as_deref(),
                        limit
                    ],
                    |row| {
                        let status: String = row.get(2)?;
                        let updated_at: String = row.get(4)?;
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, String>(1)?,
                            status,
                            row.get::<_, Option<String>>(3)?,
                            updated_at,
                        ))
                    },
                )
                .map_err(db_err)?;

            let mut summaries = Vec::new();
            for row in rows {
                let (run_id, workflow_id, status, current_node, updated_at) = row.map_err(db_err)?;
                summaries.push(RunSummary {
                    run_id: RunId::from(run_id),
                    workflow_id,
                    status: status.parse::<WorkflowStatus>()?,
                    current_node,
                    updated_at: parse_time(&updated_at),
                });
            }
            Ok(summaries)
        })
    }

    fn delete<'a>(&'a self, run_id: &'a RunId) -> BoxFuture<'a, Result<bool>> {
        Box::pin(async move {
            let conn = self.lock()?;
            let deleted = conn
                .execute(
                    "DELETE FROM workflow_runs WHERE run_id = ?1",
                    params![run_id.as_str()],
                )
                .map_err(db_err)?;
            Ok(deleted > 0)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use braid_core::types::PauseReason;
    use serde_json::json;

    fn state(run: &str) -> WorkflowState {
        WorkflowState::new("wf", RunId::from(run), "start")
    }

    #[tokio::test]
    async fn test_roundtrip_preserves_state() {
        let repo = SqliteStateRepository::in_memory().unwrap();
        let mut s = state("r1").paused(
            PauseReason::new("Continue?").with_metadata("awaiting_input", json!(true)),
        );
        s.data.insert("answer".into(), json!({"nested": [1, 2]}));
        repo.save(&s).await.unwrap();

        let found = repo.find(&RunId::from("r1")).await.unwrap().unwrap();
        assert_eq!(found, s);
    }

    #[tokio::test]
    async fn test_upsert_latest_wins() {
        let repo = SqliteStateRepository::in_memory().unwrap();
        let s = state("r1");
        repo.save(&s).await.unwrap();
        repo.save(&s.completed()).await.unwrap();

        let found = repo.find(&RunId::from("r1")).await.unwrap().unwrap();
        assert_eq!(found.status, WorkflowStatus::Completed);
        assert_eq!(repo.list(&RunFilter::default()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_list_filters() {
        let repo = SqliteStateRepository::in_memory().unwrap();
        repo.save(&state("a")).await.unwrap();
        repo.save(&state("b").paused(PauseReason::new("p"))).await.unwrap();
        let mut other = WorkflowState::new("other", RunId::from("c"), "x");
        other.status = WorkflowStatus::Paused;
        repo.save(&other).await.unwrap();

        let paused = repo
            .list(&RunFilter {
                status: Some(WorkflowStatus::Paused),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(paused.len(), 2);

        let paused_wf = repo
            .list(&RunFilter {
                status: Some(WorkflowStatus::Paused),
                workflow_id: Some("wf".into()),
                limit: None,
            })
            .await
            .unwrap();
        assert_eq!(paused_wf.len(), 1);
        assert_eq!(paused_wf[0].run_id, RunId::from("b"));
        assert_eq!(paused_wf[0].current_node.as_deref(), Some("start"));

        let limited = repo
            .list(&RunFilter {
                limit: Some(2),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(limited.len(), 2);
    }

    #[tokio::test]
    async fn test_delete() {
        let repo = SqliteStateRepository::in_memory().unwrap();
        repo.save(&state("gone")).await.unwrap();
        assert!(repo.delete(&RunId::from("gone")).await.unwrap());
        assert!(!repo.delete(&RunId::from("gone")).await.unwrap());
        assert!(repo.find(&RunId::from("gone")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("runs.db");

        {
            let repo = SqliteStateRepository::open(&path).unwrap();
            repo.save(&state("durable").paused(PauseReason::new("later")))
                .await
                .unwrap();
        }

        let reopened = SqliteStateRepository::open(&path).unwrap();
        let found = reopened.find(&RunId::from("durable")).await.unwrap().unwrap();
        assert!(found.is_paused());
        assert_eq!(found.pause_reason.unwrap().message, "later");
    }
}
