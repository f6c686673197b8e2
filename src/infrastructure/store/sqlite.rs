//! SQLite task store.
//!
//! WAL-mode pool, schema created on connect, and a single-statement
//! `task_field_update` so concurrent workers never observe a half-applied
//! field set.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow,
    SqliteSynchronous,
};
use sqlx::Row;
use uuid::Uuid;

use crate::domain::error::StoreError;
use crate::domain::models::{
    ActionResult, OrchestratorAction, ResultDetail, Task, TaskFieldUpdate, TaskScope, TaskStatus,
};
use crate::domain::ports::TaskStore;

const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS tasks (
    id            TEXT PRIMARY KEY,
    parent_id     TEXT,
    action        TEXT NOT NULL,
    design_ref    TEXT NOT NULL,
    site_name     TEXT NOT NULL,
    scope         TEXT NOT NULL,
    node_list     TEXT NOT NULL,
    status        TEXT NOT NULL,
    result        TEXT NOT NULL,
    result_detail TEXT NOT NULL,
    created_at    TEXT NOT NULL,
    updated_at    TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_tasks_parent_id ON tasks(parent_id);
";

/// Task store backed by SQLite through sqlx.
pub struct SqliteTaskStore {
    pool: SqlitePool,
}

impl SqliteTaskStore {
    /// Connect to a database URL, creating the file and schema as needed.
    ///
    /// The pool runs WAL journaling with NORMAL synchronous writes and a
    /// 5 second busy timeout.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| StoreError::Backend(format!("invalid database URL: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(backend)?;

        let store = Self { pool };
        store.ensure_schema().await?;
        Ok(store)
    }

    /// Open a private in-memory database. One connection only, since each
    /// SQLite memory database is connection-local.
    pub async fn in_memory() -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| StoreError::Backend(format!("invalid database URL: {e}")))?
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(backend)?;

        let store = Self { pool };
        store.ensure_schema().await?;
        Ok(store)
    }

    async fn ensure_schema(&self) -> Result<(), StoreError> {
        for statement in SCHEMA.split(';').filter(|s| !s.trim().is_empty()) {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(backend)?;
        }
        Ok(())
    }

    fn row_to_task(row: &SqliteRow) -> Result<Task, StoreError> {
        let id = parse_uuid(&row.get::<String, _>("id"))?;
        let parent_id = row
            .get::<Option<String>, _>("parent_id")
            .as_deref()
            .map(parse_uuid)
            .transpose()?;
        let action = OrchestratorAction::from_str(&row.get::<String, _>("action"))
            .ok_or_else(|| StoreError::Serialization("unknown action".to_string()))?;
        let status = TaskStatus::from_str(&row.get::<String, _>("status"))
            .ok_or_else(|| StoreError::Serialization("unknown status".to_string()))?;
        let result = ActionResult::from_str(&row.get::<String, _>("result"))
            .ok_or_else(|| StoreError::Serialization("unknown result".to_string()))?;
        let scope: TaskScope = decode_json(&row.get::<String, _>("scope"))?;
        let node_list: Vec<String> = decode_json(&row.get::<String, _>("node_list"))?;
        let result_detail: ResultDetail = decode_json(&row.get::<String, _>("result_detail"))?;

        Ok(Task {
            id,
            parent_id,
            action,
            design_ref: row.get("design_ref"),
            site_name: row.get("site_name"),
            scope,
            node_list,
            status,
            result,
            result_detail,
            subtasks: Vec::new(),
            created_at: parse_datetime(&row.get::<String, _>("created_at"))?,
            updated_at: parse_datetime(&row.get::<String, _>("updated_at"))?,
        })
    }
}

#[async_trait]
impl TaskStore for SqliteTaskStore {
    async fn create_task(&self, task: &Task) -> Result<(), StoreError> {
        let scope = encode_json(&task.scope)?;
        let node_list = encode_json(&task.node_list)?;
        let result_detail = encode_json(&task.result_detail)?;

        sqlx::query(
            r"
            INSERT INTO tasks (
                id, parent_id, action, design_ref, site_name, scope,
                node_list, status, result, result_detail, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ",
        )
        .bind(task.id.to_string())
        .bind(task.parent_id.map(|id| id.to_string()))
        .bind(task.action.as_str())
        .bind(&task.design_ref)
        .bind(&task.site_name)
        .bind(scope)
        .bind(node_list)
        .bind(task.status.as_str())
        .bind(task.result.as_str())
        .bind(result_detail)
        .bind(task.created_at.to_rfc3339())
        .bind(task.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        Ok(())
    }

    async fn get_task(&self, id: Uuid) -> Result<Option<Task>, StoreError> {
        let row = sqlx::query("SELECT * FROM tasks WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;

        let Some(row) = row else {
            return Ok(None);
        };
        let mut task = Self::row_to_task(&row)?;

        let child_rows =
            sqlx::query("SELECT id FROM tasks WHERE parent_id = ? ORDER BY created_at, id")
                .bind(id.to_string())
                .fetch_all(&self.pool)
                .await
                .map_err(backend)?;
        task.subtasks = child_rows
            .iter()
            .map(|r| parse_uuid(&r.get::<String, _>("id")))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Some(task))
    }

    async fn task_field_update(&self, id: Uuid, update: TaskFieldUpdate) -> Result<(), StoreError> {
        let status = update.status.map(|s| s.as_str());
        let result = update.result.map(|r| r.as_str());
        let result_detail = update
            .result_detail
            .as_ref()
            .map(encode_json)
            .transpose()?;

        // COALESCE keeps the stored value for fields the update omits, so
        // the whole field set lands in one statement.
        let outcome = sqlx::query(
            r"
            UPDATE tasks SET
                status        = COALESCE(?, status),
                result        = COALESCE(?, result),
                result_detail = COALESCE(?, result_detail),
                updated_at    = ?
            WHERE id = ?
            ",
        )
        .bind(status)
        .bind(result)
        .bind(result_detail)
        .bind(Utc::now().to_rfc3339())
        .bind(id.to_string())
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        if outcome.rows_affected() == 0 {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }

    async fn subtasks(&self, parent_id: Uuid) -> Result<Vec<Task>, StoreError> {
        let rows = sqlx::query("SELECT * FROM tasks WHERE parent_id = ? ORDER BY created_at, id")
            .bind(parent_id.to_string())
            .fetch_all(&self.pool)
            .await
            .map_err(backend)?;

        rows.iter().map(Self::row_to_task).collect()
    }
}

fn backend(err: sqlx::Error) -> StoreError {
    StoreError::Backend(err.to_string())
}

fn parse_uuid(s: &str) -> Result<Uuid, StoreError> {
    Uuid::parse_str(s).map_err(|e| StoreError::Serialization(format!("bad uuid {s}: {e}")))
}

fn parse_datetime(s: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Serialization(format!("bad timestamp {s}: {e}")))
}

fn encode_json<T: serde::Serialize>(value: &T) -> Result<String, StoreError> {
    serde_json::to_string(value).map_err(|e| StoreError::Serialization(e.to_string()))
}

fn decode_json<T: serde::de::DeserializeOwned>(raw: &str) -> Result<T, StoreError> {
    serde_json::from_str(raw).map_err(|e| StoreError::Serialization(e.to_string()))
}
