use std::str::FromStr;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

use crate::{OutputPersister, OutputRecord, Step, StepStore, StoreError, StoredWorkflow};

/// SQLite-based store implementation.
#[derive(Debug, Clone)]
pub struct SqliteStore {
  pool: SqlitePool,
}

impl SqliteStore {
  /// Create a new SQLite store with the given connection pool.
  pub fn new(pool: SqlitePool) -> Self {
    Self { pool }
  }

  /// Open (creating if needed) the database at `url`.
  pub async fn connect(url: &str) -> Result<Self, StoreError> {
    let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
    let pool = SqlitePoolOptions::new().connect_with(options).await?;
    Ok(Self::new(pool))
  }

  /// A private in-memory database. One connection, so every query sees
  /// the same database.
  pub async fn in_memory() -> Result<Self, StoreError> {
    let pool = SqlitePoolOptions::new()
      .max_connections(1)
      .connect("sqlite::memory:")
      .await?;
    Ok(Self::new(pool))
  }

  /// Run database migrations.
  pub async fn migrate(&self) -> Result<(), StoreError> {
    sqlx::migrate!("../../migrations").run(&self.pool).await?;
    Ok(())
  }

  /// Outputs saved for a workflow, newest first.
  pub async fn list_outputs(&self, workflow_id: &str) -> Result<Vec<OutputRecord>, StoreError> {
    let records = sqlx::query_as(
      r#"
            SELECT output_id, execution_id, workflow_id, step_id, node_id, node_name, node_type,
                   output_type, content_url, content_text, prompt, metadata, created_at
            FROM workflow_outputs
            WHERE workflow_id = ?
            ORDER BY created_at DESC
            "#,
    )
    .bind(workflow_id)
    .fetch_all(&self.pool)
    .await?;
    Ok(records)
  }
}

#[async_trait]
impl OutputPersister for SqliteStore {
  async fn persist_output(&self, record: &OutputRecord) -> Result<(), StoreError> {
    sqlx::query(
      r#"
            INSERT INTO workflow_outputs (output_id, execution_id, workflow_id, step_id, node_id,
                node_name, node_type, output_type, content_url, content_text, prompt, metadata, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
    )
    .bind(&record.output_id)
    .bind(&record.execution_id)
    .bind(&record.workflow_id)
    .bind(&record.step_id)
    .bind(&record.node_id)
    .bind(&record.node_name)
    .bind(&record.node_type)
    .bind(record.output_type)
    .bind(&record.content_url)
    .bind(&record.content_text)
    .bind(&record.prompt)
    .bind(&record.metadata)
    .bind(record.created_at)
    .execute(&self.pool)
    .await?;

    Ok(())
  }
}

#[async_trait]
impl StepStore for SqliteStore {
  async fn save_workflow(&self, workflow: &StoredWorkflow) -> Result<(), StoreError> {
    sqlx::query(
      r#"
            INSERT INTO workflows (workflow_id, name, definition, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT (workflow_id) DO UPDATE
            SET name = excluded.name, definition = excluded.definition, updated_at = excluded.updated_at
            "#,
    )
    .bind(&workflow.workflow_id)
    .bind(&workflow.name)
    .bind(&workflow.definition)
    .bind(workflow.created_at)
    .bind(workflow.updated_at)
    .execute(&self.pool)
    .await?;

    Ok(())
  }

  async fn get_workflow(&self, workflow_id: &str) -> Result<StoredWorkflow, StoreError> {
    sqlx::query_as(
      r#"
            SELECT workflow_id, name, definition, created_at, updated_at
            FROM workflows
            WHERE workflow_id = ?
            "#,
    )
    .bind(workflow_id)
    .fetch_optional(&self.pool)
    .await?
    .ok_or_else(|| StoreError::NotFound(format!("workflow '{}'", workflow_id)))
  }

  async fn create_step(&self, step: &Step) -> Result<(), StoreError> {
    sqlx::query(
      r#"
            INSERT INTO steps (step_id, workflow_id, board_id, step_order, status, inputs,
                output_data, metadata, error_message, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
    )
    .bind(&step.step_id)
    .bind(&step.workflow_id)
    .bind(&step.board_id)
    .bind(step.step_order)
    .bind(step.status)
    .bind(&step.inputs)
    .bind(&step.output_data)
    .bind(&step.metadata)
    .bind(&step.error_message)
    .bind(step.created_at)
    .bind(step.updated_at)
    .execute(&self.pool)
    .await?;

    Ok(())
  }

  async fn get_step(&self, step_id: &str) -> Result<Step, StoreError> {
    sqlx::query_as(
      r#"
            SELECT step_id, workflow_id, board_id, step_order, status, inputs, output_data,
                   metadata, error_message, created_at, updated_at
            FROM steps
            WHERE step_id = ?
            "#,
    )
    .bind(step_id)
    .fetch_optional(&self.pool)
    .await?
    .ok_or_else(|| StoreError::NotFound(format!("step '{}'", step_id)))
  }

  async fn update_step(&self, step: &Step) -> Result<(), StoreError> {
    let result = sqlx::query(
      r#"
            UPDATE steps
            SET status = ?, inputs = ?, output_data = ?, metadata = ?, error_message = ?, updated_at = ?
            WHERE step_id = ?
            "#,
    )
    .bind(step.status)
    .bind(&step.inputs)
    .bind(&step.output_data)
    .bind(&step.metadata)
    .bind(&step.error_message)
    .bind(Utc::now())
    .bind(&step.step_id)
    .execute(&self.pool)
    .await?;

    if result.rows_affected() == 0 {
      return Err(StoreError::NotFound(format!("step '{}'", step.step_id)));
    }
    Ok(())
  }

  async fn list_board_steps(&self, board_id: &str) -> Result<Vec<Step>, StoreError> {
    let steps = sqlx::query_as(
      r#"
            SELECT step_id, workflow_id, board_id, step_order, status, inputs, output_data,
                   metadata, error_message, created_at, updated_at
            FROM steps
            WHERE board_id = ?
            ORDER BY step_order ASC
            "#,
    )
    .bind(board_id)
    .fetch_all(&self.pool)
    .await?;
    Ok(steps)
  }
}
