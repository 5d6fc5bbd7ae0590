//! PostgreSQL store implementation.

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};
use time::OffsetDateTime;

use super::{
    DueDateStore, HistoryEntry, InstanceUpdate, NewHistoryEntry, Store, UnitOfWork,
    WorkflowInstance, WorkflowQueryStore,
};
use crate::definition::CorrelationId;
use crate::error::{Error, Result};

const INSTANCE_COLUMNS: &str = "id, workflow_type, correlation_id, state, assignee, due_at, \
                                variables, version, created_at, updated_at";

/// PostgreSQL-backed store for production use.
///
/// Uses row-level locking via `SELECT ... FOR UPDATE` on the
/// `workflow_instances` table for per-instance write serialization, plus a
/// version-checked final `UPDATE` so stale writes surface as
/// [`Error::ConcurrencyConflict`] even on backends or paths without the lock.
///
/// # Database Schema
///
/// Requires tables in the `flowgate` schema (see `migrations/`):
///
/// | Table                | Purpose                                          |
/// |----------------------|--------------------------------------------------|
/// | `workflow_instances` | One row per instance: state, variables, due date |
/// | `workflow_history`   | Append-only audit trail                          |
///
/// # Concurrency
///
/// Different instances execute concurrently (different rows). Triggers for
/// the same instance serialize on the row lock; the loser re-reads committed
/// state and its trigger is re-evaluated against it.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Create a new PostgreSQL store from a connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The embedded migrator for the flowgate schema.
    pub fn migrator() -> sqlx::migrate::Migrator {
        sqlx::migrate!("./migrations")
    }
}

fn instance_from_row(row: &PgRow) -> Result<WorkflowInstance> {
    Ok(WorkflowInstance {
        id: row.try_get("id").map_err(Error::from)?,
        workflow_type: row.try_get("workflow_type").map_err(Error::from)?,
        correlation_id: CorrelationId::new(
            row.try_get::<String, _>("correlation_id").map_err(Error::from)?,
        ),
        state: row.try_get("state").map_err(Error::from)?,
        assignee: row.try_get("assignee").map_err(Error::from)?,
        due_at: row.try_get("due_at").map_err(Error::from)?,
        variables: row.try_get("variables").map_err(Error::from)?,
        version: row.try_get("version").map_err(Error::from)?,
        created_at: row.try_get("created_at").map_err(Error::from)?,
        updated_at: row.try_get("updated_at").map_err(Error::from)?,
    })
}

fn history_from_row(row: &PgRow) -> Result<HistoryEntry> {
    Ok(HistoryEntry {
        instance_id: row.try_get("instance_id").map_err(Error::from)?,
        from_state: row.try_get("from_state").map_err(Error::from)?,
        to_state: row.try_get("to_state").map_err(Error::from)?,
        trigger: row.try_get("trigger_name").map_err(Error::from)?,
        actor: row.try_get("actor").map_err(Error::from)?,
        recorded_at: row.try_get("recorded_at").map_err(Error::from)?,
    })
}

impl Store for PgStore {
    type UnitOfWork<'a>
        = PgUnitOfWork<'a>
    where
        Self: 'a;

    async fn begin<'a>(
        &'a self,
        workflow_type: &str,
        correlation_id: &CorrelationId,
        initial_state: &str,
    ) -> Result<(WorkflowInstance, Self::UnitOfWork<'a>)> {
        let mut tx = self.pool.begin().await?;

        // Find-or-create inside the transaction: the insert rolls back with
        // an aborted trigger, so a guard-rejected first call leaves no row.
        sqlx::query(
            "INSERT INTO flowgate.workflow_instances (workflow_type, correlation_id, state)
             VALUES ($1, $2, $3)
             ON CONFLICT (workflow_type, correlation_id) DO NOTHING",
        )
        .bind(workflow_type)
        .bind(correlation_id.as_str())
        .bind(initial_state)
        .execute(&mut *tx)
        .await?;

        // Row lock serializes concurrent triggers for the same instance.
        let row = sqlx::query(&format!(
            "SELECT {INSTANCE_COLUMNS} FROM flowgate.workflow_instances
             WHERE workflow_type = $1 AND correlation_id = $2
             FOR UPDATE"
        ))
        .bind(workflow_type)
        .bind(correlation_id.as_str())
        .fetch_one(&mut *tx)
        .await?;

        let instance = instance_from_row(&row)?;

        let uow = PgUnitOfWork {
            tx,
            instance_id: instance.id,
            workflow_type: instance.workflow_type.clone(),
            correlation_id: instance.correlation_id.clone(),
            expected_version: instance.version,
        };

        Ok((instance, uow))
    }
}

/// PostgreSQL unit of work.
///
/// Wraps a transaction with the instance's row lock held until commit.
/// Dropping it without committing rolls everything back, releasing the lock.
pub struct PgUnitOfWork<'a> {
    tx: Transaction<'a, Postgres>,
    instance_id: uuid::Uuid,
    workflow_type: String,
    correlation_id: CorrelationId,
    expected_version: i64,
}

impl UnitOfWork for PgUnitOfWork<'_> {
    async fn apply_transition(&mut self, update: InstanceUpdate) -> Result<()> {
        let result = sqlx::query(
            "UPDATE flowgate.workflow_instances
             SET state = $1,
                 variables = $2,
                 assignee = $3,
                 due_at = $4,
                 version = version + 1,
                 updated_at = now()
             WHERE id = $5 AND version = $6",
        )
        .bind(&update.state)
        .bind(&update.variables)
        .bind(&update.assignee)
        .bind(update.due_at)
        .bind(self.instance_id)
        .bind(self.expected_version)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Error::conflict(
                self.workflow_type.clone(),
                self.correlation_id.as_str(),
            ));
        }

        Ok(())
    }

    async fn append_history(&mut self, entry: NewHistoryEntry) -> Result<()> {
        sqlx::query(
            "INSERT INTO flowgate.workflow_history
                 (instance_id, from_state, to_state, trigger_name, actor)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(self.instance_id)
        .bind(&entry.from_state)
        .bind(&entry.to_state)
        .bind(&entry.trigger)
        .bind(&entry.actor)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn commit(self) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl WorkflowQueryStore for PgStore {
    async fn get_instance(
        &self,
        workflow_type: &str,
        correlation_id: &CorrelationId,
    ) -> Result<WorkflowInstance> {
        let row = sqlx::query(&format!(
            "SELECT {INSTANCE_COLUMNS} FROM flowgate.workflow_instances
             WHERE workflow_type = $1 AND correlation_id = $2"
        ))
        .bind(workflow_type)
        .bind(correlation_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => instance_from_row(&row),
            None => Err(Error::not_found(workflow_type, correlation_id.as_str())),
        }
    }

    async fn fetch_history(
        &self,
        workflow_type: &str,
        correlation_id: &CorrelationId,
    ) -> Result<Vec<HistoryEntry>> {
        let instance = self.get_instance(workflow_type, correlation_id).await?;

        let rows = sqlx::query(
            "SELECT instance_id, from_state, to_state, trigger_name, actor, recorded_at
             FROM flowgate.workflow_history
             WHERE instance_id = $1
             ORDER BY id ASC",
        )
        .bind(instance.id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(history_from_row).collect()
    }

    async fn list_instances(
        &self,
        workflow_type: Option<&str>,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<WorkflowInstance>> {
        let rows = if let Some(workflow_type) = workflow_type {
            sqlx::query(&format!(
                "SELECT {INSTANCE_COLUMNS} FROM flowgate.workflow_instances
                 WHERE workflow_type = $1
                 ORDER BY updated_at DESC
                 LIMIT $2 OFFSET $3"
            ))
            .bind(workflow_type)
            .bind(limit as i64)
            .bind(offset as i64)
            .fetch_all(&self.pool)
            .await?
        } else {
            sqlx::query(&format!(
                "SELECT {INSTANCE_COLUMNS} FROM flowgate.workflow_instances
                 ORDER BY updated_at DESC
                 LIMIT $1 OFFSET $2"
            ))
            .bind(limit as i64)
            .bind(offset as i64)
            .fetch_all(&self.pool)
            .await?
        };

        rows.iter().map(instance_from_row).collect()
    }
}

#[async_trait]
impl DueDateStore for PgStore {
    async fn fetch_due_instances(
        &self,
        now: OffsetDateTime,
        limit: u32,
    ) -> Result<Vec<WorkflowInstance>> {
        let rows = sqlx::query(&format!(
            "SELECT {INSTANCE_COLUMNS} FROM flowgate.workflow_instances
             WHERE due_at IS NOT NULL AND due_at <= $1
             ORDER BY due_at ASC
             LIMIT $2"
        ))
        .bind(now)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(instance_from_row).collect()
    }

    async fn defer_due_date(
        &self,
        workflow_type: &str,
        correlation_id: &CorrelationId,
        until: OffsetDateTime,
    ) -> Result<()> {
        let result = sqlx::query(
            "UPDATE flowgate.workflow_instances
             SET due_at = $1
             WHERE workflow_type = $2 AND correlation_id = $3",
        )
        .bind(until)
        .bind(workflow_type)
        .bind(correlation_id.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Error::not_found(workflow_type, correlation_id.as_str()));
        }

        Ok(())
    }
}
