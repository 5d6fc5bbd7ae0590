//! Storage abstraction for workflow instances and their audit history.
//!
//! This module provides the [`Store`] and [`UnitOfWork`] traits that abstract
//! over different storage backends. Two implementations are provided:
//!
//! - [`MemoryStore`] — in-process storage for embedding and tests
//! - [`PgStore`] — PostgreSQL storage for production (requires `postgres` feature)

mod memory;
#[cfg(feature = "postgres")]
mod postgres;

use std::future::Future;

use async_trait::async_trait;
use serde_json::Value;
use time::OffsetDateTime;
use uuid::Uuid;

pub use memory::MemoryStore;
#[cfg(feature = "postgres")]
pub use postgres::PgStore;

use crate::definition::CorrelationId;
use crate::error::Result;

/// The durable record for one workflow instance.
///
/// Keyed by `(workflow_type, correlation_id)`. Created lazily inside the
/// first trigger's transaction, never deleted by the engine, and mutated only
/// through a [`UnitOfWork`].
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowInstance {
    /// Surrogate row id, referenced by history entries.
    pub id: Uuid,
    /// The workflow type this instance belongs to.
    pub workflow_type: String,
    /// The caller-owned identity of the tracked entity.
    pub correlation_id: CorrelationId,
    /// The current state.
    pub state: String,
    /// Optional assignee, maintained by actions.
    pub assignee: Option<String>,
    /// When set, the scheduler re-triggers the instance at/after this time.
    pub due_at: Option<OffsetDateTime>,
    /// The serialized variable bag, absent until the first committed trigger
    /// writes one.
    pub variables: Option<Value>,
    /// Monotonic write counter backing the stale-write check.
    pub version: i64,
    /// When the record was created.
    pub created_at: OffsetDateTime,
    /// When the record was last committed.
    pub updated_at: OffsetDateTime,
}

/// One immutable audit-trail entry, appended per committed transition.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    /// The instance this entry belongs to.
    pub instance_id: Uuid,
    /// The state the transition left.
    pub from_state: String,
    /// The state the transition entered.
    pub to_state: String,
    /// The trigger that caused the transition.
    pub trigger: String,
    /// Who requested the trigger, if known.
    pub actor: Option<String>,
    /// When the transition was committed.
    pub recorded_at: OffsetDateTime,
}

/// A history entry to append, before the store stamps it.
#[derive(Debug, Clone)]
pub struct NewHistoryEntry {
    /// The state the transition left.
    pub from_state: String,
    /// The state the transition entered.
    pub to_state: String,
    /// The trigger that caused the transition.
    pub trigger: String,
    /// Who requested the trigger, if known.
    pub actor: Option<String>,
}

/// The full replacement write a successful trigger commits.
///
/// The variable bag, assignee and due date are replaced wholesale — a `None`
/// due date clears any stored one.
#[derive(Debug, Clone)]
pub struct InstanceUpdate {
    /// The new current state.
    pub state: String,
    /// The serialized variable bag after the action ran.
    pub variables: Value,
    /// The assignee after the action ran.
    pub assignee: Option<String>,
    /// The due date after the action ran; `None` clears it.
    pub due_at: Option<OffsetDateTime>,
}

/// Storage backend for workflow instances.
///
/// Implementations must provide transactional semantics with per-instance
/// write isolation: [`Store::begin`] finds or creates the durable record for
/// `(workflow_type, correlation_id)` inside a transaction, so that the
/// creation itself rolls back if the trigger aborts, and returns a snapshot
/// of the record plus a [`UnitOfWork`] for the write phase.
///
/// Callers normally don't use this trait directly — the
/// [`WorkflowService`](crate::WorkflowService) orchestrates the full trigger
/// cycle.
pub trait Store: Send + Sync + Clone + 'static {
    /// The unit of work type returned by this store.
    type UnitOfWork<'a>: UnitOfWork + Send
    where
        Self: 'a;

    /// Begin a transaction for one workflow instance.
    ///
    /// Finds the record keyed by `(workflow_type, correlation_id)` or creates
    /// it in `initial_state`, acquires the per-instance write lock where the
    /// backend supports one, and returns the record as seen at the start of
    /// the transaction.
    fn begin<'a>(
        &'a self,
        workflow_type: &str,
        correlation_id: &CorrelationId,
        initial_state: &str,
    ) -> impl Future<Output = Result<(WorkflowInstance, Self::UnitOfWork<'a>)>> + Send;
}

/// A transactional unit of work for a single workflow instance.
///
/// Changes are only persisted when [`commit`](Self::commit) is called —
/// dropping the unit of work without committing rolls back everything,
/// including a record created by [`Store::begin`].
///
/// Commit performs a stale-write check against the version seen at begin and
/// fails with [`Error::ConcurrencyConflict`](crate::Error::ConcurrencyConflict)
/// if another writer got there first.
pub trait UnitOfWork: Send {
    /// Stage the instance's replacement write.
    fn apply_transition(
        &mut self,
        update: InstanceUpdate,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Append one audit-trail entry.
    fn append_history(
        &mut self,
        entry: NewHistoryEntry,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Commit the unit of work, persisting all changes atomically.
    fn commit(self) -> impl Future<Output = Result<()>> + Send;
}

/// Read-only queries over stored instances and history.
///
/// Queries for an unknown instance fail with
/// [`Error::NotFound`](crate::Error::NotFound) rather than returning a
/// default.
#[async_trait]
pub trait WorkflowQueryStore: Send + Sync + Clone + 'static {
    /// Fetch one instance by key.
    async fn get_instance(
        &self,
        workflow_type: &str,
        correlation_id: &CorrelationId,
    ) -> Result<WorkflowInstance>;

    /// Fetch an instance's history, oldest first (reconstruction order).
    async fn fetch_history(
        &self,
        workflow_type: &str,
        correlation_id: &CorrelationId,
    ) -> Result<Vec<HistoryEntry>>;

    /// List instances, optionally filtered by type, most recently updated first.
    async fn list_instances(
        &self,
        workflow_type: Option<&str>,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<WorkflowInstance>>;
}

/// Storage operations used by the due-date scheduler.
#[async_trait]
pub trait DueDateStore: Send + Sync + Clone + 'static {
    /// Fetch instances whose due date is set and has elapsed, earliest first.
    async fn fetch_due_instances(
        &self,
        now: OffsetDateTime,
        limit: u32,
    ) -> Result<Vec<WorkflowInstance>>;

    /// Push an instance's due date to `until`.
    ///
    /// Used by the scheduler to defer instances whose re-trigger failed, so a
    /// permanently failing instance is retried on a backoff instead of every
    /// tick.
    async fn defer_due_date(
        &self,
        workflow_type: &str,
        correlation_id: &CorrelationId,
        until: OffsetDateTime,
    ) -> Result<()>;
}
