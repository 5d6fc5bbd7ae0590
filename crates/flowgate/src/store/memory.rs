//! In-process store for embedding and tests.

use std::collections::HashMap;
use std::sync::Arc;

use time::OffsetDateTime;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{
    DueDateStore, HistoryEntry, InstanceUpdate, NewHistoryEntry, Store, UnitOfWork,
    WorkflowInstance, WorkflowQueryStore,
};
use crate::definition::CorrelationId;
use crate::error::{Error, Result};

#[derive(Default)]
struct Inner {
    instances: HashMap<(String, String), WorkflowInstance>,
    history: Vec<HistoryEntry>,
}

/// In-process storage backend.
///
/// Suitable for embedding the engine without a database and for scenario
/// tests. Writers are isolated by an optimistic version check at commit: the
/// unit of work snapshots the record at [`Store::begin`] and commit fails
/// with [`Error::ConcurrencyConflict`] if the stored version moved in the
/// meantime. Uncommitted units of work hold no shared state, so dropping one
/// rolls back for free — including the not-yet-inserted record of a fresh
/// instance.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of stored instances, across all workflow types.
    pub async fn instance_count(&self) -> usize {
        self.inner.lock().await.instances.len()
    }

    /// Total number of stored history entries, across all instances.
    pub async fn history_count(&self) -> usize {
        self.inner.lock().await.history.len()
    }
}

fn key(workflow_type: &str, correlation_id: &CorrelationId) -> (String, String) {
    (
        workflow_type.to_owned(),
        correlation_id.as_str().to_owned(),
    )
}

impl Store for MemoryStore {
    type UnitOfWork<'a>
        = MemoryUnitOfWork
    where
        Self: 'a;

    async fn begin<'a>(
        &'a self,
        workflow_type: &str,
        correlation_id: &CorrelationId,
        initial_state: &str,
    ) -> Result<(WorkflowInstance, Self::UnitOfWork<'a>)> {
        let inner = self.inner.lock().await;

        let (instance, created) = match inner.instances.get(&key(workflow_type, correlation_id)) {
            Some(existing) => (existing.clone(), false),
            None => {
                let now = OffsetDateTime::now_utc();
                let fresh = WorkflowInstance {
                    id: Uuid::new_v4(),
                    workflow_type: workflow_type.to_owned(),
                    correlation_id: correlation_id.clone(),
                    state: initial_state.to_owned(),
                    assignee: None,
                    due_at: None,
                    variables: None,
                    version: 0,
                    created_at: now,
                    updated_at: now,
                };
                (fresh, true)
            }
        };

        let uow = MemoryUnitOfWork {
            store: self.clone(),
            instance: instance.clone(),
            created,
            update: None,
            history: Vec::new(),
        };

        Ok((instance, uow))
    }
}

/// Unit of work over [`MemoryStore`].
///
/// Buffers the staged write and history entries; nothing touches the shared
/// map until [`commit`](UnitOfWork::commit).
pub struct MemoryUnitOfWork {
    store: MemoryStore,
    instance: WorkflowInstance,
    created: bool,
    update: Option<InstanceUpdate>,
    history: Vec<NewHistoryEntry>,
}

impl UnitOfWork for MemoryUnitOfWork {
    async fn apply_transition(&mut self, update: InstanceUpdate) -> Result<()> {
        self.update = Some(update);
        Ok(())
    }

    async fn append_history(&mut self, entry: NewHistoryEntry) -> Result<()> {
        self.history.push(entry);
        Ok(())
    }

    async fn commit(self) -> Result<()> {
        let Some(update) = self.update else {
            // Nothing staged: a no-op commit persists nothing, so an aborted
            // trigger leaves no trace of a freshly created record.
            return Ok(());
        };

        let mut inner = self.store.inner.lock().await;
        let k = key(&self.instance.workflow_type, &self.instance.correlation_id);
        let now = OffsetDateTime::now_utc();

        let conflict = || {
            Error::conflict(
                self.instance.workflow_type.clone(),
                self.instance.correlation_id.as_str(),
            )
        };

        let committed = if self.created {
            if inner.instances.contains_key(&k) {
                // Someone else created the row since begin.
                return Err(conflict());
            }
            let mut row = self.instance.clone();
            row.state = update.state;
            row.variables = Some(update.variables);
            row.assignee = update.assignee;
            row.due_at = update.due_at;
            row.version = 1;
            row.updated_at = now;
            inner.instances.insert(k, row.clone());
            row
        } else {
            let Some(row) = inner.instances.get_mut(&k) else {
                return Err(conflict());
            };
            if row.version != self.instance.version {
                return Err(conflict());
            }
            row.state = update.state;
            row.variables = Some(update.variables);
            row.assignee = update.assignee;
            row.due_at = update.due_at;
            row.version += 1;
            row.updated_at = now;
            row.clone()
        };

        for entry in self.history {
            inner.history.push(HistoryEntry {
                instance_id: committed.id,
                from_state: entry.from_state,
                to_state: entry.to_state,
                trigger: entry.trigger,
                actor: entry.actor,
                recorded_at: now,
            });
        }

        Ok(())
    }
}

#[async_trait::async_trait]
impl WorkflowQueryStore for MemoryStore {
    async fn get_instance(
        &self,
        workflow_type: &str,
        correlation_id: &CorrelationId,
    ) -> Result<WorkflowInstance> {
        self.inner
            .lock()
            .await
            .instances
            .get(&key(workflow_type, correlation_id))
            .cloned()
            .ok_or_else(|| Error::not_found(workflow_type, correlation_id.as_str()))
    }

    async fn fetch_history(
        &self,
        workflow_type: &str,
        correlation_id: &CorrelationId,
    ) -> Result<Vec<HistoryEntry>> {
        let inner = self.inner.lock().await;
        let instance = inner
            .instances
            .get(&key(workflow_type, correlation_id))
            .ok_or_else(|| Error::not_found(workflow_type, correlation_id.as_str()))?;

        // Insertion order is creation order.
        Ok(inner
            .history
            .iter()
            .filter(|h| h.instance_id == instance.id)
            .cloned()
            .collect())
    }

    async fn list_instances(
        &self,
        workflow_type: Option<&str>,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<WorkflowInstance>> {
        let inner = self.inner.lock().await;
        let mut instances: Vec<WorkflowInstance> = inner
            .instances
            .values()
            .filter(|i| workflow_type.map_or(true, |t| i.workflow_type == t))
            .cloned()
            .collect();
        instances.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(instances
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect())
    }
}

#[async_trait::async_trait]
impl DueDateStore for MemoryStore {
    async fn fetch_due_instances(
        &self,
        now: OffsetDateTime,
        limit: u32,
    ) -> Result<Vec<WorkflowInstance>> {
        let inner = self.inner.lock().await;
        let mut due: Vec<WorkflowInstance> = inner
            .instances
            .values()
            .filter(|i| i.due_at.is_some_and(|at| at <= now))
            .cloned()
            .collect();
        due.sort_by_key(|i| i.due_at);
        due.truncate(limit as usize);
        Ok(due)
    }

    async fn defer_due_date(
        &self,
        workflow_type: &str,
        correlation_id: &CorrelationId,
        until: OffsetDateTime,
    ) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let row = inner
            .instances
            .get_mut(&key(workflow_type, correlation_id))
            .ok_or_else(|| Error::not_found(workflow_type, correlation_id.as_str()))?;
        row.due_at = Some(until);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn update(state: &str) -> InstanceUpdate {
        InstanceUpdate {
            state: state.to_owned(),
            variables: serde_json::json!({}),
            assignee: None,
            due_at: None,
        }
    }

    #[tokio::test]
    async fn begin_does_not_materialize_fresh_instances() {
        let store = MemoryStore::new();
        let id = CorrelationId::new("c-1");

        let (instance, uow) = store.begin("holiday", &id, "Requested").await.unwrap();
        assert_eq!(instance.state, "Requested");
        assert_eq!(instance.version, 0);
        drop(uow);

        assert_eq!(store.instance_count().await, 0);
    }

    #[tokio::test]
    async fn commit_without_staged_update_is_a_noop() {
        let store = MemoryStore::new();
        let id = CorrelationId::new("c-1");

        let (_, uow) = store.begin("holiday", &id, "Requested").await.unwrap();
        uow.commit().await.unwrap();

        assert_eq!(store.instance_count().await, 0);
    }

    #[tokio::test]
    async fn commit_persists_update_and_history() {
        let store = MemoryStore::new();
        let id = CorrelationId::new("c-1");

        let (_, mut uow) = store.begin("holiday", &id, "Requested").await.unwrap();
        uow.apply_transition(update("Approved")).await.unwrap();
        uow.append_history(NewHistoryEntry {
            from_state: "Requested".into(),
            to_state: "Approved".into(),
            trigger: "approve".into(),
            actor: None,
        })
        .await
        .unwrap();
        uow.commit().await.unwrap();

        let stored = store.get_instance("holiday", &id).await.unwrap();
        assert_eq!(stored.state, "Approved");
        assert_eq!(stored.version, 1);

        let history = store.fetch_history("holiday", &id).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].trigger, "approve");
    }

    #[tokio::test]
    async fn stale_version_conflicts() {
        let store = MemoryStore::new();
        let id = CorrelationId::new("c-1");

        // Two units of work snapshot the same (absent) record.
        let (_, mut first) = store.begin("holiday", &id, "Requested").await.unwrap();
        let (_, mut second) = store.begin("holiday", &id, "Requested").await.unwrap();

        first.apply_transition(update("Approved")).await.unwrap();
        first.commit().await.unwrap();

        second.apply_transition(update("Rejected")).await.unwrap();
        let err = second.commit().await.unwrap_err();
        assert!(matches!(err, Error::ConcurrencyConflict { .. }));

        let stored = store.get_instance("holiday", &id).await.unwrap();
        assert_eq!(stored.state, "Approved");
    }

    #[tokio::test]
    async fn unknown_instance_queries_are_not_found() {
        let store = MemoryStore::new();
        let id = CorrelationId::new("ghost");

        assert!(matches!(
            store.get_instance("holiday", &id).await.unwrap_err(),
            Error::NotFound { .. }
        ));
        assert!(matches!(
            store.fetch_history("holiday", &id).await.unwrap_err(),
            Error::NotFound { .. }
        ));
    }

    #[tokio::test]
    async fn due_instances_filtered_and_ordered() {
        let store = MemoryStore::new();
        let now = OffsetDateTime::now_utc();

        for (name, offset_secs) in [("a", -120i64), ("b", -60), ("c", 3600)] {
            let id = CorrelationId::new(name);
            let (_, mut uow) = store.begin("order", &id, "Open").await.unwrap();
            uow.apply_transition(InstanceUpdate {
                state: "Open".into(),
                variables: serde_json::json!({}),
                assignee: None,
                due_at: Some(now + time::Duration::seconds(offset_secs)),
            })
            .await
            .unwrap();
            uow.commit().await.unwrap();
        }

        let due = store.fetch_due_instances(now, 10).await.unwrap();
        let ids: Vec<&str> = due.iter().map(|i| i.correlation_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }
}
