//! Workflow engine bundle and builder.

use std::sync::Arc;

use tokio::sync::watch;

use crate::definition::WorkflowDefinition;
use crate::error::{Error, Result};
use crate::registry::{DefinitionMetadata, DefinitionRegistry};
use crate::runtime::{DueDateScheduler, SchedulerConfig};
use crate::service::WorkflowService;
use crate::store::{DueDateStore, Store, WorkflowQueryStore};

/// Convenience bundle for a service + scheduler pair.
///
/// The service handles caller-driven triggers; the scheduler re-drives
/// due-date-gated instances through the same service. `scheduler_gate` is the
/// enabled flag the scheduler samples at each tick — flip it to pause or
/// resume scanning without restarting the loop.
pub struct WorkflowEngine<S>
where
    S: Store + WorkflowQueryStore + DueDateStore,
{
    /// The app-facing trigger service.
    pub service: Arc<WorkflowService<S>>,
    /// The due-date scheduler; spawn [`DueDateScheduler::run`] on the host
    /// runtime.
    pub scheduler: DueDateScheduler<S>,
    /// Enabled gate for the scheduler.
    pub scheduler_gate: watch::Sender<bool>,
}

impl<S> std::fmt::Debug for WorkflowEngine<S>
where
    S: Store + WorkflowQueryStore + DueDateStore,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowEngine").finish_non_exhaustive()
    }
}

impl<S> WorkflowEngine<S>
where
    S: Store + WorkflowQueryStore + DueDateStore,
{
    /// Create a new engine builder.
    pub fn builder(store: S) -> EngineBuilder<S> {
        EngineBuilder::new(store)
    }
}

/// Builder for constructing a [`WorkflowEngine`].
///
/// Register definitions and configure the scheduler before building.
/// Duplicate registrations are reported at build time.
///
/// # Example
///
/// ```ignore
/// let engine = WorkflowEngine::builder(store)
///     .register(holiday_definition)
///     .register_with_metadata(order_definition, DefinitionMetadata {
///         title: "Orders".into(),
///         description: "Order fulfilment".into(),
///         route: "/workflows/order".into(),
///     })
///     .scheduler_config(SchedulerConfig::default())
///     .build()?;
/// ```
pub struct EngineBuilder<S> {
    store: S,
    registry: DefinitionRegistry,
    duplicate_workflow_type: Option<String>,
    scheduler_config: SchedulerConfig,
}

impl<S> EngineBuilder<S>
where
    S: Store + WorkflowQueryStore,
{
    fn new(store: S) -> Self {
        Self {
            store,
            registry: DefinitionRegistry::new(),
            duplicate_workflow_type: None,
            scheduler_config: SchedulerConfig::default(),
        }
    }

    /// Register a workflow definition.
    ///
    /// Each workflow type can only be registered once; duplicate checks are
    /// deferred until build time.
    pub fn register(self, definition: Arc<WorkflowDefinition>) -> Self {
        self.register_entry(definition, None)
    }

    /// Register a workflow definition with display metadata.
    pub fn register_with_metadata(
        self,
        definition: Arc<WorkflowDefinition>,
        metadata: DefinitionMetadata,
    ) -> Self {
        self.register_entry(definition, Some(metadata))
    }

    fn register_entry(
        mut self,
        definition: Arc<WorkflowDefinition>,
        metadata: Option<DefinitionMetadata>,
    ) -> Self {
        if let Err(Error::DuplicateWorkflowType(type_name)) =
            self.registry.register(definition, metadata)
        {
            if self.duplicate_workflow_type.is_none() {
                self.duplicate_workflow_type = Some(type_name);
            }
        }
        self
    }

    /// Set the scheduler configuration.
    ///
    /// If not called, uses [`SchedulerConfig::default()`].
    pub fn scheduler_config(mut self, config: SchedulerConfig) -> Self {
        self.scheduler_config = config;
        self
    }

    /// Build the workflow service without a scheduler.
    pub fn build_service(self) -> Result<WorkflowService<S>> {
        if let Some(workflow_type) = self.duplicate_workflow_type {
            return Err(Error::DuplicateWorkflowType(workflow_type));
        }
        let registry = Arc::new(self.registry);
        Ok(WorkflowService::new(self.store, registry))
    }
}

impl<S> EngineBuilder<S>
where
    S: Store + WorkflowQueryStore + DueDateStore,
{
    /// Build the workflow engine (service + scheduler).
    pub fn build(self) -> Result<WorkflowEngine<S>> {
        if let Some(workflow_type) = self.duplicate_workflow_type {
            return Err(Error::DuplicateWorkflowType(workflow_type));
        }

        let registry = Arc::new(self.registry);
        let service = Arc::new(WorkflowService::new(self.store.clone(), registry));

        let (scheduler_gate, enabled_rx) = watch::channel(self.scheduler_config.enabled);
        let scheduler = DueDateScheduler::new(
            Arc::clone(&service),
            self.store,
            self.scheduler_config,
            enabled_rx,
        );

        Ok(WorkflowEngine {
            service,
            scheduler,
            scheduler_gate,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn def(name: &str) -> Arc<WorkflowDefinition> {
        WorkflowDefinition::builder(name, "Start")
            .states(["Start", "Done"])
            .transition("Start", "finish", "Done")
            .build()
            .unwrap()
    }

    #[test]
    fn duplicate_registration_surfaces_at_build() {
        let err = WorkflowEngine::builder(MemoryStore::new())
            .register(def("holiday"))
            .register(def("holiday"))
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateWorkflowType(t) if t == "holiday"));
    }

    #[test]
    fn build_wires_service_and_scheduler() {
        let engine = WorkflowEngine::builder(MemoryStore::new())
            .register(def("holiday"))
            .build()
            .unwrap();
        assert_eq!(engine.service.registry().len(), 1);
        assert!(engine.scheduler.config().enabled);
    }
}
