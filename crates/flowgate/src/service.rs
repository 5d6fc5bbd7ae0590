//! Workflow service: the transactional trigger entry point.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::context::ExecutionContext;
use crate::definition::CorrelationId;
use crate::error::{Error, Result};
use crate::evaluator::{self, TriggerResult};
use crate::registry::DefinitionRegistry;
use crate::store::{
    HistoryEntry, InstanceUpdate, NewHistoryEntry, Store, UnitOfWork, WorkflowInstance,
    WorkflowQueryStore,
};
use crate::variables::VariableBag;

/// A request to attempt one state transition.
#[derive(Debug, Clone)]
pub struct TriggerRequest {
    /// The workflow type of the addressed instance.
    pub workflow_type: String,
    /// The caller-owned identity of the tracked entity.
    pub correlation_id: CorrelationId,
    /// The trigger name to evaluate.
    pub trigger: String,
    /// Variables for this evaluation. When `None`, the stored bag is
    /// rehydrated so guards and actions see continuity state.
    pub variables: Option<VariableBag>,
    /// Who is asking; recorded in the audit trail.
    pub actor: Option<String>,
}

impl TriggerRequest {
    /// Create a request with no variables and no actor.
    pub fn new(
        workflow_type: impl Into<String>,
        correlation_id: impl Into<CorrelationId>,
        trigger: impl Into<String>,
    ) -> Self {
        Self {
            workflow_type: workflow_type.into(),
            correlation_id: correlation_id.into(),
            trigger: trigger.into(),
            variables: None,
            actor: None,
        }
    }

    /// Supply variables for this evaluation instead of the stored bag.
    pub fn with_variables(mut self, variables: VariableBag) -> Self {
        self.variables = Some(variables);
        self
    }

    /// Record `actor` in the history entry of a committed transition.
    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }
}

/// App-facing workflow service.
///
/// [`trigger`](Self::trigger) is the only mutating entry point: it resolves
/// the definition, finds or creates the durable instance inside one
/// transaction, delegates to the evaluator, and commits the new state,
/// variable bag and history entry — or rolls back entirely. The read-only
/// surface ([`can_trigger`](Self::can_trigger),
/// [`get_triggers`](Self::get_triggers), [`get`](Self::get),
/// [`history`](Self::history), [`variables`](Self::variables)) never writes.
#[derive(Clone)]
pub struct WorkflowService<S> {
    store: S,
    registry: Arc<DefinitionRegistry>,
}

impl<S> WorkflowService<S>
where
    S: Store + WorkflowQueryStore,
{
    /// Create a new service over a store and a definition registry.
    pub fn new(store: S, registry: Arc<DefinitionRegistry>) -> Self {
        Self { store, registry }
    }

    /// The registered definitions.
    pub fn registry(&self) -> &DefinitionRegistry {
        &self.registry
    }

    /// The underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Attempt a transition, committing on success.
    ///
    /// Unknown workflow types fail before any transaction is opened. Aborted
    /// evaluations (no matching transition, denying guard) and errors roll
    /// the transaction back in full — the durable record and history are left
    /// exactly as before the call, including the record of a never-before
    /// triggered correlation id.
    pub async fn trigger(&self, req: TriggerRequest) -> Result<TriggerResult> {
        let definition = self
            .registry
            .get(&req.workflow_type)
            .ok_or_else(|| Error::UnknownWorkflowType(req.workflow_type.clone()))?;

        let (instance, mut uow) = self
            .store
            .begin(
                &req.workflow_type,
                &req.correlation_id,
                definition.initial_state(),
            )
            .await?;

        let mut ctx = context_for(&instance, req.variables)?;

        let result = match evaluator::fire(&definition, &instance.state, &req.trigger, &mut ctx) {
            Ok(result) => result,
            Err(source) => {
                // Rollback happens when the uncommitted unit of work drops.
                let err = Error::ActionFailed {
                    workflow_type: req.workflow_type.clone(),
                    correlation_id: req.correlation_id.as_str().to_owned(),
                    trigger: req.trigger.clone(),
                    source,
                };
                warn!(
                    workflow_type = %req.workflow_type,
                    correlation_id = %req.correlation_id,
                    trigger = %req.trigger,
                    error = %err,
                    "trigger action failed, transaction rolled back"
                );
                return Err(err);
            }
        };

        if result.aborted {
            debug!(
                workflow_type = %req.workflow_type,
                correlation_id = %req.correlation_id,
                trigger = %req.trigger,
                message = %result.message,
                "trigger aborted, transaction rolled back"
            );
            return Ok(result);
        }

        uow.apply_transition(InstanceUpdate {
            state: result.state.clone(),
            variables: ctx.variables.to_json()?,
            assignee: ctx.assignee.clone(),
            due_at: ctx.due_at(),
        })
        .await?;

        uow.append_history(NewHistoryEntry {
            from_state: instance.state.clone(),
            to_state: result.state.clone(),
            trigger: req.trigger.clone(),
            actor: req.actor.clone(),
        })
        .await?;

        if let Err(err) = uow.commit().await {
            warn!(
                workflow_type = %req.workflow_type,
                correlation_id = %req.correlation_id,
                trigger = %req.trigger,
                error = %err,
                "trigger commit failed, transaction rolled back"
            );
            return Err(err);
        }

        info!(
            workflow_type = %req.workflow_type,
            correlation_id = %req.correlation_id,
            trigger = %req.trigger,
            from = %instance.state,
            to = %result.state,
            "transition committed"
        );

        Ok(result)
    }

    /// Evaluate whether a trigger would be permitted, without mutating
    /// anything.
    ///
    /// For a correlation id that has never been triggered, evaluation runs
    /// against the definition's initial state; no record is created.
    pub async fn can_trigger(&self, req: &TriggerRequest) -> Result<TriggerResult> {
        let definition = self
            .registry
            .get(&req.workflow_type)
            .ok_or_else(|| Error::UnknownWorkflowType(req.workflow_type.clone()))?;

        let (state, ctx) = match self
            .store
            .get_instance(&req.workflow_type, &req.correlation_id)
            .await
        {
            Ok(instance) => {
                let ctx = context_for(&instance, req.variables.clone())?;
                (instance.state, ctx)
            }
            Err(Error::NotFound { .. }) => (
                definition.initial_state().to_owned(),
                ExecutionContext::new(req.variables.clone().unwrap_or_default()),
            ),
            Err(err) => return Err(err),
        };

        Ok(evaluator::can_trigger(&definition, &state, &req.trigger, &ctx))
    }

    /// Enumerate the legal next triggers for an instance.
    ///
    /// Evaluates every transition whose source equals the instance's current
    /// state, one [`TriggerResult`] per candidate, recomputed on each call.
    pub async fn get_triggers(
        &self,
        workflow_type: &str,
        correlation_id: &CorrelationId,
        variables: Option<VariableBag>,
    ) -> Result<Vec<TriggerResult>> {
        let definition = self
            .registry
            .get(workflow_type)
            .ok_or_else(|| Error::UnknownWorkflowType(workflow_type.to_owned()))?;

        let instance = self.store.get_instance(workflow_type, correlation_id).await?;
        let ctx = context_for(&instance, variables)?;

        Ok(evaluator::available_triggers(
            &definition,
            &instance.state,
            &ctx,
        ))
    }

    /// Fetch one instance by key.
    pub async fn get(
        &self,
        workflow_type: &str,
        correlation_id: &CorrelationId,
    ) -> Result<WorkflowInstance> {
        self.store.get_instance(workflow_type, correlation_id).await
    }

    /// Fetch an instance's audit trail, newest first (display order).
    pub async fn history(
        &self,
        workflow_type: &str,
        correlation_id: &CorrelationId,
    ) -> Result<Vec<HistoryEntry>> {
        let mut entries = self
            .store
            .fetch_history(workflow_type, correlation_id)
            .await?;
        entries.reverse();
        Ok(entries)
    }

    /// Fetch an instance's current variable bag.
    pub async fn variables(
        &self,
        workflow_type: &str,
        correlation_id: &CorrelationId,
    ) -> Result<VariableBag> {
        let instance = self.store.get_instance(workflow_type, correlation_id).await?;
        match instance.variables {
            Some(json) => Ok(VariableBag::from_json(json)?),
            None => Ok(VariableBag::new()),
        }
    }

    /// List instances, optionally filtered by type, most recently updated
    /// first.
    pub async fn list(
        &self,
        workflow_type: Option<&str>,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<WorkflowInstance>> {
        self.store.list_instances(workflow_type, limit, offset).await
    }
}

/// Build the evaluation context for an instance.
///
/// Caller-supplied variables win; otherwise the stored bag is rehydrated.
/// The stored assignee is carried either way, and the due date starts empty
/// so commit replaces it with whatever the action decides.
fn context_for(
    instance: &WorkflowInstance,
    supplied: Option<VariableBag>,
) -> Result<ExecutionContext> {
    let variables = match supplied {
        Some(bag) => bag,
        None => match &instance.variables {
            Some(json) => VariableBag::from_json(json.clone())?,
            None => VariableBag::new(),
        },
    };

    Ok(ExecutionContext::with_assignee(
        variables,
        instance.assignee.clone(),
    ))
}
