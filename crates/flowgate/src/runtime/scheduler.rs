//! Due-date scheduler: the background pass that re-drives time-gated
//! instances.

use std::sync::Arc;

use time::OffsetDateTime;
use tokio::sync::watch;
use tokio::time::interval;
use tracing::{debug, error, info, warn};

use super::config::SchedulerConfig;
use crate::error::Result;
use crate::service::{TriggerRequest, WorkflowService};
use crate::store::{DueDateStore, Store, WorkflowInstance, WorkflowQueryStore};

/// Actor recorded in history entries written by scheduler-driven triggers.
pub const SCHEDULER_ACTOR: &str = "scheduler";

/// The scheduler loop's current state.
///
/// The loop only ever alternates between these two; there is no paused state.
/// Disabling the gate stops future passes from starting but does not cancel
/// a pass in progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// Waiting for the next tick.
    Idle,
    /// A scan pass is in progress.
    Scanning,
}

/// Counters for one scan pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanSummary {
    /// Due instances fetched for this pass.
    pub scanned: usize,
    /// Instances whose due trigger committed a transition.
    pub triggered: usize,
    /// Instances deferred to a later pass (aborted, failed, or
    /// unresolvable definition).
    pub deferred: usize,
}

/// Background worker that scans for elapsed due dates and resubmits each due
/// instance through the trigger path.
///
/// The worker polls at [`SchedulerConfig::poll_interval`], samples its
/// enabled gate at each tick boundary, and processes each pass sequentially.
/// Failures are isolated per instance: a failing re-trigger is logged, the
/// instance's due date is pushed back by [`SchedulerConfig::retry_backoff`],
/// and the pass continues with the remaining instances.
///
/// # Lifecycle
///
/// 1. Tick at `poll_interval` (missed ticks are skipped, not bunched)
/// 2. Sample the enabled gate; skip the pass when disabled
/// 3. Fetch up to `batch_limit` instances with `due_at <= now`
/// 4. Resubmit each through [`WorkflowService::trigger`] with the
///    definition's declared due trigger and no variables (stored bag is
///    rehydrated)
/// 5. On success the commit already stored the action's new due date — or
///    cleared it, so the instance is not rescanned
/// 6. Repeat until the shutdown signal
pub struct DueDateScheduler<S>
where
    S: Store + WorkflowQueryStore + DueDateStore,
{
    service: Arc<WorkflowService<S>>,
    store: S,
    config: SchedulerConfig,
    enabled: watch::Receiver<bool>,
    state_tx: watch::Sender<SchedulerState>,
}

impl<S> DueDateScheduler<S>
where
    S: Store + WorkflowQueryStore + DueDateStore,
{
    /// Create a scheduler over a service and its store.
    ///
    /// `enabled` is the external configuration gate, sampled at each tick.
    pub fn new(
        service: Arc<WorkflowService<S>>,
        store: S,
        config: SchedulerConfig,
        enabled: watch::Receiver<bool>,
    ) -> Self {
        let (state_tx, _) = watch::channel(SchedulerState::Idle);
        Self {
            service,
            store,
            config,
            enabled,
            state_tx,
        }
    }

    /// The scheduler configuration.
    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Watch the loop's Idle/Scanning state.
    pub fn state_watch(&self) -> watch::Receiver<SchedulerState> {
        self.state_tx.subscribe()
    }

    /// Run the scheduler until the shutdown signal.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut tick = interval(self.config.poll_interval);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        info!(
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            batch_limit = self.config.batch_limit,
            "Due-date scheduler started"
        );

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    // The gate is external configuration, sampled per tick.
                    if !*self.enabled.borrow() {
                        debug!("Scheduler disabled, skipping pass");
                        continue;
                    }
                    self.scan_once().await;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("Due-date scheduler shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// Run one scan pass.
    ///
    /// Public so hosts and tests can drive a pass deterministically without
    /// the timer loop. The pass always completes: per-instance failures are
    /// deferred and logged, never propagated.
    pub async fn scan_once(&self) -> ScanSummary {
        let _ = self.state_tx.send(SchedulerState::Scanning);
        let summary = self.scan(OffsetDateTime::now_utc()).await;
        let _ = self.state_tx.send(SchedulerState::Idle);
        summary
    }

    async fn scan(&self, now: OffsetDateTime) -> ScanSummary {
        let mut summary = ScanSummary::default();

        let due = match self
            .store
            .fetch_due_instances(now, self.config.batch_limit)
            .await
        {
            Ok(due) => due,
            Err(err) => {
                error!(error = %err, "Due-date scan query failed");
                return summary;
            }
        };

        summary.scanned = due.len();
        if summary.scanned > 0 {
            debug!(count = summary.scanned, "Processing due instances");
        }

        for instance in due {
            match self.process_due(&instance, now).await {
                Ok(true) => summary.triggered += 1,
                Ok(false) => summary.deferred += 1,
                Err(err) => {
                    // Isolation: one bad instance never aborts the pass.
                    error!(
                        workflow_type = %instance.workflow_type,
                        correlation_id = %instance.correlation_id,
                        error = %err,
                        "Due re-trigger failed, deferring instance"
                    );
                    self.defer(&instance, now).await;
                    summary.deferred += 1;
                }
            }
        }

        summary
    }

    /// Re-drive one due instance. `Ok(true)` means its transition committed.
    async fn process_due(&self, instance: &WorkflowInstance, now: OffsetDateTime) -> Result<bool> {
        let Some(definition) = self.service.registry().get(&instance.workflow_type) else {
            warn!(
                workflow_type = %instance.workflow_type,
                correlation_id = %instance.correlation_id,
                "Due instance has no registered definition, deferring"
            );
            self.defer(instance, now).await;
            return Ok(false);
        };

        let Some(due_trigger) = definition.due_trigger() else {
            warn!(
                workflow_type = %instance.workflow_type,
                correlation_id = %instance.correlation_id,
                "Definition declares no due trigger, deferring instance"
            );
            self.defer(instance, now).await;
            return Ok(false);
        };

        let request = TriggerRequest::new(
            instance.workflow_type.clone(),
            instance.correlation_id.clone(),
            due_trigger,
        )
        .with_actor(SCHEDULER_ACTOR);

        let result = self.service.trigger(request).await?;

        if result.succeeded {
            // The commit stored the action's new due date, or cleared it.
            debug!(
                workflow_type = %instance.workflow_type,
                correlation_id = %instance.correlation_id,
                to = %result.state,
                "Due trigger committed"
            );
            Ok(true)
        } else {
            warn!(
                workflow_type = %instance.workflow_type,
                correlation_id = %instance.correlation_id,
                message = %result.message,
                "Due trigger aborted, deferring instance"
            );
            self.defer(instance, now).await;
            Ok(false)
        }
    }

    async fn defer(&self, instance: &WorkflowInstance, now: OffsetDateTime) {
        let backoff = time::Duration::new(
            self.config.retry_backoff.as_secs() as i64,
            self.config.retry_backoff.subsec_nanos() as i32,
        );
        if let Err(err) = self
            .store
            .defer_due_date(
                &instance.workflow_type,
                &instance.correlation_id,
                now + backoff,
            )
            .await
        {
            error!(
                workflow_type = %instance.workflow_type,
                correlation_id = %instance.correlation_id,
                error = %err,
                "Failed to defer due date"
            );
        }
    }
}
