//! Trigger evaluation: the pure state machine core.
//!
//! Everything in this module is synchronous and storage-free. The
//! [`WorkflowService`](crate::WorkflowService) wraps these functions in a
//! transactional unit of work; tests can drive them directly with an
//! in-memory [`ExecutionContext`].
//!
//! Rejections are data, not errors: an unmatched trigger or a denying guard
//! produces an aborted [`TriggerResult`]. Only a failing action raises — its
//! error must reach the caller's transaction boundary so the surrounding
//! write is rolled back.

use crate::context::ExecutionContext;
use crate::definition::{ActionError, WorkflowDefinition};

/// Outcome of evaluating one trigger against one state.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct TriggerResult {
    /// Whether the transition was (or would be) taken.
    pub succeeded: bool,
    /// Whether evaluation stopped before the transition: no matching
    /// transition, or a denying guard.
    pub aborted: bool,
    /// The resulting state on success; the unchanged current state otherwise.
    pub state: String,
    /// The trigger that was evaluated.
    pub trigger: String,
    /// Human-readable diagnostics for the caller.
    pub message: String,
}

impl TriggerResult {
    fn success(state: &str, trigger: &str) -> Self {
        Self {
            succeeded: true,
            aborted: false,
            state: state.to_owned(),
            trigger: trigger.to_owned(),
            message: String::new(),
        }
    }

    fn rejected(state: &str, trigger: &str, message: &str) -> Self {
        Self {
            succeeded: false,
            aborted: true,
            state: state.to_owned(),
            trigger: trigger.to_owned(),
            message: message.to_owned(),
        }
    }

    /// Whether this result represents a permitted (or taken) transition.
    pub fn is_allowed(&self) -> bool {
        self.succeeded && !self.aborted
    }
}

/// Evaluate whether `trigger` is permitted from `current_state`.
///
/// Runs the guard only — never the action — and never mutates anything. A
/// transition with no guard is always allowed from its source state.
pub fn can_trigger(
    definition: &WorkflowDefinition,
    current_state: &str,
    trigger: &str,
    ctx: &ExecutionContext,
) -> TriggerResult {
    let Some(transition) = definition.find_transition(current_state, trigger) else {
        return TriggerResult::rejected(current_state, trigger, "no such transition");
    };

    if let Some(guard) = transition.guard() {
        if !guard(ctx) {
            return TriggerResult::rejected(current_state, trigger, "guard rejected");
        }
    }

    TriggerResult::success(transition.target(), trigger)
}

/// Evaluate and execute `trigger` from `current_state`.
///
/// Locates the unique `(current_state, trigger)` transition, runs its guard,
/// then executes its action against `ctx`. Guard rejections and unmatched
/// triggers come back as aborted results with `ctx` untouched; a failing
/// action propagates its error so the caller's transaction rolls back — the
/// coordinator wraps it with instance identity as
/// [`Error::ActionFailed`](crate::Error::ActionFailed).
pub fn fire(
    definition: &WorkflowDefinition,
    current_state: &str,
    trigger: &str,
    ctx: &mut ExecutionContext,
) -> Result<TriggerResult, ActionError> {
    let Some(transition) = definition.find_transition(current_state, trigger) else {
        return Ok(TriggerResult::rejected(
            current_state,
            trigger,
            "no such transition",
        ));
    };

    if let Some(guard) = transition.guard() {
        if !guard(ctx) {
            return Ok(TriggerResult::rejected(
                current_state,
                trigger,
                "guard rejected",
            ));
        }
    }

    if let Some(action) = transition.action() {
        action(ctx)?;
    }

    Ok(TriggerResult::success(transition.target(), trigger))
}

/// Evaluate every transition leaving `current_state`.
///
/// Returns one [`can_trigger`]-semantics result per candidate, in definition
/// order. The sequence is recomputed on each call and nothing is mutated —
/// this is the read-only query a UI uses to enumerate legal next actions.
pub fn available_triggers(
    definition: &WorkflowDefinition,
    current_state: &str,
    ctx: &ExecutionContext,
) -> Vec<TriggerResult> {
    definition
        .transitions_from(current_state)
        .map(|t| can_trigger(definition, current_state, t.trigger(), ctx))
        .collect()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::definition::WorkflowDefinition;
    use crate::variables::VariableBag;

    fn approval_def() -> Arc<WorkflowDefinition> {
        WorkflowDefinition::builder("holiday", "Requested")
            .states(["Requested", "Approved", "Rejected"])
            .add(
                crate::definition::Transition::new("Requested", "approve", "Approved").with_guard(
                    |ctx| {
                        ctx.variables
                            .get("days")
                            .and_then(|v| v.as_int())
                            .is_some_and(|days| days <= 10)
                    },
                ),
            )
            .transition("Requested", "reject", "Rejected")
            .build()
            .unwrap()
    }

    fn ctx_with_days(days: i64) -> ExecutionContext {
        ExecutionContext::new(VariableBag::new().with("days", days))
    }

    #[test]
    fn unguarded_transition_always_allowed() {
        let def = approval_def();
        let ctx = ExecutionContext::default();
        let result = can_trigger(&def, "Requested", "reject", &ctx);
        assert!(result.is_allowed());
        assert_eq!(result.state, "Rejected");
    }

    #[test]
    fn guard_pass_and_fail() {
        let def = approval_def();

        let ok = can_trigger(&def, "Requested", "approve", &ctx_with_days(3));
        assert!(ok.succeeded);
        assert_eq!(ok.state, "Approved");

        let denied = can_trigger(&def, "Requested", "approve", &ctx_with_days(30));
        assert!(denied.aborted);
        assert_eq!(denied.message, "guard rejected");
        assert_eq!(denied.state, "Requested");
    }

    #[test]
    fn unmatched_trigger_is_aborted() {
        let def = approval_def();
        let ctx = ctx_with_days(3);
        let result = can_trigger(&def, "Approved", "approve", &ctx);
        assert!(result.aborted);
        assert_eq!(result.message, "no such transition");
        assert_eq!(result.state, "Approved");
    }

    #[test]
    fn trigger_keyed_by_source_state() {
        // "archive" is legal from Review but must not match from Draft.
        let def = WorkflowDefinition::builder("doc", "Draft")
            .states(["Draft", "Review", "Archived"])
            .transition("Draft", "submit", "Review")
            .transition("Review", "archive", "Archived")
            .build()
            .unwrap();
        let ctx = ExecutionContext::default();

        assert!(can_trigger(&def, "Review", "archive", &ctx).succeeded);
        assert!(can_trigger(&def, "Draft", "archive", &ctx).aborted);
    }

    #[test]
    fn fire_runs_action_and_mutates_context() {
        let def = WorkflowDefinition::builder("holiday", "Requested")
            .states(["Requested", "Approved"])
            .add(
                crate::definition::Transition::new("Requested", "approve", "Approved").with_action(
                    |ctx| {
                        ctx.variables.set("approved", true);
                        ctx.assignee = Some("manager".into());
                        Ok(())
                    },
                ),
            )
            .build()
            .unwrap();

        let mut ctx = ExecutionContext::default();
        let result = fire(&def, "Requested", "approve", &mut ctx).unwrap();

        assert!(result.succeeded);
        assert_eq!(result.state, "Approved");
        assert_eq!(
            ctx.variables.get("approved").and_then(|v| v.as_bool()),
            Some(true)
        );
        assert_eq!(ctx.assignee.as_deref(), Some("manager"));
    }

    #[test]
    fn fire_propagates_action_failure() {
        let def = WorkflowDefinition::builder("holiday", "Requested")
            .states(["Requested", "Approved"])
            .add(
                crate::definition::Transition::new("Requested", "approve", "Approved")
                    .with_action(|_ctx| Err("notification service down".into())),
            )
            .build()
            .unwrap();

        let mut ctx = ExecutionContext::default();
        let err = fire(&def, "Requested", "approve", &mut ctx).unwrap_err();
        assert_eq!(err.to_string(), "notification service down");
    }

    #[test]
    fn fire_skips_action_when_guard_denies() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let def = WorkflowDefinition::builder("holiday", "Requested")
            .states(["Requested", "Approved"])
            .add(
                crate::definition::Transition::new("Requested", "approve", "Approved")
                    .with_guard(|_| false)
                    .with_action(move |_| {
                        counter.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    }),
            )
            .build()
            .unwrap();

        let mut ctx = ExecutionContext::default();
        let result = fire(&def, "Requested", "approve", &mut ctx).unwrap();
        assert!(result.aborted);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn can_trigger_is_repeatable() {
        let def = approval_def();
        let ctx = ctx_with_days(3);
        let first = can_trigger(&def, "Requested", "approve", &ctx);
        let second = can_trigger(&def, "Requested", "approve", &ctx);
        assert_eq!(first, second);
    }

    #[test]
    fn available_triggers_matches_source_state_exactly() {
        let def = approval_def();

        let from_requested = available_triggers(&def, "Requested", &ctx_with_days(30));
        assert_eq!(from_requested.len(), 2);
        // Guard evaluated per candidate: approve denied, reject allowed.
        assert!(from_requested[0].aborted);
        assert_eq!(from_requested[0].trigger, "approve");
        assert!(from_requested[1].succeeded);
        assert_eq!(from_requested[1].trigger, "reject");

        let from_approved = available_triggers(&def, "Approved", &ctx_with_days(3));
        assert!(from_approved.is_empty());
    }
}
