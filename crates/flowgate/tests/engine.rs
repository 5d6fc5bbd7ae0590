//! End-to-end trigger scenarios on the in-process store.
//!
//! These tests drive the full service path (registry lookup, find-or-create,
//! rehydration, evaluation, commit/rollback) without external services.
//! Postgres-specific behavior is covered in `postgres.rs`.

use std::sync::Arc;

use flowgate::{
    CorrelationId, Error, MemoryStore, TriggerRequest, VariableBag, WorkflowDefinition,
    WorkflowEngine, WorkflowService,
};

fn holiday_definition() -> Arc<WorkflowDefinition> {
    WorkflowDefinition::builder("holiday", "Requested")
        .states(["Requested", "Approved", "Rejected"])
        .transition("Requested", "approve", "Approved")
        .transition("Requested", "reject", "Rejected")
        .build()
        .unwrap()
}

fn service_with(definition: Arc<WorkflowDefinition>) -> (WorkflowService<MemoryStore>, MemoryStore) {
    let store = MemoryStore::new();
    let service = WorkflowEngine::builder(store.clone())
        .register(definition)
        .build_service()
        .unwrap();
    (service, store)
}

fn holiday_service() -> (WorkflowService<MemoryStore>, MemoryStore) {
    service_with(holiday_definition())
}

#[tokio::test]
async fn first_trigger_creates_instance_and_transitions() {
    let (service, _store) = holiday_service();

    let result = service
        .trigger(TriggerRequest::new("holiday", "req-1", "approve").with_actor("alice"))
        .await
        .unwrap();

    assert!(result.succeeded);
    assert_eq!(result.state, "Approved");

    let id = CorrelationId::new("req-1");
    let instance = service.get("holiday", &id).await.unwrap();
    assert_eq!(instance.state, "Approved");

    let history = service.history("holiday", &id).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].from_state, "Requested");
    assert_eq!(history[0].to_state, "Approved");
    assert_eq!(history[0].trigger, "approve");
    assert_eq!(history[0].actor.as_deref(), Some("alice"));
}

#[tokio::test]
async fn repeated_trigger_aborts_without_new_history() {
    let (service, _store) = holiday_service();
    let id = CorrelationId::new("req-1");

    service
        .trigger(TriggerRequest::new("holiday", "req-1", "approve"))
        .await
        .unwrap();

    // Second call while already Approved: no transition matches.
    let second = service
        .trigger(TriggerRequest::new("holiday", "req-1", "approve"))
        .await
        .unwrap();

    assert!(second.aborted);
    assert_eq!(second.message, "no such transition");
    assert_eq!(second.state, "Approved");

    let instance = service.get("holiday", &id).await.unwrap();
    assert_eq!(instance.state, "Approved");
    assert_eq!(service.history("holiday", &id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn guard_rejection_rolls_back_instance_creation() {
    let definition = WorkflowDefinition::builder("holiday", "Requested")
        .states(["Requested", "Approved"])
        .add(
            flowgate::Transition::new("Requested", "approve", "Approved").with_guard(|ctx| {
                ctx.variables
                    .get("days")
                    .and_then(|v| v.as_int())
                    .is_some_and(|days| days <= 10)
            }),
        )
        .build()
        .unwrap();
    let (service, store) = service_with(definition);

    let result = service
        .trigger(
            TriggerRequest::new("holiday", "req-1", "approve")
                .with_variables(VariableBag::new().with("days", 30i64)),
        )
        .await
        .unwrap();

    assert!(result.aborted);
    assert_eq!(result.message, "guard rejected");

    // Find-or-create happened inside the rolled-back transaction.
    assert_eq!(store.instance_count().await, 0);
    assert_eq!(store.history_count().await, 0);
}

#[tokio::test]
async fn action_failure_rolls_back_and_surfaces() {
    let definition = WorkflowDefinition::builder("holiday", "Requested")
        .states(["Requested", "Approved", "Booked"])
        .transition("Requested", "approve", "Approved")
        .add(
            flowgate::Transition::new("Approved", "book", "Booked")
                .with_action(|_ctx| Err("booking service unavailable".into())),
        )
        .build()
        .unwrap();
    let (service, store) = service_with(definition);
    let id = CorrelationId::new("req-1");

    service
        .trigger(
            TriggerRequest::new("holiday", "req-1", "approve")
                .with_variables(VariableBag::new().with("days", 3i64)),
        )
        .await
        .unwrap();
    let before = service.get("holiday", &id).await.unwrap();

    let err = service
        .trigger(TriggerRequest::new("holiday", "req-1", "book"))
        .await
        .unwrap_err();

    match err {
        Error::ActionFailed {
            workflow_type,
            correlation_id,
            trigger,
            ..
        } => {
            assert_eq!(workflow_type, "holiday");
            assert_eq!(correlation_id, "req-1");
            assert_eq!(trigger, "book");
        }
        other => panic!("expected ActionFailed, got {other}"),
    }

    // Stored state, variables and history are untouched by the failed call.
    let after = service.get("holiday", &id).await.unwrap();
    assert_eq!(after, before);
    assert_eq!(store.history_count().await, 1);
}

#[tokio::test]
async fn variables_roundtrip_through_storage() {
    let definition = WorkflowDefinition::builder("counter", "Idle")
        .states(["Idle", "Counting", "Done"])
        .add(
            flowgate::Transition::new("Idle", "start", "Counting").with_action(|ctx| {
                ctx.variables.set("count", 1i64);
                Ok(())
            }),
        )
        .add(
            flowgate::Transition::new("Counting", "bump", "Done").with_action(|ctx| {
                let count = ctx
                    .variables
                    .get("count")
                    .and_then(|v| v.as_int())
                    .unwrap_or(0);
                ctx.variables.set("count", count + 1);
                Ok(())
            }),
        )
        .build()
        .unwrap();
    let (service, _store) = service_with(definition);
    let id = CorrelationId::new("c-1");

    service
        .trigger(TriggerRequest::new("counter", "c-1", "start"))
        .await
        .unwrap();

    // No variables supplied: the stored bag is rehydrated for the action.
    service
        .trigger(TriggerRequest::new("counter", "c-1", "bump"))
        .await
        .unwrap();

    let bag = service.variables("counter", &id).await.unwrap();
    assert_eq!(bag.get("count").and_then(|v| v.as_int()), Some(2));
}

#[tokio::test]
async fn empty_variable_bag_roundtrips() {
    let (service, _store) = holiday_service();
    let id = CorrelationId::new("req-1");

    service
        .trigger(
            TriggerRequest::new("holiday", "req-1", "approve")
                .with_variables(VariableBag::new()),
        )
        .await
        .unwrap();

    let bag = service.variables("holiday", &id).await.unwrap();
    assert!(bag.is_empty());
}

#[tokio::test]
async fn unknown_type_fails_before_any_write() {
    let (service, store) = holiday_service();

    let err = service
        .trigger(TriggerRequest::new("does-not-exist", "req-1", "approve"))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::UnknownWorkflowType(t) if t == "does-not-exist"));
    assert_eq!(store.instance_count().await, 0);
    assert_eq!(store.history_count().await, 0);
}

#[tokio::test]
async fn concurrent_triggers_yield_at_most_one_success() {
    let (service, _store) = holiday_service();

    let a = service.clone();
    let b = service.clone();
    let (first, second) = tokio::join!(
        tokio::spawn(async move {
            a.trigger(TriggerRequest::new("holiday", "req-1", "approve"))
                .await
        }),
        tokio::spawn(async move {
            b.trigger(TriggerRequest::new("holiday", "req-1", "reject"))
                .await
        }),
    );

    let outcomes = [first.unwrap(), second.unwrap()];
    let successes = outcomes
        .iter()
        .filter(|o| matches!(o, Ok(r) if r.succeeded))
        .count();
    assert_eq!(successes, 1, "exactly one writer may move the instance");

    // The loser saw either a stale-write conflict or the committed state.
    for outcome in &outcomes {
        match outcome {
            Ok(r) => assert!(r.succeeded || r.aborted),
            Err(err) => assert!(matches!(err, Error::ConcurrencyConflict { .. })),
        }
    }

    let id = CorrelationId::new("req-1");
    assert_eq!(service.history("holiday", &id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn can_trigger_never_mutates() {
    let (service, store) = holiday_service();

    let req = TriggerRequest::new("holiday", "req-1", "approve");
    for _ in 0..3 {
        let result = service.can_trigger(&req).await.unwrap();
        assert!(result.succeeded);
        assert_eq!(result.state, "Approved");
    }

    // Read-only evaluation of a fresh correlation id creates nothing.
    assert_eq!(store.instance_count().await, 0);
}

#[tokio::test]
async fn get_triggers_lists_legal_next_actions() {
    let (service, _store) = holiday_service();
    let id = CorrelationId::new("req-1");

    // Unknown instance: explicit not-found, not an empty list.
    let err = service.get_triggers("holiday", &id, None).await.unwrap_err();
    assert!(matches!(err, Error::NotFound { .. }));

    service
        .trigger(TriggerRequest::new("holiday", "req-1", "reject"))
        .await
        .unwrap();

    // Rejected has no outgoing transitions.
    let triggers = service.get_triggers("holiday", &id, None).await.unwrap();
    assert!(triggers.is_empty());
}

#[tokio::test]
async fn actions_maintain_assignee() {
    let definition = WorkflowDefinition::builder("holiday", "Requested")
        .states(["Requested", "Approved", "Archived"])
        .add(
            flowgate::Transition::new("Requested", "approve", "Approved").with_action(|ctx| {
                ctx.assignee = Some("manager".into());
                Ok(())
            }),
        )
        .transition("Approved", "archive", "Archived")
        .build()
        .unwrap();
    let (service, _store) = service_with(definition);
    let id = CorrelationId::new("req-1");

    service
        .trigger(TriggerRequest::new("holiday", "req-1", "approve"))
        .await
        .unwrap();
    assert_eq!(
        service.get("holiday", &id).await.unwrap().assignee.as_deref(),
        Some("manager")
    );

    // The next transition's action does not touch the assignee; the stored
    // value is carried through the context and committed again.
    service
        .trigger(TriggerRequest::new("holiday", "req-1", "archive"))
        .await
        .unwrap();
    assert_eq!(
        service.get("holiday", &id).await.unwrap().assignee.as_deref(),
        Some("manager")
    );
}

#[tokio::test]
async fn history_is_newest_first() {
    let definition = WorkflowDefinition::builder("doc", "Draft")
        .states(["Draft", "Review", "Published"])
        .transition("Draft", "submit", "Review")
        .transition("Review", "publish", "Published")
        .build()
        .unwrap();
    let (service, _store) = service_with(definition);
    let id = CorrelationId::new("d-1");

    service
        .trigger(TriggerRequest::new("doc", "d-1", "submit"))
        .await
        .unwrap();
    service
        .trigger(TriggerRequest::new("doc", "d-1", "publish"))
        .await
        .unwrap();

    let history = service.history("doc", &id).await.unwrap();
    let triggers: Vec<&str> = history.iter().map(|h| h.trigger.as_str()).collect();
    assert_eq!(triggers, vec!["publish", "submit"]);
}
