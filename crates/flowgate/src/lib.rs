//! Trigger-driven workflow engine for stateful entities.
//!
//! Flowgate evaluates whether a named state transition ("trigger") is
//! permitted for an entity in its current state, applies the transition
//! transactionally, and persists the new state plus a variable bag and an
//! audit trail. Instances with a due date are re-driven automatically by a
//! polling scheduler.
//!
//! - **Declarative definitions** — states, trigger-labeled transitions,
//!   guard predicates and side-effecting actions, validated at build time
//! - **Transactional triggers** — find-or-create, evaluate, commit or roll
//!   back as one atomic unit; concurrent writers on the same instance are
//!   serialized by the store
//! - **Due-date scheduling** — a cooperative background pass resubmits
//!   instances whose due date has elapsed through the same trigger path
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        WorkflowService::trigger                         │
//! │                                                                         │
//! │   1. Resolve definition from the registry (fail fast on unknown type)   │
//! │   2. Begin unit of work (find-or-create instance, acquire row lock)     │
//! │   3. Rehydrate stored variables when the caller supplied none           │
//! │   4. Evaluate: match (state, trigger) → guard → action                  │
//! │   5. Commit new state + variable bag + history entry, or roll back      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The [`DueDateScheduler`] is a second control path into the same pipeline:
//! it scans for `due_at <= now` and fires each definition's declared due
//! trigger.
//!
//! # Example
//!
//! ```
//! use flowgate::{MemoryStore, TriggerRequest, WorkflowDefinition, WorkflowEngine};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> flowgate::Result<()> {
//! let holiday = WorkflowDefinition::builder("holiday", "Requested")
//!     .states(["Requested", "Approved", "Rejected"])
//!     .transition("Requested", "approve", "Approved")
//!     .transition("Requested", "reject", "Rejected")
//!     .build()?;
//!
//! let engine = WorkflowEngine::builder(MemoryStore::new())
//!     .register(holiday)
//!     .build()?;
//!
//! let result = engine
//!     .service
//!     .trigger(TriggerRequest::new("holiday", "req-1", "approve"))
//!     .await?;
//!
//! assert!(result.succeeded);
//! assert_eq!(result.state, "Approved");
//! # Ok(())
//! # }
//! ```
//!
//! # Feature Flags
//!
//! - `postgres` — Enables [`PgStore`] for production use with PostgreSQL
//!
//! # Design Documentation
//!
//! See `DESIGN.md` for architectural decisions and open-point resolutions.

mod context;
mod definition;
mod engine;
mod error;
pub mod evaluator;
mod registry;
pub mod runtime;
mod service;
pub mod store;
mod variables;
pub mod visualization;

pub use context::ExecutionContext;
pub use definition::{
    Action, ActionError, CorrelationId, DefinitionBuilder, Guard, InstanceRef, Transition,
    WorkflowDefinition,
};
pub use engine::{EngineBuilder, WorkflowEngine};
pub use error::{Error, Result};
pub use evaluator::TriggerResult;
pub use registry::{DefinitionMetadata, DefinitionRegistry};
pub use runtime::{DueDateScheduler, ScanSummary, SchedulerConfig, SchedulerState};
pub use service::{TriggerRequest, WorkflowService};
pub use store::MemoryStore;
#[cfg(feature = "postgres")]
pub use store::PgStore;
pub use store::{HistoryEntry, NewHistoryEntry, WorkflowInstance};
pub use variables::{VariableBag, VariableValue};
pub use visualization::{DefinitionGraph, GraphEdge};
