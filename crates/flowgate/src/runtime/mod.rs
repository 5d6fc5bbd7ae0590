//! Runtime for the due-date scheduler.
//!
//! This module provides the background worker that re-drives time-gated
//! workflow instances:
//!
//! - [`DueDateScheduler`] — polling loop over elapsed due dates
//! - [`SchedulerConfig`] — enabled gate, poll interval, batch limit, backoff
//!
//! # Example
//!
//! ```ignore
//! use flowgate::{MemoryStore, SchedulerConfig, WorkflowEngine};
//!
//! let engine = WorkflowEngine::builder(MemoryStore::new())
//!     .register(holiday_definition)
//!     .scheduler_config(SchedulerConfig::default())
//!     .build()?;
//!
//! tokio::spawn(engine.scheduler.run(shutdown_rx));
//! ```

mod config;
mod scheduler;

pub use config::SchedulerConfig;
pub use scheduler::{DueDateScheduler, SCHEDULER_ACTOR, ScanSummary, SchedulerState};
