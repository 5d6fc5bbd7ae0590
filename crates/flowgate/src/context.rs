//! Execution context handed to guards and actions.

use std::time::Duration;

use time::OffsetDateTime;

use crate::variables::VariableBag;

/// The mutable view of one trigger evaluation.
///
/// Guards read the context; actions may mutate it. The coordinator builds a
/// fresh context per trigger call (each call deserializes its own copy of the
/// stored bag — contexts are never shared across concurrent evaluations) and
/// persists the result wholesale on commit.
///
/// The due date starts out empty on every evaluation. A committed transition
/// whose action sets one schedules the instance for automatic re-triggering;
/// one that leaves it empty clears any previously stored due date.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use flowgate::{ExecutionContext, VariableBag};
///
/// let mut ctx = ExecutionContext::new(VariableBag::new().with("days", 3i64));
/// ctx.variables.set("approved", true);
/// ctx.schedule_after(Duration::from_secs(3600));
/// assert!(ctx.due_at().is_some());
/// ```
#[derive(Debug, Clone, Default)]
pub struct ExecutionContext {
    /// The variables guards and actions operate on.
    pub variables: VariableBag,

    /// The instance's assignee, carried from storage and adjustable by actions.
    pub assignee: Option<String>,

    due_at: Option<OffsetDateTime>,
}

impl ExecutionContext {
    /// Create a context over the given variables.
    pub fn new(variables: VariableBag) -> Self {
        Self {
            variables,
            assignee: None,
            due_at: None,
        }
    }

    /// Create a context with variables and a stored assignee.
    pub fn with_assignee(variables: VariableBag, assignee: Option<String>) -> Self {
        Self {
            variables,
            assignee,
            due_at: None,
        }
    }

    /// Schedule the instance for automatic re-triggering at `due_at`.
    pub fn schedule_at(&mut self, due_at: OffsetDateTime) {
        self.due_at = Some(due_at);
    }

    /// Schedule the instance for automatic re-triggering after `delay` from now.
    pub fn schedule_after(&mut self, delay: Duration) {
        let delay = time::Duration::new(delay.as_secs() as i64, delay.subsec_nanos() as i32);
        self.due_at = Some(OffsetDateTime::now_utc() + delay);
    }

    /// Drop any due date set earlier in this evaluation.
    pub fn clear_due_date(&mut self) {
        self.due_at = None;
    }

    /// The due date this evaluation will commit, if any.
    pub fn due_at(&self) -> Option<OffsetDateTime> {
        self.due_at
    }
}
