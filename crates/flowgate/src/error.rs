//! Error types for flowgate.

use thiserror::Error;

use crate::definition::ActionError;

/// A `Result` alias with [`enum@Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in flowgate operations.
///
/// Guard rejections and unmatched triggers are not errors: they come back as
/// aborted [`TriggerResult`](crate::TriggerResult)s so callers can distinguish
/// "not allowed right now" from genuine failures.
#[derive(Debug, Error)]
pub enum Error {
    /// Failed to serialize or deserialize a variable bag.
    ///
    /// Typically a mismatch between the stored form and the current
    /// [`VariableValue`](crate::VariableValue) kinds.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// PostgreSQL storage error.
    ///
    /// Preserves the full `sqlx::Error` for matching on specific database
    /// error conditions (connection timeout, constraint violation, etc.).
    #[cfg(feature = "postgres")]
    #[error("postgres error: {0}")]
    Postgres(#[from] sqlx::Error),

    /// Requested workflow type has no registered definition.
    #[error("unknown workflow type: {0}")]
    UnknownWorkflowType(String),

    /// Workflow type was registered more than once.
    #[error("duplicate workflow type registration: {0}")]
    DuplicateWorkflowType(String),

    /// A definition failed structural validation at build time.
    #[error("invalid workflow definition: {0}")]
    InvalidDefinition(String),

    /// A read-only query addressed an instance that does not exist.
    #[error("no workflow instance for {workflow_type}:{correlation_id}")]
    NotFound {
        /// The workflow type that was queried.
        workflow_type: String,
        /// The correlation id that was queried.
        correlation_id: String,
    },

    /// Another writer committed the same instance first.
    ///
    /// The transaction was rolled back; the call may be retried. The engine
    /// itself never auto-retries.
    #[error("concurrent update on workflow instance {workflow_type}:{correlation_id}")]
    ConcurrencyConflict {
        /// The workflow type of the contended instance.
        workflow_type: String,
        /// The correlation id of the contended instance.
        correlation_id: String,
    },

    /// A transition's action raised during execution.
    ///
    /// The surrounding transaction is rolled back in full; no partial write
    /// survives.
    #[error("action for trigger '{trigger}' failed on {workflow_type}:{correlation_id}: {source}")]
    ActionFailed {
        /// The workflow type of the instance being triggered.
        workflow_type: String,
        /// The correlation id of the instance being triggered.
        correlation_id: String,
        /// The trigger whose action failed.
        trigger: String,
        /// The underlying action error.
        #[source]
        source: ActionError,
    },
}

impl Error {
    /// Create a [`Error::NotFound`] with context.
    pub fn not_found(workflow_type: impl Into<String>, correlation_id: impl Into<String>) -> Self {
        Error::NotFound {
            workflow_type: workflow_type.into(),
            correlation_id: correlation_id.into(),
        }
    }

    /// Create a [`Error::ConcurrencyConflict`] with context.
    pub fn conflict(workflow_type: impl Into<String>, correlation_id: impl Into<String>) -> Self {
        Error::ConcurrencyConflict {
            workflow_type: workflow_type.into(),
            correlation_id: correlation_id.into(),
        }
    }
}
