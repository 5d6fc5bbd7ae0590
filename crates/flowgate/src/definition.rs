//! Workflow definitions: states, transitions, guards and actions.

use std::fmt;
use std::sync::Arc;

use crate::context::ExecutionContext;
use crate::error::{Error, Result};

/// A workflow instance identifier (business key).
///
/// The correlation id is the caller-owned identity of the external entity the
/// workflow tracks. Use natural business keys (order number, request id)
/// rather than synthetic UUIDs — correlation stays intuitive and retriggering
/// the same entity is naturally idempotent.
///
/// # Example
///
/// ```
/// use flowgate::CorrelationId;
///
/// let id = CorrelationId::new("req-42");
/// assert_eq!(id.as_str(), "req-42");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(String);

impl CorrelationId {
    /// Create a new correlation id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume the wrapper and return the inner string.
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl From<String> for CorrelationId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for CorrelationId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Reference to a specific workflow instance.
///
/// Combines the workflow type and the correlation id into a single key.
///
/// # Example
///
/// ```
/// use flowgate::InstanceRef;
///
/// let holiday = InstanceRef::new("holiday", "req-42");
/// assert_eq!(format!("{}", holiday), "holiday:req-42");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InstanceRef {
    workflow_type: String,
    correlation_id: CorrelationId,
}

impl InstanceRef {
    /// Create a new instance reference.
    pub fn new(workflow_type: impl Into<String>, correlation_id: impl Into<CorrelationId>) -> Self {
        Self {
            workflow_type: workflow_type.into(),
            correlation_id: correlation_id.into(),
        }
    }

    /// The workflow type (e.g. "holiday", "incident").
    pub fn workflow_type(&self) -> &str {
        &self.workflow_type
    }

    /// The correlation id (business key).
    pub fn correlation_id(&self) -> &CorrelationId {
        &self.correlation_id
    }
}

impl fmt::Display for InstanceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.workflow_type, self.correlation_id)
    }
}

impl<S: Into<String>> From<(&str, S)> for InstanceRef {
    fn from((workflow_type, correlation_id): (&str, S)) -> Self {
        Self::new(workflow_type, correlation_id.into())
    }
}

/// A guard predicate gating whether a transition is allowed.
///
/// Guards must be pure: they read the execution context and return a verdict,
/// with no side effects and no storage access.
pub type Guard = Arc<dyn Fn(&ExecutionContext) -> bool + Send + Sync>;

/// Error type produced by a failing [`Action`].
pub type ActionError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// A side-effecting step executed when a transition is taken.
///
/// Actions may mutate the execution context (variables, assignee, due date)
/// but must not change the identity of the instance. A returned error aborts
/// the surrounding transaction.
pub type Action = Arc<dyn Fn(&mut ExecutionContext) -> std::result::Result<(), ActionError> + Send + Sync>;

/// A single transition: `source --trigger--> target`, optionally gated by a
/// guard and accompanied by an action.
#[derive(Clone)]
pub struct Transition {
    source: String,
    trigger: String,
    target: String,
    guard: Option<Guard>,
    action: Option<Action>,
}

impl Transition {
    /// Create a transition with no guard and no action.
    pub fn new(
        source: impl Into<String>,
        trigger: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        Self {
            source: source.into(),
            trigger: trigger.into(),
            target: target.into(),
            guard: None,
            action: None,
        }
    }

    /// Gate this transition with a guard predicate.
    pub fn with_guard<F>(mut self, guard: F) -> Self
    where
        F: Fn(&ExecutionContext) -> bool + Send + Sync + 'static,
    {
        self.guard = Some(Arc::new(guard));
        self
    }

    /// Attach an action executed when the transition is taken.
    pub fn with_action<F>(mut self, action: F) -> Self
    where
        F: Fn(&mut ExecutionContext) -> std::result::Result<(), ActionError> + Send + Sync + 'static,
    {
        self.action = Some(Arc::new(action));
        self
    }

    /// The source state this transition leaves.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// The trigger name that requests this transition.
    pub fn trigger(&self) -> &str {
        &self.trigger
    }

    /// The target state this transition enters.
    pub fn target(&self) -> &str {
        &self.target
    }

    /// The guard, if any.
    pub fn guard(&self) -> Option<&Guard> {
        self.guard.as_ref()
    }

    /// The action, if any.
    pub fn action(&self) -> Option<&Action> {
        self.action.as_ref()
    }
}

impl fmt::Debug for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transition")
            .field("source", &self.source)
            .field("trigger", &self.trigger)
            .field("target", &self.target)
            .field("guard", &self.guard.is_some())
            .field("action", &self.action.is_some())
            .finish()
    }
}

/// Immutable description of a workflow type.
///
/// A definition owns an ordered set of states and transitions, a declared
/// initial state, and optionally the trigger name the due-date scheduler
/// resubmits when an instance's due date elapses. Definitions are produced at
/// startup, validated by [`DefinitionBuilder`], and shared read-only across
/// all instances of their type.
///
/// # Example
///
/// ```
/// use flowgate::WorkflowDefinition;
///
/// let holiday = WorkflowDefinition::builder("holiday", "Requested")
///     .state("Requested")
///     .state("Approved")
///     .state("Rejected")
///     .transition("Requested", "approve", "Approved")
///     .transition("Requested", "reject", "Rejected")
///     .build()
///     .unwrap();
///
/// assert_eq!(holiday.initial_state(), "Requested");
/// assert_eq!(holiday.transitions_from("Requested").count(), 2);
/// ```
#[derive(Debug, Clone)]
pub struct WorkflowDefinition {
    type_name: String,
    initial_state: String,
    states: Vec<String>,
    transitions: Vec<Transition>,
    due_trigger: Option<String>,
}

impl WorkflowDefinition {
    /// Start building a definition for `type_name` with the given initial state.
    pub fn builder(
        type_name: impl Into<String>,
        initial_state: impl Into<String>,
    ) -> DefinitionBuilder {
        DefinitionBuilder {
            type_name: type_name.into(),
            initial_state: initial_state.into(),
            states: Vec::new(),
            transitions: Vec::new(),
            due_trigger: None,
        }
    }

    /// The workflow type identifier this definition is registered under.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// The state newly created instances start in.
    pub fn initial_state(&self) -> &str {
        &self.initial_state
    }

    /// All states, in declaration order.
    pub fn states(&self) -> &[String] {
        &self.states
    }

    /// All transitions, in declaration order.
    pub fn transitions(&self) -> &[Transition] {
        &self.transitions
    }

    /// The trigger name the scheduler fires when a due date elapses.
    pub fn due_trigger(&self) -> Option<&str> {
        self.due_trigger.as_deref()
    }

    /// Transitions whose source equals `state`, in declaration order.
    pub fn transitions_from<'a>(
        &'a self,
        state: &'a str,
    ) -> impl Iterator<Item = &'a Transition> + 'a {
        self.transitions.iter().filter(move |t| t.source() == state)
    }

    /// The unique transition matching `(state, trigger)`, if any.
    ///
    /// Trigger names are keyed by source state: a trigger valid from a
    /// different source state does not match.
    pub fn find_transition(&self, state: &str, trigger: &str) -> Option<&Transition> {
        self.transitions
            .iter()
            .find(|t| t.source() == state && t.trigger() == trigger)
    }

    /// Whether `state` is declared in this definition.
    pub fn has_state(&self, state: &str) -> bool {
        self.states.iter().any(|s| s == state)
    }
}

/// Builder validating a [`WorkflowDefinition`].
///
/// [`build`](Self::build) enforces the structural invariants: the initial
/// state and every transition endpoint must be declared states, and
/// `(source, trigger)` pairs must be unique within the definition.
#[derive(Debug)]
pub struct DefinitionBuilder {
    type_name: String,
    initial_state: String,
    states: Vec<String>,
    transitions: Vec<Transition>,
    due_trigger: Option<String>,
}

impl DefinitionBuilder {
    /// Declare a state. Declaring the same state twice is a no-op.
    pub fn state(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        if !self.states.contains(&name) {
            self.states.push(name);
        }
        self
    }

    /// Declare several states at once.
    pub fn states<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for name in names {
            self = self.state(name);
        }
        self
    }

    /// Add a plain transition with no guard and no action.
    pub fn transition(
        self,
        source: impl Into<String>,
        trigger: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        self.add(Transition::new(source, trigger, target))
    }

    /// Add a fully configured transition.
    pub fn add(mut self, transition: Transition) -> Self {
        self.transitions.push(transition);
        self
    }

    /// Declare the trigger name the due-date scheduler resubmits.
    pub fn due_trigger(mut self, trigger: impl Into<String>) -> Self {
        self.due_trigger = Some(trigger.into());
        self
    }

    /// Validate and produce the definition.
    pub fn build(self) -> Result<Arc<WorkflowDefinition>> {
        if !self.states.iter().any(|s| *s == self.initial_state) {
            return Err(Error::InvalidDefinition(format!(
                "workflow '{}': initial state '{}' is not a declared state",
                self.type_name, self.initial_state
            )));
        }

        for t in &self.transitions {
            if !self.states.iter().any(|s| s == t.source()) {
                return Err(Error::InvalidDefinition(format!(
                    "workflow '{}': transition '{}' references undeclared source state '{}'",
                    self.type_name,
                    t.trigger(),
                    t.source()
                )));
            }
            if !self.states.iter().any(|s| s == t.target()) {
                return Err(Error::InvalidDefinition(format!(
                    "workflow '{}': transition '{}' references undeclared target state '{}'",
                    self.type_name,
                    t.trigger(),
                    t.target()
                )));
            }
        }

        for (i, t) in self.transitions.iter().enumerate() {
            let duplicate = self.transitions[..i]
                .iter()
                .any(|other| other.source() == t.source() && other.trigger() == t.trigger());
            if duplicate {
                return Err(Error::InvalidDefinition(format!(
                    "workflow '{}': duplicate transition for ({}, {})",
                    self.type_name,
                    t.source(),
                    t.trigger()
                )));
            }
        }

        Ok(Arc::new(WorkflowDefinition {
            type_name: self.type_name,
            initial_state: self.initial_state,
            states: self.states,
            transitions: self.transitions,
            due_trigger: self.due_trigger,
        }))
    }
}
