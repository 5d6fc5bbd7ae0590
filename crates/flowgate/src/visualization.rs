//! Graph export for workflow definitions.
//!
//! [`DefinitionGraph`] renders a definition as a deterministic textual graph
//! (nodes = states, edges = transitions labeled by trigger name) for
//! debugging, monitoring dashboards, and user interfaces. Output order
//! follows declaration order, so the same definition always produces the
//! same text.
//!
//! An instance's audit trail can be layered on top with
//! [`highlight_history`](DefinitionGraph::highlight_history), which marks the
//! traversed edges.

use crate::definition::WorkflowDefinition;
use crate::store::HistoryEntry;

/// One edge of the exported graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphEdge {
    /// The source state name.
    pub from: String,
    /// The target state name.
    pub to: String,
    /// The trigger labeling the edge.
    pub trigger: String,
    /// Whether the transition carries a guard.
    pub guarded: bool,
    /// Whether a highlighted history traversed this edge.
    pub traversed: bool,
}

/// Deterministic graph model of one workflow definition.
///
/// # Example
///
/// ```
/// use flowgate::{DefinitionGraph, WorkflowDefinition};
///
/// let def = WorkflowDefinition::builder("holiday", "Requested")
///     .states(["Requested", "Approved"])
///     .transition("Requested", "approve", "Approved")
///     .build()
///     .unwrap();
///
/// let dot = DefinitionGraph::new(&def).to_dot();
/// assert!(dot.contains("Requested -> Approved [label=\"approve\"]"));
/// ```
#[derive(Debug, Clone)]
pub struct DefinitionGraph {
    type_name: String,
    initial_state: String,
    states: Vec<String>,
    edges: Vec<GraphEdge>,
}

impl DefinitionGraph {
    /// Build the graph model for a definition.
    pub fn new(definition: &WorkflowDefinition) -> Self {
        let edges = definition
            .transitions()
            .iter()
            .map(|t| GraphEdge {
                from: t.source().to_owned(),
                to: t.target().to_owned(),
                trigger: t.trigger().to_owned(),
                guarded: t.guard().is_some(),
                traversed: false,
            })
            .collect();

        Self {
            type_name: definition.type_name().to_owned(),
            initial_state: definition.initial_state().to_owned(),
            states: definition.states().to_vec(),
            edges,
        }
    }

    /// Mark the edges an instance's history traversed.
    ///
    /// An edge is traversed when some history entry matches its
    /// `(from, to, trigger)` triple.
    pub fn highlight_history(mut self, history: &[HistoryEntry]) -> Self {
        for edge in &mut self.edges {
            edge.traversed = history.iter().any(|h| {
                h.from_state == edge.from && h.to_state == edge.to && h.trigger == edge.trigger
            });
        }
        self
    }

    /// The graph's edges, in definition order.
    pub fn edges(&self) -> &[GraphEdge] {
        &self.edges
    }

    fn is_terminal(&self, state: &str) -> bool {
        !self.edges.iter().any(|e| e.from == state)
    }

    fn edge_label(edge: &GraphEdge) -> String {
        if edge.guarded {
            format!("{} [guarded]", edge.trigger)
        } else {
            edge.trigger.clone()
        }
    }

    /// Generate a DOT graph for Graphviz.
    ///
    /// Traversed edges are drawn bold. States with no outgoing transitions
    /// are drawn as double circles.
    ///
    /// # Example Output
    ///
    /// ```text
    /// digraph holiday {
    ///     rankdir=LR;
    ///     node [shape=box];
    ///
    ///     Requested -> Approved [label="approve"];
    ///     Requested -> Rejected [label="reject"];
    ///
    ///     Approved [shape=doublecircle];
    ///     Rejected [shape=doublecircle];
    /// }
    /// ```
    pub fn to_dot(&self) -> String {
        let mut lines = vec![
            format!("digraph {} {{", self.type_name),
            "    rankdir=LR;".to_string(),
            "    node [shape=box];".to_string(),
            String::new(),
        ];

        for edge in &self.edges {
            let mut attrs = format!("label=\"{}\"", Self::edge_label(edge));
            if edge.traversed {
                attrs.push_str(", penwidth=2, color=blue");
            }
            lines.push(format!("    {} -> {} [{}];", edge.from, edge.to, attrs));
        }

        lines.push(String::new());
        for state in &self.states {
            if self.is_terminal(state) {
                lines.push(format!("    {} [shape=doublecircle];", state));
            }
        }

        lines.push("}".to_string());
        lines.join("\n")
    }

    /// Generate a Mermaid state diagram.
    ///
    /// # Example Output
    ///
    /// ```text
    /// stateDiagram-v2
    ///     [*] --> Requested
    ///     Requested --> Approved : approve
    ///     Requested --> Rejected : reject
    ///     Approved --> [*]
    ///     Rejected --> [*]
    /// ```
    pub fn to_mermaid(&self) -> String {
        let mut lines = vec!["stateDiagram-v2".to_string()];

        lines.push(format!("    [*] --> {}", self.initial_state));

        for edge in &self.edges {
            let mut label = Self::edge_label(edge);
            if edge.traversed {
                label.push_str(" (taken)");
            }
            lines.push(format!("    {} --> {} : {}", edge.from, edge.to, label));
        }

        for state in &self.states {
            if self.is_terminal(state) {
                lines.push(format!("    {} --> [*]", state));
            }
        }

        lines.join("\n")
    }
}
