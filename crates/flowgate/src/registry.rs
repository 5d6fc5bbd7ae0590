//! Definition registry: exact-key lookup of workflow definitions.

use std::collections::HashMap;
use std::sync::Arc;

use crate::definition::WorkflowDefinition;
use crate::error::{Error, Result};

/// Display metadata for a registered workflow type.
///
/// Purely presentational (listing pages, navigation); the engine never
/// evaluates it.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct DefinitionMetadata {
    /// Human-readable title.
    pub title: String,
    /// Short description for listings.
    pub description: String,
    /// Route/path the hosting UI mounts the workflow under.
    pub route: String,
}

struct Entry {
    definition: Arc<WorkflowDefinition>,
    metadata: Option<DefinitionMetadata>,
}

/// Registry mapping workflow type names to definitions.
///
/// Populated once at startup, then shared read-only. Lookup is by exact key;
/// unregistered keys fail fast at the call site
/// ([`Error::UnknownWorkflowType`]).
#[derive(Default)]
pub struct DefinitionRegistry {
    entries: Vec<Entry>,
    by_type: HashMap<String, usize>,
}

impl DefinitionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a definition, optionally with display metadata.
    ///
    /// Each workflow type can only be registered once.
    pub fn register(
        &mut self,
        definition: Arc<WorkflowDefinition>,
        metadata: Option<DefinitionMetadata>,
    ) -> Result<()> {
        let type_name = definition.type_name().to_owned();
        if self.by_type.contains_key(&type_name) {
            return Err(Error::DuplicateWorkflowType(type_name));
        }
        self.by_type.insert(type_name, self.entries.len());
        self.entries.push(Entry {
            definition,
            metadata,
        });
        Ok(())
    }

    /// Look up a definition by exact type name.
    pub fn get(&self, workflow_type: &str) -> Option<Arc<WorkflowDefinition>> {
        self.by_type
            .get(workflow_type)
            .map(|&i| Arc::clone(&self.entries[i].definition))
    }

    /// Display metadata for a type, if registered with any.
    pub fn metadata(&self, workflow_type: &str) -> Option<&DefinitionMetadata> {
        self.by_type
            .get(workflow_type)
            .and_then(|&i| self.entries[i].metadata.as_ref())
    }

    /// All registered definitions, in registration order.
    pub fn definitions(&self) -> impl Iterator<Item = &Arc<WorkflowDefinition>> {
        self.entries.iter().map(|e| &e.definition)
    }

    /// The subset of definitions visible to the current caller.
    ///
    /// `filter` is the host's opaque authorization predicate (role or
    /// claim-based); the engine only applies it.
    pub fn visible<F>(&self, filter: F) -> Vec<Arc<WorkflowDefinition>>
    where
        F: Fn(&WorkflowDefinition, Option<&DefinitionMetadata>) -> bool,
    {
        self.entries
            .iter()
            .filter(|e| filter(&e.definition, e.metadata.as_ref()))
            .map(|e| Arc::clone(&e.definition))
            .collect()
    }

    /// Number of registered definitions.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
