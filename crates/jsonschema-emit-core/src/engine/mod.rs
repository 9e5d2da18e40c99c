//! Generator session: traversal and emission over one record table.
//!
//! A [`JsonSchemaGenerator`] runs in two phases:
//!
//! 1. [`process`](JsonSchemaGenerator::process) walks the schema graph from a
//!    root, lowering every node it reaches into a [`Fragment`] stored in a
//!    [`VisitRecord`]. Records persist across calls, so several roots can be
//!    processed into one session and reuse across roots is visible.
//! 2. [`emit`](JsonSchemaGenerator::emit) decides which records are hoisted
//!    into the definitions table, flattens pass-through records into their
//!    targets, runs the override hook and assembles the document.
//!
//! Emission rewrites records destructively. A root can be emitted once, and a
//! self-contained emit (no [`ExternalRegistry`](crate::ExternalRegistry))
//! ends the session.

mod emit;
mod process;

use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::config::ConvertOptions;
use crate::fragment::{Fragment, RecordId};
use crate::graph::{NodeId, SchemaGraph, SchemaNode};
use crate::registry::MetadataRegistry;

/// What the traversal learned about one distinct node.
#[derive(Debug, Clone)]
pub struct VisitRecord {
    pub node: NodeId,
    /// Live fragment. Rewritten to a bare `$ref` when hoisted.
    pub schema: Fragment,
    /// Copy of the fragment taken at hoisting; becomes the definition body.
    pub def: Option<Fragment>,
    pub def_id: Option<String>,
    /// Times the node was reached.
    pub count: usize,
    /// Descent path at which the node was found inside its own ancestry.
    pub cycle: Option<String>,
    /// Set when another record is a clone of this one.
    pub is_parent: bool,
    /// Record whose content this one passes through. Cleared by flattening.
    pub pass_through: Option<RecordId>,
    pub(crate) flattened: bool,
}

impl VisitRecord {
    fn new(node: NodeId) -> Self {
        Self {
            node,
            schema: Fragment::new(),
            def: None,
            def_id: None,
            count: 1,
            cycle: None,
            is_parent: false,
            pass_through: None,
            flattened: false,
        }
    }
}

/// Arguments passed to the override hook.
pub struct OverrideContext<'a> {
    pub node: NodeId,
    pub schema: &'a SchemaNode,
    /// The finalized fragment; the definition body for hoisted nodes.
    pub json_schema: &'a mut Fragment,
}

type OverrideFn<'g> = dyn FnMut(OverrideContext<'_>) + 'g;

/// One traversal session over a schema graph.
pub struct JsonSchemaGenerator<'g> {
    graph: &'g SchemaGraph,
    metadata: &'g MetadataRegistry,
    options: ConvertOptions,
    override_hook: Option<Box<OverrideFn<'g>>>,
    records: Vec<VisitRecord>,
    index: HashMap<NodeId, RecordId>,
    /// Next generated definition id.
    counter: usize,
    emitted: HashSet<NodeId>,
    consumed: bool,
}

impl<'g> JsonSchemaGenerator<'g> {
    pub fn new(
        graph: &'g SchemaGraph,
        metadata: &'g MetadataRegistry,
        options: ConvertOptions,
    ) -> Self {
        Self {
            graph,
            metadata,
            options,
            override_hook: None,
            records: Vec::new(),
            index: HashMap::new(),
            counter: 0,
            emitted: HashSet::new(),
            consumed: false,
        }
    }

    /// Installs a hook run once per non-placeholder record after flattening.
    pub fn with_override<F>(mut self, hook: F) -> Self
    where
        F: FnMut(OverrideContext<'_>) + 'g,
    {
        self.override_hook = Some(Box::new(hook));
        self
    }

    /// Records in traversal order.
    pub fn records(&self) -> &[VisitRecord] {
        &self.records
    }

    pub fn record(&self, node: NodeId) -> Option<&VisitRecord> {
        let id = self.index.get(&node)?;
        self.records.get(id.index())
    }

    fn next_def_id(&mut self, prefix: &str) -> String {
        let id = format!("{prefix}{}", self.counter);
        self.counter += 1;
        id
    }
}

impl fmt::Debug for JsonSchemaGenerator<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonSchemaGenerator")
            .field("options", &self.options)
            .field("records", &self.records.len())
            .field("counter", &self.counter)
            .field("consumed", &self.consumed)
            .finish_non_exhaustive()
    }
}
