//! Metadata registry and external-registry addressing.
//!
//! [`MetadataRegistry`] attaches free-form JSON annotations to nodes. Any
//! entry with a string `id` is also indexed by that id, which both forces the
//! node into the definitions table and, in registry export, names a root
//! document.

use std::collections::HashMap;
use std::fmt;

use serde_json::{Map, Value};

use crate::error::ConvertError;
use crate::graph::NodeId;

/// Per-node annotations keyed by [`NodeId`].
#[derive(Debug, Clone, Default)]
pub struct MetadataRegistry {
    entries: HashMap<NodeId, Map<String, Value>>,
    /// Registration order of id-bearing entries.
    ids: Vec<(String, NodeId)>,
}

impl MetadataRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches metadata to a node, replacing any previous entry.
    ///
    /// Fails with [`ConvertError::DuplicateId`] if the metadata carries an
    /// `id` already registered for a different node.
    pub fn add(&mut self, node: NodeId, meta: Map<String, Value>) -> Result<(), ConvertError> {
        if let Some(id) = meta.get("id").and_then(Value::as_str) {
            if self.ids.iter().any(|(existing, n)| existing == id && *n != node) {
                return Err(ConvertError::DuplicateId { id: id.to_string() });
            }
        }

        self.ids.retain(|(_, n)| *n != node);
        if let Some(id) = meta.get("id").and_then(Value::as_str) {
            self.ids.push((id.to_string(), node));
        }
        self.entries.insert(node, meta);
        Ok(())
    }

    /// Shorthand for registering `{"id": id}`.
    pub fn register(&mut self, node: NodeId, id: impl Into<String>) -> Result<(), ConvertError> {
        let mut meta = Map::new();
        meta.insert("id".to_string(), Value::String(id.into()));
        self.add(node, meta)
    }

    pub fn get(&self, node: NodeId) -> Option<&Map<String, Value>> {
        self.entries.get(&node)
    }

    /// The `id` annotation of a node, if any.
    pub fn id(&self, node: NodeId) -> Option<&str> {
        self.get(node)?.get("id")?.as_str()
    }

    /// Id-bearing entries in registration order.
    pub fn ids(&self) -> impl Iterator<Item = (&str, NodeId)> {
        self.ids.iter().map(|(id, node)| (id.as_str(), *node))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// An externally managed document set that hoisted nodes are addressed in.
///
/// Nodes registered in `registry` are referenced by `uri(id)`. Other hoisted
/// nodes go into `defs`, the shared table published as `uri("__shared")`.
pub struct ExternalRegistry<'r> {
    pub registry: &'r MetadataRegistry,
    uri: Box<dyn Fn(&str) -> String + 'r>,
    pub defs: Map<String, Value>,
}

impl<'r> ExternalRegistry<'r> {
    /// Id of the shared definitions document.
    pub const SHARED_ID: &'static str = "__shared";

    pub fn new<F>(registry: &'r MetadataRegistry, uri: F) -> Self
    where
        F: Fn(&str) -> String + 'r,
    {
        Self {
            registry,
            uri: Box::new(uri),
            defs: Map::new(),
        }
    }

    pub fn uri(&self, id: &str) -> String {
        (self.uri)(id)
    }
}

impl fmt::Debug for ExternalRegistry<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExternalRegistry")
            .field("registry", &self.registry)
            .field("defs", &self.defs)
            .finish_non_exhaustive()
    }
}
