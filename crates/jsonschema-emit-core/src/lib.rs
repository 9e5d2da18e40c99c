//! # jsonschema-emit-core
//!
//! Compiles a graph of composable schema nodes into a JSON Schema document.
//!
//! Conversion runs in two phases over one [`JsonSchemaGenerator`] session:
//! traversal lowers every reachable node into a fragment and records visit
//! counts, cycles and pass-through links; emission hoists shared or cyclic
//! fragments into a definitions table, flattens wrappers and assembles the
//! document for the chosen dialect.
//!
//! ```
//! use jsonschema_emit_core::{to_json_schema, ConvertOptions, MetadataRegistry, SchemaGraph};
//! use serde_json::json;
//!
//! let mut graph = SchemaGraph::new();
//! let name = graph.string();
//! let user = graph.object([("name", name)]);
//!
//! let doc = to_json_schema(&graph, &MetadataRegistry::new(), user, &ConvertOptions::default())
//!     .unwrap();
//! assert_eq!(doc["properties"]["name"], json!({"type": "string"}));
//! assert_eq!(doc["required"], json!(["name"]));
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod fragment;
pub mod graph;
pub mod loader;
pub mod registry;
pub mod schema_utils;

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

pub use config::{ConvertOptions, CyclePolicy, Io, ReusePolicy, Target, UnrepresentablePolicy};
pub use engine::{JsonSchemaGenerator, OverrideContext, VisitRecord};
pub use error::{ConvertError, ErrorCode};
pub use fragment::{Fragment, RecordId, Slot};
pub use graph::{
    ConstraintBag, CustomLowering, Fallback, LiteralValue, NodeId, NodeKind, Optionality,
    SchemaGraph, SchemaNode,
};
pub use loader::{GraphDocument, LoadedGraph};
pub use registry::{ExternalRegistry, MetadataRegistry};
pub use schema_utils::build_path;

/// Convert a single root into a self-contained JSON Schema document.
#[tracing::instrument(skip_all, fields(root = %root, target = ?options.target))]
pub fn to_json_schema(
    graph: &SchemaGraph,
    metadata: &MetadataRegistry,
    root: NodeId,
    options: &ConvertOptions,
) -> Result<Value, ConvertError> {
    let mut generator = JsonSchemaGenerator::new(graph, metadata, *options);
    generator.process(root)?;
    generator.emit(root, None)
}

/// Documents produced by [`registry_to_json_schema`], keyed by schema id.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegistryExport {
    pub schemas: BTreeMap<String, Value>,
}

/// Convert every root registered in `registry` in one session.
///
/// Each registered node gets its own document. References between registered
/// nodes go through `uri(id)`; other hoisted nodes land in a shared
/// definitions document stored under [`ExternalRegistry::SHARED_ID`].
#[tracing::instrument(skip_all, fields(roots = registry.len(), target = ?options.target))]
pub fn registry_to_json_schema<F>(
    graph: &SchemaGraph,
    registry: &MetadataRegistry,
    options: &ConvertOptions,
    uri: F,
) -> Result<RegistryExport, ConvertError>
where
    F: Fn(&str) -> String,
{
    let mut generator = JsonSchemaGenerator::new(graph, registry, *options);
    let roots: Vec<(String, NodeId)> = registry
        .ids()
        .map(|(id, node)| (id.to_string(), node))
        .collect();

    for (_, node) in &roots {
        generator.process(*node)?;
    }

    let mut external = ExternalRegistry::new(registry, uri);
    let mut schemas = BTreeMap::new();
    for (id, node) in roots {
        let doc = generator.emit(node, Some(&mut external))?;
        schemas.insert(id, doc);
    }

    if !external.defs.is_empty() {
        let mut shared = serde_json::Map::new();
        shared.insert(
            options.target.defs_keyword().to_string(),
            Value::Object(std::mem::take(&mut external.defs)),
        );
        schemas.insert(
            ExternalRegistry::SHARED_ID.to_string(),
            Value::Object(shared),
        );
    }

    Ok(RegistryExport { schemas })
}
