//! Graph documents: a JSON encoding of a schema graph.
//!
//! ```json
//! {
//!   "root": 0,
//!   "nodes": [
//!     { "type": "object", "shape": { "name": 1, "tags": 2 } },
//!     { "type": "string", "min_length": 1 },
//!     { "type": "optional", "inner": 3 },
//!     { "type": "array", "element": 1 }
//!   ],
//!   "metadata": { "0": { "id": "User", "description": "A user" } }
//! }
//! ```
//!
//! Nodes refer to each other by index into `nodes`, so forward references and
//! cycles need no special syntax. Constraint fields sit next to `type`.
//! `custom` gives a node a fixed fragment that replaces default lowering.

use std::collections::BTreeMap;
use std::fmt;

use regex::Regex;
use serde::de::{self, MapAccess, Visitor};
use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};

use crate::error::ConvertError;
use crate::graph::{
    ConstraintBag, CustomLowering, Fallback, LiteralValue, NodeId, NodeKind, Optionality,
    SchemaGraph, SchemaNode,
};
use crate::registry::MetadataRegistry;

/// Top-level graph document.
#[derive(Debug, Clone, Deserialize)]
pub struct GraphDocument {
    /// Node converted by single-schema export.
    #[serde(default)]
    pub root: Option<u32>,
    pub nodes: Vec<NodeSpec>,
    /// Metadata keyed by node index.
    #[serde(default)]
    pub metadata: BTreeMap<u32, Map<String, Value>>,
}

/// One node entry.
#[derive(Debug, Clone, Deserialize)]
pub struct NodeSpec {
    #[serde(flatten)]
    pub kind: KindSpec,
    #[serde(flatten)]
    pub constraints: ConstraintSpec,
    #[serde(default)]
    pub parent: Option<u32>,
    #[serde(default)]
    pub optionality: Option<Optionality>,
    #[serde(default)]
    pub custom: Option<Map<String, Value>>,
}

/// Node variant, tagged by `type`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum KindSpec {
    String,
    Number,
    Boolean,
    #[serde(rename = "bigint")]
    BigInt,
    Symbol,
    Undefined,
    Null,
    Any,
    Unknown,
    Never,
    Void,
    Date,
    Array {
        element: u32,
    },
    Object {
        #[serde(default)]
        shape: Shape,
        #[serde(default)]
        catchall: Option<u32>,
    },
    Union {
        options: Vec<u32>,
    },
    Intersection {
        left: u32,
        right: u32,
    },
    Tuple {
        items: Vec<u32>,
        #[serde(default)]
        rest: Option<u32>,
    },
    Record {
        key: u32,
        value: u32,
    },
    Map {
        key: u32,
        value: u32,
    },
    Set {
        value: u32,
    },
    Enum {
        values: Vec<Value>,
    },
    Literal {
        values: Vec<LiteralSpec>,
    },
    File,
    Transform,
    Nullable {
        inner: u32,
    },
    Nonoptional {
        inner: u32,
    },
    Success {
        inner: u32,
    },
    Default {
        inner: u32,
        value: Value,
    },
    Prefault {
        inner: u32,
        value: Value,
    },
    Catch {
        inner: u32,
        value: Value,
    },
    Nan,
    /// Uses the `pattern` constraint field as its pattern.
    TemplateLiteral,
    Pipe {
        input: u32,
        output: u32,
    },
    Readonly {
        inner: u32,
    },
    Promise {
        inner: u32,
    },
    Optional {
        inner: u32,
    },
    Lazy {
        inner: u32,
    },
    Custom,
}

/// Constraint fields accepted on any node.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConstraintSpec {
    #[serde(default)]
    pub minimum: Option<f64>,
    #[serde(default)]
    pub maximum: Option<f64>,
    #[serde(default)]
    pub exclusive_minimum: Option<f64>,
    #[serde(default)]
    pub exclusive_maximum: Option<f64>,
    #[serde(default)]
    pub multiple_of: Option<f64>,
    #[serde(default)]
    pub min_length: Option<usize>,
    #[serde(default)]
    pub max_length: Option<usize>,
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub pattern: Option<String>,
    #[serde(default)]
    pub content_encoding: Option<String>,
}

/// A literal value. JSON scalars stand for themselves; `{"undefined": true}`
/// and `{"bigint": "123"}` encode the two values JSON cannot.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum LiteralSpec {
    Null,
    Boolean(bool),
    Number(f64),
    String(String),
    Marker {
        #[serde(default)]
        undefined: bool,
        #[serde(default)]
        bigint: Option<String>,
    },
}

/// Object properties in document order.
#[derive(Debug, Clone, Default)]
pub struct Shape(pub Vec<(String, u32)>);

impl<'de> Deserialize<'de> for Shape {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ShapeVisitor;

        impl<'de> Visitor<'de> for ShapeVisitor {
            type Value = Shape;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of property names to node indices")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Shape, A::Error> {
                let mut entries = Vec::new();
                while let Some((key, index)) = map.next_entry::<String, u32>()? {
                    if entries.iter().any(|(k, _)| k == &key) {
                        return Err(de::Error::custom(format!("duplicate property {key:?}")));
                    }
                    entries.push((key, index));
                }
                Ok(Shape(entries))
            }
        }

        deserializer.deserialize_map(ShapeVisitor)
    }
}

/// A graph document turned into live structures.
#[derive(Debug)]
pub struct LoadedGraph {
    pub graph: SchemaGraph,
    pub metadata: MetadataRegistry,
    pub root: Option<NodeId>,
}

impl GraphDocument {
    pub fn from_json_str(input: &str) -> Result<Self, ConvertError> {
        Ok(serde_json::from_str(input)?)
    }

    pub fn from_value(value: Value) -> Result<Self, ConvertError> {
        Ok(serde_json::from_value(value)?)
    }

    /// Build the graph and metadata registry.
    pub fn load(self) -> Result<LoadedGraph, ConvertError> {
        let count = self.nodes.len();
        let mut graph = SchemaGraph::new();
        let ids: Vec<NodeId> = (0..count).map(|_| graph.reserve()).collect();

        for (index, spec) in self.nodes.into_iter().enumerate() {
            let node = spec.into_node(index, count)?;
            graph.define(ids[index], node)?;
        }

        let mut metadata = MetadataRegistry::new();
        for (index, meta) in self.metadata {
            let id = resolve(index, count, "metadata")?;
            metadata.add(id, meta)?;
        }

        let root = self
            .root
            .map(|index| resolve(index, count, "root"))
            .transpose()?;

        tracing::debug!(nodes = count, metadata = metadata.len(), "loaded graph document");
        Ok(LoadedGraph {
            graph,
            metadata,
            root,
        })
    }
}

fn resolve(index: u32, count: usize, at: &str) -> Result<NodeId, ConvertError> {
    if (index as usize) < count {
        Ok(NodeId::new(index))
    } else {
        Err(ConvertError::InvalidGraph {
            message: format!("{at} refers to node {index}, but the graph has {count} nodes"),
        })
    }
}

impl NodeSpec {
    fn into_node(self, index: usize, count: usize) -> Result<SchemaNode, ConvertError> {
        let at = format!("node {index}");
        let r = |child: u32| resolve(child, count, &at);

        let mut bag = self.constraints.into_bag(index)?;
        let kind = match self.kind {
            KindSpec::String => NodeKind::String,
            KindSpec::Number => NodeKind::Number,
            KindSpec::Boolean => NodeKind::Boolean,
            KindSpec::BigInt => NodeKind::BigInt,
            KindSpec::Symbol => NodeKind::Symbol,
            KindSpec::Undefined => NodeKind::Undefined,
            KindSpec::Null => NodeKind::Null,
            KindSpec::Any => NodeKind::Any,
            KindSpec::Unknown => NodeKind::Unknown,
            KindSpec::Never => NodeKind::Never,
            KindSpec::Void => NodeKind::Void,
            KindSpec::Date => NodeKind::Date,
            KindSpec::Array { element } => NodeKind::Array {
                element: r(element)?,
            },
            KindSpec::Object { shape, catchall } => NodeKind::Object {
                shape: shape
                    .0
                    .into_iter()
                    .map(|(key, child)| Ok((key, r(child)?)))
                    .collect::<Result<_, ConvertError>>()?,
                catchall: catchall.map(r).transpose()?,
            },
            KindSpec::Union { options } => NodeKind::Union {
                options: options.into_iter().map(r).collect::<Result<_, _>>()?,
            },
            KindSpec::Intersection { left, right } => NodeKind::Intersection {
                left: r(left)?,
                right: r(right)?,
            },
            KindSpec::Tuple { items, rest } => NodeKind::Tuple {
                items: items.into_iter().map(r).collect::<Result<_, _>>()?,
                rest: rest.map(r).transpose()?,
            },
            KindSpec::Record { key, value } => NodeKind::Record {
                key: r(key)?,
                value: r(value)?,
            },
            KindSpec::Map { key, value } => NodeKind::Map {
                key: r(key)?,
                value: r(value)?,
            },
            KindSpec::Set { value } => NodeKind::Set { value: r(value)? },
            KindSpec::Enum { values } => NodeKind::Enum {
                entries: values
                    .into_iter()
                    .enumerate()
                    .map(|(i, v)| (i.to_string(), v))
                    .collect(),
            },
            KindSpec::Literal { values } => NodeKind::Literal {
                values: values
                    .into_iter()
                    .map(|v| v.into_literal(index))
                    .collect::<Result<_, _>>()?,
            },
            KindSpec::File => NodeKind::File,
            KindSpec::Transform => NodeKind::Transform,
            KindSpec::Nullable { inner } => NodeKind::Nullable { inner: r(inner)? },
            KindSpec::Nonoptional { inner } => NodeKind::Nonoptional { inner: r(inner)? },
            KindSpec::Success { inner } => NodeKind::Success { inner: r(inner)? },
            KindSpec::Default { inner, value } => NodeKind::Default {
                inner: r(inner)?,
                value,
            },
            KindSpec::Prefault { inner, value } => NodeKind::Prefault {
                inner: r(inner)?,
                value,
            },
            KindSpec::Catch { inner, value } => NodeKind::Catch {
                inner: r(inner)?,
                fallback: Fallback::Value(value),
            },
            KindSpec::Nan => NodeKind::Nan,
            KindSpec::TemplateLiteral => NodeKind::TemplateLiteral {
                pattern: bag.pattern.take(),
            },
            KindSpec::Pipe { input, output } => NodeKind::Pipe {
                input: r(input)?,
                output: r(output)?,
            },
            KindSpec::Readonly { inner } => NodeKind::Readonly { inner: r(inner)? },
            KindSpec::Promise { inner } => NodeKind::Promise { inner: r(inner)? },
            KindSpec::Optional { inner } => NodeKind::Optional { inner: r(inner)? },
            KindSpec::Lazy { inner } => NodeKind::Lazy { inner: r(inner)? },
            KindSpec::Custom => NodeKind::Custom,
        };

        let mut node = SchemaNode::new(kind).with_bag(bag);
        if let Some(parent) = self.parent {
            node = node.with_parent(r(parent)?);
        }
        if let Some(optionality) = self.optionality {
            node = node.with_optionality(optionality);
        }
        if let Some(fragment) = self.custom {
            node = node.with_custom(CustomLowering::fixed(fragment));
        }
        Ok(node)
    }
}

impl ConstraintSpec {
    fn into_bag(self, index: usize) -> Result<ConstraintBag, ConvertError> {
        let pattern = self
            .pattern
            .map(|source| {
                Regex::new(&source).map_err(|e| ConvertError::InvalidPattern {
                    path: format!("#/nodes/{index}/pattern"),
                    message: e.to_string(),
                })
            })
            .transpose()?;

        Ok(ConstraintBag {
            minimum: self.minimum,
            maximum: self.maximum,
            exclusive_minimum: self.exclusive_minimum,
            exclusive_maximum: self.exclusive_maximum,
            multiple_of: self.multiple_of,
            min_length: self.min_length,
            max_length: self.max_length,
            format: self.format,
            pattern,
            content_encoding: self.content_encoding,
        })
    }
}

impl LiteralSpec {
    fn into_literal(self, index: usize) -> Result<LiteralValue, ConvertError> {
        match self {
            LiteralSpec::Null => Ok(LiteralValue::Null),
            LiteralSpec::Boolean(b) => Ok(LiteralValue::Boolean(b)),
            LiteralSpec::Number(n) => Ok(LiteralValue::Number(n)),
            LiteralSpec::String(s) => Ok(LiteralValue::String(s)),
            LiteralSpec::Marker {
                undefined: true,
                bigint: None,
            } => Ok(LiteralValue::Undefined),
            LiteralSpec::Marker {
                undefined: false,
                bigint: Some(digits),
            } => digits
                .parse::<i128>()
                .map(LiteralValue::BigInt)
                .map_err(|e| ConvertError::InvalidGraph {
                    message: format!("node {index}: bigint literal {digits:?}: {e}"),
                }),
            LiteralSpec::Marker { .. } => Err(ConvertError::InvalidGraph {
                message: format!(
                    "node {index}: literal objects must be {{\"undefined\": true}} or {{\"bigint\": \"...\"}}"
                ),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_load_preserves_shape_order() {
        let doc = GraphDocument::from_value(json!({
            "root": 0,
            "nodes": [
                { "type": "object", "shape": { "zeta": 1, "alpha": 1 } },
                { "type": "string", "min_length": 2, "format": "email" }
            ]
        }))
        .unwrap();
        let loaded = doc.load().unwrap();

        let root = loaded.root.unwrap();
        match &loaded.graph.node(root).unwrap().kind {
            NodeKind::Object { shape, .. } => {
                let keys: Vec<_> = shape.iter().map(|(k, _)| k.as_str()).collect();
                assert_eq!(keys, vec!["zeta", "alpha"]);
            }
            other => panic!("expected object, got {other:?}"),
        }
        let string = loaded.graph.node(NodeId::new(1)).unwrap();
        assert_eq!(string.bag.min_length, Some(2));
        assert_eq!(string.bag.format.as_deref(), Some("email"));
    }

    #[test]
    fn test_forward_reference_cycle_loads() {
        let doc = GraphDocument::from_value(json!({
            "nodes": [
                { "type": "lazy", "inner": 1 },
                { "type": "object", "shape": { "next": 2 } },
                { "type": "optional", "inner": 0 }
            ]
        }))
        .unwrap();
        let loaded = doc.load().unwrap();
        assert_eq!(loaded.graph.len(), 3);
        assert!(loaded.root.is_none());
    }

    #[test]
    fn test_out_of_range_child_rejected() {
        let doc = GraphDocument::from_value(json!({
            "nodes": [ { "type": "array", "element": 7 } ]
        }))
        .unwrap();
        let err = doc.load().unwrap_err();
        assert!(matches!(err, ConvertError::InvalidGraph { .. }), "{err}");
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        let doc = GraphDocument::from_value(json!({
            "nodes": [ { "type": "string", "pattern": "(" } ]
        }))
        .unwrap();
        let err = doc.load().unwrap_err();
        assert_eq!(err.path(), Some("#/nodes/0/pattern"));
    }

    #[test]
    fn test_literal_markers() {
        let doc = GraphDocument::from_value(json!({
            "nodes": [
                { "type": "literal", "values": ["a", 1, true, null, {"undefined": true}, {"bigint": "12"}] }
            ]
        }))
        .unwrap();
        let loaded = doc.load().unwrap();
        match &loaded.graph.node(NodeId::new(0)).unwrap().kind {
            NodeKind::Literal { values } => assert_eq!(
                values,
                &vec![
                    LiteralValue::String("a".to_string()),
                    LiteralValue::Number(1.0),
                    LiteralValue::Boolean(true),
                    LiteralValue::Null,
                    LiteralValue::Undefined,
                    LiteralValue::BigInt(12),
                ]
            ),
            other => panic!("expected literal, got {other:?}"),
        }
    }

    #[test]
    fn test_template_literal_takes_pattern() {
        let doc = GraphDocument::from_value(json!({
            "nodes": [ { "type": "template_literal", "pattern": "^id-\\d+$" } ]
        }))
        .unwrap();
        let loaded = doc.load().unwrap();
        let node = loaded.graph.node(NodeId::new(0)).unwrap();
        assert!(node.bag.pattern.is_none());
        match &node.kind {
            NodeKind::TemplateLiteral { pattern: Some(p) } => assert_eq!(p.as_str(), "^id-\\d+$"),
            other => panic!("expected template literal, got {other:?}"),
        }
    }

    #[test]
    fn test_metadata_and_duplicate_ids() {
        let doc = GraphDocument::from_value(json!({
            "nodes": [ { "type": "string" }, { "type": "number" } ],
            "metadata": { "0": { "id": "A" }, "1": { "id": "A" } }
        }))
        .unwrap();
        let err = doc.load().unwrap_err();
        assert!(matches!(err, ConvertError::DuplicateId { .. }));
    }

    #[test]
    fn test_unknown_type_is_json_error() {
        let err = GraphDocument::from_json_str(r#"{"nodes": [{"type": "widget"}]}"#).unwrap_err();
        assert!(matches!(err, ConvertError::JsonError(_)));
    }
}
