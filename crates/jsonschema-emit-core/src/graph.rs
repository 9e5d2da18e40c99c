//! Schema-node arena.
//!
//! Schema nodes live in a flat [`SchemaGraph`] and refer to their children by
//! [`NodeId`] handle, never by ownership. Cycles (a lazy getter pointing back
//! at an enclosing object, an object whose property is itself) are expressed
//! by reserving a slot first and defining it once its children exist.
//!
//! Nodes are immutable once defined; the traversal only reads them.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ConvertError;

/// Dense handle of a node inside a [`SchemaGraph`].
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(u32);

impl NodeId {
    /// Creates a handle from a raw index.
    #[inline]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Returns the raw index.
    #[inline]
    pub const fn as_u32(&self) -> u32 {
        self.0
    }

    #[inline]
    fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

/// Constraints attached to a node by the definition system.
///
/// `min_length` / `max_length` count characters for strings and items for
/// arrays and tuples.
#[derive(Debug, Clone, Default)]
pub struct ConstraintBag {
    pub minimum: Option<f64>,
    pub maximum: Option<f64>,
    pub exclusive_minimum: Option<f64>,
    pub exclusive_maximum: Option<f64>,
    pub multiple_of: Option<f64>,
    pub min_length: Option<usize>,
    pub max_length: Option<usize>,
    pub format: Option<String>,
    pub pattern: Option<Regex>,
    pub content_encoding: Option<String>,
}

/// A single value accepted by a literal node.
#[derive(Debug, Clone, PartialEq)]
pub enum LiteralValue {
    String(String),
    Number(f64),
    Boolean(bool),
    Null,
    /// Not expressible in JSON.
    Undefined,
    /// Arbitrary-precision integer; downcast to a float when tolerated.
    BigInt(i128),
}

type FallbackFn = dyn Fn(Option<&Value>) -> Result<Value, String> + Send + Sync;

/// Value substituted by a `catch` node when parsing fails.
#[derive(Clone)]
pub enum Fallback {
    /// A fixed value.
    Value(Value),
    /// A value computed from the rejected input. Only fallbacks that succeed
    /// without an input can be exported.
    Computed(Arc<FallbackFn>),
}

impl Fallback {
    pub fn computed<F>(f: F) -> Self
    where
        F: Fn(Option<&Value>) -> Result<Value, String> + Send + Sync + 'static,
    {
        Fallback::Computed(Arc::new(f))
    }

    /// Evaluates the fallback with no input.
    pub fn evaluate(&self) -> Result<Value, String> {
        match self {
            Fallback::Value(v) => Ok(v.clone()),
            Fallback::Computed(f) => f(None),
        }
    }
}

impl fmt::Debug for Fallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fallback::Value(v) => f.debug_tuple("Value").field(v).finish(),
            Fallback::Computed(_) => f.write_str("Computed(..)"),
        }
    }
}

type LoweringFn = dyn Fn() -> Map<String, Value> + Send + Sync;

/// Node-supplied lowering that replaces default variant dispatch.
#[derive(Clone)]
pub struct CustomLowering(Arc<LoweringFn>);

impl CustomLowering {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn() -> Map<String, Value> + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    /// A lowering that always yields the same fragment.
    pub fn fixed(fragment: Map<String, Value>) -> Self {
        Self::new(move || fragment.clone())
    }

    pub fn lower(&self) -> Map<String, Value> {
        (self.0)()
    }
}

impl fmt::Debug for CustomLowering {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CustomLowering(..)")
    }
}

/// Optionality markers consulted when computing an object's `required` list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Optionality {
    /// The key may be absent from parser input.
    pub input: bool,
    /// The key may be absent from parser output.
    pub output: bool,
}

/// Variant of a schema node together with its children.
#[derive(Debug, Clone)]
pub enum NodeKind {
    String,
    Number,
    Boolean,
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
        element: NodeId,
    },
    Object {
        shape: Vec<(String, NodeId)>,
        catchall: Option<NodeId>,
    },
    Union {
        options: Vec<NodeId>,
    },
    Intersection {
        left: NodeId,
        right: NodeId,
    },
    Tuple {
        items: Vec<NodeId>,
        rest: Option<NodeId>,
    },
    Record {
        key: NodeId,
        value: NodeId,
    },
    Map {
        key: NodeId,
        value: NodeId,
    },
    Set {
        value: NodeId,
    },
    Enum {
        entries: Vec<(String, Value)>,
    },
    Literal {
        values: Vec<LiteralValue>,
    },
    File,
    Transform,
    Nullable {
        inner: NodeId,
    },
    Nonoptional {
        inner: NodeId,
    },
    Success {
        inner: NodeId,
    },
    Default {
        inner: NodeId,
        value: Value,
    },
    Prefault {
        inner: NodeId,
        value: Value,
    },
    Catch {
        inner: NodeId,
        fallback: Fallback,
    },
    Nan,
    TemplateLiteral {
        pattern: Option<Regex>,
    },
    Pipe {
        input: NodeId,
        output: NodeId,
    },
    Readonly {
        inner: NodeId,
    },
    Promise {
        inner: NodeId,
    },
    Optional {
        inner: NodeId,
    },
    Lazy {
        inner: NodeId,
    },
    Custom,
}

impl NodeKind {
    /// Variant name as used in error messages and graph documents.
    pub fn name(&self) -> &'static str {
        match self {
            NodeKind::String => "string",
            NodeKind::Number => "number",
            NodeKind::Boolean => "boolean",
            NodeKind::BigInt => "bigint",
            NodeKind::Symbol => "symbol",
            NodeKind::Undefined => "undefined",
            NodeKind::Null => "null",
            NodeKind::Any => "any",
            NodeKind::Unknown => "unknown",
            NodeKind::Never => "never",
            NodeKind::Void => "void",
            NodeKind::Date => "date",
            NodeKind::Array { .. } => "array",
            NodeKind::Object { .. } => "object",
            NodeKind::Union { .. } => "union",
            NodeKind::Intersection { .. } => "intersection",
            NodeKind::Tuple { .. } => "tuple",
            NodeKind::Record { .. } => "record",
            NodeKind::Map { .. } => "map",
            NodeKind::Set { .. } => "set",
            NodeKind::Enum { .. } => "enum",
            NodeKind::Literal { .. } => "literal",
            NodeKind::File => "file",
            NodeKind::Transform => "transform",
            NodeKind::Nullable { .. } => "nullable",
            NodeKind::Nonoptional { .. } => "nonoptional",
            NodeKind::Success { .. } => "success",
            NodeKind::Default { .. } => "default",
            NodeKind::Prefault { .. } => "prefault",
            NodeKind::Catch { .. } => "catch",
            NodeKind::Nan => "nan",
            NodeKind::TemplateLiteral { .. } => "templateLiteral",
            NodeKind::Pipe { .. } => "pipe",
            NodeKind::Readonly { .. } => "readonly",
            NodeKind::Promise { .. } => "promise",
            NodeKind::Optional { .. } => "optional",
            NodeKind::Lazy { .. } => "lazy",
            NodeKind::Custom => "custom",
        }
    }
}

/// One schema node: its variant plus optional constraints, clone lineage,
/// explicit optionality markers and custom lowering.
#[derive(Debug, Clone)]
pub struct SchemaNode {
    pub kind: NodeKind,
    pub bag: ConstraintBag,
    /// Node this one was cloned from. Emitted as a pass-through.
    pub parent: Option<NodeId>,
    /// Overrides the markers derived from `kind`.
    pub optionality: Option<Optionality>,
    pub custom: Option<CustomLowering>,
}

impl SchemaNode {
    pub fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            bag: ConstraintBag::default(),
            parent: None,
            optionality: None,
            custom: None,
        }
    }

    pub fn with_bag(mut self, bag: ConstraintBag) -> Self {
        self.bag = bag;
        self
    }

    pub fn with_parent(mut self, parent: NodeId) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn with_optionality(mut self, optionality: Optionality) -> Self {
        self.optionality = Some(optionality);
        self
    }

    pub fn with_custom(mut self, custom: CustomLowering) -> Self {
        self.custom = Some(custom);
        self
    }
}

/// Flat store of schema nodes addressed by [`NodeId`].
#[derive(Debug, Clone, Default)]
pub struct SchemaGraph {
    slots: Vec<Option<SchemaNode>>,
}

impl SchemaGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a node and returns its handle.
    pub fn add(&mut self, node: SchemaNode) -> NodeId {
        let id = NodeId(self.slots.len() as u32);
        self.slots.push(Some(node));
        id
    }

    /// Stores a node with no constraints.
    pub fn add_kind(&mut self, kind: NodeKind) -> NodeId {
        self.add(SchemaNode::new(kind))
    }

    /// Allocates an empty slot to be filled by [`SchemaGraph::define`].
    pub fn reserve(&mut self) -> NodeId {
        let id = NodeId(self.slots.len() as u32);
        self.slots.push(None);
        id
    }

    /// Fills a slot previously returned by [`SchemaGraph::reserve`].
    pub fn define(&mut self, id: NodeId, node: SchemaNode) -> Result<(), ConvertError> {
        let slot = self
            .slots
            .get_mut(id.index())
            .ok_or_else(|| ConvertError::InvalidGraph {
                message: format!("{id} is out of range"),
            })?;
        if slot.is_some() {
            return Err(ConvertError::InvalidGraph {
                message: format!("{id} is already defined"),
            });
        }
        *slot = Some(node);
        Ok(())
    }

    /// Clones `parent` into a new node that records its lineage.
    pub fn derive(&mut self, parent: NodeId) -> Result<NodeId, ConvertError> {
        let node = self.node(parent)?.clone().with_parent(parent);
        Ok(self.add(node))
    }

    pub fn get(&self, id: NodeId) -> Option<&SchemaNode> {
        self.slots.get(id.index()).and_then(Option::as_ref)
    }

    /// Like [`SchemaGraph::get`], failing on reserved-but-undefined slots.
    pub fn node(&self, id: NodeId) -> Result<&SchemaNode, ConvertError> {
        self.get(id).ok_or(ConvertError::UndefinedNode { node: id })
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Optionality markers of a node: explicit markers if set, otherwise
    /// derived from the variant and, for wrappers, from the wrapped node.
    pub fn optionality(&self, id: NodeId) -> Optionality {
        let mut visiting = HashSet::new();
        self.derive_optionality(id, &mut visiting)
    }

    fn derive_optionality(&self, id: NodeId, visiting: &mut HashSet<NodeId>) -> Optionality {
        let Some(node) = self.get(id) else {
            return Optionality::default();
        };
        if let Some(explicit) = node.optionality {
            return explicit;
        }
        // Lazy cycles terminate as "required".
        if !visiting.insert(id) {
            return Optionality::default();
        }

        let result = match &node.kind {
            NodeKind::Optional { .. } => Optionality {
                input: true,
                output: true,
            },
            NodeKind::Default { .. } | NodeKind::Prefault { .. } => Optionality {
                input: true,
                output: false,
            },
            NodeKind::Catch { inner, .. } => Optionality {
                input: true,
                output: self.derive_optionality(*inner, visiting).output,
            },
            NodeKind::Nullable { inner } | NodeKind::Readonly { inner } | NodeKind::Lazy { inner } => {
                self.derive_optionality(*inner, visiting)
            }
            NodeKind::Pipe { input, output } => Optionality {
                input: self.derive_optionality(*input, visiting).input,
                output: self.derive_optionality(*output, visiting).output,
            },
            _ => Optionality::default(),
        };

        visiting.remove(&id);
        result
    }

    // -----------------------------------------------------------------------
    // Shorthand constructors
    // -----------------------------------------------------------------------

    pub fn string(&mut self) -> NodeId {
        self.add_kind(NodeKind::String)
    }

    pub fn number(&mut self) -> NodeId {
        self.add_kind(NodeKind::Number)
    }

    pub fn boolean(&mut self) -> NodeId {
        self.add_kind(NodeKind::Boolean)
    }

    pub fn array(&mut self, element: NodeId) -> NodeId {
        self.add_kind(NodeKind::Array { element })
    }

    pub fn object<K: Into<String>>(
        &mut self,
        shape: impl IntoIterator<Item = (K, NodeId)>,
    ) -> NodeId {
        let shape = shape.into_iter().map(|(k, id)| (k.into(), id)).collect();
        self.add_kind(NodeKind::Object {
            shape,
            catchall: None,
        })
    }

    pub fn union(&mut self, options: impl IntoIterator<Item = NodeId>) -> NodeId {
        self.add_kind(NodeKind::Union {
            options: options.into_iter().collect(),
        })
    }

    pub fn optional(&mut self, inner: NodeId) -> NodeId {
        self.add_kind(NodeKind::Optional { inner })
    }

    pub fn nullable(&mut self, inner: NodeId) -> NodeId {
        self.add_kind(NodeKind::Nullable { inner })
    }

    pub fn lazy(&mut self, inner: NodeId) -> NodeId {
        self.add_kind(NodeKind::Lazy { inner })
    }

    pub fn with_default(&mut self, inner: NodeId, value: Value) -> NodeId {
        self.add_kind(NodeKind::Default { inner, value })
    }

    pub fn literal(&mut self, values: impl IntoIterator<Item = LiteralValue>) -> NodeId {
        self.add_kind(NodeKind::Literal {
            values: values.into_iter().collect(),
        })
    }
}
