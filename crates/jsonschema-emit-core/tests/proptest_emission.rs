//! Property-based tests for emission invariants.
//!
//! Graphs are generated as trees of fresh nodes (no sharing), optionally with
//! one subtree placed under two properties to create reuse.
//!
//! Invariants:
//! - a tree emits no definitions and no references;
//! - with `reused: "ref"` a subtree placed twice becomes exactly one
//!   definition, and both occurrences reference it;
//! - two fresh sessions over the same graph emit identical documents, and the
//!   document survives a text round trip.

use jsonschema_emit_core::{
    to_json_schema, ConstraintBag, ConvertOptions, MetadataRegistry, NodeId, NodeKind,
    ReusePolicy, SchemaGraph, SchemaNode, Target,
};
use proptest::prelude::*;
use serde_json::{json, Value};

// ---------------------------------------------------------------------------
// Strategies
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
enum Shape {
    String { min_length: Option<usize> },
    Number { minimum: Option<i32> },
    Boolean,
    Array(Box<Shape>),
    Object(Vec<(String, Shape)>),
    Optional(Box<Shape>),
    Nullable(Box<Shape>),
    Union(Vec<Shape>),
}

fn arb_shape() -> impl Strategy<Value = Shape> {
    let leaf = prop_oneof![
        proptest::option::of(0usize..10).prop_map(|min_length| Shape::String { min_length }),
        proptest::option::of(-100i32..100).prop_map(|minimum| Shape::Number { minimum }),
        Just(Shape::Boolean),
    ];
    leaf.prop_recursive(4, 32, 4, |inner| {
        prop_oneof![
            inner.clone().prop_map(|s| Shape::Array(Box::new(s))),
            prop::collection::btree_map("[a-z]{1,6}", inner.clone(), 1..4)
                .prop_map(|props| Shape::Object(props.into_iter().collect())),
            inner.clone().prop_map(|s| Shape::Optional(Box::new(s))),
            inner.clone().prop_map(|s| Shape::Nullable(Box::new(s))),
            prop::collection::vec(inner, 2..4).prop_map(Shape::Union),
        ]
    })
}

fn arb_target() -> impl Strategy<Value = Target> {
    prop_oneof![Just(Target::Draft202012), Just(Target::Draft7)]
}

/// Adds fresh nodes for every position in `shape`.
fn build(graph: &mut SchemaGraph, shape: &Shape) -> NodeId {
    match shape {
        Shape::String { min_length } => graph.add(SchemaNode::new(NodeKind::String).with_bag(
            ConstraintBag {
                min_length: *min_length,
                ..ConstraintBag::default()
            },
        )),
        Shape::Number { minimum } => graph.add(SchemaNode::new(NodeKind::Number).with_bag(
            ConstraintBag {
                minimum: minimum.map(f64::from),
                ..ConstraintBag::default()
            },
        )),
        Shape::Boolean => graph.boolean(),
        Shape::Array(element) => {
            let element = build(graph, element);
            graph.array(element)
        }
        Shape::Object(props) => {
            let children: Vec<(String, NodeId)> = props
                .iter()
                .map(|(key, shape)| (key.clone(), build(graph, shape)))
                .collect();
            graph.object(children)
        }
        Shape::Optional(inner) => {
            let inner = build(graph, inner);
            graph.optional(inner)
        }
        Shape::Nullable(inner) => {
            let inner = build(graph, inner);
            graph.nullable(inner)
        }
        Shape::Union(options) => {
            let options: Vec<NodeId> = options.iter().map(|s| build(graph, s)).collect();
            graph.union(options)
        }
    }
}

fn contains_ref(value: &Value) -> bool {
    match value {
        Value::Object(map) => map.contains_key("$ref") || map.values().any(contains_ref),
        Value::Array(items) => items.iter().any(contains_ref),
        _ => false,
    }
}

fn convert(graph: &SchemaGraph, root: NodeId, options: &ConvertOptions) -> Value {
    to_json_schema(graph, &MetadataRegistry::new(), root, options).unwrap()
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn tree_emits_no_definitions(shape in arb_shape(), target in arb_target()) {
        let mut graph = SchemaGraph::new();
        let root = build(&mut graph, &shape);
        let options = ConvertOptions { target, reused: ReusePolicy::Ref, ..ConvertOptions::default() };

        let doc = convert(&graph, root, &options);

        prop_assert!(doc.get("$defs").is_none());
        prop_assert!(doc.get("definitions").is_none());
        prop_assert!(!contains_ref(&doc), "unexpected $ref in {}", doc);
    }

    #[test]
    fn shared_subtree_becomes_one_definition(shape in arb_shape()) {
        let mut graph = SchemaGraph::new();
        let shared = build(&mut graph, &shape);
        let root = graph.object([("first", shared), ("second", shared)]);
        let options = ConvertOptions { reused: ReusePolicy::Ref, ..ConvertOptions::default() };

        let doc = convert(&graph, root, &options);

        let defs = doc["$defs"].as_object().expect("shared subtree should be hoisted");
        prop_assert_eq!(defs.len(), 1);
        let reference = json!({"$ref": "#/$defs/__schema0"});
        prop_assert_eq!(&doc["properties"]["first"], &reference);
        prop_assert_eq!(&doc["properties"]["second"], &reference);
    }

    #[test]
    fn fresh_sessions_are_identical(shape in arb_shape(), target in arb_target()) {
        let mut graph = SchemaGraph::new();
        let shared = build(&mut graph, &shape);
        let wrapped = graph.array(shared);
        let root = graph.object([("a", shared), ("b", wrapped)]);
        let options = ConvertOptions { target, reused: ReusePolicy::Ref, ..ConvertOptions::default() };

        let first = convert(&graph, root, &options);
        let second = convert(&graph, root, &options);
        prop_assert_eq!(&first, &second);

        let text = serde_json::to_string(&first).unwrap();
        let reparsed: Value = serde_json::from_str(&text).unwrap();
        prop_assert_eq!(reparsed, first);
    }
}
