//! Integration tests for registry-wide export: one session, one document per
//! registered id, and a shared definitions document for everything else.

use jsonschema_emit_core::{
    registry_to_json_schema, ConvertError, ConvertOptions, ExternalRegistry, JsonSchemaGenerator,
    MetadataRegistry, NodeId, ReusePolicy, SchemaGraph, Target,
};
use pretty_assertions::assert_eq;
use serde_json::json;

fn uri(id: &str) -> String {
    format!("https://example.com/{id}.json")
}

struct Fixture {
    graph: SchemaGraph,
    registry: MetadataRegistry,
}

/// `User { name, tag, address: Address }`, `Address { street, tag }` with
/// one `tag` node shared between them.
fn user_and_address() -> Fixture {
    let mut graph = SchemaGraph::new();
    let tag = graph.string();
    let street = graph.string();
    let address = graph.object([("street", street), ("tag", tag)]);
    let name = graph.string();
    let user = graph.object([("name", name), ("tag", tag), ("address", address)]);

    let mut registry = MetadataRegistry::new();
    registry.register(user, "User").unwrap();
    registry.register(address, "Address").unwrap();
    Fixture { graph, registry }
}

#[test]
fn test_registered_nodes_reference_each_other_by_uri() {
    let fx = user_and_address();
    let export =
        registry_to_json_schema(&fx.graph, &fx.registry, &ConvertOptions::default(), uri).unwrap();

    assert_eq!(
        export.schemas.keys().collect::<Vec<_>>(),
        vec!["Address", "User"]
    );
    assert_eq!(
        export.schemas["User"],
        json!({
            "$schema": "https://json-schema.org/draft/2020-12/schema",
            "id": "User",
            "type": "object",
            "properties": {
                "name": { "type": "string" },
                "tag": { "type": "string" },
                "address": { "$ref": "https://example.com/Address.json" }
            },
            "required": ["name", "tag", "address"]
        })
    );
    assert_eq!(
        export.schemas["Address"],
        json!({
            "$schema": "https://json-schema.org/draft/2020-12/schema",
            "id": "Address",
            "type": "object",
            "properties": {
                "street": { "type": "string" },
                "tag": { "type": "string" }
            },
            "required": ["street", "tag"]
        })
    );
}

#[test]
fn test_reused_nodes_go_to_shared_document() {
    let fx = user_and_address();
    let options = ConvertOptions {
        reused: ReusePolicy::Ref,
        ..ConvertOptions::default()
    };
    let export = registry_to_json_schema(&fx.graph, &fx.registry, &options, uri).unwrap();

    let shared_ref = json!({"$ref": "https://example.com/__shared.json#/$defs/schema0"});
    assert_eq!(export.schemas["User"]["properties"]["tag"], shared_ref);
    assert_eq!(export.schemas["Address"]["properties"]["tag"], shared_ref);
    assert_eq!(
        export.schemas["__shared"],
        json!({ "$defs": { "schema0": { "type": "string" } } })
    );
}

#[test]
fn test_shared_document_uses_draft7_keyword() {
    let fx = user_and_address();
    let options = ConvertOptions {
        target: Target::Draft7,
        reused: ReusePolicy::Ref,
        ..ConvertOptions::default()
    };
    let export = registry_to_json_schema(&fx.graph, &fx.registry, &options, |id| id.to_string())
        .unwrap();

    assert_eq!(
        export.schemas["User"]["properties"]["tag"],
        json!({"$ref": "__shared#/definitions/schema0"})
    );
    assert!(export.schemas["__shared"].get("definitions").is_some());
}

#[test]
fn test_no_shared_document_when_nothing_is_shared() {
    let fx = user_and_address();
    let export =
        registry_to_json_schema(&fx.graph, &fx.registry, &ConvertOptions::default(), uri).unwrap();
    assert!(!export.schemas.contains_key("__shared"));
}

#[test]
fn test_cycle_across_registered_roots() {
    let mut graph = SchemaGraph::new();
    let parent = graph.reserve();
    let child = graph.reserve();
    let children = graph.array(child);
    graph
        .define(
            parent,
            jsonschema_emit_core::SchemaNode::new(jsonschema_emit_core::NodeKind::Object {
                shape: vec![("children".to_string(), children)],
                catchall: None,
            }),
        )
        .unwrap();
    let back = graph.lazy(parent);
    let maybe_back = graph.optional(back);
    graph
        .define(
            child,
            jsonschema_emit_core::SchemaNode::new(jsonschema_emit_core::NodeKind::Object {
                shape: vec![("parent".to_string(), maybe_back)],
                catchall: None,
            }),
        )
        .unwrap();

    let mut registry = MetadataRegistry::new();
    registry.register(parent, "Parent").unwrap();
    registry.register(child, "Child").unwrap();

    let export =
        registry_to_json_schema(&graph, &registry, &ConvertOptions::default(), uri).unwrap();

    assert_eq!(
        export.schemas["Parent"]["properties"]["children"],
        json!({"type": "array", "items": {"$ref": "https://example.com/Child.json"}})
    );
    assert_eq!(
        export.schemas["Child"]["properties"]["parent"],
        json!({"$ref": "https://example.com/Parent.json"})
    );
}

#[test]
fn test_session_refuses_self_contained_emit_after_registry_emit() {
    let fx = user_and_address();
    let user: NodeId = fx
        .registry
        .ids()
        .find(|(id, _)| *id == "User")
        .map(|(_, node)| node)
        .unwrap();
    let address = fx
        .registry
        .ids()
        .find(|(id, _)| *id == "Address")
        .map(|(_, node)| node)
        .unwrap();

    let mut generator =
        JsonSchemaGenerator::new(&fx.graph, &fx.registry, ConvertOptions::default());
    generator.process(user).unwrap();
    let mut external = ExternalRegistry::new(&fx.registry, uri);
    generator.emit(user, Some(&mut external)).unwrap();

    let err = generator.emit(address, None).unwrap_err();
    assert!(matches!(err, ConvertError::SessionConsumed { .. }));

    let err = generator.emit(user, Some(&mut external)).unwrap_err();
    assert!(matches!(err, ConvertError::SessionConsumed { .. }));
}

#[test]
fn test_duplicate_registry_id() {
    let mut graph = SchemaGraph::new();
    let a = graph.string();
    let b = graph.number();
    let mut registry = MetadataRegistry::new();
    registry.register(a, "Thing").unwrap();

    let err = registry.register(b, "Thing").unwrap_err();
    assert!(matches!(err, ConvertError::DuplicateId { id } if id == "Thing"));
}
