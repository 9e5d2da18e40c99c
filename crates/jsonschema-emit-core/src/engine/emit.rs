//! Emission engine.
//!
//! Turns the record table of a session into one JSON Schema document:
//!
//! 1. **Hoisting** (traversal order): the root, externally registered nodes,
//!    nodes with a metadata `id`, cycle entries and (optionally) reused nodes
//!    get their fragment frozen as a definition body; the live fragment
//!    becomes a bare `$ref`.
//! 2. **Flattening** (reverse traversal order): pass-through records absorb
//!    their target's finalized fragment under their own local keys, then the
//!    override hook runs.
//! 3. **Assembly**: handles are materialized into fresh `serde_json` values
//!    and the definitions table and `$schema` are attached.

use serde_json::{Map, Value};

use super::{JsonSchemaGenerator, OverrideContext};
use crate::config::{CyclePolicy, ReusePolicy, Target};
use crate::error::ConvertError;
use crate::fragment::{Fragment, RecordId, Slot};
use crate::graph::NodeId;
use crate::registry::ExternalRegistry;
use crate::schema_utils::escape_pointer_segment;

impl<'g> JsonSchemaGenerator<'g> {
    /// Emit the document for a processed root.
    ///
    /// With `external`, hoisted nodes are addressed through the external
    /// registry and shared definitions accumulate in `external.defs` instead
    /// of being attached to the document.
    pub fn emit(
        &mut self,
        root: NodeId,
        mut external: Option<&mut ExternalRegistry<'_>>,
    ) -> Result<Value, ConvertError> {
        let root_rid = *self
            .index
            .get(&root)
            .ok_or(ConvertError::UnprocessedSchema { node: root })?;
        self.begin_emit(root, external.is_some())?;
        tracing::debug!(%root, records = self.records.len(), "emitting document");

        self.hoist(root_rid, external.as_deref())?;

        for i in (0..self.records.len()).rev() {
            self.flatten(RecordId(i as u32))?;
        }

        let root_record = &self.records[root_rid.index()];
        let body = root_record.def.as_ref().unwrap_or(&root_record.schema);
        let mut result = self.materialize(body)?;

        let mut defs = Map::new();
        for record in &self.records {
            if let (Some(def), Some(def_id)) = (&record.def, &record.def_id) {
                defs.insert(def_id.clone(), Value::Object(self.materialize(def)?));
            }
        }

        let target = self.options.target;
        match external.as_deref_mut() {
            Some(ext) => ext.defs.extend(defs),
            None if !defs.is_empty() => {
                result.insert(target.defs_keyword().to_string(), Value::Object(defs));
            }
            None => {}
        }
        result.insert(
            "$schema".to_string(),
            Value::String(target.schema_uri().to_string()),
        );

        Ok(Value::Object(result))
    }

    fn begin_emit(&mut self, root: NodeId, external: bool) -> Result<(), ConvertError> {
        if self.consumed {
            return Err(ConvertError::SessionConsumed {
                message: "a self-contained document was already emitted".to_string(),
            });
        }
        if !external && !self.emitted.is_empty() {
            return Err(ConvertError::SessionConsumed {
                message: "self-contained emission after registry emission".to_string(),
            });
        }
        if !self.emitted.insert(root) {
            return Err(ConvertError::SessionConsumed {
                message: format!("{root} was already emitted"),
            });
        }
        if !external {
            self.consumed = true;
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Hoisting
    // -----------------------------------------------------------------------

    fn hoist(
        &mut self,
        root_rid: RecordId,
        external: Option<&ExternalRegistry<'_>>,
    ) -> Result<(), ConvertError> {
        for i in 0..self.records.len() {
            let rid = RecordId(i as u32);
            let node = self.records[i].node;

            if rid == root_rid {
                self.extract_to_def(rid, root_rid, external);
                continue;
            }

            if external.is_some_and(|ext| ext.registry.id(node).is_some()) {
                self.extract_to_def(rid, root_rid, external);
                continue;
            }

            if self.metadata.id(node).is_some() {
                self.extract_to_def(rid, root_rid, external);
                continue;
            }

            if let Some(path) = self.records[i].cycle.clone() {
                match self.options.cycles {
                    CyclePolicy::Throw => {
                        return Err(ConvertError::Cycle { path });
                    }
                    CyclePolicy::Ref => self.extract_to_def(rid, root_rid, external),
                }
                continue;
            }

            if self.records[i].count > 1 && self.options.reused == ReusePolicy::Ref {
                self.extract_to_def(rid, root_rid, external);
            }
        }
        Ok(())
    }

    fn extract_to_def(
        &mut self,
        rid: RecordId,
        root_rid: RecordId,
        external: Option<&ExternalRegistry<'_>>,
    ) {
        if self.records[rid.index()].schema.is_reference() {
            return;
        }
        let (uri, def_id) = self.make_uri(rid, root_rid, external);
        tracing::debug!(%rid, uri = %uri, "hoisting fragment");

        let record = &mut self.records[rid.index()];
        record.def = Some(record.schema.clone());
        // no id when the definition lives in an external document
        if def_id.is_some() {
            record.def_id = def_id;
        }
        record.schema = Fragment::reference(uri);
    }

    fn make_uri(
        &mut self,
        rid: RecordId,
        root_rid: RecordId,
        external: Option<&ExternalRegistry<'_>>,
    ) -> (String, Option<String>) {
        let defs_keyword = self.options.target.defs_keyword();
        let record = &self.records[rid.index()];
        let explicit_id = record
            .schema
            .get_value("id")
            .and_then(Value::as_str)
            .map(str::to_string);

        if let Some(ext) = external {
            if let Some(id) = ext.registry.id(record.node) {
                return (ext.uri(id), None);
            }
            let def_id = match record.def_id.clone().or(explicit_id) {
                Some(id) => id,
                None => self.next_def_id("schema"),
            };
            self.records[rid.index()].def_id = Some(def_id.clone());
            let uri = format!(
                "{}#/{}/{}",
                ext.uri(ExternalRegistry::SHARED_ID),
                defs_keyword,
                escape_pointer_segment(&def_id)
            );
            return (uri, Some(def_id));
        }

        if rid == root_rid {
            return ("#".to_string(), None);
        }

        let def_id = match explicit_id {
            Some(id) => id,
            None => self.next_def_id("__schema"),
        };
        let uri = format!("#/{}/{}", defs_keyword, escape_pointer_segment(&def_id));
        (uri, Some(def_id))
    }

    // -----------------------------------------------------------------------
    // Flattening
    // -----------------------------------------------------------------------

    fn flatten(&mut self, rid: RecordId) -> Result<(), ConvertError> {
        let record = &mut self.records[rid.index()];
        if record.flattened {
            return Ok(());
        }
        record.flattened = true;

        if let Some(target) = record.pass_through.take() {
            self.flatten(target)?;

            let target_schema = self.records[target.index()].schema.clone();
            let compose = target_schema.is_reference() && self.options.target == Target::Draft7;

            let record = &mut self.records[rid.index()];
            let body = match record.def.as_mut() {
                Some(def) => def,
                None => &mut record.schema,
            };
            if compose {
                // draft-7 ignores keywords next to `$ref`
                let mut all_of = match body.remove("allOf") {
                    Some(Slot::List(items)) => items,
                    Some(Slot::Value(Value::Array(items))) => {
                        items.into_iter().map(Slot::Value).collect()
                    }
                    Some(other) => vec![other],
                    None => Vec::new(),
                };
                all_of.push(Slot::Node(target));
                body.insert("allOf", Slot::List(all_of));
            } else {
                let local = body.clone();
                body.overlay(&target_schema);
                body.overlay(&local);
            }
        }

        let graph = self.graph;
        if let Some(hook) = self.override_hook.as_mut() {
            let record = &mut self.records[rid.index()];
            if !record.is_parent {
                let node = record.node;
                let schema = graph.node(node)?;
                let json_schema = match record.def.as_mut() {
                    Some(def) => def,
                    None => &mut record.schema,
                };
                hook(OverrideContext {
                    node,
                    schema,
                    json_schema,
                });
            }
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Assembly
    // -----------------------------------------------------------------------

    /// Deep-copy a fragment into plain JSON, resolving handles to the live
    /// fragments they point at.
    fn materialize(&self, fragment: &Fragment) -> Result<Map<String, Value>, ConvertError> {
        let mut active = Vec::new();
        self.materialize_fragment(fragment, &mut active)
    }

    fn materialize_fragment(
        &self,
        fragment: &Fragment,
        active: &mut Vec<RecordId>,
    ) -> Result<Map<String, Value>, ConvertError> {
        let mut out = Map::new();
        for (key, slot) in fragment.iter() {
            out.insert(key.to_string(), self.materialize_slot(slot, active)?);
        }
        Ok(out)
    }

    fn materialize_slot(
        &self,
        slot: &Slot,
        active: &mut Vec<RecordId>,
    ) -> Result<Value, ConvertError> {
        match slot {
            Slot::Value(value) => Ok(value.clone()),
            Slot::List(items) => items
                .iter()
                .map(|item| self.materialize_slot(item, active))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            Slot::Map(entries) => {
                let mut out = Map::new();
                for (key, slot) in entries {
                    out.insert(key.clone(), self.materialize_slot(slot, active)?);
                }
                Ok(Value::Object(out))
            }
            Slot::Node(rid) => {
                if active.contains(rid) {
                    return Err(ConvertError::Serialization {
                        message: format!(
                            "{} refers to itself without a definition in between",
                            self.records[rid.index()].node
                        ),
                    });
                }
                active.push(*rid);
                let out = self.materialize_fragment(&self.records[rid.index()].schema, active)?;
                active.pop();
                Ok(Value::Object(out))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConvertOptions;
    use crate::graph::{NodeKind, SchemaGraph, SchemaNode};
    use crate::registry::MetadataRegistry;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn tree(graph: &mut SchemaGraph) -> NodeId {
        let node = graph.reserve();
        let children = graph.array(node);
        let value = graph.string();
        graph
            .define(
                node,
                SchemaNode::new(NodeKind::Object {
                    shape: vec![
                        ("children".to_string(), children),
                        ("value".to_string(), value),
                    ],
                    catchall: None,
                }),
            )
            .unwrap();
        node
    }

    #[test]
    fn test_root_cycle_references_hash() {
        let mut graph = SchemaGraph::new();
        let root = tree(&mut graph);
        let metadata = MetadataRegistry::new();
        let mut gen = JsonSchemaGenerator::new(&graph, &metadata, ConvertOptions::default());
        gen.process(root).unwrap();
        let doc = gen.emit(root, None).unwrap();

        assert_eq!(
            doc,
            json!({
                "$schema": "https://json-schema.org/draft/2020-12/schema",
                "type": "object",
                "properties": {
                    "children": { "type": "array", "items": { "$ref": "#" } },
                    "value": { "type": "string" }
                },
                "required": ["children", "value"]
            })
        );
    }

    #[test]
    fn test_emit_twice_is_refused() {
        let mut graph = SchemaGraph::new();
        let s = graph.string();
        let metadata = MetadataRegistry::new();
        let mut gen = JsonSchemaGenerator::new(&graph, &metadata, ConvertOptions::default());
        gen.process(s).unwrap();
        gen.emit(s, None).unwrap();
        let err = gen.emit(s, None).unwrap_err();
        assert!(matches!(err, ConvertError::SessionConsumed { .. }));
    }

    #[test]
    fn test_emit_unprocessed_root() {
        let mut graph = SchemaGraph::new();
        let s = graph.string();
        let metadata = MetadataRegistry::new();
        let mut gen = JsonSchemaGenerator::new(&graph, &metadata, ConvertOptions::default());
        let err = gen.emit(s, None).unwrap_err();
        assert!(matches!(err, ConvertError::UnprocessedSchema { node } if node == s));
    }

    #[test]
    fn test_generated_ids_are_sequential_per_session() {
        let mut graph = SchemaGraph::new();
        let a = graph.string();
        let b = graph.number();
        let root = graph.object([("a1", a), ("a2", a), ("b1", b), ("b2", b)]);
        let metadata = MetadataRegistry::new();
        let options = ConvertOptions {
            reused: ReusePolicy::Ref,
            ..ConvertOptions::default()
        };
        let mut gen = JsonSchemaGenerator::new(&graph, &metadata, options);
        gen.process(root).unwrap();
        let doc = gen.emit(root, None).unwrap();

        assert_eq!(doc["properties"]["a1"], json!({"$ref": "#/$defs/__schema0"}));
        assert_eq!(doc["properties"]["b2"], json!({"$ref": "#/$defs/__schema1"}));
        assert_eq!(doc["$defs"]["__schema0"], json!({"type": "string"}));
        assert_eq!(doc["$defs"]["__schema1"], json!({"type": "number"}));
    }

    #[test]
    fn test_override_skips_parent_records() {
        let mut graph = SchemaGraph::new();
        let base = graph.string();
        let copy = graph.derive(base).unwrap();
        let metadata = MetadataRegistry::new();
        let mut seen = Vec::new();
        {
            let mut gen = JsonSchemaGenerator::new(&graph, &metadata, ConvertOptions::default())
                .with_override(|ctx| seen.push(ctx.node));
            gen.process(copy).unwrap();
            gen.emit(copy, None).unwrap();
        }
        assert_eq!(seen, vec![copy]);
    }
}
