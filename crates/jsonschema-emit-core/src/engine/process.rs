//! Traversal engine.
//!
//! Depth-first walk that lowers each node to a [`Fragment`], memoized per
//! [`NodeId`]. A record is created before its children are visited so a node
//! met again inside its own subtree resolves to the same handle and is marked
//! as a cycle instead of recursing forever.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use super::{JsonSchemaGenerator, VisitRecord};
use crate::config::{Io, Target, UnrepresentablePolicy};
use crate::error::ConvertError;
use crate::fragment::{Fragment, RecordId, Slot};
use crate::graph::{ConstraintBag, LiteralValue, NodeId, NodeKind, SchemaNode};
use crate::schema_utils::{build_path, number_value};

/// String formats whose JSON Schema name differs.
fn format_name(format: &str) -> &str {
    match format {
        "guid" => "uuid",
        "url" => "uri",
        "datetime" => "date-time",
        "json_string" => "json-string",
        other => other,
    }
}

impl<'g> JsonSchemaGenerator<'g> {
    /// Lower `root` and everything reachable from it into this session.
    ///
    /// Returns the root's record handle. Nodes already visited by an earlier
    /// call are not lowered again; their visit counters go up instead.
    pub fn process(&mut self, root: NodeId) -> Result<RecordId, ConvertError> {
        tracing::debug!(%root, records = self.records.len(), "processing schema graph");
        let mut ancestors = Vec::new();
        self.visit(root, &mut ancestors, "#")
    }

    fn visit(
        &mut self,
        node_id: NodeId,
        ancestors: &mut Vec<NodeId>,
        path: &str,
    ) -> Result<RecordId, ConvertError> {
        if let Some(&rid) = self.index.get(&node_id) {
            let record = &mut self.records[rid.index()];
            record.count += 1;
            if ancestors.contains(&node_id) && record.cycle.is_none() {
                tracing::trace!(%node_id, path, "cycle detected");
                record.cycle = Some(path.to_string());
            }
            return Ok(rid);
        }

        let graph = self.graph;
        let node = graph.node(node_id)?;
        tracing::trace!(%node_id, kind = node.kind.name(), path, "lowering node");

        let rid = RecordId(self.records.len() as u32);
        self.records.push(VisitRecord::new(node_id));
        self.index.insert(node_id, rid);

        ancestors.push(node_id);
        let lowered = self.lower(node, rid, ancestors, path);
        ancestors.pop();
        let provisional_default = lowered?;

        let input = self.options.io == Io::Input;
        let record = &mut self.records[rid.index()];
        if let Some(meta) = self.metadata.get(node_id) {
            record.schema.overlay_map(meta);
        }
        if input && matches!(node.kind, NodeKind::Pipe { .. }) {
            // examples and defaults describe the output side of a pipe
            record.schema.remove("examples");
            record.schema.remove("default");
        }
        if let Some(value) = provisional_default {
            if !record.schema.contains_key("default") {
                record.schema.insert("default", value);
            }
        }

        Ok(rid)
    }

    /// Fill the record's fragment. Returns a provisional default captured
    /// from a `prefault` wrapper in input mode.
    fn lower(
        &mut self,
        node: &'g SchemaNode,
        rid: RecordId,
        ancestors: &mut Vec<NodeId>,
        path: &str,
    ) -> Result<Option<Value>, ConvertError> {
        if let Some(custom) = &node.custom {
            self.records[rid.index()].schema = Fragment::from(custom.lower());
            return Ok(None);
        }

        if let Some(parent) = node.parent {
            let parent_rid = self.visit(parent, ancestors, path)?;
            self.records[parent_rid.index()].is_parent = true;
            self.records[rid.index()].pass_through = Some(parent_rid);
            return Ok(None);
        }

        let mut json = Fragment::new();
        let mut pass_through = None;
        let mut provisional_default = None;
        let io = self.options.io;

        match &node.kind {
            NodeKind::String => lower_string(&node.bag, &mut json),
            NodeKind::Number => lower_number(&node.bag, &mut json)?,
            NodeKind::Boolean | NodeKind::Success { .. } => {
                json.insert("type", "boolean");
            }
            NodeKind::Undefined | NodeKind::Null => {
                json.insert("type", "null");
            }
            NodeKind::Any | NodeKind::Unknown => {}
            NodeKind::Never => {
                json.insert("not", Value::Object(Map::new()));
            }
            NodeKind::BigInt
            | NodeKind::Symbol
            | NodeKind::Void
            | NodeKind::Date
            | NodeKind::Map { .. }
            | NodeKind::Set { .. }
            | NodeKind::File
            | NodeKind::Transform
            | NodeKind::Nan
            | NodeKind::Custom => self.unrepresentable(node.kind.name(), path)?,
            NodeKind::Array { element } => {
                json.insert("type", "array");
                insert_length(&mut json, &node.bag, "minItems", "maxItems");
                let items = self.visit(*element, ancestors, &build_path(path, &["items"]))?;
                json.insert("items", items);
            }
            NodeKind::Object { shape, catchall } => {
                json.insert("type", "object");
                let mut properties = BTreeMap::new();
                for (key, child) in shape {
                    let child_path = build_path(path, &["properties", key]);
                    let child = self.visit(*child, ancestors, &child_path)?;
                    properties.insert(key.clone(), Slot::Node(child));
                }
                json.insert("properties", Slot::Map(properties));

                let mut required: Vec<Value> = Vec::new();
                for (key, child) in shape {
                    let optionality = self.graph.optionality(*child);
                    let optional = match io {
                        Io::Input => optionality.input,
                        Io::Output => optionality.output,
                    };
                    let key = Value::String(key.clone());
                    if !optional && !required.contains(&key) {
                        required.push(key);
                    }
                }
                json.insert("required", Value::Array(required));

                if let Some(catchall) = catchall {
                    if matches!(self.graph.node(*catchall)?.kind, NodeKind::Never) {
                        json.insert("additionalProperties", false);
                    } else {
                        let extra = self.visit(
                            *catchall,
                            ancestors,
                            &build_path(path, &["additionalProperties"]),
                        )?;
                        json.insert("additionalProperties", extra);
                    }
                }
            }
            NodeKind::Union { options } => {
                let mut any_of = Vec::with_capacity(options.len());
                for (i, option) in options.iter().enumerate() {
                    let option_path = build_path(path, &["anyOf", &i.to_string()]);
                    any_of.push(Slot::Node(self.visit(*option, ancestors, &option_path)?));
                }
                json.insert("anyOf", Slot::List(any_of));
            }
            NodeKind::Intersection { left, right } => {
                let left = self.visit(*left, ancestors, &build_path(path, &["allOf", "0"]))?;
                let right = self.visit(*right, ancestors, &build_path(path, &["allOf", "1"]))?;
                json.insert("allOf", Slot::List(vec![Slot::Node(left), Slot::Node(right)]));
            }
            NodeKind::Tuple { items, rest } => {
                json.insert("type", "array");
                let mut prefix = Vec::with_capacity(items.len());
                for (i, item) in items.iter().enumerate() {
                    let item_path = build_path(path, &["prefixItems", &i.to_string()]);
                    prefix.push(Slot::Node(self.visit(*item, ancestors, &item_path)?));
                }
                let (prefix_keyword, rest_keyword) = match self.options.target {
                    Target::Draft202012 => ("prefixItems", "items"),
                    Target::Draft7 => ("items", "additionalItems"),
                };
                json.insert(prefix_keyword, Slot::List(prefix));
                if let Some(rest) = rest {
                    let rest = self.visit(*rest, ancestors, &build_path(path, &["items"]))?;
                    json.insert(rest_keyword, rest);
                }
                insert_length(&mut json, &node.bag, "minItems", "maxItems");
            }
            NodeKind::Record { key, value } => {
                json.insert("type", "object");
                let keys = self.visit(*key, ancestors, &build_path(path, &["propertyNames"]))?;
                json.insert("propertyNames", keys);
                let values = self.visit(
                    *value,
                    ancestors,
                    &build_path(path, &["additionalProperties"]),
                )?;
                json.insert("additionalProperties", values);
            }
            NodeKind::Enum { entries } => {
                let values = entries.iter().map(|(_, v)| v.clone()).collect();
                json.insert("enum", Value::Array(values));
            }
            NodeKind::Literal { values } => self.lower_literal(values, path, &mut json)?,
            NodeKind::Nullable { inner } => {
                let inner = self.visit(*inner, ancestors, path)?;
                let null = serde_json::json!({ "type": "null" });
                json.insert("anyOf", Slot::List(vec![Slot::Node(inner), Slot::Value(null)]));
            }
            NodeKind::Nonoptional { inner }
            | NodeKind::Promise { inner }
            | NodeKind::Optional { inner }
            | NodeKind::Lazy { inner } => {
                pass_through = Some(self.visit(*inner, ancestors, path)?);
            }
            NodeKind::Default { inner, value } => {
                pass_through = Some(self.visit(*inner, ancestors, path)?);
                json.insert("default", value.clone());
            }
            NodeKind::Prefault { inner, value } => {
                pass_through = Some(self.visit(*inner, ancestors, path)?);
                if io == Io::Input {
                    provisional_default = Some(value.clone());
                }
            }
            NodeKind::Catch { inner, fallback } => {
                pass_through = Some(self.visit(*inner, ancestors, path)?);
                let value = fallback
                    .evaluate()
                    .map_err(|reason| ConvertError::DynamicFallback {
                        path: path.to_string(),
                        reason,
                    })?;
                json.insert("default", value);
            }
            NodeKind::TemplateLiteral { pattern } => {
                let pattern = pattern
                    .as_ref()
                    .ok_or_else(|| ConvertError::MissingTemplatePattern {
                        path: path.to_string(),
                    })?;
                json.insert("type", "string");
                json.insert("pattern", pattern.as_str());
            }
            NodeKind::Pipe { input, output } => {
                let side = match io {
                    Io::Input => *input,
                    Io::Output => *output,
                };
                pass_through = Some(self.visit(side, ancestors, path)?);
            }
            NodeKind::Readonly { inner } => {
                pass_through = Some(self.visit(*inner, ancestors, path)?);
                json.insert("readOnly", true);
            }
        }

        let record = &mut self.records[rid.index()];
        record.schema = json;
        record.pass_through = pass_through;
        Ok(provisional_default)
    }

    fn lower_literal(
        &self,
        values: &[LiteralValue],
        path: &str,
        json: &mut Fragment,
    ) -> Result<(), ConvertError> {
        let tolerant = self.options.unrepresentable == UnrepresentablePolicy::Any;
        let mut out = Vec::with_capacity(values.len());
        for value in values {
            match value {
                LiteralValue::Undefined if tolerant => {}
                LiteralValue::Undefined => {
                    return Err(ConvertError::Unrepresentable {
                        path: path.to_string(),
                        variant: "Literal `undefined`".to_string(),
                    })
                }
                LiteralValue::BigInt(n) if tolerant => out.push(number_value(*n as f64, "const")?),
                LiteralValue::BigInt(_) => {
                    return Err(ConvertError::Unrepresentable {
                        path: path.to_string(),
                        variant: "BigInt literal".to_string(),
                    })
                }
                LiteralValue::String(s) => out.push(Value::String(s.clone())),
                LiteralValue::Number(n) => out.push(number_value(*n, "const")?),
                LiteralValue::Boolean(b) => out.push(Value::Bool(*b)),
                LiteralValue::Null => out.push(Value::Null),
            }
        }

        match out.len() {
            // every value was an unrepresentable `undefined`
            0 => {}
            1 => {
                json.insert("const", out.remove(0));
            }
            _ => {
                json.insert("enum", Value::Array(out));
            }
        }
        Ok(())
    }

    fn unrepresentable(&self, variant: &str, path: &str) -> Result<(), ConvertError> {
        match self.options.unrepresentable {
            UnrepresentablePolicy::Throw => Err(ConvertError::Unrepresentable {
                path: path.to_string(),
                variant: variant.to_string(),
            }),
            UnrepresentablePolicy::Any => {
                tracing::warn!(variant, path, "unrepresentable node lowered to an unconstrained schema");
                Ok(())
            }
        }
    }
}

fn insert_length(json: &mut Fragment, bag: &ConstraintBag, min_keyword: &str, max_keyword: &str) {
    if let Some(min) = bag.min_length {
        json.insert(min_keyword, Value::from(min));
    }
    if let Some(max) = bag.max_length {
        json.insert(max_keyword, Value::from(max));
    }
}

fn lower_string(bag: &ConstraintBag, json: &mut Fragment) {
    json.insert("type", "string");
    insert_length(json, bag, "minLength", "maxLength");
    if let Some(format) = &bag.format {
        json.insert("format", format_name(format));
    }
    if let Some(pattern) = &bag.pattern {
        json.insert("pattern", pattern.as_str());
    }
    if let Some(encoding) = &bag.content_encoding {
        json.insert("contentEncoding", encoding.as_str());
    }
}

/// `integer` when the format names an int; of an inclusive/exclusive pair on
/// one side only the tighter bound is kept.
fn lower_number(bag: &ConstraintBag, json: &mut Fragment) -> Result<(), ConvertError> {
    let integer = bag.format.as_deref().is_some_and(|f| f.contains("int"));
    json.insert("type", if integer { "integer" } else { "number" });

    match (bag.minimum, bag.exclusive_minimum) {
        (Some(min), Some(exclusive)) if exclusive >= min => {
            json.insert("exclusiveMinimum", number_value(exclusive, "exclusiveMinimum")?);
        }
        (Some(min), _) => {
            json.insert("minimum", number_value(min, "minimum")?);
        }
        (None, Some(exclusive)) => {
            json.insert("exclusiveMinimum", number_value(exclusive, "exclusiveMinimum")?);
        }
        (None, None) => {}
    }

    match (bag.maximum, bag.exclusive_maximum) {
        (Some(max), Some(exclusive)) if exclusive <= max => {
            json.insert("exclusiveMaximum", number_value(exclusive, "exclusiveMaximum")?);
        }
        (Some(max), _) => {
            json.insert("maximum", number_value(max, "maximum")?);
        }
        (None, Some(exclusive)) => {
            json.insert("exclusiveMaximum", number_value(exclusive, "exclusiveMaximum")?);
        }
        (None, None) => {}
    }

    if let Some(step) = bag.multiple_of {
        json.insert("multipleOf", number_value(step, "multipleOf")?);
    }
    Ok(())
}
