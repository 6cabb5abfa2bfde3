//! Deserialization - raw boundary values to typed instances
//!
//! Construction runs on an explicit work stack instead of native recursion.
//! Every factory-built instance becomes a node in an arena; a node records
//! the slot (parent node, field, collection position) it belongs in. Once
//! all nodes are populated they are written into their parents from the
//! highest index down. A child is always created after its parent, so it
//! is complete by the time it is moved into place.
//!
//! Per-field problems are collected as diagnostics; the field keeps its
//! schema default and construction continues.

use crate::coerce::coerce_scalar;
use crate::error::DeserializeError;
use crate::factory::{AttributeKey, FactoryCall, FactoryMethod};
use crate::message::{FieldValue, Message};
use crate::model::ObjectModel;
use indexmap::IndexMap;
use std::collections::HashMap;
use tether_ir::{Value, ValueMap};
use tether_schema::{FieldSchema, FieldType, MessageSchema};

/// A constructed value with the problems found while building it
#[derive(Debug, Clone, PartialEq)]
pub struct Deserialized<T> {
    pub value: T,
    pub diagnostics: Vec<DeserializeError>,
}

impl<T> Deserialized<T> {
    /// Check if construction found no problems
    pub fn is_clean(&self) -> bool {
        self.diagnostics.is_empty()
    }

    /// Discard the diagnostics
    pub fn into_value(self) -> T {
        self.value
    }
}

/// Builds typed instances through the wired packages
#[derive(Debug, Clone, Copy)]
pub struct Deserializer<'m> {
    model: &'m ObjectModel,
}

impl<'m> Deserializer<'m> {
    /// Create a deserializer over a model
    pub fn new(model: &'m ObjectModel) -> Self {
        Self { model }
    }

    /// Build an instance of `type_name` from raw data.
    ///
    /// Fails only when no wired package provides the root type.
    pub fn deserialize(
        &self,
        type_name: &str,
        raw: &Value,
    ) -> Result<Deserialized<Message>, DeserializeError> {
        let method = self.root_method(type_name)?;

        let mut build = Build::new(self.model);
        build.spawn(&method, FactoryCall::root(type_name, raw), raw, String::new(), 0);
        let (root, diagnostics) = build.finish();

        Ok(Deserialized {
            value: root.unwrap_or_else(|| Message::new(type_name)),
            diagnostics,
        })
    }

    /// Factory-built default instance of a type
    pub fn default_instance(&self, type_name: &str) -> Result<Message, DeserializeError> {
        let method = self.root_method(type_name)?;
        let raw = Value::Null;
        Ok(method(&FactoryCall::root(type_name, &raw)).instance)
    }

    /// Build the value of one field of `parent_type` from raw data.
    ///
    /// `Null` yields the field's schema default.
    pub fn deserialize_field(
        &self,
        parent_type: &str,
        field: &FieldSchema,
        raw: &Value,
    ) -> Deserialized<FieldValue> {
        let mut holder = Message::new(parent_type);
        holder.set_raw(&field.name, FieldValue::default_for(field));

        let mut build = Build::new(self.model);
        build.nodes.push(Node::empty());
        if !raw.is_null() {
            build.populate_field(0, &mut holder, field, raw, field.name.clone(), 0);
        }
        build.nodes[0].message = Some(holder);

        let (holder, diagnostics) = build.finish();
        let value = holder
            .and_then(|mut h| h.take(&field.name))
            .unwrap_or_else(|| FieldValue::default_for(field));
        Deserialized { value, diagnostics }
    }

    /// Build one element of a `Repeated` or `Map` field of `parent_type`.
    ///
    /// Yields `None` when the element cannot be built; the reason is in
    /// the diagnostics.
    pub fn deserialize_element(
        &self,
        parent_type: &str,
        field: &FieldSchema,
        key: &AttributeKey,
        raw: &Value,
    ) -> Deserialized<Option<FieldValue>> {
        let path = format!("{}{}", field.name, key);
        let mut build = Build::new(self.model);
        build.nodes.push(Node::empty());

        let method = match field.element_kind() {
            Some(FieldType::Message) => {
                let type_name = field.message_type.as_deref().unwrap_or_default();
                match build.resolve(type_name, &path) {
                    Some(method) => Some(method),
                    None => {
                        return Deserialized {
                            value: None,
                            diagnostics: build.diagnostics,
                        }
                    }
                }
            }
            _ => None,
        };

        let mut items = Vec::with_capacity(1);
        if let Some((value, child)) =
            build.element(parent_type, field, method.as_ref(), key, raw, path, 0)
        {
            if let Some(child) = child {
                build.nodes[child].slot = Some(Slot {
                    parent: 0,
                    field: field.name.clone(),
                    key: Some(AttributeKey::Index(0)),
                });
            }
            items.push(value);
        }

        let mut holder = Message::new(parent_type);
        holder.set_raw(&field.name, FieldValue::List(items));
        build.nodes[0].message = Some(holder);

        let (holder, diagnostics) = build.finish();
        let value = holder
            .and_then(|mut h| h.take(&field.name))
            .and_then(|list| match list {
                FieldValue::List(mut items) if !items.is_empty() => Some(items.swap_remove(0)),
                _ => None,
            });
        Deserialized { value, diagnostics }
    }

    fn root_method(&self, type_name: &str) -> Result<FactoryMethod, DeserializeError> {
        self.model
            .factory_method(type_name)
            .ok_or_else(|| DeserializeError::TypeResolution {
                type_name: type_name.to_string(),
                path: String::new(),
            })
    }
}

/// Where a finished node is written
struct Slot {
    parent: usize,
    field: String,
    key: Option<AttributeKey>,
}

struct Node {
    message: Option<Message>,
    slot: Option<Slot>,
}

impl Node {
    fn empty() -> Self {
        Self {
            message: None,
            slot: None,
        }
    }
}

/// A node still waiting to be populated from raw data
struct Task<'v> {
    node: usize,
    raw: &'v Value,
    path: String,
    depth: usize,
}

/// State of one construction
struct Build<'m, 'v> {
    model: &'m ObjectModel,
    nodes: Vec<Node>,
    tasks: Vec<Task<'v>>,
    diagnostics: Vec<DeserializeError>,
}

impl<'m, 'v> Build<'m, 'v> {
    fn new(model: &'m ObjectModel) -> Self {
        Self {
            model,
            nodes: Vec::new(),
            tasks: Vec::new(),
            diagnostics: Vec::new(),
        }
    }

    /// Invoke a factory and queue the instance for population
    fn spawn(
        &mut self,
        method: &FactoryMethod,
        call: FactoryCall<'_>,
        raw: &'v Value,
        path: String,
        depth: usize,
    ) -> usize {
        let result = method(&call);
        let index = self.nodes.len();
        self.nodes.push(Node {
            message: Some(result.instance),
            slot: None,
        });
        if !result.fully_loaded {
            self.tasks.push(Task {
                node: index,
                raw,
                path,
                depth,
            });
        }
        index
    }

    /// Populate queued nodes, then assemble them into the root
    fn finish(mut self) -> (Option<Message>, Vec<DeserializeError>) {
        while let Some(task) = self.tasks.pop() {
            let Some(mut message) = self.nodes[task.node].message.take() else {
                continue;
            };
            self.populate(task.node, &mut message, task.raw, &task.path, task.depth);
            self.nodes[task.node].message = Some(message);
        }

        for index in (1..self.nodes.len()).rev() {
            let node = &mut self.nodes[index];
            if let (Some(message), Some(slot)) = (node.message.take(), node.slot.take()) {
                self.write_back(slot, message);
            }
        }

        let root = self.nodes.first_mut().and_then(|n| n.message.take());
        (root, self.diagnostics)
    }

    fn write_back(&mut self, slot: Slot, message: Message) {
        let Some(parent) = self.nodes[slot.parent].message.as_mut() else {
            return;
        };
        let Some(target) = parent.get_mut(&slot.field) else {
            return;
        };
        let target = match (&slot.key, target) {
            (None, target) => Some(target),
            (Some(AttributeKey::Index(i)), FieldValue::List(items)) => items.get_mut(*i),
            (Some(AttributeKey::Key(k)), FieldValue::Map(entries)) => entries.get_mut(k),
            _ => None,
        };
        if let Some(target) = target {
            *target = FieldValue::Message(Box::new(message));
        }
    }

    fn populate(
        &mut self,
        node: usize,
        message: &mut Message,
        raw: &'v Value,
        path: &str,
        depth: usize,
    ) {
        let object = match raw {
            Value::Object(object) => object,
            Value::Null => return,
            other => {
                self.mismatch(path, "object", other);
                return;
            }
        };

        let Some(schema) = message.schema().cloned() else {
            for (key, value) in object.iter().filter(|(_, v)| !v.is_null()) {
                message.set_raw(key, FieldValue::Dynamic(value.clone()));
            }
            return;
        };

        let winners = self.oneof_winners(&schema, object, path);
        let last = last_occurrences(&schema, object);

        for (key, value) in object {
            let Some(field) = lookup_field(&schema, key) else {
                if self.model.config().preserve_unknown_fields && !value.is_null() {
                    message.unknown_fields_mut().insert(key.clone(), value.clone());
                }
                continue;
            };
            if value.is_null() {
                continue;
            }
            // Named both ways, e.g. "host" and "5": the later key wins
            if last.get(field.name.as_str()) != Some(&key.as_str()) {
                log::debug!("Field '{}' at '{}' given twice; '{}' ignored", field.name, path, key);
                continue;
            }
            if let Some(group) = field.oneof_group.as_deref() {
                if winners.get(group) != Some(&field.name.as_str()) {
                    continue;
                }
                message.clear_oneof_siblings(&field.name);
            }

            self.populate_field(node, message, field, value, join(path, &field.name), depth);
        }
    }

    /// Pick the last non-null member of each oneof group in document order
    fn oneof_winners<'s>(
        &mut self,
        schema: &'s MessageSchema,
        object: &ValueMap,
        path: &str,
    ) -> HashMap<&'s str, &'s str> {
        let mut present: IndexMap<&'s str, Vec<&'s str>> = IndexMap::new();
        for (key, value) in object.iter().filter(|(_, v)| !v.is_null()) {
            let Some(field) = lookup_field(schema, key) else {
                continue;
            };
            if let Some(group) = field.oneof_group.as_deref() {
                present.entry(group).or_default().push(field.name.as_str());
            }
        }

        let mut winners = HashMap::new();
        for (group, members) in present {
            let Some((&winner, earlier)) = members.split_last() else {
                continue;
            };
            for &cleared in earlier.iter().filter(|&&name| name != winner) {
                log::debug!(
                    "Oneof '{}' at '{}': '{}' overridden by '{}'",
                    group,
                    path,
                    cleared,
                    winner
                );
                self.diagnostics.push(DeserializeError::OneofConflict {
                    path: join(path, cleared),
                    group: group.to_string(),
                    cleared: cleared.to_string(),
                });
            }
            winners.insert(group, winner);
        }
        winners
    }

    fn populate_field(
        &mut self,
        node: usize,
        message: &mut Message,
        field: &FieldSchema,
        raw: &'v Value,
        path: String,
        depth: usize,
    ) {
        match field.field_type {
            FieldType::Message => {
                let type_name = field.message_type.as_deref().unwrap_or_default();
                let Some(method) = self.resolve(type_name, &path) else {
                    return;
                };
                if let Some(child) =
                    self.child(&method, field, message.type_name(), None, raw, path, depth)
                {
                    self.nodes[child].slot = Some(Slot {
                        parent: node,
                        field: field.name.clone(),
                        key: None,
                    });
                    message.set_raw(&field.name, FieldValue::Unset);
                }
            }

            FieldType::Repeated => {
                let Some(raw_items) = raw.as_array() else {
                    self.mismatch(&path, "array", raw);
                    return;
                };
                let Some(method) = self.element_method(field, &path) else {
                    return;
                };

                let mut items = Vec::with_capacity(raw_items.len());
                for (index, item) in raw_items.iter().enumerate() {
                    let key = AttributeKey::Index(index);
                    let item_path = format!("{}{}", path, key);
                    let Some((value, child)) = self.element(
                        message.type_name(),
                        field,
                        method.as_ref(),
                        &key,
                        item,
                        item_path,
                        depth,
                    ) else {
                        continue;
                    };
                    if let Some(child) = child {
                        self.nodes[child].slot = Some(Slot {
                            parent: node,
                            field: field.name.clone(),
                            key: Some(AttributeKey::Index(items.len())),
                        });
                    }
                    items.push(value);
                }
                message.set_raw(&field.name, FieldValue::List(items));
            }

            FieldType::Map => {
                let Some(raw_entries) = raw.as_object() else {
                    self.mismatch(&path, "object", raw);
                    return;
                };
                let Some(method) = self.element_method(field, &path) else {
                    return;
                };

                let mut entries = IndexMap::with_capacity(raw_entries.len());
                for (entry_key, item) in raw_entries {
                    let key = AttributeKey::Key(entry_key.clone());
                    let item_path = format!("{}{}", path, key);
                    let Some((value, child)) = self.element(
                        message.type_name(),
                        field,
                        method.as_ref(),
                        &key,
                        item,
                        item_path,
                        depth,
                    ) else {
                        continue;
                    };
                    if let Some(child) = child {
                        self.nodes[child].slot = Some(Slot {
                            parent: node,
                            field: field.name.clone(),
                            key: Some(key),
                        });
                    }
                    entries.insert(entry_key.clone(), value);
                }
                message.set_raw(&field.name, FieldValue::Map(entries));
            }

            kind => match coerce_scalar(kind, field, raw) {
                Some(value) => {
                    message.set_raw(&field.name, value);
                }
                None => self.mismatch(&path, kind.name(), raw),
            },
        }
    }

    /// Constructor shared by every message element of a collection field.
    ///
    /// `Some(None)` for scalar or untracked elements; `None` when the element
    /// type cannot be resolved and the field must keep its default.
    fn element_method(&mut self, field: &FieldSchema, path: &str) -> Option<Option<FactoryMethod>> {
        if field.element_kind() != Some(FieldType::Message) {
            return Some(None);
        }
        let type_name = field.message_type.as_deref().unwrap_or_default();
        self.resolve(type_name, path).map(Some)
    }

    /// Build one collection element; a message element gets a node
    #[allow(clippy::too_many_arguments)]
    fn element(
        &mut self,
        parent_type: &str,
        field: &FieldSchema,
        method: Option<&FactoryMethod>,
        key: &AttributeKey,
        raw: &'v Value,
        path: String,
        depth: usize,
    ) -> Option<(FieldValue, Option<usize>)> {
        match field.element_kind() {
            Some(FieldType::Message) => {
                let child = self.child(method?, field, parent_type, Some(key), raw, path, depth)?;
                Some((FieldValue::Unset, Some(child)))
            }
            Some(kind) => match coerce_scalar(kind, field, raw) {
                Some(value) => Some((value, None)),
                None => {
                    self.mismatch(&path, kind.name(), raw);
                    None
                }
            },
            None => Some((FieldValue::Dynamic(raw.clone()), None)),
        }
    }

    /// Create a nested message node, enforcing shape and depth
    #[allow(clippy::too_many_arguments)]
    fn child(
        &mut self,
        method: &FactoryMethod,
        field: &FieldSchema,
        parent_type: &str,
        key: Option<&AttributeKey>,
        raw: &'v Value,
        path: String,
        depth: usize,
    ) -> Option<usize> {
        if !matches!(raw, Value::Object(_)) {
            self.mismatch(&path, "object", raw);
            return None;
        }

        let depth = depth + 1;
        let max_depth = self.model.config().max_depth;
        if depth > max_depth {
            log::warn!("Nesting limit of {} exceeded at '{}'", max_depth, path);
            self.diagnostics.push(DeserializeError::SchemaMismatch {
                path,
                expected: format!("at most {} nested messages", max_depth),
                found: "deeper nesting".to_string(),
            });
            return None;
        }

        let call = FactoryCall {
            type_name: field.message_type.as_deref().unwrap_or_default(),
            parent: Some(parent_type),
            attribute_name: Some(field.name.as_str()),
            attribute_key: key,
            raw_data: raw,
        };
        Some(self.spawn(method, call, raw, path, depth))
    }

    fn resolve(&mut self, type_name: &str, path: &str) -> Option<FactoryMethod> {
        let method = self.model.factory_method(type_name);
        if method.is_none() {
            log::warn!("No wired package provides '{}' (at '{}')", type_name, path);
            self.diagnostics.push(DeserializeError::TypeResolution {
                type_name: type_name.to_string(),
                path: path.to_string(),
            });
        }
        method
    }

    fn mismatch(&mut self, path: &str, expected: &str, found: &Value) {
        self.diagnostics.push(DeserializeError::SchemaMismatch {
            path: path.to_string(),
            expected: expected.to_string(),
            found: found.kind_name().to_string(),
        });
    }
}

/// Match a raw key by field name, then by wire id
fn lookup_field<'s>(schema: &'s MessageSchema, key: &str) -> Option<&'s FieldSchema> {
    schema
        .field(key)
        .or_else(|| key.parse().ok().and_then(|id| schema.field_by_id(id)))
}

/// The raw key of each field's last non-null occurrence
fn last_occurrences<'s, 'o>(
    schema: &'s MessageSchema,
    object: &'o ValueMap,
) -> HashMap<&'s str, &'o str> {
    object
        .iter()
        .filter(|(_, v)| !v.is_null())
        .filter_map(|(key, _)| lookup_field(schema, key).map(|f| (f.name.as_str(), key.as_str())))
        .collect()
}

fn join(path: &str, field: &str) -> String {
    if path.is_empty() {
        field.to_string()
    } else {
        format!("{}.{}", path, field)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Package;
    use tether_schema::SchemaRegistry;

    fn model() -> ObjectModel {
        let registry = SchemaRegistry::new("shop")
            .with_message(
                MessageSchema::new("shop.Order")
                    .with_field(FieldSchema::string("id", 1))
                    .with_field(FieldSchema::repeated_message("lines", 2, "shop.Line"))
                    .with_field(FieldSchema::map("totals", 3, FieldType::Number))
                    .with_field(FieldSchema::new("extra", 4, FieldType::Repeated)),
            )
            .unwrap()
            .with_message(
                MessageSchema::new("shop.Line")
                    .with_field(FieldSchema::string("sku", 1))
                    .with_field(FieldSchema::integer("qty", 2)),
            )
            .unwrap();
        ObjectModel::builder()
            .package(Package::with_default_factory(registry))
            .build()
            .unwrap()
    }

    fn raw(json: &str) -> Value {
        Value::from_json(json).unwrap()
    }

    #[test]
    fn test_nested_elements_written_back() {
        let model = model();
        let order = model
            .deserializer()
            .deserialize(
                "shop.Order",
                &raw(r#"{"id": "o1", "lines": [{"sku": "a", "qty": 2}, {"sku": "b", "qty": "3"}]}"#),
            )
            .unwrap();

        assert!(order.is_clean());
        let lines = order.value.get("lines").and_then(FieldValue::as_list).unwrap();
        assert_eq!(lines.len(), 2);
        let second = lines[1].as_message().unwrap();
        assert_eq!(second.type_name(), "shop.Line");
        assert_eq!(second.get("qty"), Some(&FieldValue::Integer(3)));
    }

    #[test]
    fn test_bad_elements_dropped() {
        let model = model();
        let order = model
            .deserializer()
            .deserialize(
                "shop.Order",
                &raw(r#"{"lines": [1, {"sku": "a"}], "totals": {"x": 1.5, "y": "n/a"}}"#),
            )
            .unwrap();

        let lines = order.value.get("lines").and_then(FieldValue::as_list).unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(
            lines[0].as_message().and_then(|m| m.get("sku")),
            Some(&FieldValue::from("a"))
        );

        let totals = order.value.get("totals").and_then(FieldValue::as_map).unwrap();
        assert_eq!(totals.len(), 1);
        assert_eq!(order.diagnostics.len(), 2);
        assert_eq!(order.diagnostics[0].path(), "lines[0]");
        assert_eq!(order.diagnostics[1].path(), "totals['y']");
    }

    #[test]
    fn test_field_ids_and_untracked_elements() {
        let model = model();
        let order = model
            .deserializer()
            .deserialize("shop.Order", &raw(r#"{"1": "o9", "extra": [1, "two", null]}"#))
            .unwrap();

        assert_eq!(order.value.get("id"), Some(&FieldValue::from("o9")));
        let extra = order.value.get("extra").and_then(FieldValue::as_list).unwrap();
        assert_eq!(extra[1], FieldValue::Dynamic(Value::from("two")));
        assert_eq!(extra[2], FieldValue::Dynamic(Value::Null));
    }

    #[test]
    fn test_deserialize_field_and_element() {
        let model = model();
        let de = model.deserializer();
        let schema = model.schema("shop.Order").unwrap();
        let lines = schema.field("lines").unwrap();

        let built = de.deserialize_field("shop.Order", lines, &raw(r#"[{"sku": "z"}]"#));
        assert!(built.is_clean());
        assert_eq!(built.value.as_list().map(Vec::len), Some(1));

        let element = de.deserialize_element(
            "shop.Order",
            lines,
            &AttributeKey::Index(4),
            &raw(r#"{"sku": "q", "qty": 1}"#),
        );
        let line = element.value.unwrap();
        assert_eq!(
            line.as_message().and_then(|m| m.get("sku")),
            Some(&FieldValue::from("q"))
        );

        let cleared = de.deserialize_field("shop.Order", lines, &Value::Null);
        assert_eq!(cleared.value, FieldValue::List(Vec::new()));
    }

    #[test]
    fn test_unknown_root_type() {
        let model = model();
        let result = model.deserializer().deserialize("shop.Missing", &Value::object());
        assert_eq!(
            result.err(),
            Some(DeserializeError::TypeResolution {
                type_name: "shop.Missing".into(),
                path: String::new(),
            })
        );
    }
}
