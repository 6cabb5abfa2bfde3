//! Patch applier - mutates typed instances in place
//!
//! Each path segment is resolved against the schema of the message being
//! traversed: the named field must exist and a subscript must match the
//! container kind (`[N]` for repeated fields, `['key']` for maps).
//! Traversing an unset message field materializes a default instance
//! through the factory layer; it is attached only if the patch applies.
//! Types without a schema are navigated structurally.

use crate::error::{AddressReason, PatchAddressError};
use crate::structural;
use tether_ir::{MessagePatch, PatchOperation, PathSegment, Value};
use tether_object::{
    AttributeKey, DeserializeError, Deserialized, Deserializer, FieldMap, FieldValue, Message,
    ObjectModel,
};
use tether_schema::{FieldSchema, FieldType};

/// Outcome of applying a list of patches
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PatchReport {
    /// Number of patches applied
    pub applied: usize,
    /// Patches that were skipped, in patch order
    pub errors: Vec<PatchAddressError>,
    /// Problems found while building patch values that were still applied
    pub diagnostics: Vec<DeserializeError>,
}

impl PatchReport {
    /// Check if every patch applied without diagnostics
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty() && self.diagnostics.is_empty()
    }

    /// Number of skipped patches
    pub fn skipped(&self) -> usize {
        self.errors.len()
    }
}

/// Applies patches to typed instances
#[derive(Debug, Clone, Copy)]
pub struct PatchApplier<'m> {
    model: &'m ObjectModel,
}

impl<'m> PatchApplier<'m> {
    /// Create an applier over a model
    pub fn new(model: &'m ObjectModel) -> Self {
        Self { model }
    }

    /// Apply patches strictly in order.
    ///
    /// A patch that cannot be addressed is skipped and recorded; the
    /// remaining patches still apply.
    pub fn apply(&self, target: &mut Message, patches: &[MessagePatch]) -> PatchReport {
        let mut report = PatchReport::default();

        for (patch_index, patch) in patches.iter().enumerate() {
            match self.apply_one(target, patch) {
                Ok(diagnostics) => {
                    report.applied += 1;
                    report.diagnostics.extend(diagnostics);
                }
                Err(reason) => {
                    let error = PatchAddressError {
                        patch_index,
                        field_path: patch.field_path.clone(),
                        operation: patch.operation,
                        reason,
                    };
                    log::warn!("{} on {}", error, target.type_name());
                    report.errors.push(error);
                }
            }
        }

        report
    }

    /// Apply a single patch
    pub fn apply_one(
        &self,
        target: &mut Message,
        patch: &MessagePatch,
    ) -> Result<Vec<DeserializeError>, AddressReason> {
        let path = patch.path()?;
        let mut diagnostics = Vec::new();
        self.apply_in_message(target, path.segments(), patch, &mut diagnostics)?;
        Ok(diagnostics)
    }

    fn deserializer(&self) -> Deserializer<'m> {
        self.model.deserializer()
    }

    fn apply_in_message(
        &self,
        message: &mut Message,
        segments: &[PathSegment],
        patch: &MessagePatch,
        diagnostics: &mut Vec<DeserializeError>,
    ) -> Result<(), AddressReason> {
        let Some((PathSegment::Field(name), rest)) = segments.split_first() else {
            return Err(AddressReason::KindMismatch {
                field: message.type_name().to_string(),
                expected: "field name",
                found: "subscript".to_string(),
            });
        };

        if message.schema().is_none() {
            return self.apply_untracked(message, name, rest, patch, diagnostics);
        }

        let field = message
            .field_schema(name)
            .cloned()
            .ok_or_else(|| AddressReason::UnknownField {
                type_name: message.type_name().to_string(),
                field: name.clone(),
            })?;

        match rest.split_first() {
            None => self.apply_to_field(message, &field, patch, diagnostics),

            Some((PathSegment::Field(_), _)) => {
                if field.field_type != FieldType::Message {
                    return Err(kind_mismatch(&field, "message"));
                }
                if message.get(name).map_or(true, FieldValue::is_unset) {
                    // Only stored once the rest of the path applies
                    let mut detached = self.detached(&field)?;
                    self.descend(&mut detached, &field, rest, patch, diagnostics)?;
                    message.set(name, detached);
                    return Ok(());
                }
                let slot = message
                    .get_mut(name)
                    .ok_or_else(|| kind_mismatch(&field, "message"))?;
                self.descend(slot, &field, rest, patch, diagnostics)
            }

            Some((PathSegment::Index(index), after)) => {
                if field.field_type != FieldType::Repeated {
                    return Err(container_mismatch(&field, "repeated"));
                }
                let parent_type = message.type_name().to_string();
                let items = message
                    .get_mut(name)
                    .and_then(FieldValue::as_list_mut)
                    .ok_or_else(|| kind_mismatch(&field, "repeated"))?;
                let len = items.len();
                let element = items
                    .get_mut(*index)
                    .ok_or(AddressReason::IndexOutOfBounds { index: *index, len })?;

                let key = AttributeKey::Index(*index);
                if after.is_empty() {
                    return self.set_element(&parent_type, element, &field, &key, patch, diagnostics);
                }
                self.descend_element(element, &field, after, patch, diagnostics)
            }

            Some((PathSegment::Key(key), after)) => {
                if field.field_type != FieldType::Map {
                    return Err(container_mismatch(&field, "map"));
                }
                let parent_type = message.type_name().to_string();
                let entries = message
                    .get_mut(name)
                    .and_then(FieldValue::as_map_mut)
                    .ok_or_else(|| kind_mismatch(&field, "map"))?;

                let attribute = AttributeKey::Key(key.clone());
                if after.is_empty() {
                    // SET on a missing key inserts it
                    if patch.operation == PatchOperation::Set && !entries.contains_key(key) {
                        let value =
                            self.build_element(&parent_type, &field, &attribute, patch, diagnostics)?;
                        entries.insert(key.clone(), value);
                        return Ok(());
                    }
                    let element = entries
                        .get_mut(key)
                        .ok_or_else(|| AddressReason::MissingKey(key.clone()))?;
                    return self.set_element(
                        &parent_type,
                        element,
                        &field,
                        &attribute,
                        patch,
                        diagnostics,
                    );
                }
                let element = entries
                    .get_mut(key)
                    .ok_or_else(|| AddressReason::MissingKey(key.clone()))?;
                self.descend_element(element, &field, after, patch, diagnostics)
            }
        }
    }

    /// Continue into a message-valued slot
    fn descend(
        &self,
        slot: &mut FieldValue,
        field: &FieldSchema,
        segments: &[PathSegment],
        patch: &MessagePatch,
        diagnostics: &mut Vec<DeserializeError>,
    ) -> Result<(), AddressReason> {
        match slot {
            FieldValue::Message(inner) => self.apply_in_message(inner, segments, patch, diagnostics),
            FieldValue::Dynamic(value) => structural::apply(value, segments, patch),
            other => Err(AddressReason::KindMismatch {
                field: field.name.clone(),
                expected: "message",
                found: other.kind_name().to_string(),
            }),
        }
    }

    /// Continue into a collection element, e.g. the `.name` of `players[2].name`
    fn descend_element(
        &self,
        element: &mut FieldValue,
        field: &FieldSchema,
        segments: &[PathSegment],
        patch: &MessagePatch,
        diagnostics: &mut Vec<DeserializeError>,
    ) -> Result<(), AddressReason> {
        if element.is_unset() {
            let mut detached = self.detached(field)?;
            self.descend(&mut detached, field, segments, patch, diagnostics)?;
            *element = detached;
            return Ok(());
        }
        if matches!(element, FieldValue::Message(_) | FieldValue::Dynamic(_)) {
            return self.descend(element, field, segments, patch, diagnostics);
        }
        Err(AddressReason::NotAContainer(format!(
            "{} element of '{}'",
            element.kind_name(),
            field.name
        )))
    }

    /// Apply a patch whose path ends at a schema-tracked field
    fn apply_to_field(
        &self,
        message: &mut Message,
        field: &FieldSchema,
        patch: &MessagePatch,
        diagnostics: &mut Vec<DeserializeError>,
    ) -> Result<(), AddressReason> {
        let op = patch.operation;

        if op == PatchOperation::Set {
            if patch.value.is_null() {
                message.clear_field(&field.name);
                return Ok(());
            }
            let built = self
                .deserializer()
                .deserialize_field(message.type_name(), field, &patch.value);
            let value = accept(built, &field.name, diagnostics)?;
            message.set(&field.name, value);
            return Ok(());
        }

        if op.targets_list() && field.field_type != FieldType::Repeated {
            return Err(container_mismatch(field, "repeated"));
        }
        if op.targets_map() && field.field_type != FieldType::Map {
            return Err(container_mismatch(field, "map"));
        }

        let parent_type = message.type_name().to_string();
        let slot = message
            .get_mut(&field.name)
            .ok_or_else(|| kind_mismatch(field, field.field_type.name()))?;

        // Untracked containers keep their boundary shape
        if let FieldValue::Dynamic(value) = slot {
            return structural::apply(value, &[], patch);
        }

        match op {
            // Handled before the slot is borrowed
            PatchOperation::Set => Ok(()),

            PatchOperation::InsertList => {
                let len = list_len(slot, field)?;
                let index = patch.index.unwrap_or(len);
                if index > len {
                    return Err(AddressReason::IndexOutOfBounds { index, len });
                }
                let key = AttributeKey::Index(index);
                let value = self.build_element(&parent_type, field, &key, patch, diagnostics)?;
                list_mut(slot, field)?.insert(index, value);
                Ok(())
            }

            PatchOperation::RemoveList => {
                let index = patch.index.ok_or(AddressReason::MissingOperand("index"))?;
                let items = list_mut(slot, field)?;
                if index >= items.len() {
                    return Err(AddressReason::IndexOutOfBounds {
                        index,
                        len: items.len(),
                    });
                }
                items.remove(index);
                Ok(())
            }

            PatchOperation::MoveList => {
                let from = patch
                    .old_index
                    .ok_or(AddressReason::MissingOperand("oldIndex"))?;
                let to = patch.index.ok_or(AddressReason::MissingOperand("index"))?;
                let items = list_mut(slot, field)?;
                let len = items.len();
                for index in [from, to] {
                    if index >= len {
                        return Err(AddressReason::IndexOutOfBounds { index, len });
                    }
                }
                let item = items.remove(from);
                items.insert(to, item);
                Ok(())
            }

            PatchOperation::ClearList => {
                list_mut(slot, field)?.clear();
                Ok(())
            }

            PatchOperation::InsertMap => {
                let key = patch
                    .key
                    .clone()
                    .ok_or(AddressReason::MissingOperand("key"))?;
                let attribute = AttributeKey::Key(key.clone());
                let value = self.build_element(&parent_type, field, &attribute, patch, diagnostics)?;
                // Overwriting keeps the entry's position
                map_mut(slot, field)?.insert(key, value);
                Ok(())
            }

            PatchOperation::RemoveMap => {
                let key = patch
                    .key
                    .as_deref()
                    .ok_or(AddressReason::MissingOperand("key"))?;
                map_mut(slot, field)?.shift_remove(key);
                Ok(())
            }

            PatchOperation::ClearMap => {
                map_mut(slot, field)?.clear();
                Ok(())
            }
        }
    }

    /// Apply a patch whose path ends at a collection element
    fn set_element(
        &self,
        parent_type: &str,
        element: &mut FieldValue,
        field: &FieldSchema,
        key: &AttributeKey,
        patch: &MessagePatch,
        diagnostics: &mut Vec<DeserializeError>,
    ) -> Result<(), AddressReason> {
        if let FieldValue::Dynamic(value) = element {
            return structural::apply(value, &[], patch);
        }
        if patch.operation != PatchOperation::Set {
            return Err(AddressReason::NotAContainer(format!("{}{}", field.name, key)));
        }
        *element = self.build_element(parent_type, field, key, patch, diagnostics)?;
        Ok(())
    }

    /// Build a collection element from the patch value
    fn build_element(
        &self,
        parent_type: &str,
        field: &FieldSchema,
        key: &AttributeKey,
        patch: &MessagePatch,
        diagnostics: &mut Vec<DeserializeError>,
    ) -> Result<FieldValue, AddressReason> {
        // SET on an element replaces it, so it needs a value as much as an insert
        let needs_value =
            patch.operation.requires_value() || patch.operation == PatchOperation::Set;
        if needs_value && patch.value.is_null() {
            return Err(AddressReason::MissingOperand("value"));
        }
        let built = self
            .deserializer()
            .deserialize_element(parent_type, field, key, &patch.value);
        let path = format!("{}{}", field.name, key);
        match accept(built, &path, diagnostics)? {
            Some(value) => Ok(value),
            None => Err(AddressReason::InvalidValue(format!(
                "not a valid element of '{}'",
                field.name
            ))),
        }
    }

    /// Patch a field of a message that has no schema
    fn apply_untracked(
        &self,
        message: &mut Message,
        name: &str,
        rest: &[PathSegment],
        patch: &MessagePatch,
        diagnostics: &mut Vec<DeserializeError>,
    ) -> Result<(), AddressReason> {
        if rest.is_empty() && patch.operation == PatchOperation::Set {
            if patch.value.is_null() {
                message.clear_field(name);
            } else {
                message.set_raw(name, FieldValue::Dynamic(patch.value.clone()));
            }
            return Ok(());
        }

        if message.get(name).is_none() {
            if patch.operation != PatchOperation::Set {
                return Err(AddressReason::UnknownField {
                    type_name: message.type_name().to_string(),
                    field: name.to_string(),
                });
            }
            let mut value = Value::Null;
            structural::apply(&mut value, rest, patch)?;
            message.set_raw(name, FieldValue::Dynamic(value));
            return Ok(());
        }

        match message.get_mut(name) {
            Some(FieldValue::Message(inner)) => {
                self.apply_in_message(inner, rest, patch, diagnostics)
            }
            Some(FieldValue::Dynamic(value)) => structural::apply(value, rest, patch),
            Some(other) => Err(AddressReason::KindMismatch {
                field: name.to_string(),
                expected: "message or structural value",
                found: other.kind_name().to_string(),
            }),
            None => Err(AddressReason::UnknownField {
                type_name: message.type_name().to_string(),
                field: name.to_string(),
            }),
        }
    }

    /// A default instance of the field's message type, not yet attached to any parent
    fn detached(&self, field: &FieldSchema) -> Result<FieldValue, AddressReason> {
        let type_name = field.message_type.as_deref().unwrap_or_default();
        self.deserializer()
            .default_instance(type_name)
            .map(|instance| FieldValue::Message(Box::new(instance)))
            .map_err(|_| AddressReason::TypeResolution(type_name.to_string()))
    }
}

/// Keep a built value unless building failed at the addressed location itself
fn accept<T>(
    built: Deserialized<T>,
    path: &str,
    diagnostics: &mut Vec<DeserializeError>,
) -> Result<T, AddressReason> {
    if let Some(error) = built.diagnostics.iter().find(|d| d.path() == path) {
        return Err(match error {
            DeserializeError::TypeResolution { type_name, .. } => {
                AddressReason::TypeResolution(type_name.clone())
            }
            other => AddressReason::InvalidValue(other.to_string()),
        });
    }
    diagnostics.extend(built.diagnostics);
    Ok(built.value)
}

fn kind_mismatch(field: &FieldSchema, expected: &'static str) -> AddressReason {
    AddressReason::KindMismatch {
        field: field.name.clone(),
        expected,
        found: field.field_type.name().to_string(),
    }
}

/// A subscript or collection operation on a field that is not the matching container
fn container_mismatch(field: &FieldSchema, expected: &'static str) -> AddressReason {
    if field.field_type.is_container() {
        kind_mismatch(field, expected)
    } else {
        AddressReason::NotAContainer(field.name.clone())
    }
}

fn list_len(slot: &FieldValue, field: &FieldSchema) -> Result<usize, AddressReason> {
    slot.as_list()
        .map(Vec::len)
        .ok_or_else(|| kind_mismatch(field, "repeated"))
}

fn list_mut<'a>(
    slot: &'a mut FieldValue,
    field: &FieldSchema,
) -> Result<&'a mut Vec<FieldValue>, AddressReason> {
    slot.as_list_mut()
        .ok_or_else(|| kind_mismatch(field, "repeated"))
}

fn map_mut<'a>(
    slot: &'a mut FieldValue,
    field: &FieldSchema,
) -> Result<&'a mut FieldMap, AddressReason> {
    slot.as_map_mut().ok_or_else(|| kind_mismatch(field, "map"))
}
