//! Structural patching of untracked values
//!
//! Used when a traversed type has no schema. Paths are followed by shape
//! alone: field names and quoted keys index objects, numeric subscripts
//! index arrays. SET creates missing intermediate objects.

use crate::error::AddressReason;
use tether_ir::{MessagePatch, PatchOperation, PathSegment, Value, ValueMap};

/// Apply a patch to the value addressed by `segments` under `target`.
///
/// `target` is left untouched when the patch fails.
pub(crate) fn apply(
    target: &mut Value,
    segments: &[PathSegment],
    patch: &MessagePatch,
) -> Result<(), AddressReason> {
    let mut draft = target.clone();
    apply_at(&mut draft, segments, patch)?;
    *target = draft;
    Ok(())
}

fn apply_at(
    target: &mut Value,
    segments: &[PathSegment],
    patch: &MessagePatch,
) -> Result<(), AddressReason> {
    let Some((segment, rest)) = segments.split_first() else {
        return apply_here(target, patch);
    };

    match segment {
        PathSegment::Field(name) | PathSegment::Key(name) => {
            let creating = patch.operation == PatchOperation::Set;
            if target.is_null() && creating {
                *target = Value::object();
            }
            let kind = target.kind_name();
            let object = target.as_object_mut().ok_or_else(|| AddressReason::KindMismatch {
                field: name.clone(),
                expected: "object",
                found: kind.to_string(),
            })?;

            if rest.is_empty() && patch.operation == PatchOperation::Set {
                set_entry(object, name, patch.value.clone());
                return Ok(());
            }

            let child = if creating {
                object.entry(name.clone()).or_insert(Value::Null)
            } else {
                object
                    .get_mut(name)
                    .ok_or_else(|| AddressReason::MissingKey(name.clone()))?
            };
            apply_at(child, rest, patch)
        }
        PathSegment::Index(index) => {
            let kind = target.kind_name();
            let items = target.as_array_mut().ok_or_else(|| AddressReason::KindMismatch {
                field: format!("[{}]", index),
                expected: "array",
                found: kind.to_string(),
            })?;
            let len = items.len();
            let child = items
                .get_mut(*index)
                .ok_or(AddressReason::IndexOutOfBounds { index: *index, len })?;
            apply_at(child, rest, patch)
        }
    }
}

/// `null` on SET removes the entry
fn set_entry(object: &mut ValueMap, name: &str, value: Value) {
    if value.is_null() {
        object.shift_remove(name);
    } else {
        object.insert(name.to_string(), value);
    }
}

fn apply_here(target: &mut Value, patch: &MessagePatch) -> Result<(), AddressReason> {
    match patch.operation {
        PatchOperation::Set => {
            *target = patch.value.clone();
            Ok(())
        }
        PatchOperation::InsertList => {
            let value = required_value(patch)?;
            let items = array(target, patch)?;
            let index = patch.index.unwrap_or(items.len());
            if index > items.len() {
                return Err(AddressReason::IndexOutOfBounds {
                    index,
                    len: items.len(),
                });
            }
            items.insert(index, value);
            Ok(())
        }
        PatchOperation::RemoveList => {
            let index = patch.index.ok_or(AddressReason::MissingOperand("index"))?;
            let items = array(target, patch)?;
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
            let from = patch.old_index.ok_or(AddressReason::MissingOperand("oldIndex"))?;
            let to = patch.index.ok_or(AddressReason::MissingOperand("index"))?;
            let items = array(target, patch)?;
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
            array(target, patch)?.clear();
            Ok(())
        }
        PatchOperation::InsertMap => {
            let key = patch.key.clone().ok_or(AddressReason::MissingOperand("key"))?;
            let value = required_value(patch)?;
            object(target, patch)?.insert(key, value);
            Ok(())
        }
        PatchOperation::RemoveMap => {
            let key = patch.key.as_deref().ok_or(AddressReason::MissingOperand("key"))?;
            object(target, patch)?.shift_remove(key);
            Ok(())
        }
        PatchOperation::ClearMap => {
            object(target, patch)?.clear();
            Ok(())
        }
    }
}

fn required_value(patch: &MessagePatch) -> Result<Value, AddressReason> {
    if patch.operation.requires_value() && patch.value.is_null() {
        return Err(AddressReason::MissingOperand("value"));
    }
    Ok(patch.value.clone())
}

fn array<'a>(target: &'a mut Value, patch: &MessagePatch) -> Result<&'a mut Vec<Value>, AddressReason> {
    if target.is_null() {
        *target = Value::Array(Vec::new());
    }
    let kind = target.kind_name();
    target.as_array_mut().ok_or_else(|| AddressReason::KindMismatch {
        field: patch.field_path.clone(),
        expected: "array",
        found: kind.to_string(),
    })
}

fn object<'a>(target: &'a mut Value, patch: &MessagePatch) -> Result<&'a mut ValueMap, AddressReason> {
    if target.is_null() {
        *target = Value::object();
    }
    let kind = target.kind_name();
    target.as_object_mut().ok_or_else(|| AddressReason::KindMismatch {
        field: patch.field_path.clone(),
        expected: "object",
        found: kind.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(target: &mut Value, patch: MessagePatch) -> Result<(), AddressReason> {
        let path = patch.path()?;
        // Skip the leading field, as the message layer does
        apply(target, &path.segments()[1..], &patch)
    }

    #[test]
    fn test_set_creates_intermediates() {
        let mut root = Value::Null;
        run(&mut root, MessagePatch::set("extra.a.b", 1)).unwrap();
        assert_eq!(
            root.get("a").and_then(|a| a.get("b")),
            Some(&Value::Int(1))
        );

        run(&mut root, MessagePatch::set("extra.a.b", Value::Null)).unwrap();
        assert_eq!(root.get("a").and_then(|a| a.as_object()).map(|o| o.len()), Some(0));
    }

    #[test]
    fn test_list_ops() {
        let mut root = Value::from(vec![1, 2, 3]);
        run(&mut root, MessagePatch::move_list("extra", 0, 2)).unwrap();
        assert_eq!(root, Value::from(vec![2, 3, 1]));

        run(&mut root, MessagePatch::insert_list("extra", 1, 9)).unwrap();
        assert_eq!(root, Value::from(vec![2, 9, 3, 1]));

        let err = run(&mut root, MessagePatch::remove_list("extra", 4)).unwrap_err();
        assert_eq!(err, AddressReason::IndexOutOfBounds { index: 4, len: 4 });
    }

    #[test]
    fn test_failed_patch_leaves_value_untouched() {
        let mut root = Value::object();
        let err = run(&mut root, MessagePatch::set("extra.a.b[0]", 1)).unwrap_err();
        assert!(matches!(err, AddressReason::KindMismatch { expected: "array", .. }));
        assert_eq!(root, Value::object());

        let mut root = Value::Null;
        run(&mut root, MessagePatch::remove_list("extra", 0)).unwrap_err();
        assert_eq!(root, Value::Null);
    }

    #[test]
    fn test_missing_key_without_set() {
        let mut root = Value::object();
        let err = run(&mut root, MessagePatch::clear_list("extra.items")).unwrap_err();
        assert_eq!(err, AddressReason::MissingKey("items".into()));
    }
}
