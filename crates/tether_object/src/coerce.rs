//! Scalar coercion from boundary values
//!
//! | Kind      | Accepted                                          |
//! |-----------|---------------------------------------------------|
//! | `STRING`  | string                                            |
//! | `NUMBER`  | float, integer, numeric string                    |
//! | `INTEGER` | integer, integral float, numeric string           |
//! | `BOOLEAN` | boolean only (`"true"` is rejected)               |
//! | `BYTES`   | standard base64 string                            |
//! | `ENUM`    | integer, integral float, enumerant name           |

use crate::message::FieldValue;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use tether_ir::Value;
use tether_schema::{FieldSchema, FieldType};

/// Coerce a raw value to a scalar kind.
///
/// `field` supplies enumerant names. Returns `None` when the value has the
/// wrong shape or `kind` is not a scalar kind.
pub fn coerce_scalar(kind: FieldType, field: &FieldSchema, raw: &Value) -> Option<FieldValue> {
    match (kind, raw) {
        (FieldType::String, Value::String(s)) => Some(FieldValue::String(s.clone())),

        (FieldType::Number, Value::String(s)) => s.trim().parse().ok().map(FieldValue::Number),
        (FieldType::Number, v) => v.as_float().map(FieldValue::Number),

        // 64-bit integers may arrive as strings to survive hosts with f64-only numbers
        (FieldType::Integer, Value::String(s)) => s.trim().parse().ok().map(FieldValue::Integer),
        (FieldType::Integer, v) => v.as_int().map(FieldValue::Integer),

        (FieldType::Boolean, Value::Bool(b)) => Some(FieldValue::Bool(*b)),

        (FieldType::Bytes, Value::String(s)) => BASE64.decode(s).ok().map(FieldValue::Bytes),

        (FieldType::Enum, Value::String(s)) => field.enum_values.get(s).copied().map(FieldValue::Enum),
        (FieldType::Enum, v) => v.as_int().map(FieldValue::Enum),

        _ => None,
    }
}
