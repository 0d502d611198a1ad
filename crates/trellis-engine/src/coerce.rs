//! Raw-value coercion against a field's declared type.
//!
//! A write never fails the surrounding batch because of one bad value: a
//! raw value that cannot be coerced for its declared type is stored as
//! [`TypedValue::Empty`], and a JSON `null` clears the value outright.

use serde_json::Value;
use trellis_types::{FieldType, TypedValue};

/// Coerce one raw JSON value against the declared type from a step's
/// frozen schema snapshot. Total: every input maps to some [`TypedValue`].
pub fn coerce(raw: &Value, field_type: FieldType) -> TypedValue {
    if raw.is_null() {
        return TypedValue::Empty;
    }
    match field_type {
        FieldType::Number => coerce_number(raw),
        FieldType::Date => coerce_scalar_string(raw).map_or(TypedValue::Empty, TypedValue::Date),
        FieldType::DateTime => {
            coerce_scalar_string(raw).map_or(TypedValue::Empty, TypedValue::DateTime)
        }
        FieldType::Json => coerce_json(raw),
        FieldType::String => TypedValue::Text(string_form(raw)),
    }
}

fn coerce_number(raw: &Value) -> TypedValue {
    match raw {
        Value::Number(n) => n.as_f64().map_or(TypedValue::Empty, TypedValue::Number),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|n| n.is_finite())
            .map_or(TypedValue::Empty, TypedValue::Number),
        _ => TypedValue::Empty,
    }
}

/// Scalar inputs coerce to their string representation; containers do not.
fn coerce_scalar_string(raw: &Value) -> Option<String> {
    match raw {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn coerce_json(raw: &Value) -> TypedValue {
    if raw.is_object() || raw.is_array() {
        TypedValue::Json(raw.clone())
    } else {
        // Scalars are wrapped so the stored payload is always a container.
        TypedValue::Json(serde_json::json!({ "value": raw }))
    }
}

/// String form of a raw value: strings verbatim, other scalars via their
/// display form, containers as serialized JSON.
fn string_form(raw: &Value) -> String {
    match raw {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}
