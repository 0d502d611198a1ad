//! The typed field system.
//!
//! Each step of a template declares an ordered field schema
//! (`field_key` -> [`FieldType`]). At instantiation time that schema is
//! deep-copied into the step as a frozen snapshot, and the snapshot — not
//! the live template — governs how raw values are typed for the lifetime
//! of the step.
//!
//! A stored value is a tagged union ([`TypedValue`]) rather than a row of
//! five nullable columns, so a rewrite can never leak stale data through a
//! slot of the wrong type. The five-slot shape survives only as the export
//! projection ([`ExportedValue`]).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ── Field Type ───────────────────────────────────────────────────────

/// The closed set of declarable field types.
///
/// An unknown type name is a template-configuration error surfaced at
/// registration time, never a per-request error.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Number,
    Date,
    DateTime,
    Json,
}

/// Raised when a template declares a type outside the closed set.
#[derive(Debug, Error)]
#[error("unknown field type: {0}")]
pub struct UnknownFieldType(pub String);

impl FieldType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Date => "date",
            Self::DateTime => "datetime",
            Self::Json => "json",
        }
    }

    /// Parse a declared type name. Unknown names are rejected.
    pub fn parse(name: &str) -> Result<Self, UnknownFieldType> {
        match name {
            "string" => Ok(Self::String),
            "number" => Ok(Self::Number),
            "date" => Ok(Self::Date),
            "datetime" => Ok(Self::DateTime),
            "json" => Ok(Self::Json),
            other => Err(UnknownFieldType(other.to_string())),
        }
    }
}

impl std::fmt::Display for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for FieldType {
    type Err = UnknownFieldType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

// ── Field Schema ─────────────────────────────────────────────────────

/// One declared field within a step schema.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub field_key: String,
    pub field_type: FieldType,
}

impl FieldSpec {
    pub fn new(field_key: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            field_key: field_key.into(),
            field_type,
        }
    }
}

/// An ordered field schema; deep-copied into each step at instantiation.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSchema {
    pub fields: Vec<FieldSpec>,
}

impl FieldSchema {
    pub fn new(fields: Vec<FieldSpec>) -> Self {
        Self { fields }
    }

    /// Declared type for a key, if the key is part of the schema.
    pub fn field_type(&self, field_key: &str) -> Option<FieldType> {
        self.fields
            .iter()
            .find(|f| f.field_key == field_key)
            .map(|f| f.field_type)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

// ── Typed Value ──────────────────────────────────────────────────────

/// The stored payload of one field value. Exactly one variant is ever
/// populated; `Empty` records a write whose raw value failed coercion for
/// the declared type (stored as empty, not surfaced as an error).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum TypedValue {
    Text(String),
    Number(f64),
    Date(String),
    DateTime(String),
    Json(serde_json::Value),
    Empty,
}

impl TypedValue {
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    /// Number of populated export slots: 1 for any value, 0 for `Empty`.
    pub fn populated_slots(&self) -> usize {
        if self.is_empty() {
            0
        } else {
            1
        }
    }
}

/// One typed datum for one field of one step. At most one exists per
/// `(step, field_key)` pair; writes replace the full payload in place.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FieldValue {
    pub field_key: String,
    pub value: TypedValue,
    pub updated_at: DateTime<Utc>,
}

impl FieldValue {
    pub fn new(field_key: impl Into<String>, value: TypedValue, updated_at: DateTime<Utc>) -> Self {
        Self {
            field_key: field_key.into(),
            value,
            updated_at,
        }
    }

    /// Project into the canonical five-slot export shape.
    pub fn export(&self) -> ExportedValue {
        let mut out = ExportedValue {
            field_key: self.field_key.clone(),
            value_string: None,
            value_number: None,
            value_date: None,
            value_datetime: None,
            value_json: None,
        };
        match &self.value {
            TypedValue::Text(s) => out.value_string = Some(s.clone()),
            TypedValue::Number(n) => out.value_number = Some(*n),
            TypedValue::Date(d) => out.value_date = Some(d.clone()),
            TypedValue::DateTime(d) => out.value_datetime = Some(d.clone()),
            TypedValue::Json(j) => out.value_json = Some(j.clone()),
            TypedValue::Empty => {}
        }
        out
    }
}

/// The five-slot deliverable projection of one field value. All slots are
/// serialized (null when unpopulated) so the export shape is stable.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExportedValue {
    pub field_key: String,
    pub value_string: Option<String>,
    pub value_number: Option<f64>,
    pub value_date: Option<String>,
    pub value_datetime: Option<String>,
    pub value_json: Option<serde_json::Value>,
}

impl ExportedValue {
    /// Count of non-null slots; at most one by construction.
    pub fn populated_slots(&self) -> usize {
        usize::from(self.value_string.is_some())
            + usize::from(self.value_number.is_some())
            + usize::from(self.value_date.is_some())
            + usize::from(self.value_datetime.is_some())
            + usize::from(self.value_json.is_some())
    }
}
