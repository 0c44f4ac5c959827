//! Record schemas.
//!
//! A [`Schema`] is built once per record type and describes every declared
//! field: its name, its shape ([`FieldKind`]), its target type
//! ([`FieldType`]), its default and its validation rule. Coercion of raw
//! store values is a lookup into this descriptor followed by a `match`.

use std::collections::HashMap;

use super::error::ConversionError;
use super::validation::{FieldError, Validation};
use super::value::{Item, Value};

/// Accessor for the schema of a nested record type.
pub type SchemaRef = fn() -> &'static Schema;

/// Target type of a field (or of the elements of a list field).
#[derive(Clone, Copy)]
pub enum FieldType {
    String,
    Int,
    Float,
    Bool,
    /// Stored as-is, never coerced.
    Any,
    Record(SchemaRef),
}

impl FieldType {
    pub fn name(&self) -> &'static str {
        match self {
            FieldType::String => "str",
            FieldType::Int => "int",
            FieldType::Float => "float",
            FieldType::Bool => "bool",
            FieldType::Any => "any",
            FieldType::Record(schema) => schema().name(),
        }
    }

    fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (FieldType::String, Value::String(_)) => true,
            (FieldType::Int, Value::Int(_)) => true,
            (FieldType::Float, Value::Float(_)) => true,
            (FieldType::Bool, Value::Bool(_)) => true,
            (FieldType::Any, _) => true,
            (FieldType::Record(_), Value::Map(_)) => true,
            _ => false,
        }
    }
}

impl std::fmt::Debug for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Shape of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Scalar,
    Optional,
    List,
    Nested,
}

/// One declared field.
#[derive(Debug, Clone)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    pub target: FieldType,
    pub default: Value,
    pub required: bool,
    pub check_type: bool,
}

impl FieldSpec {
    fn new(name: &'static str, kind: FieldKind, target: FieldType, default: Value) -> Self {
        Self {
            name,
            kind,
            target,
            default,
            required: false,
            check_type: matches!(target, FieldType::Bool) && kind == FieldKind::Scalar,
        }
    }

    pub fn string(name: &'static str) -> Self {
        Self::new(
            name,
            FieldKind::Scalar,
            FieldType::String,
            Value::String(String::new()),
        )
    }

    pub fn int(name: &'static str) -> Self {
        Self::new(name, FieldKind::Scalar, FieldType::Int, Value::Int(0))
    }

    pub fn float(name: &'static str) -> Self {
        Self::new(name, FieldKind::Scalar, FieldType::Float, Value::Float(0.0))
    }

    pub fn bool(name: &'static str) -> Self {
        Self::new(name, FieldKind::Scalar, FieldType::Bool, Value::Bool(false))
    }

    pub fn any(name: &'static str) -> Self {
        Self::new(name, FieldKind::Scalar, FieldType::Any, Value::Null)
    }

    /// A field that may be absent (`Null`).
    pub fn optional(name: &'static str, target: FieldType) -> Self {
        Self::new(name, FieldKind::Optional, target, Value::Null)
    }

    /// A list field. Defaults to an empty list.
    pub fn list(name: &'static str, target: FieldType) -> Self {
        Self::new(name, FieldKind::List, target, Value::List(Vec::new()))
    }

    /// A nested record field. Defaults to absent.
    pub fn nested(name: &'static str, schema: SchemaRef) -> Self {
        Self::new(name, FieldKind::Nested, FieldType::Record(schema), Value::Null)
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = default.into();
        self
    }

    /// Enables the runtime type check for this field during validation.
    pub fn typed(mut self) -> Self {
        self.check_type = true;
        self
    }

    fn coerce(&self, value: Value) -> Result<Value, ConversionError> {
        match (self.kind, value) {
            (_, Value::Null) => Ok(Value::Null),
            (FieldKind::List, Value::List(values)) => values
                .into_iter()
                .map(|v| coerce_scalar(self.name, self.target, v, true))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::List),
            (FieldKind::List, other) => Err(ConversionError::new(
                self.name,
                "list",
                format!("expected a list, got {}", other.type_name()),
            )),
            (_, value) => coerce_scalar(self.name, self.target, value, false),
        }
    }

    fn check(&self, value: &Value) -> Option<FieldError> {
        if self.required && value.is_absent() {
            return Some(FieldError::new("field required", value.clone()));
        }
        if !self.check_type {
            return None;
        }
        if value.is_null() && self.kind == FieldKind::Optional {
            return None;
        }
        let ok = match (self.kind, value) {
            (FieldKind::List, Value::List(values)) => values.iter().all(|v| self.target.accepts(v)),
            (FieldKind::List, _) => false,
            (_, v) => self.target.accepts(v),
        };
        if ok {
            None
        } else if matches!(self.target, FieldType::Bool) {
            Some(FieldError::new("Not a boolean value", value.clone()))
        } else {
            Some(FieldError::new(
                format!("Not a {} value", self.target.name()),
                value.clone(),
            ))
        }
    }
}

fn coerce_scalar(
    field: &str,
    target: FieldType,
    value: Value,
    in_list: bool,
) -> Result<Value, ConversionError> {
    match target {
        FieldType::Int => match value {
            Value::Int(i) => Ok(Value::Int(i)),
            Value::Bool(b) => Ok(Value::Int(b as i64)),
            Value::Float(f) => float_to_int(f)
                .map(Value::Int)
                .ok_or_else(|| ConversionError::new(field, "int", "out of range")),
            Value::Decimal(d) => parse_int_lenient(&d)
                .map(Value::Int)
                .map_err(|cause| ConversionError::new(field, "int", cause)),
            // A numeric field given as an empty string is absent, not zero.
            Value::String(s) if s.is_empty() => Ok(Value::Null),
            Value::String(s) => s
                .trim()
                .parse::<i64>()
                .map(Value::Int)
                .map_err(|e| ConversionError::new(field, "int", e.to_string())),
            other => Err(ConversionError::new(
                field,
                "int",
                format!("cannot convert {}", other.type_name()),
            )),
        },
        FieldType::Float => match value {
            Value::Float(f) => Ok(Value::Float(f)),
            Value::Int(i) => Ok(Value::Float(i as f64)),
            Value::Bool(b) => Ok(Value::Float(if b { 1.0 } else { 0.0 })),
            Value::Decimal(d) => d
                .trim()
                .parse::<f64>()
                .map(Value::Float)
                .map_err(|e| ConversionError::new(field, "float", e.to_string())),
            Value::String(s) if s.is_empty() => Ok(Value::Null),
            Value::String(s) => s
                .trim()
                .parse::<f64>()
                .map(Value::Float)
                .map_err(|e| ConversionError::new(field, "float", e.to_string())),
            other => Err(ConversionError::new(
                field,
                "float",
                format!("cannot convert {}", other.type_name()),
            )),
        },
        FieldType::Record(schema) => match value {
            Value::Map(map) => {
                let schema = schema();
                schema.coerce(map).map(Value::Map).map_err(|e| {
                    ConversionError::new(format!("{field}.{}", e.field), e.target, e.cause)
                })
            }
            other => Err(ConversionError::new(
                field,
                schema().name(),
                format!("expected a map, got {}", other.type_name()),
            )),
        },
        FieldType::String if in_list => match value {
            Value::Int(_) | Value::Float(_) | Value::Decimal(_) | Value::Bool(_) => {
                Ok(Value::String(value.to_string()))
            }
            other => Ok(other),
        },
        FieldType::String | FieldType::Bool | FieldType::Any => Ok(value),
    }
}

/// Truncates `f` toward zero. `None` when the result does not fit an `i64`.
fn float_to_int(f: f64) -> Option<i64> {
    // i64::MAX as f64 rounds up to 2^63, which is itself out of range.
    let f = f.trunc();
    (f.is_finite() && f >= i64::MIN as f64 && f < i64::MAX as f64).then_some(f as i64)
}

/// Parses an integer from decimal text, truncating a fractional part.
fn parse_int_lenient(text: &str) -> Result<i64, String> {
    let text = text.trim();
    if let Ok(i) = text.parse::<i64>() {
        return Ok(i);
    }
    let f = text
        .parse::<f64>()
        .map_err(|_| format!("invalid number {text:?}"))?;
    float_to_int(f).ok_or_else(|| "out of range".to_string())
}

/// Complete field set of one record type.
#[derive(Debug)]
pub struct Schema {
    name: &'static str,
    fields: Vec<FieldSpec>,
    index: HashMap<&'static str, usize>,
}

impl Schema {
    pub fn new(name: &'static str, fields: Vec<FieldSpec>) -> Self {
        let index = fields
            .iter()
            .enumerate()
            .map(|(i, f)| (f.name, i))
            .collect();
        Self {
            name,
            fields,
            index,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.index.get(name).map(|&i| &self.fields[i])
    }

    pub fn field_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.fields.iter().map(|f| f.name)
    }

    /// Keys of `raw` that are not declared fields.
    pub fn unknown_fields(&self, raw: &Item) -> Vec<String> {
        raw.keys()
            .filter(|k| !self.index.contains_key(k.as_str()))
            .cloned()
            .collect()
    }

    /// Coerces a raw item into the declared field set.
    ///
    /// Unknown keys are dropped, missing fields take their default and every
    /// present value is coerced to its declared type.
    pub fn coerce(&self, mut raw: Item) -> Result<Item, ConversionError> {
        let mut out = Item::new();
        for field in &self.fields {
            let value = raw.remove(field.name).unwrap_or_else(|| field.default.clone());
            out.insert(field.name.to_string(), field.coerce(value)?);
        }
        Ok(out)
    }

    /// Evaluates the declared validation rules against `fields`.
    pub fn validate(&self, fields: &Item) -> Validation {
        let mut validation = Validation::default();
        for field in &self.fields {
            let value = fields.get(field.name).unwrap_or(&Value::Null);
            if let Some(error) = field.check(value) {
                validation.insert(field.name, error);
            }
        }
        validation
    }
}
