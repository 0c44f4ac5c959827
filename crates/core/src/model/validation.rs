use std::collections::BTreeMap;

use super::value::Value;

/// Why one field failed validation.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldError {
    pub error: String,
    pub value: Value,
}

impl FieldError {
    pub fn new(error: impl Into<String>, value: Value) -> Self {
        Self {
            error: error.into(),
            value,
        }
    }
}

/// Result of an explicit validation pass: `field -> {error, value}`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Validation {
    errors: BTreeMap<String, FieldError>,
}

impl Validation {
    pub(crate) fn insert(&mut self, field: &str, error: FieldError) {
        self.errors.insert(field.to_string(), error);
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn errors(&self) -> &BTreeMap<String, FieldError> {
        &self.errors
    }

    pub fn into_errors(self) -> BTreeMap<String, FieldError> {
        self.errors
    }
}
