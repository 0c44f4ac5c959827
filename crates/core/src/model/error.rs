use thiserror::Error;

/// A raw value could not be coerced to the declared type of its field.
#[derive(Debug, Error, Clone, PartialEq)]
#[error("Error converting field {field} to {target}: {cause}")]
pub struct ConversionError {
    pub field: String,
    pub target: &'static str,
    pub cause: String,
}

impl ConversionError {
    pub fn new(field: impl Into<String>, target: &'static str, cause: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            target,
            cause: cause.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversion_error_display() {
        let error = ConversionError::new("founded", "int", "invalid digit found in string");
        assert_eq!(
            error.to_string(),
            "Error converting field founded to int: invalid digit found in string"
        );
    }
}
