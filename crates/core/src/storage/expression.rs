//! Expression builders and placeholder merging.

use std::collections::BTreeMap;

use crate::model::{Item, Value};

use super::types::Expression;

impl Expression {
    pub fn new(expression: impl Into<String>) -> Self {
        Self {
            expression: expression.into(),
            ..Default::default()
        }
    }

    /// Adds a `#alias -> attribute` substitution.
    pub fn name(mut self, alias: impl Into<String>, attribute: impl Into<String>) -> Self {
        self.names.insert(alias.into(), attribute.into());
        self
    }

    /// Adds a `:placeholder -> value` substitution.
    pub fn value(mut self, placeholder: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(placeholder.into(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.expression.trim().is_empty()
    }
}

impl From<&str> for Expression {
    fn from(expression: &str) -> Self {
        Expression::new(expression)
    }
}

impl From<String> for Expression {
    fn from(expression: String) -> Self {
        Expression::new(expression)
    }
}

/// Placeholders of every expression in one request, merged.
///
/// Empty maps stay empty; callers omit them from the request rather than
/// sending an empty map.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Placeholders {
    pub names: BTreeMap<String, String>,
    pub values: Item,
}

impl Placeholders {
    pub fn merge<'a>(expressions: impl IntoIterator<Item = Option<&'a Expression>>) -> Self {
        let mut merged = Placeholders::default();
        for expression in expressions.into_iter().flatten() {
            merged.names.extend(
                expression
                    .names
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone())),
            );
            merged.values.extend(
                expression
                    .values
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone())),
            );
        }
        merged
    }

    pub fn names(&self) -> Option<&BTreeMap<String, String>> {
        (!self.names.is_empty()).then_some(&self.names)
    }

    pub fn values(&self) -> Option<&Item> {
        (!self.values.is_empty()).then_some(&self.values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let expr = Expression::new("#s = :s").name("#s", "status").value(":s", "open");
        assert_eq!(expr.names.get("#s").map(String::as_str), Some("status"));
        assert_eq!(expr.values.get(":s"), Some(&Value::from("open")));
        assert!(!expr.is_empty());
        assert!(Expression::default().is_empty());
    }

    #[test]
    fn test_merge_combines_and_omits_empty() {
        let key = Expression::new("id = :id").value(":id", 1);
        let filter = Expression::new("#t > :t").name("#t", "type").value(":t", 2);

        let merged = Placeholders::merge([Some(&key), None, Some(&filter)]);
        assert_eq!(merged.values.len(), 2);
        assert_eq!(merged.names().map(|n| n.len()), Some(1));

        let empty = Placeholders::merge([Some(&Expression::new("id = id"))]);
        assert!(empty.names().is_none());
        assert!(empty.values().is_none());
    }
}
