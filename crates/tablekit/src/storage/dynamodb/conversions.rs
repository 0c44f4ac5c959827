//! DynamoDB attribute conversion functions.
//!
//! Pure functions for converting between plain [`Value`]s and DynamoDB
//! `AttributeValue`s. These are testable in isolation without DynamoDB access.

use std::collections::HashMap;

use aws_sdk_dynamodb::primitives::Blob;
use aws_sdk_dynamodb::types::{AttributeValue, ReturnValue};
use tablekit_core::model::{format_float, Item, Value};
use tablekit_core::storage::{Placeholders, ReturnValues};

pub type AttributeMap = HashMap<String, AttributeValue>;

// ============================================================================
// Values
// ============================================================================

/// Convert a plain value to its typed wire form. Floats are sent as exact
/// decimal text.
pub fn value_to_attribute(value: &Value) -> AttributeValue {
    match value {
        Value::Null => AttributeValue::Null(true),
        Value::Bool(b) => AttributeValue::Bool(*b),
        Value::Int(i) => AttributeValue::N(i.to_string()),
        Value::Float(f) => AttributeValue::N(format_float(*f)),
        Value::Decimal(d) => AttributeValue::N(d.clone()),
        Value::String(s) => AttributeValue::S(s.clone()),
        Value::Binary(b) => AttributeValue::B(Blob::new(b.clone())),
        Value::List(values) => AttributeValue::L(values.iter().map(value_to_attribute).collect()),
        Value::Map(item) => AttributeValue::M(item_to_attributes(item)),
    }
}

/// Convert a typed wire value back to a plain value. Numbers come back as
/// [`Value::Decimal`].
///
/// `SS`, `NS` and `BS` sets come back as [`Value::List`], which
/// [`value_to_attribute`] writes as `L`. Putting back an item read from the
/// table therefore stores its set attributes as lists; use an update
/// expression to modify a set in place.
pub fn attribute_to_value(attribute: &AttributeValue) -> Value {
    match attribute {
        AttributeValue::Null(_) => Value::Null,
        AttributeValue::Bool(b) => Value::Bool(*b),
        AttributeValue::N(n) => Value::Decimal(n.clone()),
        AttributeValue::S(s) => Value::String(s.clone()),
        AttributeValue::B(b) => Value::Binary(b.as_ref().to_vec()),
        AttributeValue::L(values) => Value::List(values.iter().map(attribute_to_value).collect()),
        AttributeValue::M(map) => Value::Map(attributes_to_item(map)),
        AttributeValue::Ss(values) => {
            Value::List(values.iter().cloned().map(Value::String).collect())
        }
        AttributeValue::Ns(values) => {
            Value::List(values.iter().cloned().map(Value::Decimal).collect())
        }
        AttributeValue::Bs(values) => Value::List(
            values
                .iter()
                .map(|b| Value::Binary(b.as_ref().to_vec()))
                .collect(),
        ),
        _ => Value::Null,
    }
}

// ============================================================================
// Items
// ============================================================================

pub fn item_to_attributes(item: &Item) -> AttributeMap {
    item.iter()
        .map(|(name, value)| (name.clone(), value_to_attribute(value)))
        .collect()
}

pub fn attributes_to_item(attributes: &AttributeMap) -> Item {
    attributes
        .iter()
        .map(|(name, value)| (name.clone(), attribute_to_value(value)))
        .collect()
}

// ============================================================================
// Request fragments
// ============================================================================

/// Expression attribute names, omitted when empty.
pub fn attribute_names(placeholders: &Placeholders) -> Option<HashMap<String, String>> {
    placeholders.names().map(|names| {
        names
            .iter()
            .map(|(alias, name)| (alias.clone(), name.clone()))
            .collect()
    })
}

/// Expression attribute values, omitted when empty.
pub fn attribute_values(placeholders: &Placeholders) -> Option<AttributeMap> {
    placeholders.values().map(item_to_attributes)
}

pub fn return_value(return_values: ReturnValues) -> ReturnValue {
    match return_values {
        ReturnValues::None => ReturnValue::None,
        ReturnValues::AllOld => ReturnValue::AllOld,
        ReturnValues::UpdatedOld => ReturnValue::UpdatedOld,
        ReturnValues::AllNew => ReturnValue::AllNew,
        ReturnValues::UpdatedNew => ReturnValue::UpdatedNew,
    }
}

/// Page limit as the SDK expects it.
pub fn page_limit(limit: Option<usize>) -> Option<i32> {
    limit.map(|l| i32::try_from(l).unwrap_or(i32::MAX))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tablekit_core::item;
    use tablekit_core::storage::Expression;

    #[test]
    fn test_float_is_sent_as_exact_decimal() {
        assert_eq!(
            value_to_attribute(&Value::Float(3.14)),
            AttributeValue::N("3.14".to_string())
        );
        assert_eq!(
            attribute_to_value(&AttributeValue::N("3.14".to_string())),
            Value::Decimal("3.14".to_string())
        );
    }

    #[test]
    fn test_nested_item_conversion() {
        let item = item! {
            "id" => 7,
            "tags" => vec!["a", "b"],
            "owner" => item! { "name" => "ana", "active" => true },
        };

        let attributes = item_to_attributes(&item);
        assert_eq!(attributes["id"], AttributeValue::N("7".to_string()));
        assert_eq!(
            attributes["tags"],
            AttributeValue::L(vec![
                AttributeValue::S("a".to_string()),
                AttributeValue::S("b".to_string()),
            ])
        );

        let back = attributes_to_item(&attributes);
        assert_eq!(back["id"], Value::Decimal("7".to_string()));
        assert_eq!(back["owner"], Value::Map(item! { "name" => "ana", "active" => true }));
    }

    #[test]
    fn test_sets_are_read_and_written_as_lists() {
        let value = attribute_to_value(&AttributeValue::Ns(vec!["1".to_string(), "2.5".to_string()]));
        assert_eq!(
            value,
            Value::List(vec![
                Value::Decimal("1".to_string()),
                Value::Decimal("2.5".to_string()),
            ])
        );

        let written = value_to_attribute(&attribute_to_value(&AttributeValue::Ss(vec![
            "a".to_string(),
        ])));
        assert_eq!(
            written,
            AttributeValue::L(vec![AttributeValue::S("a".to_string())])
        );
    }

    #[test]
    fn test_empty_placeholders_are_omitted() {
        let projection = Expression::new("id,#status").name("#status", "status");
        let placeholders = Placeholders::merge([Some(&projection)]);

        assert_eq!(
            attribute_names(&placeholders),
            Some(HashMap::from([("#status".to_string(), "status".to_string())]))
        );
        assert!(attribute_values(&placeholders).is_none());
    }

    #[test]
    fn test_page_limit_saturates() {
        assert_eq!(page_limit(Some(25)), Some(25));
        assert_eq!(page_limit(Some(usize::MAX)), Some(i32::MAX));
        assert_eq!(page_limit(None), None);
    }
}
