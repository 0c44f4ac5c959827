//! Default projections.
//!
//! Reads that do not name a projection fetch exactly the record's declared
//! fields. Field names that collide with store reserved words are aliased as
//! `#name` through expression attribute names.

use tablekit_core::model::Schema;
use tablekit_core::storage::Expression;

/// Attribute names the store rejects inside expressions.
pub const RESERVED_WORDS: &[&str] = &[
    "timestamp",
    "location",
    "value",
    "length",
    "breadth",
    "url",
    "status",
    "action",
    "uuid",
    "segment",
    "type",
    "error",
    "ttl",
    "dateTime",
];

pub fn is_reserved(name: &str) -> bool {
    RESERVED_WORDS.contains(&name)
}

/// Projection of every declared field of `schema`.
pub fn schema_projection(schema: &Schema) -> Expression {
    let mut projection = Expression::default();
    let fields: Vec<String> = schema
        .field_names()
        .map(|name| {
            if is_reserved(name) {
                let alias = format!("#{name}");
                projection.names.insert(alias.clone(), name.to_string());
                alias
            } else {
                name.to_string()
            }
        })
        .collect();
    projection.expression = fields.join(",");
    projection
}

#[cfg(test)]
mod tests {
    use super::*;
    use tablekit_core::model::FieldSpec;

    #[test]
    fn test_reserved_fields_are_aliased() {
        let schema = Schema::new(
            "Match",
            vec![
                FieldSpec::string("id"),
                FieldSpec::string("status"),
                FieldSpec::string("dateTime"),
                FieldSpec::int("score"),
            ],
        );

        let projection = schema_projection(&schema);

        assert_eq!(projection.expression, "id,#status,#dateTime,score");
        assert_eq!(projection.names.len(), 2);
        assert_eq!(projection.names["#status"], "status");
        assert!(projection.values.is_empty());
    }

    #[test]
    fn test_no_reserved_fields_means_no_names() {
        let schema = Schema::new("Team", vec![FieldSpec::string("id"), FieldSpec::string("name")]);
        let projection = schema_projection(&schema);

        assert_eq!(projection.expression, "id,name");
        assert!(projection.names.is_empty());
    }
}
