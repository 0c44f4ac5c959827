//! The record contract.
//!
//! A record type declares its [`Schema`] once and converts between itself and
//! a coerced field map. Everything else (defensive construction, storage
//! shaping, validation) is provided on top of those three functions.
//!
//! ```
//! use std::sync::OnceLock;
//! use tablekit_core::item;
//! use tablekit_core::model::{ConversionError, FieldSpec, Fields, Item, Record, Schema};
//!
//! #[derive(Debug, Clone, PartialEq)]
//! struct Stadium {
//!     id: i64,
//!     name: String,
//! }
//!
//! impl Record for Stadium {
//!     fn schema() -> &'static Schema {
//!         static SCHEMA: OnceLock<Schema> = OnceLock::new();
//!         SCHEMA.get_or_init(|| {
//!             Schema::new(
//!                 "Stadium",
//!                 vec![FieldSpec::int("id").required(), FieldSpec::string("name")],
//!             )
//!         })
//!     }
//!
//!     fn from_fields(mut fields: Fields) -> Result<Self, ConversionError> {
//!         Ok(Self {
//!             id: fields.int("id")?,
//!             name: fields.string("name")?,
//!         })
//!     }
//!
//!     fn to_fields(&self) -> Item {
//!         item! { "id" => self.id, "name" => &self.name }
//!     }
//! }
//!
//! let stadium = Stadium::from_superset(item! { "id" => "3", "capacity" => 100 }).unwrap();
//! assert_eq!(stadium, Stadium { id: 3, name: String::new() });
//! ```

use super::error::ConversionError;
use super::schema::Schema;
use super::validation::Validation;
use super::value::{format_float, Item, Value};
use crate::storage::DataError;

/// Builds an [`Item`] from `name => value` pairs.
#[macro_export]
macro_rules! item {
    () => {
        $crate::model::Item::new()
    };
    ($($name:expr => $value:expr),+ $(,)?) => {{
        let mut item = $crate::model::Item::new();
        $(
            item.insert(
                ::std::string::String::from($name),
                $crate::model::Value::from($value),
            );
        )+
        item
    }};
}

/// A typed, schema-bound representation of one table row.
pub trait Record: Sized + Clone + Send + Sync + 'static {
    /// The schema of this record type, built once and reused.
    fn schema() -> &'static Schema;

    /// Builds the record from a map that has already been coerced against
    /// [`Record::schema`]: every declared field is present.
    fn from_fields(fields: Fields) -> Result<Self, ConversionError>;

    /// All declared fields, including empty ones.
    fn to_fields(&self) -> Item;

    /// Builds a record from a map that may carry keys outside the declared
    /// field set. Unknown keys are discarded.
    fn from_superset(item: Item) -> Result<Self, DataError> {
        let schema = Self::schema();
        let coerced = schema.coerce(item)?;
        Ok(Self::from_fields(Fields::new(schema.name(), coerced))?)
    }

    /// Strict constructor: rejects keys outside the declared field set.
    fn from_item(item: Item) -> Result<Self, DataError> {
        let schema = Self::schema();
        if let Some(field) = schema.unknown_fields(&item).into_iter().next() {
            return Err(DataError::UnknownField {
                record: schema.name(),
                field,
            });
        }
        Self::from_superset(item)
    }

    /// Plain map of every field.
    fn to_dict(&self) -> Item {
        self.to_fields()
    }

    /// Storage-ready map: empty strings and `Null` removed recursively,
    /// floats converted to exact decimals.
    fn to_storage_dict(&self) -> Item {
        storage_dict(self.to_fields())
    }

    /// Evaluates the declared validation rules. Never runs implicitly.
    fn validate(&self) -> Validation {
        Self::schema().validate(&self.to_fields())
    }
}

/// Anything that can be written as one table row: a record or a raw map.
pub trait StorageItem {
    /// The storage-ready map. See [`Record::to_storage_dict`].
    fn storage_item(&self) -> Item;
}

impl<R: Record> StorageItem for R {
    fn storage_item(&self) -> Item {
        self.to_storage_dict()
    }
}

impl StorageItem for Item {
    fn storage_item(&self) -> Item {
        storage_dict(self.clone())
    }
}

/// Shapes an arbitrary map for storage. See [`Record::to_storage_dict`].
pub fn storage_dict(item: Item) -> Item {
    item.into_iter()
        .filter(|(_, value)| !value.is_absent())
        .map(|(name, value)| (name, storage_value(value)))
        .collect()
}

fn storage_value(value: Value) -> Value {
    match value {
        Value::Float(f) => Value::Decimal(format_float(f)),
        Value::Map(map) => Value::Map(storage_dict(map)),
        Value::List(values) => Value::List(values.into_iter().map(storage_value).collect()),
        other => other,
    }
}

/// Conversion from a coerced [`Value`] to a Rust field type.
pub trait FromValue: Sized {
    const TARGET: &'static str;

    fn from_value(value: Value) -> Option<Self>;
}

impl FromValue for String {
    const TARGET: &'static str = "str";

    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(s),
            _ => None,
        }
    }
}

impl FromValue for i64 {
    const TARGET: &'static str = "int";

    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Int(i) => Some(i),
            _ => None,
        }
    }
}

impl FromValue for f64 {
    const TARGET: &'static str = "float";

    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Float(f) => Some(f),
            Value::Int(i) => Some(i as f64),
            _ => None,
        }
    }
}

impl FromValue for bool {
    const TARGET: &'static str = "bool";

    fn from_value(value: Value) -> Option<Self> {
        value.as_bool()
    }
}

impl FromValue for Value {
    const TARGET: &'static str = "any";

    fn from_value(value: Value) -> Option<Self> {
        Some(value)
    }
}

/// Coerced field values handed to [`Record::from_fields`].
#[derive(Debug, Clone)]
pub struct Fields {
    record: &'static str,
    values: Item,
}

impl Fields {
    pub fn new(record: &'static str, values: Item) -> Self {
        Self { record, values }
    }

    /// Name of the record type the values belong to.
    pub fn record_name(&self) -> &'static str {
        self.record
    }

    /// Removes and returns the raw value of `name` (`Null` when missing).
    pub fn value(&mut self, name: &str) -> Value {
        self.values.remove(name).unwrap_or(Value::Null)
    }

    /// The values not taken yet.
    pub fn into_values(self) -> Item {
        self.values
    }

    fn required<T: FromValue>(&mut self, name: &str) -> Result<T, ConversionError> {
        match self.value(name) {
            Value::Null => Err(ConversionError::new(name, T::TARGET, "value is absent")),
            other => {
                let kind = other.type_name();
                T::from_value(other).ok_or_else(|| {
                    ConversionError::new(name, T::TARGET, format!("unexpected {kind} value"))
                })
            }
        }
    }

    fn optional<T: FromValue>(&mut self, name: &str) -> Result<Option<T>, ConversionError> {
        match self.value(name) {
            Value::Null => Ok(None),
            other => {
                let kind = other.type_name();
                T::from_value(other).map(Some).ok_or_else(|| {
                    ConversionError::new(name, T::TARGET, format!("unexpected {kind} value"))
                })
            }
        }
    }

    /// A string field; absent reads as the empty string, matching storage
    /// where the two are indistinguishable.
    pub fn string(&mut self, name: &str) -> Result<String, ConversionError> {
        Ok(self.optional::<String>(name)?.unwrap_or_default())
    }

    pub fn opt_string(&mut self, name: &str) -> Result<Option<String>, ConversionError> {
        self.optional(name)
    }

    pub fn int(&mut self, name: &str) -> Result<i64, ConversionError> {
        self.required(name)
    }

    pub fn opt_int(&mut self, name: &str) -> Result<Option<i64>, ConversionError> {
        self.optional(name)
    }

    pub fn float(&mut self, name: &str) -> Result<f64, ConversionError> {
        self.required(name)
    }

    pub fn opt_float(&mut self, name: &str) -> Result<Option<f64>, ConversionError> {
        self.optional(name)
    }

    pub fn bool(&mut self, name: &str) -> Result<bool, ConversionError> {
        self.required(name)
    }

    pub fn opt_bool(&mut self, name: &str) -> Result<Option<bool>, ConversionError> {
        self.optional(name)
    }

    /// A list field; absent reads as an empty list.
    pub fn list<T: FromValue>(&mut self, name: &str) -> Result<Vec<T>, ConversionError> {
        Ok(self.opt_list(name)?.unwrap_or_default())
    }

    pub fn opt_list<T: FromValue>(&mut self, name: &str) -> Result<Option<Vec<T>>, ConversionError> {
        match self.value(name) {
            Value::Null => Ok(None),
            Value::List(values) => values
                .into_iter()
                .map(|v| {
                    let kind = v.type_name();
                    T::from_value(v).ok_or_else(|| {
                        ConversionError::new(name, T::TARGET, format!("unexpected {kind} element"))
                    })
                })
                .collect::<Result<Vec<_>, _>>()
                .map(Some),
            other => Err(ConversionError::new(
                name,
                "list",
                format!("unexpected {} value", other.type_name()),
            )),
        }
    }

    /// A nested record field.
    pub fn record<R: Record>(&mut self, name: &str) -> Result<Option<R>, ConversionError> {
        match self.value(name) {
            Value::Null => Ok(None),
            Value::Map(map) => R::from_fields(Fields::new(R::schema().name(), map)).map(Some),
            other => Err(ConversionError::new(
                name,
                R::schema().name(),
                format!("unexpected {} value", other.type_name()),
            )),
        }
    }

    /// A list of nested records; absent reads as an empty list.
    pub fn records<R: Record>(&mut self, name: &str) -> Result<Vec<R>, ConversionError> {
        match self.value(name) {
            Value::Null => Ok(Vec::new()),
            Value::List(values) => values
                .into_iter()
                .map(|v| match v {
                    Value::Map(map) => R::from_fields(Fields::new(R::schema().name(), map)),
                    other => Err(ConversionError::new(
                        name,
                        R::schema().name(),
                        format!("unexpected {} element", other.type_name()),
                    )),
                })
                .collect(),
            other => Err(ConversionError::new(
                name,
                "list",
                format!("unexpected {} value", other.type_name()),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FieldSpec, FieldType};
    use std::sync::OnceLock;

    #[derive(Debug, Clone, PartialEq)]
    struct Ingredient {
        name: String,
        grams: Option<f64>,
    }

    impl Record for Ingredient {
        fn schema() -> &'static Schema {
            static SCHEMA: OnceLock<Schema> = OnceLock::new();
            SCHEMA.get_or_init(|| {
                Schema::new(
                    "Ingredient",
                    vec![
                        FieldSpec::string("name").required(),
                        FieldSpec::optional("grams", FieldType::Float),
                    ],
                )
            })
        }

        fn from_fields(mut fields: Fields) -> Result<Self, ConversionError> {
            Ok(Self {
                name: fields.string("name")?,
                grams: fields.opt_float("grams")?,
            })
        }

        fn to_fields(&self) -> Item {
            crate::item! { "name" => &self.name, "grams" => self.grams }
        }
    }

    #[derive(Debug, Clone, PartialEq)]
    struct Recipe {
        id: String,
        recipe_name: String,
        description: String,
        calories: Option<i64>,
        protein: f64,
        vegan: bool,
        tags: Vec<String>,
        ingredients: Vec<Ingredient>,
        main: Option<Ingredient>,
    }

    fn ingredient_schema() -> &'static Schema {
        Ingredient::schema()
    }

    impl Record for Recipe {
        fn schema() -> &'static Schema {
            static SCHEMA: OnceLock<Schema> = OnceLock::new();
            SCHEMA.get_or_init(|| {
                Schema::new(
                    "Recipe",
                    vec![
                        FieldSpec::string("id").required(),
                        FieldSpec::string("recipeName").required(),
                        FieldSpec::string("description"),
                        FieldSpec::optional("calories", FieldType::Int),
                        FieldSpec::float("protein"),
                        FieldSpec::bool("vegan"),
                        FieldSpec::list("tags", FieldType::String),
                        FieldSpec::list("ingredients", FieldType::Record(ingredient_schema)),
                        FieldSpec::nested("main", ingredient_schema),
                    ],
                )
            })
        }

        fn from_fields(mut fields: Fields) -> Result<Self, ConversionError> {
            Ok(Self {
                id: fields.string("id")?,
                recipe_name: fields.string("recipeName")?,
                description: fields.string("description")?,
                calories: fields.opt_int("calories")?,
                protein: fields.float("protein")?,
                vegan: fields.bool("vegan")?,
                tags: fields.list("tags")?,
                ingredients: fields.records("ingredients")?,
                main: fields.record("main")?,
            })
        }

        fn to_fields(&self) -> Item {
            crate::item! {
                "id" => &self.id,
                "recipeName" => &self.recipe_name,
                "description" => &self.description,
                "calories" => self.calories,
                "protein" => self.protein,
                "vegan" => self.vegan,
                "tags" => self.tags.clone(),
                "ingredients" => self.ingredients.iter().map(Record::to_fields).collect::<Vec<_>>(),
                "main" => self.main.as_ref().map(Record::to_fields),
            }
        }
    }

    fn sample() -> Recipe {
        Recipe {
            id: "r1".to_string(),
            recipe_name: "Pancakes".to_string(),
            description: String::new(),
            calories: None,
            protein: 3.14,
            vegan: false,
            tags: vec!["breakfast".to_string()],
            ingredients: vec![Ingredient {
                name: "flour".to_string(),
                grams: Some(120.5),
            }],
            main: Some(Ingredient {
                name: "egg".to_string(),
                grams: None,
            }),
        }
    }

    #[test]
    fn test_storage_dict_drops_empty_and_converts_floats() {
        let stored = sample().to_storage_dict();

        assert!(!stored.contains_key("description"));
        assert!(!stored.contains_key("calories"));
        assert_eq!(stored.get("protein"), Some(&Value::Decimal("3.14".to_string())));
        assert_eq!(stored.get("vegan"), Some(&Value::Bool(false)));

        let main = stored.get("main").and_then(Value::as_map).unwrap();
        assert!(!main.contains_key("grams"));

        let first = &stored.get("ingredients").and_then(Value::as_list).unwrap()[0];
        assert_eq!(
            first.as_map().unwrap().get("grams"),
            Some(&Value::Decimal("120.5".to_string()))
        );
    }

    #[test]
    fn test_round_trip_is_exact_and_restores_defaults() {
        let original = sample();
        let restored = Recipe::from_superset(original.to_storage_dict()).unwrap();

        assert_eq!(restored.protein, 3.14);
        assert_eq!(restored.description, "");
        assert_eq!(restored, original);
    }

    #[test]
    fn test_from_superset_ignores_unknown_keys() {
        let mut stored = sample().to_storage_dict();
        stored.insert("legacyField".to_string(), Value::from("x"));

        assert!(Recipe::from_superset(stored.clone()).is_ok());
        assert!(matches!(
            Recipe::from_item(stored),
            Err(DataError::UnknownField { field, .. }) if field == "legacyField"
        ));
    }

    #[test]
    fn test_empty_numeric_string_is_absent_not_zero() {
        let recipe = Recipe::from_superset(crate::item! {
            "id" => "r2",
            "recipeName" => "Soup",
            "calories" => "",
        })
        .unwrap();
        assert_eq!(recipe.calories, None);
    }

    #[test]
    fn test_conversion_error_propagates() {
        let err = Recipe::from_superset(crate::item! { "protein" => "lots" }).unwrap_err();
        match err {
            DataError::Conversion(e) => {
                assert_eq!(e.field, "protein");
                assert_eq!(e.target, "float");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_raw_items_are_shaped_like_records() {
        let raw = crate::item! { "id" => "r4", "note" => "", "ratio" => 0.5, "count" => 0 };
        assert_eq!(
            raw.storage_item(),
            crate::item! {
                "id" => "r4",
                "ratio" => Value::Decimal("0.5".to_string()),
                "count" => 0,
            }
        );
    }

    #[test]
    fn test_validate_does_not_run_on_construction() {
        let recipe = Recipe::from_superset(crate::item! { "id" => "r3" }).unwrap();
        let validation = recipe.validate();

        assert!(!validation.is_valid());
        assert_eq!(validation.errors()["recipeName"].error, "field required");
        assert!(sample().validate().is_valid());
    }
}
