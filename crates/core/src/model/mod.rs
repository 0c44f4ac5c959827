//! Record model: values, schemas, coercion and validation.

mod error;
mod record;
mod schema;
mod validation;
mod value;

pub use error::ConversionError;
pub use record::{storage_dict, Fields, FromValue, Record, StorageItem};
pub use schema::{FieldKind, FieldSpec, FieldType, Schema, SchemaRef};
pub use validation::{FieldError, Validation};
pub use value::{format_float, key, key_fingerprint, key_matches, Item, Value};
