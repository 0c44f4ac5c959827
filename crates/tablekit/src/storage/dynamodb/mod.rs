//! DynamoDB storage backend implementation.
//!
//! This module provides a DynamoDB-based implementation of the item-store
//! contract using `aws-sdk-dynamodb`.

mod conversions;
mod error;
mod store;

pub use conversions::{attribute_to_value, attributes_to_item, item_to_attributes, value_to_attribute};
pub use error::map_sdk_error;
pub use store::DynamoDbStore;
