//! Storage backend implementations.
//!
//! This module provides concrete implementations of the [`ItemStore`] trait
//! defined in `tablekit_core::storage`. The implementations are selected at
//! compile time via feature flags and can be enabled together.
//!
//! # Feature Flags
//!
//! - `dynamodb` (default): AWS DynamoDB backend using `aws-sdk-dynamodb`
//! - `inmemory` (default): in-memory backend for tests and local development
//!
//! [`ItemStore`]: tablekit_core::storage::ItemStore

#[cfg(not(any(feature = "inmemory", feature = "dynamodb")))]
compile_error!(
    "No storage backend selected. Enable 'dynamodb' or 'inmemory' feature. \
    Example: cargo build -p tablekit --features dynamodb"
);

#[cfg(feature = "dynamodb")]
pub mod dynamodb;

#[cfg(feature = "inmemory")]
pub mod inmemory;

#[cfg(feature = "dynamodb")]
pub use dynamodb::DynamoDbStore;

#[cfg(feature = "inmemory")]
pub use inmemory::InMemoryStore;
