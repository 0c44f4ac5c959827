//! In-memory storage backend for testing.
//!
//! This module provides an in-memory implementation of the [`ItemStore`]
//! trait that keeps every table in a vector wrapped in `Arc<RwLock<_>>`. It
//! counts calls per operation and can be scripted to fail specific calls,
//! which makes it the test double for every layer above the store.
//!
//! # Example
//!
//! ```rust,ignore
//! use tablekit::storage::inmemory::{InMemoryStore, Operation};
//!
//! let store = InMemoryStore::new().with_page_size(10);
//! // Use store for testing...
//! assert_eq!(store.calls(Operation::Scan), 0);
//! ```
//!
//! [`ItemStore`]: tablekit_core::storage::ItemStore

mod store;

pub use store::{InMemoryStore, Operation};
