//! Typed data-access layer over DynamoDB.
//!
//! - [`table`]: typed table accessor with pagination, batching and projection.
//! - [`retry`]: retry executor for store calls that fail with client errors.
//! - [`transaction`]: buffered multi-table writes, committed in atomic chunks.
//! - [`cache`]: read-through cache with a single freshness window.
//! - [`storage`]: the DynamoDB and in-memory implementations of
//!   [`ItemStore`](tablekit_core::storage::ItemStore).
//!
//! Records are declared with [`tablekit_core::model::Record`].

pub mod cache;
pub mod config;
pub mod retry;
pub mod storage;
pub mod table;
pub mod transaction;

pub use cache::CachedTable;
pub use config::Config;
pub use retry::RetryPolicy;
pub use table::{
    DeleteOptions, GetOptions, PutOptions, QueryOptions, QueryResult, ScanOptions, Table,
    TableHandle, UpdateOptions,
};
pub use transaction::{PendingOp, TableTransaction, Transaction};
