//! Table accessor.
//!
//! A [`Table<T>`] binds one store handle, one physical table name and one
//! record type. It converts between records and store items, shapes every
//! write for storage, pages through queries and scans, and chunks batch
//! reads. Store errors propagate unmodified unless a write is routed through
//! the retry executor.

mod pagination;
mod projection;
mod read;
mod write;

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use tablekit_core::model::{Item, Record};
use tablekit_core::storage::{
    DeleteItemRequest, Expression, ItemStore, PutItemRequest, Result, ReturnValues, TableName,
    UpdateExpression, UpdateItemRequest, WriteOutput,
};

use crate::config::Config;
use crate::retry::RetryPolicy;

pub use projection::{is_reserved, schema_projection, RESERVED_WORDS};

/// Options for single-item reads.
#[derive(Debug, Clone, Default)]
pub struct GetOptions {
    pub consistent_read: bool,
    /// Explicit projection. Defaults to the record's declared fields.
    pub projection: Option<Expression>,
}

/// Options for single-item puts.
#[derive(Debug, Clone, Default)]
pub struct PutOptions {
    pub condition: Option<Expression>,
    pub return_values: ReturnValues,
}

/// Options for updates.
#[derive(Debug, Clone, Default)]
pub struct UpdateOptions {
    pub condition: Option<Expression>,
    pub return_values: ReturnValues,
    /// Routes the update through the retry executor.
    pub retry: Option<RetryPolicy>,
}

/// Options for single-item deletes.
#[derive(Debug, Clone, Default)]
pub struct DeleteOptions {
    pub condition: Option<Expression>,
    pub return_values: ReturnValues,
}

/// Options for queries.
#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    pub index: Option<String>,
    pub filter: Option<Expression>,
    pub descending: bool,
    /// Stop once strictly more than this many items are collected. Zero
    /// disables the threshold.
    pub size_hint: usize,
    /// Stop once this many items are collected.
    pub limit: Option<usize>,
    pub projection: Option<Expression>,
    pub consistent_read: bool,
    /// Continuation token of a previous call.
    pub start_key: Option<Item>,
}

/// Options for scans.
#[derive(Debug, Clone, Default)]
pub struct ScanOptions {
    pub index: Option<String>,
    pub filter: Option<Expression>,
    /// Stop once strictly more than this many items are collected. Zero
    /// disables the threshold.
    pub size_hint: usize,
    /// Stop once this many items are collected.
    pub limit: Option<usize>,
    pub projection: Option<Expression>,
    pub consistent_read: bool,
    /// Continuation token of a previous call.
    pub start_key: Option<Item>,
}

/// Accumulated result of a paginated query or scan.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResult<T> {
    pub count: usize,
    /// Items examined by the store across every page, before filtering.
    pub scanned_count: usize,
    pub items: Vec<T>,
    /// Continuation token when the call stopped before the last page.
    pub last_evaluated_key: Option<Item>,
}

/// Untyped access to one physical table.
///
/// Transactions hold handles rather than typed tables so that one buffer can
/// span tables of different record types.
#[derive(Clone)]
pub struct TableHandle {
    store: Arc<dyn ItemStore>,
    name: TableName,
}

impl fmt::Debug for TableHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TableHandle")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl TableHandle {
    pub fn new(store: Arc<dyn ItemStore>, name: TableName) -> Self {
        Self { store, name }
    }

    pub fn name(&self) -> &TableName {
        &self.name
    }

    pub fn store(&self) -> &Arc<dyn ItemStore> {
        &self.store
    }

    /// Writes an already shaped item.
    pub async fn put_item(
        &self,
        item: Item,
        condition: Option<Expression>,
        return_values: ReturnValues,
    ) -> Result<WriteOutput> {
        self.store
            .put_item(PutItemRequest {
                table: self.name.clone(),
                item,
                condition,
                return_values,
            })
            .await
    }

    pub async fn update_item(
        &self,
        key: Item,
        update: UpdateExpression,
        condition: Option<Expression>,
        return_values: ReturnValues,
    ) -> Result<WriteOutput> {
        self.store
            .update_item(UpdateItemRequest {
                table: self.name.clone(),
                key,
                update,
                condition,
                return_values,
            })
            .await
    }

    pub async fn delete_item(
        &self,
        key: Item,
        condition: Option<Expression>,
        return_values: ReturnValues,
    ) -> Result<WriteOutput> {
        self.store
            .delete_item(DeleteItemRequest {
                table: self.name.clone(),
                key,
                condition,
                return_values,
            })
            .await
    }
}

/// Typed access to one table of `T` records.
pub struct Table<T> {
    handle: TableHandle,
    _record: PhantomData<fn() -> T>,
}

impl<T> Clone for Table<T> {
    fn clone(&self) -> Self {
        Self {
            handle: self.handle.clone(),
            _record: PhantomData,
        }
    }
}

impl<T> fmt::Debug for Table<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Table")
            .field("name", &self.handle.name)
            .finish_non_exhaustive()
    }
}

impl<T: Record> Table<T> {
    /// Binds `T` to the table `{environment}{suffix}`.
    pub fn new(store: Arc<dyn ItemStore>, environment: &str, suffix: &str) -> Self {
        Self {
            handle: TableHandle::new(store, TableName::new(environment, suffix)),
            _record: PhantomData,
        }
    }

    /// Binds `T` to `suffix`, prefixed with the configured environment.
    pub fn from_config(store: Arc<dyn ItemStore>, config: &Config, suffix: &str) -> Self {
        Self::new(store, &config.environment, suffix)
    }

    pub fn name(&self) -> &TableName {
        self.handle.name()
    }

    pub fn handle(&self) -> &TableHandle {
        &self.handle
    }

    fn store(&self) -> &dyn ItemStore {
        self.handle.store.as_ref()
    }

    /// Projection for typed reads: the explicit one, or every declared field.
    fn typed_projection(&self, explicit: Option<Expression>) -> Expression {
        explicit.unwrap_or_else(|| schema_projection(T::schema()))
    }

    fn to_records(items: Vec<Item>) -> Result<Vec<T>> {
        items.into_iter().map(T::from_superset).collect()
    }
}
