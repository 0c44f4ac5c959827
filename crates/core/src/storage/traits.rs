use async_trait::async_trait;

use crate::model::Item;

use super::types::{
    BatchGetOutput, BatchGetRequest, DeleteItemRequest, GetItemRequest, Page, PutItemRequest,
    QueryRequest, ScanRequest, TransactWriteItem, UpdateItemRequest, WriteOutput, WriteRequest,
};
use super::{Result, TableName};

/// Maximum number of keys in one batch read.
pub const BATCH_GET_LIMIT: usize = 100;

/// Maximum number of actions in one atomic multi-item write.
pub const TRANSACT_WRITE_LIMIT: usize = 100;

/// Native item operations of a key-value store with DynamoDB semantics.
///
/// Every method maps to exactly one store call, except
/// [`ItemStore::batch_write_item`], which flushes in store-sized batches and
/// resends unprocessed entries until the whole buffer is written.
#[async_trait]
pub trait ItemStore: Send + Sync {
    /// Reads one item by primary key. Absent items are `None`.
    async fn get_item(&self, request: GetItemRequest) -> Result<Option<Item>>;

    /// Reads up to [`BATCH_GET_LIMIT`] items. Order of the returned items is
    /// unspecified.
    async fn batch_get_item(&self, request: BatchGetRequest) -> Result<BatchGetOutput>;

    async fn put_item(&self, request: PutItemRequest) -> Result<WriteOutput>;

    /// Writes every request of the buffer.
    async fn batch_write_item(&self, table: &TableName, requests: Vec<WriteRequest>) -> Result<()>;

    async fn update_item(&self, request: UpdateItemRequest) -> Result<WriteOutput>;

    async fn delete_item(&self, request: DeleteItemRequest) -> Result<WriteOutput>;

    /// Reads one page of a query.
    async fn query(&self, request: QueryRequest) -> Result<Page>;

    /// Reads one page of a scan.
    async fn scan(&self, request: ScanRequest) -> Result<Page>;

    /// Applies up to [`TRANSACT_WRITE_LIMIT`] actions atomically.
    async fn transact_write_items(&self, items: Vec<TransactWriteItem>) -> Result<()>;
}
