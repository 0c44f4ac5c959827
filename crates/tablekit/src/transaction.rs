//! Transaction coordinator.
//!
//! A [`Transaction`] buffers put, update and delete operations across any
//! number of tables and issues them on [`Transaction::commit`]. A single
//! buffered operation is sent as a plain write. Anything larger goes out as
//! atomic multi-item writes of at most [`TRANSACT_WRITE_LIMIT`] actions each,
//! so atomicity only holds within a chunk. When a later chunk fails after an
//! earlier one succeeded, [`Transaction::partially_committed`] reports it.

use std::ops::AsyncFnOnce;
use std::sync::Arc;

use tablekit_core::model::{Item, Record, StorageItem};
use tablekit_core::storage::{
    ItemStore, Result, ReturnValues, TransactWriteItem, UpdateExpression, TRANSACT_WRITE_LIMIT,
};

use crate::table::{Table, TableHandle};

/// One buffered write and the table it targets.
#[derive(Debug, Clone)]
pub enum PendingOp {
    Put {
        table: TableHandle,
        item: Item,
    },
    Update {
        table: TableHandle,
        key: Item,
        update: UpdateExpression,
    },
    Delete {
        table: TableHandle,
        key: Item,
    },
}

impl PendingOp {
    fn table(&self) -> &TableHandle {
        match self {
            PendingOp::Put { table, .. }
            | PendingOp::Update { table, .. }
            | PendingOp::Delete { table, .. } => table,
        }
    }

    /// Issues the operation as a plain single-item write.
    async fn apply(self) -> Result<()> {
        match self {
            PendingOp::Put { table, item } => {
                table.put_item(item, None, ReturnValues::None).await?;
            }
            PendingOp::Update { table, key, update } => {
                table
                    .update_item(key, update, None, ReturnValues::None)
                    .await?;
            }
            PendingOp::Delete { table, key } => {
                table.delete_item(key, None, ReturnValues::None).await?;
            }
        }
        Ok(())
    }

    fn into_action(self) -> TransactWriteItem {
        match self {
            PendingOp::Put { table, item } => TransactWriteItem::Put {
                table: table.name().clone(),
                item,
                condition: None,
            },
            PendingOp::Update { table, key, update } => TransactWriteItem::Update {
                table: table.name().clone(),
                key,
                update,
                condition: None,
            },
            PendingOp::Delete { table, key } => TransactWriteItem::Delete {
                table: table.name().clone(),
                key,
                condition: None,
            },
        }
    }
}

/// Multi-table write buffer.
pub struct Transaction {
    store: Arc<dyn ItemStore>,
    ops: Vec<PendingOp>,
    partially_committed: bool,
}

impl std::fmt::Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("ops", &self.ops)
            .field("partially_committed", &self.partially_committed)
            .finish_non_exhaustive()
    }
}

impl Transaction {
    pub fn new(store: Arc<dyn ItemStore>) -> Self {
        Self {
            store,
            ops: Vec::new(),
            partially_committed: false,
        }
    }

    /// Runs `body` with a fresh transaction and commits whatever it buffered,
    /// whether `body` returns normally or with an error.
    ///
    /// A body error wins over a commit error; the commit error is logged.
    pub async fn scope<R>(
        store: Arc<dyn ItemStore>,
        body: impl AsyncFnOnce(&mut Transaction) -> Result<R>,
    ) -> Result<R> {
        let mut tx = Transaction::new(store);
        let outcome = body(&mut tx).await;
        let committed = tx.commit().await;

        match (outcome, committed) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(e)) => Err(e),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(commit_error)) => {
                tracing::error!(
                    error = %commit_error,
                    "Commit failed while leaving a transaction scope with an error"
                );
                Err(e)
            }
        }
    }

    /// Buffers a put of a record or raw item. The item is shaped for storage
    /// now, not at commit time.
    pub fn put<T, I>(&mut self, table: &Table<T>, item: &I) -> &mut Self
    where
        T: Record,
        I: StorageItem + ?Sized,
    {
        self.push(PendingOp::Put {
            table: table.handle().clone(),
            item: item.storage_item(),
        })
    }

    pub fn update<T: Record>(
        &mut self,
        table: &Table<T>,
        key: Item,
        update: UpdateExpression,
    ) -> &mut Self {
        self.push(PendingOp::Update {
            table: table.handle().clone(),
            key,
            update,
        })
    }

    pub fn delete<T: Record>(&mut self, table: &Table<T>, key: Item) -> &mut Self {
        self.push(PendingOp::Delete {
            table: table.handle().clone(),
            key,
        })
    }

    /// Buffers an already built operation.
    pub fn push(&mut self, op: PendingOp) -> &mut Self {
        self.ops.push(op);
        self
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn pending(&self) -> &[PendingOp] {
        &self.ops
    }

    /// True when at least one chunk of the last commit was applied and a
    /// later one was not.
    pub fn partially_committed(&self) -> bool {
        self.partially_committed
    }

    /// Issues every buffered operation and drains the buffer.
    pub async fn commit(&mut self) -> Result<()> {
        let mut ops = std::mem::take(&mut self.ops);
        self.partially_committed = false;

        match ops.len() {
            0 => return Ok(()),
            1 => {
                if let Some(op) = ops.pop() {
                    tracing::debug!(table = %op.table().name(), "Committing single operation");
                    op.apply().await?;
                }
                return Ok(());
            }
            _ => {}
        }

        let chunks = ops.len().div_ceil(TRANSACT_WRITE_LIMIT);
        let mut remaining: Vec<TransactWriteItem> =
            ops.into_iter().map(PendingOp::into_action).collect();

        for chunk in 0..chunks {
            let rest = remaining.split_off(remaining.len().min(TRANSACT_WRITE_LIMIT));
            let actions = std::mem::replace(&mut remaining, rest);
            let size = actions.len();

            if let Err(e) = self.store.transact_write_items(actions).await {
                tracing::error!(
                    chunk,
                    chunks,
                    code = e.code().unwrap_or("none"),
                    partially_committed = self.partially_committed,
                    "Transaction chunk failed"
                );
                return Err(e);
            }

            self.partially_committed = chunk + 1 < chunks;
            tracing::debug!(chunk, chunks, size, "Committed transaction chunk");
        }
        Ok(())
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if !self.ops.is_empty() {
            tracing::warn!(
                pending = self.ops.len(),
                "Transaction dropped with uncommitted operations"
            );
        }
    }
}

/// Write buffer bound to a single table.
#[derive(Debug)]
pub struct TableTransaction<T> {
    table: Table<T>,
    inner: Transaction,
}

impl<T: Record> TableTransaction<T> {
    pub fn new(table: Table<T>) -> Self {
        let inner = Transaction::new(table.handle().store().clone());
        Self { table, inner }
    }

    pub fn put<I: StorageItem + ?Sized>(&mut self, item: &I) -> &mut Self {
        self.inner.put(&self.table, item);
        self
    }

    pub fn update(&mut self, key: Item, update: UpdateExpression) -> &mut Self {
        self.inner.update(&self.table, key, update);
        self
    }

    pub fn delete(&mut self, key: Item) -> &mut Self {
        self.inner.delete(&self.table, key);
        self
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn partially_committed(&self) -> bool {
        self.inner.partially_committed()
    }

    pub async fn commit(&mut self) -> Result<()> {
        self.inner.commit().await
    }
}

impl<T: Record> Table<T> {
    /// Starts a write buffer for this table.
    pub fn transaction(&self) -> TableTransaction<T> {
        TableTransaction::new(self.clone())
    }
}
