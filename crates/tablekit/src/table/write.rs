use tablekit_core::model::{Item, Record, StorageItem};
use tablekit_core::storage::{Result, UpdateExpression, WriteOutput, WriteRequest};

use super::{DeleteOptions, PutOptions, Table, UpdateOptions};
use crate::retry;

impl<T: Record> Table<T> {
    /// Inserts or overwrites one item: a record or a raw map. Empty and
    /// `Null` fields are stripped first; the record is not validated.
    pub async fn put<I>(&self, item: &I, options: PutOptions) -> Result<WriteOutput>
    where
        I: StorageItem + ?Sized,
    {
        self.handle
            .put_item(item.storage_item(), options.condition, options.return_values)
            .await
    }

    /// Inserts or overwrites many items through the store's buffered batch
    /// write.
    pub async fn put_batch<I: StorageItem>(&self, items: &[I]) -> Result<()> {
        let requests: Vec<WriteRequest> = items
            .iter()
            .map(|item| WriteRequest::Put(item.storage_item()))
            .collect();
        tracing::debug!(table = %self.name(), items = requests.len(), "Batch put");
        self.store().batch_write_item(self.name(), requests).await
    }

    /// Deletes many items by key through the store's buffered batch write.
    pub async fn delete_batch(&self, keys: &[Item]) -> Result<()> {
        let requests: Vec<WriteRequest> = keys.iter().cloned().map(WriteRequest::Delete).collect();
        tracing::debug!(table = %self.name(), items = requests.len(), "Batch delete");
        self.store().batch_write_item(self.name(), requests).await
    }

    /// Applies an update expression to one item, optionally under a retry
    /// policy.
    pub async fn update(
        &self,
        key: Item,
        update: UpdateExpression,
        options: UpdateOptions,
    ) -> Result<WriteOutput> {
        let UpdateOptions {
            condition,
            return_values,
            retry,
        } = options;

        retry::execute(retry.as_ref(), self.name(), || {
            self.handle
                .update_item(key.clone(), update.clone(), condition.clone(), return_values)
        })
        .await
    }

    /// Deletes one item. With `ReturnValues::AllOld`, a missing
    /// `attributes` payload means nothing matched the key.
    pub async fn delete(&self, key: Item, options: DeleteOptions) -> Result<WriteOutput> {
        self.handle
            .delete_item(key, options.condition, options.return_values)
            .await
    }
}

#[cfg(all(test, feature = "inmemory"))]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::retry::RetryPolicy;
    use crate::storage::inmemory::{InMemoryStore, Operation};
    use crate::table::fixtures::{seeded, team_key, teams, Team};
    use crate::table::GetOptions;
    use tablekit_core::item;
    use tablekit_core::model::Value;
    use tablekit_core::storage::{DataError, Expression, ReturnValues};

    const THROTTLED: &str = "ProvisionedThroughputExceededException";

    #[tokio::test]
    async fn test_put_strips_empty_fields_and_stores_decimals() {
        let store = InMemoryStore::new();
        let table = teams(&store);
        let mut team = Team::new(1, "Peñarol");
        team.status = String::new();
        team.rating = Some(3.14);

        table.put(&team, PutOptions::default()).await.unwrap();

        let stored = &store.items(table.name()).await[0];
        assert!(!stored.contains_key("status"));
        assert_eq!(stored["rating"], Value::Decimal("3.14".to_string()));

        let read = table.get(team_key(1), GetOptions::default()).await.unwrap();
        assert_eq!(read, Some(team));
    }

    #[tokio::test]
    async fn test_put_raw_item() {
        let store = InMemoryStore::new();
        let table = teams(&store);

        table
            .put(&item! { "id" => 5, "name" => "raw", "note" => "" }, PutOptions::default())
            .await
            .unwrap();

        assert_eq!(
            store.items(table.name()).await,
            vec![item! { "id" => 5, "name" => "raw" }]
        );
    }

    #[tokio::test]
    async fn test_conditional_put_failure_surfaces_code() {
        let store = InMemoryStore::new();
        let table = seeded(&store, 1).await;

        let err = table
            .put(
                &Team::new(1, "again"),
                PutOptions {
                    condition: Some(Expression::new("attribute_not_exists(id)")),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();

        assert!(err.is_conditional_check_failed());
    }

    #[tokio::test]
    async fn test_put_and_delete_batch() {
        let store = InMemoryStore::new();
        let table = teams(&store);

        let batch: Vec<Team> = (1..=30).map(|id| Team::new(id, "t")).collect();
        table.put_batch(&batch).await.unwrap();
        assert_eq!(store.items(table.name()).await.len(), 30);

        let keys: Vec<Item> = (1..=10).map(team_key).collect();
        table.delete_batch(&keys).await.unwrap();
        assert_eq!(store.items(table.name()).await.len(), 20);
        assert_eq!(store.calls(Operation::BatchWriteItem), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_update_retries_until_exhausted() {
        let store = InMemoryStore::new();
        let table = seeded(&store, 1).await;
        for call in 1..=3 {
            store
                .fail_call(Operation::UpdateItem, call, DataError::client(THROTTLED, "slow down"))
                .await;
        }

        let err = table
            .update(
                team_key(1),
                Expression::new("SET #n = :n").name("#n", "name").value(":n", "x"),
                UpdateOptions {
                    retry: Some(RetryPolicy::new(2).retry_on(THROTTLED)),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();

        assert_eq!(err.code(), Some(THROTTLED));
        assert_eq!(store.calls(Operation::UpdateItem), 3);
    }

    #[tokio::test]
    async fn test_update_without_policy_fails_once() {
        let store = InMemoryStore::new();
        let table = seeded(&store, 1).await;
        store
            .fail_next(Operation::UpdateItem, DataError::client(THROTTLED, "slow down"))
            .await;

        let result = table
            .update(
                team_key(1),
                Expression::new("SET #n = :n").name("#n", "name").value(":n", "x"),
                UpdateOptions::default(),
            )
            .await;

        assert!(result.is_err());
        assert_eq!(store.calls(Operation::UpdateItem), 1);
    }

    #[tokio::test]
    async fn test_update_recovers_with_retry_policy() {
        let store = InMemoryStore::new();
        let table = seeded(&store, 1).await;
        store
            .fail_next(Operation::UpdateItem, DataError::client(THROTTLED, "slow down"))
            .await;

        let output = table
            .update(
                team_key(1),
                Expression::new("SET #n = :n").name("#n", "name").value(":n", "renamed"),
                UpdateOptions {
                    return_values: ReturnValues::UpdatedNew,
                    retry: Some(RetryPolicy::new(1).with_delay(Duration::ZERO)),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(output.attributes, Some(item! { "name" => "renamed" }));
        assert_eq!(store.calls(Operation::UpdateItem), 2);
    }

    #[tokio::test]
    async fn test_delete_returns_old_attributes_only_when_matched() {
        let store = InMemoryStore::new();
        let table = seeded(&store, 1).await;
        let options = || DeleteOptions {
            return_values: ReturnValues::AllOld,
            ..Default::default()
        };

        let deleted = table.delete(team_key(1), options()).await.unwrap();
        assert_eq!(deleted.attributes.unwrap()["name"], Value::from("team 1"));

        let nothing = table.delete(team_key(1), options()).await.unwrap();
        assert!(nothing.attributes.is_none());
    }
}
