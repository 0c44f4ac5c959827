use std::collections::{HashMap, HashSet};
use std::time::Duration;

use tablekit_core::model::{key_fingerprint, Item, Record};
use tablekit_core::storage::{
    BatchGetRequest, Expression, GetItemRequest, Result, BATCH_GET_LIMIT,
};

use super::{GetOptions, Table};

/// Re-requests of unprocessed keys per batch chunk before giving up on them.
const UNPROCESSED_ROUNDS: usize = 3;

impl<T: Record> Table<T> {
    /// Reads one record. Absent items are `None`.
    pub async fn get(&self, key: Item, options: GetOptions) -> Result<Option<T>> {
        let projection = self.typed_projection(options.projection);
        let item = self
            .store()
            .get_item(GetItemRequest {
                table: self.name().clone(),
                key,
                consistent_read: options.consistent_read,
                projection: Some(projection),
            })
            .await?;
        item.map(T::from_superset).transpose()
    }

    /// Reads one raw item. Only an explicit projection is applied.
    pub async fn get_raw(&self, key: Item, options: GetOptions) -> Result<Option<Item>> {
        self.store()
            .get_item(GetItemRequest {
                table: self.name().clone(),
                key,
                consistent_read: options.consistent_read,
                projection: options.projection,
            })
            .await
    }

    /// Reads one record, retrying while it is absent.
    ///
    /// Makes up to `retries + 1` attempts, sleeping `attempt + 1` seconds
    /// between them. Every attempt after the first is a consistent read.
    pub async fn get_with_retry(
        &self,
        key: Item,
        retries: u32,
        consistent_read: bool,
    ) -> Result<Option<T>> {
        for attempt in 0..=retries {
            let options = GetOptions {
                consistent_read: consistent_read || attempt > 0,
                projection: None,
            };
            if let Some(record) = self.get(key.clone(), options).await? {
                return Ok(Some(record));
            }
            if attempt < retries {
                tracing::debug!(table = %self.name(), attempt, "Item not found, retrying read");
                tokio::time::sleep(Duration::from_secs(u64::from(attempt) + 1)).await;
            }
        }
        Ok(None)
    }

    /// Reads many records by key.
    ///
    /// A `limit > 0` truncates `keys` before chunking. Keys are requested in
    /// chunks of [`BATCH_GET_LIMIT`], one batch call per chunk; results
    /// follow chunk order and key order within each chunk. Absent keys are
    /// omitted and duplicate keys are not collapsed.
    pub async fn get_batch(&self, keys: &[Item], limit: usize) -> Result<Vec<T>> {
        let projection = self.typed_projection(None);
        let items = self.batch_items(keys, limit, Some(projection)).await?;
        Self::to_records(items)
    }

    /// Raw variant of [`Table::get_batch`]. Only an explicit projection is
    /// applied.
    pub async fn get_batch_raw(
        &self,
        keys: &[Item],
        limit: usize,
        projection: Option<Expression>,
    ) -> Result<Vec<Item>> {
        self.batch_items(keys, limit, projection).await
    }

    async fn batch_items(
        &self,
        keys: &[Item],
        limit: usize,
        projection: Option<Expression>,
    ) -> Result<Vec<Item>> {
        let keys = if limit > 0 {
            &keys[..limit.min(keys.len())]
        } else {
            keys
        };

        let mut all_items = Vec::with_capacity(keys.len());
        for (index, chunk) in keys.chunks(BATCH_GET_LIMIT).enumerate() {
            let mut found = Vec::with_capacity(chunk.len());
            let mut pending = chunk.to_vec();
            let mut rounds = 0;

            loop {
                let output = self
                    .store()
                    .batch_get_item(BatchGetRequest {
                        table: self.name().clone(),
                        keys: pending,
                        projection: projection.clone(),
                    })
                    .await?;
                found.extend(output.items);
                pending = output.unprocessed_keys;

                if pending.is_empty() {
                    break;
                }
                if rounds == UNPROCESSED_ROUNDS {
                    tracing::warn!(
                        table = %self.name(),
                        chunk = index,
                        unprocessed = pending.len(),
                        "Giving up on unprocessed keys"
                    );
                    break;
                }
                rounds += 1;
                tracing::warn!(
                    table = %self.name(),
                    chunk = index,
                    unprocessed = pending.len(),
                    "Re-requesting unprocessed keys"
                );
            }

            tracing::debug!(
                table = %self.name(),
                chunk = index,
                requested = chunk.len(),
                found = found.len(),
                "Fetched batch chunk"
            );
            all_items.extend(order_by_keys(chunk, found));
        }
        Ok(all_items)
    }
}

/// Orders `items` by the position of their key in `keys`.
///
/// Items whose key attributes were projected away keep their store order at
/// the end.
fn order_by_keys(keys: &[Item], items: Vec<Item>) -> Vec<Item> {
    let Some(attributes) = keys.first().map(|k| k.keys().cloned().collect::<Vec<_>>()) else {
        return items;
    };

    let mut by_key: HashMap<String, Item> = HashMap::with_capacity(items.len());
    let mut unmatched = Vec::new();
    for item in items {
        let key: Item = attributes
            .iter()
            .filter_map(|a| item.get(a).map(|v| (a.clone(), v.clone())))
            .collect();
        if key.len() == attributes.len() {
            by_key.insert(key_fingerprint(&key), item);
        } else {
            unmatched.push(item);
        }
    }

    let requested: HashSet<String> = keys.iter().map(key_fingerprint).collect();
    let mut ordered: Vec<Item> = keys
        .iter()
        .filter_map(|key| by_key.get(&key_fingerprint(key)).cloned())
        .collect();
    ordered.extend(
        by_key
            .into_iter()
            .filter(|(fingerprint, _)| !requested.contains(fingerprint))
            .map(|(_, item)| item),
    );
    ordered.extend(unmatched);
    ordered
}

#[cfg(all(test, feature = "inmemory"))]
mod tests {
    use super::*;
    use crate::storage::inmemory::{InMemoryStore, Operation};
    use crate::table::fixtures::{seeded, team_key, teams, Team};
    use tablekit_core::item;
    use tablekit_core::model::Value;
    use tablekit_core::storage::DataError;

    #[tokio::test]
    async fn test_get_returns_record_or_none() {
        let store = InMemoryStore::new();
        let table = seeded(&store, 3).await;

        let team = table.get(team_key(2), GetOptions::default()).await.unwrap();
        assert_eq!(team, Some(Team::new(2, "team 2")));

        let missing = table.get(team_key(9), GetOptions::default()).await.unwrap();
        assert_eq!(missing, None);
    }

    #[tokio::test]
    async fn test_get_projects_declared_fields_with_aliases() {
        let store = InMemoryStore::new();
        let table = teams(&store);
        store
            .seed(
                table.name(),
                [item! { "id" => 1, "name" => "a", "status" => "active", "legacy" => "x" }],
            )
            .await;

        let raw = table.get_raw(team_key(1), GetOptions::default()).await.unwrap();
        assert!(raw.unwrap().contains_key("legacy"));

        let team = table.get(team_key(1), GetOptions::default()).await.unwrap().unwrap();
        assert_eq!(team.status, "active");

        let sent = store.projections(Operation::GetItem).await;
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0], None);
        let projection = sent[1].clone().unwrap();
        assert_eq!(projection.expression, "id,name,#status,rating");
        assert_eq!(projection.names["#status"], "status");
        assert!(projection.values.is_empty());
    }

    #[tokio::test]
    async fn test_get_batch_sends_typed_projection_and_raw_does_not() {
        let store = InMemoryStore::new();
        let table = seeded(&store, 3).await;
        let keys = vec![team_key(1), team_key(2)];

        table.get_batch(&keys, 0).await.unwrap();
        table.get_batch_raw(&keys, 0, None).await.unwrap();

        let sent = store.projections(Operation::BatchGetItem).await;
        assert_eq!(sent.len(), 2);
        assert_eq!(
            sent[0].as_ref().map(|p| p.expression.as_str()),
            Some("id,name,#status,rating")
        );
        assert_eq!(sent[1], None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_with_retry_sleeps_between_attempts() {
        let store = InMemoryStore::new();
        let table = teams(&store);

        let start = tokio::time::Instant::now();
        let result = table.get_with_retry(team_key(1), 2, false).await.unwrap();

        assert_eq!(result, None);
        assert_eq!(store.calls(Operation::GetItem), 3);
        assert!(start.elapsed() >= Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_get_batch_chunks_by_hundred_and_keeps_key_order() {
        let store = InMemoryStore::new();
        let table = seeded(&store, 150).await;

        let keys: Vec<Item> = (1..=150).rev().map(team_key).collect();
        let result = table.get_batch(&keys, 0).await.unwrap();

        assert_eq!(store.calls(Operation::BatchGetItem), 2);
        assert_eq!(result.len(), 150);
        let ids: Vec<i64> = result.iter().map(|t| t.id).collect();
        assert_eq!(ids, (1..=150).rev().collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_get_batch_limit_truncates_keys() {
        let store = InMemoryStore::new();
        let table = seeded(&store, 10).await;

        let keys: Vec<Item> = (1..=10).map(team_key).collect();
        let result = table.get_batch(&keys, 4).await.unwrap();

        assert_eq!(result.len(), 4);
        assert_eq!(store.calls(Operation::BatchGetItem), 1);
    }

    #[tokio::test]
    async fn test_get_batch_omits_absent_keys() {
        let store = InMemoryStore::new();
        let table = seeded(&store, 2).await;

        let keys = vec![team_key(2), team_key(7), team_key(1)];
        let ids: Vec<i64> = table
            .get_batch(&keys, 0)
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.id)
            .collect();

        assert_eq!(ids, vec![2, 1]);
    }

    #[tokio::test]
    async fn test_get_batch_re_requests_unprocessed_keys() {
        let store = InMemoryStore::new().with_batch_get_capacity(40);
        let table = seeded(&store, 100).await;

        let keys: Vec<Item> = (1..=100).map(team_key).collect();
        let result = table.get_batch(&keys, 0).await.unwrap();

        assert_eq!(result.len(), 100);
        assert_eq!(store.calls(Operation::BatchGetItem), 3);
        assert_eq!(result[0].id, 1);
        assert_eq!(result[99].id, 100);
    }

    #[tokio::test]
    async fn test_get_propagates_store_errors() {
        let store = InMemoryStore::new();
        let table = teams(&store);
        store
            .fail_next(
                Operation::GetItem,
                DataError::client("ResourceNotFoundException", "no table"),
            )
            .await;

        let err = table.get(team_key(1), GetOptions::default()).await.unwrap_err();
        assert_eq!(err.code(), Some("ResourceNotFoundException"));
    }

    #[test]
    fn test_order_by_keys_appends_unmatched_items() {
        let keys = vec![item! { "id" => 2 }, item! { "id" => 1 }];
        let items = vec![
            item! { "id" => 1, "n" => "a" },
            item! { "n" => "projected" },
            item! { "id" => 2, "n" => "b" },
        ];

        let ordered = order_by_keys(&keys, items);
        assert_eq!(ordered[0]["n"], Value::from("b"));
        assert_eq!(ordered[1]["n"], Value::from("a"));
        assert_eq!(ordered[2]["n"], Value::from("projected"));
    }
}
