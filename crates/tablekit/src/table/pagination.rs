//! Paginated queries and scans.
//!
//! Every call is a bounded loop of fetch page, accumulate, decide. It stops
//! when the store returns no continuation token, when the accumulated count
//! reaches `limit`, or when it strictly exceeds `size_hint`. Stopping only
//! past `size_hint` lets a caller ask for "about N" items and still detect
//! that more are available by comparing the returned count with N.

use std::future::Future;

use futures_util::{Stream, StreamExt};
use tablekit_core::model::{Item, Record};
use tablekit_core::storage::{
    Expression, Page, QueryRequest, Result, ScanRequest, Select, TableName,
};

use super::{QueryOptions, QueryResult, ScanOptions, Table};

#[derive(Debug, Clone, Copy)]
struct Bounds {
    size_hint: usize,
    limit: Option<usize>,
}

impl Bounds {
    fn new(size_hint: usize, limit: Option<usize>) -> Self {
        Self {
            size_hint,
            limit: limit.filter(|l| *l > 0),
        }
    }

    /// Per-page limit: what is left before `limit`.
    fn page_limit(&self, collected: usize) -> Option<usize> {
        self.limit.map(|l| l.saturating_sub(collected).max(1))
    }

    fn is_done(&self, collected: usize) -> bool {
        self.limit.is_some_and(|l| collected >= l)
            || (self.size_hint > 0 && collected > self.size_hint)
    }
}

#[derive(Debug, Default)]
struct Collected {
    items: Vec<Item>,
    count: usize,
    scanned_count: usize,
    last_evaluated_key: Option<Item>,
}

async fn paginate<F, Fut>(
    table: &TableName,
    bounds: Bounds,
    select: Select,
    mut start_key: Option<Item>,
    mut fetch: F,
) -> Result<Collected>
where
    F: FnMut(Option<Item>, Option<usize>) -> Fut,
    Fut: Future<Output = Result<Page>>,
{
    let mut collected = Collected::default();
    let mut pages = 0usize;

    loop {
        let page = fetch(start_key.take(), bounds.page_limit(collected.count)).await?;
        pages += 1;

        collected.scanned_count += page.scanned_count;
        collected.count += match select {
            Select::Count => page.count,
            Select::Items => page.items.len(),
        };
        collected.items.extend(page.items);
        collected.last_evaluated_key = page.last_evaluated_key;

        tracing::debug!(
            table = %table,
            page = pages,
            count = collected.count,
            scanned = collected.scanned_count,
            "Fetched page"
        );

        match &collected.last_evaluated_key {
            Some(key) if !bounds.is_done(collected.count) => start_key = Some(key.clone()),
            _ => break,
        }
    }
    Ok(collected)
}

impl<T: Record> Table<T> {
    /// Queries records matching `key_condition`.
    pub async fn query(
        &self,
        key_condition: Expression,
        options: QueryOptions,
    ) -> Result<QueryResult<T>> {
        let projection = Some(self.typed_projection(options.projection.clone()));
        let collected = self
            .run_query(key_condition, &options, projection, Select::Items)
            .await?;
        Ok(QueryResult {
            count: collected.count,
            scanned_count: collected.scanned_count,
            items: Self::to_records(collected.items)?,
            last_evaluated_key: collected.last_evaluated_key,
        })
    }

    /// Raw variant of [`Table::query`]. Only an explicit projection is
    /// applied.
    pub async fn query_raw(
        &self,
        key_condition: Expression,
        options: QueryOptions,
    ) -> Result<QueryResult<Item>> {
        let projection = options.projection.clone();
        let collected = self
            .run_query(key_condition, &options, projection, Select::Items)
            .await?;
        Ok(QueryResult {
            count: collected.count,
            scanned_count: collected.scanned_count,
            items: collected.items,
            last_evaluated_key: collected.last_evaluated_key,
        })
    }

    /// Counts the items matching `key_condition` (and the filter) without
    /// transferring them.
    pub async fn query_count(&self, key_condition: Expression, options: QueryOptions) -> Result<usize> {
        let collected = self
            .run_query(key_condition, &options, None, Select::Count)
            .await?;
        Ok(collected.count)
    }

    /// Scans the table, or one of its indexes.
    pub async fn scan(&self, options: ScanOptions) -> Result<QueryResult<T>> {
        let projection = Some(self.typed_projection(options.projection.clone()));
        let collected = self.run_scan(&options, projection, Select::Items).await?;
        Ok(QueryResult {
            count: collected.count,
            scanned_count: collected.scanned_count,
            items: Self::to_records(collected.items)?,
            last_evaluated_key: collected.last_evaluated_key,
        })
    }

    /// Raw variant of [`Table::scan`]. Only an explicit projection is
    /// applied.
    pub async fn scan_raw(&self, options: ScanOptions) -> Result<QueryResult<Item>> {
        let projection = options.projection.clone();
        let collected = self.run_scan(&options, projection, Select::Items).await?;
        Ok(QueryResult {
            count: collected.count,
            scanned_count: collected.scanned_count,
            items: collected.items,
            last_evaluated_key: collected.last_evaluated_key,
        })
    }

    /// Counts the items of the table that pass the filter.
    pub async fn scan_count(&self, options: ScanOptions) -> Result<usize> {
        let collected = self.run_scan(&options, None, Select::Count).await?;
        Ok(collected.count)
    }

    /// Lazily scans records, one page at a time, with the same size
    /// semantics as [`Table::scan`]. Pagination state lives in the stream.
    pub fn scan_stream(&self, options: ScanOptions) -> impl Stream<Item = Result<T>> + '_ {
        let projection = Some(self.typed_projection(options.projection.clone()));
        self.stream_items(options, projection)
            .map(|item| item.and_then(T::from_superset))
    }

    /// Raw variant of [`Table::scan_stream`].
    pub fn scan_stream_raw(&self, options: ScanOptions) -> impl Stream<Item = Result<Item>> + '_ {
        let projection = options.projection.clone();
        self.stream_items(options, projection)
    }

    fn stream_items(
        &self,
        options: ScanOptions,
        projection: Option<Expression>,
    ) -> impl Stream<Item = Result<Item>> + '_ {
        let bounds = Bounds::new(options.size_hint, options.limit);

        async_stream::stream! {
            let mut start_key = options.start_key.clone();
            let mut yielded = 0usize;

            loop {
                let request = ScanRequest {
                    table: self.name().clone(),
                    index: options.index.clone(),
                    filter: options.filter.clone(),
                    projection: projection.clone(),
                    limit: bounds.page_limit(yielded),
                    consistent_read: options.consistent_read,
                    start_key: start_key.take(),
                    select: Select::Items,
                };
                let page = match self.store().scan(request).await {
                    Ok(page) => page,
                    Err(e) => {
                        yield Err(e);
                        break;
                    }
                };

                for item in page.items {
                    yielded += 1;
                    yield Ok(item);
                }

                match page.last_evaluated_key {
                    Some(key) if !bounds.is_done(yielded) => start_key = Some(key),
                    _ => break,
                }
            }
        }
    }

    async fn run_query(
        &self,
        key_condition: Expression,
        options: &QueryOptions,
        projection: Option<Expression>,
        select: Select,
    ) -> Result<Collected> {
        let bounds = Bounds::new(options.size_hint, options.limit);
        paginate(
            self.name(),
            bounds,
            select,
            options.start_key.clone(),
            |start_key, limit| {
                self.store().query(QueryRequest {
                    table: self.name().clone(),
                    index: options.index.clone(),
                    key_condition: key_condition.clone(),
                    filter: options.filter.clone(),
                    projection: projection.clone(),
                    descending: options.descending,
                    limit,
                    consistent_read: options.consistent_read,
                    start_key,
                    select,
                })
            },
        )
        .await
    }

    async fn run_scan(
        &self,
        options: &ScanOptions,
        projection: Option<Expression>,
        select: Select,
    ) -> Result<Collected> {
        let bounds = Bounds::new(options.size_hint, options.limit);
        paginate(
            self.name(),
            bounds,
            select,
            options.start_key.clone(),
            |start_key, limit| {
                self.store().scan(ScanRequest {
                    table: self.name().clone(),
                    index: options.index.clone(),
                    filter: options.filter.clone(),
                    projection: projection.clone(),
                    limit,
                    consistent_read: options.consistent_read,
                    start_key,
                    select,
                })
            },
        )
        .await
    }
}

#[cfg(all(test, feature = "inmemory"))]
mod tests {
    use super::*;
    use crate::storage::inmemory::{InMemoryStore, Operation};
    use crate::table::fixtures::{seeded, teams, Team};
    use tablekit_core::item;
    use tablekit_core::model::Value;
    use tablekit_core::storage::DataError;

    fn size_hint(n: usize) -> ScanOptions {
        ScanOptions {
            size_hint: n,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_size_hint_returns_everything_when_total_fits() {
        for total in [4, 5] {
            let store = InMemoryStore::new().with_page_size(2);
            let table = seeded(&store, total).await;

            let result = table.scan(size_hint(5)).await.unwrap();

            assert_eq!(result.count, total as usize);
            assert_eq!(result.last_evaluated_key, None);
        }
    }

    #[tokio::test]
    async fn test_size_hint_overshoots_when_more_remain() {
        let store = InMemoryStore::new().with_page_size(2);
        let table = seeded(&store, 20).await;

        let result = table.scan(size_hint(5)).await.unwrap();

        assert_eq!(result.count, 6);
        assert_eq!(result.items.len(), 6);
        assert!(result.last_evaluated_key.is_some());
        assert_eq!(store.calls(Operation::Scan), 3);
    }

    #[tokio::test]
    async fn test_size_hint_never_stops_at_exactly_n_with_more_pages() {
        let store = InMemoryStore::new().with_page_size(5);
        let table = seeded(&store, 6).await;

        let result = table.scan(size_hint(5)).await.unwrap();

        assert_eq!(result.count, 6);
        assert_eq!(store.calls(Operation::Scan), 2);
    }

    #[tokio::test]
    async fn test_limit_stops_at_limit() {
        let store = InMemoryStore::new().with_page_size(3);
        let table = seeded(&store, 20).await;

        let result = table
            .scan(ScanOptions {
                limit: Some(7),
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(result.count, 7);
        assert!(result.last_evaluated_key.is_some());
    }

    #[tokio::test]
    async fn test_query_with_key_condition_and_filter_counts_scanned() {
        let store = InMemoryStore::new().with_page_size(4);
        let table = teams(&store);
        let mut rows = Vec::new();
        for id in 1..=10 {
            let mut team = Team::new(id, "t");
            if id % 2 == 0 {
                team.status = "retired".to_string();
            }
            rows.push(team.to_storage_dict());
        }
        store.seed(table.name(), rows).await;

        let result = table
            .query(
                Expression::new("#n = :n").name("#n", "name").value(":n", "t"),
                QueryOptions {
                    filter: Some(
                        Expression::new("#s = :s")
                            .name("#s", "status")
                            .value(":s", "retired"),
                    ),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(result.count, 5);
        assert_eq!(result.scanned_count, 10);
        assert!(result.items.iter().all(|t| t.status == "retired"));
    }

    #[tokio::test]
    async fn test_query_descending() {
        let store = InMemoryStore::new();
        let table = seeded(&store, 3).await;

        let result = table
            .query_raw(
                Expression::new("attribute_exists(id)"),
                QueryOptions {
                    descending: true,
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let ids: Vec<_> = result.items.iter().map(|i| i["id"].clone()).collect();
        assert_eq!(ids, vec![Value::from(3), Value::from(2), Value::from(1)]);
    }

    #[tokio::test]
    async fn test_counts_do_not_transfer_items() {
        let store = InMemoryStore::new().with_page_size(4);
        let table = seeded(&store, 9).await;

        assert_eq!(table.scan_count(ScanOptions::default()).await.unwrap(), 9);
        assert_eq!(
            table
                .query_count(Expression::new("id = :id").value(":id", 3), QueryOptions::default())
                .await
                .unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn test_typed_reads_send_schema_projection() {
        let store = InMemoryStore::new();
        let table = seeded(&store, 2).await;
        let key_condition = || Expression::new("id = :id").value(":id", 1);

        table.query(key_condition(), QueryOptions::default()).await.unwrap();
        table.query_raw(key_condition(), QueryOptions::default()).await.unwrap();
        table.scan(ScanOptions::default()).await.unwrap();
        table.scan_raw(ScanOptions::default()).await.unwrap();

        for operation in [Operation::Query, Operation::Scan] {
            let sent = store.projections(operation).await;
            assert_eq!(sent.len(), 2, "{operation:?}");
            let typed = sent[0].clone().unwrap();
            assert_eq!(typed.expression, "id,name,#status,rating");
            assert_eq!(typed.names["#status"], "status");
            assert_eq!(sent[1], None);
        }
    }

    #[tokio::test]
    async fn test_start_key_resumes_scan() {
        let store = InMemoryStore::new().with_page_size(3);
        let table = seeded(&store, 6).await;

        let first = table
            .scan_raw(ScanOptions {
                limit: Some(3),
                ..Default::default()
            })
            .await
            .unwrap();
        let rest = table
            .scan_raw(ScanOptions {
                start_key: first.last_evaluated_key,
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(rest.count, 3);
        assert_eq!(rest.items[0], item! { "id" => 4, "name" => "team 4", "status" => "active" });
    }

    #[tokio::test]
    async fn test_scan_stream_is_lazy_and_bounded() {
        let store = InMemoryStore::new().with_page_size(2);
        let table = seeded(&store, 10).await;

        let teams: Vec<Team> = table
            .scan_stream(size_hint(3))
            .map(|r| r.unwrap())
            .collect()
            .await;

        assert_eq!(teams.len(), 4);
        assert_eq!(store.calls(Operation::Scan), 2);

        let first: Vec<_> = table.scan_stream(ScanOptions::default()).take(1).collect().await;
        assert_eq!(first.len(), 1);
        assert_eq!(store.calls(Operation::Scan), 3);
    }

    #[tokio::test]
    async fn test_scan_stream_yields_store_error() {
        let store = InMemoryStore::new();
        let table = seeded(&store, 3).await;
        store
            .fail_next(Operation::Scan, DataError::Transport("reset".to_string()))
            .await;

        let results: Vec<_> = table.scan_stream(ScanOptions::default()).collect().await;

        assert_eq!(results.len(), 1);
        assert!(matches!(results[0], Err(DataError::Transport(_))));
    }
}
