//! In-memory item store implementation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};

use tablekit_core::model::{key_matches, Item};
use tablekit_core::storage::{
    BatchGetOutput, BatchGetRequest, DataError, DeleteItemRequest, Expression, GetItemRequest,
    ItemStore, Page, PutItemRequest, QueryRequest, Result, ReturnValues, ScanRequest, Select,
    TableName, TransactWriteItem, UpdateItemRequest, WriteOutput, WriteRequest, BATCH_GET_LIMIT,
    CONDITIONAL_CHECK_FAILED, TRANSACT_WRITE_LIMIT,
};

/// Store operations, used to count calls and script failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    GetItem,
    BatchGetItem,
    PutItem,
    BatchWriteItem,
    UpdateItem,
    DeleteItem,
    Query,
    Scan,
    TransactWriteItems,
}

const OPERATIONS: usize = 9;

impl Operation {
    fn index(self) -> usize {
        self as usize
    }
}

#[derive(Debug)]
struct ScriptedFailure {
    operation: Operation,
    /// 1-based call number that fails.
    call: usize,
    error: DataError,
}

/// In-memory storage backend for testing.
///
/// Tables are vectors of items in insertion order, wrapped in
/// `Arc<RwLock<_>>`. Keys are compared by value; key conditions and filters
/// only understand `attr = :value` clauses joined by `AND` (anything else
/// matches every item). Write conditions additionally understand
/// `attribute_exists(attr)` and `attribute_not_exists(attr)`.
#[derive(Debug, Clone)]
pub struct InMemoryStore {
    tables: Arc<RwLock<HashMap<String, Vec<Item>>>>,
    key_schemas: HashMap<String, Vec<String>>,
    page_size: Option<usize>,
    batch_get_capacity: Option<usize>,
    calls: Arc<[AtomicUsize; OPERATIONS]>,
    failures: Arc<Mutex<Vec<ScriptedFailure>>>,
    transactions: Arc<Mutex<Vec<usize>>>,
    projections: Arc<Mutex<Vec<(Operation, Option<Expression>)>>>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    /// Creates a new empty store. Tables without a declared key schema are
    /// keyed by `id`.
    pub fn new() -> Self {
        Self {
            tables: Arc::new(RwLock::new(HashMap::new())),
            key_schemas: HashMap::new(),
            page_size: None,
            batch_get_capacity: None,
            calls: Arc::new(Default::default()),
            failures: Arc::new(Mutex::new(Vec::new())),
            transactions: Arc::new(Mutex::new(Vec::new())),
            projections: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Declares the key attributes of `table`.
    pub fn with_key_schema(mut self, table: &TableName, attributes: &[&str]) -> Self {
        self.key_schemas.insert(
            table.to_string(),
            attributes.iter().map(|a| a.to_string()).collect(),
        );
        self
    }

    /// Caps every query and scan page at `size` examined items.
    pub fn with_page_size(mut self, size: usize) -> Self {
        self.page_size = Some(size);
        self
    }

    /// Processes at most `capacity` keys per batch read; the rest come back
    /// as unprocessed keys.
    pub fn with_batch_get_capacity(mut self, capacity: usize) -> Self {
        self.batch_get_capacity = Some(capacity);
        self
    }

    /// Inserts items directly, bypassing call counting. Items missing a key
    /// attribute are appended as is.
    pub async fn seed(&self, table: &TableName, items: impl IntoIterator<Item = Item>) {
        let key_attrs = self.key_attributes(table);
        let mut tables = self.tables.write().await;
        let rows = tables.entry(table.to_string()).or_default();
        for item in items {
            match require_key(&key_attrs, &item) {
                Ok(key) => upsert(rows, &key, item),
                Err(_) => rows.push(item),
            }
        }
    }

    /// Snapshot of a table's items, in insertion order.
    pub async fn items(&self, table: &TableName) -> Vec<Item> {
        let tables = self.tables.read().await;
        tables.get(table.as_str()).cloned().unwrap_or_default()
    }

    /// Number of calls made to `operation`.
    pub fn calls(&self, operation: Operation) -> usize {
        self.calls[operation.index()].load(Ordering::SeqCst)
    }

    /// Projections received by `operation`, in call order.
    pub async fn projections(&self, operation: Operation) -> Vec<Option<Expression>> {
        self.projections
            .lock()
            .await
            .iter()
            .filter(|(op, _)| *op == operation)
            .map(|(_, projection)| projection.clone())
            .collect()
    }

    async fn capture_projection(&self, operation: Operation, projection: Option<&Expression>) {
        self.projections
            .lock()
            .await
            .push((operation, projection.cloned()));
    }

    /// Sizes of every successful atomic multi-item write, in call order.
    pub async fn transactions(&self) -> Vec<usize> {
        self.transactions.lock().await.clone()
    }

    /// Makes the `call`-th call (1-based) to `operation` fail with `error`.
    pub async fn fail_call(&self, operation: Operation, call: usize, error: DataError) {
        self.failures.lock().await.push(ScriptedFailure {
            operation,
            call,
            error,
        });
    }

    /// Makes the next call to `operation` fail with `error`.
    pub async fn fail_next(&self, operation: Operation, error: DataError) {
        let call = self.calls(operation) + 1;
        self.fail_call(operation, call, error).await;
    }

    fn key_attributes(&self, table: &TableName) -> Vec<String> {
        self.key_schemas
            .get(table.as_str())
            .cloned()
            .unwrap_or_else(|| vec!["id".to_string()])
    }

    /// Counts the call and returns the scripted failure for it, if any.
    async fn record(&self, operation: Operation) -> Result<()> {
        let call = self.calls[operation.index()].fetch_add(1, Ordering::SeqCst) + 1;
        let mut failures = self.failures.lock().await;
        match failures
            .iter()
            .position(|f| f.operation == operation && f.call == call)
        {
            Some(position) => Err(failures.remove(position).error),
            None => Ok(()),
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn page(
        &self,
        table: &TableName,
        key_condition: Option<&Expression>,
        request_filter: Option<&Expression>,
        projection: Option<&Expression>,
        descending: bool,
        limit: Option<usize>,
        start_key: Option<&Item>,
        select: Select,
    ) -> Page {
        let key_attrs = self.key_attributes(table);
        let tables = self.tables.read().await;
        let mut rows: Vec<&Item> = tables
            .get(table.as_str())
            .map(|rows| rows.iter().collect())
            .unwrap_or_default();
        if let Some(condition) = key_condition {
            rows.retain(|item| evaluate(condition, Some(*item)));
        }
        if descending {
            rows.reverse();
        }

        let start = match start_key {
            Some(start_key) => rows
                .iter()
                .position(|item| key_matches(start_key, item))
                .map_or(rows.len(), |i| i + 1),
            None => 0,
        };
        let page_size = match (limit, self.page_size) {
            (Some(l), Some(p)) => l.min(p),
            (Some(l), None) => l,
            (None, Some(p)) => p,
            (None, None) => usize::MAX,
        };
        let end = start.saturating_add(page_size).min(rows.len());

        let examined = &rows[start..end];
        let matched: Vec<Item> = examined
            .iter()
            .copied()
            .filter(|item| request_filter.is_none_or(|f| evaluate(f, Some(*item))))
            .map(|item| project(item, projection))
            .collect();

        let last_evaluated_key = if end < rows.len() {
            examined.last().map(|item| key_of(&key_attrs, item))
        } else {
            None
        };

        Page {
            count: matched.len(),
            scanned_count: examined.len(),
            items: if select == Select::Count {
                Vec::new()
            } else {
                matched
            },
            last_evaluated_key,
        }
    }
}

#[async_trait]
impl ItemStore for InMemoryStore {
    async fn get_item(&self, request: GetItemRequest) -> Result<Option<Item>> {
        self.record(Operation::GetItem).await?;
        self.capture_projection(Operation::GetItem, request.projection.as_ref())
            .await;
        let tables = self.tables.read().await;
        Ok(tables
            .get(request.table.as_str())
            .and_then(|rows| rows.iter().find(|item| key_matches(&request.key, item)))
            .map(|item| project(item, request.projection.as_ref())))
    }

    async fn batch_get_item(&self, request: BatchGetRequest) -> Result<BatchGetOutput> {
        self.record(Operation::BatchGetItem).await?;
        self.capture_projection(Operation::BatchGetItem, request.projection.as_ref())
            .await;
        if request.keys.len() > BATCH_GET_LIMIT {
            return Err(DataError::client(
                "ValidationException",
                format!("Too many keys: {}", request.keys.len()),
            ));
        }
        let capacity = self.batch_get_capacity.unwrap_or(BATCH_GET_LIMIT);
        let (processed, unprocessed) = request.keys.split_at(capacity.min(request.keys.len()));

        let tables = self.tables.read().await;
        // Items come back in storage order, not request order.
        let items = tables
            .get(request.table.as_str())
            .map(|rows| {
                rows.iter()
                    .filter(|item| processed.iter().any(|key| key_matches(key, item)))
                    .map(|item| project(item, request.projection.as_ref()))
                    .collect()
            })
            .unwrap_or_default();

        Ok(BatchGetOutput {
            items,
            unprocessed_keys: unprocessed.to_vec(),
        })
    }

    async fn put_item(&self, request: PutItemRequest) -> Result<WriteOutput> {
        self.record(Operation::PutItem).await?;
        let key_attrs = self.key_attributes(&request.table);
        let key = require_key(&key_attrs, &request.item)?;
        let mut tables = self.tables.write().await;
        let rows = tables.entry(request.table.to_string()).or_default();

        let old = rows.iter().find(|item| key_matches(&key, item)).cloned();
        check_condition(request.condition.as_ref(), old.as_ref())?;
        upsert(rows, &key, request.item);

        Ok(WriteOutput {
            attributes: match request.return_values {
                ReturnValues::AllOld => old,
                _ => None,
            },
        })
    }

    async fn batch_write_item(&self, table: &TableName, requests: Vec<WriteRequest>) -> Result<()> {
        self.record(Operation::BatchWriteItem).await?;
        let key_attrs = self.key_attributes(table);
        // The whole batch is rejected when any request lacks its key.
        let requests = requests
            .into_iter()
            .map(|request| {
                let key = match &request {
                    WriteRequest::Put(item) => require_key(&key_attrs, item)?,
                    WriteRequest::Delete(key) => require_key(&key_attrs, key)?,
                };
                Ok((key, request))
            })
            .collect::<Result<Vec<_>>>()?;

        let mut tables = self.tables.write().await;
        let rows = tables.entry(table.to_string()).or_default();
        for (key, request) in requests {
            match request {
                WriteRequest::Put(item) => upsert(rows, &key, item),
                WriteRequest::Delete(_) => rows.retain(|item| !key_matches(&key, item)),
            }
        }
        Ok(())
    }

    async fn update_item(&self, request: UpdateItemRequest) -> Result<WriteOutput> {
        self.record(Operation::UpdateItem).await?;
        let mut tables = self.tables.write().await;
        let rows = tables.entry(request.table.to_string()).or_default();
        let old = rows.iter().find(|item| key_matches(&request.key, item)).cloned();
        check_condition(request.condition.as_ref(), old.as_ref())?;

        let mut new = old.clone().unwrap_or_else(|| request.key.clone());
        let touched = apply_update(&request.update, &mut new)?;
        match rows.iter_mut().find(|item| key_matches(&request.key, item)) {
            Some(existing) => *existing = new.clone(),
            None => rows.push(new.clone()),
        }

        let pick = |item: &Item| -> Item {
            item.iter()
                .filter(|(name, _)| touched.iter().any(|t| t == *name))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect()
        };
        let attributes = match request.return_values {
            ReturnValues::None => None,
            ReturnValues::AllOld => old,
            ReturnValues::UpdatedOld => old.as_ref().map(pick),
            ReturnValues::AllNew => Some(new),
            ReturnValues::UpdatedNew => Some(pick(&new)),
        };
        Ok(WriteOutput { attributes })
    }

    async fn delete_item(&self, request: DeleteItemRequest) -> Result<WriteOutput> {
        self.record(Operation::DeleteItem).await?;
        let mut tables = self.tables.write().await;
        let rows = tables.entry(request.table.to_string()).or_default();
        let position = rows.iter().position(|item| key_matches(&request.key, item));
        check_condition(
            request.condition.as_ref(),
            position.map(|i| &rows[i]),
        )?;

        let old = position.map(|i| rows.remove(i));
        Ok(WriteOutput {
            attributes: match request.return_values {
                ReturnValues::AllOld => old,
                _ => None,
            },
        })
    }

    async fn query(&self, request: QueryRequest) -> Result<Page> {
        self.record(Operation::Query).await?;
        self.capture_projection(Operation::Query, request.projection.as_ref())
            .await;
        Ok(self
            .page(
                &request.table,
                Some(&request.key_condition),
                request.filter.as_ref(),
                request.projection.as_ref(),
                request.descending,
                request.limit,
                request.start_key.as_ref(),
                request.select,
            )
            .await)
    }

    async fn scan(&self, request: ScanRequest) -> Result<Page> {
        self.record(Operation::Scan).await?;
        self.capture_projection(Operation::Scan, request.projection.as_ref())
            .await;
        Ok(self
            .page(
                &request.table,
                None,
                request.filter.as_ref(),
                request.projection.as_ref(),
                false,
                request.limit,
                request.start_key.as_ref(),
                request.select,
            )
            .await)
    }

    async fn transact_write_items(&self, items: Vec<TransactWriteItem>) -> Result<()> {
        self.record(Operation::TransactWriteItems).await?;
        if items.len() > TRANSACT_WRITE_LIMIT {
            return Err(DataError::client(
                "ValidationException",
                format!("Too many transaction items: {}", items.len()),
            ));
        }

        let mut tables = self.tables.write().await;
        // Staged on a copy so a failed condition leaves nothing applied.
        let mut staged = tables.clone();
        let size = items.len();
        for action in items {
            let key_attrs = self.key_attributes(action.table());
            let rows = staged.entry(action.table().to_string()).or_default();
            match action {
                TransactWriteItem::Put {
                    item, condition, ..
                } => {
                    let key = require_key(&key_attrs, &item)?;
                    let old = rows.iter().find(|row| key_matches(&key, row));
                    check_transaction_condition(condition.as_ref(), old)?;
                    upsert(rows, &key, item);
                }
                TransactWriteItem::Update {
                    key,
                    update,
                    condition,
                    ..
                } => {
                    let old = rows.iter().find(|row| key_matches(&key, row)).cloned();
                    check_transaction_condition(condition.as_ref(), old.as_ref())?;
                    let mut new = old.unwrap_or_else(|| key.clone());
                    apply_update(&update, &mut new)?;
                    match rows.iter_mut().find(|row| key_matches(&key, row)) {
                        Some(existing) => *existing = new,
                        None => rows.push(new),
                    }
                }
                TransactWriteItem::Delete { key, condition, .. } => {
                    let old = rows.iter().find(|row| key_matches(&key, row));
                    check_transaction_condition(condition.as_ref(), old)?;
                    rows.retain(|row| !key_matches(&key, row));
                }
            }
        }
        *tables = staged;
        self.transactions.lock().await.push(size);
        Ok(())
    }
}

fn key_of(key_attrs: &[String], item: &Item) -> Item {
    key_attrs
        .iter()
        .filter_map(|name| item.get(name).map(|v| (name.clone(), v.clone())))
        .collect()
}

/// The key of `item`, or a validation error naming the first missing key
/// attribute.
fn require_key(key_attrs: &[String], item: &Item) -> Result<Item> {
    let key = key_of(key_attrs, item);
    match key_attrs.iter().find(|name| !key.contains_key(name.as_str())) {
        Some(missing) => Err(DataError::client(
            "ValidationException",
            format!("Missing the key {missing} in the item"),
        )),
        None => Ok(key),
    }
}

fn upsert(rows: &mut Vec<Item>, key: &Item, item: Item) {
    match rows.iter_mut().find(|row| key_matches(key, row)) {
        Some(existing) => *existing = item,
        None => rows.push(item),
    }
}

fn resolve_name<'a>(expression: &'a Expression, token: &'a str) -> &'a str {
    if token.starts_with('#') {
        expression
            .names
            .get(token)
            .map(String::as_str)
            .unwrap_or(token)
    } else {
        token
    }
}

/// Evaluates the supported clause forms against `item`; unsupported clauses
/// match.
fn evaluate(expression: &Expression, item: Option<&Item>) -> bool {
    if expression.is_empty() {
        return true;
    }
    split_clauses(&expression.expression)
        .into_iter()
        .all(|clause| evaluate_clause(expression, clause, item))
}

fn split_clauses(text: &str) -> Vec<&str> {
    let mut clauses = Vec::new();
    let mut rest = text;
    while let Some(i) = rest.to_ascii_uppercase().find(" AND ") {
        clauses.push(rest[..i].trim());
        rest = &rest[i + 5..];
    }
    clauses.push(rest.trim());
    clauses
}

fn function_argument<'a>(clause: &'a str, function: &str) -> Option<&'a str> {
    clause
        .strip_prefix(function)
        .map(str::trim_start)
        .and_then(|rest| rest.strip_prefix('('))
        .and_then(|rest| rest.strip_suffix(')'))
        .map(str::trim)
}

fn evaluate_clause(expression: &Expression, clause: &str, item: Option<&Item>) -> bool {
    if let Some(arg) = function_argument(clause, "attribute_not_exists") {
        let name = resolve_name(expression, arg);
        return item.is_none_or(|item| !item.contains_key(name));
    }
    if let Some(arg) = function_argument(clause, "attribute_exists") {
        let name = resolve_name(expression, arg);
        return item.is_some_and(|item| item.contains_key(name));
    }
    let Some((lhs, rhs)) = clause.split_once('=') else {
        return true;
    };
    let (lhs, rhs) = (lhs.trim(), rhs.trim());
    if lhs.ends_with(['<', '>', '!']) || rhs.starts_with('=') {
        return true;
    }
    let Some(expected) = expression.values.get(rhs) else {
        return true;
    };
    let name = resolve_name(expression, lhs);
    let probe: Item = [(name.to_string(), expected.clone())].into_iter().collect();
    item.is_some_and(|item| key_matches(&probe, item))
}

fn conditional_check_failed() -> DataError {
    DataError::client(CONDITIONAL_CHECK_FAILED, "The conditional request failed")
}

fn check_condition(condition: Option<&Expression>, item: Option<&Item>) -> Result<()> {
    match condition {
        Some(condition) if !evaluate(condition, item) => Err(conditional_check_failed()),
        _ => Ok(()),
    }
}

fn check_transaction_condition(condition: Option<&Expression>, item: Option<&Item>) -> Result<()> {
    match condition {
        Some(condition) if !evaluate(condition, item) => Err(DataError::client(
            "TransactionCanceledException",
            "Transaction cancelled, please refer cancellation reasons for specific reasons [ConditionalCheckFailed]",
        )),
        _ => Ok(()),
    }
}

/// Applies `SET a = :v, ...` and `REMOVE a, ...` sections. Returns the names
/// of the touched attributes.
fn apply_update(update: &Expression, item: &mut Item) -> Result<Vec<String>> {
    let mut touched = Vec::new();
    for (action, body) in update_sections(&update.expression) {
        for part in body.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            match action {
                "SET" => {
                    let (lhs, rhs) = part.split_once('=').ok_or_else(|| {
                        DataError::client("ValidationException", format!("Invalid SET clause: {part}"))
                    })?;
                    let name = resolve_name(update, lhs.trim()).to_string();
                    let value = update.values.get(rhs.trim()).cloned().ok_or_else(|| {
                        DataError::client(
                            "ValidationException",
                            format!("Missing value for placeholder {}", rhs.trim()),
                        )
                    })?;
                    item.insert(name.clone(), value);
                    touched.push(name);
                }
                _ => {
                    let name = resolve_name(update, part).to_string();
                    item.remove(&name);
                    touched.push(name);
                }
            }
        }
    }
    Ok(touched)
}

fn update_sections(text: &str) -> Vec<(&'static str, &str)> {
    let upper = text.to_ascii_uppercase();
    let mut marks: Vec<(usize, &'static str)> = ["SET ", "REMOVE "]
        .into_iter()
        .filter_map(|kw| {
            upper
                .match_indices(kw)
                .find(|(i, _)| *i == 0 || upper.as_bytes()[i - 1] == b' ')
                .map(|(i, _)| (i, kw.trim_end()))
        })
        .collect();
    marks.sort_by_key(|(i, _)| *i);
    marks
        .iter()
        .enumerate()
        .map(|(n, (start, action))| {
            let body_start = start + action.len();
            let body_end = marks.get(n + 1).map_or(text.len(), |(next, _)| *next);
            (*action, text[body_start..body_end].trim())
        })
        .collect()
}

/// Keeps only the projected attributes.
fn project(item: &Item, projection: Option<&Expression>) -> Item {
    let Some(projection) = projection.filter(|p| !p.is_empty()) else {
        return item.clone();
    };
    projection
        .expression
        .split(',')
        .map(|token| resolve_name(projection, token.trim()))
        .filter_map(|name| item.get(name).map(|v| (name.to_string(), v.clone())))
        .collect()
}
