use std::collections::BTreeMap;
use std::fmt;

use crate::model::Item;

/// Physical table name: environment prefix followed by the static suffix.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableName(String);

impl TableName {
    pub fn new(prefix: &str, suffix: &str) -> Self {
        Self(format!("{prefix}{suffix}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for TableName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// An expression string plus the placeholders it references.
///
/// Used for key conditions, filters, write conditions, update expressions and
/// projections (the latter never carry values).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Expression {
    pub expression: String,
    /// `#alias -> attribute name`.
    pub names: BTreeMap<String, String>,
    /// `:placeholder -> value`.
    pub values: Item,
}

/// Update expressions share the shape of every other expression.
pub type UpdateExpression = Expression;

/// What a write returns about the item it touched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReturnValues {
    #[default]
    None,
    AllOld,
    UpdatedOld,
    AllNew,
    UpdatedNew,
}

impl ReturnValues {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReturnValues::None => "NONE",
            ReturnValues::AllOld => "ALL_OLD",
            ReturnValues::UpdatedOld => "UPDATED_OLD",
            ReturnValues::AllNew => "ALL_NEW",
            ReturnValues::UpdatedNew => "UPDATED_NEW",
        }
    }
}

/// Result of a single-item write.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteOutput {
    /// Present only when requested through [`ReturnValues`] and something
    /// matched.
    pub attributes: Option<Item>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GetItemRequest {
    pub table: TableName,
    pub key: Item,
    pub consistent_read: bool,
    pub projection: Option<Expression>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatchGetRequest {
    pub table: TableName,
    pub keys: Vec<Item>,
    pub projection: Option<Expression>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchGetOutput {
    pub items: Vec<Item>,
    /// Keys the store did not process in this call.
    pub unprocessed_keys: Vec<Item>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PutItemRequest {
    pub table: TableName,
    pub item: Item,
    pub condition: Option<Expression>,
    pub return_values: ReturnValues,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateItemRequest {
    pub table: TableName,
    pub key: Item,
    pub update: UpdateExpression,
    pub condition: Option<Expression>,
    pub return_values: ReturnValues,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeleteItemRequest {
    pub table: TableName,
    pub key: Item,
    pub condition: Option<Expression>,
    pub return_values: ReturnValues,
}

/// One entry of a buffered batch write.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteRequest {
    Put(Item),
    Delete(Item),
}

/// What a read returns per item.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Select {
    #[default]
    Items,
    Count,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueryRequest {
    pub table: TableName,
    pub index: Option<String>,
    pub key_condition: Expression,
    pub filter: Option<Expression>,
    pub projection: Option<Expression>,
    pub descending: bool,
    pub limit: Option<usize>,
    pub consistent_read: bool,
    pub start_key: Option<Item>,
    pub select: Select,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScanRequest {
    pub table: TableName,
    pub index: Option<String>,
    pub filter: Option<Expression>,
    pub projection: Option<Expression>,
    pub limit: Option<usize>,
    pub consistent_read: bool,
    pub start_key: Option<Item>,
    pub select: Select,
}

/// One page of a query or scan.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    pub items: Vec<Item>,
    pub count: usize,
    pub scanned_count: usize,
    /// Continuation token; `None` on the last page.
    pub last_evaluated_key: Option<Item>,
}

/// One action of an atomic multi-item write.
#[derive(Debug, Clone, PartialEq)]
pub enum TransactWriteItem {
    Put {
        table: TableName,
        item: Item,
        condition: Option<Expression>,
    },
    Update {
        table: TableName,
        key: Item,
        update: UpdateExpression,
        condition: Option<Expression>,
    },
    Delete {
        table: TableName,
        key: Item,
        condition: Option<Expression>,
    },
}

impl TransactWriteItem {
    pub fn table(&self) -> &TableName {
        match self {
            TransactWriteItem::Put { table, .. }
            | TransactWriteItem::Update { table, .. }
            | TransactWriteItem::Delete { table, .. } => table,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_name_is_prefixed() {
        let name = TableName::new("dev-", "Stadiums");
        assert_eq!(name.as_str(), "dev-Stadiums");
        assert_eq!(name.to_string(), "dev-Stadiums");
        assert_eq!(TableName::new("", "Stadiums").as_str(), "Stadiums");
    }

    #[test]
    fn test_return_values_wire_names() {
        assert_eq!(ReturnValues::default().as_str(), "NONE");
        assert_eq!(ReturnValues::AllOld.as_str(), "ALL_OLD");
        assert_eq!(ReturnValues::UpdatedNew.as_str(), "UPDATED_NEW");
    }
}
