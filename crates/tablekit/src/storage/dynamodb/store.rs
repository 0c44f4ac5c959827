//! DynamoDB item store implementation.
//!
//! Implements [`ItemStore`] from `tablekit_core::storage` on top of the
//! `aws-sdk-dynamodb` client.

use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_dynamodb::config::Region;
use aws_sdk_dynamodb::types as sdk;
use aws_sdk_dynamodb::Client;

use tablekit_core::model::Item;
use tablekit_core::storage::{
    BatchGetOutput, BatchGetRequest, DataError, DeleteItemRequest, GetItemRequest, ItemStore,
    Page, Placeholders, PutItemRequest, QueryRequest, Result, ScanRequest, Select, TableName,
    TransactWriteItem, UpdateItemRequest, WriteOutput, WriteRequest,
};

use super::conversions::{
    attribute_names, attribute_values, attributes_to_item, item_to_attributes, page_limit,
    return_value, AttributeMap,
};
use super::error::{map_build_error, map_sdk_error};
use crate::config::Config;

/// Requests per BatchWriteItem call.
const BATCH_WRITE_LIMIT: usize = 25;

/// Resends of unprocessed write requests before giving up.
const UNPROCESSED_WRITE_ROUNDS: u32 = 5;

/// DynamoDB-based item store.
#[derive(Debug, Clone)]
pub struct DynamoDbStore {
    client: Client,
}

impl DynamoDbStore {
    /// Creates a new store with the given DynamoDB client.
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Creates a new store from configuration.
    ///
    /// Uses the AWS SDK default credential chain, the configured region and,
    /// when set, the custom endpoint (for local emulators).
    pub async fn from_config(config: &Config) -> Self {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(Region::new(config.region.clone()));
        if let Some(endpoint) = &config.endpoint_url {
            loader = loader.endpoint_url(endpoint);
        }
        let sdk_config = loader.load().await;

        tracing::debug!(
            region = %config.region,
            endpoint = config.endpoint_url.as_deref().unwrap_or("default"),
            "DynamoDB client configured"
        );
        Self::new(Client::new(&sdk_config))
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    async fn write_chunk(&self, table: &TableName, mut requests: Vec<sdk::WriteRequest>) -> Result<()> {
        for round in 0..=UNPROCESSED_WRITE_ROUNDS {
            let output = self
                .client
                .batch_write_item()
                .request_items(table.as_str(), requests)
                .send()
                .await
                .map_err(map_sdk_error)?;

            requests = output
                .unprocessed_items
                .and_then(|mut unprocessed| unprocessed.remove(table.as_str()))
                .unwrap_or_default();
            if requests.is_empty() {
                return Ok(());
            }

            tracing::warn!(
                table = %table,
                round,
                unprocessed = requests.len(),
                "Resending unprocessed write requests"
            );
            tokio::time::sleep(Duration::from_millis(50 << round)).await;
        }

        Err(DataError::client(
            "ProvisionedThroughputExceededException",
            format!("{} write requests left unprocessed", requests.len()),
        ))
    }
}

fn to_write_request(request: WriteRequest) -> Result<sdk::WriteRequest> {
    let request = match request {
        WriteRequest::Put(item) => sdk::WriteRequest::builder()
            .put_request(
                sdk::PutRequest::builder()
                    .set_item(Some(item_to_attributes(&item)))
                    .build()
                    .map_err(map_build_error)?,
            )
            .build(),
        WriteRequest::Delete(key) => sdk::WriteRequest::builder()
            .delete_request(
                sdk::DeleteRequest::builder()
                    .set_key(Some(item_to_attributes(&key)))
                    .build()
                    .map_err(map_build_error)?,
            )
            .build(),
    };
    Ok(request)
}

fn to_transact_item(action: TransactWriteItem) -> Result<sdk::TransactWriteItem> {
    let builder = sdk::TransactWriteItem::builder();
    let builder = match action {
        TransactWriteItem::Put {
            table,
            item,
            condition,
        } => {
            let placeholders = Placeholders::merge([condition.as_ref()]);
            builder.put(
                sdk::Put::builder()
                    .table_name(table.as_str())
                    .set_item(Some(item_to_attributes(&item)))
                    .set_condition_expression(condition.map(|c| c.expression))
                    .set_expression_attribute_names(attribute_names(&placeholders))
                    .set_expression_attribute_values(attribute_values(&placeholders))
                    .build()
                    .map_err(map_build_error)?,
            )
        }
        TransactWriteItem::Update {
            table,
            key,
            update,
            condition,
        } => {
            let placeholders = Placeholders::merge([Some(&update), condition.as_ref()]);
            builder.update(
                sdk::Update::builder()
                    .table_name(table.as_str())
                    .set_key(Some(item_to_attributes(&key)))
                    .update_expression(update.expression)
                    .set_condition_expression(condition.map(|c| c.expression))
                    .set_expression_attribute_names(attribute_names(&placeholders))
                    .set_expression_attribute_values(attribute_values(&placeholders))
                    .build()
                    .map_err(map_build_error)?,
            )
        }
        TransactWriteItem::Delete {
            table,
            key,
            condition,
        } => {
            let placeholders = Placeholders::merge([condition.as_ref()]);
            builder.delete(
                sdk::Delete::builder()
                    .table_name(table.as_str())
                    .set_key(Some(item_to_attributes(&key)))
                    .set_condition_expression(condition.map(|c| c.expression))
                    .set_expression_attribute_names(attribute_names(&placeholders))
                    .set_expression_attribute_values(attribute_values(&placeholders))
                    .build()
                    .map_err(map_build_error)?,
            )
        }
    };
    Ok(builder.build())
}

fn to_page(
    items: Option<Vec<AttributeMap>>,
    count: i32,
    scanned_count: i32,
    last_evaluated_key: Option<AttributeMap>,
) -> Page {
    Page {
        items: items
            .unwrap_or_default()
            .iter()
            .map(attributes_to_item)
            .collect(),
        count: usize::try_from(count).unwrap_or_default(),
        scanned_count: usize::try_from(scanned_count).unwrap_or_default(),
        last_evaluated_key: last_evaluated_key.as_ref().map(attributes_to_item),
    }
}

fn select(select: Select) -> Option<sdk::Select> {
    match select {
        Select::Count => Some(sdk::Select::Count),
        Select::Items => None,
    }
}

#[async_trait]
impl ItemStore for DynamoDbStore {
    async fn get_item(&self, request: GetItemRequest) -> Result<Option<Item>> {
        let placeholders = Placeholders::merge([request.projection.as_ref()]);
        let output = self
            .client
            .get_item()
            .table_name(request.table.as_str())
            .set_key(Some(item_to_attributes(&request.key)))
            .consistent_read(request.consistent_read)
            .set_projection_expression(request.projection.map(|p| p.expression))
            .set_expression_attribute_names(attribute_names(&placeholders))
            .send()
            .await
            .map_err(map_sdk_error)?;

        Ok(output.item.as_ref().map(attributes_to_item))
    }

    async fn batch_get_item(&self, request: BatchGetRequest) -> Result<BatchGetOutput> {
        let placeholders = Placeholders::merge([request.projection.as_ref()]);
        let keys: Vec<AttributeMap> = request.keys.iter().map(item_to_attributes).collect();
        let keys_and_attributes = sdk::KeysAndAttributes::builder()
            .set_keys(Some(keys))
            .set_projection_expression(request.projection.map(|p| p.expression))
            .set_expression_attribute_names(attribute_names(&placeholders))
            .build()
            .map_err(map_build_error)?;

        let output = self
            .client
            .batch_get_item()
            .request_items(request.table.as_str(), keys_and_attributes)
            .send()
            .await
            .map_err(map_sdk_error)?;

        let items = output
            .responses
            .and_then(|mut responses| responses.remove(request.table.as_str()))
            .unwrap_or_default()
            .iter()
            .map(attributes_to_item)
            .collect();
        let unprocessed_keys = output
            .unprocessed_keys
            .and_then(|mut unprocessed| unprocessed.remove(request.table.as_str()))
            .map(|pending| pending.keys().iter().map(attributes_to_item).collect())
            .unwrap_or_default();

        Ok(BatchGetOutput {
            items,
            unprocessed_keys,
        })
    }

    async fn put_item(&self, request: PutItemRequest) -> Result<WriteOutput> {
        let placeholders = Placeholders::merge([request.condition.as_ref()]);
        let output = self
            .client
            .put_item()
            .table_name(request.table.as_str())
            .set_item(Some(item_to_attributes(&request.item)))
            .set_condition_expression(request.condition.map(|c| c.expression))
            .set_expression_attribute_names(attribute_names(&placeholders))
            .set_expression_attribute_values(attribute_values(&placeholders))
            .return_values(return_value(request.return_values))
            .send()
            .await
            .map_err(map_sdk_error)?;

        Ok(WriteOutput {
            attributes: output.attributes.as_ref().map(attributes_to_item),
        })
    }

    async fn batch_write_item(&self, table: &TableName, requests: Vec<WriteRequest>) -> Result<()> {
        let requests = requests
            .into_iter()
            .map(to_write_request)
            .collect::<Result<Vec<_>>>()?;

        for chunk in requests.chunks(BATCH_WRITE_LIMIT) {
            self.write_chunk(table, chunk.to_vec()).await?;
        }
        Ok(())
    }

    async fn update_item(&self, request: UpdateItemRequest) -> Result<WriteOutput> {
        let placeholders = Placeholders::merge([Some(&request.update), request.condition.as_ref()]);
        let output = self
            .client
            .update_item()
            .table_name(request.table.as_str())
            .set_key(Some(item_to_attributes(&request.key)))
            .update_expression(request.update.expression)
            .set_condition_expression(request.condition.map(|c| c.expression))
            .set_expression_attribute_names(attribute_names(&placeholders))
            .set_expression_attribute_values(attribute_values(&placeholders))
            .return_values(return_value(request.return_values))
            .send()
            .await
            .map_err(map_sdk_error)?;

        Ok(WriteOutput {
            attributes: output.attributes.as_ref().map(attributes_to_item),
        })
    }

    async fn delete_item(&self, request: DeleteItemRequest) -> Result<WriteOutput> {
        let placeholders = Placeholders::merge([request.condition.as_ref()]);
        let output = self
            .client
            .delete_item()
            .table_name(request.table.as_str())
            .set_key(Some(item_to_attributes(&request.key)))
            .set_condition_expression(request.condition.map(|c| c.expression))
            .set_expression_attribute_names(attribute_names(&placeholders))
            .set_expression_attribute_values(attribute_values(&placeholders))
            .return_values(return_value(request.return_values))
            .send()
            .await
            .map_err(map_sdk_error)?;

        Ok(WriteOutput {
            attributes: output.attributes.as_ref().map(attributes_to_item),
        })
    }

    async fn query(&self, request: QueryRequest) -> Result<Page> {
        let placeholders = Placeholders::merge([
            Some(&request.key_condition),
            request.filter.as_ref(),
            request.projection.as_ref(),
        ]);
        let output = self
            .client
            .query()
            .table_name(request.table.as_str())
            .set_index_name(request.index)
            .key_condition_expression(request.key_condition.expression)
            .set_filter_expression(request.filter.map(|f| f.expression))
            .set_projection_expression(request.projection.map(|p| p.expression))
            .set_expression_attribute_names(attribute_names(&placeholders))
            .set_expression_attribute_values(attribute_values(&placeholders))
            .scan_index_forward(!request.descending)
            .set_limit(page_limit(request.limit))
            .consistent_read(request.consistent_read)
            .set_exclusive_start_key(request.start_key.as_ref().map(item_to_attributes))
            .set_select(select(request.select))
            .send()
            .await
            .map_err(map_sdk_error)?;

        let (count, scanned_count) = (output.count(), output.scanned_count());
        Ok(to_page(output.items, count, scanned_count, output.last_evaluated_key))
    }

    async fn scan(&self, request: ScanRequest) -> Result<Page> {
        let placeholders =
            Placeholders::merge([request.filter.as_ref(), request.projection.as_ref()]);
        let output = self
            .client
            .scan()
            .table_name(request.table.as_str())
            .set_index_name(request.index)
            .set_filter_expression(request.filter.map(|f| f.expression))
            .set_projection_expression(request.projection.map(|p| p.expression))
            .set_expression_attribute_names(attribute_names(&placeholders))
            .set_expression_attribute_values(attribute_values(&placeholders))
            .set_limit(page_limit(request.limit))
            .consistent_read(request.consistent_read)
            .set_exclusive_start_key(request.start_key.as_ref().map(item_to_attributes))
            .set_select(select(request.select))
            .send()
            .await
            .map_err(map_sdk_error)?;

        let (count, scanned_count) = (output.count(), output.scanned_count());
        Ok(to_page(output.items, count, scanned_count, output.last_evaluated_key))
    }

    async fn transact_write_items(&self, items: Vec<TransactWriteItem>) -> Result<()> {
        let actions = items
            .into_iter()
            .map(to_transact_item)
            .collect::<Result<Vec<_>>>()?;

        self.client
            .transact_write_items()
            .set_transact_items(Some(actions))
            .send()
            .await
            .map_err(map_sdk_error)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tablekit_core::item;
    use tablekit_core::storage::Expression;

    fn table() -> TableName {
        TableName::new("test-", "Teams")
    }

    #[test]
    fn test_transact_update_merges_placeholders() {
        let action = to_transact_item(TransactWriteItem::Update {
            table: table(),
            key: item! { "id" => 1 },
            update: Expression::new("SET #n = :n").name("#n", "name").value(":n", "x"),
            condition: Some(Expression::new("attribute_exists(id)")),
        })
        .unwrap();

        let update = action.update().unwrap();
        assert_eq!(update.table_name(), "test-Teams");
        assert_eq!(update.update_expression(), "SET #n = :n");
        assert_eq!(update.condition_expression(), Some("attribute_exists(id)"));
        assert_eq!(update.expression_attribute_names().map(|n| n.len()), Some(1));
        assert_eq!(
            update.expression_attribute_values().and_then(|v| v.get(":n")),
            Some(&sdk::AttributeValue::S("x".to_string()))
        );
    }

    #[test]
    fn test_transact_put_without_condition_omits_placeholders() {
        let action = to_transact_item(TransactWriteItem::Put {
            table: table(),
            item: item! { "id" => 1, "rating" => 2.5 },
            condition: None,
        })
        .unwrap();

        let put = action.put().unwrap();
        assert!(put.expression_attribute_names().is_none());
        assert!(put.expression_attribute_values().is_none());
        assert_eq!(put.item()["rating"], sdk::AttributeValue::N("2.5".to_string()));
    }

    #[test]
    fn test_write_request_conversion() {
        let delete = to_write_request(WriteRequest::Delete(item! { "id" => 3 })).unwrap();
        let key = delete.delete_request().unwrap().key();
        assert_eq!(key["id"], sdk::AttributeValue::N("3".to_string()));
    }

    #[test]
    fn test_page_conversion() {
        let page = to_page(
            Some(vec![AttributeMap::from([(
                "id".to_string(),
                sdk::AttributeValue::N("1".to_string()),
            )])]),
            1,
            4,
            None,
        );
        assert_eq!(page.count, 1);
        assert_eq!(page.scanned_count, 4);
        assert_eq!(page.items[0]["id"], tablekit_core::model::Value::Decimal("1".to_string()));
        assert!(page.last_evaluated_key.is_none());
    }
}
