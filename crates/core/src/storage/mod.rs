mod error;
mod expression;
mod traits;
mod types;

pub use error::{DataError, Result, StoreError, CONDITIONAL_CHECK_FAILED};
pub use expression::Placeholders;
pub use traits::{ItemStore, BATCH_GET_LIMIT, TRANSACT_WRITE_LIMIT};
pub use types::{
    BatchGetOutput, BatchGetRequest, DeleteItemRequest, Expression, GetItemRequest, Page,
    PutItemRequest, QueryRequest, ReturnValues, ScanRequest, Select, TableName,
    TransactWriteItem, UpdateExpression, UpdateItemRequest, WriteOutput, WriteRequest,
};
