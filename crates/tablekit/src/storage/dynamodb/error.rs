//! DynamoDB error mapping.
//!
//! Maps AWS SDK errors to `DataError` from `tablekit_core::storage`. Service
//! responses keep their error code so callers can tell a failed condition or
//! a throttled request apart; anything that never reached the service becomes
//! a transport error.

use std::error::Error;
use std::fmt::Debug;

use aws_sdk_dynamodb::error::{BuildError, DisplayErrorContext, ProvideErrorMetadata, SdkError};
use tablekit_core::storage::DataError;

/// Map any operation's SDK error to DataError.
pub fn map_sdk_error<E, R>(err: SdkError<E, R>) -> DataError
where
    E: ProvideErrorMetadata + Error + Send + Sync + 'static,
    R: Debug + Send + Sync + 'static,
{
    match err.as_service_error() {
        Some(service) => DataError::client(
            service.code().unwrap_or("Unknown"),
            service.message().unwrap_or_default(),
        ),
        None => DataError::Transport(DisplayErrorContext(&err).to_string()),
    }
}

/// Map a request builder error to DataError.
pub fn map_build_error(err: BuildError) -> DataError {
    DataError::InvalidRequest(err.to_string())
}
