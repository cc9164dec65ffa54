use std::future::Future;
use std::time::Duration;

use crate::error::ApiError;

/// Wraps an async operation with a deadline. On expiry the caller is
/// unblocked with a distinguished timeout error; the underlying operation
/// is not guaranteed to stop, only the wait does.
pub async fn with_deadline<F, T>(deadline: Duration, what: &str, op: F) -> Result<T, ApiError>
where
    F: Future<Output = T>,
{
    tokio::time::timeout(deadline, op)
        .await
        .map_err(|_| ApiError::timeout(format!("{} exceeded {:?} deadline", what, deadline)))
}
