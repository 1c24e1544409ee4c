//! Deadlines for outbound calls

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::{Error, Result};

/// Run `fut` under a deadline, failing with [`Error::Timeout`] when it elapses
pub async fn with_timeout<F, T>(operation: &str, after: Duration, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    if let Ok(result) = tokio::time::timeout(after, fut).await {
        result
    } else {
        warn!(operation, timeout_ms = after.as_millis(), "Operation timed out");
        Err(Error::timeout(operation, after))
    }
}
