//! Bounded external calls

use std::future::Future;
use std::time::Duration;

use ferry_client::ClientError;

use crate::error::{FerryError, Result};

/// Awaits an external call, failing with a connectivity error once `budget` elapses
///
/// An in-flight call that exceeds its budget is dropped; the caller sees a
/// failure, never a hang.
pub async fn bounded<T, F>(budget: Duration, call: F) -> Result<T>
where
    F: Future<Output = std::result::Result<T, ClientError>>,
{
    match tokio::time::timeout(budget, call).await {
        Ok(result) => result.map_err(FerryError::from),
        Err(_) => Err(FerryError::from(ClientError::Timeout(budget))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCategory;

    #[tokio::test]
    async fn test_bounded_times_out() {
        let result: Result<()> = bounded(Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;

        let err = result.unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Connectivity);
    }

    #[tokio::test]
    async fn test_bounded_passes_value_through() {
        let value = bounded(Duration::from_secs(1), async { Ok::<_, ClientError>(7) })
            .await
            .unwrap();
        assert_eq!(value, 7);
    }
}
