use std::future::Future;
use std::time::Duration;

use crate::error::{CoreError, CoreResult};

/// Runs a collaborator call under a time budget; expiry becomes [`CoreError::Timeout`].
pub async fn with_timeout<T, F>(operation: &str, budget: Duration, fut: F) -> CoreResult<T>
where
    F: Future<Output = CoreResult<T>>,
{
    match tokio::time::timeout(budget, fut).await {
        Ok(result) => result,
        Err(_) => Err(CoreError::Timeout {
            operation: operation.to_string(),
            after_ms: budget.as_millis() as u64,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn expiry_is_a_retryable_timeout() {
        let err = with_timeout("slow", Duration::from_millis(5), async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok::<_, CoreError>(())
        })
        .await
        .unwrap_err();
        assert!(matches!(err, CoreError::Timeout { after_ms: 5, .. }));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn inner_result_passes_through() {
        let v = with_timeout("fast", Duration::from_secs(1), async { Ok::<_, CoreError>(7) })
            .await
            .unwrap();
        assert_eq!(v, 7);
    }
}
