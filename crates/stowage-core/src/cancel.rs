//! Cancellation and deadlines for store operations.
//!
//! Every store operation is a future. Dropping it aborts in-flight I/O at the
//! next await point; these adapters do the dropping on the caller's signal
//! and report it as [`StoreError::Cancelled`] or
//! [`StoreError::DeadlineExceeded`] rather than as an I/O failure.
//!
//! ```no_run
//! # async fn demo(bucket: &dyn stowage_core::Bucket) -> stowage_core::StoreResult<()> {
//! use std::time::Duration;
//! use stowage_core::Cancellable;
//!
//! let header = bucket.head("report.csv").timeout(Duration::from_secs(5)).await?;
//! # Ok(())
//! # }
//! ```

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{StoreError, StoreResult};

/// Run `op` until it completes or `token` is cancelled.
///
/// A token that is already cancelled wins over a ready operation.
pub async fn with_cancellation<T, F>(token: &CancellationToken, op: F) -> StoreResult<T>
where
    F: Future<Output = StoreResult<T>>,
{
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(StoreError::Cancelled),
        result = op => result,
    }
}

/// Run `op` until it completes or `deadline` passes.
pub async fn with_deadline<T, F>(deadline: Instant, op: F) -> StoreResult<T>
where
    F: Future<Output = StoreResult<T>>,
{
    tokio::time::timeout_at(deadline, op)
        .await
        .unwrap_or(Err(StoreError::DeadlineExceeded))
}

/// Run `op` for at most `limit`.
pub async fn with_timeout<T, F>(limit: Duration, op: F) -> StoreResult<T>
where
    F: Future<Output = StoreResult<T>>,
{
    with_deadline(Instant::now() + limit, op).await
}

/// Method-style access to the cancellation adapters.
pub trait Cancellable<T>: Future<Output = StoreResult<T>> + Sized {
    fn cancel_on(self, token: &CancellationToken) -> impl Future<Output = StoreResult<T>> {
        with_cancellation(token, self)
    }

    fn deadline(self, deadline: Instant) -> impl Future<Output = StoreResult<T>> {
        with_deadline(deadline, self)
    }

    fn timeout(self, limit: Duration) -> impl Future<Output = StoreResult<T>> {
        with_timeout(limit, self)
    }
}

impl<T, F> Cancellable<T> for F where F: Future<Output = StoreResult<T>> {}

#[cfg(test)]
mod tests {
    use std::future::pending;

    use super::*;

    #[tokio::test]
    async fn completes_without_cancellation() {
        let token = CancellationToken::new();
        let value = with_cancellation(&token, async { Ok::<_, StoreError>(7) })
            .await
            .unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn cancelled_token_aborts_pending_operation() {
        let token = CancellationToken::new();
        let trigger = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            trigger.cancel();
        });
        let err = with_cancellation(&token, pending::<StoreResult<()>>())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Cancelled));
        assert!(err.is_cancellation());
    }

    #[tokio::test]
    async fn precancelled_token_wins() {
        let token = CancellationToken::new();
        token.cancel();
        let err = async { Ok::<_, StoreError>(()) }
            .cancel_on(&token)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Cancelled));
    }

    #[tokio::test]
    async fn timeout_reports_deadline_exceeded() {
        let err = pending::<StoreResult<()>>()
            .timeout(Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::DeadlineExceeded));
    }

    #[tokio::test]
    async fn operation_errors_pass_through() {
        let err = with_timeout(Duration::from_secs(5), async {
            Err::<(), _>(StoreError::Backend("connection reset".into()))
        })
        .await
        .unwrap_err();
        assert!(matches!(err, StoreError::Backend(_)));
        assert!(!err.is_cancellation());
    }
}
