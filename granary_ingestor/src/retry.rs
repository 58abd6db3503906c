//! Retry harness for filesystem and commit I/O.
//!
//! Operations classified as temporary are repeated with a fixed backoff
//! until they succeed or the worker's stop signal arrives. Cancellation is
//! never swallowed: it aborts the retry loop immediately, between
//! attempts or mid-backoff.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::IngestorError;

pub(crate) const RETRY_BACKOFF: Duration = Duration::from_millis(100);

/// Why a retried operation gave up.
#[derive(Debug)]
pub(crate) enum RetryAbort {
    /// The stop signal arrived. Benign during shutdown.
    Cancelled,
    /// The error does not qualify for a retry.
    Fatal(IngestorError),
}

/// Cancellation-aware backoff between attempts.
pub(crate) async fn backoff(ct: &CancellationToken) -> Result<(), RetryAbort> {
    tokio::select! {
        _ = ct.cancelled() => Err(RetryAbort::Cancelled),
        _ = tokio::time::sleep(RETRY_BACKOFF) => Ok(()),
    }
}

/// Evaluate a fallible expression until it succeeds, backing off on
/// temporary errors. The expression is re-evaluated on every attempt, so
/// it may borrow surrounding state.
macro_rules! retry_io {
    ($ct:expr, $op:expr) => {{
        let mut attempts = 0u32;
        loop {
            if $ct.is_cancelled() {
                break Err($crate::retry::RetryAbort::Cancelled);
            }
            match $op {
                Ok(value) => break Ok(value),
                Err(error) => {
                    let kind = $crate::IngestorError::kind(&error);
                    if kind == ::granary_core::ErrorKind::Cancelled {
                        break Err($crate::retry::RetryAbort::Cancelled);
                    }
                    if !kind.is_retryable() {
                        break Err($crate::retry::RetryAbort::Fatal(error));
                    }
                    attempts += 1;
                    ::tracing::warn!(error = %error, attempts, "i/o operation failed, retrying");
                    if let Err(abort) = $crate::retry::backoff($ct).await {
                        break Err(abort);
                    }
                }
            }
        }
    }};
}

pub(crate) use retry_io;

#[cfg(test)]
mod tests {
    use super::*;

    use granary_store::FileSystemError;
    use snafu::ResultExt;

    use crate::error::StoreSnafu;

    fn transient(path: &str) -> FileSystemError {
        FileSystemError::from_io(
            path,
            std::io::Error::new(std::io::ErrorKind::ConnectionReset, "injected"),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn retries_temporary_errors_until_success() {
        let ct = CancellationToken::new();
        let mut remaining_failures = 3;

        let result: Result<u32, RetryAbort> = retry_io!(&ct, {
            if remaining_failures > 0 {
                remaining_failures -= 1;
                Err(transient("/t")).context(StoreSnafu { operation: "rename" })
            } else {
                Ok(7)
            }
        });

        assert!(matches!(result, Ok(7)));
        assert_eq!(remaining_failures, 0);
    }

    #[tokio::test]
    async fn fatal_errors_abort_immediately() {
        let ct = CancellationToken::new();
        let mut attempts = 0;

        let result: Result<(), RetryAbort> = retry_io!(&ct, {
            attempts += 1;
            Err(crate::error::UnexpectedWakeupSnafu.build())
        });

        assert!(matches!(result, Err(RetryAbort::Fatal(_))));
        assert_eq!(attempts, 1);
    }

    #[tokio::test]
    async fn cancellation_aborts_the_loop() {
        let ct = CancellationToken::new();
        ct.cancel();

        let result: Result<(), RetryAbort> = retry_io!(
            &ct,
            Err(transient("/t")).context(StoreSnafu { operation: "rename" })
        );
        assert!(matches!(result, Err(RetryAbort::Cancelled)));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_during_backoff_aborts() {
        let ct = CancellationToken::new();
        let cancel = {
            let ct = ct.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                ct.cancel();
            })
        };

        let result: Result<(), RetryAbort> = retry_io!(
            &ct,
            Err(transient("/t")).context(StoreSnafu { operation: "rename" })
        );
        assert!(matches!(result, Err(RetryAbort::Cancelled)));
        cancel.await.unwrap();
    }
}
