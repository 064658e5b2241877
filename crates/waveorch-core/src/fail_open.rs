//! Fail-open utilities for infrastructure side effects
//!
//! Persisting the pause marker, appending to the event log and saving project
//! snapshots must never abort task processing. Wrap them here instead.
//!
//! DO NOT use fail-open for:
//! - Task status updates
//! - Report validation
//! - Submission checks (pause, queue capacity)

use std::future::Future;
use tracing::warn;

use crate::Result;

/// Execute an async operation that should fail open
///
/// Logs the error via `tracing::warn!` on failure and returns `None`.
///
/// ```no_run
/// use waveorch_core::fail_open::fail_open;
/// use waveorch_core::Result;
///
/// async fn append_log() -> Result<()> {
///     Ok(())
/// }
///
/// async fn example() {
///     let written = fail_open("logger::append", || append_log()).await;
///     // written is None if append_log() failed
/// }
/// ```
pub async fn fail_open<F, Fut, T>(operation_name: &str, f: F) -> Option<T>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    match f().await {
        Ok(val) => Some(val),
        Err(e) => {
            warn!("{} failed (fail-open): {}", operation_name, e);
            None
        }
    }
}

/// Synchronous counterpart of [`fail_open`]
pub fn fail_open_sync<F, T>(operation_name: &str, f: F) -> Option<T>
where
    F: FnOnce() -> Result<T>,
{
    match f() {
        Ok(val) => Some(val),
        Err(e) => {
            warn!("{} failed (fail-open): {}", operation_name, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::OrchError;

    #[tokio::test]
    async fn test_fail_open_success() {
        let result = fail_open("test_op", || async { Ok::<_, OrchError>(42) }).await;
        assert_eq!(result, Some(42));
    }

    #[tokio::test]
    async fn test_fail_open_failure() {
        let result = fail_open("test_op", || async {
            Err::<i32, _>(OrchError::Config("test error".to_string()))
        })
        .await;
        assert_eq!(result, None);
    }

    #[test]
    fn test_fail_open_sync() {
        assert_eq!(fail_open_sync("ok", || Ok::<_, OrchError>("done")), Some("done"));
        assert_eq!(
            fail_open_sync("io", || Err::<(), _>(OrchError::Io(std::io::Error::other("disk full")))),
            None
        );
    }
}
