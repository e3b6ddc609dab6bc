//! Running blocking native calls off the async executor.
//!
//! Native calls that may block (discovery waits, captures, sends, handle creation)
//! run on tokio's blocking pool through `spawn_blocking`. The closure owns
//! everything it touches, typically an `Arc` of the handle and owned frame data, and
//! its result comes back through the `JoinHandle`.

use tokio::runtime::Handle;

use crate::{Error, Result};

/// Run `work` on the blocking pool and await its result.
///
/// # Errors
///
/// [`Error::TaskFailed`] when called outside a tokio runtime or when the worker
/// panics; otherwise whatever `work` returns.
pub(crate) async fn run_blocking<T, F>(work: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    let runtime = Handle::try_current()
        .map_err(|e| Error::TaskFailed(format!("no tokio runtime available: {e}")))?;
    runtime
        .spawn_blocking(work)
        .await
        .map_err(|e| Error::TaskFailed(e.to_string()))?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn returns_worker_result() {
        let value = run_blocking(|| Ok(21 * 2)).await.unwrap();
        assert_eq!(value, 42);
    }

    #[tokio::test]
    async fn worker_panic_becomes_task_failed() {
        let err = run_blocking::<(), _>(|| panic!("boom")).await.unwrap_err();
        assert!(matches!(err, Error::TaskFailed(_)));
    }
}
