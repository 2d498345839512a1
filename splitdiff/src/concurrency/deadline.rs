use std::fmt;
use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::diff_error;
use crate::error::{DiffError, DiffResult, ErrorKind};

/// Runs a remote call with a deadline and wraps its failure for the calling phase.
///
/// On failure the returned error has `kind` as its primary kind, carries
/// `"<operation> on <target>"` in its detail and keeps the underlying cause next to it, so
/// [`DiffError::kinds`] still exposes e.g. [`ErrorKind::RemoteActionTimeout`].
pub async fn with_deadline<T, F>(
    kind: ErrorKind,
    description: &'static str,
    operation: &str,
    target: impl fmt::Display,
    deadline: Duration,
    future: F,
) -> DiffResult<T>
where
    F: Future<Output = DiffResult<T>>,
{
    let cause = match tokio::time::timeout(deadline, future).await {
        Ok(Ok(value)) => return Ok(value),
        Ok(Err(err)) => err,
        Err(_) => {
            warn!("{operation} on {target} did not complete within {deadline:?}");

            diff_error!(
                ErrorKind::RemoteActionTimeout,
                "Remote action exceeded its deadline",
                format!("{operation} on {target} exceeded {deadline:?}")
            )
        }
    };

    Err(DiffError::many(vec![
        diff_error!(kind, description, format!("{operation} on {target}: {cause}")),
        cause,
    ]))
}
