//! Timeout enforcement for outbound I/O.

use std::future::Future;
use std::io;
use std::time::Duration;

/// Dial timeout used when a node sets none.
pub const DEFAULT_DIAL_TIMEOUT: Duration = Duration::from_secs(10);

/// `timeout`, or `default` when it is zero.
pub fn or_default(timeout: Duration, default: Duration) -> Duration {
    if timeout.is_zero() {
        default
    } else {
        timeout
    }
}

/// Run an I/O future under a deadline. Expiry is reported as
/// [`io::ErrorKind::TimedOut`] so callers handle it like any dial failure.
pub async fn io_timeout<T, F>(timeout: Duration, what: &'static str, fut: F) -> io::Result<T>
where
    F: Future<Output = io::Result<T>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(io::Error::new(
            io::ErrorKind::TimedOut,
            format!("{} timed out after {:?}", what, timeout),
        )),
    }
}
