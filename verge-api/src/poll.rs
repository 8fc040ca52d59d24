//! Bounded polling and compensating cleanup.

use std::future::Future;
use std::time::Duration;

use tokio::time::{sleep, timeout as tokio_timeout};
use tracing::warn;

use crate::client::Client;
use crate::error::Result;

/// Exponential delay schedule between polls.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Backoff {
    pub initial: Duration,
    pub max: Duration,
    pub multiplier: f64,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(500),
            max: Duration::from_secs(5),
            multiplier: 2.0,
        }
    }
}

impl Backoff {
    pub fn new(initial: Duration) -> Self {
        Self {
            initial,
            ..Self::default()
        }
    }

    pub fn max(mut self, max: Duration) -> Self {
        self.max = max;
        self
    }

    pub fn multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Delay that follows `current`, capped at `max`.
    pub fn next_delay(&self, current: Duration) -> Duration {
        current.mul_f64(self.multiplier.max(1.0)).min(self.max)
    }
}

/// Call `check` until it yields a value, sleeping between attempts.
///
/// Returns `Ok(None)` when `timeout` elapses first. Errors from `check` end
/// polling immediately. Dropping the returned future cancels the wait.
pub async fn poll_until<T, F, Fut>(timeout: Duration, backoff: Backoff, mut check: F) -> Result<Option<T>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>>>,
{
    let polling = async {
        let mut delay = backoff.initial;
        loop {
            if let Some(value) = check().await? {
                return Ok(value);
            }
            sleep(delay).await;
            delay = backoff.next_delay(delay);
        }
    };

    match tokio_timeout(timeout, polling).await {
        Ok(result) => result.map(Some),
        Err(_) => Ok(None),
    }
}

// =============================================================================
// Compensation
// =============================================================================

/// Guard that deletes an intermediate resource unless committed.
///
/// Multi-step operations create something first (a snapshot, a file entry),
/// then build on it. If a later step fails the first resource must go. Call
/// [`rollback`](Self::rollback) on the error path to delete it and wait for
/// the result. An armed guard that is dropped, for example because the
/// surrounding future was cancelled, schedules the delete on the current
/// tokio runtime.
#[must_use = "an armed compensation deletes its resource when dropped"]
pub struct Compensation {
    client: Client,
    path: String,
    armed: bool,
}

impl Compensation {
    /// Arm a guard over `path` (e.g. `machine_snapshots/12`).
    pub fn new(client: &Client, path: impl Into<String>) -> Self {
        Self {
            client: client.clone(),
            path: path.into(),
            armed: true,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Keep the resource.
    pub fn commit(mut self) {
        self.armed = false;
    }

    /// Delete the resource now.
    pub async fn rollback(mut self) -> Result<()> {
        self.armed = false;
        warn!(path = %self.path, "rolling back intermediate resource");
        self.client.delete(&self.path).await?;
        Ok(())
    }
}

impl Drop for Compensation {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let path = std::mem::take(&mut self.path);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                warn!(%path, "compensation dropped while armed, scheduling delete");
                let client = self.client.clone();
                handle.spawn(async move {
                    if let Err(e) = client.delete(&path).await {
                        warn!(%path, error = %e, "compensating delete failed");
                    }
                });
            }
            Err(_) => warn!(%path, "compensation dropped outside a runtime, resource left behind"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;
    use crate::error::Error;

    #[test]
    fn test_backoff_caps_at_max() {
        let backoff = Backoff::new(Duration::from_millis(100)).max(Duration::from_millis(300));
        let d1 = backoff.next_delay(backoff.initial);
        let d2 = backoff.next_delay(d1);
        assert_eq!(d1, Duration::from_millis(200));
        assert_eq!(d2, Duration::from_millis(300));
    }

    #[tokio::test]
    async fn test_poll_until_ready() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let result = poll_until(
            Duration::from_secs(2),
            Backoff::new(Duration::from_millis(5)),
            move || {
                let counter = counter.clone();
                async move {
                    let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                    Ok((n >= 3).then_some(n))
                }
            },
        )
        .await
        .unwrap();
        assert_eq!(result, Some(3));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_poll_until_times_out() {
        let result: Option<()> = poll_until(
            Duration::from_millis(50),
            Backoff::new(Duration::from_millis(10)),
            || async { Ok(None) },
        )
        .await
        .unwrap();
        assert_eq!(result, None);
    }

    #[tokio::test]
    async fn test_poll_until_stops_on_error() {
        let result: Result<Option<()>> = poll_until(
            Duration::from_secs(1),
            Backoff::default(),
            || async { Err(Error::NotFound("gone".into())) },
        )
        .await;
        assert!(result.unwrap_err().is_not_found());
    }
}
