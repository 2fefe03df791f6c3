//! Periodic flush timer.

use std::time::Duration;

use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;

/// Handle to the periodic flush task.
///
/// The task stops when [`FlushScheduler::stop`] is called, when the
/// scheduler is dropped, or when the tick callback returns `false`.
#[derive(Default)]
pub struct FlushScheduler {
    cancel: Option<CancellationToken>,
}

impl FlushScheduler {
    /// Starts ticking every `interval` on `handle`, restarting if running.
    ///
    /// The first tick happens one full interval after start.
    pub fn start<F>(&mut self, handle: &Handle, interval: Duration, tick: F)
    where
        F: Fn() -> bool + Send + 'static,
    {
        self.stop();

        let cancel = CancellationToken::new();
        self.cancel = Some(cancel.clone());

        handle.spawn(async move {
            flush_loop(interval, cancel, tick).await;
        });

        tracing::debug!(?interval, "flush timer started");
    }

    #[cfg(test)]
    pub(crate) fn token(&self) -> Option<CancellationToken> {
        self.cancel.clone()
    }

    /// Cancels the task. No-op when not running.
    pub fn stop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel.cancel();
            tracing::debug!("flush timer stopped");
        }
    }

    /// Returns `true` if the task is ticking.
    pub fn is_running(&self) -> bool {
        self.cancel.as_ref().is_some_and(|c| !c.is_cancelled())
    }
}

impl Drop for FlushScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn flush_loop<F>(interval: Duration, cancel: CancellationToken, tick: F)
where
    F: Fn() -> bool,
{
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    ticker.tick().await; // Skip immediate tick.

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                if !tick() {
                    break;
                }
            }
        }
    }
}
