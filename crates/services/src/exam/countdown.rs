use std::future::Future;
use std::ops::ControlFlow;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Cadence of the exam countdown.
pub const TICK_PERIOD: Duration = Duration::from_secs(1);

/// A running countdown task.
///
/// Ticks are scheduled against the runtime clock starting one period after
/// spawn, so late ticks do not push later ones back. The task stops when the
/// tick callback breaks, on `cancel`, or when the handle is dropped. A tick
/// already in progress is allowed to finish.
#[derive(Debug)]
pub struct Countdown {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl Countdown {
    /// Spawn the countdown on the current tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn spawn<F, Fut>(period: Duration, mut on_tick: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ControlFlow<()>> + Send + 'static,
    {
        let token = CancellationToken::new();
        let cancelled = token.clone();
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Burst);
            loop {
                tokio::select! {
                    biased;
                    () = cancelled.cancelled() => break,
                    _ = interval.tick() => {
                        if on_tick().await.is_break() {
                            break;
                        }
                    }
                }
            }
            tracing::trace!("countdown task finished");
        });
        Self { token, handle }
    }

    /// Stop issuing ticks.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Whether the task is still alive.
    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.token.is_cancelled() && !self.handle.is_finished()
    }
}

impl Drop for Countdown {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
