use std::{future::Future, sync::Arc, time::Duration};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::time::TimeSource;

use super::clock::DriftCorrectedInterval;

const ENABLE_LOGS: bool = true;

use crate::log_debug;

/// What the tick handler wants the clock to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickDisposition {
    Continue,
    /// Re-anchor the schedule at the current time (a new phase auto-started).
    Restart,
    Stop,
}

/// A running clock task. Dropping the handle cancels it.
pub struct TickerHandle {
    cancel_token: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl TickerHandle {
    /// Spawns a clock that awaits `on_tick` once per interval.
    ///
    /// Ticks are strictly sequential: the next sleep only begins after the
    /// previous handler future completes.
    pub fn spawn<F, Fut>(time: Arc<dyn TimeSource>, interval_ms: i64, mut on_tick: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = TickDisposition> + Send + 'static,
    {
        let cancel_token = CancellationToken::new();
        let token = cancel_token.clone();

        let handle = tokio::spawn(async move {
            let mut interval = DriftCorrectedInterval::new(interval_ms);
            let mut delay_ms = interval.start(time.now_ms());

            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(Duration::from_millis(delay_ms.max(0) as u64)) => {}
                }

                let fire = interval.fire(time.now_ms());
                if fire.resynced {
                    log_debug!("Clock callback {}ms late; resynchronized", fire.drift_ms);
                }

                if token.is_cancelled() {
                    break;
                }

                match on_tick().await {
                    TickDisposition::Continue => delay_ms = fire.next_delay_ms,
                    TickDisposition::Restart => delay_ms = interval.start(time.now_ms()),
                    TickDisposition::Stop => break,
                }
            }

            interval.stop();
        });

        Self {
            cancel_token,
            handle: Some(handle),
        }
    }

    pub fn cancel(&self) {
        self.cancel_token.cancel();
        if let Some(handle) = &self.handle {
            handle.abort();
        }
    }

    pub fn is_finished(&self) -> bool {
        self.handle
            .as_ref()
            .map(JoinHandle::is_finished)
            .unwrap_or(true)
    }

    /// Waits for the clock task to exit on its own.
    pub async fn join(mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for TickerHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}
