//! Elapsed-time ticker shown while waiting for the first fragment.

use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::AgentEvent;

/// Emits [`AgentEvent::Waiting`] every `interval` until stopped.
pub struct ProgressTicker {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl ProgressTicker {
    pub fn start(events: mpsc::UnboundedSender<AgentEvent>, interval: Duration) -> Self {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let handle = tokio::spawn(async move {
            let started = Instant::now();
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let elapsed_ms = started.elapsed().as_millis() as u64;
                        if events.send(AgentEvent::Waiting { elapsed_ms }).is_err() {
                            break;
                        }
                    }
                }
            }
        });
        Self { cancel, handle }
    }

    /// Cancel the ticker and wait until it has fully stopped, so nothing it
    /// emits can land after the caller's next event.
    pub async fn stop(self) {
        self.cancel.cancel();
        let _ = self.handle.await;
    }
}
