//! Fire-and-forget side effects.
//!
//! Every call toward the platform that must not hold up a state transition is
//! spawned through `EffectSink::spawn`. Failures end here: they are logged and
//! counted, never retried, never returned.

use std::fmt::Display;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;

#[derive(Debug, Default)]
pub struct EffectSink {
    tasks: Mutex<Vec<JoinHandle<()>>>,
    failures: AtomicU64,
}

impl EffectSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn spawn<F, E>(self: &Arc<Self>, effect: &'static str, channel_id: u64, fut: F)
    where
        F: Future<Output = Result<(), E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        let sink = Arc::clone(self);
        let handle = tokio::spawn(async move {
            if let Err(e) = fut.await {
                sink.report(effect, channel_id, &e);
            }
        });

        let mut tasks = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
        tasks.retain(|t| !t.is_finished());
        tasks.push(handle);
    }

    pub fn report(&self, effect: &'static str, channel_id: u64, error: &dyn Display) {
        self.failures.fetch_add(1, Ordering::Relaxed);
        tracing::warn!(effect, channel_id, error = %error, "side effect failed");
    }

    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    /// Waits until every spawned effect, including ones spawned by effects,
    /// has finished.
    pub async fn settle(&self) {
        loop {
            let batch: Vec<JoinHandle<()>> = {
                let mut tasks = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
                std::mem::take(&mut *tasks)
            };
            if batch.is_empty() {
                return;
            }
            for task in batch {
                if let Err(e) = task.await {
                    tracing::error!(error = %e, "side effect task panicked");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GatewayError;

    #[tokio::test]
    async fn test_failures_are_counted_not_propagated() {
        let sink = EffectSink::new();
        sink.spawn("ok", 1, async { Ok::<(), String>(()) });
        sink.spawn("boom", 2, async { Err::<(), String>("nope".to_string()) });
        sink.settle().await;
        assert_eq!(sink.failures(), 1);

        // a reference gone stale is reported like any other failure
        sink.spawn("stale", 3, async { Err::<(), GatewayError>(GatewayError::ChannelNotFound(3)) });
        sink.settle().await;
        assert_eq!(sink.failures(), 2);
    }

    #[tokio::test]
    async fn test_settle_waits_for_nested_effects() {
        let sink = EffectSink::new();
        let inner = Arc::clone(&sink);
        sink.spawn("outer", 1, async move {
            inner.spawn("inner", 1, async { Err::<(), String>("late".to_string()) });
            Ok::<(), String>(())
        });
        sink.settle().await;
        assert_eq!(sink.failures(), 1);
    }
}
