use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::queue::WebhookQueue;

/// Owns a background loop. Dropping the handle also ends the loop, but without
/// waiting for an in-flight tick; prefer [`ProcessorHandle::stop`].
pub struct ProcessorHandle {
    name: &'static str,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl ProcessorHandle {
    /// Signal shutdown and wait for the current tick to finish.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            tracing::error!("{} task ended abnormally: {e}", self.name);
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Start the periodic pending-job processor. The first batch runs immediately,
/// then one batch per `interval`. A slow batch delays the next tick rather than
/// overlapping with it.
pub fn spawn_processor(queue: Arc<WebhookQueue>, interval: Duration) -> ProcessorHandle {
    tracing::info!("Webhook processor started (interval {}ms)", interval.as_millis());

    spawn_periodic("webhook-processor", interval, move || {
        let queue = queue.clone();
        async move {
            let processed = queue.process_pending().await;
            if processed > 0 {
                tracing::debug!("Processed {processed} webhook jobs");
            }
        }
    })
}

/// Start the periodic sweep that deletes completed jobs older than
/// `retention_days`.
pub fn spawn_cleanup(
    queue: Arc<WebhookQueue>,
    interval: Duration,
    retention_days: u32,
) -> ProcessorHandle {
    tracing::info!(
        "Webhook cleanup started (interval {}s, retention {retention_days} days)",
        interval.as_secs()
    );

    spawn_periodic("webhook-cleanup", interval, move || {
        let queue = queue.clone();
        async move {
            if let Err(e) = queue.cleanup(retention_days).await {
                tracing::error!("Webhook cleanup failed: {e}");
            }
        }
    })
}

fn spawn_periodic<F, Fut>(name: &'static str, interval: Duration, mut tick: F) -> ProcessorHandle
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let (shutdown, mut shutdown_rx) = watch::channel(false);

    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown_rx.changed() => break,
            }

            if *shutdown_rx.borrow() {
                break;
            }

            tick().await;
        }

        tracing::info!("{name} stopped");
    });

    ProcessorHandle {
        name,
        shutdown,
        task,
    }
}
