use parking_lot::Mutex;
use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Runs an async task repeatedly at a fixed interval until stopped.
///
/// Backs the cluster inquire and inform loops. The task body is awaited to
/// completion before the next tick is scheduled.
pub struct IntervalRunner {
    interval: Duration,
    stop_tx: watch::Sender<bool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl IntervalRunner {
    pub fn new(interval: Duration) -> Self {
        let (stop_tx, _) = watch::channel(false);
        Self {
            interval,
            stop_tx,
            handle: Mutex::new(None),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Start ticking. A second start replaces a previously finished task but
    /// callers are expected to start each runner once.
    pub fn start<F, Fut>(&self, mut task: F)
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send,
    {
        let mut stop_rx = self.stop_tx.subscribe();
        let interval = self.interval;
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = stop_rx.changed() => break,
                    _ = tokio::time::sleep(interval) => task().await,
                }
            }
        });
        *self.handle.lock() = Some(handle);
    }

    /// Signal the loop to stop and wait for it to exit.
    pub async fn stop(&self) {
        let _ = self.stop_tx.send(true);
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }
}

impl std::fmt::Debug for IntervalRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IntervalRunner")
            .field("interval", &self.interval)
            .finish()
    }
}
