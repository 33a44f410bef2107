use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Owns the long-lived worker task of each rule and action, keyed by pool
/// key. Rescheduling a key aborts its previous task; cancellation of the
/// root token stops them all.
#[derive(Clone)]
pub struct WorkerScheduler {
    tasks: Arc<DashMap<String, JoinHandle<()>>>,
    cancel: CancellationToken,
}

impl WorkerScheduler {
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            tasks: Arc::new(DashMap::new()),
            cancel,
        }
    }

    /// Runs `tick` every `interval`, starting immediately.
    pub fn schedule<F, Fut>(&self, key: String, interval: Duration, tick: F)
    where
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send,
    {
        let cancel = self.cancel.clone();
        let handle = tokio::spawn(async move {
            let mut timer = tokio::time::interval(interval);
            timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = timer.tick() => tick().await,
                }
            }
        });
        if let Some(previous) = self.tasks.insert(key, handle) {
            previous.abort();
        }
    }

    /// Like [`schedule`](Self::schedule), with an additional wake channel:
    /// each nudge runs one out-of-band tick.
    pub fn schedule_with_nudge<F, Fut>(
        &self,
        key: String,
        interval: Duration,
        mut nudge: mpsc::Receiver<()>,
        tick: F,
    ) where
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send,
    {
        let cancel = self.cancel.clone();
        let handle = tokio::spawn(async move {
            let mut timer = tokio::time::interval(interval);
            timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = timer.tick() => tick().await,
                    Some(()) = nudge.recv() => tick().await,
                }
            }
        });
        if let Some(previous) = self.tasks.insert(key, handle) {
            previous.abort();
        }
    }

    pub fn unschedule(&self, key: &str) {
        if let Some((_, handle)) = self.tasks.remove(key) {
            handle.abort();
        }
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn ticks_repeatedly_until_unscheduled() {
        let scheduler = WorkerScheduler::new(CancellationToken::new());
        let count = Arc::new(AtomicUsize::new(0));

        let counter = count.clone();
        scheduler.schedule("ns_rule".into(), Duration::from_millis(10), move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        tokio::time::sleep(Duration::from_millis(100)).await;
        scheduler.unschedule("ns_rule");
        let seen = count.load(Ordering::SeqCst);
        assert!(seen >= 3, "expected several ticks, saw {seen}");

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(count.load(Ordering::SeqCst), seen);
    }

    #[tokio::test]
    async fn reschedule_replaces_previous_task() {
        let scheduler = WorkerScheduler::new(CancellationToken::new());
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        let counter = first.clone();
        scheduler.schedule("ns_rule".into(), Duration::from_millis(5), move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });
        tokio::time::sleep(Duration::from_millis(30)).await;

        let counter = second.clone();
        scheduler.schedule("ns_rule".into(), Duration::from_millis(5), move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });
        tokio::time::sleep(Duration::from_millis(30)).await;

        assert_eq!(scheduler.len(), 1);
        let stalled = first.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(first.load(Ordering::SeqCst), stalled);
        assert!(second.load(Ordering::SeqCst) >= 3);
    }

    #[tokio::test]
    async fn cancellation_stops_everything() {
        let cancel = CancellationToken::new();
        let scheduler = WorkerScheduler::new(cancel.clone());
        let count = Arc::new(AtomicUsize::new(0));

        let counter = count.clone();
        scheduler.schedule("ns_rule".into(), Duration::from_millis(5), move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();
        tokio::time::sleep(Duration::from_millis(20)).await;
        let seen = count.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(count.load(Ordering::SeqCst), seen);
    }

    #[tokio::test]
    async fn nudge_triggers_out_of_band_tick() {
        let scheduler = WorkerScheduler::new(CancellationToken::new());
        let count = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = mpsc::channel(1);

        let counter = count.clone();
        scheduler.schedule_with_nudge(
            "ns_action".into(),
            Duration::from_secs(3600),
            rx,
            move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                }
            },
        );

        // One immediate tick from the interval, then one per nudge.
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);

        tx.send(()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }
}
