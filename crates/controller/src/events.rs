use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use warden_workers::events::EngineEvent;

/// Routes engine events to per-action wake channels. A nudge is
/// best-effort: if one is already pending for an action, the new one is
/// dropped, the pending tick will see the same pool state.
#[derive(Clone, Default)]
pub struct NudgeRouter {
    targets: Arc<DashMap<String, mpsc::Sender<()>>>,
}

impl NudgeRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or replaces) the wake channel for an action key and hands
    /// back its receiving end.
    pub fn register(&self, action_key: String) -> mpsc::Receiver<()> {
        let (tx, rx) = mpsc::channel(1);
        self.targets.insert(action_key, tx);
        rx
    }

    pub fn unregister(&self, action_key: &str) {
        self.targets.remove(action_key);
    }

    /// Consumes the engine event stream until cancellation.
    pub fn spawn(
        self,
        mut events: mpsc::Receiver<EngineEvent>,
        cancel: CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    _ = cancel.cancelled() => break,
                    event = events.recv() => match event {
                        Some(event) => event,
                        None => break,
                    },
                };

                let key = event.action_key();
                match self.targets.get(&key) {
                    Some(tx) => {
                        if tx.try_send(()).is_err() {
                            tracing::debug!(action = %key, "nudge already pending");
                        }
                    }
                    None => {
                        tracing::debug!(action = %key, reason = event.reason(), "event for unknown action");
                    }
                }
            }
        })
    }
}
