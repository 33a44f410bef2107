use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use warden_common::conditions::{
    new_condition, REASON_SYNC_FAILED, REASON_TARGET_SYNCED, STATUS_FALSE, STATUS_TRUE,
    TYPE_RESOURCE_SYNCED, TYPE_STATE,
};
use warden_common::interval::{parse_interval, DEFAULT_REQUEUE};
use warden_common::records::RulerAction;
use warden_workers::dispatch::Dispatcher;
use warden_workers::locks::KeyLocks;

use super::scheduler::WorkerScheduler;
use crate::events::NudgeRouter;
use crate::store::{EventKind, ObjectStore, RecordKind, RecordRef, WatchEvent};

pub struct RulerActionReconciler {
    store: Arc<dyn ObjectStore>,
    dispatcher: Arc<Dispatcher>,
    locks: KeyLocks,
    scheduler: WorkerScheduler,
    router: NudgeRouter,
    requeue: mpsc::Sender<WatchEvent<RulerAction>>,
}

impl RulerActionReconciler {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        dispatcher: Arc<Dispatcher>,
        locks: KeyLocks,
        scheduler: WorkerScheduler,
        router: NudgeRouter,
        requeue: mpsc::Sender<WatchEvent<RulerAction>>,
    ) -> Self {
        Self {
            store,
            dispatcher,
            locks,
            scheduler,
            router,
            requeue,
        }
    }

    pub async fn run(
        self,
        mut events: mpsc::Receiver<WatchEvent<RulerAction>>,
        cancel: CancellationToken,
    ) {
        loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => break,
                event = events.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
            };
            self.reconcile(event).await;
        }
    }

    async fn reconcile(&self, event: WatchEvent<RulerAction>) {
        let action = event.record;
        let key = action.metadata.pool_key();
        let target = RecordRef::new(
            RecordKind::RulerAction,
            &action.metadata.namespace,
            &action.metadata.name,
        );

        if event.kind == EventKind::Deleted {
            if let Err(e) = self.store.set_finalizer(&target, false).await {
                tracing::warn!(action = %key, error = %e, "finalizer removal failed");
            }
            self.scheduler.unschedule(&key);
            self.router.unregister(&key);
            self.locks.remove(&key);
            tracing::info!(action = %key, "action removed, worker stopped");
            return;
        }

        if let Err(e) = self.store.set_finalizer(&target, true).await {
            tracing::warn!(action = %key, error = %e, "finalizer attach failed");
        }

        let interval = match parse_interval(&action.spec.firing_interval) {
            Ok(interval) => interval,
            Err(e) => {
                tracing::warn!(action = %key, error = %e, "invalid firingInterval");
                let condition = new_condition(
                    TYPE_RESOURCE_SYNCED,
                    STATUS_FALSE,
                    REASON_SYNC_FAILED,
                    e.to_string(),
                );
                if let Err(e) = self.store.update_conditions(&target, vec![condition]).await {
                    tracing::warn!(action = %key, error = %e, "condition update failed");
                }
                self.requeue_later(action);
                return;
            }
        };

        // The AlertFiring nudge channel wakes the worker between intervals.
        let nudges = self.router.register(key.clone());

        let tick = {
            let dispatcher = self.dispatcher.clone();
            let store = self.store.clone();
            let locks = self.locks.clone();
            let key = key.clone();
            move || {
                let dispatcher = dispatcher.clone();
                let store = store.clone();
                let locks = locks.clone();
                let key = key.clone();
                let action = action.clone();
                let target = target.clone();
                async move {
                    let Some(_guard) = locks.try_acquire(&key) else {
                        tracing::debug!(action = %key, "dispatch in flight, tick dropped");
                        return;
                    };

                    let conditions = match dispatcher.dispatch(&action).await {
                        Ok(outcome) => {
                            let mut conditions = vec![new_condition(
                                TYPE_RESOURCE_SYNCED,
                                STATUS_TRUE,
                                REASON_TARGET_SYNCED,
                                format!("{} alerts delivered", outcome.delivered),
                            )];
                            if let Some(failure) = outcome.failures.first() {
                                conditions.push(new_condition(
                                    TYPE_STATE,
                                    STATUS_TRUE,
                                    failure.reason,
                                    failure.message.clone(),
                                ));
                            }
                            conditions
                        }
                        Err(e) => {
                            tracing::warn!(action = %key, error = %e, "dispatch failed");
                            vec![
                                new_condition(
                                    TYPE_RESOURCE_SYNCED,
                                    STATUS_FALSE,
                                    REASON_SYNC_FAILED,
                                    "dispatch failed, see State condition",
                                ),
                                new_condition(TYPE_STATE, STATUS_TRUE, e.reason(), e.to_string()),
                            ]
                        }
                    };

                    if let Err(e) = store.update_conditions(&target, conditions).await {
                        tracing::warn!(action = %key, error = %e, "condition update failed");
                    }
                }
            }
        };
        self.scheduler.schedule_with_nudge(key, interval, nudges, tick);
    }

    fn requeue_later(&self, action: RulerAction) {
        let requeue = self.requeue.clone();
        tokio::spawn(async move {
            tokio::time::sleep(DEFAULT_REQUEUE).await;
            let _ = requeue
                .send(WatchEvent {
                    kind: EventKind::Updated,
                    record: action,
                })
                .await;
        });
    }
}
