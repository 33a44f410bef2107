use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use warden_common::conditions::{
    new_condition, REASON_ALERT_FIRING, REASON_NORMAL, REASON_PENDING_FIRING,
    REASON_PENDING_RESOLVING, REASON_SYNC_FAILED, REASON_TARGET_SYNCED, STATUS_FALSE,
    STATUS_TRUE, TYPE_RESOURCE_SYNCED, TYPE_STATE,
};
use warden_common::interval::{parse_interval, DEFAULT_REQUEUE};
use warden_common::records::SearchRule;
use warden_workers::evaluate::Evaluator;
use warden_workers::locks::KeyLocks;
use warden_workers::pools::{AlertsPool, RulesPool};
use warden_workers::state::RuleState;

use super::scheduler::WorkerScheduler;
use crate::store::{EventKind, ObjectStore, RecordKind, RecordRef, WatchEvent};

pub struct SearchRuleReconciler {
    store: Arc<dyn ObjectStore>,
    evaluator: Arc<Evaluator>,
    rules: RulesPool,
    alerts: AlertsPool,
    locks: KeyLocks,
    scheduler: WorkerScheduler,
    requeue: mpsc::Sender<WatchEvent<SearchRule>>,
}

impl SearchRuleReconciler {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        evaluator: Arc<Evaluator>,
        rules: RulesPool,
        alerts: AlertsPool,
        locks: KeyLocks,
        scheduler: WorkerScheduler,
        requeue: mpsc::Sender<WatchEvent<SearchRule>>,
    ) -> Self {
        Self {
            store,
            evaluator,
            rules,
            alerts,
            locks,
            scheduler,
            requeue,
        }
    }

    pub async fn run(
        self,
        mut events: mpsc::Receiver<WatchEvent<SearchRule>>,
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

    async fn reconcile(&self, event: WatchEvent<SearchRule>) {
        let rule = event.record;
        let key = rule.metadata.pool_key();
        let target = RecordRef::new(
            RecordKind::SearchRule,
            &rule.metadata.namespace,
            &rule.metadata.name,
        );

        if event.kind == EventKind::Deleted {
            if let Err(e) = self.store.set_finalizer(&target, false).await {
                tracing::warn!(rule = %key, error = %e, "finalizer removal failed");
            }
            self.scheduler.unschedule(&key);
            self.rules.delete(&key);
            self.alerts.delete(&key);
            self.locks.remove(&key);
            tracing::info!(rule = %key, "rule removed, worker stopped");
            return;
        }

        if let Err(e) = self.store.set_finalizer(&target, true).await {
            tracing::warn!(rule = %key, error = %e, "finalizer attach failed");
        }

        let interval = match parse_interval(&rule.spec.check_interval) {
            Ok(interval) => interval,
            Err(e) => {
                tracing::warn!(rule = %key, error = %e, "invalid checkInterval");
                let condition = new_condition(
                    TYPE_RESOURCE_SYNCED,
                    STATUS_FALSE,
                    REASON_SYNC_FAILED,
                    e.to_string(),
                );
                if let Err(e) = self.store.update_conditions(&target, vec![condition]).await {
                    tracing::warn!(rule = %key, error = %e, "condition update failed");
                }
                self.requeue_later(rule);
                return;
            }
        };

        let tick = {
            let evaluator = self.evaluator.clone();
            let store = self.store.clone();
            let locks = self.locks.clone();
            let key = key.clone();
            move || {
                let evaluator = evaluator.clone();
                let store = store.clone();
                let locks = locks.clone();
                let key = key.clone();
                let rule = rule.clone();
                let target = target.clone();
                async move {
                    let Some(_guard) = locks.try_acquire(&key) else {
                        tracing::debug!(rule = %key, "evaluation in flight, tick dropped");
                        return;
                    };

                    let conditions = match evaluator.evaluate(&rule).await {
                        Ok(state) => vec![
                            new_condition(
                                TYPE_RESOURCE_SYNCED,
                                STATUS_TRUE,
                                REASON_TARGET_SYNCED,
                                "rule evaluated",
                            ),
                            new_condition(
                                TYPE_STATE,
                                STATUS_TRUE,
                                state_reason(&state),
                                format!("rule is in {} state", state.name()),
                            ),
                        ],
                        Err(e) => {
                            tracing::warn!(rule = %key, error = %e, "evaluation failed");
                            vec![
                                new_condition(
                                    TYPE_RESOURCE_SYNCED,
                                    STATUS_FALSE,
                                    REASON_SYNC_FAILED,
                                    "evaluation failed, see State condition",
                                ),
                                new_condition(TYPE_STATE, STATUS_TRUE, e.reason(), e.to_string()),
                            ]
                        }
                    };

                    if let Err(e) = store.update_conditions(&target, conditions).await {
                        tracing::warn!(rule = %key, error = %e, "condition update failed");
                    }
                }
            }
        };
        self.scheduler.schedule(key, interval, tick);
    }

    fn requeue_later(&self, rule: SearchRule) {
        let requeue = self.requeue.clone();
        tokio::spawn(async move {
            tokio::time::sleep(DEFAULT_REQUEUE).await;
            let _ = requeue
                .send(WatchEvent {
                    kind: EventKind::Updated,
                    record: rule,
                })
                .await;
        });
    }
}

fn state_reason(state: &RuleState) -> &'static str {
    match state {
        RuleState::Normal => REASON_NORMAL,
        RuleState::PendingFiring { .. } => REASON_PENDING_FIRING,
        RuleState::Firing { .. } => REASON_ALERT_FIRING,
        RuleState::PendingResolving { .. } => REASON_PENDING_RESOLVING,
    }
}
