use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use warden_workers::dispatch::Dispatcher;
use warden_workers::evaluate::Evaluator;
use warden_workers::locks::KeyLocks;
use warden_workers::pools::{AlertsPool, CredentialsPool, RulesPool};
use warden_workers::validators::ValidatorRegistry;

use crate::events::NudgeRouter;
use crate::manifest::{self, Manifest};
use crate::reconcile::{
    QueryConnectorReconciler, RulerActionReconciler, SearchRuleReconciler, WorkerScheduler,
};
use crate::shutdown;
use crate::store::memory::InMemoryStore;

/// A fully wired engine: pools, evaluator, dispatcher, reconcilers and the
/// event router, all hanging off one root cancellation token.
pub struct Engine {
    pub store: Arc<InMemoryStore>,
    pub credentials: CredentialsPool,
    pub rules: RulesPool,
    pub alerts: AlertsPool,
    cancel: CancellationToken,
}

impl Engine {
    pub fn start(store: Arc<InMemoryStore>, cancel: CancellationToken) -> anyhow::Result<Engine> {
        let credentials = CredentialsPool::new();
        let rules = RulesPool::new();
        let alerts = AlertsPool::new();

        let (engine_events_tx, engine_events_rx) = mpsc::channel(64);

        let evaluator = Arc::new(
            Evaluator::new(
                store.clone(),
                credentials.clone(),
                rules.clone(),
                alerts.clone(),
                engine_events_tx,
            )
            .context("building HTTP clients")?,
        );
        let dispatcher = Arc::new(Dispatcher::new(
            alerts.clone(),
            store.clone(),
            ValidatorRegistry::builtin(),
        ));

        let router = NudgeRouter::new();
        router.clone().spawn(engine_events_rx, cancel.clone());

        let (connector_tx, connector_rx) = mpsc::channel(64);
        let (secret_tx, secret_rx) = mpsc::channel(64);
        let (rule_tx, rule_rx) = mpsc::channel(64);
        let (action_tx, action_rx) = mpsc::channel(64);
        store.subscribe_connectors(connector_tx.clone());
        store.subscribe_secrets(secret_tx);
        store.subscribe_rules(rule_tx.clone());
        store.subscribe_actions(action_tx.clone());

        let connector_reconciler = QueryConnectorReconciler::new(
            store.clone(),
            store.clone(),
            credentials.clone(),
            connector_tx,
        );
        tokio::spawn(connector_reconciler.run(connector_rx, secret_rx, cancel.clone()));

        let rule_reconciler = SearchRuleReconciler::new(
            store.clone(),
            evaluator,
            rules.clone(),
            alerts.clone(),
            KeyLocks::new(),
            WorkerScheduler::new(cancel.clone()),
            rule_tx,
        );
        tokio::spawn(rule_reconciler.run(rule_rx, cancel.clone()));

        let action_reconciler = RulerActionReconciler::new(
            store.clone(),
            dispatcher,
            KeyLocks::new(),
            WorkerScheduler::new(cancel.clone()),
            router,
            action_tx,
        );
        tokio::spawn(action_reconciler.run(action_rx, cancel.clone()));

        Ok(Engine {
            store,
            credentials,
            rules,
            alerts,
            cancel,
        })
    }

    pub async fn apply(&self, manifest: Manifest) {
        match manifest {
            Manifest::QueryConnector(record) => self.store.apply_query_connector(record).await,
            Manifest::ClusterQueryConnector(record) => {
                self.store.apply_cluster_query_connector(record).await
            }
            Manifest::SearchRule(record) => self.store.apply_search_rule(record).await,
            Manifest::RulerAction(record) => self.store.apply_ruler_action(record).await,
            Manifest::Secret(record) => self.store.apply_secret(record).await,
        }
    }

    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

pub async fn run(manifests_dir: &Path) -> anyhow::Result<()> {
    let manifests = manifest::load_dir(manifests_dir)
        .with_context(|| format!("loading manifests from {}", manifests_dir.display()))?;
    if manifests.is_empty() {
        tracing::warn!(dir = %manifests_dir.display(), "no manifests found");
    }

    let cancel = CancellationToken::new();
    let engine = Engine::start(Arc::new(InMemoryStore::new()), cancel.clone())?;
    for record in manifests {
        engine.apply(record).await;
    }

    tracing::info!("engine running");
    shutdown::wait_for_shutdown(cancel).await;
    tracing::info!("engine stopped");
    Ok(())
}
