use std::sync::Mutex;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use dashmap::DashMap;
use tokio::sync::mpsc;

use warden_common::conditions::{update_condition, Condition};
use warden_common::keys::pool_key;
use warden_common::records::{
    ClusterQueryConnector, QueryConnector, RulerAction, SearchRule, Secret,
};
use warden_workers::dispatch::{SecretReadError, SecretReader};
use warden_workers::evaluate::{ConnectorReader, ReadError, ResolvedConnector};

use super::{
    ConnectorRecord, EventKind, ObjectStore, RecordKind, RecordRef, StoreError, WatchEvent,
    FINALIZER,
};

/// Reference implementation of the object-store seam: records live in
/// process-local maps and change notifications fan out over registered
/// channels. The binary feeds it from manifests; tests drive it directly.
#[derive(Default)]
pub struct InMemoryStore {
    connectors: DashMap<String, QueryConnector>,
    cluster_connectors: DashMap<String, ClusterQueryConnector>,
    rules: DashMap<String, SearchRule>,
    actions: DashMap<String, RulerAction>,
    secrets: DashMap<String, Secret>,
    conditions: DashMap<String, Vec<Condition>>,
    watchers: Mutex<Watchers>,
}

#[derive(Default)]
struct Watchers {
    connectors: Vec<mpsc::Sender<WatchEvent<ConnectorRecord>>>,
    rules: Vec<mpsc::Sender<WatchEvent<SearchRule>>>,
    actions: Vec<mpsc::Sender<WatchEvent<RulerAction>>>,
    secrets: Vec<mpsc::Sender<WatchEvent<Secret>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe_connectors(&self, tx: mpsc::Sender<WatchEvent<ConnectorRecord>>) {
        self.watchers.lock().unwrap().connectors.push(tx);
    }

    pub fn subscribe_rules(&self, tx: mpsc::Sender<WatchEvent<SearchRule>>) {
        self.watchers.lock().unwrap().rules.push(tx);
    }

    pub fn subscribe_actions(&self, tx: mpsc::Sender<WatchEvent<RulerAction>>) {
        self.watchers.lock().unwrap().actions.push(tx);
    }

    pub fn subscribe_secrets(&self, tx: mpsc::Sender<WatchEvent<Secret>>) {
        self.watchers.lock().unwrap().secrets.push(tx);
    }

    pub async fn apply_query_connector(&self, record: QueryConnector) {
        let key = record.metadata.pool_key();
        let kind = if self.connectors.insert(key, record.clone()).is_some() {
            EventKind::Updated
        } else {
            EventKind::Created
        };
        let txs = self.watchers.lock().unwrap().connectors.clone();
        notify(txs, kind, ConnectorRecord::Namespaced(record)).await;
    }

    pub async fn delete_query_connector(&self, namespace: &str, name: &str) {
        if let Some((_, record)) = self.connectors.remove(&pool_key(namespace, name)) {
            let txs = self.watchers.lock().unwrap().connectors.clone();
            notify(txs, EventKind::Deleted, ConnectorRecord::Namespaced(record)).await;
        }
    }

    pub async fn apply_cluster_query_connector(&self, record: ClusterQueryConnector) {
        let kind = if self
            .cluster_connectors
            .insert(record.metadata.name.clone(), record.clone())
            .is_some()
        {
            EventKind::Updated
        } else {
            EventKind::Created
        };
        let txs = self.watchers.lock().unwrap().connectors.clone();
        notify(txs, kind, ConnectorRecord::Cluster(record)).await;
    }

    pub async fn delete_cluster_query_connector(&self, name: &str) {
        if let Some((_, record)) = self.cluster_connectors.remove(name) {
            let txs = self.watchers.lock().unwrap().connectors.clone();
            notify(txs, EventKind::Deleted, ConnectorRecord::Cluster(record)).await;
        }
    }

    pub async fn apply_search_rule(&self, record: SearchRule) {
        let key = record.metadata.pool_key();
        let kind = if self.rules.insert(key, record.clone()).is_some() {
            EventKind::Updated
        } else {
            EventKind::Created
        };
        let txs = self.watchers.lock().unwrap().rules.clone();
        notify(txs, kind, record).await;
    }

    pub async fn delete_search_rule(&self, namespace: &str, name: &str) {
        if let Some((_, record)) = self.rules.remove(&pool_key(namespace, name)) {
            let txs = self.watchers.lock().unwrap().rules.clone();
            notify(txs, EventKind::Deleted, record).await;
        }
    }

    pub async fn apply_ruler_action(&self, record: RulerAction) {
        let key = record.metadata.pool_key();
        let kind = if self.actions.insert(key, record.clone()).is_some() {
            EventKind::Updated
        } else {
            EventKind::Created
        };
        let txs = self.watchers.lock().unwrap().actions.clone();
        notify(txs, kind, record).await;
    }

    pub async fn delete_ruler_action(&self, namespace: &str, name: &str) {
        if let Some((_, record)) = self.actions.remove(&pool_key(namespace, name)) {
            let txs = self.watchers.lock().unwrap().actions.clone();
            notify(txs, EventKind::Deleted, record).await;
        }
    }

    pub async fn apply_secret(&self, record: Secret) {
        let key = record.metadata.pool_key();
        let kind = if self.secrets.insert(key, record.clone()).is_some() {
            EventKind::Updated
        } else {
            EventKind::Created
        };
        let txs = self.watchers.lock().unwrap().secrets.clone();
        notify(txs, kind, record).await;
    }

    pub async fn delete_secret(&self, namespace: &str, name: &str) {
        if let Some((_, record)) = self.secrets.remove(&pool_key(namespace, name)) {
            let txs = self.watchers.lock().unwrap().secrets.clone();
            notify(txs, EventKind::Deleted, record).await;
        }
    }

    pub fn conditions_for(&self, target: &RecordRef) -> Vec<Condition> {
        self.conditions
            .get(&target.to_string())
            .map(|c| c.clone())
            .unwrap_or_default()
    }

    pub fn finalizers_for(&self, target: &RecordRef) -> Vec<String> {
        let key = target.pool_key();
        match target.kind {
            RecordKind::QueryConnector => self
                .connectors
                .get(&key)
                .map(|r| r.metadata.finalizers.clone()),
            RecordKind::ClusterQueryConnector => self
                .cluster_connectors
                .get(&target.name)
                .map(|r| r.metadata.finalizers.clone()),
            RecordKind::SearchRule => self.rules.get(&key).map(|r| r.metadata.finalizers.clone()),
            RecordKind::RulerAction => {
                self.actions.get(&key).map(|r| r.metadata.finalizers.clone())
            }
            RecordKind::Secret => self.secrets.get(&key).map(|r| r.metadata.finalizers.clone()),
        }
        .unwrap_or_default()
    }
}

async fn notify<T: Clone>(txs: Vec<mpsc::Sender<WatchEvent<T>>>, kind: EventKind, record: T) {
    for tx in txs {
        let event = WatchEvent {
            kind,
            record: record.clone(),
        };
        if tx.send(event).await.is_err() {
            tracing::debug!("watch subscriber dropped, event skipped");
        }
    }
}

fn toggle_finalizer(finalizers: &mut Vec<String>, attached: bool) {
    let present = finalizers.iter().any(|f| f == FINALIZER);
    if attached && !present {
        finalizers.push(FINALIZER.to_string());
    } else if !attached && present {
        finalizers.retain(|f| f != FINALIZER);
    }
}

#[async_trait]
impl ObjectStore for InMemoryStore {
    async fn update_conditions(
        &self,
        target: &RecordRef,
        conditions: Vec<Condition>,
    ) -> Result<(), StoreError> {
        let mut stored = self.conditions.entry(target.to_string()).or_default();
        for condition in conditions {
            update_condition(&mut stored, condition);
        }
        Ok(())
    }

    async fn set_finalizer(&self, target: &RecordRef, attached: bool) -> Result<(), StoreError> {
        let key = target.pool_key();
        match target.kind {
            RecordKind::QueryConnector => {
                if let Some(mut record) = self.connectors.get_mut(&key) {
                    toggle_finalizer(&mut record.metadata.finalizers, attached);
                }
            }
            RecordKind::ClusterQueryConnector => {
                if let Some(mut record) = self.cluster_connectors.get_mut(&target.name) {
                    toggle_finalizer(&mut record.metadata.finalizers, attached);
                }
            }
            RecordKind::SearchRule => {
                if let Some(mut record) = self.rules.get_mut(&key) {
                    toggle_finalizer(&mut record.metadata.finalizers, attached);
                }
            }
            RecordKind::RulerAction => {
                if let Some(mut record) = self.actions.get_mut(&key) {
                    toggle_finalizer(&mut record.metadata.finalizers, attached);
                }
            }
            RecordKind::Secret => {
                if let Some(mut record) = self.secrets.get_mut(&key) {
                    toggle_finalizer(&mut record.metadata.finalizers, attached);
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ConnectorReader for InMemoryStore {
    async fn resolve_connector(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<ResolvedConnector>, ReadError> {
        if let Some(qc) = self.connectors.get(&pool_key(namespace, name)) {
            return Ok(Some(ResolvedConnector {
                name: qc.metadata.name.clone(),
                cluster_scoped: false,
                spec: qc.spec.clone(),
            }));
        }
        if let Some(qc) = self.cluster_connectors.get(name) {
            return Ok(Some(ResolvedConnector {
                name: qc.metadata.name.clone(),
                cluster_scoped: true,
                spec: qc.spec.clone(),
            }));
        }
        Ok(None)
    }
}

#[async_trait]
impl SecretReader for InMemoryStore {
    async fn secret_value(
        &self,
        namespace: &str,
        name: &str,
        key: &str,
    ) -> Result<Option<String>, SecretReadError> {
        let Some(secret) = self.secrets.get(&pool_key(namespace, name)) else {
            return Ok(None);
        };
        let Some(encoded) = secret.data.get(key) else {
            return Ok(None);
        };
        let decoded = STANDARD
            .decode(encoded)
            .map_err(|e| SecretReadError(format!("key {key} of {namespace}/{name}: {e}")))?;
        String::from_utf8(decoded)
            .map(Some)
            .map_err(|e| SecretReadError(format!("key {key} of {namespace}/{name}: {e}")))
    }
}
