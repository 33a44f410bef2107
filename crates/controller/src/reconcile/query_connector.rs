use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use warden_common::conditions::{
    new_condition, Condition, REASON_NO_CREDS_FOUND, REASON_SYNC_FAILED, REASON_TARGET_SYNCED,
    STATUS_FALSE, STATUS_TRUE, TYPE_RESOURCE_SYNCED, TYPE_STATE,
};
use warden_common::interval::DEFAULT_REQUEUE;
use warden_common::keys::pool_key;
use warden_common::records::Secret;
use warden_workers::dispatch::SecretReader;
use warden_workers::pools::{Credentials, CredentialsPool};

use crate::store::{ConnectorRecord, EventKind, ObjectStore, WatchEvent};

/// Keeps the credentials pool in step with query connectors and the secrets
/// they reference. Also watches secret events so a rotated secret reaches
/// the pool within one reconcile cycle.
pub struct QueryConnectorReconciler {
    store: Arc<dyn ObjectStore>,
    secrets: Arc<dyn SecretReader>,
    credentials: CredentialsPool,
    requeue: mpsc::Sender<WatchEvent<ConnectorRecord>>,
}

impl QueryConnectorReconciler {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        secrets: Arc<dyn SecretReader>,
        credentials: CredentialsPool,
        requeue: mpsc::Sender<WatchEvent<ConnectorRecord>>,
    ) -> Self {
        Self {
            store,
            secrets,
            credentials,
            requeue,
        }
    }

    pub async fn run(
        self,
        mut events: mpsc::Receiver<WatchEvent<ConnectorRecord>>,
        mut secret_events: mpsc::Receiver<WatchEvent<Secret>>,
        cancel: CancellationToken,
    ) {
        // Which connectors reference which secret, and the latest record for
        // each connector so a secret change can re-run its sync.
        let mut by_secret: HashMap<String, HashSet<String>> = HashMap::new();
        let mut connectors: HashMap<String, ConnectorRecord> = HashMap::new();

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                event = events.recv() => match event {
                    Some(event) => {
                        self.reconcile(event, &mut by_secret, &mut connectors).await;
                    }
                    None => break,
                },
                event = secret_events.recv() => match event {
                    Some(event) => {
                        self.secret_changed(event, &by_secret, &connectors).await;
                    }
                    None => break,
                },
            }
        }
    }

    async fn reconcile(
        &self,
        event: WatchEvent<ConnectorRecord>,
        by_secret: &mut HashMap<String, HashSet<String>>,
        connectors: &mut HashMap<String, ConnectorRecord>,
    ) {
        let record = event.record;
        let key = record.pool_key();
        let target = record.record_ref();

        if event.kind == EventKind::Deleted {
            if let Err(e) = self.store.set_finalizer(&target, false).await {
                tracing::warn!(connector = %key, error = %e, "finalizer removal failed");
            }
            self.credentials.delete(&key);
            connectors.remove(&key);
            for referencing in by_secret.values_mut() {
                referencing.remove(&key);
            }
            tracing::info!(connector = %key, "connector removed, credentials dropped");
            return;
        }

        if let Err(e) = self.store.set_finalizer(&target, true).await {
            tracing::warn!(connector = %key, error = %e, "finalizer attach failed");
        }

        // The index follows the latest spec: drop stale secret links first.
        for referencing in by_secret.values_mut() {
            referencing.remove(&key);
        }
        connectors.insert(key.clone(), record.clone());
        if let (Some(namespace), Some(credentials)) =
            (record.secret_namespace(), record.spec().credentials.as_ref())
        {
            by_secret
                .entry(pool_key(&namespace, &credentials.secret_ref.name))
                .or_default()
                .insert(key.clone());
        }

        self.sync(&record).await;
    }

    /// Fetches the referenced secret and refreshes the pool entry. Called on
    /// connector events and again whenever the secret itself changes.
    async fn sync(&self, record: &ConnectorRecord) {
        let key = record.pool_key();
        let target = record.record_ref();

        let Some(credentials_ref) = record.spec().credentials.as_ref() else {
            // No credentials declared: nothing may linger in the pool.
            self.credentials.delete(&key);
            self.update_conditions(
                &target,
                vec![new_condition(
                    TYPE_RESOURCE_SYNCED,
                    STATUS_TRUE,
                    REASON_TARGET_SYNCED,
                    "connector synced",
                )],
            )
            .await;
            return;
        };

        let secret_ref = &credentials_ref.secret_ref;
        let namespace = record
            .secret_namespace()
            .unwrap_or_else(|| "default".to_string());

        let looked_up = async {
            let username = self
                .secrets
                .secret_value(&namespace, &secret_ref.name, &secret_ref.key_username)
                .await?;
            let password = self
                .secrets
                .secret_value(&namespace, &secret_ref.name, &secret_ref.key_password)
                .await?;
            Ok::<_, warden_workers::dispatch::SecretReadError>((username, password))
        }
        .await;

        match looked_up {
            Ok((Some(username), Some(password))) if !username.is_empty() && !password.is_empty() => {
                self.credentials.set(key.clone(), Credentials { username, password });
                self.update_conditions(
                    &target,
                    vec![new_condition(
                        TYPE_RESOURCE_SYNCED,
                        STATUS_TRUE,
                        REASON_TARGET_SYNCED,
                        "credentials synced",
                    )],
                )
                .await;
                tracing::info!(connector = %key, "credentials refreshed");
            }
            Ok(_) => {
                let message = format!(
                    "missing credentials in secret {namespace}/{}",
                    secret_ref.name
                );
                tracing::warn!(connector = %key, "{message}");
                self.update_conditions(
                    &target,
                    vec![
                        new_condition(TYPE_RESOURCE_SYNCED, STATUS_FALSE, REASON_SYNC_FAILED, ""),
                        new_condition(TYPE_STATE, STATUS_TRUE, REASON_NO_CREDS_FOUND, message),
                    ],
                )
                .await;
                self.requeue_later(record.clone());
            }
            Err(e) => {
                tracing::warn!(connector = %key, error = %e, "secret read failed");
                self.update_conditions(
                    &target,
                    vec![
                        new_condition(TYPE_RESOURCE_SYNCED, STATUS_FALSE, REASON_SYNC_FAILED, ""),
                        new_condition(
                            TYPE_STATE,
                            STATUS_TRUE,
                            REASON_NO_CREDS_FOUND,
                            e.to_string(),
                        ),
                    ],
                )
                .await;
                self.requeue_later(record.clone());
            }
        }
    }

    async fn secret_changed(
        &self,
        event: WatchEvent<Secret>,
        by_secret: &HashMap<String, HashSet<String>>,
        connectors: &HashMap<String, ConnectorRecord>,
    ) {
        let secret_key = event.record.metadata.pool_key();
        let Some(referencing) = by_secret.get(&secret_key) else {
            return;
        };
        tracing::info!(
            secret = %secret_key,
            connectors = referencing.len(),
            "secret changed, re-syncing referencing connectors"
        );
        for key in referencing {
            if let Some(record) = connectors.get(key) {
                self.sync(record).await;
            }
        }
    }

    async fn update_conditions(&self, target: &crate::store::RecordRef, conditions: Vec<Condition>) {
        if let Err(e) = self.store.update_conditions(target, conditions).await {
            tracing::warn!(target = %target, error = %e, "condition update failed");
        }
    }

    fn requeue_later(&self, record: ConnectorRecord) {
        let requeue = self.requeue.clone();
        tokio::spawn(async move {
            tokio::time::sleep(DEFAULT_REQUEUE).await;
            let _ = requeue
                .send(WatchEvent {
                    kind: EventKind::Updated,
                    record,
                })
                .await;
        });
    }
}
