//! The seam to the declarative object store. The engine only ever consumes
//! this narrow surface: typed watch events in, condition/finalizer writes
//! out. The substrate behind it is an external collaborator; the in-memory
//! implementation in [`memory`] backs the binary and the tests.

pub mod memory;

use async_trait::async_trait;

use warden_common::conditions::Condition;
use warden_common::keys::pool_key;
use warden_common::records::{ClusterQueryConnector, QueryConnector, QueryConnectorSpec};

/// Finalizer marker attached to records so their deletion is observed
/// before the store forgets them.
pub const FINALIZER: &str = "searchwarden/cleanup";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    QueryConnector,
    ClusterQueryConnector,
    SearchRule,
    RulerAction,
    Secret,
}

impl RecordKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::QueryConnector => "QueryConnector",
            Self::ClusterQueryConnector => "ClusterQueryConnector",
            Self::SearchRule => "SearchRule",
            Self::RulerAction => "RulerAction",
            Self::Secret => "Secret",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecordRef {
    pub kind: RecordKind,
    pub namespace: String,
    pub name: String,
}

impl RecordRef {
    pub fn new(kind: RecordKind, namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind,
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    pub fn pool_key(&self) -> String {
        pool_key(&self.namespace, &self.name)
    }
}

impl std::fmt::Display for RecordRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.kind.as_str(), self.namespace, self.name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Created,
    Updated,
    Deleted,
}

/// One change notification for a record of type `T`.
#[derive(Debug, Clone)]
pub struct WatchEvent<T> {
    pub kind: EventKind,
    pub record: T,
}

#[derive(Debug)]
pub struct StoreError(pub String);

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "object store: {}", self.0)
    }
}

impl std::error::Error for StoreError {}

/// Write-side surface the reconcilers and workers use.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Applies each condition with update-in-place-by-type semantics.
    async fn update_conditions(
        &self,
        target: &RecordRef,
        conditions: Vec<Condition>,
    ) -> Result<(), StoreError>;

    /// Attaches or removes the finalizer marker. A no-op for records the
    /// store no longer holds.
    async fn set_finalizer(&self, target: &RecordRef, attached: bool) -> Result<(), StoreError>;
}

/// The two query-connector flavors, carried on one watch stream.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectorRecord {
    Namespaced(QueryConnector),
    Cluster(ClusterQueryConnector),
}

impl ConnectorRecord {
    pub fn name(&self) -> &str {
        match self {
            Self::Namespaced(qc) => &qc.metadata.name,
            Self::Cluster(qc) => &qc.metadata.name,
        }
    }

    /// Empty for the cluster-scoped flavor, which is what keys its pool
    /// entries under `_<name>`.
    pub fn namespace(&self) -> &str {
        match self {
            Self::Namespaced(qc) => &qc.metadata.namespace,
            Self::Cluster(_) => "",
        }
    }

    pub fn pool_key(&self) -> String {
        pool_key(self.namespace(), self.name())
    }

    pub fn spec(&self) -> &QueryConnectorSpec {
        match self {
            Self::Namespaced(qc) => &qc.spec,
            Self::Cluster(qc) => &qc.spec,
        }
    }

    pub fn record_ref(&self) -> RecordRef {
        let kind = match self {
            Self::Namespaced(_) => RecordKind::QueryConnector,
            Self::Cluster(_) => RecordKind::ClusterQueryConnector,
        };
        RecordRef::new(kind, self.namespace(), self.name())
    }

    /// Namespace the referenced secret resolves in: the explicit
    /// `secretRef.namespace`, else `default` for cluster-scoped connectors
    /// and the connector's own namespace otherwise.
    pub fn secret_namespace(&self) -> Option<String> {
        let credentials = self.spec().credentials.as_ref()?;
        let explicit = credentials.secret_ref.namespace.clone();
        Some(match self {
            Self::Cluster(_) => explicit.unwrap_or_else(|| "default".to_string()),
            Self::Namespaced(qc) => explicit.unwrap_or_else(|| qc.metadata.namespace.clone()),
        })
    }
}
