//! Per-rule evaluation: resolve the connector, query the backend, extract
//! the condition value and drive the firing state machine. The evaluator is
//! the sole writer to the rules and alerts pools.

mod search;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use tokio::sync::mpsc;

use warden_common::conditions;
use warden_common::interval::parse_interval;
use warden_common::keys::pool_key;
use warden_common::records::{QueryConnectorSpec, SearchRule};

use crate::events::EngineEvent;
use crate::pools::{AlertEntry, AlertsPool, CredentialsPool, RuleEntry, RulesPool};
use crate::state::RuleState;

pub use search::{lookup_path, numeric, search_url};

/// Read-side seam to the object store for connector resolution. The
/// namespaced flavor in the rule's namespace wins; the cluster-scoped
/// flavor is the fallback.
#[async_trait]
pub trait ConnectorReader: Send + Sync {
    async fn resolve_connector(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<ResolvedConnector>, ReadError>;
}

#[derive(Debug, Clone)]
pub struct ResolvedConnector {
    pub name: String,
    pub cluster_scoped: bool,
    pub spec: QueryConnectorSpec,
}

impl ResolvedConnector {
    /// Credentials pool key: `<ruleNamespace>_<name>` for namespaced
    /// connectors, `_<name>` for cluster-scoped ones.
    pub fn credentials_key(&self, rule_namespace: &str) -> String {
        if self.cluster_scoped {
            pool_key("", &self.name)
        } else {
            pool_key(rule_namespace, &self.name)
        }
    }
}

#[derive(Debug)]
pub struct ReadError(pub String);

impl std::fmt::Display for ReadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "store read: {}", self.0)
    }
}

impl std::error::Error for ReadError {}

#[derive(Debug)]
pub enum EvalError {
    ConnectorNotFound { name: String, namespace: String },
    MissingCredentials { key: String },
    StoreRead(String),
    ForValueParse(String),
    QueryNotDefined,
    QueryDefinedInBoth,
    Connection(String),
    Query(String),
    Evaluate(String),
}

impl EvalError {
    /// The status-condition reason this failure is reported under.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::ConnectorNotFound { .. } => conditions::REASON_QUERY_CONNECTOR_NOT_FOUND,
            Self::MissingCredentials { .. } => conditions::REASON_NO_CREDS_FOUND,
            Self::StoreRead(_) => conditions::REASON_QUERY_CONNECTOR_NOT_FOUND,
            Self::ForValueParse(_) => conditions::REASON_FOR_VALUE_PARSE_ERROR,
            Self::QueryNotDefined => conditions::REASON_QUERY_NOT_DEFINED,
            Self::QueryDefinedInBoth => conditions::REASON_QUERY_DEFINED_IN_BOTH,
            Self::Connection(_) => conditions::REASON_CONNECTION_ERROR,
            Self::Query(_) => conditions::REASON_QUERY_ERROR,
            Self::Evaluate(_) => conditions::REASON_EVALUATE_ERROR,
        }
    }
}

impl std::fmt::Display for EvalError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ConnectorNotFound { name, namespace } => {
                write!(f, "query connector {name} not found in namespace {namespace:?}")
            }
            Self::MissingCredentials { key } => {
                write!(f, "credentials not found in the pool for {key}")
            }
            Self::StoreRead(e) => write!(f, "store read failed: {e}"),
            Self::ForValueParse(e) => write!(f, "error parsing `for` duration: {e}"),
            Self::QueryNotDefined => write!(f, "neither query nor queryJSON is defined"),
            Self::QueryDefinedInBoth => write!(f, "query and queryJSON are both defined"),
            Self::Connection(e) => write!(f, "error reaching search backend: {e}"),
            Self::Query(e) => write!(f, "{e}"),
            Self::Evaluate(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for EvalError {}

pub struct Evaluator {
    connectors: Arc<dyn ConnectorReader>,
    credentials: CredentialsPool,
    rules: RulesPool,
    alerts: AlertsPool,
    events: mpsc::Sender<EngineEvent>,
    client: Client,
    insecure_client: Client,
}

impl Evaluator {
    pub fn new(
        connectors: Arc<dyn ConnectorReader>,
        credentials: CredentialsPool,
        rules: RulesPool,
        alerts: AlertsPool,
        events: mpsc::Sender<EngineEvent>,
    ) -> Result<Self, reqwest::Error> {
        Ok(Self {
            connectors,
            credentials,
            rules,
            alerts,
            events,
            client: Client::builder().build()?,
            insecure_client: Client::builder()
                .danger_accept_invalid_certs(true)
                .build()?,
        })
    }

    /// One evaluation tick for `rule`. Returns the resulting state; any
    /// error aborts the tick without touching the pools.
    pub async fn evaluate(&self, rule: &SearchRule) -> Result<RuleState, EvalError> {
        let rule_key = rule.metadata.pool_key();
        let namespace = &rule.metadata.namespace;
        let connector_name = &rule.spec.query_connector_ref.name;

        let connector = self
            .connectors
            .resolve_connector(namespace, connector_name)
            .await
            .map_err(|e| EvalError::StoreRead(e.to_string()))?
            .ok_or_else(|| EvalError::ConnectorNotFound {
                name: connector_name.clone(),
                namespace: namespace.clone(),
            })?;

        let credentials = if connector.spec.credentials.is_some() {
            let key = connector.credentials_key(namespace);
            Some(
                self.credentials
                    .get(&key)
                    .ok_or(EvalError::MissingCredentials { key })?,
            )
        } else {
            None
        };

        let for_window = parse_interval(&rule.spec.condition.r#for)
            .map_err(|e| EvalError::ForValueParse(e.to_string()))?;

        let es = &rule.spec.elasticsearch;
        let query = match (&es.query, es.query_json.is_empty()) {
            (Some(_), false) => return Err(EvalError::QueryDefinedInBoth),
            (None, true) => return Err(EvalError::QueryNotDefined),
            (Some(query), true) => serde_json::to_string(query)
                .map_err(|e| EvalError::Evaluate(format!("error serializing query: {e}")))?,
            (None, false) => es.query_json.clone(),
        };

        let client = if connector.spec.tls_skip_verify {
            &self.insecure_client
        } else {
            &self.client
        };
        let response =
            search::run_search(client, &connector.spec, credentials.as_ref(), &es.index, query)
                .await?;

        let value = match search::lookup_path(&response, &es.condition_field) {
            Some(value) => search::numeric(value),
            None => {
                return Err(EvalError::Query(format!(
                    "conditionField {:?} not found in the search response",
                    es.condition_field
                )))
            }
        };
        let aggregations = response.get("aggregations").cloned();

        let threshold: f64 = rule.spec.condition.threshold.trim().parse().map_err(|_| {
            EvalError::Evaluate(format!(
                "configured threshold is not a valid number: {:?}",
                rule.spec.condition.threshold
            ))
        })?;
        let firing = rule.spec.condition.operator.evaluate(value, threshold);

        let mut entry = match self.rules.get(&rule_key) {
            Some(mut entry) => {
                // Keep the stored snapshot in step with the live record.
                if entry.spec != *rule {
                    entry.spec = rule.clone();
                }
                entry
            }
            None => RuleEntry::new(rule.clone(), value),
        };
        entry.last_value = value;

        let previous = entry.state;
        let next = previous.transition(firing, Utc::now(), for_window);
        entry.state = next;
        self.rules.set(rule_key.clone(), entry);

        if next.is_firing() {
            self.alerts.set(
                rule_key.clone(),
                AlertEntry {
                    rule: rule.clone(),
                    action_ref: rule.spec.action_ref.name.clone(),
                    value,
                    aggregations,
                },
            );
            if !previous.is_firing() {
                tracing::info!(rule = %rule_key, value, "rule is firing, alert created");
                let event = EngineEvent::AlertFiring {
                    namespace: namespace.clone(),
                    rule: rule.metadata.name.clone(),
                    action: rule.spec.action_ref.name.clone(),
                    value,
                };
                if let Err(e) = self.events.send(event).await {
                    tracing::warn!(rule = %rule_key, error = %e, "firing event dropped");
                }
            }
        } else if next == RuleState::Normal && previous != RuleState::Normal {
            self.alerts.delete(&rule_key);
            tracing::info!(rule = %rule_key, value, "rule resolved, alert removed");
        }

        Ok(next)
    }
}
