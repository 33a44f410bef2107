use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::keys::pool_key;

/// Identifying metadata shared by every record kind. Cluster-scoped records
/// leave `namespace` empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    pub name: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub finalizers: Vec<String>,
}

impl Metadata {
    pub fn pool_key(&self) -> String {
        pool_key(&self.namespace, &self.name)
    }
}

/// How to reach a search backend.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryConnector {
    pub metadata: Metadata,
    pub spec: QueryConnectorSpec,
}

/// Cluster-scoped flavor of [`QueryConnector`]. Its secret reference resolves
/// in `secretRef.namespace`, defaulting to `default`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClusterQueryConnector {
    pub metadata: Metadata,
    pub spec: QueryConnectorSpec,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryConnectorSpec {
    pub url: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub tls_skip_verify: bool,
    #[serde(default)]
    pub credentials: Option<CredentialsRef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialsRef {
    pub secret_ref: SecretRef,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretRef {
    pub name: String,
    #[serde(default)]
    pub namespace: Option<String>,
    pub key_username: String,
    pub key_password: String,
}

/// A periodic query with a numeric condition and an action to trigger while
/// the condition holds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchRule {
    pub metadata: Metadata,
    pub spec: SearchRuleSpec,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRuleSpec {
    #[serde(default)]
    pub description: String,
    pub query_connector_ref: NameRef,
    pub check_interval: String,
    pub elasticsearch: ElasticsearchOptions,
    pub condition: RuleCondition,
    pub action_ref: ActionRef,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NameRef {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElasticsearchOptions {
    pub index: String,
    /// Structured query, serialized to JSON as-is. Mutually exclusive with
    /// `queryJSON`.
    #[serde(default)]
    pub query: Option<serde_json::Value>,
    /// Raw JSON query string. Mutually exclusive with `query`.
    #[serde(default, rename = "queryJSON")]
    pub query_json: String,
    /// Dotted path into the search response yielding the numeric compared
    /// against the threshold, e.g. `hits.total.value`.
    pub condition_field: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleCondition {
    pub operator: Operator,
    /// Decimal number, parsed at evaluation time.
    pub threshold: String,
    /// Minimum sustained duration before firing (and, symmetrically, before
    /// resolving).
    pub r#for: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Operator {
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
    Equal,
}

impl Operator {
    pub fn evaluate(&self, value: f64, threshold: f64) -> bool {
        match self {
            Self::GreaterThan => value > threshold,
            Self::GreaterThanOrEqual => value >= threshold,
            Self::LessThan => value < threshold,
            Self::LessThanOrEqual => value <= threshold,
            Self::Equal => value == threshold,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRef {
    pub name: String,
    /// Message template rendered by the dispatcher with `object`, `value`
    /// and `aggregations` in scope.
    pub data: String,
}

/// A webhook target for firing alerts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RulerAction {
    pub metadata: Metadata,
    pub spec: RulerActionSpec,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RulerActionSpec {
    pub webhook: WebhookOptions,
    pub firing_interval: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookOptions {
    pub verb: String,
    pub url: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub credentials: Option<WebhookCredentialsRef>,
    #[serde(default)]
    pub validator: Option<String>,
}

/// Webhook credentials reference. The secret always lives in the action's
/// own namespace, so unlike connector credentials there is no namespace
/// override.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookCredentialsRef {
    pub secret_ref: WebhookSecretRef,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookSecretRef {
    pub name: String,
    pub key_username: String,
    pub key_password: String,
}

/// Opaque key/value secret. Values are base64-encoded.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Secret {
    pub metadata: Metadata,
    #[serde(default)]
    pub data: HashMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_rule_field_names() {
        let json = serde_json::json!({
            "metadata": { "name": "high-errors", "namespace": "monitoring" },
            "spec": {
                "description": "too many 5xx",
                "queryConnectorRef": { "name": "es-logs" },
                "checkInterval": "30s",
                "elasticsearch": {
                    "index": "logs-*",
                    "query": { "query": { "match_all": {} } },
                    "conditionField": "hits.total.value"
                },
                "condition": {
                    "operator": "greaterThan",
                    "threshold": "100",
                    "for": "1m"
                },
                "actionRef": { "name": "notify-ops", "data": "{{ value }}" }
            }
        });

        let rule: SearchRule = serde_json::from_value(json).unwrap();
        assert_eq!(rule.metadata.pool_key(), "monitoring_high-errors");
        assert_eq!(rule.spec.condition.operator, Operator::GreaterThan);
        assert_eq!(rule.spec.condition.r#for, "1m");
        assert!(rule.spec.elasticsearch.query_json.is_empty());
    }

    #[test]
    fn query_connector_defaults() {
        let json = serde_json::json!({
            "metadata": { "name": "es", "namespace": "obs" },
            "spec": { "url": "https://es.internal:9200" }
        });

        let qc: QueryConnector = serde_json::from_value(json).unwrap();
        assert!(!qc.spec.tls_skip_verify);
        assert!(qc.spec.headers.is_empty());
        assert!(qc.spec.credentials.is_none());
    }

    #[test]
    fn secret_ref_namespace_optional() {
        let json = serde_json::json!({
            "secretRef": {
                "name": "es-creds",
                "keyUsername": "username",
                "keyPassword": "password"
            }
        });

        let creds: CredentialsRef = serde_json::from_value(json).unwrap();
        assert!(creds.secret_ref.namespace.is_none());
    }

    #[test]
    fn operator_wire_names() {
        for (raw, op) in [
            ("greaterThan", Operator::GreaterThan),
            ("greaterThanOrEqual", Operator::GreaterThanOrEqual),
            ("lessThan", Operator::LessThan),
            ("lessThanOrEqual", Operator::LessThanOrEqual),
            ("equal", Operator::Equal),
        ] {
            let parsed: Operator =
                serde_json::from_value(serde_json::Value::String(raw.into())).unwrap();
            assert_eq!(parsed, op);
        }
        assert!(serde_json::from_str::<Operator>("\"contains\"").is_err());
    }

    #[test]
    fn operator_boundaries() {
        assert!(Operator::GreaterThanOrEqual.evaluate(100.0, 100.0));
        assert!(!Operator::GreaterThan.evaluate(100.0, 100.0));
        assert!(Operator::LessThanOrEqual.evaluate(100.0, 100.0));
        assert!(!Operator::LessThan.evaluate(100.0, 100.0));
        assert!(Operator::Equal.evaluate(2.5, 2.5));
        assert!(!Operator::Equal.evaluate(2.5, 2.6));
    }

    #[test]
    fn ruler_action_webhook() {
        let json = serde_json::json!({
            "metadata": { "name": "notify-ops", "namespace": "monitoring" },
            "spec": {
                "webhook": {
                    "verb": "POST",
                    "url": "http://alertmanager:9093/api/v2/alerts",
                    "validator": "alertmanager"
                },
                "firingInterval": "1m"
            }
        });

        let action: RulerAction = serde_json::from_value(json).unwrap();
        assert_eq!(action.spec.webhook.verb, "POST");
        assert_eq!(action.spec.webhook.validator.as_deref(), Some("alertmanager"));
        assert!(action.spec.webhook.credentials.is_none());
    }

    #[test]
    fn webhook_credentials_have_no_namespace_field() {
        let json = serde_json::json!({
            "secretRef": {
                "name": "hook-creds",
                "keyUsername": "username",
                "keyPassword": "password"
            }
        });

        let creds: WebhookCredentialsRef = serde_json::from_value(json).unwrap();
        assert_eq!(creds.secret_ref.name, "hook-creds");
        assert_eq!(creds.secret_ref.key_username, "username");
    }
}
