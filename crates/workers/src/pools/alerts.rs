use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use warden_common::records::SearchRule;

/// A currently-firing rule awaiting (or undergoing) delivery. Carries its own
/// spec snapshot so the dispatcher never re-reads the object store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertEntry {
    pub rule: SearchRule,
    pub action_ref: String,
    pub value: f64,
    pub aggregations: Option<serde_json::Value>,
}

#[derive(Clone, Default)]
pub struct AlertsPool {
    entries: Arc<DashMap<String, AlertEntry>>,
}

impl AlertsPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<AlertEntry> {
        self.entries.get(key).map(|a| a.clone())
    }

    pub fn set(&self, key: String, entry: AlertEntry) {
        self.entries.insert(key, entry);
    }

    pub fn delete(&self, key: &str) {
        self.entries.remove(key);
    }

    /// Snapshot of the alerts a given action is responsible for: entries in
    /// the action's namespace whose `action_ref` matches its name.
    pub fn for_action(&self, namespace: &str, action_name: &str) -> Vec<(String, AlertEntry)> {
        let prefix = format!("{namespace}_");
        self.entries
            .iter()
            .filter(|e| e.key().starts_with(&prefix) && e.value().action_ref == action_name)
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_common::records::{
        ActionRef, ElasticsearchOptions, Metadata, NameRef, Operator, RuleCondition,
        SearchRuleSpec,
    };

    fn alert(namespace: &str, rule_name: &str, action: &str) -> (String, AlertEntry) {
        let rule = SearchRule {
            metadata: Metadata {
                name: rule_name.into(),
                namespace: namespace.into(),
                finalizers: Vec::new(),
            },
            spec: SearchRuleSpec {
                description: String::new(),
                query_connector_ref: NameRef { name: "es".into() },
                check_interval: "10s".into(),
                elasticsearch: ElasticsearchOptions {
                    index: "logs-*".into(),
                    query: None,
                    query_json: r#"{"query":{"match_all":{}}}"#.into(),
                    condition_field: "hits.total.value".into(),
                },
                condition: RuleCondition {
                    operator: Operator::GreaterThan,
                    threshold: "100".into(),
                    r#for: "30s".into(),
                },
                action_ref: ActionRef {
                    name: action.into(),
                    data: "{{ value }}".into(),
                },
            },
        };
        let key = rule.metadata.pool_key();
        (
            key,
            AlertEntry {
                rule,
                action_ref: action.into(),
                value: 150.0,
                aggregations: None,
            },
        )
    }

    #[test]
    fn for_action_filters_by_namespace_and_ref() {
        let pool = AlertsPool::new();
        let (k1, a1) = alert("monitoring", "high-errors", "notify-ops");
        let (k2, a2) = alert("monitoring", "disk-full", "notify-dba");
        let (k3, a3) = alert("staging", "high-errors", "notify-ops");
        pool.set(k1, a1);
        pool.set(k2, a2);
        pool.set(k3, a3);

        let matched = pool.for_action("monitoring", "notify-ops");
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].0, "monitoring_high-errors");
    }

    #[test]
    fn refresh_overwrites_value_and_aggregations() {
        let pool = AlertsPool::new();
        let (key, mut entry) = alert("monitoring", "high-errors", "notify-ops");
        pool.set(key.clone(), entry.clone());

        entry.value = 210.0;
        entry.aggregations = Some(serde_json::json!({"errors": {"value": 210.0}}));
        pool.set(key.clone(), entry);

        let stored = pool.get(&key).unwrap();
        assert_eq!(stored.value, 210.0);
        assert!(stored.aggregations.is_some());
    }

    #[test]
    fn delete_is_idempotent() {
        let pool = AlertsPool::new();
        let (key, entry) = alert("monitoring", "high-errors", "notify-ops");
        pool.set(key.clone(), entry);
        pool.delete(&key);
        pool.delete(&key);
        assert!(pool.is_empty());
    }
}
