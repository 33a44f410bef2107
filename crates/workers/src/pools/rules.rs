use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use warden_common::records::SearchRule;

use crate::state::RuleState;

/// Evaluation state for one rule: the spec snapshot the evaluator last saw,
/// the firing state machine position and the most recent observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleEntry {
    pub spec: SearchRule,
    pub state: RuleState,
    pub last_value: f64,
}

impl RuleEntry {
    pub fn new(spec: SearchRule, value: f64) -> Self {
        Self {
            spec,
            state: RuleState::Normal,
            last_value: value,
        }
    }
}

#[derive(Clone, Default)]
pub struct RulesPool {
    entries: Arc<DashMap<String, RuleEntry>>,
}

impl RulesPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<RuleEntry> {
        self.entries.get(key).map(|r| r.clone())
    }

    pub fn set(&self, key: String, entry: RuleEntry) {
        self.entries.insert(key, entry);
    }

    pub fn delete(&self, key: &str) {
        self.entries.remove(key);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
