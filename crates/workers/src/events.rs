use serde::{Deserialize, Serialize};

use warden_common::keys::pool_key;

/// Engine-internal notification emitted by the evaluator. Sent after the
/// corresponding pool write, so a consumer woken by the event observes the
/// alert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EngineEvent {
    AlertFiring {
        namespace: String,
        rule: String,
        action: String,
        value: f64,
    },
}

impl EngineEvent {
    pub fn reason(&self) -> &'static str {
        match self {
            Self::AlertFiring { .. } => "AlertFiring",
        }
    }

    /// Pool key of the action this event should wake.
    pub fn action_key(&self) -> String {
        match self {
            Self::AlertFiring {
                namespace, action, ..
            } => pool_key(namespace, action),
        }
    }
}
