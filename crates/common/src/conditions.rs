use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// Condition types tracked on every record.
pub const TYPE_RESOURCE_SYNCED: &str = "ResourceSynced";
pub const TYPE_STATE: &str = "State";

pub const STATUS_TRUE: &str = "True";
pub const STATUS_FALSE: &str = "False";

// Reconcile outcome reasons.
pub const REASON_TARGET_SYNCED: &str = "TargetSynced";
pub const REASON_SYNC_FAILED: &str = "SyncFailed";

// Domain state reasons.
pub const REASON_NORMAL: &str = "Normal";
pub const REASON_PENDING_FIRING: &str = "PendingFiring";
pub const REASON_ALERT_FIRING: &str = "AlertFiring";
pub const REASON_PENDING_RESOLVING: &str = "PendingResolving";
pub const REASON_NO_CREDS_FOUND: &str = "NoCredsFound";
pub const REASON_SECRET_NOT_FOUND: &str = "SecretNotFound";
pub const REASON_QUERY_CONNECTOR_NOT_FOUND: &str = "QueryConnectorNotFound";
pub const REASON_QUERY_NOT_DEFINED: &str = "QueryNotDefined";
pub const REASON_QUERY_DEFINED_IN_BOTH: &str = "QueryDefinedInBoth";
pub const REASON_FOR_VALUE_PARSE_ERROR: &str = "ForValueParseError";
pub const REASON_CONNECTION_ERROR: &str = "ConnectionError";
pub const REASON_QUERY_ERROR: &str = "QueryError";
pub const REASON_EVALUATE_ERROR: &str = "EvaluateError";
pub const REASON_EVALUATE_TEMPLATE_ERROR: &str = "EvaluateTemplateError";
pub const REASON_VALIDATOR_NOT_FOUND: &str = "ValidatorNotFound";
pub const REASON_VALIDATION_FAILED: &str = "ValidationFailed";
pub const REASON_WEBHOOK_ERROR: &str = "WebhookError";

/// One observable condition on a record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    pub r#type: String,
    pub status: String,
    pub reason: String,
    pub message: String,
    pub last_transition_time: DateTime<Utc>,
}

pub fn new_condition(r#type: &str, status: &str, reason: &str, message: impl Into<String>) -> Condition {
    Condition {
        r#type: r#type.to_string(),
        status: status.to_string(),
        reason: reason.to_string(),
        message: message.into(),
        last_transition_time: Utc::now(),
    }
}

/// Mutates the condition of the same type in place, refreshing its
/// transition time; appends when no condition of that type exists yet.
pub fn update_condition(conditions: &mut Vec<Condition>, condition: Condition) {
    match conditions.iter_mut().find(|c| c.r#type == condition.r#type) {
        Some(current) => {
            current.status = condition.status;
            current.reason = condition.reason;
            current.message = condition.message;
            current.last_transition_time = Utc::now();
        }
        None => conditions.push(condition),
    }
}

pub fn get_condition<'a>(conditions: &'a [Condition], r#type: &str) -> Option<&'a Condition> {
    conditions.iter().find(|c| c.r#type == r#type)
}
