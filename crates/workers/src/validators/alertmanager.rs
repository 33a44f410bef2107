use std::collections::HashMap;

use chrono::DateTime;
use serde::Deserialize;

use super::Validation;

/// One element of the Alertmanager v2 postable-alert array.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PostableAlert {
    labels: HashMap<String, String>,
    #[serde(default)]
    #[allow(dead_code)]
    annotations: HashMap<String, String>,
    #[serde(default, rename = "startsAt")]
    starts_at: Option<String>,
    #[serde(default, rename = "endsAt")]
    ends_at: Option<String>,
    #[serde(default, rename = "generatorURL")]
    #[allow(dead_code)]
    generator_url: Option<String>,
}

/// Checks that a rendered payload is a well-formed Alertmanager v2 alert
/// array: a JSON array whose elements carry non-empty `labels` and, when
/// present, RFC 3339 `startsAt`/`endsAt` timestamps.
pub fn validate_alertmanager(payload: &str) -> Validation {
    let alerts: Vec<PostableAlert> = match serde_json::from_str(payload) {
        Ok(alerts) => alerts,
        Err(e) => return Validation::rejected(format!("not an alertmanager alert array: {e}")),
    };

    if alerts.is_empty() {
        return Validation::rejected("alert array is empty");
    }

    for (i, alert) in alerts.iter().enumerate() {
        if alert.labels.is_empty() {
            return Validation::rejected(format!("alert {i} has no labels"));
        }
        for (field, raw) in [("startsAt", &alert.starts_at), ("endsAt", &alert.ends_at)] {
            if let Some(raw) = raw {
                if DateTime::parse_from_rfc3339(raw).is_err() {
                    return Validation::rejected(format!(
                        "alert {i}: {field} {raw:?} is not RFC 3339"
                    ));
                }
            }
        }
    }

    Validation::ok()
}
