use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

/// Firing lifecycle of a single rule. The pending states carry the instant
/// they were entered; the `for` window is measured against it with a strict
/// comparison, so an elapsed time equal to the window stays pending.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum RuleState {
    Normal,
    PendingFiring { since: DateTime<Utc> },
    Firing { since: DateTime<Utc> },
    PendingResolving { since: DateTime<Utc> },
}

impl RuleState {
    pub fn transition(self, firing: bool, now: DateTime<Utc>, for_window: Duration) -> Self {
        let window = TimeDelta::from_std(for_window).unwrap_or(TimeDelta::MAX);

        match (self, firing) {
            (Self::Normal, true) => Self::PendingFiring { since: now },
            (Self::PendingResolving { .. }, true) => Self::PendingFiring { since: now },

            (Self::PendingFiring { since }, true) => {
                if now.signed_duration_since(since) > window {
                    Self::Firing { since }
                } else {
                    Self::PendingFiring { since }
                }
            }
            (Self::Firing { since }, true) => Self::Firing { since },

            (Self::Firing { .. }, false) => Self::PendingResolving { since: now },
            (Self::PendingFiring { .. }, false) => Self::PendingResolving { since: now },

            (Self::PendingResolving { since }, false) => {
                if now.signed_duration_since(since) > window {
                    Self::Normal
                } else {
                    Self::PendingResolving { since }
                }
            }
            (Self::Normal, false) => Self::Normal,
        }
    }

    pub fn is_firing(&self) -> bool {
        matches!(self, Self::Firing { .. })
    }

    pub fn firing_time(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::PendingFiring { since } | Self::Firing { since } => Some(*since),
            _ => None,
        }
    }

    pub fn resolving_time(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::PendingResolving { since } => Some(*since),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Normal => "Normal",
            Self::PendingFiring { .. } => "PendingFiring",
            Self::Firing { .. } => "Firing",
            Self::PendingResolving { .. } => "PendingResolving",
        }
    }
}
