//! The engine's only shared mutable state: three concurrent key/value maps
//! keyed `<namespace>_<name>`. The evaluator is the sole writer to the rules
//! and alerts pools; the query-connector reconciler is the sole writer to the
//! credentials pool.

mod alerts;
mod credentials;
mod rules;

pub use alerts::{AlertEntry, AlertsPool};
pub use credentials::{Credentials, CredentialsPool};
pub use rules::{RuleEntry, RulesPool};
