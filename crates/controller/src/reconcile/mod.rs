//! One reconciler per record kind: watch events in, pool updates and worker
//! scheduling out. Transient failures requeue after the record's interval,
//! or a 10 s default when the interval itself cannot be parsed.

pub mod query_connector;
pub mod ruler_action;
pub mod scheduler;
pub mod search_rule;

pub use query_connector::QueryConnectorReconciler;
pub use ruler_action::RulerActionReconciler;
pub use scheduler::WorkerScheduler;
pub use search_rule::SearchRuleReconciler;
