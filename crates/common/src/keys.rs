/// Pool entries are keyed `<namespace>_<name>`. Cluster-scoped records use
/// an empty namespace, which yields keys of the form `_<name>`.
pub fn pool_key(namespace: &str, name: &str) -> String {
    format!("{namespace}_{name}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn namespaced_key() {
        assert_eq!(pool_key("monitoring", "es-logs"), "monitoring_es-logs");
    }

    #[test]
    fn cluster_scoped_key() {
        assert_eq!(pool_key("", "shared-es"), "_shared-es");
    }

    #[test]
    fn keys_are_case_sensitive() {
        assert_ne!(pool_key("ns", "Rule"), pool_key("ns", "rule"));
    }
}
