use std::path::Path;

use serde::Deserialize;

use warden_common::records::{
    ClusterQueryConnector, QueryConnector, RulerAction, SearchRule, Secret,
};

/// One declarative record, discriminated by its `kind` field.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind")]
pub enum Manifest {
    QueryConnector(QueryConnector),
    ClusterQueryConnector(ClusterQueryConnector),
    SearchRule(SearchRule),
    RulerAction(RulerAction),
    Secret(Secret),
}

#[derive(Debug)]
pub enum ManifestError {
    Io(std::io::Error),
    Parse { file: String, error: String },
}

impl std::fmt::Display for ManifestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "io: {e}"),
            Self::Parse { file, error } => write!(f, "parse {file}: {error}"),
        }
    }
}

impl std::error::Error for ManifestError {}

impl From<std::io::Error> for ManifestError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

/// Loads every record from the `.yaml`/`.yml` files in a directory.
/// Multi-document files are supported; empty documents are skipped.
pub fn load_dir(dir: &Path) -> Result<Vec<Manifest>, ManifestError> {
    let mut paths: Vec<_> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            matches!(
                path.extension().and_then(|e| e.to_str()),
                Some("yaml") | Some("yml")
            )
        })
        .collect();
    paths.sort();

    let mut manifests = Vec::new();
    for path in paths {
        let contents = std::fs::read_to_string(&path)?;
        manifests.extend(parse_documents(&contents).map_err(|error| ManifestError::Parse {
            file: path.display().to_string(),
            error,
        })?);
    }
    Ok(manifests)
}

pub fn parse_documents(contents: &str) -> Result<Vec<Manifest>, String> {
    let mut manifests = Vec::new();
    for document in serde_yaml::Deserializer::from_str(contents) {
        let value = serde_yaml::Value::deserialize(document).map_err(|e| e.to_string())?;
        if value.is_null() {
            continue;
        }
        manifests.push(serde_yaml::from_value(value).map_err(|e| e.to_string())?);
    }
    Ok(manifests)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_multi_document_yaml() {
        let yaml = r#"
apiVersion: searchwarden/v1
kind: QueryConnector
metadata:
  name: es-logs
  namespace: monitoring
spec:
  url: https://es.internal:9200
---
kind: SearchRule
metadata:
  name: high-errors
  namespace: monitoring
spec:
  description: too many 5xx
  queryConnectorRef:
    name: es-logs
  checkInterval: 30s
  elasticsearch:
    index: logs-*
    queryJSON: '{"query":{"match_all":{}}}'
    conditionField: hits.total.value
  condition:
    operator: greaterThan
    threshold: "100"
    for: 1m
  actionRef:
    name: notify-ops
    data: '[{"labels": {"alertname": "high-errors"}}]'
---
"#;
        let manifests = parse_documents(yaml).unwrap();
        assert_eq!(manifests.len(), 2);
        assert!(matches!(manifests[0], Manifest::QueryConnector(_)));
        match &manifests[1] {
            Manifest::SearchRule(rule) => {
                assert_eq!(rule.spec.check_interval, "30s");
                assert_eq!(rule.spec.condition.r#for, "1m");
            }
            other => panic!("unexpected manifest: {other:?}"),
        }
    }

    #[test]
    fn unknown_kind_is_an_error() {
        let yaml = "kind: Gadget\nmetadata:\n  name: x\n";
        assert!(parse_documents(yaml).is_err());
    }

    #[test]
    fn secret_data_round_trips() {
        let yaml = r#"
kind: Secret
metadata:
  name: es-creds
  namespace: monitoring
data:
  username: ZWxhc3RpYw==
  password: Y2hhbmdlbWU=
"#;
        let manifests = parse_documents(yaml).unwrap();
        match &manifests[0] {
            Manifest::Secret(secret) => {
                assert_eq!(secret.data["username"], "ZWxhc3RpYw==");
            }
            other => panic!("unexpected manifest: {other:?}"),
        }
    }

    #[test]
    fn loads_directory_sorted() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("b-action.yaml"),
            "kind: RulerAction\nmetadata:\n  name: notify\n  namespace: obs\nspec:\n  webhook:\n    verb: POST\n    url: http://am:9093\n  firingInterval: 1m\n",
        )
        .unwrap();
        std::fs::write(
            dir.path().join("a-connector.yml"),
            "kind: QueryConnector\nmetadata:\n  name: es\n  namespace: obs\nspec:\n  url: http://es:9200\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let manifests = load_dir(dir.path()).unwrap();
        assert_eq!(manifests.len(), 2);
        assert!(matches!(manifests[0], Manifest::QueryConnector(_)));
        assert!(matches!(manifests[1], Manifest::RulerAction(_)));
    }
}
