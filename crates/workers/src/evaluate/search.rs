use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, StatusCode};
use serde_json::Value;

use warden_common::records::QueryConnectorSpec;

use super::EvalError;
use crate::pools::Credentials;

pub fn search_url(base: &str, index: &str) -> String {
    format!("{}/{}/_search", base.trim_end_matches('/'), index)
}

/// POSTs the serialized query to the backend and returns the decoded
/// response body. Transport failures map to a connection error, anything
/// other than 200 to a query error with the body kept in the logs.
pub async fn run_search(
    client: &Client,
    connector: &QueryConnectorSpec,
    credentials: Option<&Credentials>,
    index: &str,
    query: String,
) -> Result<Value, EvalError> {
    let url = search_url(&connector.url, index);

    let mut request = client
        .post(&url)
        .header(CONTENT_TYPE, "application/json");
    for (key, value) in &connector.headers {
        request = request.header(key, value);
    }
    if let Some(creds) = credentials {
        if !creds.username.is_empty() && !creds.password.is_empty() {
            request = request.basic_auth(&creds.username, Some(&creds.password));
        }
    }

    let response = request
        .body(query)
        .send()
        .await
        .map_err(|e| EvalError::Connection(e.to_string()))?;

    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| EvalError::Query(format!("error reading response body: {e}")))?;

    if status != StatusCode::OK {
        tracing::error!(%url, %status, body = %body, "search backend returned an error");
        return Err(EvalError::Query(format!("search backend returned {status}")));
    }

    serde_json::from_str(&body)
        .map_err(|e| EvalError::Query(format!("search response is not valid JSON: {e}")))
}

/// Walks a dotted path (`hits.total.value`, `buckets.0.doc_count`) into a
/// JSON document.
pub fn lookup_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = value;
    for segment in path.split('.') {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Numeric view of an extracted field: non-numeric values, including null,
/// coerce to 0.0.
pub fn numeric(value: &Value) -> f64 {
    match value {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        _ => 0.0,
    }
}
