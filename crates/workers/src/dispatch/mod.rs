//! Per-action delivery: drain the alerts targeting a webhook action, render
//! each alert's message template, optionally validate the payload and POST
//! it. Delivery never removes an alert; only the evaluator's return to
//! Normal does, so a still-firing alert is redelivered every interval and
//! the receiver is expected to deduplicate.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Method};

use warden_common::conditions;
use warden_common::records::RulerAction;

use crate::pools::AlertsPool;
use crate::template::TemplateRenderer;
use crate::validators::ValidatorRegistry;

/// Read-side seam to the secret store. Values come back decoded.
#[async_trait]
pub trait SecretReader: Send + Sync {
    async fn secret_value(
        &self,
        namespace: &str,
        name: &str,
        key: &str,
    ) -> Result<Option<String>, SecretReadError>;
}

#[derive(Debug)]
pub struct SecretReadError(pub String);

impl std::fmt::Display for SecretReadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "secret read: {}", self.0)
    }
}

impl std::error::Error for SecretReadError {}

/// Failures that abort a whole dispatch tick.
#[derive(Debug)]
pub enum DispatchError {
    MissingCredentials { secret: String },
    SecretRead(String),
    ValidatorNotFound { name: String },
}

impl DispatchError {
    pub fn reason(&self) -> &'static str {
        match self {
            Self::MissingCredentials { .. } => conditions::REASON_NO_CREDS_FOUND,
            Self::SecretRead(_) => conditions::REASON_SECRET_NOT_FOUND,
            Self::ValidatorNotFound { .. } => conditions::REASON_VALIDATOR_NOT_FOUND,
        }
    }
}

impl std::fmt::Display for DispatchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingCredentials { secret } => {
                write!(f, "missing credentials in secret {secret}")
            }
            Self::SecretRead(e) => write!(f, "error fetching secret: {e}"),
            Self::ValidatorNotFound { name } => write!(f, "validator {name} not found"),
        }
    }
}

impl std::error::Error for DispatchError {}

/// A per-alert failure. The batch continues past these; the alert stays in
/// the pool and is retried on the next tick.
#[derive(Debug)]
pub struct AlertFailure {
    pub alert_key: String,
    pub reason: &'static str,
    pub message: String,
}

#[derive(Debug, Default)]
pub struct DispatchOutcome {
    pub delivered: usize,
    pub failures: Vec<AlertFailure>,
}

pub struct Dispatcher {
    alerts: AlertsPool,
    secrets: Arc<dyn SecretReader>,
    templates: TemplateRenderer,
    validators: ValidatorRegistry,
    client: Client,
}

impl Dispatcher {
    pub fn new(
        alerts: AlertsPool,
        secrets: Arc<dyn SecretReader>,
        validators: ValidatorRegistry,
    ) -> Self {
        Self {
            alerts,
            secrets,
            templates: TemplateRenderer::new(),
            validators,
            client: Client::new(),
        }
    }

    /// One dispatch tick for `action`: deliver every alert currently
    /// targeting it.
    pub async fn dispatch(&self, action: &RulerAction) -> Result<DispatchOutcome, DispatchError> {
        let webhook = &action.spec.webhook;

        let credentials = match &webhook.credentials {
            Some(creds) => {
                // Webhook secrets always live in the action's namespace.
                let secret_ref = &creds.secret_ref;
                let namespace = action.metadata.namespace.as_str();
                let username = self
                    .secrets
                    .secret_value(namespace, &secret_ref.name, &secret_ref.key_username)
                    .await
                    .map_err(|e| DispatchError::SecretRead(e.to_string()))?;
                let password = self
                    .secrets
                    .secret_value(namespace, &secret_ref.name, &secret_ref.key_password)
                    .await
                    .map_err(|e| DispatchError::SecretRead(e.to_string()))?;
                match (username, password) {
                    (Some(u), Some(p)) if !u.is_empty() && !p.is_empty() => Some((u, p)),
                    _ => {
                        return Err(DispatchError::MissingCredentials {
                            secret: format!("{namespace}/{}", secret_ref.name),
                        })
                    }
                }
            }
            None => None,
        };

        let validator = match &webhook.validator {
            Some(name) => Some(self.validators.get(name).ok_or_else(|| {
                DispatchError::ValidatorNotFound { name: name.clone() }
            })?),
            None => None,
        };

        let mut outcome = DispatchOutcome::default();
        for (alert_key, alert) in self
            .alerts
            .for_action(&action.metadata.namespace, &action.metadata.name)
        {
            let payload = match self.templates.render(
                &alert.rule.spec.action_ref.data,
                &alert.rule,
                alert.value,
                alert.aggregations.as_ref(),
            ) {
                Ok(payload) => payload,
                Err(e) => {
                    tracing::error!(alert = %alert_key, error = %e, "template render failed");
                    outcome.failures.push(AlertFailure {
                        alert_key,
                        reason: conditions::REASON_EVALUATE_TEMPLATE_ERROR,
                        message: e.to_string(),
                    });
                    continue;
                }
            };

            if let Some(validator) = validator {
                let verdict = validator(&payload);
                if !verdict.ok {
                    tracing::error!(alert = %alert_key, hint = %verdict.hint, "payload validation failed");
                    outcome.failures.push(AlertFailure {
                        alert_key,
                        reason: conditions::REASON_VALIDATION_FAILED,
                        message: verdict.hint,
                    });
                    continue;
                }
            }

            match self.deliver(webhook, credentials.as_ref(), payload).await {
                Ok(()) => {
                    tracing::info!(
                        alert = %alert_key,
                        rule = %alert.rule.spec.description,
                        url = %webhook.url,
                        "alert delivered"
                    );
                    outcome.delivered += 1;
                }
                Err(message) => {
                    tracing::error!(alert = %alert_key, error = %message, "webhook delivery failed");
                    outcome.failures.push(AlertFailure {
                        alert_key,
                        reason: conditions::REASON_WEBHOOK_ERROR,
                        message,
                    });
                }
            }
        }

        Ok(outcome)
    }

    async fn deliver(
        &self,
        webhook: &warden_common::records::WebhookOptions,
        credentials: Option<&(String, String)>,
        payload: String,
    ) -> Result<(), String> {
        let method = Method::from_bytes(webhook.verb.to_uppercase().as_bytes())
            .map_err(|_| format!("invalid webhook verb {:?}", webhook.verb))?;

        let mut request = self
            .client
            .request(method, &webhook.url)
            .header(CONTENT_TYPE, "application/json");
        for (key, value) in &webhook.headers {
            request = request.header(key, value);
        }
        if let Some((username, password)) = credentials {
            request = request.basic_auth(username, Some(password));
        }

        let response = request.body(payload).send().await.map_err(|e| e.to_string())?;
        let status = response.status();
        if !status.is_success() {
            return Err(format!("webhook returned {status}"));
        }
        Ok(())
    }
}
