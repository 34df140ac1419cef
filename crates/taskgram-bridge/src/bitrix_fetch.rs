//! Best-effort task enrichment via the Bitrix24 `tasks.task.get` call.
//!
//! Event pushes often carry only the task id, so the bridge fetches the
//! full task when the payload is sparse. Authorization schemes are tried
//! in a fixed order, stopping at the first scheme that returns a
//! well-formed task; exhausting every scheme is a benign skip, never an
//! error, and the pipeline continues from whatever the event carried.

use reqwest::Client;
use serde_json::Value;

use crate::bridge_config::BridgeConfig;

#[derive(Debug, Clone)]
struct FetchAuthScheme {
    label: &'static str,
    url: String,
    query: Vec<(String, String)>,
}

/// Builds the auth-scheme ladder for one fetch: incoming-webhook path
/// credential, payload OAuth token, payload application token, then the
/// statically configured token. Payload-supplied tokens rank below the
/// path credential because only the latter cannot be spoofed inbound.
fn build_auth_schemes(config: &BridgeConfig, payload: &Value, task_id: &str) -> Vec<FetchAuthScheme> {
    let Some(api_base) = config.bitrix_api_base() else {
        return Vec::new();
    };
    let task_query = ("taskId".to_string(), task_id.to_string());
    let mut schemes = Vec::new();

    if let Some(webhook) = non_empty(config.bitrix_incoming_webhook.as_deref()) {
        schemes.push(FetchAuthScheme {
            label: "incoming_webhook",
            url: format!(
                "{api_base}/rest/{}/tasks.task.get.json",
                webhook.trim_matches('/')
            ),
            query: vec![task_query.clone()],
        });
    }
    let payload_auth = payload.get("auth");
    for (label, field) in [
        ("payload_access_token", "access_token"),
        ("payload_application_token", "application_token"),
    ] {
        if let Some(token) = payload_auth
            .and_then(|auth| auth.get(field))
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|token| !token.is_empty())
        {
            schemes.push(FetchAuthScheme {
                label,
                url: format!("{api_base}/rest/tasks.task.get.json"),
                query: vec![task_query.clone(), ("auth".to_string(), token.to_string())],
            });
        }
    }
    if let Some(token) = non_empty(config.bitrix_auth_token.as_deref()) {
        schemes.push(FetchAuthScheme {
            label: "configured_token",
            url: format!("{api_base}/rest/tasks.task.get.json"),
            query: vec![task_query, ("auth".to_string(), token.to_string())],
        });
    }
    schemes
}

/// Fetches the full task object, or `None` when no scheme succeeds.
pub async fn fetch_task_details(
    client: &Client,
    config: &BridgeConfig,
    payload: &Value,
    task_id: &str,
) -> Option<Value> {
    for scheme in build_auth_schemes(config, payload, task_id) {
        match request_task(client, &scheme).await {
            Ok(task) => {
                tracing::debug!(scheme = scheme.label, task_id, "task fetch succeeded");
                return Some(task);
            }
            Err(error) => {
                tracing::debug!(
                    scheme = scheme.label,
                    task_id,
                    %error,
                    "task fetch scheme failed"
                );
            }
        }
    }
    tracing::debug!(task_id, "all task fetch schemes exhausted");
    None
}

async fn request_task(client: &Client, scheme: &FetchAuthScheme) -> anyhow::Result<Value> {
    let response = client
        .get(scheme.url.as_str())
        .query(&scheme.query)
        .send()
        .await?;
    let status = response.status();
    if !status.is_success() {
        anyhow::bail!("http {status}");
    }
    let body = response.json::<Value>().await?;
    body.get("result")
        .and_then(|result| result.get("task"))
        .filter(|task| task.is_object())
        .cloned()
        .ok_or_else(|| anyhow::anyhow!("response missing result.task object"))
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}
