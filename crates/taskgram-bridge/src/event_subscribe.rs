//! Registers the bridge's handler URL for Bitrix24 task events via the
//! `event.bind` REST call.

use anyhow::{bail, Context, Result};
use reqwest::Client;
use serde_json::Value;

use crate::bridge_config::BridgeConfig;

pub const SUBSCRIBED_TASK_EVENTS: &[&str] = &["OnTaskAdd", "OnTaskUpdate"];

#[derive(Debug, Clone, PartialEq, Eq)]
/// Outcome of one `event.bind` registration.
pub struct EventBindReport {
    pub event: String,
    pub ok: bool,
    pub detail: String,
}

/// Binds every task event to the configured handler URL and reports the
/// per-event outcome. A transport failure aborts; an API-level error is
/// recorded in the report so the operator sees all outcomes at once.
pub async fn subscribe_task_events(
    client: &Client,
    config: &BridgeConfig,
) -> Result<Vec<EventBindReport>> {
    let Some(api_base) = config.bitrix_api_base() else {
        bail!("BITRIX24_DOMAIN is required to subscribe to events");
    };
    let Some(token) = config
        .bitrix_auth_token
        .as_deref()
        .map(str::trim)
        .filter(|token| !token.is_empty())
    else {
        bail!("BITRIX24_AUTH_TOKEN is required to subscribe to events");
    };
    if config.webhook_url.trim().is_empty() {
        bail!("WEBHOOK_URL is required to subscribe to events");
    }

    let endpoint = format!("{api_base}/rest/event.bind.json");
    let mut reports = Vec::with_capacity(SUBSCRIBED_TASK_EVENTS.len());
    for event in SUBSCRIBED_TASK_EVENTS {
        let response = client
            .get(endpoint.as_str())
            .query(&[
                ("auth", token),
                ("event", event),
                ("handler", config.webhook_url.trim()),
            ])
            .send()
            .await
            .with_context(|| format!("event.bind transport error for {event}"))?;
        let body = response
            .json::<Value>()
            .await
            .with_context(|| format!("event.bind response parse error for {event}"))?;

        let report = if body.get("result").map(is_truthy_result).unwrap_or(false) {
            EventBindReport {
                event: event.to_string(),
                ok: true,
                detail: "subscribed".to_string(),
            }
        } else {
            let detail = body
                .get("error_description")
                .or_else(|| body.get("error"))
                .and_then(Value::as_str)
                .unwrap_or("unexpected response")
                .to_string();
            EventBindReport {
                event: event.to_string(),
                ok: false,
                detail,
            }
        };
        reports.push(report);
    }
    Ok(reports)
}

fn is_truthy_result(result: &Value) -> bool {
    match result {
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_i64().unwrap_or(0) != 0,
        Value::String(text) => !text.trim().is_empty(),
        _ => false,
    }
}
