//! Telegram notification rendering and dispatch.
//!
//! One fixed HTML template whose lead sentence depends on the event
//! kind. User-supplied text is escaped before interpolation so a task
//! title cannot inject markup into the message. Dispatch is a single
//! sendMessage POST with the client's bounded timeout; failures are
//! reported to the caller and never retried or queued.

use anyhow::{anyhow, bail, Context, Result};
use reqwest::Client;
use serde_json::{json, Value};

use crate::task_record::TaskRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskEventKind {
    Created,
    Updated,
}

impl TaskEventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
        }
    }

    /// Bitrix24 event names: `ONTASKADD` (and `OnTaskAdd`) mean created,
    /// everything else is treated as an update.
    pub fn from_event_name(event: &str) -> Self {
        if event.to_ascii_lowercase().contains("add") {
            Self::Created
        } else {
            Self::Updated
        }
    }
}

/// Escapes the characters Telegram's HTML parse mode treats as markup.
pub fn escape_telegram_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Renders the notification text. The two event kinds differ only in
/// the lead sentence.
pub fn render_task_notification(task: &TaskRecord, kind: TaskEventKind) -> String {
    let lead = match kind {
        TaskEventKind::Created => "Срочная задача",
        TaskEventKind::Updated => "Срочная задача (обновление)",
    };
    format!(
        "🔴 <b>{lead}</b>\n\n\
         От: {creator}\n\n\
         Наименование задачи: <b>{title}</b>\n\n\
         Детальная информация по ссылке: <a href=\"{link}\">Открыть задачу</a>",
        creator = escape_telegram_html(&task.creator_name),
        title = escape_telegram_html(&task.title),
        link = escape_telegram_html(&task.link),
    )
}

pub fn build_send_message_endpoint(api_base: &str, bot_token: &str) -> String {
    format!("{}/bot{}/sendMessage", api_base.trim_end_matches('/'), bot_token)
}

/// Performs the single outbound sendMessage call. The response body's
/// `ok` field is authoritative; Telegram reports API errors with 200s
/// and error payloads alike.
pub async fn send_telegram_message(
    client: &Client,
    api_base: &str,
    bot_token: &str,
    chat_id: &str,
    text: &str,
) -> Result<()> {
    let endpoint = build_send_message_endpoint(api_base, bot_token);
    let response = client
        .post(endpoint.as_str())
        .json(&json!({
            "chat_id": chat_id,
            "text": text,
            "parse_mode": "HTML",
            "disable_web_page_preview": false
        }))
        .send()
        .await
        .context("telegram sendMessage transport error")?;

    let status = response.status();
    let body = response
        .json::<Value>()
        .await
        .map_err(|error| anyhow!("telegram sendMessage response parse error: {error}"))?;
    if !status.is_success() || !body.get("ok").and_then(Value::as_bool).unwrap_or(false) {
        let description = body
            .get("description")
            .and_then(Value::as_str)
            .unwrap_or("unknown error");
        bail!("telegram API error (http {status}): {description}");
    }
    Ok(())
}
