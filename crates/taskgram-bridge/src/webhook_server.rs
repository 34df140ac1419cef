//! The inbound webhook endpoint and the full notification chain:
//! decode → normalize → filter → resolve chat → render → dispatch.
//!
//! Every recognized outcome, including deliberate skips, answers 200
//! with an explanatory JSON status body. Only an undecodable request
//! body (400) and a dispatch or internal failure (500) are non-200.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::extract::{RawQuery, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use reqwest::Client;
use serde_json::{json, Value};
use tokio::net::TcpListener;

use crate::bitrix_fetch::fetch_task_details;
use crate::body_decode::{decode_query_string, decode_webhook_body};
use crate::bridge_config::BridgeConfig;
use crate::identity_store::IdentityStore;
use crate::task_filters::evaluate_task_filters;
use crate::task_record::{
    build_task_record, locate_task_object, probe_string_field, RESPONSIBLE_ID_ALIASES,
    TASK_ID_ALIASES, TASK_TITLE_ALIASES,
};
use crate::telegram_notify::{render_task_notification, send_telegram_message, TaskEventKind};

pub const OUTBOUND_CALL_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct WebhookServerState {
    pub config: BridgeConfig,
    pub store: IdentityStore,
    pub http: Client,
}

impl WebhookServerState {
    pub fn new(config: BridgeConfig) -> Result<Self> {
        let store = IdentityStore::new(config.mappings_path.clone());
        let http = Client::builder()
            .timeout(OUTBOUND_CALL_TIMEOUT)
            .build()
            .context("failed to build outbound http client")?;
        Ok(Self {
            config,
            store,
            http,
        })
    }
}

pub fn build_webhook_router(state: Arc<WebhookServerState>) -> Router {
    Router::new()
        .route(
            "/webhook_tasks",
            get(handle_webhook_tasks_get).post(handle_webhook_tasks_post),
        )
        .route("/health", get(handle_health))
        .with_state(state)
}

/// Binds the configured address and serves until ctrl-c.
pub async fn run_webhook_server(config: BridgeConfig) -> Result<()> {
    let bind_address = config.bind_address();
    let state = Arc::new(WebhookServerState::new(config)?);
    let listener = TcpListener::bind(bind_address.as_str())
        .await
        .with_context(|| format!("failed to bind {bind_address}"))?;
    let local_addr = listener
        .local_addr()
        .context("failed to resolve bound address")?;
    tracing::info!(addr = %local_addr, "taskgram webhook server listening");

    let app = build_webhook_router(state);
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .context("webhook server exited unexpectedly")?;
    Ok(())
}

async fn handle_health() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({"status": "ok", "service": "taskgram"})),
    )
}

async fn handle_webhook_tasks_get(
    State(state): State<Arc<WebhookServerState>>,
    RawQuery(query): RawQuery,
) -> impl IntoResponse {
    let payload = decode_query_string(query.as_deref().unwrap_or(""));
    dispatch_webhook_payload(&state, payload).await
}

async fn handle_webhook_tasks_post(
    State(state): State<Arc<WebhookServerState>>,
    body: String,
) -> impl IntoResponse {
    let payload = match decode_webhook_body(&body) {
        Ok(payload) => payload,
        Err(error) => {
            tracing::warn!(code = error.code.as_str(), %error, "undecodable webhook body");
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({"status": "error", "message": "Could not parse request data"})),
            );
        }
    };
    dispatch_webhook_payload(&state, payload).await
}

async fn dispatch_webhook_payload(
    state: &WebhookServerState,
    payload: Value,
) -> (StatusCode, Json<Value>) {
    match process_webhook_payload(state, payload).await {
        Ok(response) => response,
        Err(error) => {
            tracing::error!(%error, "internal failure while processing webhook");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"status": "error", "message": "Internal server error"})),
            )
        }
    }
}

async fn process_webhook_payload(
    state: &WebhookServerState,
    payload: Value,
) -> Result<(StatusCode, Json<Value>)> {
    let Some(task_object) = locate_task_object(&payload) else {
        tracing::debug!("webhook payload carries no task data");
        return Ok(skip_response("No task data"));
    };
    let Some(task_id) = probe_string_field(task_object, TASK_ID_ALIASES) else {
        tracing::debug!("webhook task object carries no task id");
        return Ok(skip_response("No task ID"));
    };

    // Event pushes may carry only the changed fields; enrich sparse
    // payloads from the REST API before normalizing.
    let sparse = probe_string_field(task_object, TASK_TITLE_ALIASES).is_none()
        || probe_string_field(task_object, RESPONSIBLE_ID_ALIASES).is_none();
    let fetched = if sparse {
        fetch_task_details(&state.http, &state.config, &payload, &task_id).await
    } else {
        None
    };
    let task_source = fetched.as_ref().unwrap_or(task_object);

    let record = build_task_record(task_source, &state.config.bitrix_domain);
    if record.id.is_empty() {
        return Ok(skip_response("No task ID"));
    }
    tracing::debug!(
        task_id = %record.id,
        creator_id = %record.creator_id,
        responsible_id = %record.responsible_id,
        "processing task event"
    );

    let verdict = evaluate_task_filters(
        task_source,
        &record.creator_id,
        &state.store,
        &state.config.filter_config(),
    );
    if !verdict.passed() {
        return Ok(skip_response(verdict.skip_message()));
    }

    let Some(chat_id) = state.store.chat_id_for(&record.responsible_id) else {
        tracing::debug!(
            responsible_id = %record.responsible_id,
            "no telegram mapping for responsible user"
        );
        return Ok(skip_response("No Telegram mapping"));
    };

    let event_name = payload
        .get("event")
        .and_then(Value::as_str)
        .unwrap_or_default();
    let kind = TaskEventKind::from_event_name(event_name);
    let text = render_task_notification(&record, kind);
    let token = state
        .config
        .telegram_bot_token
        .as_deref()
        .unwrap_or_default();

    match send_telegram_message(
        &state.http,
        &state.config.telegram_api_base,
        token,
        &chat_id,
        &text,
    )
    .await
    {
        Ok(()) => {
            tracing::info!(
                task_id = %record.id,
                chat_id = %chat_id,
                kind = kind.as_str(),
                "notification sent"
            );
            Ok((
                StatusCode::OK,
                Json(json!({"status": "ok", "message": "Notification sent"})),
            ))
        }
        Err(error) => {
            tracing::error!(task_id = %record.id, chat_id = %chat_id, %error, "notification dispatch failed");
            Ok((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"status": "error", "message": "Failed to send notification"})),
            ))
        }
    }
}

fn skip_response(message: &str) -> (StatusCode, Json<Value>) {
    (
        StatusCode::OK,
        Json(json!({"status": "ok", "message": message})),
    )
}
