//! Bitrix24 task-webhook to Telegram notification bridge.
//!
//! Inbound `OnTaskAdd`/`OnTaskUpdate` webhook payloads are decoded from
//! whichever encoding Bitrix24 chose to send (JSON, bracket-notation form
//! data, raw query strings), normalized into a canonical task record,
//! passed through the importance/leadership/urgency filter pipeline, and
//! forwarded to the responsible user's Telegram chat when every gate
//! passes. Filter rejections are benign skips, never errors.
//!
//! ```rust
//! use serde_json::json;
//! use taskgram_bridge::extract_task_record;
//!
//! let payload = json!({
//!     "event": "ONTASKADD",
//!     "data": {"FIELDS_AFTER": {"ID": "42", "TITLE": "Fix the build", "RESPONSIBLE_ID": "200"}}
//! });
//! let record = extract_task_record(&payload, "intranet.example.com").expect("task record");
//! assert_eq!(record.id, "42");
//! assert_eq!(record.responsible_id, "200");
//! ```

pub mod bitrix_fetch;
pub mod body_decode;
pub mod bridge_config;
pub mod event_subscribe;
pub mod identity_store;
pub mod task_filters;
pub mod task_record;
pub mod telegram_notify;
pub mod webhook_server;

pub use bitrix_fetch::*;
pub use body_decode::*;
pub use bridge_config::*;
pub use event_subscribe::*;
pub use identity_store::*;
pub use task_filters::*;
pub use task_record::*;
pub use telegram_notify::*;
pub use webhook_server::*;
