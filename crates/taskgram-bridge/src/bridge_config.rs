//! Environment-sourced bridge configuration.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};

use crate::task_filters::TaskFilterConfig;

pub const DEFAULT_TELEGRAM_API_BASE: &str = "https://api.telegram.org";
pub const DEFAULT_URGENT_PRIORITY_THRESHOLD: i64 = 2;
pub const DEFAULT_URGENT_DEADLINE_HOURS: i64 = 24;
pub const DEFAULT_MAPPINGS_FILE: &str = "user_mappings.json";

#[derive(Debug, Clone)]
/// Runtime configuration for the webhook bridge, sourced from environment
/// variables with the same names the deployment scripts export.
pub struct BridgeConfig {
    pub host: String,
    pub port: u16,
    /// Externally reachable handler URL registered with `event.bind`.
    pub webhook_url: String,
    pub telegram_api_base: String,
    pub telegram_bot_token: Option<String>,
    /// Bitrix24 portal domain, with or without a scheme.
    pub bitrix_domain: String,
    pub bitrix_auth_token: Option<String>,
    /// Path-embedded incoming-webhook credential, e.g. `1/abc123`.
    pub bitrix_incoming_webhook: Option<String>,
    pub urgent_priority_threshold: i64,
    pub urgent_deadline_hours: i64,
    pub mappings_path: PathBuf,
    pub debug: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            webhook_url: String::new(),
            telegram_api_base: DEFAULT_TELEGRAM_API_BASE.to_string(),
            telegram_bot_token: None,
            bitrix_domain: String::new(),
            bitrix_auth_token: None,
            bitrix_incoming_webhook: None,
            urgent_priority_threshold: DEFAULT_URGENT_PRIORITY_THRESHOLD,
            urgent_deadline_hours: DEFAULT_URGENT_DEADLINE_HOURS,
            mappings_path: PathBuf::from(DEFAULT_MAPPINGS_FILE),
            debug: false,
        }
    }
}

impl BridgeConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            host: env_string("HOST").unwrap_or(defaults.host),
            port: env_parsed("PORT")?.unwrap_or(defaults.port),
            webhook_url: env_string("WEBHOOK_URL").unwrap_or(defaults.webhook_url),
            telegram_api_base: env_string("TELEGRAM_API_BASE").unwrap_or(defaults.telegram_api_base),
            telegram_bot_token: env_string("TELEGRAM_BOT_TOKEN"),
            bitrix_domain: env_string("BITRIX24_DOMAIN").unwrap_or(defaults.bitrix_domain),
            bitrix_auth_token: env_string("BITRIX24_AUTH_TOKEN"),
            bitrix_incoming_webhook: env_string("BITRIX24_INCOMING_WEBHOOK"),
            urgent_priority_threshold: env_parsed("URGENT_PRIORITY_THRESHOLD")?
                .unwrap_or(defaults.urgent_priority_threshold),
            urgent_deadline_hours: env_parsed("URGENT_DEADLINE_HOURS")?
                .unwrap_or(defaults.urgent_deadline_hours),
            mappings_path: env_string("MAPPINGS_FILE")
                .map(PathBuf::from)
                .unwrap_or(defaults.mappings_path),
            debug: env_string("DEBUG")
                .map(|value| value.eq_ignore_ascii_case("true") || value == "1")
                .unwrap_or(false),
        })
    }

    /// Checks the configuration a running webhook server depends on.
    pub fn validate_for_serve(&self) -> Result<()> {
        if self
            .telegram_bot_token
            .as_deref()
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .is_none()
        {
            bail!("TELEGRAM_BOT_TOKEN is required to serve notifications");
        }
        if self.bitrix_domain.trim().is_empty() {
            tracing::warn!("BITRIX24_DOMAIN is not set; task links degrade to local anchors");
        }
        Ok(())
    }

    /// Bitrix24 REST base URL. Plain domains get an https scheme; explicit
    /// http/https bases are kept as-is so tests can point at mock servers.
    pub fn bitrix_api_base(&self) -> Option<String> {
        let domain = self.bitrix_domain.trim().trim_end_matches('/');
        if domain.is_empty() {
            return None;
        }
        if domain.starts_with("http://") || domain.starts_with("https://") {
            Some(domain.to_string())
        } else {
            Some(format!("https://{domain}"))
        }
    }

    pub fn filter_config(&self) -> TaskFilterConfig {
        TaskFilterConfig {
            urgent_priority_threshold: self.urgent_priority_threshold,
            urgent_deadline_hours: self.urgent_deadline_hours,
        }
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn env_string(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn env_parsed<T>(name: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env_string(name) {
        Some(raw) => {
            let parsed = raw
                .parse::<T>()
                .with_context(|| format!("failed to parse {name}={raw}"))?;
            Ok(Some(parsed))
        }
        None => Ok(None),
    }
}
