//! Persisted mapping from Bitrix24 user ids to leadership flags and
//! Telegram chat ids.
//!
//! One JSON document, rewritten wholesale on every mutation. There is no
//! locking: write volume is administrative and rare, and concurrent
//! writers losing an update is an accepted risk for this deployment
//! profile. A missing or malformed document degrades to the empty
//! structure so the notification path never hard-fails on store trouble.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use taskgram_core::write_text_atomic;

pub const IDENTITY_STORE_SCHEMA_VERSION: u32 = 1;

fn identity_store_schema_version() -> u32 {
    IDENTITY_STORE_SCHEMA_VERSION
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
/// On-disk shape of the identity store document.
pub struct IdentityMappings {
    #[serde(default = "identity_store_schema_version")]
    pub schema_version: u32,
    #[serde(default)]
    pub leaders: Vec<String>,
    #[serde(default)]
    pub telegram_chats: BTreeMap<String, String>,
}

impl Default for IdentityMappings {
    fn default() -> Self {
        Self {
            schema_version: IDENTITY_STORE_SCHEMA_VERSION,
            leaders: Vec::new(),
            telegram_chats: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone)]
/// File-backed identity store with an injected path. Every operation is
/// a read-modify-write of the whole document.
pub struct IdentityStore {
    path: PathBuf,
}

impl IdentityStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the document, degrading to the empty structure on a missing
    /// file or parse failure.
    pub fn load(&self) -> IdentityMappings {
        if !self.path.exists() {
            return IdentityMappings::default();
        }
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(error) => {
                tracing::warn!(
                    path = %self.path.display(),
                    %error,
                    "failed to read identity mappings; using empty store"
                );
                return IdentityMappings::default();
            }
        };
        match serde_json::from_str::<IdentityMappings>(&raw) {
            Ok(mappings) => mappings,
            Err(error) => {
                tracing::warn!(
                    path = %self.path.display(),
                    %error,
                    "failed to parse identity mappings; using empty store"
                );
                IdentityMappings::default()
            }
        }
    }

    pub fn is_leader(&self, user_id: &str) -> bool {
        let user_id = user_id.trim();
        self.load()
            .leaders
            .iter()
            .any(|leader| leader.trim() == user_id)
    }

    pub fn chat_id_for(&self, user_id: &str) -> Option<String> {
        self.load().telegram_chats.get(user_id.trim()).cloned()
    }

    pub fn add_leader(&self, user_id: &str) -> Result<()> {
        let user_id = user_id.trim().to_string();
        let mut mappings = self.load();
        if !mappings.leaders.contains(&user_id) {
            mappings.leaders.push(user_id);
            self.save(&mappings)?;
        }
        Ok(())
    }

    pub fn remove_leader(&self, user_id: &str) -> Result<()> {
        let user_id = user_id.trim();
        let mut mappings = self.load();
        let before = mappings.leaders.len();
        mappings.leaders.retain(|leader| leader.trim() != user_id);
        if mappings.leaders.len() != before {
            self.save(&mappings)?;
        }
        Ok(())
    }

    pub fn set_chat_mapping(&self, user_id: &str, chat_id: &str) -> Result<()> {
        let mut mappings = self.load();
        mappings
            .telegram_chats
            .insert(user_id.trim().to_string(), chat_id.trim().to_string());
        self.save(&mappings)
    }

    pub fn remove_chat_mapping(&self, user_id: &str) -> Result<()> {
        let mut mappings = self.load();
        if mappings.telegram_chats.remove(user_id.trim()).is_some() {
            self.save(&mappings)?;
        }
        Ok(())
    }

    pub fn leaders(&self) -> Vec<String> {
        self.load().leaders
    }

    /// Full document for the administrative `list` command.
    pub fn snapshot(&self) -> IdentityMappings {
        self.load()
    }

    fn save(&self, mappings: &IdentityMappings) -> Result<()> {
        let mut encoded = serde_json::to_string_pretty(mappings)
            .context("failed to encode identity mappings")?;
        encoded.push('\n');
        write_text_atomic(&self.path, &encoded)
            .with_context(|| format!("failed to write {}", self.path.display()))
    }
}
