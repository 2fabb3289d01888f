//! Cached bearer tokens, one per account address, in a JSON file.
//!
//! The file is always read and written whole. Anything unreadable, including
//! the old single-token layout, loads as an empty map so every account simply
//! logs in again.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialRecord {
    pub token: String,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    /// Issuance time.
    pub date: DateTime<Utc>,
}

impl CredentialRecord {
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now - self.date
    }

    /// True while `age < window`. A fresh record still needs a probe.
    pub fn is_fresh(&self, now: DateTime<Utc>, window: Duration) -> bool {
        self.age(now) < window
    }
}

pub type CredentialMap = BTreeMap<String, CredentialRecord>;

#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> CredentialMap {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) => {
                debug!("No credential store at {}: {}", self.path.display(), e);
                return CredentialMap::new();
            }
        };

        let value: Value = match serde_json::from_str(&raw) {
            Ok(v) => v,
            Err(e) => {
                warn!("Ignoring corrupt credential store {}: {}", self.path.display(), e);
                return CredentialMap::new();
            }
        };

        if value.get("token").is_some() {
            warn!("Legacy single-token store found, all accounts will re-authenticate");
            return CredentialMap::new();
        }

        match serde_json::from_value(value) {
            Ok(map) => map,
            Err(e) => {
                warn!("Unrecognised credential store layout: {}", e);
                CredentialMap::new()
            }
        }
    }

    pub fn get(&self, account: &str) -> Option<CredentialRecord> {
        self.load().remove(account)
    }

    /// Overwrites the record for `account` and rewrites the whole file.
    pub fn save(&self, account: &str, record: CredentialRecord) -> Result<()> {
        let mut map = self.load();
        map.insert(account.to_string(), record);

        let json = serde_json::to_string_pretty(&map).context("Failed to encode credentials")?;

        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create {}", dir.display()))?;
        }

        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json).with_context(|| format!("Failed to write {}", tmp.display()))?;
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;
        Ok(())
    }
}
