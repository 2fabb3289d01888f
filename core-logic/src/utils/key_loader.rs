use crate::config::AccountSource;
use crate::error::{ConfigError, CoreError, WalletError};
use std::env;
use std::fmt;
use std::fs;
use std::path::Path;
use tracing::info;
use zeroize::Zeroizing;

/// Raw private key as supplied by the operator. Wiped from memory on drop.
#[derive(Clone)]
pub struct AccountKey(Zeroizing<String>);

impl fmt::Debug for AccountKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("AccountKey").field(&"***REDACTED***").finish()
    }
}

impl AccountKey {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(Zeroizing::new(raw.into().trim().to_string()))
    }

    /// Returns the key as `0x`-prefixed lowercase hex after checking its shape.
    pub fn normalized(&self) -> Result<Zeroizing<String>, WalletError> {
        let body = self
            .0
            .strip_prefix("0x")
            .or_else(|| self.0.strip_prefix("0X"))
            .unwrap_or(&self.0);

        if body.len() != 64 {
            return Err(WalletError::InvalidKeyLength { length: body.len() });
        }
        if hex::decode(body).is_err() {
            return Err(WalletError::InvalidKeyFormat);
        }
        Ok(Zeroizing::new(format!("0x{}", body.to_ascii_lowercase())))
    }
}

pub struct KeyLoader;

impl KeyLoader {
    /// Reads account keys from `source`, falling back to `fallback_file` when
    /// the source yields nothing. Zero keys is an error.
    pub fn load(source: &AccountSource, fallback_file: &str) -> Result<Vec<AccountKey>, CoreError> {
        let mut keys = match source {
            AccountSource::Env { key } => env::var(key)
                .map(|v| Self::parse_list(&v))
                .unwrap_or_default(),
            AccountSource::File { path } => Self::read_file(path)?,
        };

        if keys.is_empty() && Path::new(fallback_file).exists() {
            info!("Loading raw keys from {}", fallback_file);
            keys = Self::read_file(fallback_file)?;
        }

        if keys.is_empty() {
            let env_key = match source {
                AccountSource::Env { key } => key.clone(),
                AccountSource::File { path } => path.clone(),
            };
            return Err(ConfigError::NoAccounts {
                env_key,
                path: fallback_file.to_string(),
            }
            .into());
        }

        info!("Loaded {} account keys", keys.len());
        Ok(keys)
    }

    /// Splits a comma-separated key list.
    pub fn parse_list(value: &str) -> Vec<AccountKey> {
        value
            .split(',')
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(AccountKey::new)
            .collect()
    }

    /// One key per line; blank lines and `#` comments ignored.
    pub fn parse_lines(content: &str) -> Vec<AccountKey> {
        content
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && !l.starts_with('#'))
            .map(AccountKey::new)
            .collect()
    }

    fn read_file(path: &str) -> Result<Vec<AccountKey>, CoreError> {
        let content = Zeroizing::new(fs::read_to_string(path).map_err(|e| ConfigError::IoError {
            path: path.to_string(),
            msg: e.to_string(),
        })?);
        Ok(Self::parse_lines(&content))
    }
}
