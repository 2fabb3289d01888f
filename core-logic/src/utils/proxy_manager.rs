use crate::config::ProxyConfig;
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use tracing::{info, warn};

pub struct ProxyManager;

impl ProxyManager {
    pub const PROXY_FILE: &'static str = "proxies.txt";

    /// Loads proxies from a text file, one per line.
    ///
    /// A missing file means "no proxies". Blank lines and `#` comments are
    /// skipped. A malformed line keeps its slot as `None` so the remaining
    /// entries stay paired with the same accounts by index.
    pub fn load_proxies(path: impl AsRef<Path>) -> Result<Vec<Option<ProxyConfig>>> {
        let path = path.as_ref();
        if !path.exists() {
            warn!("{} not found. Running without per-account proxies.", path.display());
            return Ok(Vec::new());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;

        let proxies = Self::parse_lines(&content);
        let usable = proxies.iter().filter(|p| p.is_some()).count();
        info!(
            "Loaded {} proxies from {} ({} unusable)",
            usable,
            path.display(),
            proxies.len() - usable
        );
        Ok(proxies)
    }

    pub fn parse_lines(content: &str) -> Vec<Option<ProxyConfig>> {
        content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .enumerate()
            .map(|(slot, line)| match ProxyConfig::parse(line) {
                Ok(p) => Some(p),
                Err(e) => {
                    warn!("Proxy entry {} unusable, its account gets no own proxy: {}", slot + 1, e);
                    None
                }
            })
            .collect()
    }
}
