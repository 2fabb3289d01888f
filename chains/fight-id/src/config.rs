use anyhow::Result;
use chrono_tz::Tz;
use config::{Config, Environment, File};
use core_logic::ConfigError;
use serde::Deserialize;
use std::time::Duration;

/// Inclusive millisecond range a pause is drawn from.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct DelayRange {
    pub min_ms: u64,
    pub max_ms: u64,
}

impl DelayRange {
    pub const fn secs(min: u64, max: u64) -> Self {
        Self {
            min_ms: min * 1000,
            max_ms: max * 1000,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct GameConfig {
    pub id: String,
    pub name: String,
}

/// Pauses between steps of an account run, all in milliseconds.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PacingConfig {
    pub enabled: bool,
    pub pre_login: DelayRange,
    pub pre_game: DelayRange,
    pub post_game: DelayRange,
    pub between_tasks: DelayRange,
    pub between_accounts: DelayRange,
    pub cycle_error_backoff: DelayRange,
    pub retry: DelayRange,
    pub min_taps: u32,
    pub max_taps: u32,
    pub game_duration_ms: u64,
    /// Fraction of the mean tap interval used as +/- jitter.
    pub tap_jitter: f64,
    pub micro_delay_chance: f64,
    pub micro_delay_max_ms: u64,
    /// Extra wait after the last synthesized tap before submitting.
    pub submit_grace_ms: u64,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            pre_login: DelayRange::secs(1, 3),
            pre_game: DelayRange::secs(2, 4),
            post_game: DelayRange::secs(3, 7),
            between_tasks: DelayRange::secs(3, 8),
            between_accounts: DelayRange::secs(5, 10),
            cycle_error_backoff: DelayRange::secs(10, 20),
            retry: DelayRange::secs(2, 5),
            min_taps: 30,
            max_taps: 54,
            game_duration_ms: 5000,
            tap_jitter: 0.4,
            micro_delay_chance: 0.05,
            micro_delay_max_ms: 49,
            submit_grace_ms: 500,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct FightConfig {
    pub api_base: String,
    /// Web origin sent as Origin/Referer, also the SIWA domain.
    pub app_origin: String,
    pub user_agent: String,
    pub ip_lookup_url: String,
    pub request_timeout_secs: u64,

    pub scheduled_hour: u32,
    pub scheduled_minute: u32,
    pub timezone: String,

    pub retry_limit: u32,
    pub credential_file: String,
    pub credential_freshness_days: i64,

    pub games: Vec<GameConfig>,
    pub airdrop_quest: String,

    pub chain_id: u64,
    pub rpc_urls: Vec<String>,
    pub rpc_probe_timeout_ms: u64,

    pub mint_threshold: u64,
    pub mint_contract: String,
    pub mint_selector: String,
    pub lottery_contract: String,
    pub lottery_selector: String,
    pub lottery_gas_limit: u64,

    /// Env var holding comma-separated private keys.
    pub accounts_env: String,
    /// Key file used when the env var is empty.
    pub accounts_file: String,
    pub proxies_file: String,
    /// Shared proxy for accounts without their own entry.
    pub proxy: Option<String>,
    pub log_dir: String,

    pub pacing: PacingConfig,
}

impl Default for FightConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.fight.id".to_string(),
            app_origin: "https://app.fight.id".to_string(),
            user_agent: format!("fight-id-agent/{}", env!("CARGO_PKG_VERSION")),
            ip_lookup_url: "https://api.ipify.org?format=json".to_string(),
            request_timeout_secs: 30,
            scheduled_hour: 7,
            scheduled_minute: 30,
            timezone: "Asia/Jakarta".to_string(),
            retry_limit: 3,
            credential_file: "tokens.json".to_string(),
            credential_freshness_days: 4,
            games: vec![
                GameConfig {
                    id: "punching-bag-daily".to_string(),
                    name: "Punching Bag".to_string(),
                },
                GameConfig {
                    id: "punching-ear-bag-daily".to_string(),
                    name: "Ear Bag".to_string(),
                },
            ],
            airdrop_quest: "be-airdrop-ready".to_string(),
            chain_id: 56,
            rpc_urls: vec![
                "https://bsc-dataseed.binance.org/".to_string(),
                "https://bsc-dataseed1.defibit.io/".to_string(),
                "https://bsc-dataseed1.ninicoin.io/".to_string(),
            ],
            rpc_probe_timeout_ms: 5000,
            mint_threshold: 2000,
            mint_contract: "0xD0B591751E6aa314192810471461bDE963796306".to_string(),
            mint_selector: "0x6548b7ae".to_string(),
            lottery_contract: "0x7D12f0c72a32fb517C79Ea33Cf91327Aa92A41E4".to_string(),
            lottery_selector: "0x9f2fe488".to_string(),
            lottery_gas_limit: 150_000,
            accounts_env: "PRIVATE_KEYS".to_string(),
            accounts_file: "pv.txt".to_string(),
            proxies_file: core_logic::ProxyManager::PROXY_FILE.to_string(),
            proxy: None,
            log_dir: "logs".to_string(),
            pacing: PacingConfig::default(),
        }
    }
}

impl FightConfig {
    /// Loads `path` (optional) with `FIGHT__*` environment overrides on top,
    /// e.g. `FIGHT__SCHEDULED_HOUR=9` or `FIGHT__PACING__ENABLED=false`.
    pub fn load(path: &str) -> Result<Self> {
        let settings = Config::builder()
            .add_source(File::with_name(path).required(false))
            .add_source(
                Environment::with_prefix("FIGHT")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let mut config: FightConfig = settings.try_deserialize()?;
        if config.proxy.is_none() {
            config.proxy = std::env::var("PROXY").ok().filter(|p| !p.trim().is_empty());
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |field: &str, reason: String| ConfigError::InvalidValue {
            field: field.to_string(),
            reason,
        };

        if self.scheduled_hour > 23 {
            return Err(invalid("scheduled_hour", format!("{} > 23", self.scheduled_hour)));
        }
        if self.scheduled_minute > 59 {
            return Err(invalid(
                "scheduled_minute",
                format!("{} > 59", self.scheduled_minute),
            ));
        }
        if self.retry_limit == 0 {
            return Err(invalid("retry_limit", "must be at least 1".to_string()));
        }
        if self.rpc_urls.is_empty() {
            return Err(invalid("rpc_urls", "at least one endpoint required".to_string()));
        }
        for url in &self.rpc_urls {
            if url::Url::parse(url).is_err() {
                return Err(ConfigError::InvalidRpcUrl { url: url.clone() });
            }
        }
        self.time_zone()?;
        parse_selector(&self.mint_selector).map_err(|r| invalid("mint_selector", r))?;
        parse_selector(&self.lottery_selector).map_err(|r| invalid("lottery_selector", r))?;

        let p = &self.pacing;
        if p.min_taps == 0 || p.min_taps > p.max_taps {
            return Err(invalid(
                "pacing.min_taps",
                format!("bad tap range {}..={}", p.min_taps, p.max_taps),
            ));
        }
        if !(0.0..1.0).contains(&p.tap_jitter) {
            return Err(invalid("pacing.tap_jitter", "must be in [0, 1)".to_string()));
        }
        if !(0.0..=1.0).contains(&p.micro_delay_chance) {
            return Err(invalid(
                "pacing.micro_delay_chance",
                "must be in [0, 1]".to_string(),
            ));
        }
        Ok(())
    }

    pub fn time_zone(&self) -> Result<Tz, ConfigError> {
        self.timezone
            .parse::<Tz>()
            .map_err(|e| ConfigError::InvalidValue {
                field: "timezone".to_string(),
                reason: e.to_string(),
            })
    }

    /// Host part of the app origin, used as the sign-in domain.
    pub fn app_domain(&self) -> String {
        url::Url::parse(&self.app_origin)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_else(|| self.app_origin.clone())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn freshness_window(&self) -> chrono::Duration {
        chrono::Duration::days(self.credential_freshness_days)
    }
}

/// Decodes a `0x`-prefixed 4-byte function selector.
pub fn parse_selector(selector: &str) -> Result<[u8; 4], String> {
    let body = selector.strip_prefix("0x").unwrap_or(selector);
    let bytes = hex::decode(body).map_err(|e| e.to_string())?;
    bytes
        .try_into()
        .map_err(|b: Vec<u8>| format!("expected 4 bytes, got {}", b.len()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = FightConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.mint_threshold, 2000);
        assert_eq!(config.games.len(), 2);
        assert_eq!(config.app_domain(), "app.fight.id");
    }

    #[test]
    fn rejects_out_of_range_schedule() {
        let config = FightConfig {
            scheduled_hour: 24,
            ..FightConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_unknown_timezone() {
        let config = FightConfig {
            timezone: "Mars/Olympus".to_string(),
            ..FightConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_bad_micro_delay_chance() {
        for chance in [f64::NAN, -0.1, 1.5] {
            let config = FightConfig {
                pacing: PacingConfig {
                    micro_delay_chance: chance,
                    ..PacingConfig::default()
                },
                ..FightConfig::default()
            };
            assert!(config.validate().is_err(), "accepted {}", chance);
        }
    }

    #[test]
    fn selector_parsing() {
        assert_eq!(parse_selector("0x6548b7ae").unwrap(), [0x65, 0x48, 0xb7, 0xae]);
        assert!(parse_selector("0x6548").is_err());
        assert!(parse_selector("nothex!!").is_err());
    }

    #[test]
    fn loads_toml_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fight.toml");
        std::fs::write(
            &path,
            "scheduled_hour = 9\nmint_threshold = 500\n[pacing]\nenabled = false\n",
        )
        .unwrap();

        let config = FightConfig::load(path.to_str().unwrap()).unwrap();
        assert_eq!(config.scheduled_hour, 9);
        assert_eq!(config.scheduled_minute, 30);
        assert_eq!(config.mint_threshold, 500);
        assert!(!config.pacing.enabled);
        assert_eq!(config.pacing.min_taps, 30);
    }
}
