use fight_id::config::FightConfig;
use fight_id::{
    Account, AccountPipeline, CredentialStore, CycleScheduler, HttpSessionFactory, PacingPolicy,
};

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use core_logic::{setup_logger, AccountSource, KeyLoader, ProxyConfig, ProxyManager, TokioSleeper};
use dotenv::dotenv;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value = "chains/fight-id/config.toml")]
    config: String,
    /// Run a single cycle and exit.
    #[arg(long)]
    once: bool,
    /// Key file to read instead of the PRIVATE_KEYS variable.
    #[arg(short, long)]
    accounts: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let args = Args::parse();

    let config = FightConfig::load(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config))?;
    let _log_guard = setup_logger(&config.log_dir)?;

    println!("{}", "\n🤖 FIGHT ID DAILY RUNNER".bold().cyan());
    info!("Loaded config from {}", args.config);

    let source = match &args.accounts {
        Some(path) => AccountSource::File { path: path.clone() },
        None => AccountSource::Env {
            key: config.accounts_env.clone(),
        },
    };
    let keys = KeyLoader::load(&source, &config.accounts_file)?;

    let proxies = ProxyManager::load_proxies(&config.proxies_file)?;
    let shared_proxy = match config.proxy.as_deref() {
        Some(line) => match ProxyConfig::parse(line) {
            Ok(p) => Some(p),
            Err(e) => {
                warn!("Ignoring shared proxy: {}", e);
                None
            }
        },
        None => None,
    };

    let accounts: Vec<Account> = keys
        .into_iter()
        .enumerate()
        .map(|(i, key)| Account {
            index: i + 1,
            key,
            proxy: proxies.get(i).cloned().flatten(),
        })
        .collect();
    info!("Found {} accounts.", accounts.len());

    let time_zone = config.time_zone()?;
    let schedule = (config.scheduled_hour, config.scheduled_minute);
    let pacing = PacingPolicy::from_config(&config.pacing);
    let credentials = CredentialStore::new(&config.credential_file);
    info!("Credential store: {}", credentials.path().display());
    let config = Arc::new(config);
    let sleeper = Arc::new(TokioSleeper);

    let pipeline = AccountPipeline::new(
        config.clone(),
        credentials,
        Arc::new(HttpSessionFactory::new(config.clone(), shared_proxy)),
        pacing.clone(),
        sleeper.clone(),
    );
    let scheduler = CycleScheduler::new(pipeline, accounts, time_zone, schedule, pacing, sleeper);

    if args.once {
        scheduler.run_once(&mut std::io::stdout()).await?;
        return Ok(());
    }

    scheduler.run_forever().await;
    Ok(())
}
