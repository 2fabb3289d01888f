//! One account, start to finish: open a session, log in, run the tasks in
//! random order, then check the balance and mint.

use crate::chain::{ChainGateway, EvmGateway};
use crate::client::{HttpRemote, RemoteApi};
use crate::config::FightConfig;
use crate::credentials::CredentialStore;
use crate::identity::NetworkIdentity;
use crate::pacing::PacingPolicy;
use crate::report::{AccountReport, StatusCode, StatusLog};
use crate::task::{login, AirdropTask, GamesTask, LoginState, LotteryTask, MintTask, Task, TaskContext};
use anyhow::{Context, Result};
use async_trait::async_trait;
use core_logic::{AccountKey, ProxyConfig, Sleeper};
use ethers::signers::{LocalWallet, Signer};
use ethers::utils::to_checksum;
use rand::seq::SliceRandom;
use std::sync::Arc;
use tracing::{error, info, info_span, warn, Instrument};

/// One configured account. `index` is 1-based.
#[derive(Debug, Clone)]
pub struct Account {
    pub index: usize,
    pub key: AccountKey,
    pub proxy: Option<ProxyConfig>,
}

impl Account {
    pub fn wallet(&self, chain_id: u64) -> Result<LocalWallet> {
        let key = self.key.normalized()?;
        let wallet: LocalWallet = key.as_str().parse().context("Invalid private key")?;
        Ok(wallet.with_chain_id(chain_id))
    }
}

/// Per-account remote handles.
pub struct AccountSession {
    pub api: Arc<dyn RemoteApi>,
    pub chain: Arc<dyn ChainGateway>,
    pub ip: String,
}

/// Builds a fresh [`AccountSession`] for each account run.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    async fn open(&self, account: &Account, wallet: &LocalWallet) -> Result<AccountSession>;
}

/// Real HTTP + JSON-RPC sessions.
pub struct HttpSessionFactory {
    config: Arc<FightConfig>,
    shared_proxy: Option<ProxyConfig>,
}

impl HttpSessionFactory {
    pub fn new(config: Arc<FightConfig>, shared_proxy: Option<ProxyConfig>) -> Self {
        Self {
            config,
            shared_proxy,
        }
    }
}

#[async_trait]
impl SessionFactory for HttpSessionFactory {
    async fn open(&self, account: &Account, wallet: &LocalWallet) -> Result<AccountSession> {
        let proxy = crate::identity::resolve_proxy(account.proxy.as_ref(), self.shared_proxy.as_ref());
        if let Some(p) = &proxy {
            info!("Using proxy {}", p.url);
        }

        let identity = NetworkIdentity::new(&self.config.user_agent, &self.config.app_origin, proxy);
        let ip = identity.lookup_ip(&self.config.ip_lookup_url).await;
        let http = identity.http_client(self.config.request_timeout())?;

        let chain = EvmGateway::new(
            wallet.clone(),
            self.config.chain_id,
            self.config.rpc_urls.clone(),
            std::time::Duration::from_millis(self.config.rpc_probe_timeout_ms),
            identity.proxy.as_ref(),
        )?;

        Ok(AccountSession {
            api: Arc::new(HttpRemote::new(http, &self.config.api_base)),
            chain: Arc::new(chain),
            ip,
        })
    }
}

pub struct AccountPipeline {
    config: Arc<FightConfig>,
    credentials: CredentialStore,
    sessions: Arc<dyn SessionFactory>,
    pacing: PacingPolicy,
    sleeper: Arc<dyn Sleeper>,
}

impl AccountPipeline {
    pub fn new(
        config: Arc<FightConfig>,
        credentials: CredentialStore,
        sessions: Arc<dyn SessionFactory>,
        pacing: PacingPolicy,
        sleeper: Arc<dyn Sleeper>,
    ) -> Self {
        Self {
            config,
            credentials,
            sessions,
            pacing,
            sleeper,
        }
    }

    /// Always returns a report; failures end up in the status log.
    pub async fn run(&self, account: &Account) -> AccountReport {
        let wallet = match account.wallet(self.config.chain_id) {
            Ok(w) => w,
            Err(e) => {
                error!("❌ Invalid key for account {}: {:#}", account.index, e);
                let mut status = StatusLog::new();
                status.record("status", StatusCode::InvalidKey);
                return AccountReport {
                    account: format!("Account {}", account.index),
                    status,
                };
            }
        };

        let address = to_checksum(&wallet.address(), None);
        let label = format!(
            "Account {} ({}...{})",
            account.index,
            &address[..6],
            &address[address.len() - 4..]
        );

        let span = info_span!("account", idx = account.index);
        let mut status = StatusLog::new();
        let outcome = self
            .run_account(account, wallet, address, &mut status)
            .instrument(span)
            .await;

        if let Err(e) = outcome {
            error!("💥 {} crashed: {:#}", label, e);
            status.record("status", StatusCode::Crash(e.to_string()));
        }

        AccountReport {
            account: label,
            status,
        }
    }

    async fn run_account(
        &self,
        account: &Account,
        wallet: LocalWallet,
        address: String,
        status: &mut StatusLog,
    ) -> Result<()> {
        info!("════════════ ACCOUNT {} ════════════", account.index);
        info!("Wallet: {}", address);

        let session = self
            .sessions
            .open(account, &wallet)
            .await
            .context("Failed to open session")?;
        status.record("IP", StatusCode::Ip(session.ip.clone()));

        let ctx = TaskContext {
            api: session.api,
            chain: session.chain,
            wallet,
            address,
            config: self.config.clone(),
            credentials: self.credentials.clone(),
            pacing: self.pacing.clone(),
            sleeper: self.sleeper.clone(),
        };

        info!("🔐 Logging in...");
        ctx.pacing.pause(ctx.sleeper.as_ref(), |p| p.pre_login).await;
        let state = login(&ctx).await;
        info!("Login finished: {}", state);
        if state != LoginState::Authenticated {
            status.record("login", StatusCode::Fail);
            return Ok(());
        }
        status.record("login", StatusCode::Ok);

        let mut tasks: Vec<Box<dyn Task>> =
            vec![Box::new(GamesTask), Box::new(AirdropTask), Box::new(LotteryTask)];
        tasks.shuffle(&mut rand::thread_rng());

        for task in &tasks {
            run_task(task.as_ref(), &ctx, status).await;
            ctx.pacing.pause(ctx.sleeper.as_ref(), |p| p.between_tasks).await;
        }

        run_task(&MintTask, &ctx, status).await;
        Ok(())
    }
}

async fn run_task(task: &dyn Task, ctx: &TaskContext, status: &mut StatusLog) {
    if let Err(e) = task.run(ctx, status).await {
        warn!("Task {} failed: {:#}", task.name(), e);
        status.record(task.name(), StatusCode::Error);
    }
}
