use crate::chain::ChainGateway;
use crate::client::RemoteApi;
use crate::config::FightConfig;
use crate::credentials::CredentialStore;
use crate::pacing::PacingPolicy;
use crate::report::StatusLog;
use anyhow::Result;
use async_trait::async_trait;
use core_logic::{RetryConfig, Sleeper};
use ethers::signers::LocalWallet;
use std::sync::Arc;

pub mod t01_login;
pub mod t02_games;
pub mod t03_airdrop;
pub mod t04_lottery;
pub mod t05_mint;

pub use self::t01_login::{login, LoginState};
pub use self::t02_games::GamesTask;
pub use self::t03_airdrop::AirdropTask;
pub use self::t04_lottery::LotteryTask;
pub use self::t05_mint::MintTask;

/// Everything one account run needs. Built fresh for each account.
#[derive(Clone)]
pub struct TaskContext {
    pub api: Arc<dyn RemoteApi>,
    pub chain: Arc<dyn ChainGateway>,
    pub wallet: LocalWallet,
    /// Checksummed address, also the credential store key.
    pub address: String,
    pub config: Arc<FightConfig>,
    pub credentials: CredentialStore,
    pub pacing: PacingPolicy,
    pub sleeper: Arc<dyn Sleeper>,
}

impl TaskContext {
    pub fn retry_config(&self) -> RetryConfig {
        let config = RetryConfig::new(self.config.retry_limit);
        match &self.pacing {
            PacingPolicy::Uniform(p) => config.with_delay_range(p.retry.min_ms, p.retry.max_ms),
            PacingPolicy::Disabled => config.with_delay_range(0, 0),
        }
    }
}

#[async_trait]
pub trait Task: Send + Sync {
    /// Status label written when the task itself errors out.
    fn name(&self) -> &str;

    /// Runs the task, recording outcomes in `status`. An `Err` means the task
    /// could not classify its own failure.
    async fn run(&self, ctx: &TaskContext, status: &mut StatusLog) -> Result<()>;
}
