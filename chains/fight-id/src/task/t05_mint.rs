use crate::client::{MintAuthorization, Season};
use crate::config::parse_selector;
use crate::report::{StatusCode, StatusLog};
use crate::task::{Task, TaskContext};
use anyhow::{Context, Result};
use async_trait::async_trait;
use ethers::abi::{self, Token};
use ethers::types::{Address, Bytes, U256};
use tracing::{info, warn};

/// Point balance of one account at the time of the check.
#[derive(Debug, Clone)]
pub struct Balance {
    pub total: u64,
    pub migratable: u64,
    pub active_season: Option<Season>,
}

impl Balance {
    /// Uses the first active season; no active season means nothing is migratable.
    pub fn new(total: u64, seasons: Vec<Season>) -> Self {
        let active_season = seasons.into_iter().find(|s| s.is_active);
        let migratable = active_season
            .as_ref()
            .map(|s| s.migratable_points)
            .unwrap_or(0);
        Self {
            total,
            migratable,
            active_season,
        }
    }

    pub fn minted(&self) -> u64 {
        self.total.saturating_sub(self.migratable)
    }

    pub fn mint_eligible(&self, threshold: u64) -> bool {
        self.active_season.is_some() && self.migratable >= threshold
    }
}

/// Reports the balance and mints the migratable points once they reach the threshold.
pub struct MintTask;

#[async_trait]
impl Task for MintTask {
    fn name(&self) -> &str {
        "mint"
    }

    async fn run(&self, ctx: &TaskContext, status: &mut StatusLog) -> Result<()> {
        let balance = match tokio::try_join!(ctx.api.total_points(), ctx.api.seasons()) {
            Ok((total, seasons)) => Balance::new(total, seasons),
            Err(e) => {
                warn!("Balance check failed: {:#}", e);
                status.record("balance", StatusCode::Unavailable);
                return Ok(());
            }
        };

        status.record(
            "balance",
            StatusCode::Balance {
                unclaimed: balance.migratable,
                minted: balance.minted(),
            },
        );

        let threshold = ctx.config.mint_threshold;
        let season = match &balance.active_season {
            Some(season) if balance.mint_eligible(threshold) => season,
            _ => {
                status.record(
                    self.name(),
                    StatusCode::Progress {
                        current: balance.migratable,
                        threshold,
                    },
                );
                return Ok(());
            }
        };

        info!("🚀 Minting {} FP...", balance.migratable);
        let code = match mint(ctx, season.token_id).await {
            Ok(amount) => StatusCode::Minted(amount.to_string()),
            Err(e) => {
                warn!("❌ Mint error: {:#}", e);
                StatusCode::MintFail
            }
        };
        status.record(self.name(), code);
        Ok(())
    }
}

/// Authorization, on-chain mint, then settlement notice. No step is retried.
async fn mint(ctx: &TaskContext, token_id: U256) -> Result<U256> {
    let auth = ctx
        .api
        .request_mint(&ctx.address)
        .await
        .context("Mint authorization failed")?;

    let contract: Address = ctx
        .config
        .mint_contract
        .parse()
        .context("Invalid mint contract address")?;
    let data = mint_calldata(&ctx.config.mint_selector, token_id, &auth)?;

    let hash = ctx
        .chain
        .send_and_confirm(contract, data)
        .await
        .context("Mint transaction failed")?;
    info!("Mint tx confirmed: {:?}", hash);

    ctx.api
        .confirm_mint(&auth.minting_id, &format!("{:?}", hash))
        .await
        .context("Mint confirmation failed")?;
    Ok(auth.amount)
}

/// `selector ‖ abi.encode(tokenId, amount, nonce, deadline, signature)`.
pub fn mint_calldata(selector: &str, token_id: U256, auth: &MintAuthorization) -> Result<Bytes> {
    let selector = parse_selector(selector).map_err(anyhow::Error::msg)?;
    let signature = hex::decode(auth.signature.trim_start_matches("0x"))
        .context("Mint signature is not hex")?;

    let params = abi::encode(&[
        Token::Uint(token_id),
        Token::Uint(auth.amount),
        Token::Uint(auth.nonce),
        Token::Uint(auth.deadline),
        Token::Bytes(signature),
    ]);

    let mut data = selector.to_vec();
    data.extend(params);
    Ok(Bytes::from(data))
}
