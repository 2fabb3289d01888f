use crate::classify::{classify_error, error_message};
use crate::config::parse_selector;
use crate::report::{StatusCode, StatusLog};
use crate::task::{Task, TaskContext};
use anyhow::{Context, Result};
use async_trait::async_trait;
use ethers::types::{Address, Bytes};
use tracing::{info, warn};

/// Free daily USDT draw: fetch a signed entitlement, then redeem it on-chain.
pub struct LotteryTask;

#[async_trait]
impl Task for LotteryTask {
    fn name(&self) -> &str {
        "usdt"
    }

    async fn run(&self, ctx: &TaskContext, status: &mut StatusLog) -> Result<()> {
        info!("💵 Checking USDT draw...");
        let entry = match ctx.api.lottery_free_entry(&ctx.address).await {
            Ok(entry) => entry,
            Err(e) => {
                let code = if classify_error(&e).is_conflict() {
                    info!("✅ Already entered");
                    StatusCode::AlreadyEntered
                } else {
                    warn!("Draw entry rejected: {:#}", e);
                    StatusCode::Rejected(error_message(&e))
                };
                status.record(self.name(), code);
                return Ok(());
            }
        };

        let signature = match entry.signature.filter(|_| entry.success) {
            Some(sig) => sig,
            None => {
                status.record(self.name(), StatusCode::NoSignature);
                return Ok(());
            }
        };

        let contract: Address = ctx
            .config
            .lottery_contract
            .parse()
            .context("Invalid lottery contract address")?;

        let code = match lottery_calldata(&ctx.config.lottery_selector, &signature) {
            Ok(data) => {
                info!("Signature obtained, submitting...");
                match ctx
                    .chain
                    .send_call(contract, data, Some(ctx.config.lottery_gas_limit))
                    .await
                {
                    Ok(hash) => StatusCode::Entered(format!("{:?}", hash)),
                    Err(e) => {
                        warn!("Draw transaction failed: {:#}", e);
                        StatusCode::TxFail
                    }
                }
            }
            Err(e) => {
                warn!("Unusable draw signature: {:#}", e);
                StatusCode::TxFail
            }
        };
        status.record(self.name(), code);
        Ok(())
    }
}

/// Selector followed by the raw signature bytes.
pub fn lottery_calldata(selector: &str, signature: &str) -> Result<Bytes> {
    let selector = parse_selector(selector).map_err(anyhow::Error::msg)?;
    let sig = hex::decode(signature.trim_start_matches("0x")).context("Signature is not hex")?;

    let mut data = Vec::with_capacity(4 + sig.len());
    data.extend_from_slice(&selector);
    data.extend_from_slice(&sig);
    Ok(Bytes::from(data))
}
