use crate::report::{StatusCode, StatusLog};
use crate::task::{Task, TaskContext};
use anyhow::Result;
use async_trait::async_trait;
use tracing::{info, warn};

/// Claims the verification reward unless the quest is already complete.
/// Best effort: errors are recorded, never retried.
pub struct AirdropTask;

#[async_trait]
impl Task for AirdropTask {
    fn name(&self) -> &str {
        "airdrop"
    }

    async fn run(&self, ctx: &TaskContext, status: &mut StatusLog) -> Result<()> {
        info!("🪂 Checking airdrop...");
        let outcome = async {
            if ctx.api.quest_completed(&ctx.config.airdrop_quest).await? {
                return anyhow::Ok(StatusCode::Done);
            }
            ctx.api.claim_verification_reward().await?;
            anyhow::Ok(StatusCode::Claimed)
        }
        .await;

        let code = outcome.unwrap_or_else(|e| {
            warn!("Airdrop failed: {:#}", e);
            StatusCode::Fail
        });
        status.record(self.name(), code);
        Ok(())
    }
}
