use crate::classify::{classify_error, error_message};
use crate::client::GameProof;
use crate::config::GameConfig;
use crate::pacing::TapModel;
use crate::report::{StatusCode, StatusLog};
use crate::task::{Task, TaskContext};
use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use rand::seq::SliceRandom;
use std::time::Duration;
use tracing::{info, warn};

/// Plays every configured mini-game once, in random order.
pub struct GamesTask;

#[async_trait]
impl Task for GamesTask {
    fn name(&self) -> &str {
        "games"
    }

    async fn run(&self, ctx: &TaskContext, status: &mut StatusLog) -> Result<()> {
        let mut games = ctx.config.games.clone();
        games.shuffle(&mut rand::thread_rng());

        for game in &games {
            info!("🥊 Playing {}...", game.name);
            let code = match play(ctx, game).await {
                Ok(code) => code,
                Err(e) => {
                    let conflict = classify_error(&e);
                    if conflict.is_conflict() {
                        info!("{} skipped ({:?}): {}", game.name, conflict, error_message(&e));
                        StatusCode::Done
                    } else {
                        warn!("{} failed: {:#}", game.name, e);
                        StatusCode::Error
                    }
                }
            };
            status.record(game.name.clone(), code);
            ctx.pacing.pause(ctx.sleeper.as_ref(), |p| p.post_game).await;
        }
        Ok(())
    }
}

async fn play(ctx: &TaskContext, game: &GameConfig) -> Result<StatusCode> {
    ctx.pacing.pause(ctx.sleeper.as_ref(), |p| p.pre_game).await;

    let session_id = match ctx.api.start_game(&game.id).await? {
        Some(id) => id,
        None => return Ok(StatusCode::Done),
    };

    let model = TapModel::from(&ctx.config.pacing);
    let start = Utc::now().timestamp_millis();
    let taps = model.synthesize(start, &mut rand::thread_rng());
    info!("Simulating {} taps...", taps.len());

    // Never submit before the claimed play time has passed.
    let last = taps.last().copied().unwrap_or(start);
    let remaining = (last - Utc::now().timestamp_millis()).max(0) as u64;
    ctx.sleeper
        .sleep(Duration::from_millis(remaining + ctx.config.pacing.submit_grace_ms))
        .await;

    let points = ctx
        .api
        .submit_game(&GameProof {
            game_id: game.id.clone(),
            session_id,
            duration_ms: model.duration_ms,
            taps,
        })
        .await?;
    Ok(StatusCode::Points(points))
}
