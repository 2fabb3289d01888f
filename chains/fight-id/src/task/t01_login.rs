use crate::client::{ChallengeProof, Session};
use crate::credentials::CredentialRecord;
use crate::task::TaskContext;
use anyhow::{Context, Result};
use chrono::Utc;
use core_logic::with_retry;
use ethers::signers::Signer;
use std::fmt;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginState {
    NoCredential,
    Validating,
    Authenticating,
    Authenticated,
    LoginFailed,
}

impl fmt::Display for LoginState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LoginState::NoCredential => "no-credential",
            LoginState::Validating => "validating",
            LoginState::Authenticating => "authenticating",
            LoginState::Authenticated => "authenticated",
            LoginState::LoginFailed => "login-failed",
        };
        f.write_str(name)
    }
}

/// Drives the login state machine to `Authenticated` or `LoginFailed`.
///
/// A cached token is only reused after a successful probe; a failed probe
/// goes straight to a full challenge/response sign-in.
pub async fn login(ctx: &TaskContext) -> LoginState {
    let mut state = LoginState::NoCredential;

    loop {
        state = match state {
            LoginState::NoCredential => match ctx.credentials.get(&ctx.address) {
                Some(record) if record.is_fresh(Utc::now(), ctx.config.freshness_window()) => {
                    ctx.api.set_bearer(Some(record.token));
                    LoginState::Validating
                }
                Some(_) => {
                    info!("Saved token is stale, signing in again");
                    LoginState::Authenticating
                }
                None => LoginState::Authenticating,
            },
            LoginState::Validating => match ctx.api.probe_session().await {
                Ok(()) => {
                    info!("✅ Using saved token");
                    LoginState::Authenticated
                }
                Err(e) => {
                    warn!("Saved token rejected: {:#}", e);
                    ctx.api.set_bearer(None);
                    LoginState::Authenticating
                }
            },
            LoginState::Authenticating => {
                let sleeper = ctx.sleeper.as_ref();
                match with_retry(ctx.retry_config(), "login", sleeper, || sign_in(ctx)).await {
                    Ok(session) => {
                        if let Err(e) = persist(ctx, session) {
                            warn!("Signed in but could not save token: {:#}", e);
                        }
                        LoginState::Authenticated
                    }
                    Err(e) => {
                        warn!("❌ Login failed: {:#}", e);
                        LoginState::LoginFailed
                    }
                }
            }
            done @ (LoginState::Authenticated | LoginState::LoginFailed) => return done,
        };
    }
}

/// One full challenge/response round. Always starts from a new challenge.
async fn sign_in(ctx: &TaskContext) -> Result<Session> {
    let challenge = ctx.api.get_challenge().await.context("Challenge request failed")?;
    let signature = ctx
        .wallet
        .sign_message(challenge.statement.as_bytes())
        .await
        .context("Failed to sign challenge")?;

    let proof = ChallengeProof {
        address: ctx.address.clone(),
        signature: format!("0x{}", signature),
        domain: ctx.config.app_domain(),
        timestamp_ms: Utc::now().timestamp_millis(),
    };

    ctx.api
        .submit_challenge(&challenge, &proof)
        .await
        .context("Challenge submission failed")
}

fn persist(ctx: &TaskContext, session: Session) -> Result<()> {
    info!(
        "✅ Logged in as {}",
        session.username.as_deref().unwrap_or("unknown")
    );
    ctx.api.set_bearer(Some(session.access_token.clone()));
    ctx.credentials.save(
        &ctx.address,
        CredentialRecord {
            token: session.access_token,
            user_id: session.user_id,
            username: session.username,
            date: Utc::now(),
        },
    )
}
