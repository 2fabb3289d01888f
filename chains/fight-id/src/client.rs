//! Remote API used by the account tasks.
//!
//! [`RemoteApi`] is the seam between task logic and HTTP. [`HttpRemote`] is the
//! reqwest implementation; tests substitute in-memory fakes.

use anyhow::{Context, Result};
use async_trait::async_trait;
use ethers::types::U256;
use reqwest::{Client, Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::{json, Value};
use std::sync::RwLock;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ApiError {
    /// Non-2xx response. `message` is the server's own text when it sent one.
    #[error("HTTP {status}: {message}")]
    Rejected { status: u16, message: String },

    #[error("Response from {endpoint} has no data")]
    MissingData { endpoint: String },
}

/// One-time sign-in challenge.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Challenge {
    pub nonce: String,
    #[serde(deserialize_with = "de_string")]
    pub nonce_id: String,
    pub statement: String,
    #[serde(default)]
    pub resources: Value,
}

/// Signature over [`Challenge::statement`] plus the fields echoed back with it.
#[derive(Debug, Clone)]
pub struct ChallengeProof {
    pub address: String,
    pub signature: String,
    pub domain: String,
    pub timestamp_ms: i64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub access_token: String,
    #[serde(default, deserialize_with = "de_opt_string")]
    pub user_id: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GameProof {
    pub game_id: String,
    pub session_id: String,
    pub duration_ms: u64,
    pub taps: Vec<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LotteryEntry {
    pub success: bool,
    pub signature: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Season {
    #[serde(default)]
    pub is_active: bool,
    #[serde(default, deserialize_with = "de_points")]
    pub migratable_points: u64,
    #[serde(default, deserialize_with = "de_u256")]
    pub token_id: U256,
}

/// Server-signed permission to mint `amount` tokens.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MintAuthorization {
    #[serde(deserialize_with = "de_string")]
    pub minting_id: String,
    #[serde(deserialize_with = "de_u256")]
    pub amount: U256,
    #[serde(deserialize_with = "de_u256")]
    pub nonce: U256,
    #[serde(deserialize_with = "de_u256")]
    pub deadline: U256,
    pub signature: String,
}

#[async_trait]
pub trait RemoteApi: Send + Sync {
    /// Bearer token attached to every later request.
    fn set_bearer(&self, token: Option<String>);

    async fn get_challenge(&self) -> Result<Challenge>;
    async fn submit_challenge(&self, challenge: &Challenge, proof: &ChallengeProof) -> Result<Session>;
    /// Cheap authenticated call used to validate a cached token.
    async fn probe_session(&self) -> Result<()>;

    /// `None` means the game cannot be played again today.
    async fn start_game(&self, game_id: &str) -> Result<Option<String>>;
    async fn submit_game(&self, proof: &GameProof) -> Result<u64>;

    async fn quest_completed(&self, quest: &str) -> Result<bool>;
    async fn claim_verification_reward(&self) -> Result<()>;

    async fn lottery_free_entry(&self, address: &str) -> Result<LotteryEntry>;

    async fn total_points(&self) -> Result<u64>;
    async fn seasons(&self) -> Result<Vec<Season>>;
    async fn request_mint(&self, address: &str) -> Result<MintAuthorization>;
    async fn confirm_mint(&self, minting_id: &str, tx_hash: &str) -> Result<()>;
}

#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: serde::Deserialize<'de>"))]
struct Envelope<T> {
    #[serde(default)]
    success: Option<bool>,
    #[serde(default)]
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GameStart {
    #[serde(default, deserialize_with = "de_opt_string")]
    session_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GameResult {
    #[serde(default, deserialize_with = "de_points")]
    points: u64,
}

#[derive(Debug, Default, Deserialize)]
struct LotteryData {
    #[serde(default)]
    signature: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserProfile {
    #[serde(default)]
    user_season_points: Vec<SeasonPoints>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SeasonPoints {
    #[serde(default, deserialize_with = "de_points")]
    total_points: u64,
}

pub struct HttpRemote {
    http: Client,
    base: String,
    bearer: RwLock<Option<String>>,
}

impl HttpRemote {
    pub fn new(http: Client, base: &str) -> Self {
        Self {
            http,
            base: base.trim_end_matches('/').to_string(),
            bearer: RwLock::new(None),
        }
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let req = self.http.request(method, format!("{}{}", self.base, path));
        let token = self.bearer.read().ok().and_then(|t| t.clone());
        match token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    async fn call<T: DeserializeOwned>(&self, req: RequestBuilder, path: &str) -> Result<Envelope<T>> {
        let resp = req
            .send()
            .await
            .with_context(|| format!("Request to {} failed", path))?;
        let status = resp.status();

        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            debug!("{} -> {}: {}", path, status, body);
            return Err(ApiError::Rejected {
                status: status.as_u16(),
                message: rejection_message(&body, status.canonical_reason()),
            }
            .into());
        }

        let body = resp
            .text()
            .await
            .with_context(|| format!("Failed to read response from {}", path))?;
        if body.trim().is_empty() {
            return Ok(Envelope {
                success: None,
                data: None,
            });
        }
        serde_json::from_str(&body).with_context(|| format!("Malformed response from {}", path))
    }

    async fn data<T: DeserializeOwned>(&self, req: RequestBuilder, path: &str) -> Result<T> {
        self.call::<T>(req, path).await?.data.ok_or_else(|| {
            ApiError::MissingData {
                endpoint: path.to_string(),
            }
            .into()
        })
    }
}

#[async_trait]
impl RemoteApi for HttpRemote {
    fn set_bearer(&self, token: Option<String>) {
        if let Ok(mut slot) = self.bearer.write() {
            *slot = token;
        }
    }

    async fn get_challenge(&self) -> Result<Challenge> {
        let path = "/auth/siwa";
        self.data(self.request(Method::GET, path), path).await
    }

    async fn submit_challenge(&self, challenge: &Challenge, proof: &ChallengeProof) -> Result<Session> {
        let path = "/auth/siwa/callback";
        let body = json!({
            "input": {
                "nonce": challenge.nonce,
                "nonceId": challenge.nonce_id,
                "resources": challenge.resources,
                "statement": challenge.statement,
            },
            "output": {
                "address": proof.address,
                "signature": proof.signature,
                "nonce": challenge.nonce,
                "message": challenge.statement,
                "fullMessage": challenge.statement,
                "domain": proof.domain,
                "statement": challenge.statement,
                "email": "",
                "timestamp": proof.timestamp_ms,
            }
        });
        self.data(self.request(Method::POST, path).json(&body), path)
            .await
    }

    async fn probe_session(&self) -> Result<()> {
        let path = "/seasons/user/progress";
        self.call::<Value>(self.request(Method::GET, path), path)
            .await
            .map(|_| ())
    }

    async fn start_game(&self, game_id: &str) -> Result<Option<String>> {
        let path = format!("/games/{}/start", game_id);
        let env = self
            .call::<GameStart>(self.request(Method::GET, &path), &path)
            .await?;
        Ok(env.data.and_then(|d| d.session_id))
    }

    async fn submit_game(&self, proof: &GameProof) -> Result<u64> {
        let path = format!("/games/{}/submit", proof.game_id);
        let body = json!({
            "clientScore": 0,
            "gameDurationMs": proof.duration_ms,
            "proofOfWork": { "tapTimestamps": proof.taps },
            "gameSessionId": proof.session_id,
        });
        let result: GameResult = self
            .data(self.request(Method::POST, &path).json(&body), &path)
            .await?;
        Ok(result.points)
    }

    async fn quest_completed(&self, quest: &str) -> Result<bool> {
        let path = format!("/quests/{}/completed", quest);
        let env = self
            .call::<Value>(self.request(Method::GET, &path), &path)
            .await?;
        Ok(env.data.as_ref().and_then(Value::as_bool).unwrap_or(false))
    }

    async fn claim_verification_reward(&self) -> Result<()> {
        let path = "/user/airdrop/claim-verification-reward";
        self.call::<Value>(self.request(Method::POST, path).json(&json!({})), path)
            .await
            .map(|_| ())
    }

    async fn lottery_free_entry(&self, address: &str) -> Result<LotteryEntry> {
        let path = format!("/lottery/free-entry/{}", address);
        let env = self
            .call::<LotteryData>(self.request(Method::POST, &path).json(&json!({})), &path)
            .await?;
        Ok(LotteryEntry {
            success: env.success.unwrap_or(false),
            signature: env.data.unwrap_or_default().signature,
        })
    }

    async fn total_points(&self) -> Result<u64> {
        let path = "/user";
        let profile: UserProfile = self.data(self.request(Method::GET, path), path).await?;
        Ok(profile
            .user_season_points
            .first()
            .map(|p| p.total_points)
            .unwrap_or(0))
    }

    async fn seasons(&self) -> Result<Vec<Season>> {
        let path = "/seasons/all";
        self.data(self.request(Method::GET, path), path).await
    }

    async fn request_mint(&self, address: &str) -> Result<MintAuthorization> {
        let path = "/seasons/token/mint";
        let body = json!({ "blockchainAddress": address });
        self.data(self.request(Method::POST, path).json(&body), path)
            .await
    }

    async fn confirm_mint(&self, minting_id: &str, tx_hash: &str) -> Result<()> {
        let path = format!("/seasons/mintings/{}/confirm", minting_id);
        let body = json!({ "transactionHash": tx_hash });
        self.call::<Value>(self.request(Method::POST, &path).json(&body), &path)
            .await
            .map(|_| ())
    }
}

/// Pulls `message` out of an error body. Some endpoints send a list of messages.
fn rejection_message(body: &str, reason: Option<&str>) -> String {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    let from_json = parsed.as_ref().and_then(|v| match v.get("message") {
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Array(items)) => Some(
            items
                .iter()
                .filter_map(Value::as_str)
                .collect::<Vec<_>>()
                .join(", "),
        ),
        _ => None,
    });

    match from_json {
        Some(msg) if !msg.is_empty() => msg,
        _ if !body.trim().is_empty() => body.trim().to_string(),
        _ => reason.unwrap_or("request rejected").to_string(),
    }
}

fn value_to_string(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}

fn de_string<'de, D: Deserializer<'de>>(de: D) -> Result<String, D::Error> {
    value_to_string(Value::deserialize(de)?)
        .ok_or_else(|| serde::de::Error::custom("expected string or number"))
}

fn de_opt_string<'de, D: Deserializer<'de>>(de: D) -> Result<Option<String>, D::Error> {
    Ok(value_to_string(Value::deserialize(de)?))
}

/// Point balances arrive as integers, floats or numeric strings.
fn de_points<'de, D: Deserializer<'de>>(de: D) -> Result<u64, D::Error> {
    match Value::deserialize(de)? {
        Value::Null => Ok(0),
        Value::Number(n) => Ok(n
            .as_u64()
            .or_else(|| n.as_f64().map(|f| f.max(0.0) as u64))
            .unwrap_or(0)),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map(|f| f.max(0.0) as u64)
            .map_err(serde::de::Error::custom),
        other => Err(serde::de::Error::custom(format!("unexpected points value {}", other))),
    }
}

/// Accepts JSON numbers, decimal strings and `0x` hex strings.
fn de_u256<'de, D: Deserializer<'de>>(de: D) -> Result<U256, D::Error> {
    match Value::deserialize(de)? {
        Value::Null => Ok(U256::zero()),
        Value::Number(n) => n
            .as_u64()
            .map(U256::from)
            .ok_or_else(|| serde::de::Error::custom(format!("not an unsigned integer: {}", n))),
        Value::String(s) => {
            let s = s.trim();
            let parsed = match s.strip_prefix("0x") {
                Some(hex) => U256::from_str_radix(hex, 16).map_err(|e| format!("{:?}", e)),
                None => U256::from_dec_str(s).map_err(|e| format!("{:?}", e)),
            };
            parsed.map_err(|e| serde::de::Error::custom(format!("bad integer {}: {}", s, e)))
        }
        other => Err(serde::de::Error::custom(format!("unexpected integer value {}", other))),
    }
}
