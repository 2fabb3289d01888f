use anyhow::Result;
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, TimeZone, Timelike, Utc};
use core_logic::{AccountKey, RecordingSleeper};
use ethers::signers::{LocalWallet, Signer};
use ethers::types::{Address, Bytes, H256, U256};
use ethers::utils::to_checksum;
use fight_id::client::{
    Challenge, ChallengeProof, GameProof, LotteryEntry, MintAuthorization, Season, Session,
};
use fight_id::{
    Account, AccountPipeline, AccountSession, ApiError, ChainGateway, CredentialRecord,
    CredentialStore, CycleScheduler, FightConfig, PacingPolicy, RemoteApi, SessionFactory,
    StatusCode,
};
use std::io::{self, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

const KEY: &str = "4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";

#[derive(Default)]
struct FakeApi {
    calls: Mutex<Vec<String>>,
    bearer: Mutex<Option<String>>,
    probe_ok: bool,
    challenge_fails: bool,
    callback_failures: usize,
    callbacks: AtomicUsize,
    submitted: Mutex<Vec<(Vec<i64>, i64)>>,
    game_error: Option<String>,
    quest_done: bool,
    lottery_error: Option<String>,
    lottery_signature: Option<String>,
    total: u64,
    seasons: Vec<Season>,
}

impl FakeApi {
    fn log(&self, call: impl Into<String>) {
        self.calls.lock().unwrap().push(call.into());
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn count(&self, prefix: &str) -> usize {
        self.calls().iter().filter(|c| c.starts_with(prefix)).count()
    }

    fn bearer(&self) -> Option<String> {
        self.bearer.lock().unwrap().clone()
    }
}

fn rejected(message: &str) -> anyhow::Error {
    ApiError::Rejected {
        status: 400,
        message: message.to_string(),
    }
    .into()
}

#[async_trait]
impl RemoteApi for FakeApi {
    fn set_bearer(&self, token: Option<String>) {
        *self.bearer.lock().unwrap() = token;
    }

    async fn get_challenge(&self) -> Result<Challenge> {
        self.log("challenge");
        if self.challenge_fails {
            return Err(anyhow::anyhow!("connection reset"));
        }
        Ok(Challenge {
            nonce: "n-1".to_string(),
            nonce_id: "nid-1".to_string(),
            statement: "Sign in to Fight.id".to_string(),
            resources: serde_json::Value::Null,
        })
    }

    async fn submit_challenge(&self, _challenge: &Challenge, proof: &ChallengeProof) -> Result<Session> {
        self.log(format!("callback:{}", proof.address));
        assert!(proof.signature.starts_with("0x"));
        if self.callbacks.fetch_add(1, Ordering::SeqCst) < self.callback_failures {
            return Err(rejected("Invalid nonce"));
        }
        Ok(Session {
            access_token: "fresh-token".to_string(),
            user_id: Some("u-1".to_string()),
            username: Some("fighter".to_string()),
        })
    }

    async fn probe_session(&self) -> Result<()> {
        self.log(format!("probe:{}", self.bearer().unwrap_or_default()));
        if self.probe_ok {
            Ok(())
        } else {
            Err(rejected("Unauthorized"))
        }
    }

    async fn start_game(&self, game_id: &str) -> Result<Option<String>> {
        self.log(format!("start:{}:{}", game_id, self.bearer().unwrap_or_default()));
        Ok(Some(format!("session-{}", game_id)))
    }

    async fn submit_game(&self, proof: &GameProof) -> Result<u64> {
        self.log(format!("submit:{}", proof.game_id));
        self.submitted
            .lock()
            .unwrap()
            .push((proof.taps.clone(), Utc::now().timestamp_millis()));
        assert!(proof.taps.windows(2).all(|w| w[0] <= w[1]));
        match &self.game_error {
            Some(msg) => Err(rejected(msg)),
            None => Ok(15),
        }
    }

    async fn quest_completed(&self, _quest: &str) -> Result<bool> {
        self.log("quest");
        Ok(self.quest_done)
    }

    async fn claim_verification_reward(&self) -> Result<()> {
        self.log("claim");
        Ok(())
    }

    async fn lottery_free_entry(&self, _address: &str) -> Result<LotteryEntry> {
        self.log("lottery");
        match &self.lottery_error {
            Some(msg) => Err(rejected(msg)),
            None => Ok(LotteryEntry {
                success: true,
                signature: self.lottery_signature.clone(),
            }),
        }
    }

    async fn total_points(&self) -> Result<u64> {
        Ok(self.total)
    }

    async fn seasons(&self) -> Result<Vec<Season>> {
        Ok(self.seasons.clone())
    }

    async fn request_mint(&self, _address: &str) -> Result<MintAuthorization> {
        self.log("mint-request");
        Ok(MintAuthorization {
            minting_id: "mint-7".to_string(),
            amount: U256::from(2500),
            nonce: U256::from(1),
            deadline: U256::from(1_900_000_000u64),
            signature: "0x1234".to_string(),
        })
    }

    async fn confirm_mint(&self, minting_id: &str, tx_hash: &str) -> Result<()> {
        self.log(format!("confirm:{}:{}", minting_id, tx_hash));
        Ok(())
    }
}

#[derive(Default)]
struct FakeChain {
    sent: Mutex<Vec<(Address, Bytes)>>,
}

#[async_trait]
impl ChainGateway for FakeChain {
    async fn send_call(&self, to: Address, data: Bytes, _gas_limit: Option<u64>) -> Result<H256> {
        self.sent.lock().unwrap().push((to, data));
        Ok(H256::repeat_byte(0xab))
    }

    async fn send_and_confirm(&self, to: Address, data: Bytes) -> Result<H256> {
        self.sent.lock().unwrap().push((to, data));
        Ok(H256::repeat_byte(0xcd))
    }
}

struct FakeSessions {
    api: Arc<FakeApi>,
    chain: Arc<FakeChain>,
    fail: bool,
}

#[async_trait]
impl SessionFactory for FakeSessions {
    async fn open(&self, _account: &Account, _wallet: &LocalWallet) -> Result<AccountSession> {
        if self.fail {
            anyhow::bail!("proxy unreachable");
        }
        Ok(AccountSession {
            api: self.api.clone(),
            chain: self.chain.clone(),
            ip: "203.0.113.7".to_string(),
        })
    }
}

struct Harness {
    _dir: tempfile::TempDir,
    store: CredentialStore,
    api: Arc<FakeApi>,
    chain: Arc<FakeChain>,
    sleeper: Arc<RecordingSleeper>,
    pipeline: AccountPipeline,
}

fn harness(api: FakeApi) -> Harness {
    harness_with(api, false)
}

fn harness_with(api: FakeApi, fail_sessions: bool) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let store = CredentialStore::new(dir.path().join("tokens.json"));
    let api = Arc::new(api);
    let chain = Arc::new(FakeChain::default());
    let sleeper = Arc::new(RecordingSleeper::new());

    let pipeline = AccountPipeline::new(
        Arc::new(FightConfig::default()),
        store.clone(),
        Arc::new(FakeSessions {
            api: api.clone(),
            chain: chain.clone(),
            fail: fail_sessions,
        }),
        PacingPolicy::Disabled,
        sleeper.clone(),
    );

    Harness {
        _dir: dir,
        store,
        api,
        chain,
        sleeper,
        pipeline,
    }
}

fn account() -> Account {
    Account {
        index: 1,
        key: AccountKey::new(KEY),
        proxy: None,
    }
}

fn address() -> String {
    to_checksum(&account().wallet(56).unwrap().address(), None)
}

fn active_season(migratable: u64) -> Season {
    Season {
        is_active: true,
        migratable_points: migratable,
        token_id: U256::from(1),
    }
}

#[tokio::test]
async fn fresh_account_signs_in_and_persists_token() {
    let h = harness(FakeApi::default());
    let before = Utc::now();

    let report = h.pipeline.run(&account()).await;

    assert_eq!(report.status.get("IP"), Some(&StatusCode::Ip("203.0.113.7".into())));
    assert_eq!(report.status.get("login"), Some(&StatusCode::Ok));
    assert_eq!(h.api.count("challenge"), 1);
    assert_eq!(h.api.count("probe"), 0);

    let saved = h.store.get(&address()).expect("token saved");
    assert_eq!(saved.token, "fresh-token");
    assert_eq!(saved.username.as_deref(), Some("fighter"));
    assert!(saved.date >= before && saved.date <= Utc::now());

    assert_eq!(report.status.get("Punching Bag"), Some(&StatusCode::Points(15)));
    assert_eq!(report.status.get("Ear Bag"), Some(&StatusCode::Points(15)));
    assert!(report.status.get("airdrop").is_some());
    assert!(report.status.get("usdt").is_some());
    assert!(report.status.get("mint").is_some());
}

#[tokio::test]
async fn recent_token_is_reused_after_probe() {
    let h = harness(FakeApi {
        probe_ok: true,
        ..FakeApi::default()
    });
    h.store
        .save(
            &address(),
            CredentialRecord {
                token: "cached-token".to_string(),
                user_id: None,
                username: None,
                date: Utc::now() - ChronoDuration::days(1),
            },
        )
        .unwrap();

    let report = h.pipeline.run(&account()).await;

    assert_eq!(report.status.get("login"), Some(&StatusCode::Ok));
    assert_eq!(h.api.count("challenge"), 0);
    assert_eq!(h.api.calls().iter().filter(|c| *c == "probe:cached-token").count(), 1);
    assert!(h.api.calls().iter().any(|c| c.starts_with("start:") && c.ends_with(":cached-token")));
    assert_eq!(h.store.get(&address()).unwrap().token, "cached-token");
}

#[tokio::test]
async fn stale_token_is_never_probed() {
    let h = harness(FakeApi {
        probe_ok: true,
        ..FakeApi::default()
    });
    h.store
        .save(
            &address(),
            CredentialRecord {
                token: "old-token".to_string(),
                user_id: None,
                username: None,
                date: Utc::now() - ChronoDuration::days(5),
            },
        )
        .unwrap();

    h.pipeline.run(&account()).await;

    assert_eq!(h.api.count("probe"), 0);
    assert_eq!(h.api.count("challenge"), 1);
    assert_eq!(h.store.get(&address()).unwrap().token, "fresh-token");
}

#[tokio::test]
async fn rejected_probe_falls_through_to_sign_in() {
    let h = harness(FakeApi::default());
    h.store
        .save(
            &address(),
            CredentialRecord {
                token: "revoked".to_string(),
                user_id: None,
                username: None,
                date: Utc::now() - ChronoDuration::hours(2),
            },
        )
        .unwrap();

    let report = h.pipeline.run(&account()).await;

    assert_eq!(h.api.count("probe"), 1);
    assert_eq!(h.api.count("challenge"), 1);
    assert_eq!(report.status.get("login"), Some(&StatusCode::Ok));
    assert_eq!(h.api.bearer().as_deref(), Some("fresh-token"));
}

#[tokio::test]
async fn failed_login_skips_every_task() {
    let h = harness(FakeApi {
        challenge_fails: true,
        ..FakeApi::default()
    });

    let report = h.pipeline.run(&account()).await;

    assert_eq!(h.api.count("challenge"), 3);
    assert_eq!(report.status.len(), 2);
    assert_eq!(report.status.get("login"), Some(&StatusCode::Fail));
    assert_eq!(h.api.count("start:"), 0);
    assert_eq!(h.api.count("quest"), 0);
    assert!(h.store.get(&address()).is_none());
}

#[tokio::test]
async fn failed_callback_restarts_from_a_new_challenge() {
    let h = harness(FakeApi {
        callback_failures: 2,
        ..FakeApi::default()
    });

    let report = h.pipeline.run(&account()).await;

    assert_eq!(h.api.count("challenge"), 3);
    assert_eq!(h.api.count("callback:"), 3);
    let login_calls: Vec<String> = h
        .api
        .calls()
        .into_iter()
        .filter(|c| c == "challenge" || c.starts_with("callback:"))
        .collect();
    for pair in login_calls.chunks(2) {
        assert_eq!(pair[0], "challenge");
        assert!(pair[1].starts_with("callback:"));
    }
    assert_eq!(report.status.get("login"), Some(&StatusCode::Ok));
    assert_eq!(h.store.get(&address()).unwrap().token, "fresh-token");
}

#[tokio::test]
async fn game_waits_for_last_tap_and_grace_before_submit() {
    let h = harness(FakeApi::default());

    h.pipeline.run(&account()).await;

    // Pacing is disabled, so the only sleeps are the pre-submit waits.
    let submitted = h.api.submitted.lock().unwrap().clone();
    let sleeps = h.sleeper.calls();
    assert_eq!(submitted.len(), 2);
    assert_eq!(sleeps.len(), submitted.len());

    let grace = FightConfig::default().pacing.submit_grace_ms as i64;
    for ((taps, submitted_at), slept) in submitted.iter().zip(&sleeps) {
        let last_tap = *taps.last().unwrap();
        let required = (last_tap - submitted_at).max(0) + grace;
        assert!(
            slept.as_millis() as i64 >= required,
            "slept {:?}, needed {} ms",
            slept,
            required
        );
    }
}

#[tokio::test]
async fn cooldown_on_submit_counts_as_done() {
    let h = harness(FakeApi {
        game_error: Some("cooldown active".to_string()),
        ..FakeApi::default()
    });

    let report = h.pipeline.run(&account()).await;

    assert_eq!(report.status.get("Punching Bag"), Some(&StatusCode::Done));
    assert_eq!(report.status.get("Ear Bag"), Some(&StatusCode::Done));
}

#[tokio::test]
async fn unknown_game_error_is_recorded_and_run_continues() {
    let h = harness(FakeApi {
        game_error: Some("Internal server error".to_string()),
        ..FakeApi::default()
    });

    let report = h.pipeline.run(&account()).await;

    assert_eq!(report.status.get("Punching Bag"), Some(&StatusCode::Error));
    assert_eq!(h.api.count("submit:"), 2);
    assert!(report.status.get("mint").is_some());
}

#[tokio::test]
async fn eligible_balance_mints_authorized_amount() {
    let h = harness(FakeApi {
        total: 5000,
        seasons: vec![active_season(2500)],
        ..FakeApi::default()
    });

    let report = h.pipeline.run(&account()).await;

    assert_eq!(
        report.status.get("balance"),
        Some(&StatusCode::Balance {
            unclaimed: 2500,
            minted: 2500
        })
    );
    assert_eq!(report.status.get("mint"), Some(&StatusCode::Minted("2500".into())));

    let expected_hash = format!("{:?}", H256::repeat_byte(0xcd));
    assert!(h.api.calls().contains(&format!("confirm:mint-7:{}", expected_hash)));

    let sent = h.chain.sent.lock().unwrap();
    let mint_contract: Address = FightConfig::default().mint_contract.parse().unwrap();
    assert!(sent
        .iter()
        .any(|(to, data)| *to == mint_contract && data[..4] == [0x65, 0x48, 0xb7, 0xae]));
}

#[tokio::test]
async fn below_threshold_reports_progress_without_minting() {
    let h = harness(FakeApi {
        total: 1500,
        seasons: vec![active_season(1500)],
        ..FakeApi::default()
    });

    let report = h.pipeline.run(&account()).await;

    assert_eq!(
        report.status.get("mint"),
        Some(&StatusCode::Progress {
            current: 1500,
            threshold: 2000
        })
    );
    assert_eq!(h.api.count("mint-request"), 0);
}

#[tokio::test]
async fn completed_quest_is_not_claimed_again() {
    let h = harness(FakeApi {
        quest_done: true,
        ..FakeApi::default()
    });

    let report = h.pipeline.run(&account()).await;

    assert_eq!(report.status.get("airdrop"), Some(&StatusCode::Done));
    assert_eq!(h.api.count("claim"), 0);
}

#[tokio::test]
async fn lottery_outcomes() {
    let h = harness(FakeApi {
        lottery_error: Some("Daily entry limit reached".to_string()),
        ..FakeApi::default()
    });
    let report = h.pipeline.run(&account()).await;
    assert_eq!(report.status.get("usdt"), Some(&StatusCode::AlreadyEntered));

    let h = harness(FakeApi::default());
    let report = h.pipeline.run(&account()).await;
    assert_eq!(report.status.get("usdt"), Some(&StatusCode::NoSignature));

    let h = harness(FakeApi {
        lottery_signature: Some("0xbeef".to_string()),
        ..FakeApi::default()
    });
    let report = h.pipeline.run(&account()).await;
    let hash = format!("{:?}", H256::repeat_byte(0xab));
    assert_eq!(report.status.get("usdt"), Some(&StatusCode::Entered(hash)));
}

#[tokio::test]
async fn invalid_key_is_reported_not_fatal() {
    let h = harness(FakeApi::default());
    let bad = Account {
        index: 4,
        key: AccountKey::new("not-a-key"),
        proxy: None,
    };

    let report = h.pipeline.run(&bad).await;

    assert_eq!(report.account, "Account 4");
    assert_eq!(report.status.get("status"), Some(&StatusCode::InvalidKey));
    assert!(h.api.calls().is_empty());
}

#[tokio::test]
async fn session_failure_becomes_crash_status() {
    let h = harness_with(FakeApi::default(), true);

    let report = h.pipeline.run(&account()).await;

    assert!(matches!(report.status.get("status"), Some(StatusCode::Crash(_))));
    assert!(report.account.starts_with("Account 1 (0x"));
}

#[tokio::test]
async fn cycle_runs_every_account_in_order() {
    let h = harness(FakeApi {
        probe_ok: true,
        ..FakeApi::default()
    });
    let accounts = vec![
        account(),
        Account {
            index: 2,
            key: AccountKey::new("bad"),
            proxy: None,
        },
    ];
    let scheduler = CycleScheduler::new(
        h.pipeline,
        accounts,
        chrono_tz::Asia::Jakarta,
        (7, 30),
        PacingPolicy::Disabled,
        Arc::new(RecordingSleeper::new()),
    );

    let reports = scheduler.run_cycle().await;

    assert_eq!(reports.len(), 2);
    assert!(reports[0].account.starts_with("Account 1"));
    assert_eq!(reports[1].status.get("status"), Some(&StatusCode::InvalidKey));
}

struct BrokenPipe;

impl Write for BrokenPipe {
    fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
        Err(io::ErrorKind::BrokenPipe.into())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn single_account_scheduler(h: Harness) -> (CycleScheduler, tempfile::TempDir) {
    let scheduler = CycleScheduler::new(
        h.pipeline,
        vec![account()],
        chrono_tz::Asia::Jakarta,
        (7, 30),
        PacingPolicy::Disabled,
        Arc::new(RecordingSleeper::new()),
    );
    (scheduler, h._dir)
}

#[tokio::test]
async fn completed_cycle_writes_report_and_schedules_next() {
    let (scheduler, _dir) = single_account_scheduler(harness(FakeApi::default()));
    let mut out = Vec::new();

    let target = scheduler.run_once(&mut out).await.unwrap();

    let rendered = String::from_utf8(out).unwrap();
    assert!(rendered.contains("SESSION REPORT"));
    assert!(rendered.contains("Account 1"));
    assert!(target.with_timezone(&Utc) > Utc::now());
}

#[tokio::test]
async fn unwritable_report_is_a_cycle_error() {
    let (scheduler, _dir) = single_account_scheduler(harness(FakeApi::default()));

    let err = scheduler.run_once(&mut BrokenPipe).await.unwrap_err();

    assert!(format!("{:#}", err).contains("session report"));
}

#[test]
fn past_target_schedules_tomorrow() {
    let h = harness(FakeApi::default());
    let scheduler = CycleScheduler::new(
        h.pipeline,
        vec![],
        chrono_tz::Asia::Jakarta,
        (7, 30),
        PacingPolicy::Disabled,
        Arc::new(RecordingSleeper::new()),
    );

    // 02:00 UTC is 09:00 in Jakarta, past 07:30.
    let now = Utc.with_ymd_and_hms(2024, 3, 1, 2, 0, 0).unwrap();
    let next = scheduler.next_run_after(now);

    assert_eq!(next.date_naive(), chrono::NaiveDate::from_ymd_opt(2024, 3, 2).unwrap());
    assert_eq!((next.hour(), next.minute()), (7, 30));
}
