//! Fight ID - Daily account runner for the Fight.id app
//!
//! Logs each configured account in, plays the daily mini-games, claims the
//! verification reward, enters the free USDT draw, and mints migratable
//! points once they cross the threshold. Accounts run one at a time, once a
//! day, at a fixed local time.
//!
//! # Architecture
//!
//! - **[`CycleScheduler`]**: sequential pass over all accounts, report table,
//!   countdown to the next scheduled start
//! - **[`AccountPipeline`]**: session, login, shuffled tasks, balance and mint
//! - **Task System**: pluggable steps via the [`task::Task`] trait
//! - **[`RemoteApi`]** / **[`ChainGateway`]**: seams to the HTTP API and the chain
//! - **[`CredentialStore`]**: cached bearer tokens in `tokens.json`
//!
//! # Quick Start
//!
//! ```bash
//! # Run forever on the daily schedule
//! cargo run -p fight-id
//!
//! # Single pass, then exit
//! cargo run -p fight-id -- --once
//! ```
//!
//! # Configuration
//!
//! Settings come from `config.toml` with `FIGHT__*` environment overrides;
//! keys from `PRIVATE_KEYS` or `pv.txt`; optional proxies from `proxies.txt`
//! and `PROXY`.

pub mod chain;
pub mod classify;
pub mod client;
pub mod config;
pub mod credentials;
pub mod identity;
pub mod pacing;
pub mod pipeline;
pub mod report;
pub mod scheduler;
pub mod task;

pub use chain::{ChainGateway, EvmGateway};
pub use client::{ApiError, HttpRemote, RemoteApi};
pub use config::FightConfig;
pub use credentials::{CredentialRecord, CredentialStore};
pub use pacing::PacingPolicy;
pub use pipeline::{Account, AccountPipeline, AccountSession, HttpSessionFactory, SessionFactory};
pub use report::{AccountReport, StatusCode, StatusLog};
pub use scheduler::CycleScheduler;
