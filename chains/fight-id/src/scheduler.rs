//! Daily cycle: every account in turn, a report table, then a countdown to
//! the next scheduled start.

use crate::pacing::PacingPolicy;
use crate::pipeline::{Account, AccountPipeline};
use crate::report::{render_table, AccountReport};
use anyhow::{Context, Result};
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use chrono_tz::Tz;
use colored::Colorize;
use core_logic::Sleeper;
use std::io::{self, Write};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

/// Next occurrence of `hour:minute` in `now`'s zone, strictly after `now`.
pub fn next_run<Z: TimeZone>(now: &DateTime<Z>, hour: u32, minute: u32) -> DateTime<Z> {
    let tz = now.timezone();
    let today = now.date_naive();

    for offset in 0..3 {
        let candidate = (today + ChronoDuration::days(offset))
            .and_hms_opt(hour, minute, 0)
            .and_then(|naive| tz.from_local_datetime(&naive).earliest());
        if let Some(target) = candidate {
            if target > *now {
                return target;
            }
        }
    }
    now.clone() + ChronoDuration::days(1)
}

/// `HHh MMm SSs`, rounded down to whole seconds.
pub fn format_remaining(remaining: Duration) -> String {
    let total = remaining.as_secs();
    format!(
        "{:02}h {:02}m {:02}s",
        total / 3600,
        (total % 3600) / 60,
        total % 60
    )
}

pub struct CycleScheduler {
    pipeline: AccountPipeline,
    accounts: Vec<Account>,
    time_zone: Tz,
    hour: u32,
    minute: u32,
    pacing: PacingPolicy,
    sleeper: Arc<dyn Sleeper>,
}

impl CycleScheduler {
    pub fn new(
        pipeline: AccountPipeline,
        accounts: Vec<Account>,
        time_zone: Tz,
        (hour, minute): (u32, u32),
        pacing: PacingPolicy,
        sleeper: Arc<dyn Sleeper>,
    ) -> Self {
        Self {
            pipeline,
            accounts,
            time_zone,
            hour,
            minute,
            pacing,
            sleeper,
        }
    }

    /// Runs every account strictly one after another.
    pub async fn run_cycle(&self) -> Vec<AccountReport> {
        let mut reports = Vec::with_capacity(self.accounts.len());
        for account in &self.accounts {
            reports.push(self.pipeline.run(account).await);
            self.pacing
                .pause(self.sleeper.as_ref(), |p| p.between_accounts)
                .await;
        }

        let failures = reports
            .iter()
            .flat_map(|r| r.status.iter())
            .filter(|(_, code)| code.is_failure())
            .count();
        info!(
            "Cycle finished: {} accounts, {} failed steps",
            reports.len(),
            failures
        );
        reports
    }

    pub fn write_report(out: &mut dyn Write, reports: &[AccountReport]) -> io::Result<()> {
        let bar = "═".repeat(60);
        writeln!(out, "\n{}", bar)?;
        writeln!(out, "{}", "📋 SESSION REPORT".bold().yellow())?;
        writeln!(out, "{}", render_table(reports))?;
        writeln!(out, "{}\n", bar)?;
        out.flush()
    }

    /// One cycle plus its report. Returns the start time of the next cycle.
    pub async fn run_once(&self, out: &mut dyn Write) -> Result<DateTime<Tz>> {
        let reports = self.run_cycle().await;
        Self::write_report(out, &reports).context("Failed to write session report")?;
        Ok(self.next_run_after(Utc::now()))
    }

    pub fn next_run_after(&self, now: DateTime<Utc>) -> DateTime<Tz> {
        next_run(&now.with_timezone(&self.time_zone), self.hour, self.minute)
    }

    /// Repaints the remaining time on stderr once per second until `target`.
    pub async fn countdown(&self, target: DateTime<Tz>) {
        info!(
            "⏰ Next cycle: {}",
            target.format("%Y-%m-%d %H:%M:%S %Z")
        );
        loop {
            let remaining = match (target.with_timezone(&Utc) - Utc::now()).to_std() {
                Ok(d) if !d.is_zero() => d,
                _ => break,
            };
            eprint!(
                "\r{}",
                format!("⏳ Countdown: {}...", format_remaining(remaining)).yellow()
            );
            let _ = std::io::stderr().flush();
            self.sleeper
                .sleep(remaining.min(Duration::from_secs(1)))
                .await;
        }
        eprintln!();
        info!("{}", "🚀 Starting new cycle...".green());
    }

    /// Cycles forever. A failing cycle is logged and retried after a short pause.
    pub async fn run_forever(&self) {
        loop {
            match self.run_once(&mut io::stdout()).await {
                Ok(target) => self.countdown(target).await,
                Err(e) => {
                    error!("❌ Cycle error: {:#}", e);
                    self.pacing
                        .pause(self.sleeper.as_ref(), |p| p.cycle_error_backoff)
                        .await;
                }
            }
        }
    }
}
