//! Per-account status log and the end-of-cycle table.

use colored::Colorize;
use std::fmt;

/// Short result code written by a task under a human-readable label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusCode {
    Ok,
    Fail,
    Done,
    Claimed,
    Points(u64),
    AlreadyEntered,
    /// Lottery entry transaction, holds the full hash.
    Entered(String),
    NoSignature,
    TxFail,
    /// Remote refused with a message that matched no known conflict.
    Rejected(String),
    Balance { unclaimed: u64, minted: u64 },
    /// Balance could not be read.
    Unavailable,
    Progress { current: u64, threshold: u64 },
    Minted(String),
    MintFail,
    Error,
    Crash(String),
    InvalidKey,
    Ip(String),
}

impl StatusCode {
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            StatusCode::Fail
                | StatusCode::NoSignature
                | StatusCode::TxFail
                | StatusCode::Rejected(_)
                | StatusCode::MintFail
                | StatusCode::Unavailable
                | StatusCode::Error
                | StatusCode::Crash(_)
                | StatusCode::InvalidKey
        )
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusCode::Ok => write!(f, "✅ OK"),
            StatusCode::Fail => write!(f, "❌ FAIL"),
            StatusCode::Done => write!(f, "✅ DONE"),
            StatusCode::Claimed => write!(f, "✅ CLAIMED"),
            StatusCode::Points(p) => write!(f, "✅ +{} FP", p),
            StatusCode::AlreadyEntered => write!(f, "✅ ALREADY ENTERED"),
            StatusCode::Entered(hash) => {
                let short: String = hash.chars().take(10).collect();
                write!(f, "✅ ENTERED (Tx: {}...)", short)
            }
            StatusCode::NoSignature => write!(f, "❌ NO SIGNATURE"),
            StatusCode::TxFail => write!(f, "❌ TX FAIL"),
            StatusCode::Rejected(msg) => write!(f, "❌ {}", msg),
            StatusCode::Balance { unclaimed, minted } => {
                write!(f, "Unclaimed: {} | Minted: {}", unclaimed, minted)
            }
            StatusCode::Unavailable => write!(f, "❌ ERR"),
            StatusCode::Progress { current, threshold } => {
                write!(f, "⏳ {}/{}", current, threshold)
            }
            StatusCode::Minted(amount) => write!(f, "✅ MINTED {}", amount),
            StatusCode::MintFail => write!(f, "❌ MINT FAIL"),
            StatusCode::Error => write!(f, "❌ ERROR"),
            StatusCode::Crash(msg) => write!(f, "💥 CRASH: {}", msg),
            StatusCode::InvalidKey => write!(f, "INVALID KEY"),
            StatusCode::Ip(ip) => write!(f, "{}", ip),
        }
    }
}

/// Insertion-ordered label -> status mapping for one account run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusLog {
    entries: Vec<(String, StatusCode)>,
}

impl StatusLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `label`, replacing an earlier value in place.
    pub fn record(&mut self, label: impl Into<String>, code: StatusCode) {
        let label = label.into();
        match self.entries.iter_mut().find(|(l, _)| *l == label) {
            Some(entry) => entry.1 = code,
            None => self.entries.push((label, code)),
        }
    }

    pub fn get(&self, label: &str) -> Option<&StatusCode> {
        self.entries
            .iter()
            .find(|(l, _)| l == label)
            .map(|(_, code)| code)
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(l, _)| l.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &StatusCode)> {
        self.entries.iter().map(|(l, c)| (l.as_str(), c))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct AccountReport {
    pub account: String,
    pub status: StatusLog,
}

/// Renders one row per account; columns are every label any account wrote,
/// in first-seen order.
pub fn render_table(reports: &[AccountReport]) -> String {
    let mut columns: Vec<&str> = Vec::new();
    for report in reports {
        for label in report.status.labels() {
            if !columns.contains(&label) {
                columns.push(label);
            }
        }
    }

    let rows: Vec<Vec<String>> = reports
        .iter()
        .map(|r| {
            std::iter::once(r.account.clone())
                .chain(columns.iter().map(|c| {
                    r.status.get(c).map(|s| s.to_string()).unwrap_or_default()
                }))
                .collect()
        })
        .collect();

    let header: Vec<String> = std::iter::once("Account".to_string())
        .chain(columns.iter().map(|c| c.to_string()))
        .collect();

    let widths: Vec<usize> = (0..header.len())
        .map(|i| {
            rows.iter()
                .map(|row| row[i].chars().count())
                .chain(std::iter::once(header[i].chars().count()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    let line = |cells: &[String]| -> String {
        let padded: Vec<String> = cells
            .iter()
            .zip(&widths)
            .map(|(cell, w)| format!("{}{}", cell, " ".repeat(w - cell.chars().count())))
            .collect();
        format!("│ {} │", padded.join(" │ "))
    };
    let rule = |left: &str, mid: &str, right: &str| -> String {
        let segments: Vec<String> = widths.iter().map(|w| "─".repeat(w + 2)).collect();
        format!("{}{}{}", left, segments.join(mid), right)
    };

    let mut out = Vec::with_capacity(rows.len() + 4);
    out.push(rule("┌", "┬", "┐"));
    out.push(line(&header[..]).bold().to_string());
    out.push(rule("├", "┼", "┤"));
    out.extend(rows.iter().map(|row| line(row.as_slice())));
    out.push(rule("└", "┴", "┘"));
    out.join("\n")
}
