//! Append-only record of per-work-order outcomes, one JSON object per line.

use std::collections::HashSet;
use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::migrate::outcome::OutcomeKind;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub timestamp: String,
    pub ticket_id: i64,
    pub outcome: OutcomeKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issue_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

pub fn new_entry(
    ticket_id: i64,
    outcome: OutcomeKind,
    issue_key: Option<&str>,
    message: Option<&str>,
) -> LedgerEntry {
    LedgerEntry {
        timestamp: chrono::Utc::now().to_rfc3339(),
        ticket_id,
        outcome,
        issue_key: issue_key.map(String::from),
        message: message.map(String::from),
    }
}

pub fn append_entry(path: &Path, entry: &LedgerEntry) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    let line = serde_json::to_string(entry).map_err(std::io::Error::other)?;
    writeln!(file, "{line}")?;
    Ok(())
}

/// All readable entries; malformed lines are skipped.
pub fn read_entries(path: &Path) -> Vec<LedgerEntry> {
    let contents = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(_) => return Vec::new(),
    };

    contents
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| serde_json::from_str(line).ok())
        .collect()
}

/// Work orders that already have a Jira issue according to the ledger.
pub fn created_ids(entries: &[LedgerEntry]) -> HashSet<i64> {
    entries
        .iter()
        .filter(|e| e.outcome.created_issue())
        .map(|e| e.ticket_id)
        .collect()
}

/// Jira key the ledger recorded for a work order, newest first.
pub fn issue_key_for(entries: &[LedgerEntry], ticket_id: i64) -> Option<&str> {
    entries
        .iter()
        .rev()
        .filter(|e| e.ticket_id == ticket_id)
        .find_map(|e| e.issue_key.as_deref())
}
