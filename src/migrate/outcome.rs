use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::MigrationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    /// Issue created and work order closed.
    Migrated,
    /// Issue already existed; work order closed this run.
    Reconciled,
    /// Issue exists but the work order is still open.
    PartialFailure,
    /// Nothing created.
    Failed,
}

impl OutcomeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutcomeKind::Migrated => "migrated",
            OutcomeKind::Reconciled => "reconciled",
            OutcomeKind::PartialFailure => "partial_failure",
            OutcomeKind::Failed => "failed",
        }
    }

    /// Whether a Jira issue exists for the work order after this outcome.
    pub fn created_issue(&self) -> bool {
        !matches!(self, OutcomeKind::Failed)
    }
}

impl fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What happened to one work order during a run.
#[derive(Debug)]
pub struct Outcome {
    pub ticket_id: i64,
    pub kind: OutcomeKind,
    pub issue_key: Option<String>,
    pub error: Option<MigrationError>,
}

impl Outcome {
    pub fn migrated(ticket_id: i64, issue_key: String) -> Self {
        Self {
            ticket_id,
            kind: OutcomeKind::Migrated,
            issue_key: Some(issue_key),
            error: None,
        }
    }

    pub fn reconciled(ticket_id: i64, issue_key: String) -> Self {
        Self {
            ticket_id,
            kind: OutcomeKind::Reconciled,
            issue_key: Some(issue_key),
            error: None,
        }
    }

    pub fn partial(ticket_id: i64, issue_key: String, close_error: MigrationError) -> Self {
        let error = MigrationError::partial(ticket_id, issue_key.clone(), close_error);
        Self {
            ticket_id,
            kind: OutcomeKind::PartialFailure,
            issue_key: Some(issue_key),
            error: Some(error),
        }
    }

    pub fn failed(ticket_id: i64, error: MigrationError) -> Self {
        Self {
            ticket_id,
            kind: OutcomeKind::Failed,
            issue_key: None,
            error: Some(error),
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub fetched: usize,
    pub unmappable: usize,
    pub already_in_jira: usize,
    pub migrated: usize,
    pub reconciled: usize,
    pub partial_failures: usize,
    pub failed: usize,
    pub due_dates_set: usize,
}

impl RunSummary {
    pub fn add(&mut self, outcome: &Outcome) {
        match outcome.kind {
            OutcomeKind::Migrated => self.migrated += 1,
            OutcomeKind::Reconciled => self.reconciled += 1,
            OutcomeKind::PartialFailure => self.partial_failures += 1,
            OutcomeKind::Failed => self.failed += 1,
        }
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "  Work orders fetched: {}", self.fetched)?;
        writeln!(f, "  Migrated: {}", self.migrated)?;
        writeln!(f, "  Already in Jira: {}", self.already_in_jira)?;
        writeln!(f, "  Reconciled: {}", self.reconciled)?;
        writeln!(f, "  Partial failures: {}", self.partial_failures)?;
        writeln!(f, "  Failed: {}", self.failed)?;
        writeln!(f, "  Unmappable rows: {}", self.unmappable)?;
        write!(f, "  Due dates set: {}", self.due_dates_set)
    }
}
