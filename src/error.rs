//! Error taxonomy for a migration run.

use std::path::PathBuf;

use thiserror::Error;

/// Problems with the JSON config file. Always fatal.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config from {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid config: {0}")]
    Invalid(String),
}

#[derive(Error, Debug)]
pub enum MigrationError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// TrackIT database unreachable (TCP connect or TDS login).
    #[error("Cannot reach TrackIT database {target}: {message}")]
    Connectivity { target: String, message: String },

    /// Query against the TrackIT database failed
    #[error("TrackIT query failed: {0}")]
    Source(#[from] tiberius::error::Error),

    /// A source row could not be turned into an issue
    #[error("Work order {ticket} cannot be mapped: {message}")]
    Mapping { ticket: String, message: String },

    /// Jira or TrackIT web API call failed
    #[error("{context}: {message}")]
    Api { context: String, message: String },

    /// Jira issue exists but the source work order is still open.
    #[error("Work order {ticket_id} migrated to {issue_key} but not closed in TrackIT: {source}")]
    PartialFailure {
        ticket_id: i64,
        issue_key: String,
        #[source]
        source: Box<MigrationError>,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl MigrationError {
    pub fn connectivity(target: impl Into<String>, message: impl ToString) -> Self {
        MigrationError::Connectivity {
            target: target.into(),
            message: message.to_string(),
        }
    }

    pub fn mapping(ticket: impl Into<String>, message: impl Into<String>) -> Self {
        MigrationError::Mapping {
            ticket: ticket.into(),
            message: message.into(),
        }
    }

    pub fn api(context: impl Into<String>, message: impl ToString) -> Self {
        MigrationError::Api {
            context: context.into(),
            message: message.to_string(),
        }
    }

    pub fn partial(ticket_id: i64, issue_key: impl Into<String>, source: MigrationError) -> Self {
        MigrationError::PartialFailure {
            ticket_id,
            issue_key: issue_key.into(),
            source: Box::new(source),
        }
    }

    /// Errors that abort the whole run rather than a single row.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            MigrationError::Config(_)
                | MigrationError::Connectivity { .. }
                | MigrationError::Source(_)
                | MigrationError::Io(_)
        )
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

pub type Result<T> = std::result::Result<T, MigrationError>;
