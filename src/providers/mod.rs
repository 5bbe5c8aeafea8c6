pub mod jira;
pub mod trackit;

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::config::{CloseSource, Config};
use crate::error::{ConfigError, Result};
use crate::model::issue::{CreatedIssue, Issue, UndatedIssue};
use crate::source::mssql::{MssqlSource, SqlCloser};

/// The destination tracker, scoped to one project.
#[async_trait]
pub trait IssueTracker: Send + Sync {
    fn name(&self) -> &str;
    fn browse_url(&self, issue_key: &str) -> String;
    async fn create_issue(&self, issue: &Issue) -> Result<CreatedIssue>;
    /// TrackIT ids already carried by issues in the project.
    async fn existing_trackit_ids(&self) -> Result<HashSet<i64>>;
    async fn find_by_trackit_id(&self, trackit_id: i64) -> Result<Option<String>>;
    async fn attach_file(&self, issue_key: &str, path: &Path) -> Result<()>;
    /// Incident issues in the project with an empty due date.
    async fn undated_issues(&self) -> Result<Vec<UndatedIssue>>;
    async fn set_due_date(&self, issue_key: &str, due_date: NaiveDate) -> Result<()>;
}

/// Marks a migrated work order closed on the TrackIT side.
#[async_trait]
pub trait SourceCloser: Send + Sync {
    fn name(&self) -> &str;
    async fn close(&self, workorder_id: i64, issue_url: &str) -> Result<()>;
}

/// Used when `close_source.method` is `none`.
pub struct NoopCloser;

#[async_trait]
impl SourceCloser for NoopCloser {
    fn name(&self) -> &str {
        "none"
    }

    async fn close(&self, _workorder_id: i64, _issue_url: &str) -> Result<()> {
        Ok(())
    }
}


pub fn create_tracker(config: &Config) -> Result<Box<dyn IssueTracker>> {
    Ok(Box::new(jira::JiraProvider::from_config(config)?))
}

pub fn create_closer(config: &Config, source: Arc<MssqlSource>) -> Result<Box<dyn SourceCloser>> {
    let closer: Box<dyn SourceCloser> = match &config.close_source {
        CloseSource::Api => {
            let (Some(base_url), Some(username)) =
                (config.trackit_base_url(), config.trackit_api_username.clone())
            else {
                return Err(ConfigError::Invalid(
                    "close_source api needs trackIT_server_address and trackit_api_username"
                        .into(),
                )
                .into());
            };
            Box::new(trackit::TrackitCloser::new(base_url, username))
        }
        CloseSource::Sql { statement } => Box::new(SqlCloser::new(source, statement.clone())),
        CloseSource::Skip => Box::new(NoopCloser),
    };
    Ok(closer)
}
