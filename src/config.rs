use std::collections::HashMap;
use std::path::{Path, PathBuf};

use base64::Engine;
use chrono::NaiveDate;
use serde::Deserialize;

use crate::error::ConfigError;

/// One migration run's configuration, read from a JSON file.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_cnf: DatabaseConfig,
    /// Raw SELECT that replaces the query built from `query`.
    #[serde(default)]
    pub sql: Option<String>,
    #[serde(default)]
    pub query: QueryFilter,

    pub jira_server_address: String,
    /// Full `Authorization` header value, e.g. `Basic dXNlcjpwYXNz`.
    #[serde(default)]
    pub jira_authorization: Option<String>,
    #[serde(default)]
    pub jira_username: Option<String>,
    #[serde(default)]
    pub jira_api_token: Option<String>,
    pub jira_fields: JiraFields,
    #[serde(default)]
    pub field_mapping: FieldMapping,
    #[serde(default)]
    pub assignee_aliases: HashMap<String, String>,
    #[serde(default = "default_reporter")]
    pub reporter: String,

    #[serde(rename = "ticket_duetime_mapping_days", default = "default_due_mapping")]
    pub due_days: HashMap<String, u32>,
    #[serde(default = "default_due_days")]
    pub default_due_days: u32,

    #[serde(default)]
    pub close_source: CloseSource,
    #[serde(rename = "trackIT_server_address", default)]
    pub trackit_server_address: Option<String>,
    #[serde(default)]
    pub trackit_api_username: Option<String>,
    #[serde(default)]
    pub attachment_folder: Option<PathBuf>,

    #[serde(default = "default_log_file")]
    pub log_file: PathBuf,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub traceback_file: Option<PathBuf>,
    #[serde(default)]
    pub ledger_file: Option<PathBuf>,

    #[serde(default = "default_true")]
    pub skip_existing: bool,
    #[serde(default = "default_true")]
    pub backfill_due_dates: bool,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub host: String,
    #[serde(default = "default_mssql_port")]
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    #[serde(default)]
    pub encrypt: bool,
    #[serde(default = "default_true")]
    pub trust_server_cert: bool,
}

/// Filter used to build the work order SELECT when no raw `sql` is given.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QueryFilter {
    pub table: String,
    /// Only work orders requested on or after this date.
    pub created_after: Option<NaiveDate>,
    /// Priorities ("labels") to include; empty means all.
    pub labels: Vec<String>,
    /// Assigned technicians to include; empty means all.
    pub technicians: Vec<String>,
    pub status_id: i32,
}

impl Default for QueryFilter {
    fn default() -> Self {
        Self {
            table: "TRACKIT_DATA.dbo.tasks".into(),
            created_after: None,
            labels: Vec::new(),
            technicians: Vec::new(),
            status_id: 1,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct JiraFields {
    pub project: ProjectRef,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProjectRef {
    pub key: String,
}

/// Jira field ids the TrackIT columns land in.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct FieldMapping {
    pub trackit_id: String,
    pub request_date: String,
    pub requester: String,
    pub department: String,
    pub labels: String,
    pub company: String,
    pub work_order_type: String,
    pub work_order_type_option_id: Option<String>,
}

impl Default for FieldMapping {
    fn default() -> Self {
        Self {
            trackit_id: "customfield_10411".into(),
            request_date: "customfield_10420".into(),
            requester: "customfield_11000".into(),
            department: "customfield_11701".into(),
            labels: "customfield_11900".into(),
            company: "customfield_11800".into(),
            work_order_type: "customfield_10300".into(),
            work_order_type_option_id: Some("10302".into()),
        }
    }
}

/// How a migrated work order gets closed in TrackIT.
#[derive(Debug, Clone, Deserialize, PartialEq, Default)]
#[serde(tag = "method", rename_all = "lowercase")]
pub enum CloseSource {
    /// TrackIT web API: add a note, then close.
    #[default]
    Api,
    /// UPDATE run on the source connection; `@P1` is the work order id,
    /// `@P2` the Jira link.
    Sql { statement: String },
    /// Leave the work order open.
    #[serde(rename = "none")]
    Skip,
}

fn default_reporter() -> String {
    "api".into()
}

fn default_due_mapping() -> HashMap<String, u32> {
    [("Critical", 1), ("Urgent", 1), ("High", 3), ("Routine", 10)]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}

fn default_due_days() -> u32 {
    5
}

fn default_log_file() -> PathBuf {
    PathBuf::from("migration.log")
}

fn default_log_level() -> String {
    "info".into()
}

fn default_true() -> bool {
    true
}

fn default_concurrency() -> usize {
    1
}

fn default_mssql_port() -> u16 {
    1433
}

pub fn data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".trackit-jira")
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&contents, path)
    }

    pub fn from_json(json: &str, path: &Path) -> Result<Self, ConfigError> {
        let config: Config = serde_json::from_str(json).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.project_key().trim().is_empty() {
            return Err(ConfigError::Invalid("jira_fields.project.key is empty".into()));
        }
        if self.jira_server_address.trim().is_empty() {
            return Err(ConfigError::Invalid("jira_server_address is empty".into()));
        }
        if self.jira_auth_header().is_none() {
            return Err(ConfigError::Invalid(
                "set jira_authorization or both jira_username and jira_api_token".into(),
            ));
        }
        if self.concurrency == 0 {
            return Err(ConfigError::Invalid("concurrency must be at least 1".into()));
        }
        match &self.close_source {
            CloseSource::Api => {
                if self.trackit_server_address.is_none() || self.trackit_api_username.is_none() {
                    return Err(ConfigError::Invalid(
                        "close_source api needs trackIT_server_address and trackit_api_username"
                            .into(),
                    ));
                }
            }
            CloseSource::Sql { statement } if statement.trim().is_empty() => {
                return Err(ConfigError::Invalid(
                    "close_source sql needs a statement".into(),
                ));
            }
            _ => {}
        }
        Ok(())
    }

    pub fn project_key(&self) -> &str {
        &self.jira_fields.project.key
    }

    /// Jira base URL without a trailing slash. A bare host gets `http://`.
    pub fn jira_base_url(&self) -> String {
        base_url(&self.jira_server_address)
    }

    pub fn trackit_base_url(&self) -> Option<String> {
        self.trackit_server_address.as_deref().map(base_url)
    }

    pub fn jira_auth_header(&self) -> Option<String> {
        if let Some(raw) = self.jira_authorization.as_ref().filter(|a| !a.trim().is_empty()) {
            return Some(raw.clone());
        }
        match (&self.jira_username, &self.jira_api_token) {
            (Some(user), Some(token)) => {
                let creds = format!("{user}:{token}");
                let encoded = base64::engine::general_purpose::STANDARD.encode(creds);
                Some(format!("Basic {encoded}"))
            }
            _ => None,
        }
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.ledger_file.clone().unwrap_or_else(|| {
            data_dir().join(format!("ledger-{}.jsonl", self.project_key().to_lowercase()))
        })
    }

    /// Business days allowed for a priority, falling back to `default_due_days`.
    pub fn due_days_for(&self, priority: &str) -> u32 {
        self.due_days
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(priority))
            .map(|(_, v)| *v)
            .unwrap_or(self.default_due_days)
    }
}

fn base_url(address: &str) -> String {
    let trimmed = address.trim().trim_end_matches('/');
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("http://{trimmed}")
    }
}

#[cfg(test)]
pub(crate) fn test_config() -> Config {
    let json = r#"{
        "database_cnf": {"host": "db", "user": "sa", "password": "pw", "database": "TRACKIT_DATA"},
        "jira_server_address": "jira.example.org",
        "jira_authorization": "Basic YXBpOlBhc3N3b3Jk",
        "jira_fields": {"project": {"key": "SRQ"}},
        "close_source": {"method": "none"},
        "assignee_aliases": {"Maxim Tam": "mtam"}
    }"#;
    Config::from_json(json, Path::new("test.json")).unwrap()
}
