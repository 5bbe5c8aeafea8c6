use std::collections::HashSet;
use std::path::Path;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use super::IssueTracker;
use crate::config::{Config, FieldMapping};
use crate::error::{ConfigError, MigrationError, Result};
use crate::mapping::parse_date;
use crate::model::issue::{CreatedIssue, Issue, IssueType, UndatedIssue};

const PAGE_SIZE: usize = 500;

/// Jira Server REST v2 client for one project.
pub struct JiraProvider {
    base_url: String,
    auth_header: String,
    project_key: String,
    fields: FieldMapping,
    client: reqwest::Client,
}

impl JiraProvider {
    pub fn new(
        base_url: String,
        auth_header: String,
        project_key: String,
        fields: FieldMapping,
    ) -> Self {
        Self {
            base_url,
            auth_header,
            project_key,
            fields,
            client: reqwest::Client::new(),
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let auth_header = config
            .jira_auth_header()
            .ok_or_else(|| ConfigError::Invalid("no Jira credentials".into()))?;
        Ok(Self::new(
            config.jira_base_url(),
            auth_header,
            config.project_key().to_string(),
            config.field_mapping.clone(),
        ))
    }

    fn search_url(&self, jql: &str, fields: &str, start_at: usize) -> String {
        format!(
            "{}/rest/api/2/search?jql={}&fields={}&startAt={}&maxResults={}",
            self.base_url,
            urlencoding::encode(jql),
            fields,
            start_at,
            PAGE_SIZE
        )
    }

    fn project_jql(&self) -> String {
        format!("project = \"{}\"", self.project_key)
    }

    /// Every issue matching `jql`, following Jira's pagination.
    async fn search_all(&self, jql: &str, fields: &str) -> Result<Vec<SearchIssue>> {
        let mut issues = Vec::new();
        loop {
            let url = self.search_url(jql, fields, issues.len());
            let resp = self
                .client
                .get(&url)
                .header("Authorization", &self.auth_header)
                .header("Accept", "application/json")
                .send()
                .await
                .map_err(|e| MigrationError::api("Jira search request failed", e))?;
            let resp = check_status(resp, "Jira search").await?;
            let page: SearchPage = resp
                .json()
                .await
                .map_err(|e| MigrationError::api("Failed to parse Jira search response", e))?;

            let fetched = page.issues.len();
            issues.extend(page.issues);
            debug!(jql, fetched, total = page.total, "Jira search page");
            if fetched == 0 || issues.len() >= page.total {
                break;
            }
        }
        Ok(issues)
    }
}

#[derive(Deserialize)]
struct SearchPage {
    #[serde(default)]
    total: usize,
    #[serde(default)]
    issues: Vec<SearchIssue>,
}

#[derive(Deserialize)]
struct SearchIssue {
    key: String,
    #[serde(default)]
    fields: Value,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default, rename = "errorMessages")]
    error_messages: Vec<String>,
    #[serde(default)]
    errors: serde_json::Map<String, Value>,
}

/// Human-readable summary of a Jira error body.
fn jira_error_message(body: &str) -> String {
    if let Ok(parsed) = serde_json::from_str::<ErrorBody>(body) {
        let mut parts = parsed.error_messages;
        parts.extend(parsed.errors.iter().map(|(field, msg)| match msg.as_str() {
            Some(msg) => format!("{field}: {msg}"),
            None => format!("{field}: {msg}"),
        }));
        if !parts.is_empty() {
            return parts.join("; ");
        }
    }
    body.chars().take(300).collect()
}

async fn check_status(resp: reqwest::Response, context: &str) -> Result<reqwest::Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(MigrationError::api(
        context,
        format!("HTTP {status}: {}", jira_error_message(&body)),
    ))
}

/// Jira returns number custom fields as floats (`52204.0`).
fn trackit_id_of(fields: &Value, field_id: &str) -> Option<i64> {
    match fields.get(field_id)? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// JQL reference for a field id: `customfield_10411` becomes `cf[10411]`.
fn jql_field(field_id: &str) -> String {
    match field_id.strip_prefix("customfield_") {
        Some(num) => format!("cf[{num}]"),
        None => field_id.to_string(),
    }
}

fn undated_issue(issue: SearchIssue) -> Option<UndatedIssue> {
    let created = issue
        .fields
        .get("created")
        .and_then(Value::as_str)
        .and_then(parse_date)?;
    let priority = issue
        .fields
        .get("priority")
        .and_then(|p| p.get("name"))
        .and_then(Value::as_str)
        .map(String::from);
    Some(UndatedIssue {
        key: issue.key,
        priority,
        created,
    })
}

#[async_trait]
impl IssueTracker for JiraProvider {
    fn name(&self) -> &str {
        "Jira"
    }

    fn browse_url(&self, issue_key: &str) -> String {
        format!("{}/browse/{}", self.base_url, issue_key)
    }

    async fn create_issue(&self, issue: &Issue) -> Result<CreatedIssue> {
        let resp = self
            .client
            .post(format!("{}/rest/api/2/issue/", self.base_url))
            .header("Authorization", &self.auth_header)
            .json(&issue.to_payload(&self.fields))
            .send()
            .await
            .map_err(|e| MigrationError::api("Jira create request failed", e))?;
        let resp = check_status(resp, "Jira create issue").await?;
        resp.json()
            .await
            .map_err(|e| MigrationError::api("Failed to parse Jira create response", e))
    }

    async fn existing_trackit_ids(&self) -> Result<HashSet<i64>> {
        let issues = self
            .search_all(&self.project_jql(), &self.fields.trackit_id)
            .await?;
        Ok(issues
            .iter()
            .filter_map(|issue| trackit_id_of(&issue.fields, &self.fields.trackit_id))
            .collect())
    }

    async fn find_by_trackit_id(&self, trackit_id: i64) -> Result<Option<String>> {
        let jql = format!(
            "{} AND {} = {}",
            self.project_jql(),
            jql_field(&self.fields.trackit_id),
            trackit_id
        );
        let issues = self.search_all(&jql, "key").await?;
        Ok(issues.into_iter().next().map(|i| i.key))
    }

    async fn attach_file(&self, issue_key: &str, path: &Path) -> Result<()> {
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "attachment".into());
        let part = reqwest::multipart::Part::bytes(bytes).file_name(file_name);
        let form = reqwest::multipart::Form::new().part("file", part);

        let resp = self
            .client
            .post(format!(
                "{}/rest/api/2/issue/{}/attachments",
                self.base_url, issue_key
            ))
            .header("Authorization", &self.auth_header)
            .header("X-Atlassian-Token", "no-check")
            .multipart(form)
            .send()
            .await
            .map_err(|e| MigrationError::api("Jira attachment upload failed", e))?;
        check_status(resp, "Jira attachment upload").await?;
        Ok(())
    }

    async fn undated_issues(&self) -> Result<Vec<UndatedIssue>> {
        let jql = format!(
            "{} AND duedate is EMPTY AND type = \"{}\"",
            self.project_jql(),
            IssueType::IncidentManagement
        );
        let issues = self.search_all(&jql, "priority,created").await?;
        Ok(issues.into_iter().filter_map(undated_issue).collect())
    }

    async fn set_due_date(&self, issue_key: &str, due_date: NaiveDate) -> Result<()> {
        let body = serde_json::json!({
            "fields": { "duedate": due_date.format("%Y-%m-%d").to_string() }
        });
        let resp = self
            .client
            .put(format!("{}/rest/api/2/issue/{}", self.base_url, issue_key))
            .header("Authorization", &self.auth_header)
            .json(&body)
            .send()
            .await
            .map_err(|e| MigrationError::api("Jira update request failed", e))?;
        check_status(resp, "Jira set due date").await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn provider() -> JiraProvider {
        JiraProvider::new(
            "http://jira.example.org".into(),
            "Basic YXBpOlBhc3N3b3Jk".into(),
            "SRQ".into(),
            FieldMapping::default(),
        )
    }

    #[test]
    fn search_url_encodes_jql() {
        let url = provider().search_url("project = \"SRQ\"", "customfield_10411", 500);
        assert_eq!(
            url,
            "http://jira.example.org/rest/api/2/search?jql=project%20%3D%20%22SRQ%22&fields=customfield_10411&startAt=500&maxResults=500"
        );
    }

    #[test]
    fn browse_url_points_at_issue() {
        assert_eq!(
            provider().browse_url("SRQ-42"),
            "http://jira.example.org/browse/SRQ-42"
        );
    }

    #[test]
    fn trackit_id_accepts_float_and_string() {
        let fields = json!({ "customfield_10411": 52204.0 });
        assert_eq!(trackit_id_of(&fields, "customfield_10411"), Some(52204));
        let fields = json!({ "customfield_10411": "52205" });
        assert_eq!(trackit_id_of(&fields, "customfield_10411"), Some(52205));
        let fields = json!({ "customfield_10411": null });
        assert_eq!(trackit_id_of(&fields, "customfield_10411"), None);
        assert_eq!(trackit_id_of(&json!({}), "customfield_10411"), None);
    }

    #[test]
    fn custom_fields_use_cf_syntax_in_jql() {
        assert_eq!(jql_field("customfield_10411"), "cf[10411]");
        assert_eq!(jql_field("duedate"), "duedate");
    }

    #[test]
    fn error_body_is_summarized() {
        let body = r#"{"errorMessages":["Issue type is required"],"errors":{"assignee":"User 'mtam' does not exist."}}"#;
        assert_eq!(
            jira_error_message(body),
            "Issue type is required; assignee: User 'mtam' does not exist."
        );
        assert_eq!(jira_error_message("Bad Gateway"), "Bad Gateway");
    }

    #[test]
    fn undated_issue_parses_created_timestamp() {
        let issue = SearchIssue {
            key: "SRQ-9".into(),
            fields: json!({
                "priority": { "name": "High" },
                "created": "2017-08-10T09:58:29.000-0400"
            }),
        };
        let parsed = undated_issue(issue).unwrap();
        assert_eq!(parsed.key, "SRQ-9");
        assert_eq!(parsed.priority.as_deref(), Some("High"));
        assert_eq!(parsed.created, NaiveDate::from_ymd_opt(2017, 8, 10).unwrap());
    }

    #[test]
    fn create_response_deserializes() {
        let created: CreatedIssue = serde_json::from_str(
            r#"{"id":"10000","key":"SRQ-1","self":"http://jira.example.org/rest/api/2/issue/10000"}"#,
        )
        .unwrap();
        assert_eq!(created.key, "SRQ-1");
    }
}
