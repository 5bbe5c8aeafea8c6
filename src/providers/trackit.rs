use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use super::SourceCloser;
use crate::error::{MigrationError, Result};

/// Closes work orders through the TrackIT web API.
///
/// Logs in lazily on the first close and reuses the API key for the rest
/// of the run.
pub struct TrackitCloser {
    base_url: String,
    username: String,
    client: reqwest::Client,
    api_key: OnceCell<String>,
}

impl TrackitCloser {
    pub fn new(base_url: String, username: String) -> Self {
        Self {
            base_url,
            username,
            client: reqwest::Client::new(),
            api_key: OnceCell::new(),
        }
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/TrackitWebAPI/api/{}", self.base_url, path)
    }

    async fn api_key(&self) -> Result<&str> {
        self.api_key
            .get_or_try_init(|| self.login())
            .await
            .map(String::as_str)
    }

    async fn login(&self) -> Result<String> {
        let resp = self
            .client
            .get(self.api_url("Login"))
            .query(&[("username", self.username.as_str()), ("pwd", "")])
            .send()
            .await
            .map_err(|e| MigrationError::api("TrackIT login request failed", e))?;
        let body: Value = check_status(resp, "TrackIT login")
            .await?
            .json()
            .await
            .map_err(|e| MigrationError::api("Failed to parse TrackIT login response", e))?;

        let key = body
            .pointer("/data/apiKey")
            .and_then(Value::as_str)
            .ok_or_else(|| MigrationError::api("TrackIT login", "response has no apiKey"))?;
        info!(user = %self.username, "Logged in to TrackIT web API");
        Ok(key.to_string())
    }

    async fn post_workorder(&self, action: &str, workorder_id: i64, body: String) -> Result<Value> {
        let key = self.api_key().await?;
        let context = format!("TrackIT {action} for work order {workorder_id}");
        let resp = self
            .client
            .post(self.api_url(&format!("workorder/{action}/{workorder_id}")))
            .header("TrackItAPIKey", key)
            .header("Content-Type", "text/json")
            .body(body)
            .send()
            .await
            .map_err(|e| MigrationError::api(&context, e))?;
        check_status(resp, &context)
            .await?
            .json()
            .await
            .map_err(|e| MigrationError::api(&context, e))
    }

    async fn add_note(&self, workorder_id: i64, text: &str) -> Result<()> {
        let note = serde_json::json!({
            "IsPrivate": "false",
            "FullText": text,
            "ActivityCode": "Research",
        });
        let response = self
            .post_workorder("AddNote", workorder_id, note.to_string())
            .await?;
        response_message(&response)
            .map(|msg| debug!(workorder_id, %msg, "TrackIT note added"))
            .map_err(|msg| MigrationError::api(format!("TrackIT AddNote {workorder_id}"), msg))
    }
}

/// ASP.NET error bodies carry a top-level `Message`.
async fn check_status(resp: reqwest::Response, context: &str) -> Result<reqwest::Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    let message = serde_json::from_str::<Value>(&body)
        .ok()
        .and_then(|v| v.get("Message").and_then(Value::as_str).map(String::from))
        .unwrap_or_else(|| body.chars().take(300).collect());
    Err(MigrationError::api(context, format!("HTTP {status}: {message}")))
}

/// `success` comes back as either a bool or the string "true"/"false".
/// A body without it is a failure.
fn response_message(body: &Value) -> std::result::Result<String, String> {
    let succeeded = match body.get("success") {
        Some(Value::Bool(ok)) => *ok,
        Some(Value::String(s)) => s.eq_ignore_ascii_case("true"),
        _ => false,
    };
    let message = body
        .pointer("/data/Message")
        .or_else(|| body.pointer("/data/message"))
        .or_else(|| body.get("Message"))
        .and_then(Value::as_str)
        .unwrap_or("no message")
        .to_string();
    if succeeded {
        Ok(message)
    } else {
        Err(message)
    }
}

pub fn migration_note(issue_url: &str) -> String {
    format!("This workorder has been moved to \n{issue_url}")
}

#[async_trait]
impl SourceCloser for TrackitCloser {
    fn name(&self) -> &str {
        "TrackIT web API"
    }

    async fn close(&self, workorder_id: i64, issue_url: &str) -> Result<()> {
        let text = migration_note(issue_url);

        // The link note is nice to have; the close is what matters.
        if let Err(e) = self.add_note(workorder_id, &text).await {
            warn!(workorder_id, error = %e, "Failed to add migration note");
        }

        let response = self
            .post_workorder("Close", workorder_id, Value::String(text).to_string())
            .await?;
        match response_message(&response) {
            Ok(msg) => {
                info!(workorder_id, %msg, "TrackIT work order closed");
                Ok(())
            }
            Err(msg) => Err(MigrationError::api(
                format!("TrackIT close {workorder_id}"),
                msg,
            )),
        }
    }
}
