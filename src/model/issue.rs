use std::fmt;

use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::config::FieldMapping;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueType {
    Project,
    ServiceManagement,
    ChangeRequest,
    IncidentManagement,
}

impl IssueType {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueType::Project => "Project",
            IssueType::ServiceManagement => "Service Management",
            IssueType::ChangeRequest => "Change Request",
            IssueType::IncidentManagement => "Incident Management",
        }
    }
}

impl fmt::Display for IssueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A Jira issue ready to be created for one work order.
#[derive(Debug, Clone, PartialEq)]
pub struct Issue {
    pub trackit_id: i64,
    pub project_key: String,
    pub issue_type: IssueType,
    pub summary: String,
    pub description: String,
    pub priority: Option<String>,
    pub assignee: Option<String>,
    pub reporter: String,
    pub due_date: NaiveDate,
    pub request_date: Option<NaiveDate>,
    pub requester: Option<String>,
    pub department: String,
    pub labels: Vec<String>,
    pub company: Option<String>,
    pub work_order_type: Option<String>,
}

impl Issue {
    /// Body for `POST /rest/api/2/issue/`.
    pub fn to_payload(&self, mapping: &FieldMapping) -> Value {
        let mut fields = Map::new();
        fields.insert("project".into(), json!({ "key": self.project_key }));
        fields.insert("summary".into(), json!(self.summary));
        fields.insert("description".into(), json!(self.description));
        fields.insert("issuetype".into(), json!({ "name": self.issue_type.as_str() }));
        fields.insert(
            "duedate".into(),
            json!(self.due_date.format("%Y-%m-%d").to_string()),
        );
        fields.insert(
            "reporter".into(),
            json!({ "key": self.reporter, "name": self.reporter }),
        );
        if let Some(assignee) = &self.assignee {
            fields.insert("assignee".into(), json!({ "key": assignee, "name": assignee }));
        }
        if let Some(priority) = &self.priority {
            fields.insert("priority".into(), json!({ "name": priority }));
        }

        fields.insert(mapping.trackit_id.clone(), json!(self.trackit_id));
        if let Some(date) = self.request_date {
            fields.insert(
                mapping.request_date.clone(),
                json!(date.format("%Y-%m-%d").to_string()),
            );
        }
        if let Some(requester) = &self.requester {
            fields.insert(mapping.requester.clone(), json!(requester));
        }
        fields.insert(mapping.department.clone(), json!([self.department]));
        if !self.labels.is_empty() {
            fields.insert(mapping.labels.clone(), json!(self.labels));
        }
        if let Some(company) = &self.company {
            fields.insert(mapping.company.clone(), json!([company]));
        }
        if let Some(wo_type) = &self.work_order_type {
            let value = match &mapping.work_order_type_option_id {
                Some(id) => json!({ "value": wo_type, "id": id }),
                None => json!({ "value": wo_type }),
            };
            fields.insert(mapping.work_order_type.clone(), value);
        }

        json!({ "fields": fields })
    }
}

/// Jira's answer to a successful create.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CreatedIssue {
    pub id: String,
    pub key: String,
}

/// An existing Jira issue with no due date, as returned by search.
#[derive(Debug, Clone, PartialEq)]
pub struct UndatedIssue {
    pub key: String,
    pub priority: Option<String>,
    pub created: NaiveDate,
}

#[cfg(test)]
pub(crate) fn sample_issue() -> Issue {
    Issue {
        trackit_id: 52204,
        project_key: "SRQ".into(),
        issue_type: IssueType::IncidentManagement,
        summary: "Printer on 3rd floor jams".into(),
        description: "Paper tray 2".into(),
        priority: Some("Urgent".into()),
        assignee: Some("mtam".into()),
        reporter: "api".into(),
        due_date: NaiveDate::from_ymd_opt(2017, 8, 11).unwrap(),
        request_date: NaiveDate::from_ymd_opt(2017, 8, 10),
        requester: Some("Daniel Tremer".into()),
        department: "IT".into(),
        labels: vec!["Hardware".into(), "Printer_Issue".into()],
        company: Some("Head_Office".into()),
        work_order_type: Some("Incident".into()),
    }
}
