pub mod business_days;
pub mod rules;

use chrono::NaiveDate;

use crate::config::Config;
use crate::error::{MigrationError, Result};
use crate::model::issue::{Issue, IssueType};
use crate::model::ticket::{SourceRow, Ticket};
use business_days::add_business_days;
use rules::ColumnRule;

/// TrackIT priorities that are really work categories; in Jira they become
/// an issue type and the priority drops to Routine.
const CATEGORY_PRIORITIES: &[&str] = &["Ongoing Support", "Change Request", "Project"];

/// Turns TrackIT rows into Jira issues for one project.
pub struct RecordMapper<'a> {
    config: &'a Config,
    today: NaiveDate,
}

impl<'a> RecordMapper<'a> {
    /// `today` anchors the due date of work orders with no request date.
    pub fn new(config: &'a Config, today: NaiveDate) -> Self {
        Self { config, today }
    }

    pub fn map(&self, row: &SourceRow) -> Result<Issue> {
        let ticket = self.resolve_ticket(row)?;
        Ok(self.to_issue(ticket))
    }

    pub fn resolve_ticket(&self, row: &SourceRow) -> Result<Ticket> {
        let raw_id = rules::WORK_ORDER_ID
            .resolve(row)
            .ok_or_else(|| {
                MigrationError::mapping("<unknown>", format!("no {}", rules::WORK_ORDER_ID.field))
            })?;
        let id = parse_id(raw_id).ok_or_else(|| {
            MigrationError::mapping(raw_id, "work order number is not an integer")
        })?;
        let summary = text(rules::SUMMARY, row).ok_or_else(|| {
            MigrationError::mapping(id.to_string(), format!("no {}", rules::SUMMARY.field))
        })?;

        Ok(Ticket {
            id,
            priority: text(rules::PRIORITY, row),
            request_date: rules::REQUEST_DATE.resolve(row).and_then(parse_date),
            summary,
            description: text(rules::DESCRIPTION, row),
            requester: text(rules::REQUESTER, row),
            assignee: text(rules::ASSIGNEE, row),
            due_date: rules::DUE_DATE.resolve(row).and_then(parse_date),
            department: text(rules::DEPARTMENT, row),
            work_order_type: text(rules::WORK_ORDER_TYPE, row),
            subtype: text(rules::SUBTYPE, row),
            category: text(rules::CATEGORY, row),
            company: text(rules::COMPANY, row),
        })
    }

    pub fn to_issue(&self, ticket: Ticket) -> Issue {
        let project_key = self.config.project_key();
        let issue_type = issue_type_for(ticket.priority.as_deref(), project_key);
        let priority = ticket.priority.map(|p| {
            if CATEGORY_PRIORITIES.contains(&p.as_str()) {
                "Routine".to_string()
            } else {
                p
            }
        });
        let due_date = ticket.due_date.unwrap_or_else(|| {
            let days = self.config.due_days_for(priority.as_deref().unwrap_or_default());
            add_business_days(ticket.request_date.unwrap_or(self.today), days)
        });
        let labels = [ticket.subtype, ticket.category]
            .into_iter()
            .flatten()
            .map(|l| as_label(&l))
            .collect();

        Issue {
            trackit_id: ticket.id,
            project_key: project_key.to_string(),
            issue_type,
            summary: ticket.summary,
            description: ticket.description.unwrap_or_default(),
            priority,
            assignee: ticket.assignee.map(|a| self.resolve_assignee(&a)),
            reporter: self.config.reporter.clone(),
            due_date,
            request_date: ticket.request_date,
            requester: ticket.requester,
            department: ticket.department.unwrap_or_default(),
            labels,
            company: ticket.company.map(|c| as_label(&c)),
            work_order_type: ticket.work_order_type,
        }
    }

    /// Technician name to Jira username through the alias directory.
    /// Unknown names pass through unchanged.
    pub fn resolve_assignee(&self, name: &str) -> String {
        self.config
            .assignee_aliases
            .iter()
            .find(|(alias, _)| alias.eq_ignore_ascii_case(name))
            .map(|(_, username)| username.clone())
            .unwrap_or_else(|| name.to_string())
    }
}

pub fn issue_type_for(priority: Option<&str>, project_key: &str) -> IssueType {
    match priority {
        Some("Project") => IssueType::Project,
        Some("Ongoing Support") => IssueType::ServiceManagement,
        Some("Change Request") if project_key == "CRQ" => IssueType::ChangeRequest,
        _ => IssueType::IncidentManagement,
    }
}

/// Jira labels cannot contain spaces.
fn as_label(value: &str) -> String {
    value.replace(' ', "_")
}

fn text(rule: ColumnRule, row: &SourceRow) -> Option<String> {
    rule.resolve(row).map(String::from)
}

fn parse_id(raw: &str) -> Option<i64> {
    raw.parse::<i64>().ok().or_else(|| {
        raw.parse::<f64>()
            .ok()
            .filter(|f| f.fract() == 0.0)
            .map(|f| f as i64)
    })
}

/// Accepts `YYYY-MM-DD`, optionally followed by a time part.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let head = raw.get(..10).unwrap_or(raw);
    NaiveDate::parse_from_str(head, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(raw, "%m/%d/%Y"))
        .ok()
}
