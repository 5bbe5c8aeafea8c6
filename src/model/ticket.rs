use std::collections::HashMap;

use chrono::NaiveDate;

/// One row from the TrackIT query, keyed by lowercased column name.
///
/// NULL and blank cells are not stored, so a missing column and a NULL
/// column look the same to the mapper.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceRow {
    columns: HashMap<String, String>,
}

impl SourceRow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, column: &str, value: Option<String>) {
        if let Some(value) = value {
            let trimmed = value.trim();
            if !trimmed.is_empty() {
                self.columns
                    .insert(column.to_lowercase(), trimmed.to_string());
            }
        }
    }

    pub fn with(mut self, column: &str, value: &str) -> Self {
        self.insert(column, Some(value.to_string()));
        self
    }

    pub fn get(&self, column: &str) -> Option<&str> {
        self.columns.get(&column.to_lowercase()).map(String::as_str)
    }
}

/// A TrackIT work order after column resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct Ticket {
    pub id: i64,
    pub priority: Option<String>,
    pub request_date: Option<NaiveDate>,
    pub summary: String,
    pub description: Option<String>,
    pub requester: Option<String>,
    pub assignee: Option<String>,
    pub due_date: Option<NaiveDate>,
    pub department: Option<String>,
    pub work_order_type: Option<String>,
    pub subtype: Option<String>,
    pub category: Option<String>,
    pub company: Option<String>,
}
