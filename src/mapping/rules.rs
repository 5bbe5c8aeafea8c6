//! Column resolution across TrackIT schema variants.
//!
//! Older exports use the raw `tasks` column names (`respons`, `reqdate`),
//! newer queries alias them (`Assignee Username`, `Request Date`). Each
//! logical field lists its candidate columns in priority order; the first
//! present value wins.

use crate::model::ticket::SourceRow;

#[derive(Debug, Clone, Copy)]
pub struct ColumnRule {
    pub field: &'static str,
    pub candidates: &'static [&'static str],
}

impl ColumnRule {
    pub fn resolve<'a>(&self, row: &'a SourceRow) -> Option<&'a str> {
        self.candidates.iter().find_map(|column| row.get(column))
    }
}

pub const WORK_ORDER_ID: ColumnRule = ColumnRule {
    field: "work order number",
    candidates: &["Workorder Number", "wo_num", "woid"],
};

pub const PRIORITY: ColumnRule = ColumnRule {
    field: "priority",
    candidates: &["Priority", "priority"],
};

pub const REQUEST_DATE: ColumnRule = ColumnRule {
    field: "request date",
    candidates: &["Request Date", "reqdate"],
};

pub const SUMMARY: ColumnRule = ColumnRule {
    field: "summary",
    candidates: &["Summary", "task"],
};

pub const REQUESTER: ColumnRule = ColumnRule {
    field: "requester",
    candidates: &["Requestor", "Requester", "request"],
};

pub const ASSIGNEE: ColumnRule = ColumnRule {
    field: "assignee",
    candidates: &["Assignee Username", "Assigned Technician", "respons"],
};

pub const DUE_DATE: ColumnRule = ColumnRule {
    field: "due date",
    candidates: &["Due Date", "duedate"],
};

pub const DEPARTMENT: ColumnRule = ColumnRule {
    field: "department",
    candidates: &["Department", "dept"],
};

pub const WORK_ORDER_TYPE: ColumnRule = ColumnRule {
    field: "work order type",
    candidates: &["Type", "type"],
};

pub const SUBTYPE: ColumnRule = ColumnRule {
    field: "subtype",
    candidates: &["Subtype", "wotype2"],
};

pub const CATEGORY: ColumnRule = ColumnRule {
    field: "category",
    candidates: &["Category", "wotype3"],
};

pub const DESCRIPTION: ColumnRule = ColumnRule {
    field: "description",
    candidates: &["Description", "descript"],
};

pub const COMPANY: ColumnRule = ColumnRule {
    field: "company",
    candidates: &["Company", "lookup1"],
};
