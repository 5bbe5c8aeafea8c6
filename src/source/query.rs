use crate::config::Config;
use crate::error::ConfigError;

/// Columns selected from the TrackIT `tasks` table, raw names.
const COLUMNS: &[&str] = &[
    "wo_num", "priority", "reqdate", "task", "request", "respons", "duedate", "modidate", "dept",
    "type", "wotype2", "wotype3", "descript", "note", "lookup1",
];

#[derive(Debug, Clone, PartialEq)]
pub enum QueryParam {
    Int(i32),
    Text(String),
}

/// SQL text with `@P1..@Pn` placeholders and their values.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceQuery {
    pub sql: String,
    pub params: Vec<QueryParam>,
}

impl SourceQuery {
    /// Raw `sql` from the config wins; otherwise build from `query`.
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        if let Some(sql) = config.sql.as_ref().filter(|s| !s.trim().is_empty()) {
            return Ok(Self {
                sql: sql.clone(),
                params: Vec::new(),
            });
        }

        let filter = &config.query;
        if !is_table_name(&filter.table) {
            return Err(ConfigError::Invalid(format!(
                "query.table is not a plain table name: {}",
                filter.table
            )));
        }

        let mut params = vec![QueryParam::Int(filter.status_id)];
        let mut clauses = vec!["WorkOrderStatusId = @P1".to_string()];

        if let Some(cutoff) = filter.created_after {
            params.push(QueryParam::Text(cutoff.format("%Y-%m-%d").to_string()));
            clauses.push(format!("reqdate >= @P{}", params.len()));
        }
        if !filter.labels.is_empty() {
            clauses.push(format!("priority IN ({})", placeholders(&mut params, &filter.labels)));
        }
        if !filter.technicians.is_empty() {
            clauses.push(format!(
                "respons IN ({})",
                placeholders(&mut params, &filter.technicians)
            ));
        }

        let sql = format!(
            "SELECT {} FROM {} WHERE {} ORDER BY respons, wo_num DESC",
            COLUMNS.join(", "),
            filter.table,
            clauses.join(" AND ")
        );
        Ok(Self { sql, params })
    }
}

fn placeholders(params: &mut Vec<QueryParam>, values: &[String]) -> String {
    values
        .iter()
        .map(|v| {
            params.push(QueryParam::Text(v.clone()));
            format!("@P{}", params.len())
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Table names are interpolated, so only identifier characters pass.
fn is_table_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '[' | ']'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_config;
    use chrono::NaiveDate;

    #[test]
    fn default_filter_only_binds_status() {
        let query = SourceQuery::from_config(&test_config()).unwrap();
        assert!(query.sql.starts_with("SELECT wo_num, priority"));
        assert!(query.sql.contains("FROM TRACKIT_DATA.dbo.tasks WHERE WorkOrderStatusId = @P1 ORDER BY"));
        assert_eq!(query.params, vec![QueryParam::Int(1)]);
    }

    #[test]
    fn cutoff_labels_and_technicians_are_parameters() {
        let mut config = test_config();
        config.query.created_after = NaiveDate::from_ymd_opt(2017, 7, 11);
        config.query.labels = vec!["Urgent".into(), "High".into()];
        config.query.technicians = vec!["Maxim Tam".into()];

        let query = SourceQuery::from_config(&config).unwrap();
        assert!(query.sql.contains(
            "WorkOrderStatusId = @P1 AND reqdate >= @P2 AND priority IN (@P3, @P4) AND respons IN (@P5)"
        ));
        assert_eq!(
            query.params,
            vec![
                QueryParam::Int(1),
                QueryParam::Text("2017-07-11".into()),
                QueryParam::Text("Urgent".into()),
                QueryParam::Text("High".into()),
                QueryParam::Text("Maxim Tam".into()),
            ]
        );
        assert!(!query.sql.contains("Urgent"));
    }

    #[test]
    fn raw_sql_overrides_filter() {
        let mut config = test_config();
        config.sql = Some("SELECT wo_num 'Workorder Number' FROM tasks".into());
        config.query.labels = vec!["Urgent".into()];

        let query = SourceQuery::from_config(&config).unwrap();
        assert_eq!(query.sql, "SELECT wo_num 'Workorder Number' FROM tasks");
        assert!(query.params.is_empty());
    }

    #[test]
    fn suspicious_table_name_rejected() {
        let mut config = test_config();
        config.query.table = "tasks; DROP TABLE tasks".into();
        assert!(SourceQuery::from_config(&config).is_err());
    }
}
