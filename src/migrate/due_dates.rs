use tracing::{info, warn};

use crate::config::Config;
use crate::mapping::business_days::add_business_days;
use crate::providers::IssueTracker;

/// Gives undated incident issues a due date of `created + allowance`,
/// where the allowance comes from the issue's priority. Returns how many
/// issues were updated.
pub async fn backfill_due_dates(tracker: &dyn IssueTracker, config: &Config) -> usize {
    let issues = match tracker.undated_issues().await {
        Ok(issues) => issues,
        Err(e) => {
            warn!(error = %e, "Could not search for issues without a due date");
            return 0;
        }
    };

    let mut updated = 0;
    for issue in issues {
        let days = config.due_days_for(issue.priority.as_deref().unwrap_or_default());
        let due_date = add_business_days(issue.created, days);
        match tracker.set_due_date(&issue.key, due_date).await {
            Ok(()) => {
                info!(issue_key = %issue.key, %due_date, "Due date set");
                updated += 1;
            }
            Err(e) => warn!(issue_key = %issue.key, error = %e, "Failed to set due date"),
        }
    }
    updated
}
