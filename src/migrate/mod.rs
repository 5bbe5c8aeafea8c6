pub mod due_dates;
pub mod outcome;

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::NaiveDate;
use futures::stream::{self, StreamExt};
use tracing::{error, info, warn};

use crate::config::Config;
use crate::error::{MigrationError, Result};
use crate::ledger;
use crate::logging;
use crate::mapping::RecordMapper;
use crate::model::issue::Issue;
use crate::providers::{self, IssueTracker, SourceCloser};
use crate::source::mssql::MssqlSource;
use crate::source::query::SourceQuery;
use crate::source::TicketSource;
use outcome::{Outcome, OutcomeKind, RunSummary};

/// One pass over the open work orders of one config.
pub struct Migration<'a> {
    config: &'a Config,
    tracker: &'a dyn IssueTracker,
    closer: &'a dyn SourceCloser,
    ledger_path: PathBuf,
    today: NaiveDate,
}

impl<'a> Migration<'a> {
    pub fn new(
        config: &'a Config,
        tracker: &'a dyn IssueTracker,
        closer: &'a dyn SourceCloser,
        today: NaiveDate,
    ) -> Self {
        Self {
            config,
            tracker,
            closer,
            ledger_path: config.ledger_path(),
            today,
        }
    }

    pub async fn run(&self, source: &dyn TicketSource) -> Result<RunSummary> {
        let rows = source.fetch_rows().await?;
        info!(count = rows.len(), source = %source.describe(), "Open work orders fetched");

        let mut summary = RunSummary {
            fetched: rows.len(),
            ..RunSummary::default()
        };

        let mapper = RecordMapper::new(self.config, self.today);
        let mut issues = Vec::with_capacity(rows.len());
        for row in &rows {
            match mapper.map(row) {
                Ok(issue) => issues.push(issue),
                Err(e) => {
                    summary.unmappable += 1;
                    error!(outcome = "unmappable", error = %e, "Skipping work order");
                }
            }
        }

        let entries = ledger::read_entries(&self.ledger_path);
        let (fresh, existing) = if self.config.skip_existing {
            let mut known = self.tracker.existing_trackit_ids().await?;
            known.extend(ledger::created_ids(&entries));
            split_known(issues, &known)
        } else {
            (issues, Vec::new())
        };
        summary.already_in_jira = existing.len();
        if !existing.is_empty() {
            info!(
                ids = ?existing.iter().map(|i| i.trackit_id).collect::<Vec<_>>(),
                "Work orders already in Jira, closing them in TrackIT"
            );
        }

        let limit = self.config.concurrency.max(1);
        let migrated: Vec<Outcome> = stream::iter(fresh)
            .map(|issue| self.migrate_one(issue))
            .buffer_unordered(limit)
            .collect()
            .await;
        let reconciled: Vec<Outcome> = stream::iter(existing)
            .map(|issue| {
                let known_key = ledger::issue_key_for(&entries, issue.trackit_id).map(String::from);
                self.reconcile_one(issue.trackit_id, known_key)
            })
            .buffer_unordered(limit)
            .collect()
            .await;
        for outcome in migrated.iter().chain(reconciled.iter()) {
            summary.add(outcome);
        }

        if self.config.backfill_due_dates {
            summary.due_dates_set = due_dates::backfill_due_dates(self.tracker, self.config).await;
        }

        info!(
            migrated = summary.migrated,
            reconciled = summary.reconciled,
            partial_failures = summary.partial_failures,
            failed = summary.failed,
            "Migration run finished"
        );
        Ok(summary)
    }

    async fn migrate_one(&self, issue: Issue) -> Outcome {
        let id = issue.trackit_id;
        info!(ticket_id = id, "Moving work order to Jira");

        let created = match self.tracker.create_issue(&issue).await {
            Ok(created) => created,
            Err(e) => return self.record(Outcome::failed(id, e)),
        };
        info!(ticket_id = id, issue_key = %created.key, issue_id = %created.id, "Jira issue created");

        self.upload_attachments(id, &created.key).await;

        let url = self.tracker.browse_url(&created.key);
        match self.closer.close(id, &url).await {
            Ok(()) => self.record(Outcome::migrated(id, created.key)),
            Err(e) => self.record(Outcome::partial(id, created.key, e)),
        }
    }

    /// Closes a work order whose issue already exists. Jira's own record of
    /// the key wins over the ledger's.
    async fn reconcile_one(&self, id: i64, known_key: Option<String>) -> Outcome {
        let key = match self.tracker.find_by_trackit_id(id).await {
            Ok(Some(key)) => key,
            Ok(None) => match known_key {
                Some(key) => key,
                None => {
                    let e = MigrationError::api(
                        format!("{} lookup", self.tracker.name()),
                        format!("no issue carries TrackIT id {id}"),
                    );
                    return self.record(Outcome::failed(id, e));
                }
            },
            Err(e) => return self.record(Outcome::failed(id, e)),
        };

        let url = self.tracker.browse_url(&key);
        match self.closer.close(id, &url).await {
            Ok(()) => self.record(Outcome::reconciled(id, key)),
            Err(e) => self.record(Outcome::partial(id, key, e)),
        }
    }

    async fn upload_attachments(&self, id: i64, issue_key: &str) {
        let Some(folder) = &self.config.attachment_folder else {
            return;
        };
        let files = attachment_files(&folder.join(id.to_string()));
        for path in &files {
            if let Err(e) = self.tracker.attach_file(issue_key, path).await {
                warn!(ticket_id = id, issue_key, file = %path.display(), error = %e, "Attachment upload failed");
            }
        }
        if !files.is_empty() {
            info!(ticket_id = id, issue_key, count = files.len(), "Attachments uploaded");
        }
    }

    /// Logs the outcome and appends it to the ledger.
    fn record(&self, outcome: Outcome) -> Outcome {
        let id = outcome.ticket_id;
        let key = outcome.issue_key.as_deref().unwrap_or_default();
        let detail = outcome.error.as_ref().map(|e| e.format_detailed());

        match outcome.kind {
            OutcomeKind::Migrated | OutcomeKind::Reconciled => {
                info!(ticket_id = id, issue_key = key, outcome = %outcome.kind, "Work order closed in TrackIT");
            }
            OutcomeKind::PartialFailure => {
                error!(
                    ticket_id = id,
                    issue_key = key,
                    outcome = %outcome.kind,
                    error = detail.as_deref().unwrap_or_default(),
                    "PARTIAL FAILURE: Jira issue exists but the TrackIT work order is still open"
                );
            }
            OutcomeKind::Failed => {
                error!(
                    ticket_id = id,
                    outcome = %outcome.kind,
                    error = detail.as_deref().unwrap_or_default(),
                    "Work order not migrated"
                );
            }
        }

        let message = outcome.error.as_ref().map(|e| e.to_string());
        let entry = ledger::new_entry(
            id,
            outcome.kind,
            outcome.issue_key.as_deref(),
            message.as_deref(),
        );
        if let Err(e) = ledger::append_entry(&self.ledger_path, &entry) {
            warn!(ticket_id = id, error = %e, "Failed to append to ledger");
        }
        outcome
    }
}

/// Splits out issues whose TrackIT id is already known. Only the first row
/// for each id is kept.
fn split_known(issues: Vec<Issue>, known: &HashSet<i64>) -> (Vec<Issue>, Vec<Issue>) {
    let mut seen = HashSet::new();
    let mut fresh = Vec::new();
    let mut existing = Vec::new();
    for issue in issues {
        if !seen.insert(issue.trackit_id) {
            warn!(ticket_id = issue.trackit_id, "Duplicate work order row ignored");
        } else if known.contains(&issue.trackit_id) {
            existing.push(issue);
        } else {
            fresh.push(issue);
        }
    }
    (fresh, existing)
}

/// Regular files in `dir`, sorted by name. A missing directory has none.
fn attachment_files(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut files: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file())
        .collect();
    files.sort();
    files
}

/// Full run against real systems: log file, database connection, Jira and
/// the configured closer, all released when the run returns.
pub async fn run_with_config(config: &Config) -> Result<RunSummary> {
    let _log_guard = logging::init_run_logging(config)?;
    info!(project = config.project_key(), "Starting TrackIT to Jira migration");

    let query = SourceQuery::from_config(config)?;
    let source = Arc::new(MssqlSource::connect(&config.database_cnf, query).await?);
    let tracker = providers::create_tracker(config)?;
    let closer = providers::create_closer(config, Arc::clone(&source))?;

    let today = chrono::Local::now().date_naive();
    let result = Migration::new(config, tracker.as_ref(), closer.as_ref(), today)
        .run(source.as_ref())
        .await;

    if let Err(e) = source.close().await {
        warn!(error = %e, "Failed to close TrackIT connection");
    }
    if let Err(e) = &result {
        error!(error = %e.format_detailed(), "Migration run aborted");
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{test_config, Config};
    use crate::model::ticket::SourceRow;
    use crate::providers::tests::{MockCloser, MockSource, MockTracker};

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2017, 8, 14).unwrap()
    }

    fn config_in(dir: &tempfile::TempDir) -> Config {
        let mut config = test_config();
        config.ledger_file = Some(dir.path().join("ledger.jsonl"));
        config.backfill_due_dates = false;
        config
    }

    fn urgent_legacy_row(id: &str) -> SourceRow {
        SourceRow::new()
            .with("wo_num", id)
            .with("priority", "Urgent")
            .with("reqdate", "2017-08-10")
            .with("task", "Printer on 3rd floor jams")
            .with("respons", "Maxim Tam")
    }

    #[tokio::test]
    async fn urgent_legacy_ticket_is_migrated_and_closed() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(&dir);
        let source = MockSource::new(vec![urgent_legacy_row("52204")]);
        let tracker = MockTracker::new();
        let closer = MockCloser::new();

        let summary = Migration::new(&config, &tracker, &closer, today())
            .run(&source)
            .await
            .unwrap();

        assert_eq!(summary.migrated, 1);
        let created = tracker.created();
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].assignee.as_deref(), Some("mtam"));
        assert_eq!(
            created[0].due_date,
            NaiveDate::from_ymd_opt(2017, 8, 11).unwrap()
        );
        assert_eq!(
            closer.closed(),
            vec![(52204, "http://jira.test/browse/SRQ-1".to_string())]
        );

        let entries = ledger::read_entries(&config.ledger_path());
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].outcome, OutcomeKind::Migrated);
        assert_eq!(entries[0].issue_key.as_deref(), Some("SRQ-1"));
    }

    #[tokio::test]
    async fn close_failure_is_partial_and_reconciled_next_run() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(&dir);
        let source = MockSource::new(vec![urgent_legacy_row("52204")]);
        let tracker = MockTracker::new();

        let failing = MockCloser::new().with_failure();
        let first = Migration::new(&config, &tracker, &failing, today())
            .run(&source)
            .await
            .unwrap();
        assert_eq!(first.partial_failures, 1);
        assert_eq!(first.migrated, 0);
        assert!(failing.closed().is_empty());

        let entries = ledger::read_entries(&config.ledger_path());
        assert_eq!(entries[0].outcome, OutcomeKind::PartialFailure);
        assert!(entries[0]
            .message
            .as_deref()
            .unwrap()
            .contains("not closed in TrackIT"));

        // The work order is still open, so the source returns it again.
        let closer = MockCloser::new();
        let second = Migration::new(&config, &tracker, &closer, today())
            .run(&source)
            .await
            .unwrap();
        assert_eq!(second.already_in_jira, 1);
        assert_eq!(second.reconciled, 1);
        assert_eq!(tracker.created().len(), 1, "no duplicate issue");
        assert_eq!(closer.closed()[0].0, 52204);
    }

    #[tokio::test]
    async fn rerun_without_dedup_recreates_issues() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config_in(&dir);
        config.skip_existing = false;
        let source = MockSource::new(vec![urgent_legacy_row("52204")]);
        let tracker = MockTracker::new();
        let closer = MockCloser::new();

        let migration = Migration::new(&config, &tracker, &closer, today());
        migration.run(&source).await.unwrap();
        migration.run(&source).await.unwrap();

        assert_eq!(tracker.created().len(), 2);
    }

    #[tokio::test]
    async fn rerun_with_dedup_creates_nothing_new() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(&dir);
        let source = MockSource::new(vec![urgent_legacy_row("52204"), urgent_legacy_row("52205")]);
        let tracker = MockTracker::new();
        let closer = MockCloser::new();

        let migration = Migration::new(&config, &tracker, &closer, today());
        let first = migration.run(&source).await.unwrap();
        let second = migration.run(&source).await.unwrap();

        assert_eq!(first.migrated, 2);
        assert_eq!(second.migrated, 0);
        assert_eq!(second.reconciled, 2);
        assert_eq!(tracker.created().len(), 2);
    }

    #[tokio::test]
    async fn ledger_alone_prevents_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(&dir);
        ledger::append_entry(
            &config.ledger_path(),
            &ledger::new_entry(52204, OutcomeKind::Migrated, Some("SRQ-90"), None),
        )
        .unwrap();

        let source = MockSource::new(vec![urgent_legacy_row("52204")]);
        // Jira search index has not caught up: it reports nothing.
        let tracker = MockTracker::new();
        let closer = MockCloser::new();

        let summary = Migration::new(&config, &tracker, &closer, today())
            .run(&source)
            .await
            .unwrap();

        assert!(tracker.created().is_empty());
        assert_eq!(summary.reconciled, 1);
        assert_eq!(closer.closed()[0].1, "http://jira.test/browse/SRQ-90");
    }

    #[tokio::test]
    async fn api_error_skips_row_and_continues() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(&dir);
        let source = MockSource::new(vec![urgent_legacy_row("1"), urgent_legacy_row("2")]);
        let tracker = MockTracker::new().rejecting(1);
        let closer = MockCloser::new();

        let summary = Migration::new(&config, &tracker, &closer, today())
            .run(&source)
            .await
            .unwrap();

        assert_eq!(summary.failed, 1);
        assert_eq!(summary.migrated, 1);
        assert_eq!(closer.closed().len(), 1);
        assert_eq!(closer.closed()[0].0, 2);
    }

    #[tokio::test]
    async fn unmappable_rows_are_counted() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(&dir);
        let source = MockSource::new(vec![
            SourceRow::new().with("task", "no id"),
            urgent_legacy_row("3"),
        ]);
        let tracker = MockTracker::new();
        let closer = MockCloser::new();

        let summary = Migration::new(&config, &tracker, &closer, today())
            .run(&source)
            .await
            .unwrap();

        assert_eq!(summary.fetched, 2);
        assert_eq!(summary.unmappable, 1);
        assert_eq!(summary.migrated, 1);
    }

    #[tokio::test]
    async fn source_failure_aborts_run() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(&dir);
        let source = MockSource::unreachable();
        let tracker = MockTracker::new();
        let closer = MockCloser::new();

        let err = Migration::new(&config, &tracker, &closer, today())
            .run(&source)
            .await
            .unwrap_err();
        assert!(err.is_fatal());
        assert!(tracker.created().is_empty());
    }

    #[tokio::test]
    async fn bounded_concurrency_migrates_everything_once() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config_in(&dir);
        config.concurrency = 4;
        let rows = (1..=10).map(|i| urgent_legacy_row(&i.to_string())).collect();
        let source = MockSource::new(rows);
        let tracker = MockTracker::new();
        let closer = MockCloser::new();

        let summary = Migration::new(&config, &tracker, &closer, today())
            .run(&source)
            .await
            .unwrap();

        assert_eq!(summary.migrated, 10);
        let mut ids: Vec<i64> = closer.closed().iter().map(|(id, _)| *id).collect();
        ids.sort();
        assert_eq!(ids, (1..=10).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn attachments_are_uploaded_from_ticket_folder() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config_in(&dir);
        let folder = dir.path().join("attachments");
        std::fs::create_dir_all(folder.join("52204")).unwrap();
        std::fs::write(folder.join("52204").join("screenshot.png"), b"png").unwrap();
        std::fs::write(folder.join("52204").join("log.txt"), b"log").unwrap();
        config.attachment_folder = Some(folder);

        let source = MockSource::new(vec![urgent_legacy_row("52204")]);
        let tracker = MockTracker::new();
        let closer = MockCloser::new();
        Migration::new(&config, &tracker, &closer, today())
            .run(&source)
            .await
            .unwrap();

        let attached = tracker.attached();
        assert_eq!(attached.len(), 2);
        assert_eq!(attached[0].0, "SRQ-1");
        assert!(attached[0].1.ends_with("log.txt"));
        assert!(attached[1].1.ends_with("screenshot.png"));
    }

    #[test]
    fn duplicate_ids_in_one_batch_are_dropped() {
        let config = test_config();
        let mapper = RecordMapper::new(&config, today());
        let issues = vec![
            mapper.map(&urgent_legacy_row("5")).unwrap(),
            mapper.map(&urgent_legacy_row("5")).unwrap(),
            mapper.map(&urgent_legacy_row("6")).unwrap(),
            mapper.map(&urgent_legacy_row("6")).unwrap(),
        ];
        let known: HashSet<i64> = [6].into_iter().collect();

        let (fresh, existing) = split_known(issues, &known);
        assert_eq!(fresh.len(), 1);
        assert_eq!(fresh[0].trackit_id, 5);
        assert_eq!(existing.len(), 1);
        assert_eq!(existing[0].trackit_id, 6);
    }

    #[tokio::test]
    async fn repeated_known_row_is_closed_once() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(&dir);
        let source = MockSource::new(vec![urgent_legacy_row("7"), urgent_legacy_row("7")]);
        let tracker = MockTracker::new().with_existing(7, "SRQ-7");
        let closer = MockCloser::new();

        let summary = Migration::new(&config, &tracker, &closer, today())
            .run(&source)
            .await
            .unwrap();

        assert_eq!(summary.reconciled, 1);
        assert_eq!(
            closer.closed(),
            vec![(7, "http://jira.test/browse/SRQ-7".to_string())]
        );
        assert_eq!(ledger::read_entries(&config.ledger_path()).len(), 1);
    }
}
