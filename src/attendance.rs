//! Attendance reconciliation.
//!
//! Displayed status merges three sources, highest precedence first:
//!
//! 1. an un-submitted local override for the entity,
//! 2. the entity's historical record whose day equals the selected date,
//! 3. absent.
//!
//! [`AttendanceBook`] holds the overrides for one viewing session and
//! [`submit`] pushes them as one concurrent write per entity.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::NaiveDate;
use futures::future::join_all;
use tracing::{debug, info, warn};

use crate::api::ApiClient;
use crate::error::{DeskError, Result};
use crate::models::{AttendanceMark, AttendanceRecord, Student};
use crate::roster::{load_entries, matches_class, RosterEntry, RosterKind, RosterView};

/// Resolve one entity's displayed status.
pub fn resolve_status(
    id: &str,
    selected_date: &str,
    overrides: &BTreeMap<String, bool>,
    history: &[AttendanceRecord],
) -> bool {
    if let Some(present) = overrides.get(id) {
        return *present;
    }
    record_for(history, selected_date)
        .map(|r| r.present)
        .unwrap_or(false)
}

/// First historical record for `day`.
pub fn record_for<'a>(history: &'a [AttendanceRecord], day: &str) -> Option<&'a AttendanceRecord> {
    history.iter().find(|r| r.day() == day)
}

/// Present days over recorded days, as a percentage with two decimals.
pub fn attendance_percentage(records: &[AttendanceRecord]) -> f64 {
    if records.is_empty() {
        return 0.0;
    }
    let present = records.iter().filter(|r| r.present).count() as f64;
    (present / records.len() as f64 * 10_000.0).round() / 100.0
}

/// A student's own history, optionally narrowed to dates starting with
/// `prefix` (`2024`, `2024-01`, `2024-01-15`).
pub fn student_history<'a>(student: &'a Student, prefix: Option<&str>) -> Vec<&'a AttendanceRecord> {
    let prefix = prefix.map(str::trim).unwrap_or("");
    student
        .attendance
        .iter()
        .filter(|r| r.date.starts_with(prefix))
        .collect()
}

fn parse_day(date: &str) -> Result<String> {
    let trimmed = date.trim();
    if trimmed.len() != 10 || NaiveDate::parse_from_str(trimmed, "%Y-%m-%d").is_err() {
        return Err(DeskError::validation(format!(
            "Invalid date: {trimmed}. Use YYYY-MM-DD"
        )));
    }
    Ok(trimmed.to_string())
}

// ---------------------------------------------------------------------------
// Viewing session
// ---------------------------------------------------------------------------

/// What happens to overrides when the class filter changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverridePolicy {
    /// Overrides are keyed by entity and survive filter switches; hidden
    /// entities are still submitted.
    #[default]
    RetainAcrossFilters,
    ClearOnFilterChange,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusLabel {
    Present,
    Absent,
    YetToUpdate,
}

impl StatusLabel {
    pub fn as_str(self) -> &'static str {
        match self {
            StatusLabel::Present => "Present",
            StatusLabel::Absent => "Absent",
            StatusLabel::YetToUpdate => "Yet to Update",
        }
    }
}

#[derive(Debug, Clone)]
pub struct AttendanceBook {
    kind: RosterKind,
    selected_date: String,
    overrides: BTreeMap<String, bool>,
    class_filter: Option<String>,
    policy: OverridePolicy,
}

impl AttendanceBook {
    pub fn new(kind: RosterKind, selected_date: &str) -> Result<Self> {
        Ok(Self {
            kind,
            selected_date: parse_day(selected_date)?,
            overrides: BTreeMap::new(),
            class_filter: None,
            policy: OverridePolicy::default(),
        })
    }

    pub fn with_policy(mut self, policy: OverridePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn kind(&self) -> RosterKind {
        self.kind
    }

    pub fn selected_date(&self) -> &str {
        &self.selected_date
    }

    pub fn class_filter(&self) -> Option<&str> {
        self.class_filter.as_deref()
    }

    pub fn overrides(&self) -> &BTreeMap<String, bool> {
        &self.overrides
    }

    pub fn has_pending(&self) -> bool {
        !self.overrides.is_empty()
    }

    /// A new date starts a new viewing session.
    pub fn set_date(&mut self, date: &str) -> Result<()> {
        let day = parse_day(date)?;
        if day != self.selected_date {
            self.selected_date = day;
            self.clear("date changed");
        }
        Ok(())
    }

    /// Switching between students and teachers starts a new viewing session.
    pub fn set_kind(&mut self, kind: RosterKind) {
        if kind != self.kind {
            self.kind = kind;
            self.clear("roster changed");
        }
    }

    pub fn set_class_filter(&mut self, filter: Option<&str>) {
        let filter = filter
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .map(str::to_string);
        if filter == self.class_filter {
            return;
        }
        self.class_filter = filter;
        if self.policy == OverridePolicy::ClearOnFilterChange {
            self.clear("class filter changed");
        }
    }

    fn clear(&mut self, reason: &str) {
        if !self.overrides.is_empty() {
            debug!(count = self.overrides.len(), reason, "clearing attendance overrides");
        }
        self.overrides.clear();
    }

    /// Entries shown under the current class filter. Teachers carry no
    /// class and are never filtered.
    pub fn visible<'a>(&self, roster: &'a [RosterEntry]) -> Vec<&'a RosterEntry> {
        roster
            .iter()
            .filter(|e| e.class.is_none() || matches_class(e.class.as_deref(), self.class_filter()))
            .collect()
    }

    pub fn status(&self, entry: &RosterEntry) -> bool {
        resolve_status(&entry.id, &self.selected_date, &self.overrides, &entry.attendance)
    }

    pub fn status_label(&self, entry: &RosterEntry) -> StatusLabel {
        let present = match self.overrides.get(&entry.id) {
            Some(p) => Some(*p),
            None => record_for(&entry.attendance, &self.selected_date).map(|r| r.present),
        };
        match present {
            Some(true) => StatusLabel::Present,
            Some(false) => StatusLabel::Absent,
            None => StatusLabel::YetToUpdate,
        }
    }

    /// Flip the entity's status locally. Returns the new value.
    pub fn toggle(&mut self, entry: &RosterEntry) -> bool {
        let next = !self.status(entry);
        self.overrides.insert(entry.id.clone(), next);
        next
    }

    pub fn mark(&mut self, id: &str, present: bool) {
        self.overrides.insert(id.to_string(), present);
    }

    /// Whether any visible entry already has a record for the selected date.
    pub fn already_submitted(&self, roster: &[RosterEntry]) -> bool {
        self.visible(roster)
            .iter()
            .any(|e| record_for(&e.attendance, &self.selected_date).is_some())
    }

    /// Keep only the overrides whose write failed, so a retry sends just
    /// the failed subset.
    pub fn retain_failed(&mut self, report: &BatchReport) {
        let failed: Vec<&str> = report.failed().map(|r| r.id.as_str()).collect();
        self.overrides.retain(|id, _| failed.contains(&id.as_str()));
    }
}

// ---------------------------------------------------------------------------
// Submission
// ---------------------------------------------------------------------------

/// Backend operations the engine needs.
#[async_trait]
pub trait AttendanceGateway: Send + Sync {
    async fn load_roster(&self, view: &RosterView) -> Result<Vec<RosterEntry>>;
    async fn write_attendance(&self, kind: RosterKind, id: &str, mark: &AttendanceMark)
        -> Result<()>;
}

#[async_trait]
impl AttendanceGateway for ApiClient {
    async fn load_roster(&self, view: &RosterView) -> Result<Vec<RosterEntry>> {
        load_entries(self, view).await
    }

    async fn write_attendance(
        &self,
        kind: RosterKind,
        id: &str,
        mark: &AttendanceMark,
    ) -> Result<()> {
        self.put_attendance(kind, id, mark).await
    }
}

#[derive(Debug)]
pub struct EntityWriteResult {
    pub id: String,
    pub present: bool,
    pub error: Option<DeskError>,
}

impl EntityWriteResult {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Debug, Default)]
pub struct BatchReport {
    pub results: Vec<EntityWriteResult>,
    /// Roster re-fetched after a fully successful batch.
    pub refreshed: Option<Vec<RosterEntry>>,
}

impl BatchReport {
    pub fn all_succeeded(&self) -> bool {
        self.results.iter().all(EntityWriteResult::succeeded)
    }

    pub fn failed(&self) -> impl Iterator<Item = &EntityWriteResult> {
        self.results.iter().filter(|r| !r.succeeded())
    }

    pub fn succeeded_count(&self) -> usize {
        self.results.iter().filter(|r| r.succeeded()).count()
    }

    /// The whole batch as one failure when any write failed.
    pub fn failure(&self) -> Option<DeskError> {
        let failed = self.failed().count();
        (failed > 0).then(|| DeskError::Batch {
            failed,
            total: self.results.len(),
        })
    }
}

/// Write every pending override for the selected date.
///
/// All writes run concurrently. Only when every write succeeds is the
/// roster re-fetched and, after that, the overrides cleared. Any failure
/// leaves the overrides untouched and is reported per entity; a failed
/// re-fetch is returned as an error with the overrides kept.
pub async fn submit(
    gateway: &dyn AttendanceGateway,
    view: &RosterView,
    book: &mut AttendanceBook,
) -> Result<BatchReport> {
    if view.kind() != book.kind() {
        return Err(DeskError::validation(format!(
            "Attendance is being taken for {}, not {}",
            book.kind().label(),
            view.kind().label()
        )));
    }
    if book.overrides.is_empty() {
        return Err(DeskError::validation("No attendance changes to submit"));
    }

    let batch: Vec<(String, bool)> = book
        .overrides
        .iter()
        .map(|(id, present)| (id.clone(), *present))
        .collect();
    let kind = book.kind();
    let date = book.selected_date.clone();
    info!(kind = kind.label(), %date, count = batch.len(), "submitting attendance");

    let writes = batch.iter().map(|(id, present)| {
        let mark = AttendanceMark {
            date: date.clone(),
            present: *present,
        };
        async move {
            let outcome = gateway.write_attendance(kind, id, &mark).await;
            EntityWriteResult {
                id: id.clone(),
                present: *present,
                error: outcome.err(),
            }
        }
    });
    let results = join_all(writes).await;

    let mut report = BatchReport {
        results,
        refreshed: None,
    };
    if !report.all_succeeded() {
        for failure in report.failed() {
            if let Some(e) = &failure.error {
                warn!(id = %failure.id, error = %e, "attendance write failed");
            }
        }
        warn!(
            failed = report.failed().count(),
            succeeded = report.succeeded_count(),
            "attendance batch incomplete, overrides kept"
        );
        return Ok(report);
    }

    let refreshed = gateway.load_roster(view).await?;
    book.clear("batch submitted");
    info!(count = report.results.len(), "attendance submitted");
    report.refreshed = Some(refreshed);
    Ok(report)
}

/// [`submit`], then resend only the failed writes up to `retries` more
/// times. Each retry narrows the overrides to what failed, so the returned
/// report covers the last attempt only.
pub async fn submit_with_retry(
    gateway: &dyn AttendanceGateway,
    view: &RosterView,
    book: &mut AttendanceBook,
    retries: usize,
) -> Result<BatchReport> {
    let mut report = submit(gateway, view, book).await?;
    let mut attempt = 0;
    while !report.all_succeeded() && attempt < retries {
        attempt += 1;
        book.retain_failed(&report);
        info!(attempt, pending = book.overrides.len(), "retrying failed attendance writes");
        report = submit(gateway, view, book).await?;
    }
    Ok(report)
}
