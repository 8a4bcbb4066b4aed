//! SQLite database for persistent storage.
//!
//! Holds reports, restrictions, content visibility and the audit log. Workflow
//! mutations go through the conditional updates at the bottom of this file:
//! each `UPDATE` restates the transition's preconditions in its `WHERE`
//! clause, so a concurrent writer can never slip between check and write.

use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteConnection, SqliteJournalMode, SqlitePool, SqlitePoolOptions,
    SqliteRow,
};
use sqlx::Row;

use crate::error::{Result, TribunalError};
use crate::models::{
    ContentRef, RelatedContentType, Report, ReportAction, ReportPriority, ReportStatus, ReportType,
};
use crate::state_machine::RestoreKind;

/// Statuses a report can be assigned or processed from, as a SQL list.
const OPEN_STATUSES_SQL: &str = "('pending', 'under_review')";

/// Columns selected for a report, including the derived per-target count.
const REPORT_COLUMNS: &str = "r.id, r.reporter_id, r.reported_user_id, r.report_type,
    r.related_content_type, r.related_content_id, r.description, r.evidences, r.status,
    r.priority, r.assigned_moderator_id, r.action_taken, r.note, r.suspension_days,
    r.restriction_action_details, r.resolved_at, r.is_deleted, r.created_at, r.updated_at,
    (SELECT COUNT(*) FROM reports t
      WHERE t.reported_user_id = r.reported_user_id AND t.is_deleted = 0) AS total_reports_count";

/// Current time at the precision stored in the database.
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Fixed-width RFC 3339, so string order matches time order.
pub(crate) fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_timestamp(value: &str, field: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| TribunalError::Database(format!("Invalid {}: {}", field, e)))
}

pub(crate) fn parse_optional_timestamp(
    value: Option<String>,
    field: &str,
) -> Result<Option<DateTime<Utc>>> {
    value.map(|v| parse_timestamp(&v, field)).transpose()
}

/// Filters for report listings. Unset fields match everything.
#[derive(Debug, Clone, Default)]
pub struct ReportQuery {
    pub status: Option<ReportStatus>,
    pub assigned_moderator_id: Option<String>,
    pub related_content: Option<ContentRef>,
}

impl ReportQuery {
    pub fn by_status(status: ReportStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn by_moderator(moderator_id: impl Into<String>) -> Self {
        Self {
            assigned_moderator_id: Some(moderator_id.into()),
            ..Default::default()
        }
    }

    pub fn by_related_content(content: ContentRef) -> Self {
        Self {
            related_content: Some(content),
            ..Default::default()
        }
    }
}

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Create a new database connection.
    ///
    /// Creates the database file and initializes schema if needed.
    pub async fn new(path: &str) -> Result<Self> {
        let db_path = Path::new(path);

        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    TribunalError::Io(format!("Failed to create database directory: {}", e))
                })?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| TribunalError::Database(format!("Failed to connect to database: {}", e)))?;

        let db = Self { pool };
        db.initialize_schema().await?;

        Ok(db)
    }

    /// Create an in-memory database for testing.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(":memory:")
            .create_if_missing(true);

        // The database lives only as long as its single connection.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|e| TribunalError::Database(format!("Failed to create in-memory db: {}", e)))?;

        let db = Self { pool };
        db.initialize_schema().await?;

        Ok(db)
    }

    /// Initialize database schema.
    async fn initialize_schema(&self) -> Result<()> {
        sqlx::query(SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(|e| TribunalError::Database(format!("Failed to initialize schema: {}", e)))?;

        Ok(())
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Check if the database is healthy.
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| TribunalError::Database(format!("Health check failed: {}", e)))?;

        Ok(())
    }

    // ========== Report reads ==========

    /// Get a report by ID. Soft-deleted reports are not returned.
    pub async fn get_report(&self, report_id: &str) -> Result<Option<Report>> {
        let sql = format!(
            "SELECT {} FROM reports r WHERE r.id = ? AND r.is_deleted = 0",
            REPORT_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(report_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| TribunalError::Database(format!("Failed to get report: {}", e)))?;

        row.as_ref().map(report_from_row).transpose()
    }

    /// List reports matching a query, newest first.
    pub async fn list_reports(
        &self,
        query: &ReportQuery,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Report>> {
        let sql = format!(
            "SELECT {} FROM reports r
             WHERE r.is_deleted = 0
               AND (? IS NULL OR r.status = ?)
               AND (? IS NULL OR r.assigned_moderator_id = ?)
               AND (? IS NULL OR (r.related_content_type = ? AND r.related_content_id = ?))
             ORDER BY r.created_at DESC, r.id
             LIMIT ? OFFSET ?",
            REPORT_COLUMNS
        );

        let status = query.status.map(|s| s.as_str());
        let content_type = query
            .related_content
            .as_ref()
            .map(|c| c.content_type.as_str());
        let content_id = query.related_content.as_ref().map(|c| c.content_id.as_str());

        let rows = sqlx::query(&sql)
            .bind(status)
            .bind(status)
            .bind(query.assigned_moderator_id.as_deref())
            .bind(query.assigned_moderator_id.as_deref())
            .bind(content_type)
            .bind(content_type)
            .bind(content_id)
            .bind(limit as i64)
            .bind(offset as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| TribunalError::Database(format!("Failed to list reports: {}", e)))?;

        rows.iter().map(report_from_row).collect()
    }

    /// Soft-delete a report. Returns false if it was unknown or already deleted.
    pub async fn soft_delete_report(&self, report_id: &str) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE reports SET is_deleted = 1, updated_at = ? WHERE id = ? AND is_deleted = 0",
        )
        .bind(format_timestamp(now()))
        .bind(report_id)
        .execute(&self.pool)
        .await
        .map_err(|e| TribunalError::Database(format!("Failed to delete report: {}", e)))?;

        Ok(result.rows_affected() > 0)
    }
}

fn parse_column<T>(value: &str, column: &str, parse: fn(&str) -> Option<T>) -> Result<T> {
    parse(value).ok_or_else(|| {
        TribunalError::Database(format!("Invalid {} value: {}", column, value))
    })
}

fn report_from_row(row: &SqliteRow) -> Result<Report> {
    let related_content_type: Option<String> = row.get("related_content_type");
    let action_taken: Option<String> = row.get("action_taken");
    let evidences: String = row.get("evidences");
    let details: String = row.get("restriction_action_details");
    let suspension_days = row
        .get::<Option<i64>, _>("suspension_days")
        .map(|days| {
            u16::try_from(days).map_err(|_| {
                TribunalError::Database(format!("Invalid suspension_days value: {}", days))
            })
        })
        .transpose()?;

    Ok(Report {
        id: row.get("id"),
        reporter_id: row.get("reporter_id"),
        reported_user_id: row.get("reported_user_id"),
        report_type: parse_column(row.get("report_type"), "report_type", ReportType::parse)?,
        related_content_type: related_content_type
            .map(|v| parse_column(&v, "related_content_type", RelatedContentType::parse))
            .transpose()?,
        related_content_id: row.get("related_content_id"),
        description: row.get("description"),
        evidences: serde_json::from_str(&evidences)?,
        status: parse_column(row.get("status"), "status", ReportStatus::parse)?,
        priority: parse_column(row.get("priority"), "priority", ReportPriority::parse)?,
        assigned_moderator_id: row.get("assigned_moderator_id"),
        action_taken: action_taken
            .map(|v| parse_column(&v, "action_taken", ReportAction::parse))
            .transpose()?,
        note: row.get("note"),
        suspension_days,
        restriction_action_details: serde_json::from_str(&details)?,
        resolved_at: parse_optional_timestamp(row.get("resolved_at"), "resolved_at")?,
        is_deleted: row.get::<i64, _>("is_deleted") != 0,
        total_reports_count: row.get::<i64, _>("total_reports_count") as u32,
        created_at: parse_timestamp(row.get("created_at"), "created_at")?,
        updated_at: parse_timestamp(row.get("updated_at"), "updated_at")?,
    })
}

/// The approved, unrestored report whose account restriction should stand
/// for a user: the newest ban, otherwise the newest suspension.
pub async fn standing_account_report(
    conn: &mut SqliteConnection,
    user_id: &str,
) -> Result<Option<Report>> {
    let sql = format!(
        "SELECT {} FROM reports r
         WHERE r.reported_user_id = ?
           AND r.status = 'approved'
           AND r.action_taken IN ('permanent_ban', 'suspended')
         ORDER BY r.action_taken = 'permanent_ban' DESC, r.resolved_at DESC, r.id DESC
         LIMIT 1",
        REPORT_COLUMNS
    );
    let row = sqlx::query(&sql)
        .bind(user_id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| {
            TribunalError::Database(format!("Failed to find standing restriction: {}", e))
        })?;

    row.as_ref().map(report_from_row).transpose()
}

// ========== Report writes (run inside the caller's transaction) ==========

/// Insert a newly filed report.
pub async fn insert_report(conn: &mut SqliteConnection, report: &Report) -> Result<()> {
    sqlx::query(
        "INSERT INTO reports (id, reporter_id, reported_user_id, report_type, related_content_type,
                              related_content_id, description, evidences, status, priority,
                              restriction_action_details, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&report.id)
    .bind(&report.reporter_id)
    .bind(&report.reported_user_id)
    .bind(report.report_type.as_str())
    .bind(report.related_content_type.map(|t| t.as_str()))
    .bind(&report.related_content_id)
    .bind(&report.description)
    .bind(serde_json::to_string(&report.evidences)?)
    .bind(report.status.as_str())
    .bind(report.priority.as_str())
    .bind(serde_json::to_string(&report.restriction_action_details)?)
    .bind(format_timestamp(report.created_at))
    .bind(format_timestamp(report.updated_at))
    .execute(&mut *conn)
    .await
    .map_err(|e| TribunalError::Database(format!("Failed to create report: {}", e)))?;

    Ok(())
}

/// Set the owner of an open, unowned report.
///
/// Returns false when another writer claimed or closed it first.
pub async fn claim_report(conn: &mut SqliteConnection, next: &Report) -> Result<bool> {
    let sql = format!(
        "UPDATE reports SET assigned_moderator_id = ?, status = ?, updated_at = ?
         WHERE id = ? AND is_deleted = 0
           AND assigned_moderator_id IS NULL
           AND status IN {}",
        OPEN_STATUSES_SQL
    );
    let result = sqlx::query(&sql)
        .bind(&next.assigned_moderator_id)
        .bind(next.status.as_str())
        .bind(format_timestamp(next.updated_at))
        .bind(&next.id)
        .execute(&mut *conn)
        .await
        .map_err(|e| TribunalError::Database(format!("Failed to assign report: {}", e)))?;

    Ok(result.rows_affected() == 1)
}

/// Record an adjudication if the report is still open and owned by the same moderator.
pub async fn record_adjudication(conn: &mut SqliteConnection, next: &Report) -> Result<bool> {
    let sql = format!(
        "UPDATE reports
         SET status = ?, action_taken = ?, note = ?, suspension_days = ?,
             restriction_action_details = ?, resolved_at = ?, updated_at = ?
         WHERE id = ? AND is_deleted = 0
           AND assigned_moderator_id = ?
           AND status IN {}",
        OPEN_STATUSES_SQL
    );
    let result = sqlx::query(&sql)
        .bind(next.status.as_str())
        .bind(next.action_taken.map(|a| a.as_str()))
        .bind(&next.note)
        .bind(next.suspension_days.map(i64::from))
        .bind(serde_json::to_string(&next.restriction_action_details)?)
        .bind(next.resolved_at.map(format_timestamp))
        .bind(format_timestamp(next.updated_at))
        .bind(&next.id)
        .bind(&next.assigned_moderator_id)
        .execute(&mut *conn)
        .await
        .map_err(|e| TribunalError::Database(format!("Failed to process report: {}", e)))?;

    Ok(result.rows_affected() == 1)
}

/// Mark an approved report restored if its action is eligible for `kind`.
///
/// `owner` restricts the update to reports assigned to that moderator.
pub async fn record_restoration(
    conn: &mut SqliteConnection,
    next: &Report,
    kind: RestoreKind,
    owner: Option<&str>,
) -> Result<bool> {
    let eligible = kind
        .eligible_actions()
        .iter()
        .map(|a| format!("'{}'", a.as_str()))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!(
        "UPDATE reports SET status = ?, updated_at = ?
         WHERE id = ? AND is_deleted = 0
           AND status = 'approved'
           AND action_taken IN ({})
           AND (? IS NULL OR assigned_moderator_id = ?)",
        eligible
    );
    let result = sqlx::query(&sql)
        .bind(next.status.as_str())
        .bind(format_timestamp(next.updated_at))
        .bind(&next.id)
        .bind(owner)
        .bind(owner)
        .execute(&mut *conn)
        .await
        .map_err(|e| TribunalError::Database(format!("Failed to restore report: {}", e)))?;

    Ok(result.rows_affected() == 1)
}

/// Explain why a conditional update matched no row.
///
/// Re-reads the report and replays the transition's checks against the fresh
/// copy. Call only after the failed transaction has been rolled back.
pub(crate) async fn explain_conflict<F>(db: &Database, report_id: &str, recheck: F) -> TribunalError
where
    F: FnOnce(&Report) -> Result<Report>,
{
    match db.get_report(report_id).await {
        Ok(Some(current)) => match recheck(&current) {
            Err(e) => e,
            Ok(_) => TribunalError::InternalState(format!(
                "Conditional update on report {} matched no row",
                report_id
            )),
        },
        Ok(None) => TribunalError::NotFound(report_id.to_string()),
        Err(e) => e,
    }
}

/// Database schema SQL.
const SCHEMA: &str = r#"
-- Reports
CREATE TABLE IF NOT EXISTS reports (
    id TEXT PRIMARY KEY,
    reporter_id TEXT NOT NULL,
    reported_user_id TEXT NOT NULL,
    report_type TEXT NOT NULL,
    related_content_type TEXT,
    related_content_id TEXT,
    description TEXT NOT NULL,
    evidences TEXT NOT NULL DEFAULT '[]',
    status TEXT NOT NULL DEFAULT 'pending',
    priority TEXT NOT NULL DEFAULT 'medium',
    assigned_moderator_id TEXT,
    action_taken TEXT,
    note TEXT,
    suspension_days INTEGER CHECK (suspension_days IS NULL OR suspension_days BETWEEN 1 AND 365),
    restriction_action_details TEXT NOT NULL DEFAULT '[]',
    resolved_at TEXT,
    is_deleted INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

-- Account-level restriction, one row per user
CREATE TABLE IF NOT EXISTS user_restrictions (
    user_id TEXT PRIMARY KEY,
    restriction_type TEXT NOT NULL DEFAULT 'none',
    action TEXT,
    reason TEXT,
    restricted_at TEXT,
    expires_at TEXT,
    source_report_id TEXT,
    lifted_at TEXT,
    lifted_by TEXT
);

-- Per-capability restrictions
CREATE TABLE IF NOT EXISTS capability_restrictions (
    user_id TEXT NOT NULL,
    restriction_action TEXT NOT NULL,
    note TEXT,
    source_report_id TEXT NOT NULL,
    restricted_at TEXT NOT NULL,
    lifted_at TEXT,
    PRIMARY KEY (user_id, restriction_action)
);

-- Content visibility decided by moderation
CREATE TABLE IF NOT EXISTS content_moderation (
    content_type TEXT NOT NULL,
    content_id TEXT NOT NULL,
    hidden INTEGER NOT NULL DEFAULT 1,
    source_report_id TEXT NOT NULL,
    hidden_at TEXT NOT NULL,
    restored_at TEXT,
    PRIMARY KEY (content_type, content_id)
);

-- Workflow audit trail
CREATE TABLE IF NOT EXISTS report_audit_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    report_id TEXT NOT NULL,
    actor_id TEXT NOT NULL,
    transition TEXT NOT NULL,
    from_status TEXT,
    to_status TEXT NOT NULL,
    action TEXT,
    note TEXT,
    timestamp TEXT NOT NULL
);

CREATE TRIGGER IF NOT EXISTS report_audit_log_no_update
BEFORE UPDATE ON report_audit_log
BEGIN
    SELECT RAISE(ABORT, 'report_audit_log is append-only');
END;

CREATE TRIGGER IF NOT EXISTS report_audit_log_no_delete
BEFORE DELETE ON report_audit_log
BEGIN
    SELECT RAISE(ABORT, 'report_audit_log is append-only');
END;

CREATE INDEX IF NOT EXISTS idx_reports_status ON reports(status, created_at DESC);
CREATE INDEX IF NOT EXISTS idx_reports_moderator ON reports(assigned_moderator_id);
CREATE INDEX IF NOT EXISTS idx_reports_content ON reports(related_content_type, related_content_id);
CREATE INDEX IF NOT EXISTS idx_reports_reported_user ON reports(reported_user_id);
CREATE INDEX IF NOT EXISTS idx_audit_report ON report_audit_log(report_id, id);
"#;
