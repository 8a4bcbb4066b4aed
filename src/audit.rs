//! Append-only audit trail of report transitions.
//!
//! Entries are written inside the same transaction as the transition they
//! describe. The table rejects updates and deletes at the database level.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::sqlite::SqliteConnection;
use sqlx::Row;

use crate::database::{format_timestamp, parse_timestamp, Database};
use crate::error::{Result, TribunalError};
use crate::models::{Report, ReportAction, ReportStatus};
use crate::state_machine::RestoreKind;

/// Kind of workflow step an audit entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Transition {
    Created,
    Assigned,
    Processed,
    RestoredUser,
    RestoredContent,
}

impl Transition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Assigned => "assigned",
            Self::Processed => "processed",
            Self::RestoredUser => "restored_user",
            Self::RestoredContent => "restored_content",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "created" => Some(Self::Created),
            "assigned" => Some(Self::Assigned),
            "processed" => Some(Self::Processed),
            "restored_user" => Some(Self::RestoredUser),
            "restored_content" => Some(Self::RestoredContent),
            _ => None,
        }
    }

    pub fn restored(kind: RestoreKind) -> Self {
        match kind {
            RestoreKind::User => Self::RestoredUser,
            RestoreKind::Content => Self::RestoredContent,
        }
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One recorded transition.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditEntry {
    /// Row id, assigned on append.
    pub id: i64,
    pub report_id: String,
    pub actor_id: String,
    pub transition: Transition,
    pub from_status: Option<ReportStatus>,
    pub to_status: ReportStatus,
    pub action: Option<ReportAction>,
    pub note: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl AuditEntry {
    /// Describe the move from `before` (absent for creation) to `after`.
    pub fn for_transition(
        transition: Transition,
        actor_id: &str,
        before: Option<&Report>,
        after: &Report,
    ) -> Self {
        let action = match transition {
            Transition::Created | Transition::Assigned => None,
            _ => after.action_taken,
        };
        let note = match transition {
            Transition::Processed => after.note.clone(),
            _ => None,
        };

        Self {
            id: 0,
            report_id: after.id.clone(),
            actor_id: actor_id.to_string(),
            transition,
            from_status: before.map(|r| r.status),
            to_status: after.status,
            action,
            note,
            timestamp: after.updated_at,
        }
    }
}

/// Read access to the audit log. Writes go through [`AuditTrail::append`].
pub struct AuditTrail {
    db: Arc<Database>,
}

impl AuditTrail {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Append an entry on the caller's connection. Returns the new row id.
    pub async fn append(conn: &mut SqliteConnection, entry: &AuditEntry) -> Result<i64> {
        let result = sqlx::query(
            "INSERT INTO report_audit_log
                 (report_id, actor_id, transition, from_status, to_status, action, note, timestamp)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&entry.report_id)
        .bind(&entry.actor_id)
        .bind(entry.transition.as_str())
        .bind(entry.from_status.map(|s| s.as_str()))
        .bind(entry.to_status.as_str())
        .bind(entry.action.map(|a| a.as_str()))
        .bind(&entry.note)
        .bind(format_timestamp(entry.timestamp))
        .execute(&mut *conn)
        .await
        .map_err(|e| TribunalError::Database(format!("Failed to append audit entry: {}", e)))?;

        tracing::debug!(
            report_id = %entry.report_id,
            actor_id = %entry.actor_id,
            transition = %entry.transition,
            "Audit entry recorded"
        );

        Ok(result.last_insert_rowid())
    }

    /// All entries for a report, oldest first.
    pub async fn entries_for_report(&self, report_id: &str) -> Result<Vec<AuditEntry>> {
        let rows = sqlx::query(
            "SELECT id, report_id, actor_id, transition, from_status, to_status, action, note, timestamp
             FROM report_audit_log WHERE report_id = ?
             ORDER BY id ASC",
        )
        .bind(report_id)
        .fetch_all(self.db.pool())
        .await
        .map_err(|e| TribunalError::Database(format!("Failed to get audit entries: {}", e)))?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            let transition: String = row.get("transition");
            let from_status: Option<String> = row.get("from_status");
            let to_status: String = row.get("to_status");
            let action: Option<String> = row.get("action");

            entries.push(AuditEntry {
                id: row.get("id"),
                report_id: row.get("report_id"),
                actor_id: row.get("actor_id"),
                transition: Transition::parse(&transition).ok_or_else(|| {
                    TribunalError::Database(format!("Invalid transition: {}", transition))
                })?,
                from_status: from_status
                    .map(|s| {
                        ReportStatus::parse(&s).ok_or_else(|| {
                            TribunalError::Database(format!("Invalid from_status: {}", s))
                        })
                    })
                    .transpose()?,
                to_status: ReportStatus::parse(&to_status).ok_or_else(|| {
                    TribunalError::Database(format!("Invalid to_status: {}", to_status))
                })?,
                action: action
                    .map(|a| {
                        ReportAction::parse(&a).ok_or_else(|| {
                            TribunalError::Database(format!("Invalid action: {}", a))
                        })
                    })
                    .transpose()?,
                note: row.get("note"),
                timestamp: parse_timestamp(row.get("timestamp"), "timestamp")?,
            });
        }

        Ok(entries)
    }
}
