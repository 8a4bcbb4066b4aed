//! Report workflow transitions.
//!
//! Every transition is a pure function of the current report and a command,
//! returning the next report or a typed rejection. Persistence, audit and
//! events live in the services that call these functions.
//!
//! ```text
//! Pending ──assign──▶ UnderReview ──process──▶ Approved ──restore──▶ Restored
//!                                          └──▶ Rejected | Dismissed
//! ```

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TribunalError};
use crate::models::{
    ActorContext, RelatedContentType, Report, ReportAction, ReportPriority, ReportStatus,
    ReportType, RestrictionActionDetail,
};
use crate::policy::{self, SuppliedFields};

/// Input for filing a new report.
#[derive(Debug, Clone, Deserialize)]
pub struct NewReport {
    pub reporter_id: String,
    pub reported_user_id: String,
    pub report_type: ReportType,
    #[serde(default)]
    pub related_content_type: Option<RelatedContentType>,
    #[serde(default)]
    pub related_content_id: Option<String>,
    pub description: String,
    #[serde(default)]
    pub evidences: Vec<String>,
    #[serde(default)]
    pub priority: Option<ReportPriority>,
}

/// A moderator's adjudication of a report.
#[derive(Debug, Clone, Deserialize)]
pub struct ProcessCommand {
    pub action: ReportAction,
    pub status: ReportStatus,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub suspension_days: Option<i32>,
    #[serde(default)]
    pub restriction_action_details: Vec<RestrictionActionDetail>,
}

/// Which restriction a restore reverses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestoreKind {
    User,
    Content,
}

impl RestoreKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Content => "content",
        }
    }

    /// Actions whose restriction this kind of restore reverses.
    pub fn eligible_actions(&self) -> &'static [ReportAction] {
        match self {
            Self::User => &[
                ReportAction::Suspended,
                ReportAction::PermanentBan,
                ReportAction::EntitlementRestriction,
            ],
            Self::Content => &[ReportAction::ContentRemoval],
        }
    }
}

/// Ownership rules for restores.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestorePolicy {
    /// Content restores always require ownership; user restores only when set.
    pub require_owner_for_user_restore: bool,
}

impl Default for RestorePolicy {
    fn default() -> Self {
        Self {
            require_owner_for_user_restore: true,
        }
    }
}

impl RestorePolicy {
    pub fn requires_owner(&self, kind: RestoreKind) -> bool {
        match kind {
            RestoreKind::User => self.require_owner_for_user_restore,
            RestoreKind::Content => true,
        }
    }
}

/// Evidence must be an absolute http(s) URL.
const EVIDENCE_URL_PATTERN: &str = r"^https?://[^\s/$.?#][^\s]*$";

static EVIDENCE_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(EVIDENCE_URL_PATTERN).expect("Invalid evidence URL regex"));

fn required_text(value: &str, field: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(TribunalError::Validation(format!("{} must not be empty", field)));
    }
    Ok(trimmed.to_string())
}

/// File a new report. The result is Pending with no action recorded.
pub fn create(input: NewReport, id: String, now: DateTime<Utc>) -> Result<Report> {
    let reporter_id = required_text(&input.reporter_id, "reporter_id")?;
    let reported_user_id = required_text(&input.reported_user_id, "reported_user_id")?;
    let description = required_text(&input.description, "description")?;

    if reporter_id == reported_user_id {
        return Err(TribunalError::Validation(
            "reporter cannot report themselves".to_string(),
        ));
    }

    let related_content_id = input
        .related_content_id
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty());
    if input.related_content_type.is_some() != related_content_id.is_some() {
        return Err(TribunalError::Validation(
            "related_content_type and related_content_id must be given together".to_string(),
        ));
    }

    let mut evidences = Vec::with_capacity(input.evidences.len());
    for evidence in input.evidences {
        let evidence = evidence.trim().to_string();
        if !EVIDENCE_URL.is_match(&evidence) {
            return Err(TribunalError::Validation(format!(
                "evidence is not an http(s) URL: {}",
                evidence
            )));
        }
        evidences.push(evidence);
    }

    Ok(Report {
        id,
        reporter_id,
        reported_user_id,
        report_type: input.report_type,
        related_content_type: input.related_content_type,
        related_content_id,
        description,
        evidences,
        status: ReportStatus::Pending,
        priority: input.priority.unwrap_or_default(),
        assigned_moderator_id: None,
        action_taken: None,
        note: None,
        suspension_days: None,
        restriction_action_details: Vec::new(),
        resolved_at: None,
        is_deleted: false,
        total_reports_count: 0,
        created_at: now,
        updated_at: now,
    })
}

/// Claim an open, unowned report for a moderator.
pub fn assign(report: &Report, moderator_id: &str, now: DateTime<Utc>) -> Result<Report> {
    let moderator_id = required_text(moderator_id, "moderator_id")?;

    if report.assigned_moderator_id.is_some() {
        return Err(TribunalError::AlreadyAssigned {
            report_id: report.id.clone(),
        });
    }
    if !report.status.is_open() {
        return Err(TribunalError::AlreadyAdjudicated {
            report_id: report.id.clone(),
            status: report.status,
        });
    }

    let mut next = report.clone();
    next.assigned_moderator_id = Some(moderator_id);
    next.status = ReportStatus::UnderReview;
    next.updated_at = now;
    Ok(next)
}

/// Adjudicate a report owned by the actor.
pub fn process(
    report: &Report,
    actor: &ActorContext,
    command: &ProcessCommand,
    now: DateTime<Utc>,
) -> Result<Report> {
    if !report.is_assigned_to(&actor.actor_id) {
        return Err(TribunalError::NotAssignedToActor {
            report_id: report.id.clone(),
            actor_id: actor.actor_id.clone(),
        });
    }
    if !report.status.is_open() {
        return Err(TribunalError::AlreadyAdjudicated {
            report_id: report.id.clone(),
            status: report.status,
        });
    }

    policy::validate(
        command.action,
        command.status,
        &SuppliedFields {
            suspension_days: command.suspension_days,
            restriction_action_details: &command.restriction_action_details,
            has_related_content: report.related_content().is_some(),
        },
    )?;

    let suspension_days = match command.suspension_days {
        Some(days) => Some(u16::try_from(days).map_err(|_| {
            TribunalError::InternalState(format!("validated suspension out of range: {}", days))
        })?),
        None => None,
    };

    let mut next = report.clone();
    next.action_taken = Some(command.action);
    next.status = command.status;
    next.note = command
        .note
        .as_ref()
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty());
    next.suspension_days = suspension_days;
    next.restriction_action_details = command.restriction_action_details.clone();
    next.resolved_at = Some(now);
    next.updated_at = now;
    Ok(next)
}

/// Close an approved, enforced report by reversing its restriction.
pub fn restore(
    report: &Report,
    actor: &ActorContext,
    kind: RestoreKind,
    restore_policy: RestorePolicy,
    now: DateTime<Utc>,
) -> Result<Report> {
    if report.status == ReportStatus::Restored {
        return Err(TribunalError::AlreadyRestored {
            report_id: report.id.clone(),
        });
    }
    if report.status != ReportStatus::Approved {
        return Err(TribunalError::IneligibleForRestore {
            report_id: report.id.clone(),
            reason: format!("status is {}, expected approved", report.status),
        });
    }
    let eligible = report
        .action_taken
        .is_some_and(|action| kind.eligible_actions().contains(&action));
    if !eligible {
        return Err(TribunalError::IneligibleForRestore {
            report_id: report.id.clone(),
            reason: format!(
                "action {} cannot be reversed by a {} restore",
                report.action_taken.map(|a| a.as_str()).unwrap_or("none"),
                kind.as_str()
            ),
        });
    }
    if restore_policy.requires_owner(kind) && !report.is_assigned_to(&actor.actor_id) {
        return Err(TribunalError::NotAssignedToActor {
            report_id: report.id.clone(),
            actor_id: actor.actor_id.clone(),
        });
    }

    let mut next = report.clone();
    next.status = ReportStatus::Restored;
    next.updated_at = now;
    Ok(next)
}
