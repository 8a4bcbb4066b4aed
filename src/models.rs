//! Core data models for Tribunal.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What a report complains about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportType {
    Harassment,
    Spam,
    CopyrightViolation,
    InappropriateContent,
    HateSpeech,
    Impersonation,
    Fraud,
    Other,
}

impl ReportType {
    pub const ALL: [ReportType; 8] = [
        Self::Harassment,
        Self::Spam,
        Self::CopyrightViolation,
        Self::InappropriateContent,
        Self::HateSpeech,
        Self::Impersonation,
        Self::Fraud,
        Self::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Harassment => "harassment",
            Self::Spam => "spam",
            Self::CopyrightViolation => "copyright_violation",
            Self::InappropriateContent => "inappropriate_content",
            Self::HateSpeech => "hate_speech",
            Self::Impersonation => "impersonation",
            Self::Fraud => "fraud",
            Self::Other => "other",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == s)
    }

    /// Human-readable label, used as the fallback restriction reason.
    pub fn description(&self) -> &'static str {
        match self {
            Self::Harassment => "Harassment",
            Self::Spam => "Spam",
            Self::CopyrightViolation => "Copyright violation",
            Self::InappropriateContent => "Inappropriate content",
            Self::HateSpeech => "Hate speech",
            Self::Impersonation => "Impersonation",
            Self::Fraud => "Fraud",
            Self::Other => "Other",
        }
    }
}

/// Kind of content a report may point at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelatedContentType {
    Track,
    Comment,
    Request,
    Artist,
    Listener,
}

impl RelatedContentType {
    pub const ALL: [RelatedContentType; 5] = [
        Self::Track,
        Self::Comment,
        Self::Request,
        Self::Artist,
        Self::Listener,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Track => "track",
            Self::Comment => "comment",
            Self::Request => "request",
            Self::Artist => "artist",
            Self::Listener => "listener",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == s)
    }
}

/// Position of a report in the moderation workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    Pending,
    UnderReview,
    Approved,
    Rejected,
    Dismissed,
    Escalated,
    Restored,
}

impl ReportStatus {
    pub const ALL: [ReportStatus; 7] = [
        Self::Pending,
        Self::UnderReview,
        Self::Approved,
        Self::Rejected,
        Self::Dismissed,
        Self::Escalated,
        Self::Restored,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::UnderReview => "under_review",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Dismissed => "dismissed",
            Self::Escalated => "escalated",
            Self::Restored => "restored",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == s)
    }

    /// Still awaiting adjudication.
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Pending | Self::UnderReview)
    }

    /// Reached through `process` (Restored reports were Approved first).
    pub fn is_adjudicated(&self) -> bool {
        matches!(
            self,
            Self::Approved | Self::Rejected | Self::Dismissed | Self::Restored
        )
    }
}

impl fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Informational severity label. Not part of the transition logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportPriority {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl ReportPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            "critical" => Some(Self::Critical),
            _ => None,
        }
    }
}

/// Adjudication decision recorded on a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportAction {
    NoAction,
    Warning,
    Suspended,
    EntitlementRestriction,
    ContentRemoval,
    PermanentBan,
}

impl ReportAction {
    pub const ALL: [ReportAction; 6] = [
        Self::NoAction,
        Self::Warning,
        Self::Suspended,
        Self::EntitlementRestriction,
        Self::ContentRemoval,
        Self::PermanentBan,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoAction => "no_action",
            Self::Warning => "warning",
            Self::Suspended => "suspended",
            Self::EntitlementRestriction => "entitlement_restriction",
            Self::ContentRemoval => "content_removal",
            Self::PermanentBan => "permanent_ban",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == s)
    }

    /// Actions that leave a standing restriction behind when approved.
    pub fn is_enforced(&self) -> bool {
        !matches!(self, Self::NoAction | Self::Warning)
    }
}

impl fmt::Display for ReportAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A capability that an entitlement restriction can revoke.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestrictionAction {
    None,
    Comment,
    CreateRequest,
    CreateDirectRequest,
    UploadTrack,
    Report,
}

impl RestrictionAction {
    pub const ALL: [RestrictionAction; 6] = [
        Self::None,
        Self::Comment,
        Self::CreateRequest,
        Self::CreateDirectRequest,
        Self::UploadTrack,
        Self::Report,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Comment => "comment",
            Self::CreateRequest => "create_request",
            Self::CreateDirectRequest => "create_direct_request",
            Self::UploadTrack => "upload_track",
            Self::Report => "report",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == s)
    }
}

/// One revoked capability in an entitlement restriction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestrictionActionDetail {
    pub restriction_action: RestrictionAction,
    #[serde(default)]
    pub note: Option<String>,
}

/// Coarse account restriction level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RestrictionType {
    #[default]
    None,
    Suspended,
    Banned,
}

impl RestrictionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Suspended => "suspended",
            Self::Banned => "banned",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "none" => Some(Self::None),
            "suspended" => Some(Self::Suspended),
            "banned" => Some(Self::Banned),
            _ => None,
        }
    }
}

/// Reference to a piece of content held by the content store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentRef {
    pub content_type: RelatedContentType,
    pub content_id: String,
}

/// The authenticated moderator performing an operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActorContext {
    pub actor_id: String,
}

impl ActorContext {
    pub fn new(actor_id: impl Into<String>) -> Self {
        Self {
            actor_id: actor_id.into(),
        }
    }
}

/// A user-submitted complaint about another user or a piece of content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub id: String,
    pub reporter_id: String,
    pub reported_user_id: String,
    pub report_type: ReportType,
    pub related_content_type: Option<RelatedContentType>,
    pub related_content_id: Option<String>,
    pub description: String,
    pub evidences: Vec<String>,
    pub status: ReportStatus,
    pub priority: ReportPriority,
    pub assigned_moderator_id: Option<String>,
    pub action_taken: Option<ReportAction>,
    pub note: Option<String>,
    pub suspension_days: Option<u16>,
    pub restriction_action_details: Vec<RestrictionActionDetail>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub is_deleted: bool,
    /// Non-deleted reports against the same reported user, derived on read.
    pub total_reports_count: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Report {
    /// The content item this report points at, if any.
    pub fn related_content(&self) -> Option<ContentRef> {
        match (self.related_content_type, &self.related_content_id) {
            (Some(content_type), Some(content_id)) => Some(ContentRef {
                content_type,
                content_id: content_id.clone(),
            }),
            _ => None,
        }
    }

    pub fn is_assigned_to(&self, actor_id: &str) -> bool {
        self.assigned_moderator_id.as_deref() == Some(actor_id)
    }

    /// Whether an approved adjudication on this report leaves a restriction to apply.
    pub fn needs_enforcement(&self) -> bool {
        self.status == ReportStatus::Approved
            && self.action_taken.is_some_and(|action| action.is_enforced())
    }

    /// Reason recorded on the restriction created from this report.
    pub fn restriction_reason(&self) -> String {
        self.note
            .clone()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| self.report_type.description().to_string())
    }
}

/// Account-level restriction owned by the user record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Restriction {
    pub user_id: String,
    pub restriction_type: RestrictionType,
    pub action: Option<ReportAction>,
    pub reason: Option<String>,
    pub restricted_at: Option<DateTime<Utc>>,
    /// Suspension end; `None` for bans and for unrestricted users.
    pub expires_at: Option<DateTime<Utc>>,
    pub source_report_id: Option<String>,
    pub lifted_at: Option<DateTime<Utc>>,
    pub lifted_by: Option<String>,
}

impl Restriction {
    /// A user with no restriction on record.
    pub fn none(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            restriction_type: RestrictionType::None,
            action: None,
            reason: None,
            restricted_at: None,
            expires_at: None,
            source_report_id: None,
            lifted_at: None,
            lifted_by: None,
        }
    }

    /// Suspensions lapse on their own once `expires_at` passes.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        match self.restriction_type {
            RestrictionType::None => false,
            RestrictionType::Banned => true,
            RestrictionType::Suspended => self.expires_at.is_some_and(|exp| exp > now),
        }
    }

    /// The restriction type currently in force.
    pub fn effective_type(&self, now: DateTime<Utc>) -> RestrictionType {
        if self.is_active(now) {
            self.restriction_type
        } else {
            RestrictionType::None
        }
    }
}

/// A single revoked capability for a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityRestriction {
    pub user_id: String,
    pub restriction_action: RestrictionAction,
    pub note: Option<String>,
    pub source_report_id: String,
    pub restricted_at: DateTime<Utc>,
    pub lifted_at: Option<DateTime<Utc>>,
}

/// Visibility state of a content item as decided by moderation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentModeration {
    pub content: ContentRef,
    pub hidden: bool,
    pub source_report_id: String,
    pub hidden_at: DateTime<Utc>,
    pub restored_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use crate::models::{
        ReportAction, ReportStatus, ReportType, Restriction, RestrictionAction, RestrictionType,
    };

    #[test]
    fn enum_strings_round_trip() {
        for status in ReportStatus::ALL {
            assert_eq!(ReportStatus::parse(status.as_str()), Some(status));
        }
        for action in ReportAction::ALL {
            assert_eq!(ReportAction::parse(action.as_str()), Some(action));
        }
        for capability in RestrictionAction::ALL {
            assert_eq!(RestrictionAction::parse(capability.as_str()), Some(capability));
        }
        for report_type in ReportType::ALL {
            assert_eq!(ReportType::parse(report_type.as_str()), Some(report_type));
        }
        assert_eq!(ReportStatus::parse("unknown"), None);
    }

    #[test]
    fn serde_names_match_storage_names() {
        let json = serde_json::to_string(&ReportAction::EntitlementRestriction).unwrap();
        assert_eq!(json, "\"entitlement_restriction\"");
        let json = serde_json::to_string(&ReportStatus::UnderReview).unwrap();
        assert_eq!(json, "\"under_review\"");
    }

    #[test]
    fn open_and_adjudicated_statuses() {
        assert!(ReportStatus::Pending.is_open());
        assert!(ReportStatus::UnderReview.is_open());
        assert!(!ReportStatus::Escalated.is_open());
        assert!(!ReportStatus::Escalated.is_adjudicated());
        assert!(ReportStatus::Restored.is_adjudicated());
    }

    #[test]
    fn warning_and_no_action_are_not_enforced() {
        assert!(!ReportAction::NoAction.is_enforced());
        assert!(!ReportAction::Warning.is_enforced());
        assert!(ReportAction::Suspended.is_enforced());
        assert!(ReportAction::ContentRemoval.is_enforced());
    }

    #[test]
    fn suspension_lapses_after_expiry() {
        let now = Utc::now();
        let mut restriction = Restriction::none("u1");
        restriction.restriction_type = RestrictionType::Suspended;
        restriction.expires_at = Some(now + Duration::days(1));

        assert!(restriction.is_active(now));
        assert_eq!(
            restriction.effective_type(now + Duration::days(2)),
            RestrictionType::None
        );
    }

    #[test]
    fn ban_never_lapses() {
        let mut restriction = Restriction::none("u1");
        restriction.restriction_type = RestrictionType::Banned;
        assert!(restriction.is_active(Utc::now() + Duration::days(10_000)));
    }
}
