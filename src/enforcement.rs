//! Restriction enforcement.
//!
//! Turns an approved adjudication into restriction records and lifts them
//! again on restore. Records are keyed by their target (user, capability or
//! content item) and tagged with the report that produced them. All
//! timestamps come from the report's `resolved_at`, so enforcing the same
//! report twice writes the same rows.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use sqlx::sqlite::{SqliteConnection, SqliteRow};
use sqlx::Row;

use crate::database::{
    self, format_timestamp, parse_optional_timestamp, parse_timestamp, Database,
};
use crate::error::{Result, TribunalError};
use crate::models::{
    CapabilityRestriction, ContentModeration, ContentRef, RelatedContentType, Report,
    ReportAction, Restriction, RestrictionAction, RestrictionType,
};
use crate::state_machine::RestoreKind;

/// Applies and lifts restrictions produced by adjudicated reports.
pub struct RestrictionEnforcer {
    db: Arc<Database>,
}

impl RestrictionEnforcer {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Enforce a report in its own transaction.
    ///
    /// Standalone entry point for re-applying an already adjudicated report
    /// outside the processing workflow; `process_report` enforces through
    /// [`Self::enforce_in`] inside its own transaction.
    pub async fn enforce(&self, report: &Report) -> Result<()> {
        let mut tx = self
            .db
            .pool()
            .begin()
            .await
            .map_err(|e| TribunalError::Database(format!("Failed to begin transaction: {}", e)))?;

        Self::enforce_in(&mut tx, report).await?;

        tx.commit()
            .await
            .map_err(|e| TribunalError::Database(format!("Failed to commit enforcement: {}", e)))?;

        Ok(())
    }

    /// Enforce a report on the caller's connection.
    ///
    /// Reports that are not approved with an enforced action are a no-op.
    pub async fn enforce_in(conn: &mut SqliteConnection, report: &Report) -> Result<()> {
        let Some(action) = report.action_taken.filter(|_| report.needs_enforcement()) else {
            tracing::debug!(report_id = %report.id, "Nothing to enforce");
            return Ok(());
        };
        let resolved_at = report.resolved_at.ok_or_else(|| {
            TribunalError::InternalState(format!("Approved report {} has no resolved_at", report.id))
        })?;

        match action {
            ReportAction::Suspended | ReportAction::PermanentBan => {
                let (restriction_type, expires_at) = account_terms(report, resolved_at)?;
                upsert_user_restriction(conn, report, restriction_type, resolved_at, expires_at)
                    .await?;
            }
            ReportAction::EntitlementRestriction => {
                for detail in &report.restriction_action_details {
                    upsert_capability_restriction(
                        conn,
                        report,
                        detail.restriction_action,
                        detail.note.as_deref(),
                        resolved_at,
                    )
                    .await?;
                }
            }
            ReportAction::ContentRemoval => {
                let content = report.related_content().ok_or_else(|| {
                    TribunalError::InternalState(format!(
                        "Content removal on report {} has no related content",
                        report.id
                    ))
                })?;
                hide_content(conn, report, &content, resolved_at).await?;
            }
            ReportAction::NoAction | ReportAction::Warning => {}
        }

        tracing::info!(
            report_id = %report.id,
            user_id = %report.reported_user_id,
            action = %action,
            "Restriction enforced"
        );

        Ok(())
    }

    /// Lift what `report` put in place, on the caller's connection.
    ///
    /// Records that a later report has since replaced are left alone. Lifting
    /// a suspension or ban falls back to the strongest one still standing.
    /// Returns the number of records lifted.
    pub async fn lift_in(
        conn: &mut SqliteConnection,
        report: &Report,
        kind: RestoreKind,
        actor_id: &str,
        now: DateTime<Utc>,
    ) -> Result<u64> {
        let lifted_at = format_timestamp(now);

        let result = match (kind, report.action_taken) {
            (RestoreKind::User, Some(ReportAction::Suspended | ReportAction::PermanentBan)) => {
                sqlx::query(
                    "UPDATE user_restrictions
                     SET restriction_type = 'none', lifted_at = ?, lifted_by = ?
                     WHERE user_id = ? AND source_report_id = ? AND lifted_at IS NULL",
                )
                .bind(&lifted_at)
                .bind(actor_id)
                .bind(&report.reported_user_id)
                .bind(&report.id)
                .execute(&mut *conn)
                .await
            }
            (RestoreKind::User, Some(ReportAction::EntitlementRestriction)) => {
                sqlx::query(
                    "UPDATE capability_restrictions SET lifted_at = ?
                     WHERE user_id = ? AND source_report_id = ? AND lifted_at IS NULL",
                )
                .bind(&lifted_at)
                .bind(&report.reported_user_id)
                .bind(&report.id)
                .execute(&mut *conn)
                .await
            }
            (RestoreKind::Content, Some(ReportAction::ContentRemoval)) => {
                let content = report.related_content().ok_or_else(|| {
                    TribunalError::InternalState(format!(
                        "Content removal on report {} has no related content",
                        report.id
                    ))
                })?;
                sqlx::query(
                    "UPDATE content_moderation SET hidden = 0, restored_at = ?
                     WHERE content_type = ? AND content_id = ?
                       AND source_report_id = ? AND hidden = 1",
                )
                .bind(&lifted_at)
                .bind(content.content_type.as_str())
                .bind(&content.content_id)
                .bind(&report.id)
                .execute(&mut *conn)
                .await
            }
            _ => {
                return Err(TribunalError::InternalState(format!(
                    "Report {} has nothing to lift for a {} restore",
                    report.id,
                    kind.as_str()
                )))
            }
        }
        .map_err(|e| TribunalError::Database(format!("Failed to lift restriction: {}", e)))?;

        let lifted = result.rows_affected();
        if lifted > 0
            && kind == RestoreKind::User
            && matches!(
                report.action_taken,
                Some(ReportAction::Suspended | ReportAction::PermanentBan)
            )
        {
            reinstate_account_restriction(conn, &report.reported_user_id).await?;
        }

        if lifted == 0 {
            tracing::warn!(
                report_id = %report.id,
                user_id = %report.reported_user_id,
                kind = kind.as_str(),
                "Restriction already superseded, nothing lifted"
            );
        } else {
            tracing::info!(
                report_id = %report.id,
                user_id = %report.reported_user_id,
                actor_id = %actor_id,
                kind = kind.as_str(),
                lifted,
                "Restriction lifted"
            );
        }

        Ok(lifted)
    }

    // ========== Restriction reads ==========

    /// The stored account restriction for a user, or an empty one.
    ///
    /// Suspensions are not rewritten on expiry; use
    /// [`Restriction::effective_type`] to see what is in force.
    pub async fn get_restriction(&self, user_id: &str) -> Result<Restriction> {
        let row = sqlx::query(
            "SELECT user_id, restriction_type, action, reason, restricted_at, expires_at,
                    source_report_id, lifted_at, lifted_by
             FROM user_restrictions WHERE user_id = ?",
        )
        .bind(user_id)
        .fetch_optional(self.db.pool())
        .await
        .map_err(|e| TribunalError::Database(format!("Failed to get restriction: {}", e)))?;

        match row {
            Some(row) => restriction_from_row(&row),
            None => Ok(Restriction::none(user_id)),
        }
    }

    /// The restriction type in force for a user at `now`.
    pub async fn effective_restriction(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<RestrictionType> {
        Ok(self.get_restriction(user_id).await?.effective_type(now))
    }

    /// Capabilities currently revoked for a user.
    pub async fn active_capability_restrictions(
        &self,
        user_id: &str,
    ) -> Result<Vec<CapabilityRestriction>> {
        let rows = sqlx::query(
            "SELECT user_id, restriction_action, note, source_report_id, restricted_at, lifted_at
             FROM capability_restrictions
             WHERE user_id = ? AND lifted_at IS NULL
             ORDER BY restriction_action",
        )
        .bind(user_id)
        .fetch_all(self.db.pool())
        .await
        .map_err(|e| {
            TribunalError::Database(format!("Failed to get capability restrictions: {}", e))
        })?;

        rows.iter().map(capability_from_row).collect()
    }

    pub async fn is_capability_restricted(
        &self,
        user_id: &str,
        capability: RestrictionAction,
    ) -> Result<bool> {
        let row = sqlx::query(
            "SELECT 1 FROM capability_restrictions
             WHERE user_id = ? AND restriction_action = ? AND lifted_at IS NULL",
        )
        .bind(user_id)
        .bind(capability.as_str())
        .fetch_optional(self.db.pool())
        .await
        .map_err(|e| {
            TribunalError::Database(format!("Failed to check capability restriction: {}", e))
        })?;

        Ok(row.is_some())
    }

    /// Moderation record for a content item, if moderation ever touched it.
    pub async fn content_moderation(&self, content: &ContentRef) -> Result<Option<ContentModeration>> {
        let row = sqlx::query(
            "SELECT content_type, content_id, hidden, source_report_id, hidden_at, restored_at
             FROM content_moderation WHERE content_type = ? AND content_id = ?",
        )
        .bind(content.content_type.as_str())
        .bind(&content.content_id)
        .fetch_optional(self.db.pool())
        .await
        .map_err(|e| TribunalError::Database(format!("Failed to get content moderation: {}", e)))?;

        row.as_ref().map(content_from_row).transpose()
    }

    pub async fn is_content_hidden(&self, content: &ContentRef) -> Result<bool> {
        Ok(self
            .content_moderation(content)
            .await?
            .is_some_and(|m| m.hidden))
    }
}

/// Restriction type and expiry an approved suspension or ban imposes.
fn account_terms(
    report: &Report,
    resolved_at: DateTime<Utc>,
) -> Result<(RestrictionType, Option<DateTime<Utc>>)> {
    match report.action_taken {
        Some(ReportAction::Suspended) => {
            let days = report.suspension_days.ok_or_else(|| {
                TribunalError::InternalState(format!(
                    "Suspension on report {} has no duration",
                    report.id
                ))
            })?;
            Ok((
                RestrictionType::Suspended,
                Some(resolved_at + Duration::days(i64::from(days))),
            ))
        }
        Some(ReportAction::PermanentBan) => Ok((RestrictionType::Banned, None)),
        other => Err(TribunalError::InternalState(format!(
            "Report {} carries no account restriction ({:?})",
            report.id, other
        ))),
    }
}

/// After a lift, put back the account restriction of the strongest report
/// still standing against the user, if any.
async fn reinstate_account_restriction(conn: &mut SqliteConnection, user_id: &str) -> Result<()> {
    let Some(standing) = database::standing_account_report(conn, user_id).await? else {
        return Ok(());
    };
    let resolved_at = standing.resolved_at.ok_or_else(|| {
        TribunalError::InternalState(format!("Approved report {} has no resolved_at", standing.id))
    })?;
    let (restriction_type, expires_at) = account_terms(&standing, resolved_at)?;

    sqlx::query(
        "UPDATE user_restrictions
         SET restriction_type = ?, action = ?, reason = ?, restricted_at = ?, expires_at = ?,
             source_report_id = ?, lifted_at = NULL, lifted_by = NULL
         WHERE user_id = ?",
    )
    .bind(restriction_type.as_str())
    .bind(standing.action_taken.map(|a| a.as_str()))
    .bind(standing.restriction_reason())
    .bind(format_timestamp(resolved_at))
    .bind(expires_at.map(format_timestamp))
    .bind(&standing.id)
    .bind(user_id)
    .execute(&mut *conn)
    .await
    .map_err(|e| TribunalError::Database(format!("Failed to reinstate restriction: {}", e)))?;

    tracing::info!(
        user_id = %user_id,
        source_report_id = %standing.id,
        restriction_type = restriction_type.as_str(),
        "Standing restriction reinstated"
    );

    Ok(())
}

/// Replace the user's account restriction unless a newer one is in place,
/// an unlifted ban would give way to a suspension, or this report's
/// restriction was already lifted.
async fn upsert_user_restriction(
    conn: &mut SqliteConnection,
    report: &Report,
    restriction_type: RestrictionType,
    restricted_at: DateTime<Utc>,
    expires_at: Option<DateTime<Utc>>,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO user_restrictions
             (user_id, restriction_type, action, reason, restricted_at, expires_at,
              source_report_id, lifted_at, lifted_by)
         VALUES (?, ?, ?, ?, ?, ?, ?, NULL, NULL)
         ON CONFLICT(user_id) DO UPDATE SET
             restriction_type = excluded.restriction_type,
             action = excluded.action,
             reason = excluded.reason,
             restricted_at = excluded.restricted_at,
             expires_at = excluded.expires_at,
             source_report_id = excluded.source_report_id,
             lifted_at = NULL,
             lifted_by = NULL
         WHERE (user_restrictions.restricted_at IS NULL
                OR user_restrictions.restricted_at <= excluded.restricted_at)
           AND NOT (user_restrictions.source_report_id IS excluded.source_report_id
                    AND user_restrictions.lifted_at IS NOT NULL)
           AND NOT (user_restrictions.restriction_type = 'banned'
                    AND user_restrictions.lifted_at IS NULL
                    AND excluded.restriction_type = 'suspended')",
    )
    .bind(&report.reported_user_id)
    .bind(restriction_type.as_str())
    .bind(report.action_taken.map(|a| a.as_str()))
    .bind(report.restriction_reason())
    .bind(format_timestamp(restricted_at))
    .bind(expires_at.map(format_timestamp))
    .bind(&report.id)
    .execute(&mut *conn)
    .await
    .map_err(|e| TribunalError::Database(format!("Failed to apply restriction: {}", e)))?;

    Ok(())
}

async fn upsert_capability_restriction(
    conn: &mut SqliteConnection,
    report: &Report,
    capability: RestrictionAction,
    note: Option<&str>,
    restricted_at: DateTime<Utc>,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO capability_restrictions
             (user_id, restriction_action, note, source_report_id, restricted_at, lifted_at)
         VALUES (?, ?, ?, ?, ?, NULL)
         ON CONFLICT(user_id, restriction_action) DO UPDATE SET
             note = excluded.note,
             source_report_id = excluded.source_report_id,
             restricted_at = excluded.restricted_at,
             lifted_at = NULL
         WHERE capability_restrictions.restricted_at <= excluded.restricted_at
           AND NOT (capability_restrictions.source_report_id = excluded.source_report_id
                    AND capability_restrictions.lifted_at IS NOT NULL)",
    )
    .bind(&report.reported_user_id)
    .bind(capability.as_str())
    .bind(note)
    .bind(&report.id)
    .bind(format_timestamp(restricted_at))
    .execute(&mut *conn)
    .await
    .map_err(|e| {
        TribunalError::Database(format!("Failed to apply capability restriction: {}", e))
    })?;

    Ok(())
}

async fn hide_content(
    conn: &mut SqliteConnection,
    report: &Report,
    content: &ContentRef,
    hidden_at: DateTime<Utc>,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO content_moderation
             (content_type, content_id, hidden, source_report_id, hidden_at, restored_at)
         VALUES (?, ?, 1, ?, ?, NULL)
         ON CONFLICT(content_type, content_id) DO UPDATE SET
             hidden = 1,
             source_report_id = excluded.source_report_id,
             hidden_at = excluded.hidden_at,
             restored_at = NULL
         WHERE content_moderation.hidden_at <= excluded.hidden_at
           AND NOT (content_moderation.source_report_id = excluded.source_report_id
                    AND content_moderation.restored_at IS NOT NULL)",
    )
    .bind(content.content_type.as_str())
    .bind(&content.content_id)
    .bind(&report.id)
    .bind(format_timestamp(hidden_at))
    .execute(&mut *conn)
    .await
    .map_err(|e| TribunalError::Database(format!("Failed to hide content: {}", e)))?;

    Ok(())
}

fn restriction_from_row(row: &SqliteRow) -> Result<Restriction> {
    let restriction_type: String = row.get("restriction_type");
    let action: Option<String> = row.get("action");

    Ok(Restriction {
        user_id: row.get("user_id"),
        restriction_type: RestrictionType::parse(&restriction_type).ok_or_else(|| {
            TribunalError::Database(format!("Invalid restriction_type: {}", restriction_type))
        })?,
        action: action
            .map(|a| {
                ReportAction::parse(&a)
                    .ok_or_else(|| TribunalError::Database(format!("Invalid action: {}", a)))
            })
            .transpose()?,
        reason: row.get("reason"),
        restricted_at: parse_optional_timestamp(row.get("restricted_at"), "restricted_at")?,
        expires_at: parse_optional_timestamp(row.get("expires_at"), "expires_at")?,
        source_report_id: row.get("source_report_id"),
        lifted_at: parse_optional_timestamp(row.get("lifted_at"), "lifted_at")?,
        lifted_by: row.get("lifted_by"),
    })
}

fn capability_from_row(row: &SqliteRow) -> Result<CapabilityRestriction> {
    let capability: String = row.get("restriction_action");

    Ok(CapabilityRestriction {
        user_id: row.get("user_id"),
        restriction_action: RestrictionAction::parse(&capability).ok_or_else(|| {
            TribunalError::Database(format!("Invalid restriction_action: {}", capability))
        })?,
        note: row.get("note"),
        source_report_id: row.get("source_report_id"),
        restricted_at: parse_timestamp(row.get("restricted_at"), "restricted_at")?,
        lifted_at: parse_optional_timestamp(row.get("lifted_at"), "lifted_at")?,
    })
}

fn content_from_row(row: &SqliteRow) -> Result<ContentModeration> {
    let content_type: String = row.get("content_type");

    Ok(ContentModeration {
        content: ContentRef {
            content_type: RelatedContentType::parse(&content_type).ok_or_else(|| {
                TribunalError::Database(format!("Invalid content_type: {}", content_type))
            })?,
            content_id: row.get("content_id"),
        },
        hidden: row.get::<i64, _>("hidden") != 0,
        source_report_id: row.get("source_report_id"),
        hidden_at: parse_timestamp(row.get("hidden_at"), "hidden_at")?,
        restored_at: parse_optional_timestamp(row.get("restored_at"), "restored_at")?,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Arc;

    use chrono::{DateTime, Duration, Utc};

    use crate::database::{now, Database};
    use crate::enforcement::RestrictionEnforcer;
    use crate::models::{
        ActorContext, ContentRef, RelatedContentType, Report, ReportAction, ReportStatus,
        RestrictionAction, RestrictionActionDetail, RestrictionType,
    };
    use crate::state_machine::tests::{command, new_report};
    use crate::state_machine::{assign, create, process, RestoreKind};

    fn detail(restriction_action: RestrictionAction) -> RestrictionActionDetail {
        RestrictionActionDetail {
            restriction_action,
            note: None,
        }
    }

    /// A report adjudicated by `m1` at `resolved_at` with `action`.
    pub(crate) fn adjudicated(id: &str, action: ReportAction, resolved_at: DateTime<Utc>) -> Report {
        let report = create(new_report(), id.to_string(), resolved_at).unwrap();
        let report = assign(&report, "m1", resolved_at).unwrap();
        let status = if action == ReportAction::NoAction {
            ReportStatus::Dismissed
        } else {
            ReportStatus::Approved
        };
        let mut cmd = command(action, status);
        match action {
            ReportAction::Suspended => cmd.suspension_days = Some(30),
            ReportAction::EntitlementRestriction => {
                cmd.restriction_action_details = vec![
                    detail(RestrictionAction::Comment),
                    detail(RestrictionAction::UploadTrack),
                ]
            }
            _ => {}
        }
        process(&report, &ActorContext::new("m1"), &cmd, resolved_at).unwrap()
    }

    fn comment() -> ContentRef {
        ContentRef {
            content_type: RelatedContentType::Comment,
            content_id: "comment-1".to_string(),
        }
    }

    async fn enforcer() -> (Arc<Database>, RestrictionEnforcer) {
        let db = Arc::new(Database::in_memory().await.expect("should create db"));
        let enforcer = RestrictionEnforcer::new(db.clone());
        (db, enforcer)
    }

    #[tokio::test]
    async fn suspension_expires_after_duration() {
        let (_db, enforcer) = enforcer().await;
        let resolved_at = now();
        let report = adjudicated("r1", ReportAction::Suspended, resolved_at);

        enforcer.enforce(&report).await.expect("should enforce");

        let restriction = enforcer.get_restriction("user-1").await.unwrap();
        assert_eq!(restriction.restriction_type, RestrictionType::Suspended);
        assert_eq!(restriction.restricted_at, Some(resolved_at));
        assert_eq!(restriction.expires_at, Some(resolved_at + Duration::days(30)));
        assert_eq!(restriction.source_report_id.as_deref(), Some("r1"));
        assert_eq!(restriction.reason.as_deref(), Some("Harassment"));
        assert_eq!(
            enforcer
                .effective_restriction("user-1", resolved_at + Duration::days(29))
                .await
                .unwrap(),
            RestrictionType::Suspended
        );
        assert_eq!(
            enforcer
                .effective_restriction("user-1", resolved_at + Duration::days(31))
                .await
                .unwrap(),
            RestrictionType::None
        );
    }

    #[tokio::test]
    async fn enforcement_is_idempotent() {
        let (_db, enforcer) = enforcer().await;
        let report = adjudicated("r1", ReportAction::PermanentBan, now());

        enforcer.enforce(&report).await.unwrap();
        let first = enforcer.get_restriction("user-1").await.unwrap();
        enforcer.enforce(&report).await.unwrap();
        let second = enforcer.get_restriction("user-1").await.unwrap();

        assert_eq!(first, second);
        assert_eq!(second.restriction_type, RestrictionType::Banned);
        assert_eq!(second.expires_at, None);
    }

    #[tokio::test]
    async fn unenforced_actions_leave_no_record() {
        let (_db, enforcer) = enforcer().await;
        for (id, action) in [("r1", ReportAction::NoAction), ("r2", ReportAction::Warning)] {
            enforcer
                .enforce(&adjudicated(id, action, now()))
                .await
                .unwrap();
        }

        let restriction = enforcer.get_restriction("user-1").await.unwrap();
        assert_eq!(restriction.restriction_type, RestrictionType::None);
        assert!(restriction.source_report_id.is_none());
        assert!(enforcer
            .active_capability_restrictions("user-1")
            .await
            .unwrap()
            .is_empty());
        assert!(!enforcer.is_content_hidden(&comment()).await.unwrap());
    }

    #[tokio::test]
    async fn entitlement_restricts_listed_capabilities_only() {
        let (_db, enforcer) = enforcer().await;
        let report = adjudicated("r1", ReportAction::EntitlementRestriction, now());
        enforcer.enforce(&report).await.unwrap();

        let active = enforcer.active_capability_restrictions("user-1").await.unwrap();
        assert_eq!(active.len(), 2);
        assert!(active.iter().all(|c| c.source_report_id == "r1"));
        assert!(enforcer
            .is_capability_restricted("user-1", RestrictionAction::Comment)
            .await
            .unwrap());
        assert!(!enforcer
            .is_capability_restricted("user-1", RestrictionAction::Report)
            .await
            .unwrap());

        // Coarse restriction is untouched.
        let restriction = enforcer.get_restriction("user-1").await.unwrap();
        assert_eq!(restriction.restriction_type, RestrictionType::None);
    }

    #[tokio::test]
    async fn content_removal_hides_related_content() {
        let (_db, enforcer) = enforcer().await;
        let report = adjudicated("r1", ReportAction::ContentRemoval, now());
        enforcer.enforce(&report).await.unwrap();

        let moderation = enforcer
            .content_moderation(&comment())
            .await
            .unwrap()
            .expect("should be recorded");
        assert!(moderation.hidden);
        assert_eq!(moderation.source_report_id, "r1");
        assert_eq!(Some(moderation.hidden_at), report.resolved_at);
    }

    #[tokio::test]
    async fn older_report_does_not_replace_newer_restriction() {
        let (_db, enforcer) = enforcer().await;
        let earlier = now();
        let older = adjudicated("r-old", ReportAction::Suspended, earlier);
        let newer = adjudicated("r-new", ReportAction::PermanentBan, earlier + Duration::hours(1));

        enforcer.enforce(&newer).await.unwrap();
        enforcer.enforce(&older).await.unwrap();

        let restriction = enforcer.get_restriction("user-1").await.unwrap();
        assert_eq!(restriction.restriction_type, RestrictionType::Banned);
        assert_eq!(restriction.source_report_id.as_deref(), Some("r-new"));
    }

    #[tokio::test]
    async fn lift_leaves_superseding_restriction_intact() {
        let (db, enforcer) = enforcer().await;
        let earlier = now();
        let suspension = adjudicated("r1", ReportAction::Suspended, earlier);
        let ban = adjudicated("r2", ReportAction::PermanentBan, earlier + Duration::hours(1));
        enforcer.enforce(&suspension).await.unwrap();
        enforcer.enforce(&ban).await.unwrap();

        let mut conn = db.pool().acquire().await.unwrap();
        let lifted =
            RestrictionEnforcer::lift_in(&mut conn, &suspension, RestoreKind::User, "m1", now())
                .await
                .unwrap();
        drop(conn);
        assert_eq!(lifted, 0);

        let restriction = enforcer.get_restriction("user-1").await.unwrap();
        assert_eq!(restriction.restriction_type, RestrictionType::Banned);
        assert_eq!(restriction.source_report_id.as_deref(), Some("r2"));
    }

    #[tokio::test]
    async fn later_suspension_does_not_replace_standing_ban() {
        let (_db, enforcer) = enforcer().await;
        let earlier = now();
        let ban = adjudicated("r1", ReportAction::PermanentBan, earlier);
        let suspension = adjudicated("r2", ReportAction::Suspended, earlier + Duration::hours(1));
        enforcer.enforce(&ban).await.unwrap();
        enforcer.enforce(&suspension).await.unwrap();

        let restriction = enforcer.get_restriction("user-1").await.unwrap();
        assert_eq!(restriction.restriction_type, RestrictionType::Banned);
        assert_eq!(restriction.source_report_id.as_deref(), Some("r1"));
        assert_eq!(restriction.expires_at, None);
    }

    #[tokio::test]
    async fn later_ban_replaces_suspension() {
        let (_db, enforcer) = enforcer().await;
        let earlier = now();
        enforcer
            .enforce(&adjudicated("r1", ReportAction::Suspended, earlier))
            .await
            .unwrap();
        enforcer
            .enforce(&adjudicated(
                "r2",
                ReportAction::PermanentBan,
                earlier + Duration::hours(1),
            ))
            .await
            .unwrap();

        let restriction = enforcer.get_restriction("user-1").await.unwrap();
        assert_eq!(restriction.restriction_type, RestrictionType::Banned);
        assert_eq!(restriction.source_report_id.as_deref(), Some("r2"));
    }

    #[tokio::test]
    async fn lifted_restriction_is_not_reapplied() {
        let (db, enforcer) = enforcer().await;
        let ban = adjudicated("r1", ReportAction::PermanentBan, now());
        enforcer.enforce(&ban).await.unwrap();

        let mut conn = db.pool().acquire().await.unwrap();
        let lifted = RestrictionEnforcer::lift_in(&mut conn, &ban, RestoreKind::User, "m1", now())
            .await
            .unwrap();
        drop(conn);
        assert_eq!(lifted, 1);

        enforcer.enforce(&ban).await.unwrap();
        let restriction = enforcer.get_restriction("user-1").await.unwrap();
        assert_eq!(restriction.restriction_type, RestrictionType::None);
        assert_eq!(restriction.lifted_by.as_deref(), Some("m1"));
        assert!(restriction.lifted_at.is_some());
    }

    #[tokio::test]
    async fn lift_content_and_capabilities() {
        let (db, enforcer) = enforcer().await;
        let removal = adjudicated("r1", ReportAction::ContentRemoval, now());
        let entitlement = adjudicated("r2", ReportAction::EntitlementRestriction, now());
        enforcer.enforce(&removal).await.unwrap();
        enforcer.enforce(&entitlement).await.unwrap();

        let mut conn = db.pool().acquire().await.unwrap();
        let content =
            RestrictionEnforcer::lift_in(&mut conn, &removal, RestoreKind::Content, "m1", now())
                .await
                .unwrap();
        let capabilities =
            RestrictionEnforcer::lift_in(&mut conn, &entitlement, RestoreKind::User, "m1", now())
                .await
                .unwrap();
        let mismatched =
            RestrictionEnforcer::lift_in(&mut conn, &removal, RestoreKind::User, "m1", now()).await;
        drop(conn);

        assert_eq!(content, 1);
        assert_eq!(capabilities, 2);
        assert!(mismatched.is_err());
        assert!(!enforcer.is_content_hidden(&comment()).await.unwrap());
        assert!(enforcer
            .active_capability_restrictions("user-1")
            .await
            .unwrap()
            .is_empty());
    }
}
