//! Single-owner assignment of reports to moderators.

use std::sync::Arc;

use crate::audit::{AuditEntry, AuditTrail, Transition};
use crate::database::{self, Database};
use crate::error::{Result, TribunalError};
use crate::events::{DomainEvent, EventBus};
use crate::models::{ActorContext, Report};
use crate::state_machine;

/// Hands open reports to exactly one moderator.
pub struct AssignmentManager {
    db: Arc<Database>,
    events: EventBus,
}

impl AssignmentManager {
    pub fn new(db: Arc<Database>, events: EventBus) -> Self {
        Self { db, events }
    }

    /// Assign a report to `moderator_id` on behalf of `actor`.
    ///
    /// Of any number of concurrent calls for the same report, exactly one
    /// succeeds; the rest see `AlreadyAssigned`.
    pub async fn assign(
        &self,
        report_id: &str,
        moderator_id: &str,
        actor: &ActorContext,
    ) -> Result<Report> {
        let report = self
            .db
            .get_report(report_id)
            .await?
            .ok_or_else(|| TribunalError::NotFound(report_id.to_string()))?;

        let next = state_machine::assign(&report, moderator_id, database::now())?;

        let mut tx = self
            .db
            .pool()
            .begin()
            .await
            .map_err(|e| TribunalError::Database(format!("Failed to begin transaction: {}", e)))?;

        if !database::claim_report(&mut tx, &next).await? {
            tx.rollback()
                .await
                .map_err(|e| TribunalError::Database(format!("Failed to roll back: {}", e)))?;
            let err = database::explain_conflict(&self.db, report_id, |current| {
                state_machine::assign(current, moderator_id, database::now())
            })
            .await;
            tracing::info!(
                report_id = %report_id,
                moderator_id = %moderator_id,
                error = %err,
                "Assignment lost to a concurrent writer"
            );
            return Err(err);
        }

        AuditTrail::append(
            &mut tx,
            &AuditEntry::for_transition(Transition::Assigned, &actor.actor_id, Some(&report), &next),
        )
        .await?;

        tx.commit()
            .await
            .map_err(|e| TribunalError::Database(format!("Failed to commit assignment: {}", e)))?;

        tracing::info!(
            report_id = %next.id,
            moderator_id = %moderator_id,
            actor_id = %actor.actor_id,
            status = %next.status,
            "Report assigned"
        );

        self.events.publish(DomainEvent::assigned(&next, actor));

        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::assignment::AssignmentManager;
    use crate::audit::{AuditTrail, Transition};
    use crate::database::Database;
    use crate::error::TribunalError;
    use crate::events::{DomainEvent, EventBus};
    use crate::models::{ActorContext, ReportStatus};
    use crate::reports::ReportService;
    use crate::state_machine::tests::new_report;

    async fn setup(db: Database) -> (Arc<Database>, ReportService, Arc<AssignmentManager>, EventBus) {
        let db = Arc::new(db);
        let events = EventBus::new(64);
        let reports = ReportService::new(db.clone(), events.clone());
        let assignments = Arc::new(AssignmentManager::new(db.clone(), events.clone()));
        (db, reports, assignments, events)
    }

    #[tokio::test]
    async fn assign_sets_owner_and_status() {
        let (db, reports, assignments, events) =
            setup(Database::in_memory().await.expect("should create db")).await;
        let mut rx = events.subscribe();
        let report_id = reports.create_report(new_report()).await.unwrap();
        rx.recv().await.unwrap();

        let lead = ActorContext::new("lead-1");
        let report = assignments.assign(&report_id, "m1", &lead).await.unwrap();
        assert_eq!(report.assigned_moderator_id.as_deref(), Some("m1"));
        assert_eq!(report.status, ReportStatus::UnderReview);

        match &*rx.recv().await.unwrap() {
            DomainEvent::ReportAssigned {
                moderator_id,
                assigned_by,
                ..
            } => {
                assert_eq!(moderator_id, "m1");
                assert_eq!(assigned_by, "lead-1");
            }
            other => panic!("unexpected event: {:?}", other),
        }

        let entries = AuditTrail::new(db).entries_for_report(&report_id).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].transition, Transition::Assigned);
        assert_eq!(entries[1].actor_id, "lead-1");
    }

    #[tokio::test]
    async fn second_assign_is_rejected() {
        let (_db, reports, assignments, _events) =
            setup(Database::in_memory().await.expect("should create db")).await;
        let report_id = reports.create_report(new_report()).await.unwrap();

        assignments
            .assign(&report_id, "m1", &ActorContext::new("m1"))
            .await
            .unwrap();
        let second = assignments
            .assign(&report_id, "m2", &ActorContext::new("m2"))
            .await;
        assert!(matches!(second, Err(TribunalError::AlreadyAssigned { .. })));

        let stored = reports.get_report(&report_id).await.unwrap();
        assert_eq!(stored.assigned_moderator_id.as_deref(), Some("m1"));
    }

    #[tokio::test]
    async fn assign_unknown_report_is_not_found() {
        let (_db, _reports, assignments, _events) =
            setup(Database::in_memory().await.expect("should create db")).await;
        let result = assignments
            .assign("missing", "m1", &ActorContext::new("m1"))
            .await;
        assert!(matches!(result, Err(TribunalError::NotFound(_))));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_assigns_have_one_winner() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("tribunal.db");
        let db = Database::new(path.to_str().expect("utf-8 path"))
            .await
            .expect("should create file db");
        let (_db, reports, assignments, _events) = setup(db).await;

        for _ in 0..10 {
            let report_id = reports.create_report(new_report()).await.unwrap();

            let mut handles = Vec::new();
            for moderator in ["m1", "m2"] {
                let assignments = assignments.clone();
                let report_id = report_id.clone();
                handles.push(tokio::spawn(async move {
                    assignments
                        .assign(&report_id, moderator, &ActorContext::new(moderator))
                        .await
                }));
            }

            let mut winners = Vec::new();
            let mut losers = 0;
            for handle in handles {
                match handle.await.unwrap() {
                    Ok(report) => winners.push(report.assigned_moderator_id.unwrap()),
                    Err(TribunalError::AlreadyAssigned { .. }) => losers += 1,
                    Err(other) => panic!("unexpected error: {}", other),
                }
            }
            assert_eq!(winners.len(), 1);
            assert_eq!(losers, 1);

            let stored = reports.get_report(&report_id).await.unwrap();
            assert_eq!(stored.assigned_moderator_id, Some(winners[0].clone()));
        }
    }
}
