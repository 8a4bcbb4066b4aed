//! Restoration of approved reports.
//!
//! A restore reverses the restriction a report put in place and moves the
//! report to `Restored`, which is final. Each report can be restored once.

use std::sync::Arc;

use crate::audit::{AuditEntry, AuditTrail, Transition};
use crate::database::{self, Database};
use crate::enforcement::RestrictionEnforcer;
use crate::error::{Result, TribunalError};
use crate::events::{DomainEvent, EventBus};
use crate::models::{ActorContext, Report};
use crate::state_machine::{self, RestoreKind, RestorePolicy};

pub struct RestorationManager {
    db: Arc<Database>,
    events: EventBus,
    policy: RestorePolicy,
}

impl RestorationManager {
    pub fn new(db: Arc<Database>, events: EventBus, policy: RestorePolicy) -> Self {
        Self { db, events, policy }
    }

    /// Lift the account or capability restriction a report created.
    pub async fn restore_user(&self, report_id: &str, actor: &ActorContext) -> Result<Report> {
        self.restore(report_id, actor, RestoreKind::User).await
    }

    /// Un-hide the content a report removed.
    pub async fn restore_content(&self, report_id: &str, actor: &ActorContext) -> Result<Report> {
        self.restore(report_id, actor, RestoreKind::Content).await
    }

    async fn restore(
        &self,
        report_id: &str,
        actor: &ActorContext,
        kind: RestoreKind,
    ) -> Result<Report> {
        let report = self
            .db
            .get_report(report_id)
            .await?
            .ok_or_else(|| TribunalError::NotFound(report_id.to_string()))?;

        let now = database::now();
        let next = state_machine::restore(&report, actor, kind, self.policy, now)?;
        let owner = self
            .policy
            .requires_owner(kind)
            .then_some(actor.actor_id.as_str());

        let mut tx = self
            .db
            .pool()
            .begin()
            .await
            .map_err(|e| TribunalError::Database(format!("Failed to begin transaction: {}", e)))?;

        if !database::record_restoration(&mut tx, &next, kind, owner).await? {
            tx.rollback()
                .await
                .map_err(|e| TribunalError::Database(format!("Failed to roll back: {}", e)))?;
            return Err(database::explain_conflict(&self.db, report_id, |current| {
                state_machine::restore(current, actor, kind, self.policy, database::now())
            })
            .await);
        }

        let lifted = RestrictionEnforcer::lift_in(&mut tx, &report, kind, &actor.actor_id, now).await?;

        AuditTrail::append(
            &mut tx,
            &AuditEntry::for_transition(
                Transition::restored(kind),
                &actor.actor_id,
                Some(&report),
                &next,
            ),
        )
        .await?;

        tx.commit()
            .await
            .map_err(|e| TribunalError::Database(format!("Failed to commit restore: {}", e)))?;

        tracing::info!(
            report_id = %next.id,
            actor_id = %actor.actor_id,
            kind = kind.as_str(),
            lifted,
            "Report restored"
        );

        self.events
            .publish(DomainEvent::restored(&next, kind, actor));

        Ok(next)
    }
}
