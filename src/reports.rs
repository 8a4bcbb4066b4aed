//! Report intake, adjudication and reads.
//!
//! Thin adapter around the pure transitions in [`crate::state_machine`]:
//! each write runs in one transaction that holds the conditional update,
//! its audit entry and any enforcement, and publishes an event after commit.

use std::sync::Arc;

use crate::audit::{AuditEntry, AuditTrail, Transition};
use crate::database::{self, Database, ReportQuery};
use crate::enforcement::RestrictionEnforcer;
use crate::error::{Result, TribunalError};
use crate::events::{DomainEvent, EventBus};
use crate::models::{ActorContext, Report};
use crate::state_machine::{self, NewReport, ProcessCommand};

/// Page size limits for report listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageLimits {
    pub default_size: u32,
    pub max_size: u32,
}

impl Default for PageLimits {
    fn default() -> Self {
        Self {
            default_size: 50,
            max_size: 100,
        }
    }
}

impl PageLimits {
    /// Resolve a requested page size, falling back to the default and capping at the max.
    pub fn resolve(&self, requested: Option<u32>) -> u32 {
        requested
            .filter(|&n| n > 0)
            .unwrap_or(self.default_size)
            .min(self.max_size)
    }
}

/// Report workflow service.
pub struct ReportService {
    db: Arc<Database>,
    events: EventBus,
    page_limits: PageLimits,
}

impl ReportService {
    pub fn new(db: Arc<Database>, events: EventBus) -> Self {
        Self {
            db,
            events,
            page_limits: PageLimits::default(),
        }
    }

    pub fn with_page_limits(mut self, page_limits: PageLimits) -> Self {
        self.page_limits = page_limits;
        self
    }

    /// File a new report. Returns its id.
    pub async fn create_report(&self, input: NewReport) -> Result<String> {
        let report = state_machine::create(input, uuid::Uuid::new_v4().to_string(), database::now())?;

        let mut tx = self
            .db
            .pool()
            .begin()
            .await
            .map_err(|e| TribunalError::Database(format!("Failed to begin transaction: {}", e)))?;

        database::insert_report(&mut tx, &report).await?;
        AuditTrail::append(
            &mut tx,
            &AuditEntry::for_transition(Transition::Created, &report.reporter_id, None, &report),
        )
        .await?;

        tx.commit()
            .await
            .map_err(|e| TribunalError::Database(format!("Failed to commit report: {}", e)))?;

        tracing::info!(
            report_id = %report.id,
            reporter_id = %report.reporter_id,
            reported_user_id = %report.reported_user_id,
            report_type = report.report_type.as_str(),
            "Report created"
        );

        self.events.publish(DomainEvent::created(&report));

        Ok(report.id)
    }

    /// Adjudicate a report owned by `actor`.
    ///
    /// Approved reports with an enforced action have their restriction applied
    /// in the same transaction as the status change.
    pub async fn process_report(
        &self,
        report_id: &str,
        actor: &ActorContext,
        command: &ProcessCommand,
    ) -> Result<Report> {
        let report = self.get_report(report_id).await?;
        let next = state_machine::process(&report, actor, command, database::now())?;

        let mut tx = self
            .db
            .pool()
            .begin()
            .await
            .map_err(|e| TribunalError::Database(format!("Failed to begin transaction: {}", e)))?;

        if !database::record_adjudication(&mut tx, &next).await? {
            tx.rollback()
                .await
                .map_err(|e| TribunalError::Database(format!("Failed to roll back: {}", e)))?;
            return Err(database::explain_conflict(&self.db, report_id, |current| {
                state_machine::process(current, actor, command, database::now())
            })
            .await);
        }

        AuditTrail::append(
            &mut tx,
            &AuditEntry::for_transition(Transition::Processed, &actor.actor_id, Some(&report), &next),
        )
        .await?;

        if next.needs_enforcement() {
            RestrictionEnforcer::enforce_in(&mut tx, &next).await?;
        }

        tx.commit()
            .await
            .map_err(|e| TribunalError::Database(format!("Failed to commit adjudication: {}", e)))?;

        tracing::info!(
            report_id = %next.id,
            actor_id = %actor.actor_id,
            action = %command.action,
            status = %next.status,
            "Report processed"
        );

        self.events
            .publish(DomainEvent::processed(&next, command.action, actor));

        Ok(next)
    }

    /// Get a report by id.
    pub async fn get_report(&self, report_id: &str) -> Result<Report> {
        self.db
            .get_report(report_id)
            .await?
            .ok_or_else(|| TribunalError::NotFound(report_id.to_string()))
    }

    /// List reports matching `query`, newest first.
    pub async fn list_reports(
        &self,
        query: &ReportQuery,
        limit: Option<u32>,
        offset: u32,
    ) -> Result<Vec<Report>> {
        let limit = self.page_limits.resolve(limit);
        self.db.list_reports(query, limit, offset).await
    }

    /// Soft-delete a report. It disappears from reads and per-user counts.
    pub async fn soft_delete_report(&self, report_id: &str, actor: &ActorContext) -> Result<()> {
        if !self.db.soft_delete_report(report_id).await? {
            return Err(TribunalError::NotFound(report_id.to_string()));
        }

        tracing::info!(report_id = %report_id, actor_id = %actor.actor_id, "Report deleted");
        Ok(())
    }
}
