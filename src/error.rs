//! Error types for Tribunal.
//!
//! All errors are explicitly typed using thiserror. Workflow rejections are
//! ordinary return values: the caller decides whether to resubmit.

use thiserror::Error;

use crate::models::{ReportAction, ReportStatus};

/// Central error type for all Tribunal operations.
#[derive(Debug, Error)]
pub enum TribunalError {
    /// Malformed request (missing description, bad URL, extraneous field).
    #[error("Validation error: {0}")]
    Validation(String),

    /// The requested status is not allowed for the requested action.
    #[error("Status {status} is not legal for action {action}")]
    IllegalStatusForAction {
        action: ReportAction,
        status: ReportStatus,
    },

    /// A field required by the action is absent or out of range.
    #[error("Missing required field {field}: {reason}")]
    MissingRequiredField { field: &'static str, reason: String },

    /// The report already has an owner.
    #[error("Report {report_id} is already assigned")]
    AlreadyAssigned { report_id: String },

    /// The actor does not own the report.
    #[error("Report {report_id} is not assigned to {actor_id}")]
    NotAssignedToActor { report_id: String, actor_id: String },

    /// The report has left the open states.
    #[error("Report {report_id} is already adjudicated (status {status})")]
    AlreadyAdjudicated {
        report_id: String,
        status: ReportStatus,
    },

    /// The report's status or action does not permit this restore.
    #[error("Report {report_id} is not eligible for restore: {reason}")]
    IneligibleForRestore { report_id: String, reason: String },

    /// The report has already been restored.
    #[error("Report {report_id} is already restored")]
    AlreadyRestored { report_id: String },

    /// Unknown or soft-deleted report.
    #[error("Report not found: {0}")]
    NotFound(String),

    /// Configuration error (invalid env values).
    #[error("Configuration error: {0}")]
    Config(String),

    /// Regex pattern compilation error.
    #[error("Regex pattern error: {0}")]
    RegexPattern(#[from] regex::Error),

    /// Internal state error (conditional update raced with no visible cause).
    #[error("Internal state error: {0}")]
    InternalState(String),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Database error.
    #[error("Database error: {0}")]
    Database(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(String),
}

impl TribunalError {
    /// Log error with full context using tracing.
    ///
    /// Workflow rejections are expected traffic and log at warn; storage and
    /// internal failures log at error.
    pub fn log_with_context(&self, context: &ErrorContext) {
        match self {
            Self::Database(_) | Self::InternalState(_) => {
                tracing::error!(
                    error = %self,
                    request_id = %context.request_id,
                    actor_id = ?context.actor_id,
                    report_id = ?context.report_id,
                    operation = %context.operation,
                    "Critical error occurred"
                );
            }
            Self::Config(_) | Self::RegexPattern(_) => {
                tracing::error!(
                    error = %self,
                    request_id = %context.request_id,
                    operation = %context.operation,
                    "Configuration error"
                );
            }
            Self::Json(_) | Self::Io(_) => {
                tracing::error!(
                    error = %self,
                    request_id = %context.request_id,
                    actor_id = ?context.actor_id,
                    report_id = ?context.report_id,
                    operation = %context.operation,
                    "Data processing error"
                );
            }
            Self::NotFound(_) => {
                tracing::info!(
                    error = %self,
                    request_id = %context.request_id,
                    actor_id = ?context.actor_id,
                    operation = %context.operation,
                    "Report not found"
                );
            }
            _ => {
                tracing::warn!(
                    error = %self,
                    request_id = %context.request_id,
                    actor_id = ?context.actor_id,
                    report_id = ?context.report_id,
                    operation = %context.operation,
                    "Action rejected"
                );
            }
        }
    }

    /// Check if this error is critical and requires alerting
    pub fn is_critical(&self) -> bool {
        matches!(self, Self::Database(_) | Self::InternalState(_))
    }

    /// True for errors produced by the workflow rules rather than infrastructure.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::Validation(_)
                | Self::IllegalStatusForAction { .. }
                | Self::MissingRequiredField { .. }
                | Self::AlreadyAssigned { .. }
                | Self::NotAssignedToActor { .. }
                | Self::AlreadyAdjudicated { .. }
                | Self::IneligibleForRestore { .. }
                | Self::AlreadyRestored { .. }
                | Self::NotFound(_)
        )
    }

    /// Get user-facing error message.
    ///
    /// Rejections carry their reason; infrastructure errors hide internals.
    pub fn user_message(&self) -> String {
        if self.is_rejection() {
            return self.to_string();
        }
        match self {
            Self::Config(_) => "Service configuration error",
            Self::RegexPattern(_) => "Invalid pattern configuration",
            Self::InternalState(_) => "Internal service error",
            Self::Json(_) => "Data format error",
            Self::Database(_) => "Database service temporarily unavailable",
            Self::Io(_) => "File system error",
            _ => "Request failed",
        }
        .to_string()
    }
}

/// Context information for error logging
#[derive(Debug, Clone)]
pub struct ErrorContext {
    /// Unique request identifier for correlation
    pub request_id: String,
    /// Acting moderator if available
    pub actor_id: Option<String>,
    /// Report being operated on if available
    pub report_id: Option<String>,
    /// Operation being performed
    pub operation: String,
}

impl ErrorContext {
    /// Create a new error context
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            request_id: uuid::Uuid::new_v4().to_string(),
            actor_id: None,
            report_id: None,
            operation: operation.into(),
        }
    }

    /// Set actor ID
    pub fn with_actor_id(mut self, actor_id: impl Into<String>) -> Self {
        self.actor_id = Some(actor_id.into());
        self
    }

    /// Set report ID
    pub fn with_report_id(mut self, report_id: impl Into<String>) -> Self {
        self.report_id = Some(report_id.into());
        self
    }

    /// Set request ID
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = request_id.into();
        self
    }
}

/// Result type alias for Tribunal operations.
pub type Result<T> = std::result::Result<T, TribunalError>;
