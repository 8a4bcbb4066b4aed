//! Action policy table.
//!
//! Pure lookup of which statuses each adjudication action may end in and which
//! extra fields it requires.

use std::collections::HashSet;

use crate::error::{Result, TribunalError};
use crate::models::{ReportAction, ReportStatus, RestrictionAction, RestrictionActionDetail};

/// Shortest suspension a moderator may issue, in days.
pub const MIN_SUSPENSION_DAYS: i32 = 1;
/// Longest suspension a moderator may issue, in days.
pub const MAX_SUSPENSION_DAYS: i32 = 365;

/// Extra inputs an action needs beyond action and status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FieldRequirements {
    /// `suspension_days` within `[MIN_SUSPENSION_DAYS, MAX_SUSPENSION_DAYS]`.
    pub suspension_days: bool,
    /// Non-empty, `None`-free, duplicate-free restriction details.
    pub restriction_action_details: bool,
    /// The report must reference a content item.
    pub related_content: bool,
}

/// Optional arguments supplied alongside an adjudication.
#[derive(Debug, Clone, Copy)]
pub struct SuppliedFields<'a> {
    pub suspension_days: Option<i32>,
    pub restriction_action_details: &'a [RestrictionActionDetail],
    pub has_related_content: bool,
}

/// Statuses an action may be recorded with.
pub fn legal_statuses(action: ReportAction) -> &'static [ReportStatus] {
    match action {
        ReportAction::NoAction => &[ReportStatus::Dismissed, ReportStatus::Rejected],
        ReportAction::Warning
        | ReportAction::Suspended
        | ReportAction::EntitlementRestriction
        | ReportAction::ContentRemoval
        | ReportAction::PermanentBan => &[ReportStatus::Approved],
    }
}

pub fn is_legal_status(action: ReportAction, status: ReportStatus) -> bool {
    legal_statuses(action).contains(&status)
}

/// Fields an action requires.
pub fn required_fields(action: ReportAction) -> FieldRequirements {
    match action {
        ReportAction::Suspended => FieldRequirements {
            suspension_days: true,
            ..Default::default()
        },
        ReportAction::EntitlementRestriction => FieldRequirements {
            restriction_action_details: true,
            ..Default::default()
        },
        ReportAction::ContentRemoval => FieldRequirements {
            related_content: true,
            ..Default::default()
        },
        ReportAction::NoAction | ReportAction::Warning | ReportAction::PermanentBan => {
            FieldRequirements::default()
        }
    }
}

/// Validate an adjudication against the table.
///
/// Checks run in a fixed order: status legality, then required fields, then
/// fields the action does not accept.
pub fn validate(
    action: ReportAction,
    status: ReportStatus,
    fields: &SuppliedFields<'_>,
) -> Result<()> {
    if !is_legal_status(action, status) {
        return Err(TribunalError::IllegalStatusForAction { action, status });
    }

    let required = required_fields(action);

    if required.suspension_days {
        match fields.suspension_days {
            None => {
                return Err(TribunalError::MissingRequiredField {
                    field: "suspension_days",
                    reason: format!("required for {}", action),
                })
            }
            Some(days) if !(MIN_SUSPENSION_DAYS..=MAX_SUSPENSION_DAYS).contains(&days) => {
                return Err(TribunalError::MissingRequiredField {
                    field: "suspension_days",
                    reason: format!(
                        "must be between {} and {}, got {}",
                        MIN_SUSPENSION_DAYS, MAX_SUSPENSION_DAYS, days
                    ),
                })
            }
            Some(_) => {}
        }
    } else if fields.suspension_days.is_some() {
        return Err(TribunalError::Validation(format!(
            "suspension_days is only accepted for {}",
            ReportAction::Suspended
        )));
    }

    if required.restriction_action_details {
        validate_details(fields.restriction_action_details)?;
    } else if !fields.restriction_action_details.is_empty() {
        return Err(TribunalError::Validation(format!(
            "restriction_action_details are only accepted for {}",
            ReportAction::EntitlementRestriction
        )));
    }

    if required.related_content && !fields.has_related_content {
        return Err(TribunalError::MissingRequiredField {
            field: "related_content_id",
            reason: format!("{} needs a report that references content", action),
        });
    }

    Ok(())
}

fn validate_details(details: &[RestrictionActionDetail]) -> Result<()> {
    if details.is_empty() {
        return Err(TribunalError::MissingRequiredField {
            field: "restriction_action_details",
            reason: "at least one restricted capability is required".to_string(),
        });
    }

    let mut seen = HashSet::with_capacity(details.len());
    for detail in details {
        if detail.restriction_action == RestrictionAction::None {
            return Err(TribunalError::MissingRequiredField {
                field: "restriction_action_details",
                reason: "restriction action must not be none".to_string(),
            });
        }
        if !seen.insert(detail.restriction_action) {
            return Err(TribunalError::MissingRequiredField {
                field: "restriction_action_details",
                reason: format!(
                    "restriction action {} is listed more than once",
                    detail.restriction_action.as_str()
                ),
            });
        }
    }

    Ok(())
}


#[cfg(test)]
mod property_tests {
    use proptest::prelude::*;

    use crate::models::{ReportAction, ReportStatus, RestrictionAction, RestrictionActionDetail};
    use crate::policy::{validate, SuppliedFields, MAX_SUSPENSION_DAYS, MIN_SUSPENSION_DAYS};

    fn arb_action() -> impl Strategy<Value = ReportAction> {
        prop::sample::select(ReportAction::ALL.to_vec())
    }

    fn arb_status() -> impl Strategy<Value = ReportStatus> {
        prop::sample::select(ReportStatus::ALL.to_vec())
    }

    fn arb_details() -> impl Strategy<Value = Vec<RestrictionActionDetail>> {
        prop::collection::vec(
            prop::sample::select(RestrictionAction::ALL.to_vec()).prop_map(|action| {
                RestrictionActionDetail {
                    restriction_action: action,
                    note: None,
                }
            }),
            0..5,
        )
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(500))]

        /// NoAction is accepted exactly with Dismissed/Rejected, and those
        /// statuses are accepted with nothing but NoAction.
        #[test]
        fn prop_no_action_iff_dismissed_or_rejected(
            action in arb_action(),
            status in arb_status(),
            days in prop::option::of(-10i32..400),
            details in arb_details(),
        ) {
            let supplied = SuppliedFields {
                suspension_days: days,
                restriction_action_details: &details,
                has_related_content: true,
            };
            if validate(action, status, &supplied).is_ok() {
                let dismissive = matches!(status, ReportStatus::Dismissed | ReportStatus::Rejected);
                prop_assert_eq!(action == ReportAction::NoAction, dismissive);
                if action != ReportAction::NoAction {
                    prop_assert_eq!(status, ReportStatus::Approved);
                }
            }
        }

        /// Accepted suspension days are present and in range iff the action is Suspended.
        #[test]
        fn prop_suspension_days_iff_suspended(
            action in arb_action(),
            days in prop::option::of(-10i32..400),
        ) {
            let status = if action == ReportAction::NoAction {
                ReportStatus::Dismissed
            } else {
                ReportStatus::Approved
            };
            let supplied = SuppliedFields {
                suspension_days: days,
                restriction_action_details: &[],
                has_related_content: true,
            };
            if action != ReportAction::EntitlementRestriction
                && validate(action, status, &supplied).is_ok()
            {
                let in_range = days.is_some_and(|d| (MIN_SUSPENSION_DAYS..=MAX_SUSPENSION_DAYS).contains(&d));
                prop_assert_eq!(action == ReportAction::Suspended, in_range);
            }
        }

        /// Accepted details are non-empty and None-free iff the action is EntitlementRestriction.
        #[test]
        fn prop_details_iff_entitlement(
            action in arb_action(),
            details in arb_details(),
        ) {
            let status = if action == ReportAction::NoAction {
                ReportStatus::Rejected
            } else {
                ReportStatus::Approved
            };
            let days = (action == ReportAction::Suspended).then_some(7);
            let supplied = SuppliedFields {
                suspension_days: days,
                restriction_action_details: &details,
                has_related_content: true,
            };
            if validate(action, status, &supplied).is_ok() {
                let well_formed = !details.is_empty()
                    && details.iter().all(|d| d.restriction_action != RestrictionAction::None);
                prop_assert_eq!(action == ReportAction::EntitlementRestriction, well_formed);
            }
        }
    }
}
