//! Tribunal: report moderation and restriction lifecycle.
//!
//! Reports move through intake, single-owner assignment, adjudication and an
//! optional restoration. Approved adjudications are enforced as account,
//! capability or content restrictions, and every transition is audited.

pub mod assignment;
pub mod audit;
pub mod config;
pub mod database;
pub mod enforcement;
pub mod error;
pub mod events;
pub mod health;
pub mod models;
pub mod policy;
pub mod reports;
pub mod restoration;
pub mod state_machine;
pub mod web;
