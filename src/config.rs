//! Configuration loading from environment.
//!
//! Every setting has a default. A variable that is set but cannot be parsed
//! is a configuration error rather than a silent fallback.

use std::env;
use std::str::FromStr;

use crate::error::{Result, TribunalError};
use crate::reports::PageLimits;
use crate::state_machine::RestorePolicy;

pub const DEFAULT_DATABASE_PATH: &str = "tribunal.db";
pub const DEFAULT_WEB_PORT: u16 = 8081;
pub const DEFAULT_HEALTH_PORT: u16 = 8080;
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 1000;
pub const DEFAULT_PAGE_SIZE: u32 = 50;
pub const DEFAULT_MAX_PAGE_SIZE: u32 = 100;

/// Main configuration for the Tribunal service.
#[derive(Debug, Clone, PartialEq)]
pub struct TribunalConfig {
    /// SQLite database file.
    pub database_path: String,
    /// Port for the report API.
    pub web_port: u16,
    /// Port for the health endpoint.
    pub health_port: u16,
    /// Capacity of the domain event channel.
    pub event_buffer_size: usize,
    pub page_limits: PageLimits,
    pub restore_policy: RestorePolicy,
}

impl Default for TribunalConfig {
    fn default() -> Self {
        Self {
            database_path: DEFAULT_DATABASE_PATH.to_string(),
            web_port: DEFAULT_WEB_PORT,
            health_port: DEFAULT_HEALTH_PORT,
            event_buffer_size: DEFAULT_EVENT_BUFFER_SIZE,
            page_limits: PageLimits {
                default_size: DEFAULT_PAGE_SIZE,
                max_size: DEFAULT_MAX_PAGE_SIZE,
            },
            restore_policy: RestorePolicy::default(),
        }
    }
}

impl TribunalConfig {
    /// Load configuration from environment variables.
    ///
    /// Optional environment variables:
    /// - `DATABASE_PATH`: SQLite file (default: tribunal.db)
    /// - `WEB_PORT`: API port (default: 8081)
    /// - `HEALTH_PORT`: Health check port (default: 8080)
    /// - `EVENT_BUFFER_SIZE`: Event channel capacity (default: 1000)
    /// - `DEFAULT_PAGE_SIZE`: Listing page size (default: 50)
    /// - `MAX_PAGE_SIZE`: Largest page a caller may request (default: 100)
    /// - `RESTORE_USER_REQUIRES_OWNER`: Only the owner may restore a user (default: true)
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let database_path = lookup("DATABASE_PATH")
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .unwrap_or(defaults.database_path);

        let default_size = parse_var(&lookup, "DEFAULT_PAGE_SIZE", DEFAULT_PAGE_SIZE)?;
        let max_size = parse_var(&lookup, "MAX_PAGE_SIZE", DEFAULT_MAX_PAGE_SIZE)?;
        if default_size == 0 || max_size == 0 {
            return Err(TribunalError::Config(
                "page sizes must be greater than zero".to_string(),
            ));
        }
        if default_size > max_size {
            return Err(TribunalError::Config(format!(
                "DEFAULT_PAGE_SIZE ({}) exceeds MAX_PAGE_SIZE ({})",
                default_size, max_size
            )));
        }

        let event_buffer_size = parse_var(&lookup, "EVENT_BUFFER_SIZE", DEFAULT_EVENT_BUFFER_SIZE)?;
        if event_buffer_size == 0 {
            return Err(TribunalError::Config(
                "EVENT_BUFFER_SIZE must be greater than zero".to_string(),
            ));
        }

        Ok(Self {
            database_path,
            web_port: parse_var(&lookup, "WEB_PORT", DEFAULT_WEB_PORT)?,
            health_port: parse_var(&lookup, "HEALTH_PORT", DEFAULT_HEALTH_PORT)?,
            event_buffer_size,
            page_limits: PageLimits {
                default_size,
                max_size,
            },
            restore_policy: RestorePolicy {
                require_owner_for_user_restore: parse_bool(
                    &lookup,
                    "RESTORE_USER_REQUIRES_OWNER",
                    true,
                )?,
            },
        })
    }
}

fn parse_var<F, T>(lookup: &F, name: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| TribunalError::Config(format!("Invalid {} '{}': {}", name, raw, e))),
        None => Ok(default),
    }
}

fn parse_bool<F>(lookup: &F, name: &str, default: bool) -> Result<bool>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        Some(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(TribunalError::Config(format!(
                "Invalid {} '{}': expected true or false",
                name, raw
            ))),
        },
        None => Ok(default),
    }
}
