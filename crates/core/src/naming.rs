//! Identifiers and ownership labels for disposable resources.
use std::collections::HashMap;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::config::ConfigError;

/// Label carrying the creation time as `t<unix-seconds>`.
pub const CREATED_AT_LABEL: &str = "createdat";

/// Database ids are limited to 30 characters by the service.
pub const MAX_DATABASE_ID_LEN: usize = 30;

static DATABASE_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z][a-z0-9_-]*$").expect("database prefix pattern is valid"));

/// Labels stamped on every resource this crate creates.
pub fn ownership_labels(owner_label: &str, now: DateTime<Utc>) -> HashMap<String, String> {
    HashMap::from([
        (owner_label.to_string(), "true".to_string()),
        (
            CREATED_AT_LABEL.to_string(),
            encode_created_at(now.timestamp()),
        ),
    ])
}

pub fn encode_created_at(seconds: i64) -> String {
    format!("t{seconds}")
}

/// Reads back a value written by [`encode_created_at`].
///
/// Label values must start with a letter, hence the `t` prefix.
pub fn parse_created_at(value: &str) -> Option<i64> {
    value.strip_prefix('t')?.parse().ok()
}

/// Server-side filter selecting resources that carry the ownership label.
pub fn ownership_filter(owner_label: &str) -> String {
    format!("labels.{owner_label}:*")
}

/// A database id that does not collide with any other run: `<prefix>-<unix-nanos>`.
pub fn unique_database_id(prefix: &str, now: DateTime<Utc>) -> Result<String, ConfigError> {
    if !DATABASE_PREFIX.is_match(prefix) {
        return Err(ConfigError::Invalid(format!(
            "Database prefix '{prefix}' must start with a lowercase letter and contain only a-z, 0-9, _ or -"
        )));
    }
    let nanos = now
        .timestamp_nanos_opt()
        .ok_or_else(|| ConfigError::Invalid(format!("Timestamp {now} out of range")))?;
    let id = format!("{prefix}-{nanos}");
    if id.len() > MAX_DATABASE_ID_LEN {
        return Err(ConfigError::Invalid(format!(
            "Database id '{id}' is longer than {MAX_DATABASE_ID_LEN} characters, use a shorter prefix"
        )));
    }
    Ok(id)
}
