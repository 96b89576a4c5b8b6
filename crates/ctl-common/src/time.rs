//! ---
//! ctl_section: "01-core-functionality"
//! ctl_subsection: "module"
//! ctl_type: "source"
//! ctl_scope: "code"
//! ctl_description: "Shared primitives and utilities for the harness runtime."
//! ctl_version: "v0.0.0-prealpha"
//! ctl_owner: "tbd"
//! ---
use chrono::{DateTime, Utc};

/// Format an instant as a `<seconds>:<nanoseconds>` timestamp, the form used by
/// connection-management activation fields.
pub fn activation_timestamp(at: DateTime<Utc>) -> String {
    format!("{}:{}", at.timestamp(), at.timestamp_subsec_nanos())
}

/// Current time as an activation timestamp.
pub fn activation_timestamp_now() -> String {
    activation_timestamp(Utc::now())
}

/// Seconds since the Unix epoch with sub-second precision.
pub fn unix_seconds(at: DateTime<Utc>) -> f64 {
    at.timestamp() as f64 + f64::from(at.timestamp_subsec_nanos()) / 1_000_000_000.0
}

pub fn unix_seconds_now() -> f64 {
    unix_seconds(Utc::now())
}
