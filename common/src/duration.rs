//! Duration parsing for trigger intervals, window widths and watermarks.
//!
//! Accepts the forms used in streaming job definitions, such as
//! `"10 seconds"`, `"2 minutes"` or `"1 minute"`, as well as the compact
//! humantime forms (`"10s"`, `"1m 30s"`).

use std::time::Duration;

use crate::error::{CommonError, ErrorContext, Result};

/// Parse a human readable duration.
///
/// Whitespace between a number and its unit is ignored, so `"10 seconds"`
/// and `"10seconds"` are the same.
pub fn parse_duration(input: &str) -> Result<Duration> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(CommonError::parse_error("empty duration"));
    }

    let normalized = join_number_and_unit(trimmed);
    let duration = humantime::parse_duration(&normalized)
        .with_parse_context(|| format!("invalid duration '{}'", input))?;

    if duration.is_zero() {
        return Err(CommonError::parse_error(format!(
            "duration '{}' must be positive",
            input
        )));
    }
    Ok(duration)
}

/// Format a duration the way humantime prints it, e.g. `1m 30s`.
pub fn format_duration(duration: Duration) -> String {
    humantime::format_duration(duration).to_string()
}

/// Serde adapter storing a `Duration` as a human readable string.
pub mod serde_str {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format_duration(*duration))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let text = String::deserialize(deserializer)?;
        super::parse_duration(&text).map_err(serde::de::Error::custom)
    }
}

/// Serde adapter for `Option<Duration>` stored as a human readable string.
pub mod serde_opt_str {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        duration: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match duration {
            Some(d) => serializer.serialize_some(&super::format_duration(*d)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        Option::<String>::deserialize(deserializer)?
            .map(|text| super::parse_duration(&text).map_err(serde::de::Error::custom))
            .transpose()
    }
}

// "10 seconds 5 ms" -> "10seconds 5ms"
fn join_number_and_unit(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut pending_space = false;
    let mut prev_digit = false;

    for ch in input.chars() {
        if ch.is_whitespace() {
            pending_space = true;
            continue;
        }
        if pending_space && !(prev_digit && ch.is_alphabetic()) && !out.is_empty() {
            out.push(' ');
        }
        pending_space = false;
        prev_digit = ch.is_ascii_digit();
        out.push(ch);
    }
    out
}
