use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tally_common::parse_duration;

use crate::error::{Result, TallyError};

/// When the next micro-batch is processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    /// Start a batch every interval. A zero interval processes batches as
    /// fast as input arrives.
    ProcessingTime(#[serde(with = "interval")] Duration),
    /// Process one batch and stop.
    Once,
    /// Process everything available now, in as many batches as the source
    /// yields, then stop.
    AvailableNow,
}

impl Default for Trigger {
    fn default() -> Self {
        Trigger::ProcessingTime(Duration::ZERO)
    }
}

impl Trigger {
    /// Processing-time trigger from a string such as `"10 seconds"`.
    pub fn processing_time(interval: &str) -> Result<Self> {
        Ok(Trigger::ProcessingTime(parse_duration(interval)?))
    }
}

// Like `duration::serde_str`, but a zero interval round-trips as "0s".
mod interval {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};
    use tally_common::duration::{format_duration, parse_duration};

    pub fn serialize<S: Serializer>(interval: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format_duration(*interval))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let text = String::deserialize(deserializer)?;
        if matches!(text.trim(), "0" | "0s") {
            return Ok(Duration::ZERO);
        }
        parse_duration(&text).map_err(serde::de::Error::custom)
    }
}

/// Which rows are emitted at each trigger.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputMode {
    /// Only rows that are new and final.
    #[default]
    Append,
    /// Rows whose key changed in this batch.
    Update,
    /// The entire result table.
    Complete,
}

impl OutputMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputMode::Append => "append",
            OutputMode::Update => "update",
            OutputMode::Complete => "complete",
        }
    }
}

impl fmt::Display for OutputMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutputMode {
    type Err = TallyError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "append" => Ok(OutputMode::Append),
            "update" => Ok(OutputMode::Update),
            "complete" => Ok(OutputMode::Complete),
            other => Err(TallyError::InvalidPlan(format!("unknown output mode '{}'", other))),
        }
    }
}
