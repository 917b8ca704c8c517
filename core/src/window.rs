//! Event-time windows.
//!
//! Event times are parsed from a fixed-format timestamp field and bucketed
//! into tumbling or sliding windows. Times are whole seconds: either since
//! the Unix epoch (for full date-times) or since midnight (for time-of-day
//! formats like `%H:%M:%S`).

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, NaiveDateTime, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};

use crate::error::{Result, TallyError};

const SECONDS_PER_DAY: i64 = 86_400;

/// Default event-time format, matching `HH:mm:ss` timestamps.
pub const DEFAULT_TIME_FORMAT: &str = "%H:%M:%S";

/// A half-open event-time interval `[start, end)` in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: i64,
    pub end: i64,
}

impl TimeWindow {
    pub fn new(start: i64, end: i64) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, t: i64) -> bool {
        self.start <= t && t < self.end
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", format_time(self.start), format_time(self.end))
    }
}

fn format_time(seconds: i64) -> String {
    if (0..=SECONDS_PER_DAY).contains(&seconds) {
        let (h, m, s) = (seconds / 3600, (seconds % 3600) / 60, seconds % 60);
        return format!("{:02}:{:02}:{:02}", h, m, s);
    }
    match DateTime::from_timestamp(seconds, 0) {
        Some(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
        None => seconds.to_string(),
    }
}

/// Window definition attached to an aggregation key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowSpec {
    /// Field holding the event timestamp.
    pub time_field: usize,
    /// chrono format string for the timestamp.
    #[serde(default = "default_format")]
    pub format: String,
    #[serde(with = "tally_common::duration::serde_str")]
    pub width: Duration,
    /// Slide interval; `None` means tumbling windows.
    #[serde(default, with = "tally_common::duration::serde_opt_str")]
    pub slide: Option<Duration>,
}

fn default_format() -> String {
    DEFAULT_TIME_FORMAT.to_string()
}

impl WindowSpec {
    pub fn tumbling(time_field: usize, width: Duration) -> Self {
        Self {
            time_field,
            format: default_format(),
            width,
            slide: None,
        }
    }

    pub fn sliding(time_field: usize, width: Duration, slide: Duration) -> Self {
        Self {
            time_field,
            format: default_format(),
            width,
            slide: Some(slide),
        }
    }

    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = format.into();
        self
    }

    fn width_secs(&self) -> i64 {
        self.width.as_secs() as i64
    }

    fn slide_secs(&self) -> i64 {
        self.slide.map(|s| s.as_secs() as i64).unwrap_or(self.width_secs())
    }

    pub fn validate(&self) -> Result<()> {
        if self.width_secs() <= 0 {
            return Err(TallyError::InvalidPlan(
                "window width must be at least one second".to_string(),
            ));
        }
        if let Some(slide) = self.slide {
            let slide = slide.as_secs() as i64;
            if slide <= 0 || slide > self.width_secs() {
                return Err(TallyError::InvalidPlan(format!(
                    "window slide must be between 1s and the width ({}s), got {}s",
                    self.width_secs(),
                    slide
                )));
            }
        }
        Ok(())
    }

    /// Parse an event time; `None` when the text does not match the format.
    pub fn parse_event_time(&self, raw: &str) -> Option<i64> {
        let raw = raw.trim();
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, &self.format) {
            return Some(dt.and_utc().timestamp());
        }
        NaiveTime::parse_from_str(raw, &self.format)
            .ok()
            .map(|t| t.num_seconds_from_midnight() as i64)
    }

    /// Every window containing `t`, earliest first.
    pub fn windows_for(&self, t: i64) -> Vec<TimeWindow> {
        let width = self.width_secs();
        let slide = self.slide_secs();
        let mut start = t - t.rem_euclid(slide);
        let mut windows = Vec::with_capacity((width / slide).max(1) as usize);
        while start > t - width {
            windows.push(TimeWindow::new(start, start + width));
            start -= slide;
        }
        windows.reverse();
        windows
    }
}
