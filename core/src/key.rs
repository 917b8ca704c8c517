//! Grouping keys.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::window::TimeWindow;

/// A grouping key: one or more field values, optionally bucketed by an
/// event-time window.
///
/// Grouping only relies on equality and hashing. The derived ordering exists
/// so that ties and unsorted output come out in a stable order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Key {
    window: Option<TimeWindow>,
    parts: Vec<String>,
}

impl Key {
    pub fn new(parts: Vec<String>) -> Self {
        Self {
            window: None,
            parts,
        }
    }

    pub fn single(part: impl Into<String>) -> Self {
        Self::new(vec![part.into()])
    }

    pub fn windowed(window: TimeWindow, parts: Vec<String>) -> Self {
        Self {
            window: Some(window),
            parts,
        }
    }

    pub fn parts(&self) -> &[String] {
        &self.parts
    }

    pub fn window(&self) -> Option<TimeWindow> {
        self.window
    }

    pub fn arity(&self) -> usize {
        self.parts.len()
    }

    /// Keep only the parts at `indices`; the window, if any, is preserved.
    /// Callers validate the indices against the key arity beforehand.
    pub fn project(&self, indices: &[usize]) -> Key {
        Key {
            window: self.window,
            parts: indices
                .iter()
                .filter_map(|&i| self.parts.get(i).cloned())
                .collect(),
        }
    }

    /// The key as output columns: window bounds first (when present), then
    /// the parts.
    pub fn to_columns(&self) -> Vec<String> {
        let mut columns = Vec::with_capacity(self.parts.len() + 2);
        if let Some(window) = self.window {
            columns.push(window.start.to_string());
            columns.push(window.end.to_string());
        }
        columns.extend(self.parts.iter().cloned());
        columns
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(window) = self.window {
            write!(f, "{} ", window)?;
        }
        match self.parts.as_slice() {
            [single] => write!(f, "{}", single),
            parts => write!(f, "({})", parts.join(", ")),
        }
    }
}

impl From<&str> for Key {
    fn from(part: &str) -> Self {
        Key::single(part)
    }
}

impl From<String> for Key {
    fn from(part: String) -> Self {
        Key::single(part)
    }
}

impl From<Vec<&str>> for Key {
    fn from(parts: Vec<&str>) -> Self {
        Key::new(parts.into_iter().map(str::to_string).collect())
    }
}
