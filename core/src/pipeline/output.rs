//! Pipeline results and run statistics.

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::key::Key;
use crate::record::Record;

/// Counters collected while running a pipeline. Counters from different
/// partitions are summed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    /// Raw lines seen.
    pub lines_read: u64,
    /// Records dropped for missing fields or unparseable lines.
    pub malformed: u64,
    /// Records dropped because a value or event time did not parse.
    pub unparseable: u64,
    /// Records removed by filter stages.
    pub filtered: u64,
    /// Records whose windows were all behind the watermark.
    pub late: u64,
    /// Largest event time seen, in seconds.
    pub max_event_time: Option<i64>,
}

impl RunStats {
    pub fn merge(&mut self, other: &RunStats) {
        self.lines_read += other.lines_read;
        self.malformed += other.malformed;
        self.unparseable += other.unparseable;
        self.filtered += other.filtered;
        self.late += other.late;
        self.max_event_time = match (self.max_event_time, other.max_event_time) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };
    }

    /// Records dropped for bad input (not counting filters).
    pub fn dropped(&self) -> u64 {
        self.malformed + self.unparseable + self.late
    }
}

/// Rows produced by a pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Output {
    /// `(key, total)` pairs from an aggregating pipeline.
    Ranked(Vec<(Key, i64)>),
    /// Records from a pipeline without aggregation.
    Records(Vec<Record>),
}

impl Output {
    pub fn len(&self) -> usize {
        match self {
            Output::Ranked(rows) => rows.len(),
            Output::Records(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn totals(&self) -> Option<&[(Key, i64)]> {
        match self {
            Output::Ranked(rows) => Some(rows),
            Output::Records(_) => None,
        }
    }

    pub fn records(&self) -> Option<&[Record]> {
        match self {
            Output::Records(rows) => Some(rows),
            Output::Ranked(_) => None,
        }
    }

    /// Rows flattened to string columns; totals become key columns followed
    /// by the total.
    pub fn to_rows(&self) -> Vec<Vec<String>> {
        match self {
            Output::Ranked(rows) => rows
                .iter()
                .map(|(key, total)| {
                    let mut columns = key.to_columns();
                    columns.push(total.to_string());
                    columns
                })
                .collect(),
            Output::Records(rows) => rows.iter().map(|r| r.fields().to_vec()).collect(),
        }
    }

    /// Default column names for [`Output::to_rows`].
    pub fn default_columns(&self) -> Vec<String> {
        match self {
            Output::Ranked(rows) => {
                let Some((key, _)) = rows.first() else {
                    return vec!["key".to_string(), "total".to_string()];
                };
                let mut columns = Vec::new();
                if key.window().is_some() {
                    columns.push("window_start".to_string());
                    columns.push("window_end".to_string());
                }
                match key.arity() {
                    1 => columns.push("key".to_string()),
                    n => columns.extend((0..n).map(|i| format!("key_{}", i))),
                }
                columns.push("total".to_string());
                columns
            }
            Output::Records(rows) => {
                let width = rows.iter().map(Record::len).max().unwrap_or(0);
                (0..width).map(|i| format!("_c{}", i)).collect()
            }
        }
    }

    /// Render as an ASCII table, at most `max_rows` rows.
    pub fn render_table(&self, max_rows: usize) -> String {
        render_table(&self.default_columns(), &self.to_rows(), max_rows)
    }
}

/// Result of a batch pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineOutput {
    pub output: Output,
    pub stats: RunStats,
}

/// Render rows as a console table in the usual `+---+` style.
pub fn render_table(headers: &[String], rows: &[Vec<String>], max_rows: usize) -> String {
    let shown = &rows[..rows.len().min(max_rows)];
    let columns = shown.iter().map(Vec::len).chain([headers.len()]).max().unwrap_or(0);
    let mut widths = vec![0usize; columns];
    for row in std::iter::once(headers).chain(shown.iter().map(Vec::as_slice)) {
        for (i, cell) in row.iter().enumerate() {
            widths[i] = widths[i].max(cell.chars().count());
        }
    }

    let border: String = widths
        .iter()
        .fold(String::from("+"), |mut acc, w| {
            acc.push_str(&"-".repeat(*w));
            acc.push('+');
            acc
        });

    let render_row = |row: &[String]| {
        let mut line = String::from("|");
        for (i, width) in widths.iter().enumerate() {
            let cell = row.get(i).map(String::as_str).unwrap_or("");
            let _ = write!(line, "{:<width$}|", cell, width = width);
        }
        line
    };

    let mut out = String::new();
    let _ = writeln!(out, "{}", border);
    let _ = writeln!(out, "{}", render_row(headers));
    let _ = writeln!(out, "{}", border);
    for row in shown {
        let _ = writeln!(out, "{}", render_row(row));
    }
    let _ = writeln!(out, "{}", border);
    if rows.len() > shown.len() {
        let _ = writeln!(out, "only showing top {} rows", shown.len());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::window::TimeWindow;

    #[test]
    fn test_stats_merge() {
        let mut a = RunStats {
            lines_read: 3,
            malformed: 1,
            max_event_time: Some(10),
            ..RunStats::default()
        };
        let b = RunStats {
            lines_read: 2,
            unparseable: 1,
            late: 1,
            max_event_time: Some(30),
            ..RunStats::default()
        };
        a.merge(&b);
        assert_eq!(a.lines_read, 5);
        assert_eq!(a.dropped(), 3);
        assert_eq!(a.max_event_time, Some(30));
    }

    #[test]
    fn test_totals_to_rows() {
        let output = Output::Ranked(vec![(Key::from(vec!["Civic", "Japan"]), 12)]);
        assert_eq!(output.to_rows(), vec![vec!["Civic", "Japan", "12"]]);
        assert_eq!(output.default_columns(), vec!["key_0", "key_1", "total"]);
    }

    #[test]
    fn test_windowed_columns() {
        let key = Key::windowed(TimeWindow::new(0, 60), vec!["ABC".to_string()]);
        let output = Output::Ranked(vec![(key, 5)]);
        assert_eq!(
            output.default_columns(),
            vec!["window_start", "window_end", "key", "total"]
        );
    }

    #[test]
    fn test_render_table() {
        let output = Output::Ranked(vec![(Key::from("A"), 17), (Key::from("B"), 5)]);
        let table = output.render_table(1);
        let expected = "\
+---+-----+
|key|total|
+---+-----+
|A  |17   |
+---+-----+
only showing top 1 rows
";
        assert_eq!(table, expected);
    }
}
