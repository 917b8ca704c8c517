//! Line sources for batch pipelines.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tally_common::ErrorContext;
use tracing::debug;

use crate::error::Result;
use crate::record::RecordFormat;

/// Where a batch pipeline reads its raw lines from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    /// Lines held in memory.
    Lines(Vec<String>),
    /// A file, or a directory read recursively.
    Path(PathBuf),
}

impl Source {
    pub fn lines<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Source::Lines(lines.into_iter().map(Into::into).collect())
    }

    pub fn path(path: impl Into<PathBuf>) -> Self {
        Source::Path(path.into())
    }

    /// Read every line. With a header-skipping format the first line of
    /// each file (or of the in-memory lines) is dropped.
    pub fn read_lines(&self, format: &RecordFormat) -> Result<Vec<String>> {
        let skip_header = format.skip_header();
        match self {
            Source::Lines(lines) => Ok(lines
                .iter()
                .skip(usize::from(skip_header))
                .cloned()
                .collect()),
            Source::Path(path) => {
                let mut lines = Vec::new();
                for file in list_data_files(path)? {
                    lines.extend(read_file_lines(&file, skip_header)?);
                }
                Ok(lines)
            }
        }
    }
}

/// Data files under `path` in name order. A plain file is returned as is;
/// directories are walked recursively and entries whose names start with
/// `_` or `.` (markers, hidden files) are skipped.
pub fn list_data_files(path: &Path) -> Result<Vec<PathBuf>> {
    let metadata = std::fs::metadata(path)
        .with_io_context(|| format!("reading input {}", path.display()))?;
    if metadata.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }

    let mut files = Vec::new();
    let mut pending = vec![path.to_path_buf()];
    while let Some(dir) = pending.pop() {
        let entries = std::fs::read_dir(&dir)
            .with_io_context(|| format!("listing directory {}", dir.display()))?;
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.starts_with('_') || name.starts_with('.') {
                continue;
            }
            let entry_path = entry.path();
            if entry.file_type()?.is_dir() {
                pending.push(entry_path);
            } else {
                files.push(entry_path);
            }
        }
    }
    files.sort();
    debug!("Found {} data files under {}", files.len(), path.display());
    Ok(files)
}

/// Read all lines of one file, stripping `\r` line endings.
pub fn read_file_lines(path: &Path, skip_header: bool) -> Result<Vec<String>> {
    let file = File::open(path).with_io_context(|| format!("opening {}", path.display()))?;
    let mut lines = Vec::new();
    for line in BufReader::new(file).lines().skip(usize::from(skip_header)) {
        let mut line = line?;
        if line.ends_with('\r') {
            line.pop();
        }
        lines.push(line);
    }
    Ok(lines)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_in_memory_lines() {
        let source = Source::lines(["a,1", "b,2"]);
        assert_eq!(
            source.read_lines(&RecordFormat::default()).unwrap(),
            vec!["a,1", "b,2"]
        );
        assert_eq!(
            source.read_lines(&RecordFormat::csv_with_header()).unwrap(),
            vec!["b,2"]
        );
    }

    #[test]
    fn test_directory_skips_markers_and_headers() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("part-00001.csv"), "h\nc,3\n").unwrap();
        fs::write(dir.path().join("part-00000.csv"), "h\r\na,1\r\nb,2\r\n").unwrap();
        fs::write(dir.path().join("_SUCCESS"), "").unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();
        fs::write(dir.path().join("nested").join("part-00002.csv"), "h\nd,4\n").unwrap();

        let lines = Source::path(dir.path())
            .read_lines(&RecordFormat::csv_with_header())
            .unwrap();
        assert_eq!(lines, vec!["d,4", "a,1", "b,2", "c,3"]);
    }

    #[test]
    fn test_missing_path_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Source::path(dir.path().join("nope"))
            .read_lines(&RecordFormat::default())
            .is_err());
    }
}
