//! Writing result rows to directories of part files.
//!
//! Output follows the usual layout for partitioned datasets: a destination
//! directory holding `part-NNNNN-<uuid>.<ext>` files, optionally nested in
//! `column=value` directories, and a `_SUCCESS` marker once the write is
//! complete.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tally_common::ErrorContext;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{Result, TallyError};

/// Directory name used for empty partition values.
pub const DEFAULT_PARTITION_NAME: &str = "__HIVE_DEFAULT_PARTITION__";

/// Marker file written after a successful write.
pub const SUCCESS_MARKER: &str = "_SUCCESS";

/// What to do when the destination already exists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SaveMode {
    /// Add new part files next to the existing ones.
    Append,
    /// Replace the destination.
    Overwrite,
    /// Leave the destination alone and write nothing.
    Ignore,
    /// Fail with [`TallyError::PathExists`].
    #[default]
    ErrorIfExists,
}

impl FromStr for SaveMode {
    type Err = TallyError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "append" => Ok(SaveMode::Append),
            "overwrite" => Ok(SaveMode::Overwrite),
            "ignore" => Ok(SaveMode::Ignore),
            "error" | "errorifexists" => Ok(SaveMode::ErrorIfExists),
            other => Err(TallyError::InvalidPlan(format!(
                "unknown save mode '{}', expected append, overwrite, ignore or error",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileFormat {
    #[default]
    Csv,
    /// One JSON object per line.
    Json,
}

impl FileFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            FileFormat::Csv => "csv",
            FileFormat::Json => "json",
        }
    }
}

impl FromStr for FileFormat {
    type Err = TallyError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "csv" => Ok(FileFormat::Csv),
            "json" => Ok(FileFormat::Json),
            other => Err(TallyError::InvalidPlan(format!("unknown file format '{}'", other))),
        }
    }
}

fn default_num_files() -> usize {
    1
}

fn default_delimiter() -> char {
    ','
}

/// Where and how rows are written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteOptions {
    pub path: PathBuf,
    #[serde(default)]
    pub mode: SaveMode,
    #[serde(default)]
    pub format: FileFormat,
    /// Column indices whose values become `name=value` directories.
    #[serde(default)]
    pub partition_by: Vec<usize>,
    /// Part files per output directory.
    #[serde(default = "default_num_files")]
    pub num_files: usize,
    /// Column names; defaults to names derived from the result.
    #[serde(default)]
    pub columns: Option<Vec<String>>,
    #[serde(default = "default_delimiter")]
    pub delimiter: char,
    /// Write a header line at the top of every CSV file.
    #[serde(default)]
    pub header: bool,
}

impl WriteOptions {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            mode: SaveMode::default(),
            format: FileFormat::default(),
            partition_by: Vec::new(),
            num_files: default_num_files(),
            columns: None,
            delimiter: default_delimiter(),
            header: false,
        }
    }

    pub fn mode(mut self, mode: SaveMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn format(mut self, format: FileFormat) -> Self {
        self.format = format;
        self
    }

    pub fn partition_by<I: IntoIterator<Item = usize>>(mut self, columns: I) -> Self {
        self.partition_by = columns.into_iter().collect();
        self
    }

    pub fn num_files(mut self, num_files: usize) -> Self {
        self.num_files = num_files;
        self
    }

    pub fn columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    pub fn delimiter(mut self, delimiter: char) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn header(mut self, header: bool) -> Self {
        self.header = header;
        self
    }
}

/// What a write did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteSummary {
    pub path: PathBuf,
    /// Part files created, in creation order.
    pub files: Vec<PathBuf>,
    pub rows_written: usize,
    /// True when the destination existed and [`SaveMode::Ignore`] applied.
    pub skipped: bool,
}

/// Write `rows` under `options.path`. `default_columns` names the columns
/// when `options.columns` is not set.
pub fn write_rows(
    rows: &[Vec<String>],
    default_columns: &[String],
    options: &WriteOptions,
) -> Result<WriteSummary> {
    // Ragged rows are padded to the widest one.
    let width = rows
        .iter()
        .map(Vec::len)
        .max()
        .unwrap_or(default_columns.len());
    let columns = resolve_columns(width, default_columns, options)?;
    if !rows.is_empty() {
        validate_partitioning(&columns, options)?;
    }
    if options.format == FileFormat::Csv && !options.delimiter.is_ascii() {
        return Err(TallyError::InvalidPlan(format!(
            "csv delimiter must be ASCII, got {:?}",
            options.delimiter
        )));
    }
    let rows: Vec<Vec<String>> = rows.iter().map(|row| pad_row(row, width)).collect();

    let path = &options.path;
    if path.exists() {
        match options.mode {
            SaveMode::ErrorIfExists => return Err(TallyError::PathExists(path.clone())),
            SaveMode::Ignore => {
                info!("{} exists, skipping write", path.display());
                return Ok(WriteSummary {
                    path: path.clone(),
                    skipped: true,
                    ..WriteSummary::default()
                });
            }
            SaveMode::Overwrite => {
                warn!("Overwriting {}", path.display());
                remove_path(path)?;
            }
            SaveMode::Append => debug!("Appending to {}", path.display()),
        }
    }
    fs::create_dir_all(path).with_io_context(|| format!("creating {}", path.display()))?;

    let job_id = Uuid::new_v4();
    let data_columns: Vec<String> = columns
        .iter()
        .enumerate()
        .filter(|(i, _)| !options.partition_by.contains(i))
        .map(|(_, name)| name.clone())
        .collect();

    let mut summary = WriteSummary {
        path: path.clone(),
        ..WriteSummary::default()
    };
    for (values, group) in group_by_partition(&rows, &options.partition_by) {
        let dir = partition_dir(path, &columns, &options.partition_by, &values);
        fs::create_dir_all(&dir).with_io_context(|| format!("creating {}", dir.display()))?;

        let num_files = options.num_files.max(1).min(group.len().max(1));
        let chunk_size = group.len().div_ceil(num_files).max(1);
        for (index, chunk) in group.chunks(chunk_size).enumerate() {
            let file = dir.join(format!(
                "part-{:05}-{}.{}",
                index,
                job_id,
                options.format.extension()
            ));
            write_part(&file, chunk, &data_columns, options)?;
            summary.rows_written += chunk.len();
            summary.files.push(file);
        }
    }

    File::create(path.join(SUCCESS_MARKER))
        .with_io_context(|| format!("writing marker in {}", path.display()))?;
    info!(
        "Wrote {} rows to {} files under {}",
        summary.rows_written,
        summary.files.len(),
        path.display()
    );
    Ok(summary)
}

fn resolve_columns(
    width: usize,
    default_columns: &[String],
    options: &WriteOptions,
) -> Result<Vec<String>> {
    match &options.columns {
        Some(columns) if columns.len() == width => Ok(columns.clone()),
        Some(columns) => Err(TallyError::InvalidPlan(format!(
            "{} column names given for rows with {} columns",
            columns.len(),
            width
        ))),
        None if default_columns.len() == width => Ok(default_columns.to_vec()),
        None => Ok((0..width).map(|i| format!("_c{}", i)).collect()),
    }
}

fn validate_partitioning(columns: &[String], options: &WriteOptions) -> Result<()> {
    if let Some(&column) = options.partition_by.iter().find(|&&c| c >= columns.len()) {
        return Err(TallyError::InvalidPlan(format!(
            "partition column {} is out of range for {} columns",
            column,
            columns.len()
        )));
    }
    if !columns.is_empty()
        && (0..columns.len()).all(|i| options.partition_by.contains(&i))
    {
        return Err(TallyError::InvalidPlan(
            "cannot use all columns for partitioning".to_string(),
        ));
    }
    Ok(())
}

fn remove_path(path: &Path) -> Result<()> {
    let result = if path.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };
    result.with_io_context(|| format!("removing {}", path.display()))?;
    Ok(())
}

fn pad_row(row: &[String], width: usize) -> Vec<String> {
    let mut padded = row.to_vec();
    padded.resize(width, String::new());
    padded
}

/// Rows grouped by their partition values, with the partition columns
/// removed. Groups come out in value order; rows keep their order.
fn group_by_partition(
    rows: &[Vec<String>],
    partition_by: &[usize],
) -> BTreeMap<Vec<String>, Vec<Vec<String>>> {
    let mut groups: BTreeMap<Vec<String>, Vec<Vec<String>>> = BTreeMap::new();
    for row in rows {
        let values = partition_by
            .iter()
            .map(|&i| row.get(i).cloned().unwrap_or_default())
            .collect();
        let data = row
            .iter()
            .enumerate()
            .filter(|(i, _)| !partition_by.contains(i))
            .map(|(_, value)| value.clone())
            .collect();
        groups.entry(values).or_default().push(data);
    }
    groups
}

fn partition_dir(root: &Path, columns: &[String], partition_by: &[usize], values: &[String]) -> PathBuf {
    partition_by
        .iter()
        .zip(values)
        .fold(root.to_path_buf(), |dir, (&column, value)| {
            dir.join(format!("{}={}", escape_path_name(&columns[column]), escape_partition_value(value)))
        })
}

fn escape_partition_value(value: &str) -> String {
    if value.is_empty() {
        DEFAULT_PARTITION_NAME.to_string()
    } else {
        escape_path_name(value)
    }
}

fn needs_escaping(c: char) -> bool {
    c.is_ascii_control()
        || matches!(
            c,
            '"' | '#' | '%' | '\'' | '*' | '/' | ':' | '=' | '?' | '\\' | '{' | '[' | ']' | '^'
        )
}

/// Percent-escape characters that are unsafe in a directory name.
pub fn escape_path_name(name: &str) -> String {
    let mut escaped = String::with_capacity(name.len());
    for c in name.chars() {
        if needs_escaping(c) {
            escaped.push_str(&format!("%{:02X}", c as u32));
        } else {
            escaped.push(c);
        }
    }
    escaped
}

fn write_part(
    file: &Path,
    rows: &[Vec<String>],
    columns: &[String],
    options: &WriteOptions,
) -> Result<()> {
    let handle = File::create(file).with_io_context(|| format!("creating {}", file.display()))?;
    match options.format {
        FileFormat::Csv => {
            let mut writer = csv::WriterBuilder::new()
                .delimiter(options.delimiter as u8)
                .from_writer(handle);
            if options.header {
                writer.write_record(columns)?;
            }
            for row in rows {
                writer.write_record(row)?;
            }
            writer.flush()?;
        }
        FileFormat::Json => {
            let mut writer = BufWriter::new(handle);
            for row in rows {
                let object: Map<String, Value> = columns
                    .iter()
                    .zip(row)
                    .map(|(name, value)| (name.clone(), json_value(value)))
                    .collect();
                serde_json::to_writer(&mut writer, &object)?;
                writer.write_all(b"\n")?;
            }
            writer.flush()?;
        }
    }
    debug!("Wrote {} rows to {}", rows.len(), file.display());
    Ok(())
}

/// Integers written in canonical form become JSON numbers; everything else
/// stays a string.
fn json_value(value: &str) -> Value {
    match value.parse::<i64>() {
        Ok(n) if n.to_string() == value => Value::from(n),
        _ => Value::String(value.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(raw: &[&[&str]]) -> Vec<Vec<String>> {
        raw.iter()
            .map(|row| row.iter().map(|s| s.to_string()).collect())
            .collect()
    }

    #[test]
    fn test_save_mode_from_str() {
        assert_eq!("Overwrite".parse::<SaveMode>().unwrap(), SaveMode::Overwrite);
        assert_eq!("error".parse::<SaveMode>().unwrap(), SaveMode::ErrorIfExists);
        assert_eq!("errorifexists".parse::<SaveMode>().unwrap(), SaveMode::ErrorIfExists);
        assert!("replace".parse::<SaveMode>().is_err());
    }

    #[test]
    fn test_escape_path_name() {
        assert_eq!(escape_path_name("a/b=c%d"), "a%2Fb%3Dc%25d");
        assert_eq!(escape_path_name("plain value"), "plain value");
        assert_eq!(escape_partition_value(""), DEFAULT_PARTITION_NAME);
    }

    #[test]
    fn test_json_value() {
        assert_eq!(json_value("42"), Value::from(42));
        assert_eq!(json_value("-7"), Value::from(-7));
        assert_eq!(json_value("007"), Value::String("007".to_string()));
        assert_eq!(json_value("x"), Value::String("x".to_string()));
    }

    #[test]
    fn test_group_by_partition_removes_columns() {
        let groups = group_by_partition(
            &rows(&[&["US", "CA", "3"], &["DE", "BE", "1"], &["US", "NY", "2"]]),
            &[0],
        );
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[&vec!["US".to_string()]], rows(&[&["CA", "3"], &["NY", "2"]]));
    }

    #[test]
    fn test_resolve_columns() {
        let defaults = vec!["key".to_string(), "total".to_string()];
        let options = WriteOptions::new("/tmp/unused");
        assert_eq!(resolve_columns(2, &defaults, &options).unwrap(), defaults);
        assert_eq!(resolve_columns(3, &defaults, &options).unwrap(), vec!["_c0", "_c1", "_c2"]);
        let named = options.columns(["only_one"]);
        assert!(resolve_columns(2, &defaults, &named).is_err());
    }

    #[test]
    fn test_partition_by_every_column_rejected() {
        let options = WriteOptions::new("/tmp/unused").partition_by([0, 1]);
        let columns = vec!["a".to_string(), "b".to_string()];
        assert!(validate_partitioning(&columns, &options).is_err());
    }
}
