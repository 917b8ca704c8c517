//! Records and the formats raw lines are parsed from.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, TallyError};

/// An ordered sequence of string fields. Fields are addressed by position
/// only; there is no schema.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Record {
    fields: Vec<String>,
}

impl Record {
    pub fn new(fields: Vec<String>) -> Self {
        Self { fields }
    }

    /// Split a raw line on `delimiter`. No quoting rules are applied.
    pub fn split(line: &str, delimiter: char) -> Self {
        Self {
            fields: line.split(delimiter).map(str::to_string).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn into_fields(self) -> Vec<String> {
        self.fields
    }

    /// Field at `index`, or a `FieldIndex` error when the record is short.
    pub fn field(&self, index: usize) -> Result<&str> {
        self.fields
            .get(index)
            .map(String::as_str)
            .ok_or(TallyError::FieldIndex {
                index,
                len: self.fields.len(),
            })
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.fields.get(index).map(String::as_str)
    }

    /// Project the record onto `indices`, in that order.
    pub fn select(&self, indices: &[usize]) -> Result<Record> {
        let fields = indices
            .iter()
            .map(|&i| self.field(i).map(str::to_string))
            .collect::<Result<Vec<_>>>()?;
        Ok(Record { fields })
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({})", self.fields.join(", "))
    }
}

impl<S: Into<String>> FromIterator<S> for Record {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().map(Into::into).collect(),
        }
    }
}

/// How a raw text line becomes a [`Record`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RecordFormat {
    /// Fields separated by a single delimiter character.
    Delimited {
        delimiter: char,
        #[serde(default)]
        skip_header: bool,
    },
    /// One JSON object per line, projected onto `columns` in order.
    /// Missing keys and nulls become empty fields.
    JsonLines { columns: Vec<String> },
}

impl Default for RecordFormat {
    fn default() -> Self {
        RecordFormat::Delimited {
            delimiter: ',',
            skip_header: false,
        }
    }
}

impl RecordFormat {
    pub fn delimited(delimiter: char) -> Self {
        RecordFormat::Delimited {
            delimiter,
            skip_header: false,
        }
    }

    /// Comma separated with a header line at the top of every file.
    pub fn csv_with_header() -> Self {
        RecordFormat::Delimited {
            delimiter: ',',
            skip_header: true,
        }
    }

    pub fn json_lines<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        RecordFormat::JsonLines {
            columns: columns.into_iter().map(Into::into).collect(),
        }
    }

    /// Whether the first line of every input file is a header.
    pub fn skip_header(&self) -> bool {
        matches!(
            self,
            RecordFormat::Delimited {
                skip_header: true,
                ..
            }
        )
    }

    /// Delimiter used when the record is rendered back to text.
    pub fn delimiter(&self) -> char {
        match self {
            RecordFormat::Delimited { delimiter, .. } => *delimiter,
            RecordFormat::JsonLines { .. } => ',',
        }
    }

    pub(crate) fn validate(&self) -> Result<()> {
        match self {
            RecordFormat::Delimited { delimiter, .. } if matches!(delimiter, '\n' | '\r') => Err(
                TallyError::InvalidPlan("delimiter cannot be a line terminator".to_string()),
            ),
            RecordFormat::JsonLines { columns } if columns.is_empty() => Err(
                TallyError::InvalidPlan("json_lines format needs at least one column".to_string()),
            ),
            _ => Ok(()),
        }
    }

    /// Parse one raw line.
    pub fn parse_line(&self, line: &str) -> Result<Record> {
        match self {
            RecordFormat::Delimited { delimiter, .. } => Ok(Record::split(line, *delimiter)),
            RecordFormat::JsonLines { columns } => {
                let value: Value =
                    serde_json::from_str(line).map_err(|e| TallyError::Malformed {
                        reason: e.to_string(),
                    })?;
                let object = value.as_object().ok_or_else(|| TallyError::Malformed {
                    reason: "expected a JSON object".to_string(),
                })?;
                Ok(columns
                    .iter()
                    .map(|column| object.get(column).map(json_field).unwrap_or_default())
                    .collect())
            }
        }
    }
}

fn json_field(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
