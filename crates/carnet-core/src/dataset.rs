//! External dataset format.
//!
//! A dataset is a delimited text export named `<key>_<YYYYMMDD>_PG.csv`.
//! The name carries the provenance stamp; the content is a header line
//! followed by one row per post. Quoted cells may contain the delimiter and
//! doubled quotes, but not line breaks.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::defaults::DATASET_DELIMITER;
use crate::error::{Error, Result};
use crate::normalize::normalize_eol;

/// `<key>_<YYYYMMDD>_PG.csv`
static DATASET_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([a-z0-9-]+)_(\d{8})_PG\.csv$").expect("valid dataset name regex"));

static DATASET_KEY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9-]+$").expect("valid dataset key regex"));

/// Optional first-line delimiter directive, e.g. `sep=;`.
static SEP_DIRECTIVE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^sep=([;,])$").expect("valid sep directive regex"));

// =============================================================================
// DATASET STAMP
// =============================================================================

/// Provenance parsed from a dataset file name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DatasetStamp {
    /// Dataset family, e.g. `minutes`.
    pub key: String,
    /// Dataset version as `YYYYMMDD`, compared numerically.
    pub id: i64,
}

impl DatasetStamp {
    /// Build a stamp, enforcing the same shape as a parsed file name.
    pub fn new(key: impl Into<String>, id: i64) -> Result<Self> {
        let stamp = Self { key: key.into(), id };
        stamp.validate()?;
        Ok(stamp)
    }

    /// Check the key charset and the eight-digit id.
    pub fn validate(&self) -> Result<()> {
        if !DATASET_KEY.is_match(&self.key) || !(0..=99_999_999).contains(&self.id) {
            return Err(Error::InvalidDatasetName(format!(
                "{}_{:08}{}",
                self.key,
                self.id,
                crate::defaults::DATASET_NAME_SUFFIX
            )));
        }
        Ok(())
    }
}

impl fmt::Display for DatasetStamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.key, self.id)
    }
}

/// Parse `<key>_<YYYYMMDD>_PG.csv`. Directory components are ignored.
pub fn parse_dataset_name(name: &str) -> Result<DatasetStamp> {
    let file_name = Path::new(name)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(name);

    let caps = DATASET_NAME
        .captures(file_name)
        .ok_or_else(|| Error::InvalidDatasetName(file_name.to_string()))?;

    let id = caps[2]
        .parse::<i64>()
        .map_err(|_| Error::InvalidDatasetName(file_name.to_string()))?;

    Ok(DatasetStamp {
        key: caps[1].to_string(),
        id,
    })
}

// =============================================================================
// ROWS
// =============================================================================

/// One data row: header name to trimmed cell text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalRow {
    /// 0-based position among the data rows.
    pub index: usize,
    pub cells: BTreeMap<String, String>,
}

impl ExternalRow {
    pub fn new(index: usize, cells: BTreeMap<String, String>) -> Self {
        Self { index, cells }
    }

    /// Build a row from `(column, value)` pairs.
    pub fn from_pairs<I, K, V>(index: usize, pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            index,
            cells: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Cell text, `""` when the column is absent.
    pub fn get(&self, column: &str) -> &str {
        self.cells.get(column).map(String::as_str).unwrap_or("")
    }

    /// Whether the column exists in the row, blank or not.
    pub fn has(&self, column: &str) -> bool {
        self.cells.contains_key(column)
    }

    /// Sorted column names.
    pub fn headers(&self) -> Vec<&str> {
        self.cells.keys().map(String::as_str).collect()
    }
}

/// A data line that could not be turned into a row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowIssue {
    /// 0-based position among the data rows.
    pub index: usize,
    pub expected: usize,
    pub found: usize,
}

impl fmt::Display for RowIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "row {} has {} cells, header declares {}",
            self.index, self.found, self.expected
        )
    }
}

/// Parsed dataset content.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dataset {
    pub delimiter: char,
    pub headers: Vec<String>,
    pub rows: Vec<ExternalRow>,
    pub issues: Vec<RowIssue>,
}

impl Dataset {
    /// Number of data lines, accepted or not.
    pub fn line_count(&self) -> usize {
        self.rows.len() + self.issues.len()
    }
}

/// Parse dataset text.
///
/// A byte-order mark is stripped, line endings normalised and blank lines
/// skipped. The delimiter is `forced` when given, else a leading `sep=`
/// directive, else whichever of `;` and `,` occurs more often outside quotes
/// on the header line (`;` on ties). Short rows are padded with empty cells;
/// long rows become [`RowIssue`]s.
pub fn parse_dataset(text: &str, forced: Option<char>) -> Result<Dataset> {
    let text = normalize_eol(text.strip_prefix('\u{feff}').unwrap_or(text));
    let mut lines = text.lines().filter(|l| !l.trim().is_empty()).peekable();

    let mut delimiter = forced;
    if let Some(first) = lines.peek() {
        if let Some(caps) = SEP_DIRECTIVE.captures(first.trim()) {
            if delimiter.is_none() {
                delimiter = caps[1].chars().next();
            }
            lines.next();
        }
    }

    let Some(header_line) = lines.next() else {
        return Ok(Dataset {
            delimiter: delimiter.unwrap_or(DATASET_DELIMITER),
            ..Default::default()
        });
    };

    let delimiter = delimiter.unwrap_or_else(|| detect_delimiter(header_line));
    let headers = split_line(header_line, delimiter);
    if headers.iter().all(|h| h.is_empty()) {
        return Err(Error::Dataset("header line has no column names".to_string()));
    }

    let mut rows = Vec::new();
    let mut issues = Vec::new();
    for (index, line) in lines.enumerate() {
        let mut values = split_line(line, delimiter);
        if values.len() > headers.len() {
            issues.push(RowIssue {
                index,
                expected: headers.len(),
                found: values.len(),
            });
            continue;
        }
        values.resize(headers.len(), String::new());

        let cells = headers
            .iter()
            .zip(values)
            .filter(|(h, _)| !h.is_empty())
            .map(|(h, v)| (h.clone(), v))
            .collect();
        rows.push(ExternalRow::new(index, cells));
    }

    tracing::debug!(
        delimiter = %delimiter,
        column_count = headers.len(),
        row_count = rows.len(),
        issue_count = issues.len(),
        "Parsed dataset"
    );

    Ok(Dataset {
        delimiter,
        headers,
        rows,
        issues,
    })
}

fn detect_delimiter(line: &str) -> char {
    let mut semicolons = 0usize;
    let mut commas = 0usize;
    let mut in_quotes = false;
    for c in line.chars() {
        match c {
            '"' => in_quotes = !in_quotes,
            ';' if !in_quotes => semicolons += 1,
            ',' if !in_quotes => commas += 1,
            _ => {}
        }
    }
    if commas > semicolons {
        ','
    } else {
        ';'
    }
}

/// Split one line on `delimiter`, honouring double quotes and `""` escapes.
/// Cells are trimmed.
pub(crate) fn split_line(line: &str, delimiter: char) -> Vec<String> {
    let mut out = Vec::new();
    let mut cur = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            if c == '"' {
                if chars.peek() == Some(&'"') {
                    cur.push('"');
                    chars.next();
                } else {
                    in_quotes = false;
                }
            } else {
                cur.push(c);
            }
        } else if c == '"' {
            in_quotes = true;
        } else if c == delimiter {
            out.push(cur.trim().to_string());
            cur.clear();
        } else {
            cur.push(c);
        }
    }
    out.push(cur.trim().to_string());
    out
}
