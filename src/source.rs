//! Record sources and spreadsheet-row adapters.
//!
//! The pipeline only needs a pull operation returning every record of a run. Two file-backed
//! sources are provided: a JSON array of structured records, and a JSON array of
//! spreadsheet-style rows keyed by column header, which is the shape a sheet API returns
//! for "all records" requests.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime};
use log::warn;
use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::record::{CalibrationRecord, FieldValue, Fields};

/// Pull interface returning the complete ordered record sequence of a run.
pub trait RecordSource {
    fn fetch(&self) -> Result<Vec<CalibrationRecord>, SourceError>;
}

impl RecordSource for Vec<CalibrationRecord> {
    fn fetch(&self) -> Result<Vec<CalibrationRecord>, SourceError> {
        Ok(self.clone())
    }
}

/// Errors raised while reading records or catalog rows.
#[derive(Debug)]
pub enum SourceError {
    /// The input file could not be read.
    Read { path: PathBuf, source: io::Error },
    /// The input file did not contain the expected JSON shape.
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    /// No row carried the column that identifies instruments.
    MissingColumn { column: String },
}

impl fmt::Display for SourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read { path, .. } => write!(f, "Failed to read {}", path.display()),
            Self::Parse { path, .. } => write!(f, "Failed to parse {}", path.display()),
            Self::MissingColumn { column } => {
                write!(f, "Column '{}' not found in any sheet row", column)
            }
        }
    }
}

impl std::error::Error for SourceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Read { source, .. } => Some(source),
            Self::Parse { source, .. } => Some(source),
            Self::MissingColumn { .. } => None,
        }
    }
}

fn read_json<T>(path: &Path) -> Result<T, SourceError>
where
    T: for<'de> Deserialize<'de>,
{
    let text = fs::read_to_string(path).map_err(|source| SourceError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| SourceError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Reads a JSON array of [`CalibrationRecord`]s on every fetch.
#[derive(Clone, Debug)]
pub struct JsonRecordsFile {
    path: PathBuf,
}

impl JsonRecordsFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl RecordSource for JsonRecordsFile {
    fn fetch(&self) -> Result<Vec<CalibrationRecord>, SourceError> {
        read_json(&self.path)
    }
}

/// One spreadsheet row: trimmed column headers mapped to cell text, in column order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SheetRow {
    cells: Vec<(String, String)>,
}

impl SheetRow {
    /// Returns the cell text under `column`, matched against trimmed headers.
    pub fn get(&self, column: &str) -> Option<&str> {
        let column = column.trim();
        self.cells
            .iter()
            .find(|(header, _)| header == column)
            .map(|(_, cell)| cell.as_str())
    }

    /// Iterates over `(header, cell)` pairs in column order.
    pub fn cells(&self) -> impl Iterator<Item = (&str, &str)> {
        self.cells
            .iter()
            .map(|(header, cell)| (header.as_str(), cell.as_str()))
    }
}

impl<K, V> FromIterator<(K, V)> for SheetRow
where
    K: AsRef<str>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            cells: iter
                .into_iter()
                .map(|(header, cell)| (header.as_ref().trim().to_string(), cell.into()))
                .collect(),
        }
    }
}

fn cell_text(value: Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text,
        Value::Bool(flag) => (if flag { "TRUE" } else { "FALSE" }).to_string(),
        other => other.to_string(),
    }
}

struct SheetRowVisitor;

impl<'de> Visitor<'de> for SheetRowVisitor {
    type Value = SheetRow;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a map of column headers to cell values")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<SheetRow, A::Error> {
        let mut cells = Vec::new();
        while let Some((header, value)) = access.next_entry::<String, Value>()? {
            cells.push((header.trim().to_string(), cell_text(value)));
        }
        Ok(SheetRow { cells })
    }
}

impl<'de> Deserialize<'de> for SheetRow {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(SheetRowVisitor)
    }
}

/// Loads a JSON array of sheet rows from `path`.
pub fn load_sheet_rows(path: impl AsRef<Path>) -> Result<Vec<SheetRow>, SourceError> {
    read_json(path.as_ref())
}

/// Column roles used to turn sheet rows into records.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SheetLayout {
    pub instrument_column: String,
    /// Explicit timestamp column. When absent the first header containing "timestamp" is used.
    pub timestamp_column: Option<String>,
    pub notes_column: String,
    /// Columns that are neither identifiers nor measurements.
    pub excluded_columns: Vec<String>,
}

impl Default for SheetLayout {
    fn default() -> Self {
        Self {
            instrument_column: "Instrument Tag".to_string(),
            timestamp_column: None,
            notes_column: "Remarks".to_string(),
            excluded_columns: Vec::new(),
        }
    }
}

impl SheetLayout {
    fn timestamp_column<'a>(&'a self, row: &'a SheetRow) -> Option<&'a str> {
        match &self.timestamp_column {
            Some(column) => Some(column.trim()),
            None => row
                .cells()
                .map(|(header, _)| header)
                .find(|header| header.to_lowercase().contains("timestamp")),
        }
    }

    fn is_reserved(&self, header: &str, timestamp_column: Option<&str>) -> bool {
        header == self.instrument_column.trim()
            || header == self.notes_column.trim()
            || Some(header) == timestamp_column
            || self
                .excluded_columns
                .iter()
                .any(|excluded| excluded.trim() == header)
    }
}

const DATE_TIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%d-%m-%Y %H:%M:%S",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y", "%d-%m-%Y"];

/// Parses the timestamp notations found in form-response sheets.
pub fn parse_timestamp(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        return Some(parsed.naive_local());
    }
    DATE_TIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|format| NaiveDate::parse_from_str(text, format).ok())
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
}

/// Converts sheet rows into calibration records.
#[derive(Clone, Debug)]
pub struct SheetSource {
    rows: Vec<SheetRow>,
    layout: SheetLayout,
    fallback_time: Option<NaiveDateTime>,
}

impl SheetSource {
    pub fn new(rows: Vec<SheetRow>, layout: SheetLayout) -> Self {
        Self {
            rows,
            layout,
            fallback_time: None,
        }
    }

    /// Reads the rows from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>, layout: SheetLayout) -> Result<Self, SourceError> {
        Ok(Self::new(load_sheet_rows(path)?, layout))
    }

    /// Fixes the time assigned to rows without a usable timestamp. Defaults to the fetch time.
    pub fn with_fallback_time(mut self, time: NaiveDateTime) -> Self {
        self.fallback_time = Some(time);
        self
    }

    fn convert(&self, index: usize, row: &SheetRow, now: NaiveDateTime) -> Option<CalibrationRecord> {
        let layout = &self.layout;
        let instrument = row.get(&layout.instrument_column).unwrap_or_default();
        let timestamp_column = layout.timestamp_column(row);

        let timestamp = match timestamp_column.and_then(|column| row.get(column)) {
            Some(cell) => parse_timestamp(cell).unwrap_or_else(|| {
                warn!("Row {}: unparsable timestamp '{}', using {}", index + 1, cell, now);
                now
            }),
            None => {
                warn!("Row {}: no timestamp, using {}", index + 1, now);
                now
            }
        };

        let record = match CalibrationRecord::new(instrument, timestamp) {
            Ok(record) => record,
            Err(err) => {
                warn!("Row {} skipped: {}", index + 1, err);
                return None;
            }
        };

        let fields: Fields = row
            .cells()
            .filter(|(header, _)| !layout.is_reserved(header, timestamp_column))
            .filter_map(|(header, cell)| FieldValue::parse_cell(cell).map(|value| (header, value)))
            .collect();
        let notes = row.get(&layout.notes_column).map(str::to_string);

        Some(record.with_fields(fields).with_notes(notes))
    }
}

impl RecordSource for SheetSource {
    fn fetch(&self) -> Result<Vec<CalibrationRecord>, SourceError> {
        if !self.rows.is_empty()
            && self
                .rows
                .iter()
                .all(|row| row.get(&self.layout.instrument_column).is_none())
        {
            return Err(SourceError::MissingColumn {
                column: self.layout.instrument_column.clone(),
            });
        }

        let now = self
            .fallback_time
            .unwrap_or_else(|| Local::now().naive_local());
        Ok(self
            .rows
            .iter()
            .enumerate()
            .filter_map(|(index, row)| self.convert(index, row, now))
            .collect())
    }
}

/// Per-instrument descriptive metadata, such as make, model and range.
///
/// Keys are matched case-insensitively; when several rows share a key the first one wins.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InstrumentCatalog {
    entries: HashMap<String, Vec<(String, String)>>,
}

impl InstrumentCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a catalog from sheet rows keyed by `key_column`.
    pub fn from_sheet_rows(rows: &[SheetRow], key_column: &str) -> Self {
        let mut catalog = Self::new();
        for row in rows {
            let Some(key) = row.get(key_column).map(str::trim).filter(|key| !key.is_empty())
            else {
                continue;
            };
            let details = row
                .cells()
                .filter(|(header, cell)| *header != key_column.trim() && !cell.trim().is_empty())
                .map(|(header, cell)| (header.to_string(), cell.trim().to_string()))
                .collect();
            catalog.insert(key, details);
        }
        catalog
    }

    /// Loads a catalog from a JSON array of sheet rows.
    pub fn from_json_file(path: impl AsRef<Path>, key_column: &str) -> Result<Self, SourceError> {
        let rows = load_sheet_rows(path)?;
        Ok(Self::from_sheet_rows(&rows, key_column))
    }

    /// Adds an entry unless the instrument is already known.
    pub fn insert(&mut self, instrument_id: &str, details: Vec<(String, String)>) {
        self.entries
            .entry(instrument_id.trim().to_uppercase())
            .or_insert(details);
    }

    /// Returns the `(label, value)` details for `instrument_id`.
    pub fn get(&self, instrument_id: &str) -> Option<&[(String, String)]> {
        self.entries
            .get(&instrument_id.trim().to_uppercase())
            .map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
