//! Report content, rendered reports and the renderer seam.
//!
//! [`ReportContent`] is the visible content of a report, built from a group without touching
//! any document backend. A [`ReportRenderer`] lays that content out into document bytes. The
//! split keeps the visible content comparable between runs even though the rendered bytes
//! carry creation timestamps.

use std::fmt;

use chrono::{Months, NaiveDate, NaiveDateTime};

use crate::config::ReportConfig;
use crate::group::InstrumentGroup;
use crate::record::FieldValue;
use crate::source::InstrumentCatalog;
use crate::span::{InstrumentRange, SpanCheck};

/// Display format for calendar dates in report headers.
pub const DATE_FORMAT: &str = "%d-%m-%Y";

/// Display format for reading timestamps in the table.
pub const TIMESTAMP_FORMAT: &str = "%d-%m-%Y %H:%M";

/// Leading table columns that precede the measurement fields.
pub const ROW_NUMBER_COLUMN: &str = "#";
pub const TIMESTAMP_COLUMN: &str = "Timestamp";

/// Title block of a report.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReportHeader {
    pub organization: Vec<String>,
    pub title: String,
    pub instrument_id: String,
    pub generated_on: NaiveDate,
    pub first_calibration: NaiveDateTime,
    pub last_calibration: NaiveDateTime,
    /// Next calibration due date, absent when the configured interval is zero.
    pub due_date: Option<NaiveDate>,
}

/// Readings table: one row per record, blank strings for missing values.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReadingTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl ReadingTable {
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

/// Free-text notes of one record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NoteLine {
    pub timestamp: NaiveDateTime,
    pub text: String,
}

/// Calibration master used on the instrument, with its catalog details when known.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MasterInstrument {
    pub serial_no: String,
    pub details: Vec<(String, String)>,
}

/// Signature block closing a report.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SignOff {
    /// Engineers named on the group's records, in first-seen order.
    pub calibrated_by: Vec<String>,
}

/// Everything a reader sees in a report, in document order.
#[derive(Clone, Debug, PartialEq)]
pub struct ReportContent {
    pub header: ReportHeader,
    /// Instrument details from the catalog, as `(label, value)` pairs.
    pub details: Vec<(String, String)>,
    pub masters: Vec<MasterInstrument>,
    pub table: ReadingTable,
    /// Desired values and errors, present when the catalog gives the instrument's range.
    pub span_check: Option<SpanCheck>,
    pub notes: Vec<NoteLine>,
    pub sign_off: SignOff,
}

/// Distinct non-blank labels of `field` across the group, in first-seen order.
fn distinct_labels(group: &InstrumentGroup, field: &str) -> Vec<String> {
    let mut labels: Vec<String> = Vec::new();
    for record in group.records() {
        let Some(label) = record.fields().get(field.trim()).map(FieldValue::as_label) else {
            continue;
        };
        let label = label.trim();
        if !label.is_empty() && !labels.iter().any(|known| known == label) {
            labels.push(label.to_string());
        }
    }
    labels
}

impl ReportContent {
    /// Builds the content for `group`.
    ///
    /// The column set is the union of the group's field names, fixed once for the whole group.
    pub fn build(request: &RenderRequest<'_>) -> Result<Self, ReportError> {
        let group = request.group;
        let (first, last) = match (group.records().first(), group.records().last()) {
            (Some(first), Some(last)) => (first.timestamp(), last.timestamp()),
            _ => {
                return Err(ReportError::EmptyGroup {
                    instrument_id: group.instrument_id().to_string(),
                })
            }
        };

        let config = request.config;
        let due_date = match config.due_interval_months {
            0 => None,
            months => last.date().checked_add_months(Months::new(months)),
        };

        let header = ReportHeader {
            organization: config.organization.clone(),
            title: config.title.clone(),
            instrument_id: group.instrument_id().to_string(),
            generated_on: request.generated_at.date(),
            first_calibration: first,
            last_calibration: last,
            due_date,
        };

        let field_names: Vec<String> = group
            .field_names()
            .into_iter()
            .filter(|name| !config.is_reference_field(name))
            .collect();
        let mut columns = vec![ROW_NUMBER_COLUMN.to_string(), TIMESTAMP_COLUMN.to_string()];
        columns.extend(field_names.iter().cloned());

        let rows = group
            .records()
            .iter()
            .enumerate()
            .map(|(index, record)| {
                let mut row = vec![
                    (index + 1).to_string(),
                    record.timestamp().format(TIMESTAMP_FORMAT).to_string(),
                ];
                row.extend(field_names.iter().map(|name| {
                    record
                        .fields()
                        .get(name)
                        .map(ToString::to_string)
                        .unwrap_or_default()
                }));
                row
            })
            .collect();

        let notes = group
            .records()
            .iter()
            .filter_map(|record| {
                record.notes().map(|text| NoteLine {
                    timestamp: record.timestamp(),
                    text: text.to_string(),
                })
            })
            .collect();

        let details = request.details.map(<[_]>::to_vec).unwrap_or_default();
        let masters = distinct_labels(group, &config.master_column)
            .into_iter()
            .map(|serial_no| MasterInstrument {
                details: request
                    .masters
                    .and_then(|catalog| catalog.get(&serial_no))
                    .map(<[_]>::to_vec)
                    .unwrap_or_default(),
                serial_no,
            })
            .collect();
        let span_check = InstrumentRange::from_details(&details, &config.span)
            .map(|range| SpanCheck::compute(range, group, &config.span));

        Ok(Self {
            header,
            details,
            masters,
            table: ReadingTable { columns, rows },
            span_check,
            notes,
            sign_off: SignOff {
                calibrated_by: distinct_labels(group, &config.engineer_column),
            },
        })
    }
}

/// Input of a single render call.
#[derive(Clone, Copy, Debug)]
pub struct RenderRequest<'a> {
    pub group: &'a InstrumentGroup,
    pub details: Option<&'a [(String, String)]>,
    /// Catalog of calibration masters, keyed by serial number.
    pub masters: Option<&'a InstrumentCatalog>,
    pub config: &'a ReportConfig,
    /// Generation time shared by every report of a run.
    pub generated_at: NaiveDateTime,
}

/// A rendered document for one instrument.
#[derive(Clone, Debug)]
pub struct Report {
    content: ReportContent,
    bytes: Vec<u8>,
    generated_at: NaiveDateTime,
    extension: &'static str,
}

impl Report {
    pub fn new(
        content: ReportContent,
        bytes: Vec<u8>,
        generated_at: NaiveDateTime,
        extension: &'static str,
    ) -> Self {
        Self {
            content,
            bytes,
            generated_at,
            extension,
        }
    }

    pub fn instrument_id(&self) -> &str {
        &self.content.header.instrument_id
    }

    pub fn content(&self) -> &ReportContent {
        &self.content
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn generated_at(&self) -> NaiveDateTime {
        self.generated_at
    }

    pub fn extension(&self) -> &'static str {
        self.extension
    }

    /// `<instrument id>.<extension>`, before any file-name sanitizing.
    pub fn file_name(&self) -> String {
        format!("{}.{}", self.instrument_id(), self.extension)
    }
}

/// Turns one instrument group into one document.
pub trait ReportRenderer {
    fn render(&self, request: &RenderRequest<'_>) -> Result<Report, ReportError>;
}

/// Step of document construction that failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RenderStage {
    /// Loading or decoding the branding image.
    Branding,
    /// Locating or loading fonts.
    Fonts,
    /// Laying out or writing the document.
    Layout,
}

impl fmt::Display for RenderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Branding => "branding image",
            Self::Fonts => "fonts",
            Self::Layout => "layout",
        })
    }
}

/// Document construction failure for one instrument.
#[derive(Debug)]
pub struct RenderError {
    instrument_id: String,
    stage: RenderStage,
    source: genpdf::error::Error,
}

impl RenderError {
    pub fn new(
        instrument_id: impl Into<String>,
        stage: RenderStage,
        source: genpdf::error::Error,
    ) -> Self {
        Self {
            instrument_id: instrument_id.into(),
            stage,
            source,
        }
    }

    pub fn instrument_id(&self) -> &str {
        &self.instrument_id
    }

    pub fn stage(&self) -> RenderStage {
        self.stage
    }
}

impl fmt::Display for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Failed to render report for {} ({}): {}",
            self.instrument_id, self.stage, self.source
        )
    }
}

impl std::error::Error for RenderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

/// Errors returned by a [`ReportRenderer`].
#[derive(Debug)]
pub enum ReportError {
    /// The group contained no records.
    EmptyGroup { instrument_id: String },
    /// The document could not be produced.
    Render(RenderError),
}

impl ReportError {
    pub fn instrument_id(&self) -> &str {
        match self {
            Self::EmptyGroup { instrument_id } => instrument_id,
            Self::Render(err) => err.instrument_id(),
        }
    }
}

impl From<RenderError> for ReportError {
    fn from(err: RenderError) -> Self {
        Self::Render(err)
    }
}

impl fmt::Display for ReportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyGroup { instrument_id } => {
                write!(f, "Instrument {} has no calibration records", instrument_id)
            }
            Self::Render(err) => fmt::Display::fmt(err, f),
        }
    }
}

impl std::error::Error for ReportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::EmptyGroup { .. } => None,
            Self::Render(err) => Some(&err.source),
        }
    }
}
