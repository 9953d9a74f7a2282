//! Run configuration supplied by the surrounding application.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::group::GroupOrder;
use crate::source::SheetLayout;
use crate::span::SpanLayout;

/// Default report title printed under the organisation lines.
pub const DEFAULT_TITLE: &str = "CALIBRATION REPORT";

/// Default file name of the report archive.
pub const DEFAULT_ARCHIVE_NAME: &str = "CalibrationReports.zip";

/// Default number of months between a calibration and its due date.
pub const DEFAULT_DUE_INTERVAL_MONTHS: u32 = 12;

/// Default key column of the instrument catalog.
pub const DEFAULT_CATALOG_KEY: &str = "TAG";

/// Default key column of the calibration master catalog.
pub const DEFAULT_MASTER_CATALOG_KEY: &str = "Serial No.";

/// Settings for one report run.
///
/// Every field has a default so a JSON configuration file only needs to name the values it
/// changes.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReportConfig {
    /// Lines printed above the report title, e.g. company and site names.
    pub organization: Vec<String>,
    pub title: String,
    /// Optional logo placed in the report header.
    pub branding: Option<PathBuf>,
    pub group_order: GroupOrder,
    pub due_interval_months: u32,
    pub archive_name: String,
    /// Column roles of spreadsheet-row input.
    pub sheet_layout: SheetLayout,
    /// Column of the instrument catalog holding the instrument id.
    pub catalog_key: String,
    /// Column of the master catalog holding the master's serial number.
    pub master_catalog_key: String,
    /// Record field naming the calibration master used for a reading.
    pub master_column: String,
    /// Record field naming the engineer who calibrated the instrument.
    pub engineer_column: String,
    /// Catalog entries and record fields of the span check.
    pub span: SpanLayout,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            organization: Vec::new(),
            title: DEFAULT_TITLE.to_string(),
            branding: None,
            group_order: GroupOrder::default(),
            due_interval_months: DEFAULT_DUE_INTERVAL_MONTHS,
            archive_name: DEFAULT_ARCHIVE_NAME.to_string(),
            sheet_layout: SheetLayout::default(),
            catalog_key: DEFAULT_CATALOG_KEY.to_string(),
            master_catalog_key: DEFAULT_MASTER_CATALOG_KEY.to_string(),
            master_column: "Master Serial No".to_string(),
            engineer_column: "Engineer Name".to_string(),
            span: SpanLayout::default(),
        }
    }
}

impl ReportConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a configuration from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Appends an organisation line and returns the updated configuration.
    pub fn with_organization_line(mut self, line: impl Into<String>) -> Self {
        self.organization.push(line.into());
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Sets the logo placed in every report header.
    pub fn with_branding(mut self, branding: impl Into<PathBuf>) -> Self {
        self.branding = Some(branding.into());
        self
    }

    pub fn with_group_order(mut self, order: GroupOrder) -> Self {
        self.group_order = order;
        self
    }

    pub fn with_due_interval_months(mut self, months: u32) -> Self {
        self.due_interval_months = months;
        self
    }

    pub fn with_archive_name(mut self, name: impl Into<String>) -> Self {
        self.archive_name = name.into();
        self
    }

    pub fn with_sheet_layout(mut self, layout: SheetLayout) -> Self {
        self.sheet_layout = layout;
        self
    }

    /// Whether `field` names a reference column rather than a measurement.
    pub fn is_reference_field(&self, field: &str) -> bool {
        let field = field.trim();
        field == self.master_column.trim() || field == self.engineer_column.trim()
    }
}

/// Errors raised while loading configuration files.
#[derive(Debug)]
pub enum ConfigError {
    /// The file could not be read.
    Read { path: PathBuf, source: io::Error },
    /// The file was not valid configuration JSON.
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read { path, .. } => write!(f, "Failed to read config {}", path.display()),
            Self::Parse { path, .. } => write!(f, "Invalid config {}", path.display()),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Read { source, .. } => Some(source),
            Self::Parse { source, .. } => Some(source),
        }
    }
}
