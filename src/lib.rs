//! Calibration report generation.
//!
//! Records are grouped per instrument, each group is rendered into a PDF report, and the
//! reports of a run are bundled into a zip archive together with a run summary.

pub mod archive;
pub mod batch;
pub mod builder;
pub mod config;
pub mod elements;
pub mod fonts;
pub mod group;
pub mod pdf;
pub mod record;
pub mod report;
pub mod source;
pub mod span;

pub use archive::ReportBundle;
pub use batch::{BatchError, BatchOrchestrator, RunSummary};
pub use config::ReportConfig;
pub use pdf::PdfRenderer;
pub use record::CalibrationRecord;
