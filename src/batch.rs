//! Batch orchestration: grouping, per-instrument rendering and packaging for one run.

use std::fmt;

use chrono::{Local, NaiveDateTime};
use log::{debug, info, warn};
use serde::Serialize;

use crate::archive::{ArchiveError, ReportBundle};
use crate::config::ReportConfig;
use crate::group::{group_records, InstrumentGroup};
use crate::record::CalibrationRecord;
use crate::report::{Report, ReportError, ReportRenderer, RenderRequest};
use crate::source::InstrumentCatalog;

/// A group whose report could not be produced.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct GroupFailure {
    pub instrument_id: String,
    pub reason: String,
}

/// Outcome of a run, for presentation by the caller.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub succeeded: usize,
    pub failed: usize,
    pub succeeded_ids: Vec<String>,
    pub failures: Vec<GroupFailure>,
}

impl RunSummary {
    /// Instrument identifiers of the failed groups, in group order.
    pub fn failed_ids(&self) -> Vec<&str> {
        self.failures
            .iter()
            .map(|failure| failure.instrument_id.as_str())
            .collect()
    }

    fn record_success(&mut self, instrument_id: &str) {
        self.succeeded += 1;
        self.succeeded_ids.push(instrument_id.to_string());
    }

    fn record_failure(&mut self, instrument_id: &str, reason: String) {
        self.failed += 1;
        self.failures.push(GroupFailure {
            instrument_id: instrument_id.to_string(),
            reason,
        });
    }
}

/// Run-level failures.
#[derive(Debug)]
pub enum BatchError {
    /// The run received no records.
    NoRecords,
    /// The archive container could not be built.
    Archive(ArchiveError),
}

impl From<ArchiveError> for BatchError {
    fn from(err: ArchiveError) -> Self {
        Self::Archive(err)
    }
}

impl fmt::Display for BatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoRecords => write!(f, "No calibration records to report on"),
            Self::Archive(_) => write!(f, "Failed to package reports"),
        }
    }
}

impl std::error::Error for BatchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::NoRecords => None,
            Self::Archive(err) => Some(err),
        }
    }
}

/// Drives one report run with explicit configuration.
pub struct BatchOrchestrator<R> {
    renderer: R,
    config: ReportConfig,
    catalog: InstrumentCatalog,
    masters: InstrumentCatalog,
    generated_at: Option<NaiveDateTime>,
}

impl<R: ReportRenderer> BatchOrchestrator<R> {
    pub fn new(renderer: R, config: ReportConfig) -> Self {
        Self {
            renderer,
            config,
            catalog: InstrumentCatalog::new(),
            masters: InstrumentCatalog::new(),
            generated_at: None,
        }
    }

    /// Supplies instrument details shown in each report.
    pub fn with_catalog(mut self, catalog: InstrumentCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    /// Supplies calibration master details, keyed by master serial number.
    pub fn with_master_catalog(mut self, masters: InstrumentCatalog) -> Self {
        self.masters = masters;
        self
    }

    /// Fixes the generation time stamped on every report. Defaults to the run start.
    pub fn with_generated_at(mut self, generated_at: NaiveDateTime) -> Self {
        self.generated_at = Some(generated_at);
        self
    }

    pub fn config(&self) -> &ReportConfig {
        &self.config
    }

    /// Groups `records`, renders one report per instrument and packages the successes.
    ///
    /// A group that fails to render is listed in the summary and left out of the bundle;
    /// only an empty input fails the run.
    pub fn run_batch(
        &self,
        records: Vec<CalibrationRecord>,
    ) -> Result<(ReportBundle, RunSummary), BatchError> {
        if records.is_empty() {
            return Err(BatchError::NoRecords);
        }

        let generated_at = self
            .generated_at
            .unwrap_or_else(|| Local::now().naive_local());
        let groups = group_records(records, self.config.group_order);
        info!("Rendering {} instrument reports", groups.len());

        let mut summary = RunSummary::default();
        let mut reports = Vec::with_capacity(groups.len());
        for group in &groups {
            match self.render_group(group, generated_at) {
                Ok(report) => {
                    debug!("Report ready for {}", group.instrument_id());
                    summary.record_success(group.instrument_id());
                    reports.push(report);
                }
                Err(err) => {
                    warn!("Skipping {}: {}", group.instrument_id(), err);
                    summary.record_failure(group.instrument_id(), err.to_string());
                }
            }
        }

        let bundle = ReportBundle::assemble(reports)?;
        info!(
            "Run finished: {} succeeded, {} failed",
            summary.succeeded, summary.failed
        );
        Ok((bundle, summary))
    }

    fn render_group(
        &self,
        group: &InstrumentGroup,
        generated_at: NaiveDateTime,
    ) -> Result<Report, ReportError> {
        let request = RenderRequest {
            group,
            details: self.catalog.get(group.instrument_id()),
            masters: Some(&self.masters),
            config: &self.config,
            generated_at,
        };
        self.renderer.render(&request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::{ReportContent, RenderError, RenderStage};
    use chrono::NaiveDate;
    use genpdf::error::ErrorKind;

    /// Serializes the visible table as text and fails for configured instruments.
    struct TextRenderer {
        failing: Vec<&'static str>,
    }

    impl ReportRenderer for TextRenderer {
        fn render(&self, request: &RenderRequest<'_>) -> Result<Report, ReportError> {
            let content = ReportContent::build(request)?;
            if self.failing.iter().any(|id| *id == request.group.instrument_id()) {
                return Err(RenderError::new(
                    request.group.instrument_id(),
                    RenderStage::Layout,
                    genpdf::error::Error::new("layout exploded", ErrorKind::InvalidData),
                )
                .into());
            }
            let text = format!("{:?}", content.table.rows);
            Ok(Report::new(content, text.into_bytes(), request.generated_at, "txt"))
        }
    }

    fn at(hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 7, 1)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    fn record(id: &str, hour: u32, reading: f64) -> CalibrationRecord {
        CalibrationRecord::new(id, at(hour))
            .unwrap()
            .with_field("reading", reading)
    }

    fn orchestrator(failing: Vec<&'static str>) -> BatchOrchestrator<TextRenderer> {
        BatchOrchestrator::new(TextRenderer { failing }, ReportConfig::default())
            .with_generated_at(at(23))
    }

    #[test]
    fn empty_input_fails_the_run() {
        let err = orchestrator(Vec::new()).run_batch(Vec::new()).unwrap_err();
        assert!(matches!(err, BatchError::NoRecords));
    }

    #[test]
    fn one_report_per_instrument() {
        let records = vec![
            record("A", 8, 1.0),
            record("B", 8, 5.0),
            record("A", 9, 1.1),
            record("B", 9, 5.1),
            record("A", 10, 1.2),
        ];
        let (bundle, summary) = orchestrator(Vec::new()).run_batch(records).expect("run");

        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.failed, 0);
        let ids: Vec<_> = bundle.reports().iter().map(Report::instrument_id).collect();
        assert_eq!(ids, vec!["A", "B"]);
        assert_eq!(bundle.reports()[0].content().table.row_count(), 3);
        assert_eq!(bundle.reports()[1].content().table.row_count(), 2);
        assert_eq!(bundle.file_names(), &["A.txt".to_string(), "B.txt".to_string()]);
    }

    #[test]
    fn failed_group_is_reported_and_skipped() {
        let records = vec![record("A", 8, 1.0), record("B", 8, 5.0), record("C", 8, 9.0)];
        let (bundle, summary) = orchestrator(vec!["B"]).run_batch(records).expect("run");

        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.failed_ids(), vec!["B"]);
        assert!(summary.failures[0].reason.contains("layout exploded"));
        assert_eq!(bundle.len(), 2);
        assert_eq!(summary.succeeded_ids, vec!["A".to_string(), "C".to_string()]);
    }

    #[test]
    fn catalog_details_reach_the_renderer() {
        let mut catalog = InstrumentCatalog::new();
        catalog.insert("a", vec![("Make".to_string(), "Rosemount".to_string())]);
        let (bundle, _) = orchestrator(Vec::new())
            .with_catalog(catalog)
            .run_batch(vec![record("A", 8, 1.0)])
            .expect("run");
        assert_eq!(
            bundle.reports()[0].content().details,
            vec![("Make".to_string(), "Rosemount".to_string())]
        );
    }

    #[test]
    fn master_catalog_reaches_the_renderer() {
        let mut masters = InstrumentCatalog::new();
        masters.insert("ms-1", vec![("Make".to_string(), "Fluke".to_string())]);
        let (bundle, _) = orchestrator(Vec::new())
            .with_master_catalog(masters)
            .run_batch(vec![record("A", 8, 1.0).with_field("Master Serial No", "MS-1")])
            .expect("run");
        let content = bundle.reports()[0].content();
        assert_eq!(content.masters[0].serial_no, "MS-1");
        assert_eq!(content.masters[0].details[0].1, "Fluke");
        assert_eq!(content.table.columns, vec!["#", "Timestamp", "reading"]);
    }

    #[test]
    fn summary_serializes_to_json() {
        let (_, summary) = orchestrator(vec!["A"])
            .run_batch(vec![record("A", 8, 1.0)])
            .expect("run");
        let json = serde_json::to_value(&summary).expect("json");
        assert_eq!(json["failed"], 1);
        assert_eq!(json["failures"][0]["instrument_id"], "A");
    }
}
