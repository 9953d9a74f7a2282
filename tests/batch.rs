use std::io::{Cursor, Read};

use calibration_report::fonts;
use calibration_report::group::GroupOrder;
use calibration_report::record::{CalibrationRecord, DateRange};
use calibration_report::source::{RecordSource, SheetLayout, SheetRow, SheetSource};
use calibration_report::{BatchError, BatchOrchestrator, PdfRenderer, ReportConfig};
use chrono::{NaiveDate, NaiveDateTime};

fn at(day: u32, hour: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 5, day)
        .unwrap()
        .and_hms_opt(hour, 0, 0)
        .unwrap()
}

fn record(id: &str, day: u32, reading: f64) -> CalibrationRecord {
    CalibrationRecord::new(id, at(day, 8))
        .unwrap()
        .with_field("reading", reading)
}

fn orchestrator(config: ReportConfig) -> BatchOrchestrator<PdfRenderer> {
    BatchOrchestrator::new(PdfRenderer::new(), config).with_generated_at(at(20, 17))
}

fn archive_entries(bytes: &[u8]) -> Vec<String> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes.to_vec())).expect("readable zip");
    (0..archive.len())
        .map(|index| archive.by_index(index).expect("entry").name().to_string())
        .collect()
}

#[test]
fn empty_input_is_rejected() {
    let err = orchestrator(ReportConfig::default())
        .run_batch(Vec::new())
        .unwrap_err();
    assert!(matches!(err, BatchError::NoRecords));
}

#[test]
fn unreadable_branding_leaves_an_empty_archive() {
    let config = ReportConfig::default()
        .with_branding("/__calibration_report_missing_logo__.png");
    let (bundle, summary) = orchestrator(config)
        .run_batch(vec![record("C", 1, 3.0)])
        .expect("run completes");

    assert_eq!(summary.succeeded, 0);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.failed_ids(), vec!["C"]);
    assert!(bundle.is_empty());
    assert!(archive_entries(bundle.archive()).is_empty());

    let dir = tempfile::tempdir().expect("tempdir");
    let written = bundle
        .write_to_dir(dir.path(), "CalibrationReports.zip")
        .expect("nothing to write");
    assert!(written.is_empty());
    assert!(!dir.path().join("CalibrationReports.zip").exists());
}

#[test]
fn renders_one_pdf_per_instrument() {
    if !fonts::fonts_available() {
        eprintln!("Skipping renders_one_pdf_per_instrument: report fonts missing. Set CALIB_REPORT_FONTS_DIR.");
        return;
    }
    let records = vec![
        record("A", 1, 1.0),
        record("B", 1, 5.0),
        record("A", 2, 1.1),
        record("B", 2, 5.1),
        record("A", 3, 1.2),
    ];
    let (bundle, summary) = orchestrator(ReportConfig::default())
        .run_batch(records)
        .expect("run");

    assert_eq!(summary.succeeded, 2);
    assert_eq!(summary.failed, 0);
    assert_eq!(archive_entries(bundle.archive()), vec!["A.pdf", "B.pdf"]);
    assert_eq!(bundle.reports()[0].content().table.row_count(), 3);
    assert_eq!(bundle.reports()[1].content().table.row_count(), 2);

    let mut archive = zip::ZipArchive::new(Cursor::new(bundle.archive().to_vec())).expect("zip");
    let mut entry = archive.by_name("B.pdf").expect("B entry");
    let mut bytes = Vec::new();
    entry.read_to_end(&mut bytes).expect("entry bytes");
    assert_eq!(bytes, bundle.reports()[1].bytes());
}

#[test]
fn sorted_order_is_applied_to_the_bundle() {
    if !fonts::fonts_available() {
        eprintln!("Skipping sorted_order_is_applied_to_the_bundle: report fonts missing. Set CALIB_REPORT_FONTS_DIR.");
        return;
    }
    let config = ReportConfig::default().with_group_order(GroupOrder::InstrumentId);
    let (bundle, _) = orchestrator(config)
        .run_batch(vec![record("ZT-9", 1, 2.0), record("AT-1", 1, 4.0)])
        .expect("run");
    assert_eq!(bundle.file_names(), &["AT-1.pdf".to_string(), "ZT-9.pdf".to_string()]);
}

#[test]
fn sheet_rows_flow_through_the_pipeline() {
    let rows: Vec<SheetRow> = vec![
        vec![
            ("Timestamp", "2024-05-01 08:00:00"),
            ("Instrument Tag", "PT-7"),
            ("Applied", "10"),
            ("Remarks", ""),
        ]
        .into_iter()
        .collect(),
        vec![
            ("Timestamp", "2024-05-09 08:00:00"),
            ("Instrument Tag", "PT-7"),
            ("Applied", "20"),
            ("Remarks", "zero trimmed"),
        ]
        .into_iter()
        .collect(),
        vec![
            ("Timestamp", "2024-05-02 08:00:00"),
            ("Instrument Tag", "  "),
            ("Applied", "99"),
            ("Remarks", ""),
        ]
        .into_iter()
        .collect(),
    ];
    let records = SheetSource::new(rows, SheetLayout::default())
        .fetch()
        .expect("sheet rows");
    assert_eq!(records.len(), 2);

    let window = DateRange::new(NaiveDate::from_ymd_opt(2024, 5, 5), None);
    let filtered = window.retain(records);
    assert_eq!(filtered.len(), 1);
    assert_eq!(filtered[0].notes(), Some("zero trimmed"));

    let empty = DateRange::new(NaiveDate::from_ymd_opt(2025, 1, 1), None).retain(filtered);
    assert!(matches!(
        orchestrator(ReportConfig::default()).run_batch(empty),
        Err(BatchError::NoRecords)
    ));
}

#[test]
fn written_output_matches_the_bundle() {
    if !fonts::fonts_available() {
        eprintln!("Skipping written_output_matches_the_bundle: report fonts missing. Set CALIB_REPORT_FONTS_DIR.");
        return;
    }
    let dir = tempfile::tempdir().expect("tempdir");
    let config = ReportConfig::default();
    let archive_name = config.archive_name.clone();
    let (bundle, _) = orchestrator(config)
        .run_batch(vec![record("FT/3", 4, 12.5)])
        .expect("run");
    let written = bundle
        .write_to_dir(dir.path(), &archive_name)
        .expect("write output");

    assert_eq!(written.len(), 2);
    assert!(written[0].ends_with("FT_3.pdf"));
    assert_eq!(std::fs::read(&written[1]).expect("archive"), bundle.archive());
}

#[test]
fn configured_sheet_layout_controls_the_readings_table() {
    let config: ReportConfig = serde_json::from_str(
        r#"{
            "sheet_layout": {"instrument_column": "Tag", "excluded_columns": ["Email Address"]},
            "engineer_column": "Calibrated By"
        }"#,
    )
    .expect("config");
    let rows: Vec<SheetRow> = vec![vec![
        ("Timestamp", "2024-05-03 10:00:00"),
        ("Tag", "LT-5"),
        ("Email Address", "tech@example.com"),
        ("Calibrated By", "J. Brar"),
        ("Master Serial No", "HC-1"),
        ("As Found (0%) Up", "0.02"),
    ]
    .into_iter()
    .collect()];
    let records = SheetSource::new(rows, config.sheet_layout.clone())
        .fetch()
        .expect("sheet rows");

    let group = calibration_report::group::InstrumentGroup::from_records("LT-5", records)
        .expect("single instrument");
    let request = calibration_report::report::RenderRequest {
        group: &group,
        details: None,
        masters: None,
        config: &config,
        generated_at: at(20, 17),
    };
    let content = calibration_report::report::ReportContent::build(&request).expect("content");
    assert_eq!(content.table.columns, vec!["#", "Timestamp", "As Found (0%) Up"]);
    assert_eq!(content.sign_off.calibrated_by, vec!["J. Brar".to_string()]);
    assert_eq!(content.masters[0].serial_no, "HC-1");
}
