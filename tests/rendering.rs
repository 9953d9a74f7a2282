use calibration_report::config::ReportConfig;
use calibration_report::fonts;
use calibration_report::group::InstrumentGroup;
use calibration_report::record::CalibrationRecord;
use calibration_report::report::{RenderRequest, ReportRenderer};
use calibration_report::PdfRenderer;
use chrono::{NaiveDate, NaiveDateTime};
use sha2::{Digest, Sha256};

const SKIP_HINT: &str =
    "report fonts missing. Set CALIB_REPORT_FONTS_DIR or copy assets/fonts next to the binary.";

fn at(day: u32, hour: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 3, day)
        .unwrap()
        .and_hms_opt(hour, 30, 0)
        .unwrap()
}

fn sample_group() -> InstrumentGroup {
    InstrumentGroup::from_records(
        "TT-204",
        vec![
            CalibrationRecord::new("TT-204", at(5, 9))
                .unwrap()
                .with_field("reference", 100.0)
                .with_field("reading", 100.12),
            CalibrationRecord::new("TT-204", at(4, 9))
                .unwrap()
                .with_field("reference", 50.0)
                .with_field("unit", "degC"),
            CalibrationRecord::new("TT-204", at(6, 9))
                .unwrap()
                .with_field("reading", 150.04)
                .with_notes(Some("sensor replaced".to_string())),
        ],
    )
    .expect("single instrument")
}

fn render_sample_pdf() -> Option<Vec<u8>> {
    if !fonts::fonts_available() {
        return None;
    }

    let group = sample_group();
    let config = ReportConfig::default().with_organization_line("EAST TERMINAL");
    let request = RenderRequest {
        group: &group,
        details: None,
        masters: None,
        config: &config,
        generated_at: at(7, 12),
    };
    let report = PdfRenderer::new().render(&request).expect("render sample pdf");
    Some(report.bytes().to_vec())
}

/// Metadata whose value changes on every render, as opening and closing delimiters.
const VOLATILE_FIELDS: &[(&[u8], &[u8])] = &[
    (b"/CreationDate(", b")"),
    (b"/ModDate(", b")"),
    (b"/ID[", b"]"),
    (b"/Producer(", b")"),
    (b"<xmp:CreateDate>", b"</xmp:CreateDate>"),
    (b"<xmp:ModifyDate>", b"</xmp:ModifyDate>"),
    (b"<xmp:MetadataDate>", b"</xmp:MetadataDate>"),
    (b"<xmpMM:DocumentID>", b"</xmpMM:DocumentID>"),
    (b"<xmpMM:InstanceID>", b"</xmpMM:InstanceID>"),
    (b"<xmpMM:VersionID>", b"</xmpMM:VersionID>"),
];

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// Zeroes volatile metadata values in place so two renders can be compared byte for byte.
fn scrub_pdf(bytes: &[u8]) -> Vec<u8> {
    let mut data = bytes.to_vec();
    for (open, close) in VOLATILE_FIELDS {
        let mut offset = 0;
        while let Some(start) = find(&data[offset..], open).map(|pos| offset + pos + open.len()) {
            let Some(len) = find(&data[start..], close) else {
                break;
            };
            for byte in &mut data[start..start + len] {
                if !byte.is_ascii_whitespace() && !matches!(*byte, b'<' | b'>') {
                    *byte = b'0';
                }
            }
            offset = start + len + close.len();
        }
    }
    data
}

#[test]
fn scrubbing_blanks_volatile_metadata_only() {
    let a = scrub_pdf(b"/CreationDate(D:20240101) /ID[<ab12> <cd34>] <xmp:CreateDate>2024</xmp:CreateDate> BT");
    let b = scrub_pdf(b"/CreationDate(D:20250202) /ID[<ef56> <0987>] <xmp:CreateDate>2025</xmp:CreateDate> BT");
    assert_eq!(a, b);
    assert!(a.ends_with(b" BT"));
}

fn normalized_hash(bytes: &[u8]) -> [u8; 32] {
    let normalized = scrub_pdf(bytes);
    let digest = Sha256::digest(&normalized);
    digest.into()
}

#[test]
fn renders_non_empty_output() {
    let Some(bytes) = render_sample_pdf() else {
        eprintln!("Skipping renders_non_empty_output: {}", SKIP_HINT);
        return;
    };
    assert!(bytes.starts_with(b"%PDF"), "rendered PDF should start with a header");
}

#[test]
fn rendering_is_deterministic() {
    let Some(bytes_a) = render_sample_pdf() else {
        eprintln!("Skipping rendering_is_deterministic: {}", SKIP_HINT);
        return;
    };
    let Some(bytes_b) = render_sample_pdf() else {
        eprintln!("Skipping rendering_is_deterministic: {}", SKIP_HINT);
        return;
    };

    assert_eq!(bytes_a.len(), bytes_b.len(), "PDF sizes should match");

    let hash_a = normalized_hash(&bytes_a);
    let hash_b = normalized_hash(&bytes_b);

    assert_eq!(
        hash_a, hash_b,
        "PDF renders must be deterministic after metadata normalization"
    );
}

#[test]
fn visible_content_is_stable_across_renders() {
    let group = sample_group();
    let config = ReportConfig::default();
    let request = RenderRequest {
        group: &group,
        details: None,
        masters: None,
        config: &config,
        generated_at: at(7, 12),
    };
    if !fonts::fonts_available() {
        eprintln!("Skipping visible_content_is_stable_across_renders: {}", SKIP_HINT);
        return;
    }
    let first = PdfRenderer::new().render(&request).expect("first render");
    let second = PdfRenderer::new().render(&request).expect("second render");

    assert_eq!(first.content(), second.content());
    let table = &first.content().table;
    assert_eq!(table.columns, vec!["#", "Timestamp", "reference", "unit", "reading"]);
    assert_eq!(table.rows[0], vec!["1", "04-03-2024 09:30", "50.0", "degC", ""]);
    assert_eq!(table.rows[2][4], "150.04");
}
