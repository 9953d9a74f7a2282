//! PDF backend for calibration reports, built on `genpdf`.

use genpdf::elements::{Break, FrameCellDecorator, LinearLayout, Paragraph, TableLayout};
use genpdf::error::Error;
use genpdf::style::{Style, StyledString};
use genpdf::{Alignment, Document, Element};
use log::{debug, warn};

use crate::builder::ReportDocumentBuilder;
use crate::elements::{BrandingImage, UnderlinedLine};
use crate::fonts;
use crate::record::format_number;
use crate::report::{
    Report, ReportContent, ReportError, ReportRenderer, RenderError, RenderRequest, RenderStage,
    DATE_FORMAT, ROW_NUMBER_COLUMN, TIMESTAMP_FORMAT,
};

const PDF_EXTENSION: &str = "pdf";
const DEFAULT_FONT_SIZE: u8 = 9;
const DEFAULT_LOGO_WIDTH_MM: f64 = 30.0;
const FOOTER_HEIGHT: i32 = 8;
const CELL_PADDING: i32 = 1;
const TITLE_SIZE_STEP: u8 = 3;
const SIGNATURE_LINE: &str = "____________________";

fn bold(text: impl Into<String>) -> StyledString {
    StyledString::new(text.into(), Style::new().bold())
}

fn labelled(label: &str, value: impl Into<String>) -> Paragraph {
    let mut paragraph = Paragraph::default();
    paragraph.push(bold(format!("{}: ", label)));
    let value: String = value.into();
    paragraph.push(value);
    paragraph
}

/// Renders reports as A4 PDF documents.
#[derive(Clone, Debug)]
pub struct PdfRenderer {
    font_size: u8,
    logo_width_mm: f64,
}

impl Default for PdfRenderer {
    fn default() -> Self {
        Self {
            font_size: DEFAULT_FONT_SIZE,
            logo_width_mm: DEFAULT_LOGO_WIDTH_MM,
        }
    }
}

impl PdfRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_font_size(mut self, font_size: u8) -> Self {
        self.font_size = font_size;
        self
    }

    pub fn with_logo_width_mm(mut self, width_mm: f64) -> Self {
        self.logo_width_mm = width_mm;
        self
    }

    fn title_font_size(&self) -> u8 {
        self.font_size.saturating_add(TITLE_SIZE_STEP)
    }

    fn title_block(&self, content: &ReportContent) -> LinearLayout {
        let header = &content.header;
        let mut block = LinearLayout::vertical();
        for line in &header.organization {
            block.push(Paragraph::new(bold(line.as_str())).aligned(Alignment::Center));
        }
        block.push(
            UnderlinedLine::new(StyledString::new(
                header.title.clone(),
                Style::new().bold().with_font_size(self.title_font_size()),
            ))
            .with_alignment(Alignment::Center),
        );
        block
    }

    fn push_header(
        &self,
        document: &mut Document,
        content: &ReportContent,
        branding: Option<&BrandingImage>,
    ) -> Result<(), Error> {
        match branding {
            Some(logo) => {
                let mut table = TableLayout::new(vec![1, 4]);
                table.set_cell_decorator(FrameCellDecorator::new(false, true, false));
                table
                    .row()
                    .element(logo.element(self.logo_width_mm, Alignment::Center)?.padded(2))
                    .element(self.title_block(content).padded(2))
                    .push()?;
                document.push(table);
            }
            None => document.push(self.title_block(content).padded(2).framed()),
        }
        document.push(Break::new(1));

        let header = &content.header;
        let mut left = LinearLayout::vertical();
        left.push(labelled("Instrument", header.instrument_id.as_str()));
        left.push(labelled(
            "Report Date",
            header.generated_on.format(DATE_FORMAT).to_string(),
        ));

        let mut right = LinearLayout::vertical();
        let first = header.first_calibration.format(DATE_FORMAT).to_string();
        let last = header.last_calibration.format(DATE_FORMAT).to_string();
        let span = if first == last {
            first
        } else {
            format!("{} to {}", first, last)
        };
        right.push(labelled("Calibration Date", span));
        if let Some(due) = header.due_date {
            right.push(labelled(
                "Calibration Due Date",
                due.format(DATE_FORMAT).to_string(),
            ));
        }

        let mut info = TableLayout::new(vec![1, 1]);
        info.set_cell_decorator(FrameCellDecorator::new(false, true, false));
        info.row()
            .element(left.padded(2))
            .element(right.padded(2))
            .push()?;
        document.push(info);
        document.push(Break::new(1));
        Ok(())
    }

    fn push_details(&self, document: &mut Document, content: &ReportContent) -> Result<(), Error> {
        if content.details.is_empty() && content.masters.is_empty() {
            return Ok(());
        }

        let mut instrument = LinearLayout::vertical();
        instrument.push(Paragraph::new(bold("Details of Instrument Under Test")));
        instrument.push(labelled("Tag No", content.header.instrument_id.as_str()));
        for (label, value) in &content.details {
            instrument.push(labelled(label, value.as_str()));
        }

        let mut master = LinearLayout::vertical();
        master.push(Paragraph::new(bold("Details of Calibration Master Instrument")));
        for entry in &content.masters {
            master.push(labelled("Serial No", entry.serial_no.as_str()));
            for (label, value) in &entry.details {
                master.push(labelled(label, value.as_str()));
            }
        }

        let mut table = TableLayout::new(vec![1, 1]);
        table.set_cell_decorator(FrameCellDecorator::new(true, true, false));
        table
            .row()
            .element(instrument.padded(2))
            .element(master.padded(2))
            .push()?;
        document.push(table);
        document.push(Break::new(1));
        Ok(())
    }

    fn push_readings(&self, document: &mut Document, content: &ReportContent) -> Result<(), Error> {
        let columns = &content.table.columns;
        // Row number and timestamp get fixed weights; measurements share the rest.
        let weights = columns
            .iter()
            .enumerate()
            .map(|(index, _)| match index {
                0 => 1,
                1 => 4,
                _ => 3,
            })
            .collect();
        let mut table = TableLayout::new(weights);
        table.set_cell_decorator(FrameCellDecorator::new(true, true, false));

        let mut header = table.row();
        for column in columns {
            header.push_element(
                Paragraph::new(bold(column.as_str()))
                    .aligned(Alignment::Center)
                    .padded(CELL_PADDING),
            );
        }
        header.push()?;

        for cells in &content.table.rows {
            let mut row = table.row();
            for cell in cells {
                row.push_element(
                    Paragraph::new(cell.as_str())
                        .aligned(Alignment::Center)
                        .padded(CELL_PADDING),
                );
            }
            row.push()?;
        }

        document.push(Paragraph::new(bold("Calibration Readings")));
        document.push(table);
        Ok(())
    }

    fn push_span_check(&self, document: &mut Document, content: &ReportContent) -> Result<(), Error> {
        let Some(check) = &content.span_check else {
            return Ok(());
        };
        let range = &check.range;
        let unit = range.unit().unwrap_or_default();
        let optional = |value: Option<f64>| value.map(format_number).unwrap_or_default();

        let mut table = TableLayout::new(vec![1, 2, 3, 3, 3, 3, 3, 3]);
        table.set_cell_decorator(FrameCellDecorator::new(true, true, false));
        let desired_header = if unit.is_empty() {
            "Desired".to_string()
        } else {
            format!("Desired ({})", unit)
        };
        let headers = [
            ROW_NUMBER_COLUMN.to_string(),
            "% Span".to_string(),
            desired_header,
            "Desired mA".to_string(),
            "Actual Up".to_string(),
            "% Error Up".to_string(),
            "Actual Down".to_string(),
            "% Error Down".to_string(),
        ];
        let mut header = table.row();
        for title in headers {
            header.push_element(
                Paragraph::new(bold(title))
                    .aligned(Alignment::Center)
                    .padded(CELL_PADDING),
            );
        }
        header.push()?;

        for (index, point) in check.checkpoints.iter().enumerate() {
            let cells = [
                (index + 1).to_string(),
                point.percent.to_string(),
                format_number(point.desired),
                optional(point.desired_milliamps),
                optional(point.actual_up),
                optional(point.error_up),
                optional(point.actual_down),
                optional(point.error_down),
            ];
            let mut row = table.row();
            for cell in cells {
                row.push_element(
                    Paragraph::new(cell)
                        .aligned(Alignment::Center)
                        .padded(CELL_PADDING),
                );
            }
            row.push()?;
        }

        document.push(Break::new(1));
        document.push(Paragraph::new(bold(format!(
            "Expected Values ({} to {} {})",
            format_number(range.min()),
            format_number(range.max()),
            unit
        ))));
        document.push(table);
        Ok(())
    }

    fn push_sign_off(&self, document: &mut Document, content: &ReportContent) -> Result<(), Error> {
        let mut table = TableLayout::new(vec![1, 1]);
        table.set_cell_decorator(FrameCellDecorator::new(true, true, false));
        table
            .row()
            .element(labelled("Calibrated By", content.sign_off.calibrated_by.join(", ")).padded(2))
            .element(
                labelled("Checked By", SIGNATURE_LINE)
                    .aligned(Alignment::Right)
                    .padded(2),
            )
            .push()?;
        document.push(Break::new(1));
        document.push(table);
        Ok(())
    }

    fn push_notes(&self, document: &mut Document, content: &ReportContent) {
        if content.notes.is_empty() {
            return;
        }
        document.push(Break::new(1));
        document.push(Paragraph::new(bold("Notes")));
        for note in &content.notes {
            document.push(labelled(
                &note.timestamp.format(TIMESTAMP_FORMAT).to_string(),
                note.text.as_str(),
            ));
        }
    }

    fn layout(
        &self,
        document: &mut Document,
        content: &ReportContent,
        branding: Option<&BrandingImage>,
    ) -> Result<(), Error> {
        self.push_header(document, content, branding)?;
        self.push_details(document, content)?;
        self.push_readings(document, content)?;
        self.push_span_check(document, content)?;
        self.push_notes(document, content);
        self.push_sign_off(document, content)
    }
}

impl ReportRenderer for PdfRenderer {
    fn render(&self, request: &RenderRequest<'_>) -> Result<Report, ReportError> {
        let content = ReportContent::build(request)?;
        let instrument_id = content.header.instrument_id.as_str();
        let fail = |stage| move |err| RenderError::new(instrument_id, stage, err);

        let branding = request
            .config
            .branding
            .as_ref()
            .map(BrandingImage::load)
            .transpose()
            .map_err(fail(RenderStage::Branding))?;

        let mut document = ReportDocumentBuilder::new()
            .with_title(format!("{} {}", content.header.title, instrument_id))
            .with_font_size(self.font_size)
            .with_footer(FOOTER_HEIGHT, |page| {
                Paragraph::new(format!("Page {}", page)).aligned(Alignment::Right)
            })
            .build()
            .map_err(|err| {
                if fonts::is_missing_fonts(&err) {
                    warn!("No report fonts available; set {}", fonts::FONTS_DIR_ENV);
                }
                fail(RenderStage::Fonts)(err)
            })?;

        self.layout(&mut document, &content, branding.as_ref())
            .map_err(fail(RenderStage::Layout))?;

        let mut bytes = Vec::new();
        document
            .render(&mut bytes)
            .map_err(fail(RenderStage::Layout))?;

        debug!(
            "Rendered {} ({} rows, {} bytes)",
            instrument_id,
            content.table.row_count(),
            bytes.len()
        );
        Ok(Report::new(
            content,
            bytes,
            request.generated_at,
            PDF_EXTENSION,
        ))
    }
}
