//! Document setup shared by all calibration reports: paper, margins, page frame and footer.

use genpdf::error::{Error, ErrorKind};
use genpdf::style::Style;
use genpdf::{self, Element, Margins, Mm, PageDecorator, Position, Size};

use crate::fonts;

const FRAME_OUTER_INSET_MM: f64 = 4.0;
const FRAME_INNER_INSET_MM: f64 = 6.0;
const CONTENT_MARGIN_MM: f64 = 12.0;

pub(crate) fn mm_from_f64(value: f64) -> Mm {
    Mm::from(printpdf::Mm(value))
}

pub(crate) fn mm_to_f64(value: Mm) -> f64 {
    let mm: printpdf::Mm = value.into();
    mm.0
}

type FooterFactory = dyn Fn(usize) -> Box<dyn Element>;

/// Builder for A4 report documents.
///
/// Pages get a double rectangular frame drawn inside the paper edge; content starts inside
/// fixed margins.
#[derive(Default)]
pub struct ReportDocumentBuilder {
    title: Option<String>,
    font_size: Option<u8>,
    footer: Option<(Mm, Box<FooterFactory>)>,
}

impl ReportDocumentBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the document title stored in the PDF metadata.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Sets the base font size in points.
    pub fn with_font_size(mut self, font_size: u8) -> Self {
        self.font_size = Some(font_size);
        self
    }

    /// Reserves `height` at the bottom of every page for the element produced by `footer`.
    pub fn with_footer<F, E>(mut self, height: impl Into<Mm>, footer: F) -> Self
    where
        F: Fn(usize) -> E + 'static,
        E: Element + 'static,
    {
        self.footer = Some((
            height.into(),
            Box::new(move |page| Box::new(footer(page)) as Box<dyn Element>),
        ));
        self
    }

    /// Builds a `genpdf::Document` using the report font family.
    pub fn build(self) -> Result<genpdf::Document, Error> {
        let font_family = fonts::report_font_family()?;
        let mut document = genpdf::Document::new(font_family);

        document.set_paper_size(genpdf::PaperSize::A4);
        if let Some(title) = self.title {
            document.set_title(title);
        }
        if let Some(font_size) = self.font_size {
            document.set_font_size(font_size);
        }

        document.set_page_decorator(FramedPageDecorator {
            page: 0,
            footer: self.footer,
        });

        Ok(document)
    }
}

struct FramedPageDecorator {
    page: usize,
    footer: Option<(Mm, Box<FooterFactory>)>,
}

fn draw_frame(area: &genpdf::render::Area<'_>, inset: Mm, paper: Size) {
    let left = inset;
    let top = inset;
    let right = paper.width - inset;
    let bottom = paper.height - inset;
    area.draw_line(
        vec![
            Position::new(left, top),
            Position::new(right, top),
            Position::new(right, bottom),
            Position::new(left, bottom),
            Position::new(left, top),
        ],
        Style::new(),
    );
}

impl PageDecorator for FramedPageDecorator {
    fn decorate_page<'a>(
        &mut self,
        context: &genpdf::Context,
        mut area: genpdf::render::Area<'a>,
        style: Style,
    ) -> Result<genpdf::render::Area<'a>, Error> {
        self.page += 1;

        let paper = area.size();
        draw_frame(&area, mm_from_f64(FRAME_OUTER_INSET_MM), paper);
        draw_frame(&area, mm_from_f64(FRAME_INNER_INSET_MM), paper);

        area.add_margins(Margins::from(mm_from_f64(CONTENT_MARGIN_MM)));

        if let Some((height, factory)) = &self.footer {
            let available = area.size().height;
            if *height > available {
                return Err(Error::new(
                    "Footer height exceeds available space",
                    ErrorKind::InvalidData,
                ));
            }

            let mut footer_area = area.clone();
            footer_area.add_offset(Position::new(0, available - *height));
            let mut element = factory(self.page);
            let result = element.render(context, footer_area, style)?;
            if result.has_more {
                return Err(Error::new(
                    "Footer does not fit into the reserved space",
                    ErrorKind::PageSizeExceeded,
                ));
            }

            area.set_height(available - *height);
        }

        Ok(area)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn millimetre_conversion_round_trips() {
        assert!((mm_to_f64(mm_from_f64(12.5)) - 12.5).abs() < f64::EPSILON);
    }

    #[test]
    fn frame_fits_inside_default_margins() {
        assert!(FRAME_OUTER_INSET_MM < FRAME_INNER_INSET_MM);
        assert!(FRAME_INNER_INSET_MM < CONTENT_MARGIN_MM);
    }

    #[test]
    fn builder_keeps_title_font_size_and_footer() {
        let builder = ReportDocumentBuilder::new()
            .with_title("CALIBRATION REPORT PT-1")
            .with_font_size(11)
            .with_footer(mm_from_f64(8.0), |page| {
                genpdf::elements::Paragraph::new(format!("Page {}", page))
            });
        assert_eq!(builder.title.as_deref(), Some("CALIBRATION REPORT PT-1"));
        assert_eq!(builder.font_size, Some(11));
        let height = builder.footer.as_ref().map(|(height, _)| mm_to_f64(*height));
        assert_eq!(height, Some(8.0));

        if !fonts::fonts_available() {
            eprintln!("Skipping document build: report fonts missing. Set CALIB_REPORT_FONTS_DIR.");
            return;
        }
        assert!(builder.build().is_ok());
    }
}
