//! Custom elements and image helpers used by the PDF renderer.

use std::path::Path;

use image::{DynamicImage, GenericImageView, ImageBuffer, Rgb};

use genpdf::elements::Image;
use genpdf::error::{Context as _, Error};
use genpdf::style::{Style, StyledString};
use genpdf::{render, Alignment, Element, Mm, Position, RenderResult, Scale, Size};

use crate::builder::{mm_from_f64, mm_to_f64};

const DEFAULT_IMAGE_DPI: f64 = 300.0;
const MM_PER_INCH: f64 = 25.4;
const DEFAULT_UNDERLINE_OFFSET_MM: f64 = 0.4;

fn estimated_image_size(image: &DynamicImage, dpi: f64) -> Size {
    let (px_width, px_height) = image.dimensions();
    let width_mm = MM_PER_INCH * (px_width as f64) / dpi;
    let height_mm = MM_PER_INCH * (px_height as f64) / dpi;
    Size::new(mm_from_f64(width_mm), mm_from_f64(height_mm))
}

/// Loads an image from the given path with descriptive errors.
pub fn decode_image_from_path(path: impl AsRef<Path>) -> Result<DynamicImage, Error> {
    let path = path.as_ref();
    let reader = image::io::Reader::open(path)
        .with_context(|| format!("Failed to open image file {}", path.display()))?;
    reader
        .with_guessed_format()
        .context("Unable to determine image format")?
        .decode()
        .with_context(|| format!("Failed to decode image file {}", path.display()))
}

fn blend_on_white(channel: u8, alpha: u8) -> u8 {
    let alpha = alpha as u16;
    ((channel as u16 * alpha + 255 * (255 - alpha)) / 255) as u8
}

/// Composites images with transparency onto a white background; PDF images here carry no alpha.
pub fn flatten_alpha(image: DynamicImage) -> DynamicImage {
    if !image.color().has_alpha() {
        return image;
    }
    let rgba = image.to_rgba8();
    let (width, height) = rgba.dimensions();
    let rgb = ImageBuffer::from_fn(width, height, |x, y| {
        let pixel = rgba.get_pixel(x, y);
        Rgb([
            blend_on_white(pixel[0], pixel[3]),
            blend_on_white(pixel[1], pixel[3]),
            blend_on_white(pixel[2], pixel[3]),
        ])
    });
    DynamicImage::ImageRgb8(rgb)
}

/// A decoded logo ready to be placed in a report header.
pub struct BrandingImage {
    image: DynamicImage,
    natural_size: Size,
}

impl BrandingImage {
    /// Reads and decodes the image at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let image = flatten_alpha(decode_image_from_path(path)?);
        let natural_size = estimated_image_size(&image, DEFAULT_IMAGE_DPI);
        Ok(Self {
            image,
            natural_size,
        })
    }

    pub fn natural_size(&self) -> Size {
        self.natural_size
    }

    /// Builds an aligned image element scaled to `width_mm`, keeping the aspect ratio.
    pub fn element(&self, width_mm: f64, alignment: Alignment) -> Result<Image, Error> {
        let mut image = Image::from_dynamic_image(self.image.clone())?;
        image.set_alignment(alignment);
        let natural = mm_to_f64(self.natural_size.width);
        if natural > f64::EPSILON {
            let scale = width_mm / natural;
            image.set_scale(Scale::new(scale, scale));
        }
        Ok(image)
    }
}

/// A single line of styled text with a thin stroke underneath.
pub struct UnderlinedLine {
    text: StyledString,
    alignment: Alignment,
    underline_offset: Mm,
}

impl UnderlinedLine {
    pub fn new(text: impl Into<StyledString>) -> Self {
        Self {
            text: text.into(),
            alignment: Alignment::Left,
            underline_offset: mm_from_f64(DEFAULT_UNDERLINE_OFFSET_MM),
        }
    }

    pub fn with_alignment(mut self, alignment: Alignment) -> Self {
        self.alignment = alignment;
        self
    }
}

impl Element for UnderlinedLine {
    fn render(
        &mut self,
        context: &genpdf::Context,
        area: render::Area<'_>,
        style: Style,
    ) -> Result<RenderResult, Error> {
        let mut result = RenderResult::default();
        let mut string = self.text.clone();
        string.style = style.and(string.style);

        let width = string.width(&context.font_cache);
        let line_height = string.style.line_height(&context.font_cache);
        if line_height > area.size().height {
            result.has_more = true;
            return Ok(result);
        }

        let available_width = area.size().width;
        let x_offset = match self.alignment {
            Alignment::Left => Mm::default(),
            Alignment::Center => (available_width - width) / 2.0,
            Alignment::Right => available_width - width,
        };

        match area.text_section(&context.font_cache, Position::new(x_offset, 0), style) {
            Some(mut section) => section.print_str(&string.s, string.style)?,
            None => {
                result.has_more = true;
                return Ok(result);
            }
        }

        let glyph_height = string
            .style
            .font(&context.font_cache)
            .glyph_height(string.style.font_size());
        let baseline = glyph_height + self.underline_offset;
        let mut line_style = Style::new();
        if let Some(color) = string.style.color() {
            line_style = line_style.with_color(color);
        }
        area.draw_line(
            vec![
                Position::new(x_offset, baseline),
                Position::new(x_offset + width, baseline),
            ],
            line_style,
        );

        result.size = Size::new(width, line_height);
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn transparent_pixels_become_white() {
        let rgba = ImageBuffer::from_fn(2, 1, |x, _| {
            if x == 0 {
                Rgba([0, 0, 0, 0])
            } else {
                Rgba([10, 20, 30, 255])
            }
        });
        let flattened = flatten_alpha(DynamicImage::ImageRgba8(rgba));
        let rgb = flattened.to_rgb8();
        assert_eq!(rgb.get_pixel(0, 0), &Rgb([255, 255, 255]));
        assert_eq!(rgb.get_pixel(1, 0), &Rgb([10, 20, 30]));
    }

    #[test]
    fn missing_branding_file_is_an_error() {
        let err = BrandingImage::load("/__calibration_report_missing_logo__.png")
            .err()
            .expect("missing file");
        assert!(err.to_string().contains("Failed to open image file"));
    }

    #[test]
    fn natural_size_follows_dpi() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("logo.png");
        DynamicImage::ImageRgb8(ImageBuffer::from_pixel(300, 150, Rgb([1, 2, 3])))
            .save(&path)
            .expect("write png");
        let logo = BrandingImage::load(&path).expect("decodes");
        assert!((mm_to_f64(logo.natural_size().width) - 25.4).abs() < 1e-6);
        assert!((mm_to_f64(logo.natural_size().height) - 12.7).abs() < 1e-6);
    }
}
