//! Image annotation: draws detector bounding boxes and labels onto uploads.
//!
//! Small images are upscaled first so labels stay legible, boxes are clipped
//! through [`geometry`], and the result is always re-encoded as JPEG. Label
//! drawing needs a font and fonts are probed best-effort ([`font`]): with no
//! usable font the annotator still draws boxes and skips labels, which is a
//! degraded success rather than a failure.
//!
//! # Example
//! ```no_run
//! use waste_vision_annotator::{Annotator, AnnotatorConfig};
//! use waste_vision_common::CoordinateMode;
//!
//! let annotator = Annotator::new(AnnotatorConfig::default());
//! let image = std::fs::read("upload.jpg").unwrap();
//! let annotated = annotator
//!     .annotate(&image, &[], CoordinateMode::CenterPixel)
//!     .unwrap();
//! ```

pub mod font;
pub mod geometry;

use ab_glyph::{FontVec, PxScale};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{ExtendedColorType, ImageEncoder, Pixel, Rgba, RgbaImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;
use std::collections::HashMap;
use std::path::PathBuf;
use thiserror::Error;
use tracing::{debug, warn};
use waste_vision_common::{CoordinateMode, RawDetection};

pub use geometry::{denormalize, to_pixel_box, PixelBox};

/// Annotation errors
#[derive(Debug, Error)]
pub enum AnnotateError {
    #[error("empty image payload")]
    InvalidInput,

    #[error("image processing failed: {0}")]
    Processing(String),
}

impl From<image::ImageError> for AnnotateError {
    fn from(err: image::ImageError) -> Self {
        AnnotateError::Processing(err.to_string())
    }
}

/// Annotation settings: palette, sizing thresholds, and font probing.
///
/// Everything the legacy renderer hard-coded is injectable here so tests can
/// substitute deterministic values.
#[derive(Debug, Clone)]
pub struct AnnotatorConfig {
    /// Category label (uppercase) to box color
    pub palette: HashMap<String, Rgba<u8>>,
    /// Color for categories missing from the palette
    pub default_color: Rgba<u8>,
    /// Smaller images are upscaled until their smaller dimension reaches this
    pub min_dimension: u32,
    /// Box outline thickness in pixels (doubled when the image was upscaled)
    pub box_thickness: u32,
    /// JPEG re-encode quality (1-100)
    pub jpeg_quality: u8,
    /// Label font size in pixels
    pub font_scale: f32,
    /// Alpha of the label background fill (0-255)
    pub label_opacity: u8,
    /// Font files probed in order
    pub font_candidates: Vec<PathBuf>,
    /// Directories scanned when no candidate loads
    pub font_dirs: Vec<PathBuf>,
}

impl Default for AnnotatorConfig {
    fn default() -> Self {
        let palette = HashMap::from([
            ("METAL".to_string(), Rgba([255, 0, 0, 255])),      // Red
            ("PLASTIC".to_string(), Rgba([0, 0, 255, 255])),    // Blue
            ("GLASS".to_string(), Rgba([0, 128, 0, 255])),      // Green
            ("PAPER".to_string(), Rgba([255, 255, 0, 255])),    // Yellow
            ("CARDBOARD".to_string(), Rgba([255, 165, 0, 255])), // Orange
            ("TRASH".to_string(), Rgba([128, 128, 128, 255])),  // Gray
        ]);

        Self {
            palette,
            default_color: Rgba([255, 0, 255, 255]), // Magenta
            min_dimension: 1000,
            box_thickness: 2,
            jpeg_quality: 90,
            font_scale: 12.0,
            label_opacity: 200,
            font_candidates: font::default_candidates(),
            font_dirs: font::default_font_dirs(),
        }
    }
}

/// Scale needed so the smaller image dimension reaches `min_dimension`.
///
/// Returns 1.0 when the image is already large enough.
#[must_use]
pub fn upscale_factor(width: u32, height: u32, min_dimension: u32) -> f32 {
    let smallest = width.min(height);
    if smallest == 0 || smallest >= min_dimension {
        return 1.0;
    }
    min_dimension as f32 / smallest as f32
}

/// Draws detection boxes and labels onto image bytes.
pub struct Annotator {
    config: AnnotatorConfig,
    font: Option<FontVec>,
}

impl Annotator {
    /// Create an annotator, probing for a label font up front.
    #[must_use]
    pub fn new(config: AnnotatorConfig) -> Self {
        let font = font::load_first_available(&config.font_candidates, &config.font_dirs);
        if font.is_none() {
            warn!("no usable label font found; boxes will be drawn without labels");
        }
        Self { config, font }
    }

    /// Whether a label font was found at construction.
    #[must_use]
    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    /// Draw `detections` onto `image_bytes` and re-encode as JPEG.
    ///
    /// An empty detection list is a no-op that returns the input unchanged.
    /// Degenerate boxes are skipped silently. Decode or encode problems
    /// surface as [`AnnotateError::Processing`], which the pipeline treats as
    /// a soft failure.
    pub fn annotate(
        &self,
        image_bytes: &[u8],
        detections: &[RawDetection],
        mode: CoordinateMode,
    ) -> Result<Vec<u8>, AnnotateError> {
        if image_bytes.is_empty() {
            return Err(AnnotateError::InvalidInput);
        }
        if detections.is_empty() {
            return Ok(image_bytes.to_vec());
        }

        let decoded = image::load_from_memory(image_bytes)?;
        let mut canvas = decoded.to_rgba8();
        let (source_width, source_height) = canvas.dimensions();

        let scale = upscale_factor(source_width, source_height, self.config.min_dimension);
        let was_upscaled = scale > 1.0;
        if was_upscaled {
            let new_width = (source_width as f32 * scale).round() as u32;
            let new_height = (source_height as f32 * scale).round() as u32;
            debug!(
                from_width = source_width,
                from_height = source_height,
                to_width = new_width,
                to_height = new_height,
                "upscaling image for label legibility"
            );
            canvas = image::imageops::resize(&canvas, new_width, new_height, FilterType::Lanczos3);
        }

        let (width, height) = canvas.dimensions();
        let thickness = if was_upscaled {
            self.config.box_thickness * 2
        } else {
            self.config.box_thickness
        };

        for detection in detections {
            // Normalized boxes are resolved against the dimensions the
            // detector saw; the scale factor then maps onto the canvas.
            let resolved = geometry::denormalize(detection, mode, source_width, source_height);
            let Some(bbox) = geometry::to_pixel_box(&resolved, width, height, scale) else {
                debug!(class = %detection.class, "skipping degenerate box");
                continue;
            };

            let color = self.color_for(&detection.class);
            draw_box(&mut canvas, &bbox, color, thickness);

            if let Some(font) = &self.font {
                self.draw_label(&mut canvas, font, detection, &bbox, color, was_upscaled);
            }
        }

        let rgb = image::DynamicImage::ImageRgba8(canvas).to_rgb8();
        let mut encoded = Vec::new();
        JpegEncoder::new_with_quality(&mut encoded, self.config.jpeg_quality)
            .write_image(
                rgb.as_raw(),
                rgb.width(),
                rgb.height(),
                ExtendedColorType::Rgb8,
            )
            .map_err(|e| AnnotateError::Processing(e.to_string()))?;

        Ok(encoded)
    }

    fn color_for(&self, class: &str) -> Rgba<u8> {
        self.config
            .palette
            .get(&class.to_uppercase())
            .copied()
            .unwrap_or(self.config.default_color)
    }

    fn draw_label(
        &self,
        canvas: &mut RgbaImage,
        font: &FontVec,
        detection: &RawDetection,
        bbox: &PixelBox,
        color: Rgba<u8>,
        was_upscaled: bool,
    ) {
        let label = format!("{} ({:.1}%)", detection.class, detection.confidence * 100.0);
        let scale = PxScale::from(if was_upscaled {
            self.config.font_scale * 1.5
        } else {
            self.config.font_scale
        });
        let (text_width, text_height) = text_size(scale, font, &label);
        let padding = if was_upscaled { 8u32 } else { 5u32 };

        let (width, height) = canvas.dimensions();
        let x = bbox.x.round() as u32;
        let box_y = bbox.y.round() as u32;

        // Above the box, or just inside it when clipped by the top edge.
        let label_y = if box_y > text_height + padding * 2 {
            box_y - text_height - padding * 2
        } else {
            box_y + padding
        };

        let bg = Rgba([color.0[0], color.0[1], color.0[2], self.config.label_opacity]);
        let bg_right = (x + text_width + padding * 2).min(width);
        let bg_bottom = (label_y + text_height + padding * 2).min(height);
        for py in label_y..bg_bottom {
            for px in x..bg_right {
                canvas.get_pixel_mut(px, py).blend(&bg);
            }
        }

        draw_text_mut(
            canvas,
            Rgba([255, 255, 255, 255]),
            (x + padding) as i32,
            (label_y + padding) as i32,
            scale,
            font,
            &label,
        );
    }
}

/// Draw a hollow rectangle, thickened inward.
fn draw_box(canvas: &mut RgbaImage, bbox: &PixelBox, color: Rgba<u8>, thickness: u32) {
    let x = bbox.x.round() as i32;
    let y = bbox.y.round() as i32;
    let width = bbox.width.round() as u32;
    let height = bbox.height.round() as u32;

    for t in 0..thickness {
        let inner_width = width.saturating_sub(2 * t);
        let inner_height = height.saturating_sub(2 * t);
        if inner_width == 0 || inner_height == 0 {
            break;
        }
        let rect = Rect::at(x + t as i32, y + t as i32).of_size(inner_width, inner_height);
        draw_hollow_rect_mut(canvas, rect, color);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;
    use std::io::Cursor;

    /// Annotator with font probing disabled for determinism.
    fn fontless_annotator() -> Annotator {
        Annotator::new(AnnotatorConfig {
            font_candidates: Vec::new(),
            font_dirs: Vec::new(),
            ..AnnotatorConfig::default()
        })
    }

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_pixel(width, height, image::Rgb([40, 80, 120]));
        let mut bytes = Vec::new();
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();
        bytes
    }

    fn detection(x: f64, y: f64, width: f64, height: f64, class: &str) -> RawDetection {
        RawDetection {
            x,
            y,
            width,
            height,
            confidence: 0.87,
            class: class.to_string(),
            class_id: 0,
            detection_id: None,
        }
    }

    #[test]
    fn test_upscale_factor_small_image() {
        let factor = upscale_factor(500, 400, 1000);
        assert_eq!(factor, 2.5);
        // The smaller dimension reaches exactly the minimum.
        assert_eq!((400.0 * factor) as u32, 1000);
        assert_eq!((500.0 * factor) as u32, 1250);
    }

    #[test]
    fn test_upscale_factor_large_image() {
        assert_eq!(upscale_factor(1920, 1080, 1000), 1.0);
        assert_eq!(upscale_factor(1000, 1000, 1000), 1.0);
    }

    #[test]
    fn test_upscale_factor_zero_dimension() {
        assert_eq!(upscale_factor(0, 500, 1000), 1.0);
    }

    #[test]
    fn test_annotate_empty_bytes_is_invalid() {
        let annotator = fontless_annotator();
        let err = annotator
            .annotate(&[], &[detection(10.0, 10.0, 5.0, 5.0, "METAL")], CoordinateMode::CenterPixel)
            .unwrap_err();
        assert!(matches!(err, AnnotateError::InvalidInput));
    }

    #[test]
    fn test_annotate_no_detections_is_noop() {
        let annotator = fontless_annotator();
        let bytes = png_bytes(64, 64);
        let out = annotator
            .annotate(&bytes, &[], CoordinateMode::CenterPixel)
            .unwrap();
        assert_eq!(out, bytes);
    }

    #[test]
    fn test_disabled_font_probing_yields_no_font() {
        // With probing disabled the annotator runs in the degraded
        // boxes-without-labels mode.
        assert!(!fontless_annotator().has_font());
    }

    #[test]
    fn test_annotate_undecodable_image_is_soft_failure() {
        let annotator = fontless_annotator();
        let err = annotator
            .annotate(
                b"definitely not an image",
                &[detection(10.0, 10.0, 5.0, 5.0, "METAL")],
                CoordinateMode::CenterPixel,
            )
            .unwrap_err();
        assert!(matches!(err, AnnotateError::Processing(_)));
    }

    #[test]
    fn test_annotate_upscales_and_reencodes_jpeg() {
        let annotator = fontless_annotator();
        let bytes = png_bytes(120, 80);
        let out = annotator
            .annotate(
                &bytes,
                &[detection(60.0, 40.0, 40.0, 20.0, "PLASTIC")],
                CoordinateMode::CenterPixel,
            )
            .unwrap();

        let decoded = image::load_from_memory(&out).unwrap();
        // 120x80 upscales by 12.5: smaller dimension lands on 1000.
        assert_eq!(decoded.height(), 1000);
        assert_eq!(decoded.width(), 1500);
        assert_eq!(
            image::guess_format(&out).unwrap(),
            image::ImageFormat::Jpeg
        );
    }

    #[test]
    fn test_annotate_skips_degenerate_boxes() {
        let annotator = fontless_annotator();
        let bytes = png_bytes(1200, 1200);
        // A box entirely outside the frame must be dropped, not panic.
        let out = annotator
            .annotate(
                &bytes,
                &[detection(5000.0, 5000.0, 10.0, 10.0, "TRASH")],
                CoordinateMode::CenterPixel,
            )
            .unwrap();
        assert!(image::load_from_memory(&out).is_ok());
    }

    #[test]
    fn test_annotate_normalized_boxes() {
        let annotator = fontless_annotator();
        let bytes = png_bytes(1200, 1200);
        let out = annotator
            .annotate(
                &bytes,
                &[detection(0.5, 0.5, 0.25, 0.25, "GLASS")],
                CoordinateMode::CenterNormalized,
            )
            .unwrap();
        assert!(image::load_from_memory(&out).is_ok());
    }

    #[test]
    fn test_palette_lookup_is_case_insensitive() {
        let annotator = fontless_annotator();
        assert_eq!(annotator.color_for("plastic"), Rgba([0, 0, 255, 255]));
        assert_eq!(annotator.color_for("PLASTIC"), Rgba([0, 0, 255, 255]));
        assert_eq!(annotator.color_for("unknown"), Rgba([255, 0, 255, 255]));
    }
}
