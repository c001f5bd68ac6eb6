//! Box geometry: center-based detector output to clipped pixel rectangles.
//!
//! Detectors report boxes with (x, y) at the box **center**, in pixel or
//! normalized coordinates. Rendering needs top-left rectangles clipped to the
//! image bounds. Everything here is pure and deterministic; out-of-frame
//! boxes collapse to `None` rather than erroring.

use waste_vision_common::{CoordinateMode, RawDetection};

/// Top-left pixel rectangle, clipped so it lies fully inside the image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PixelBox {
    /// X coordinate of the top-left corner
    pub x: f32,
    /// Y coordinate of the top-left corner
    pub y: f32,
    /// Width of the box
    pub width: f32,
    /// Height of the box
    pub height: f32,
}

/// Resolve a detection to center-based pixel coordinates.
///
/// `CenterNormalized` boxes are multiplied by the image dimensions;
/// `CenterPixel` boxes pass through unchanged.
#[must_use]
pub fn denormalize(
    detection: &RawDetection,
    mode: CoordinateMode,
    image_width: u32,
    image_height: u32,
) -> RawDetection {
    match mode {
        CoordinateMode::CenterPixel => detection.clone(),
        CoordinateMode::CenterNormalized => RawDetection {
            x: detection.x * f64::from(image_width),
            y: detection.y * f64::from(image_height),
            width: detection.width * f64::from(image_width),
            height: detection.height * f64::from(image_height),
            ..detection.clone()
        },
    }
}

/// Convert a center-based pixel box into a clipped top-left rectangle.
///
/// `scale_factor` compensates for a prior upscale step: the detector saw the
/// original image, the canvas may be larger. Returns `None` when the clipped
/// box has no area left, which callers treat as a skip, not an error.
#[must_use]
pub fn to_pixel_box(
    detection: &RawDetection,
    image_width: u32,
    image_height: u32,
    scale_factor: f32,
) -> Option<PixelBox> {
    let x = detection.x as f32 * scale_factor;
    let y = detection.y as f32 * scale_factor;
    let width = detection.width as f32 * scale_factor;
    let height = detection.height as f32 * scale_factor;

    // Center to top-left corner, then clamp into the frame.
    let x_min = (x - width / 2.0).max(0.0);
    let y_min = (y - height / 2.0).max(0.0);
    let width = width.min(image_width as f32 - x_min);
    let height = height.min(image_height as f32 - y_min);

    if width <= 0.0 || height <= 0.0 {
        return None;
    }

    Some(PixelBox {
        x: x_min,
        y: y_min,
        width,
        height,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detection(x: f64, y: f64, width: f64, height: f64) -> RawDetection {
        RawDetection {
            x,
            y,
            width,
            height,
            confidence: 0.9,
            class: "PLASTIC".to_string(),
            class_id: 0,
            detection_id: None,
        }
    }

    #[test]
    fn test_center_to_corner_conversion() {
        let bbox = to_pixel_box(&detection(100.0, 100.0, 40.0, 20.0), 500, 500, 1.0).unwrap();
        assert_eq!(bbox.x, 80.0);
        assert_eq!(bbox.y, 90.0);
        assert_eq!(bbox.width, 40.0);
        assert_eq!(bbox.height, 20.0);
    }

    #[test]
    fn test_clipping_to_image_bounds() {
        // Center (25, 25), size 30x30 in a 30x30 image: the top-left lands at
        // (10, 10) and the box is trimmed to the frame.
        let bbox = to_pixel_box(&detection(25.0, 25.0, 30.0, 30.0), 30, 30, 1.0).unwrap();
        assert_eq!(bbox.x, 10.0);
        assert_eq!(bbox.y, 10.0);
        assert_eq!(bbox.width, 20.0);
        assert_eq!(bbox.height, 20.0);
        assert!(bbox.x + bbox.width <= 30.0);
        assert!(bbox.y + bbox.height <= 30.0);
    }

    #[test]
    fn test_clipping_negative_corner() {
        // Corner resolves to negative coordinates and clamps to the origin.
        let bbox = to_pixel_box(&detection(10.0, 10.0, 40.0, 40.0), 30, 30, 1.0).unwrap();
        assert_eq!(bbox.x, 0.0);
        assert_eq!(bbox.y, 0.0);
        assert!(bbox.x + bbox.width <= 30.0);
        assert!(bbox.y + bbox.height <= 30.0);
    }

    #[test]
    fn test_degenerate_box_dropped() {
        // Entirely right of the frame: clipped width goes negative.
        assert!(to_pixel_box(&detection(40.0, 15.0, 10.0, 10.0), 30, 30, 1.0).is_none());
        // Zero-size box.
        assert!(to_pixel_box(&detection(15.0, 15.0, 0.0, 0.0), 30, 30, 1.0).is_none());
    }

    #[test]
    fn test_scale_factor_applied_before_conversion() {
        let bbox = to_pixel_box(&detection(100.0, 100.0, 40.0, 20.0), 1000, 1000, 2.0).unwrap();
        assert_eq!(bbox.x, 160.0);
        assert_eq!(bbox.y, 180.0);
        assert_eq!(bbox.width, 80.0);
        assert_eq!(bbox.height, 40.0);
    }

    #[test]
    fn test_denormalize_normalized_box() {
        let resolved = denormalize(
            &detection(0.5, 0.5, 0.2, 0.1),
            CoordinateMode::CenterNormalized,
            800,
            600,
        );
        assert_eq!(resolved.x, 400.0);
        assert_eq!(resolved.y, 300.0);
        assert_eq!(resolved.width, 160.0);
        assert_eq!(resolved.height, 60.0);
    }

    #[test]
    fn test_denormalize_pixel_box_passthrough() {
        let original = detection(100.0, 100.0, 40.0, 20.0);
        let resolved = denormalize(&original, CoordinateMode::CenterPixel, 800, 600);
        assert_eq!(resolved, original);
    }
}
