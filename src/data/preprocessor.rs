// ============================================================
// Layer 4 — Preprocessing
// ============================================================
// Turns raw dataset fields into model-ready values.
//
// Text: questions and answers are cleaned before tokenisation.
//   - tabs, non-breaking and zero-width spaces become plain spaces
//   - control characters become spaces
//   - runs of whitespace collapse to one space, edges are trimmed
//
// Images: decoded with the `image` crate, converted to RGB,
// resized to image_size × image_size and normalised with the
// ImageNet channel statistics:
//
//   x[c, y, x] = (pixel[c] / 255 - MEAN[c]) / STD[c]
//
// The result is a flat CHW Vec<f32> of length 3 · size · size.
//
// Reference: image crate (imageops::resize)
//            torchvision.transforms.Normalize conventions

use anyhow::{Context, Result};
use image::{imageops::FilterType, DynamicImage};
use std::path::Path;

pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
pub const IMAGENET_STD:  [f32; 3] = [0.229, 0.224, 0.225];

/// Normalise whitespace and strip invisible characters.
pub fn clean_text(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '\u{00A0}' | '\u{200B}' | '\u{FEFF}' => ' ',
            c if c.is_control() => ' ',
            c => c,
        })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

// ─── ImagePreprocessor ────────────────────────────────────────────────────────
#[derive(Debug, Clone, Copy)]
pub struct ImagePreprocessor {
    image_size: u32,
}

impl ImagePreprocessor {
    pub fn new(image_size: usize) -> Self {
        Self { image_size: image_size as u32 }
    }

    pub fn image_size(&self) -> usize {
        self.image_size as usize
    }

    /// Decode an image file and convert it to a normalised CHW buffer.
    pub fn load(&self, path: &Path) -> Result<Vec<f32>> {
        let img = image::open(path)
            .with_context(|| format!("Cannot open image '{}'", path.display()))?;
        Ok(self.process(&img))
    }

    pub fn process(&self, img: &DynamicImage) -> Vec<f32> {
        let size = self.image_size;
        let rgb = img.to_rgb8();
        let resized = image::imageops::resize(&rgb, size, size, FilterType::Triangle);

        let plane = self.image_size() * self.image_size();
        let mut chw = vec![0.0f32; 3 * plane];
        for (x, y, pixel) in resized.enumerate_pixels() {
            let offset = y as usize * self.image_size() + x as usize;
            for c in 0..3 {
                let v = f32::from(pixel[c]) / 255.0;
                chw[c * plane + offset] = (v - IMAGENET_MEAN[c]) / IMAGENET_STD[c];
            }
        }
        chw
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    #[test]
    fn test_clean_text_collapses_whitespace() {
        assert_eq!(clean_text("  what\tis \u{00A0} the\u{0001}ball? "), "what is the ball?");
        assert_eq!(clean_text(""), "");
    }

    #[test]
    fn test_process_shape_and_normalisation() {
        let pre = ImagePreprocessor::new(4);
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(9, 7, Rgb([255, 0, 128])));
        let chw = pre.process(&img);
        assert_eq!(chw.len(), 3 * pre.image_size() * pre.image_size());

        let plane = 16;
        let red = (1.0 - IMAGENET_MEAN[0]) / IMAGENET_STD[0];
        let green = (0.0 - IMAGENET_MEAN[1]) / IMAGENET_STD[1];
        assert!((chw[0] - red).abs() < 1e-5);
        assert!((chw[plane] - green).abs() < 1e-5);
        assert!(chw[2 * plane..].iter().all(|v| (v - chw[2 * plane]).abs() < 1e-6));
    }

    #[test]
    fn test_load_png_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("red.png");
        RgbImage::from_pixel(5, 5, Rgb([200, 10, 10])).save(&path).unwrap();

        let pre = ImagePreprocessor::new(3);
        let chw = pre.load(&path).unwrap();
        assert_eq!(chw.len(), 27);
    }

    #[test]
    fn test_missing_image_has_context() {
        let pre = ImagePreprocessor::new(3);
        let err = pre.load(Path::new("/no/such/image.png")).unwrap_err();
        assert!(err.to_string().contains("/no/such/image.png"));
    }
}
