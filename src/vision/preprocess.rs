//! Image normalization ahead of zone detection and recognition
//!
//! Runs illumination correction, deskew, contrast enhancement, denoising,
//! sharpening and grid-line removal in a fixed order. A step that fails is
//! skipped: its input image is passed through unchanged and the step is left
//! out of the step log.

use std::panic::{self, AssertUnwindSafe};

use image::{imageops::FilterType, GrayImage, Luma};
use imageproc::geometric_transformations::{rotate_about_center, Interpolation};
use imageproc::geometry::min_area_rect;
use imageproc::point::Point;
use tracing::{debug, info, warn};

use super::filters::{self, LineDirection};
use crate::config::PreprocessConfig;
use crate::error::{OcrError, Result};

/// Corrections smaller than this (degrees) leave the image untouched
const MIN_SKEW_DEGREES: f32 = 0.05;

/// Output of the preprocessor
#[derive(Debug, Clone)]
pub struct PreparedImage {
    /// Enhanced grayscale (after sharpening)
    pub gray: GrayImage,
    /// Otsu binary with grid lines removed
    pub binary: GrayImage,
    /// Bitwise OR of `gray` and `binary`, used for zone detection
    pub working: GrayImage,
    /// Labels of the steps that were applied, in order
    pub steps: Vec<String>,
}

impl PreparedImage {
    pub fn dimensions(&self) -> (u32, u32) {
        self.working.dimensions()
    }
}

/// Image normalization pipeline
pub struct ImagePreprocessor {
    config: PreprocessConfig,
}

impl ImagePreprocessor {
    pub fn new(config: PreprocessConfig) -> Self {
        Self { config }
    }

    /// Run every step on a grayscale source image
    pub fn process(&self, source: &GrayImage) -> PreparedImage {
        let cfg = &self.config;
        let mut steps = Vec::new();

        let gray = apply_step(&mut steps, "illumination normalization", source.clone(), |img| {
            normalize_illumination(img, cfg.illumination_radius as u32)
        });
        let gray = apply_step(&mut steps, "deskew", gray, deskew);
        let gray = apply_step(&mut steps, "contrast enhancement", gray, |img| {
            non_empty(img, "contrast enhancement")?;
            Ok(filters::clahe(img, cfg.clahe_clip_limit, cfg.clahe_tiles))
        });
        let gray = apply_step(&mut steps, "denoise", gray, |img| {
            non_empty(img, "denoise")?;
            Ok(filters::non_local_means(
                img,
                cfg.denoise_strength,
                cfg.denoise_patch_radius,
                cfg.denoise_search_radius,
            ))
        });
        let gray = apply_step(&mut steps, "sharpen", gray, |img| {
            non_empty(img, "sharpen")?;
            Ok(filters::sharpen(img, cfg.sharpen_center))
        });

        // Grid removal starts from the sharpened image's Otsu binary
        let binary = apply_step(&mut steps, "grid line removal", gray.clone(), |img| {
            remove_grid_lines(img, cfg.line_kernel_length)
        });
        let working = apply_step(&mut steps, "combine", gray.clone(), |img| {
            if img.dimensions() != binary.dimensions() {
                return Err(OcrError::Transform {
                    step: "combine",
                    reason: "binary and grayscale sizes differ".to_string(),
                });
            }
            Ok(filters::bitwise_or(img, &binary))
        });

        info!("Image preprocessing completed: {}", steps.join(", "));
        PreparedImage {
            gray,
            binary,
            working,
            steps,
        }
    }

    /// Rescale every working image to the configured canonical height
    ///
    /// Grayscale images use cubic interpolation, the binary mask nearest
    /// neighbour. A no-op when no target height is configured.
    pub fn resize(&self, prepared: PreparedImage) -> PreparedImage {
        let Some(target) = self.config.target_height else {
            return prepared;
        };
        let (_, h) = prepared.dimensions();
        if h == 0 || h == target {
            return prepared;
        }

        debug!("Resizing working images from height {} to {}", h, target);
        let mut steps = prepared.steps;
        steps.push("resize".to_string());
        PreparedImage {
            gray: filters::resize_to_height(&prepared.gray, target, FilterType::CatmullRom),
            binary: filters::resize_to_height(&prepared.binary, target, FilterType::Nearest),
            working: filters::resize_to_height(&prepared.working, target, FilterType::CatmullRom),
            steps,
        }
    }
}

/// Run one step, passing `input` through unchanged when it fails or panics
fn apply_step<F>(steps: &mut Vec<String>, name: &'static str, input: GrayImage, step: F) -> GrayImage
where
    F: FnOnce(&GrayImage) -> Result<GrayImage>,
{
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| step(&input))).unwrap_or_else(|_| {
        Err(OcrError::Transform {
            step: name,
            reason: "step panicked".to_string(),
        })
    });

    match outcome {
        Ok(output) => {
            debug!(step = name, "preprocessing step applied");
            steps.push(name.to_string());
            output
        }
        Err(e) => {
            warn!("{}; passing image through", e);
            input
        }
    }
}

fn non_empty(image: &GrayImage, step: &'static str) -> Result<()> {
    if image.width() == 0 || image.height() == 0 {
        return Err(OcrError::Transform {
            step,
            reason: "empty image".to_string(),
        });
    }
    Ok(())
}

/// Flatten uneven lighting
///
/// The background is estimated by a grayscale opening with a disk of
/// `radius`; the difference to the background is stretched to 0..=255.
pub fn normalize_illumination(gray: &GrayImage, radius: u32) -> Result<GrayImage> {
    non_empty(gray, "illumination normalization")?;
    let background = filters::grayscale_open_disk(gray, radius);
    let corrected = filters::subtract(gray, &background);
    Ok(filters::normalize_min_max(&corrected))
}

/// Rotate the image so that its dominant text block is axis aligned
///
/// Returns the input unchanged when there is no foreground or no measurable
/// skew.
pub fn deskew(gray: &GrayImage) -> Result<GrayImage> {
    non_empty(gray, "deskew")?;
    let foreground = filters::invert(&filters::otsu_binarize(gray));
    let points: Vec<Point<i32>> = foreground
        .enumerate_pixels()
        .filter(|(_, _, p)| p.0[0] > 0)
        .map(|(x, y, _)| Point::new(x as i32, y as i32))
        .collect();

    if points.len() < 3 {
        debug!("Deskew skipped: no foreground");
        return Ok(gray.clone());
    }

    let Some(angle) = skew_correction(&min_area_rect(&points)) else {
        return Ok(gray.clone());
    };
    if angle.abs() < MIN_SKEW_DEGREES {
        debug!("Deskew skipped: angle {:.3} degrees", angle);
        return Ok(gray.clone());
    }

    debug!("Deskewing by {:.2} degrees", angle);
    let fill = Luma([border_mean(gray)]);
    Ok(rotate_about_center(gray, angle.to_radians(), Interpolation::Bicubic, fill))
}

/// Clockwise rotation (degrees) that straightens a minimum-area rectangle
///
/// The rectangle angle is first brought into [-90, 0); angles below -45 map
/// to `-(90 + angle)`, all others to `-angle`.
pub fn skew_correction(corners: &[Point<i32>; 4]) -> Option<f32> {
    let edge = |a: Point<i32>, b: Point<i32>| ((b.x - a.x) as f32, (b.y - a.y) as f32);
    let first = edge(corners[0], corners[1]);
    let second = edge(corners[1], corners[2]);
    let norm = |e: (f32, f32)| e.0 * e.0 + e.1 * e.1;
    let (dx, dy) = if norm(first) >= norm(second) { first } else { second };
    if dx == 0.0 && dy == 0.0 {
        return None;
    }

    let angle = dy.atan2(dx).to_degrees().rem_euclid(90.0) - 90.0;
    let correction = if angle < -45.0 { -(90.0 + angle) } else { -angle };
    Some(correction)
}

/// Mean of the outermost pixels, used as the fill value when rotating
fn border_mean(gray: &GrayImage) -> u8 {
    let (w, h) = gray.dimensions();
    let mut sum = 0u64;
    let mut count = 0u64;
    for (x, y, p) in gray.enumerate_pixels() {
        if x == 0 || y == 0 || x + 1 == w || y + 1 == h {
            sum += p.0[0] as u64;
            count += 1;
        }
    }
    if count == 0 {
        0
    } else {
        (sum / count) as u8
    }
}

/// Otsu-binarize and drop long horizontal and vertical runs
pub fn remove_grid_lines(gray: &GrayImage, line_length: u32) -> Result<GrayImage> {
    non_empty(gray, "grid line removal")?;
    let binary = filters::otsu_binarize(gray);
    let horizontal = filters::line_mask(&binary, line_length, LineDirection::Horizontal);
    let vertical = filters::line_mask(&binary, line_length, LineDirection::Vertical);
    let lines = filters::bitwise_or(&horizontal, &vertical);
    Ok(filters::and_not(&binary, &lines))
}
