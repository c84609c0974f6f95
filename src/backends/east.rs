//! EAST scene text detector
//!
//! The network predicts, on a stride-4 grid, a text score and a rotated box
//! geometry per cell. Boxes above the score threshold are decoded,
//! suppressed with greedy NMS and scaled back to the source image.

use image::RgbImage;
use ndarray::{ArrayView4, Ix4};
use ort::value::Value;
use tracing::debug;

use super::models::{LazySession, ModelKind, ModelManager};
use super::BoxDetector;
use crate::config::AiConfig;
use crate::error::{OcrError, Result};
use crate::vision::tensor::{multiple_of_32, rgb_to_east_tensor};
use crate::vision::Zone;

/// Per-channel means subtracted from RGB input
const EAST_MEAN: [f32; 3] = [123.68, 116.78, 103.94];
/// Output grid stride in input pixels
const STRIDE: f32 = 4.0;
/// Smallest accepted network input side
const MIN_INPUT_SIDE: u32 = 320;

/// Axis-aligned candidate in network input coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawBox {
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
    pub score: f32,
}

impl RawBox {
    fn area(&self) -> f32 {
        (self.w.max(0) * self.h.max(0)) as f32
    }

    fn iou(&self, other: &RawBox) -> f32 {
        let x1 = self.x.max(other.x);
        let y1 = self.y.max(other.y);
        let x2 = (self.x + self.w).min(other.x + other.w);
        let y2 = (self.y + self.h).min(other.y + other.h);
        let inter = ((x2 - x1).max(0) * (y2 - y1).max(0)) as f32;
        let union = self.area() + other.area() - inter;
        if union <= 0.0 {
            0.0
        } else {
            inter / union
        }
    }
}

/// Decode score and geometry maps (`[1, 1, H, W]` and `[1, 5, H, W]`)
pub fn decode(scores: ArrayView4<f32>, geometry: ArrayView4<f32>, score_threshold: f32) -> Vec<RawBox> {
    let (_, _, rows, cols) = scores.dim();
    let mut boxes = Vec::new();

    for y in 0..rows {
        for x in 0..cols {
            let score = scores[[0, 0, y, x]];
            if score < score_threshold {
                continue;
            }
            let (offset_x, offset_y) = (x as f32 * STRIDE, y as f32 * STRIDE);
            let angle = geometry[[0, 4, y, x]];
            let (sin, cos) = angle.sin_cos();
            let (top, right, bottom, left) = (
                geometry[[0, 0, y, x]],
                geometry[[0, 1, y, x]],
                geometry[[0, 2, y, x]],
                geometry[[0, 3, y, x]],
            );
            let h = top + bottom;
            let w = right + left;
            let end_x = (offset_x + cos * right + sin * bottom) as i32;
            let end_y = (offset_y - sin * right + cos * bottom) as i32;
            boxes.push(RawBox {
                x: (end_x as f32 - w) as i32,
                y: (end_y as f32 - h) as i32,
                w: w as i32,
                h: h as i32,
                score,
            });
        }
    }
    boxes
}

/// Greedy non-maximum suppression, highest score first
pub fn non_max_suppression(mut boxes: Vec<RawBox>, iou_threshold: f32) -> Vec<RawBox> {
    boxes.sort_by(|a, b| b.score.total_cmp(&a.score));
    let mut kept: Vec<RawBox> = Vec::new();
    for candidate in boxes {
        if kept.iter().all(|k| k.iou(&candidate) <= iou_threshold) {
            kept.push(candidate);
        }
    }
    kept
}

/// Map boxes from a `target_w` x `target_h` input back to the source image
///
/// Degenerate boxes (one pixel or less on a side after scaling) are dropped;
/// the rest are clipped to the image.
pub fn rescale(boxes: &[RawBox], image_w: u32, image_h: u32, target_w: u32, target_h: u32) -> Vec<Zone> {
    let scale_w = image_w as f32 / target_w as f32;
    let scale_h = image_h as f32 / target_h as f32;

    boxes
        .iter()
        .filter_map(|b| {
            let x = ((b.x as f32 * scale_w) as i64).max(0);
            let y = ((b.y as f32 * scale_h) as i64).max(0);
            let w = (b.w as f32 * scale_w) as i64;
            let h = (b.h as f32 * scale_h) as i64;
            if w <= 1 || h <= 1 {
                return None;
            }
            Zone::clipped(x, y, w, h, image_w, image_h)
        })
        .collect()
}

pub struct EastDetector {
    session: LazySession,
    input_width: u32,
    input_height: u32,
    score_threshold: f32,
    nms_threshold: f32,
}

impl EastDetector {
    /// Resolve the configured model; the session loads on first use
    pub fn locate(ai: &AiConfig) -> Result<Self> {
        let manager = ModelManager::new(ai).map_err(|e| OcrError::Model(format!("{e:#}")))?;
        let path = manager
            .resolve(ai.east_model_path.as_deref(), ModelKind::East)
            .map_err(|e| OcrError::Model(format!("{e:#}")))?;
        Ok(Self {
            session: LazySession::new(path),
            input_width: multiple_of_32(ai.east_input_width, MIN_INPUT_SIDE),
            input_height: multiple_of_32(ai.east_input_height, MIN_INPUT_SIDE),
            score_threshold: ai.east_score,
            nms_threshold: ai.east_nms,
        })
    }

    fn infer(&self, image: &RgbImage) -> Result<Vec<RawBox>> {
        let input = Value::from_array(rgb_to_east_tensor(
            image,
            self.input_width,
            self.input_height,
            &EAST_MEAN,
        ))?;

        let threshold = self.score_threshold;
        self.session.with(|session| {
            let input_name = session
                .input_names()
                .first()
                .cloned()
                .ok_or_else(|| OcrError::Detection("model has no inputs".into()))?;
            let score_idx = session.output_index("Sigmoid").unwrap_or(0);
            let geometry_idx = session.output_index("concat").unwrap_or(1);

            let outputs = session.session_mut().run(ort::inputs![input_name => input])?;
            let scores = outputs[score_idx].try_extract_array::<f32>()?;
            let geometry = outputs[geometry_idx].try_extract_array::<f32>()?;

            let scores = to_nchw(scores.into_dimensionality::<Ix4>(), 1)?;
            let geometry = to_nchw(geometry.into_dimensionality::<Ix4>(), 5)?;
            if scores.dim().2 != geometry.dim().2 || scores.dim().3 != geometry.dim().3 {
                return Err(OcrError::Detection(format!(
                    "score map {:?} does not match geometry {:?}",
                    scores.shape(),
                    geometry.shape()
                )));
            }

            Ok(decode(scores, geometry, threshold))
        })
    }
}

/// Accept NCHW maps as-is and permute NHWC ones
fn to_nchw(
    map: std::result::Result<ArrayView4<'_, f32>, ndarray::ShapeError>,
    channels: usize,
) -> Result<ArrayView4<'_, f32>> {
    let map = map.map_err(|e| OcrError::Detection(e.to_string()))?;
    let dim = map.dim();
    if dim.1 == channels {
        Ok(map)
    } else if dim.3 == channels {
        Ok(map.permuted_axes([0, 3, 1, 2]))
    } else {
        Err(OcrError::Detection(format!(
            "expected {} channels, got shape {:?}",
            channels,
            map.shape()
        )))
    }
}

impl BoxDetector for EastDetector {
    fn name(&self) -> &str {
        "east"
    }

    fn detect_boxes(&self, image: &RgbImage) -> Result<Vec<Zone>> {
        let (w, h) = image.dimensions();
        if w == 0 || h == 0 {
            return Ok(Vec::new());
        }
        let raw = self.infer(image)?;
        let kept = non_max_suppression(raw, self.nms_threshold);
        let zones = rescale(&kept, w, h, self.input_width, self.input_height);
        debug!("EAST proposed {} boxes", zones.len());
        Ok(zones)
    }
}
