//! Text zone detection
//!
//! Finds rectangles likely to contain text. Strategies are tried in order
//! and the first one that yields a zone wins:
//! 1. inverted adaptive threshold, close + open, external contours
//! 2. Canny edges, external contours
//! 3. a single zone covering the central half of the image

use image::GrayImage;
use imageproc::contours::{find_contours, BorderType};
use imageproc::distance_transform::Norm;
use imageproc::edges::canny;
use imageproc::morphology::{close, open};
use tracing::{debug, info, warn};

use super::filters;
use super::types::Zone;
use crate::config::ZoneConfig;

/// Which strategy produced the zones
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectionStrategy {
    AdaptiveThreshold,
    Edges,
    Default,
}

/// Contour-based zone detector
pub struct ZoneDetector {
    config: ZoneConfig,
}

impl ZoneDetector {
    pub fn new(config: ZoneConfig) -> Self {
        Self { config }
    }

    /// Detect zones, falling back until at least one zone exists
    ///
    /// Only an image without pixels yields an empty list.
    pub fn detect(&self, image: &GrayImage) -> (Vec<Zone>, DetectionStrategy) {
        let zones = self.adaptive_zones(image);
        if !zones.is_empty() {
            info!("Detected {} text zones (adaptive threshold)", zones.len());
            return (zones, DetectionStrategy::AdaptiveThreshold);
        }

        warn!("No zones detected with primary method, trying edge detection");
        let zones = self.edge_zones(image);
        if !zones.is_empty() {
            info!("Detected {} text zones (edges)", zones.len());
            return (zones, DetectionStrategy::Edges);
        }

        warn!("No zones detected with edge detection, using default zone");
        let (w, h) = image.dimensions();
        (default_zone(w, h).into_iter().collect(), DetectionStrategy::Default)
    }

    /// Primary strategy
    pub fn adaptive_zones(&self, image: &GrayImage) -> Vec<Zone> {
        let cfg = &self.config;
        let binary = filters::adaptive_threshold_inv(image, cfg.adaptive_block_size, cfg.adaptive_c);
        let morph = close(&binary, Norm::LInf, cfg.morph_radius);
        let morph = open(&morph, Norm::LInf, cfg.morph_radius);
        self.zones_from_mask(&morph)
    }

    /// Edge-based fallback
    pub fn edge_zones(&self, image: &GrayImage) -> Vec<Zone> {
        let edges = canny(image, self.config.canny_low, self.config.canny_high);
        self.zones_from_mask(&edges)
    }

    /// Bounding boxes of the external contours that pass the size filter,
    /// in reading order
    fn zones_from_mask(&self, mask: &GrayImage) -> Vec<Zone> {
        let (img_w, img_h) = mask.dimensions();
        let mut zones: Vec<Zone> = find_contours::<i32>(mask)
            .into_iter()
            .filter(|c| c.parent.is_none() && c.border_type == BorderType::Outer)
            .filter_map(|c| {
                let min_x = c.points.iter().map(|p| p.x).min()?;
                let max_x = c.points.iter().map(|p| p.x).max()?;
                let min_y = c.points.iter().map(|p| p.y).min()?;
                let max_y = c.points.iter().map(|p| p.y).max()?;
                Zone::clipped(
                    min_x as i64,
                    min_y as i64,
                    (max_x - min_x + 1) as i64,
                    (max_y - min_y + 1) as i64,
                    img_w,
                    img_h,
                )
            })
            .filter(|z| self.accepts(z))
            .collect();

        zones.sort_by_key(|z| (z.y, z.x, z.h, z.w));
        zones.dedup();
        debug!("{} zones passed the size filter", zones.len());
        zones
    }

    fn accepts(&self, zone: &Zone) -> bool {
        let cfg = &self.config;
        let area = zone.area();
        area >= cfg.min_area as u64
            && area <= cfg.max_area as u64
            && zone.w >= cfg.min_width
            && zone.h >= cfg.min_height
    }

    /// Add external boxes that do not overlap any existing zone
    pub fn merge_external(&self, zones: Vec<Zone>, external: &[Zone], dimensions: (u32, u32)) -> Vec<Zone> {
        merge_external(zones, external, self.config.merge_iou, dimensions)
    }
}

/// Zone covering the central half of the image in both dimensions
pub fn default_zone(w: u32, h: u32) -> Option<Zone> {
    Zone::clipped(
        (w / 4) as i64,
        (h / 4) as i64,
        (w / 2).max(1) as i64,
        (h / 2).max(1) as i64,
        w,
        h,
    )
}

/// Append every external box whose IoU with all zones collected so far is
/// below `max_iou`
///
/// External boxes are clipped to the `(width, height)` image first; boxes
/// that fall entirely outside it are dropped.
pub fn merge_external(zones: Vec<Zone>, external: &[Zone], max_iou: f32, dimensions: (u32, u32)) -> Vec<Zone> {
    let (img_w, img_h) = dimensions;
    let mut merged = zones;
    let before = merged.len();
    for raw in external {
        let Some(candidate) = Zone::clipped(
            raw.x as i64,
            raw.y as i64,
            raw.w as i64,
            raw.h as i64,
            img_w,
            img_h,
        ) else {
            debug!("Dropping external box outside the image: {:?}", raw);
            continue;
        };
        if merged.iter().all(|z| candidate.iou(z) < max_iou) {
            merged.push(candidate);
        }
    }
    debug!("Merged {} external boxes", merged.len() - before);
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;
    use imageproc::drawing::{draw_filled_circle_mut, draw_filled_rect_mut};
    use imageproc::rect::Rect;

    /// A "line of text": dark vertical strokes separated by small gaps
    fn draw_text_line(img: &mut GrayImage, x: i32, y: i32, strokes: i32) {
        for i in 0..strokes {
            draw_filled_rect_mut(img, Rect::at(x + i * 6, y).of_size(3, 20), Luma([20]));
        }
    }

    fn detector() -> ZoneDetector {
        ZoneDetector::new(ZoneConfig::default())
    }

    #[test]
    fn test_blank_image_gets_default_zone() {
        let img = GrayImage::from_pixel(200, 100, Luma([255]));
        let (zones, strategy) = detector().detect(&img);
        assert_eq!(strategy, DetectionStrategy::Default);
        assert_eq!(zones, vec![Zone { x: 50, y: 25, w: 100, h: 50 }]);
    }

    #[test]
    fn test_tiny_image_still_gets_a_zone() {
        let img = GrayImage::from_pixel(3, 2, Luma([0]));
        let (zones, _) = detector().detect(&img);
        assert_eq!(zones, vec![Zone { x: 0, y: 0, w: 1, h: 1 }]);
    }

    #[test]
    fn test_empty_image_has_no_zone() {
        assert!(default_zone(0, 0).is_none());
    }

    #[test]
    fn test_adaptive_finds_text_lines_in_reading_order() {
        let mut img = GrayImage::from_pixel(240, 160, Luma([230]));
        draw_text_line(&mut img, 30, 100, 12);
        draw_text_line(&mut img, 30, 30, 12);

        let (zones, strategy) = detector().detect(&img);
        assert_eq!(strategy, DetectionStrategy::AdaptiveThreshold);
        assert_eq!(zones.len(), 2);
        assert!(zones[0].y < zones[1].y);
        for z in &zones {
            assert!(z.w >= 60 && z.w <= 80, "width {}", z.w);
            assert!(z.h >= 15 && z.h <= 26, "height {}", z.h);
        }
    }

    #[test]
    fn test_detection_is_deterministic() {
        let mut img = GrayImage::from_pixel(240, 160, Luma([230]));
        draw_text_line(&mut img, 10, 10, 8);
        draw_text_line(&mut img, 120, 10, 8);
        draw_text_line(&mut img, 40, 90, 10);

        let first = detector().detect(&img);
        let second = detector().detect(&img);
        assert_eq!(first, second);
    }

    #[test]
    fn test_size_filter_rejects_small_marks() {
        let mut img = GrayImage::from_pixel(100, 100, Luma([230]));
        draw_filled_rect_mut(&mut img, Rect::at(40, 40).of_size(4, 4), Luma([10]));
        assert!(detector().adaptive_zones(&img).is_empty());
    }

    #[test]
    fn test_edge_zones_find_shape_outline() {
        let mut img = GrayImage::new(160, 160);
        draw_filled_circle_mut(&mut img, (80, 80), 50, Luma([200]));
        let zones = detector().edge_zones(&img);
        assert!(!zones.is_empty());
        assert!(zones.iter().all(|z| z.w >= 30 && z.h >= 15));
    }

    #[test]
    fn test_merge_external_skips_overlapping_boxes() {
        let zones = vec![Zone { x: 0, y: 0, w: 100, h: 20 }];
        let external = [
            Zone { x: 5, y: 0, w: 100, h: 20 },   // IoU ~0.9, dropped
            Zone { x: 0, y: 50, w: 100, h: 20 },  // disjoint, kept
            Zone { x: 2, y: 52, w: 100, h: 20 },  // overlaps the one just added, dropped
            Zone { x: 50, y: 0, w: 100, h: 20 },  // IoU 1/3, kept
        ];
        let merged = merge_external(zones, &external, 0.5, (400, 200));
        assert_eq!(
            merged,
            vec![
                Zone { x: 0, y: 0, w: 100, h: 20 },
                Zone { x: 0, y: 50, w: 100, h: 20 },
                Zone { x: 50, y: 0, w: 100, h: 20 },
            ]
        );
        for (i, a) in merged.iter().enumerate() {
            for b in merged.iter().skip(i + 1) {
                assert!(a.iou(b) < 0.5);
            }
        }
    }

    #[test]
    fn test_merge_with_no_external_boxes() {
        let zones = vec![Zone { x: 1, y: 1, w: 40, h: 20 }];
        assert_eq!(merge_external(zones.clone(), &[], 0.5, (100, 100)), zones);
    }

    #[test]
    fn test_merge_external_clips_boxes_to_the_image() {
        let zones = vec![Zone { x: 0, y: 0, w: 20, h: 10 }];
        let external = [
            Zone { x: 60, y: 30, w: 500, h: 500 },
            Zone { x: 150, y: 10, w: 30, h: 30 },
            Zone { x: u32::MAX - 5, y: 0, w: 10, h: 10 },
        ];
        let merged = merge_external(zones, &external, 0.5, (100, 50));
        assert_eq!(
            merged,
            vec![Zone { x: 0, y: 0, w: 20, h: 10 }, Zone { x: 60, y: 30, w: 40, h: 20 }]
        );
        assert!(merged.iter().all(|z| z.x + z.w <= 100 && z.y + z.h <= 50));
    }
}
