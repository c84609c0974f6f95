//! Core data model shared by every pipeline stage

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Script class assigned to a zone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    English,
    Hindi,
    /// Neither script probe was confident; text holds both scripts
    Mixed,
    /// Both probes failed
    Unknown,
}

impl Language {
    /// Lowercase name, as used in configuration and JSON
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::English => "english",
            Language::Hindi => "hindi",
            Language::Mixed => "mixed",
            Language::Unknown => "unknown",
        }
    }

    /// Section label used in combined text and reports
    pub fn label(&self) -> &'static str {
        match self {
            Language::English => "ENGLISH",
            Language::Hindi => "HINDI",
            Language::Mixed => "MIXED",
            Language::Unknown => "UNKNOWN",
        }
    }

}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "english" | "eng" | "en" => Ok(Language::English),
            "hindi" | "hin" | "hi" => Ok(Language::Hindi),
            "mixed" => Ok(Language::Mixed),
            "unknown" => Ok(Language::Unknown),
            other => Err(format!("unknown language '{}'", other)),
        }
    }
}

/// Axis-aligned rectangle in image coordinates, origin top-left
///
/// Constructed through [`Zone::clipped`] so that it always lies inside the
/// image and has a positive width and height.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Zone {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

impl Zone {
    /// Clip an arbitrary (possibly negative or oversized) box to the image.
    /// Returns `None` when nothing of the box remains.
    pub fn clipped(x: i64, y: i64, w: i64, h: i64, img_w: u32, img_h: u32) -> Option<Self> {
        let x0 = x.max(0);
        let y0 = y.max(0);
        let x1 = (x + w).min(img_w as i64);
        let y1 = (y + h).min(img_h as i64);
        if x1 <= x0 || y1 <= y0 {
            return None;
        }
        Some(Self {
            x: x0 as u32,
            y: y0 as u32,
            w: (x1 - x0) as u32,
            h: (y1 - y0) as u32,
        })
    }

    /// Zone covering a whole image
    pub fn full(img_w: u32, img_h: u32) -> Option<Self> {
        Self::clipped(0, 0, img_w as i64, img_h as i64, img_w, img_h)
    }

    pub fn area(&self) -> u64 {
        self.w as u64 * self.h as u64
    }

    /// Intersection over union, always within [0, 1]
    pub fn iou(&self, other: &Zone) -> f32 {
        let x1 = self.x.max(other.x) as i64;
        let y1 = self.y.max(other.y) as i64;
        let x2 = (self.x as i64 + self.w as i64).min(other.x as i64 + other.w as i64);
        let y2 = (self.y as i64 + self.h as i64).min(other.y as i64 + other.h as i64);
        let inter = (x2 - x1).max(0) as f64 * (y2 - y1).max(0) as f64;
        let union = self.area() as f64 + other.area() as f64 - inter;
        if union <= 0.0 {
            return 0.0;
        }
        (inter / union).clamp(0.0, 1.0) as f32
    }
}

/// One recognized fragment returned by a recognition capability
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    /// Fragment bounds relative to the recognized region (x, y, width, height)
    pub bounds: (u32, u32, u32, u32),
    /// Recognized text
    pub text: String,
    /// Confidence in [0, 1]
    pub confidence: f32,
}

impl Detection {
    pub fn new(bounds: (u32, u32, u32, u32), text: impl Into<String>, confidence: f32) -> Self {
        Self {
            bounds,
            text: text.into(),
            confidence: confidence.clamp(0.0, 1.0),
        }
    }
}

/// A zone after recognition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextZone {
    #[serde(flatten)]
    pub zone: Zone,
    pub language: Language,
    pub confidence: f32,
    pub text: String,
}

/// Final structured result of one image
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrResult {
    /// Combined `[LANGUAGE] block` sections
    pub text: String,
    pub hindi_text: String,
    pub english_text: String,
    /// Mean zone confidence
    pub confidence: f32,
    /// Wall-clock seconds
    pub processing_time: f64,
    pub zones: Vec<TextZone>,
    pub preprocessing_steps: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clipped_inside_image() {
        let zone = Zone::clipped(-10, 5, 50, 500, 100, 100).unwrap();
        assert_eq!(zone, Zone { x: 0, y: 5, w: 40, h: 95 });
    }

    #[test]
    fn test_clipped_outside_image() {
        assert!(Zone::clipped(120, 0, 10, 10, 100, 100).is_none());
        assert!(Zone::clipped(0, 0, 0, 10, 100, 100).is_none());
    }

    #[test]
    fn test_iou_identical_and_disjoint() {
        let a = Zone { x: 0, y: 0, w: 10, h: 10 };
        let b = Zone { x: 20, y: 20, w: 10, h: 10 };
        assert!((a.iou(&a) - 1.0).abs() < 1e-6);
        assert_eq!(a.iou(&b), 0.0);
    }

    #[test]
    fn test_iou_partial_overlap() {
        let a = Zone { x: 0, y: 0, w: 10, h: 10 };
        let b = Zone { x: 5, y: 0, w: 10, h: 10 };
        // 50 / (100 + 100 - 50)
        assert!((a.iou(&b) - 1.0 / 3.0).abs() < 1e-6);
        assert!((a.iou(&b) - b.iou(&a)).abs() < 1e-6);
    }

    #[test]
    fn test_iou_bounds_over_grid() {
        let boxes: Vec<Zone> = (0..6)
            .flat_map(|i| (0..6).map(move |j| Zone { x: i * 7, y: j * 5, w: 3 + i * 4, h: 2 + j * 6 }))
            .collect();
        for a in &boxes {
            for b in &boxes {
                let v = a.iou(b);
                assert!((0.0..=1.0).contains(&v), "iou out of range: {v}");
            }
        }
    }

    #[test]
    fn test_iou_near_coordinate_limit() {
        let a = Zone { x: u32::MAX - 10, y: u32::MAX - 10, w: 20, h: 10 };
        let b = Zone { x: u32::MAX - 5, y: u32::MAX - 10, w: 20, h: 10 };
        // Overlap 15x10 over a union of 250
        assert!((a.iou(&b) - 0.6).abs() < 1e-6);
        assert_eq!(a.iou(&Zone { x: 0, y: 0, w: u32::MAX, h: 1 }), 0.0);
    }

    #[test]
    fn test_language_parse_and_display() {
        assert_eq!("Hindi".parse::<Language>().unwrap(), Language::Hindi);
        assert_eq!("eng".parse::<Language>().unwrap(), Language::English);
        assert!("french".parse::<Language>().is_err());
        assert_eq!(Language::Mixed.to_string(), "mixed");
        assert_eq!(Language::Hindi.label(), "HINDI");
    }

    #[test]
    fn test_text_zone_serializes_flat() {
        let tz = TextZone {
            zone: Zone { x: 1, y: 2, w: 3, h: 4 },
            language: Language::English,
            confidence: 0.5,
            text: "EXIT".to_string(),
        };
        let json = serde_json::to_value(&tz).unwrap();
        assert_eq!(json["x"], 1);
        assert_eq!(json["language"], "english");
    }
}
