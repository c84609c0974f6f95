//! Result aggregation and report rendering

use std::fmt::Write;

use tracing::debug;

use super::script::split_by_script;
use super::types::{Language, OcrResult, TextZone};
use crate::backends::{contain, Corrector};

/// Collect the text of every zone in `target`, plus the matching script
/// component of mixed zones, one zone per line
pub fn language_text(zones: &[TextZone], target: Language) -> String {
    let mut blocks: Vec<String> = Vec::new();
    for zone in zones.iter().filter(|z| !z.text.trim().is_empty()) {
        if zone.language == target {
            blocks.push(zone.text.clone());
        } else if zone.language == Language::Mixed {
            let parts = split_by_script(&zone.text);
            let part = match target {
                Language::Hindi => parts.hindi,
                Language::English => parts.english,
                _ => String::new(),
            };
            if !part.is_empty() {
                blocks.push(part);
            }
        }
    }
    blocks.join("\n")
}

/// `[LANGUAGE] block` sections for the non-empty blocks, blank-line separated
pub fn combine_sections(hindi: &str, english: &str) -> String {
    [(Language::Hindi, hindi), (Language::English, english)]
        .iter()
        .filter(|(_, block)| !block.trim().is_empty())
        .map(|(lang, block)| format!("[{}] {}", lang.label(), block))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Arithmetic mean of zone confidences, 0 without zones
pub fn mean_zone_confidence(zones: &[TextZone]) -> f32 {
    if zones.is_empty() {
        return 0.0;
    }
    zones.iter().map(|z| z.confidence).sum::<f32>() / zones.len() as f32
}

/// Builds the final [`OcrResult`]
///
/// The corrector only ever rewrites the language blocks and the combined
/// text; zones are passed through untouched. A failing corrector leaves
/// the text as it was.
pub struct ResultAggregator<'a> {
    corrector: &'a dyn Corrector,
}

impl<'a> ResultAggregator<'a> {
    pub fn new(corrector: &'a dyn Corrector) -> Self {
        Self { corrector }
    }

    pub fn aggregate(&self, zones: Vec<TextZone>, preprocessing_steps: Vec<String>, processing_time: f64) -> OcrResult {
        let hindi_text = self.refine(language_text(&zones, Language::Hindi), Language::Hindi);
        let english_text = self.refine(language_text(&zones, Language::English), Language::English);
        let text = self.refine(combine_sections(&hindi_text, &english_text), Language::English);
        let confidence = mean_zone_confidence(&zones);

        debug!(
            "Aggregated {} zones: {} hindi chars, {} english chars",
            zones.len(),
            hindi_text.chars().count(),
            english_text.chars().count()
        );

        OcrResult {
            text,
            hindi_text,
            english_text,
            confidence,
            processing_time,
            zones,
            preprocessing_steps,
        }
    }

    fn refine(&self, text: String, language: Language) -> String {
        if text.trim().is_empty() {
            return text;
        }
        contain(self.corrector.name(), || self.corrector.correct(&text, language)).unwrap_or(text)
    }
}

/// Human-readable report of a result
pub fn generate_report(result: &OcrResult) -> String {
    let mut out = String::new();
    // Writing into a String cannot fail
    let _ = write_report(&mut out, result);
    out
}

fn write_report(out: &mut String, result: &OcrResult) -> std::fmt::Result {
    writeln!(out, "OCR REPORT")?;
    writeln!(out, "{}", "=".repeat(50))?;
    writeln!(out, "Processing Time: {:.2}s", result.processing_time)?;
    writeln!(out, "Overall Confidence: {:.2}%", result.confidence * 100.0)?;
    writeln!(out, "Text Zones Detected: {}", result.zones.len())?;
    writeln!(out)?;

    if !result.hindi_text.trim().is_empty() {
        writeln!(out, "हिंदी पाठ")?;
        writeln!(out, "{}", "=".repeat(40))?;
        writeln!(out, "{}", result.hindi_text)?;
        writeln!(out)?;
    }

    if !result.english_text.trim().is_empty() {
        writeln!(out, "ENGLISH TEXT")?;
        writeln!(out, "{}", "=".repeat(40))?;
        writeln!(out, "{}", result.english_text)?;
        writeln!(out)?;
    }

    if !result.zones.is_empty() {
        writeln!(out, "ZONE DETAILS:")?;
        writeln!(out, "{}", "-".repeat(20))?;
        for (i, zone) in result.zones.iter().enumerate() {
            let preview: String = zone.text.chars().take(100).collect();
            let ellipsis = if zone.text.chars().count() > 100 { "..." } else { "" };
            writeln!(
                out,
                "Zone {}: {} at ({}, {})",
                i + 1,
                zone.language.label(),
                zone.zone.x,
                zone.zone.y
            )?;
            writeln!(
                out,
                "  Size: {} x {}, Confidence: {:.2}%",
                zone.zone.w,
                zone.zone.h,
                zone.confidence * 100.0
            )?;
            writeln!(out, "  Text: {}{}", preview, ellipsis)?;
            writeln!(out)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::Passthrough;
    use crate::testing::{Broken, Shouting};
    use crate::vision::Zone;

    fn zone(language: Language, text: &str, confidence: f32) -> TextZone {
        TextZone {
            zone: Zone { x: 1, y: 2, w: 30, h: 15 },
            language,
            confidence,
            text: text.to_string(),
        }
    }

    fn sample_zones() -> Vec<TextZone> {
        vec![
            zone(Language::Hindi, "राष्ट्रीय संग्रहालय", 0.9),
            zone(Language::English, "National Museum", 0.8),
            zone(Language::Mixed, "Hello नमस्ते 2024", 0.6),
            zone(Language::Unknown, "???", 0.1),
            zone(Language::English, "   ", 0.0),
        ]
    }

    #[test]
    fn test_language_text_includes_mixed_parts() {
        let zones = sample_zones();
        assert_eq!(language_text(&zones, Language::Hindi), "राष्ट्रीय संग्रहालय\nनमस्ते");
        assert_eq!(language_text(&zones, Language::English), "National Museum\nHello 2024");
    }

    #[test]
    fn test_combine_sections() {
        assert_eq!(combine_sections("नमस्ते", "Hello"), "[HINDI] नमस्ते\n\n[ENGLISH] Hello");
        assert_eq!(combine_sections("", "Hello"), "[ENGLISH] Hello");
        assert_eq!(combine_sections(" ", ""), "");
    }

    #[test]
    fn test_aggregate_with_passthrough() {
        let result = ResultAggregator::new(&Passthrough).aggregate(sample_zones(), vec!["deskew".into()], 1.5);
        assert_eq!(
            result.text,
            "[HINDI] राष्ट्रीय संग्रहालय\nनमस्ते\n\n[ENGLISH] National Museum\nHello 2024"
        );
        assert!((result.confidence - 2.4 / 5.0).abs() < 1e-6);
        assert_eq!(result.zones.len(), 5);
        assert_eq!(result.preprocessing_steps, vec!["deskew"]);
        assert_eq!(result.processing_time, 1.5);
    }

    #[test]
    fn test_aggregate_without_zones() {
        let result = ResultAggregator::new(&Passthrough).aggregate(vec![], vec![], 0.0);
        assert_eq!(result.confidence, 0.0);
        assert_eq!(result.text, "");
        assert_eq!(result.hindi_text, "");
    }

    #[test]
    fn test_failing_corrector_fails_open() {
        let plain = ResultAggregator::new(&Passthrough).aggregate(sample_zones(), vec![], 0.0);
        let broken = ResultAggregator::new(&Broken).aggregate(sample_zones(), vec![], 0.0);
        assert_eq!(plain.text, broken.text);
        assert_eq!(plain.english_text, broken.english_text);
    }

    #[test]
    fn test_corrector_never_touches_zones() {
        let result = ResultAggregator::new(&Shouting).aggregate(sample_zones(), vec![], 0.0);
        assert_eq!(result.english_text, "english:NATIONAL MUSEUM\nHELLO 2024");
        assert!(result.hindi_text.starts_with("hindi:"));
        assert_eq!(result.zones, sample_zones());
    }

    #[test]
    fn test_report_sections() {
        let mut zones = sample_zones();
        zones[1].text = "x".repeat(150);
        let result = ResultAggregator::new(&Passthrough).aggregate(zones, vec![], 2.0);
        let report = generate_report(&result);

        assert!(report.contains("Processing Time: 2.00s"));
        assert!(report.contains("Text Zones Detected: 5"));
        assert!(report.contains("हिंदी पाठ"));
        assert!(report.contains("ENGLISH TEXT"));
        assert!(report.contains("Zone 3: MIXED at (1, 2)"));
        assert!(report.contains(&format!("  Text: {}...", "x".repeat(100))));
        assert!(!report.contains(&"x".repeat(101)));
    }

    #[test]
    fn test_report_omits_empty_language_sections() {
        let result = ResultAggregator::new(&Passthrough).aggregate(
            vec![zone(Language::English, "EXIT", 0.38)],
            vec![],
            0.1,
        );
        let report = generate_report(&result);
        assert!(!report.contains("हिंदी पाठ"));
        assert!(report.contains("Overall Confidence: 38.00%"));
    }
}
