//! Heuristic text scores
//!
//! Recognizers report per-fragment confidences that are not comparable
//! across engines, so zones and whole-image candidates are ranked with
//! content heuristics instead.

use crate::config::{ScoringConfig, SelectorConfig};

/// Confidence of a recognized zone text, in [0, 1]
///
/// Length up to `expected_length` characters, plus bonuses for alphabetic
/// characters, digits and more than one word. Whitespace-only text scores 0.
pub fn zone_confidence(text: &str, config: &ScoringConfig) -> f32 {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return 0.0;
    }

    let length = trimmed.chars().count() as f32;
    let base = if config.expected_length > 0.0 {
        (length / config.expected_length).min(1.0)
    } else {
        1.0
    };

    let mut quality = 0.0;
    if trimmed.chars().any(char::is_alphabetic) {
        quality += config.alphabetic_bonus;
    }
    if trimmed.chars().any(char::is_numeric) {
        quality += config.digit_bonus;
    }
    if trimmed.split_whitespace().count() > 1 {
        quality += config.multi_word_bonus;
    }

    (base + quality).clamp(0.0, 1.0)
}

/// Characters that are neither alphanumeric nor whitespace
pub fn special_char_count(text: &str) -> usize {
    text.chars()
        .filter(|c| !(c.is_alphanumeric() || c.is_whitespace()))
        .count()
}

/// Score of a whole-image candidate; higher is better, never negative
pub fn candidate_score(text: &str, config: &SelectorConfig) -> f32 {
    if text.is_empty() {
        return 0.0;
    }
    let length = text.chars().count() as f32;
    let words = text.split_whitespace().count() as f32;
    let specials = special_char_count(text) as f32;
    score_components(length, words, specials, config)
}

fn score_components(length: f32, words: f32, specials: f32, config: &SelectorConfig) -> f32 {
    let length_score = if config.length_divisor > 0.0 {
        (length / config.length_divisor).min(config.length_cap)
    } else {
        config.length_cap
    };
    let word_score = (words * config.word_weight).min(config.word_cap);
    let special_penalty = (specials * config.special_weight).min(config.special_cap);
    (length_score + word_score - special_penalty).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scoring() -> ScoringConfig {
        ScoringConfig::default()
    }

    #[test]
    fn test_empty_and_whitespace_score_zero() {
        assert_eq!(zone_confidence("", &scoring()), 0.0);
        assert_eq!(zone_confidence(" \t\n ", &scoring()), 0.0);
    }

    #[test]
    fn test_zone_confidence_components() {
        // 4 chars: 0.08 length + 0.3 alphabetic
        let c = zone_confidence("EXIT", &scoring());
        assert!((c - 0.38).abs() < 1e-5, "{c}");

        // 9 chars: 0.18 + 0.3 + 0.2 digit + 0.2 words
        let c = zone_confidence("Gallery 3", &scoring());
        assert!((c - 0.88).abs() < 1e-5, "{c}");

        // Digits only: 0.08 + 0.2
        let c = zone_confidence("2024", &scoring());
        assert!((c - 0.28).abs() < 1e-5, "{c}");
    }

    #[test]
    fn test_zone_confidence_counts_characters_not_bytes() {
        // 6 Devanagari code points, 18 bytes
        let c = zone_confidence("नमस्ते", &scoring());
        assert!((c - (6.0 / 50.0 + 0.3)).abs() < 1e-5, "{c}");
    }

    #[test]
    fn test_zone_confidence_is_capped() {
        let long = "word 12 ".repeat(40);
        assert_eq!(zone_confidence(&long, &scoring()), 1.0);
    }

    #[test]
    fn test_zone_confidence_range() {
        for text in ["a", "1", "!!", "a b", "नमस्ते दुनिया 1", "x".repeat(500).as_str()] {
            let c = zone_confidence(text, &scoring());
            assert!((0.0..=1.0).contains(&c), "{text}: {c}");
        }
    }

    #[test]
    fn test_candidate_score_formula() {
        let cfg = SelectorConfig::default();
        // 12 chars -> 1.2, 2 words -> 1.0, 1 special -> -0.5
        let s = candidate_score("Hello, World", &cfg);
        assert!((s - (1.2 + 1.0 - 0.5)).abs() < 1e-5, "{s}");
        assert_eq!(candidate_score("", &cfg), 0.0);
        assert_eq!(candidate_score("!!!!", &cfg), 0.0);
    }

    #[test]
    fn test_candidate_score_monotonic_in_words_and_specials() {
        let cfg = SelectorConfig::default();
        for length in [0.0, 15.0, 120.0, 900.0] {
            for specials in [0.0, 3.0, 50.0] {
                let mut last = f32::MIN;
                for words in 0..100 {
                    let s = score_components(length, words as f32, specials, &cfg);
                    assert!(s >= last);
                    last = s;
                }
            }
            for words in [0.0, 4.0, 90.0] {
                let mut last = f32::MAX;
                for specials in 0..100 {
                    let s = score_components(length, words, specials as f32, &cfg);
                    assert!(s <= last);
                    last = s;
                }
            }
        }
    }

    #[test]
    fn test_special_char_count() {
        assert_eq!(special_char_count("a-b, c!"), 3);
        assert_eq!(special_char_count("Room 12"), 0);
    }
}
