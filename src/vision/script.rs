//! Mixed-script text partitioning

use std::panic::{self, AssertUnwindSafe};

use tracing::warn;

/// Devanagari block
const DEVANAGARI: std::ops::RangeInclusive<u32> = 0x0900..=0x097F;
/// Basic Latin and Latin-1 Supplement
const LATIN: std::ops::RangeInclusive<u32> = 0x0000..=0x00FF;

/// Hindi and English components of one string
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScriptParts {
    pub hindi: String,
    pub english: String,
}

/// Split `text` into its Devanagari and Latin components
///
/// Characters outside both blocks, and whitespace, become word breaks in
/// both streams. Both outputs are trimmed with internal whitespace
/// collapsed. If splitting fails unexpectedly the whole input is returned
/// as the English part.
pub fn split_by_script(text: &str) -> ScriptParts {
    panic::catch_unwind(AssertUnwindSafe(|| route(text))).unwrap_or_else(|_| {
        warn!("Script split failed; keeping text as English");
        ScriptParts {
            hindi: String::new(),
            english: text.to_string(),
        }
    })
}

fn route(text: &str) -> ScriptParts {
    let mut hindi = String::with_capacity(text.len());
    let mut english = String::with_capacity(text.len());

    for ch in text.chars() {
        let cp = ch as u32;
        if ch.is_whitespace() {
            hindi.push(' ');
            english.push(' ');
        } else if DEVANAGARI.contains(&cp) {
            hindi.push(ch);
        } else if LATIN.contains(&cp) {
            english.push(ch);
        } else {
            hindi.push(' ');
            english.push(' ');
        }
    }

    ScriptParts {
        hindi: collapse_whitespace(&hindi),
        english: collapse_whitespace(&english),
    }
}

/// Join the whitespace-separated words of `text` with single spaces
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mixed_line() {
        let parts = split_by_script("Hello नमस्ते 2024");
        assert_eq!(parts.english, "Hello 2024");
        assert_eq!(parts.hindi, "नमस्ते");
    }

    #[test]
    fn test_pure_scripts() {
        let parts = split_by_script("संग्रहालय प्रवेश");
        assert_eq!(parts.hindi, "संग्रहालय प्रवेश");
        assert_eq!(parts.english, "");

        let parts = split_by_script("  Museum   Entry ");
        assert_eq!(parts.hindi, "");
        assert_eq!(parts.english, "Museum Entry");
    }

    #[test]
    fn test_other_scripts_break_words() {
        // Euro sign and CJK are outside both blocks
        let parts = split_by_script("Price€10 入口 टिकट");
        assert_eq!(parts.english, "Price 10");
        assert_eq!(parts.hindi, "टिकट");
    }

    #[test]
    fn test_devanagari_punctuation_stays_hindi() {
        let parts = split_by_script("प्रवेश निषेध। No entry.");
        assert_eq!(parts.hindi, "प्रवेश निषेध।");
        assert_eq!(parts.english, "No entry.");
    }

    #[test]
    fn test_outputs_stay_in_their_blocks() {
        let samples = [
            "Hello नमस्ते 2024",
            "गैलरी 3 → Gallery 3",
            "\tमुंबई\n\nMumbai\u{00a0}café ",
            "",
            "🙂 संग्रहालय",
        ];
        for s in samples {
            let parts = split_by_script(s);
            assert!(parts.hindi.chars().all(|c| c == ' ' || DEVANAGARI.contains(&(c as u32))));
            assert!(parts.english.chars().all(|c| LATIN.contains(&(c as u32))));
            for out in [&parts.hindi, &parts.english] {
                assert!(!out.contains("  "));
                assert_eq!(out.trim(), out.as_str());
            }
        }
    }

    #[test]
    fn test_collapse_whitespace() {
        assert_eq!(collapse_whitespace(" a \t b\n\nc "), "a b c");
        assert_eq!(collapse_whitespace("   "), "");
    }
}
