//! Local recognizer driving the `tesseract` executable
//!
//! Regions are written to a temporary PNG and read back from tesseract's TSV
//! output. Word rows are grouped into lines for [`Recognizer::recognize`]
//! and into paragraphs for [`Recognizer::recognize_paragraphs`].

use std::path::PathBuf;
use std::process::Command;

use image::{GrayImage, ImageFormat};
use tracing::{debug, info};

use super::Recognizer;
use crate::error::{OcrError, Result};
use crate::vision::Detection;

/// TSV row level of a single word
const WORD_LEVEL: u32 = 5;
/// Page segmentation mode: a single uniform block of text
const PAGE_SEGMENTATION: &str = "6";

/// One word row of tesseract TSV output
#[derive(Debug, Clone, PartialEq)]
pub struct TsvWord {
    pub block: u32,
    pub paragraph: u32,
    pub line: u32,
    pub left: u32,
    pub top: u32,
    pub width: u32,
    pub height: u32,
    /// 0-100
    pub confidence: f32,
    pub text: String,
}

/// Parse word rows from TSV; rows without text or with negative confidence
/// are skipped
pub fn parse_tsv(tsv: &str) -> Vec<TsvWord> {
    tsv.lines()
        .skip(1)
        .filter_map(|row| {
            let cols: Vec<&str> = row.split('\t').collect();
            if cols.len() < 12 {
                return None;
            }
            let num = |i: usize| cols[i].trim().parse::<u32>().ok();
            if num(0)? != WORD_LEVEL {
                return None;
            }
            let confidence: f32 = cols[10].trim().parse().ok()?;
            let text = cols[11..].join("\t").trim().to_string();
            if confidence < 0.0 || text.is_empty() {
                return None;
            }
            Some(TsvWord {
                block: num(2)?,
                paragraph: num(3)?,
                line: num(4)?,
                left: num(6)?,
                top: num(7)?,
                width: num(8)?,
                height: num(9)?,
                confidence,
                text,
            })
        })
        .collect()
}

/// Merge consecutive words sharing a key into one detection each
///
/// Text is space-joined, bounds are the union, confidence is the mean word
/// confidence rescaled to [0, 1].
pub fn group_words<K, F>(words: &[TsvWord], key: F) -> Vec<Detection>
where
    K: PartialEq,
    F: Fn(&TsvWord) -> K,
{
    let mut groups: Vec<(K, Vec<&TsvWord>)> = Vec::new();
    for word in words {
        let k = key(word);
        match groups.last_mut() {
            Some((last, members)) if *last == k => members.push(word),
            _ => groups.push((k, vec![word])),
        }
    }

    groups
        .into_iter()
        .map(|(_, members)| {
            let left = members.iter().map(|w| w.left).min().unwrap_or(0);
            let top = members.iter().map(|w| w.top).min().unwrap_or(0);
            let right = members.iter().map(|w| w.left + w.width).max().unwrap_or(left);
            let bottom = members.iter().map(|w| w.top + w.height).max().unwrap_or(top);
            let confidence = members.iter().map(|w| w.confidence).sum::<f32>() / members.len() as f32 / 100.0;
            let text = members.iter().map(|w| w.text.as_str()).collect::<Vec<_>>().join(" ");
            Detection::new((left, top, right - left, bottom - top), text, confidence)
        })
        .collect()
}

/// Language codes listed by `tesseract --list-langs`
pub fn parse_language_list(output: &str) -> Vec<String> {
    output
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.to_lowercase().starts_with("list of available languages"))
        .map(str::to_string)
        .collect()
}

/// Parts of a `+`-joined language spec (e.g. `hin+eng`) that are not installed
pub fn missing_languages<'a>(requested: &'a str, installed: &[String]) -> Vec<&'a str> {
    requested
        .split('+')
        .map(str::trim)
        .filter(|code| !code.is_empty() && !installed.iter().any(|l| l == code))
        .collect()
}

pub struct TesseractRecognizer {
    name: String,
    executable: PathBuf,
    language: String,
}

impl TesseractRecognizer {
    /// Check that the executable runs and has the language pack installed
    pub fn probe(executable: &str, language: &str) -> Result<Self> {
        let name = format!("tesseract-{}", language);
        let output = Command::new(executable)
            .arg("--list-langs")
            .output()
            .map_err(|e| OcrError::unavailable(&name, format!("cannot run {}: {}", executable, e)))?;

        if !output.status.success() {
            return Err(OcrError::unavailable(&name, format!("{} --list-langs failed", executable)));
        }

        // Older releases print the list on stderr
        let mut listing = String::from_utf8_lossy(&output.stdout).into_owned();
        listing.push_str(&String::from_utf8_lossy(&output.stderr));
        let languages = parse_language_list(&listing);
        let missing = missing_languages(language, &languages);
        if !missing.is_empty() || language.trim().is_empty() {
            return Err(OcrError::unavailable(
                &name,
                format!("language '{}' not installed (have: {})", missing.join("+"), languages.join(", ")),
            ));
        }

        info!("Tesseract available for '{}'", language);
        Ok(Self {
            name,
            executable: PathBuf::from(executable),
            language: language.to_string(),
        })
    }

    fn run_tsv(&self, region: &GrayImage) -> Result<Vec<TsvWord>> {
        if region.width() == 0 || region.height() == 0 {
            return Ok(Vec::new());
        }

        let file = tempfile::Builder::new()
            .prefix("bilingual-ocr-")
            .suffix(".png")
            .tempfile()?;
        region
            .save_with_format(file.path(), ImageFormat::Png)
            .map_err(|e| OcrError::unavailable(&self.name, format!("cannot write region: {}", e)))?;

        let output = Command::new(&self.executable)
            .arg(file.path())
            .arg("stdout")
            .args(["-l", self.language.as_str(), "--psm", PAGE_SEGMENTATION, "tsv"])
            .output()?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(OcrError::unavailable(&self.name, stderr.trim()));
        }

        let words = parse_tsv(&String::from_utf8_lossy(&output.stdout));
        debug!("{} read {} words", self.name, words.len());
        Ok(words)
    }
}

impl Recognizer for TesseractRecognizer {
    fn name(&self) -> &str {
        &self.name
    }

    fn recognize(&self, region: &GrayImage) -> Result<Vec<Detection>> {
        let words = self.run_tsv(region)?;
        Ok(group_words(&words, |w| (w.block, w.paragraph, w.line)))
    }

    fn recognize_paragraphs(&self, region: &GrayImage) -> Result<Vec<Detection>> {
        let words = self.run_tsv(region)?;
        Ok(group_words(&words, |w| (w.block, w.paragraph)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\tleft\ttop\twidth\theight\tconf\ttext
1\t1\t0\t0\t0\t0\t0\t0\t400\t200\t-1\t
4\t1\t1\t1\t1\t0\t10\t10\t200\t20\t-1\t
5\t1\t1\t1\t1\t1\t10\t10\t90\t20\t96.5\tNational
5\t1\t1\t1\t1\t2\t110\t12\t100\t18\t91.5\tMuseum
5\t1\t1\t1\t2\t1\t10\t40\t60\t20\t80\tGallery
5\t1\t1\t1\t2\t2\t75\t40\t10\t20\t-1\t
5\t1\t2\t1\t1\t1\t10\t120\t50\t20\t50\tप्रवेश
";

    #[test]
    fn test_parse_tsv_keeps_word_rows() {
        let words = parse_tsv(SAMPLE);
        assert_eq!(words.len(), 4);
        assert_eq!(words[0].text, "National");
        assert_eq!(words[1].confidence, 91.5);
        assert_eq!(words[3].text, "प्रवेश");
        assert_eq!(words[3].block, 2);
    }

    #[test]
    fn test_parse_tsv_ignores_garbage() {
        assert!(parse_tsv("").is_empty());
        assert!(parse_tsv("header\nnot\ta\trow").is_empty());
    }

    #[test]
    fn test_group_into_lines() {
        let words = parse_tsv(SAMPLE);
        let lines = group_words(&words, |w| (w.block, w.paragraph, w.line));
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0].text, "National Museum");
        assert_eq!(lines[0].bounds, (10, 10, 200, 20));
        assert!((lines[0].confidence - 0.94).abs() < 1e-5);
        assert_eq!(lines[1].text, "Gallery");
        assert!((lines[2].confidence - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_group_into_paragraphs() {
        let words = parse_tsv(SAMPLE);
        let paragraphs = group_words(&words, |w| (w.block, w.paragraph));
        assert_eq!(paragraphs.len(), 2);
        assert_eq!(paragraphs[0].text, "National Museum Gallery");
        assert_eq!(paragraphs[0].bounds, (10, 10, 200, 50));
        assert_eq!(paragraphs[1].text, "प्रवेश");
    }

    #[test]
    fn test_parse_language_list() {
        let listing = "List of available languages in \"/usr/share/tessdata/\" (3):\neng\nhin\nosd\n";
        assert_eq!(parse_language_list(listing), vec!["eng", "hin", "osd"]);
    }

    #[test]
    fn test_missing_languages_checks_each_joined_code() {
        let installed = vec!["eng".to_string(), "hin".to_string(), "osd".to_string()];
        assert!(missing_languages("hin+eng", &installed).is_empty());
        assert!(missing_languages("hin", &installed).is_empty());
        assert_eq!(missing_languages("hin+mar+eng", &installed), vec!["mar"]);
        assert_eq!(missing_languages("san", &installed), vec!["san"]);
    }

    #[test]
    fn test_missing_executable_is_unavailable() {
        let err = TesseractRecognizer::probe("/nonexistent/tesseract-binary", "hin")
            .err()
            .expect("probe must fail");
        assert!(matches!(err, OcrError::RecognizerUnavailable { .. }));
    }
}
