//! Process-boundary output record
//!
//! Exactly one record is printed per invocation, on success and on failure.

use serde::{Deserialize, Serialize};

use crate::vision::OcrResult;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputRecord {
    pub success: bool,
    pub text: String,
    pub hindi_text: String,
    pub english_text: String,
    pub confidence: f32,
    /// Seconds
    pub processing_time: f64,
    pub zones_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl OutputRecord {
    pub fn from_result(result: &OcrResult) -> Self {
        Self {
            success: true,
            text: result.text.clone(),
            hindi_text: result.hindi_text.clone(),
            english_text: result.english_text.clone(),
            confidence: result.confidence.clamp(0.0, 1.0),
            processing_time: result.processing_time,
            zones_count: result.zones.len(),
            error: None,
        }
    }

    /// Failure record carrying only the error message
    pub fn failure(error: impl ToString, processing_time: f64) -> Self {
        Self {
            success: false,
            text: String::new(),
            hindi_text: String::new(),
            english_text: String::new(),
            confidence: 0.0,
            processing_time,
            zones_count: 0,
            error: Some(error.to_string()),
        }
    }

    /// Single-line JSON
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            format!(
                r#"{{"success":false,"text":"","hindi_text":"","english_text":"","confidence":0.0,"processing_time":0.0,"zones_count":0,"error":{:?}}}"#,
                e.to_string()
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::OcrError;
    use crate::vision::{Language, TextZone, Zone};
    use serde_json::Value;
    use std::path::PathBuf;

    fn result() -> OcrResult {
        OcrResult {
            text: "[ENGLISH] EXIT".to_string(),
            hindi_text: String::new(),
            english_text: "EXIT".to_string(),
            confidence: 0.38,
            processing_time: 1.25,
            zones: vec![TextZone {
                zone: Zone { x: 0, y: 0, w: 10, h: 10 },
                language: Language::English,
                confidence: 0.38,
                text: "EXIT".to_string(),
            }],
            preprocessing_steps: vec!["deskew".to_string()],
        }
    }

    #[test]
    fn test_success_record_omits_error() {
        let json: Value = serde_json::from_str(&OutputRecord::from_result(&result()).to_json()).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["english_text"], "EXIT");
        assert_eq!(json["zones_count"], 1);
        assert!(json.get("error").is_none());
        assert!(json.get("zones").is_none());
    }

    #[test]
    fn test_failure_record() {
        let err = OcrError::Input {
            path: PathBuf::from("sign.jpg"),
            reason: "No such file or directory".to_string(),
        };
        let record = OutputRecord::failure(&err, 0.01);
        let json: Value = serde_json::from_str(&record.to_json()).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["zones_count"], 0);
        assert!(json["error"].as_str().unwrap().contains("sign.jpg"));
    }
}
