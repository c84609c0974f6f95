//! Remote OCR service client
//!
//! Posts the region as a base64 PNG data URL and accepts either a top-level
//! `text` string or a `results` list whose first element is an object with
//! `text` or a list of such objects. Anything else, including transport
//! errors and non-2xx statuses, reads as "no text".

use std::io::Cursor;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::{GrayImage, ImageFormat};
use serde_json::{json, Value};
use tokio::runtime::Runtime;
use tracing::{debug, warn};

use super::Recognizer;
use crate::error::{OcrError, Result};
use crate::vision::Detection;

pub struct RemoteRecognizer {
    url: String,
    client: reqwest::Client,
    runtime: Runtime,
}

impl RemoteRecognizer {
    pub fn new(url: &str, timeout_secs: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs.max(1)))
            .build()
            .map_err(|e| OcrError::unavailable("remote", e))?;
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        Ok(Self {
            url: url.to_string(),
            client,
            runtime,
        })
    }

    async fn post(&self, payload: Value) -> Option<String> {
        let response = match self.client.post(&self.url).json(&payload).send().await {
            Ok(r) => r,
            Err(e) => {
                warn!("Remote OCR request failed: {}", e);
                return None;
            }
        };
        if !response.status().is_success() {
            warn!("Remote OCR returned status {}", response.status());
            return None;
        }
        match response.json::<Value>().await {
            Ok(body) => parse_remote_response(&body),
            Err(e) => {
                warn!("Remote OCR returned malformed JSON: {}", e);
                None
            }
        }
    }
}

/// `{"images": ["data:image/png;base64,..."]}` for one region
pub fn request_payload(region: &GrayImage) -> Result<Value> {
    let mut png = Vec::new();
    region
        .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
        .map_err(|e| OcrError::Remote(format!("cannot encode region: {}", e)))?;
    Ok(json!({ "images": [format!("data:image/png;base64,{}", STANDARD.encode(&png))] }))
}

/// Extract the recognized text from a service response
pub fn parse_remote_response(body: &Value) -> Option<String> {
    if let Some(text) = body.get("text").and_then(Value::as_str) {
        return Some(text.trim().to_string());
    }
    let first = body.get("results")?.as_array()?.first()?;
    if let Some(text) = first.get("text").and_then(Value::as_str) {
        return Some(text.trim().to_string());
    }
    let items = first.as_array()?;
    let joined = items
        .iter()
        .filter(|item| item.is_object())
        .map(|item| item.get("text").and_then(Value::as_str).unwrap_or("").trim())
        .collect::<Vec<_>>()
        .join(" ");
    Some(joined.trim().to_string())
}

impl Recognizer for RemoteRecognizer {
    fn name(&self) -> &str {
        "remote"
    }

    fn recognize(&self, region: &GrayImage) -> Result<Vec<Detection>> {
        let (w, h) = region.dimensions();
        if w == 0 || h == 0 {
            return Ok(Vec::new());
        }
        let payload = request_payload(region)?;
        let text = self.runtime.block_on(self.post(payload)).unwrap_or_default();
        debug!("Remote OCR returned {} chars", text.len());
        if text.is_empty() {
            return Ok(Vec::new());
        }
        Ok(vec![Detection::new((0, 0, w, h), text, 1.0)])
    }
}
