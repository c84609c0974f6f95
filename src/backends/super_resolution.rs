//! ONNX super-resolution enhancer

use image::RgbImage;
use imageproc::filter::filter3x3;
use ndarray::Ix4;
use ort::value::Value;
use tracing::debug;

use super::models::{LazySession, ModelKind, ModelManager};
use super::Enhancer;
use crate::config::AiConfig;
use crate::error::{OcrError, Result};
use crate::vision::tensor::{rgb_to_unit_tensor, unit_tensor_to_rgb};

/// Center weight of the Laplacian boost applied after upsampling
const SHARPEN_CENTER: f32 = 9.0;

pub struct OnnxSuperResolution {
    session: LazySession,
    max_side: u32,
}

impl OnnxSuperResolution {
    /// Resolve the configured model; the session loads on first use
    pub fn locate(ai: &AiConfig) -> Result<Self> {
        let manager = ModelManager::new(ai).map_err(|e| OcrError::Model(format!("{e:#}")))?;
        let path = manager
            .resolve(ai.sr_model_path.as_deref(), ModelKind::SuperResolution)
            .map_err(|e| OcrError::Model(format!("{e:#}")))?;
        Ok(Self {
            session: LazySession::new(path),
            max_side: ai.sr_max_side,
        })
    }
}

/// Large images are returned unchanged
pub fn should_upscale(width: u32, height: u32, max_side: u32) -> bool {
    width > 0 && height > 0 && width.max(height) <= max_side
}

/// Per-channel `9 * p - sum(8 neighbours)`, edges replicated
pub fn sharpen_rgb(image: &RgbImage) -> RgbImage {
    let kernel = [-1.0, -1.0, -1.0, -1.0, SHARPEN_CENTER, -1.0, -1.0, -1.0, -1.0];
    filter3x3::<_, f32, u8>(image, &kernel)
}

impl Enhancer for OnnxSuperResolution {
    fn name(&self) -> &str {
        "onnx-super-resolution"
    }

    fn enhance(&self, image: &RgbImage) -> Result<RgbImage> {
        let (w, h) = image.dimensions();
        if !should_upscale(w, h, self.max_side) {
            debug!("Skipping super-resolution for {}x{}", w, h);
            return Ok(image.clone());
        }

        let input = Value::from_array(rgb_to_unit_tensor(image))?;

        let upscaled = self.session.with(|session| {
            let input_name = session
                .input_names()
                .first()
                .cloned()
                .ok_or_else(|| OcrError::Enhancement("model has no inputs".into()))?;
            let outputs = session.session_mut().run(ort::inputs![input_name => input])?;
            let array = outputs[0].try_extract_array::<f32>()?;
            let shape = array.shape().to_vec();
            let array = array
                .into_dimensionality::<Ix4>()
                .map_err(|e| OcrError::Enhancement(e.to_string()))?;
            unit_tensor_to_rgb(array)
                .ok_or_else(|| OcrError::Enhancement(format!("unexpected output shape {:?}", shape)))
        })?;

        debug!("Super-resolution {}x{} -> {:?}", w, h, upscaled.dimensions());
        Ok(sharpen_rgb(&upscaled))
    }
}
