//! Tensor conversion for ONNX models
//!
//! Converts between `image` buffers and NCHW `ndarray` tensors for the
//! super-resolution and EAST models.

use image::{imageops, Rgb, RgbImage};
use ndarray::{Array3, Array4, ArrayView4};

/// Convert an RGB image to an HWC f32 array scaled by `scale`
pub fn rgb_to_hwc_f32(image: &RgbImage, scale: f32) -> Array3<f32> {
    let (w, h) = image.dimensions();
    let mut hwc = Array3::<f32>::zeros((h as usize, w as usize, 3));

    for (x, y, pixel) in image.enumerate_pixels() {
        for c in 0..3 {
            hwc[[y as usize, x as usize, c]] = pixel.0[c] as f32 * scale;
        }
    }

    hwc
}

/// Subtract a per-channel mean in place
pub fn subtract_mean(image: &mut Array3<f32>, mean: &[f32; 3]) {
    for mut pixel in image.rows_mut() {
        for c in 0..3 {
            pixel[c] -= mean[c];
        }
    }
}

/// Convert HWC image to NCHW tensor (batch size 1)
pub fn hwc_to_nchw(image: &Array3<f32>) -> Array4<f32> {
    let (h, w, c) = image.dim();
    let mut tensor = Array4::<f32>::zeros((1, c, h, w));

    for y in 0..h {
        for x in 0..w {
            for ch in 0..c {
                tensor[[0, ch, y, x]] = image[[y, x, ch]];
            }
        }
    }

    tensor
}

/// Super-resolution input: RGB in [0, 1], NCHW
pub fn rgb_to_unit_tensor(image: &RgbImage) -> Array4<f32> {
    hwc_to_nchw(&rgb_to_hwc_f32(image, 1.0 / 255.0))
}

/// EAST input: resized to `width` x `height`, 0-255 RGB minus channel means, NCHW
pub fn rgb_to_east_tensor(image: &RgbImage, width: u32, height: u32, mean: &[f32; 3]) -> Array4<f32> {
    let resized = imageops::resize(image, width, height, imageops::FilterType::Triangle);
    let mut hwc = rgb_to_hwc_f32(&resized, 1.0);
    subtract_mean(&mut hwc, mean);
    hwc_to_nchw(&hwc)
}

/// Convert a `[1, 3, H, W]` tensor with values in [0, 1] back to an RGB image
///
/// Returns `None` when the tensor does not have three channels.
pub fn unit_tensor_to_rgb(tensor: ArrayView4<f32>) -> Option<RgbImage> {
    let (n, c, h, w) = tensor.dim();
    if n < 1 || c != 3 || h == 0 || w == 0 {
        return None;
    }

    let mut image = RgbImage::new(w as u32, h as u32);
    for y in 0..h {
        for x in 0..w {
            let mut px = [0u8; 3];
            for (ch, slot) in px.iter_mut().enumerate() {
                *slot = (tensor[[0, ch, y, x]] * 255.0).round().clamp(0.0, 255.0) as u8;
            }
            image.put_pixel(x as u32, y as u32, Rgb(px));
        }
    }
    Some(image)
}

/// Round a model input side down to a multiple of 32, never below `floor`
pub fn multiple_of_32(side: u32, floor: u32) -> u32 {
    (side / 32 * 32).max(floor / 32 * 32).max(32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rgb_to_unit_tensor() {
        let mut img = RgbImage::new(2, 1);
        img.put_pixel(0, 0, Rgb([255, 0, 0]));
        img.put_pixel(1, 0, Rgb([0, 255, 51]));

        let t = rgb_to_unit_tensor(&img);
        assert_eq!(t.dim(), (1, 3, 1, 2));
        assert!((t[[0, 0, 0, 0]] - 1.0).abs() < 1e-6);
        assert!((t[[0, 1, 0, 1]] - 1.0).abs() < 1e-6);
        assert!((t[[0, 2, 0, 1]] - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_hwc_to_nchw() {
        let hwc = Array3::<f32>::from_shape_fn((10, 20, 3), |(h, w, c)| (h * 100 + w * 10 + c) as f32);
        let nchw = hwc_to_nchw(&hwc);

        assert_eq!(nchw.dim(), (1, 3, 10, 20));
        assert_eq!(nchw[[0, 1, 5, 10]], hwc[[5, 10, 1]]);
    }

    #[test]
    fn test_east_tensor_subtracts_mean() {
        let img = RgbImage::from_pixel(4, 4, Rgb([200, 200, 200]));
        let t = rgb_to_east_tensor(&img, 32, 32, &[123.68, 116.78, 103.94]);
        assert_eq!(t.dim(), (1, 3, 32, 32));
        assert!((t[[0, 0, 3, 3]] - (200.0 - 123.68)).abs() < 1e-3);
        assert!((t[[0, 2, 3, 3]] - (200.0 - 103.94)).abs() < 1e-3);
    }

    #[test]
    fn test_unit_tensor_roundtrip_to_image() {
        let img = RgbImage::from_fn(3, 2, |x, y| Rgb([(x * 80) as u8, (y * 100) as u8, 7]));
        let t = rgb_to_unit_tensor(&img);
        let back = unit_tensor_to_rgb(t.view()).unwrap();
        assert_eq!(back, img);
    }

    #[test]
    fn test_unit_tensor_rejects_wrong_channels() {
        let t = Array4::<f32>::zeros((1, 1, 4, 4));
        assert!(unit_tensor_to_rgb(t.view()).is_none());
    }

    #[test]
    fn test_multiple_of_32() {
        assert_eq!(multiple_of_32(640, 320), 640);
        assert_eq!(multiple_of_32(650, 320), 640);
        assert_eq!(multiple_of_32(100, 320), 320);
    }
}
