//! Grayscale image filters used by preprocessing and zone detection
//!
//! Every filter takes an image by reference and returns a new image, so each
//! pipeline stage works on its own derived copy.

use image::{imageops, GrayImage, Luma};
use imageproc::contrast::{otsu_level, threshold, ThresholdType};
use imageproc::filter::{filter3x3, gaussian_blur_f32};
use imageproc::morphology::{grayscale_open, Mask};
use rayon::prelude::*;

/// Direction of a line-shaped structuring element
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineDirection {
    Horizontal,
    Vertical,
}

/// Binarize with the Otsu level: pixels above the level become 255
pub fn otsu_binarize(image: &GrayImage) -> GrayImage {
    threshold(image, otsu_level(image), ThresholdType::Binary)
}

/// Photographic negative
pub fn invert(image: &GrayImage) -> GrayImage {
    let mut out = image.clone();
    imageops::invert(&mut out);
    out
}

/// Saturating per-pixel `a - b`
pub fn subtract(a: &GrayImage, b: &GrayImage) -> GrayImage {
    combine(a, b, |x, y| x.saturating_sub(y))
}

/// Per-pixel bitwise OR
pub fn bitwise_or(a: &GrayImage, b: &GrayImage) -> GrayImage {
    combine(a, b, |x, y| x | y)
}

/// Per-pixel `a & !b`
pub fn and_not(a: &GrayImage, b: &GrayImage) -> GrayImage {
    combine(a, b, |x, y| x & !y)
}

fn combine<F>(a: &GrayImage, b: &GrayImage, op: F) -> GrayImage
where
    F: Fn(u8, u8) -> u8,
{
    let (w, h) = a.dimensions();
    debug_assert_eq!((w, h), b.dimensions());
    GrayImage::from_fn(w, h, |x, y| Luma([op(a.get_pixel(x, y).0[0], b.get_pixel(x, y).0[0])]))
}

/// Linearly rescale intensities so that min maps to 0 and max to 255
pub fn normalize_min_max(image: &GrayImage) -> GrayImage {
    let (min_val, max_val) = image
        .pixels()
        .fold((u8::MAX, u8::MIN), |(lo, hi), p| (lo.min(p.0[0]), hi.max(p.0[0])));

    if max_val == min_val {
        // Flat input: OpenCV NORM_MINMAX maps everything to the lower bound
        return GrayImage::new(image.width(), image.height());
    }

    let range = (max_val - min_val) as f32;
    let mut out = image.clone();
    for p in out.pixels_mut() {
        let v = (p.0[0] - min_val) as f32 / range * 255.0;
        p.0[0] = v.round().clamp(0.0, 255.0) as u8;
    }
    out
}

/// Grayscale opening (erosion then dilation) with a disk of `radius`
///
/// With radius 15 this is the 31x31 elliptical element used to estimate
/// slowly varying background illumination. Radii above 255 are clamped.
pub fn grayscale_open_disk(image: &GrayImage, radius: u32) -> GrayImage {
    if radius == 0 || image.width() == 0 || image.height() == 0 {
        return image.clone();
    }
    let radius = u8::try_from(radius).unwrap_or(u8::MAX);
    grayscale_open(image, &Mask::disk(radius))
}

/// Contrast-limited adaptive histogram equalization
///
/// `tiles` tiles per side; `clip_limit` is relative to a uniform histogram,
/// matching the OpenCV convention.
pub fn clahe(image: &GrayImage, clip_limit: f32, tiles: u32) -> GrayImage {
    let (w, h) = image.dimensions();
    if w == 0 || h == 0 {
        return image.clone();
    }

    let tile_w = w.div_ceil(tiles.clamp(1, w));
    let tile_h = h.div_ceil(tiles.clamp(1, h));
    // Recount so that no tile starts past the image edge
    let tiles_x = w.div_ceil(tile_w);
    let tiles_y = h.div_ceil(tile_h);

    // One lookup table per tile
    let mut luts = vec![[0u8; 256]; (tiles_x * tiles_y) as usize];
    for ty in 0..tiles_y {
        for tx in 0..tiles_x {
            let x0 = tx * tile_w;
            let y0 = ty * tile_h;
            let x1 = (x0 + tile_w).min(w);
            let y1 = (y0 + tile_h).min(h);

            let mut hist = [0u32; 256];
            for y in y0..y1 {
                for x in x0..x1 {
                    hist[image.get_pixel(x, y).0[0] as usize] += 1;
                }
            }
            let area = ((x1.saturating_sub(x0)) * (y1.saturating_sub(y0))).max(1);
            clip_histogram(&mut hist, clip_limit, area);

            let lut = &mut luts[(ty * tiles_x + tx) as usize];
            let scale = 255.0 / area as f32;
            let mut cdf = 0u32;
            for (i, count) in hist.iter().enumerate() {
                cdf += count;
                lut[i] = (cdf as f32 * scale).round().clamp(0.0, 255.0) as u8;
            }
        }
    }

    // Bilinear blend of the four nearest tile mappings
    let mut out = GrayImage::new(w, h);
    for y in 0..h {
        let gy = (y as f32 + 0.5) / tile_h as f32 - 0.5;
        let ty0 = gy.floor().clamp(0.0, (tiles_y - 1) as f32) as u32;
        let ty1 = (ty0 + 1).min(tiles_y - 1);
        let fy = (gy - ty0 as f32).clamp(0.0, 1.0);

        for x in 0..w {
            let gx = (x as f32 + 0.5) / tile_w as f32 - 0.5;
            let tx0 = gx.floor().clamp(0.0, (tiles_x - 1) as f32) as u32;
            let tx1 = (tx0 + 1).min(tiles_x - 1);
            let fx = (gx - tx0 as f32).clamp(0.0, 1.0);

            let v = image.get_pixel(x, y).0[0] as usize;
            let lut = |tx: u32, ty: u32| luts[(ty * tiles_x + tx) as usize][v] as f32;

            let top = lut(tx0, ty0) * (1.0 - fx) + lut(tx1, ty0) * fx;
            let bottom = lut(tx0, ty1) * (1.0 - fx) + lut(tx1, ty1) * fx;
            let value = top * (1.0 - fy) + bottom * fy;
            out.put_pixel(x, y, Luma([value.round().clamp(0.0, 255.0) as u8]));
        }
    }
    out
}

/// Clip histogram bins and spread the excess uniformly
fn clip_histogram(hist: &mut [u32; 256], clip_limit: f32, area: u32) {
    if clip_limit <= 0.0 {
        return;
    }
    let limit = ((clip_limit * area as f32 / 256.0) as u32).max(1);

    let mut excess = 0u32;
    for bin in hist.iter_mut() {
        if *bin > limit {
            excess += *bin - limit;
            *bin = limit;
        }
    }

    let per_bin = excess / 256;
    let residual = (excess % 256) as usize;
    for bin in hist.iter_mut() {
        *bin += per_bin;
    }
    if residual > 0 {
        let step = (256 / residual).max(1);
        for i in (0..256).step_by(step).take(residual) {
            hist[i] += 1;
        }
    }
}

/// Non-local means smoothing
///
/// Each output pixel is the average of the pixels in its search window,
/// weighted by the similarity of the surrounding patches. Rows are filtered
/// in parallel.
pub fn non_local_means(image: &GrayImage, strength: f32, patch_radius: u32, search_radius: u32) -> GrayImage {
    let (w, h) = image.dimensions();
    if w == 0 || h == 0 || strength <= 0.0 {
        return image.clone();
    }

    let src = image.as_raw();
    let (wi, hi) = (w as i64, h as i64);
    let pr = patch_radius as i64;
    let sr = search_radius as i64;
    let patch_len = ((2 * pr + 1) * (2 * pr + 1)) as f32;
    let h2 = strength * strength;

    let at = |x: i64, y: i64| -> f32 {
        let cx = x.clamp(0, wi - 1);
        let cy = y.clamp(0, hi - 1);
        src[(cy * wi + cx) as usize] as f32
    };

    let rows: Vec<Vec<u8>> = (0..hi)
        .into_par_iter()
        .map(|y| {
            let mut row = Vec::with_capacity(w as usize);
            for x in 0..wi {
                let mut weight_sum = 0.0f32;
                let mut value_sum = 0.0f32;
                for dy in -sr..=sr {
                    for dx in -sr..=sr {
                        let (qx, qy) = (x + dx, y + dy);
                        let mut dist = 0.0f32;
                        for py in -pr..=pr {
                            for px in -pr..=pr {
                                let d = at(x + px, y + py) - at(qx + px, qy + py);
                                dist += d * d;
                            }
                        }
                        let weight = (-(dist / patch_len) / h2).exp();
                        weight_sum += weight;
                        value_sum += weight * at(qx, qy);
                    }
                }
                let v = if weight_sum > 0.0 { value_sum / weight_sum } else { at(x, y) };
                row.push(v.round().clamp(0.0, 255.0) as u8);
            }
            row
        })
        .collect();

    let data: Vec<u8> = rows.into_iter().flatten().collect();
    GrayImage::from_raw(w, h, data).unwrap_or_else(|| image.clone())
}

/// 3x3 Laplacian boost: `center * p - sum(8 neighbours)`, edges replicated
pub fn sharpen(image: &GrayImage, center: f32) -> GrayImage {
    let kernel = [-1.0, -1.0, -1.0, -1.0, center, -1.0, -1.0, -1.0, -1.0];
    filter3x3::<_, f32, u8>(image, &kernel)
}

/// Binary opening with a `length`-pixel line element
///
/// Keeps exactly the foreground pixels that belong to an unbroken run of at
/// least `length` pixels in the given direction.
pub fn line_mask(binary: &GrayImage, length: u32, direction: LineDirection) -> GrayImage {
    let (w, h) = binary.dimensions();
    let mut out = GrayImage::new(w, h);
    if length == 0 {
        return out;
    }

    let (outer, inner) = match direction {
        LineDirection::Horizontal => (h, w),
        LineDirection::Vertical => (w, h),
    };
    let coords = |o: u32, i: u32| match direction {
        LineDirection::Horizontal => (i, o),
        LineDirection::Vertical => (o, i),
    };

    for o in 0..outer {
        let mut run_start = 0u32;
        let mut run_len = 0u32;
        for i in 0..=inner {
            let on = i < inner && {
                let (x, y) = coords(o, i);
                binary.get_pixel(x, y).0[0] > 0
            };
            if on {
                if run_len == 0 {
                    run_start = i;
                }
                run_len += 1;
            } else {
                if run_len >= length {
                    for k in run_start..run_start + run_len {
                        let (x, y) = coords(o, k);
                        out.put_pixel(x, y, Luma([255]));
                    }
                }
                run_len = 0;
            }
        }
    }
    out
}

/// Inverted adaptive Gaussian threshold
///
/// A pixel becomes 255 when it is not brighter than its Gaussian-weighted
/// neighbourhood mean minus `c`.
pub fn adaptive_threshold_inv(image: &GrayImage, block_size: u32, c: f32) -> GrayImage {
    let block = block_size.max(3) | 1;
    // OpenCV's sigma for a given kernel size
    let sigma = 0.3 * ((block as f32 - 1.0) * 0.5 - 1.0) + 0.8;
    let mean = gaussian_blur_f32(image, sigma);

    let (w, h) = image.dimensions();
    GrayImage::from_fn(w, h, |x, y| {
        let v = image.get_pixel(x, y).0[0] as f32;
        let t = mean.get_pixel(x, y).0[0] as f32 - c;
        Luma([if v > t { 0 } else { 255 }])
    })
}

/// Rescale to `target_height`, preserving aspect ratio
pub fn resize_to_height(image: &GrayImage, target_height: u32, filter: imageops::FilterType) -> GrayImage {
    let (w, h) = image.dimensions();
    if h == 0 || target_height == 0 || h == target_height {
        return image.clone();
    }
    let scale = target_height as f64 / h as f64;
    let new_w = ((w as f64 * scale) as u32).max(1);
    imageops::resize(image, new_w, target_height, filter)
}
