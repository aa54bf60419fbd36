//! Diagnostic statistics comparing an image with its permuted form.
//!
//! Both images are reduced to 8-bit luminance first. None of these numbers
//! influence whether encryption or decryption succeeds.

use image::{imageops::FilterType, GrayImage};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::types::Image;

const SSIM_WINDOW: usize = 7;
const SSIM_K1: f64 = 0.01;
const SSIM_K2: f64 = 0.03;
const DATA_RANGE: f64 = 255.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub entropy_original: f64,
    pub entropy_permuted: f64,
    /// Percentage of pixel positions whose value changed.
    pub npcr: f64,
    /// Mean absolute difference as a percentage of 255.
    pub uaci: f64,
    pub ssim: f64,
    /// Pearson coefficient; NaN when either image is flat.
    pub correlation: f64,
}

/// Luminance plane of an image; always exactly width × height bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrayPlane {
    width: usize,
    height: usize,
    values: Vec<u8>,
}

impl GrayPlane {
    /// BT.601 luma for colour images; alpha is ignored.
    pub fn from_image(image: &Image) -> Self {
        let channels = image.channels() as usize;
        let values = image.pixels()
            .chunks_exact(channels)
            .map(|px| match channels {
                1 | 2 => px[0],
                _ => {
                    let (r, g, b) = (px[0] as u32, px[1] as u32, px[2] as u32);
                    ((299 * r + 587 * g + 114 * b + 500) / 1000) as u8
                }
            })
            .collect();

        Self {
            width: image.width() as usize,
            height: image.height() as usize,
            values,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn values(&self) -> &[u8] {
        &self.values
    }

    fn resized(self, width: usize, height: usize) -> Self {
        if self.width == width && self.height == height {
            return self;
        }
        if self.values.is_empty() || width == 0 || height == 0 {
            return Self { width, height, values: vec![0; width * height] };
        }

        let values = GrayImage::from_raw(self.width as u32, self.height as u32, self.values)
            .map(|gray| image::imageops::resize(&gray, width as u32, height as u32, FilterType::Triangle).into_raw())
            .unwrap_or_else(|| vec![0; width * height]);
        Self { width, height, values }
    }
}

/// Compares `original` against `permuted`, resizing the latter if the
/// shapes differ.
pub fn evaluate(original: &Image, permuted: &Image) -> Metrics {
    let a = GrayPlane::from_image(original);
    let b = GrayPlane::from_image(permuted).resized(a.width, a.height);
    compare(&a, &b)
}

/// `b` must already have the shape of `a`.
fn compare(a: &GrayPlane, b: &GrayPlane) -> Metrics {

    Metrics {
        entropy_original: entropy(&a.values),
        entropy_permuted: entropy(&b.values),
        npcr: npcr(&a.values, &b.values),
        uaci: uaci(&a.values, &b.values),
        ssim: ssim(a, b),
        correlation: correlation(&a.values, &b.values),
    }
}

/// Shannon entropy in bits of the byte histogram.
pub fn entropy(values: &[u8]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }

    let mut histogram = [0u64; 256];
    for &v in values {
        histogram[v as usize] += 1;
    }

    // Summed in bin order so equal histograms give identical results
    let total = values.len() as f64;
    -histogram.iter()
        .filter(|&&count| count > 0)
        .map(|&count| {
            let p = count as f64 / total;
            p * p.log2()
        })
        .sum::<f64>()
}

/// NaN when the inputs differ in length, as for [`uaci`] and [`correlation`].
pub fn npcr(a: &[u8], b: &[u8]) -> f64 {
    if a.len() != b.len() {
        return f64::NAN;
    }
    if a.is_empty() {
        return 0.0;
    }
    let changed = a.iter().zip(b).filter(|(x, y)| x != y).count();
    changed as f64 / a.len() as f64 * 100.0
}

pub fn uaci(a: &[u8], b: &[u8]) -> f64 {
    if a.len() != b.len() {
        return f64::NAN;
    }
    if a.is_empty() {
        return 0.0;
    }
    let total: u64 = a.iter().zip(b).map(|(&x, &y)| x.abs_diff(y) as u64).sum();
    total as f64 / a.len() as f64 / DATA_RANGE * 100.0
}

pub fn correlation(a: &[u8], b: &[u8]) -> f64 {
    let n = a.len() as f64;
    if a.is_empty() || a.len() != b.len() {
        return f64::NAN;
    }

    let mean_a = a.iter().map(|&v| v as f64).sum::<f64>() / n;
    let mean_b = b.iter().map(|&v| v as f64).sum::<f64>() / n;

    let (mut cov, mut var_a, mut var_b) = (0.0, 0.0, 0.0);
    for (&x, &y) in a.iter().zip(b) {
        let dx = x as f64 - mean_a;
        let dy = y as f64 - mean_b;
        cov += dx * dy;
        var_a += dx * dx;
        var_b += dy * dy;
    }

    let denom = (var_a * var_b).sqrt();
    if denom == 0.0 {
        return f64::NAN;
    }
    (cov / denom).clamp(-1.0, 1.0)
}

/// Mean SSIM over every fully contained 7×7 window (uniform weights,
/// sample covariance). Planes smaller than the window are treated as a
/// single window.
fn ssim(a: &GrayPlane, b: &GrayPlane) -> f64 {
    let (width, height) = (a.width, a.height);
    if a.values.is_empty() {
        return 1.0;
    }

    if width < SSIM_WINDOW || height < SSIM_WINDOW {
        let stats = WindowStats::collect(a, b, 0, 0, width, height);
        return stats.ssim();
    }

    let rows = height - SSIM_WINDOW + 1;
    let cols = width - SSIM_WINDOW + 1;
    let total: f64 = (0..rows)
        .into_par_iter()
        .map(|y| {
            (0..cols)
                .map(|x| WindowStats::collect(a, b, x, y, SSIM_WINDOW, SSIM_WINDOW).ssim())
                .sum::<f64>()
        })
        .sum();

    total / (rows * cols) as f64
}

struct WindowStats {
    n: f64,
    sum_a: f64,
    sum_b: f64,
    sum_aa: f64,
    sum_bb: f64,
    sum_ab: f64,
}

impl WindowStats {
    fn collect(a: &GrayPlane, b: &GrayPlane, x0: usize, y0: usize, w: usize, h: usize) -> Self {
        let mut stats = WindowStats { n: (w * h) as f64, sum_a: 0.0, sum_b: 0.0, sum_aa: 0.0, sum_bb: 0.0, sum_ab: 0.0 };
        for y in y0..y0 + h {
            let row = y * a.width;
            for x in x0..x0 + w {
                let va = a.values[row + x] as f64;
                let vb = b.values[row + x] as f64;
                stats.sum_a += va;
                stats.sum_b += vb;
                stats.sum_aa += va * va;
                stats.sum_bb += vb * vb;
                stats.sum_ab += va * vb;
            }
        }
        stats
    }

    fn ssim(&self) -> f64 {
        let c1 = (SSIM_K1 * DATA_RANGE).powi(2);
        let c2 = (SSIM_K2 * DATA_RANGE).powi(2);
        let cov_norm = if self.n > 1.0 { self.n / (self.n - 1.0) } else { 1.0 };

        let mu_a = self.sum_a / self.n;
        let mu_b = self.sum_b / self.n;
        let var_a = cov_norm * (self.sum_aa / self.n - mu_a * mu_a);
        let var_b = cov_norm * (self.sum_bb / self.n - mu_b * mu_b);
        let cov_ab = cov_norm * (self.sum_ab / self.n - mu_a * mu_b);

        ((2.0 * mu_a * mu_b + c1) * (2.0 * cov_ab + c2))
            / ((mu_a * mu_a + mu_b * mu_b + c1) * (var_a + var_b + c2))
    }
}
