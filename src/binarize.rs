//! Local adaptive thresholding of the flattened document.

use image::{GrayImage, Luma};
use log::debug;

use crate::error::Result;
use crate::types::{BinarizeConfig, ThresholdMethod};

/// Turns a grayscale page into a black-and-white "scanned" page.
pub trait Binarizer: Send + Sync {
    fn binarize(&self, gray: &GrayImage) -> Result<GrayImage>;
}

pub struct LocalThreshold {
    pub block_size: u32,
    pub offset: f32,
    pub method: ThresholdMethod,
}

impl LocalThreshold {
    pub fn new(cfg: &BinarizeConfig) -> Result<Self> {
        cfg.validate()?;
        Ok(Self {
            block_size: cfg.block_size,
            offset: cfg.offset,
            method: cfg.method,
        })
    }
}

impl Binarizer for LocalThreshold {
    fn binarize(&self, gray: &GrayImage) -> Result<GrayImage> {
        debug!(
            "Local threshold: block {} offset {} method {:?}",
            self.block_size, self.offset, self.method
        );
        Ok(threshold_local(gray, self.block_size, self.offset, self.method))
    }
}

/// Pixel becomes 255 where it is brighter than its neighbourhood mean minus
/// `offset`, 0 elsewhere. `block_size` is expected odd.
pub fn threshold_local(
    gray: &GrayImage,
    block_size: u32,
    offset: f32,
    method: ThresholdMethod,
) -> GrayImage {
    let (w, h) = gray.dimensions();
    if w == 0 || h == 0 {
        return GrayImage::new(w, h);
    }

    let local = match method {
        ThresholdMethod::Gaussian => gaussian_mean(gray, (block_size as f64 - 1.0) / 6.0),
        ThresholdMethod::Mean => box_mean(gray, block_size / 2),
    };

    let offset = offset as f64;
    GrayImage::from_fn(w, h, |x, y| {
        let i = (y * w + x) as usize;
        let v = gray.get_pixel(x, y)[0] as f64;
        if v > local[i] - offset {
            Luma([255])
        } else {
            Luma([0])
        }
    })
}

/// Half-sample symmetric reflection: `d c b a | a b c d | d c b a`.
fn reflect(i: i64, n: i64) -> usize {
    let period = 2 * n;
    let m = i.rem_euclid(period);
    (if m < n { m } else { period - 1 - m }) as usize
}

fn gaussian_kernel(sigma: f64) -> Vec<f64> {
    // Truncated at 4 sigma
    let radius = (4.0 * sigma + 0.5) as i64;
    if sigma <= 0.0 || radius == 0 {
        return vec![1.0];
    }
    let mut kernel: Vec<f64> = (-radius..=radius)
        .map(|k| (-0.5 * (k * k) as f64 / (sigma * sigma)).exp())
        .collect();
    let sum: f64 = kernel.iter().sum();
    kernel.iter_mut().for_each(|v| *v /= sum);
    kernel
}

/// Separable Gaussian-weighted local mean, row-major output.
fn gaussian_mean(gray: &GrayImage, sigma: f64) -> Vec<f64> {
    let (w, h) = gray.dimensions();
    let (w, h) = (w as usize, h as usize);
    let kernel = gaussian_kernel(sigma);
    let radius = (kernel.len() / 2) as i64;

    let src: Vec<f64> = gray.pixels().map(|p| p[0] as f64).collect();

    let mut horizontal = vec![0.0; w * h];
    for y in 0..h {
        let row = &src[y * w..(y + 1) * w];
        for x in 0..w {
            let mut acc = 0.0;
            for (k, weight) in kernel.iter().enumerate() {
                let sx = reflect(x as i64 + k as i64 - radius, w as i64);
                acc += weight * row[sx];
            }
            horizontal[y * w + x] = acc;
        }
    }

    let mut out = vec![0.0; w * h];
    for y in 0..h {
        for x in 0..w {
            let mut acc = 0.0;
            for (k, weight) in kernel.iter().enumerate() {
                let sy = reflect(y as i64 + k as i64 - radius, h as i64);
                acc += weight * horizontal[sy * w + x];
            }
            out[y * w + x] = acc;
        }
    }
    out
}

/// Summed-area table with a zero row and column in front.
fn integral_image(gray: &GrayImage) -> Vec<u64> {
    let (w, h) = gray.dimensions();
    let stride = (w + 1) as usize;
    let mut table = vec![0u64; stride * (h + 1) as usize];

    for y in 0..h {
        let mut row_sum = 0u64;
        for x in 0..w {
            row_sum += gray.get_pixel(x, y)[0] as u64;
            let idx = (y + 1) as usize * stride + (x + 1) as usize;
            table[idx] = row_sum + table[idx - stride];
        }
    }
    table
}

/// Unweighted mean over a `(2r+1)^2` window clipped to the image.
fn box_mean(gray: &GrayImage, radius: u32) -> Vec<f64> {
    let (w, h) = gray.dimensions();
    let table = integral_image(gray);
    let stride = (w + 1) as usize;

    let mut out = Vec::with_capacity((w * h) as usize);
    for y in 0..h {
        for x in 0..w {
            let x1 = x.saturating_sub(radius) as usize;
            let y1 = y.saturating_sub(radius) as usize;
            let x2 = (x.saturating_add(radius) + 1).min(w) as usize;
            let y2 = (y.saturating_add(radius) + 1).min(h) as usize;

            let sum = table[y2 * stride + x2] + table[y1 * stride + x1]
                - table[y1 * stride + x2]
                - table[y2 * stride + x1];
            let area = ((x2 - x1) * (y2 - y1)) as f64;
            out.push(sum as f64 / area);
        }
    }
    out
}
