//! Synthetic photographs of a page on a desk, shared by the integration
//! tests, the benchmark and the perf demo.

use image::{DynamicImage, Rgb, RgbImage};

const PAGE: Rgb<u8> = Rgb([235, 232, 225]);
const INK: Rgb<u8> = Rgb([40, 40, 40]);
const DESK: Rgb<u8> = Rgb([30, 36, 44]);

/// Even-odd point-in-polygon test.
pub fn inside(x: f64, y: f64, poly: &[(f64, f64); 4]) -> bool {
    let mut inside = false;
    let mut j = poly.len() - 1;
    for i in 0..poly.len() {
        let (xi, yi) = poly[i];
        let (xj, yj) = poly[j];
        if ((yi > y) != (yj > y)) && (x < (xj - xi) * (y - yi) / (yj - yi) + xi) {
            inside = !inside;
        }
        j = i;
    }
    inside
}

/// Bright page bounded by `corners` on a dark desk, sampled at pixel centres.
/// With `text`, the page carries rows of dark stripes.
pub fn synthetic_page(width: u32, height: u32, corners: &[(f64, f64); 4], text: bool) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
        if !inside(x as f64 + 0.5, y as f64 + 0.5, corners) {
            DESK
        } else if text && (y / 4) % 6 == 0 && x % 50 < 40 {
            INK
        } else {
            PAGE
        }
    }))
}
