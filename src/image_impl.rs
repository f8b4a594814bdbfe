//! Pure Rust image layer: points, I/O, resizing and projective resampling

use std::io::Cursor;
use std::path::Path;

use image::{DynamicImage, ImageBuffer, ImageReader, Pixel};
use log::debug;
use nalgebra::{DMatrix, Matrix3, Vector3};
use serde::{Deserialize, Serialize};

use crate::error::{Result, ScanError};

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Point2D {
    pub x: f64,
    pub y: f64,
}

impl Point2D {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Point2D) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    pub fn scale(&self, ratio: f64) -> Point2D {
        Point2D::new(self.x * ratio, self.y * ratio)
    }
}

impl From<(f64, f64)> for Point2D {
    fn from((x, y): (f64, f64)) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

pub fn imread<P: AsRef<Path>>(path: P) -> Result<DynamicImage> {
    let img = image::open(path)?;
    Ok(img)
}

pub fn imdecode(data: &[u8]) -> Result<DynamicImage> {
    let img = ImageReader::new(Cursor::new(data))
        .with_guessed_format()?
        .decode()?;
    Ok(img)
}

pub fn imwrite<P: AsRef<Path>>(path: P, img: &DynamicImage) -> Result<()> {
    img.save(path)?;
    Ok(())
}

/// Resize so the output is `height` pixels tall, keeping the aspect ratio.
///
/// Returns the resized image and `original_height / height`, the factor that
/// maps working-image coordinates back onto the original.
pub fn resize_to_height(img: &DynamicImage, height: u32) -> Result<(DynamicImage, f64)> {
    let (w, h) = (img.width(), img.height());
    if w == 0 || h == 0 || height == 0 {
        return Err(ScanError::InvalidDimensions {
            width: w as i64,
            height: h as i64,
        });
    }

    let ratio = h as f64 / height as f64;
    let resize_w = ((w as f64 * height as f64 / h as f64) as u32).max(1);
    let resized = img.resize_exact(resize_w, height, image::imageops::FilterType::Triangle);
    Ok((resized, ratio))
}

/// Largest output raster `warp_perspective` will allocate, in pixels.
///
/// 2^28 pixels is 1 GiB of RGBA8. Corner sets far outside the source ask for
/// rasters the allocator cannot satisfy, and allocation failure aborts.
pub const MAX_OUTPUT_PIXELS: u64 = 1 << 28;

/// `InvalidDimensions` unless `width x height` is non-empty and within `MAX_OUTPUT_PIXELS`.
pub fn check_output_size(width: u64, height: u64) -> Result<()> {
    if width == 0 || height == 0 || width.saturating_mul(height) > MAX_OUTPUT_PIXELS {
        return Err(ScanError::InvalidDimensions {
            width: width.min(i64::MAX as u64) as i64,
            height: height.min(i64::MAX as u64) as i64,
        });
    }
    Ok(())
}

/// 3x3 projective transform mapping source coordinates to destination coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PerspectiveTransform {
    m: Matrix3<f64>,
}

impl PerspectiveTransform {
    pub fn new(m: Matrix3<f64>) -> Self {
        Self { m }
    }

    pub fn matrix(&self) -> &Matrix3<f64> {
        &self.m
    }

    pub fn to_array(&self) -> [[f64; 3]; 3] {
        let m = &self.m;
        [
            [m[(0, 0)], m[(0, 1)], m[(0, 2)]],
            [m[(1, 0)], m[(1, 1)], m[(1, 2)]],
            [m[(2, 0)], m[(2, 1)], m[(2, 2)]],
        ]
    }

    /// Map a point; `None` when it lands on the line at infinity.
    pub fn apply(&self, p: Point2D) -> Option<Point2D> {
        let v = self.m * Vector3::new(p.x, p.y, 1.0);
        if v[2].abs() < 1e-12 {
            return None;
        }
        Some(Point2D::new(v[0] / v[2], v[1] / v[2]))
    }

    pub fn inverse(&self) -> Result<Self> {
        let inv = self
            .m
            .try_inverse()
            .ok_or(ScanError::DegenerateQuadrilateral)?;
        normalize_homography(inv).map(Self::new)
    }
}

/// Reject point sets where any three points are (numerically) collinear.
///
/// Four correspondences only pin down a projectivity when no three of them
/// lie on a line; this also catches coincident points.
pub fn ensure_general_position(pts: &[Point2D; 4]) -> Result<()> {
    let mut longest = 0.0f64;
    for i in 0..4 {
        for j in (i + 1)..4 {
            longest = longest.max(pts[i].distance(&pts[j]));
        }
    }
    let tol = 1e-9 * longest.powi(2).max(1.0);

    const TRIPLES: [(usize, usize, usize); 4] = [(0, 1, 2), (0, 1, 3), (0, 2, 3), (1, 2, 3)];
    for (a, b, c) in TRIPLES {
        let (p, q, r) = (pts[a], pts[b], pts[c]);
        let cross = (q.x - p.x) * (r.y - p.y) - (q.y - p.y) * (r.x - p.x);
        if cross.abs() <= tol {
            debug!("Points {a}, {b}, {c} are collinear (cross = {cross:.3e})");
            return Err(ScanError::DegenerateQuadrilateral);
        }
    }
    Ok(())
}

// Translate to the centroid and scale to mean distance sqrt(2)
fn normalization(pts: &[Point2D; 4]) -> ([Point2D; 4], Matrix3<f64>) {
    let cx = pts.iter().map(|p| p.x).sum::<f64>() / 4.0;
    let cy = pts.iter().map(|p| p.y).sum::<f64>() / 4.0;
    let mean_dist = pts
        .iter()
        .map(|p| (p.x - cx).hypot(p.y - cy))
        .sum::<f64>()
        / 4.0;
    let s = if mean_dist > 1e-12 {
        std::f64::consts::SQRT_2 / mean_dist
    } else {
        1.0
    };

    let t = Matrix3::new(s, 0.0, -s * cx, 0.0, s, -s * cy, 0.0, 0.0, 1.0);
    let out = pts.map(|p| Point2D::new(s * (p.x - cx), s * (p.y - cy)));
    (out, t)
}

/// Fix the free scale of a homography.
///
/// h33 is the homogeneous weight of the origin and is exactly zero when the
/// vanishing line passes through it, which strongly foreshortened pages do.
/// Divide by h33 only when it carries weight; otherwise fall back to the
/// Frobenius norm. Both leave the mapped points unchanged.
fn normalize_homography(h: Matrix3<f64>) -> Result<Matrix3<f64>> {
    let norm = h.norm();
    if !norm.is_finite() || norm < 1e-300 {
        return Err(ScanError::DegenerateQuadrilateral);
    }
    let s = h[(2, 2)];
    if s.abs() > 1e-9 * norm {
        Ok(h / s)
    } else {
        debug!("h33 = {s:.3e} vanishes, normalizing by the Frobenius norm");
        Ok(h / norm)
    }
}

/// Solve the projectivity taking each `src[i]` onto `dst[i]`.
///
/// Eight unknowns with h33 = 1 in centroid-normalized coordinates, two
/// equations per correspondence. The centroid of a valid quadrilateral never
/// maps to infinity, so that h33 cannot vanish; the pixel-space matrix is then
/// rescaled by `normalize_homography`.
pub fn get_perspective_transform(
    src: &[Point2D; 4],
    dst: &[Point2D; 4],
) -> Result<PerspectiveTransform> {
    ensure_general_position(src)?;
    ensure_general_position(dst)?;

    let (src_n, t_src) = normalization(src);
    let (dst_n, t_dst) = normalization(dst);

    let mut a = DMatrix::<f64>::zeros(8, 8);
    let mut b = DMatrix::<f64>::zeros(8, 1);

    for i in 0..4 {
        let x = src_n[i].x;
        let y = src_n[i].y;
        let u = dst_n[i].x;
        let v = dst_n[i].y;

        // Row for u (x') coordinate
        a[(i, 0)] = x;
        a[(i, 1)] = y;
        a[(i, 2)] = 1.0;
        a[(i, 6)] = -u * x;
        a[(i, 7)] = -u * y;
        b[(i, 0)] = u;

        // Row for v (y') coordinate
        a[(i + 4, 3)] = x;
        a[(i + 4, 4)] = y;
        a[(i + 4, 5)] = 1.0;
        a[(i + 4, 6)] = -v * x;
        a[(i + 4, 7)] = -v * y;
        b[(i + 4, 0)] = v;
    }

    let sol = a
        .clone()
        .lu()
        .solve(&b)
        .ok_or(ScanError::DegenerateQuadrilateral)?;
    let residual = (&a * &sol - &b).norm();
    if !residual.is_finite() || residual > 1e-8 {
        debug!("Perspective system residual too large: {residual:.3e}");
        return Err(ScanError::DegenerateQuadrilateral);
    }

    let hn = Matrix3::new(
        sol[(0, 0)], sol[(1, 0)], sol[(2, 0)], //
        sol[(3, 0)], sol[(4, 0)], sol[(5, 0)], //
        sol[(6, 0)], sol[(7, 0)], 1.0,
    );

    // H = T_dst^-1 * Hn * T_src
    let t_dst_inv = t_dst
        .try_inverse()
        .ok_or(ScanError::DegenerateQuadrilateral)?;
    let h = normalize_homography(t_dst_inv * hn * t_src)?;
    Ok(PerspectiveTransform::new(h))
}

/// Bilinear sample at a fractional source position.
///
/// Neighbours are clamped to the image (replicated border) for positions
/// within one pixel of it; anything further out is `None`.
fn sample_bilinear<P>(src: &ImageBuffer<P, Vec<u8>>, x: f64, y: f64) -> Option<[f64; 4]>
where
    P: Pixel<Subpixel = u8>,
{
    let (w, h) = src.dimensions();
    if w == 0 || h == 0 || !x.is_finite() || !y.is_finite() {
        return None;
    }
    if x < -1.0 || y < -1.0 || x > w as f64 || y > h as f64 {
        return None;
    }

    let x0f = x.floor();
    let y0f = y.floor();
    let fx = x - x0f;
    let fy = y - y0f;

    let max_x = w as i64 - 1;
    let max_y = h as i64 - 1;
    let x0 = (x0f as i64).clamp(0, max_x) as u32;
    let x1 = (x0f as i64 + 1).clamp(0, max_x) as u32;
    let y0 = (y0f as i64).clamp(0, max_y) as u32;
    let y1 = (y0f as i64 + 1).clamp(0, max_y) as u32;

    let p00 = src.get_pixel(x0, y0).channels();
    let p10 = src.get_pixel(x1, y0).channels();
    let p01 = src.get_pixel(x0, y1).channels();
    let p11 = src.get_pixel(x1, y1).channels();

    let mut out = [0.0f64; 4];
    for c in 0..(P::CHANNEL_COUNT as usize) {
        out[c] = (1.0 - fx) * (1.0 - fy) * p00[c] as f64
            + fx * (1.0 - fy) * p10[c] as f64
            + (1.0 - fx) * fy * p01[c] as f64
            + fx * fy * p11[c] as f64;
    }
    Some(out)
}

fn warp_buffer<P>(
    src: &ImageBuffer<P, Vec<u8>>,
    m_inv: &Matrix3<f64>,
    dsize: Size,
) -> ImageBuffer<P, Vec<u8>>
where
    P: Pixel<Subpixel = u8>,
{
    let mut out_img: ImageBuffer<P, Vec<u8>> = ImageBuffer::new(dsize.width, dsize.height);
    let channels = P::CHANNEL_COUNT as usize;

    let (m00, m01, m02) = (m_inv[(0, 0)], m_inv[(0, 1)], m_inv[(0, 2)]);
    let (m10, m11, m12) = (m_inv[(1, 0)], m_inv[(1, 1)], m_inv[(1, 2)]);
    let (m20, m21, m22) = (m_inv[(2, 0)], m_inv[(2, 1)], m_inv[(2, 2)]);

    for y in 0..dsize.height {
        let y_f = y as f64;
        let m01y = m01 * y_f;
        let m11y = m11 * y_f;
        let m21y = m21 * y_f;

        for x in 0..dsize.width {
            let x_f = x as f64;
            let w = m20 * x_f + m21y + m22;
            if w.abs() < 1e-12 {
                continue;
            }
            let src_x = (m00 * x_f + m01y + m02) / w;
            let src_y = (m10 * x_f + m11y + m12) / w;

            if let Some(values) = sample_bilinear(src, src_x, src_y) {
                let px = out_img.get_pixel_mut(x, y).channels_mut();
                for c in 0..channels {
                    px[c] = values[c].round().clamp(0.0, 255.0) as u8;
                }
            }
        }
    }

    out_img
}

/// Resample `src` through `transform` into a new `dsize` image.
///
/// Every destination pixel is pulled back through the inverse transform and
/// sampled bilinearly. 8-bit layouts are preserved; deeper images are reduced
/// to 8-bit RGB or RGBA.
pub fn warp_perspective(
    src: &DynamicImage,
    transform: &PerspectiveTransform,
    dsize: Size,
) -> Result<DynamicImage> {
    check_output_size(dsize.width as u64, dsize.height as u64)?;

    let inv = transform.inverse()?;
    let m = inv.matrix();

    let out = match src {
        DynamicImage::ImageLuma8(buf) => DynamicImage::ImageLuma8(warp_buffer(buf, m, dsize)),
        DynamicImage::ImageLumaA8(buf) => DynamicImage::ImageLumaA8(warp_buffer(buf, m, dsize)),
        DynamicImage::ImageRgb8(buf) => DynamicImage::ImageRgb8(warp_buffer(buf, m, dsize)),
        DynamicImage::ImageRgba8(buf) => DynamicImage::ImageRgba8(warp_buffer(buf, m, dsize)),
        other if other.color().has_alpha() => {
            DynamicImage::ImageRgba8(warp_buffer(&other.to_rgba8(), m, dsize))
        }
        other => DynamicImage::ImageRgb8(warp_buffer(&other.to_rgb8(), m, dsize)),
    };
    Ok(out)
}
