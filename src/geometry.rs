//! Corner ordering and four-point perspective flattening.

use image::DynamicImage;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::{Result, ScanError};
use crate::image_impl::{
    self, check_output_size, ensure_general_position, get_perspective_transform,
    PerspectiveTransform, Point2D, Size,
};

/// Four corners in canonical order: top-left, top-right, bottom-right, bottom-left.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quadrilateral {
    corners: [Point2D; 4],
}

impl Quadrilateral {
    /// Wrap corners that are already in canonical order.
    pub fn new(corners: [Point2D; 4]) -> Self {
        Self { corners }
    }

    /// Build from a slice that must hold exactly four points, order kept as given.
    pub fn from_slice(points: &[Point2D]) -> Result<Self> {
        let corners: [Point2D; 4] = points.try_into().map_err(|_| {
            ScanError::InvalidInput(format!("expected 4 corner points, got {}", points.len()))
        })?;
        Ok(Self { corners })
    }

    pub fn corners(&self) -> &[Point2D; 4] {
        &self.corners
    }

    pub fn top_left(&self) -> Point2D {
        self.corners[0]
    }

    pub fn top_right(&self) -> Point2D {
        self.corners[1]
    }

    pub fn bottom_right(&self) -> Point2D {
        self.corners[2]
    }

    pub fn bottom_left(&self) -> Point2D {
        self.corners[3]
    }

    pub fn to_tuples(&self) -> [(f64, f64); 4] {
        self.corners.map(|p| (p.x, p.y))
    }

    /// Collinear triple or coincident corners; such a quadrilateral cannot be warped.
    pub fn is_degenerate(&self) -> bool {
        ensure_general_position(&self.corners).is_err()
    }
}

/// Rescale detector points from working-image to source-image coordinates.
pub fn scale_points<const N: usize>(points: &[Point2D; N], ratio: f64) -> [Point2D; N] {
    points.map(|p| p.scale(ratio))
}

/// Clamp every point into `[0, width-1] x [0, height-1]`.
pub fn clamp_points<const N: usize>(points: &[Point2D; N], width: u32, height: u32) -> [Point2D; N] {
    let max_x = width.saturating_sub(1) as f64;
    let max_y = height.saturating_sub(1) as f64;
    points.map(|p| Point2D::new(p.x.clamp(0.0, max_x), p.y.clamp(0.0, max_y)))
}

fn arg_extreme(values: &[f64; 4], better: impl Fn(f64, f64) -> bool) -> usize {
    // Strict comparison keeps the first occurrence on ties
    let mut best = 0;
    for i in 1..4 {
        if better(values[i], values[best]) {
            best = i;
        }
    }
    best
}

/// Assign four unordered points to the canonical corner roles.
///
/// Top-left has the smallest `x + y` and bottom-right the largest; top-right
/// has the smallest `y - x` and bottom-left the largest. Exact ties go to the
/// point that comes first in `points`, which can hand one point two roles;
/// the warp then rejects the result as degenerate.
///
/// The heuristic assumes the document is within roughly 45 degrees of axis
/// alignment. Beyond that corners are misassigned.
pub fn order_points(points: &[Point2D]) -> Result<Quadrilateral> {
    let pts: [Point2D; 4] = points.try_into().map_err(|_| {
        ScanError::InvalidInput(format!("expected 4 corner points, got {}", points.len()))
    })?;

    for i in 0..4 {
        for j in (i + 1)..4 {
            if pts[i] == pts[j] {
                return Err(ScanError::InvalidInput(format!(
                    "duplicate corner point ({}, {})",
                    pts[i].x, pts[i].y
                )));
            }
        }
    }

    let sums = pts.map(|p| p.x + p.y);
    let diffs = pts.map(|p| p.y - p.x);

    let tl = pts[arg_extreme(&sums, |a, b| a < b)];
    let br = pts[arg_extreme(&sums, |a, b| a > b)];
    let tr = pts[arg_extreme(&diffs, |a, b| a < b)];
    let bl = pts[arg_extreme(&diffs, |a, b| a > b)];

    Ok(Quadrilateral::new([tl, tr, br, bl]))
}

/// Output rectangle for a canonical quadrilateral: the longer of each pair of
/// opposite edges, rounded to whole pixels.
///
/// The destination corners are `(0,0) .. (W-1,H-1)`, so both sides must be at
/// least 2 pixels; a 1-pixel side would collapse the destination rectangle.
/// Rasters above `MAX_OUTPUT_PIXELS` are refused. Both cases are
/// `InvalidDimensions`.
pub fn output_size(corners: &Quadrilateral) -> Result<Size> {
    let [tl, tr, br, bl] = *corners.corners();

    let width_top = tl.distance(&tr);
    let width_bottom = bl.distance(&br);
    let height_left = tl.distance(&bl);
    let height_right = tr.distance(&br);

    let width = width_top.max(width_bottom).round();
    let height = height_left.max(height_right).round();

    let invalid = || ScanError::InvalidDimensions {
        width: if width.is_finite() { width as i64 } else { 0 },
        height: if height.is_finite() { height as i64 } else { 0 },
    };
    if !(width >= 2.0 && height >= 2.0) || width > u32::MAX as f64 || height > u32::MAX as f64 {
        return Err(invalid());
    }
    check_output_size(width as u64, height as u64).map_err(|_| invalid())?;
    Ok(Size::new(width as u32, height as u32))
}

/// Transform taking the corners onto `(0,0) (W-1,0) (W-1,H-1) (0,H-1)`, with `W x H`.
pub fn perspective_for(corners: &Quadrilateral) -> Result<(PerspectiveTransform, Size)> {
    if corners.is_degenerate() {
        return Err(ScanError::DegenerateQuadrilateral);
    }
    let size = output_size(corners)?;

    let w = (size.width - 1) as f64;
    let h = (size.height - 1) as f64;
    let dst = [
        Point2D::new(0.0, 0.0),
        Point2D::new(w, 0.0),
        Point2D::new(w, h),
        Point2D::new(0.0, h),
    ];

    let transform = get_perspective_transform(corners.corners(), &dst)?;
    Ok((transform, size))
}

/// Flatten the region bounded by `corners` (canonical order, source coordinates)
/// into a new image. The source is left untouched.
pub fn four_point_transform(image: &DynamicImage, corners: &Quadrilateral) -> Result<DynamicImage> {
    let (transform, size) = perspective_for(corners)?;
    debug!(
        "Warping {}x{} source into {}x{}",
        image.width(),
        image.height(),
        size.width,
        size.height
    );
    image_impl::warp_perspective(image, &transform, size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};

    fn p(x: f64, y: f64) -> Point2D {
        Point2D::new(x, y)
    }

    /// Linear gradient `x + 2y`, exact under bilinear interpolation.
    fn gradient(width: u32, height: u32) -> DynamicImage {
        let img = GrayImage::from_fn(width, height, |x, y| Luma([(x + 2 * y) as u8]));
        DynamicImage::ImageLuma8(img)
    }

    fn max_abs_diff(a: &GrayImage, b: &GrayImage, xs: std::ops::Range<u32>, ys: std::ops::Range<u32>) -> i32 {
        let mut worst = 0;
        for y in ys {
            for x in xs.clone() {
                let d = (a.get_pixel(x, y)[0] as i32 - b.get_pixel(x, y)[0] as i32).abs();
                worst = worst.max(d);
            }
        }
        worst
    }

    #[test]
    fn rectangle_order_is_permutation_invariant() {
        let rect = [p(0.0, 0.0), p(100.0, 0.0), p(100.0, 50.0), p(0.0, 50.0)];
        let expected = Quadrilateral::new(rect);

        for a in 0..4 {
            for b in 0..4 {
                for c in 0..4 {
                    for d in 0..4 {
                        let idx = [a, b, c, d];
                        let mut seen = [false; 4];
                        idx.iter().for_each(|&i| seen[i] = true);
                        if seen.iter().any(|s| !s) {
                            continue;
                        }
                        let input = idx.map(|i| rect[i]);
                        assert_eq!(order_points(&input).unwrap(), expected, "input {:?}", idx);
                    }
                }
            }
        }
    }

    #[test]
    fn scrambled_corners_are_reordered() {
        let q = order_points(&[p(100.0, 50.0), p(0.0, 0.0), p(100.0, 0.0), p(0.0, 50.0)]).unwrap();
        assert_eq!(
            q.corners(),
            &[p(0.0, 0.0), p(100.0, 0.0), p(100.0, 50.0), p(0.0, 50.0)]
        );
    }

    #[test]
    fn mildly_rotated_document_is_ordered() {
        // Roughly 10 degrees clockwise
        let tl = p(120.0, 80.0);
        let tr = p(415.0, 132.0);
        let br = p(368.0, 398.0);
        let bl = p(73.0, 346.0);
        let q = order_points(&[br, tl, bl, tr]).unwrap();
        assert_eq!(q.corners(), &[tl, tr, br, bl]);
    }

    #[test]
    fn wrong_point_count_is_invalid_input() {
        let three = [p(0.0, 0.0), p(1.0, 0.0), p(1.0, 1.0)];
        assert!(matches!(order_points(&three), Err(ScanError::InvalidInput(_))));

        let five = [p(0.0, 0.0), p(1.0, 0.0), p(1.0, 1.0), p(0.0, 1.0), p(0.5, 2.0)];
        assert!(matches!(order_points(&five), Err(ScanError::InvalidInput(_))));
        assert!(matches!(Quadrilateral::from_slice(&five), Err(ScanError::InvalidInput(_))));
    }

    #[test]
    fn duplicate_points_are_invalid_input() {
        let pts = [p(0.0, 0.0), p(1.0, 0.0), p(1.0, 0.0), p(0.0, 1.0)];
        assert!(matches!(order_points(&pts), Err(ScanError::InvalidInput(_))));
    }

    #[test]
    fn ties_resolve_to_first_occurrence() {
        // (0,5) and (5,0) share the minimal sum
        let a = p(0.0, 5.0);
        let b = p(5.0, 0.0);
        let br = p(10.0, 8.0);
        let bl = p(3.0, 12.0);

        let q = order_points(&[a, b, br, bl]).unwrap();
        assert_eq!(q.corners(), &[a, b, br, bl]);

        // Swapped input order: `b` wins top-left and also top-right
        let q = order_points(&[b, a, br, bl]).unwrap();
        assert_eq!(q.top_left(), b);
        assert_eq!(q.top_right(), b);
    }

    #[test]
    fn diamond_beyond_rotation_limit_is_rejected_by_warp() {
        let diamond = [p(50.0, 0.0), p(100.0, 50.0), p(50.0, 100.0), p(0.0, 50.0)];
        let q = order_points(&diamond).unwrap();
        assert_eq!(q.top_left(), q.top_right());

        let img = DynamicImage::new_luma8(101, 101);
        assert!(matches!(
            four_point_transform(&img, &q),
            Err(ScanError::DegenerateQuadrilateral)
        ));
    }

    #[test]
    fn output_size_takes_longer_edges() {
        let q = Quadrilateral::new([p(10.0, 10.0), p(90.0, 10.0), p(110.0, 70.0), p(0.0, 70.0)]);
        let size = output_size(&q).unwrap();
        // Bottom edge 110, left edge sqrt(100 + 3600) = 60.83
        assert_eq!(size, Size::new(110, 61));
    }

    #[test]
    fn output_size_rounds_to_nearest() {
        let q = Quadrilateral::new([p(0.0, 0.0), p(99.6, 0.0), p(99.6, 49.4), p(0.0, 49.4)]);
        assert_eq!(output_size(&q).unwrap(), Size::new(100, 49));
    }

    #[test]
    fn sub_pixel_quadrilateral_has_invalid_dimensions() {
        let q = Quadrilateral::new([p(0.0, 0.0), p(0.3, 0.0), p(0.3, 0.3), p(0.0, 0.3)]);
        let img = DynamicImage::new_luma8(4, 4);
        assert!(matches!(
            four_point_transform(&img, &q),
            Err(ScanError::InvalidDimensions { width: 0, height: 0 })
        ));
    }

    #[test]
    fn collinear_corners_are_degenerate() {
        let q = Quadrilateral::new([p(0.0, 0.0), p(50.0, 0.0), p(100.0, 0.0), p(0.0, 40.0)]);
        let img = DynamicImage::new_luma8(120, 60);
        assert!(matches!(
            four_point_transform(&img, &q),
            Err(ScanError::DegenerateQuadrilateral)
        ));
    }

    #[test]
    fn axis_aligned_rectangle_matches_source_crop() {
        let src = gradient(101, 51);
        let before = src.clone();
        let q = order_points(&[p(100.0, 50.0), p(0.0, 0.0), p(100.0, 0.0), p(0.0, 50.0)]).unwrap();

        let out = four_point_transform(&src, &q).unwrap();
        assert_eq!((out.width(), out.height()), (100, 50));
        assert_eq!(src, before);

        let out = out.to_luma8();
        let crop = src.crop_imm(0, 0, 100, 50).to_luma8();
        assert!(max_abs_diff(&out, &crop, 0..100, 0..50) <= 4);
    }

    #[test]
    fn full_extent_round_trip_reproduces_source() {
        let src = gradient(64, 48);
        let q = Quadrilateral::new([p(0.0, 0.0), p(63.0, 0.0), p(63.0, 47.0), p(0.0, 47.0)]);

        let out = four_point_transform(&src, &q).unwrap();
        assert_eq!((out.width(), out.height()), (63, 47));

        let out = out.to_luma8();
        let src = src.to_luma8();
        assert!(max_abs_diff(&out, &src, 0..63, 0..47) <= 4);
    }

    #[test]
    fn warp_then_inverse_warp_reproduces_source() {
        let src = gradient(80, 60);
        let q = Quadrilateral::new([p(10.0, 8.0), p(70.0, 12.0), p(66.0, 52.0), p(14.0, 48.0)]);

        let (transform, size) = perspective_for(&q).unwrap();
        assert_eq!(size, Size::new(60, 40));

        let flat = four_point_transform(&src, &q).unwrap();
        let back = image_impl::warp_perspective(&flat, &transform.inverse().unwrap(), Size::new(80, 60))
            .unwrap()
            .to_luma8();

        assert!(max_abs_diff(&back, &src.to_luma8(), 20..60, 18..42) <= 3);
    }

    #[test]
    fn rgba_output_keeps_channels() {
        let src = DynamicImage::new_rgba8(40, 30);
        let q = Quadrilateral::new([p(2.0, 2.0), p(37.0, 3.0), p(36.0, 27.0), p(3.0, 26.0)]);
        let out = four_point_transform(&src, &q).unwrap();
        assert!(out.as_rgba8().is_some());
    }

    #[test]
    fn scale_and_clamp_map_back_to_source() {
        let pts = [p(10.0, 10.0), p(250.0, 12.0), p(251.0, 499.0), p(-1.0, 480.0)];
        let scaled = clamp_points(&scale_points(&pts, 2.0), 500, 1000);
        assert_eq!(scaled[0], p(20.0, 20.0));
        assert_eq!(scaled[1], p(499.0, 24.0));
        assert_eq!(scaled[2], p(499.0, 998.0));
        assert_eq!(scaled[3], p(0.0, 960.0));
        assert_eq!(clamp_points(&[p(3.0, -2.0)], 0, 0), [p(0.0, 0.0)]);
    }

    #[test]
    fn strongly_foreshortened_trapezoid_is_flattened() {
        let pts = [p(100.0, 100.0), p(200.0, 100.0), p(250.0, 200.0), p(50.0, 200.0)];
        let q = order_points(&pts).unwrap();
        assert_eq!(q.corners(), &pts);

        let img = DynamicImage::new_luma8(300, 300);
        let out = four_point_transform(&img, &q).unwrap();
        // hypot(50, 100) = 111.8
        assert_eq!((out.width(), out.height()), (200, 112));

        let (transform, size) = perspective_for(&q).unwrap();
        assert_eq!(size, Size::new(200, 112));
        let mapped = transform.apply(p(250.0, 200.0)).unwrap();
        assert!((mapped.x - 199.0).abs() < 1e-6 && (mapped.y - 111.0).abs() < 1e-6);
    }

    #[test]
    fn one_pixel_wide_output_has_invalid_dimensions() {
        let q = Quadrilateral::new([p(10.0, 10.0), p(11.2, 10.0), p(11.2, 60.0), p(10.0, 60.0)]);
        assert!(!q.is_degenerate());
        let img = DynamicImage::new_luma8(100, 100);
        assert!(matches!(
            four_point_transform(&img, &q),
            Err(ScanError::InvalidDimensions { width: 1, height: 50 })
        ));
    }

    #[test]
    fn corners_far_outside_the_source_are_refused() {
        let q = Quadrilateral::new([p(0.0, 0.0), p(3e5, 0.0), p(3e5, 3e5), p(0.0, 3e5)]);
        let img = DynamicImage::new_luma8(10, 10);
        assert!(matches!(
            four_point_transform(&img, &q),
            Err(ScanError::InvalidDimensions {
                width: 300_000,
                height: 300_000
            })
        ));
    }

    #[test]
    fn degeneracy_is_reported_on_the_value() {
        let flat = Quadrilateral::new([p(0.0, 0.0), p(10.0, 0.0), p(20.0, 0.0), p(0.0, 5.0)]);
        let ok = Quadrilateral::new([p(0.0, 0.0), p(10.0, 0.0), p(10.0, 5.0), p(0.0, 5.0)]);
        assert!(flat.is_degenerate());
        assert!(!ok.is_degenerate());
    }
}
