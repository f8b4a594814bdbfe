// Contour extraction and polygon approximation on top of imageproc.
// Behaves like OpenCV's findContours with RETR_LIST followed by approxPolyDP.

use image::GrayImage;
use imageproc::contours::{self as ip_contours, BorderType};

use crate::image_impl::Point2D;

#[derive(Debug, Clone, PartialEq)]
pub struct Contour {
    pub points: Vec<Point2D>,
    pub is_hole: bool,
}

impl Contour {
    pub fn new(points: Vec<Point2D>) -> Self {
        Self {
            points,
            is_hole: false,
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Enclosed area of the closed point chain (shoelace)
    pub fn area(&self) -> f64 {
        polygon_area(&self.points)
    }

    /// Length of the closed chain, last point joined back to the first
    pub fn perimeter(&self) -> f64 {
        closed_perimeter(&self.points)
    }

    /// Closed Douglas-Peucker approximation with absolute tolerance `epsilon`.
    pub fn approx_poly(&self, epsilon: f64) -> Vec<Point2D> {
        approx_poly_dp_closed(&self.points, epsilon)
    }
}

/// Find every border in a binary image, outer borders and holes alike.
/// Any non-zero pixel counts as foreground.
pub fn find_contours(binary_img: &GrayImage) -> Vec<Contour> {
    ip_contours::find_contours::<i32>(binary_img)
        .into_iter()
        .filter(|c| !c.points.is_empty())
        .map(|c| Contour {
            points: c
                .points
                .iter()
                .map(|p| Point2D::new(p.x as f64, p.y as f64))
                .collect(),
            is_hole: c.border_type == BorderType::Hole,
        })
        .collect()
}

pub fn polygon_area(points: &[Point2D]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }
    let n = points.len();
    let mut twice = 0.0;
    for i in 0..n {
        let j = (i + 1) % n;
        twice += points[i].x * points[j].y - points[j].x * points[i].y;
    }
    twice.abs() * 0.5
}

pub fn closed_perimeter(points: &[Point2D]) -> f64 {
    if points.len() < 2 {
        return 0.0;
    }
    let n = points.len();
    (0..n).map(|i| points[i].distance(&points[(i + 1) % n])).sum()
}

fn distance_to_segment(p: &Point2D, a: &Point2D, b: &Point2D) -> f64 {
    let dx = b.x - a.x;
    let dy = b.y - a.y;
    let len_sq = dx * dx + dy * dy;
    if len_sq <= f64::EPSILON {
        return p.distance(a);
    }
    ((p.x - a.x) * dy - (p.y - a.y) * dx).abs() / len_sq.sqrt()
}

/// Open-chain Douglas-Peucker. Endpoints are always kept.
fn approx_poly_dp_open(points: &[Point2D], epsilon: f64) -> Vec<Point2D> {
    let n = points.len();
    if n <= 2 {
        return points.to_vec();
    }

    let mut keep = vec![false; n];
    keep[0] = true;
    keep[n - 1] = true;

    let mut stack = vec![(0usize, n - 1)];
    while let Some((start, end)) = stack.pop() {
        if end <= start + 1 {
            continue;
        }
        let mut max_dist = 0.0;
        let mut index = start;
        for i in (start + 1)..end {
            let d = distance_to_segment(&points[i], &points[start], &points[end]);
            if d > max_dist {
                max_dist = d;
                index = i;
            }
        }
        if max_dist > epsilon {
            keep[index] = true;
            stack.push((start, index));
            stack.push((index, end));
        }
    }

    points
        .iter()
        .zip(keep)
        .filter_map(|(p, k)| k.then_some(*p))
        .collect()
}

/// Closed-chain Douglas-Peucker.
///
/// The chain is split at its first point and the point farthest from it, each
/// half is simplified as an open chain, and the halves are rejoined.
pub fn approx_poly_dp_closed(points: &[Point2D], epsilon: f64) -> Vec<Point2D> {
    let n = points.len();
    if n < 3 {
        return points.to_vec();
    }

    let first = points[0];
    let mut far = 0;
    let mut far_dist = 0.0;
    for (i, p) in points.iter().enumerate().skip(1) {
        let d = first.distance(p);
        if d > far_dist {
            far_dist = d;
            far = i;
        }
    }
    if far == 0 {
        // every point coincides with the first
        return vec![first];
    }

    let head = approx_poly_dp_open(&points[..=far], epsilon);
    let mut tail_chain: Vec<Point2D> = points[far..].to_vec();
    tail_chain.push(first);
    let tail = approx_poly_dp_open(&tail_chain, epsilon);

    let mut result = Vec::with_capacity(head.len() + tail.len());
    result.extend_from_slice(&head[..head.len() - 1]);
    result.extend_from_slice(&tail[..tail.len() - 1]);
    result
}
