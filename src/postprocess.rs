use image::GrayImage;
use log::debug;

use crate::contours::{find_contours, Contour};
use crate::error::{Result, ScanError};
use crate::image_impl::Point2D;
use crate::types::DetectConfig;

/// Picks the document outline out of an edge map.
pub struct QuadPostProcess {
    pub max_candidates: usize,
    /// Approximation tolerance as a fraction of each contour's perimeter
    pub approx_epsilon: f64,
}

impl QuadPostProcess {
    pub fn new(cfg: &DetectConfig) -> Self {
        Self {
            max_candidates: cfg.max_candidates,
            approx_epsilon: cfg.approx_epsilon,
        }
    }

    /// Four corners, in contour order, of the largest contour that
    /// approximates to a quadrilateral. Coordinates are in edge-map space.
    pub fn process(&self, edges: &GrayImage) -> Result<[Point2D; 4]> {
        let mut contours = find_contours(edges);
        debug!("Found {} contours", contours.len());

        // Largest first
        let mut ranked: Vec<(f64, Contour)> = contours
            .drain(..)
            .map(|c| (c.area(), c))
            .collect();
        ranked.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

        let polygons: Vec<Vec<Point2D>> = ranked
            .iter()
            .take(self.max_candidates)
            .map(|(_, c)| c.approx_poly(self.approx_epsilon * c.perimeter()))
            .collect();

        first_quadrilateral(&polygons)
    }
}

/// First polygon with exactly four vertices.
pub fn first_quadrilateral(polygons: &[Vec<Point2D>]) -> Result<[Point2D; 4]> {
    for (i, poly) in polygons.iter().enumerate() {
        if let Ok(corners) = <[Point2D; 4]>::try_from(poly.as_slice()) {
            debug!("Candidate {} approximates to a quadrilateral", i);
            return Ok(corners);
        }
        debug!("Candidate {} has {} vertices, skipped", i, poly.len());
    }
    Err(ScanError::NoDocumentFound {
        candidates: polygons.len(),
    })
}
