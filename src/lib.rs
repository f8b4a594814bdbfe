//! # docscan - Pure Rust Document Scanner
//!
//! Finds a sheet of paper in a photograph, flattens it with a four-point
//! perspective transform and binarizes it with a local adaptive threshold,
//! so the result looks like a scan.
//!
//! ## Pipeline
//!
//! 1. Detection: downscale to a working height, Canny edges, contour search,
//!    first contour among the largest that approximates to four vertices.
//! 2. Corner ordering: top-left, top-right, bottom-right, bottom-left by the
//!    sum/difference rule.
//! 3. Flattening: output size from the longer opposite edges, homography,
//!    bilinear resampling.
//! 4. Binarization: Gaussian (or mean) local threshold.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use docscan::{DocumentScanner, ScanConfig};
//!
//! let scanner = DocumentScanner::new(ScanConfig::default())?;
//! let out = scanner.run("receipt.jpg")?;
//!
//! println!("corners: {:?}", out.corners.to_tuples());
//! out.scanned.save("receipt_scanned.png")?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! The geometric core can be used on its own:
//!
//! ```rust,no_run
//! use docscan::{four_point_transform, imread, order_points, Point2D};
//!
//! let img = imread("photo.jpg")?;
//! let corners = order_points(&[
//!     Point2D::new(812.0, 1460.0),
//!     Point2D::new(95.0, 120.0),
//!     Point2D::new(870.0, 88.0),
//!     Point2D::new(60.0, 1502.0),
//! ])?;
//! let flat = four_point_transform(&img, &corners)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod binarize;
pub mod contours;
pub mod det;
pub mod error;
pub mod geometry;
pub mod image_impl;
pub mod postprocess;
pub mod preprocess;
pub mod scanner;
pub mod types;

use std::path::Path;

pub use crate::binarize::{threshold_local, Binarizer, LocalThreshold};
pub use crate::det::{DetOutput, DocumentDetector, QuadDetector};
pub use crate::error::{Result, ScanError};
pub use crate::geometry::{four_point_transform, order_points, output_size, Quadrilateral};
pub use crate::image_impl::{
    get_perspective_transform, imdecode, imread, imwrite, warp_perspective, PerspectiveTransform,
    Point2D, Size, MAX_OUTPUT_PIXELS,
};
pub use crate::postprocess::first_quadrilateral;
pub use crate::scanner::{BatchItem, DocumentScanner, ScanOutput, ScanSummary};
pub use crate::types::{BinarizeConfig, DetectConfig, ScanConfig, ThresholdMethod};

/// Scan one image file with the default configuration.
pub fn scan_document<P: AsRef<Path>>(image_path: P) -> Result<ScanOutput> {
    DocumentScanner::new(ScanConfig::default())?.run(image_path)
}
