use std::time::Instant;

use image::{DynamicImage, GenericImageView};
use log::debug;

use crate::error::Result;
use crate::geometry::{clamp_points, scale_points};
use crate::image_impl::Point2D;
use crate::postprocess::QuadPostProcess;
use crate::preprocess::EdgePreProcess;
use crate::types::DetectConfig;

#[derive(Debug, Clone)]
pub struct DetOutput {
    /// Candidate corners in source-image coordinates, not yet ordered
    pub points: [Point2D; 4],
    /// Factor applied to go from working to source coordinates
    pub ratio: f64,
    pub elapse: f64,
}

/// Locates the document outline in an image.
///
/// Implementations return four corner points in the coordinate space of the
/// image they were given, or `ScanError::NoDocumentFound`.
pub trait QuadDetector: Send + Sync {
    fn detect(&self, img: &DynamicImage) -> Result<DetOutput>;
}

/// Downscale, edge detection, contour search.
pub struct DocumentDetector {
    pub cfg: DetectConfig,
    pub preprocess: EdgePreProcess,
    pub postprocess: QuadPostProcess,
}

impl DocumentDetector {
    pub fn new(cfg: DetectConfig) -> Result<Self> {
        cfg.validate()?;
        let preprocess = EdgePreProcess::new(&cfg);
        let postprocess = QuadPostProcess::new(&cfg);
        Ok(Self {
            cfg,
            preprocess,
            postprocess,
        })
    }
}

impl QuadDetector for DocumentDetector {
    fn detect(&self, img: &DynamicImage) -> Result<DetOutput> {
        let start = Instant::now();
        let (ori_w, ori_h) = img.dimensions();

        let edge_map = self.preprocess.run(img)?;
        let found = self.postprocess.process(&edge_map.edges)?;

        let points = clamp_points(&scale_points(&found, edge_map.ratio), ori_w, ori_h);

        let elapse = start.elapsed().as_secs_f64();
        debug!("Detected corners {:?} in {:.3}s", points, elapse);

        Ok(DetOutput {
            points,
            ratio: edge_map.ratio,
            elapse,
        })
    }
}
