use image::{DynamicImage, GrayImage};
use imageproc::distance_transform::Norm;
use imageproc::edges::canny;
use imageproc::filter::gaussian_blur_f32;
use imageproc::morphology::dilate;
use log::debug;

use crate::error::Result;
use crate::image_impl;
use crate::types::DetectConfig;

/// Edge map of the working image plus the factor back to source coordinates.
pub struct EdgeMap {
    pub edges: GrayImage,
    /// source height / working height
    pub ratio: f64,
}

pub struct EdgePreProcess {
    pub working_height: u32,
    pub blur_sigma: f32,
    pub canny_low: f32,
    pub canny_high: f32,
    pub use_dilation: bool,
}

impl EdgePreProcess {
    pub fn new(cfg: &DetectConfig) -> Self {
        Self {
            working_height: cfg.working_height,
            blur_sigma: cfg.blur_sigma,
            canny_low: cfg.canny_low,
            canny_high: cfg.canny_high,
            use_dilation: cfg.use_dilation,
        }
    }

    pub fn run(&self, img: &DynamicImage) -> Result<EdgeMap> {
        let (resized, ratio) = image_impl::resize_to_height(img, self.working_height)?;
        let gray = resized.to_luma8();
        let blurred = gaussian_blur_f32(&gray, self.blur_sigma);
        let mut edges = canny(&blurred, self.canny_low, self.canny_high);

        // 3x3 dilation closes one-pixel gaps in the document outline
        if self.use_dilation {
            edges = dilate(&edges, Norm::LInf, 1);
        }

        debug!(
            "Edge map {}x{} (ratio {:.4})",
            edges.width(),
            edges.height(),
            ratio
        );
        Ok(EdgeMap { edges, ratio })
    }
}
