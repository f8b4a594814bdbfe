use std::path::{Path, PathBuf};
use std::time::Instant;

use image::{DynamicImage, GenericImageView, GrayImage};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::binarize::{Binarizer, LocalThreshold};
use crate::det::{DocumentDetector, QuadDetector};
use crate::error::Result;
use crate::geometry::{four_point_transform, order_points, Quadrilateral};
use crate::image_impl::{imdecode, imread, Size};
use crate::types::ScanConfig;

#[derive(Debug)]
pub struct ScanOutput {
    /// Canonical corners in source-image coordinates
    pub corners: Quadrilateral,
    pub source_size: Size,
    /// Perspective-corrected page, same pixel layout as the source
    pub warped: DynamicImage,
    /// Binarized page
    pub scanned: GrayImage,
    pub ratio: f64,
    pub elapse_det: f64,
    pub elapse_warp: f64,
    pub elapse_bin: f64,
}

/// Serializable digest of a scan, without pixel data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanSummary {
    pub corners: [(f64, f64); 4],
    pub source_width: u32,
    pub source_height: u32,
    pub output_width: u32,
    pub output_height: u32,
    pub ratio: f64,
    pub elapse_det: f64,
    pub elapse_warp: f64,
    pub elapse_bin: f64,
}

impl ScanOutput {
    pub fn summary(&self) -> ScanSummary {
        ScanSummary {
            corners: self.corners.to_tuples(),
            source_width: self.source_size.width,
            source_height: self.source_size.height,
            output_width: self.warped.width(),
            output_height: self.warped.height(),
            ratio: self.ratio,
            elapse_det: self.elapse_det,
            elapse_warp: self.elapse_warp,
            elapse_bin: self.elapse_bin,
        }
    }

    pub fn elapse(&self) -> f64 {
        self.elapse_det + self.elapse_warp + self.elapse_bin
    }
}

pub struct BatchItem {
    pub path: PathBuf,
    pub result: Result<ScanOutput>,
}

/// Detection, corner ordering, perspective flattening and binarization.
///
/// Holds no per-image state; one scanner can process any number of images.
pub struct DocumentScanner {
    pub config: ScanConfig,
    detector: Box<dyn QuadDetector>,
    binarizer: Box<dyn Binarizer>,
}

impl DocumentScanner {
    pub fn new(config: ScanConfig) -> Result<Self> {
        config.validate()?;
        let detector = DocumentDetector::new(config.detect.clone())?;
        let binarizer = LocalThreshold::new(&config.binarize)?;
        Ok(Self {
            config,
            detector: Box::new(detector),
            binarizer: Box::new(binarizer),
        })
    }

    pub fn with_detector(mut self, detector: Box<dyn QuadDetector>) -> Self {
        self.detector = detector;
        self
    }

    pub fn with_binarizer(mut self, binarizer: Box<dyn Binarizer>) -> Self {
        self.binarizer = binarizer;
        self
    }

    /// Scan an image file (convenience wrapper for run_on_image)
    pub fn run<P: AsRef<Path>>(&self, image_path: P) -> Result<ScanOutput> {
        let img = imread(image_path)?;
        self.run_on_image(&img)
    }

    pub fn run_on_bytes(&self, data: &[u8]) -> Result<ScanOutput> {
        let img = imdecode(data)?;
        self.run_on_image(&img)
    }

    pub fn run_on_image(&self, img: &DynamicImage) -> Result<ScanOutput> {
        let (ori_w, ori_h) = img.dimensions();

        let det = self.detector.detect(img)?;
        let corners = order_points(&det.points)?;
        debug!("Ordered corners {:?}", corners.to_tuples());

        let start = Instant::now();
        let warped = four_point_transform(img, &corners)?;
        let elapse_warp = start.elapsed().as_secs_f64();

        let start = Instant::now();
        let scanned = self.binarizer.binarize(&warped.to_luma8())?;
        let elapse_bin = start.elapsed().as_secs_f64();

        info!(
            "Scanned {}x{} -> {}x{} (det {:.3}s, warp {:.3}s, bin {:.3}s)",
            ori_w,
            ori_h,
            warped.width(),
            warped.height(),
            det.elapse,
            elapse_warp,
            elapse_bin
        );

        Ok(ScanOutput {
            corners,
            source_size: Size::new(ori_w, ori_h),
            warped,
            scanned,
            ratio: det.ratio,
            elapse_det: det.elapse,
            elapse_warp,
            elapse_bin,
        })
    }

    /// Scan every path in order. A failing image is logged and reported in
    /// its `BatchItem`; the remaining images are still processed.
    pub fn scan_batch<P: AsRef<Path>>(&self, paths: &[P]) -> Vec<BatchItem> {
        paths
            .iter()
            .map(|p| {
                let path = p.as_ref().to_path_buf();
                let result = self.run(&path);
                if let Err(e) = &result {
                    warn!("{}: {}", path.display(), e);
                }
                BatchItem { path, result }
            })
            .collect()
    }
}
