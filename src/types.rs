use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, ScanError};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThresholdMethod {
    /// Gaussian-weighted local mean, sigma = (block_size - 1) / 6
    Gaussian,
    /// Unweighted box mean over the block
    Mean,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectConfig {
    /// Height of the downscaled image the contour search runs on
    pub working_height: u32,
    pub blur_sigma: f32,
    pub canny_low: f32,
    pub canny_high: f32,
    /// Polygon approximation tolerance as a fraction of the contour perimeter
    pub approx_epsilon: f64,
    /// Only the largest `max_candidates` contours are approximated
    pub max_candidates: usize,
    /// 3x3 dilation of the edge map; closes gaps but pushes the outer contour out by a pixel
    pub use_dilation: bool,
}

impl Default for DetectConfig {
    fn default() -> Self {
        Self {
            working_height: 500,
            // OpenCV derives this sigma for a 5x5 kernel
            blur_sigma: 1.1,
            canny_low: 75.0,
            canny_high: 200.0,
            approx_epsilon: 0.02,
            max_candidates: 5,
            use_dilation: false,
        }
    }
}

impl DetectConfig {
    pub fn validate(&self) -> Result<()> {
        if self.working_height == 0 {
            return Err(ScanError::InvalidConfig("working_height must be > 0".to_string()));
        }
        if !self.blur_sigma.is_finite() || self.blur_sigma <= 0.0 {
            return Err(ScanError::InvalidConfig(format!(
                "blur_sigma must be positive, got {}",
                self.blur_sigma
            )));
        }
        let thresholds_ok = self.canny_low.is_finite()
            && self.canny_high.is_finite()
            && self.canny_low >= 0.0
            && self.canny_low <= self.canny_high;
        if !thresholds_ok {
            return Err(ScanError::InvalidConfig(format!(
                "canny thresholds must satisfy 0 <= low <= high, got {} / {}",
                self.canny_low, self.canny_high
            )));
        }
        if !(self.approx_epsilon > 0.0 && self.approx_epsilon < 1.0) {
            return Err(ScanError::InvalidConfig(format!(
                "approx_epsilon must be in (0, 1), got {}",
                self.approx_epsilon
            )));
        }
        if self.max_candidates == 0 {
            return Err(ScanError::InvalidConfig("max_candidates must be >= 1".to_string()));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BinarizeConfig {
    /// Odd neighbourhood size of the local threshold
    pub block_size: u32,
    /// Subtracted from the local mean
    pub offset: f32,
    pub method: ThresholdMethod,
}

impl Default for BinarizeConfig {
    fn default() -> Self {
        Self {
            block_size: 11,
            offset: 10.0,
            method: ThresholdMethod::Gaussian,
        }
    }
}

impl BinarizeConfig {
    pub fn validate(&self) -> Result<()> {
        if self.block_size < 3 || self.block_size % 2 == 0 {
            return Err(ScanError::InvalidConfig(format!(
                "block_size must be odd and >= 3, got {}",
                self.block_size
            )));
        }
        if !self.offset.is_finite() {
            return Err(ScanError::InvalidConfig("offset must be finite".to_string()));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    pub detect: DetectConfig,
    pub binarize: BinarizeConfig,
}

impl ScanConfig {
    pub fn from_json_str(s: &str) -> Result<Self> {
        let cfg: ScanConfig = serde_json::from_str(s)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        self.detect.validate()?;
        self.binarize.validate()
    }
}
