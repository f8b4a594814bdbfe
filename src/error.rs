//! Error types for the docscan library

/// Result type alias for scan operations
pub type Result<T> = std::result::Result<T, ScanError>;

#[derive(thiserror::Error, Debug)]
pub enum ScanError {
    /// No 4-vertex contour among the ranked candidates
    #[error("No document contour found ({candidates} candidates examined)")]
    NoDocumentFound { candidates: usize },

    /// Corner set violates the 4-point contract
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Corners collinear or coincident, transform system singular
    #[error("Degenerate quadrilateral: corners do not span a plane")]
    DegenerateQuadrilateral,

    #[error("Invalid output dimensions {width}x{height}")]
    InvalidDimensions { width: i64, height: i64 },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config parse error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ScanError {
    /// True for the deterministic geometric failures of a single image.
    ///
    /// Batch callers skip these and move on; retrying needs different input
    /// or different parameters.
    pub fn is_geometric(&self) -> bool {
        matches!(
            self,
            ScanError::NoDocumentFound { .. }
                | ScanError::DegenerateQuadrilateral
                | ScanError::InvalidDimensions { .. }
        )
    }
}
