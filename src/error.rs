//! Error types for raster analysis.

use thiserror::Error;

/// Broad classification of a [`GeopError`], used by request layers to shape
/// error responses without exposing internal detail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// User-correctable input: bad geometry, unknown statistic, out-of-extent request.
    Input,
    /// Raster, file or worker failure of a specific operation.
    Io,
    /// Programmer error such as mismatched grid shapes.
    Invariant,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Input => "input",
            ErrorKind::Io => "io",
            ErrorKind::Invariant => "invariant",
        }
    }
}

/// Errors that can occur while masking, aggregating or vectorizing rasters.
#[derive(Error, Debug)]
pub enum GeopError {
    /// The geometry is missing, empty or of an unsupported type.
    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),

    /// A statistic token outside the supported set.
    #[error("{0} has not been implemented")]
    UnsupportedStatistic(String),

    /// The requested region lies entirely outside the raster.
    #[error("requested region {requested} is outside raster extent {raster}")]
    OutOfBounds { requested: String, raster: String },

    /// Invalid tunable or argument combination.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The affine transform cannot be inverted.
    #[error("degenerate transform: {0}")]
    InvalidTransform(String),

    /// The operation needs at least one valid cell.
    #[error("no valid cells in grid")]
    EmptyGrid,

    /// Failed to read raster data.
    #[error("failed to read raster: {0}")]
    RasterRead(String),

    /// The boundary tracer failed on a chunk.
    #[error("failed to trace boundaries: {0}")]
    Trace(String),

    /// The output sink rejected a band.
    #[error("failed to persist band {band}: {message}")]
    Persist { band: usize, message: String },

    /// Filesystem error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Band processing stopped by a cancellation request.
    #[error("band {0} was cancelled")]
    Cancelled(usize),

    /// Band processing panicked inside a worker.
    #[error("worker panicked: {0}")]
    WorkerPanic(String),

    /// Grids that must be aligned have different shapes.
    #[error("grid shape mismatch: expected {expected:?}, found {found:?}")]
    ShapeMismatch {
        expected: (usize, usize),
        found: (usize, usize),
    },
}

impl GeopError {
    pub fn invalid_geometry(msg: impl Into<String>) -> Self {
        Self::InvalidGeometry(msg.into())
    }

    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    pub fn raster_read(msg: impl Into<String>) -> Self {
        Self::RasterRead(msg.into())
    }

    pub fn out_of_bounds(requested: impl Into<String>, raster: impl Into<String>) -> Self {
        Self::OutOfBounds {
            requested: requested.into(),
            raster: raster.into(),
        }
    }

    pub fn persist(band: usize, msg: impl Into<String>) -> Self {
        Self::Persist {
            band,
            message: msg.into(),
        }
    }

    /// Classify this error for the request boundary.
    pub fn kind(&self) -> ErrorKind {
        match self {
            GeopError::InvalidGeometry(_)
            | GeopError::UnsupportedStatistic(_)
            | GeopError::OutOfBounds { .. }
            | GeopError::InvalidConfig(_)
            | GeopError::InvalidTransform(_)
            | GeopError::EmptyGrid => ErrorKind::Input,
            GeopError::RasterRead(_)
            | GeopError::Trace(_)
            | GeopError::Persist { .. }
            | GeopError::Io(_)
            | GeopError::Cancelled(_)
            | GeopError::WorkerPanic(_) => ErrorKind::Io,
            GeopError::ShapeMismatch { .. } => ErrorKind::Invariant,
        }
    }
}

impl From<geojson::Error> for GeopError {
    fn from(err: geojson::Error) -> Self {
        Self::InvalidGeometry(err.to_string())
    }
}

#[cfg(feature = "gdal")]
impl From<gdal::errors::GdalError> for GeopError {
    fn from(err: gdal::errors::GdalError) -> Self {
        Self::RasterRead(err.to_string())
    }
}

/// Result type for raster analysis operations.
pub type Result<T> = std::result::Result<T, GeopError>;
