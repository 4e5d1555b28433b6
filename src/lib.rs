//! Polygon-clipped raster analysis.
//!
//! A polygon selects a window of a raster; the window is read, masked to the
//! polygon and to valid data, and handed to one of the operators: cell
//! counts, summary statistics, weighted overlay, reclassification, pair
//! co-occurrence, or elevation-band vectorization on a worker pool.

pub mod aggregate;
pub mod config;
pub mod elevation;
pub mod error;
pub mod geometry;
pub mod grid;
pub mod mask;
pub mod pairs;
pub mod rasterize;
pub mod reader;
#[cfg(feature = "gdal")]
pub mod reproject;
pub mod sink;
pub mod trace;
pub mod transform;
pub mod window;

pub use aggregate::{
    count, extract_value_regions, reclassify, statistic_by_name, statistics, weighted_overlay,
    CellCount, Statistic, Substitution, Target,
};
pub use config::{ExtractionConfig, MaskOptions};
pub use elevation::{
    partition_bands, partition_grid, run_elevation_extraction, Band, BandOutcome, BandStatus,
    CancellationToken, ElevationExtractor, ExtractionReport,
};
pub use error::{ErrorKind, GeopError, Result};
pub use geometry::parse_geojson;
pub use grid::Grid;
pub use mask::{build_masked_grid, Modification};
pub use pairs::{count_pairs, PairCount, PairCounts};
pub use reader::{sample_at_point, MemoryRaster, RasterSource};
#[cfg(feature = "gdal")]
pub use reader::GdalRaster;
pub use sink::{ChannelSink, GeoJsonDirSink, MemorySink, OutputSink};
pub use trace::{BoundaryTracer, ChunkView, RegionTracer, TracedPolygon};
pub use transform::GeoTransform;
pub use window::{compute_window_and_transform, RasterDescriptor, Window};
