//! Raster sources.
//!
//! The engine only needs two things from a raster: its descriptor (size,
//! transform, nodata) and the cells of a window. [`MemoryRaster`] serves
//! both from memory; `GdalRaster` (feature `gdal`) reads files through GDAL.

#[cfg(feature = "gdal")]
mod gdal_raster;

#[cfg(feature = "gdal")]
pub use self::gdal_raster::GdalRaster;

use crate::error::{GeopError, Result};
use crate::transform::GeoTransform;
use crate::window::{RasterDescriptor, Window};

/// A single-band raster that can be read window by window.
pub trait RasterSource {
    fn descriptor(&self) -> &RasterDescriptor;

    /// Row-major cell values of `window`. Fails with `RasterRead` when the
    /// window does not fit the raster.
    fn read_window(&self, window: &Window) -> Result<Vec<f64>>;
}

/// A raster held entirely in memory.
#[derive(Debug, Clone)]
pub struct MemoryRaster {
    descriptor: RasterDescriptor,
    values: Vec<f64>,
}

impl MemoryRaster {
    pub fn new(width: usize, height: usize, transform: GeoTransform, values: Vec<f64>) -> Result<Self> {
        if values.len() != width * height {
            return Err(GeopError::ShapeMismatch {
                expected: (height, width),
                found: (values.len() / width.max(1), width),
            });
        }
        Ok(Self {
            descriptor: RasterDescriptor::new(width, height, transform),
            values,
        })
    }

    pub fn with_nodata(mut self, nodata: f64) -> Self {
        self.descriptor.nodata = Some(nodata);
        self
    }
}

impl RasterSource for MemoryRaster {
    fn descriptor(&self) -> &RasterDescriptor {
        &self.descriptor
    }

    fn read_window(&self, window: &Window) -> Result<Vec<f64>> {
        if !window.fits(&self.descriptor) {
            return Err(GeopError::raster_read(format!(
                "window {:?} exceeds raster {}x{}",
                window, self.descriptor.height, self.descriptor.width
            )));
        }
        let width = self.descriptor.width;
        let mut out = Vec::with_capacity(window.height() * window.width());
        for row in window.row_start..window.row_end {
            let offset = row * width;
            out.extend_from_slice(&self.values[offset + window.col_start..offset + window.col_end]);
        }
        Ok(out)
    }
}

/// Value of the cell containing the world coordinate `(x, y)`.
pub fn sample_at_point<S: RasterSource + ?Sized>(source: &S, x: f64, y: f64) -> Result<f64> {
    let desc = source.descriptor();
    let (row, col) = desc.transform.index(x, y)?;
    if row < 0 || col < 0 || row as usize >= desc.height || col as usize >= desc.width {
        return Err(GeopError::out_of_bounds(
            format!("point ({}, {})", x, y),
            format!("{}x{}", desc.height, desc.width),
        ));
    }
    let (row, col) = (row as usize, col as usize);
    let window = Window::new((row, row + 1), (col, col + 1))?;
    let values = source.read_window(&window)?;
    values
        .first()
        .copied()
        .ok_or_else(|| GeopError::raster_read("empty read for single cell"))
}
