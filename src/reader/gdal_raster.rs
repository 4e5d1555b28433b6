use std::path::{Path, PathBuf};

use gdal::Dataset;

use crate::error::{GeopError, Result};
use crate::reader::RasterSource;
use crate::transform::GeoTransform;
use crate::window::{RasterDescriptor, Window};

/// Band 1 of a GDAL-readable raster (GeoTIFF, VRT, `/vsis3/` paths, ...).
///
/// The dataset is opened per read, so one `GdalRaster` can be shared freely.
#[derive(Debug, Clone)]
pub struct GdalRaster {
    path: PathBuf,
    descriptor: RasterDescriptor,
}

impl GdalRaster {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let dataset = Dataset::open(&path)
            .map_err(|e| GeopError::raster_read(format!("{}: {}", path.display(), e)))?;

        let (width, height) = dataset.raster_size();
        let transform = GeoTransform::from_gdal(dataset.geo_transform()?);
        let band = dataset.rasterband(1)?;
        let descriptor =
            RasterDescriptor::new(width, height, transform).with_nodata(band.no_data_value());

        tracing::debug!(
            "Opened raster {:?}: {} x {} pixels, nodata {:?}",
            path,
            width,
            height,
            descriptor.nodata
        );

        Ok(Self { path, descriptor })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RasterSource for GdalRaster {
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
        let dataset = Dataset::open(&self.path)?;
        let band = dataset.rasterband(1)?;
        let size = (window.width(), window.height());
        let buffer = band.read_as::<f64>(
            (window.col_start as isize, window.row_start as isize),
            size,
            size,
            None,
        )?;
        let (_, values) = buffer.into_shape_and_vec();
        Ok(values)
    }
}
