//! Polygon-masked grids.

use geo::MultiPolygon;
use tracing::debug;

use crate::config::MaskOptions;
use crate::error::Result;
use crate::grid::Grid;
use crate::rasterize::rasterize;
use crate::reader::RasterSource;
use crate::window::compute_window_and_transform;

/// Overwrite raster values under `geometry` with `new_value`.
#[derive(Debug, Clone)]
pub struct Modification {
    pub geometry: MultiPolygon<f64>,
    pub new_value: f64,
}

impl Modification {
    pub fn new(geometry: MultiPolygon<f64>, new_value: f64) -> Self {
        Self {
            geometry,
            new_value,
        }
    }
}

/// Read the window of `source` under `geometry` and mask every cell outside
/// the polygon or equal to the raster's nodata value.
///
/// Modifications are rasterized onto the same window with the same inclusion
/// rule and applied in order, so a later modification overwrites an earlier
/// one where they overlap. They change values only, never validity.
pub fn build_masked_grid<S: RasterSource + ?Sized>(
    geometry: &MultiPolygon<f64>,
    source: &S,
    modifications: &[Modification],
    options: &MaskOptions,
) -> Result<Grid> {
    let descriptor = source.descriptor();
    let (window, transform) = compute_window_and_transform(geometry, descriptor)?;
    let (rows, cols) = window.shape();

    let mut values = source.read_window(&window)?;
    let inside = rasterize(geometry, rows, cols, &transform, options.all_touched)?;
    let valid: Vec<bool> = inside
        .iter()
        .zip(&values)
        .map(|(&inside, &v)| inside && !descriptor.is_nodata(v))
        .collect();

    for modification in modifications {
        let touched = rasterize(
            &modification.geometry,
            rows,
            cols,
            &transform,
            options.all_touched,
        )?;
        for (value, hit) in values.iter_mut().zip(touched) {
            if hit {
                *value = modification.new_value;
            }
        }
    }

    debug!(
        "Masked window rows {}..{} cols {}..{} with {} modifications",
        window.row_start,
        window.row_end,
        window.col_start,
        window.col_end,
        modifications.len()
    );

    Grid::new(rows, cols, values, valid, transform)
}
