use geo::MultiPolygon;
use tracing::debug;

use crate::error::{GeopError, Result};
use crate::grid::Grid;
use crate::trace::{BoundaryTracer, ChunkView};

use super::pool::CancellationToken;

/// One elevation interval. `[lower, upper)` unless it is the last band of its
/// partition, which is `[lower, upper]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Band {
    pub index: usize,
    pub lower: f64,
    pub upper: f64,
    pub last: bool,
}

impl Band {
    /// With `inclusive_upper` every band is closed, so a value on a shared
    /// edge belongs to both neighbors.
    pub fn contains(&self, value: f64, inclusive_upper: bool) -> bool {
        if inclusive_upper || self.last {
            self.lower <= value && value <= self.upper
        } else {
            self.lower <= value && value < self.upper
        }
    }

    pub fn width(&self) -> f64 {
        self.upper - self.lower
    }
}

/// Split `[min, max]` into `ceil((max - min) / width)` bands of equal width,
/// at least one.
pub fn partition_bands(min: f64, max: f64, width: f64) -> Result<Vec<Band>> {
    if !width.is_finite() || width <= 0.0 {
        return Err(GeopError::invalid_config(format!(
            "band width must be positive, got {}",
            width
        )));
    }
    if !min.is_finite() || !max.is_finite() || min > max {
        return Err(GeopError::invalid_config(format!(
            "invalid elevation range [{}, {}]",
            min, max
        )));
    }

    let runs = ((max - min) / width).ceil();
    if !runs.is_finite() || runs > u32::MAX as f64 {
        return Err(GeopError::invalid_config(format!(
            "band width {} is too small for range [{}, {}]",
            width, min, max
        )));
    }
    let mut count = (runs as usize).max(1);
    // Rounding can leave the top edge a hair under max.
    if min + count as f64 * width < max {
        count += 1;
    }

    let bands = (0..count)
        .map(|i| Band {
            index: i,
            lower: min + i as f64 * width,
            upper: min + (i + 1) as f64 * width,
            last: i + 1 == count,
        })
        .collect();
    Ok(bands)
}

/// Bands over the valid value range of `grid`; none when no cell is valid.
pub fn partition_grid(grid: &Grid, width: f64) -> Result<Vec<Band>> {
    match grid.min_max() {
        Some((min, max)) => partition_bands(min, max, width),
        None => {
            debug!("Grid has no valid cells, no bands to extract");
            Ok(Vec::new())
        }
    }
}

/// Trace `band` over `grid` in row chunks of `chunk_rows`, top to bottom.
///
/// Each chunk's mask is the cells inside the band that are valid. The token
/// is checked before every chunk, so a cancelled band stops after the chunk
/// in flight.
pub(crate) fn trace_band<T: BoundaryTracer + ?Sized>(
    grid: &Grid,
    band: &Band,
    chunk_rows: usize,
    inclusive_upper: bool,
    tracer: &T,
    cancel: &CancellationToken,
) -> Result<MultiPolygon<f64>> {
    let mut fragments = Vec::new();
    let cols = grid.cols();

    for chunk_start in (0..grid.rows()).step_by(chunk_rows.max(1)) {
        if cancel.is_cancelled() {
            return Err(GeopError::Cancelled(band.index));
        }
        let chunk_end = (chunk_start + chunk_rows).min(grid.rows());
        let (values, valid) = grid.rows_slice(chunk_start, chunk_end);

        let mask: Vec<bool> = values
            .iter()
            .zip(valid)
            .map(|(&v, &ok)| ok && band.contains(v, inclusive_upper))
            .collect();
        if !mask.contains(&true) {
            continue;
        }

        let classes = vec![0.0; mask.len()];
        let transform = grid.transform().shifted(chunk_start as f64, 0.0);
        let chunk = ChunkView::new(&classes, &mask, chunk_end - chunk_start, cols, transform)?;
        let traced = tracer.trace(&chunk)?;
        debug!(
            "Band {} rows {}..{}: {} fragments",
            band.index,
            chunk_start,
            chunk_end,
            traced.len()
        );
        fragments.extend(traced.into_iter().map(|t| t.polygon));
    }

    Ok(MultiPolygon::new(fragments))
}
