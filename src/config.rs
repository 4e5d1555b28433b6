use crate::error::{GeopError, Result};

/// Half a foot in meters.
pub const DEFAULT_BAND_WIDTH: f64 = 0.1524;

/// Rows per chunk during band extraction. Larger chunks produce fewer
/// horizontal seams ("stripes") in a band's polygons but hold more cells in
/// memory per worker.
pub const DEFAULT_CHUNK_ROWS: usize = 1000;

/// How a polygon selects raster cells.
#[derive(Debug, Clone)]
pub struct MaskOptions {
    /// Include every cell the polygon touches, not only cells whose center
    /// it covers.
    pub all_touched: bool,
}

impl Default for MaskOptions {
    fn default() -> Self {
        Self { all_touched: true }
    }
}

/// Tunables of the elevation-band pipeline.
#[derive(Debug, Clone)]
pub struct ExtractionConfig {
    pub band_width: f64,
    pub chunk_rows: usize,
    /// Worker threads; `None` uses the available parallelism.
    pub workers: Option<usize>,
    /// Select cells with `lower <= v <= upper`, so a value on a shared band
    /// edge lands in both bands. Off by default: bands are half-open and the
    /// last band is closed.
    pub inclusive_upper: bool,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            band_width: DEFAULT_BAND_WIDTH,
            chunk_rows: DEFAULT_CHUNK_ROWS,
            workers: None,
            inclusive_upper: false,
        }
    }
}

impl ExtractionConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.band_width.is_finite() || self.band_width <= 0.0 {
            return Err(GeopError::invalid_config(format!(
                "band width must be positive, got {}",
                self.band_width
            )));
        }
        if self.chunk_rows == 0 {
            return Err(GeopError::invalid_config("chunk rows must be at least 1"));
        }
        if self.workers == Some(0) {
            return Err(GeopError::invalid_config("worker count must be at least 1"));
        }
        Ok(())
    }

    pub fn worker_count(&self) -> usize {
        self.workers.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = ExtractionConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.worker_count() >= 1);
        assert!(MaskOptions::default().all_touched);
    }

    #[test]
    fn test_rejects_bad_tunables() {
        let bad = [
            ExtractionConfig {
                band_width: 0.0,
                ..Default::default()
            },
            ExtractionConfig {
                band_width: f64::NAN,
                ..Default::default()
            },
            ExtractionConfig {
                chunk_rows: 0,
                ..Default::default()
            },
            ExtractionConfig {
                workers: Some(0),
                ..Default::default()
            },
        ];
        for config in bad {
            assert!(matches!(config.validate(), Err(GeopError::InvalidConfig(_))));
        }
    }
}
