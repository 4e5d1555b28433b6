use crate::error::{GeopError, Result};
use crate::transform::GeoTransform;

/// A masked raster window: row-major cell values, a per-cell validity flag
/// and the transform of the window's upper-left pixel corner.
///
/// A grid is never mutated after construction; operators that change values
/// return a new grid. Workers share one through `Arc<Grid>`.
#[derive(Debug, Clone, PartialEq)]
pub struct Grid {
    rows: usize,
    cols: usize,
    values: Vec<f64>,
    valid: Vec<bool>,
    transform: GeoTransform,
}

impl Grid {
    pub fn new(
        rows: usize,
        cols: usize,
        values: Vec<f64>,
        valid: Vec<bool>,
        transform: GeoTransform,
    ) -> Result<Self> {
        if values.len() != rows * cols {
            return Err(GeopError::ShapeMismatch {
                expected: (rows, cols),
                found: (values.len() / cols.max(1), cols),
            });
        }
        if valid.len() != values.len() {
            return Err(GeopError::ShapeMismatch {
                expected: (rows, cols),
                found: (valid.len() / cols.max(1), cols),
            });
        }
        if !transform.is_invertible() {
            return Err(GeopError::InvalidTransform(format!("{:?}", transform)));
        }
        Ok(Self {
            rows,
            cols,
            values,
            valid,
            transform,
        })
    }

    /// A grid where every cell is valid.
    pub fn from_values(
        rows: usize,
        cols: usize,
        values: Vec<f64>,
        transform: GeoTransform,
    ) -> Result<Self> {
        let valid = vec![true; values.len()];
        Self::new(rows, cols, values, valid, transform)
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    /// `(rows, cols)`
    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn transform(&self) -> &GeoTransform {
        &self.transform
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn validity(&self) -> &[bool] {
        &self.valid
    }

    /// Raw value regardless of validity.
    pub fn value(&self, row: usize, col: usize) -> f64 {
        self.values[row * self.cols + col]
    }

    pub fn is_valid(&self, row: usize, col: usize) -> bool {
        self.valid[row * self.cols + col]
    }

    /// Value of a valid cell, `None` for masked or out-of-range cells.
    pub fn get(&self, row: usize, col: usize) -> Option<f64> {
        if row >= self.rows || col >= self.cols {
            return None;
        }
        let idx = row * self.cols + col;
        self.valid[idx].then(|| self.values[idx])
    }

    pub fn valid_values(&self) -> impl Iterator<Item = f64> + '_ {
        self.values
            .iter()
            .zip(&self.valid)
            .filter_map(|(&v, &ok)| ok.then_some(v))
    }

    pub fn valid_count(&self) -> usize {
        self.valid.iter().filter(|&&ok| ok).count()
    }

    /// Minimum and maximum over valid cells.
    pub fn min_max(&self) -> Option<(f64, f64)> {
        self.valid_values().fold(None, |acc, v| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        })
    }

    /// Values and validity of rows `start..end`, clamped to the grid.
    pub fn rows_slice(&self, start: usize, end: usize) -> (&[f64], &[bool]) {
        let end = end.min(self.rows);
        let start = start.min(end);
        let range = start * self.cols..end * self.cols;
        (&self.values[range.clone()], &self.valid[range])
    }

    /// Same mask and transform with new values.
    pub fn with_values(&self, values: Vec<f64>) -> Result<Grid> {
        Grid::new(
            self.rows,
            self.cols,
            values,
            self.valid.clone(),
            self.transform,
        )
    }

    pub fn check_same_shape(&self, other: &Grid) -> Result<()> {
        if self.shape() != other.shape() {
            return Err(GeopError::ShapeMismatch {
                expected: self.shape(),
                found: other.shape(),
            });
        }
        Ok(())
    }

    pub fn into_parts(self) -> (Vec<f64>, Vec<bool>, GeoTransform) {
        (self.values, self.valid, self.transform)
    }
}
