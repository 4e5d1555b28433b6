//! Affine pixel/world transform.
//!
//! Coefficients follow the `(a, b, c, d, e, f)` convention:
//!
//! ```text
//! x = a * col + b * row + c
//! y = d * col + e * row + f
//! ```
//!
//! GDAL stores the same six numbers as `[c, a, b, f, d, e]`; use
//! [`GeoTransform::from_gdal`] and [`GeoTransform::to_gdal`] to convert.

use crate::error::{GeopError, Result};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoTransform {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub e: f64,
    pub f: f64,
}

impl GeoTransform {
    pub fn new(a: f64, b: f64, c: f64, d: f64, e: f64, f: f64) -> Self {
        Self { a, b, c, d, e, f }
    }

    /// North-up transform with the upper-left corner at `(origin_x, origin_y)`.
    pub fn north_up(origin_x: f64, origin_y: f64, x_res: f64, y_res: f64) -> Self {
        Self::new(x_res, 0.0, origin_x, 0.0, -y_res.abs(), origin_y)
    }

    pub fn from_gdal(gt: [f64; 6]) -> Self {
        Self::new(gt[1], gt[2], gt[0], gt[4], gt[5], gt[3])
    }

    pub fn to_gdal(&self) -> [f64; 6] {
        [self.c, self.a, self.b, self.f, self.d, self.e]
    }

    pub fn determinant(&self) -> f64 {
        self.a * self.e - self.b * self.d
    }

    pub fn is_invertible(&self) -> bool {
        let det = self.determinant();
        det.is_finite() && det != 0.0
    }

    /// World coordinate of a (fractional) pixel position.
    pub fn apply(&self, col: f64, row: f64) -> (f64, f64) {
        (
            self.a * col + self.b * row + self.c,
            self.d * col + self.e * row + self.f,
        )
    }

    /// The world → pixel transform.
    pub fn inverse(&self) -> Result<GeoTransform> {
        if !self.is_invertible() {
            return Err(GeopError::InvalidTransform(format!("{:?}", self)));
        }
        let det = self.determinant();
        let ia = self.e / det;
        let ib = -self.b / det;
        let id = -self.d / det;
        let ie = self.a / det;
        Ok(GeoTransform::new(
            ia,
            ib,
            -(ia * self.c + ib * self.f),
            id,
            ie,
            -(id * self.c + ie * self.f),
        ))
    }

    /// Fractional `(col, row)` of a world coordinate.
    pub fn to_pixel(&self, x: f64, y: f64) -> Result<(f64, f64)> {
        Ok(self.inverse()?.apply(x, y))
    }

    /// `(row, col)` of the cell containing a world coordinate. May be negative
    /// or beyond the raster when the point lies outside it.
    pub fn index(&self, x: f64, y: f64) -> Result<(i64, i64)> {
        let (col, row) = self.to_pixel(x, y)?;
        Ok((row.floor() as i64, col.floor() as i64))
    }

    /// Transform whose pixel `(0, 0)` is pixel `(row_off, col_off)` of `self`.
    /// Only the translation terms change.
    pub fn shifted(&self, row_off: f64, col_off: f64) -> GeoTransform {
        let (c, f) = self.apply(col_off, row_off);
        GeoTransform { c, f, ..*self }
    }

    /// Absolute cell width and height for a north-up transform.
    pub fn pixel_size(&self) -> (f64, f64) {
        (
            (self.a * self.a + self.d * self.d).sqrt(),
            (self.b * self.b + self.e * self.e).sqrt(),
        )
    }
}

impl Default for GeoTransform {
    fn default() -> Self {
        Self::new(1.0, 0.0, 0.0, 0.0, 1.0, 0.0)
    }
}
