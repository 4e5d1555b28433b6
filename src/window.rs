//! Pixel windows for polygon reads.
//!
//! A polygon only ever touches the part of a raster under its bounding box,
//! so reads are limited to that window. The window carries a one-pixel pad
//! on its lower-right edge so that float truncation of the bounds never cuts
//! off the last row or column, and the returned transform maps pixel `(0, 0)`
//! of the window back to world coordinates.

use geo::{MultiPolygon, Rect};

use crate::error::{GeopError, Result};
use crate::geometry::bounds;
use crate::transform::GeoTransform;

/// Half-open row and column ranges of a raster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub row_start: usize,
    pub row_end: usize,
    pub col_start: usize,
    pub col_end: usize,
}

impl Window {
    pub fn new(rows: (usize, usize), cols: (usize, usize)) -> Result<Self> {
        if rows.0 >= rows.1 || cols.0 >= cols.1 {
            return Err(GeopError::invalid_config(format!(
                "empty window rows {:?} cols {:?}",
                rows, cols
            )));
        }
        Ok(Self {
            row_start: rows.0,
            row_end: rows.1,
            col_start: cols.0,
            col_end: cols.1,
        })
    }

    pub fn height(&self) -> usize {
        self.row_end - self.row_start
    }

    pub fn width(&self) -> usize {
        self.col_end - self.col_start
    }

    /// `(rows, cols)`
    pub fn shape(&self) -> (usize, usize) {
        (self.height(), self.width())
    }

    pub fn fits(&self, raster: &RasterDescriptor) -> bool {
        self.row_end <= raster.height && self.col_end <= raster.width
    }
}

/// What a reader knows about a raster before reading any cells.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterDescriptor {
    pub width: usize,
    pub height: usize,
    pub transform: GeoTransform,
    pub nodata: Option<f64>,
}

impl RasterDescriptor {
    pub fn new(width: usize, height: usize, transform: GeoTransform) -> Self {
        Self {
            width,
            height,
            transform,
            nodata: None,
        }
    }

    pub fn with_nodata(mut self, nodata: Option<f64>) -> Self {
        self.nodata = nodata;
        self
    }

    /// The window covering the whole raster.
    pub fn full_window(&self) -> Result<Window> {
        Window::new((0, self.height), (0, self.width))
    }

    pub fn is_nodata(&self, value: f64) -> bool {
        value.is_nan() || self.nodata.is_some_and(|nd| nd == value)
    }
}

/// Window of `raster` covering the bounding box of `geometry`, with the
/// transform of that window.
pub fn compute_window_and_transform(
    geometry: &MultiPolygon<f64>,
    raster: &RasterDescriptor,
) -> Result<(Window, GeoTransform)> {
    window_for_bounds(&bounds(geometry)?, raster)
}

/// Window of `raster` covering `rect`. Windows hanging over the raster edge
/// are clamped; windows entirely outside fail with `OutOfBounds`.
pub fn window_for_bounds(rect: &Rect<f64>, raster: &RasterDescriptor) -> Result<(Window, GeoTransform)> {
    let inverse = raster.transform.inverse()?;
    let (min, max) = (rect.min(), rect.max());

    let mut row_min = f64::INFINITY;
    let mut row_max = f64::NEG_INFINITY;
    let mut col_min = f64::INFINITY;
    let mut col_max = f64::NEG_INFINITY;
    for (x, y) in [(min.x, min.y), (min.x, max.y), (max.x, min.y), (max.x, max.y)] {
        let (col, row) = inverse.apply(x, y);
        row_min = row_min.min(row.floor());
        row_max = row_max.max(row.floor());
        col_min = col_min.min(col.floor());
        col_max = col_max.max(col.floor());
    }

    // Pad the lower-right corner by one pixel.
    let row_end = row_max + 1.0;
    let col_end = col_max + 1.0;

    let (height, width) = (raster.height as f64, raster.width as f64);
    if row_end <= 0.0 || col_end <= 0.0 || row_min >= height || col_min >= width {
        return Err(GeopError::out_of_bounds(
            format!(
                "rows {}..{} cols {}..{}",
                row_min, row_end, col_min, col_end
            ),
            format!("{}x{}", raster.height, raster.width),
        ));
    }

    let window = Window::new(
        (row_min.max(0.0) as usize, row_end.min(height) as usize),
        (col_min.max(0.0) as usize, col_end.min(width) as usize),
    )?;
    let shifted = raster
        .transform
        .shifted(window.row_start as f64, window.col_start as f64);

    Ok((window, shifted))
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{coord, polygon};

    fn raster() -> RasterDescriptor {
        // 100 x 100 cells of 10 units, upper-left at (1000, 2000)
        RasterDescriptor::new(100, 100, GeoTransform::north_up(1000.0, 2000.0, 10.0, 10.0))
    }

    #[test]
    fn test_window_covers_bounds_with_pad() {
        let rect = Rect::new(coord! { x: 1025.0, y: 1945.0 }, coord! { x: 1072.0, y: 1978.0 });
        let (window, transform) = window_for_bounds(&rect, &raster()).unwrap();

        // rows: maxy 1978 -> row 2, miny 1945 -> row 5 (+1 pad)
        assert_eq!((window.row_start, window.row_end), (2, 6));
        // cols: minx 1025 -> col 2, maxx 1072 -> col 7 (+1 pad)
        assert_eq!((window.col_start, window.col_end), (2, 8));

        assert_eq!(transform.a, 10.0);
        assert_eq!(transform.e, -10.0);
        assert_eq!(transform.c, 1020.0);
        assert_eq!(transform.f, 1980.0);
    }

    #[test]
    fn test_window_extent_contains_bbox() {
        let desc = raster();
        let rects = [
            Rect::new(coord! { x: 1000.0, y: 1000.0 }, coord! { x: 2000.0, y: 2000.0 }),
            Rect::new(coord! { x: 1333.3, y: 1111.1 }, coord! { x: 1334.0, y: 1112.0 }),
            Rect::new(coord! { x: 1010.0, y: 1990.0 }, coord! { x: 1020.0, y: 1990.0 }),
        ];
        for rect in rects {
            let (window, transform) = window_for_bounds(&rect, &desc).unwrap();
            let (left, top) = transform.apply(0.0, 0.0);
            let (right, bottom) = transform.apply(window.width() as f64, window.height() as f64);
            assert!(left <= rect.min().x && right >= rect.max().x);
            assert!(bottom <= rect.min().y && top >= rect.max().y);
        }
    }

    #[test]
    fn test_partially_outside_is_clamped() {
        let rect = Rect::new(coord! { x: 950.0, y: 1950.0 }, coord! { x: 1015.0, y: 2050.0 });
        let (window, transform) = window_for_bounds(&rect, &raster()).unwrap();
        assert_eq!((window.row_start, window.col_start), (0, 0));
        assert_eq!((window.row_end, window.col_end), (6, 2));
        assert_eq!((transform.c, transform.f), (1000.0, 2000.0));
    }

    #[test]
    fn test_entirely_outside_fails() {
        let geom = MultiPolygon::new(vec![polygon![
            (x: 0.0, y: 0.0),
            (x: 10.0, y: 0.0),
            (x: 10.0, y: 10.0),
            (x: 0.0, y: 0.0)
        ]]);
        let err = compute_window_and_transform(&geom, &raster()).unwrap_err();
        assert!(matches!(err, GeopError::OutOfBounds { .. }));
    }

    #[test]
    fn test_nodata_detection() {
        let desc = raster().with_nodata(Some(-9999.0));
        assert!(desc.is_nodata(-9999.0));
        assert!(desc.is_nodata(f64::NAN));
        assert!(!desc.is_nodata(0.0));
    }
}
