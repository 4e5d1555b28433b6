//! Polygon rasterization onto a pixel grid.
//!
//! Rings are moved into pixel space with the inverse transform, so the
//! scanline works for any invertible affine transform. Cell `(row, col)`
//! occupies `[col, col + 1) x [row, row + 1)` in pixel space.

use geo::{LineString, MultiPolygon, Polygon};

use crate::error::Result;
use crate::transform::GeoTransform;

/// Rasterize `geometry` into a `rows x cols` inclusion mask.
///
/// With `all_touched == false` a cell is included when its center falls
/// inside the polygon (even-odd rule, holes excluded). With
/// `all_touched == true` every cell whose interior a ring segment passes
/// through is included as well. Edges lying on grid lines add nothing.
pub fn rasterize(
    geometry: &MultiPolygon<f64>,
    rows: usize,
    cols: usize,
    transform: &GeoTransform,
    all_touched: bool,
) -> Result<Vec<bool>> {
    let inverse = transform.inverse()?;
    let mut mask = vec![false; rows * cols];

    for polygon in geometry {
        let rings = pixel_rings(polygon, &inverse);
        fill_centers(&rings, rows, cols, &mut mask);
        if all_touched {
            for ring in &rings {
                for segment in ring.windows(2) {
                    mark_segment(segment[0], segment[1], rows, cols, &mut mask);
                }
            }
        }
    }

    Ok(mask)
}

/// Exterior and interior rings of `polygon` in pixel space, each closed.
fn pixel_rings(polygon: &Polygon<f64>, inverse: &GeoTransform) -> Vec<Vec<(f64, f64)>> {
    std::iter::once(polygon.exterior())
        .chain(polygon.interiors())
        .filter(|ring| ring.0.len() >= 3)
        .map(|ring| to_pixel_ring(ring, inverse))
        .collect()
}

fn to_pixel_ring(ring: &LineString<f64>, inverse: &GeoTransform) -> Vec<(f64, f64)> {
    let mut points: Vec<(f64, f64)> = ring.coords().map(|c| inverse.apply(c.x, c.y)).collect();
    if points.first() != points.last() {
        if let Some(&first) = points.first() {
            points.push(first);
        }
    }
    points
}

/// Even-odd scanline fill sampling each row at its center line.
fn fill_centers(rings: &[Vec<(f64, f64)>], rows: usize, cols: usize, mask: &mut [bool]) {
    let (y_min, y_max) = rings
        .iter()
        .flatten()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &(_, y)| {
            (lo.min(y), hi.max(y))
        });
    if !y_min.is_finite() || !y_max.is_finite() {
        return;
    }
    let first_row = (y_min - 0.5).ceil().max(0.0) as usize;
    let last_row = ((y_max - 0.5).floor() + 1.0).clamp(0.0, rows as f64) as usize;

    let mut crossings: Vec<f64> = Vec::new();
    for row in first_row..last_row {
        let y = row as f64 + 0.5;
        crossings.clear();
        for ring in rings {
            for segment in ring.windows(2) {
                let ((x0, y0), (x1, y1)) = (segment[0], segment[1]);
                // Half-open on y so a vertex on the scanline is counted once.
                if (y0 <= y && y < y1) || (y1 <= y && y < y0) {
                    crossings.push(x0 + (y - y0) * (x1 - x0) / (y1 - y0));
                }
            }
        }
        crossings.sort_by(|a, b| a.total_cmp(b));

        for span in crossings.chunks_exact(2) {
            // Cells whose center col + 0.5 lies in [span[0], span[1]).
            let start = (span[0] - 0.5).ceil().clamp(0.0, cols as f64) as usize;
            let end = (span[1] - 0.5).ceil().clamp(0.0, cols as f64) as usize;
            let offset = row * cols;
            for cell in &mut mask[offset + start..offset + end] {
                *cell = true;
            }
        }
    }
}

/// Mark every cell whose open interior the segment `p0 -> p1` crosses.
///
/// A segment running along a grid line, or meeting a cell only at a corner,
/// does not touch that cell. The segment is clipped to each column strip it
/// spans and the rows of the clipped piece are marked.
fn mark_segment(p0: (f64, f64), p1: (f64, f64), rows: usize, cols: usize, mask: &mut [bool]) {
    if rows == 0 || cols == 0 {
        return;
    }
    let (x_min, x_max) = (p0.0.min(p1.0), p0.0.max(p1.0));
    let Some((first_col, last_col)) = open_span(x_min, x_max, cols) else {
        return;
    };
    let y_at = |x: f64| {
        if x == p0.0 {
            p0.1
        } else if x == p1.0 {
            p1.1
        } else {
            p0.1 + (x - p0.0) * (p1.1 - p0.1) / (p1.0 - p0.0)
        }
    };

    for col in first_col..=last_col {
        let (y_a, y_b) = if x_min == x_max {
            (p0.1, p1.1)
        } else {
            let x_a = x_min.max(col as f64);
            let x_b = x_max.min(col as f64 + 1.0);
            if x_b <= x_a {
                continue;
            }
            (y_at(x_a), y_at(x_b))
        };
        let Some((first_row, last_row)) = open_span(y_a.min(y_b), y_a.max(y_b), rows) else {
            continue;
        };
        for row in first_row..=last_row {
            mask[row * cols + col] = true;
        }
    }
}

/// First and last `i` in `0..len` whose open interval `(i, i + 1)` contains
/// a point of `[lo, hi]`.
fn open_span(lo: f64, hi: f64, len: usize) -> Option<(usize, usize)> {
    let first = lo.floor().max(0.0);
    let last = (hi.ceil() - 1.0).min(len as f64 - 1.0);
    if !first.is_finite() || !last.is_finite() || last < first {
        return None;
    }
    Some((first as usize, last as usize))
}
