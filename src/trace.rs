//! Raster-to-polygon boundary tracing.
//!
//! [`RegionTracer`] labels 4-connected regions of equal value and walks the
//! pixel edges around each one. Edges are directed so the region is always on
//! the right. Where a region touches itself at a corner the walk turns left,
//! so each ring bounds a single background component: an exterior and a hole
//! that meet at a point come out as two rings sharing a vertex.

use std::collections::{BTreeMap, VecDeque};

use geo::orient::{Direction, Orient};
use geo::{Coord, LineString, Polygon};

use crate::error::{GeopError, Result};
use crate::transform::GeoTransform;

/// A rectangular block of cells handed to a tracer.
#[derive(Debug, Clone, Copy)]
pub struct ChunkView<'a> {
    pub values: &'a [f64],
    /// Cells to vectorize; everything else is background.
    pub mask: &'a [bool],
    pub rows: usize,
    pub cols: usize,
    /// Transform of the chunk's upper-left pixel corner.
    pub transform: GeoTransform,
}

impl<'a> ChunkView<'a> {
    pub fn new(
        values: &'a [f64],
        mask: &'a [bool],
        rows: usize,
        cols: usize,
        transform: GeoTransform,
    ) -> Result<Self> {
        if values.len() != rows * cols || mask.len() != rows * cols {
            return Err(GeopError::ShapeMismatch {
                expected: (rows, cols),
                found: (values.len().max(mask.len()) / cols.max(1), cols),
            });
        }
        Ok(Self {
            values,
            mask,
            rows,
            cols,
            transform,
        })
    }
}

/// One connected region of equal value.
#[derive(Debug, Clone, PartialEq)]
pub struct TracedPolygon {
    pub polygon: Polygon<f64>,
    pub value: f64,
}

/// Turns masked cells into polygons in world coordinates.
pub trait BoundaryTracer: Send + Sync {
    fn trace(&self, chunk: &ChunkView<'_>) -> Result<Vec<TracedPolygon>>;
}

/// Pixel-edge tracer over 4-connected equal-value regions.
#[derive(Debug, Clone, Copy, Default)]
pub struct RegionTracer;

impl BoundaryTracer for RegionTracer {
    fn trace(&self, chunk: &ChunkView<'_>) -> Result<Vec<TracedPolygon>> {
        let labeling = label_regions(chunk);
        let mut polygons = Vec::with_capacity(labeling.regions.len());
        for (label, (value, cells)) in labeling.regions.iter().enumerate() {
            let rings = region_rings(&labeling.labels, label, cells, chunk.rows, chunk.cols)?;
            polygons.push(TracedPolygon {
                polygon: assemble(rings, &chunk.transform),
                value: *value,
            });
        }
        Ok(polygons)
    }
}

const EAST: u8 = 0;
const SOUTH: u8 = 1;
const WEST: u8 = 2;
const NORTH: u8 = 3;

/// Region labels per cell plus the value and cells of each region, in
/// row-major order of discovery.
struct Labeling {
    labels: Vec<usize>,
    regions: Vec<(f64, Vec<usize>)>,
}

fn label_regions(chunk: &ChunkView<'_>) -> Labeling {
    const UNLABELED: usize = usize::MAX;
    let (rows, cols) = (chunk.rows, chunk.cols);
    let mut labels = vec![UNLABELED; rows * cols];
    let mut regions: Vec<(f64, Vec<usize>)> = Vec::new();
    let mut queue = VecDeque::new();

    for start in 0..rows * cols {
        if !chunk.mask[start] || labels[start] != UNLABELED {
            continue;
        }
        let label = regions.len();
        let value = chunk.values[start];
        let mut cells = Vec::new();
        labels[start] = label;
        queue.push_back(start);

        while let Some(idx) = queue.pop_front() {
            cells.push(idx);
            let (r, c) = (idx / cols, idx % cols);
            let neighbors = [
                (r > 0).then(|| idx - cols),
                (r + 1 < rows).then(|| idx + cols),
                (c > 0).then(|| idx - 1),
                (c + 1 < cols).then(|| idx + 1),
            ];
            for n in neighbors.into_iter().flatten() {
                if chunk.mask[n] && labels[n] == UNLABELED && chunk.values[n] == value {
                    labels[n] = label;
                    queue.push_back(n);
                }
            }
        }
        regions.push((value, cells));
    }

    Labeling { labels, regions }
}

fn step((y, x): (i64, i64), dir: u8) -> (i64, i64) {
    match dir {
        EAST => (y, x + 1),
        SOUTH => (y + 1, x),
        WEST => (y, x - 1),
        _ => (y - 1, x),
    }
}

/// Closed rings of lattice corners `(x, y)` bounding one region.
fn region_rings(
    labels: &[usize],
    label: usize,
    cells: &[usize],
    rows: usize,
    cols: usize,
) -> Result<Vec<Vec<(i64, i64)>>> {
    let same = |r: usize, c: usize| labels[r * cols + c] == label;

    // Outgoing directions per vertex, keyed (y, x) so the first key is the
    // top-left-most vertex.
    let mut edges: BTreeMap<(i64, i64), u8> = BTreeMap::new();
    let mut add = |y: usize, x: usize, dir: u8| {
        *edges.entry((y as i64, x as i64)).or_default() |= 1 << dir;
    };
    for &idx in cells {
        let (r, c) = (idx / cols, idx % cols);
        if r == 0 || !same(r - 1, c) {
            add(r, c, EAST);
        }
        if c + 1 == cols || !same(r, c + 1) {
            add(r, c + 1, SOUTH);
        }
        if r + 1 == rows || !same(r + 1, c) {
            add(r + 1, c + 1, WEST);
        }
        if c == 0 || !same(r, c - 1) {
            add(r + 1, c, NORTH);
        }
    }

    let mut rings = Vec::new();
    loop {
        let Some((&start, &bits)) = edges.first_key_value() else {
            break;
        };
        let start_dir = bits.trailing_zeros() as u8;
        take_edge(&mut edges, start, start_dir);

        let mut ring = vec![start];
        let mut at = step(start, start_dir);
        let mut dir = start_dir;
        loop {
            let available = edges.get(&at).copied().unwrap_or(0);
            let next = [(dir + 3) % 4, dir, (dir + 1) % 4]
                .into_iter()
                .find(|&d| available & (1 << d) != 0 || (at == start && d == start_dir))
                .ok_or_else(|| {
                    GeopError::Trace(format!("open ring at vertex {:?}", (at.1, at.0)))
                })?;

            if at == start && next == start_dir {
                if dir == start_dir {
                    ring.remove(0);
                }
                break;
            }
            if next != dir {
                ring.push(at);
            }
            take_edge(&mut edges, at, next);
            dir = next;
            at = step(at, next);
        }

        let mut ring: Vec<(i64, i64)> = ring.into_iter().map(|(y, x)| (x, y)).collect();
        if let Some(&first) = ring.first() {
            ring.push(first);
        }
        rings.push(ring);
    }
    Ok(rings)
}

fn take_edge(edges: &mut BTreeMap<(i64, i64), u8>, at: (i64, i64), dir: u8) {
    if let Some(bits) = edges.get_mut(&at) {
        *bits &= !(1 << dir);
        if *bits == 0 {
            edges.remove(&at);
        }
    }
}

fn shoelace(ring: &[(i64, i64)]) -> i64 {
    ring.windows(2)
        .map(|w| w[0].0 * w[1].1 - w[1].0 * w[0].1)
        .sum::<i64>()
}

/// The ring enclosing the largest area is the exterior; the rest are holes.
fn assemble(mut rings: Vec<Vec<(i64, i64)>>, transform: &GeoTransform) -> Polygon<f64> {
    let outer = rings
        .iter()
        .enumerate()
        .max_by_key(|(_, ring)| shoelace(ring).abs())
        .map(|(i, _)| i)
        .unwrap_or(0);
    let to_world = |ring: Vec<(i64, i64)>| -> LineString<f64> {
        ring.into_iter()
            .map(|(x, y)| {
                let (wx, wy) = transform.apply(x as f64, y as f64);
                Coord { x: wx, y: wy }
            })
            .collect()
    };

    let exterior = if rings.is_empty() {
        LineString::new(Vec::new())
    } else {
        to_world(rings.swap_remove(outer))
    };
    let holes = rings.into_iter().map(to_world).collect();
    Polygon::new(exterior, holes).orient(Direction::Default)
}
