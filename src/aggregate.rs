//! Aggregation operators over masked grids.
//!
//! Every operator reads only valid cells. Operators that produce a grid
//! return a new one and leave their inputs untouched.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use geo::Polygon;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{GeopError, Result};
use crate::grid::Grid;
use crate::trace::{BoundaryTracer, ChunkView};

/// Histogram of valid cell values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CellCount {
    #[serde(rename = "cellCount")]
    pub total: usize,
    /// Keyed by the value's shortest decimal form (`11`, `0.5`).
    #[serde(rename = "counts")]
    pub histogram: BTreeMap<String, usize>,
}

/// Textual key of a cell value. `-0` and `0` share a key.
pub fn value_key(value: f64) -> String {
    if value == 0.0 {
        return "0".to_string();
    }
    value.to_string()
}

/// One representative per key: `-0.0` becomes `0.0` and every NaN the same NaN.
pub(crate) fn canonical(value: f64) -> f64 {
    if value == 0.0 {
        0.0
    } else if value.is_nan() {
        f64::NAN
    } else {
        value
    }
}

pub fn count(grid: &Grid) -> CellCount {
    let mut by_bits: HashMap<u64, (f64, usize)> = HashMap::new();
    for v in grid.valid_values().map(canonical) {
        by_bits.entry(v.to_bits()).or_insert((v, 0)).1 += 1;
    }
    let histogram: BTreeMap<String, usize> = by_bits
        .into_values()
        .map(|(v, n)| (value_key(v), n))
        .collect();
    CellCount {
        total: grid.valid_count(),
        histogram,
    }
}

/// Supported summary statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Statistic {
    Min,
    Max,
    Mean,
    /// Population standard deviation.
    StdDev,
}

impl Statistic {
    pub fn as_str(&self) -> &'static str {
        match self {
            Statistic::Min => "min",
            Statistic::Max => "max",
            Statistic::Mean => "mean",
            Statistic::StdDev => "stddev",
        }
    }
}

impl fmt::Display for Statistic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Statistic {
    type Err = GeopError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "min" => Ok(Statistic::Min),
            "max" => Ok(Statistic::Max),
            "mean" => Ok(Statistic::Mean),
            "stddev" => Ok(Statistic::StdDev),
            other => Err(GeopError::UnsupportedStatistic(other.to_string())),
        }
    }
}

pub fn statistics(grid: &Grid, stat: Statistic) -> Result<f64> {
    if grid.valid_count() == 0 {
        return Err(GeopError::EmptyGrid);
    }
    let value = match stat {
        Statistic::Min => grid.valid_values().fold(f64::INFINITY, f64::min),
        Statistic::Max => grid.valid_values().fold(f64::NEG_INFINITY, f64::max),
        Statistic::Mean => mean(grid),
        Statistic::StdDev => {
            let mean = mean(grid);
            let n = grid.valid_count() as f64;
            let sq: f64 = grid.valid_values().map(|v| (v - mean).powi(2)).sum();
            (sq / n).sqrt()
        }
    };
    Ok(value)
}

/// [`statistics`] with the statistic given by name.
pub fn statistic_by_name(grid: &Grid, name: &str) -> Result<f64> {
    statistics(grid, name.parse()?)
}

fn mean(grid: &Grid) -> f64 {
    grid.valid_values().sum::<f64>() / grid.valid_count() as f64
}

/// Elementwise `sum(grid_i * weight_i)`. A cell is valid only where it is
/// valid in every input. Weights are not normalized.
pub fn weighted_overlay(grids: &[Grid], weights: &[f64]) -> Result<Grid> {
    if grids.len() != weights.len() {
        return Err(GeopError::invalid_config(format!(
            "{} grids but {} weights",
            grids.len(),
            weights.len()
        )));
    }
    let first = grids
        .first()
        .ok_or_else(|| GeopError::invalid_config("weighted overlay needs at least one grid"))?;
    for grid in &grids[1..] {
        first.check_same_shape(grid)?;
    }

    let (values, valid): (Vec<f64>, Vec<bool>) = (0..first.len())
        .into_par_iter()
        .map(|i| {
            let ok = grids.iter().all(|g| g.validity()[i]);
            let sum = grids
                .iter()
                .zip(weights)
                .map(|(g, w)| g.values()[i] * w)
                .sum::<f64>();
            (sum, ok)
        })
        .unzip();

    Grid::new(first.rows(), first.cols(), values, valid, *first.transform())
}

/// Cells a substitution applies to.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Target {
    Exact(f64),
    /// Inclusive on both ends.
    Range(f64, f64),
}

impl Target {
    pub fn matches(&self, value: f64) -> bool {
        match *self {
            Target::Exact(v) => value == v,
            Target::Range(low, high) => low <= value && value <= high,
        }
    }
}

/// A reclassification rule, deserialized from `[old, new]` or
/// `[[low, high], new]`.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(try_from = "(Target, f64)")]
pub struct Substitution {
    pub target: Target,
    pub new_value: f64,
}

impl Substitution {
    pub fn exact(old: f64, new_value: f64) -> Self {
        Self {
            target: Target::Exact(old),
            new_value,
        }
    }

    pub fn range(low: f64, high: f64, new_value: f64) -> Result<Self> {
        if low.is_nan() || high.is_nan() || low > high {
            return Err(GeopError::invalid_config(format!(
                "invalid reclassification range [{}, {}]",
                low, high
            )));
        }
        Ok(Self {
            target: Target::Range(low, high),
            new_value,
        })
    }
}

impl TryFrom<(Target, f64)> for Substitution {
    type Error = GeopError;

    fn try_from((target, new_value): (Target, f64)) -> Result<Self> {
        match target {
            Target::Exact(old) => Ok(Self::exact(old, new_value)),
            Target::Range(low, high) => Self::range(low, high, new_value),
        }
    }
}

/// Apply `substitutions` in order to the valid cells of `grid`. Each rule
/// sees the values written by the rules before it.
pub fn reclassify(grid: &Grid, substitutions: &[Substitution]) -> Result<Grid> {
    let mut values = grid.values().to_vec();
    for sub in substitutions {
        for (value, &valid) in values.iter_mut().zip(grid.validity()) {
            if valid && sub.target.matches(*value) {
                *value = sub.new_value;
            }
        }
    }
    grid.with_values(values)
}

/// Polygons covering the valid cells equal to `value`.
pub fn extract_value_regions<T: BoundaryTracer + ?Sized>(
    grid: &Grid,
    value: f64,
    tracer: &T,
) -> Result<Vec<Polygon<f64>>> {
    let mask: Vec<bool> = grid
        .values()
        .iter()
        .zip(grid.validity())
        .map(|(&v, &ok)| ok && v == value)
        .collect();
    let chunk = ChunkView::new(grid.values(), &mask, grid.rows(), grid.cols(), *grid.transform())?;
    Ok(tracer
        .trace(&chunk)?
        .into_iter()
        .map(|traced| traced.polygon)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::RegionTracer;
    use crate::transform::GeoTransform;
    use geo::Area;

    fn grid(values: Vec<f64>, valid: Vec<bool>, rows: usize, cols: usize) -> Grid {
        Grid::new(rows, cols, values, valid, GeoTransform::north_up(0.0, rows as f64, 1.0, 1.0))
            .unwrap()
    }

    /// 3 x 3 grid with the top-left, top-middle and center-right cells masked.
    fn scenario() -> Grid {
        grid(
            vec![42.0, 42.0, 11.0, 23.0, 23.0, 11.0, 24.0, 24.0, 31.0],
            vec![false, false, true, true, true, true, true, true, false],
            3,
            3,
        )
    }

    #[test]
    fn test_count_scenario() {
        let counts = count(&scenario());
        assert_eq!(counts.total, 6);
        let expected: BTreeMap<String, usize> =
            [("11", 2), ("23", 2), ("24", 2)].iter().map(|(k, v)| (k.to_string(), *v)).collect();
        assert_eq!(counts.histogram, expected);
        assert_eq!(counts.histogram.values().sum::<usize>(), counts.total);
    }

    #[test]
    fn test_count_serializes_like_a_response() {
        let json = serde_json::to_value(count(&scenario())).unwrap();
        assert_eq!(json["cellCount"], 6);
        assert_eq!(json["counts"]["23"], 2);
    }

    #[test]
    fn test_value_keys() {
        assert_eq!(value_key(11.0), "11");
        assert_eq!(value_key(0.5), "0.5");
        assert_eq!(value_key(-0.0), "0");
    }

    #[test]
    fn test_count_folds_signed_zeros_and_nans() {
        let odd_nan = f64::from_bits(f64::NAN.to_bits() | 1);
        let g = grid(vec![0.0, -0.0, f64::NAN, -f64::NAN, odd_nan, 1.0], vec![true; 6], 2, 3);
        let counts = count(&g);
        assert_eq!(counts.histogram.len(), 3);
        assert_eq!(counts.histogram["0"], 2);
        assert_eq!(counts.histogram["NaN"], 3);
        assert_eq!(counts.histogram.values().sum::<usize>(), counts.total);
    }

    #[test]
    fn test_statistics() {
        let mut valid = vec![true; 9];
        valid[8] = false;
        let g = grid(vec![2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0, 100.0], valid, 3, 3);
        assert_eq!(statistics(&g, Statistic::Min).unwrap(), 2.0);
        assert_eq!(statistics(&g, Statistic::Max).unwrap(), 9.0);
        assert_eq!(statistics(&g, Statistic::Mean).unwrap(), 5.0);
        assert_eq!(statistics(&g, Statistic::StdDev).unwrap(), 2.0);
        assert_eq!(statistic_by_name(&g, "max").unwrap(), 9.0);
    }

    #[test]
    fn test_unknown_statistic() {
        let err = statistic_by_name(&scenario(), "median").unwrap_err();
        assert_eq!(err.to_string(), "median has not been implemented");
    }

    #[test]
    fn test_statistics_on_empty_grid() {
        let g = grid(vec![1.0, 2.0], vec![false, false], 1, 2);
        assert!(matches!(statistics(&g, Statistic::Mean), Err(GeopError::EmptyGrid)));
    }

    #[test]
    fn test_weighted_overlay() {
        let a = grid(vec![1.0, 2.0, 3.0, 4.0], vec![true, true, false, true], 2, 2);
        let b = grid(vec![10.0, 20.0, 30.0, 40.0], vec![true, true, true, false], 2, 2);
        let out = weighted_overlay(&[a, b], &[0.5, 0.25]).unwrap();
        assert_eq!(out.get(0, 0), Some(3.0));
        assert_eq!(out.get(0, 1), Some(6.0));
        assert_eq!(out.get(1, 0), None);
        assert_eq!(out.get(1, 1), None);
    }

    #[test]
    fn test_weighted_overlay_rejects_mismatch() {
        let a = grid(vec![1.0; 4], vec![true; 4], 2, 2);
        let b = grid(vec![1.0; 6], vec![true; 6], 2, 3);
        assert!(matches!(
            weighted_overlay(&[a.clone(), b], &[1.0, 1.0]),
            Err(GeopError::ShapeMismatch { .. })
        ));
        assert!(matches!(
            weighted_overlay(&[a], &[1.0, 1.0]),
            Err(GeopError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_reclassify_scenario() {
        let out = reclassify(&scenario(), &[Substitution::exact(22.0, 100.0)]).unwrap();
        assert_eq!(out, scenario());

        let out = reclassify(&scenario(), &[Substitution::exact(23.0, 100.0)]).unwrap();
        assert_eq!(out.get(1, 0), Some(100.0));
        assert_eq!(out.get(1, 1), Some(100.0));
        assert_eq!(out.get(0, 2), Some(11.0));
    }

    #[test]
    fn test_reclassify_rules_chain_and_skip_masked() {
        let subs = vec![
            Substitution::range(20.0, 30.0, 1.0).unwrap(),
            Substitution::exact(1.0, 2.0),
            Substitution::exact(42.0, 0.0),
        ];
        let out = reclassify(&scenario(), &subs).unwrap();
        assert_eq!(out.get(1, 0), Some(2.0));
        assert_eq!(out.get(2, 1), Some(2.0));
        assert_eq!(out.values()[0], 42.0);
        assert_eq!(out.validity(), scenario().validity());
    }

    #[test]
    fn test_substitutions_from_json() {
        let subs: Vec<Substitution> = serde_json::from_str("[[22, 100], [[90, 99], 9]]").unwrap();
        assert_eq!(subs[0], Substitution::exact(22.0, 100.0));
        assert_eq!(subs[1].target, Target::Range(90.0, 99.0));
        assert!(serde_json::from_str::<Vec<Substitution>>("[[[9, 1], 0]]").is_err());
    }

    #[test]
    fn test_extract_value_regions() {
        let polys = extract_value_regions(&scenario(), 11.0, &RegionTracer).unwrap();
        assert_eq!(polys.len(), 1);
        assert_eq!(polys[0].unsigned_area(), 2.0);

        let polys = extract_value_regions(&scenario(), 42.0, &RegionTracer).unwrap();
        assert!(polys.is_empty());
    }
}
