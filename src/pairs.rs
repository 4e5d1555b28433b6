//! Co-occurrence counts of value pairs from two aligned grids.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use rayon::prelude::*;
use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::aggregate::{canonical, value_key};
use crate::error::Result;
use crate::grid::Grid;

/// How often one `(a, b)` pair of cell values occurs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PairCount {
    pub a: f64,
    pub b: f64,
    pub count: usize,
}

impl PairCount {
    /// `"a::b"`
    pub fn key(&self) -> String {
        format!("{}::{}", value_key(self.a), value_key(self.b))
    }
}

/// Pair counts in ascending `(a, b)` order. Serializes as a JSON object
/// keyed by [`PairCount::key`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PairCounts {
    entries: Vec<PairCount>,
}

impl PairCounts {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PairCount> {
        self.entries.iter()
    }

    pub fn get(&self, a: f64, b: f64) -> Option<usize> {
        self.entries
            .iter()
            .find(|p| p.a == a && p.b == b)
            .map(|p| p.count)
    }

    /// Total number of counted cells.
    pub fn total(&self) -> usize {
        self.entries.iter().map(|p| p.count).sum()
    }

    pub fn to_map(&self) -> BTreeMap<String, usize> {
        self.entries.iter().map(|p| (p.key(), p.count)).collect()
    }
}

impl Serialize for PairCounts {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for entry in &self.entries {
            map.serialize_entry(&entry.key(), &entry.count)?;
        }
        map.end()
    }
}

/// Count the value pairs of cells valid in both `a` and `b`.
///
/// Pairs are sorted, the start of every run of equal pairs is found from the
/// first differences, and the run lengths are the gaps between consecutive
/// fenceposts `-1, starts..., n - 1`.
pub fn count_pairs(a: &Grid, b: &Grid) -> Result<PairCounts> {
    a.check_same_shape(b)?;

    let mut pairs: Vec<(f64, f64)> = a
        .values()
        .iter()
        .zip(a.validity())
        .zip(b.values().iter().zip(b.validity()))
        .filter_map(|((&va, &oka), (&vb, &okb))| {
            (oka && okb).then_some((canonical(va), canonical(vb)))
        })
        .collect();
    if pairs.is_empty() {
        return Ok(PairCounts::default());
    }

    let order = |x: &(f64, f64), y: &(f64, f64)| x.0.total_cmp(&y.0).then(x.1.total_cmp(&y.1));
    pairs.par_sort_unstable_by(order);

    // Index of the last element of every run but the final one.
    let run_ends: Vec<isize> = pairs
        .windows(2)
        .enumerate()
        .filter(|(_, w)| order(&w[0], &w[1]) != Ordering::Equal)
        .map(|(i, _)| i as isize)
        .collect();

    let last = pairs.len() as isize - 1;
    let fenceposts: Vec<isize> = std::iter::once(-1)
        .chain(run_ends.iter().copied())
        .chain(std::iter::once(last))
        .collect();

    let entries = fenceposts
        .windows(2)
        .map(|w| {
            let (a, b) = pairs[w[1] as usize];
            PairCount {
                a,
                b,
                count: (w[1] - w[0]) as usize,
            }
        })
        .collect();

    Ok(PairCounts { entries })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GeopError;
    use crate::transform::GeoTransform;
    use std::collections::HashMap;

    fn grid(values: Vec<f64>, valid: Vec<bool>, rows: usize, cols: usize) -> Grid {
        Grid::new(rows, cols, values, valid, GeoTransform::default()).unwrap()
    }

    #[test]
    fn test_distinct_pairs() {
        let a = grid(vec![11.0, 11.0, 23.0], vec![true; 3], 1, 3);
        let b = grid(vec![44.0, 55.0, 77.0], vec![true; 3], 1, 3);
        let counts = count_pairs(&a, &b).unwrap();
        let keys: Vec<String> = counts.iter().map(|p| p.key()).collect();
        assert_eq!(keys, vec!["11::44", "11::55", "23::77"]);
        assert!(counts.iter().all(|p| p.count == 1));
    }

    #[test]
    fn test_repeated_pairs_and_masking() {
        let a = grid(vec![1.0, 1.0, 2.0, 1.0, 2.0, 9.0], vec![true, true, true, true, true, false], 2, 3);
        let b = grid(vec![5.0, 5.0, 6.0, 5.0, 6.0, 9.0], vec![true, true, true, false, true, true], 2, 3);
        let counts = count_pairs(&a, &b).unwrap();
        assert_eq!(counts.len(), 2);
        assert_eq!(counts.get(1.0, 5.0), Some(2));
        assert_eq!(counts.get(2.0, 6.0), Some(2));
        assert_eq!(counts.get(9.0, 9.0), None);
        assert_eq!(counts.total(), 4);
    }

    #[test]
    fn test_single_pair_and_empty() {
        let a = grid(vec![3.0], vec![true], 1, 1);
        let counts = count_pairs(&a, &a).unwrap();
        assert_eq!(counts.to_map().get("3::3"), Some(&1));

        let empty = grid(vec![3.0], vec![false], 1, 1);
        assert!(count_pairs(&empty, &a).unwrap().is_empty());
    }

    #[test]
    fn test_shape_mismatch() {
        let a = grid(vec![1.0; 4], vec![true; 4], 2, 2);
        let b = grid(vec![1.0; 4], vec![true; 4], 1, 4);
        assert!(matches!(count_pairs(&a, &b), Err(GeopError::ShapeMismatch { .. })));
    }

    #[test]
    fn test_matches_brute_force() {
        let (rows, cols) = (31, 29);
        let mut seed = 7_u64;
        let mut next = || {
            seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            (seed >> 33) as usize
        };
        // Signed zeros and differently encoded NaNs must fold into one key each.
        let pick = |n: usize, table: &[f64]| table[n % table.len()];
        let va: Vec<f64> = (0..rows * cols)
            .map(|_| pick(next(), &[0.0, -0.0, 1.0, 2.0, 3.0]))
            .collect();
        let vb: Vec<f64> = (0..rows * cols)
            .map(|_| pick(next(), &[-0.0, 0.0, 0.5, 1.5, f64::NAN, -f64::NAN]))
            .collect();
        let ma: Vec<bool> = (0..rows * cols).map(|_| next() % 7 != 0).collect();
        let mb: Vec<bool> = (0..rows * cols).map(|_| next() % 6 != 0).collect();

        let mut expected: HashMap<String, usize> = HashMap::new();
        for i in 0..rows * cols {
            if ma[i] && mb[i] {
                *expected
                    .entry(format!("{}::{}", value_key(va[i]), value_key(vb[i])))
                    .or_default() += 1;
            }
        }

        let a = grid(va, ma, rows, cols);
        let b = grid(vb, mb, rows, cols);
        let counts = count_pairs(&a, &b).unwrap();
        let actual: HashMap<String, usize> = counts.to_map().into_iter().collect();
        assert_eq!(actual, expected);

        assert_eq!(counts.len(), expected.len());
        assert_eq!(counts.total(), expected.values().sum::<usize>());

        let ordered: Vec<(f64, f64)> = counts.iter().map(|p| (p.a, p.b)).collect();
        assert!(ordered
            .windows(2)
            .all(|w| w[0].0.total_cmp(&w[1].0).then(w[0].1.total_cmp(&w[1].1)).is_lt()));
    }

    #[test]
    fn test_signed_zeros_share_a_pair() {
        let a = grid(vec![-0.0, -0.0, 0.0], vec![true; 3], 1, 3);
        let b = grid(vec![1.0, 2.0, 1.0], vec![true; 3], 1, 3);
        let counts = count_pairs(&a, &b).unwrap();
        assert_eq!(counts.len(), 2);
        assert_eq!(counts.get(0.0, 1.0), Some(2));
        assert_eq!(counts.get(0.0, 2.0), Some(1));

        let json = serde_json::to_string(&counts).unwrap();
        assert_eq!(json, r#"{"0::1":2,"0::2":1}"#);
    }

    #[test]
    fn test_serializes_in_sort_order() {
        let a = grid(vec![23.0, 11.0, 11.0], vec![true; 3], 1, 3);
        let b = grid(vec![77.0, 55.0, 44.0], vec![true; 3], 1, 3);
        let json = serde_json::to_string(&count_pairs(&a, &b).unwrap()).unwrap();
        assert_eq!(json, r#"{"11::44":1,"11::55":1,"23::77":1}"#);
    }
}
