// Elevation-band extraction through the worker pool.

use std::collections::HashSet;
use std::sync::mpsc;
use std::sync::Arc;

use geo::{Area, MultiPolygon};
use raster_geop::{
    run_elevation_extraction, Band, BandStatus, ChannelSink, ElevationExtractor, ExtractionConfig,
    GeoJsonDirSink, GeoTransform, GeopError, Grid, MemorySink, OutputSink, Result,
};
use tempfile::TempDir;

/// `rows x cols` grid whose value is the row index times `step`.
fn terrace(rows: usize, cols: usize, step: f64) -> Grid {
    let values = (0..rows * cols).map(|i| (i / cols) as f64 * step).collect();
    Grid::from_values(rows, cols, values, GeoTransform::north_up(0.0, rows as f64, 1.0, 1.0)).unwrap()
}

#[test]
fn test_pool_terminates_for_any_worker_and_band_count() {
    for workers in 1..=5 {
        for rows in [1, 2, 7, 20] {
            let sink = Arc::new(MemorySink::new());
            let report = run_elevation_extraction(terrace(rows, 3, 1.0), 1.0, workers, sink.clone())
                .unwrap();
            let expected_bands = rows.saturating_sub(1).max(1);
            assert_eq!(report.bands.len(), expected_bands, "{} workers, {} rows", workers, rows);
            assert_eq!(report.outcomes.len(), expected_bands);
            assert!(report.is_success());

            let saved: HashSet<usize> = sink.take().into_iter().map(|(b, _)| b.index).collect();
            assert_eq!(saved.len(), expected_bands);
        }
    }
}

#[test]
fn test_no_valid_cells_means_no_bands() {
    let grid = Grid::new(2, 2, vec![1.0; 4], vec![false; 4], GeoTransform::default()).unwrap();
    for workers in 1..=3 {
        let sink = Arc::new(MemorySink::new());
        let report = run_elevation_extraction(grid.clone(), 0.5, workers, sink.clone()).unwrap();
        assert!(report.bands.is_empty());
        assert!(report.outcomes.is_empty());
        assert!(sink.take().is_empty());
    }
}

#[test]
fn test_band_areas_cover_valid_cells() {
    let (rows, cols) = (23, 17);
    let values: Vec<f64> = (0..rows * cols)
        .map(|i| ((i % cols) as f64 * 0.37 + (i / cols) as f64 * 0.21).sin() * 3.0)
        .collect();
    let valid: Vec<bool> = (0..rows * cols).map(|i| i % 11 != 0).collect();
    let valid_count = valid.iter().filter(|&&v| v).count() as f64;
    let grid = Grid::new(rows, cols, values, valid, GeoTransform::north_up(0.0, rows as f64, 1.0, 1.0))
        .unwrap();

    let mut totals = Vec::new();
    for chunk_rows in [1, 5, 1000] {
        let sink = Arc::new(MemorySink::new());
        let config = ExtractionConfig {
            band_width: 0.5,
            chunk_rows,
            workers: Some(3),
            ..Default::default()
        };
        let report = ElevationExtractor::new(config, sink.clone())
            .run(Arc::new(grid.clone()))
            .unwrap();
        assert!(report.is_success());
        let area: f64 = sink.take().iter().map(|(_, g)| g.unsigned_area()).sum();
        assert!((area - valid_count).abs() < 1e-6, "chunk rows {}", chunk_rows);
        totals.push(area);
    }
    assert!(totals.windows(2).all(|w| (w[0] - w[1]).abs() < 1e-6));
}

#[test]
fn test_geojson_files_per_band() {
    let temp = TempDir::new().unwrap();
    let sink = GeoJsonDirSink::new(temp.path()).unwrap();
    let report = run_elevation_extraction(terrace(4, 2, 0.5), 0.5, 2, Arc::new(sink)).unwrap();
    assert!(report.is_success());

    for band in &report.bands {
        let path = temp.path().join(format!("band-{}.json", band.index));
        let text = std::fs::read_to_string(&path).unwrap();
        let json: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(json["properties"]["band"], band.index);
        assert_eq!(json["geometry"]["type"], "MultiPolygon");
    }
}

#[test]
fn test_channel_sink_streams_every_band() {
    let (tx, rx) = mpsc::channel();
    let report =
        run_elevation_extraction(terrace(6, 4, 1.0), 1.0, 3, Arc::new(ChannelSink::new(tx))).unwrap();
    let streamed: HashSet<usize> = rx.try_iter().map(|(index, _)| index).collect();
    assert_eq!(streamed.len(), report.bands.len());
}

/// Rejects one band and keeps the rest.
struct RejectBand {
    reject: usize,
    inner: MemorySink,
}

impl OutputSink for RejectBand {
    fn persist(&self, band: &Band, geometry: &MultiPolygon<f64>) -> Result<()> {
        if band.index == self.reject {
            return Err(GeopError::persist(band.index, "disk full"));
        }
        self.inner.persist(band, geometry)
    }
}

#[test]
fn test_failed_band_does_not_stop_siblings() {
    let sink = Arc::new(RejectBand {
        reject: 2,
        inner: MemorySink::new(),
    });
    let report = run_elevation_extraction(terrace(8, 2, 1.0), 1.0, 2, sink.clone()).unwrap();

    assert_eq!(report.bands.len(), 7);
    let failures: Vec<(usize, String)> = report
        .failures()
        .map(|(b, e)| (b.index, e.to_string()))
        .collect();
    assert_eq!(failures, vec![(2, "failed to persist band 2: disk full".to_string())]);
    assert_eq!(report.completed().count(), 6);
    assert!(!report.is_success());

    let saved: HashSet<usize> = sink.inner.take().into_iter().map(|(b, _)| b.index).collect();
    assert_eq!(saved.len(), 6);
    assert!(!saved.contains(&2));
}

/// Cancels the run from inside the first band it sees.
struct CancelOnFirst {
    token: raster_geop::CancellationToken,
    inner: MemorySink,
}

impl OutputSink for CancelOnFirst {
    fn persist(&self, band: &Band, geometry: &MultiPolygon<f64>) -> Result<()> {
        self.token.cancel();
        self.inner.persist(band, geometry)
    }
}

#[test]
fn test_cancellation_drains_the_queue() {
    let token = raster_geop::CancellationToken::new();
    let sink = Arc::new(CancelOnFirst {
        token: token.clone(),
        inner: MemorySink::new(),
    });
    let config = ExtractionConfig {
        band_width: 1.0,
        workers: Some(1),
        ..Default::default()
    };
    let report = ElevationExtractor::new(config, sink.clone())
        .with_cancellation(token)
        .run(Arc::new(terrace(10, 2, 1.0)))
        .unwrap();

    assert_eq!(report.outcomes.len(), report.bands.len());
    assert_eq!(report.completed().count(), 1);
    assert_eq!(report.cancelled().count(), report.bands.len() - 1);
    assert!(report
        .outcomes
        .iter()
        .all(|o| matches!(o.status, BandStatus::Completed | BandStatus::Cancelled)));
    assert_eq!(sink.inner.take().len(), 1);
}
