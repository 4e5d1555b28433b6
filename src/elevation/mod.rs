//! Elevation-band vectorization.
//!
//! The valid value range of a grid is split into bands of fixed width, and
//! each band is traced into a multi-polygon by a pool of worker threads.
//! Bands are queued on one FIFO channel followed by one `Stop` per worker;
//! every worker shares the grid read-only and reports a [`BandOutcome`] per
//! band it dequeues. A failing band never stops its siblings.

mod band;
mod pool;

pub use self::band::{partition_bands, partition_grid, Band};
pub use self::pool::{BandOutcome, BandStatus, CancellationToken, ExtractionReport};

use std::collections::HashSet;
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::io;
use std::thread::{self, JoinHandle};

use tracing::{error, info};

use crate::config::ExtractionConfig;
use crate::error::{GeopError, Result};
use crate::grid::Grid;
use crate::sink::OutputSink;
use crate::trace::{BoundaryTracer, RegionTracer};

use self::pool::{worker_loop, Message, WorkItem};

/// A configured band extraction: tunables, tracer, sink and stop flag.
#[derive(Clone)]
pub struct ElevationExtractor {
    config: ExtractionConfig,
    tracer: Arc<dyn BoundaryTracer>,
    sink: Arc<dyn OutputSink>,
    cancel: CancellationToken,
}

impl ElevationExtractor {
    pub fn new(config: ExtractionConfig, sink: Arc<dyn OutputSink>) -> Self {
        Self {
            config,
            tracer: Arc::new(RegionTracer),
            sink,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_tracer(mut self, tracer: Arc<dyn BoundaryTracer>) -> Self {
        self.tracer = tracer;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn config(&self) -> &ExtractionConfig {
        &self.config
    }

    /// Token that stops this extraction when cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Partition `grid` and process every band. Returns once every worker has
    /// terminated.
    pub fn run(&self, grid: Arc<Grid>) -> Result<ExtractionReport> {
        self.config.validate()?;
        let bands = partition_grid(&grid, self.config.band_width)?;
        let workers = self.config.worker_count();
        info!(
            "Extracting {} bands of width {} with {} workers",
            bands.len(),
            self.config.band_width,
            workers
        );

        let (queue_tx, queue_rx) = mpsc::channel();
        for band in &bands {
            send(&queue_tx, Message::Work(WorkItem { band: *band }))?;
        }
        for _ in 0..workers {
            send(&queue_tx, Message::Stop)?;
        }
        drop(queue_tx);

        let queue = Arc::new(Mutex::new(queue_rx));
        let (results_tx, results_rx) = mpsc::channel();
        let handles = spawn_workers(workers, &self.cancel, |id| {
            let grid = Arc::clone(&grid);
            let queue = Arc::clone(&queue);
            let results = results_tx.clone();
            let extractor = self.clone();
            thread::Builder::new()
                .name(format!("band-worker-{}", id))
                .spawn(move || worker_loop(id, grid, queue, results, extractor))
        })?;
        drop(results_tx);

        let mut outcomes: Vec<BandOutcome> = results_rx.iter().collect();
        join_workers(handles);

        let reported: HashSet<usize> = outcomes.iter().map(|o| o.band.index).collect();
        for band in bands.iter().filter(|b| !reported.contains(&b.index)) {
            outcomes.push(BandOutcome {
                band: *band,
                worker: usize::MAX,
                status: BandStatus::Failed(GeopError::WorkerPanic(format!(
                    "band {} was never reported",
                    band.index
                ))),
            });
        }

        let report = ExtractionReport { bands, outcomes };
        info!(
            "Extraction finished: {} completed, {} failed, {} cancelled",
            report.completed().count(),
            report.failures().count(),
            report.cancelled().count()
        );
        Ok(report)
    }
}

/// Start `count` workers. If one fails to start, the run is cancelled and the
/// workers already running are joined before the error is returned.
fn spawn_workers<F>(count: usize, cancel: &CancellationToken, mut spawn: F) -> Result<Vec<JoinHandle<()>>>
where
    F: FnMut(usize) -> io::Result<JoinHandle<()>>,
{
    let mut handles = Vec::with_capacity(count);
    for id in 0..count {
        match spawn(id) {
            Ok(handle) => handles.push(handle),
            Err(err) => {
                error!("Failed to start worker {}: {}", id, err);
                cancel.cancel();
                join_workers(handles);
                return Err(err.into());
            }
        }
    }
    Ok(handles)
}

fn join_workers(handles: Vec<JoinHandle<()>>) {
    for (id, handle) in handles.into_iter().enumerate() {
        if handle.join().is_err() {
            error!("Worker {} panicked outside band processing", id);
        }
    }
}

fn send(queue: &mpsc::Sender<Message>, message: Message) -> Result<()> {
    queue
        .send(message)
        .map_err(|_| GeopError::WorkerPanic("band queue closed".to_string()))
}

/// Extract bands of `band_width` from `grid` with `worker_count` workers and
/// the default tracer.
pub fn run_elevation_extraction(
    grid: Grid,
    band_width: f64,
    worker_count: usize,
    sink: Arc<dyn OutputSink>,
) -> Result<ExtractionReport> {
    let config = ExtractionConfig {
        band_width,
        workers: Some(worker_count),
        ..Default::default()
    };
    ElevationExtractor::new(config, sink).run(Arc::new(grid))
}
