use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, Sender};
use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use crate::error::GeopError;
use crate::grid::Grid;

use super::band::{trace_band, Band};
use super::ElevationExtractor;

/// Shared stop flag for a running extraction.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// A band waiting in the queue.
#[derive(Debug, Clone, Copy)]
pub(crate) struct WorkItem {
    pub band: Band,
}

#[derive(Debug)]
pub(crate) enum Message {
    Work(WorkItem),
    /// Ends the receiving worker. One is queued per worker after all work.
    Stop,
}

#[derive(Debug)]
pub enum BandStatus {
    Completed,
    Failed(GeopError),
    Cancelled,
}

/// What happened to one band, and which worker handled it.
#[derive(Debug)]
pub struct BandOutcome {
    pub band: Band,
    pub worker: usize,
    pub status: BandStatus,
}

/// Result of one pool run. Outcomes are in completion order.
#[derive(Debug, Default)]
pub struct ExtractionReport {
    pub bands: Vec<Band>,
    pub outcomes: Vec<BandOutcome>,
}

impl ExtractionReport {
    pub fn completed(&self) -> impl Iterator<Item = &Band> {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.status, BandStatus::Completed))
            .map(|o| &o.band)
    }

    pub fn failures(&self) -> impl Iterator<Item = (&Band, &GeopError)> {
        self.outcomes.iter().filter_map(|o| match &o.status {
            BandStatus::Failed(err) => Some((&o.band, err)),
            _ => None,
        })
    }

    pub fn cancelled(&self) -> impl Iterator<Item = &Band> {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.status, BandStatus::Cancelled))
            .map(|o| &o.band)
    }

    /// Every band completed.
    pub fn is_success(&self) -> bool {
        self.outcomes.len() == self.bands.len()
            && self
                .outcomes
                .iter()
                .all(|o| matches!(o.status, BandStatus::Completed))
    }
}

/// Dequeue and process bands until a `Stop` arrives.
pub(crate) fn worker_loop(
    id: usize,
    grid: Arc<Grid>,
    queue: Arc<Mutex<Receiver<Message>>>,
    results: Sender<BandOutcome>,
    extractor: ElevationExtractor,
) {
    debug!("Worker {} idle", id);
    loop {
        let message = {
            let receiver = match queue.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            receiver.recv()
        };

        let item = match message {
            Ok(Message::Work(item)) => item,
            Ok(Message::Stop) | Err(_) => break,
        };

        let status = if extractor.cancel.is_cancelled() {
            BandStatus::Cancelled
        } else {
            debug!("Worker {} processing band {}", id, item.band.index);
            process(&grid, &item.band, &extractor)
        };
        if let BandStatus::Failed(err) = &status {
            warn!("Band {} failed on worker {}: {}", item.band.index, id, err);
        }

        let outcome = BandOutcome {
            band: item.band,
            worker: id,
            status,
        };
        if results.send(outcome).is_err() {
            break;
        }
    }
    debug!("Worker {} terminated", id);
}

/// Trace one band and hand it to the sink. Nothing is persisted unless every
/// chunk traced.
fn process(grid: &Grid, band: &Band, extractor: &ElevationExtractor) -> BandStatus {
    let config = &extractor.config;
    let result = catch_unwind(AssertUnwindSafe(|| {
        let geometry = trace_band(
            grid,
            band,
            config.chunk_rows,
            config.inclusive_upper,
            extractor.tracer.as_ref(),
            &extractor.cancel,
        )?;
        extractor.sink.persist(band, &geometry)
    }));

    match result {
        Ok(Ok(())) => BandStatus::Completed,
        Ok(Err(GeopError::Cancelled(_))) => BandStatus::Cancelled,
        Ok(Err(err)) => BandStatus::Failed(err),
        Err(panic) => BandStatus::Failed(GeopError::WorkerPanic(panic_message(panic.as_ref()))),
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
