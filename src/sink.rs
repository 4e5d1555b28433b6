//! Destinations for traced elevation bands.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;
use std::sync::Mutex;

use geo::MultiPolygon;
use geojson::{Feature, GeoJson, Geometry};
use serde_json::{json, Map as JsonMap, Value as JsonValue};
use tracing::debug;

use crate::elevation::Band;
use crate::error::{GeopError, Result};

/// Receives each band's geometry exactly once.
pub trait OutputSink: Send + Sync {
    fn persist(&self, band: &Band, geometry: &MultiPolygon<f64>) -> Result<()>;
}

pub const DEFAULT_PREFIX: &str = "band";

/// Writes every band to `<dir>/<prefix>-<index>.json` as a GeoJSON Feature
/// carrying `band`, `lower` and `upper` properties.
#[derive(Debug, Clone)]
pub struct GeoJsonDirSink {
    dir: PathBuf,
    prefix: String,
}

impl GeoJsonDirSink {
    /// Create `dir` if needed.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            prefix: DEFAULT_PREFIX.to_string(),
        })
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, band: &Band) -> PathBuf {
        self.dir.join(format!("{}-{}.json", self.prefix, band.index))
    }
}

/// GeoJSON Feature of one band.
pub fn band_feature(band: &Band, geometry: &MultiPolygon<f64>) -> Feature {
    let mut properties: JsonMap<String, JsonValue> = JsonMap::new();
    properties.insert("band".to_string(), json!(band.index));
    properties.insert("lower".to_string(), json!(band.lower));
    properties.insert("upper".to_string(), json!(band.upper));

    Feature {
        bbox: None,
        geometry: Some(Geometry::new(geojson::Value::from(geometry))),
        id: None,
        properties: Some(properties),
        foreign_members: None,
    }
}

impl OutputSink for GeoJsonDirSink {
    fn persist(&self, band: &Band, geometry: &MultiPolygon<f64>) -> Result<()> {
        let path = self.path_for(band);
        let body = GeoJson::Feature(band_feature(band, geometry)).to_string();
        fs::write(&path, body)
            .map_err(|e| GeopError::persist(band.index, format!("{}: {}", path.display(), e)))?;
        debug!("Band {} saved to {:?}", band.index, path);
        Ok(())
    }
}

/// Keeps persisted bands in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    bands: Mutex<Vec<(Band, MultiPolygon<f64>)>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drain everything persisted so far, in persist order.
    pub fn take(&self) -> Vec<(Band, MultiPolygon<f64>)> {
        match self.bands.lock() {
            Ok(mut bands) => std::mem::take(&mut *bands),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        }
    }
}

impl OutputSink for MemorySink {
    fn persist(&self, band: &Band, geometry: &MultiPolygon<f64>) -> Result<()> {
        let mut bands = self
            .bands
            .lock()
            .map_err(|_| GeopError::persist(band.index, "memory sink lock poisoned"))?;
        bands.push((*band, geometry.clone()));
        Ok(())
    }
}

/// Streams `(band index, geometry)` to a receiver as bands complete.
#[derive(Debug)]
pub struct ChannelSink {
    sender: Mutex<Sender<(usize, MultiPolygon<f64>)>>,
}

impl ChannelSink {
    pub fn new(sender: Sender<(usize, MultiPolygon<f64>)>) -> Self {
        Self {
            sender: Mutex::new(sender),
        }
    }
}

impl OutputSink for ChannelSink {
    fn persist(&self, band: &Band, geometry: &MultiPolygon<f64>) -> Result<()> {
        let sender = self
            .sender
            .lock()
            .map_err(|_| GeopError::persist(band.index, "channel sink lock poisoned"))?;
        sender
            .send((band.index, geometry.clone()))
            .map_err(|_| GeopError::persist(band.index, "receiver dropped"))
    }
}
