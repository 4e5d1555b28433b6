use anyhow::{bail, Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand};
use rayon::ThreadPoolBuilder;
use raster_geop::geometry::parse_geojson;
use raster_geop::reproject::{reproject, DEFAULT_SRS};
use raster_geop::{
    aggregate, build_masked_grid, count, count_pairs, reclassify, sample_at_point, statistic_by_name,
    weighted_overlay, ElevationExtractor, ExtractionConfig, GdalRaster, GeoJsonDirSink, GeopError,
    Grid, MaskOptions, Modification, RegionTracer, Substitution,
};
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Worker threads for parallel operators (default: CPU cores)
    #[arg(short, long, global = true)]
    threads: Option<usize>,

    #[command(subcommand)]
    command: Command,
}

#[derive(ClapArgs, Debug)]
struct PolygonArgs {
    /// GeoJSON file with the polygon of interest
    #[arg(short, long, value_name = "FILE")]
    polygon: PathBuf,

    /// SRS of the polygon; it is reprojected to --raster-srs when given
    #[arg(long, value_name = "SRS")]
    polygon_srs: Option<String>,

    /// SRS of the rasters
    #[arg(long, value_name = "SRS", default_value = DEFAULT_SRS)]
    raster_srs: String,

    /// Only select cells whose center lies in the polygon
    #[arg(long)]
    center_only: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Histogram of cell values under the polygon
    Count {
        #[command(flatten)]
        polygon: PolygonArgs,
        #[arg(short, long)]
        raster: PathBuf,
        /// JSON list of {"geom": <GeoJSON>, "newValue": <number>}
        #[arg(long, value_name = "FILE")]
        modifications: Option<PathBuf>,
    },
    /// Summary statistic (min, max, mean, stddev) under the polygon
    Stats {
        #[command(flatten)]
        polygon: PolygonArgs,
        #[arg(short, long)]
        raster: PathBuf,
        #[arg(short, long)]
        stat: String,
    },
    /// Co-occurrence counts of value pairs from two aligned rasters
    Pairs {
        #[command(flatten)]
        polygon: PolygonArgs,
        #[arg(short, long, num_args = 2, required = true, value_names = ["A", "B"])]
        rasters: Vec<PathBuf>,
    },
    /// Weighted sum of rasters under the polygon
    Overlay {
        #[command(flatten)]
        polygon: PolygonArgs,
        #[arg(short, long, num_args = 1.., required = true)]
        rasters: Vec<PathBuf>,
        #[arg(short, long, num_args = 1.., required = true, allow_negative_numbers = true)]
        weights: Vec<f64>,
    },
    /// Substitute values or value ranges, e.g. '[[11, 1], [[90, 99], 9]]'
    Reclassify {
        #[command(flatten)]
        polygon: PolygonArgs,
        #[arg(short, long)]
        raster: PathBuf,
        #[arg(long, value_name = "JSON")]
        substitutions: String,
    },
    /// Polygons of the cells equal to a value
    Extract {
        #[command(flatten)]
        polygon: PolygonArgs,
        #[arg(short, long)]
        raster: PathBuf,
        #[arg(long, allow_negative_numbers = true)]
        value: f64,
    },
    /// Cell value at a point
    Sample {
        #[arg(short, long)]
        raster: PathBuf,
        #[arg(short, allow_negative_numbers = true)]
        x: f64,
        #[arg(short, allow_negative_numbers = true)]
        y: f64,
    },
    /// Vectorize elevation bands into GeoJSON files
    Elevation {
        #[command(flatten)]
        polygon: PolygonArgs,
        #[arg(short, long)]
        raster: PathBuf,
        /// Output directory
        #[arg(short, long, value_name = "DIR")]
        output: PathBuf,
        /// Band width in raster units (default: half a foot in meters)
        #[arg(long)]
        band_width: Option<f64>,
        /// Rows per traced chunk
        #[arg(long)]
        chunk_rows: Option<usize>,
        /// Band worker threads (default: CPU cores)
        #[arg(long)]
        workers: Option<usize>,
        /// Close every band on its upper edge
        #[arg(long)]
        inclusive_upper: bool,
        /// Output file prefix
        #[arg(long, default_value = "band")]
        prefix: String,
    },
}

#[derive(Deserialize)]
struct ModificationInput {
    geom: JsonValue,
    #[serde(rename = "newValue")]
    new_value: f64,
}

fn main() {
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let args = Args::parse();
    let start_time = std::time::Instant::now();

    match run(args) {
        Ok(output) => {
            println!("{}", output);
            info!("Total processing time: {:?}", start_time.elapsed());
        }
        Err(err) => {
            println!("{}", error_body(&err));
            std::process::exit(1);
        }
    }
}

/// `{"error": {"kind", "message"}}` for a failed command.
fn error_body(err: &anyhow::Error) -> JsonValue {
    let kind = err
        .downcast_ref::<GeopError>()
        .map(|e| e.kind().as_str())
        .unwrap_or("input");
    json!({ "error": { "kind": kind, "message": format!("{:#}", err) } })
}

fn run(args: Args) -> Result<JsonValue> {
    if let Some(threads) = args.threads {
        ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .context("Failed to build thread pool")?;
    }

    let output = match args.command {
        Command::Count {
            polygon,
            raster,
            modifications,
        } => {
            let modifications = match modifications {
                Some(path) => load_modifications(&path, &polygon)?,
                None => Vec::new(),
            };
            let grid = masked_grid(&polygon, &raster, &modifications)?;
            serde_json::to_value(count(&grid))?
        }
        Command::Stats {
            polygon,
            raster,
            stat,
        } => {
            let grid = masked_grid(&polygon, &raster, &[])?;
            let value = statistic_by_name(&grid, &stat)?;
            let mut body = serde_json::Map::new();
            body.insert(stat, json!(value));
            JsonValue::Object(body)
        }
        Command::Pairs { polygon, rasters } => {
            let a = masked_grid(&polygon, &rasters[0], &[])?;
            let b = masked_grid(&polygon, &rasters[1], &[])?;
            serde_json::to_value(count_pairs(&a, &b)?)?
        }
        Command::Overlay {
            polygon,
            rasters,
            weights,
        } => {
            let grids = rasters
                .iter()
                .map(|path| masked_grid(&polygon, path, &[]))
                .collect::<Result<Vec<_>>>()?;
            grid_json(&weighted_overlay(&grids, &weights)?)
        }
        Command::Reclassify {
            polygon,
            raster,
            substitutions,
        } => {
            let substitutions: Vec<Substitution> =
                serde_json::from_str(&substitutions).context("Invalid substitutions")?;
            let grid = masked_grid(&polygon, &raster, &[])?;
            grid_json(&reclassify(&grid, &substitutions)?)
        }
        Command::Extract {
            polygon,
            raster,
            value,
        } => {
            let grid = masked_grid(&polygon, &raster, &[])?;
            let polygons = aggregate::extract_value_regions(&grid, value, &RegionTracer)?;
            let geometries: Vec<JsonValue> = polygons
                .iter()
                .map(|p| serde_json::to_value(geojson::Geometry::new(geojson::Value::from(p))))
                .collect::<std::result::Result<_, _>>()?;
            JsonValue::Array(geometries)
        }
        Command::Sample { raster, x, y } => {
            let source = GdalRaster::open(&raster)?;
            json!({ "value": sample_at_point(&source, x, y)? })
        }
        Command::Elevation {
            polygon,
            raster,
            output,
            band_width,
            chunk_rows,
            workers,
            inclusive_upper,
            prefix,
        } => {
            let defaults = ExtractionConfig::default();
            let config = ExtractionConfig {
                band_width: band_width.unwrap_or(defaults.band_width),
                chunk_rows: chunk_rows.unwrap_or(defaults.chunk_rows),
                workers: workers.or(args.threads),
                inclusive_upper,
            };
            let grid = masked_grid(&polygon, &raster, &[])?;
            let sink = GeoJsonDirSink::new(&output)?.with_prefix(prefix);
            let report = ElevationExtractor::new(config, Arc::new(sink)).run(Arc::new(grid))?;

            let failures: Vec<JsonValue> = report
                .failures()
                .map(|(band, err)| json!({ "band": band.index, "message": err.to_string() }))
                .collect();
            json!({
                "bands": report.bands.len(),
                "completed": report.completed().count(),
                "cancelled": report.cancelled().count(),
                "failed": failures,
                "output": output,
            })
        }
    };
    Ok(output)
}

fn load_polygon(args: &PolygonArgs) -> Result<geo::MultiPolygon<f64>> {
    let text = fs::read_to_string(&args.polygon)
        .with_context(|| format!("Failed to read polygon {:?}", args.polygon))?;
    let polygon = parse_geojson(&text)?;
    match &args.polygon_srs {
        Some(srs) => Ok(reproject(&polygon, srs, &args.raster_srs)?),
        None => Ok(polygon),
    }
}

fn load_modifications(path: &Path, args: &PolygonArgs) -> Result<Vec<Modification>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read modifications {:?}", path))?;
    let inputs: Vec<ModificationInput> =
        serde_json::from_str(&text).context("Invalid modifications")?;
    inputs
        .into_iter()
        .map(|m| {
            let mut geometry = parse_geojson(&m.geom.to_string())?;
            if let Some(srs) = &args.polygon_srs {
                geometry = reproject(&geometry, srs, &args.raster_srs)?;
            }
            Ok(Modification::new(geometry, m.new_value))
        })
        .collect()
}

fn masked_grid(args: &PolygonArgs, raster: &Path, modifications: &[Modification]) -> Result<Grid> {
    if !raster.is_file() {
        bail!("Invalid raster path: {:?}", raster);
    }
    let polygon = load_polygon(args)?;
    let source = GdalRaster::open(raster)?;
    let options = MaskOptions {
        all_touched: !args.center_only,
    };
    info!("Masking {:?}", raster);
    Ok(build_masked_grid(&polygon, &source, modifications, &options)?)
}

/// Row-major values with masked cells as `null`.
fn grid_json(grid: &Grid) -> JsonValue {
    let rows: Vec<Vec<Option<f64>>> = (0..grid.rows())
        .map(|r| (0..grid.cols()).map(|c| grid.get(r, c)).collect())
        .collect();
    json!({ "rows": grid.rows(), "cols": grid.cols(), "values": rows })
}
