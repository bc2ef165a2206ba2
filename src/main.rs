//! sat-spotter CLI: terrain skyline, sky glow and spot ranking from local data.
//!
//! Results go to stdout as JSON; logs go to stderr (`RUST_LOG` to tune).

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::time::Instant;
use tracing::info;
use tracing_subscriber::EnvFilter;

use sat_spotter::config::Settings;
use sat_spotter::geo::Coordinate;
use sat_spotter::io::{load_spots, rank_spots};
use sat_spotter::orbit::{SatelliteCatalog, SatelliteKind};
use sat_spotter::physics::horizon::compute_horizon_profile;
use sat_spotter::physics::sky_glow::sky_glow_score;
use sat_spotter::terrain::{GridRaster, Raster};

#[derive(Parser)]
#[command(name = "sat-spotter")]
#[command(about = "Where and when to watch satellite passes", long_about = None)]
struct Args {
    /// Settings file (TOML). Built-in defaults when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Terrain skyline around a point
    Horizon {
        #[arg(long)]
        lat: f64,
        #[arg(long)]
        lon: f64,
        /// Use the lighter per-request scan
        #[arg(long)]
        on_demand: bool,
    },
    /// Raw sky-glow integral and perceptual darkness at a point
    SkyGlow {
        #[arg(long)]
        lat: f64,
        #[arg(long)]
        lon: f64,
    },
    /// Rank stored spots around a point by static score
    Spots {
        /// Spot list, .csv or .json
        #[arg(long)]
        file: PathBuf,
        #[arg(long)]
        lat: f64,
        #[arg(long)]
        lon: f64,
        #[arg(long, default_value = "50")]
        radius_km: f64,
        #[arg(long, default_value = "10")]
        limit: usize,
    },
    /// Launch groups in the configured element-set files
    Catalog,
    /// Local path of the DEM tile for an 8-digit mesh code
    TilePath { code: String },
}

#[derive(Serialize)]
struct SkyGlowReport {
    sky_glow: Option<f64>,
    sky_darkness: f64,
}

#[derive(Serialize)]
struct GroupSummary {
    launch_group: String,
    kind: SatelliteKind,
    satellites: usize,
}

fn init_logging() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn load_raster(settings: &Settings, path: Option<&PathBuf>) -> Result<Option<GridRaster>> {
    path.map(|p| GridRaster::from_ascii_grid(&settings.data_path(p))).transpose()
}

fn main() -> Result<()> {
    init_logging();
    let args = Args::parse();

    let settings = match &args.config {
        Some(path) => Settings::from_file(path).with_context(|| format!("loading {:?}", path))?,
        None => Settings::default(),
    };

    match args.command {
        Command::Horizon { lat, lon, on_demand } => {
            let observer = Coordinate::new(lat, lon)?;
            let params = if on_demand {
                settings.horizon.on_demand()
            } else {
                settings.horizon.precomputed()
            };
            let store = settings.elevation_store()?;

            let start = Instant::now();
            let profile = compute_horizon_profile(&store, observer, &params)?;
            let metrics = store.cache_metrics();
            info!(
                elapsed_ms = start.elapsed().as_millis() as u64,
                hits = metrics.hits,
                misses = metrics.misses,
                "horizon profile computed"
            );
            store.close_all();
            print_json(&profile)?;
        }
        Command::SkyGlow { lat, lon } => {
            let observer = Coordinate::new(lat, lon)?;

            let radiance = load_raster(&settings, settings.data.nighttime_light.as_ref())?;
            let sky_glow = radiance
                .map(|r| sky_glow_score(&r, observer, &settings.sky_glow))
                .transpose()?;

            let brightness = load_raster(&settings, settings.data.world_atlas.as_ref())?;
            let artificial = match brightness {
                Some(raster) => raster
                    .sample(&[observer.lon_lat()])?
                    .first()
                    .copied()
                    .filter(|v| v.is_finite()),
                None => None,
            };

            print_json(&SkyGlowReport { sky_glow, sky_darkness: settings.sky.score(artificial) })?;
        }
        Command::Spots { file, lat, lon, radius_km, limit } => {
            let center = Coordinate::new(lat, lon)?;
            let spots = load_spots(&file)?;
            info!(spots = spots.len(), "loaded spots");
            print_json(&rank_spots(&spots, center, radius_km, limit, &settings.sky))?;
        }
        Command::Catalog => {
            let mut catalog = SatelliteCatalog::new();
            for (path, kind) in [
                (&settings.data.tle_starlink, SatelliteKind::StarlinkTrain),
                (&settings.data.tle_stations, SatelliteKind::Station),
            ] {
                let path = settings.data_path(path);
                let text = std::fs::read_to_string(&path)
                    .with_context(|| format!("reading {:?}", path))?;
                catalog.extend_from_tle_text(&text, kind)?;
            }

            let groups: Vec<GroupSummary> = catalog
                .groups()
                .filter_map(|(group, members)| {
                    members.first().map(|lead| GroupSummary {
                        launch_group: group.to_string(),
                        kind: lead.kind,
                        satellites: members.len(),
                    })
                })
                .collect();
            print_json(&groups)?;
        }
        Command::TilePath { code } => {
            println!("{}", settings.dem_tile_path(&code)?.display());
        }
    }

    Ok(())
}
