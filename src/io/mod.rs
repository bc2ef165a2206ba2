use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::path::Path;
use anyhow::Context;

use crate::geo::{calculate_geodesic, Coordinate};
use crate::physics::horizon::fraction_at_or_below;
use crate::physics::sky_glow::SkyDarkness;

/// Skyline angles at or below this leave the sky open in that direction.
pub const OPEN_SKYLINE_DEG: f64 = 3.0;

/// A candidate observing spot with its precomputed static inputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpotRecord {
    pub name: String,
    pub coordinate: Coordinate,
    #[serde(default)]
    pub elevation_m: Option<f64>,
    /// Skyline angle per azimuth bin, clockwise from North.
    #[serde(default)]
    pub horizon_profile: Option<Vec<f64>>,
    /// Modelled artificial sky brightness, mcd/m².
    #[serde(default)]
    pub artificial_brightness: Option<f64>,
}

/// Flat CSV layout: `name,latitude,longitude[,elevation_m,artificial_brightness]`.
#[derive(Debug, Deserialize)]
struct SpotRow {
    name: String,
    latitude: f64,
    longitude: f64,
    #[serde(default)]
    elevation_m: Option<f64>,
    #[serde(default)]
    artificial_brightness: Option<f64>,
}

pub fn load_spots_from_csv(path: &Path) -> anyhow::Result<Vec<SpotRecord>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("Failed to open {:?}", path))?;

    let mut spots = Vec::new();
    for (line, row) in reader.deserialize::<SpotRow>().enumerate() {
        let row = row.with_context(|| format!("{:?}: bad record {}", path, line + 1))?;
        let coordinate = Coordinate::new(row.latitude, row.longitude)
            .with_context(|| format!("{:?}: spot {:?}", path, row.name))?;
        spots.push(SpotRecord {
            name: row.name,
            coordinate,
            elevation_m: row.elevation_m,
            horizon_profile: None,
            artificial_brightness: row.artificial_brightness,
        });
    }
    Ok(spots)
}

pub fn load_spots_from_json(path: &Path) -> anyhow::Result<Vec<SpotRecord>> {
    let file = std::fs::File::open(path).with_context(|| format!("Failed to open {:?}", path))?;
    let reader = std::io::BufReader::new(file);
    let spots: Vec<SpotRecord> = serde_json::from_reader(reader)?;
    Ok(spots)
}

/// Picks the loader from the file extension (`.csv`, else JSON).
pub fn load_spots(path: &Path) -> anyhow::Result<Vec<SpotRecord>> {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("csv") => load_spots_from_csv(path),
        _ => load_spots_from_json(path),
    }
}

/// Share of the skyline that stays low enough to watch a pass over.
pub fn topography_score(horizon_profile: &[f64]) -> Option<f64> {
    fraction_at_or_below(horizon_profile, OPEN_SKYLINE_DEG)
}

/// Terrain openness times sky darkness. `None` when the spot has no profile.
pub fn static_score(spot: &SpotRecord, darkness: &SkyDarkness) -> Option<f64> {
    let topography = topography_score(spot.horizon_profile.as_deref()?)?;
    Some(topography * darkness.score(spot.artificial_brightness))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedSpot {
    #[serde(flatten)]
    pub spot: SpotRecord,
    pub distance_m: f64,
    pub static_score: Option<f64>,
}

/// Spots within `radius_km` of `center`, best static score first.
/// Unscored spots go last; ties go to the nearer spot.
pub fn rank_spots(
    spots: &[SpotRecord],
    center: Coordinate,
    radius_km: f64,
    limit: usize,
    darkness: &SkyDarkness,
) -> Vec<RankedSpot> {
    let radius_m = radius_km * 1000.0;
    let mut ranked: Vec<RankedSpot> = spots
        .iter()
        .filter_map(|spot| {
            let (distance_m, _) = calculate_geodesic(center, spot.coordinate);
            (distance_m <= radius_m).then(|| RankedSpot {
                spot: spot.clone(),
                distance_m,
                static_score: static_score(spot, darkness),
            })
        })
        .collect();

    ranked.sort_by(|a, b| {
        let by_score = match (a.static_score, b.static_score) {
            (Some(x), Some(y)) => y.total_cmp(&x),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        };
        by_score.then(a.distance_m.total_cmp(&b.distance_m))
    });
    ranked.truncate(limit);
    ranked
}
