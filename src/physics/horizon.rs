use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Result, VisibilityError};
use crate::geo::{destination, Coordinate};
use crate::physics::curvature::viewing_angle;
use crate::terrain::ElevationStore;

/// Observer ground elevations below this are ocean/no-data artifacts.
pub const MIN_PLAUSIBLE_ELEVATION: f64 = -1000.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HorizonParams {
    pub eye_height_m: f64,
    pub num_directions: usize,
    pub max_distance_m: f64,
    pub num_samples: usize,
}

impl Default for HorizonParams {
    fn default() -> Self {
        Self {
            eye_height_m: 1.55,
            num_directions: 180,
            max_distance_m: 100_000.0,
            num_samples: 100,
        }
    }
}

impl HorizonParams {
    /// Lighter scan used when a profile is computed per request instead of
    /// precomputed for a stored spot.
    pub fn on_demand() -> Self {
        Self {
            max_distance_m: 50_000.0,
            num_samples: 50,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.num_directions == 0 {
            return Err(VisibilityError::invalid("num_directions must be > 0"));
        }
        if self.num_samples == 0 {
            return Err(VisibilityError::invalid("num_samples must be > 0"));
        }
        if !(self.max_distance_m >= 1.0) {
            return Err(VisibilityError::invalid(format!(
                "max_distance_m must be >= 1, got {}",
                self.max_distance_m
            )));
        }
        if !self.eye_height_m.is_finite() {
            return Err(VisibilityError::invalid("eye_height_m must be finite"));
        }
        Ok(())
    }
}

/// Terrain skyline: the maximum elevation angle (deg) per azimuth bin,
/// bins evenly spaced clockwise from North.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HorizonProfile {
    pub azimuths: Vec<f64>,
    pub angles: Vec<f64>,
}

impl HorizonProfile {
    /// Rebuild a profile from stored angles (azimuths are implied).
    pub fn from_angles(angles: Vec<f64>) -> Self {
        Self { azimuths: azimuths(angles.len()), angles }
    }

    pub fn len(&self) -> usize {
        self.angles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.angles.is_empty()
    }

    /// Bin holding `azimuth_deg`: `floor(az / 360 * N)`, clamped.
    pub fn bin_for_azimuth(&self, azimuth_deg: f64) -> usize {
        let n = self.angles.len();
        if n == 0 {
            return 0;
        }
        let idx = (azimuth_deg / 360.0 * n as f64).floor();
        if idx.is_nan() || idx < 0.0 {
            0
        } else {
            (idx as usize).min(n - 1)
        }
    }

    pub fn angle_at(&self, azimuth_deg: f64) -> Option<f64> {
        self.angles.get(self.bin_for_azimuth(azimuth_deg)).copied()
    }

    /// Fraction of bins whose skyline sits at or below `threshold_deg`.
    /// `None` for an empty profile.
    pub fn fraction_at_or_below(&self, threshold_deg: f64) -> Option<f64> {
        fraction_at_or_below(&self.angles, threshold_deg)
    }
}

pub fn fraction_at_or_below(angles: &[f64], threshold_deg: f64) -> Option<f64> {
    if angles.is_empty() {
        return None;
    }
    let open = angles.iter().filter(|&&a| a <= threshold_deg).count();
    Some(open as f64 / angles.len() as f64)
}

/// `n` azimuths evenly spaced over [0, 360).
pub fn azimuths(n: usize) -> Vec<f64> {
    (0..n).map(|i| i as f64 * 360.0 / n as f64).collect()
}

/// Geometrically spaced ray distances over [1, max]: dense near the observer.
pub fn sample_distances(max_distance_m: f64, num_samples: usize) -> Vec<f64> {
    if num_samples == 1 {
        return vec![max_distance_m];
    }
    let span = max_distance_m.ln();
    let last = (num_samples - 1) as f64;
    (0..num_samples)
        .map(|i| (span * i as f64 / last).exp())
        .collect()
}

/// Skyline angle per azimuth seen from an eye at `observer_height` (m AMSL).
///
/// All rays are resolved against the store in one batch. Missing terrain is
/// taken as sea level so gaps do not cut a ray short.
pub fn scan_azimuths(
    store: &ElevationStore,
    observer: Coordinate,
    observer_height: f64,
    azimuths: &[f64],
    distances: &[f64],
) -> Vec<f64> {
    let coords: Vec<Coordinate> = azimuths
        .iter()
        .flat_map(|&az| distances.iter().map(move |&d| destination(observer, az, d)))
        .collect();

    let elevations = store.elevations(&coords);

    elevations
        .chunks(distances.len())
        .map(|ray| {
            ray.iter()
                .zip(distances)
                .map(|(h, &d)| viewing_angle(observer_height, h.unwrap_or(0.0), d))
                .fold(-90.0_f64, f64::max)
        })
        .collect()
}

/// Horizon profile around `observer`, resolving its ground elevation first.
pub fn compute_horizon_profile(
    store: &ElevationStore,
    observer: Coordinate,
    params: &HorizonParams,
) -> Result<HorizonProfile> {
    params.validate()?;
    let ground = observer_ground(store, observer)?;
    horizon_profile_from_ground(store, observer, ground, params)
}

/// Ground elevation under `observer`. Missing or implausible ground aborts
/// every profile built on it.
pub fn observer_ground(store: &ElevationStore, observer: Coordinate) -> Result<f64> {
    let (lat, lon) = (observer.latitude(), observer.longitude());
    let Some(ground) = store.elevation_at(observer) else {
        warn!(lat, lon, "observer elevation unavailable");
        return Err(VisibilityError::DataUnavailable(observer));
    };
    if ground < MIN_PLAUSIBLE_ELEVATION {
        warn!(lat, lon, ground, "implausible observer elevation");
        return Err(VisibilityError::ObserverElevation { at: observer, elevation_m: ground });
    }
    Ok(ground)
}

/// Horizon profile for an observer whose ground elevation is already known.
///
/// Azimuths are split across the rayon pool; every worker scans its share
/// through its own fork of `store` so no tile handles are shared.
pub fn horizon_profile_from_ground(
    store: &ElevationStore,
    observer: Coordinate,
    ground_m: f64,
    params: &HorizonParams,
) -> Result<HorizonProfile> {
    params.validate()?;

    let observer_height = ground_m + params.eye_height_m;
    let azimuths = azimuths(params.num_directions);
    let distances = sample_distances(params.max_distance_m, params.num_samples);

    let workers = rayon::current_num_threads().max(1);
    let chunk = params.num_directions.div_ceil(workers);
    debug!(
        workers,
        directions = params.num_directions,
        samples = params.num_samples,
        "scanning horizon"
    );

    let angles: Vec<f64> = azimuths
        .par_chunks(chunk)
        .map(|share| {
            let local = store.fork();
            let angles = scan_azimuths(&local, observer, observer_height, share, &distances);
            local.close_all();
            angles
        })
        .collect::<Vec<_>>()
        .into_iter()
        .flatten()
        .collect();

    Ok(HorizonProfile { azimuths, angles })
}
