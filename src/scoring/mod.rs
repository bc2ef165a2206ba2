//! Pass filtering and the multiplicative visibility score.

pub mod weather;

use hifitime::Epoch;
use serde::{Deserialize, Serialize, Serializer};
use tracing::debug;

use crate::error::{Result, VisibilityError};
use crate::orbit::{
    Ephemeris, InternationalDesignator, MoonState, Observer, PassEvent, PassWindow, SatelliteKind,
    SatelliteRef, TopocentricSample,
};
use crate::physics::horizon::HorizonProfile;

pub use weather::{MeteorologicalScore, VisibilityRange, WeatherSample, WeatherSeries};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Instants sampled per pass. Fixed regardless of pass length.
    pub samples_per_pass: usize,
    pub dark_sky_sun_altitude_deg: f64,
    pub min_elevation_deg: f64,
    pub visibility: VisibilityRange,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            samples_per_pass: 10,
            dark_sky_sun_altitude_deg: -6.0,
            min_elevation_deg: 10.0,
            visibility: VisibilityRange::default(),
        }
    }
}

impl ScoringConfig {
    pub fn validate(&self) -> Result<()> {
        if self.samples_per_pass == 0 {
            return Err(VisibilityError::invalid("samples_per_pass must be > 0"));
        }
        if !(-90.0..=90.0).contains(&self.min_elevation_deg) {
            return Err(VisibilityError::invalid(format!(
                "min_elevation_deg out of range: {}",
                self.min_elevation_deg
            )));
        }
        self.visibility.validate()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PassSample {
    pub at: Epoch,
    pub satellite: TopocentricSample,
    pub sun_altitude_deg: f64,
}

impl PassSample {
    /// Dark sky and a sunlit satellite: the satellite can shine.
    pub fn is_observable(&self, dark_sun_altitude_deg: f64) -> bool {
        self.sun_altitude_deg <= dark_sun_altitude_deg && self.satellite.sunlit
    }
}

pub fn sample_pass(
    ephemeris: &dyn Ephemeris,
    satellite: &SatelliteRef,
    observer: &Observer,
    window: &PassWindow,
    count: usize,
) -> Result<Vec<PassSample>> {
    window
        .sample_instants(count)
        .into_iter()
        .map(|at| {
            Ok(PassSample {
                at,
                satellite: ephemeris.satellite_at(satellite, observer, at)?,
                sun_altitude_deg: ephemeris.sun_altitude(observer, at)?,
            })
        })
        .collect()
}

/// At least one sampled instant with the satellite lit against a dark sky.
pub fn passes_darkness_filter(samples: &[PassSample], dark_sun_altitude_deg: f64) -> bool {
    samples.iter().any(|s| s.is_observable(dark_sun_altitude_deg))
}

/// Share of samples where the satellite clears the skyline and is observable.
pub fn visible_time_ratio(
    samples: &[PassSample],
    profile: &HorizonProfile,
    dark_sun_altitude_deg: f64,
) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let visible = samples
        .iter()
        .filter(|s| {
            let skyline = profile.angle_at(s.satellite.azimuth_deg).unwrap_or(0.0);
            s.satellite.altitude_deg > skyline && s.is_observable(dark_sun_altitude_deg)
        })
        .count();
    visible as f64 / samples.len() as f64
}

pub fn moon_score(moon: &MoonState) -> f64 {
    if moon.altitude_deg <= 0.0 {
        1.0
    } else {
        (1.0 - moon.illuminated_fraction).clamp(0.0, 1.0)
    }
}

/// Sub-scores of one event and their product.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScoreBreakdown {
    pub visibility: f64,
    pub visible_time_ratio: f64,
    pub sky_glow: f64,
    pub moon_fract_illumi: f64,
    pub rain: f64,
    pub cloud: f64,
    pub met_visibility: f64,
}

impl ScoreBreakdown {
    pub fn combine(
        visible_time_ratio: f64,
        sky_glow: f64,
        moon: f64,
        met: MeteorologicalScore,
    ) -> Self {
        let visibility = visible_time_ratio * sky_glow * moon * met.product();
        Self {
            visibility,
            visible_time_ratio,
            sky_glow,
            moon_fract_illumi: moon,
            rain: met.rain,
            cloud: met.cloud,
            met_visibility: met.visibility,
        }
    }
}

/// Everything fixed for one observer while its passes are scored.
pub struct PassScorer<'a> {
    pub ephemeris: &'a dyn Ephemeris,
    pub observer: Observer,
    pub profile: &'a HorizonProfile,
    pub sky_glow: f64,
    pub weather: &'a WeatherSeries,
    pub config: &'a ScoringConfig,
}

impl PassScorer<'_> {
    /// `None` when the pass is incomplete or never observable.
    pub fn score(
        &self,
        satellite: &SatelliteRef,
        pass: &PassEvent,
    ) -> Result<Option<(PassWindow, ScoreBreakdown)>> {
        let Some(window) = pass.complete() else {
            debug!(satellite = %satellite.designator, ?pass, "dropping incomplete pass");
            return Ok(None);
        };

        let dark = self.config.dark_sky_sun_altitude_deg;
        let count = self.config.samples_per_pass;
        let samples = sample_pass(self.ephemeris, satellite, &self.observer, &window, count)?;
        if !passes_darkness_filter(&samples, dark) {
            return Ok(None);
        }

        let ratio = visible_time_ratio(&samples, self.profile, dark);
        let moon = moon_score(&self.ephemeris.moon_at(&self.observer, window.peak())?);
        let met = MeteorologicalScore::at(self.weather, window.rise(), &self.config.visibility);

        Ok(Some((window, ScoreBreakdown::combine(ratio, self.sky_glow, moon, met))))
    }
}

/// ISO-8601 in UTC with an explicit `+00:00` offset. Microseconds appear
/// only when non-zero.
pub fn format_utc(epoch: &Epoch) -> String {
    let (y, mo, d, h, mi, s, ns) = epoch.to_gregorian_utc();
    match ns / 1_000 {
        0 => format!("{y:04}-{mo:02}-{d:02}T{h:02}:{mi:02}:{s:02}+00:00"),
        us => format!("{y:04}-{mo:02}-{d:02}T{h:02}:{mi:02}:{s:02}.{us:06}+00:00"),
    }
}

pub(crate) fn serialize_utc<S: Serializer>(
    epoch: &Epoch,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_str(&format_utc(epoch))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VisibilityEvent {
    pub location_name: Option<String>,
    #[serde(serialize_with = "serialize_utc")]
    pub start_time: Epoch,
    #[serde(serialize_with = "serialize_utc")]
    pub end_time: Epoch,
    pub scores: ScoreBreakdown,
    pub event_type: SatelliteKind,
    pub lat: f64,
    pub lon: f64,
    pub international_designators: Vec<InternationalDesignator>,
}

/// Highest visibility first; ties keep their order.
pub fn rank_events(events: &mut [VisibilityEvent]) {
    events.sort_by(|a, b| b.scores.visibility.total_cmp(&a.scores.visibility));
}
