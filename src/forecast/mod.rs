//! Forecast service: one explicitly constructed object that owns the data
//! collaborators for the life of the process.

pub mod weather;

use hifitime::Epoch;
use rayon::prelude::*;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::Settings;
use crate::error::{Result, VisibilityError};
use crate::geo::Coordinate;
use crate::orbit::events::linspace_tt;
use crate::io::{rank_spots, SpotRecord};
use crate::orbit::{
    find_passes, Ephemeris, InternationalDesignator, Observer, SatelliteCatalog, SatelliteKind,
    SatelliteRef, TimeWindow,
};
use crate::physics::horizon::{
    horizon_profile_from_ground, observer_ground, HorizonParams, HorizonProfile,
    MIN_PLAUSIBLE_ELEVATION,
};
use crate::physics::sky_glow::SkyDarkness;
use crate::scoring::{
    rank_events, serialize_utc, PassScorer, ScoringConfig, VisibilityEvent, WeatherSeries,
};
use crate::terrain::{ElevationStore, Raster};

pub use weather::{fetch_forecasts, WeatherProvider, WeatherQuery};

/// Trajectory samples per request when the caller does not say.
pub const DEFAULT_TRAJECTORY_SAMPLES: usize = 30;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForecastReport {
    pub total: usize,
    pub events: Vec<VisibilityEvent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostic: Option<String>,
}

impl ForecastReport {
    fn empty(reason: impl Into<String>) -> Self {
        Self { total: 0, events: Vec::new(), diagnostic: Some(reason.into()) }
    }

    fn ranked(mut events: Vec<VisibilityEvent>, limit: usize, offset: usize) -> Self {
        rank_events(&mut events);
        let total = events.len();
        let events: Vec<VisibilityEvent> = events.into_iter().skip(offset).take(limit).collect();
        debug!(total, returned = events.len(), "forecast complete");
        Self { total, events, diagnostic: None }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Position {
    pub international_designator: InternationalDesignator,
    pub az: f64,
    pub alt: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Trajectory {
    #[serde(serialize_with = "serialize_utc")]
    pub timestamp: Epoch,
    pub positions: Vec<Position>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrajectoryReport {
    pub trajectories: Vec<Trajectory>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostic: Option<String>,
}

/// What one propagation run stands for: a lead satellite and the
/// designators reported with its events.
struct Candidate {
    satellite: Arc<SatelliteRef>,
    members: Vec<InternationalDesignator>,
}

pub struct ForecastService {
    store: ElevationStore,
    ephemeris: Arc<dyn Ephemeris>,
    catalog: SatelliteCatalog,
    brightness: Option<Arc<dyn Raster>>,
    horizon: HorizonParams,
    darkness: SkyDarkness,
    scoring: ScoringConfig,
    weather_concurrency: usize,
    candidate_spots: usize,
}

impl ForecastService {
    pub fn new(
        store: ElevationStore,
        ephemeris: Arc<dyn Ephemeris>,
        catalog: SatelliteCatalog,
        settings: &Settings,
    ) -> Result<Self> {
        settings.validate()?;
        info!(satellites = catalog.len(), "forecast service ready");
        Ok(Self {
            store,
            ephemeris,
            catalog,
            brightness: None,
            horizon: settings.horizon.on_demand(),
            darkness: settings.sky,
            scoring: settings.scoring,
            weather_concurrency: settings.weather.concurrency_limit,
            candidate_spots: settings.recommend.candidate_spots,
        })
    }

    /// Artificial-brightness raster used for the sky-darkness factor. Without
    /// one every location scores as the brightest configured sky.
    pub fn with_brightness(mut self, raster: Arc<dyn Raster>) -> Self {
        self.brightness = Some(raster);
        self
    }

    pub fn catalog(&self) -> &SatelliteCatalog {
        &self.catalog
    }

    pub fn store(&self) -> &ElevationStore {
        &self.store
    }

    /// Ground elevation at `coord`, or the reason it cannot be used.
    fn observer(&self, coord: Coordinate) -> Result<std::result::Result<Observer, String>> {
        match observer_ground(&self.store, coord) {
            Ok(elevation_m) => Ok(Ok(Observer { coordinate: coord, elevation_m })),
            Err(e) if e.is_data_absence() => Ok(Err(e.to_string())),
            Err(e) => Err(e),
        }
    }

    /// A stored spot elevation is trusted when plausible; otherwise the
    /// ground comes from the store.
    fn spot_observer(&self, spot: &SpotRecord) -> Result<std::result::Result<Observer, String>> {
        match spot.elevation_m {
            Some(elevation_m) if elevation_m >= MIN_PLAUSIBLE_ELEVATION => {
                Ok(Ok(Observer { coordinate: spot.coordinate, elevation_m }))
            }
            _ => self.observer(spot.coordinate),
        }
    }

    /// Perceptual darkness at `coord` from the brightness raster.
    pub fn sky_darkness(&self, coord: Coordinate) -> Result<f64> {
        let artificial = match &self.brightness {
            Some(raster) => raster
                .sample(&[coord.lon_lat()])?
                .first()
                .copied()
                .filter(|v| v.is_finite()),
            None => None,
        };
        Ok(self.darkness.score(artificial))
    }

    fn candidates(&self) -> Vec<Candidate> {
        let mut candidates = Vec::new();
        for (_, members) in self.catalog.groups() {
            let Some(lead) = members.first() else { continue };
            match lead.kind {
                SatelliteKind::Station => candidates.extend(members.iter().map(|s| Candidate {
                    satellite: s.clone(),
                    members: vec![s.designator.clone()],
                })),
                SatelliteKind::StarlinkTrain => candidates.push(Candidate {
                    satellite: lead.clone(),
                    members: members.iter().map(|s| s.designator.clone()).collect(),
                }),
            }
        }
        candidates
    }

    /// Ranked visibility events at `coord` over `window`, paginated.
    ///
    /// Missing or implausible ground data is not an error here: the report
    /// comes back empty with a diagnostic.
    pub fn forecast_events(
        &self,
        coord: Coordinate,
        window: TimeWindow,
        weather: &WeatherSeries,
        limit: usize,
        offset: usize,
    ) -> Result<ForecastReport> {
        let observer = match self.observer(coord)? {
            Ok(observer) => observer,
            Err(reason) => {
                let (lat, lon) = (coord.latitude(), coord.longitude());
                warn!(lat, lon, %reason, "no forecast for location");
                return Ok(ForecastReport::empty(reason));
            }
        };

        let profile =
            horizon_profile_from_ground(&self.store, coord, observer.elevation_m, &self.horizon)?;
        let sky_glow = self.sky_darkness(coord)?;

        let events = self.score_candidates(&observer, window, &profile, sky_glow, weather, None)?;
        Ok(ForecastReport::ranked(events, limit, offset))
    }

    /// Ranked events over the best stored spots around `center`.
    ///
    /// The top `candidate_spots` spots by static score within `radius_km`
    /// get a weather forecast each (bounded fan-out) and are scored with
    /// their stored skyline and brightness. A spot whose weather or ground
    /// data is missing drops out alone. Events carry the spot name.
    #[allow(clippy::too_many_arguments)]
    pub async fn recommend_events(
        &self,
        center: Coordinate,
        radius_km: f64,
        spots: &[SpotRecord],
        window: TimeWindow,
        provider: Arc<dyn WeatherProvider>,
        limit: usize,
        offset: usize,
    ) -> Result<ForecastReport> {
        let ranked = rank_spots(spots, center, radius_km, self.candidate_spots, &self.darkness);
        if ranked.is_empty() {
            return Ok(ForecastReport::empty(format!("no spots within {radius_km} km")));
        }

        let queries: Vec<WeatherQuery> = ranked
            .iter()
            .map(|r| WeatherQuery {
                coordinate: r.spot.coordinate,
                elevation_m: r.spot.elevation_m,
            })
            .collect();
        let forecasts = fetch_forecasts(provider, &queries, self.weather_concurrency).await?;
        info!(spots = ranked.len(), radius_km, "scoring candidate spots");

        let mut events = Vec::new();
        for (candidate, forecast) in ranked.iter().zip(forecasts) {
            let spot = &candidate.spot;
            let Ok(weather) = forecast else {
                debug!(spot = %spot.name, "no weather, spot skipped");
                continue;
            };
            let observer = match self.spot_observer(spot)? {
                Ok(observer) => observer,
                Err(reason) => {
                    warn!(spot = %spot.name, %reason, "spot skipped");
                    continue;
                }
            };

            let stored = spot.horizon_profile.as_ref().filter(|angles| !angles.is_empty());
            let profile = match stored {
                Some(angles) => HorizonProfile::from_angles(angles.clone()),
                None => horizon_profile_from_ground(
                    &self.store,
                    spot.coordinate,
                    observer.elevation_m,
                    &self.horizon,
                )?,
            };
            let sky_glow = match spot.artificial_brightness {
                Some(brightness) => self.darkness.score(Some(brightness)),
                None => self.sky_darkness(spot.coordinate)?,
            };

            events.extend(self.score_candidates(
                &observer,
                window,
                &profile,
                sky_glow,
                &weather,
                Some(spot.name.as_str()),
            )?);
        }

        Ok(ForecastReport::ranked(events, limit, offset))
    }

    fn score_candidates(
        &self,
        observer: &Observer,
        window: TimeWindow,
        profile: &HorizonProfile,
        sky_glow: f64,
        weather: &WeatherSeries,
        location_name: Option<&str>,
    ) -> Result<Vec<VisibilityEvent>> {
        let scorer = PassScorer {
            ephemeris: self.ephemeris.as_ref(),
            observer: *observer,
            profile,
            sky_glow,
            weather,
            config: &self.scoring,
        };

        let per_candidate: Vec<Vec<VisibilityEvent>> = self
            .candidates()
            .par_iter()
            .map(|candidate| -> Result<Vec<VisibilityEvent>> {
                let sat = candidate.satellite.as_ref();
                let min_elevation = self.scoring.min_elevation_deg;
                let found = find_passes(scorer.ephemeris, sat, observer, window, min_elevation);
                let passes = match found {
                    Ok(passes) => passes,
                    Err(VisibilityError::Upstream(e)) => {
                        let satellite = &sat.designator;
                        warn!(%satellite, error = %e, "pass search failed, skipping");
                        return Ok(Vec::new());
                    }
                    Err(e) => return Err(e),
                };

                let mut events = Vec::new();
                for pass in &passes {
                    let Some((span, scores)) = scorer.score(sat, pass)? else { continue };
                    events.push(VisibilityEvent {
                        location_name: location_name.map(str::to_string),
                        start_time: span.rise(),
                        end_time: span.set(),
                        scores,
                        event_type: sat.kind,
                        lat: observer.coordinate.latitude(),
                        lon: observer.coordinate.longitude(),
                        international_designators: candidate.members.clone(),
                    });
                }
                Ok(events)
            })
            .collect::<Result<_>>()?;

        Ok(per_candidate.into_iter().flatten().collect())
    }

    /// Alt/az of each requested satellite at `count` instants spread evenly
    /// (in TT) over `window`. Unknown designators are skipped.
    pub fn trajectories(
        &self,
        coord: Coordinate,
        designators: &[InternationalDesignator],
        window: TimeWindow,
        count: usize,
    ) -> Result<TrajectoryReport> {
        let satellites: Vec<&Arc<SatelliteRef>> =
            designators.iter().filter_map(|d| self.catalog.get(d)).collect();
        if satellites.is_empty() {
            return Err(VisibilityError::invalid("none of the requested satellites are known"));
        }

        let observer = match self.observer(coord)? {
            Ok(observer) => observer,
            Err(reason) => {
                return Ok(TrajectoryReport { trajectories: Vec::new(), diagnostic: Some(reason) });
            }
        };

        let trajectories = linspace_tt(window.start, window.end, count)
            .into_iter()
            .map(|at| {
                let positions = satellites
                    .iter()
                    .map(|sat| {
                        let p = self.ephemeris.satellite_at(sat, &observer, at)?;
                        Ok(Position {
                            international_designator: sat.designator.clone(),
                            az: p.azimuth_deg,
                            alt: p.altitude_deg,
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok(Trajectory { timestamp: at, positions })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(TrajectoryReport { trajectories, diagnostic: None })
    }

    /// Release open tile handles. The service stays usable; tiles reopen on
    /// demand.
    pub fn shutdown(&self) {
        let metrics = self.store.cache_metrics();
        info!(
            open_tiles = self.store.open_tiles(),
            hits = metrics.hits,
            misses = metrics.misses,
            evictions = metrics.evictions,
            "closing elevation store"
        );
        self.store.close_all();
    }
}
