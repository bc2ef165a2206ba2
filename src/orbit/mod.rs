pub mod catalog;
pub mod events;

use hifitime::Epoch;

use crate::error::{Result, VisibilityError};
use crate::geo::Coordinate;

pub use catalog::{
    InternationalDesignator, LaunchGroup, SatelliteCatalog, SatelliteKind, SatelliteRef,
};
pub use events::{extract_passes, EventKind, PassEvent, PassWindow};

/// Ground observer as the propagator sees it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Observer {
    pub coordinate: Coordinate,
    pub elevation_m: f64,
}

/// Satellite position relative to an observer at one instant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TopocentricSample {
    pub altitude_deg: f64,
    pub azimuth_deg: f64,
    pub sunlit: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MoonState {
    pub altitude_deg: f64,
    /// Illuminated fraction of the disc, 0..=1.
    pub illuminated_fraction: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeWindow {
    pub start: Epoch,
    pub end: Epoch,
}

impl TimeWindow {
    pub fn new(start: Epoch, end: Epoch) -> Result<Self> {
        if end <= start {
            return Err(VisibilityError::invalid(format!(
                "degenerate time window: {start} .. {end}"
            )));
        }
        Ok(Self { start, end })
    }
}

/// Orbit propagation and solar-system geometry.
///
/// Implementations wrap an SGP4 propagator and a planetary ephemeris; the core
/// only consumes their outputs.
pub trait Ephemeris: Send + Sync {
    /// Threshold crossings for one satellite, as `(instant, code)` with codes
    /// `0` rise, `1` culmination, `2` set, in time order.
    fn find_events(
        &self,
        satellite: &SatelliteRef,
        observer: &Observer,
        window: TimeWindow,
        min_elevation_deg: f64,
    ) -> anyhow::Result<Vec<(Epoch, u8)>>;

    fn satellite_at(
        &self,
        satellite: &SatelliteRef,
        observer: &Observer,
        at: Epoch,
    ) -> anyhow::Result<TopocentricSample>;

    fn sun_altitude(&self, observer: &Observer, at: Epoch) -> anyhow::Result<f64>;

    fn moon_at(&self, observer: &Observer, at: Epoch) -> anyhow::Result<MoonState>;
}

/// Rise/peak/set cycles for `satellite` over `window`.
pub fn find_passes(
    ephemeris: &dyn Ephemeris,
    satellite: &SatelliteRef,
    observer: &Observer,
    window: TimeWindow,
    min_elevation_deg: f64,
) -> Result<Vec<PassEvent>> {
    let raw = ephemeris.find_events(satellite, observer, window, min_elevation_deg)?;
    extract_passes(&raw)
}
