//! Unit tests with in-memory collaborators standing in for rasters, the
//! orbit propagator and the weather service.

mod cache;
mod horizon;
mod terrain;

use hifitime::{Duration, Epoch};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::geo::{Coordinate, MeshCode};
use crate::orbit::{Ephemeris, MoonState, Observer, SatelliteRef, TimeWindow, TopocentricSample};
use crate::terrain::{ElevationStore, GridRaster, Raster, TileOpener, TileResolver};

pub(crate) fn epoch(hour: u8, minute: u8) -> Epoch {
    Epoch::from_gregorian_utc_hms(2025, 3, 1, hour, minute, 0)
}

pub(crate) fn minutes(m: f64) -> Duration {
    Duration::from_seconds(m * 60.0)
}

pub(crate) fn coord(latitude: f64, longitude: f64) -> Coordinate {
    Coordinate::new(latitude, longitude).unwrap()
}

/// Mt. Fuji area, inside the mesh-code domain.
pub(crate) fn fuji() -> Coordinate {
    coord(35.36, 138.73)
}

/// Elevation as a function of (lon, lat).
pub(crate) struct FnRaster<F>(pub F);

impl<F> Raster for FnRaster<F>
where
    F: Fn(f64, f64) -> f64 + Send + Sync,
{
    fn sample(&self, points: &[(f64, f64)]) -> anyhow::Result<Vec<f64>> {
        Ok(points.iter().map(|&(lon, lat)| (self.0)(lon, lat)).collect())
    }
}

/// Resolves every key, or only the listed ones.
#[derive(Default)]
pub(crate) struct MockResolver {
    pub only: Option<HashSet<MeshCode>>,
}

impl TileResolver for MockResolver {
    fn resolve(&self, key: &MeshCode) -> anyhow::Result<Option<PathBuf>> {
        let known = self.only.as_ref().is_none_or(|only| only.contains(key));
        Ok(known.then(|| PathBuf::from(format!("{key}.tile"))))
    }
}

type Terrain = dyn Fn(f64, f64) -> f64 + Send + Sync;

/// Hands out rasters backed by one terrain function and counts opens and
/// sample calls.
pub(crate) struct MockOpener {
    pub terrain: Arc<Terrain>,
    pub opens: Arc<AtomicUsize>,
    pub samples: Arc<AtomicUsize>,
    pub fail: Option<MeshCode>,
}

impl MockOpener {
    pub fn new(terrain: impl Fn(f64, f64) -> f64 + Send + Sync + 'static) -> Self {
        Self {
            terrain: Arc::new(terrain),
            opens: Arc::new(AtomicUsize::new(0)),
            samples: Arc::new(AtomicUsize::new(0)),
            fail: None,
        }
    }

    pub fn flat(height: f64) -> Self {
        Self::new(move |_, _| height)
    }
}

struct CountingRaster {
    terrain: Arc<Terrain>,
    samples: Arc<AtomicUsize>,
}

impl Raster for CountingRaster {
    fn sample(&self, points: &[(f64, f64)]) -> anyhow::Result<Vec<f64>> {
        self.samples.fetch_add(1, Ordering::SeqCst);
        Ok(points.iter().map(|&(lon, lat)| (self.terrain)(lon, lat)).collect())
    }
}

impl TileOpener for MockOpener {
    fn open(&self, key: &MeshCode, _path: &Path) -> anyhow::Result<Arc<dyn Raster>> {
        if self.fail == Some(*key) {
            anyhow::bail!("corrupt tile {key}");
        }
        self.opens.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(CountingRaster { terrain: self.terrain.clone(), samples: self.samples.clone() }))
    }
}

/// Opens every tile as a 4x4 grid over its own mesh square. Cell (row, col),
/// row 0 north, holds `1000 + 4 * row + col`.
pub(crate) struct CoveringOpener;

impl CoveringOpener {
    pub const SIZE: usize = 4;
    /// Value of the south-west cell.
    pub const SOUTH_WEST: f64 = 1012.0;
}

impl TileOpener for CoveringOpener {
    fn open(&self, key: &MeshCode, _path: &Path) -> anyhow::Result<Arc<dyn Raster>> {
        let n = Self::SIZE;
        let data = (0..n * n).map(|i| 1000.0 + i as f32).collect();
        Ok(Arc::new(GridRaster::covering(key.bounds(), n, n, data)?))
    }
}

pub(crate) fn covering_store() -> ElevationStore {
    ElevationStore::new(Arc::new(MockResolver::default()), Arc::new(CoveringOpener), 64).unwrap()
}

pub(crate) fn store_with(opener: MockOpener) -> ElevationStore {
    ElevationStore::new(Arc::new(MockResolver::default()), Arc::new(opener), 64).unwrap()
}

pub(crate) fn flat_store(height: f64) -> ElevationStore {
    store_with(MockOpener::flat(height))
}

/// Canned propagator: same event stream for every satellite, constant sky.
pub(crate) struct ScriptedEphemeris {
    pub events: Vec<(Epoch, u8)>,
    pub satellite: TopocentricSample,
    pub sun_altitude_deg: f64,
    pub moon: MoonState,
    pub fail_for: Option<String>,
    pub event_queries: AtomicUsize,
}

impl ScriptedEphemeris {
    /// Two full passes, satellite high in a dark sky, moon down.
    pub fn night() -> Self {
        Self {
            events: two_passes(),
            satellite: TopocentricSample { altitude_deg: 45.0, azimuth_deg: 90.0, sunlit: true },
            sun_altitude_deg: -18.0,
            moon: MoonState { altitude_deg: -10.0, illuminated_fraction: 0.5 },
            fail_for: None,
            event_queries: AtomicUsize::new(0),
        }
    }
}

impl Ephemeris for ScriptedEphemeris {
    fn find_events(
        &self,
        satellite: &SatelliteRef,
        _observer: &Observer,
        _window: TimeWindow,
        _min_elevation_deg: f64,
    ) -> anyhow::Result<Vec<(Epoch, u8)>> {
        self.event_queries.fetch_add(1, Ordering::SeqCst);
        if self.fail_for.as_deref() == Some(satellite.designator.as_str()) {
            anyhow::bail!("no elements for {}", satellite.designator);
        }
        Ok(self.events.clone())
    }

    fn satellite_at(&self, _: &SatelliteRef, _: &Observer, _: Epoch) -> anyhow::Result<TopocentricSample> {
        Ok(self.satellite)
    }

    fn sun_altitude(&self, _: &Observer, _: Epoch) -> anyhow::Result<f64> {
        Ok(self.sun_altitude_deg)
    }

    fn moon_at(&self, _: &Observer, _: Epoch) -> anyhow::Result<MoonState> {
        Ok(self.moon)
    }
}

/// RISE, PEAK, SET twice, 20:00-20:06 and 21:00-21:06.
pub(crate) fn two_passes() -> Vec<(Epoch, u8)> {
    vec![
        (epoch(20, 0), 0),
        (epoch(20, 3), 1),
        (epoch(20, 6), 2),
        (epoch(21, 0), 0),
        (epoch(21, 3), 1),
        (epoch(21, 6), 2),
    ]
}

pub(crate) const ISS_TLE: &str = "ISS (ZARYA)
1 25544U 98067A   25060.50000000  .00016717  00000-0  10270-3 0  9005
2 25544  51.6400 208.9163 0006317  69.9862  25.2906 15.50000000 12345
";

pub(crate) const STARLINK_TLE: &str = "STARLINK-1007
1 44713U 19074A   25060.50000000  .00001234  00000-0  10000-3 0  9991
2 44713  53.0000 100.0000 0001000  90.0000 270.0000 15.05000000 12345
STARLINK-1008
1 44714U 19074B   25060.50000000  .00001234  00000-0  10000-3 0  9992
2 44714  53.0000 100.0000 0001000  90.0000 270.0000 15.05000000 12345
STARLINK-1500
1 46000U 20070C   25060.50000000  .00001234  00000-0  10000-3 0  9993
2 46000  53.0000 100.0000 0001000  90.0000 270.0000 15.05000000 12345
";
