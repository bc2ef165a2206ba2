//! Runtime settings, read from a TOML file at startup.
//!
//! Every section and key is optional; missing values take the defaults
//! below. Settings are validated once at load so bad values fail loudly
//! before any request is served.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{Result, VisibilityError};
use crate::geo::{MeshCode, MeshLevel};
use crate::physics::horizon::HorizonParams;
use crate::physics::sky_glow::{SkyDarkness, SkyGlowParams};
use crate::scoring::ScoringConfig;
use crate::terrain::{tile_path, ElevationStore, HgtTileOpener, LocalTileResolver};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub data: DataSettings,
    #[serde(default)]
    pub sky: SkyDarkness,
    #[serde(default)]
    pub horizon: HorizonSettings,
    #[serde(default)]
    pub sky_glow: SkyGlowParams,
    #[serde(default)]
    pub scoring: ScoringConfig,
    #[serde(default)]
    pub weather: WeatherSettings,
    #[serde(default)]
    pub recommend: RecommendSettings,
}

/// Where the data files live. Relative paths are under `local_root`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataSettings {
    #[serde(default = "default_local_root")]
    pub local_root: PathBuf,
    #[serde(default = "default_dem_folder")]
    pub dem_folder: String,
    #[serde(default = "default_dem_extension")]
    pub dem_extension: String,
    /// Artificial sky brightness (mcd/m²), ESRI ASCII grid.
    #[serde(default)]
    pub world_atlas: Option<PathBuf>,
    /// Nighttime-lights radiance, ESRI ASCII grid.
    #[serde(default)]
    pub nighttime_light: Option<PathBuf>,
    #[serde(default = "default_tle_starlink")]
    pub tle_starlink: PathBuf,
    #[serde(default = "default_tle_stations")]
    pub tle_stations: PathBuf,
}

fn default_local_root() -> PathBuf {
    PathBuf::from("data")
}

fn default_dem_folder() -> String {
    "DEM5A".to_string()
}

fn default_dem_extension() -> String {
    "hgt".to_string()
}

fn default_tle_starlink() -> PathBuf {
    PathBuf::from("tle/starlink.txt")
}

fn default_tle_stations() -> PathBuf {
    PathBuf::from("tle/stations.txt")
}

impl Default for DataSettings {
    fn default() -> Self {
        Self {
            local_root: default_local_root(),
            dem_folder: default_dem_folder(),
            dem_extension: default_dem_extension(),
            world_atlas: None,
            nighttime_light: None,
            tle_starlink: default_tle_starlink(),
            tle_stations: default_tle_stations(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HorizonSettings {
    pub eye_height_m: f64,
    pub num_directions: usize,
    pub max_distance_m: f64,
    pub num_samples: usize,
    /// Ray length and density for profiles computed per request.
    pub on_demand_max_distance_m: f64,
    pub on_demand_num_samples: usize,
    pub tile_cache_capacity: usize,
}

impl Default for HorizonSettings {
    fn default() -> Self {
        let precomputed = HorizonParams::default();
        let on_demand = HorizonParams::on_demand();
        Self {
            eye_height_m: precomputed.eye_height_m,
            num_directions: precomputed.num_directions,
            max_distance_m: precomputed.max_distance_m,
            num_samples: precomputed.num_samples,
            on_demand_max_distance_m: on_demand.max_distance_m,
            on_demand_num_samples: on_demand.num_samples,
            tile_cache_capacity: 256,
        }
    }
}

impl HorizonSettings {
    pub fn precomputed(&self) -> HorizonParams {
        HorizonParams {
            eye_height_m: self.eye_height_m,
            num_directions: self.num_directions,
            max_distance_m: self.max_distance_m,
            num_samples: self.num_samples,
        }
    }

    pub fn on_demand(&self) -> HorizonParams {
        HorizonParams {
            max_distance_m: self.on_demand_max_distance_m,
            num_samples: self.on_demand_num_samples,
            ..self.precomputed()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeatherSettings {
    #[serde(default = "default_concurrency_limit")]
    pub concurrency_limit: usize,
}

fn default_concurrency_limit() -> usize {
    4
}

impl Default for WeatherSettings {
    fn default() -> Self {
        Self { concurrency_limit: default_concurrency_limit() }
    }
}

/// Multi-spot recommendations: how many of the best static spots get a
/// full pass forecast.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendSettings {
    #[serde(default = "default_candidate_spots")]
    pub candidate_spots: usize,
}

fn default_candidate_spots() -> usize {
    10
}

impl Default for RecommendSettings {
    fn default() -> Self {
        Self { candidate_spots: default_candidate_spots() }
    }
}

impl Settings {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            VisibilityError::invalid(format!("failed to read settings {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let settings: Settings = toml::from_str(content)
            .map_err(|e| VisibilityError::invalid(format!("failed to parse settings: {e}")))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        self.sky.validate()?;
        self.horizon.precomputed().validate()?;
        self.horizon.on_demand().validate()?;
        if self.horizon.tile_cache_capacity == 0 {
            return Err(VisibilityError::invalid("horizon.tile_cache_capacity must be > 0"));
        }
        self.sky_glow.validate()?;
        self.scoring.validate()?;
        if self.weather.concurrency_limit == 0 {
            return Err(VisibilityError::invalid("weather.concurrency_limit must be > 0"));
        }
        if self.recommend.candidate_spots == 0 {
            return Err(VisibilityError::invalid("recommend.candidate_spots must be > 0"));
        }
        Ok(())
    }

    /// `path` under the data root, unless already absolute.
    pub fn data_path(&self, path: &Path) -> PathBuf {
        self.data.local_root.join(path)
    }

    /// Fine-grid DEM tile path for an 8-digit mesh code.
    pub fn dem_tile_path(&self, code: &str) -> Result<PathBuf> {
        let key: MeshCode = code.parse()?;
        if key.level() != MeshLevel::Tertiary {
            return Err(VisibilityError::invalid(format!(
                "DEM tiles need an 8-digit mesh code, got {code:?}"
            )));
        }
        Ok(tile_path(&self.dem_root(), &key, &self.data.dem_extension))
    }

    fn dem_root(&self) -> PathBuf {
        self.data.local_root.join(&self.data.dem_folder)
    }

    /// Elevation store over the local DEM tree.
    pub fn elevation_store(&self) -> Result<ElevationStore> {
        let data = &self.data;
        let resolver =
            LocalTileResolver::new(&data.local_root, &data.dem_folder, &data.dem_extension);
        let capacity = self.horizon.tile_cache_capacity;
        ElevationStore::new(Arc::new(resolver), Arc::new(HgtTileOpener), capacity)
    }
}
