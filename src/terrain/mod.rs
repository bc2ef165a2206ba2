use anyhow::{Context, Result};
use itertools::Itertools;
use std::fs::File;
use std::io::Read;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::cache::{CacheMetrics, HandleCache};
use crate::error::VisibilityError;
use crate::geo::{Coordinate, MeshCode, MeshLevel};
use crate::geo::mesh::MeshBounds;

/// SRTM/HGT void marker.
pub const HGT_VOID: i16 = -32768;

/// A georeferenced grid that can be sampled in batches.
///
/// Points are `(lon, lat)` pairs. Cells with no data, and points outside the
/// grid, come back as `NaN`.
pub trait Raster: Send + Sync {
    fn sample(&self, points: &[(f64, f64)]) -> Result<Vec<f64>>;
}

/// North-up raster held in memory, sampled nearest-cell.
#[derive(Debug, Clone)]
pub struct GridRaster {
    pub west: f64,
    pub north: f64,
    pub cell_width: f64,
    pub cell_height: f64,
    pub width: usize,
    pub height: usize,
    pub data: Vec<f32>, // row-major, row 0 is north
    pub nodata: Option<f32>,
}

impl GridRaster {
    pub fn new(
        west: f64,
        north: f64,
        cell_width: f64,
        cell_height: f64,
        width: usize,
        height: usize,
        data: Vec<f32>,
    ) -> Result<Self> {
        anyhow::ensure!(
            data.len() == width * height,
            "raster data has {} cells, expected {}x{}",
            data.len(),
            width,
            height
        );
        anyhow::ensure!(cell_width > 0.0 && cell_height > 0.0, "raster cell size must be positive");
        Ok(Self { west, north, cell_width, cell_height, width, height, data, nodata: None })
    }

    /// Grid spanning a mesh square exactly.
    pub fn covering(
        bounds: MeshBounds,
        width: usize,
        height: usize,
        data: Vec<f32>,
    ) -> Result<Self> {
        Self::new(
            bounds.west,
            bounds.north,
            (bounds.east - bounds.west) / width as f64,
            (bounds.north - bounds.south) / height as f64,
            width,
            height,
            data,
        )
    }

    pub fn with_nodata(mut self, nodata: f32) -> Self {
        self.nodata = Some(nodata);
        self
    }

    /// Read an ESRI ASCII grid (`ncols`, `nrows`, `xllcorner`/`xllcenter`,
    /// `yllcorner`/`yllcenter`, `cellsize`, optional `NODATA_value`, then
    /// rows north to south).
    pub fn from_ascii_grid(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {:?}", path))?;
        Self::parse_ascii_grid(&text).with_context(|| format!("Malformed ASCII grid {:?}", path))
    }

    pub fn parse_ascii_grid(text: &str) -> Result<Self> {
        let mut tokens = text.split_ascii_whitespace().peekable();
        let mut header = std::collections::HashMap::new();
        while let Some(&key) = tokens.peek() {
            if !key.starts_with(|c: char| c.is_ascii_alphabetic()) {
                break;
            }
            tokens.next();
            let value: f64 = tokens
                .next()
                .context("header key without value")?
                .parse()
                .with_context(|| format!("bad value for {key}"))?;
            header.insert(key.to_ascii_lowercase(), value);
        }

        let field = |name: &str| {
            header.get(name).copied().with_context(|| format!("missing {name}"))
        };
        let width = field("ncols")? as usize;
        let height = field("nrows")? as usize;
        let cell = field("cellsize")?;
        let half = cell / 2.0;
        let west = field("xllcorner").or_else(|_| field("xllcenter").map(|x| x - half))?;
        let south = field("yllcorner").or_else(|_| field("yllcenter").map(|y| y - half))?;

        let data = tokens
            .map(|t| t.parse::<f32>().with_context(|| format!("bad cell value {t:?}")))
            .collect::<Result<Vec<f32>>>()?;

        let north = south + height as f64 * cell;
        let raster = Self::new(west, north, cell, cell, width, height, data)?;
        Ok(match header.get("nodata_value") {
            Some(&nodata) => raster.with_nodata(nodata as f32),
            None => raster,
        })
    }

    #[inline(always)]
    pub fn get(&self, col: usize, row: usize) -> f32 {
        self.data[row * self.width + col]
    }

    /// Nearest-cell lookup over the closed extent: the south and east edges
    /// belong to the last row and column, the same squares that own them
    /// as mesh keys.
    fn value_at(&self, lon: f64, lat: f64) -> f64 {
        let (Some(col), Some(row)) = (
            cell_index((lon - self.west) / self.cell_width, self.width),
            cell_index((self.north - lat) / self.cell_height, self.height),
        ) else {
            return f64::NAN;
        };
        let v = self.get(col, row);
        if self.nodata == Some(v) { f64::NAN } else { v as f64 }
    }
}

/// Slack, in cells, for edge points that land a rounding error outside.
const EDGE_TOLERANCE: f64 = 1e-6;

fn cell_index(offset: f64, count: usize) -> Option<usize> {
    if count == 0 || !(-EDGE_TOLERANCE..=count as f64 + EDGE_TOLERANCE).contains(&offset) {
        return None;
    }
    Some((offset.max(0.0) as usize).min(count - 1))
}

impl Raster for GridRaster {
    fn sample(&self, points: &[(f64, f64)]) -> Result<Vec<f64>> {
        Ok(points.iter().map(|&(lon, lat)| self.value_at(lon, lat)).collect())
    }
}

/// Maps a fine mesh code to a locally readable tile file, if one exists.
/// Remote-backed resolvers fetch on miss and return the cached local path.
pub trait TileResolver: Send + Sync {
    fn resolve(&self, key: &MeshCode) -> Result<Option<PathBuf>>;
}

/// Opens a tile file into a sampleable raster.
pub trait TileOpener: Send + Sync {
    fn open(&self, key: &MeshCode, path: &Path) -> Result<Arc<dyn Raster>>;
}

/// `<root>/<folder>/AAAA/AAAA-BB/AAAA-BB-CC.<ext>`
pub struct LocalTileResolver {
    pub root: PathBuf,
    pub folder: String,
    pub extension: String,
}

impl LocalTileResolver {
    pub fn new(
        root: impl Into<PathBuf>,
        folder: impl Into<String>,
        extension: impl Into<String>,
    ) -> Self {
        Self { root: root.into(), folder: folder.into(), extension: extension.into() }
    }

    pub fn tile_path(&self, key: &MeshCode) -> PathBuf {
        tile_path(&self.root.join(&self.folder), key, &self.extension)
    }
}

pub(crate) fn tile_path(base: &Path, key: &MeshCode, extension: &str) -> PathBuf {
    let (first, second, third) = key.path_segments();
    base.join(&first)
        .join(format!("{first}-{second}"))
        .join(format!("{first}-{second}-{third}.{extension}"))
}

impl TileResolver for LocalTileResolver {
    fn resolve(&self, key: &MeshCode) -> Result<Option<PathBuf>> {
        let path = self.tile_path(key);
        Ok(path.exists().then_some(path))
    }
}

/// Raw big-endian i16 square grids (HGT layout) georeferenced by their mesh
/// square.
pub struct HgtTileOpener;

impl HgtTileOpener {
    pub fn load(key: &MeshCode, path: &Path) -> Result<GridRaster> {
        let mut file = File::open(path).with_context(|| format!("Failed to open {:?}", path))?;
        let len = file.metadata()?.len() as usize;
        let cells = len / 2;
        let size = (cells as f64).sqrt().round() as usize;
        if len % 2 != 0 || size * size != cells || size == 0 {
            anyhow::bail!("Unknown HGT file size: {}", len);
        }

        let mut buffer = Vec::with_capacity(len);
        file.read_to_end(&mut buffer)?;

        let data: Vec<f32> = buffer
            .chunks_exact(2)
            .map(|chunk| i16::from_be_bytes([chunk[0], chunk[1]]) as f32)
            .collect();

        Ok(GridRaster::covering(key.bounds(), size, size, data)?.with_nodata(HGT_VOID as f32))
    }
}

impl TileOpener for HgtTileOpener {
    fn open(&self, key: &MeshCode, path: &Path) -> Result<Arc<dyn Raster>> {
        Ok(Arc::new(Self::load(key, path)?))
    }
}

/// Resolves coordinates to fine-grid elevation tiles and samples them.
///
/// Owns the open tile handles. Not meant to be shared across horizon-scan
/// workers: each worker takes its own [`ElevationStore::fork`].
pub struct ElevationStore {
    resolver: Arc<dyn TileResolver>,
    opener: Arc<dyn TileOpener>,
    tiles: HandleCache<MeshCode, dyn Raster>,
    capacity: NonZeroUsize,
}

impl ElevationStore {
    pub fn new(
        resolver: Arc<dyn TileResolver>,
        opener: Arc<dyn TileOpener>,
        cache_capacity: usize,
    ) -> crate::error::Result<Self> {
        let capacity = NonZeroUsize::new(cache_capacity)
            .ok_or_else(|| VisibilityError::invalid("tile cache capacity must be > 0"))?;
        Ok(Self {
            resolver,
            opener,
            tiles: HandleCache::new(capacity),
            capacity,
        })
    }

    /// Same collaborators, fresh (empty) handle cache.
    pub fn fork(&self) -> Self {
        Self {
            resolver: self.resolver.clone(),
            opener: self.opener.clone(),
            tiles: HandleCache::new(self.capacity),
            capacity: self.capacity,
        }
    }

    pub fn elevation_at(&self, coord: Coordinate) -> Option<f64> {
        self.elevations(&[coord]).pop().flatten()
    }

    /// One elevation per input coordinate, in input order. Each touched tile
    /// is opened at most once and sampled with a single batched call.
    pub fn elevations(&self, coords: &[Coordinate]) -> Vec<Option<f64>> {
        let mut out = vec![None; coords.len()];

        let by_tile = coords
            .iter()
            .enumerate()
            .filter_map(|(i, c)| MeshCode::from_coord(*c, MeshLevel::Tertiary).map(|k| (k, i)))
            .into_group_map();

        for (key, indices) in by_tile {
            let Some(tile) = self.tile(&key) else {
                continue;
            };
            let points: Vec<(f64, f64)> = indices.iter().map(|&i| coords[i].lon_lat()).collect();
            match tile.sample(&points) {
                Ok(values) => {
                    for (&i, v) in indices.iter().zip(values) {
                        out[i] = (!v.is_nan()).then_some(v);
                    }
                }
                Err(e) => {
                    warn!(tile = %key, error = %e, "tile sampling failed, treating as unavailable");
                }
            }
        }

        out
    }

    fn tile(&self, key: &MeshCode) -> Option<Arc<dyn Raster>> {
        if let Some(tile) = self.tiles.get(key) {
            return Some(tile);
        }

        let path = match self.resolver.resolve(key) {
            Ok(Some(path)) => path,
            Ok(None) => return None,
            Err(e) => {
                warn!(tile = %key, error = %e, "tile resolution failed");
                return None;
            }
        };

        match self.opener.open(key, &path) {
            Ok(tile) => {
                debug!(tile = %key, path = ?path, "opened elevation tile");
                self.tiles.insert(*key, tile.clone());
                Some(tile)
            }
            Err(e) => {
                warn!(tile = %key, path = ?path, error = %e, "unreadable elevation tile");
                None
            }
        }
    }

    pub fn open_tiles(&self) -> usize {
        self.tiles.len()
    }

    pub fn cache_metrics(&self) -> CacheMetrics {
        self.tiles.metrics()
    }

    /// Release every open tile handle.
    pub fn close_all(&self) {
        self.tiles.clear();
    }
}
