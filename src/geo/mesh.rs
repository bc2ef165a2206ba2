//! JIS grid-square codes ("mesh codes") used to key elevation tiles.
//!
//! Three nested levels:
//! - primary: 40' lat x 1 deg lon (~80 km), 4 digits
//! - secondary: 8x8 subdivision, 5' x 7.5' (~10 km), 6 digits
//! - tertiary: 10x10 subdivision, 30" x 45" (~1 km), 8 digits

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::Coordinate;
use crate::error::VisibilityError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MeshLevel {
    Primary,
    Secondary,
    Tertiary,
}

impl MeshLevel {
    pub fn digits(self) -> usize {
        match self {
            MeshLevel::Primary => 4,
            MeshLevel::Secondary => 6,
            MeshLevel::Tertiary => 8,
        }
    }

    /// Cell size as (lat, lon) degrees.
    pub fn cell_size_deg(self) -> (f64, f64) {
        match self {
            MeshLevel::Primary => (40.0 / 60.0, 1.0),
            MeshLevel::Secondary => (5.0 / 60.0, 7.5 / 60.0),
            MeshLevel::Tertiary => (30.0 / 3600.0, 45.0 / 3600.0),
        }
    }
}

/// Geographic bounds of a grid square, degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeshBounds {
    pub south: f64,
    pub west: f64,
    pub north: f64,
    pub east: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MeshCode {
    level: MeshLevel,
    // p, u, q, v, r, w; unused trailing parts are zero
    parts: [u8; 6],
}

impl MeshCode {
    /// Returns `None` outside the grid domain (lat 0..66.66, lon 100..180).
    pub fn from_coord(coord: Coordinate, level: MeshLevel) -> Option<Self> {
        let lat_min = coord.latitude() * 60.0;
        let lon = coord.longitude();
        if !(0.0..40.0 * 100.0).contains(&lat_min) || !(100.0..180.0).contains(&lon) {
            return None;
        }

        let p = (lat_min / 40.0).floor();
        let u = lon.floor() - 100.0;

        let lat_rem = lat_min - p * 40.0;
        let lon_rem = (lon - lon.floor()) * 60.0;
        let q = (lat_rem / 5.0).floor().clamp(0.0, 7.0);
        let v = (lon_rem / 7.5).floor().clamp(0.0, 7.0);

        let lat_rem = (lat_rem - q * 5.0) * 60.0;
        let lon_rem = (lon_rem - v * 7.5) * 60.0;
        let r = (lat_rem / 30.0).floor().clamp(0.0, 9.0);
        let w = (lon_rem / 45.0).floor().clamp(0.0, 9.0);

        let mut parts = [p as u8, u as u8, q as u8, v as u8, r as u8, w as u8];
        match level {
            MeshLevel::Primary => parts[2..].fill(0),
            MeshLevel::Secondary => parts[4..].fill(0),
            MeshLevel::Tertiary => {}
        }
        Some(Self { level, parts })
    }

    pub fn level(&self) -> MeshLevel {
        self.level
    }

    /// The enclosing code at a coarser (or equal) level.
    pub fn truncate(&self, level: MeshLevel) -> Self {
        let level = level.min(self.level);
        let mut parts = self.parts;
        match level {
            MeshLevel::Primary => parts[2..].fill(0),
            MeshLevel::Secondary => parts[4..].fill(0),
            MeshLevel::Tertiary => {}
        }
        Self { level, parts }
    }

    pub fn bounds(&self) -> MeshBounds {
        let [p, u, q, v, r, w] = self.parts.map(f64::from);
        let south = p * 40.0 / 60.0 + q * 5.0 / 60.0 + r * 30.0 / 3600.0;
        let west = 100.0 + u + v * 7.5 / 60.0 + w * 45.0 / 3600.0;
        let (dlat, dlon) = self.level.cell_size_deg();
        MeshBounds {
            south,
            west,
            north: south + dlat,
            east: west + dlon,
        }
    }

    /// Split the 8-digit form into its `AAAA`, `BB`, `CC` path segments.
    pub fn path_segments(&self) -> (String, String, String) {
        let s = self.to_string();
        let first = s[0..4].to_string();
        let second = s.get(4..6).unwrap_or("").to_string();
        let third = s.get(6..8).unwrap_or("").to_string();
        (first, second, third)
    }
}

impl fmt::Display for MeshCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [p, u, q, v, r, w] = self.parts;
        write!(f, "{p:02}{u:02}")?;
        if self.level >= MeshLevel::Secondary {
            write!(f, "{q}{v}")?;
        }
        if self.level == MeshLevel::Tertiary {
            write!(f, "{r}{w}")?;
        }
        Ok(())
    }
}

impl FromStr for MeshCode {
    type Err = VisibilityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let level = match s.len() {
            4 => MeshLevel::Primary,
            6 => MeshLevel::Secondary,
            8 => MeshLevel::Tertiary,
            n => {
                return Err(VisibilityError::invalid(format!(
                    "mesh code {s:?} has {n} digits, expected 4, 6 or 8"
                )));
            }
        };
        if !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(VisibilityError::invalid(format!("mesh code {s:?} is not numeric")));
        }

        let d: Vec<u8> = s.bytes().map(|b| b - b'0').collect();
        let mut parts = [d[0] * 10 + d[1], d[2] * 10 + d[3], 0, 0, 0, 0];
        if level >= MeshLevel::Secondary {
            if d[4] > 7 || d[5] > 7 {
                return Err(VisibilityError::invalid(format!(
                    "mesh code {s:?} has a secondary digit above 7"
                )));
            }
            parts[2] = d[4];
            parts[3] = d[5];
        }
        if level == MeshLevel::Tertiary {
            parts[4] = d[6];
            parts[5] = d[7];
        }
        if parts[1] >= 80 {
            return Err(VisibilityError::invalid(format!("mesh code {s:?} is east of 180")));
        }
        Ok(Self { level, parts })
    }
}
