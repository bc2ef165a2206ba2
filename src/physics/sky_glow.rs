//! Light-pollution scoring.
//!
//! Two views of the same concern: a raw inverse-square integral of satellite
//! radiance around the observer, and a perceptual 0..1 darkness value derived
//! from modelled artificial sky brightness via SQM and naked-eye limiting
//! magnitude.

use serde::{Deserialize, Serialize};

use crate::error::{Result, VisibilityError};
use crate::geo::{destination, Coordinate};
use crate::terrain::Raster;

/// Natural night-sky brightness, 22.00 mag/arcsec^2, in mcd/m^2.
pub const NATURAL_SKY_BRIGHTNESS_MCD_M2: f64 = 0.171_168_465;
pub const SQM_CONVERSION_CONSTANT: f64 = 108_000_000.0;
const SQM_LOG_FACTOR: f64 = -0.4;

/// SQM at which the limiting-magnitude fit switches segments.
pub const NELM_BREAKPOINT_SQM: f64 = 19.5;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SkyGlowParams {
    pub search_width_m: f64,
    pub resolution_m: f64,
}

impl Default for SkyGlowParams {
    fn default() -> Self {
        // VIIRS nighttime lights are ~500 m cells
        Self { search_width_m: 100_000.0, resolution_m: 500.0 }
    }
}

impl SkyGlowParams {
    pub fn validate(&self) -> Result<()> {
        if !(self.resolution_m > 0.0) {
            return Err(VisibilityError::invalid(format!(
                "sky glow resolution must be positive, got {}",
                self.resolution_m
            )));
        }
        if !(self.search_width_m > 0.0) {
            return Err(VisibilityError::invalid(format!(
                "sky glow search width must be positive, got {}",
                self.search_width_m
            )));
        }
        Ok(())
    }

    /// Cells per side, forced odd so there is a true centre cell.
    pub fn cells_per_side(&self) -> usize {
        let n = (self.search_width_m / self.resolution_m) as usize;
        if n % 2 == 0 { n + 1 } else { n }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GlowCell {
    pub coord: Coordinate,
    pub distance_m: f64,
}

/// Square grid of cell centres around `observer`, row by row.
///
/// The centre cell is the observer itself at a nominal distance of half a
/// cell, so local sources count without dividing by zero.
pub fn glow_grid(observer: Coordinate, params: &SkyGlowParams) -> Result<Vec<GlowCell>> {
    params.validate()?;

    let n = params.cells_per_side();
    let mid = n / 2;
    let half = params.search_width_m / 2.0;
    let step = if n > 1 { params.search_width_m / (n - 1) as f64 } else { 0.0 };
    let offset = |i: usize| -half + i as f64 * step;

    let mut cells = Vec::with_capacity(n * n);
    for row in 0..n {
        for col in 0..n {
            if row == mid && col == mid {
                cells.push(GlowCell { coord: observer, distance_m: params.resolution_m / 2.0 });
                continue;
            }
            let (dx, dy) = if n > 1 { (offset(col), offset(row)) } else { (0.0, 0.0) };
            let distance_m = dx.hypot(dy);
            let azimuth = (dx.atan2(dy).to_degrees() + 360.0) % 360.0;
            cells.push(GlowCell { coord: destination(observer, azimuth, distance_m), distance_m });
        }
    }
    Ok(cells)
}

/// Σ (radiance / d²) · area, with unusable radiance counted as dark.
pub fn integrate(radiances: &[f64], distances: &[f64], cell_area: f64) -> f64 {
    radiances
        .iter()
        .zip(distances)
        .map(|(&r, &d)| {
            let r = if r.is_nan() || r < 0.0 { 0.0 } else { r };
            r / (d * d) * cell_area
        })
        .sum()
}

/// Raw sky-glow score of `radiance` around `observer`. Monotone in nearby
/// artificial light; not a radiometric quantity.
pub fn sky_glow_score(
    radiance: &dyn Raster,
    observer: Coordinate,
    params: &SkyGlowParams,
) -> Result<f64> {
    let cells = glow_grid(observer, params)?;
    let points: Vec<(f64, f64)> = cells.iter().map(|c| c.coord.lon_lat()).collect();
    let distances: Vec<f64> = cells.iter().map(|c| c.distance_m).collect();

    let radiances = radiance.sample(&points)?;
    if radiances.len() != points.len() {
        return Err(VisibilityError::Upstream(anyhow::anyhow!(
            "radiance raster returned {} values for {} points",
            radiances.len(),
            points.len()
        )));
    }

    Ok(integrate(&radiances, &distances, params.resolution_m * params.resolution_m))
}

/// Perceptual sky darkness from modelled artificial brightness (mcd/m²).
///
/// Limiting magnitude follows Crumey (2014) eqs. 90/91 with observer factor
/// `F`, normalised over `[sqm_min, sqm_max]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SkyDarkness {
    pub sqm_min: f64,
    pub sqm_max: f64,
    /// Crumey's observer factor `F`; 2 for a typical observer.
    pub observer_factor: f64,
}

impl Default for SkyDarkness {
    fn default() -> Self {
        Self { sqm_min: 17.0, sqm_max: 22.0, observer_factor: 2.0 }
    }
}

impl SkyDarkness {
    pub fn validate(&self) -> Result<()> {
        if !(self.sqm_min < self.sqm_max) {
            return Err(VisibilityError::invalid(format!(
                "sqm_min ({}) must be below sqm_max ({})",
                self.sqm_min, self.sqm_max
            )));
        }
        if !(self.observer_factor > 0.0) {
            return Err(VisibilityError::invalid("observer_factor must be positive"));
        }
        Ok(())
    }

    /// mag/arcsec² for a given artificial brightness.
    pub fn sqm(artificial_mcd_m2: f64) -> f64 {
        let total = artificial_mcd_m2.max(0.0) + NATURAL_SKY_BRIGHTNESS_MCD_M2;
        (total / SQM_CONVERSION_CONSTANT).log10() / SQM_LOG_FACTOR
    }

    pub fn nelm(&self, sqm: f64) -> f64 {
        let f_term = 2.5 * self.observer_factor.log10();
        if sqm >= NELM_BREAKPOINT_SQM {
            0.383 * sqm - 1.44 - f_term
        } else {
            0.27 * sqm + 0.8 - f_term
        }
    }

    pub fn nelm_range(&self) -> (f64, f64) {
        (self.nelm(self.sqm_min), self.nelm(self.sqm_max))
    }

    pub fn score_from_sqm(&self, sqm: f64) -> f64 {
        let (lo, hi) = self.nelm_range();
        let range = hi - lo;
        if range <= 0.0 {
            return 0.0;
        }
        let nelm = self.nelm(sqm).clamp(lo, hi);
        (nelm - lo) / range
    }

    /// 0 (bright) ..= 1 (dark). Unknown brightness scores as `sqm_min`.
    pub fn score(&self, artificial_mcd_m2: Option<f64>) -> f64 {
        let sqm = match artificial_mcd_m2 {
            Some(a) if a.is_finite() => Self::sqm(a),
            _ => self.sqm_min,
        };
        self.score_from_sqm(sqm)
    }
}
