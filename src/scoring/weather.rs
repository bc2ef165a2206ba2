use hifitime::Epoch;
use serde::{Deserialize, Serialize};

use crate::error::{Result, VisibilityError};

/// One hour of forecast at a spot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeatherSample {
    pub time: Epoch,
    pub precipitation_mm: f64,
    pub cloud_cover_percent: f64,
    pub visibility_m: f64,
}

/// Forecast samples in time order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WeatherSeries {
    samples: Vec<WeatherSample>,
}

impl WeatherSeries {
    pub fn new(mut samples: Vec<WeatherSample>) -> Self {
        samples.sort_by(|a, b| a.time.cmp(&b.time));
        Self { samples }
    }

    pub fn samples(&self) -> &[WeatherSample] {
        &self.samples
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// The sample closest to `at`; the earlier one wins a tie.
    pub fn nearest(&self, at: Epoch) -> Option<&WeatherSample> {
        let target = at.to_tt_seconds();
        self.samples.iter().min_by(|a, b| {
            let da = (a.time.to_tt_seconds() - target).abs();
            let db = (b.time.to_tt_seconds() - target).abs();
            da.total_cmp(&db)
        })
    }
}

/// Ground visibility mapped linearly onto 0..1 between these bounds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VisibilityRange {
    pub min_m: f64,
    pub max_m: f64,
}

impl Default for VisibilityRange {
    fn default() -> Self {
        // 15 statute miles at the top end
        Self { min_m: 5_000.0, max_m: 24_140.0 }
    }
}

impl VisibilityRange {
    pub fn validate(&self) -> Result<()> {
        if !(self.min_m < self.max_m) {
            return Err(VisibilityError::invalid(format!(
                "visibility range is empty: {} .. {}",
                self.min_m, self.max_m
            )));
        }
        Ok(())
    }

    pub fn normalize(&self, visibility_m: f64) -> f64 {
        ((visibility_m - self.min_m) / (self.max_m - self.min_m)).clamp(0.0, 1.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MeteorologicalScore {
    pub rain: f64,
    pub cloud: f64,
    pub visibility: f64,
}

impl MeteorologicalScore {
    /// No forecast: every factor is zero.
    pub const UNKNOWN: Self = Self { rain: 0.0, cloud: 0.0, visibility: 0.0 };

    pub fn from_sample(sample: &WeatherSample, range: &VisibilityRange) -> Self {
        let rain = if sample.precipitation_mm > 0.0 { 0.0 } else { 1.0 };
        let cloud = (1.0 - sample.cloud_cover_percent / 100.0).clamp(0.0, 1.0);
        Self { rain, cloud, visibility: range.normalize(sample.visibility_m) }
    }

    /// Factors at the forecast instant nearest `at`.
    pub fn at(series: &WeatherSeries, at: Epoch, range: &VisibilityRange) -> Self {
        series
            .nearest(at)
            .map(|s| Self::from_sample(s, range))
            .unwrap_or(Self::UNKNOWN)
    }

    pub fn product(&self) -> f64 {
        self.rain * self.cloud * self.visibility
    }
}
