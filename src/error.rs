use crate::geo::Coordinate;

pub type Result<T> = std::result::Result<T, VisibilityError>;

#[derive(Debug, thiserror::Error)]
pub enum VisibilityError {
    /// No raster coverage for a coordinate (sea, data gaps).
    #[error("no elevation data at ({}, {})", .0.latitude(), .0.longitude())]
    DataUnavailable(Coordinate),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A collaborator (raster codec, resolver, ephemeris, weather) failed.
    #[error("upstream failure: {0:#}")]
    Upstream(#[from] anyhow::Error),

    /// Observer ground elevation is present but implausible.
    #[error(
        "implausible observer elevation {elevation_m:.1} m at ({}, {})",
        .at.latitude(),
        .at.longitude()
    )]
    ObserverElevation { at: Coordinate, elevation_m: f64 },
}

impl VisibilityError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// True when the failure reflects legitimate absence of data rather than
    /// a bug or misconfiguration. Callers turn these into an empty result
    /// with a diagnostic instead of propagating.
    pub fn is_data_absence(&self) -> bool {
        matches!(self, Self::DataUnavailable(_) | Self::ObserverElevation { .. })
    }
}
