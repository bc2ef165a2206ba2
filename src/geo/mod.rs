pub mod mesh;

use serde::{Deserialize, Serialize};

use crate::error::{Result, VisibilityError};

pub use mesh::{MeshCode, MeshLevel};

/// Mean Earth radius used by the curvature model.
pub const EARTH_MEAN_RADIUS: f64 = 6_371_000.0;

/// WGS84 semi-major axis (m) and flattening.
pub const WGS84_A: f64 = 6_378_137.0;
pub const WGS84_F: f64 = 1.0 / 298.257_223_563;

/// A validated WGS84 position in degrees. Built through [`Coordinate::new`]
/// (or deserialization, which runs the same checks).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(try_from = "LatLon")]
pub struct Coordinate {
    latitude: f64,
    longitude: f64,
}

#[derive(Deserialize)]
struct LatLon {
    latitude: f64,
    longitude: f64,
}

impl TryFrom<LatLon> for Coordinate {
    type Error = VisibilityError;

    fn try_from(raw: LatLon) -> Result<Self> {
        Coordinate::new(raw.latitude, raw.longitude)
    }
}

impl Coordinate {
    pub fn new(latitude: f64, longitude: f64) -> Result<Self> {
        if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
            return Err(VisibilityError::invalid(format!("latitude {latitude} out of range")));
        }
        if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
            return Err(VisibilityError::invalid(format!("longitude {longitude} out of range")));
        }
        Ok(Self { latitude, longitude })
    }

    #[inline]
    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    #[inline]
    pub fn longitude(&self) -> f64 {
        self.longitude
    }

    /// Raster samplers take (x, y) = (lon, lat).
    #[inline]
    pub fn lon_lat(&self) -> (f64, f64) {
        (self.longitude, self.latitude)
    }
}

/// Geodesic forward problem on the WGS84 ellipsoid (Vincenty direct).
///
/// Returns the point reached by travelling `distance_m` from `origin` along the
/// initial bearing `azimuth_deg` (clockwise from North).
pub fn destination(origin: Coordinate, azimuth_deg: f64, distance_m: f64) -> Coordinate {
    if distance_m == 0.0 {
        return origin;
    }

    let a = WGS84_A;
    let f = WGS84_F;
    let b = a * (1.0 - f);

    let alpha1 = azimuth_deg.to_radians();
    let (sin_a1, cos_a1) = alpha1.sin_cos();

    let tan_u1 = (1.0 - f) * origin.latitude.to_radians().tan();
    let cos_u1 = 1.0 / (1.0 + tan_u1 * tan_u1).sqrt();
    let sin_u1 = tan_u1 * cos_u1;

    let sigma1 = tan_u1.atan2(cos_a1);
    let sin_alpha = cos_u1 * sin_a1;
    let cos_sq_alpha = 1.0 - sin_alpha * sin_alpha;
    let u_sq = cos_sq_alpha * (a * a - b * b) / (b * b);
    let big_a = 1.0 + u_sq / 16384.0 * (4096.0 + u_sq * (-768.0 + u_sq * (320.0 - 175.0 * u_sq)));
    let big_b = u_sq / 1024.0 * (256.0 + u_sq * (-128.0 + u_sq * (74.0 - 47.0 * u_sq)));

    let mut sigma = distance_m / (b * big_a);
    let mut iterations = 0;
    let (sin_s, cos_s, cos_2sm) = loop {
        let cos_2sm = (2.0 * sigma1 + sigma).cos();
        let (sin_s, cos_s) = sigma.sin_cos();
        let delta_sigma = big_b
            * sin_s
            * (cos_2sm
                + big_b / 4.0
                    * (cos_s * (-1.0 + 2.0 * cos_2sm * cos_2sm)
                        - big_b / 6.0
                            * cos_2sm
                            * (-3.0 + 4.0 * sin_s * sin_s)
                            * (-3.0 + 4.0 * cos_2sm * cos_2sm)));
        let next = distance_m / (b * big_a) + delta_sigma;
        let converged = (next - sigma).abs() < 1e-12;
        sigma = next;
        iterations += 1;
        if converged || iterations >= 200 {
            let (sin_s, cos_s) = sigma.sin_cos();
            break (sin_s, cos_s, (2.0 * sigma1 + sigma).cos());
        }
    };

    let x = sin_u1 * sin_s - cos_u1 * cos_s * cos_a1;
    let lat2 = (sin_u1 * cos_s + cos_u1 * sin_s * cos_a1)
        .atan2((1.0 - f) * (sin_alpha * sin_alpha + x * x).sqrt());
    let lambda = (sin_s * sin_a1).atan2(cos_u1 * cos_s - sin_u1 * sin_s * cos_a1);
    let c = f / 16.0 * cos_sq_alpha * (4.0 + f * (4.0 - 3.0 * cos_sq_alpha));
    let l = lambda
        - (1.0 - c)
            * f
            * sin_alpha
            * (sigma + c * sin_s * (cos_2sm + c * cos_s * (-1.0 + 2.0 * cos_2sm * cos_2sm)));

    Coordinate {
        latitude: lat2.to_degrees(),
        longitude: normalize_longitude(origin.longitude + l.to_degrees()),
    }
}

fn normalize_longitude(lon: f64) -> f64 {
    let wrapped = (lon + 180.0).rem_euclid(360.0) - 180.0;
    if wrapped == -180.0 && lon > 0.0 { 180.0 } else { wrapped }
}

/// Great-circle distance (m) and initial bearing (deg) on the mean sphere.
/// Good enough for radius filtering; use [`destination`] for sampling rays.
pub fn calculate_geodesic(p1: Coordinate, p2: Coordinate) -> (f64, f64) {
    let lat1 = p1.latitude.to_radians();
    let lat2 = p2.latitude.to_radians();
    let dlat = (p2.latitude - p1.latitude).to_radians();
    let dlon = (p2.longitude - p1.longitude).to_radians();

    let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    let dist = EARTH_MEAN_RADIUS * c;

    let y = dlon.sin() * lat2.cos();
    let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * dlon.cos();
    let bearing = (y.atan2(x).to_degrees() + 360.0) % 360.0;

    (dist, bearing)
}
