use crate::geo::EARTH_MEAN_RADIUS;

/// Distance (m) from an eye at `observer_height` to the geometric horizon.
/// Heights below sea level see no horizon beyond their feet.
pub fn horizon_distance(observer_height: f64) -> f64 {
    let h = observer_height.max(0.0);
    (2.0 * EARTH_MEAN_RADIUS * h + h * h).sqrt()
}

/// Height (m) hidden below the horizon by Earth curvature at `target_distance`.
///
/// Zero inside the horizon distance; beyond it, the drop of the sphere over the
/// remaining tangent-line distance.
pub fn hidden_height(observer_height: f64, target_distance: f64) -> f64 {
    let d_h = horizon_distance(observer_height);
    if target_distance < d_h {
        return 0.0;
    }
    let beyond = target_distance - d_h;
    (EARTH_MEAN_RADIUS * EARTH_MEAN_RADIUS + beyond * beyond).sqrt() - EARTH_MEAN_RADIUS
}

/// Elevation angle (deg) from an eye at `observer_height` to terrain of
/// `target_height` at horizontal `distance`, after curvature drop.
///
/// `distance == 0` is straight up.
pub fn viewing_angle(observer_height: f64, target_height: f64, distance: f64) -> f64 {
    if distance == 0.0 {
        return 90.0;
    }
    let apparent = target_height - hidden_height(observer_height, distance);
    (apparent - observer_height).atan2(distance).to_degrees()
}
