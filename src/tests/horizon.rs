use std::sync::atomic::Ordering;

use super::{coord, covering_store, flat_store, fuji, store_with, MockOpener};
use crate::error::VisibilityError;
use crate::physics::curvature::{hidden_height, horizon_distance, viewing_angle};
use crate::physics::horizon::{
    azimuths, compute_horizon_profile, horizon_profile_from_ground, observer_ground,
    sample_distances, HorizonParams, HorizonProfile,
};

#[test]
fn test_hidden_height_zero_inside_horizon() {
    for h in [0.0, 1.55, 100.0, 2000.0] {
        let d_h = horizon_distance(h);
        for frac in [0.0, 0.25, 0.5, 0.99] {
            assert_eq!(hidden_height(h, d_h * frac), 0.0);
        }
    }
    // ~35.7 km for a 100 m eye
    assert!((horizon_distance(100.0) - 35_696.0).abs() < 5.0);
    assert_eq!(hidden_height(100.0, 20_000.0), 0.0);
    assert!(hidden_height(100.0, 50_000.0) > 0.0);
}

#[test]
fn test_hidden_height_monotone() {
    let mut last = 0.0;
    for d in (0..200).map(|i| i as f64 * 1_000.0) {
        let h = hidden_height(50.0, d);
        assert!(h >= last);
        last = h;
    }

    // further than every horizon below: taller eye hides less
    let d = 200_000.0;
    assert!(hidden_height(10.0, d) >= hidden_height(100.0, d));
    assert!(hidden_height(100.0, d) >= hidden_height(1000.0, d));
}

#[test]
fn test_negative_eye_height_has_no_horizon() {
    assert_eq!(horizon_distance(-5.0), 0.0);
    assert!(hidden_height(-5.0, 1_000.0) > 0.0);
}

#[test]
fn test_viewing_angle_scenarios() {
    // clearly above the horizon
    assert!(viewing_angle(200.0, 1000.0, 5_000.0) > 5.0);

    // 50 km is just inside the 50.5 km horizon of a 200 m eye: no curvature
    // drop yet, the 100 m rise still shows
    let near = viewing_angle(200.0, 300.0, 50_000.0);
    assert!(near > 0.0 && near < 0.2);

    // far past the horizon the same ridge sinks below eye level
    assert!(viewing_angle(200.0, 300.0, 150_000.0) < 0.0);
}

#[test]
fn test_viewing_angle_level_target() {
    // equal heights, negligible curvature
    assert!(viewing_angle(100.0, 100.0, 10.0).abs() < 1e-9);
    // equal heights, hidden by curvature
    assert!(viewing_angle(100.0, 100.0, 80_000.0) < 0.0);
    assert_eq!(viewing_angle(100.0, 0.0, 0.0), 90.0);
}

#[test]
fn test_azimuths_evenly_spaced() {
    for n in [1, 4, 180, 360] {
        let az = azimuths(n);
        assert_eq!(az.len(), n);
        assert_eq!(az[0], 0.0);
        let step = 360.0 / n as f64;
        for w in az.windows(2) {
            assert!((w[1] - w[0] - step).abs() < 1e-9);
        }
        assert!(*az.last().unwrap() < 360.0);
    }
}

#[test]
fn test_sample_distances_geometric() {
    let d = sample_distances(100_000.0, 100);
    assert_eq!(d.len(), 100);
    assert!((d[0] - 1.0).abs() < 1e-9);
    assert!((d[99] - 100_000.0).abs() < 1e-6);
    // constant ratio between neighbours
    let r0 = d[1] / d[0];
    let r1 = d[50] / d[49];
    assert!((r0 - r1).abs() < 1e-9);
}

fn small_params() -> HorizonParams {
    HorizonParams {
        eye_height_m: 1.55,
        num_directions: 36,
        max_distance_m: 10_000.0,
        num_samples: 20,
    }
}

#[test]
fn test_profile_length_matches_directions() {
    let store = flat_store(0.0);
    let profile = compute_horizon_profile(&store, fuji(), &small_params()).unwrap();

    assert_eq!(profile.len(), 36);
    assert_eq!(profile.azimuths, azimuths(36));
    // flat ground: skyline just under eye level in every direction
    for a in &profile.angles {
        assert!(*a < 0.0 && *a > -1.0, "angle {a}");
    }
}

#[test]
fn test_ridge_to_the_north() {
    let observer = fuji();
    let ridge_lat = observer.latitude() + 0.05;
    let store = store_with(MockOpener::new(move |_, lat| if lat > ridge_lat { 1000.0 } else { 0.0 }));

    let profile = compute_horizon_profile(&store, observer, &small_params()).unwrap();

    let north = profile.angle_at(0.0).unwrap();
    let south = profile.angle_at(180.0).unwrap();
    assert!(north > 5.0, "north {north}");
    assert!(south < 0.0, "south {south}");
}

#[test]
fn test_missing_terrain_counts_as_sea_level() {
    let observer = fuji();
    let gap_lat = observer.latitude() + 0.02;
    // no data beyond the gap line, observer on a 10 m plateau
    let store = store_with(MockOpener::new(move |_, lat| if lat > gap_lat { f64::NAN } else { 10.0 }));

    let profile = compute_horizon_profile(&store, observer, &small_params()).unwrap();
    assert!(profile.angles.iter().all(|a| a.is_finite()));
}

#[test]
fn test_profile_at_whole_degree_observer() {
    let store = covering_store();
    for observer in [coord(35.0, 139.0), coord(36.0, 138.0), coord(35.5, 139.5)] {
        let profile = compute_horizon_profile(&store, observer, &small_params()).unwrap();
        assert_eq!(profile.len(), small_params().num_directions);
        assert!(profile.angles.iter().all(|a| a.is_finite()));
    }
}

#[test]
fn test_observer_without_data_aborts() {
    let store = flat_store(0.0);
    let ocean = coord(0.5, -150.0);

    let err = compute_horizon_profile(&store, ocean, &small_params()).unwrap_err();
    assert!(matches!(err, VisibilityError::DataUnavailable(_)));
    assert!(err.is_data_absence());
}

#[test]
fn test_known_ground_skips_observer_lookup() {
    let opener = MockOpener::flat(0.0);
    let samples = opener.samples.clone();
    let store = store_with(opener);

    assert_eq!(observer_ground(&store, fuji()).unwrap(), 0.0);
    assert_eq!(samples.load(Ordering::SeqCst), 1);

    // no tile covers this point, yet the given ground is enough
    let ocean = coord(0.5, -150.0);
    let profile = horizon_profile_from_ground(&store, ocean, 100.0, &small_params()).unwrap();
    assert_eq!(profile.len(), small_params().num_directions);
    assert!(profile.angles.iter().all(|&a| a < 0.0));
    assert_eq!(samples.load(Ordering::SeqCst), 1);
}

#[test]
fn test_implausible_observer_aborts() {
    let store = flat_store(-5000.0);
    let err = compute_horizon_profile(&store, fuji(), &small_params()).unwrap_err();
    assert!(matches!(err, VisibilityError::ObserverElevation { .. }));
}

#[test]
fn test_invalid_params_rejected() {
    let store = flat_store(0.0);
    let params = HorizonParams { num_directions: 0, ..small_params() };
    assert!(matches!(
        compute_horizon_profile(&store, fuji(), &params),
        Err(VisibilityError::InvalidInput(_))
    ));
}

#[test]
fn test_bin_for_azimuth() {
    let profile = HorizonProfile::from_angles(vec![1.0, 2.0, 3.0, 4.0]);
    assert_eq!(profile.bin_for_azimuth(0.0), 0);
    assert_eq!(profile.bin_for_azimuth(89.9), 0);
    assert_eq!(profile.bin_for_azimuth(90.0), 1);
    assert_eq!(profile.bin_for_azimuth(359.9), 3);
    assert_eq!(profile.bin_for_azimuth(360.0), 3);
    assert_eq!(profile.bin_for_azimuth(-10.0), 0);
    assert_eq!(profile.fraction_at_or_below(2.0), Some(0.5));
}
