use std::collections::HashSet;
use std::io::Write;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use super::{coord, covering_store, fuji, store_with, CoveringOpener, MockOpener, MockResolver};
use crate::geo::{Coordinate, MeshCode, MeshLevel};
use crate::terrain::{ElevationStore, GridRaster, HgtTileOpener, Raster, TileOpener, HGT_VOID};

#[test]
fn test_batch_returns_one_result_per_coordinate_in_order() {
    let opener = MockOpener::new(|lon, lat| lat * 1000.0 + lon);
    let opens = opener.opens.clone();
    let samples = opener.samples.clone();
    let store = store_with(opener);

    let base = fuji();
    // three points per tile across four tiles, interleaved
    let coords: Vec<Coordinate> = (0..12)
        .map(|i| coord(base.latitude() + (i % 4) as f64 * 0.01, base.longitude() + (i / 4) as f64 * 0.0001))
        .collect();
    let tiles: HashSet<MeshCode> = coords
        .iter()
        .filter_map(|c| MeshCode::from_coord(*c, MeshLevel::Tertiary))
        .collect();

    let values = store.elevations(&coords);

    assert_eq!(values.len(), coords.len());
    for (c, v) in coords.iter().zip(&values) {
        assert_eq!(*v, Some(c.latitude() * 1000.0 + c.longitude()));
    }
    // one open and one batched sample per touched tile
    assert_eq!(opens.load(Ordering::SeqCst), tiles.len());
    assert_eq!(samples.load(Ordering::SeqCst), tiles.len());
    assert_eq!(store.open_tiles(), tiles.len());

    // second pass is served from the cache
    store.elevations(&coords);
    assert_eq!(opens.load(Ordering::SeqCst), tiles.len());
    assert!(store.cache_metrics().hits >= tiles.len() as u64);
}

#[test]
fn test_tile_edges_belong_to_their_square() {
    let key = MeshCode::from_coord(coord(35.0, 139.0), MeshLevel::Tertiary).unwrap();
    let b = key.bounds();
    let raster = CoveringOpener.open(&key, std::path::Path::new("unused")).unwrap();

    let values = raster
        .sample(&[(b.west, b.south), (b.east, b.south), (b.west, b.north), (b.east, b.north)])
        .unwrap();
    assert_eq!(values, vec![1012.0, 1015.0, 1000.0, 1003.0]);

    let cell = (b.north - b.south) / CoveringOpener::SIZE as f64;
    let outside = raster.sample(&[(b.west, b.south - cell / 2.0), (b.east + cell, b.north)]).unwrap();
    assert!(outside.iter().all(|v| v.is_nan()));
}

#[test]
fn test_batch_with_tile_corners_and_edges() {
    let store = covering_store();
    // tertiary square is 30" x 45"; the covering grid splits it 4 x 4
    let dlat = 30.0 / 3600.0 / 4.0;
    let dlon = 45.0 / 3600.0 / 4.0;

    let coords = vec![
        coord(35.0, 139.0),
        coord(35.0 + 3.5 * dlat, 139.0 + 0.5 * dlon),
        coord(35.0, 139.0 + 2.5 * dlon),
        coord(36.0, 138.0),
        coord(35.0 + 2.5 * dlat, 139.0),
        coord(35.5, 139.5),
        coord(34.0, 135.0),
    ];
    let values = store.elevations(&coords);

    assert_eq!(
        values,
        vec![Some(1012.0), Some(1000.0), Some(1014.0), Some(1012.0), Some(1004.0), Some(1012.0), Some(1012.0)]
    );
}

#[test]
fn test_points_on_grid_lines_have_data() {
    let store = covering_store();
    let step_lat = 30.0 / 3600.0;
    let step_lon = 45.0 / 3600.0;

    let coords: Vec<Coordinate> = (0..200)
        .flat_map(|i| {
            let along = i as f64 * 0.00037;
            [
                coord(35.0 + (i % 40) as f64 * step_lat, 139.0 + along),
                coord(35.0 + along, 139.0 + (i % 40) as f64 * step_lon),
            ]
        })
        .collect();

    let values = store.elevations(&coords);
    assert_eq!(values.len(), coords.len());
    assert!(values.iter().all(Option::is_some));
    assert_eq!(store.elevation_at(coord(35.0, 139.0)), Some(CoveringOpener::SOUTH_WEST));
}

#[test]
fn test_missing_and_failed_tiles_degrade_per_coordinate() {
    let good = fuji();
    let bad = coord(good.latitude() + 0.05, good.longitude());
    let bad_key = MeshCode::from_coord(bad, MeshLevel::Tertiary).unwrap();

    let mut opener = MockOpener::flat(100.0);
    opener.fail = Some(bad_key);
    let store = store_with(opener);

    let outside = coord(-33.9, 18.4);
    let values = store.elevations(&[good, bad, outside, good]);
    assert_eq!(values, vec![Some(100.0), None, None, Some(100.0)]);
}

#[test]
fn test_unresolved_tile_is_unavailable() {
    let known = MeshCode::from_coord(fuji(), MeshLevel::Tertiary).unwrap();
    let resolver = MockResolver { only: Some(HashSet::from([known])) };
    let store = ElevationStore::new(Arc::new(resolver), Arc::new(MockOpener::flat(5.0)), 8).unwrap();

    let elsewhere = coord(36.0, 139.0);
    assert_eq!(store.elevation_at(fuji()), Some(5.0));
    assert_eq!(store.elevation_at(elsewhere), None);
}

#[test]
fn test_nodata_is_unavailable() {
    let store = store_with(MockOpener::flat(f64::NAN));
    assert_eq!(store.elevation_at(fuji()), None);
}

#[test]
fn test_zero_capacity_rejected() {
    let result = ElevationStore::new(Arc::new(MockResolver::default()), Arc::new(MockOpener::flat(0.0)), 0);
    assert!(result.is_err());
}

#[test]
fn test_fork_and_close() {
    let store = store_with(MockOpener::flat(1.0));
    store.elevation_at(fuji());
    assert_eq!(store.open_tiles(), 1);

    let fork = store.fork();
    assert_eq!(fork.open_tiles(), 0);
    assert_eq!(fork.elevation_at(fuji()), Some(1.0));

    store.close_all();
    assert_eq!(store.open_tiles(), 0);
}

#[test]
fn test_hgt_tile_georeferenced_by_mesh_key() {
    let key: MeshCode = "53383800".parse().unwrap();
    let b = key.bounds();

    // 3x3, north row first
    let heights: [i16; 9] = [10, 20, 30, 40, 50, 60, 70, HGT_VOID, 90];
    let mut file = tempfile::NamedTempFile::new().unwrap();
    for h in heights {
        file.write_all(&h.to_be_bytes()).unwrap();
    }
    file.flush().unwrap();

    let raster = HgtTileOpener.open(&key, file.path()).unwrap();

    let dlat = (b.north - b.south) / 3.0;
    let dlon = (b.east - b.west) / 3.0;
    let centre = |row: usize, col: usize| (b.west + (col as f64 + 0.5) * dlon, b.north - (row as f64 + 0.5) * dlat);

    let values = raster.sample(&[centre(0, 0), centre(1, 1), centre(2, 2), centre(2, 1), (b.west - 1.0, b.north)]).unwrap();
    assert_eq!(values[0], 10.0);
    assert_eq!(values[1], 50.0);
    assert_eq!(values[2], 90.0);
    assert!(values[3].is_nan());
    assert!(values[4].is_nan());
}

#[test]
fn test_hgt_rejects_non_square_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(&[0u8; 10]).unwrap();
    file.flush().unwrap();

    let key: MeshCode = "53383800".parse().unwrap();
    assert!(HgtTileOpener::load(&key, file.path()).is_err());
}

#[test]
fn test_ascii_grid() {
    let text = "ncols 2\nnrows 2\nxllcorner 139.0\nyllcorner 35.0\ncellsize 0.5\nNODATA_value -9999\n1 2\n-9999 4\n";
    let grid = GridRaster::parse_ascii_grid(text).unwrap();

    assert_eq!(grid.west, 139.0);
    assert_eq!(grid.north, 36.0);
    let values = grid.sample(&[(139.25, 35.75), (139.75, 35.75), (139.25, 35.25), (139.75, 35.25)]).unwrap();
    assert_eq!(values[0], 1.0);
    assert_eq!(values[1], 2.0);
    assert!(values[2].is_nan());
    assert_eq!(values[3], 4.0);

    assert!(GridRaster::parse_ascii_grid("ncols 2\nnrows 2\ncellsize 1\n1 2 3 4").is_err());
    assert!(GridRaster::parse_ascii_grid("ncols 2\nnrows 2\nxllcorner 0\nyllcorner 0\ncellsize 1\n1 2 3").is_err());
}
