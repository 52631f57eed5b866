use std::io::Cursor;

use glam::DVec3;
use proptest::prelude::*;
use sparse_volume::{
    AnyGrid, BoundingBox, Coord, FloatGrid, Transform, WriteOptions, load_grids, save_grids,
};

fn coord_strategy() -> impl Strategy<Value = Coord> {
    (-40i32..40, -40i32..40, -40i32..40).prop_map(|(x, y, z)| Coord::new(x, y, z))
}

fn voxels_strategy() -> impl Strategy<Value = Vec<(Coord, f32)>> {
    prop::collection::vec((coord_strategy(), -1000.0f32..1000.0), 0..200)
}

fn build(voxels: &[(Coord, f32)]) -> FloatGrid {
    let mut grid = FloatGrid::new("prop");
    for &(coord, value) in voxels {
        grid.set_value(coord, value).unwrap();
    }
    grid
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn bounding_box_contains_active_voxels(voxels in voxels_strategy()) {
        let grid = build(&voxels);
        let bbox = grid.bounding_box();
        prop_assert_eq!(bbox.is_empty(), voxels.is_empty());
        for (coord, _) in grid.active_voxels() {
            prop_assert!(bbox.contains(coord));
        }
        if !bbox.is_empty() {
            prop_assert!(grid.active_voxels().any(|(c, _)| c.x == bbox.min.x));
            prop_assert!(grid.active_voxels().any(|(c, _)| c.z == bbox.max.z));
        }
    }

    #[test]
    fn dense_matches_point_queries(
        voxels in voxels_strategy(),
        min in coord_strategy(),
        extent in (0i32..6, 0i32..6, 0i32..6),
    ) {
        let grid = build(&voxels);
        let bbox = BoundingBox::new(min, min + Coord::new(extent.0, extent.1, extent.2));
        let dense = grid.get_dense(&bbox);
        for ((i, j, k), value) in dense.indexed_iter() {
            let coord = bbox.min + Coord::new(i as i32, j as i32, k as i32);
            prop_assert_eq!(*value, grid.get_value(coord));
        }
    }

    #[test]
    fn reset_reads_background(voxels in voxels_strategy(), target in coord_strategy()) {
        let mut grid = build(&voxels);
        grid.set_value(target, 42.0).unwrap();
        grid.set_value(target, grid.background()).unwrap();
        prop_assert_eq!(grid.get_value(target), grid.background());
        grid.prune(0.0);
        prop_assert_eq!(grid.get_value(target), grid.background());
        prop_assert!(!grid.is_active(target));
    }

    #[test]
    fn interpolation_hits_voxel_values(
        voxels in voxels_strategy(),
        scale in 0.05f64..4.0,
        offset in (-10.0f64..10.0, -10.0f64..10.0, -10.0f64..10.0),
    ) {
        let mut grid = build(&voxels);
        grid.set_transform(Transform::uniform_scale(scale).unwrap());
        grid.transform_grid(&Transform::translation(DVec3::new(offset.0, offset.1, offset.2)));
        for (coord, value) in grid.active_voxels() {
            let world = grid.index_to_world(coord);
            let sampled = grid.get_interpolated_value(world);
            prop_assert!((sampled - value).abs() <= 1e-3 * value.abs().max(1.0));
        }
    }

    #[test]
    fn container_roundtrip(voxels in voxels_strategy(), compress in any::<bool>()) {
        let grid = build(&voxels);
        let mut buffer = Vec::new();
        let options = WriteOptions::default().with_compression(compress);
        save_grids(&mut buffer, &[AnyGrid::from(grid.clone())], &options).unwrap();
        let restored = load_grids(&mut Cursor::new(buffer)).unwrap();
        let restored = restored[0].as_scalar().unwrap();
        prop_assert_eq!(restored.active_voxel_count(), grid.active_voxel_count());
        for (coord, value) in grid.active_voxels() {
            prop_assert_eq!(restored.get_value(coord), value);
        }
    }
}
