use glam::{DVec3, Vec3};
use sparse_volume::{
    AnyGrid, BoundingBox, Coord, FilterType, FloatGrid, GridError, Interpolation, Transform,
    ValueKind, VectorGrid,
};

fn corner_grid() -> FloatGrid {
    let mut grid = FloatGrid::new("corners");
    grid.set_value(Coord::new(0, 0, 0), 120.0).unwrap();
    grid.set_value(Coord::new(0, 1, 0), 150.0).unwrap();
    grid.set_value(Coord::new(0, 1, 1), 40.0).unwrap();
    grid.set_value(Coord::new(0, 0, 1), 170.0).unwrap();
    grid
}

#[test]
fn test_bounding_box_and_background() {
    let grid = corner_grid();
    assert_eq!(
        grid.bounding_box(),
        BoundingBox::new(Coord::new(0, 0, 0), Coord::new(0, 1, 1))
    );
    assert_eq!(grid.get_value(Coord::new(0, 0, 0)), 120.0);
    assert_eq!(grid.get_value(Coord::new(1, 1, 1)), 0.0);
    assert_eq!(grid.value_kind(), ValueKind::Scalar);
}

#[test]
fn test_empty_grid_has_empty_box() {
    let grid = VectorGrid::new("flow");
    assert!(grid.bounding_box().is_empty());
    assert_eq!(grid.get_value(Coord::splat(3)), Vec3::ZERO);
    assert_eq!(grid.active_voxel_count(), 0);
}

#[test]
fn test_dense_matches_point_queries() {
    let grid = corner_grid();
    let bbox = BoundingBox::new(Coord::new(-1, -1, -1), Coord::new(1, 2, 2));
    let dense = grid.get_dense(&bbox);
    assert_eq!(dense.dim(), (3, 4, 4));
    for ((i, j, k), value) in dense.indexed_iter() {
        let coord = bbox.min + Coord::new(i as i32, j as i32, k as i32);
        assert_eq!(*value, grid.get_value(coord));
    }
}

#[test]
fn test_reset_to_background() {
    let mut grid = corner_grid();
    grid.set_value(Coord::new(0, 1, 1), 0.0).unwrap();
    assert_eq!(grid.get_value(Coord::new(0, 1, 1)), 0.0);
    grid.prune(0.0);
    assert_eq!(grid.get_value(Coord::new(0, 1, 1)), 0.0);
    assert_eq!(grid.active_voxel_count(), 3);
}

#[test]
fn test_non_finite_values_rejected() {
    let mut grid = corner_grid();
    assert!(matches!(
        grid.set_value(Coord::ZERO, f32::INFINITY),
        Err(GridError::InvalidValue(_))
    ));
    assert_eq!(grid.get_value(Coord::ZERO), 120.0);
}

#[test]
fn test_interpolation_at_voxel_centres() {
    let mut grid = corner_grid();
    grid.set_transform(
        Transform::from_rows([
            [0.2, 0.0, 0.0, 10.0],
            [0.0, 0.3, 0.0, -4.0],
            [0.0, 0.0, 0.5, 1.0],
            [0.0, 0.0, 0.0, 1.0],
        ])
        .unwrap(),
    );
    for (coord, value) in grid.active_voxels().collect::<Vec<_>>() {
        let world = grid.index_to_world(coord);
        assert!((grid.get_interpolated_value(world) - value).abs() < 1e-4);
        assert_eq!(grid.sample(world, Interpolation::Nearest), value);
    }
}

#[test]
fn test_identity_transform_is_noop() {
    let mut grid = corner_grid();
    let points: Vec<DVec3> = (0..20)
        .map(|i| DVec3::new(0.1 * i as f64, 0.05 * i as f64, 0.07 * i as f64))
        .collect();
    let before = grid.get_interpolated_values(&points);
    grid.transform_grid(&Transform::identity());
    assert_eq!(grid.get_interpolated_values(&points), before);
}

#[test]
fn test_transform_grid_moves_samples() {
    let mut grid = corner_grid();
    grid.transform_grid(&Transform::translation(DVec3::new(5.0, 0.0, 0.0)));
    assert_eq!(grid.get_interpolated_value(DVec3::new(5.0, 0.0, 0.0)), 120.0);
    assert_eq!(grid.get_value(Coord::ZERO), 120.0);
    assert!(matches!(
        grid.transform_grid_rows([[0.0; 4]; 4]),
        Err(GridError::InvalidTransform(_))
    ));
}

#[test]
fn test_filter_impulse_in_box() {
    let mut grid = FloatGrid::new("impulse");
    grid.fill(&BoundingBox::new(Coord::ZERO, Coord::splat(9)), 0.0)
        .unwrap();
    grid.set_value(Coord::splat(5), 255.0).unwrap();
    grid.filter(1.5, 3).unwrap();

    let centre = grid.get_value(Coord::splat(5));
    let ring = grid.get_value(Coord::new(7, 5, 5));
    let edge = grid.get_value(Coord::new(9, 5, 5));
    assert!(centre > 0.0 && ring > 0.0);
    assert!(centre > ring && ring > edge);
    assert_eq!(grid.get_value(Coord::new(30, 5, 5)), 0.0);
    assert_eq!(
        grid.bounding_box(),
        BoundingBox::new(Coord::ZERO, Coord::splat(9))
    );
}

#[test]
fn test_dilate_then_filter_reduces_edge_loss() {
    let mut plain = FloatGrid::new("plain");
    plain
        .fill(&BoundingBox::new(Coord::ZERO, Coord::splat(5)), 10.0)
        .unwrap();
    let mut dilated = plain.clone();

    plain.filter(1.0, 2).unwrap();
    dilated.dilate(2);
    dilated.filter(1.0, 2).unwrap();

    let edge = Coord::new(0, 3, 3);
    assert!(dilated.get_value(edge) > plain.get_value(edge));
}

#[test]
fn test_gradient_of_linear_ramp() {
    let mut grid = FloatGrid::new("ramp");
    grid.fill(&BoundingBox::new(Coord::ZERO, Coord::splat(4)), 0.0)
        .unwrap();
    for (coord, _) in grid.active_voxels().collect::<Vec<_>>() {
        grid.set_value(coord, 3.0 * coord.y as f32).unwrap();
    }
    let gradient = grid.gradient();
    assert_eq!(gradient.get_value(Coord::splat(2)), Vec3::new(0.0, 3.0, 0.0));
    // Just above the top face the ramp drops to the zero background.
    assert_eq!(
        gradient.get_value(Coord::new(2, 5, 2)),
        Vec3::new(0.0, -6.0, 0.0)
    );
    assert!(!gradient.is_active(Coord::new(5, 5, 2)));
    assert_eq!(gradient.transform(), grid.transform());
    assert_eq!(grid.laplacian().get_value(Coord::splat(2)), 0.0);
}

#[test]
fn test_any_grid_kind_checks() {
    let mut any = AnyGrid::from(corner_grid());
    assert_eq!(any.get_scalar(Coord::ZERO).unwrap(), 120.0);
    assert!(matches!(
        any.set_vector(Coord::ZERO, Vec3::ONE),
        Err(GridError::ValueKindMismatch {
            expected: ValueKind::Vector,
            found: ValueKind::Scalar
        })
    ));
    let scalar: FloatGrid = any.try_into().unwrap();
    assert_eq!(scalar.name(), "corners");
}

#[test]
fn test_median_filter_keeps_plateau() {
    let mut grid = FloatGrid::new("plateau");
    grid.fill(&BoundingBox::new(Coord::ZERO, Coord::splat(6)), 4.0)
        .unwrap();
    grid.filter_with(FilterType::Median, 1, 2).unwrap();
    assert_eq!(grid.get_value(Coord::splat(3)), 4.0);
    assert_eq!(grid.get_value(Coord::ZERO), 0.0);
}

#[test]
fn test_sampling_far_outside_key_space() {
    let grid = FloatGrid::new("density");
    assert_eq!(grid.get_interpolated_value(DVec3::new(3.0e9, 0.0, 0.0)), 0.0);

    let mut grid = corner_grid();
    grid.set_transform(Transform::uniform_scale(1.0e-3).unwrap());
    for point in [DVec3::new(0.0, -1.0e7, 0.0), DVec3::splat(1.0e300)] {
        assert_eq!(grid.get_interpolated_value(point), 0.0);
        assert_eq!(grid.sample(point, Interpolation::Nearest), 0.0);
    }
}
