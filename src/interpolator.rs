use glam::DVec3;

use crate::coord::Coord;
use crate::grid::Grid;
use crate::value::Value;

pub(crate) struct Interpolator;

const INDEX_MIN: f64 = i32::MIN as f64;
const INDEX_MAX: f64 = i32::MAX as f64;

/// Integral index-space position as a `Coord`, or `None` when it falls
/// outside the key space (or is not finite).
fn to_coord(point: DVec3) -> Option<Coord> {
    let inside = |v: f64| (INDEX_MIN..=INDEX_MAX).contains(&v);
    if inside(point.x) && inside(point.y) && inside(point.z) {
        Some(Coord::new(point.x as i32, point.y as i32, point.z as i32))
    } else {
        None
    }
}

impl Interpolator {
    /// Trilinear interpolation at a continuous index-space position.
    ///
    /// Voxel centres sit on integer coordinates; unset corners contribute the
    /// grid background, as do corners outside the key space.
    #[inline]
    pub(crate) fn trilinear<T: Value>(grid: &Grid<T>, point: DVec3) -> T {
        let base = point.floor();
        let frac = (point - base).as_vec3();

        let sample = |dx: i32, dy: i32, dz: i32| {
            let corner = base + DVec3::new(dx as f64, dy as f64, dz as f64);
            to_coord(corner).map_or(grid.background(), |coord| grid.get_value(coord))
        };

        let one_minus = glam::Vec3::ONE - frac;

        let c00 = sample(0, 0, 0) * one_minus.x + sample(1, 0, 0) * frac.x;
        let c10 = sample(0, 1, 0) * one_minus.x + sample(1, 1, 0) * frac.x;
        let c01 = sample(0, 0, 1) * one_minus.x + sample(1, 0, 1) * frac.x;
        let c11 = sample(0, 1, 1) * one_minus.x + sample(1, 1, 1) * frac.x;

        let c0 = c00 * one_minus.y + c10 * frac.y;
        let c1 = c01 * one_minus.y + c11 * frac.y;

        c0 * one_minus.z + c1 * frac.z
    }

    #[inline]
    pub(crate) fn nearest<T: Value>(grid: &Grid<T>, point: DVec3) -> T {
        to_coord(point.round()).map_or(grid.background(), |coord| grid.get_value(coord))
    }
}
