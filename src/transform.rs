use glam::{DMat4, DVec3, DVec4};

use crate::coord::Coord;
use crate::error::{GridError, Result};

const AFFINE_ROW: DVec4 = DVec4::new(0.0, 0.0, 0.0, 1.0);

/// Affine map from voxel-index space to world space.
///
/// The inverse is computed once on construction so world-space queries do
/// not pay for a matrix inversion per sample.
#[derive(Debug, Clone, Copy)]
pub struct Transform {
    matrix: DMat4,
    inverse: DMat4,
}

impl Transform {
    pub fn identity() -> Self {
        Self {
            matrix: DMat4::IDENTITY,
            inverse: DMat4::IDENTITY,
        }
    }

    /// Uniform scale, as produced by image import with a given voxel size.
    pub fn uniform_scale(voxel_size: f64) -> Result<Self> {
        Self::from_matrix(DMat4::from_scale(DVec3::splat(voxel_size)))
    }

    pub fn translation(offset: DVec3) -> Self {
        Self {
            matrix: DMat4::from_translation(offset),
            inverse: DMat4::from_translation(-offset),
        }
    }

    /// Build from a row-major 4x4 matrix.
    pub fn from_rows(rows: [[f64; 4]; 4]) -> Result<Self> {
        Self::from_matrix(DMat4::from_cols_array_2d(&rows).transpose())
    }

    /// Build from 16 row-major values.
    pub fn from_row_slice(values: &[f64]) -> Result<Self> {
        let values: &[f64; 16] = values.try_into().map_err(|_| {
            GridError::InvalidTransform(format!("expected 16 values, got {}", values.len()))
        })?;
        Self::from_matrix(DMat4::from_cols_array(values).transpose())
    }

    pub fn from_matrix(matrix: DMat4) -> Result<Self> {
        if !matrix.is_finite() {
            return Err(GridError::InvalidTransform(
                "matrix contains non-finite values".into(),
            ));
        }
        if matrix.row(3) != AFFINE_ROW {
            return Err(GridError::InvalidTransform(format!(
                "bottom row must be [0, 0, 0, 1], got {:?}",
                matrix.row(3).to_array()
            )));
        }
        let determinant = matrix.determinant();
        if determinant == 0.0 || !determinant.is_finite() {
            return Err(GridError::InvalidTransform(format!(
                "matrix is singular (determinant {determinant})"
            )));
        }
        let inverse = matrix.inverse();
        if !inverse.is_finite() {
            return Err(GridError::InvalidTransform(
                "matrix has no finite inverse".into(),
            ));
        }
        Ok(Self { matrix, inverse })
    }

    pub fn matrix(&self) -> &DMat4 {
        &self.matrix
    }

    pub fn to_rows(&self) -> [[f64; 4]; 4] {
        self.matrix.transpose().to_cols_array_2d()
    }

    pub fn to_row_array(&self) -> [f64; 16] {
        self.matrix.transpose().to_cols_array()
    }

    /// Index space to world space.
    pub fn apply(&self, point: DVec3) -> DVec3 {
        self.matrix.transform_point3(point)
    }

    pub fn apply_coord(&self, coord: Coord) -> DVec3 {
        self.apply(coord.as_dvec3())
    }

    /// World space to (continuous) index space.
    pub fn inverse_apply(&self, world: DVec3) -> DVec3 {
        self.inverse.transform_point3(world)
    }

    /// `other` applied after this transform.
    pub fn then(&self, other: &Transform) -> Transform {
        let matrix = other.matrix * self.matrix;
        Transform {
            matrix,
            inverse: self.inverse * other.inverse,
        }
    }

    /// World-space length of one voxel step along each index axis.
    pub fn voxel_size(&self) -> DVec3 {
        DVec3::new(
            self.matrix.x_axis.truncate().length(),
            self.matrix.y_axis.truncate().length(),
            self.matrix.z_axis.truncate().length(),
        )
    }

    pub fn abs_diff_eq(&self, other: &Transform, max_abs_diff: f64) -> bool {
        self.matrix.abs_diff_eq(other.matrix, max_abs_diff)
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::identity()
    }
}

impl PartialEq for Transform {
    fn eq(&self, other: &Self) -> bool {
        self.matrix == other.matrix
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rows_roundtrip() {
        let rows = [
            [1.0, 0.0, 0.0, 30.0],
            [0.0, 1.0, 0.0, -20.0],
            [0.0, 0.0, 1.0, 10.0],
            [0.0, 0.0, 0.0, 1.0],
        ];
        let xform = Transform::from_rows(rows).unwrap();
        assert_eq!(xform.to_rows(), rows);
        assert_eq!(xform.apply(DVec3::ZERO), DVec3::new(30.0, -20.0, 10.0));
    }

    #[test]
    fn test_rejects_projective_matrix() {
        let rows = [
            [1.0, 0.0, 0.0, 0.0],
            [0.0, 1.0, 0.0, 0.0],
            [0.0, 0.0, 1.0, 0.0],
            [0.0, 0.0, 0.5, 1.0],
        ];
        assert!(matches!(
            Transform::from_rows(rows),
            Err(GridError::InvalidTransform(_))
        ));
    }

    #[test]
    fn test_rejects_wrong_shape() {
        assert!(matches!(
            Transform::from_row_slice(&[1.0; 12]),
            Err(GridError::InvalidTransform(_))
        ));
    }

    #[test]
    fn test_inverse_apply() {
        let xform = Transform::uniform_scale(0.5)
            .unwrap()
            .then(&Transform::translation(DVec3::new(1.0, 2.0, 3.0)));
        let world = xform.apply(DVec3::new(4.0, 6.0, 8.0));
        assert_eq!(world, DVec3::new(3.0, 5.0, 7.0));
        let index = xform.inverse_apply(world);
        assert!(index.abs_diff_eq(DVec3::new(4.0, 6.0, 8.0), 1e-12));
        assert!((xform.voxel_size() - DVec3::splat(0.5)).length() < 1e-12);
    }

    #[test]
    fn test_accepts_small_voxel_sizes() {
        let xform = Transform::uniform_scale(5e-6).unwrap();
        let index = xform.inverse_apply(xform.apply(DVec3::new(3.0, -7.0, 11.0)));
        assert!(index.abs_diff_eq(DVec3::new(3.0, -7.0, 11.0), 1e-9));

        let fine = Transform::uniform_scale(1e-3)
            .unwrap()
            .then(&Transform::uniform_scale(1e-3).unwrap());
        let restored = Transform::from_row_slice(&fine.to_row_array()).unwrap();
        assert!((restored.voxel_size() - DVec3::splat(1e-6)).length() < 1e-18);
    }

    #[test]
    fn test_rejects_singular_matrix() {
        let rows = [
            [1.0, 0.0, 0.0, 0.0],
            [0.0, 0.0, 0.0, 0.0],
            [0.0, 0.0, 1.0, 0.0],
            [0.0, 0.0, 0.0, 1.0],
        ];
        assert!(matches!(
            Transform::from_rows(rows),
            Err(GridError::InvalidTransform(_))
        ));
        assert!(Transform::uniform_scale(0.0).is_err());
        assert!(Transform::uniform_scale(1e-200).is_err());
    }
}
