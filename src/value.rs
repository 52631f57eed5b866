//! Voxel value types.
//!
//! A grid is generic over [`Value`], implemented for `f32` (scalar grids) and
//! [`glam::Vec3`] (vector grids).

use std::fmt::Debug;
use std::ops::{Add, Mul, Sub};

use glam::Vec3;

use crate::enums::ValueKind;

pub trait Value:
    Copy
    + Debug
    + PartialEq
    + Send
    + Sync
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<f32, Output = Self>
    + 'static
{
    const KIND: ValueKind;
    const COMPONENTS: usize;

    fn zero() -> Self;

    fn is_finite(&self) -> bool;

    fn component_mul(self, other: Self) -> Self;

    fn component_max(self, other: Self) -> Self;

    fn component_min(self, other: Self) -> Self;

    /// Largest absolute difference over all components.
    fn max_abs_diff(self, other: Self) -> f32;

    fn component(&self, index: usize) -> f32;

    /// Builds a value from `COMPONENTS` floats.
    fn from_components(components: &[f32]) -> Self;

    /// Component-wise median. `values` is reordered.
    fn median(values: &mut [Self]) -> Self;
}

fn median_f32(values: &mut [f32]) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    values.sort_unstable_by(f32::total_cmp);
    values[values.len() / 2]
}

impl Value for f32 {
    const KIND: ValueKind = ValueKind::Scalar;
    const COMPONENTS: usize = 1;

    fn zero() -> Self {
        0.0
    }

    fn is_finite(&self) -> bool {
        f32::is_finite(*self)
    }

    fn component_mul(self, other: Self) -> Self {
        self * other
    }

    fn component_max(self, other: Self) -> Self {
        self.max(other)
    }

    fn component_min(self, other: Self) -> Self {
        self.min(other)
    }

    fn max_abs_diff(self, other: Self) -> f32 {
        (self - other).abs()
    }

    fn component(&self, _index: usize) -> f32 {
        *self
    }

    fn from_components(components: &[f32]) -> Self {
        components[0]
    }

    fn median(values: &mut [Self]) -> Self {
        median_f32(values)
    }
}

impl Value for Vec3 {
    const KIND: ValueKind = ValueKind::Vector;
    const COMPONENTS: usize = 3;

    fn zero() -> Self {
        Vec3::ZERO
    }

    fn is_finite(&self) -> bool {
        Vec3::is_finite(*self)
    }

    fn component_mul(self, other: Self) -> Self {
        self * other
    }

    fn component_max(self, other: Self) -> Self {
        self.max(other)
    }

    fn component_min(self, other: Self) -> Self {
        self.min(other)
    }

    fn max_abs_diff(self, other: Self) -> f32 {
        (self - other).abs().max_element()
    }

    fn component(&self, index: usize) -> f32 {
        self[index]
    }

    fn from_components(components: &[f32]) -> Self {
        Vec3::new(components[0], components[1], components[2])
    }

    fn median(values: &mut [Self]) -> Self {
        let mut channel: Vec<f32> = Vec::with_capacity(values.len());
        let mut result = Vec3::ZERO;
        for axis in 0..3 {
            channel.clear();
            channel.extend(values.iter().map(|v| v[axis]));
            result[axis] = median_f32(&mut channel);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_median() {
        let mut values = [5.0f32, 1.0, 3.0, 2.0, 4.0];
        assert_eq!(f32::median(&mut values), 3.0);
    }

    #[test]
    fn test_vector_median_is_component_wise() {
        let mut values = [
            Vec3::new(1.0, 9.0, 0.0),
            Vec3::new(2.0, 8.0, 0.0),
            Vec3::new(3.0, 7.0, 5.0),
        ];
        assert_eq!(Vec3::median(&mut values), Vec3::new(2.0, 8.0, 0.0));
    }

    #[test]
    fn test_max_abs_diff() {
        assert_eq!(
            Vec3::new(1.0, 2.0, 3.0).max_abs_diff(Vec3::new(1.5, 0.0, 3.0)),
            2.0
        );
        assert_eq!(2.0f32.max_abs_diff(-1.0), 3.0);
    }
}
