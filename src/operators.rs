//! Differential operators and voxel-wise arithmetic.
//!
//! Differences are taken in index space with unit spacing. Derived grids
//! copy the source transform and read as their (zero) background wherever
//! they are not populated. Gradients are populated at the source's active
//! voxels and at the face neighbours just outside them. The Laplacian and
//! magnitudes only cover the source's active voxels.

use glam::Vec3;
use rayon::prelude::*;

use crate::coord::Coord;
use crate::enums::{CombineOp, Neighbourhood, ScalarOp};
use crate::error::{GridError, Result};
use crate::grid::{FloatGrid, Grid, VectorGrid, check_finite};
use crate::value::Value;

impl FloatGrid {
    /// Central-difference gradient over the active voxels and their face
    /// neighbours.
    pub fn gradient(&self) -> VectorGrid {
        let mut out = self.empty_like(format!("{}_gradient", self.name()), Vec3::ZERO);
        out.apply_updates(self.map_coords(self.active_with_face_shell(), |coord| {
            self.gradient_at(coord)
        }));
        out
    }

    /// Sum of second central differences along the three axes.
    pub fn laplacian(&self) -> FloatGrid {
        let mut out = self.empty_like(format!("{}_laplacian", self.name()), 0.0f32);
        out.apply_updates(self.map_active(|coord| {
            let center = 2.0 * self.get_value(coord);
            [Coord::X, Coord::Y, Coord::Z]
                .iter()
                .map(|&axis| {
                    self.get_offset_value(coord, axis) + self.get_offset_value(coord, -axis)
                        - center
                })
                .sum::<f32>()
        }));
        out
    }

    pub fn gradient_magnitude(&self) -> FloatGrid {
        let mut out = self.empty_like(format!("{}_gradient_magnitude", self.name()), 0.0f32);
        out.apply_updates(self.map_coords(self.active_with_face_shell(), |coord| {
            self.gradient_at(coord).length()
        }));
        out
    }

    fn gradient_at(&self, coord: Coord) -> Vec3 {
        let diff = |axis: Coord| {
            (self.get_offset_value(coord, axis) - self.get_offset_value(coord, -axis)) * 0.5
        };
        Vec3::new(diff(Coord::X), diff(Coord::Y), diff(Coord::Z))
    }

    /// Combines every active value with the constant `n`.
    ///
    /// Comparisons store 1.0 when true and 0.0 otherwise. Fails without
    /// modifying the grid if any result is not finite.
    pub fn apply_scalar(&mut self, op: ScalarOp, n: f32) -> Result<()> {
        check_finite(&n)?;
        let updates: Vec<(Coord, f32)> = self
            .store()
            .iter()
            .collect::<Vec<_>>()
            .into_par_iter()
            .map(|(coord, value)| (coord, scalar_op(op, value, n)))
            .collect();
        if let Some((coord, value)) = updates.iter().find(|(_, value)| !value.is_finite()) {
            return Err(GridError::InvalidValue(format!(
                "{op:?} with {n} gives {value} at {coord}"
            )));
        }
        self.apply_updates(updates);
        Ok(())
    }
}

fn scalar_op(op: ScalarOp, a: f32, n: f32) -> f32 {
    let truth = |b: bool| if b { 1.0 } else { 0.0 };
    match op {
        ScalarOp::Sum => a + n,
        ScalarOp::Diff => a - n,
        ScalarOp::Mul => a * n,
        ScalarOp::Div => a / n,
        ScalarOp::Pow => a.powf(n),
        ScalarOp::Min => a.min(n),
        ScalarOp::Max => a.max(n),
        ScalarOp::Lt => truth(a < n),
        ScalarOp::Gt => truth(a > n),
        ScalarOp::Eq => truth(a == n),
    }
}

impl VectorGrid {
    /// Length of every active vector.
    pub fn magnitude(&self) -> FloatGrid {
        let mut out = self.empty_like(format!("{}_magnitude", self.name()), 0.0f32);
        out.apply_updates(self.map_active(|coord| self.get_value(coord).length()));
        out
    }
}

impl<T: Value> Grid<T> {
    /// Evaluates `f` at every active voxel in parallel.
    pub(crate) fn map_active<U, F>(&self, f: F) -> Vec<(Coord, U)>
    where
        U: Send,
        F: Fn(Coord) -> U + Sync,
    {
        self.map_coords(self.store().coords(), f)
    }

    pub(crate) fn map_coords<U, F>(&self, coords: Vec<Coord>, f: F) -> Vec<(Coord, U)>
    where
        U: Send,
        F: Fn(Coord) -> U + Sync,
    {
        coords.into_par_iter().map(|coord| (coord, f(coord))).collect()
    }

    /// Active voxels plus their face neighbours, each listed once.
    pub(crate) fn active_with_face_shell(&self) -> Vec<Coord> {
        let offsets = Neighbourhood::Faces.offsets();
        let mut coords: Vec<Coord> = self
            .store()
            .coords()
            .into_par_iter()
            .flat_map_iter(|coord| {
                std::iter::once(coord).chain(
                    offsets
                        .iter()
                        .filter_map(move |&offset| coord.checked_add(offset)),
                )
            })
            .collect();
        coords.par_sort_unstable_by_key(|c| (c.z, c.y, c.x));
        coords.dedup();
        coords
    }

    /// Combines `other` into this grid over the union of both active sets.
    ///
    /// Missing voxels read as each grid's background. This grid keeps its
    /// own background. Fails without modifying the grid if any result is
    /// not finite.
    pub fn combine(&mut self, other: &Grid<T>, op: CombineOp) -> Result<()> {
        let mut coords = self.store().coords();
        coords.extend(other.store().coords());
        coords.sort_unstable_by_key(|c| (c.z, c.y, c.x));
        coords.dedup();

        let updates: Vec<(Coord, T)> = coords
            .into_par_iter()
            .map(|coord| {
                let a = self.get_value(coord);
                let b = other.get_value(coord);
                let value = match op {
                    CombineOp::Max => a.component_max(b),
                    CombineOp::Min => a.component_min(b),
                    CombineOp::Sum => a + b,
                    CombineOp::Diff => a - b,
                    CombineOp::Mul => a.component_mul(b),
                    CombineOp::IfZero => {
                        if a == T::zero() {
                            b
                        } else {
                            a
                        }
                    }
                };
                (coord, value)
            })
            .collect();
        updates
            .iter()
            .try_for_each(|(_, value)| check_finite(value))?;
        self.apply_updates(updates);
        Ok(())
    }
}
