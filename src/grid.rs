use std::path::Path;
use std::sync::OnceLock;

use glam::{DVec3, Vec3};
use ndarray::{Array3, Zip};
use rayon::prelude::*;

use crate::config::WriteOptions;
use crate::coord::{BoundingBox, Coord};
use crate::enums::{Interpolation, ValueKind};
use crate::error::{GridError, Result};
use crate::format;
use crate::interpolator::Interpolator;
use crate::storage::SparseStore;
use crate::transform::Transform;
use crate::value::Value;

pub type FloatGrid = Grid<f32>;
pub type VectorGrid = Grid<Vec3>;

/// Sparse volumetric grid.
///
/// Stores values of one kind at integer coordinates. Any coordinate that is
/// not active reads as the background value, which is fixed at construction.
/// The transform only places the grid in world space; changing it never
/// touches the stored values.
#[derive(Debug, Clone)]
pub struct Grid<T: Value> {
    name: String,
    transform: Transform,
    background: T,
    store: SparseStore<T>,
    bbox_cache: OnceLock<BoundingBox>,
}

impl<T: Value> Grid<T> {
    /// Empty grid with a zero background.
    pub fn new(name: impl Into<String>) -> Self {
        Self::from_parts(name.into(), Transform::identity(), T::zero())
    }

    pub fn with_background(name: impl Into<String>, background: T) -> Result<Self> {
        check_finite(&background)?;
        Ok(Self::from_parts(name.into(), Transform::identity(), background))
    }

    pub(crate) fn from_parts(name: String, transform: Transform, background: T) -> Self {
        Self {
            name,
            transform,
            background,
            store: SparseStore::new(background),
            bbox_cache: OnceLock::new(),
        }
    }

    /// Empty grid sharing this grid's name, transform and background.
    pub(crate) fn empty_like<U: Value>(&self, name: String, background: U) -> Grid<U> {
        Grid::from_parts(name, self.transform, background)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn background(&self) -> T {
        self.background
    }

    pub fn value_kind(&self) -> ValueKind {
        T::KIND
    }

    pub fn transform(&self) -> &Transform {
        &self.transform
    }

    /// Replaces the transform. Values are not resampled.
    pub fn set_transform(&mut self, transform: Transform) {
        self.transform = transform;
    }

    pub fn set_transform_rows(&mut self, rows: [[f64; 4]; 4]) -> Result<()> {
        self.transform = Transform::from_rows(rows)?;
        Ok(())
    }

    /// Applies `xform` after the current transform. Values are not resampled.
    pub fn transform_grid(&mut self, xform: &Transform) {
        self.transform = self.transform.then(xform);
    }

    pub fn transform_grid_rows(&mut self, rows: [[f64; 4]; 4]) -> Result<()> {
        let xform = Transform::from_rows(rows)?;
        self.transform_grid(&xform);
        Ok(())
    }

    pub fn index_to_world(&self, coord: Coord) -> DVec3 {
        self.transform.apply_coord(coord)
    }

    pub fn world_to_index(&self, world: DVec3) -> DVec3 {
        self.transform.inverse_apply(world)
    }

    #[inline]
    pub fn get_value(&self, coord: Coord) -> T {
        self.store.get(coord).unwrap_or(self.background)
    }

    /// Value at `coord + offset`; offsets that leave the key space read the
    /// background.
    #[inline]
    pub(crate) fn get_offset_value(&self, coord: Coord, offset: Coord) -> T {
        coord
            .checked_add(offset)
            .map_or(self.background, |neighbour| self.get_value(neighbour))
    }

    pub fn get_values(&self, coords: &[Coord]) -> Vec<T> {
        coords.par_iter().map(|&coord| self.get_value(coord)).collect()
    }

    /// Stores a value and marks the voxel active. Non-finite values are rejected.
    pub fn set_value(&mut self, coord: Coord, value: T) -> Result<()> {
        check_finite(&value)?;
        self.store.insert(coord, value);
        self.invalidate();
        Ok(())
    }

    /// Sets many values. Nothing is written unless every value is finite.
    pub fn set_values(&mut self, coords: &[Coord], values: &[T]) -> Result<()> {
        if coords.len() != values.len() {
            return Err(GridError::InvalidValue(format!(
                "{} coordinates but {} values",
                coords.len(),
                values.len()
            )));
        }
        values.iter().try_for_each(check_finite)?;
        for (&coord, &value) in coords.iter().zip(values) {
            self.store.insert(coord, value);
        }
        self.invalidate();
        Ok(())
    }

    pub fn is_active(&self, coord: Coord) -> bool {
        self.store.is_active(coord)
    }

    /// Turning a voxel on keeps its current value, turning it off drops it.
    pub fn set_active_state(&mut self, coord: Coord, on: bool) {
        if on {
            self.store.activate(coord);
        } else {
            self.store.remove(coord);
        }
        self.invalidate();
    }

    pub fn active_voxel_count(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    pub fn leaf_count(&self) -> usize {
        self.store.leaf_count()
    }

    /// Active voxels in deterministic order.
    pub fn active_voxels(&self) -> impl Iterator<Item = (Coord, T)> + '_ {
        self.store.iter()
    }

    /// Removes active voxels within `tolerance` of the background.
    pub fn prune(&mut self, tolerance: f32) {
        let background = self.background;
        self.store
            .retain(|_, value| value.max_abs_diff(background) > tolerance);
        self.invalidate();
    }

    /// Deactivates every voxel outside `bbox`.
    pub fn clip(&mut self, bbox: &BoundingBox) {
        self.store.retain(|coord, _| bbox.contains(coord));
        self.invalidate();
    }

    /// Activates every voxel in `bbox` with `value`.
    pub fn fill(&mut self, bbox: &BoundingBox, value: T) -> Result<()> {
        check_finite(&value)?;
        if bbox.is_empty() {
            return Ok(());
        }
        for z in bbox.min.z..=bbox.max.z {
            for y in bbox.min.y..=bbox.max.y {
                for x in bbox.min.x..=bbox.max.x {
                    self.store.insert(Coord::new(x, y, z), value);
                }
            }
        }
        self.invalidate();
        Ok(())
    }

    /// Tightest box around the active voxels; empty when nothing is active.
    pub fn bounding_box(&self) -> BoundingBox {
        *self.bbox_cache.get_or_init(|| self.store.bounding_box())
    }

    /// Dense copy of an inclusive box, indexed `[x, y, z]` from `bbox.min`.
    ///
    /// The caller bounds the box size; the full volume is allocated.
    pub fn get_dense(&self, bbox: &BoundingBox) -> Array3<T> {
        let mut dense = Array3::from_elem(bbox.dim(), self.background);
        if bbox.is_empty() {
            return dense;
        }
        let min = bbox.min;
        Zip::indexed(&mut dense).par_for_each(|(i, j, k), value| {
            *value = self.get_value(min + Coord::new(i as i32, j as i32, k as i32));
        });
        dense
    }

    pub fn get_dense_range(&self, min: Coord, max: Coord) -> Array3<T> {
        self.get_dense(&BoundingBox::new(min, max))
    }

    /// The 3x3x3 block centred on `coord`, indexed `[dx + 1, dy + 1, dz + 1]`.
    pub fn get_neighbourhood(&self, coord: Coord) -> Array3<T> {
        Array3::from_shape_fn((3, 3, 3), |(i, j, k)| {
            self.get_offset_value(coord, Coord::new(i as i32 - 1, j as i32 - 1, k as i32 - 1))
        })
    }

    /// Trilinear sample at a world-space position.
    pub fn get_interpolated_value(&self, world: DVec3) -> T {
        Interpolator::trilinear(self, self.world_to_index(world))
    }

    pub fn get_interpolated_values(&self, points: &[DVec3]) -> Vec<T> {
        self.sample_many(points, Interpolation::Trilinear)
    }

    pub fn sample(&self, world: DVec3, interpolation: Interpolation) -> T {
        let index = self.world_to_index(world);
        match interpolation {
            Interpolation::Nearest => Interpolator::nearest(self, index),
            Interpolation::Trilinear => Interpolator::trilinear(self, index),
        }
    }

    pub fn sample_many(&self, points: &[DVec3], interpolation: Interpolation) -> Vec<T> {
        points
            .par_iter()
            .map(|&world| self.sample(world, interpolation))
            .collect()
    }

    pub(crate) fn store(&self) -> &SparseStore<T> {
        &self.store
    }

    pub(crate) fn store_mut(&mut self) -> &mut SparseStore<T> {
        self.invalidate();
        &mut self.store
    }

    /// Writes `(coord, value)` pairs computed elsewhere. Values are assumed finite.
    pub(crate) fn apply_updates(&mut self, updates: Vec<(Coord, T)>) {
        for (coord, value) in updates {
            self.store.insert(coord, value);
        }
        self.invalidate();
    }

    fn invalidate(&mut self) {
        self.bbox_cache.take();
    }

    /// Writes this grid alone to `path`, replacing the file atomically.
    pub fn write(&self, path: impl AsRef<Path>, enable_compression: bool) -> Result<()> {
        let options = WriteOptions::default().with_compression(enable_compression);
        self.write_with(path, &options)
    }

    pub fn write_with(&self, path: impl AsRef<Path>, options: &WriteOptions) -> Result<()> {
        let record = format::encode_grid(self, options)?;
        format::write_records(path.as_ref(), &[record], options)
    }
}

impl<T: Value> Grid<T>
where
    Grid<T>: TryFrom<AnyGrid, Error = GridError>,
{
    /// Reads the first grid stored in `path`.
    pub fn read(path: impl AsRef<Path>) -> Result<Self> {
        let grid = format::read_grids(path)?
            .into_iter()
            .next()
            .ok_or_else(|| GridError::FileFormat("file contains no grids".into()))?;
        Self::try_from(grid)
    }

    /// Reads the first grid called `name` stored in `path`.
    pub fn read_named(path: impl AsRef<Path>, name: &str) -> Result<Self> {
        Self::try_from(format::read_grid_named(path, name)?)
    }
}

pub(crate) fn check_finite<T: Value>(value: &T) -> Result<()> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(GridError::InvalidValue(format!(
            "non-finite value {value:?}"
        )))
    }
}

/// A grid of either value kind, as found in a grid file.
#[derive(Debug, Clone)]
pub enum AnyGrid {
    Scalar(FloatGrid),
    Vector(VectorGrid),
}

impl AnyGrid {
    pub fn name(&self) -> &str {
        match self {
            AnyGrid::Scalar(grid) => grid.name(),
            AnyGrid::Vector(grid) => grid.name(),
        }
    }

    pub fn value_kind(&self) -> ValueKind {
        match self {
            AnyGrid::Scalar(_) => ValueKind::Scalar,
            AnyGrid::Vector(_) => ValueKind::Vector,
        }
    }

    pub fn transform(&self) -> &Transform {
        match self {
            AnyGrid::Scalar(grid) => grid.transform(),
            AnyGrid::Vector(grid) => grid.transform(),
        }
    }

    pub fn bounding_box(&self) -> BoundingBox {
        match self {
            AnyGrid::Scalar(grid) => grid.bounding_box(),
            AnyGrid::Vector(grid) => grid.bounding_box(),
        }
    }

    pub fn active_voxel_count(&self) -> usize {
        match self {
            AnyGrid::Scalar(grid) => grid.active_voxel_count(),
            AnyGrid::Vector(grid) => grid.active_voxel_count(),
        }
    }

    pub fn as_scalar(&self) -> Result<&FloatGrid> {
        match self {
            AnyGrid::Scalar(grid) => Ok(grid),
            AnyGrid::Vector(_) => Err(self.mismatch(ValueKind::Scalar)),
        }
    }

    pub fn as_vector(&self) -> Result<&VectorGrid> {
        match self {
            AnyGrid::Vector(grid) => Ok(grid),
            AnyGrid::Scalar(_) => Err(self.mismatch(ValueKind::Vector)),
        }
    }

    pub fn get_scalar(&self, coord: Coord) -> Result<f32> {
        Ok(self.as_scalar()?.get_value(coord))
    }

    pub fn get_vector(&self, coord: Coord) -> Result<Vec3> {
        Ok(self.as_vector()?.get_value(coord))
    }

    pub fn set_scalar(&mut self, coord: Coord, value: f32) -> Result<()> {
        match self {
            AnyGrid::Scalar(grid) => grid.set_value(coord, value),
            AnyGrid::Vector(_) => Err(self.mismatch(ValueKind::Scalar)),
        }
    }

    pub fn set_vector(&mut self, coord: Coord, value: Vec3) -> Result<()> {
        match self {
            AnyGrid::Vector(grid) => grid.set_value(coord, value),
            AnyGrid::Scalar(_) => Err(self.mismatch(ValueKind::Vector)),
        }
    }

    fn mismatch(&self, expected: ValueKind) -> GridError {
        GridError::ValueKindMismatch {
            expected,
            found: self.value_kind(),
        }
    }
}

impl From<FloatGrid> for AnyGrid {
    fn from(grid: FloatGrid) -> Self {
        AnyGrid::Scalar(grid)
    }
}

impl From<VectorGrid> for AnyGrid {
    fn from(grid: VectorGrid) -> Self {
        AnyGrid::Vector(grid)
    }
}

impl TryFrom<AnyGrid> for FloatGrid {
    type Error = GridError;

    fn try_from(grid: AnyGrid) -> Result<Self> {
        match grid {
            AnyGrid::Scalar(grid) => Ok(grid),
            other => Err(other.mismatch(ValueKind::Scalar)),
        }
    }
}

impl TryFrom<AnyGrid> for VectorGrid {
    type Error = GridError;

    fn try_from(grid: AnyGrid) -> Result<Self> {
        match grid {
            AnyGrid::Vector(grid) => Ok(grid),
            other => Err(other.mismatch(ValueKind::Vector)),
        }
    }
}
