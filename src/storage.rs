//! Sparse voxel storage.
//!
//! Active voxels live in dense 8x8x8 leaves with a 512-bit activity mask.
//! Leaves are keyed by their origin (the voxel coordinate with the low three
//! bits cleared) in a hash map, so memory and iteration cost follow the
//! number of populated leaves rather than the bounding box volume.

use std::collections::HashMap;

use rayon::prelude::*;

use crate::coord::{BoundingBox, Coord};
use crate::value::Value;

pub const LEAF_LOG2: i32 = 3;
pub const LEAF_DIM: i32 = 1 << LEAF_LOG2;
pub const LEAF_VOLUME: usize = (LEAF_DIM * LEAF_DIM * LEAF_DIM) as usize;
const LOCAL_MASK: i32 = LEAF_DIM - 1;
const MASK_WORDS: usize = LEAF_VOLUME / 64;

#[inline]
pub fn leaf_origin(coord: Coord) -> Coord {
    Coord::new(
        coord.x & !LOCAL_MASK,
        coord.y & !LOCAL_MASK,
        coord.z & !LOCAL_MASK,
    )
}

#[inline]
pub fn local_index(coord: Coord) -> usize {
    ((coord.x & LOCAL_MASK)
        | ((coord.y & LOCAL_MASK) << LEAF_LOG2)
        | ((coord.z & LOCAL_MASK) << (2 * LEAF_LOG2))) as usize
}

#[inline]
pub fn local_offset(index: usize) -> Coord {
    let index = index as i32;
    Coord::new(
        index & LOCAL_MASK,
        (index >> LEAF_LOG2) & LOCAL_MASK,
        (index >> (2 * LEAF_LOG2)) & LOCAL_MASK,
    )
}

/// Dense 8³ block of values with an activity mask.
#[derive(Debug, Clone)]
pub struct Leaf<T: Value> {
    values: Box<[T]>,
    mask: [u64; MASK_WORDS],
    count: usize,
}

impl<T: Value> Leaf<T> {
    pub fn new(fill: T) -> Self {
        Self {
            values: vec![fill; LEAF_VOLUME].into_boxed_slice(),
            mask: [0; MASK_WORDS],
            count: 0,
        }
    }

    #[inline]
    pub fn is_active(&self, index: usize) -> bool {
        self.mask[index / 64] & (1 << (index % 64)) != 0
    }

    #[inline]
    pub fn get(&self, index: usize) -> Option<T> {
        self.is_active(index).then(|| self.values[index])
    }

    #[inline]
    pub fn value(&self, index: usize) -> T {
        self.values[index]
    }

    pub fn set(&mut self, index: usize, value: T) {
        self.values[index] = value;
        self.activate(index);
    }

    pub fn activate(&mut self, index: usize) {
        if !self.is_active(index) {
            self.mask[index / 64] |= 1 << (index % 64);
            self.count += 1;
        }
    }

    /// Marks the slot inactive and resets it to `fill`.
    pub fn deactivate(&mut self, index: usize, fill: T) -> Option<T> {
        if !self.is_active(index) {
            return None;
        }
        self.mask[index / 64] &= !(1 << (index % 64));
        self.count -= 1;
        Some(std::mem::replace(&mut self.values[index], fill))
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn mask(&self) -> &[u64; MASK_WORDS] {
        &self.mask
    }

    /// Active slots in ascending index order.
    pub fn iter_active(&self) -> impl Iterator<Item = (usize, T)> + '_ {
        self.mask.iter().enumerate().flat_map(move |(word_idx, &word)| {
            let mut bits = word;
            std::iter::from_fn(move || {
                if bits == 0 {
                    return None;
                }
                let bit = bits.trailing_zeros() as usize;
                bits &= bits - 1;
                let index = word_idx * 64 + bit;
                Some((index, self.values[index]))
            })
        })
    }

    /// Rebuilds a leaf from a mask and the active values in mask order.
    pub fn from_mask(mask: [u64; MASK_WORDS], active: &[T], fill: T) -> Option<Self> {
        let count: usize = mask.iter().map(|w| w.count_ones() as usize).sum();
        if count != active.len() {
            return None;
        }
        let mut leaf = Leaf::new(fill);
        leaf.mask = mask;
        leaf.count = count;
        let indices: Vec<usize> = leaf.iter_active().map(|(index, _)| index).collect();
        for (index, value) in indices.into_iter().zip(active) {
            leaf.values[index] = *value;
        }
        Some(leaf)
    }

    fn bounding_box(&self, origin: Coord) -> BoundingBox {
        let mut bbox = BoundingBox::empty();
        for (index, _) in self.iter_active() {
            bbox.expand(origin + local_offset(index));
        }
        bbox
    }
}

/// Hash map of leaves keyed by leaf origin.
#[derive(Debug, Clone)]
pub struct SparseStore<T: Value> {
    leaves: HashMap<Coord, Leaf<T>>,
    fill: T,
    count: usize,
}

impl<T: Value> SparseStore<T> {
    pub fn new(fill: T) -> Self {
        Self {
            leaves: HashMap::new(),
            fill,
            count: 0,
        }
    }

    #[inline]
    pub fn get(&self, coord: Coord) -> Option<T> {
        self.leaves
            .get(&leaf_origin(coord))
            .and_then(|leaf| leaf.get(local_index(coord)))
    }

    pub fn is_active(&self, coord: Coord) -> bool {
        self.get(coord).is_some()
    }

    pub fn insert(&mut self, coord: Coord, value: T) {
        let fill = self.fill;
        let leaf = self
            .leaves
            .entry(leaf_origin(coord))
            .or_insert_with(|| Leaf::new(fill));
        let before = leaf.count();
        leaf.set(local_index(coord), value);
        self.count += leaf.count() - before;
    }

    /// Marks a voxel active without changing its stored value.
    pub fn activate(&mut self, coord: Coord) {
        let fill = self.fill;
        let leaf = self
            .leaves
            .entry(leaf_origin(coord))
            .or_insert_with(|| Leaf::new(fill));
        let before = leaf.count();
        leaf.activate(local_index(coord));
        self.count += leaf.count() - before;
    }

    pub fn remove(&mut self, coord: Coord) -> Option<T> {
        let origin = leaf_origin(coord);
        let leaf = self.leaves.get_mut(&origin)?;
        let removed = leaf.deactivate(local_index(coord), self.fill);
        if removed.is_some() {
            self.count -= 1;
        }
        if leaf.is_empty() {
            self.leaves.remove(&origin);
        }
        removed
    }

    /// Keeps only the active voxels for which `keep` returns true.
    pub fn retain(&mut self, mut keep: impl FnMut(Coord, T) -> bool) {
        let fill = self.fill;
        let mut removed = 0;
        self.leaves.retain(|origin, leaf| {
            let doomed: Vec<usize> = leaf
                .iter_active()
                .filter(|&(index, value)| !keep(*origin + local_offset(index), value))
                .map(|(index, _)| index)
                .collect();
            removed += doomed.len();
            for index in doomed {
                leaf.deactivate(index, fill);
            }
            !leaf.is_empty()
        });
        self.count -= removed;
    }

    pub fn clear(&mut self) {
        self.leaves.clear();
        self.count = 0;
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn leaf_count(&self) -> usize {
        self.leaves.len()
    }

    pub fn fill(&self) -> T {
        self.fill
    }

    /// Leaf origins sorted by (z, y, x), the storage iteration order.
    pub fn sorted_origins(&self) -> Vec<Coord> {
        let mut origins: Vec<Coord> = self.leaves.keys().copied().collect();
        origins.sort_unstable_by_key(|c| (c.z, c.y, c.x));
        origins
    }

    pub fn leaf(&self, origin: Coord) -> Option<&Leaf<T>> {
        self.leaves.get(&origin)
    }

    /// Inserts a whole leaf, replacing any leaf with the same origin.
    pub fn insert_leaf(&mut self, origin: Coord, leaf: Leaf<T>) {
        if leaf.is_empty() {
            return;
        }
        self.count += leaf.count();
        if let Some(old) = self.leaves.insert(leaf_origin(origin), leaf) {
            self.count -= old.count();
        }
    }

    /// Active voxels in deterministic order.
    pub fn iter(&self) -> impl Iterator<Item = (Coord, T)> + '_ {
        self.sorted_origins().into_iter().flat_map(move |origin| {
            self.leaves[&origin]
                .iter_active()
                .map(move |(index, value)| (origin + local_offset(index), value))
        })
    }

    /// Active coordinates collected in deterministic order.
    pub fn coords(&self) -> Vec<Coord> {
        self.iter().map(|(coord, _)| coord).collect()
    }

    pub fn bounding_box(&self) -> BoundingBox {
        self.leaves
            .par_iter()
            .map(|(origin, leaf)| leaf.bounding_box(*origin))
            .reduce(BoundingBox::empty, |a, b| a.union(&b))
    }
}
