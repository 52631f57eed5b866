use glam::IVec3;

/// Integer voxel index. The key space is unbounded in every direction.
pub type Coord = IVec3;

/// Inclusive axis-aligned box in index space.
///
/// The empty box is represented by `min > max` on every axis, so that
/// expanding it by any coordinate yields a box around exactly that coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundingBox {
    pub min: Coord,
    pub max: Coord,
}

impl BoundingBox {
    pub const EMPTY: BoundingBox = BoundingBox {
        min: IVec3::MAX,
        max: IVec3::MIN,
    };

    pub fn new(min: Coord, max: Coord) -> Self {
        Self { min, max }
    }

    pub fn empty() -> Self {
        Self::EMPTY
    }

    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    pub fn contains(&self, coord: Coord) -> bool {
        coord.cmpge(self.min).all() && coord.cmple(self.max).all()
    }

    pub fn expand(&mut self, coord: Coord) {
        self.min = self.min.min(coord);
        self.max = self.max.max(coord);
    }

    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        BoundingBox::new(self.min.min(other.min), self.max.max(other.max))
    }

    /// Box grown by `amount` voxels on every side.
    pub fn padded(&self, amount: i32) -> BoundingBox {
        if self.is_empty() {
            return *self;
        }
        BoundingBox::new(
            self.min.saturating_sub(IVec3::splat(amount)),
            self.max.saturating_add(IVec3::splat(amount)),
        )
    }

    /// Number of voxels along each axis, (0, 0, 0) when empty.
    pub fn dim(&self) -> (usize, usize, usize) {
        if self.is_empty() {
            return (0, 0, 0);
        }
        let extent = self.max.as_i64vec3() - self.min.as_i64vec3() + 1;
        (extent.x as usize, extent.y as usize, extent.z as usize)
    }

    pub fn volume(&self) -> usize {
        let (w, h, d) = self.dim();
        w * h * d
    }
}

impl Default for BoundingBox {
    fn default() -> Self {
        Self::EMPTY
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_box() {
        let bbox = BoundingBox::empty();
        assert!(bbox.is_empty());
        assert_eq!(bbox.dim(), (0, 0, 0));
        assert!(!bbox.contains(Coord::ZERO));
    }

    #[test]
    fn test_expand_from_empty() {
        let mut bbox = BoundingBox::empty();
        bbox.expand(Coord::new(-2, 3, 5));
        assert_eq!(bbox, BoundingBox::new(Coord::new(-2, 3, 5), Coord::new(-2, 3, 5)));
        bbox.expand(Coord::new(1, 0, 5));
        assert_eq!(bbox.min, Coord::new(-2, 0, 5));
        assert_eq!(bbox.max, Coord::new(1, 3, 5));
        assert_eq!(bbox.dim(), (4, 4, 1));
        assert_eq!(bbox.volume(), 16);
    }

    #[test]
    fn test_union_with_empty() {
        let a = BoundingBox::new(Coord::ZERO, Coord::ONE);
        assert_eq!(a.union(&BoundingBox::empty()), a);
        assert_eq!(BoundingBox::empty().union(&a), a);
    }

    #[test]
    fn test_padded_clamps_at_key_space_edge() {
        let bbox = BoundingBox::new(Coord::splat(i32::MAX - 1), Coord::splat(i32::MAX));
        let padded = bbox.padded(2);
        assert_eq!(padded.min, Coord::splat(i32::MAX - 3));
        assert_eq!(padded.max, Coord::splat(i32::MAX));
    }
}
