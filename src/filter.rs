//! Neighbourhood filters and morphology.
//!
//! Filters only rewrite active voxels. Samples that fall outside the active
//! region read as background, so values near the edge of the active region
//! are pulled towards the background. Dilating first moves that edge outward.

use rayon::prelude::*;

use crate::coord::Coord;
use crate::enums::{FilterType, Neighbourhood};
use crate::error::{GridError, Result};
use crate::grid::Grid;
use crate::value::Value;

const AXES: [Coord; 3] = [Coord::X, Coord::Y, Coord::Z];

/// Normalized 1D Gaussian kernel with `2 * radius + 1` taps.
pub fn gaussian_kernel(sigma: f32, radius: u32) -> Vec<f32> {
    let radius = radius as i32;
    let denom = 2.0 * sigma * sigma;
    let mut kernel: Vec<f32> = (-radius..=radius)
        .map(|k| (-((k * k) as f32) / denom).exp())
        .collect();
    let sum: f32 = kernel.iter().sum();
    kernel.iter_mut().for_each(|w| *w /= sum);
    kernel
}

fn box_kernel(radius: u32) -> Vec<f32> {
    let taps = 2 * radius as usize + 1;
    vec![1.0 / taps as f32; taps]
}

impl<T: Value> Grid<T> {
    /// Separable Gaussian blur of the active voxels.
    pub fn filter(&mut self, sigma: f32, kernel_radius: u32) -> Result<()> {
        if !sigma.is_finite() || sigma <= 0.0 {
            return Err(GridError::InvalidValue(format!(
                "filter sigma must be positive, got {sigma}"
            )));
        }
        if kernel_radius == 0 || self.is_empty() {
            return Ok(());
        }
        let kernel = gaussian_kernel(sigma, kernel_radius);
        self.convolve_separable(&kernel);
        Ok(())
    }

    /// Applies a filter of radius `width` voxels `iterations` times.
    pub fn filter_with(&mut self, filter_type: FilterType, width: u32, iterations: u32) -> Result<()> {
        if width == 0 || self.is_empty() {
            return Ok(());
        }
        for _ in 0..iterations {
            match filter_type {
                FilterType::Gaussian => {
                    let sigma = (width as f32 / 2.0).max(0.5);
                    self.filter(sigma, width)?;
                }
                FilterType::Mean => self.convolve_separable(&box_kernel(width)),
                FilterType::Median => self.median(width),
            }
        }
        Ok(())
    }

    fn convolve_separable(&mut self, kernel: &[f32]) {
        let coords = self.store().coords();
        log::debug!(
            "Convolving {} active voxels with a {}-tap kernel",
            coords.len(),
            kernel.len()
        );
        for axis in AXES {
            let updates = self.convolve_axis(&coords, kernel, axis);
            self.apply_updates(updates);
        }
    }

    fn convolve_axis(&self, coords: &[Coord], kernel: &[f32], axis: Coord) -> Vec<(Coord, T)> {
        let radius = (kernel.len() / 2) as i32;
        coords
            .par_iter()
            .map(|&coord| {
                let value = kernel
                    .iter()
                    .enumerate()
                    .fold(T::zero(), |acc, (tap, &weight)| {
                        let offset = axis * (tap as i32 - radius);
                        acc + self.get_offset_value(coord, offset) * weight
                    });
                (coord, value)
            })
            .collect()
    }

    fn median(&mut self, width: u32) {
        let radius = width as i32;
        let coords = self.store().coords();
        log::debug!("Median filtering {} active voxels", coords.len());
        let updates: Vec<(Coord, T)> = coords
            .par_iter()
            .map(|&coord| {
                let mut window = Vec::with_capacity((2 * width as usize + 1).pow(3));
                for z in -radius..=radius {
                    for y in -radius..=radius {
                        for x in -radius..=radius {
                            window.push(self.get_offset_value(coord, Coord::new(x, y, z)));
                        }
                    }
                }
                (coord, T::median(&mut window))
            })
            .collect();
        self.apply_updates(updates);
    }

    /// Grows the active region by `radius` voxels with the 3x3x3 cube, so
    /// the region becomes its Chebyshev-distance dilation.
    pub fn dilate(&mut self, radius: u32) {
        self.dilate_with(radius, Neighbourhood::default());
    }

    /// Each new voxel copies the value of the first active neighbour that
    /// reached it, in storage order. Neighbours outside the key space are
    /// skipped.
    pub fn dilate_with(&mut self, iterations: u32, neighbourhood: Neighbourhood) {
        let offsets = neighbourhood.offsets();
        for _ in 0..iterations {
            let active: Vec<(Coord, T)> = self.store().iter().collect();
            let grid: &Grid<T> = self;
            let offsets = &offsets;
            let mut frontier: Vec<(Coord, T)> = active
                .par_iter()
                .flat_map_iter(move |&(coord, value)| {
                    offsets
                        .iter()
                        .filter_map(move |&offset| coord.checked_add(offset))
                        .map(move |neighbour| (neighbour, value))
                        .filter(move |&(neighbour, _)| !grid.is_active(neighbour))
                })
                .collect();
            frontier.sort_by_key(|(c, _)| (c.z, c.y, c.x));
            frontier.dedup_by_key(|(c, _)| *c);
            if frontier.is_empty() {
                break;
            }
            log::debug!("Dilation activated {} voxels", frontier.len());
            self.apply_updates(frontier);
        }
    }

    /// Shrinks the active region by `iterations` voxels with the 3x3x3 cube.
    pub fn erode(&mut self, iterations: u32) {
        self.erode_with(iterations, Neighbourhood::default());
    }

    /// Removes every active voxel with an inactive neighbour. Neighbours
    /// outside the key space count as inactive.
    pub fn erode_with(&mut self, iterations: u32, neighbourhood: Neighbourhood) {
        let offsets = neighbourhood.offsets();
        for _ in 0..iterations {
            let coords = self.store().coords();
            let boundary: Vec<Coord> = coords
                .par_iter()
                .copied()
                .filter(|&coord| {
                    offsets.iter().any(|&offset| {
                        coord
                            .checked_add(offset)
                            .is_none_or(|neighbour| !self.is_active(neighbour))
                    })
                })
                .collect();
            if boundary.is_empty() {
                break;
            }
            let store = self.store_mut();
            for coord in boundary {
                store.remove(coord);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coord::BoundingBox;
    use crate::grid::FloatGrid;

    fn impulse_grid() -> FloatGrid {
        let mut grid = FloatGrid::new("density");
        grid.fill(&BoundingBox::new(Coord::ZERO, Coord::splat(9)), 0.0)
            .unwrap();
        grid.set_value(Coord::splat(5), 255.0).unwrap();
        grid
    }

    #[test]
    fn test_gaussian_kernel_normalized() {
        let kernel = gaussian_kernel(1.5, 3);
        assert_eq!(kernel.len(), 7);
        assert!((kernel.iter().sum::<f32>() - 1.0).abs() < 1e-6);
        assert_eq!(kernel[0], kernel[6]);
        assert!(kernel[3] > kernel[2]);
    }

    #[test]
    fn test_filter_spreads_and_tapers() {
        let mut grid = impulse_grid();
        grid.filter(1.0, 2).unwrap();
        let center = grid.get_value(Coord::splat(5));
        let near = grid.get_value(Coord::new(6, 5, 5));
        let far = grid.get_value(Coord::new(7, 5, 5));
        assert!(center > near && near > far && far > 0.0);
        assert!(center < 255.0);
        assert_eq!(grid.get_value(Coord::new(40, 40, 40)), 0.0);
        assert!(!grid.is_active(Coord::new(40, 40, 40)));
        assert_eq!(grid.active_voxel_count(), 1000);
    }

    #[test]
    fn test_filter_rejects_bad_sigma() {
        let mut grid = impulse_grid();
        assert!(grid.filter(0.0, 2).is_err());
        assert!(grid.filter(f32::NAN, 2).is_err());
    }

    #[test]
    fn test_mean_filter_conserves_interior_mass() {
        let mut grid = impulse_grid();
        grid.filter_with(FilterType::Mean, 1, 1).unwrap();
        let total: f32 = grid.active_voxels().map(|(_, v)| v).sum();
        assert!((total - 255.0).abs() < 1e-2);
        assert!((grid.get_value(Coord::splat(5)) - 255.0 / 27.0).abs() < 1e-3);
    }

    #[test]
    fn test_median_removes_impulse() {
        let mut grid = impulse_grid();
        grid.filter_with(FilterType::Median, 1, 1).unwrap();
        assert_eq!(grid.get_value(Coord::splat(5)), 0.0);
    }

    #[test]
    fn test_dilate_and_erode() {
        let mut grid = FloatGrid::new("density");
        grid.set_value(Coord::ZERO, 1.0).unwrap();
        grid.dilate(1);
        assert_eq!(grid.active_voxel_count(), 27);
        assert_eq!(grid.get_value(Coord::X), 1.0);
        assert_eq!(grid.get_value(Coord::ONE), 1.0);
        assert_eq!(grid.get_value(-Coord::ONE), 1.0);
        assert_eq!(grid.get_value(Coord::new(2, 0, 0)), 0.0);

        grid.dilate_with(1, Neighbourhood::Faces);
        assert_eq!(grid.active_voxel_count(), 27 + 6 * 9);
        assert_eq!(
            grid.bounding_box(),
            BoundingBox::new(Coord::splat(-2), Coord::splat(2))
        );
        assert!(!grid.is_active(Coord::new(2, 2, 0)));

        // Only the centre and its face neighbours have a full 3x3x3 cube.
        grid.erode(1);
        assert_eq!(grid.active_voxel_count(), 7);
        assert!(grid.is_active(Coord::X));
        assert!(!grid.is_active(Coord::new(1, 1, 0)));
        grid.erode(1);
        assert!(grid.is_empty());
    }

    #[test]
    fn test_face_erosion_keeps_cross_section() {
        let mut grid = FloatGrid::new("density");
        grid.set_value(Coord::ZERO, 1.0).unwrap();
        grid.dilate_with(2, Neighbourhood::Faces);
        assert_eq!(grid.active_voxel_count(), 25);
        grid.erode_with(1, Neighbourhood::Faces);
        assert_eq!(grid.active_voxel_count(), 7);
        assert!(grid.is_active(-Coord::Z));
    }

    #[test]
    fn test_morphology_at_key_space_edge() {
        let mut grid = FloatGrid::new("density");
        grid.set_value(Coord::splat(i32::MAX), 2.0).unwrap();
        grid.dilate(1);
        assert_eq!(grid.active_voxel_count(), 8);
        assert_eq!(grid.get_value(Coord::splat(i32::MAX - 1)), 2.0);

        grid.filter(1.0, 2).unwrap();
        grid.filter_with(FilterType::Median, 1, 1).unwrap();
        assert_eq!(grid.active_voxel_count(), 8);

        grid.erode(1);
        assert!(grid.is_empty());
    }

    #[test]
    fn test_erode_box() {
        let mut grid = FloatGrid::new("density");
        grid.fill(&BoundingBox::new(Coord::ZERO, Coord::splat(4)), 1.0)
            .unwrap();
        grid.erode(1);
        assert_eq!(grid.active_voxel_count(), 27);
        assert_eq!(
            grid.bounding_box(),
            BoundingBox::new(Coord::ONE, Coord::splat(3))
        );
    }
}
