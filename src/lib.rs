//! # Sparse-volume library
//!
//! This crate provides sparse volumetric grids for CT and image-stack
//! analysis.
//!
//! A [`Grid`] stores scalar ([`FloatGrid`]) or vector ([`VectorGrid`]) values
//! at integer voxel coordinates. Only active voxels take memory: they are kept
//! in dense 8³ leaf blocks addressed through a hash map, and every other
//! coordinate reads as the grid's background value. Each grid carries an
//! affine [`Transform`] from index space to world space.
//!
//! Grids support:
//!  - Bounding box and dense extraction into [`ndarray::Array3`]
//!  - Trilinear and nearest sampling in world space
//!  - Gaussian, mean and median filters, dilation and erosion
//!  - Gradient, Laplacian and voxel-wise arithmetic
//!  - A multi-grid container file with optional zlib compression
//!  - Import of image stacks (multi-page TIFF or one image per slice)
//!
//! If the environment supports it, per-voxel work runs in parallel using
//! rayon. Results do not depend on the number of threads.
//!
//! Grids are plain values: concurrent reads are fine, writers need `&mut`.
//!
//! # Examples
//!
//! ## Building a grid and querying it
//!
//! ```
//! # use sparse_volume::{BoundingBox, Coord, FloatGrid};
//! let mut grid = FloatGrid::new("density");
//! grid.set_value(Coord::new(0, 0, 0), 120.0).unwrap();
//! grid.set_value(Coord::new(0, 1, 1), 120.0).unwrap();
//!
//! assert_eq!(
//!     grid.bounding_box(),
//!     BoundingBox::new(Coord::new(0, 0, 0), Coord::new(0, 1, 1))
//! );
//! assert_eq!(grid.get_value(Coord::new(5, 5, 5)), 0.0);
//!
//! let dense = grid.get_dense(&grid.bounding_box());
//! assert_eq!(dense.dim(), (1, 2, 2));
//! ```
//!
//! ## Importing a TIFF stack and writing it to disk
//!
//! ```no_run
//! # use sparse_volume::{ImportOptions, VolumeLoader};
//! let options = ImportOptions::new(0.05).with_threshold(0.2);
//! let mut grid = VolumeLoader::from_multipage_tiff("scan.tif", "density", &options)
//!     .expect("should have loaded the TIFF stack");
//! grid.dilate(2);
//! grid.filter(1.0, 3).expect("sigma is positive");
//! grid.write("scan.svol", true).expect("should have written the grid");
//! ```

pub mod config;
pub mod coord;
pub mod enums;
pub mod error;
pub mod filter;
pub mod format;
pub mod grid;
mod interpolator;
pub mod network;
pub mod operators;
pub mod storage;
pub mod transform;
pub mod value;
pub mod volume_loader;

pub use config::{ImportOptions, WriteOptions};
pub use coord::{BoundingBox, Coord};
pub use enums::{CombineOp, FilterType, Interpolation, Neighbourhood, ScalarOp, ValueKind};
pub use error::{GridError, Result};
pub use format::{grid_names, load_grids, read_grid_named, read_grids, save_grids, write_grids};
pub use grid::{AnyGrid, FloatGrid, Grid, VectorGrid};
pub use network::Network;
pub use transform::Transform;
pub use value::Value;
pub use volume_loader::VolumeLoader;
