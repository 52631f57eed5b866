use std::fs::{self, File};
use std::io::BufReader;
use std::path::Path;

use image::{ImageBuffer, Luma};
use ndarray::{Array2, s};
use rayon::prelude::*;
use tiff::decoder::{Decoder, DecodingResult};

use crate::config::ImportOptions;
use crate::coord::Coord;
use crate::error::{GridError, Result};
use crate::grid::{FloatGrid, check_finite};
use crate::transform::Transform;

/// 16-bit grayscale image as produced by [`image::DynamicImage::into_luma16`].
pub type Gray16Image = ImageBuffer<Luma<u16>, Vec<u16>>;

pub struct VolumeLoader;

impl VolumeLoader {
    /// Build a scalar grid from already decoded slices
    ///
    /// Slice `z` becomes the voxel layer `z`; inside a slice `[row, col]`
    /// maps to voxel `(col, row)`. Intensities are expected to be normalized.
    ///
    /// # Errors
    ///
    /// Returns error if `slices` is empty, slice dimensions differ or the
    /// options are not usable
    pub fn from_slices(
        slices: &[Array2<f32>],
        name: impl Into<String>,
        options: &ImportOptions,
    ) -> Result<FloatGrid> {
        if slices.is_empty() {
            return Err(GridError::NoImages);
        }
        Self::validate_dimensions(slices)?;
        Self::validate_options(slices[0].dim(), options)?;

        let transform = Transform::uniform_scale(options.voxel_size)?;
        let crop = options.crop as usize;
        let voxels: Vec<(Coord, f32)> = slices
            .par_iter()
            .enumerate()
            .flat_map_iter(|(z, slice)| {
                let (height, width) = slice.dim();
                slice
                    .slice(s![crop..height - crop, crop..width - crop])
                    .indexed_iter()
                    .filter(|(_, intensity)| **intensity >= options.threshold)
                    .map(move |((row, col), intensity)| {
                        (
                            Coord::new(col as i32, row as i32, z as i32),
                            intensity * options.scale,
                        )
                    })
                    .collect::<Vec<_>>()
            })
            .collect();
        voxels
            .iter()
            .try_for_each(|(_, value)| check_finite(value))?;

        let mut grid = FloatGrid::new(name);
        grid.set_transform(transform);
        grid.apply_updates(voxels);

        log::info!(
            "Imported {} slices into '{}': {} active voxels",
            slices.len(),
            grid.name(),
            grid.active_voxel_count()
        );
        Ok(grid)
    }

    /// Build a grid from in-memory 16-bit images, one per slice
    pub fn from_images(
        images: &[Gray16Image],
        name: impl Into<String>,
        options: &ImportOptions,
    ) -> Result<FloatGrid> {
        let slices: Vec<Array2<f32>> = images.par_iter().map(Self::image_to_slice).collect();
        Self::from_slices(&slices, name, options)
    }

    /// Load one image file per slice, in the given order
    ///
    /// Any format the `image` crate can decode is accepted; color images are
    /// converted to luma.
    pub fn from_many_tiffs(
        paths: &[impl AsRef<Path> + Sync],
        name: impl Into<String>,
        options: &ImportOptions,
    ) -> Result<FloatGrid> {
        if paths.is_empty() {
            return Err(GridError::NoImages);
        }
        let slices = paths
            .par_iter()
            .map(|path| Ok(Self::image_to_slice(&image::open(path.as_ref())?.into_luma16())))
            .collect::<Result<Vec<_>>>()?;
        Self::from_slices(&slices, name, options)
    }

    /// Load every file with `extension` from a directory, sorted by file name
    pub fn from_directory(
        path: impl AsRef<Path>,
        extension: &str,
        name: impl Into<String>,
        options: &ImportOptions,
    ) -> Result<FloatGrid> {
        let mut paths: Vec<_> = fs::read_dir(path.as_ref())?
            .filter_map(std::result::Result::ok)
            .map(|entry| entry.path())
            .filter(|path| {
                path.extension()
                    .and_then(|s| s.to_str())
                    .is_some_and(|ext| ext.eq_ignore_ascii_case(extension))
            })
            .collect();

        if paths.is_empty() {
            return Err(GridError::NoImages);
        }
        paths.sort();

        Self::from_many_tiffs(&paths, name, options)
    }

    /// Load every page of a multi-page grayscale TIFF as consecutive slices
    pub fn from_multipage_tiff(
        path: impl AsRef<Path>,
        name: impl Into<String>,
        options: &ImportOptions,
    ) -> Result<FloatGrid> {
        let mut decoder = Decoder::new(BufReader::new(File::open(path.as_ref())?))?;
        let mut slices = Vec::new();
        loop {
            slices.push(Self::decode_page(&mut decoder)?);
            if !decoder.more_images() {
                break;
            }
            decoder.next_image()?;
        }
        log::debug!(
            "Decoded {} pages from {}",
            slices.len(),
            path.as_ref().display()
        );
        Self::from_slices(&slices, name, options)
    }

    fn decode_page(decoder: &mut Decoder<BufReader<File>>) -> Result<Array2<f32>> {
        let color = decoder.colortype()?;
        if !matches!(color, tiff::ColorType::Gray(_)) {
            return Err(GridError::FileFormat(format!(
                "expected a grayscale TIFF page, found {color:?}"
            )));
        }
        let (width, height) = decoder.dimensions()?;
        let pixels: Vec<f32> = match decoder.read_image()? {
            DecodingResult::U8(data) => data.iter().map(|&v| v as f32 / u8::MAX as f32).collect(),
            DecodingResult::U16(data) => data.iter().map(|&v| v as f32 / u16::MAX as f32).collect(),
            DecodingResult::U32(data) => data.iter().map(|&v| (v as f64 / u32::MAX as f64) as f32).collect(),
            DecodingResult::F32(data) => data,
            DecodingResult::F64(data) => data.iter().map(|&v| v as f32).collect(),
            other => {
                return Err(GridError::FileFormat(format!(
                    "unsupported TIFF sample format {}",
                    Self::sample_format_name(&other)
                )));
            }
        };
        Array2::from_shape_vec((height as usize, width as usize), pixels)
            .map_err(|err| GridError::FileFormat(format!("TIFF page size mismatch: {err}")))
    }

    fn sample_format_name(result: &DecodingResult) -> &'static str {
        match result {
            DecodingResult::I8(_) => "i8",
            DecodingResult::I16(_) => "i16",
            DecodingResult::I32(_) => "i32",
            DecodingResult::I64(_) => "i64",
            DecodingResult::U64(_) => "u64",
            _ => "unknown",
        }
    }

    fn image_to_slice(image: &Gray16Image) -> Array2<f32> {
        let (width, height) = image.dimensions();
        Array2::from_shape_fn((height as usize, width as usize), |(row, col)| {
            image.get_pixel(col as u32, row as u32)[0] as f32 / u16::MAX as f32
        })
    }

    fn validate_dimensions(slices: &[Array2<f32>]) -> Result<()> {
        let first_dim = slices[0].dim();
        match slices.iter().position(|slice| slice.dim() != first_dim) {
            Some(index) => Err(GridError::DimensionMismatch {
                expected: first_dim,
                found: slices[index].dim(),
                slice: index,
            }),
            None => Ok(()),
        }
    }

    fn validate_options((height, width): (usize, usize), options: &ImportOptions) -> Result<()> {
        let crop = options.crop as usize;
        if 2 * crop >= height || 2 * crop >= width {
            return Err(GridError::InvalidValue(format!(
                "crop of {crop} pixels leaves nothing of a {width}x{height} image"
            )));
        }
        if !options.threshold.is_finite() || !options.scale.is_finite() {
            return Err(GridError::InvalidValue(format!(
                "threshold {} and scale {} must be finite",
                options.threshold, options.scale
            )));
        }
        Ok(())
    }
}
