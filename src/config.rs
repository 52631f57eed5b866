//! Option structs for import and persistence.

/// Controls how image intensities become voxels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImportOptions {
    /// World units per voxel, stored as a uniform scale transform.
    pub voxel_size: f64,
    /// Normalized intensities below this are left inactive.
    pub threshold: f32,
    /// Factor applied to normalized intensities before storing.
    pub scale: f32,
    /// Pixels removed from every image border.
    pub crop: u32,
}

impl ImportOptions {
    pub fn new(voxel_size: f64) -> Self {
        Self {
            voxel_size,
            ..Self::default()
        }
    }

    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_scale(mut self, scale: f32) -> Self {
        self.scale = scale;
        self
    }

    pub fn with_crop(mut self, crop: u32) -> Self {
        self.crop = crop;
        self
    }
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            voxel_size: 1.0,
            threshold: 1.0e-3,
            scale: 1.0,
            crop: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WriteOptions {
    /// zlib-compress each grid record. Lossless.
    pub compress: bool,
    /// Store values as 16-bit floats. Lossy, off unless requested.
    pub float_as_half: bool,
}

impl WriteOptions {
    pub fn compressed() -> Self {
        Self {
            compress: true,
            ..Self::default()
        }
    }

    pub fn with_compression(mut self, compress: bool) -> Self {
        self.compress = compress;
        self
    }

    pub fn with_half_floats(mut self, float_as_half: bool) -> Self {
        self.float_as_half = float_as_half;
        self
    }
}
