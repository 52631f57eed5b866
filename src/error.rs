use thiserror::Error;

use crate::enums::ValueKind;

#[derive(Debug, Error)]
pub enum GridError {
    #[error("Invalid transform: {0}")]
    InvalidTransform(String),

    #[error("Invalid value: {0}")]
    InvalidValue(String),

    #[error("Value kind mismatch: expected {expected}, found {found}")]
    ValueKindMismatch { expected: ValueKind, found: ValueKind },

    #[error("Inconsistent image dimensions: expected {expected:?}, found {found:?} in slice {slice}")]
    DimensionMismatch {
        expected: (usize, usize),
        found: (usize, usize),
        slice: usize,
    },

    #[error("No images to import")]
    NoImages,

    #[error("File format error: {0}")]
    FileFormat(String),

    #[error("Grid not found: {0}")]
    GridNotFound(String),

    #[error("Node not found in network")]
    NodeNotFound,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("TIFF error: {0}")]
    Tiff(#[from] tiff::TiffError),
}

pub type Result<T> = std::result::Result<T, GridError>;
