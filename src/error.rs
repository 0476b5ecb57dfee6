//! Error types shared by the coordinate, selection and editing modules.

use thiserror::Error;

/// Main error type for editnii operations.
#[derive(Error, Debug)]
pub enum EditError {
    /// Shape, pixdim or affine values that cannot describe an image.
    #[error("Invalid geometry: {0}")]
    InvalidGeometry(String),

    /// Only 3D and 4D images are supported.
    #[error("Only 3D and 4D images are supported (got {0} dimensions)")]
    UnsupportedDimensionality(usize),

    /// A coordinate space name that does not resolve to a known space.
    #[error("Unknown coordinate space: {0}")]
    UnknownSpace(String),

    /// A custom transform which has no inverse.
    #[error("Custom transform is not invertible: {0}")]
    NonInvertibleTransform(String),

    /// A block write which does not fit inside the selection mask.
    #[error("Block {shape:?} at offset {offset:?} does not fit in selection of shape {bounds:?}")]
    BlockOutOfBounds {
        shape: [usize; 3],
        offset: [usize; 3],
        bounds: [usize; 3],
    },

    /// Voxel coordinates outside of the image.
    #[error("Voxel {voxel:?} is outside of image shape {shape:?}")]
    VoxelOutOfBounds { voxel: [usize; 3], shape: [usize; 3] },

    /// A bucket fill seed outside of the requested restriction.
    #[error("Seed location {seed:?} is outside of restriction ({lo:?}, {hi:?})")]
    SeedOutsideRestriction {
        seed: [usize; 3],
        lo: [usize; 3],
        hi: [usize; 3],
    },

    /// A volume index past the end of a 4D image.
    #[error("Volume {index} is out of range ({count} volumes)")]
    VolumeOutOfRange { index: usize, count: usize },

    /// Shape mismatch between two arrays that must line up.
    #[error("Shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    /// The edited image is no longer part of its overlay list.
    #[error("Image {0} is not in the overlay list")]
    ImageNotFound(String),

    /// An operation the editor deliberately does not provide.
    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    /// No listener registered under the given handle.
    #[error("No listener found with identifier {0}")]
    ListenerNotFound(usize),

    #[error(transparent)]
    Nifti(#[from] nifti::NiftiError),

    #[error(transparent)]
    Shape(#[from] ndarray::ShapeError),
}

/// Result type for editnii operations.
pub type Result<T> = std::result::Result<T, EditError>;
