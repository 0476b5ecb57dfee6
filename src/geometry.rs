//! Image geometry: shape, voxel dimensions and the voxel-to-world affine.

use nalgebra::Matrix4;
use nifti::NiftiHeader;

use crate::error::{EditError, Result};

/// Read-only geometry of a 3D or 4D image.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageGeometry {
    shape: Vec<usize>,
    pixdim: [f64; 3],
    voxel_to_world: Matrix4<f64>,
    world_to_voxel: Matrix4<f64>,
}

impl ImageGeometry {
    /// Validates and builds a geometry.
    ///
    /// `shape` must hold 3 or 4 positive extents, `pixdim` three positive
    /// finite spacings, and `voxel_to_world` must be invertible.
    pub fn new(shape: &[usize], pixdim: [f64; 3], voxel_to_world: Matrix4<f64>) -> Result<Self> {
        if shape.len() != 3 && shape.len() != 4 {
            return Err(EditError::UnsupportedDimensionality(shape.len()));
        }
        if shape.iter().any(|&s| s == 0) {
            return Err(EditError::InvalidGeometry(format!(
                "shape {:?} has a zero extent",
                shape
            )));
        }
        if pixdim.iter().any(|&p| !p.is_finite() || p <= 0.0) {
            return Err(EditError::InvalidGeometry(format!(
                "pixdim {:?} must be positive",
                pixdim
            )));
        }
        let world_to_voxel = voxel_to_world.try_inverse().ok_or_else(|| {
            EditError::InvalidGeometry("voxel to world affine is not invertible".to_string())
        })?;
        Ok(Self {
            shape: shape.to_vec(),
            pixdim,
            voxel_to_world,
            world_to_voxel,
        })
    }

    /// Geometry of a 3D image with unit voxels and an identity affine.
    pub fn identity(shape: [usize; 3]) -> Result<Self> {
        Self::new(&shape, [1.0, 1.0, 1.0], Matrix4::identity())
    }

    /// Reads shape, pixdim and affine from a nifti header.
    pub fn from_nifti_header(header: &NiftiHeader) -> Result<Self> {
        let ndim = header.dim[0] as usize;
        if !(1..=7).contains(&ndim) {
            return Err(EditError::InvalidGeometry(format!(
                "header dim[0] = {} is not a valid dimensionality",
                ndim
            )));
        }
        let mut shape: Vec<usize> = header.dim[1..=ndim].iter().map(|&d| d as usize).collect();
        // trailing singleton volumes are still 3D images
        while shape.len() > 3 && shape[shape.len() - 1] == 1 {
            shape.pop();
        }
        let pixdim = [
            header.pixdim[1] as f64,
            header.pixdim[2] as f64,
            header.pixdim[3] as f64,
        ];
        let affine = header.affine::<f64>();
        Self::new(&shape, pixdim, affine)
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    pub fn is_4d(&self) -> bool {
        self.shape.len() == 4
    }

    /// The first three extents.
    pub fn spatial_shape(&self) -> [usize; 3] {
        [self.shape[0], self.shape[1], self.shape[2]]
    }

    /// Number of 3D volumes (1 for a 3D image).
    pub fn volumes(&self) -> usize {
        if self.is_4d() {
            self.shape[3]
        } else {
            1
        }
    }

    pub fn pixdim(&self) -> [f64; 3] {
        self.pixdim
    }

    pub fn voxel_to_world(&self) -> &Matrix4<f64> {
        &self.voxel_to_world
    }

    pub fn world_to_voxel(&self) -> &Matrix4<f64> {
        &self.world_to_voxel
    }

    /// The same geometry restricted to its first three dimensions.
    pub fn spatial(&self) -> ImageGeometry {
        Self {
            shape: self.shape[..3].to_vec(),
            ..self.clone()
        }
    }
}
