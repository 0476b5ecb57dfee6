//! Voxel data for 3D and 4D images, and the list of loaded overlays.

use ndarray::{Array3, Array4, ArrayD, ArrayView3, Axis, Ix3, Ix4};
use nifti::{IntoNdArray, NiftiObject, ReaderOptions};
use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;
use tracing::debug;

use crate::common::Region;
use crate::error::{EditError, Result};
use crate::geometry::ImageGeometry;

/// Read access to an image, as needed by the selection code.
pub trait ImageSource {
    fn geometry(&self) -> &ImageGeometry;

    /// The volume currently in view (always 0 for a 3D image).
    fn active_volume(&self) -> usize;

    /// A 3D view of one volume.
    fn volume(&self, index: usize) -> Result<ArrayView3<'_, f64>>;

    fn active_volume_view(&self) -> Result<ArrayView3<'_, f64>> {
        self.volume(self.active_volume())
    }
}

/// Write access to image data.
pub trait EditableImage: ImageSource {
    /// Writes `values` into the image at `offset`. `volume` selects the
    /// volume of a 4D image and must be `None` (or `Some(0)`) for a 3D image.
    fn apply_change(
        &mut self,
        offset: [usize; 3],
        values: ArrayView3<'_, f64>,
        volume: Option<usize>,
    ) -> Result<()>;
}

/// An image overlay: voxel data, geometry and display state.
#[derive(Debug, Clone)]
pub struct Image {
    name: String,
    data: Array4<f64>,
    geometry: ImageGeometry,
    active_volume: usize,
}

/// Images are shared between the overlay list and any editor working on them.
pub type SharedImage = Rc<RefCell<Image>>;

impl Image {
    /// Creates an image from 3D or 4D data. A 3D array is stored with a
    /// trailing volume axis of length one.
    pub fn new(name: impl Into<String>, data: ArrayD<f64>, geometry: ImageGeometry) -> Result<Self> {
        let mut data = data;
        // nifti volumes may carry trailing singleton dimensions
        while data.ndim() > 4 && data.shape()[data.ndim() - 1] == 1 {
            let last = data.ndim() - 1;
            data = data.index_axis_move(Axis(last), 0);
        }
        let data: Array4<f64> = match data.ndim() {
            3 => data.into_dimensionality::<Ix3>()?.insert_axis(Axis(3)),
            4 => data.into_dimensionality::<Ix4>()?,
            n => return Err(EditError::UnsupportedDimensionality(n)),
        };
        let spatial = geometry.spatial_shape();
        let expected = vec![spatial[0], spatial[1], spatial[2], geometry.volumes()];
        if data.shape() != expected.as_slice() {
            return Err(EditError::ShapeMismatch {
                expected,
                actual: data.shape().to_vec(),
            });
        }
        Ok(Self {
            name: name.into(),
            data,
            geometry,
            active_volume: 0,
        })
    }

    /// Creates a 3D image.
    pub fn from_array3(name: impl Into<String>, data: Array3<f64>, geometry: ImageGeometry) -> Result<Self> {
        Self::new(name, data.into_dyn(), geometry)
    }

    /// Loads a nifti file. The image is named after the file stem.
    pub fn from_nifti<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let obj = ReaderOptions::new().read_file(path)?;
        let geometry = ImageGeometry::from_nifti_header(obj.header())?;
        let volume = obj.into_volume();
        let data = volume.into_ndarray::<f64>()?;
        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .map(|s| s.trim_end_matches(".nii"))
            .unwrap_or("image");
        debug!("Loaded {} with shape {:?}", path.display(), geometry.shape());
        Self::new(name, data, geometry)
    }

    /// Wraps the image for sharing with an overlay list and editor.
    pub fn into_shared(self) -> SharedImage {
        Rc::new(RefCell::new(self))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ndim(&self) -> usize {
        self.geometry.ndim()
    }

    pub fn shape(&self) -> &[usize] {
        self.geometry.shape()
    }

    pub fn is_4d(&self) -> bool {
        self.geometry.is_4d()
    }

    /// Changes the volume in view.
    pub fn set_active_volume(&mut self, index: usize) -> Result<()> {
        let count = self.geometry.volumes();
        if index >= count {
            return Err(EditError::VolumeOutOfRange { index, count });
        }
        self.active_volume = index;
        Ok(())
    }

    /// All voxel values, with 3D images having a volume axis of length one.
    pub fn data(&self) -> &Array4<f64> {
        &self.data
    }

    /// Copies a block of values from one volume.
    pub fn block(&self, region: &Region, volume: usize) -> Result<Array3<f64>> {
        let view = self.volume(volume)?;
        if !region.fits_in(self.geometry.spatial_shape()) {
            return Err(EditError::ShapeMismatch {
                expected: self.geometry.spatial_shape().to_vec(),
                actual: region.hi.to_vec(),
            });
        }
        Ok(view.slice(region.slice_info()).to_owned())
    }

    fn resolve_volume(&self, volume: Option<usize>) -> Result<usize> {
        let count = self.geometry.volumes();
        match (self.is_4d(), volume) {
            (false, None) => Ok(0),
            (_, Some(index)) if index < count => Ok(index),
            (_, Some(index)) => Err(EditError::VolumeOutOfRange { index, count }),
            (true, None) => Err(EditError::Unsupported(
                "changing a 4D image requires a volume index".to_string(),
            )),
        }
    }
}

impl ImageSource for Image {
    fn geometry(&self) -> &ImageGeometry {
        &self.geometry
    }

    fn active_volume(&self) -> usize {
        self.active_volume
    }

    fn volume(&self, index: usize) -> Result<ArrayView3<'_, f64>> {
        let count = self.geometry.volumes();
        if index >= count {
            return Err(EditError::VolumeOutOfRange { index, count });
        }
        Ok(self.data.index_axis(Axis(3), index))
    }
}

impl EditableImage for Image {
    fn apply_change(
        &mut self,
        offset: [usize; 3],
        values: ArrayView3<'_, f64>,
        volume: Option<usize>,
    ) -> Result<()> {
        let index = self.resolve_volume(volume)?;
        let shape = values.dim();
        let region = Region::from_offset(offset, [shape.0, shape.1, shape.2]);
        let bounds = self.geometry.spatial_shape();
        if !region.fits_in(bounds) {
            return Err(EditError::BlockOutOfBounds {
                shape: region.shape(),
                offset,
                bounds,
            });
        }
        debug!(
            "Changing data of {} - offset {:?}, volume {}, size {:?}",
            self.name, offset, index, region.shape()
        );
        self.data
            .index_axis_mut(Axis(3), index)
            .slice_mut(region.slice_info())
            .assign(&values);
        Ok(())
    }
}

/// Ordered collection of loaded images.
#[derive(Debug, Default)]
pub struct OverlayList {
    overlays: Vec<SharedImage>,
}

impl OverlayList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.overlays.len()
    }

    pub fn is_empty(&self) -> bool {
        self.overlays.is_empty()
    }

    pub fn push(&mut self, image: SharedImage) {
        self.overlays.push(image);
    }

    /// Inserts at `index`, clamped to the end of the list.
    pub fn insert(&mut self, index: usize, image: SharedImage) {
        let index = index.min(self.overlays.len());
        self.overlays.insert(index, image);
    }

    pub fn remove(&mut self, index: usize) -> Option<SharedImage> {
        if index < self.overlays.len() {
            Some(self.overlays.remove(index))
        } else {
            None
        }
    }

    pub fn get(&self, index: usize) -> Option<&SharedImage> {
        self.overlays.get(index)
    }

    /// Position of `image` in the list, compared by identity.
    pub fn index_of(&self, image: &SharedImage) -> Option<usize> {
        self.overlays.iter().position(|o| Rc::ptr_eq(o, image))
    }

    pub fn iter(&self) -> impl Iterator<Item = &SharedImage> {
        self.overlays.iter()
    }
}
