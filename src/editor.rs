//! Editing session for one image.
//!
//! An [`Editor`] owns the [`Selection`] for an image and records every
//! change made to the selection or to the image values, so they can be
//! undone and redone. Changes made through [`Editor::selection_mut`] are
//! recorded automatically.

use ndarray::{Array3, Zip};
use std::cell::{Ref, RefCell};
use std::rc::Rc;
use tracing::{debug, error, warn};

use crate::common::Region;
use crate::error::{EditError, Result};
use crate::history::{Change, ChangeHistory, Replay, ValueChange};
use crate::image::{EditableImage, Image, ImageSource, OverlayList, SharedImage};
use crate::selection::Selection;
use crate::signal::ListenerId;

/// Values written by [`Editor::fill_selection`].
#[derive(Debug, Clone, PartialEq)]
pub enum FillValues {
    /// The same value in every selected voxel.
    Scalar(f64),
    /// One value per voxel of the bounded selection (see
    /// [`Selection::get_bounded_selection`]).
    Block(Array3<f64>),
}

impl From<f64> for FillValues {
    fn from(v: f64) -> Self {
        FillValues::Scalar(v)
    }
}

impl From<Array3<f64>> for FillValues {
    fn from(block: Array3<f64>) -> Self {
        FillValues::Block(block)
    }
}

#[derive(Debug)]
pub struct Editor {
    image: SharedImage,
    selection: Selection,
    history: Rc<RefCell<ChangeHistory>>,
    listener: ListenerId,
}

impl Editor {
    /// Starts editing `image` with an empty selection.
    pub fn new(image: SharedImage) -> Result<Self> {
        let mut selection = Selection::for_image(&*image.borrow())?;
        let history = Rc::new(RefCell::new(ChangeHistory::new()));

        let recorder = Rc::clone(&history);
        let listener = selection.connect(move |change| {
            recorder
                .borrow_mut()
                .record(Change::Selection(change.clone()));
        });

        Ok(Self {
            image,
            selection,
            history,
            listener,
        })
    }

    /// Stops recording selection changes and hands back the selection.
    pub fn destroy(mut self) -> Selection {
        if let Err(e) = self.selection.disconnect(self.listener) {
            warn!("Editor for {} was already disconnected: {}", self.image.borrow().name(), e);
        }
        self.selection
    }

    pub fn image(&self) -> &SharedImage {
        &self.image
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn selection_mut(&mut self) -> &mut Selection {
        &mut self.selection
    }

    pub fn history(&self) -> Ref<'_, ChangeHistory> {
        self.history.borrow()
    }

    pub fn can_undo(&self) -> bool {
        self.history.borrow().can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.borrow().can_redo()
    }

    /// All changes until [`Editor::end_change_group`] are undone as one.
    pub fn start_change_group(&mut self) {
        self.history.borrow_mut().start_group();
    }

    pub fn end_change_group(&mut self) {
        self.history.borrow_mut().end_group();
    }

    /// Reverts the most recent change (or change group).
    pub fn undo(&mut self) -> Result<()> {
        let Some(changes) = self.history.borrow_mut().undo_step() else {
            return Ok(());
        };
        for change in changes {
            self.replay(&change, Replay::Undo)?;
        }
        Ok(())
    }

    /// Re-applies the most recently undone change (or change group).
    pub fn redo(&mut self) -> Result<()> {
        let Some(changes) = self.history.borrow_mut().redo_step() else {
            return Ok(());
        };
        for change in changes {
            self.replay(&change, Replay::Redo)?;
        }
        Ok(())
    }

    /// Sets every selected voxel of the active volume to `values`. Voxels
    /// outside the selection keep their values. Does nothing if the
    /// selection is empty.
    pub fn fill_selection(&mut self, values: impl Into<FillValues>) -> Result<()> {
        let (mask, offset) = self.selection.get_bounded_selection();
        if mask.is_empty() {
            return Ok(());
        }
        let (x, y, z) = mask.dim();
        let region = Region::from_offset(offset, [x, y, z]);

        let change = {
            let mut image = self.image.borrow_mut();
            let ndim = image.ndim();
            if ndim != 3 && ndim != 4 {
                return Err(EditError::UnsupportedDimensionality(ndim));
            }
            let volume = if image.is_4d() {
                Some(image.active_volume())
            } else {
                None
            };
            let old = image.block(&region, volume.unwrap_or(0))?;
            let mut new = match values.into() {
                FillValues::Scalar(v) => Array3::from_elem(old.raw_dim(), v),
                FillValues::Block(block) => {
                    if block.dim() != old.dim() {
                        return Err(EditError::ShapeMismatch {
                            expected: old.shape().to_vec(),
                            actual: block.shape().to_vec(),
                        });
                    }
                    block
                }
            };
            Zip::from(&mut new).and(&mask).and(&old).for_each(|n, &m, &o| {
                if m == 0 {
                    *n = o;
                }
            });
            image.apply_change(offset, new.view(), volume)?;
            ValueChange {
                offset,
                old,
                new,
                volume,
            }
        };
        self.history.borrow_mut().record(Change::Value(change));
        Ok(())
    }

    /// Adds a new image holding the selection mask (0/1) directly after the
    /// edited image in `overlays`, and returns it.
    pub fn create_mask_image(&self, overlays: &mut OverlayList) -> Result<SharedImage> {
        let index = self.overlay_index(overlays)?;
        let image = self.image.borrow();
        let mask = self.selection.mask().mapv(f64::from);
        let name = format!("{}_mask", image.name());
        debug!("Creating mask image {}", name);
        let mask_image = Image::from_array3(name, mask, image.geometry().spatial())?.into_shared();
        overlays.insert(index + 1, Rc::clone(&mask_image));
        Ok(mask_image)
    }

    /// Adds a new image holding the values of the active volume where
    /// selected and zero elsewhere, directly after the edited image in
    /// `overlays`, and returns it.
    pub fn create_masked_copy_image(&self, overlays: &mut OverlayList) -> Result<SharedImage> {
        let index = self.overlay_index(overlays)?;
        let image = self.image.borrow();
        let values = image.active_volume_view()?;
        let mut roi = Array3::<f64>::zeros(values.raw_dim());
        Zip::from(&mut roi)
            .and(&self.selection.mask())
            .and(&values)
            .for_each(|r, &m, &v| {
                if m != 0 {
                    *r = v;
                }
            });
        let name = format!("{}_roi", image.name());
        debug!("Creating ROI image {}", name);
        let roi_image = Image::from_array3(name, roi, image.geometry().spatial())?.into_shared();
        overlays.insert(index + 1, Rc::clone(&roi_image));
        Ok(roi_image)
    }

    fn overlay_index(&self, overlays: &OverlayList) -> Result<usize> {
        match overlays.index_of(&self.image) {
            Some(index) => Ok(index),
            None => {
                // the editor should have been destroyed along with its image
                let err = EditError::ImageNotFound(self.image.borrow().name().to_string());
                error!("Cannot create image from selection: {}", err);
                Err(err)
            }
        }
    }

    fn replay(&mut self, change: &Change, replay: Replay) -> Result<()> {
        match change {
            Change::Value(c) => {
                debug!(
                    "{:?} image data change - offset {:?}, volume {:?}, size {:?}",
                    replay,
                    c.offset,
                    c.volume,
                    c.old.shape()
                );
                self.image
                    .borrow_mut()
                    .apply_change(c.offset, c.values(replay), c.volume)
            }
            Change::Selection(c) => self.selection.restore_block(c.mask(replay), c.offset),
        }
    }
}
