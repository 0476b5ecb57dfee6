//! Voxel selections.
//!
//! A [`Selection`] is a 0/1 mask with the same spatial shape as an image.
//! Every change goes through a single block write, which remembers the old
//! and new contents of the block so that the editor can undo it. Successive
//! changes may be combined into one, so that e.g. all the small blocks
//! painted during a mouse drag can be undone together.
//!
//! Selections can be changed by:
//!
//! - selecting/deselecting a cube around a voxel ([`Selection::select_block`],
//!   [`Selection::deselect_block`])
//! - writing a block you made yourself ([`Selection::set_selection`],
//!   [`Selection::replace_selection`], [`Selection::add_to_selection`],
//!   [`Selection::remove_from_selection`])
//! - a bucket fill on the image values ([`Selection::select_by_value`])
//! - clearing ([`Selection::clear_selection`])

use ndarray::{Array3, ArrayView3, Zip};
use tracing::{debug, Level};

use crate::common::{Direction, Region};
use crate::error::{EditError, Result};
use crate::image::ImageSource;
use crate::signal::{ListenerId, Signal};

/// One change to a selection: the block contents before and after, and
/// where the block sits in the mask.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectionChange {
    pub old: Array3<u8>,
    pub new: Array3<u8>,
    pub offset: [usize; 3],
}

impl SelectionChange {
    pub fn region(&self) -> Region {
        let (x, y, z) = self.old.dim();
        Region::from_offset(self.offset, [x, y, z])
    }
}

/// Neighbourhood used when a bucket fill only keeps voxels connected to
/// the seed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Connectivity {
    /// 6 neighbours sharing a face.
    Faces,
    /// All 26 neighbours.
    #[default]
    Full,
}

impl Connectivity {
    fn offsets(self) -> Vec<[isize; 3]> {
        let mut offsets = Vec::with_capacity(26);
        for dx in -1isize..=1 {
            for dy in -1isize..=1 {
                for dz in -1isize..=1 {
                    let steps = dx.abs() + dy.abs() + dz.abs();
                    let keep = match self {
                        Connectivity::Faces => steps == 1,
                        Connectivity::Full => steps > 0,
                    };
                    if keep {
                        offsets.push([dx, dy, dz]);
                    }
                }
            }
        }
        offsets
    }
}

/// Bucket fill search radius, in voxels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SearchRadius {
    Uniform(f64),
    PerAxis([f64; 3]),
}

impl SearchRadius {
    pub fn per_axis(&self) -> [f64; 3] {
        match *self {
            SearchRadius::Uniform(r) => [r, r, r],
            SearchRadius::PerAxis(r) => r,
        }
    }
}

impl From<f64> for SearchRadius {
    fn from(r: f64) -> Self {
        SearchRadius::Uniform(r)
    }
}

impl From<[f64; 3]> for SearchRadius {
    fn from(r: [f64; 3]) -> Self {
        SearchRadius::PerAxis(r)
    }
}

/// Options for [`Selection::select_by_value`].
#[derive(Debug, Clone, Default)]
pub struct ValueSearch {
    /// Voxels whose value differs from the seed value by less than this are
    /// selected. Without a (positive) precision, values must be equal.
    pub precision: Option<f64>,
    /// Limit the search to an ellipsoid around the seed.
    pub radius: Option<SearchRadius>,
    /// Only keep voxels connected to the seed.
    pub local: bool,
    pub connectivity: Connectivity,
    /// Only search this part of the image.
    pub restrict: Option<Region>,
    /// Combine with the previous change.
    pub combine: bool,
}

impl ValueSearch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn precision(mut self, precision: f64) -> Self {
        self.precision = Some(precision);
        self
    }

    pub fn radius(mut self, radius: impl Into<SearchRadius>) -> Self {
        self.radius = Some(radius.into());
        self
    }

    pub fn local(mut self, local: bool) -> Self {
        self.local = local;
        self
    }

    pub fn connectivity(mut self, connectivity: Connectivity) -> Self {
        self.connectivity = connectivity;
        self
    }

    pub fn restrict(mut self, region: Region) -> Self {
        self.restrict = Some(region);
        self
    }

    pub fn combine(mut self, combine: bool) -> Self {
        self.combine = combine;
        self
    }

    fn is_hit(&self, v: f64, seed_value: f64) -> bool {
        match self.precision {
            Some(p) if p > 0.0 => (v - seed_value).abs() < p,
            _ => v == seed_value,
        }
    }
}

/// A selection of voxels in one image.
#[derive(Debug)]
pub struct Selection {
    mask: Array3<u8>,
    last_change: Option<SelectionChange>,
    // true only while the mask is known to be all zeros
    clear: bool,
    listeners: Signal<SelectionChange>,
}

impl Selection {
    /// An empty selection of the given spatial shape.
    pub fn new(shape: [usize; 3]) -> Self {
        Self {
            mask: Array3::zeros(shape),
            last_change: None,
            clear: true,
            listeners: Signal::new(),
        }
    }

    /// An empty selection for `image`.
    pub fn for_image<I: ImageSource + ?Sized>(image: &I) -> Result<Self> {
        let geometry = image.geometry();
        check_dimensionality(geometry.ndim())?;
        Ok(Self::new(geometry.spatial_shape()))
    }

    /// Wraps an existing mask. `image_shape` is the full shape of the
    /// image (3 or 4 dimensions); the mask must match its first three.
    pub fn from_mask(image_shape: &[usize], mask: Array3<u8>) -> Result<Self> {
        check_dimensionality(image_shape.len())?;
        if mask.shape() != &image_shape[..3] {
            return Err(EditError::InvalidGeometry(format!(
                "incompatible selection array: {:?} (image {:?})",
                mask.shape(),
                image_shape
            )));
        }
        let mask = mask.mapv(|v| (v != 0) as u8);
        let clear = mask.iter().all(|&v| v == 0);
        Ok(Self {
            mask,
            last_change: None,
            clear,
            listeners: Signal::new(),
        })
    }

    pub fn shape(&self) -> [usize; 3] {
        let (x, y, z) = self.mask.dim();
        [x, y, z]
    }

    /// The selection mask. Change it through the `Selection` methods only.
    pub fn mask(&self) -> ArrayView3<'_, u8> {
        self.mask.view()
    }

    pub fn is_empty(&self) -> bool {
        self.clear || self.mask.iter().all(|&v| v == 0)
    }

    /// Registers a callback invoked with the (possibly combined) pending
    /// change after every change to the mask.
    pub fn connect<F>(&mut self, f: F) -> ListenerId
    where
        F: FnMut(&SelectionChange) + 'static,
    {
        self.listeners.connect(f)
    }

    pub fn disconnect(&mut self, id: ListenerId) -> Result<()> {
        self.listeners.disconnect(id)
    }

    /// The most recent change, or `None` after a full clear.
    pub fn last_change(&self) -> Option<&SelectionChange> {
        self.last_change.as_ref()
    }

    /// Selects a block of `block_size` voxels centred on `voxel`, limited
    /// to `axes`.
    pub fn select_block(
        &mut self,
        voxel: [usize; 3],
        block_size: usize,
        axes: &[Direction],
        combine: bool,
    ) -> Result<()> {
        let (block, offset) = Self::generate_block(voxel, block_size, self.shape(), axes);
        self.add_to_selection(block.view(), offset, combine)
    }

    /// Deselects a block of `block_size` voxels centred on `voxel`, limited
    /// to `axes`.
    pub fn deselect_block(
        &mut self,
        voxel: [usize; 3],
        block_size: usize,
        axes: &[Direction],
        combine: bool,
    ) -> Result<()> {
        let (block, offset) = Self::generate_block(voxel, block_size, self.shape(), axes);
        self.remove_from_selection(block.view(), offset, combine)
    }

    /// Copies `block` into the selection at `offset`.
    pub fn set_selection(
        &mut self,
        block: ArrayView3<'_, u8>,
        offset: [usize; 3],
        combine: bool,
    ) -> Result<()> {
        self.update_block(block, offset, combine, true)
    }

    /// Copies `block` into the selection at `offset`.
    pub fn replace_selection(
        &mut self,
        block: ArrayView3<'_, u8>,
        offset: [usize; 3],
        combine: bool,
    ) -> Result<()> {
        self.update_block(block, offset, combine, true)
    }

    /// Adds the non-zero voxels of `block` to the selection.
    pub fn add_to_selection(
        &mut self,
        block: ArrayView3<'_, u8>,
        offset: [usize; 3],
        combine: bool,
    ) -> Result<()> {
        let Some(existing) = self.existing_block(&block, offset)? else {
            return Ok(());
        };
        let mut merged = existing;
        Zip::from(&mut merged)
            .and(&block)
            .for_each(|m, &b| *m = (*m != 0 || b != 0) as u8);
        self.update_block(merged.view(), offset, combine, true)
    }

    /// Deselects every voxel where `block` is non-zero.
    pub fn remove_from_selection(
        &mut self,
        block: ArrayView3<'_, u8>,
        offset: [usize; 3],
        combine: bool,
    ) -> Result<()> {
        let Some(existing) = self.existing_block(&block, offset)? else {
            return Ok(());
        };
        let mut remaining = existing;
        Zip::from(&mut remaining).and(&block).for_each(|m, &b| {
            if b != 0 {
                *m = 0;
            }
        });
        self.update_block(remaining.view(), offset, combine, true)
    }

    /// Number of selected voxels.
    pub fn get_selection_size(&self) -> usize {
        if self.clear {
            return 0;
        }
        self.mask.iter().filter(|&&v| v != 0).count()
    }

    /// The smallest block containing every selected voxel, and its offset.
    /// An empty selection gives a `0 x 0 x 0` block at the origin.
    pub fn get_bounded_selection(&self) -> (Array3<u8>, [usize; 3]) {
        match self.bounding_region() {
            Some(region) => (self.mask.slice(region.slice_info()).to_owned(), region.lo),
            None => (Array3::zeros((0, 0, 0)), [0, 0, 0]),
        }
    }

    /// Region spanned by the selected voxels.
    pub fn bounding_region(&self) -> Option<Region> {
        if self.clear {
            return None;
        }
        let mut lo = [usize::MAX; 3];
        let mut hi = [0usize; 3];
        let mut any = false;
        for ((x, y, z), &v) in self.mask.indexed_iter() {
            if v == 0 {
                continue;
            }
            any = true;
            for (ax, i) in [x, y, z].into_iter().enumerate() {
                lo[ax] = lo[ax].min(i);
                hi[ax] = hi[ax].max(i + 1);
            }
        }
        if any {
            Some(Region::new(lo, hi))
        } else {
            None
        }
    }

    /// Deselects everything, or everything inside `restrict`.
    pub fn clear_selection(&mut self, restrict: Option<Region>, combine: bool) -> Result<()> {
        if self.clear {
            self.last_change = None;
            return Ok(());
        }
        let region = match restrict {
            Some(r) => r.clip(self.shape()),
            None => Region::full(self.shape()),
        };
        debug!("Clearing selection {}", region);
        let zeros = Array3::<u8>::zeros(region.shape());
        self.update_block(zeros.view(), region.lo, combine, true)?;
        // remember full clears so redundant ones can be skipped
        if restrict.is_none() {
            self.clear = true;
        }
        Ok(())
    }

    /// Coordinates of every selected voxel, optionally only inside
    /// `restrict`.
    pub fn get_indices(&self, restrict: Option<Region>) -> Vec<[usize; 3]> {
        let region = match restrict {
            Some(r) => r.clip(self.shape()),
            None => Region::full(self.shape()),
        };
        self.mask
            .slice(region.slice_info())
            .indexed_iter()
            .filter(|&(_, &v)| v != 0)
            .map(|((x, y, z), _)| [x + region.lo[0], y + region.lo[1], z + region.lo[2]])
            .collect()
    }

    /// Bucket fill. Selects the voxels whose value is similar to the value
    /// at `seed`, in the active volume of `image`, replacing the selection
    /// over the searched region.
    pub fn select_by_value<I: ImageSource + ?Sized>(
        &mut self,
        image: &I,
        seed: [usize; 3],
        search: &ValueSearch,
    ) -> Result<()> {
        check_dimensionality(image.geometry().ndim())?;
        let data = image.active_volume_view()?;
        let (sx, sy, sz) = data.dim();
        let shape = [sx, sy, sz];
        if shape != self.shape() {
            return Err(EditError::ShapeMismatch {
                expected: self.shape().to_vec(),
                actual: shape.to_vec(),
            });
        }
        if !Region::full(shape).contains(seed) {
            return Err(EditError::VoxelOutOfBounds { voxel: seed, shape });
        }
        let value = data[seed];

        let domain = match search.restrict {
            Some(r) => {
                if !r.contains(seed) {
                    return Err(EditError::SeedOutsideRestriction {
                        seed,
                        lo: r.lo,
                        hi: r.hi,
                    });
                }
                r.clip(shape)
            }
            None => Region::full(shape),
        };

        // A zero (or missing) radius on any axis searches the whole domain
        let radius = search
            .radius
            .map(|r| r.per_axis().map(f64::ceil))
            .filter(|r| r.iter().all(|&v| v > 0.0));

        let space = match radius {
            Some(r) => {
                let mut lo = [0; 3];
                let mut hi = [0; 3];
                for ax in 0..3 {
                    // no box is wider than the image
                    let rad = r[ax].min(shape[ax] as f64) as usize;
                    lo[ax] = seed[ax].saturating_sub(rad).max(domain.lo[ax]);
                    hi[ax] = (seed[ax] + rad + 1).min(domain.hi[ax]);
                }
                Region::new(lo, hi)
            }
            None => domain,
        };

        let mut hits = Array3::<u8>::zeros(space.shape());
        Zip::indexed(&mut hits)
            .and(&data.slice(space.slice_info()))
            .for_each(|(x, y, z), hit, &v| {
                let inside = match radius {
                    Some(r) => {
                        let pos = [x + space.lo[0], y + space.lo[1], z + space.lo[2]];
                        let dist: f64 = (0..3)
                            .map(|ax| {
                                let d = (pos[ax] as f64 - seed[ax] as f64) / r[ax];
                                d * d
                            })
                            .sum();
                        dist <= 1.0
                    }
                    None => true,
                };
                *hit = (inside && search.is_hit(v, value)) as u8;
            });

        if search.local {
            let local_seed = [
                seed[0] - space.lo[0],
                seed[1] - space.lo[1],
                seed[2] - space.lo[2],
            ];
            hits = connected_to(&hits, local_seed, search.connectivity);
        }

        debug!(
            "Bucket fill from {:?} (value {}) over {}",
            seed, value, space
        );
        self.replace_selection(hits.view(), space.lo, search.combine)
    }

    /// Resampling a selection into another image's voxel grid is not
    /// supported.
    pub fn transfer_selection<I: ImageSource + ?Sized>(&self, _dest: &I) -> Result<Array3<u8>> {
        Err(EditError::Unsupported(
            "transferring a selection to another image".to_string(),
        ))
    }

    /// A block of ones, `block_size` voxels wide along each of `axes` and
    /// one voxel thick along the others, centred on `voxel` and truncated
    /// to fit in `shape`. Returns the block and its offset; the block is
    /// `0 x 0 x 0` if nothing of it is left after truncation.
    pub fn generate_block(
        voxel: [usize; 3],
        block_size: usize,
        shape: [usize; 3],
        axes: &[Direction],
    ) -> (Array3<u8>, [usize; 3]) {
        let empty = || (Array3::zeros((0, 0, 0)), voxel);
        if block_size == 0 {
            return empty();
        }
        // even sizes put the extra voxel above the centre
        let below = (block_size - 1) / 2;
        let above = block_size / 2;

        let mut lo = [0; 3];
        let mut hi = [0; 3];
        for ax in 0..3 {
            if axes.iter().any(|d| d.to_usize() == ax) {
                lo[ax] = voxel[ax].saturating_sub(below);
                hi[ax] = (voxel[ax] + above + 1).min(shape[ax]);
            } else {
                lo[ax] = voxel[ax];
                hi[ax] = (voxel[ax] + 1).min(shape[ax]);
            }
            if hi[ax] <= lo[ax] {
                return empty();
            }
        }
        let region = Region::new(lo, hi);
        (Array3::ones(region.shape()), lo)
    }

    /// Writes `block` without notifying listeners. Used when replaying
    /// history, where the change must not be recorded again. The write is
    /// not kept as the pending change, so later changes never combine
    /// with it.
    pub(crate) fn restore_block(&mut self, block: ArrayView3<'_, u8>, offset: [usize; 3]) -> Result<()> {
        self.update_block(block, offset, false, false)?;
        self.last_change = None;
        Ok(())
    }

    /// Copy of the mask under `block` placed at `offset`, or `None` for an
    /// empty block.
    fn existing_block(
        &self,
        block: &ArrayView3<'_, u8>,
        offset: [usize; 3],
    ) -> Result<Option<Array3<u8>>> {
        let (x, y, z) = block.dim();
        if x * y * z == 0 {
            return Ok(None);
        }
        let region = Region::from_offset(offset, [x, y, z]);
        self.check_fits(&region)?;
        Ok(Some(self.mask.slice(region.slice_info()).to_owned()))
    }

    fn check_fits(&self, region: &Region) -> Result<()> {
        if region.fits_in(self.shape()) {
            Ok(())
        } else {
            Err(EditError::BlockOutOfBounds {
                shape: region.shape(),
                offset: region.lo,
                bounds: self.shape(),
            })
        }
    }

    /// The one place the mask is written.
    fn update_block(
        &mut self,
        block: ArrayView3<'_, u8>,
        offset: [usize; 3],
        combine: bool,
        notify: bool,
    ) -> Result<()> {
        let (x, y, z) = block.dim();
        if x * y * z == 0 {
            return Ok(());
        }
        let region = Region::from_offset(offset, [x, y, z]);
        self.check_fits(&region)?;

        let block = block.mapv(|v| (v != 0) as u8);
        let old = self.mask.slice(region.slice_info()).to_owned();
        self.store_change(old, block.clone(), offset, combine);

        debug!("Updating selection block {}", region);
        self.mask.slice_mut(region.slice_info()).assign(&block);
        self.clear = false;

        if notify {
            if let Some(change) = &self.last_change {
                self.listeners.emit(change);
            }
        }
        Ok(())
    }

    /// Records a change, either replacing the pending change or merging
    /// with it. Must be called before the mask is written.
    fn store_change(&mut self, old: Array3<u8>, new: Array3<u8>, offset: [usize; 3], combine: bool) {
        let previous = match self.last_change.take() {
            Some(prev) if combine => prev,
            _ => {
                if tracing::enabled!(Level::DEBUG) {
                    let (x, y, z) = old.dim();
                    debug!(
                        "Replacing previously stored change with: {} ({} selected)",
                        Region::from_offset(offset, [x, y, z]),
                        count_selected(&new)
                    );
                }
                self.last_change = Some(SelectionChange { old, new, offset });
                return;
            }
        };

        let (x, y, z) = old.dim();
        let current = Region::from_offset(offset, [x, y, z]);
        let last = previous.region();
        let combined = current.union(&last);
        let last_rel = last.relative_to(combined.lo);
        let current_rel = current.relative_to(combined.lo);

        // The mask has not been written yet, so outside of the previous
        // change it still holds the old values of the current one
        let mut cmb_old = self.mask.slice(combined.slice_info()).to_owned();
        let mut cmb_new = cmb_old.clone();
        cmb_old.slice_mut(last_rel.slice_info()).assign(&previous.old);
        cmb_new.slice_mut(last_rel.slice_info()).assign(&previous.new);
        cmb_new.slice_mut(current_rel.slice_info()).assign(&new);

        if tracing::enabled!(Level::DEBUG) {
            debug!(
                "Combining changes: {} ({} selected) + {} ({} selected) = {} ({} selected)",
                last,
                count_selected(&previous.new),
                current,
                count_selected(&new),
                combined,
                count_selected(&cmb_new)
            );
        }

        self.last_change = Some(SelectionChange {
            old: cmb_old,
            new: cmb_new,
            offset: combined.lo,
        });
    }
}

fn check_dimensionality(ndim: usize) -> Result<()> {
    if ndim == 3 || ndim == 4 {
        Ok(())
    } else {
        Err(EditError::UnsupportedDimensionality(ndim))
    }
}

fn count_selected(block: &Array3<u8>) -> usize {
    block.iter().filter(|&&v| v != 0).count()
}

/// The voxels of `hits` connected to `seed` through other hits. Empty if
/// the seed itself is not a hit.
fn connected_to(hits: &Array3<u8>, seed: [usize; 3], connectivity: Connectivity) -> Array3<u8> {
    let (sx, sy, sz) = hits.dim();
    let shape = [sx as isize, sy as isize, sz as isize];
    let mut out = Array3::<u8>::zeros(hits.raw_dim());
    if hits[seed] == 0 {
        return out;
    }
    let offsets = connectivity.offsets();
    // out doubles as the visited set
    let mut stack = Vec::with_capacity(1024);
    out[seed] = 1;
    stack.push(seed);
    while let Some(v) = stack.pop() {
        for d in &offsets {
            let n = [
                v[0] as isize + d[0],
                v[1] as isize + d[1],
                v[2] as isize + d[2],
            ];
            if (0..3).any(|ax| n[ax] < 0 || n[ax] >= shape[ax]) {
                continue;
            }
            let n = [n[0] as usize, n[1] as usize, n[2] as usize];
            if out[n] == 0 && hits[n] != 0 {
                out[n] = 1;
                stack.push(n);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::ImageGeometry;
    use crate::image::Image;
    use std::cell::RefCell;
    use std::rc::Rc;

    const XYZ: [Direction; 3] = Direction::ALL;

    fn image_from(data: Array3<f64>) -> Image {
        let (x, y, z) = data.dim();
        let geometry = ImageGeometry::identity([x, y, z]).unwrap();
        Image::from_array3("test", data, geometry).unwrap()
    }

    #[test]
    fn select_block_on_empty_volume() {
        let mut sel = Selection::new([10, 10, 10]);
        sel.select_block([5, 5, 5], 3, &XYZ, false).unwrap();
        assert_eq!(sel.get_selection_size(), 27);

        let (block, offset) = sel.get_bounded_selection();
        assert_eq!(offset, [4, 4, 4]);
        assert_eq!(block.dim(), (3, 3, 3));
        assert!(block.iter().all(|&v| v == 1));
        assert_eq!(sel.mask()[[3, 5, 5]], 0);
        assert_eq!(sel.mask()[[7, 5, 5]], 0);
    }

    #[test]
    fn select_then_deselect_restores_mask() {
        let mut sel = Selection::new([10, 10, 10]);
        sel.select_block([1, 1, 1], 2, &XYZ, false).unwrap();
        let before = sel.mask().to_owned();
        sel.select_block([6, 7, 2], 4, &XYZ, false).unwrap();
        sel.deselect_block([6, 7, 2], 4, &XYZ, false).unwrap();
        assert_eq!(sel.mask(), before.view());
    }

    #[test]
    fn generate_block_centres_and_truncates() {
        let (block, offset) = Selection::generate_block([5, 5, 5], 4, [10, 10, 10], &XYZ);
        assert_eq!(offset, [4, 4, 4]);
        assert_eq!(block.dim(), (4, 4, 4));

        let (block, offset) = Selection::generate_block([0, 9, 5], 3, [10, 10, 10], &XYZ);
        assert_eq!(offset, [0, 8, 4]);
        assert_eq!(block.dim(), (2, 2, 3));

        let (block, offset) =
            Selection::generate_block([5, 5, 5], 3, [10, 10, 10], &[Direction::X, Direction::Y]);
        assert_eq!(offset, [4, 4, 5]);
        assert_eq!(block.dim(), (3, 3, 1));

        let (block, _) = Selection::generate_block([12, 5, 5], 1, [10, 10, 10], &XYZ);
        assert_eq!(block.dim(), (0, 0, 0));
        let (block, _) = Selection::generate_block([5, 5, 5], 0, [10, 10, 10], &XYZ);
        assert_eq!(block.len(), 0);
    }

    #[test]
    fn block_outside_mask_is_rejected() {
        let mut sel = Selection::new([4, 4, 4]);
        let block = Array3::<u8>::ones((2, 2, 2));
        let err = sel.set_selection(block.view(), [3, 0, 0], false).unwrap_err();
        assert!(matches!(err, EditError::BlockOutOfBounds { .. }));
        assert!(sel.is_empty());
        assert!(sel.last_change().is_none());
    }

    #[test]
    fn empty_block_is_a_no_op() {
        let mut sel = Selection::new([4, 4, 4]);
        let calls = Rc::new(RefCell::new(0));
        let counter = Rc::clone(&calls);
        sel.connect(move |_| *counter.borrow_mut() += 1);
        let block = Array3::<u8>::zeros((0, 2, 2));
        sel.set_selection(block.view(), [9, 9, 9], false).unwrap();
        assert_eq!(*calls.borrow(), 0);
        assert!(sel.last_change().is_none());
    }

    #[test]
    fn written_values_are_normalised() {
        let mut sel = Selection::new([3, 3, 3]);
        let block = Array3::from_elem((1, 1, 2), 255u8);
        sel.set_selection(block.view(), [0, 0, 0], false).unwrap();
        assert_eq!(sel.mask()[[0, 0, 1]], 1);
    }

    #[test]
    fn listeners_see_committed_state() {
        let mut sel = Selection::new([5, 5, 5]);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        sel.connect(move |c: &SelectionChange| sink.borrow_mut().push(c.clone()));
        sel.select_block([2, 2, 2], 1, &XYZ, false).unwrap();

        let seen = seen.borrow();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].offset, [2, 2, 2]);
        assert_eq!(seen[0].old[[0, 0, 0]], 0);
        assert_eq!(seen[0].new[[0, 0, 0]], 1);
    }

    #[test]
    fn combined_changes_span_the_union() {
        let mut sel = Selection::new([10, 10, 10]);
        let a = Array3::<u8>::ones((2, 2, 2));
        let b = Array3::<u8>::ones((1, 3, 1));
        sel.add_to_selection(a.view(), [1, 1, 1], false).unwrap();
        sel.add_to_selection(b.view(), [6, 5, 4], true).unwrap();

        let change = sel.last_change().unwrap();
        assert_eq!(change.offset, [1, 1, 1]);
        assert_eq!(change.old.dim(), (6, 7, 4));
        assert!(change.old.iter().all(|&v| v == 0));

        let first = Region::new([0, 0, 0], [2, 2, 2]);
        let second = Region::new([5, 4, 3], [6, 7, 4]);
        assert!(change.new.slice(first.slice_info()).iter().all(|&v| v == 1));
        assert!(change.new.slice(second.slice_info()).iter().all(|&v| v == 1));
        assert_eq!(count_selected(&change.new), 8 + 3);
    }

    #[test]
    fn combining_keeps_the_oldest_values() {
        let mut sel = Selection::new([6, 6, 6]);
        sel.select_block([2, 2, 2], 1, &XYZ, false).unwrap();
        // overlapping second change, combined with a full-mask first one
        sel.clear_selection(None, false).unwrap();
        sel.select_block([2, 2, 2], 3, &XYZ, true).unwrap();

        let change = sel.last_change().unwrap();
        assert_eq!(change.offset, [0, 0, 0]);
        assert_eq!(change.old[[2, 2, 2]], 1);
        assert_eq!(change.new[[2, 2, 2]], 1);
        assert_eq!(change.new[[1, 1, 1]], 1);
        assert_eq!(count_selected(&change.old), 1);
    }

    #[test]
    fn uncombined_change_replaces_pending_change() {
        let mut sel = Selection::new([6, 6, 6]);
        sel.select_block([1, 1, 1], 1, &XYZ, false).unwrap();
        sel.select_block([4, 4, 4], 1, &XYZ, false).unwrap();
        let change = sel.last_change().unwrap();
        assert_eq!(change.offset, [4, 4, 4]);
        assert_eq!(change.old.dim(), (1, 1, 1));
    }

    #[test]
    fn redundant_clear_is_skipped() {
        let mut sel = Selection::new([4, 4, 4]);
        let calls = Rc::new(RefCell::new(0));
        let counter = Rc::clone(&calls);
        sel.connect(move |_| *counter.borrow_mut() += 1);

        sel.select_block([1, 1, 1], 1, &XYZ, false).unwrap();
        sel.clear_selection(None, false).unwrap();
        assert_eq!(*calls.borrow(), 2);
        assert!(sel.is_empty());

        sel.clear_selection(None, false).unwrap();
        assert_eq!(*calls.borrow(), 2);
        assert!(sel.last_change().is_none());
    }

    #[test]
    fn restricted_clear_of_empty_selection_is_skipped() {
        let mut sel = Selection::new([4, 4, 4]);
        let calls = Rc::new(RefCell::new(0));
        let counter = Rc::clone(&calls);
        sel.connect(move |_| *counter.borrow_mut() += 1);

        sel.clear_selection(Some(Region::new([0, 0, 0], [2, 2, 2])), true).unwrap();
        assert_eq!(*calls.borrow(), 0);
        assert!(sel.last_change().is_none());
        assert!(sel.is_empty());
    }

    #[test]
    fn restored_block_is_not_combined_with() {
        let mut sel = Selection::new([6, 6, 6]);
        sel.select_block([1, 1, 1], 1, &XYZ, false).unwrap();
        let zero = Array3::<u8>::zeros((1, 1, 1));
        sel.restore_block(zero.view(), [1, 1, 1]).unwrap();
        assert!(sel.last_change().is_none());

        sel.select_block([4, 4, 4], 1, &XYZ, true).unwrap();
        let change = sel.last_change().unwrap();
        assert_eq!(change.offset, [4, 4, 4]);
        assert_eq!(change.old.dim(), (1, 1, 1));
        assert_eq!(sel.get_selection_size(), 1);
    }

    #[test]
    fn restricted_clear_and_indices() {
        let mut sel = Selection::new([6, 6, 6]);
        sel.select_block([2, 2, 2], 3, &XYZ, false).unwrap();
        let restrict = Region::new([0, 0, 0], [2, 6, 6]);
        assert_eq!(sel.get_indices(Some(restrict)).len(), 9);

        sel.clear_selection(Some(restrict), false).unwrap();
        assert_eq!(sel.get_selection_size(), 18);
        let indices = sel.get_indices(None);
        assert_eq!(indices[0], [2, 1, 1]);
        assert!(indices.iter().all(|v| v[0] >= 2));
        assert!(sel.get_indices(Some(Region::new([4, 0, 0], [9, 9, 9]))).is_empty());
    }

    #[test]
    fn bounded_selection_of_nothing() {
        let sel = Selection::new([4, 4, 4]);
        let (block, offset) = sel.get_bounded_selection();
        assert_eq!(block.dim(), (0, 0, 0));
        assert_eq!(offset, [0, 0, 0]);
    }

    #[test]
    fn from_mask_checks_shape() {
        let mask = Array3::<u8>::zeros((4, 4, 3));
        assert!(matches!(
            Selection::from_mask(&[4, 4, 4], mask.clone()),
            Err(EditError::InvalidGeometry(_))
        ));
        assert!(matches!(
            Selection::from_mask(&[4, 4], mask.clone()),
            Err(EditError::UnsupportedDimensionality(2))
        ));
        let mut mask = mask;
        mask[[1, 1, 1]] = 1;
        let sel = Selection::from_mask(&[4, 4, 3, 7], mask).unwrap();
        assert!(!sel.is_empty());
        assert_eq!(sel.get_selection_size(), 1);
    }

    #[test]
    fn local_fill_keeps_connected_voxels() {
        let mut data = Array3::<f64>::zeros((10, 10, 10));
        for z in 5..=7 {
            data[[5, 5, z]] = 7.0;
        }
        data[[5, 5, 9]] = 7.0;
        let image = image_from(data);

        let mut sel = Selection::new([10, 10, 10]);
        let search = ValueSearch::new().precision(0.0).local(true);
        sel.select_by_value(&image, [5, 5, 5], &search).unwrap();
        assert_eq!(sel.get_indices(None), vec![[5, 5, 5], [5, 5, 6], [5, 5, 7]]);

        let global = ValueSearch::new().precision(0.0);
        sel.select_by_value(&image, [5, 5, 5], &global).unwrap();
        assert_eq!(sel.get_selection_size(), 4);
    }

    #[test]
    fn diagonal_neighbours_depend_on_connectivity() {
        let mut data = Array3::<f64>::zeros((5, 5, 5));
        data[[1, 1, 1]] = 3.0;
        data[[2, 2, 2]] = 3.0;
        let image = image_from(data);
        let mut sel = Selection::new([5, 5, 5]);

        let full = ValueSearch::new().local(true);
        sel.select_by_value(&image, [1, 1, 1], &full).unwrap();
        assert_eq!(sel.get_selection_size(), 2);

        let faces = ValueSearch::new().local(true).connectivity(Connectivity::Faces);
        sel.select_by_value(&image, [1, 1, 1], &faces).unwrap();
        assert_eq!(sel.get_selection_size(), 1);
    }

    #[test]
    fn precision_is_a_strict_bound() {
        let data = Array3::from_shape_fn((5, 1, 1), |(x, _, _)| x as f64 * 0.5);
        let image = image_from(data);
        let mut sel = Selection::new([5, 1, 1]);
        sel.select_by_value(&image, [2, 0, 0], &ValueSearch::new().precision(1.0))
            .unwrap();
        // values 0.0 0.5 1.0 1.5 2.0, seed 1.0
        assert_eq!(sel.get_indices(None), vec![[1, 0, 0], [2, 0, 0], [3, 0, 0]]);
    }

    #[test]
    fn radius_limits_search_to_ellipsoid() {
        let image = image_from(Array3::zeros((11, 11, 11)));
        let mut sel = Selection::new([11, 11, 11]);
        sel.select_by_value(&image, [5, 5, 5], &ValueSearch::new().radius(2.0))
            .unwrap();
        let change = sel.last_change().unwrap();
        assert_eq!(change.offset, [3, 3, 3]);
        assert_eq!(change.new.dim(), (5, 5, 5));
        // corners of the box lie outside the sphere
        assert_eq!(sel.mask()[[3, 3, 3]], 0);
        assert_eq!(sel.mask()[[3, 5, 5]], 1);
        assert_eq!(sel.mask()[[4, 4, 5]], 1);
        // number of integer points within a radius-2 sphere
        assert_eq!(sel.get_selection_size(), 33);
    }

    #[test]
    fn huge_radius_searches_whole_image() {
        let image = image_from(Array3::zeros((5, 6, 7)));
        let mut sel = Selection::new([5, 6, 7]);
        for radius in [1e300, f64::INFINITY] {
            sel.select_by_value(&image, [4, 0, 3], &ValueSearch::new().radius(radius))
                .unwrap();
            let change = sel.last_change().unwrap();
            assert_eq!(change.offset, [0, 0, 0]);
            assert_eq!(change.new.dim(), (5, 6, 7));
            assert_eq!(sel.get_selection_size(), 5 * 6 * 7);
        }

        let mut sel = Selection::new([5, 6, 7]);
        sel.select_by_value(&image, [2, 3, 3], &ValueSearch::new().radius([1.0, 1e300, 1.0]))
            .unwrap();
        let change = sel.last_change().unwrap();
        assert_eq!(change.offset, [1, 0, 2]);
        assert_eq!(change.new.dim(), (3, 6, 3));
    }

    #[test]
    fn radius_is_truncated_at_image_edge() {
        let image = image_from(Array3::zeros((6, 6, 6)));
        let mut sel = Selection::new([6, 6, 6]);
        sel.select_by_value(&image, [0, 5, 2], &ValueSearch::new().radius([1.0, 1.0, 0.5]))
            .unwrap();
        let change = sel.last_change().unwrap();
        assert_eq!(change.offset, [0, 4, 1]);
        assert_eq!(change.new.dim(), (2, 2, 3));
    }

    #[test]
    fn seed_must_be_inside_restriction() {
        let image = image_from(Array3::zeros((6, 6, 6)));
        let mut sel = Selection::new([6, 6, 6]);
        let search = ValueSearch::new().restrict(Region::new([0, 0, 0], [3, 6, 6]));
        let err = sel.select_by_value(&image, [4, 1, 1], &search).unwrap_err();
        assert!(matches!(err, EditError::SeedOutsideRestriction { .. }));

        sel.select_by_value(&image, [1, 1, 1], &search).unwrap();
        assert_eq!(sel.get_selection_size(), 3 * 6 * 6);
    }

    #[test]
    fn fill_reads_active_volume() {
        let data = ndarray::Array4::from_shape_fn((4, 4, 4, 2), |(x, _, _, v)| {
            if v == 1 && x < 2 {
                1.0
            } else {
                0.0
            }
        });
        let geometry = ImageGeometry::new(&[4, 4, 4, 2], [1.0; 3], nalgebra::Matrix4::identity()).unwrap();
        let mut image = Image::new("4d", data.into_dyn(), geometry).unwrap();
        let mut sel = Selection::for_image(&image).unwrap();

        sel.select_by_value(&image, [0, 0, 0], &ValueSearch::new()).unwrap();
        assert_eq!(sel.get_selection_size(), 64);

        image.set_active_volume(1).unwrap();
        sel.select_by_value(&image, [0, 0, 0], &ValueSearch::new()).unwrap();
        assert_eq!(sel.get_selection_size(), 32);
    }

    #[test]
    fn transfer_is_unsupported() {
        let image = image_from(Array3::zeros((2, 2, 2)));
        let sel = Selection::new([2, 2, 2]);
        assert!(matches!(
            sel.transfer_selection(&image),
            Err(EditError::Unsupported(_))
        ));
    }
}
