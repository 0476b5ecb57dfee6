//! Coordinate spaces for displaying an image.
//!
//! An image can be placed in the display coordinate system in one of five
//! ways:
//!
//! - `id`: voxel coordinates are display coordinates
//! - `pixdim`: voxel coordinates scaled by the voxel dimensions
//! - `pixdim-flip`: as `pixdim`, mirrored along X when the voxel-to-world
//!   affine has a positive determinant
//! - `affine`: the voxel-to-world affine
//! - `custom`: a user supplied affine
//!
//! Whatever the space, integer voxel coordinates refer to voxel centres, so
//! voxel `[2, 3, 4]` in `id` space covers `[1.5, 2.5] x [2.5, 3.5] x [3.5, 4.5]`.
//!
//! [`DisplaySpace`] caches every pairwise transform between these spaces
//! and rebuilds the cache whenever one of its inputs changes.

use nalgebra::{Matrix4, Point3, Vector3, Vector4};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

use crate::error::{EditError, Result};
use crate::geometry::ImageGeometry;
use crate::signal::{ListenerId, Signal};

/// A concrete coordinate space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Space {
    Id,
    #[default]
    Pixdim,
    PixdimFlip,
    Affine,
    Custom,
}

impl Space {
    pub const ALL: [Space; 5] = [
        Space::Id,
        Space::Pixdim,
        Space::PixdimFlip,
        Space::Affine,
        Space::Custom,
    ];

    fn index(self) -> usize {
        match self {
            Space::Id => 0,
            Space::Pixdim => 1,
            Space::PixdimFlip => 2,
            Space::Affine => 3,
            Space::Custom => 4,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Space::Id => "id",
            Space::Pixdim => "pixdim",
            Space::PixdimFlip => "pixdim-flip",
            Space::Affine => "affine",
            Space::Custom => "custom",
        }
    }
}

impl fmt::Display for Space {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for Space {
    type Err = EditError;

    fn from_str(s: &str) -> Result<Self> {
        match s.parse::<CoordSpace>()? {
            CoordSpace::Display => Err(EditError::UnknownSpace(s.to_string())),
            other => Ok(other.resolve(Space::default())),
        }
    }
}

/// A space as named by a caller: a concrete space or one of the aliases
/// `voxel` (= `id`), `world` (= `affine`) and `display` (the space the
/// image is currently displayed in).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CoordSpace {
    Voxel,
    World,
    Display,
    Space(Space),
}

impl CoordSpace {
    /// Resolves aliases, with `display` standing for `display_space`.
    pub fn resolve(self, display_space: Space) -> Space {
        match self {
            CoordSpace::Voxel => Space::Id,
            CoordSpace::World => Space::Affine,
            CoordSpace::Display => display_space,
            CoordSpace::Space(space) => space,
        }
    }
}

impl From<Space> for CoordSpace {
    fn from(space: Space) -> Self {
        CoordSpace::Space(space)
    }
}

impl FromStr for CoordSpace {
    type Err = EditError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "voxel" => Ok(CoordSpace::Voxel),
            "world" => Ok(CoordSpace::World),
            "display" => Ok(CoordSpace::Display),
            "id" => Ok(CoordSpace::Space(Space::Id)),
            "pixdim" => Ok(CoordSpace::Space(Space::Pixdim)),
            "pixdim-flip" | "pixflip" => Ok(CoordSpace::Space(Space::PixdimFlip)),
            "affine" => Ok(CoordSpace::Space(Space::Affine)),
            "custom" => Ok(CoordSpace::Space(Space::Custom)),
            other => Err(EditError::UnknownSpace(other.to_string())),
        }
    }
}

/// Axis aligned box in display coordinates which contains the whole image.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DisplayBounds {
    pub lo: [f64; 3],
    pub hi: [f64; 3],
}

impl DisplayBounds {
    /// `[xlo, xhi, ylo, yhi, zlo, zhi]`
    pub fn to_array(&self) -> [f64; 6] {
        [
            self.lo[0], self.hi[0], self.lo[1], self.hi[1], self.lo[2], self.hi[2],
        ]
    }

    pub fn len(&self) -> [f64; 3] {
        [
            self.hi[0] - self.lo[0],
            self.hi[1] - self.lo[1],
            self.hi[2] - self.lo[2],
        ]
    }
}

/// Notifications from a [`DisplaySpace`].
#[derive(Debug, Clone, PartialEq)]
pub enum SpaceEvent {
    /// World coordinates of the display location, computed with the
    /// transforms in effect before the change.
    StandardLocation(Point3<f64>),
    /// New display bounds of the image.
    BoundsChanged(DisplayBounds),
}

/// Applies an affine to a point.
pub fn apply_affine(xform: &Matrix4<f64>, p: &Point3<f64>) -> Point3<f64> {
    let h = xform * Vector4::new(p.x, p.y, p.z, 1.0);
    Point3::new(h.x, h.y, h.z)
}

/// Rounds voxel coordinates to the containing voxel. Ties go up
/// (`2.5 -> 3`, `-0.5 -> 0`), unlike round-half-to-even.
pub fn round_voxel(v: f64) -> f64 {
    (v + 0.5).floor()
}

/// Transforms between the coordinate spaces of one image, and tracks which
/// space the image is currently displayed in.
pub struct DisplaySpace {
    geometry: ImageGeometry,
    space: Space,
    custom: Matrix4<f64>,
    custom_inv: Matrix4<f64>,
    // xforms[from][to]
    xforms: [[Matrix4<f64>; 5]; 5],
    bounds: DisplayBounds,
    location: Point3<f64>,
    standard_location: Point3<f64>,
    listeners: Signal<SpaceEvent>,
}

impl DisplaySpace {
    pub fn new(geometry: ImageGeometry) -> Self {
        Self::with_space(geometry, Space::default())
    }

    pub fn with_space(geometry: ImageGeometry, space: Space) -> Self {
        let mut ds = Self {
            geometry,
            space,
            custom: Matrix4::identity(),
            custom_inv: Matrix4::identity(),
            xforms: [[Matrix4::identity(); 5]; 5],
            bounds: DisplayBounds::default(),
            location: Point3::origin(),
            standard_location: Point3::origin(),
            listeners: Signal::new(),
        };
        ds.setup_transforms();
        ds.update_bounds();
        ds.standard_location = ds.to_world(&ds.location);
        ds
    }

    pub fn geometry(&self) -> &ImageGeometry {
        &self.geometry
    }

    /// The space the image is displayed in.
    pub fn space(&self) -> Space {
        self.space
    }

    pub fn custom_matrix(&self) -> &Matrix4<f64> {
        &self.custom
    }

    pub fn bounds(&self) -> DisplayBounds {
        self.bounds
    }

    /// Current display location.
    pub fn location(&self) -> Point3<f64> {
        self.location
    }

    /// World coordinates of the current display location.
    pub fn standard_location(&self) -> Point3<f64> {
        self.standard_location
    }

    pub fn connect<F>(&mut self, f: F) -> ListenerId
    where
        F: FnMut(&SpaceEvent) + 'static,
    {
        self.listeners.connect(f)
    }

    pub fn disconnect(&mut self, id: ListenerId) -> Result<()> {
        self.listeners.disconnect(id)
    }

    /// Moves the display location.
    pub fn set_location(&mut self, xyz: Point3<f64>) {
        self.location = xyz;
        self.standard_location = self.to_world(&xyz);
    }

    /// Changes the display space. The display location is carried across
    /// through world coordinates, so it still refers to the same point.
    pub fn set_space(&mut self, space: Space) {
        if space == self.space {
            return;
        }
        let world = self.to_world(&self.location);
        debug!("Display space changed: {} -> {}", self.space, space);
        self.space = space;
        self.relocate(world);
    }

    /// Sets the matrix used by `custom` space. A non-invertible matrix is
    /// rejected and leaves everything untouched.
    pub fn set_custom_matrix(&mut self, xform: Matrix4<f64>) -> Result<()> {
        let inverse = xform
            .try_inverse()
            .filter(|inv| inv.iter().all(|v| v.is_finite()))
            .ok_or_else(|| EditError::NonInvertibleTransform(format!("{}", xform)))?;
        let world = self.to_world(&self.location);
        self.custom = xform;
        self.custom_inv = inverse;
        self.setup_transforms();
        if self.space == Space::Custom {
            self.relocate(world);
        }
        Ok(())
    }

    /// Replaces the image geometry (pixdim, affine or shape changed).
    pub fn set_geometry(&mut self, geometry: ImageGeometry) {
        let world = self.to_world(&self.location);
        self.geometry = geometry;
        self.setup_transforms();
        self.relocate(world);
    }

    /// Matrix transforming `from` coordinates into `to` coordinates.
    /// `display_space`, if given, overrides the current space for the
    /// `display` alias.
    pub fn transform(
        &self,
        from: CoordSpace,
        to: CoordSpace,
        display_space: Option<Space>,
    ) -> Matrix4<f64> {
        let display = display_space.unwrap_or(self.space);
        let from = from.resolve(display);
        let to = to.resolve(display);
        self.xforms[from.index()][to.index()]
    }

    /// As [`DisplaySpace::transform`], with spaces given by name.
    pub fn transform_by_name(
        &self,
        from: &str,
        to: &str,
        display_space: Option<Space>,
    ) -> Result<Matrix4<f64>> {
        Ok(self.transform(from.parse()?, to.parse()?, display_space))
    }

    /// Transforms points from one space to another. When `to` is voxel
    /// space and `round_to_voxel` is set, the results are rounded to voxel
    /// centres with ties going up.
    pub fn transform_coords(
        &self,
        coords: &[Point3<f64>],
        from: CoordSpace,
        to: CoordSpace,
        round_to_voxel: bool,
    ) -> Vec<Point3<f64>> {
        let xform = self.transform(from, to, None);
        let round = round_to_voxel && to.resolve(self.space) == Space::Id;
        coords
            .iter()
            .map(|p| {
                let q = apply_affine(&xform, p);
                if round {
                    Point3::new(round_voxel(q.x), round_voxel(q.y), round_voxel(q.z))
                } else {
                    q
                }
            })
            .collect()
    }

    /// Voxel coordinates of a display location. With `clip`, `None` is
    /// returned when the location falls outside of the image or is not
    /// finite.
    pub fn voxel_from_display(
        &self,
        xyz: Point3<f64>,
        clip: bool,
        round_to_voxel: bool,
    ) -> Option<[f64; 3]> {
        let vox = self.transform_coords(&[xyz], CoordSpace::Display, CoordSpace::Voxel, round_to_voxel)[0];
        let vox = [vox.x, vox.y, vox.z];
        if !clip {
            return Some(vox);
        }
        let shape = self.geometry.spatial_shape();
        for ax in 0..3 {
            if !vox[ax].is_finite() || vox[ax] < 0.0 || vox[ax] >= shape[ax] as f64 {
                return None;
            }
        }
        Some(vox)
    }

    /// Integer voxel containing a display location, if it is in the image.
    pub fn voxel_index(&self, xyz: Point3<f64>) -> Option<[usize; 3]> {
        self.voxel_from_display(xyz, true, true)
            .map(|v| [v[0] as usize, v[1] as usize, v[2] as usize])
    }

    pub fn display_to_world(&self, coords: &[Point3<f64>]) -> Vec<Point3<f64>> {
        self.transform_coords(coords, CoordSpace::Display, CoordSpace::World, false)
    }

    pub fn world_to_display(&self, coords: &[Point3<f64>]) -> Vec<Point3<f64>> {
        self.transform_coords(coords, CoordSpace::World, CoordSpace::Display, false)
    }

    fn to_world(&self, p: &Point3<f64>) -> Point3<f64> {
        apply_affine(&self.transform(CoordSpace::Display, CoordSpace::World, None), p)
    }

    /// Puts the display location back on `world`, recomputes the bounds and
    /// tells listeners.
    fn relocate(&mut self, world: Point3<f64>) {
        self.standard_location = world;
        self.location = apply_affine(
            &self.transform(CoordSpace::World, CoordSpace::Display, None),
            &world,
        );
        self.update_bounds();
        self.listeners.emit(&SpaceEvent::StandardLocation(world));
        let bounds = self.bounds;
        self.listeners.emit(&SpaceEvent::BoundsChanged(bounds));
    }

    fn update_bounds(&mut self) {
        let shape = self.geometry.spatial_shape();
        let xform = self.transform(CoordSpace::Voxel, CoordSpace::Display, None);
        let mut lo = [f64::INFINITY; 3];
        let mut hi = [f64::NEG_INFINITY; 3];
        for corner in 0..8 {
            let mut v = [0.0; 3];
            for ax in 0..3 {
                v[ax] = if corner & (1 << ax) == 0 {
                    -0.5
                } else {
                    shape[ax] as f64 - 0.5
                };
            }
            let p = apply_affine(&xform, &Point3::new(v[0], v[1], v[2]));
            for ax in 0..3 {
                lo[ax] = lo[ax].min(p[ax]);
                hi[ax] = hi[ax].max(p[ax]);
            }
        }
        self.bounds = DisplayBounds { lo, hi };
    }

    fn setup_transforms(&mut self) {
        let geometry = &self.geometry;
        let pixdim = geometry.pixdim();
        let scale = Vector3::new(pixdim[0], pixdim[1], pixdim[2]);
        let vox_to_pixdim = Matrix4::new_nonuniform_scaling(&scale);
        let pixdim_to_vox = Matrix4::new_nonuniform_scaling(&scale.map(|p| 1.0 / p));

        // pixdim-flip only differs from pixdim when the
        // affine has a positive determinant
        let flip_x = geometry.voxel_to_world().determinant() > 0.0;
        let (vox_to_flip, flip_to_vox) = if flip_x {
            let width = geometry.spatial_shape()[0] as f64;
            let mut flip = Matrix4::identity();
            flip[(0, 0)] = -1.0;
            flip[(0, 3)] = width - 1.0;
            // flip is its own inverse
            (vox_to_pixdim * flip, flip * pixdim_to_vox)
        } else {
            (vox_to_pixdim, pixdim_to_vox)
        };

        let forward = [
            Matrix4::identity(),
            vox_to_pixdim,
            vox_to_flip,
            *geometry.voxel_to_world(),
            self.custom,
        ];
        let inverse = [
            Matrix4::identity(),
            pixdim_to_vox,
            flip_to_vox,
            *geometry.world_to_voxel(),
            self.custom_inv,
        ];

        // without a flip, pixdim-flip shares the pixdim slots so that the
        // two spaces give identical matrices
        let slot = |space: Space| match space {
            Space::PixdimFlip if !flip_x => Space::Pixdim.index(),
            other => other.index(),
        };
        for from in Space::ALL {
            for to in Space::ALL {
                let (f, t) = (slot(from), slot(to));
                self.xforms[from.index()][to.index()] = if f == t {
                    Matrix4::identity()
                } else {
                    forward[t] * inverse[f]
                };
            }
        }
        debug!(
            "Set up transforms for shape {:?} (x flip: {})",
            self.geometry.shape(),
            flip_x
        );
    }
}

impl fmt::Debug for DisplaySpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DisplaySpace")
            .field("space", &self.space)
            .field("bounds", &self.bounds)
            .field("location", &self.location)
            .finish()
    }
}
