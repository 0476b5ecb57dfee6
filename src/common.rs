use ndarray::{s, Ix3, SliceInfo, SliceInfoElem};
use std::fmt;

// set up enums and structs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    X,
    Y,
    Z,
}

impl Direction {
    pub const ALL: [Direction; 3] = [Direction::X, Direction::Y, Direction::Z];

    pub fn to_usize(&self) -> usize {
        match self {
            Direction::X => 0,
            Direction::Y => 1,
            Direction::Z => 2,
        }
    }
    pub fn from_usize(val: usize) -> Option<Self> {
        match val {
            0 => Some(Direction::X),
            1 => Some(Direction::Y),
            2 => Some(Direction::Z),
            _ => None,
        }
    }
    pub fn from_string(val: &str) -> Option<Self> {
        match val {
            "x" | "i" => Some(Direction::X),
            "y" | "j" => Some(Direction::Y),
            "z" | "k" => Some(Direction::Z),
            _ => None,
        }
    }
}
impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::X => write!(f, "0"),
            Direction::Y => write!(f, "1"),
            Direction::Z => write!(f, "2"),
        }
    }
}

/// A half-open box of voxels, `[lo, hi)` along each axis.
///
/// Used for block locations, restrictions and bounding boxes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Region {
    pub lo: [usize; 3],
    pub hi: [usize; 3],
}

impl Region {
    pub fn new(lo: [usize; 3], hi: [usize; 3]) -> Self {
        Self { lo, hi }
    }

    /// The whole of an image with the given spatial shape.
    pub fn full(shape: [usize; 3]) -> Self {
        Self {
            lo: [0, 0, 0],
            hi: shape,
        }
    }

    /// The region covered by a block of `shape` placed at `offset`.
    pub fn from_offset(offset: [usize; 3], shape: [usize; 3]) -> Self {
        Self {
            lo: offset,
            hi: [
                offset[0] + shape[0],
                offset[1] + shape[1],
                offset[2] + shape[2],
            ],
        }
    }

    pub fn shape(&self) -> [usize; 3] {
        [
            self.hi[0].saturating_sub(self.lo[0]),
            self.hi[1].saturating_sub(self.lo[1]),
            self.hi[2].saturating_sub(self.lo[2]),
        ]
    }

    pub fn len(&self) -> usize {
        self.shape().iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, voxel: [usize; 3]) -> bool {
        (0..3).all(|ax| voxel[ax] >= self.lo[ax] && voxel[ax] < self.hi[ax])
    }

    /// Whether this region lies entirely inside an array of `shape`.
    pub fn fits_in(&self, shape: [usize; 3]) -> bool {
        (0..3).all(|ax| self.lo[ax] <= self.hi[ax] && self.hi[ax] <= shape[ax])
    }

    /// Smallest region covering both `self` and `other`.
    pub fn union(&self, other: &Region) -> Region {
        let mut lo = [0; 3];
        let mut hi = [0; 3];
        for ax in 0..3 {
            lo[ax] = self.lo[ax].min(other.lo[ax]);
            hi[ax] = self.hi[ax].max(other.hi[ax]);
        }
        Region { lo, hi }
    }

    /// Clip to an array of `shape`, the way slicing past the end of an
    /// array is clipped.
    pub fn clip(&self, shape: [usize; 3]) -> Region {
        let mut lo = [0; 3];
        let mut hi = [0; 3];
        for ax in 0..3 {
            hi[ax] = self.hi[ax].min(shape[ax]);
            lo[ax] = self.lo[ax].min(hi[ax]);
        }
        Region { lo, hi }
    }

    /// This region expressed relative to `origin`, which must not lie
    /// past `self.lo` on any axis.
    pub fn relative_to(&self, origin: [usize; 3]) -> Region {
        let mut lo = [0; 3];
        let mut hi = [0; 3];
        for ax in 0..3 {
            lo[ax] = self.lo[ax] - origin[ax];
            hi[ax] = self.hi[ax] - origin[ax];
        }
        Region { lo, hi }
    }

    /// Slice argument for `ArrayBase::slice`/`slice_mut`.
    pub fn slice_info(&self) -> SliceInfo<[SliceInfoElem; 3], Ix3, Ix3> {
        s![
            self.lo[0]..self.hi[0],
            self.lo[1]..self.hi[1],
            self.lo[2]..self.hi[2]
        ]
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[({}, {}), ({}, {}), ({}, {})]",
            self.lo[0], self.hi[0], self.lo[1], self.hi[1], self.lo[2], self.hi[2]
        )
    }
}
