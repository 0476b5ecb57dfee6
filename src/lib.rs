//! Voxel selection and undoable editing of nifti images.
//!
//! - [`coords`] maps between voxel, scaled voxel, world and custom display
//!   spaces.
//! - [`selection`] holds the 0/1 selection mask and its block-based change
//!   protocol, including bucket fill.
//! - [`editor`] and [`history`] record selection and value changes for
//!   undo/redo.

pub mod common;
pub mod coords;
pub mod editor;
pub mod error;
pub mod geometry;
pub mod history;
pub mod image;
pub mod selection;
pub mod signal;

pub use common::{Direction, Region};
pub use coords::{CoordSpace, DisplayBounds, DisplaySpace, Space, SpaceEvent};
pub use editor::{Editor, FillValues};
pub use error::{EditError, Result};
pub use geometry::ImageGeometry;
pub use history::{Change, ChangeHistory, HistoryEntry, Replay, ValueChange};
pub use image::{EditableImage, Image, ImageSource, OverlayList, SharedImage};
pub use selection::{Connectivity, SearchRadius, Selection, SelectionChange, ValueSearch};
pub use signal::{ListenerId, Signal};
