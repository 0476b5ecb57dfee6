//! Undo/redo bookkeeping.
//!
//! [`ChangeHistory`] only keeps track of what has been done; applying
//! changes to an image or selection is up to the [`crate::editor::Editor`].

use ndarray::{Array3, ArrayView3};
use std::rc::Rc;
use tracing::debug;

pub use crate::selection::SelectionChange;

/// A change to the voxel values of an image.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueChange {
    pub offset: [usize; 3],
    pub old: Array3<f64>,
    pub new: Array3<f64>,
    /// Volume of a 4D image the change was made to, `None` for 3D images.
    pub volume: Option<usize>,
}

/// Which way a change is being replayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Replay {
    Undo,
    Redo,
}

/// Anything that can be undone.
#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    Value(ValueChange),
    Selection(SelectionChange),
}

impl ValueChange {
    /// The values to write when replaying this change.
    pub fn values(&self, replay: Replay) -> ArrayView3<'_, f64> {
        match replay {
            Replay::Undo => self.old.view(),
            Replay::Redo => self.new.view(),
        }
    }
}

impl SelectionChange {
    /// The mask block to write when replaying this change.
    pub fn mask(&self, replay: Replay) -> ArrayView3<'_, u8> {
        match replay {
            Replay::Undo => self.old.view(),
            Replay::Redo => self.new.view(),
        }
    }
}

impl Change {
    pub fn offset(&self) -> [usize; 3] {
        match self {
            Change::Value(c) => c.offset,
            Change::Selection(c) => c.offset,
        }
    }
}

/// One undo step: a single change, or a group of changes which are undone
/// and redone together.
#[derive(Debug, Clone)]
pub enum HistoryEntry {
    Single(Rc<Change>),
    Group(Vec<Rc<Change>>),
}

impl HistoryEntry {
    pub fn changes(&self) -> &[Rc<Change>] {
        match self {
            HistoryEntry::Single(c) => std::slice::from_ref(c),
            HistoryEntry::Group(g) => g,
        }
    }
}

/// List of done and undone changes.
///
/// Entries up to and including the cursor have been done; entries after
/// it have been undone and can be redone until something new is recorded.
#[derive(Debug, Default)]
pub struct ChangeHistory {
    entries: Vec<HistoryEntry>,
    cursor: Option<usize>,
    in_group: bool,
}

impl ChangeHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries, done or undone.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Index of the most recently done entry.
    pub fn cursor(&self) -> Option<usize> {
        self.cursor
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    pub fn in_group(&self) -> bool {
        self.in_group
    }

    pub fn can_undo(&self) -> bool {
        self.cursor.is_some()
    }

    pub fn can_redo(&self) -> bool {
        self.next() < self.entries.len()
    }

    /// Records a change that has just been made. Anything undone is
    /// forgotten, unless a group is open, in which case the change joins it.
    pub fn record(&mut self, change: Change) {
        let change = Rc::new(change);
        if self.in_group {
            if let Some(HistoryEntry::Group(group)) = self.cursor.and_then(|c| self.entries.get_mut(c)) {
                group.push(change);
                debug!("New change in group ({} of {})", self.next() - 1, self.entries.len());
                return;
            }
        }
        self.push(HistoryEntry::Single(change));
        debug!("New change ({} of {})", self.next() - 1, self.entries.len());
    }

    /// Groups all changes recorded until [`ChangeHistory::end_group`] into a
    /// single undo step.
    pub fn start_group(&mut self) {
        self.push(HistoryEntry::Group(Vec::new()));
        self.in_group = true;
        debug!(
            "Starting change group - merging subsequent changes at index {} of {}",
            self.next() - 1,
            self.entries.len()
        );
    }

    pub fn end_group(&mut self) {
        self.in_group = false;
        debug!("Ending change group at {:?} of {}", self.cursor, self.entries.len());
    }

    /// Steps back over the most recently done entry, returning its changes
    /// in the order they must be reverted. Closes any open group.
    pub fn undo_step(&mut self) -> Option<Vec<Rc<Change>>> {
        let current = self.cursor?;
        debug!("Undo change {} of {}", current, self.entries.len());
        let changes = self.entries[current].changes().iter().rev().cloned().collect();
        self.cursor = current.checked_sub(1);
        self.in_group = false;
        Some(changes)
    }

    /// Steps forward over the next undone entry, returning its changes in
    /// the order they must be re-applied. Closes any open group.
    pub fn redo_step(&mut self) -> Option<Vec<Rc<Change>>> {
        let next = self.next();
        let entry = self.entries.get(next)?;
        debug!("Redo change {} of {}", next, self.entries.len());
        let changes = entry.changes().to_vec();
        self.cursor = Some(next);
        self.in_group = false;
        Some(changes)
    }

    fn next(&self) -> usize {
        self.cursor.map_or(0, |c| c + 1)
    }

    fn push(&mut self, entry: HistoryEntry) {
        self.entries.truncate(self.next());
        self.entries.push(entry);
        self.cursor = Some(self.entries.len() - 1);
    }
}
