//! Typed change notification.
//!
//! A [`Signal`] holds callbacks which are invoked, in connection order,
//! every time a value is emitted. Callbacks capture shared state through
//! `Rc<RefCell<_>>` since everything here runs on one thread.

use std::fmt;

use crate::error::{EditError, Result};

/// Identifies a connected listener so it can later be disconnected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(usize);

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub struct Signal<T> {
    listeners: Vec<(ListenerId, Box<dyn FnMut(&T)>)>,
    next_id: usize,
}

impl<T> Signal<T> {
    pub fn new() -> Self {
        Self {
            listeners: Vec::new(),
            next_id: 0,
        }
    }

    /// Connects a callback, returning the handle used to disconnect it.
    pub fn connect<F>(&mut self, f: F) -> ListenerId
    where
        F: FnMut(&T) + 'static,
    {
        let id = ListenerId(self.next_id);
        self.next_id += 1;
        self.listeners.push((id, Box::new(f)));
        id
    }

    pub fn disconnect(&mut self, id: ListenerId) -> Result<()> {
        match self.listeners.iter().position(|(lid, _)| *lid == id) {
            Some(pos) => {
                self.listeners.remove(pos);
                Ok(())
            }
            None => Err(EditError::ListenerNotFound(id.0)),
        }
    }

    pub fn emit(&mut self, value: &T) {
        for (_, f) in self.listeners.iter_mut() {
            f(value);
        }
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}

impl<T> Default for Signal<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Signal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("listeners", &self.listeners.len())
            .finish()
    }
}
