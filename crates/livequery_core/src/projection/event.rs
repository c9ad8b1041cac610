//! Structural change events delivered to presentation subscribers.
//!
//! Events in one batch are ordered: each index refers to the layout produced
//! by applying every earlier event of the same batch. There is no move
//! event; a position change is always a delete followed by an insert.

use std::fmt::{Display, Formatter};

/// Kind of single-record mutation fed into a projection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// Section/row coordinate inside a projection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct IndexPath {
    pub section: usize,
    pub row: usize,
}

impl IndexPath {
    pub fn new(section: usize, row: usize) -> Self {
        Self { section, row }
    }
}

impl Display for IndexPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {}]", self.section, self.row)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeEvent {
    InsertSection { index: usize },
    DeleteSection { index: usize },
    InsertRow { path: IndexPath },
    DeleteRow { path: IndexPath },
    /// Record changed without moving.
    UpdateRow { path: IndexPath },
}
