//! Change events describing how the visible sequence changed.

use std::{fmt, sync::Arc};

/// One structural change to the visible sequence.
///
/// Indices refer to the sequence as it was immediately before the event, so a
/// listener that applies each event in order to its own copy stays in sync.
pub enum ChangeEvent<T> {
    /// `item` was inserted at `index`.
    Added { item: Arc<T>, index: usize },
    /// `item` was removed from `index`.
    Removed { item: Arc<T>, index: usize },
    /// `item` was taken out at `from` and reinserted at `to`.
    Moved { item: Arc<T>, from: usize, to: usize },
    /// The sequence changed wholesale; listeners must re-read it.
    Reset,
}

impl<T> Clone for ChangeEvent<T> {
    fn clone(&self) -> Self {
        match self {
            Self::Added { item, index } => Self::Added {
                item: Arc::clone(item),
                index: *index,
            },
            Self::Removed { item, index } => Self::Removed {
                item: Arc::clone(item),
                index: *index,
            },
            Self::Moved { item, from, to } => Self::Moved {
                item: Arc::clone(item),
                from: *from,
                to: *to,
            },
            Self::Reset => Self::Reset,
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for ChangeEvent<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Added { item, index } => f
                .debug_struct("Added")
                .field("item", item)
                .field("index", index)
                .finish(),
            Self::Removed { item, index } => f
                .debug_struct("Removed")
                .field("item", item)
                .field("index", index)
                .finish(),
            Self::Moved { item, from, to } => f
                .debug_struct("Moved")
                .field("item", item)
                .field("from", from)
                .field("to", to)
                .finish(),
            Self::Reset => write!(f, "Reset"),
        }
    }
}

impl<T> ChangeEvent<T> {
    /// The item this event concerns, if any.
    pub fn item(&self) -> Option<&Arc<T>> {
        match self {
            Self::Added { item, .. } | Self::Removed { item, .. } | Self::Moved { item, .. } => {
                Some(item)
            }
            Self::Reset => None,
        }
    }

    pub fn is_reset(&self) -> bool {
        matches!(self, Self::Reset)
    }

    /// Apply this event to a mirror of the visible sequence.
    ///
    /// Returns `false` for [`ChangeEvent::Reset`], after which the mirror must
    /// be rebuilt from the view.
    ///
    /// # Panics
    /// Panics if an index is out of range for `mirror`, which means the mirror
    /// has diverged from the view.
    pub fn apply(&self, mirror: &mut Vec<Arc<T>>) -> bool {
        match self {
            Self::Added { item, index } => mirror.insert(*index, Arc::clone(item)),
            Self::Removed { index, .. } => {
                mirror.remove(*index);
            }
            Self::Moved { from, to, .. } => {
                let moved = mirror.remove(*from);
                mirror.insert(*to, moved);
            }
            Self::Reset => return false,
        }
        true
    }
}
