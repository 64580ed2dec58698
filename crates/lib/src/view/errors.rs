//! Error types for view access.

use thiserror::Error;

/// Errors raised by [`ViewState`](super::ViewState) and [`LiveView`](super::LiveView) reads.
#[non_exhaustive]
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ViewError {
    /// Positional access past the end of the visible sequence
    #[error("Index {index} out of range for view of length {len}")]
    IndexOutOfRange { index: usize, len: usize },
}

impl ViewError {
    /// Check if this error is a positional lookup miss
    pub fn is_out_of_range(&self) -> bool {
        matches!(self, ViewError::IndexOutOfRange { .. })
    }
}

impl From<ViewError> for crate::Error {
    fn from(err: ViewError) -> Self {
        crate::Error::View(err)
    }
}
