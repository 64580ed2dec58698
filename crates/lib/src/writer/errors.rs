//! Error types for the single-writer channel.

use thiserror::Error;

/// Errors raised when handing work to the owner context.
#[non_exhaustive]
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum WriterError {
    /// The owner context has shut down; the job was dropped without running
    #[error("Writer owner context is closed")]
    Closed,

    /// A blocking call was made from inside the owner context it would wait on
    #[error("Blocking call from inside the owner context would deadlock")]
    Reentrant,
}

impl WriterError {
    /// Check if this error means the owner is gone
    pub fn is_closed(&self) -> bool {
        matches!(self, WriterError::Closed)
    }

    /// Check if this error means the call was made from the owner context
    pub fn is_reentrant(&self) -> bool {
        matches!(self, WriterError::Reentrant)
    }
}

impl From<WriterError> for crate::Error {
    fn from(err: WriterError) -> Self {
        crate::Error::Writer(err)
    }
}
