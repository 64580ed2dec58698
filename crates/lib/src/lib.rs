//!
//! sortview: live sorted and filtered views over keyed collections of mutable items.
//!
//! ## Core Concepts
//!
//! * **KeyedStore (`store::KeyedStore`)**: Unique key to item map. Owns identity and existence.
//! * **OrderedIndex (`index::OrderedIndex`)**: A `Vec` kept in comparator order, with bulk merge
//!   insertion and a binary search that tolerates elements whose position is stale.
//! * **Shaping (`shaping::SortOrder`, `shaping::Filter`)**: Typed comparator combinators and named
//!   predicates. Both record which item fields they read so the engine knows which change
//!   notifications matter.
//! * **Observable items (`observe::Observable`)**: Items report field changes through a callback
//!   registration interface; `observe::FieldNotifier` is a ready-made implementation.
//! * **LiveProjection (`projection::LiveProjection`)**: The ordered index plus dirty tracking and the
//!   filter partition. Repairs order incrementally as items change.
//! * **SingleWriter (`writer::SingleWriter`)**: Confines every mutation to one owner context.
//!   Other threads post closures and await a deferred result.
//! * **LiveView (`view::LiveView`)**: The host-facing handle. Composes the pieces above and
//!   republishes `ViewEvent`s to observers.

pub mod config;
pub mod index;
pub mod observe;
pub mod projection;
pub mod shaping;
pub mod store;
pub mod view;
pub mod writer;

pub use config::ViewConfig;
pub use observe::{FieldNotifier, Observable, SubscriptionId};
pub use shaping::{Direction, Filter, SortOrder};
pub use view::{LiveView, ViewEvent, ViewState};

/// Result type used throughout the sortview library.
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for the sortview library.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Structured errors from the keyed store
    #[error(transparent)]
    Store(store::StoreError),

    /// Structured errors from the single-writer channel
    #[error(transparent)]
    Writer(writer::WriterError),

    /// Structured errors from the view adapter
    #[error(transparent)]
    View(view::ViewError),
}

impl Error {
    /// Get the originating module for this error.
    pub fn module(&self) -> &'static str {
        match self {
            Error::Store(_) => "store",
            Error::Writer(_) => "writer",
            Error::View(_) => "view",
        }
    }

    /// Check if this error indicates a key or position was not found.
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::Store(store_err) => store_err.is_not_found(),
            Error::View(view_err) => view_err.is_out_of_range(),
            _ => false,
        }
    }

    /// Check if this error indicates a conflict (key already exists).
    pub fn is_conflict(&self) -> bool {
        match self {
            Error::Store(store_err) => store_err.is_duplicate_key(),
            _ => false,
        }
    }

    /// Check if this error is an invalid operation, such as reentrant mutation.
    pub fn is_invalid_operation(&self) -> bool {
        match self {
            Error::Writer(writer_err) => writer_err.is_reentrant(),
            _ => false,
        }
    }

    /// Check if this error means the owner context has shut down.
    pub fn is_closed(&self) -> bool {
        match self {
            Error::Writer(writer_err) => writer_err.is_closed(),
            _ => false,
        }
    }
}
