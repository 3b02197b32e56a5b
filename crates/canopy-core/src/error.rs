//! Error types for Canopy.

use crate::model::ModelId;
use crate::signal::ListenerFailure;

/// A specialized Result type for model and collection operations.
pub type ModelResult<T> = std::result::Result<T, ModelError>;

/// The error type for Canopy model and collection operations.
///
/// Every error except [`ModelError::ListenerFailure`] is raised before any
/// state changes. A listener failure is raised after the mutation has been
/// committed and every listener has run.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ModelError {
    /// A value does not have the declared element or field type.
    #[error("Type mismatch: expected {expected}, got {got}")]
    TypeMismatch {
        /// The declared type name.
        expected: &'static str,
        /// The type name that was provided.
        got: &'static str,
    },

    /// A lookup index has no entry for the requested key.
    #[error("No item with key {key} in lookup index '{index}'")]
    KeyNotFound {
        /// Name of the lookup index.
        index: String,
        /// Debug rendering of the missing key.
        key: String,
    },

    /// The collection has no lookup index with this name.
    #[error("Unknown lookup index '{0}'")]
    UnknownIndex(String),

    /// Inserting would give two elements the same lookup key.
    #[error("Key {key} is already taken in lookup index '{index}'")]
    DuplicateKey {
        /// Name of the lookup index.
        index: String,
        /// Debug rendering of the colliding key.
        key: String,
    },

    /// The element is already held by this collection.
    #[error("Item {0} is already in this collection")]
    DuplicateItem(ModelId),

    /// The model declares no field with this name.
    #[error("Unknown field '{0}'")]
    UnknownField(String),

    /// A positional access was past the end of the collection.
    #[error("Index {index} out of range for collection of length {len}")]
    IndexOutOfRange {
        /// The requested position.
        index: usize,
        /// The collection length at the time of the call.
        len: usize,
    },

    /// The element is not held by this collection.
    #[error("Item not found in collection")]
    ItemNotFound,

    /// A listener failed while a committed change was being announced.
    #[error(transparent)]
    ListenerFailure(#[from] ListenerFailure),
}

impl ModelError {
    /// Create a type mismatch error for the expected type `T`.
    pub fn type_mismatch<T: ?Sized>(got: &'static str) -> Self {
        Self::TypeMismatch {
            expected: std::any::type_name::<T>(),
            got,
        }
    }

    /// Returns `true` if the state change was committed before the error.
    pub fn is_committed(&self) -> bool {
        matches!(self, Self::ListenerFailure(_))
    }
}

/// Keep the first error of a batch while letting the batch run to completion.
pub(crate) fn keep_first<E: Into<ModelError>>(
    result: &mut ModelResult<()>,
    outcome: Result<(), E>,
) {
    if let Err(err) = outcome {
        if result.is_ok() {
            *result = Err(err.into());
        }
    }
}
