//! Core systems for Canopy.
//!
//! This crate provides the building blocks for strongly-typed, observable
//! tree models:
//!
//! - **Signal/Slot System**: Synchronous, failure-isolated notifications
//! - **Evented Models**: Declared fields that announce every real change
//! - **Parent Links**: Weak back-references from children to their owner
//! - **Parent-Aware Collections**: Lists and dictionaries that bind and unbind
//!   parent links, emit structural events and maintain lookup indices
//! - **Tree Composition**: Root/path resolution and lazy depth-first traversal
//!
//! # Listener Failures
//!
//! ```
//! use canopy_core::{Signal, SlotError};
//!
//! let saved = Signal::<u32>::new();
//! saved.try_connect(|&rev| Err(SlotError::from(format!("rejected revision {rev}"))));
//! saved.connect(|&rev| assert_eq!(rev, 7));
//!
//! // The second slot still ran; the failure comes back afterwards.
//! let failure = saved.emit(7).unwrap_err();
//! assert_eq!(failure.failed(), 1);
//! assert_eq!(failure.first().to_string(), "rejected revision 7");
//! ```
//!
//! # Model Example
//!
//! A node owns its collections and binds them to itself while it is being
//! constructed:
//!
//! ```ignore
//! impl Dataset {
//!     pub fn new(name: &str) -> Arc<Self> {
//!         Arc::new_cyclic(|weak| {
//!             let dataset = Self { /* fields */ };
//!             dataset.layers.set_parent(weak.clone());
//!             dataset.children.set_parent(weak.clone());
//!             dataset
//!         })
//!     }
//! }
//! ```
//!
//! Every element appended to `layers` then reports the dataset from
//! [`ParentAware::get_parent`] until it is removed again.

mod collection;
mod error;
pub mod logging;
mod model;
mod parent;
pub mod signal;
mod tree;

#[cfg(test)]
pub(crate) mod test_support;

pub use collection::{
    DictEvent, ListEvent, LookupKey, ParentAwareDict, ParentAwareList, ParentAwareListBuilder,
};
pub use error::{ModelError, ModelResult};
pub use logging::{PerfSpan, TreeDebug, TreeFormatOptions, TreeStyle};
pub use model::{AsAny, EventedModel, Field, FieldChanged, FieldValue, ModelBase, ModelId};
pub use parent::{ParentAware, ParentLink};
pub use signal::{ConnectionGuard, ConnectionId, ListenerFailure, Signal, SlotError};
pub use tree::{DeepClone, NestedParentAwareList, TreeIter, TreeNode, is_ancestor};
