//! Parent-aware collections.
//!
//! A collection belongs to exactly one owner and is the single strong holder
//! of its elements. While an element is held, its [`ParentLink`] points at the
//! owner; it is bound before the insertion is announced and cleared after the
//! removal is announced.
//!
//! # Key Types
//!
//! - [`ParentAwareList`] - Ordered list of models with named lookup indices
//! - [`ParentAwareListBuilder`] - Configures lookup indices for a list
//! - [`ParentAwareDict`] - Insertion-ordered mapping for flat metadata
//! - [`ListEvent`] / [`DictEvent`] - Structural change notifications
//!
//! [`ParentLink`]: crate::ParentLink

mod dict;
mod list;
mod lookup;

pub use dict::{DictEvent, ParentAwareDict};
pub use list::{ListEvent, ParentAwareList, ParentAwareListBuilder};
pub use lookup::LookupKey;
