//! Non-owning back-references from a model to its owner.
//!
//! The owner holds its children strongly through a collection; the child only
//! holds a [`ParentLink`], which stores a `Weak` reference. Dropping the owner
//! therefore never leaks through a cycle, and a child whose owner is gone
//! simply reports no parent.
//!
//! Links are written only by the collections in this crate. Application code
//! reads them through [`ParentAware::get_parent`].

use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::RwLock;

use crate::logging::targets;
use crate::model::EventedModel;

/// A single optional back-reference to a parent of type `P`.
///
/// Parent links are not part of a model's declared fields: they are never
/// reported by [`EventedModel::field_names`], never serialized and never
/// compared.
pub struct ParentLink<P> {
    parent: RwLock<Weak<P>>,
}

impl<P> ParentLink<P> {
    /// Create an unset link.
    pub fn new() -> Self {
        Self {
            parent: RwLock::new(Weak::new()),
        }
    }

    /// The current parent, if one is set and still alive.
    pub fn get(&self) -> Option<Arc<P>> {
        self.parent.read().upgrade()
    }

    /// Whether a live parent is set.
    pub fn is_set(&self) -> bool {
        self.parent.read().strong_count() > 0
    }

    /// Whether the link points at `parent`.
    pub fn is_parent(&self, parent: &Weak<P>) -> bool {
        let current = self.parent.read();
        current.strong_count() > 0 && Weak::ptr_eq(&current, parent)
    }

    /// Point the link at `parent`.
    ///
    /// Returns `false` if it already pointed there. Setting a different parent
    /// does not detach the node from the previous parent's collection.
    pub(crate) fn set(&self, parent: &Weak<P>) -> bool {
        let mut current = self.parent.write();
        if Weak::ptr_eq(&current, parent) {
            return false;
        }
        *current = parent.clone();
        tracing::trace!(target: targets::MODEL, "parent link set");
        true
    }

    /// Clear the link. Returns `false` if no live parent was set.
    pub(crate) fn clear(&self) -> bool {
        let previous = std::mem::take(&mut *self.parent.write());
        let was_set = previous.strong_count() > 0;
        if was_set {
            tracing::trace!(target: targets::MODEL, "parent link cleared");
        }
        was_set
    }

    /// Clear the link only if it still points at `parent`.
    ///
    /// A node that has since been bound elsewhere keeps its new parent.
    pub(crate) fn clear_if(&self, parent: &Weak<P>) -> bool {
        if !Weak::ptr_eq(&self.parent.read(), parent) {
            return false;
        }
        self.clear()
    }
}

impl<P> Default for ParentLink<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P> fmt::Debug for ParentLink<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParentLink")
            .field("set", &self.is_set())
            .finish()
    }
}

/// A model that can be held by a parent-aware collection.
///
/// # Example
///
/// ```
/// use canopy_core::{EventedModel, FieldValue, ModelBase, ModelError, ModelResult};
/// use canopy_core::{ParentAware, ParentLink};
///
/// struct Owner;
///
/// struct Child {
///     base: ModelBase,
///     parent: ParentLink<Owner>,
/// }
///
/// impl EventedModel for Child {
///     fn base(&self) -> &ModelBase {
///         &self.base
///     }
///     fn field_names(&self) -> &'static [&'static str] {
///         &[]
///     }
///     fn field_value(&self, name: &str) -> ModelResult<FieldValue> {
///         Err(ModelError::UnknownField(name.to_string()))
///     }
///     fn set_field_value(&self, name: &str, _: FieldValue) -> ModelResult<bool> {
///         Err(ModelError::UnknownField(name.to_string()))
///     }
/// }
///
/// impl ParentAware for Child {
///     type Parent = Owner;
///     fn parent_link(&self) -> &ParentLink<Owner> {
///         &self.parent
///     }
/// }
///
/// let child = Child { base: ModelBase::new(), parent: ParentLink::new() };
/// assert!(child.get_parent().is_none());
/// ```
pub trait ParentAware: EventedModel {
    /// The owner type this model may be attached to.
    type Parent: Send + Sync + 'static;

    /// The model's back-reference.
    fn parent_link(&self) -> &ParentLink<Self::Parent>;

    /// The current owner, if attached.
    fn get_parent(&self) -> Option<Arc<Self::Parent>> {
        self.parent_link().get()
    }
}

static_assertions::assert_impl_all!(ParentLink<String>: Send, Sync);
