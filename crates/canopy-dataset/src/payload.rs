//! Opaque payload attached to a layer.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// An application object carried by a [`Layer`](crate::Layer) without
/// interpretation.
///
/// Payloads are shared, not copied: cloning a payload (or a layer through
/// [`Layer::from_layer`](crate::Layer::from_layer)) yields a handle to the same
/// object. Equality is identity.
#[derive(Clone)]
pub struct LayerPayload {
    inner: Arc<dyn Any + Send + Sync>,
    type_name: &'static str,
}

impl LayerPayload {
    /// Wrap a value.
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self::from_arc(Arc::new(value))
    }

    /// Wrap an already shared value without copying it.
    pub fn from_arc<T: Any + Send + Sync>(value: Arc<T>) -> Self {
        Self {
            inner: value,
            type_name: std::any::type_name::<T>(),
        }
    }

    /// Borrow the payload as `T`, if that is its type.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.inner.downcast_ref::<T>()
    }

    /// Name of the wrapped type.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Whether two handles refer to the same object.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl PartialEq for LayerPayload {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for LayerPayload {}

impl fmt::Debug for LayerPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("LayerPayload").field(&self.type_name).finish()
    }
}
