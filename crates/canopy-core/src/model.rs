//! Evented models for Canopy.
//!
//! A model is a struct with a closed, declared set of [`Field`]s and a
//! [`ModelBase`]. Writing a field through [`ModelBase::set`] compares the new
//! value with the current one and, only when it differs, emits exactly one
//! [`FieldChanged`] event on the model's `field_changed` signal before
//! returning.
//!
//! # Key Types
//!
//! - [`EventedModel`] - Trait every model implements
//! - [`ModelBase`] - Identity plus change signal, embedded in each model
//! - [`Field<T>`] - A named, observable value cell
//! - [`FieldValue`] - Type-erased field value carried by events
//! - [`ModelId`] - Per-instance identity used for equality and hashing
//!
//! # Example
//!
//! ```
//! use canopy_core::{EventedModel, Field, FieldValue, ModelBase, ModelError, ModelResult};
//!
//! struct Counter {
//!     base: ModelBase,
//!     value: Field<i32>,
//! }
//!
//! impl EventedModel for Counter {
//!     fn base(&self) -> &ModelBase {
//!         &self.base
//!     }
//!
//!     fn field_names(&self) -> &'static [&'static str] {
//!         &["value"]
//!     }
//!
//!     fn field_value(&self, name: &str) -> ModelResult<FieldValue> {
//!         match name {
//!             "value" => Ok(self.value.value()),
//!             _ => Err(ModelError::UnknownField(name.to_string())),
//!         }
//!     }
//!
//!     fn set_field_value(&self, name: &str, value: FieldValue) -> ModelResult<bool> {
//!         match name {
//!             "value" => self.base.set_dyn(&self.value, value),
//!             _ => Err(ModelError::UnknownField(name.to_string())),
//!         }
//!     }
//! }
//!
//! let counter = Counter { base: ModelBase::new(), value: Field::new("value", 0) };
//! counter.field_changed().connect(|change| println!("{} changed", change.field));
//! assert!(counter.base.set(&counter.value, 1).unwrap());
//! assert!(!counter.base.set(&counter.value, 1).unwrap());
//! ```

use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

use crate::error::{ModelError, ModelResult};
use crate::logging::targets;
use crate::signal::Signal;

/// Counter for allocating model identities.
static NEXT_MODEL_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a single model instance.
///
/// Two models with identical field values are still distinct entities; all
/// equality, hashing and membership checks go through this identity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModelId(u64);

impl ModelId {
    fn next() -> Self {
        Self(NEXT_MODEL_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Convert the ModelId to a raw u64 value.
    #[inline]
    pub fn as_raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Upcasting helpers implemented for every `Send + Sync + 'static` type.
///
/// This is a supertrait of [`EventedModel`] so that `dyn EventedModel` values
/// can be downcast back into their concrete type.
pub trait AsAny: Any + Send + Sync {
    /// Borrow as `&dyn Any`.
    fn as_any(&self) -> &dyn Any;

    /// Convert an `Arc<Self>` into an `Arc<dyn Any>` for downcasting.
    fn into_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;

    /// The concrete type name.
    fn type_name(&self) -> &'static str;
}

impl<T: Any + Send + Sync> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }
}

/// A type-erased, cheaply cloneable field value.
#[derive(Clone)]
pub struct FieldValue {
    value: Arc<dyn Any + Send + Sync>,
    type_name: &'static str,
}

impl FieldValue {
    /// Wrap a value.
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self {
            value: Arc::new(value),
            type_name: std::any::type_name::<T>(),
        }
    }

    /// Borrow the value as `T`, if that is its type.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.value.downcast_ref::<T>()
    }

    /// Check whether the value has type `T`.
    pub fn is<T: Any>(&self) -> bool {
        self.value.is::<T>()
    }

    /// Name of the wrapped value's type.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Clone the value out as `T`, failing with [`ModelError::TypeMismatch`].
    pub fn to_typed<T: Any + Clone>(&self) -> ModelResult<T> {
        self.downcast_ref::<T>()
            .cloned()
            .ok_or_else(|| ModelError::type_mismatch::<T>(self.type_name))
    }
}

impl fmt::Debug for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldValue")
            .field("type_name", &self.type_name)
            .finish_non_exhaustive()
    }
}

/// Event emitted when a model field changes value.
#[derive(Clone, Debug)]
pub struct FieldChanged {
    /// The model whose field changed.
    pub model: ModelId,
    /// The declared field name.
    pub field: &'static str,
    /// The value before the write.
    pub old: FieldValue,
    /// The value after the write.
    pub new: FieldValue,
}

/// A named, declared value cell on a model.
///
/// `Field<T>` only stores the value; writes that notify go through
/// [`ModelBase::set`]. Change detection uses `PartialEq`.
pub struct Field<T> {
    name: &'static str,
    value: RwLock<T>,
}

impl<T: Clone> Field<T> {
    /// Declare a field with its initial value.
    pub fn new(name: &'static str, value: T) -> Self {
        Self {
            name,
            value: RwLock::new(value),
        }
    }

    /// The declared field name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Get the current value.
    ///
    /// This clones the value. For large types, consider using `with()` instead.
    pub fn get(&self) -> T {
        self.value.read().clone()
    }

    /// Access the value through a closure without cloning.
    pub fn with<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&T) -> R,
    {
        f(&self.value.read())
    }
}

impl<T: Clone + Send + Sync + 'static> Field<T> {
    /// The current value, type-erased.
    pub fn value(&self) -> FieldValue {
        FieldValue::new(self.get())
    }
}

impl<T: Clone + PartialEq> Field<T> {
    /// Store `value`, returning the old value only if it changed.
    fn replace(&self, value: T) -> Option<T> {
        let mut current = self.value.write();
        if *current != value {
            Some(std::mem::replace(&mut *current, value))
        } else {
            None
        }
    }
}

impl<T: Clone + fmt::Debug> fmt::Debug for Field<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Field")
            .field("name", &self.name)
            .field("value", &*self.value.read())
            .finish()
    }
}

#[cfg(feature = "serde")]
impl<T: serde::Serialize> serde::Serialize for Field<T> {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.value.read().serialize(serializer)
    }
}

/// Identity and change notification shared by every model.
///
/// Include this as a field in your model types, the way a widget embeds its
/// object base.
pub struct ModelBase {
    id: ModelId,
    field_changed: Signal<FieldChanged>,
}

impl ModelBase {
    /// Create a base with a fresh identity.
    pub fn new() -> Self {
        let id = ModelId::next();
        tracing::trace!(target: targets::MODEL, %id, "created model");
        Self {
            id,
            field_changed: Signal::new(),
        }
    }

    /// The model's identity.
    pub fn id(&self) -> ModelId {
        self.id
    }

    /// Signal emitted after any field of this model changes.
    pub fn field_changed(&self) -> &Signal<FieldChanged> {
        &self.field_changed
    }

    /// Write `value` into `field`.
    ///
    /// Returns `Ok(false)` without emitting anything when the value is equal
    /// to the current one. Otherwise the value is stored and a single
    /// [`FieldChanged`] event is delivered to every listener before this
    /// returns. A listener failure is reported after the value is committed.
    pub fn set<T>(&self, field: &Field<T>, value: T) -> ModelResult<bool>
    where
        T: Clone + PartialEq + Send + Sync + 'static,
    {
        let new = value.clone();
        let Some(old) = field.replace(value) else {
            return Ok(false);
        };
        tracing::trace!(
            target: targets::MODEL,
            id = %self.id,
            field = field.name(),
            "field changed"
        );
        self.field_changed.emit(FieldChanged {
            model: self.id,
            field: field.name(),
            old: FieldValue::new(old),
            new: FieldValue::new(new),
        })?;
        Ok(true)
    }

    /// Write a type-erased value, checking it against the field's type.
    pub fn set_dyn<T>(&self, field: &Field<T>, value: FieldValue) -> ModelResult<bool>
    where
        T: Clone + PartialEq + Send + Sync + 'static,
    {
        let value = value.to_typed::<T>()?;
        self.set(field, value)
    }
}

impl Default for ModelBase {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ModelBase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelBase").field("id", &self.id).finish()
    }
}

/// The base trait that all models implement.
///
/// Implementors expose their declared fields by name so that observers and
/// persistence layers can read them without knowing the concrete type.
/// Parent links are never part of the declared fields.
pub trait EventedModel: AsAny {
    /// The embedded model base.
    fn base(&self) -> &ModelBase;

    /// Declared field names, in declaration order.
    fn field_names(&self) -> &'static [&'static str];

    /// Read a declared field.
    fn field_value(&self, name: &str) -> ModelResult<FieldValue>;

    /// Write a declared field, returning whether the value changed.
    ///
    /// Fails with [`ModelError::TypeMismatch`] when `value` has the wrong type
    /// and [`ModelError::UnknownField`] for undeclared names.
    fn set_field_value(&self, name: &str, value: FieldValue) -> ModelResult<bool>;

    /// This model's identity.
    fn model_id(&self) -> ModelId {
        self.base().id()
    }

    /// Signal emitted after any field of this model changes.
    fn field_changed(&self) -> &Signal<FieldChanged> {
        self.base().field_changed()
    }
}

/// Implement `PartialEq`, `Eq` and `Hash` for a model type by identity.
///
/// ```ignore
/// canopy_core::impl_identity_eq!(Dataset);
/// ```
#[macro_export]
macro_rules! impl_identity_eq {
    ($ty:ty) => {
        impl ::std::cmp::PartialEq for $ty {
            fn eq(&self, other: &Self) -> bool {
                $crate::EventedModel::model_id(self) == $crate::EventedModel::model_id(other)
            }
        }

        impl ::std::cmp::Eq for $ty {}

        impl ::std::hash::Hash for $ty {
            fn hash<H: ::std::hash::Hasher>(&self, state: &mut H) {
                ::std::hash::Hash::hash(&$crate::EventedModel::model_id(self), state)
            }
        }
    };
}

static_assertions::assert_impl_all!(ModelBase: Send, Sync);
static_assertions::assert_impl_all!(Field<String>: Send, Sync);
