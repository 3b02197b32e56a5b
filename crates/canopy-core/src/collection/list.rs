//! Ordered, observable list that keeps its elements' parent links bound to
//! the list's owner.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::marker::PhantomData;
use std::sync::{Arc, Weak};

use parking_lot::RwLock;

use super::lookup::{ErasedIndex, LookupIndex, LookupKey};
use crate::error::{ModelError, ModelResult, keep_first};
use crate::logging::targets;
use crate::model::{AsAny, EventedModel, FieldChanged, ModelId};
use crate::parent::ParentAware;
use crate::signal::{ConnectionGuard, Signal, SlotError};

/// Structural change announced by a [`ParentAwareList`].
pub enum ListEvent<E> {
    /// `item` was inserted at `index`.
    Added {
        /// Position of the new element.
        index: usize,
        /// The inserted element.
        item: Arc<E>,
    },
    /// `item` was removed from `index`. Its parent link is still set while
    /// this event is delivered.
    Removed {
        /// Former position of the element.
        index: usize,
        /// The removed element.
        item: Arc<E>,
    },
    /// The element at `index` was swapped for another.
    Replaced {
        /// Position of the swap.
        index: usize,
        /// The element that left the list.
        old: Arc<E>,
        /// The element that took its place.
        new: Arc<E>,
    },
    /// An element changed position.
    Moved {
        /// Previous position.
        from: usize,
        /// New position.
        to: usize,
        /// The moved element.
        item: Arc<E>,
    },
}

impl<E> Clone for ListEvent<E> {
    fn clone(&self) -> Self {
        match self {
            Self::Added { index, item } => Self::Added {
                index: *index,
                item: Arc::clone(item),
            },
            Self::Removed { index, item } => Self::Removed {
                index: *index,
                item: Arc::clone(item),
            },
            Self::Replaced { index, old, new } => Self::Replaced {
                index: *index,
                old: Arc::clone(old),
                new: Arc::clone(new),
            },
            Self::Moved { from, to, item } => Self::Moved {
                from: *from,
                to: *to,
                item: Arc::clone(item),
            },
        }
    }
}

impl<E: EventedModel> fmt::Debug for ListEvent<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Added { index, item } => f
                .debug_struct("Added")
                .field("index", index)
                .field("item", &item.model_id())
                .finish(),
            Self::Removed { index, item } => f
                .debug_struct("Removed")
                .field("index", index)
                .field("item", &item.model_id())
                .finish(),
            Self::Replaced { index, old, new } => f
                .debug_struct("Replaced")
                .field("index", index)
                .field("old", &old.model_id())
                .field("new", &new.model_id())
                .finish(),
            Self::Moved { from, to, item } => f
                .debug_struct("Moved")
                .field("from", from)
                .field("to", to)
                .field("item", &item.model_id())
                .finish(),
        }
    }
}

struct ListState<O, E> {
    owner: Weak<O>,
    items: Vec<Arc<E>>,
    /// Identities of `items`.
    members: HashSet<ModelId>,
    indices: Vec<Box<dyn ErasedIndex<E>>>,
    /// Field-change subscriptions used to keep keys current.
    watches: HashMap<ModelId, ConnectionGuard<FieldChanged>>,
}

impl<O, E> ListState<O, E>
where
    O: Send + Sync + 'static,
    E: ParentAware<Parent = O>,
{
    fn position(&self, id: ModelId) -> Option<usize> {
        if !self.members.contains(&id) {
            return None;
        }
        self.items.iter().position(|item| item.model_id() == id)
    }

    fn index(&self, name: &str) -> ModelResult<&dyn ErasedIndex<E>> {
        self.indices
            .iter()
            .find(|index| index.name() == name)
            .map(|index| &**index)
            .ok_or_else(|| ModelError::UnknownIndex(name.to_string()))
    }

    fn typed_index<K: LookupKey>(&self, name: &str) -> ModelResult<&LookupIndex<E, K>> {
        let index = self.index(name)?;
        index
            .as_any()
            .downcast_ref::<LookupIndex<E, K>>()
            .ok_or_else(|| ModelError::TypeMismatch {
                expected: index.key_type(),
                got: std::any::type_name::<K>(),
            })
    }

    /// Check identity and key uniqueness for a batch about to be inserted.
    fn validate(&self, incoming: &[Arc<E>], outgoing: Option<ModelId>) -> ModelResult<()> {
        let mut seen = HashSet::with_capacity(incoming.len());
        for item in incoming {
            let id = item.model_id();
            let held_elsewhere = self.members.contains(&id) && Some(id) != outgoing;
            if held_elsewhere || !seen.insert(id) {
                return Err(ModelError::DuplicateItem(id));
            }
        }
        for index in &self.indices {
            index.validate(incoming, outgoing)?;
        }
        Ok(())
    }

    /// Index, watch and bind an element that has just entered `items`.
    fn attach(&mut self, item: &Arc<E>, state: &Weak<RwLock<Self>>) {
        self.members.insert(item.model_id());
        for index in &mut self.indices {
            index.insert(item);
        }
        if !self.indices.is_empty() {
            let guard = watch(state.clone(), item);
            self.watches.insert(item.model_id(), guard);
        }
        item.parent_link().set(&self.owner);
    }

    /// Drop index entries and the watch of an element that left `items`.
    ///
    /// The parent link is left alone; it is cleared after the removal event.
    fn detach(&mut self, item: &E) {
        self.members.remove(&item.model_id());
        for index in &mut self.indices {
            index.remove(item);
        }
        self.watches.remove(&item.model_id());
    }

    /// Clear the parent link of an element that left `items`, unless a
    /// listener has already put it back.
    fn unbind_if_absent(&self, item: &E) {
        if !self.members.contains(&item.model_id()) {
            item.parent_link().clear_if(&self.owner);
        }
    }

    fn rekey(&mut self, item: &Arc<E>) -> ModelResult<()> {
        if !self.members.contains(&item.model_id()) {
            return Ok(());
        }
        let mut result = Ok(());
        for index in &mut self.indices {
            keep_first(&mut result, index.rekey(item));
        }
        result
    }
}

/// Subscribe to an element's field changes so its lookup keys follow renames.
fn watch<O, E>(
    state: Weak<RwLock<ListState<O, E>>>,
    item: &Arc<E>,
) -> ConnectionGuard<FieldChanged>
where
    O: Send + Sync + 'static,
    E: ParentAware<Parent = O>,
{
    let weak_item = Arc::downgrade(item);
    item.field_changed().try_connect_scoped(move |_| {
        let (Some(state), Some(item)) = (state.upgrade(), weak_item.upgrade()) else {
            return Ok(());
        };
        let outcome = state.write().rekey(&item);
        outcome.map_err(|err| Box::new(err) as SlotError)
    })
}

/// Observable, ordered collection of models owned by an `O`.
///
/// Every element's parent link points at the owner for as long as the
/// element is held. Mutations emit [`ListEvent`]s on [`events`](Self::events)
/// synchronously, after the state change is committed and with no lock held.
///
/// Elements are compared by identity: the same element may not appear twice.
///
/// # Example
///
/// ```ignore
/// let layers = ParentAwareList::<Dataset, Layer>::builder()
///     .lookup("name", |layer: &Layer| layer.name())
///     .build();
/// layers.append(Layer::new("roads"))?;
/// let roads = layers.get_by_str("name", "roads")?;
/// ```
pub struct ParentAwareList<O, E> {
    state: Arc<RwLock<ListState<O, E>>>,
    events: Signal<ListEvent<E>>,
}

impl<O, E> ParentAwareList<O, E>
where
    O: Send + Sync + 'static,
    E: ParentAware<Parent = O>,
{
    /// Create an empty list with no owner and no lookup indices.
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Start configuring a list.
    pub fn builder() -> ParentAwareListBuilder<O, E> {
        ParentAwareListBuilder::new()
    }

    /// Signal carrying every structural change.
    pub fn events(&self) -> &Signal<ListEvent<E>> {
        &self.events
    }

    /// Bind the list to its owner and re-point every held element at it.
    ///
    /// Called from the owner's constructor. Binding the same owner again is a
    /// no-op. No events are emitted.
    pub fn set_parent(&self, owner: Weak<O>) {
        let mut state = self.state.write();
        if Weak::ptr_eq(&state.owner, &owner) {
            return;
        }
        tracing::trace!(
            target: targets::COLLECTION,
            items = state.items.len(),
            "binding list owner"
        );
        for item in &state.items {
            item.parent_link().set(&owner);
        }
        state.owner = owner;
    }

    /// The owner, if bound and alive.
    pub fn owner(&self) -> Option<Arc<O>> {
        self.state.read().owner.upgrade()
    }

    /// Append one element.
    pub fn append(&self, item: Arc<E>) -> ModelResult<()> {
        self.insert_batch(None, vec![item])
    }

    /// Append several elements, preserving their order.
    ///
    /// The whole batch is validated first; on error nothing is inserted.
    pub fn extend<I>(&self, items: I) -> ModelResult<()>
    where
        I: IntoIterator<Item = Arc<E>>,
    {
        self.insert_batch(None, items.into_iter().collect())
    }

    /// Insert an element at `index`, clamped to the list length.
    pub fn insert(&self, index: usize, item: Arc<E>) -> ModelResult<()> {
        self.insert_batch(Some(index), vec![item])
    }

    /// Append a type-erased model, which must be an `E`.
    pub fn append_dyn(&self, item: Arc<dyn EventedModel>) -> ModelResult<()> {
        let got = AsAny::type_name(&*item);
        let item = item
            .into_any_arc()
            .downcast::<E>()
            .map_err(|_| ModelError::type_mismatch::<E>(got))?;
        self.append(item)
    }

    fn insert_batch(&self, at: Option<usize>, items: Vec<Arc<E>>) -> ModelResult<()> {
        if items.is_empty() {
            return Ok(());
        }

        let start = {
            let mut state = self.state.write();
            state.validate(&items, None)?;

            let len = state.items.len();
            let start = at.map_or(len, |index| index.min(len));
            let weak_state = Arc::downgrade(&self.state);
            for (offset, item) in items.iter().enumerate() {
                state.items.insert(start + offset, Arc::clone(item));
                state.attach(item, &weak_state);
            }
            start
        };
        tracing::trace!(target: targets::COLLECTION, start, count = items.len(), "inserted items");

        let mut result = Ok(());
        for (offset, item) in items.into_iter().enumerate() {
            let emitted = self.events.emit(ListEvent::Added {
                index: start + offset,
                item,
            });
            keep_first(&mut result, emitted);
        }
        result
    }

    /// Remove `item`, identified by identity.
    pub fn remove(&self, item: &E) -> ModelResult<Arc<E>> {
        let index = self.index_of(item).ok_or(ModelError::ItemNotFound)?;
        self.pop(index)
    }

    /// Remove and return the element at `index`.
    ///
    /// Listeners of the [`ListEvent::Removed`] event still see the element's
    /// parent link set; it is cleared once they have all run, unless one of
    /// them put the element back.
    pub fn pop(&self, index: usize) -> ModelResult<Arc<E>> {
        let item = {
            let mut state = self.state.write();
            let len = state.items.len();
            if index >= len {
                return Err(ModelError::IndexOutOfRange { index, len });
            }
            let item = state.items.remove(index);
            state.detach(&item);
            item
        };
        tracing::trace!(target: targets::COLLECTION, index, id = %item.model_id(), "removed item");

        let emitted = self.events.emit(ListEvent::Removed {
            index,
            item: Arc::clone(&item),
        });
        self.state.read().unbind_if_absent(&item);
        emitted?;
        Ok(item)
    }

    /// Put `item` at `index`, returning the element it displaced.
    ///
    /// `item` may reuse the lookup keys of the element it replaces.
    pub fn replace(&self, index: usize, item: Arc<E>) -> ModelResult<Arc<E>> {
        let old = {
            let mut state = self.state.write();
            let len = state.items.len();
            let Some(old) = state.items.get(index).cloned() else {
                return Err(ModelError::IndexOutOfRange { index, len });
            };
            if Arc::ptr_eq(&old, &item) {
                return Ok(old);
            }
            state.validate(std::slice::from_ref(&item), Some(old.model_id()))?;

            // Attach first so a key shared with `old` passes straight to `item`.
            state.items[index] = Arc::clone(&item);
            let weak_state = Arc::downgrade(&self.state);
            state.attach(&item, &weak_state);
            state.detach(&old);
            old
        };
        tracing::trace!(
            target: targets::COLLECTION,
            index,
            old = %old.model_id(),
            new = %item.model_id(),
            "replaced item"
        );

        let emitted = self.events.emit(ListEvent::Replaced {
            index,
            old: Arc::clone(&old),
            new: item,
        });
        self.state.read().unbind_if_absent(&old);
        emitted?;
        Ok(old)
    }

    /// Move the element at `from` to position `to`.
    ///
    /// Parent links and lookup indices are untouched.
    pub fn move_item(&self, from: usize, to: usize) -> ModelResult<()> {
        let item = {
            let mut state = self.state.write();
            let len = state.items.len();
            for index in [from, to] {
                if index >= len {
                    return Err(ModelError::IndexOutOfRange { index, len });
                }
            }
            if from == to {
                return Ok(());
            }
            let item = state.items.remove(from);
            state.items.insert(to, Arc::clone(&item));
            item
        };
        tracing::trace!(target: targets::COLLECTION, from, to, "moved item");

        self.events.emit(ListEvent::Moved { from, to, item })?;
        Ok(())
    }

    /// Remove every element, last first, announcing each removal.
    pub fn clear(&self) -> ModelResult<()> {
        let mut result = Ok(());
        for _ in 0..self.len() {
            let Some(last) = self.len().checked_sub(1) else {
                break;
            };
            keep_first(&mut result, self.pop(last).map(drop));
        }
        result
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.state.read().items.len()
    }

    /// Whether the list is empty.
    pub fn is_empty(&self) -> bool {
        self.state.read().items.is_empty()
    }

    /// The element at `index`.
    pub fn get(&self, index: usize) -> Option<Arc<E>> {
        self.state.read().items.get(index).cloned()
    }

    /// Snapshot of the elements in list order.
    pub fn to_vec(&self) -> Vec<Arc<E>> {
        self.state.read().items.clone()
    }

    /// Iterate over a snapshot of the elements.
    ///
    /// Mutating the list while iterating does not affect the iterator.
    pub fn iter(&self) -> std::vec::IntoIter<Arc<E>> {
        self.to_vec().into_iter()
    }

    /// Whether `item` is held by this list.
    pub fn contains(&self, item: &E) -> bool {
        self.state.read().members.contains(&item.model_id())
    }

    /// Position of `item`, by identity.
    pub fn index_of(&self, item: &E) -> Option<usize> {
        self.state.read().position(item.model_id())
    }

    /// Names of the configured lookup indices.
    pub fn lookup_names(&self) -> Vec<String> {
        self.state
            .read()
            .indices
            .iter()
            .map(|index| index.name().to_string())
            .collect()
    }

    /// Find the element whose key in index `index` equals `key`.
    ///
    /// Fails with [`ModelError::UnknownIndex`] for an unconfigured index,
    /// [`ModelError::TypeMismatch`] when `K` is not the index's key type and
    /// [`ModelError::KeyNotFound`] when no element has the key.
    pub fn get_by<K: LookupKey>(&self, index: &str, key: &K) -> ModelResult<Arc<E>> {
        let state = self.state.read();
        state
            .typed_index::<K>(index)?
            .get(key)
            .cloned()
            .ok_or_else(|| ModelError::KeyNotFound {
                index: index.to_string(),
                key: format!("{key:?}"),
            })
    }

    /// [`get_by`](Self::get_by) for `String`-keyed indices.
    pub fn get_by_str(&self, index: &str, key: &str) -> ModelResult<Arc<E>> {
        let state = self.state.read();
        state
            .typed_index::<String>(index)?
            .get(key)
            .cloned()
            .ok_or_else(|| ModelError::KeyNotFound {
                index: index.to_string(),
                key: format!("{key:?}"),
            })
    }

    /// All keys currently present in index `index`, in no particular order.
    pub fn lookup_keys<K: LookupKey>(&self, index: &str) -> ModelResult<Vec<K>> {
        let state = self.state.read();
        Ok(state.typed_index::<K>(index)?.keys().cloned().collect())
    }
}

impl<O, E> Default for ParentAwareList<O, E>
where
    O: Send + Sync + 'static,
    E: ParentAware<Parent = O>,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<O, E> fmt::Debug for ParentAwareList<O, E>
where
    E: EventedModel,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.read();
        f.debug_struct("ParentAwareList")
            .field(
                "items",
                &state.items.iter().map(|item| item.model_id()).collect::<Vec<_>>(),
            )
            .field(
                "lookups",
                &state.indices.iter().map(|index| index.name()).collect::<Vec<_>>(),
            )
            .field("owned", &(state.owner.strong_count() > 0))
            .finish()
    }
}

#[cfg(feature = "serde")]
impl<O, E> serde::Serialize for ParentAwareList<O, E>
where
    E: serde::Serialize,
{
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeSeq;

        let items = self.state.read().items.clone();
        let mut seq = serializer.serialize_seq(Some(items.len()))?;
        for item in &items {
            seq.serialize_element(&**item)?;
        }
        seq.end()
    }
}

/// Builder for configuring a [`ParentAwareList`].
///
/// # Example
///
/// ```ignore
/// let children = NestedParentAwareList::<Dataset>::builder()
///     .lookup("name", |dataset: &Dataset| dataset.name())
///     .build();
/// ```
pub struct ParentAwareListBuilder<O, E> {
    indices: Vec<Box<dyn ErasedIndex<E>>>,
    _owner: PhantomData<fn() -> O>,
}

impl<O, E> ParentAwareListBuilder<O, E>
where
    O: Send + Sync + 'static,
    E: ParentAware<Parent = O>,
{
    fn new() -> Self {
        Self {
            indices: Vec::new(),
            _owner: PhantomData,
        }
    }

    /// Add a lookup index named `name`, keyed by `key_fn`.
    ///
    /// Registering a name twice replaces the earlier index.
    pub fn lookup<K, F>(mut self, name: impl Into<String>, key_fn: F) -> Self
    where
        K: LookupKey,
        F: Fn(&E) -> K + Send + Sync + 'static,
    {
        let name = name.into();
        self.indices.retain(|index| index.name() != name);
        self.indices.push(Box::new(LookupIndex::new(name, key_fn)));
        self
    }

    /// Build the (empty, unowned) list.
    pub fn build(self) -> ParentAwareList<O, E> {
        ParentAwareList {
            state: Arc::new(RwLock::new(ListState {
                owner: Weak::new(),
                items: Vec::new(),
                members: HashSet::new(),
                indices: self.indices,
                watches: HashMap::new(),
            })),
            events: Signal::new(),
        }
    }
}
