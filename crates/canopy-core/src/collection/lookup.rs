//! Secondary key indices over a parent-aware list.
//!
//! Each index maps a computed key to exactly one element. The list keeps its
//! indices in sync incrementally on every insert, remove and replace, and
//! recomputes an element's keys when one of its fields changes.
//!
//! An element renamed onto a key that is already taken waits outside the
//! index. It is admitted again as soon as that key is released.

use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::error::{ModelError, ModelResult};
use crate::logging::targets;
use crate::model::{EventedModel, ModelId};

/// Bound for values produced by a lookup key function.
pub trait LookupKey: Eq + Hash + Clone + fmt::Debug + Send + Sync + 'static {}

impl<T> LookupKey for T where T: Eq + Hash + Clone + fmt::Debug + Send + Sync + 'static {}

type KeyFn<E, K> = Arc<dyn Fn(&E) -> K + Send + Sync>;

/// Type-erased view of a [`LookupIndex`], so one list can host indices with
/// different key types.
pub(crate) trait ErasedIndex<E>: Send + Sync {
    fn name(&self) -> &str;

    fn key_type(&self) -> &'static str;

    /// Check that `incoming` can be added without key collisions.
    ///
    /// Entries owned by `outgoing` are treated as free.
    fn validate(&self, incoming: &[Arc<E>], outgoing: Option<ModelId>) -> ModelResult<()>;

    fn insert(&mut self, item: &Arc<E>);

    fn remove(&mut self, item: &E);

    /// Recompute the key of an element already in the list.
    fn rekey(&mut self, item: &Arc<E>) -> ModelResult<()>;

    fn as_any(&self) -> &dyn Any;
}

/// A named mapping from a computed key to a single element.
pub(crate) struct LookupIndex<E, K> {
    name: String,
    key_fn: KeyFn<E, K>,
    by_key: HashMap<K, Arc<E>>,
    by_item: HashMap<ModelId, K>,
    /// Held elements whose key collided on rename, oldest first.
    waiting: IndexMap<ModelId, (K, Arc<E>)>,
}

impl<E, K> LookupIndex<E, K>
where
    E: EventedModel,
    K: LookupKey,
{
    pub(crate) fn new<F>(name: impl Into<String>, key_fn: F) -> Self
    where
        F: Fn(&E) -> K + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            key_fn: Arc::new(key_fn),
            by_key: HashMap::new(),
            by_item: HashMap::new(),
            waiting: IndexMap::new(),
        }
    }

    pub(crate) fn get<Q>(&self, key: &Q) -> Option<&Arc<E>>
    where
        K: std::borrow::Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.by_key.get(key)
    }

    pub(crate) fn keys(&self) -> impl Iterator<Item = &K> {
        self.by_key.keys()
    }

    fn duplicate(&self, key: &K) -> ModelError {
        ModelError::DuplicateKey {
            index: self.name.clone(),
            key: format!("{key:?}"),
        }
    }

    fn is_taken(&self, key: &K, outgoing: Option<ModelId>) -> bool {
        match self.by_key.get(key) {
            Some(holder) => Some(holder.model_id()) != outgoing,
            None => false,
        }
    }

    /// Whether `id` is held by the list but left out of the index.
    #[cfg(test)]
    fn is_waiting(&self, id: ModelId) -> bool {
        self.waiting.contains_key(&id)
    }

    /// Admit the oldest waiting element whose key is `released`.
    fn readmit(&mut self, released: &K) {
        let next = self
            .waiting
            .iter()
            .find(|(_, (_, item))| (self.key_fn)(&**item) == *released)
            .map(|(id, _)| *id);
        let Some((_, item)) = next.and_then(|id| self.waiting.shift_remove(&id)) else {
            return;
        };
        tracing::debug!(
            target: targets::COLLECTION,
            index = %self.name,
            key = ?released,
            id = %item.model_id(),
            "key released; waiting element re-indexed"
        );
        self.insert(&item);
    }
}

impl<E, K> ErasedIndex<E> for LookupIndex<E, K>
where
    E: EventedModel,
    K: LookupKey,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn key_type(&self) -> &'static str {
        std::any::type_name::<K>()
    }

    fn validate(&self, incoming: &[Arc<E>], outgoing: Option<ModelId>) -> ModelResult<()> {
        let mut batch = HashSet::with_capacity(incoming.len());
        for item in incoming {
            let key = (self.key_fn)(&**item);
            if self.is_taken(&key, outgoing) || !batch.insert(key.clone()) {
                return Err(self.duplicate(&key));
            }
        }
        Ok(())
    }

    fn insert(&mut self, item: &Arc<E>) {
        let key = (self.key_fn)(&**item);
        self.by_item.insert(item.model_id(), key.clone());
        self.by_key.insert(key, Arc::clone(item));
    }

    fn remove(&mut self, item: &E) {
        let id = item.model_id();
        self.waiting.shift_remove(&id);
        let Some(key) = self.by_item.remove(&id) else {
            return;
        };
        if self.by_key.get(&key).map(|held| held.model_id()) == Some(id) {
            self.by_key.remove(&key);
            self.readmit(&key);
        }
    }

    fn rekey(&mut self, item: &Arc<E>) -> ModelResult<()> {
        let id = item.model_id();
        let key = (self.key_fn)(&**item);
        if self.by_item.get(&id) == Some(&key) {
            return Ok(());
        }
        // Already reported when it started waiting for this key.
        if self.waiting.get(&id).is_some_and(|(pending, _)| *pending == key) {
            return Ok(());
        }

        self.remove(item);
        if self.is_taken(&key, None) {
            tracing::warn!(
                target: targets::COLLECTION,
                index = %self.name,
                ?key,
                "renamed element collides with an existing key; left out of the index"
            );
            let err = self.duplicate(&key);
            self.waiting.insert(id, (key, Arc::clone(item)));
            return Err(err);
        }
        self.insert(item);
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::Note;

    fn by_title() -> LookupIndex<Note, String> {
        LookupIndex::new("title", |note: &Note| note.title())
    }

    #[test]
    fn test_insert_and_get() {
        let mut index = by_title();
        let note = Note::new("alpha");
        index.insert(&note);

        assert!(Arc::ptr_eq(index.get("alpha").unwrap(), &note));
        assert!(index.get("beta").is_none());
        assert_eq!(index.keys().count(), 1);
    }

    #[test]
    fn test_validate_rejects_collisions() {
        let mut index = by_title();
        let held = Note::new("alpha");
        index.insert(&held);

        let clash = Note::new("alpha");
        assert!(matches!(
            index.validate(&[clash], None),
            Err(ModelError::DuplicateKey { index, key }) if index == "title" && key == "\"alpha\""
        ));

        // A replacement may take over the key of the element it replaces.
        let successor = Note::new("alpha");
        assert!(index.validate(&[successor], Some(held.model_id())).is_ok());

        let batch = [Note::new("x"), Note::new("x")];
        assert!(index.validate(&batch, None).is_err());
    }

    #[test]
    fn test_rekey_follows_field_changes() {
        let mut index = by_title();
        let note = Note::new("alpha");
        index.insert(&note);

        note.set_title("beta").unwrap();
        index.rekey(&note).unwrap();

        assert!(index.get("alpha").is_none());
        assert!(index.get("beta").is_some());
    }

    #[test]
    fn test_rekey_collision_drops_element() {
        let mut index = by_title();
        let first = Note::new("alpha");
        let second = Note::new("beta");
        index.insert(&first);
        index.insert(&second);

        second.set_title("alpha").unwrap();
        assert!(index.rekey(&second).is_err());
        assert!(Arc::ptr_eq(index.get("alpha").unwrap(), &first));
        assert!(index.get("beta").is_none());

        assert!(index.is_waiting(second.model_id()));

        second.set_title("gamma").unwrap();
        index.rekey(&second).unwrap();
        assert!(Arc::ptr_eq(index.get("gamma").unwrap(), &second));
        assert!(!index.is_waiting(second.model_id()));
    }

    #[test]
    fn test_released_key_readmits_waiting_element() {
        let mut index = by_title();
        let first = Note::new("alpha");
        let second = Note::new("beta");
        let third = Note::new("gamma");
        for note in [&first, &second, &third] {
            index.insert(note);
        }

        second.set_title("alpha").unwrap();
        third.set_title("alpha").unwrap();
        assert!(index.rekey(&second).is_err());
        assert!(index.rekey(&third).is_err());
        // Unrelated writes do not report the same collision again.
        assert!(index.rekey(&second).is_ok());

        index.remove(&first);
        assert!(Arc::ptr_eq(index.get("alpha").unwrap(), &second));
        assert!(index.is_waiting(third.model_id()));

        index.remove(&second);
        assert!(Arc::ptr_eq(index.get("alpha").unwrap(), &third));
        assert!(!index.is_waiting(third.model_id()));
    }

    #[test]
    fn test_renaming_away_frees_key_for_waiting_element() {
        let mut index = by_title();
        let first = Note::new("alpha");
        let second = Note::new("beta");
        index.insert(&first);
        index.insert(&second);

        second.set_title("alpha").unwrap();
        assert!(index.rekey(&second).is_err());

        first.set_title("omega").unwrap();
        index.rekey(&first).unwrap();

        assert!(Arc::ptr_eq(index.get("alpha").unwrap(), &second));
        assert!(Arc::ptr_eq(index.get("omega").unwrap(), &first));
    }

    #[test]
    fn test_remove_forgets_waiting_element() {
        let mut index = by_title();
        let first = Note::new("alpha");
        let second = Note::new("beta");
        index.insert(&first);
        index.insert(&second);

        second.set_title("alpha").unwrap();
        assert!(index.rekey(&second).is_err());
        index.remove(&second);
        index.remove(&first);

        assert!(!index.is_waiting(second.model_id()));
        assert_eq!(index.keys().count(), 0);
    }

    #[test]
    fn test_remove_only_drops_own_entry() {
        let mut index = by_title();
        let first = Note::new("alpha");
        index.insert(&first);
        index.remove(&first);
        assert!(index.get("alpha").is_none());
        assert_eq!(index.keys().count(), 0);
    }
}
