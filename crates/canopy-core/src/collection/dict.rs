//! Key-unique, insertion-ordered observable mapping scoped to an owner.

use std::fmt;
use std::hash::Hash;
use std::sync::{Arc, Weak};

use indexmap::{Equivalent, IndexMap};
use parking_lot::RwLock;

use crate::error::{ModelResult, keep_first};
use crate::logging::targets;
use crate::model::FieldValue;
use crate::signal::Signal;

/// Change announced by a [`ParentAwareDict`].
#[derive(Debug, Clone, PartialEq)]
pub enum DictEvent<K, V> {
    /// A new key was inserted.
    Added {
        /// The new key.
        key: K,
        /// Its value.
        value: V,
    },
    /// An existing key received a different value.
    Changed {
        /// The key.
        key: K,
        /// The previous value.
        old: V,
        /// The new value.
        new: V,
    },
    /// A key was removed.
    Removed {
        /// The removed key.
        key: K,
        /// The value it held.
        value: V,
    },
}

struct DictState<O, K, V> {
    owner: Weak<O>,
    entries: IndexMap<K, V>,
}

/// Observable mapping owned by an `O`, used for flat metadata.
///
/// Values are plain data and carry no parent link; only the dictionary itself
/// knows its owner. Iteration follows insertion order.
pub struct ParentAwareDict<O, K, V> {
    state: RwLock<DictState<O, K, V>>,
    events: Signal<DictEvent<K, V>>,
}

impl<O, K, V> ParentAwareDict<O, K, V>
where
    O: Send + Sync + 'static,
    K: Eq + Hash + Clone + fmt::Debug + Send + Sync + 'static,
    V: Clone + PartialEq + fmt::Debug + Send + Sync + 'static,
{
    /// Create an empty, unowned dictionary.
    pub fn new() -> Self {
        Self {
            state: RwLock::new(DictState {
                owner: Weak::new(),
                entries: IndexMap::new(),
            }),
            events: Signal::new(),
        }
    }

    /// Signal carrying every change.
    pub fn events(&self) -> &Signal<DictEvent<K, V>> {
        &self.events
    }

    /// Bind the dictionary to its owner. Rebinding the same owner is a no-op.
    pub fn set_parent(&self, owner: Weak<O>) {
        let mut state = self.state.write();
        if !Weak::ptr_eq(&state.owner, &owner) {
            state.owner = owner;
        }
    }

    /// The owner, if bound and alive.
    pub fn owner(&self) -> Option<Arc<O>> {
        self.state.read().owner.upgrade()
    }

    /// Insert or overwrite `key`, returning the previous value.
    ///
    /// Writing a value equal to the current one emits nothing.
    pub fn insert(&self, key: K, value: V) -> ModelResult<Option<V>> {
        let (previous, event) = {
            let mut state = self.state.write();
            match state.entries.get_mut(&key) {
                Some(current) if *current == value => return Ok(Some(value)),
                Some(current) => {
                    let old = std::mem::replace(current, value.clone());
                    let event = DictEvent::Changed {
                        key,
                        old: old.clone(),
                        new: value,
                    };
                    (Some(old), event)
                }
                None => {
                    state.entries.insert(key.clone(), value.clone());
                    (None, DictEvent::Added { key, value })
                }
            }
        };
        tracing::trace!(target: targets::COLLECTION, ?event, "dict entry written");
        self.events.emit(event)?;
        Ok(previous)
    }

    /// Insert a type-erased value, which must be a `V`.
    pub fn insert_dyn(&self, key: K, value: FieldValue) -> ModelResult<Option<V>> {
        let value = value.to_typed::<V>()?;
        self.insert(key, value)
    }

    /// Apply each pair in order, as if by repeated [`insert`](Self::insert).
    pub fn update<I>(&self, entries: I) -> ModelResult<()>
    where
        I: IntoIterator<Item = (K, V)>,
    {
        let mut result = Ok(());
        for (key, value) in entries {
            keep_first(&mut result, self.insert(key, value).map(drop));
        }
        result
    }

    /// Remove `key`, returning its value if it was present.
    pub fn remove<Q>(&self, key: &Q) -> ModelResult<Option<V>>
    where
        Q: ?Sized + Hash + Equivalent<K>,
    {
        let removed = self.state.write().entries.shift_remove_entry(key);
        let Some((key, value)) = removed else {
            return Ok(None);
        };
        tracing::trace!(target: targets::COLLECTION, ?key, "dict entry removed");
        self.events.emit(DictEvent::Removed {
            key,
            value: value.clone(),
        })?;
        Ok(Some(value))
    }

    /// Remove every entry in insertion order, announcing each removal.
    pub fn clear(&self) -> ModelResult<()> {
        let mut result = Ok(());
        for key in self.keys() {
            keep_first(&mut result, self.remove(&key).map(drop));
        }
        result
    }

    /// The value stored under `key`.
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        Q: ?Sized + Hash + Equivalent<K>,
    {
        self.state.read().entries.get(key).cloned()
    }

    /// Whether `key` is present.
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        Q: ?Sized + Hash + Equivalent<K>,
    {
        self.state.read().entries.contains_key(key)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.state.read().entries.len()
    }

    /// Whether the dictionary is empty.
    pub fn is_empty(&self) -> bool {
        self.state.read().entries.is_empty()
    }

    /// Snapshot of the keys in insertion order.
    pub fn keys(&self) -> Vec<K> {
        self.state.read().entries.keys().cloned().collect()
    }

    /// Snapshot of the values in insertion order.
    pub fn values(&self) -> Vec<V> {
        self.state.read().entries.values().cloned().collect()
    }

    /// Iterate over a snapshot of the entries.
    pub fn iter(&self) -> std::vec::IntoIter<(K, V)> {
        let entries: Vec<_> = self
            .state
            .read()
            .entries
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        entries.into_iter()
    }

    /// Snapshot of the whole mapping.
    pub fn to_map(&self) -> IndexMap<K, V> {
        self.state.read().entries.clone()
    }
}

impl<O, K, V> Default for ParentAwareDict<O, K, V>
where
    O: Send + Sync + 'static,
    K: Eq + Hash + Clone + fmt::Debug + Send + Sync + 'static,
    V: Clone + PartialEq + fmt::Debug + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<O, K: fmt::Debug, V: fmt::Debug> fmt::Debug for ParentAwareDict<O, K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.state.read().entries.iter()).finish()
    }
}

#[cfg(feature = "serde")]
impl<O, K, V> serde::Serialize for ParentAwareDict<O, K, V>
where
    K: serde::Serialize,
    V: serde::Serialize,
{
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap;

        let state = self.state.read();
        let mut map = serializer.serialize_map(Some(state.entries.len()))?;
        for (key, value) in &state.entries {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ModelError;
    use parking_lot::Mutex;

    type Groups = ParentAwareDict<String, String, String>;

    fn record(dict: &Groups) -> Arc<Mutex<Vec<DictEvent<String, String>>>> {
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = log.clone();
        dict.events().connect(move |event| sink.lock().push(event.clone()));
        log
    }

    #[test]
    fn test_insert_emits_added_then_changed() {
        let groups = Groups::new();
        let log = record(&groups);

        assert_eq!(groups.insert("kind".into(), "road".into()).unwrap(), None);
        assert_eq!(
            groups.insert("kind".into(), "river".into()).unwrap(),
            Some("road".to_string())
        );

        assert_eq!(
            *log.lock(),
            vec![
                DictEvent::Added {
                    key: "kind".to_string(),
                    value: "road".to_string()
                },
                DictEvent::Changed {
                    key: "kind".to_string(),
                    old: "road".to_string(),
                    new: "river".to_string()
                },
            ]
        );
    }

    #[test]
    fn test_equal_value_is_silent() {
        let groups = Groups::new();
        groups.insert("kind".into(), "road".into()).unwrap();
        let log = record(&groups);

        groups.insert("kind".into(), "road".into()).unwrap();
        assert!(log.lock().is_empty());
    }

    #[test]
    fn test_remove_keeps_order() {
        let groups = Groups::new();
        groups
            .update([
                ("a".to_string(), "1".to_string()),
                ("b".to_string(), "2".to_string()),
                ("c".to_string(), "3".to_string()),
            ])
            .unwrap();
        let log = record(&groups);

        assert_eq!(groups.remove("b").unwrap(), Some("2".to_string()));
        assert_eq!(groups.remove("b").unwrap(), None);
        assert_eq!(groups.keys(), ["a", "c"]);
        assert_eq!(log.lock().len(), 1);
    }

    #[test]
    fn test_clear_announces_each_entry() {
        let groups = Groups::new();
        groups
            .update([("a".into(), "1".into()), ("b".into(), "2".into())])
            .unwrap();
        let log = record(&groups);

        groups.clear().unwrap();
        assert!(groups.is_empty());
        assert_eq!(log.lock().len(), 2);
    }

    #[test]
    fn test_insert_dyn_checks_type() {
        let groups = Groups::new();
        assert!(groups.insert_dyn("a".into(), FieldValue::new("x".to_string())).is_ok());
        assert!(matches!(
            groups.insert_dyn("b".into(), FieldValue::new(3u8)),
            Err(ModelError::TypeMismatch { got: "u8", .. })
        ));
        assert!(!groups.contains_key("b"));
    }

    #[test]
    fn test_owner_binding() {
        let owner = Arc::new("layer".to_string());
        let groups = Groups::new();
        assert!(groups.owner().is_none());

        groups.set_parent(Arc::downgrade(&owner));
        groups.set_parent(Arc::downgrade(&owner));
        assert!(Arc::ptr_eq(&groups.owner().unwrap(), &owner));
    }

    #[test]
    fn test_snapshots() {
        let groups = Groups::new();
        groups
            .update([("x".into(), "1".into()), ("y".into(), "2".into())])
            .unwrap();

        assert_eq!(groups.values(), ["1", "2"]);
        assert_eq!(groups.get("y"), Some("2".to_string()));
        assert_eq!(groups.iter().count(), 2);
        assert_eq!(groups.to_map().get_index(0), Some((&"x".to_string(), &"1".to_string())));
        assert_eq!(groups.len(), 2);
    }
}
