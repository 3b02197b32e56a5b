//! Tree composition on top of parent-aware collections.
//!
//! A tree node owns a nested list of nodes of its own type and a flat list of
//! leaves. Parent links point upward, collections point downward; this module
//! walks both directions.
//!
//! # Traversal order
//!
//! Recursive traversal yields a node's own items first, then descends into
//! each child in list order, exhausting that child's subtree before moving to
//! its next sibling. For a root `R` with leaf `a`, child `C1` with leaf `b`
//! and grandchild `C2` with leaf `c`, [`TreeNode::iter_leaves`] yields
//! `[a, b, c]`.
//!
//! Iterators are lazy: a node's list is snapshotted when the traversal reaches
//! it, not when the iterator is created.

use std::sync::Arc;

use crate::collection::ParentAwareList;
use crate::error::{ModelError, ModelResult};
use crate::logging::targets;
use crate::model::EventedModel;
use crate::parent::ParentAware;

/// A list whose elements have the same type as its owner.
pub type NestedParentAwareList<T> = ParentAwareList<T, T>;

/// Whether `candidate` is a strict ancestor of `node`.
///
/// Nested lists do not reject cycles themselves; callers that move nodes
/// around should check `candidate` before inserting `node` under it:
///
/// ```ignore
/// let creates_cycle = Arc::ptr_eq(&target, &node) || is_ancestor(&*node, &*target);
/// ```
pub fn is_ancestor<T>(candidate: &T, node: &T) -> bool
where
    T: ParentAware<Parent = T>,
{
    let target = candidate.model_id();
    let mut current = node.get_parent();
    while let Some(parent) = current {
        if parent.model_id() == target {
            return true;
        }
        current = parent.get_parent();
    }
    false
}

/// Copy a model and everything it owns under fresh identities.
///
/// The copy is unparented. Failures come from the copy's own collections,
/// for example a lookup key collision introduced by a listener.
pub trait DeepClone: Sized {
    /// Produce the independent copy.
    fn deep_clone(&self) -> ModelResult<Arc<Self>>;
}

/// A node in a tree of parent-aware collections.
pub trait TreeNode: ParentAware<Parent = Self> + Sized {
    /// The flat element type held by each node.
    type Leaf: ParentAware<Parent = Self>;

    /// Name used in paths.
    fn node_name(&self) -> String;

    /// The nested list of child nodes.
    fn child_nodes(&self) -> &NestedParentAwareList<Self>;

    /// The flat list of leaves.
    fn leaf_items(&self) -> &ParentAwareList<Self, Self::Leaf>;

    /// Direct child with the given name.
    ///
    /// The default scans the children; nodes with a name index should
    /// override this.
    fn child_by_name(&self, name: &str) -> Option<Arc<Self>> {
        self.child_nodes()
            .iter()
            .find(|child| child.node_name() == name)
    }

    /// The root of this node's tree and the names leading from it to `self`,
    /// outer to inner, excluding the root. A root returns itself and an empty
    /// path.
    fn get_root(self: &Arc<Self>) -> (Arc<Self>, Vec<String>) {
        let mut path = Vec::new();
        let mut current = Arc::clone(self);
        while let Some(parent) = current.get_parent() {
            path.push(current.node_name());
            current = parent;
        }
        path.reverse();
        tracing::trace!(target: targets::TREE, depth = path.len(), "resolved root");
        (current, path)
    }

    /// Ancestors from the parent up to the root.
    fn ancestors(&self) -> Vec<Arc<Self>> {
        let mut ancestors = Vec::new();
        let mut current = self.get_parent();
        while let Some(parent) = current {
            current = parent.get_parent();
            ancestors.push(parent);
        }
        ancestors
    }

    /// Resolve a path of child names below `self`.
    ///
    /// An empty path resolves to `self`. The inverse of [`get_root`]:
    /// `root.find_descendant(&path)` returns the node `get_root` started from.
    ///
    /// [`get_root`]: TreeNode::get_root
    fn find_descendant<S: AsRef<str>>(self: &Arc<Self>, path: &[S]) -> ModelResult<Arc<Self>> {
        let mut current = Arc::clone(self);
        for name in path {
            let name = name.as_ref();
            current = current
                .child_by_name(name)
                .ok_or_else(|| ModelError::KeyNotFound {
                    index: "name".to_string(),
                    key: format!("{name:?}"),
                })?;
        }
        Ok(current)
    }

    /// Leaves of this node, and with `recursive` those of every descendant.
    fn iter_leaves(&self, recursive: bool) -> TreeIter<Self, Self::Leaf> {
        TreeIter::new(self, recursive, |node: &Self| node.leaf_items().to_vec())
    }

    /// Children of this node, and with `recursive` every descendant.
    fn iter_children(&self, recursive: bool) -> TreeIter<Self, Self> {
        TreeIter::new(self, recursive, |node: &Self| node.child_nodes().to_vec())
    }
}

/// Lazy depth-first iterator produced by [`TreeNode::iter_leaves`] and
/// [`TreeNode::iter_children`].
pub struct TreeIter<N, T> {
    current: std::vec::IntoIter<Arc<T>>,
    /// Children whose subtrees are still to be visited, innermost last.
    pending: Vec<std::vec::IntoIter<Arc<N>>>,
    items: fn(&N) -> Vec<Arc<T>>,
}

impl<N: TreeNode, T> TreeIter<N, T> {
    fn new(node: &N, recursive: bool, items: fn(&N) -> Vec<Arc<T>>) -> Self {
        let pending = if recursive {
            vec![node.child_nodes().iter()]
        } else {
            Vec::new()
        };
        Self {
            current: items(node).into_iter(),
            pending,
            items,
        }
    }

    fn descend(&mut self) -> bool {
        while let Some(children) = self.pending.last_mut() {
            match children.next() {
                Some(child) => {
                    self.current = (self.items)(&child).into_iter();
                    self.pending.push(child.child_nodes().iter());
                    return true;
                }
                None => {
                    self.pending.pop();
                }
            }
        }
        false
    }
}

impl<N: TreeNode, T> Iterator for TreeIter<N, T> {
    type Item = Arc<T>;

    fn next(&mut self) -> Option<Arc<T>> {
        loop {
            if let Some(item) = self.current.next() {
                return Some(item);
            }
            if !self.descend() {
                return None;
            }
        }
    }
}

impl<N: TreeNode, T> std::iter::FusedIterator for TreeIter<N, T> {}
