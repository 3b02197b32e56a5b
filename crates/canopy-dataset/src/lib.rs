//! Hierarchical datasets for Canopy.
//!
//! A [`Dataset`] is a named node that holds [`Layer`]s and sub-datasets. Both
//! collections are parent-aware: every layer and sub-dataset knows the
//! dataset holding it, and both are indexed by name.
//!
//! ```
//! use canopy_dataset::{Dataset, Layer};
//! use canopy_core::TreeNode;
//!
//! let root = Dataset::new("root");
//! let child = Dataset::new("child");
//! root.layers().append(Layer::new("a")).unwrap();
//! child.layers().append(Layer::new("b")).unwrap();
//! root.children().append(child).unwrap();
//!
//! let names: Vec<_> = root.iter_layers(true).map(|layer| layer.name()).collect();
//! assert_eq!(names, ["a", "b"]);
//! ```
//!
//! Datasets and layers serialize (with `serde`) to their declared fields and
//! nested collections. Parent links and layer payloads are never written.

mod dataset;
mod layer;
mod payload;

/// `tracing` targets used by this crate.
pub mod targets {
    /// Dataset construction and copying.
    pub const DATASET: &str = "canopy_dataset::dataset";
}

pub use dataset::{Dataset, NAME_INDEX};
pub use layer::{Layer, LayerGroups};
pub use payload::LayerPayload;
