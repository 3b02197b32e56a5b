//! Datasets: named nodes holding layers and sub-datasets.

use std::fmt;
use std::sync::Arc;

use canopy_core::{
    DeepClone, EventedModel, Field, FieldValue, ModelBase, ModelError, ModelResult,
    NestedParentAwareList, ParentAware, ParentAwareList, ParentLink, PerfSpan, TreeIter, TreeNode,
};
use serde::Serialize;

use crate::layer::Layer;
use crate::targets;

/// Name of the lookup index both child lists maintain.
pub const NAME_INDEX: &str = "name";

/// A hierarchical dataset.
///
/// Layers and sub-datasets are indexed by name, so names are unique among
/// siblings of the same kind. A dataset compares by identity, never by
/// contents.
///
/// # Example
///
/// ```
/// use canopy_dataset::{Dataset, Layer};
/// use canopy_core::{ParentAware, TreeNode};
///
/// let root = Dataset::new("survey");
/// let site = Dataset::new("site-a");
/// root.children().append(site.clone()).unwrap();
/// site.layers().append(Layer::new("elevation")).unwrap();
///
/// let elevation = site.layers().get_by_str("name", "elevation").unwrap();
/// assert_eq!(elevation.get_parent().unwrap().name(), "site-a");
///
/// let (found, path) = site.get_root();
/// assert_eq!(found.name(), "survey");
/// assert_eq!(path, ["site-a"]);
/// ```
#[derive(Serialize)]
pub struct Dataset {
    #[serde(skip)]
    base: ModelBase,
    #[serde(skip)]
    parent: ParentLink<Dataset>,
    name: Field<String>,
    layers: ParentAwareList<Dataset, Layer>,
    children: NestedParentAwareList<Dataset>,
}

impl Dataset {
    /// Create an empty, unparented dataset.
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        let name = name.into();
        Arc::new_cyclic(|weak| {
            let dataset = Self {
                base: ModelBase::new(),
                parent: ParentLink::new(),
                name: Field::new("name", name),
                layers: ParentAwareList::builder()
                    .lookup(NAME_INDEX, |layer: &Layer| layer.name())
                    .build(),
                children: NestedParentAwareList::builder()
                    .lookup(NAME_INDEX, |dataset: &Dataset| dataset.name())
                    .build(),
            };
            dataset.layers.set_parent(weak.clone());
            dataset.children.set_parent(weak.clone());
            dataset
        })
    }

    /// Create a dataset that starts out holding `layers` and `children`.
    pub fn with_contents<L, C>(
        name: impl Into<String>,
        layers: L,
        children: C,
    ) -> ModelResult<Arc<Self>>
    where
        L: IntoIterator<Item = Arc<Layer>>,
        C: IntoIterator<Item = Arc<Dataset>>,
    {
        let dataset = Self::new(name);
        dataset.layers.extend(layers)?;
        dataset.children.extend(children)?;
        Ok(dataset)
    }

    /// Deep-copy `dataset`: every layer and sub-dataset gets a new identity.
    ///
    /// The copy is unparented even if the source is not. Layer payloads are
    /// shared with the source.
    pub fn from_dataset(dataset: &Dataset) -> ModelResult<Arc<Self>> {
        let _span = PerfSpan::new("dataset::from_dataset");
        let layers = dataset
            .layers
            .iter()
            .map(|layer| Layer::from_layer(&layer))
            .collect::<ModelResult<Vec<_>>>()?;
        let children = dataset
            .children
            .iter()
            .map(|child| Dataset::from_dataset(&child))
            .collect::<ModelResult<Vec<_>>>()?;
        tracing::debug!(
            target: targets::DATASET,
            name = %dataset.name(),
            layers = layers.len(),
            children = children.len(),
            "copied dataset"
        );
        Self::with_contents(dataset.name(), layers, children)
    }

    /// The dataset name.
    pub fn name(&self) -> String {
        self.name.get()
    }

    /// Rename the dataset. The owning list re-indexes it.
    pub fn set_name(&self, name: impl Into<String>) -> ModelResult<bool> {
        self.base.set(&self.name, name.into())
    }

    /// Layers held directly by this dataset.
    pub fn layers(&self) -> &ParentAwareList<Dataset, Layer> {
        &self.layers
    }

    /// Sub-datasets held directly by this dataset.
    pub fn children(&self) -> &NestedParentAwareList<Dataset> {
        &self.children
    }

    /// Layers of this dataset, and with `recursive` those of every descendant.
    pub fn iter_layers(&self, recursive: bool) -> TreeIter<Dataset, Layer> {
        self.iter_leaves(recursive)
    }
}

impl EventedModel for Dataset {
    fn base(&self) -> &ModelBase {
        &self.base
    }

    fn field_names(&self) -> &'static [&'static str] {
        &["name"]
    }

    fn field_value(&self, name: &str) -> ModelResult<FieldValue> {
        match name {
            "name" => Ok(self.name.value()),
            _ => Err(ModelError::UnknownField(name.to_string())),
        }
    }

    fn set_field_value(&self, name: &str, value: FieldValue) -> ModelResult<bool> {
        match name {
            "name" => self.base.set_dyn(&self.name, value),
            _ => Err(ModelError::UnknownField(name.to_string())),
        }
    }
}

impl ParentAware for Dataset {
    type Parent = Dataset;

    fn parent_link(&self) -> &ParentLink<Dataset> {
        &self.parent
    }
}

impl TreeNode for Dataset {
    type Leaf = Layer;

    fn node_name(&self) -> String {
        self.name()
    }

    fn child_nodes(&self) -> &NestedParentAwareList<Dataset> {
        &self.children
    }

    fn leaf_items(&self) -> &ParentAwareList<Dataset, Layer> {
        &self.layers
    }

    fn child_by_name(&self, name: &str) -> Option<Arc<Dataset>> {
        self.children.get_by_str(NAME_INDEX, name).ok()
    }
}

impl DeepClone for Dataset {
    fn deep_clone(&self) -> ModelResult<Arc<Self>> {
        Self::from_dataset(self)
    }
}

impl fmt::Display for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

impl fmt::Debug for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dataset")
            .field("id", &self.model_id())
            .field("name", &self.name())
            .field("layers", &self.layers.len())
            .field("children", &self.children.len())
            .finish_non_exhaustive()
    }
}

canopy_core::impl_identity_eq!(Dataset);
