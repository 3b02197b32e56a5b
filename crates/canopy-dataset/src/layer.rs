//! Layers: the leaves of a dataset tree.

use std::fmt;
use std::sync::Arc;

use canopy_core::{
    DeepClone, EventedModel, Field, FieldValue, ModelBase, ModelError, ModelResult, ParentAware,
    ParentAwareDict, ParentLink,
};
use serde::Serialize;

use crate::dataset::Dataset;
use crate::payload::LayerPayload;

/// Grouping name to group name.
pub type LayerGroups = ParentAwareDict<Layer, String, String>;

/// A named layer with an optional opaque payload and a set of group tags.
///
/// Serializes as its name and groups; the payload and parent are omitted.
#[derive(Serialize)]
pub struct Layer {
    #[serde(skip)]
    base: ModelBase,
    #[serde(skip)]
    parent: ParentLink<Dataset>,
    name: Field<String>,
    #[serde(skip)]
    payload: Field<Option<LayerPayload>>,
    groups: LayerGroups,
}

impl Layer {
    /// Create an unparented layer without payload.
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Self::build(name.into(), None)
    }

    /// Create an unparented layer carrying `payload`.
    pub fn with_payload(name: impl Into<String>, payload: LayerPayload) -> Arc<Self> {
        Self::build(name.into(), Some(payload))
    }

    fn build(name: String, payload: Option<LayerPayload>) -> Arc<Self> {
        Arc::new_cyclic(|weak| {
            let layer = Self {
                base: ModelBase::new(),
                parent: ParentLink::new(),
                name: Field::new("name", name),
                payload: Field::new("payload", payload),
                groups: ParentAwareDict::new(),
            };
            layer.groups.set_parent(weak.clone());
            layer
        })
    }

    /// Copy `layer` under a new identity.
    ///
    /// The name and groups are copied; the payload is shared with the source.
    pub fn from_layer(layer: &Layer) -> ModelResult<Arc<Self>> {
        let copy = Self::build(layer.name(), layer.payload());
        copy.groups.update(layer.groups.iter())?;
        Ok(copy)
    }

    /// The layer name.
    pub fn name(&self) -> String {
        self.name.get()
    }

    /// Rename the layer. Owning lists re-index it.
    pub fn set_name(&self, name: impl Into<String>) -> ModelResult<bool> {
        self.base.set(&self.name, name.into())
    }

    /// The attached payload, if any.
    pub fn payload(&self) -> Option<LayerPayload> {
        self.payload.get()
    }

    /// Attach or detach the payload.
    pub fn set_payload(&self, payload: Option<LayerPayload>) -> ModelResult<bool> {
        self.base.set(&self.payload, payload)
    }

    /// Group tags, keyed by grouping.
    pub fn groups(&self) -> &LayerGroups {
        &self.groups
    }
}

impl EventedModel for Layer {
    fn base(&self) -> &ModelBase {
        &self.base
    }

    fn field_names(&self) -> &'static [&'static str] {
        &["name", "payload"]
    }

    fn field_value(&self, name: &str) -> ModelResult<FieldValue> {
        match name {
            "name" => Ok(self.name.value()),
            "payload" => Ok(self.payload.value()),
            _ => Err(ModelError::UnknownField(name.to_string())),
        }
    }

    fn set_field_value(&self, name: &str, value: FieldValue) -> ModelResult<bool> {
        match name {
            "name" => self.base.set_dyn(&self.name, value),
            "payload" => self.base.set_dyn(&self.payload, value),
            _ => Err(ModelError::UnknownField(name.to_string())),
        }
    }
}

impl ParentAware for Layer {
    type Parent = Dataset;

    fn parent_link(&self) -> &ParentLink<Dataset> {
        &self.parent
    }
}

impl DeepClone for Layer {
    fn deep_clone(&self) -> ModelResult<Arc<Self>> {
        Self::from_layer(self)
    }
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

impl fmt::Debug for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Layer")
            .field("id", &self.model_id())
            .field("name", &self.name())
            .field("groups", &self.groups)
            .finish_non_exhaustive()
    }
}

canopy_core::impl_identity_eq!(Layer);
