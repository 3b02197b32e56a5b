//! Small model types shared by the unit tests.

use std::fmt;
use std::sync::Arc;

use crate::collection::ParentAwareList;
use crate::error::{ModelError, ModelResult};
use crate::model::{EventedModel, Field, FieldValue, ModelBase};
use crate::parent::{ParentAware, ParentLink};
use crate::tree::{DeepClone, NestedParentAwareList, TreeNode};

/// A leaf with a single `title` field.
pub(crate) struct Note {
    base: ModelBase,
    parent: ParentLink<Folder>,
    title: Field<String>,
}

impl Note {
    pub(crate) fn new(title: &str) -> Arc<Self> {
        Arc::new(Self {
            base: ModelBase::new(),
            parent: ParentLink::new(),
            title: Field::new("title", title.to_string()),
        })
    }

    pub(crate) fn title(&self) -> String {
        self.title.get()
    }

    pub(crate) fn set_title(&self, title: &str) -> ModelResult<bool> {
        self.base.set(&self.title, title.to_string())
    }
}

impl EventedModel for Note {
    fn base(&self) -> &ModelBase {
        &self.base
    }

    fn field_names(&self) -> &'static [&'static str] {
        &["title"]
    }

    fn field_value(&self, name: &str) -> ModelResult<FieldValue> {
        match name {
            "title" => Ok(self.title.value()),
            _ => Err(ModelError::UnknownField(name.to_string())),
        }
    }

    fn set_field_value(&self, name: &str, value: FieldValue) -> ModelResult<bool> {
        match name {
            "title" => self.base.set_dyn(&self.title, value),
            _ => Err(ModelError::UnknownField(name.to_string())),
        }
    }
}

impl fmt::Display for Note {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.title())
    }
}

impl ParentAware for Note {
    type Parent = Folder;

    fn parent_link(&self) -> &ParentLink<Folder> {
        &self.parent
    }
}

impl DeepClone for Note {
    fn deep_clone(&self) -> ModelResult<Arc<Self>> {
        Ok(Note::new(&self.title()))
    }
}

/// A node holding notes and sub-folders, both indexed.
pub(crate) struct Folder {
    base: ModelBase,
    parent: ParentLink<Folder>,
    name: Field<String>,
    pub(crate) notes: ParentAwareList<Folder, Note>,
    pub(crate) children: NestedParentAwareList<Folder>,
}

impl Folder {
    pub(crate) fn new(name: &str) -> Arc<Self> {
        Arc::new_cyclic(|weak| {
            let folder = Self {
                base: ModelBase::new(),
                parent: ParentLink::new(),
                name: Field::new("name", name.to_string()),
                notes: ParentAwareList::builder()
                    .lookup("title", |note: &Note| note.title())
                    .build(),
                children: NestedParentAwareList::builder()
                    .lookup("name", |folder: &Folder| folder.name.get())
                    .build(),
            };
            folder.notes.set_parent(weak.clone());
            folder.children.set_parent(weak.clone());
            folder
        })
    }
}

impl EventedModel for Folder {
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

impl ParentAware for Folder {
    type Parent = Folder;

    fn parent_link(&self) -> &ParentLink<Folder> {
        &self.parent
    }
}

impl TreeNode for Folder {
    type Leaf = Note;

    fn node_name(&self) -> String {
        self.name.get()
    }

    fn child_nodes(&self) -> &NestedParentAwareList<Folder> {
        &self.children
    }

    fn leaf_items(&self) -> &ParentAwareList<Folder, Note> {
        &self.notes
    }
}

impl DeepClone for Folder {
    fn deep_clone(&self) -> ModelResult<Arc<Self>> {
        let copy = Folder::new(&self.node_name());
        let notes = self
            .notes
            .iter()
            .map(|note| note.deep_clone())
            .collect::<ModelResult<Vec<_>>>()?;
        copy.notes.extend(notes)?;
        let children = self
            .children
            .iter()
            .map(|child| child.deep_clone())
            .collect::<ModelResult<Vec<_>>>()?;
        copy.children.extend(children)?;
        Ok(copy)
    }
}

crate::impl_identity_eq!(Note);
crate::impl_identity_eq!(Folder);
