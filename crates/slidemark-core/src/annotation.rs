//! Annotations: a named, versioned element collection over one image.

use crate::elements::{Element, ElementId, ElementStore};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for annotations.
pub type AnnotationId = Uuid;

/// One annotation document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    pub id: AnnotationId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Whether the annotation is shown on the image.
    #[serde(default = "default_displayed")]
    pub displayed: bool,
    /// Bumped on every local mutation.
    #[serde(default)]
    pub version: u64,
    pub elements: ElementStore,
    /// Version of the last snapshot the remote store acknowledged.
    #[serde(skip)]
    saved_version: u64,
    /// Whether the remote store knows this annotation yet.
    #[serde(skip)]
    persisted: bool,
}

fn default_displayed() -> bool {
    true
}

impl Annotation {
    /// Create a new, unsaved annotation.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            description: String::new(),
            displayed: true,
            version: 0,
            elements: ElementStore::new(),
            saved_version: 0,
            persisted: false,
        }
    }

    /// Wrap an annotation that was fetched from the remote store.
    pub fn from_remote(mut annotation: Annotation) -> Self {
        annotation.saved_version = annotation.version;
        annotation.persisted = true;
        annotation
    }

    /// Record a local mutation.
    pub fn touch(&mut self) {
        self.version += 1;
    }

    /// Whether the remote store has been told about this annotation.
    pub fn is_persisted(&self) -> bool {
        self.persisted
    }

    /// Whether there are local changes the remote store has not acknowledged.
    pub fn is_modified(&self) -> bool {
        !self.persisted || self.version != self.saved_version
    }

    /// Mark a written snapshot as acknowledged.
    pub fn mark_saved(&mut self, version: u64) {
        self.persisted = true;
        self.saved_version = self.saved_version.max(version);
    }

    /// Replace local content with a refreshed remote copy.
    ///
    /// Refused (returns false) while local edits are unacknowledged, so a
    /// refresh never clobbers newer local work.
    pub fn accept_refresh(&mut self, remote: Annotation) -> bool {
        if self.is_modified() {
            return false;
        }
        let displayed = self.displayed;
        *self = Annotation::from_remote(remote);
        self.displayed = displayed;
        true
    }

    /// Add an element and record the mutation.
    pub fn add_element(&mut self, element: Element) {
        self.elements.add(element);
        self.touch();
    }

    /// Remove an element and record the mutation.
    pub fn remove_element(&mut self, id: ElementId) -> Option<Element> {
        let removed = self.elements.remove(id);
        if removed.is_some() {
            self.touch();
        }
        removed
    }

    /// Style groups referenced by this annotation's elements.
    pub fn groups(&self) -> Vec<String> {
        self.elements.groups()
    }
}
