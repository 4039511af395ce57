//! Style groups: named line/fill presets shared by every open annotation.

mod reconcile;

pub use reconcile::{ReconcileOutcome, Reconciliation, reconcile, reconcile_pixelmap};

use crate::elements::{Category, Color, ElementStyle};
use crate::storage::{StoreResult, StyleStore};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Name of the default style group unless configured otherwise.
pub const DEFAULT_GROUP_NAME: &str = "default";

/// Style registry errors.
#[derive(Debug, Error)]
pub enum StyleError {
    #[error("Invalid style group: {0}")]
    InvalidGroup(String),
    #[error("Unknown style group: {0}")]
    UnknownGroup(String),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// A named style preset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StyleGroup {
    /// Group name; unique within a registry.
    pub id: String,
    pub line_color: Color,
    pub fill_color: Color,
    #[serde(default = "default_line_width")]
    pub line_width: f64,
    /// Label given to elements drawn with this group.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

fn default_line_width() -> f64 {
    2.0
}

impl StyleGroup {
    pub fn new(id: impl Into<String>, line_color: Color, fill_color: Color) -> Self {
        Self {
            id: id.into(),
            line_color,
            fill_color,
            line_width: default_line_width(),
            label: None,
        }
    }

    /// The stock default group: black outline, no fill.
    pub fn default_named(id: impl Into<String>) -> Self {
        Self::new(id, Color::black(), Color::transparent())
    }

    /// Synthesize a group from a pixelmap category.
    pub fn from_category(category: &Category) -> Self {
        Self::new(category.label.clone(), category.stroke_color, category.fill_color)
    }

    /// Pixelmap category carrying this group's colors.
    pub fn to_category(&self) -> Category {
        Category::new(self.id.clone(), self.line_color, self.fill_color)
    }

    /// Whether a category already carries this group's colors.
    pub fn colors_match(&self, category: &Category) -> bool {
        category.stroke_color == self.line_color && category.fill_color == self.fill_color
    }

    /// Style applied to elements drawn with this group.
    ///
    /// The `group` attribute is omitted for the default group.
    pub fn element_style(&self, default_name: &str) -> ElementStyle {
        ElementStyle {
            line_color: self.line_color,
            fill_color: self.fill_color,
            line_width: self.line_width,
            label: self.label.clone(),
            group: (self.id != default_name).then(|| self.id.clone()),
        }
    }

    /// Reject groups with an empty name or an invalid line width.
    pub fn validate(&self) -> Result<(), StyleError> {
        if self.id.trim().is_empty() {
            return Err(StyleError::InvalidGroup("empty name".to_string()));
        }
        if !(self.line_width.is_finite() && self.line_width >= 0.0) {
            return Err(StyleError::InvalidGroup(format!(
                "{}: line width {}",
                self.id, self.line_width
            )));
        }
        Ok(())
    }
}

/// How imported groups combine with the existing ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportMode {
    /// Update groups with matching names and append the rest.
    Merge,
    /// Discard existing groups first.
    Replace,
}

/// Ordered collection of style groups with an active selection.
///
/// Groups are only appended or updated in place, never reordered, so that
/// category indices derived from the registry stay valid for other sessions.
#[derive(Debug, Clone, PartialEq)]
pub struct StyleGroupRegistry {
    default_name: String,
    groups: Vec<StyleGroup>,
    active: String,
}

impl Default for StyleGroupRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_GROUP_NAME)
    }
}

impl StyleGroupRegistry {
    /// Create a registry containing only the default group.
    pub fn new(default_name: impl Into<String>) -> Self {
        let default_name = default_name.into();
        Self {
            groups: vec![StyleGroup::default_named(default_name.clone())],
            active: default_name.clone(),
            default_name,
        }
    }

    /// Create a registry from stored groups, adding the default if needed.
    pub fn from_groups(default_name: impl Into<String>, groups: Vec<StyleGroup>) -> Self {
        let mut registry = Self::new(default_name);
        registry.groups.clear();
        for group in groups {
            registry.upsert(group);
        }
        registry.ensure_default();
        registry
    }

    pub fn default_name(&self) -> &str {
        &self.default_name
    }

    pub fn default_group(&self) -> Option<&StyleGroup> {
        self.get(&self.default_name)
    }

    pub fn get(&self, id: &str) -> Option<&StyleGroup> {
        self.groups.iter().find(|g| g.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &StyleGroup> {
        self.groups.iter()
    }

    pub fn groups(&self) -> &[StyleGroup] {
        &self.groups
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Add a group, or update the one with the same name in place.
    /// Returns true if the group was new.
    pub fn upsert(&mut self, group: StyleGroup) -> bool {
        match self.groups.iter_mut().find(|g| g.id == group.id) {
            Some(existing) => {
                *existing = group;
                false
            }
            None => {
                self.groups.push(group);
                true
            }
        }
    }

    /// Remove a group. Removing the default group recreates it with stock
    /// colors; removing the active group activates the default.
    pub fn remove(&mut self, id: &str) -> Option<StyleGroup> {
        let index = self.groups.iter().position(|g| g.id == id)?;
        let removed = self.groups.remove(index);
        if self.active == removed.id {
            self.active = self.default_name.clone();
        }
        self.ensure_default();
        Some(removed)
    }

    /// Make sure the default group exists. Returns true if it was created.
    pub fn ensure_default(&mut self) -> bool {
        if self.contains(&self.default_name) {
            return false;
        }
        log::debug!("Creating default style group '{}'", self.default_name);
        self.groups.push(StyleGroup::default_named(self.default_name.clone()));
        true
    }

    /// Name of the active group.
    pub fn active(&self) -> &str {
        &self.active
    }

    /// The active group, falling back to the default group.
    pub fn active_group(&self) -> Option<&StyleGroup> {
        self.get(&self.active).or_else(|| self.default_group())
    }

    /// Style for elements drawn with the active group.
    pub fn active_element_style(&self) -> ElementStyle {
        self.active_group()
            .map(|g| g.element_style(&self.default_name))
            .unwrap_or_default()
    }

    pub fn set_active(&mut self, id: &str) -> Result<(), StyleError> {
        if !self.contains(id) {
            return Err(StyleError::UnknownGroup(id.to_string()));
        }
        self.active = id.to_string();
        Ok(())
    }

    /// Activate the next group, wrapping around.
    pub fn next_group(&mut self) -> Option<&StyleGroup> {
        self.step_active(1)
    }

    /// Activate the previous group, wrapping around.
    pub fn prev_group(&mut self) -> Option<&StyleGroup> {
        self.step_active(-1)
    }

    fn step_active(&mut self, step: isize) -> Option<&StyleGroup> {
        let len = self.groups.len() as isize;
        if len == 0 {
            return None;
        }
        let current = self
            .groups
            .iter()
            .position(|g| g.id == self.active)
            .map_or(0, |i| i as isize);
        let index = (current + step).rem_euclid(len) as usize;
        self.active = self.groups[index].id.clone();
        self.groups.get(index)
    }

    /// Serialize all groups as a JSON array.
    pub fn export_json(&self) -> Result<String, StyleError> {
        Ok(serde_json::to_string_pretty(&self.groups)?)
    }

    /// Import groups from a JSON array. Returns the number of groups imported.
    pub fn import_json(&mut self, json: &str, mode: ImportMode) -> Result<usize, StyleError> {
        let imported: Vec<StyleGroup> = serde_json::from_str(json)?;
        for group in &imported {
            group.validate()?;
        }
        let count = imported.len();
        if mode == ImportMode::Replace {
            self.groups.clear();
        }
        for group in imported {
            self.upsert(group);
        }
        self.ensure_default();
        if !self.contains(&self.active) {
            self.active = self.default_name.clone();
        }
        log::info!("Imported {} style groups ({:?})", count, mode);
        Ok(count)
    }

    /// Replace every group with a set of defaults.
    pub fn reset_to(&mut self, defaults: Vec<StyleGroup>) {
        self.groups.clear();
        for group in defaults {
            self.upsert(group);
        }
        self.ensure_default();
        self.active = self.default_name.clone();
    }
}

/// Load a user's style groups, creating and persisting the default group
/// when the store does not have it.
pub async fn load_registry<S: StyleStore + ?Sized>(
    store: &S,
    user: &str,
    default_name: &str,
) -> StoreResult<StyleGroupRegistry> {
    let groups = store.fetch_all(user).await?;
    let had_default = groups.iter().any(|g| g.id == default_name);
    let registry = StyleGroupRegistry::from_groups(default_name, groups);
    if !had_default {
        if let Some(default) = registry.default_group() {
            store.add(user, default).await?;
        }
    }
    log::debug!("Loaded {} style groups for {}", registry.len(), user);
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStyleStore;

    fn block_on<F: std::future::Future>(f: F) -> F::Output {
        use std::task::{Context, Poll, RawWaker, RawWakerVTable, Waker};

        fn dummy_raw_waker() -> RawWaker {
            fn no_op(_: *const ()) {}
            fn clone(_: *const ()) -> RawWaker { dummy_raw_waker() }
            static VTABLE: RawWakerVTable = RawWakerVTable::new(clone, no_op, no_op, no_op);
            RawWaker::new(std::ptr::null(), &VTABLE)
        }

        let waker = unsafe { Waker::from_raw(dummy_raw_waker()) };
        let mut cx = Context::from_waker(&waker);
        let mut f = std::pin::pin!(f);

        loop {
            match f.as_mut().poll(&mut cx) {
                Poll::Ready(result) => return result,
                Poll::Pending => {}
            }
        }
    }

    fn red(id: &str) -> StyleGroup {
        StyleGroup::new(id, Color::rgb(255, 0, 0), Color::new(255, 0, 0, 64))
    }

    #[test]
    fn test_default_group_always_present() {
        let mut registry = StyleGroupRegistry::default();
        assert!(registry.contains(DEFAULT_GROUP_NAME));

        let mut custom = StyleGroup::default_named(DEFAULT_GROUP_NAME);
        custom.line_width = 7.0;
        registry.upsert(custom);
        assert!(registry.remove(DEFAULT_GROUP_NAME).is_some());
        assert_eq!(registry.default_group().map(|g| g.line_width), Some(2.0));
    }

    #[test]
    fn test_upsert_keeps_position() {
        let mut registry = StyleGroupRegistry::default();
        assert!(registry.upsert(red("tumor")));
        assert!(registry.upsert(red("stroma")));
        let mut changed = red("tumor");
        changed.line_width = 4.0;
        assert!(!registry.upsert(changed));
        let ids: Vec<&str> = registry.iter().map(|g| g.id.as_str()).collect();
        assert_eq!(ids, vec!["default", "tumor", "stroma"]);
        assert_eq!(registry.get("tumor").map(|g| g.line_width), Some(4.0));
    }

    #[test]
    fn test_cycle_active_group() {
        let mut registry = StyleGroupRegistry::default();
        registry.upsert(red("tumor"));
        registry.upsert(red("stroma"));

        assert_eq!(registry.next_group().map(|g| g.id.clone()), Some("tumor".into()));
        assert_eq!(registry.next_group().map(|g| g.id.clone()), Some("stroma".into()));
        assert_eq!(registry.next_group().map(|g| g.id.clone()), Some("default".into()));
        assert_eq!(registry.prev_group().map(|g| g.id.clone()), Some("stroma".into()));
    }

    #[test]
    fn test_element_style_omits_default_group() {
        let registry = StyleGroupRegistry::default();
        assert_eq!(registry.active_element_style().group, None);

        let style = red("tumor").element_style(DEFAULT_GROUP_NAME);
        assert_eq!(style.group.as_deref(), Some("tumor"));
        assert_eq!(style.line_color, Color::rgb(255, 0, 0));
    }

    #[test]
    fn test_removing_active_group_activates_default() {
        let mut registry = StyleGroupRegistry::default();
        registry.upsert(red("tumor"));
        registry.set_active("tumor").unwrap();
        registry.remove("tumor");
        assert_eq!(registry.active(), DEFAULT_GROUP_NAME);
        assert!(matches!(registry.set_active("tumor"), Err(StyleError::UnknownGroup(_))));
    }

    #[test]
    fn test_import_merge_and_replace() {
        let mut source = StyleGroupRegistry::default();
        source.upsert(red("tumor"));
        let json = source.export_json().unwrap();

        let mut target = StyleGroupRegistry::default();
        target.upsert(red("stroma"));
        assert_eq!(target.import_json(&json, ImportMode::Merge).unwrap(), 2);
        assert_eq!(target.len(), 3);

        let only_tumor = serde_json::to_string(&vec![red("tumor")]).unwrap();
        target.import_json(&only_tumor, ImportMode::Replace).unwrap();
        let ids: Vec<&str> = target.iter().map(|g| g.id.as_str()).collect();
        assert_eq!(ids, vec!["tumor", "default"]);
    }

    #[test]
    fn test_import_rejects_invalid_groups() {
        let mut registry = StyleGroupRegistry::default();
        let json = r#"[{"id": " ", "lineColor": "rgb(0,0,0)", "fillColor": "rgba(0,0,0,0)"}]"#;
        assert!(matches!(
            registry.import_json(json, ImportMode::Merge),
            Err(StyleError::InvalidGroup(_))
        ));
        assert!(registry.import_json("not json", ImportMode::Merge).is_err());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_reset_to_defaults() {
        let mut registry = StyleGroupRegistry::default();
        registry.upsert(red("tumor"));
        registry.set_active("tumor").unwrap();
        registry.reset_to(vec![red("necrosis")]);
        let ids: Vec<&str> = registry.iter().map(|g| g.id.as_str()).collect();
        assert_eq!(ids, vec!["necrosis", "default"]);
        assert_eq!(registry.active(), DEFAULT_GROUP_NAME);
    }

    #[test]
    fn test_load_registry_persists_missing_default() {
        let store = MemoryStyleStore::new();
        block_on(store.add("alice", &red("tumor"))).unwrap();

        let registry = block_on(load_registry(&store, "alice", DEFAULT_GROUP_NAME)).unwrap();
        assert!(registry.contains("tumor"));
        assert!(registry.contains(DEFAULT_GROUP_NAME));
        assert_eq!(block_on(store.fetch_all("alice")).unwrap().len(), 2);

        // Loading again does not add a second default
        block_on(load_registry(&store, "alice", DEFAULT_GROUP_NAME)).unwrap();
        assert_eq!(block_on(store.fetch_all("alice")).unwrap().len(), 2);
    }
}
