//! File-based stores for native platforms.

use super::{AnnotationStore, BoxFuture, StoreError, StoreResult, StyleStore};
use crate::annotation::{Annotation, AnnotationId};
use crate::style::StyleGroup;
use std::fs;
use std::path::{Path, PathBuf};

fn ensure_dir(path: &Path) -> StoreResult<()> {
    if !path.exists() {
        fs::create_dir_all(path).map_err(|e| {
            StoreError::Io(format!("Failed to create storage directory: {}", e))
        })?;
    }
    Ok(())
}

fn default_base() -> StoreResult<PathBuf> {
    let base = dirs::data_local_dir()
        .or_else(dirs::home_dir)
        .ok_or_else(|| StoreError::Io("Could not determine home directory".to_string()))?;
    Ok(base.join("slidemark"))
}

/// Sanitize a key to be safe as a file name.
fn file_name(key: &str) -> String {
    let safe: String = key
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    format!("{}.json", safe)
}

fn read_json(path: &Path) -> StoreResult<String> {
    fs::read_to_string(path)
        .map_err(|e| StoreError::Io(format!("Failed to read {}: {}", path.display(), e)))
}

fn write_json(path: &Path, json: String) -> StoreResult<()> {
    fs::write(path, json)
        .map_err(|e| StoreError::Io(format!("Failed to write {}: {}", path.display(), e)))
}

/// Annotation store writing one JSON file per annotation.
pub struct FileStore {
    base_path: PathBuf,
}

impl FileStore {
    /// Create a store in the given directory, creating it if needed.
    pub fn new(base_path: PathBuf) -> StoreResult<Self> {
        ensure_dir(&base_path)?;
        Ok(Self { base_path })
    }

    /// Create a store in the default location.
    ///
    /// On Unix: `~/.local/share/slidemark/annotations/`
    /// On Windows: `%LOCALAPPDATA%\slidemark\annotations\`
    pub fn default_location() -> StoreResult<Self> {
        Self::new(default_base()?.join("annotations"))
    }

    pub fn base_path(&self) -> &PathBuf {
        &self.base_path
    }

    fn annotation_path(&self, id: AnnotationId) -> PathBuf {
        self.base_path.join(file_name(&id.to_string()))
    }

    fn write(&self, annotation: &Annotation) -> StoreResult<()> {
        let json = serde_json::to_string_pretty(annotation)?;
        write_json(&self.annotation_path(annotation.id), json)
    }
}

impl AnnotationStore for FileStore {
    fn create(&self, annotation: &Annotation) -> BoxFuture<'_, StoreResult<()>> {
        let result = self.write(annotation);
        Box::pin(async move { result })
    }

    fn update(&self, annotation: &Annotation) -> BoxFuture<'_, StoreResult<()>> {
        let result = if self.annotation_path(annotation.id).exists() {
            self.write(annotation)
        } else {
            Err(StoreError::NotFound(annotation.id.to_string()))
        };
        Box::pin(async move { result })
    }

    fn fetch(&self, id: AnnotationId) -> BoxFuture<'_, StoreResult<Annotation>> {
        let path = self.annotation_path(id);
        Box::pin(async move {
            if !path.exists() {
                return Err(StoreError::NotFound(id.to_string()));
            }
            let json = read_json(&path)?;
            serde_json::from_str(&json).map_err(|e| {
                StoreError::Serialization(format!("Failed to parse {}: {}", path.display(), e))
            })
        })
    }

    fn destroy(&self, id: AnnotationId) -> BoxFuture<'_, StoreResult<()>> {
        let path = self.annotation_path(id);
        Box::pin(async move {
            if path.exists() {
                fs::remove_file(&path).map_err(|e| {
                    StoreError::Io(format!("Failed to delete {}: {}", path.display(), e))
                })?;
            }
            Ok(())
        })
    }
}

/// Style group store keeping one JSON array per user.
pub struct FileStyleStore {
    base_path: PathBuf,
}

impl FileStyleStore {
    pub fn new(base_path: PathBuf) -> StoreResult<Self> {
        ensure_dir(&base_path)?;
        Ok(Self { base_path })
    }

    /// Create a store in the default location (`<data dir>/slidemark/styles/`).
    pub fn default_location() -> StoreResult<Self> {
        Self::new(default_base()?.join("styles"))
    }

    fn user_path(&self, user: &str) -> PathBuf {
        self.base_path.join(file_name(user))
    }

    fn load(&self, user: &str) -> StoreResult<Vec<StyleGroup>> {
        let path = self.user_path(user);
        if !path.exists() {
            return Ok(Vec::new());
        }
        Ok(serde_json::from_str(&read_json(&path)?)?)
    }

    fn store(&self, user: &str, groups: &[StyleGroup]) -> StoreResult<()> {
        write_json(&self.user_path(user), serde_json::to_string_pretty(groups)?)
    }

    fn modify<F>(&self, user: &str, f: F) -> StoreResult<()>
    where
        F: FnOnce(&mut Vec<StyleGroup>) -> StoreResult<()>,
    {
        let mut groups = self.load(user)?;
        f(&mut groups)?;
        self.store(user, &groups)
    }
}

impl StyleStore for FileStyleStore {
    fn fetch_all(&self, user: &str) -> BoxFuture<'_, StoreResult<Vec<StyleGroup>>> {
        let result = self.load(user);
        Box::pin(async move { result })
    }

    fn add(&self, user: &str, group: &StyleGroup) -> BoxFuture<'_, StoreResult<()>> {
        let result = self.modify(user, |groups| {
            if groups.iter().any(|g| g.id == group.id) {
                return Err(StoreError::Other(format!("Style group {} already exists", group.id)));
            }
            groups.push(group.clone());
            Ok(())
        });
        Box::pin(async move { result })
    }

    fn save(&self, user: &str, group: &StyleGroup) -> BoxFuture<'_, StoreResult<()>> {
        let result = self.modify(user, |groups| {
            let existing = groups
                .iter_mut()
                .find(|g| g.id == group.id)
                .ok_or_else(|| StoreError::NotFound(group.id.clone()))?;
            *existing = group.clone();
            Ok(())
        });
        Box::pin(async move { result })
    }

    fn destroy(&self, user: &str, id: &str) -> BoxFuture<'_, StoreResult<()>> {
        let result = self.modify(user, |groups| {
            groups.retain(|g| g.id != id);
            Ok(())
        });
        Box::pin(async move { result })
    }
}
