//! In-memory store implementations.

use super::{AnnotationStore, BoxFuture, StoreError, StoreResult, StyleStore};
use crate::annotation::{Annotation, AnnotationId};
use crate::style::StyleGroup;
use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicU32, Ordering};

fn lock_error(e: impl std::fmt::Display) -> StoreError {
    StoreError::Other(format!("Lock error: {}", e))
}

/// In-memory annotation store for testing and ephemeral use.
///
/// Writes can be made to fail with [`fail_next`](Self::fail_next) to exercise
/// retry handling.
#[derive(Default)]
pub struct MemoryStore {
    annotations: RwLock<HashMap<AnnotationId, Annotation>>,
    pending_failures: AtomicU32,
    writes: AtomicU32,
}

impl MemoryStore {
    /// Create a new empty memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` writes (create, update or destroy) fail.
    pub fn fail_next(&self, count: u32) {
        self.pending_failures.store(count, Ordering::SeqCst);
    }

    /// Number of write attempts seen, including failed ones.
    pub fn write_count(&self) -> u32 {
        self.writes.load(Ordering::SeqCst)
    }

    /// Snapshot of a stored annotation.
    pub fn get(&self, id: AnnotationId) -> Option<Annotation> {
        self.annotations.read().ok()?.get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        self.annotations.read().map(|a| a.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn attempt_write(&self) -> StoreResult<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        let injected = self
            .pending_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            Err(StoreError::Transport("injected failure".to_string()))
        } else {
            Ok(())
        }
    }
}

impl AnnotationStore for MemoryStore {
    fn create(&self, annotation: &Annotation) -> BoxFuture<'_, StoreResult<()>> {
        let annotation = annotation.clone();
        Box::pin(async move {
            self.attempt_write()?;
            let mut annotations = self.annotations.write().map_err(lock_error)?;
            annotations.insert(annotation.id, annotation);
            Ok(())
        })
    }

    fn update(&self, annotation: &Annotation) -> BoxFuture<'_, StoreResult<()>> {
        let annotation = annotation.clone();
        Box::pin(async move {
            self.attempt_write()?;
            let mut annotations = self.annotations.write().map_err(lock_error)?;
            match annotations.get_mut(&annotation.id) {
                Some(existing) => {
                    *existing = annotation;
                    Ok(())
                }
                None => Err(StoreError::NotFound(annotation.id.to_string())),
            }
        })
    }

    fn fetch(&self, id: AnnotationId) -> BoxFuture<'_, StoreResult<Annotation>> {
        Box::pin(async move {
            let annotations = self.annotations.read().map_err(lock_error)?;
            annotations
                .get(&id)
                .cloned()
                .ok_or_else(|| StoreError::NotFound(id.to_string()))
        })
    }

    fn destroy(&self, id: AnnotationId) -> BoxFuture<'_, StoreResult<()>> {
        Box::pin(async move {
            self.attempt_write()?;
            let mut annotations = self.annotations.write().map_err(lock_error)?;
            annotations.remove(&id);
            Ok(())
        })
    }
}

/// In-memory style group store keyed by user.
#[derive(Default)]
pub struct MemoryStyleStore {
    groups: RwLock<HashMap<String, Vec<StyleGroup>>>,
}

impl MemoryStyleStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StyleStore for MemoryStyleStore {
    fn fetch_all(&self, user: &str) -> BoxFuture<'_, StoreResult<Vec<StyleGroup>>> {
        let user = user.to_string();
        Box::pin(async move {
            let groups = self.groups.read().map_err(lock_error)?;
            Ok(groups.get(&user).cloned().unwrap_or_default())
        })
    }

    fn add(&self, user: &str, group: &StyleGroup) -> BoxFuture<'_, StoreResult<()>> {
        let user = user.to_string();
        let group = group.clone();
        Box::pin(async move {
            let mut groups = self.groups.write().map_err(lock_error)?;
            let list = groups.entry(user).or_default();
            if list.iter().any(|g| g.id == group.id) {
                return Err(StoreError::Other(format!("Style group {} already exists", group.id)));
            }
            list.push(group);
            Ok(())
        })
    }

    fn save(&self, user: &str, group: &StyleGroup) -> BoxFuture<'_, StoreResult<()>> {
        let user = user.to_string();
        let group = group.clone();
        Box::pin(async move {
            let mut groups = self.groups.write().map_err(lock_error)?;
            let existing = groups
                .get_mut(&user)
                .and_then(|list| list.iter_mut().find(|g| g.id == group.id))
                .ok_or_else(|| StoreError::NotFound(group.id.clone()))?;
            *existing = group;
            Ok(())
        })
    }

    fn destroy(&self, user: &str, id: &str) -> BoxFuture<'_, StoreResult<()>> {
        let user = user.to_string();
        let id = id.to_string();
        Box::pin(async move {
            let mut groups = self.groups.write().map_err(lock_error)?;
            if let Some(list) = groups.get_mut(&user) {
                list.retain(|g| g.id != id);
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elements::Color;

    fn block_on<F: std::future::Future>(f: F) -> F::Output {
        // Simple blocking executor for tests
        use std::task::{Context, Poll, RawWaker, RawWakerVTable, Waker};

        fn dummy_raw_waker() -> RawWaker {
            fn no_op(_: *const ()) {}
            fn clone(_: *const ()) -> RawWaker {
                dummy_raw_waker()
            }
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

    #[test]
    fn test_create_and_fetch() {
        let store = MemoryStore::new();
        let ann = Annotation::new("cells");

        block_on(store.create(&ann)).unwrap();
        let loaded = block_on(store.fetch(ann.id)).unwrap();

        assert_eq!(loaded.name, "cells");
        assert_eq!(store.write_count(), 1);
    }

    #[test]
    fn test_update_missing_is_not_found() {
        let store = MemoryStore::new();
        let result = block_on(store.update(&Annotation::new("cells")));
        assert!(matches!(result, Err(StoreError::NotFound(_))));
    }

    #[test]
    fn test_injected_failures() {
        let store = MemoryStore::new();
        let ann = Annotation::new("cells");
        store.fail_next(2);

        assert!(matches!(block_on(store.create(&ann)), Err(StoreError::Transport(_))));
        assert!(block_on(store.create(&ann)).is_err());
        assert!(block_on(store.create(&ann)).is_ok());
        assert_eq!(store.write_count(), 3);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_destroy() {
        let store = MemoryStore::new();
        let ann = Annotation::new("cells");
        block_on(store.create(&ann)).unwrap();
        block_on(store.destroy(ann.id)).unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn test_style_store_scoped_per_user() {
        let store = MemoryStyleStore::new();
        let group = StyleGroup::new("tumor", Color::rgb(255, 0, 0), Color::transparent());

        block_on(store.add("alice", &group)).unwrap();
        assert!(block_on(store.add("alice", &group)).is_err());
        assert_eq!(block_on(store.fetch_all("alice")).unwrap().len(), 1);
        assert!(block_on(store.fetch_all("bob")).unwrap().is_empty());

        let mut changed = group.clone();
        changed.line_width = 5.0;
        block_on(store.save("alice", &changed)).unwrap();
        assert_eq!(block_on(store.fetch_all("alice")).unwrap()[0].line_width, 5.0);
        assert!(matches!(block_on(store.save("bob", &changed)), Err(StoreError::NotFound(_))));

        block_on(store.destroy("alice", "tumor")).unwrap();
        assert!(block_on(store.fetch_all("alice")).unwrap().is_empty());
    }
}
