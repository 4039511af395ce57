//! Coalescing of high-frequency edits.

use crate::annotation::AnnotationId;
use std::collections::HashMap;

#[cfg(not(target_arch = "wasm32"))]
use std::time::{Duration, Instant};

#[cfg(target_arch = "wasm32")]
use web_time::{Duration, Instant};

/// Default delay before painted pixelmap edits are handed to the saver.
pub const DEFAULT_PIXELMAP_DEBOUNCE_MS: u64 = 500;

/// Delays save notifications for pixelmap painting.
///
/// The value buffer is updated immediately by the caller; only the
/// notification is held back, so a drag across many cells produces one write.
#[derive(Debug, Clone)]
pub struct PixelmapDebouncer {
    delay: Duration,
    pending: HashMap<AnnotationId, Instant>,
}

impl Default for PixelmapDebouncer {
    fn default() -> Self {
        Self::new(Duration::from_millis(DEFAULT_PIXELMAP_DEBOUNCE_MS))
    }
}

impl PixelmapDebouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: HashMap::new(),
        }
    }

    /// Record a painted edit. The first pending edit starts the timer.
    pub fn mark(&mut self, id: AnnotationId, now: Instant) {
        self.pending.entry(id).or_insert(now);
    }

    pub fn is_pending(&self, id: AnnotationId) -> bool {
        self.pending.contains_key(&id)
    }

    /// When the earliest pending notification is due.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.values().min().map(|first| *first + self.delay)
    }

    /// Release every annotation whose delay has elapsed.
    pub fn take_due(&mut self, now: Instant) -> Vec<AnnotationId> {
        let delay = self.delay;
        let mut due: Vec<(Instant, AnnotationId)> = self
            .pending
            .iter()
            .filter(|(_, first)| **first + delay <= now)
            .map(|(id, first)| (*first, *id))
            .collect();
        due.sort();
        for (_, id) in &due {
            self.pending.remove(id);
        }
        due.into_iter().map(|(_, id)| id).collect()
    }

    /// Release everything immediately.
    pub fn flush_all(&mut self) -> Vec<AnnotationId> {
        let mut all: Vec<(Instant, AnnotationId)> =
            self.pending.drain().map(|(id, first)| (first, id)).collect();
        all.sort();
        all.into_iter().map(|(_, id)| id).collect()
    }

    /// Drop a pending notification without releasing it.
    pub fn discard(&mut self, id: AnnotationId) {
        self.pending.remove(&id);
    }
}

/// Collects redraw requests so that each annotation is redrawn at most once
/// per frame.
#[derive(Debug, Clone, Default)]
pub struct RedrawQueue {
    pending: Vec<AnnotationId>,
}

impl RedrawQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&mut self, id: AnnotationId) {
        if !self.pending.contains(&id) {
            self.pending.push(id);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Annotations to redraw this frame, in request order.
    pub fn take_frame(&mut self) -> Vec<AnnotationId> {
        std::mem::take(&mut self.pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_debounce_releases_once_after_delay() {
        let mut debouncer = PixelmapDebouncer::default();
        let id = Uuid::new_v4();
        let start = Instant::now();

        for i in 0..20 {
            debouncer.mark(id, start + Duration::from_millis(i * 10));
        }
        assert_eq!(debouncer.next_deadline(), Some(start + Duration::from_millis(500)));
        assert!(debouncer.take_due(start + Duration::from_millis(499)).is_empty());
        assert_eq!(debouncer.take_due(start + Duration::from_millis(500)), vec![id]);
        assert!(!debouncer.is_pending(id));
        assert!(debouncer.take_due(start + Duration::from_secs(10)).is_empty());
    }

    #[test]
    fn test_flush_all() {
        let mut debouncer = PixelmapDebouncer::default();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let now = Instant::now();
        debouncer.mark(a, now);
        debouncer.mark(b, now + Duration::from_millis(1));
        assert_eq!(debouncer.flush_all(), vec![a, b]);
        assert!(debouncer.next_deadline().is_none());
    }

    #[test]
    fn test_redraw_queue_coalesces() {
        let mut queue = RedrawQueue::new();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        queue.request(a);
        queue.request(b);
        queue.request(a);
        assert_eq!(queue.take_frame(), vec![a, b]);
        assert!(queue.is_empty());
    }
}
