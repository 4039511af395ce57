//! Per-annotation save scheduling.
//!
//! The scheduler never performs I/O itself. It queues [`SaveRequest`]s that
//! the owner drains with [`SaveScheduler::poll_requests`], performs against an
//! [`AnnotationStore`](super::AnnotationStore), and reports back through
//! [`SaveScheduler::complete`]. Retry timers are driven by
//! [`SaveScheduler::tick`]. Every method that depends on time takes `now`.
//!
//! At most one write (or delete) per annotation is in flight at any time.
//! Mutations that arrive while a write is outstanding collapse into a single
//! follow-up write of the newest snapshot.

use super::StoreResult;
use crate::annotation::AnnotationId;
use std::collections::HashMap;

#[cfg(not(target_arch = "wasm32"))]
use std::time::{Duration, Instant};

#[cfg(target_arch = "wasm32")]
use web_time::{Duration, Instant};

/// Delay before the first retry of a failed write.
pub const DEFAULT_INITIAL_RETRY_MS: u64 = 5_000;

/// Upper bound on the retry delay.
pub const DEFAULT_MAX_RETRY_MS: u64 = 300_000;

/// Exponential backoff policy for failed writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub initial: Duration,
    pub max: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(DEFAULT_INITIAL_RETRY_MS),
            max: Duration::from_millis(DEFAULT_MAX_RETRY_MS),
        }
    }
}

impl Backoff {
    pub fn from_millis(initial_ms: u64, max_ms: u64) -> Self {
        Self {
            initial: Duration::from_millis(initial_ms),
            max: Duration::from_millis(max_ms),
        }
    }

    /// Delay after `failures` consecutive failures: `min(initial * 2^(k-1), max)`.
    pub fn delay(&self, failures: u32) -> Duration {
        if failures == 0 {
            return Duration::ZERO;
        }
        let factor = 1u32.checked_shl(failures - 1).unwrap_or(u32::MAX);
        self.initial.saturating_mul(factor).min(self.max)
    }
}

/// What has to happen once the outstanding write finishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowUp {
    /// Nothing changed since the write was issued.
    Clean,
    /// Newer mutations exist; write again with the latest snapshot.
    Dirty,
    /// The annotation was deleted; delete remotely instead of writing.
    Delete,
}

/// Operation to perform when a retry timer elapses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryAction {
    Write,
    Delete,
}

/// Save state of one annotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveState {
    Idle,
    /// A write is in flight.
    Saving { follow_up: FollowUp },
    /// The last attempt failed; retry once `due` is reached.
    PendingRetry {
        delay: Duration,
        due: Instant,
        action: RetryAction,
    },
    /// A delete is in flight.
    PendingDelete,
}

/// Work the owner has to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveRequest {
    /// Write the current snapshot of the annotation.
    Write(AnnotationId),
    /// Delete the annotation remotely.
    Delete(AnnotationId),
    /// A previously deferred refresh can run now.
    Refresh,
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    state: SaveState,
    failures: u32,
    fetching: bool,
}

impl Default for Entry {
    fn default() -> Self {
        Self {
            state: SaveState::Idle,
            failures: 0,
            fetching: false,
        }
    }
}

/// Serializes remote writes per annotation.
#[derive(Debug, Default)]
pub struct SaveScheduler {
    backoff: Backoff,
    entries: HashMap<AnnotationId, Entry>,
    requests: Vec<SaveRequest>,
    refresh_deferred: bool,
}

impl SaveScheduler {
    /// Create a scheduler with the given backoff policy.
    pub fn new(backoff: Backoff) -> Self {
        Self {
            backoff,
            ..Self::default()
        }
    }

    pub fn backoff(&self) -> Backoff {
        self.backoff
    }

    /// Current state of an annotation (`Idle` if unknown).
    pub fn state(&self, id: AnnotationId) -> SaveState {
        self.entries.get(&id).map_or(SaveState::Idle, |e| e.state)
    }

    /// Consecutive failures of the current write sequence.
    pub fn failure_count(&self, id: AnnotationId) -> u32 {
        self.entries.get(&id).map_or(0, |e| e.failures)
    }

    /// Whether any annotation is saving or waiting to retry.
    pub fn is_saving(&self) -> bool {
        self.entries.values().any(|e| {
            matches!(e.state, SaveState::Saving { .. } | SaveState::PendingRetry { .. })
        })
    }

    /// Earliest pending retry, if any.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.entries
            .values()
            .filter_map(|e| match e.state {
                SaveState::PendingRetry { due, .. } => Some(due),
                _ => None,
            })
            .min()
    }

    /// Drain the queued requests.
    pub fn poll_requests(&mut self) -> Vec<SaveRequest> {
        std::mem::take(&mut self.requests)
    }

    /// Mark an annotation as being (re)fetched. Mutations are ignored until
    /// [`end_fetch`](Self::end_fetch), since the fetch replaces local content.
    pub fn begin_fetch(&mut self, id: AnnotationId) {
        self.entries.entry(id).or_default().fetching = true;
    }

    pub fn end_fetch(&mut self, id: AnnotationId) {
        if let Some(entry) = self.entries.get_mut(&id) {
            entry.fetching = false;
        }
    }

    /// Record that the annotation's elements changed.
    pub fn notify_mutated(&mut self, id: AnnotationId) {
        let entry = self.entries.entry(id).or_default();
        if entry.fetching {
            log::debug!("Ignoring mutation of {} while it is being fetched", id);
            return;
        }
        match entry.state {
            SaveState::Idle => {
                entry.state = SaveState::Saving { follow_up: FollowUp::Clean };
                self.requests.push(SaveRequest::Write(id));
                log::debug!("Saving annotation {}", id);
            }
            SaveState::Saving { follow_up: FollowUp::Clean } => {
                entry.state = SaveState::Saving { follow_up: FollowUp::Dirty };
            }
            SaveState::Saving { .. } => {}
            SaveState::PendingRetry { .. } => {
                // The retry writes whatever the snapshot is when it fires
            }
            SaveState::PendingDelete => {
                log::debug!("Ignoring mutation of {}: delete in progress", id);
            }
        }
    }

    /// Record that the annotation was deleted locally.
    pub fn notify_delete_requested(&mut self, id: AnnotationId) {
        let entry = self.entries.entry(id).or_default();
        match entry.state {
            SaveState::Idle | SaveState::PendingRetry { .. } => {
                entry.failures = 0;
                entry.state = SaveState::PendingDelete;
                self.requests.push(SaveRequest::Delete(id));
                log::debug!("Deleting annotation {}", id);
            }
            SaveState::Saving { .. } => {
                entry.state = SaveState::Saving { follow_up: FollowUp::Delete };
            }
            SaveState::PendingDelete => {}
        }
        self.settle();
    }

    /// Report the result of a previously requested write or delete.
    pub fn complete(&mut self, id: AnnotationId, result: &StoreResult<()>, now: Instant) {
        let Some(entry) = self.entries.get_mut(&id) else {
            log::warn!("Ignoring completion for unknown annotation {}", id);
            return;
        };

        match (entry.state, result) {
            (SaveState::Saving { follow_up }, Ok(())) => {
                entry.failures = 0;
                match follow_up {
                    FollowUp::Clean => {
                        entry.state = SaveState::Idle;
                        log::info!("Saved annotation {}", id);
                    }
                    FollowUp::Dirty => {
                        entry.state = SaveState::Saving { follow_up: FollowUp::Clean };
                        self.requests.push(SaveRequest::Write(id));
                    }
                    FollowUp::Delete => {
                        entry.state = SaveState::PendingDelete;
                        self.requests.push(SaveRequest::Delete(id));
                    }
                }
            }
            (SaveState::Saving { follow_up }, Err(err)) => {
                if follow_up == FollowUp::Delete {
                    // The write no longer matters; the delete backs off on its own
                    entry.failures = 0;
                    entry.state = SaveState::PendingDelete;
                    self.requests.push(SaveRequest::Delete(id));
                } else {
                    entry.failures += 1;
                    let delay = self.backoff.delay(entry.failures);
                    log::warn!(
                        "Saving annotation {} failed ({}); retry {} in {:?}",
                        id, err, entry.failures, delay
                    );
                    entry.state = SaveState::PendingRetry {
                        delay,
                        due: now + delay,
                        action: RetryAction::Write,
                    };
                }
            }
            (SaveState::PendingDelete, Ok(())) => {
                log::info!("Deleted annotation {}", id);
                self.entries.remove(&id);
            }
            (SaveState::PendingDelete, Err(err)) => {
                entry.failures += 1;
                let delay = self.backoff.delay(entry.failures);
                log::warn!("Deleting annotation {} failed ({}); retry in {:?}", id, err, delay);
                entry.state = SaveState::PendingRetry {
                    delay,
                    due: now + delay,
                    action: RetryAction::Delete,
                };
            }
            (state, _) => {
                log::warn!("Ignoring completion for {} in state {:?}", id, state);
            }
        }
        self.settle();
    }

    /// Fire every retry whose delay has elapsed.
    pub fn tick(&mut self, now: Instant) {
        let mut due: Vec<(Instant, AnnotationId)> = self
            .entries
            .iter()
            .filter_map(|(id, e)| match e.state {
                SaveState::PendingRetry { due, .. } if due <= now => Some((due, *id)),
                _ => None,
            })
            .collect();
        due.sort();

        for (_, id) in due {
            let Some(entry) = self.entries.get_mut(&id) else {
                continue;
            };
            if let SaveState::PendingRetry { action, .. } = entry.state {
                match action {
                    RetryAction::Write => {
                        entry.state = SaveState::Saving { follow_up: FollowUp::Clean };
                        self.requests.push(SaveRequest::Write(id));
                    }
                    RetryAction::Delete => {
                        entry.state = SaveState::PendingDelete;
                        self.requests.push(SaveRequest::Delete(id));
                    }
                }
                log::debug!("Retrying {:?} for annotation {}", action, id);
            }
        }
    }

    /// Ask to refresh annotations from the remote store.
    ///
    /// Returns true if the refresh may run now. Otherwise it is deferred and a
    /// [`SaveRequest::Refresh`] is queued once nothing is saving.
    pub fn request_refresh(&mut self) -> bool {
        if self.is_saving() {
            self.refresh_deferred = true;
            return false;
        }
        self.refresh_deferred = false;
        true
    }

    /// Drop an idle annotation from tracking.
    pub fn forget(&mut self, id: AnnotationId) -> bool {
        if self.state(id) == SaveState::Idle {
            self.entries.remove(&id);
            true
        } else {
            false
        }
    }

    fn settle(&mut self) {
        if self.refresh_deferred && !self.is_saving() {
            self.refresh_deferred = false;
            self.requests.push(SaveRequest::Refresh);
        }
    }
}
