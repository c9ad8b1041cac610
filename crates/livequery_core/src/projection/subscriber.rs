//! Presentation-side observer of projection changes.
//!
//! # Invariants
//! - Notifications are delivered synchronously on the thread that applied
//!   the mutation.
//! - Subscribers receive borrowed events only and have no handle back into
//!   the owning service, so they cannot re-enter it.

use crate::projection::event::ChangeEvent;
use crate::projection::layout::ProjectionLayout;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Receives structural changes of one open projection.
pub trait ProjectionSubscriber: Send {
    /// Called once before the events of one mutation.
    fn will_change_content(&mut self) {}

    fn did_change(&mut self, event: &ChangeEvent);

    /// Called once after the events of one mutation.
    fn did_change_content(&mut self) {}

    /// Layout was replaced wholesale; redraw everything.
    fn did_reload(&mut self, _layout: &ProjectionLayout) {}
}

/// Subscriber that ignores every notification.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSubscriber;

impl ProjectionSubscriber for NoopSubscriber {
    fn did_change(&mut self, _event: &ChangeEvent) {}
}

#[derive(Debug, Default)]
struct ChangeLogState {
    events: Vec<ChangeEvent>,
    batches: usize,
    reloads: usize,
}

/// Recording subscriber; clones share the same log.
#[derive(Debug, Default, Clone)]
pub struct ChangeLog {
    state: Arc<Mutex<ChangeLogState>>,
}

impl ChangeLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns and clears recorded events.
    pub fn take_events(&self) -> Vec<ChangeEvent> {
        std::mem::take(&mut self.lock().events)
    }

    pub fn events(&self) -> Vec<ChangeEvent> {
        self.lock().events.clone()
    }

    /// Number of completed `will_change`/`did_change` brackets.
    pub fn batch_count(&self) -> usize {
        self.lock().batches
    }

    pub fn reload_count(&self) -> usize {
        self.lock().reloads
    }

    fn lock(&self) -> MutexGuard<'_, ChangeLogState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ProjectionSubscriber for ChangeLog {
    fn did_change(&mut self, event: &ChangeEvent) {
        self.lock().events.push(*event);
    }

    fn did_change_content(&mut self) {
        self.lock().batches += 1;
    }

    fn did_reload(&mut self, _layout: &ProjectionLayout) {
        self.lock().reloads += 1;
    }
}
