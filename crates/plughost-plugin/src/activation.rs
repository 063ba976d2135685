//! Queue of listeners waiting for a synthesized `activated_async`.
//!
//! Modules loaded while a view is already focused never saw that view
//! become active. Their async activation handlers are queued at load and
//! replayed once from the worker context.

use std::mem;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::registry::{ListenerEntry, ViewClassEntry};

#[derive(Default)]
struct Pending {
    listeners: Vec<Arc<ListenerEntry>>,
    view_classes: Vec<Arc<ViewClassEntry>>,
}

/// Enqueued from the load path, drained from the worker path.
#[derive(Default)]
pub(crate) struct PendingActivations {
    inner: Mutex<Pending>,
}

impl PendingActivations {
    pub fn push(&self, listeners: Vec<Arc<ListenerEntry>>, view_classes: Vec<Arc<ViewClassEntry>>) {
        let mut inner = self.inner.lock();
        inner.listeners.extend(listeners);
        inner.view_classes.extend(view_classes);
    }

    /// Take everything queued; the queue is empty afterwards.
    pub fn drain(&self) -> (Vec<Arc<ListenerEntry>>, Vec<Arc<ViewClassEntry>>) {
        let mut inner = self.inner.lock();
        (mem::take(&mut inner.listeners), mem::take(&mut inner.view_classes))
    }

    /// Drop entries of an unloaded module.
    pub fn remove_module(&self, module: &str) {
        let mut inner = self.inner.lock();
        inner.listeners.retain(|l| l.module != module);
        inner.view_classes.retain(|c| c.module != module);
    }

    pub fn len(&self) -> usize {
        let inner = self.inner.lock();
        inner.listeners.len() + inner.view_classes.len()
    }
}
