//! Per-view and per-buffer listener instances.
//!
//! A view listener class has at most one instance per view, and only while
//! its applicability predicate holds. Buffers work the same way for
//! text-change listeners, without the primary-view rule.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use dashmap::DashMap;
use parking_lot::{Mutex, ReentrantMutex};
use plughost_core::{BufferId, Target, ViewId};

use crate::capability::{TextChangeListener, ViewEventListener};
use crate::fault::{CallSite, Guard};
use crate::registry::{RegistrySnapshot, TextChangeClassEntry, ViewClassEntry};
use crate::runtime::PluginHost;
use crate::types::{PluginError, PluginResult};

/// A live per-view listener.
#[derive(Clone)]
pub(crate) struct ViewBinding {
    pub class: Arc<ViewClassEntry>,
    pub instance: Arc<dyn ViewEventListener>,
}

/// A live per-buffer listener.
#[derive(Clone)]
pub(crate) struct BufferBinding {
    pub class: Arc<TextChangeClassEntry>,
    pub listener: Arc<AttachedListener>,
}

/// A text-change listener together with the buffer it is attached to.
pub(crate) struct AttachedListener {
    class: String,
    instance: Box<dyn TextChangeListener>,
    buffer: Mutex<Option<BufferId>>,
}

impl AttachedListener {
    pub fn new(class: impl Into<String>, instance: Box<dyn TextChangeListener>) -> Self {
        Self {
            class: class.into(),
            instance,
            buffer: Mutex::new(None),
        }
    }

    pub fn listener(&self) -> &dyn TextChangeListener {
        self.instance.as_ref()
    }

    pub fn attach(&self, buffer: BufferId) -> PluginResult<()> {
        let mut slot = self.buffer.lock();
        if slot.is_some() {
            return Err(PluginError::AlreadyAttached {
                class: self.class.clone(),
            });
        }
        *slot = Some(buffer);
        Ok(())
    }

    pub fn detach(&self) -> PluginResult<BufferId> {
        self.buffer.lock().take().ok_or_else(|| PluginError::NotAttached {
            class: self.class.clone(),
        })
    }

    pub fn buffer(&self) -> Option<BufferId> {
        *self.buffer.lock()
    }
}

/// View and buffer bindings plus per-handle dispatch locks.
#[derive(Default)]
pub(crate) struct Affinity {
    views: DashMap<ViewId, Vec<ViewBinding>>,
    buffers: DashMap<BufferId, Vec<BufferBinding>>,
    sweep_scheduled: AtomicBool,
    locks: DashMap<Target, Arc<ReentrantMutex<()>>>,
}

impl Affinity {
    /// The lock serializing dispatch for one handle. Re-entrant, so a
    /// callback may trigger further events on the same handle.
    pub fn handle_lock(&self, target: Target) -> Arc<ReentrantMutex<()>> {
        Arc::clone(
            self.locks
                .entry(target)
                .or_insert_with(|| Arc::new(ReentrantMutex::new(())))
                .value(),
        )
    }

    pub fn forget_lock(&self, target: Target) {
        self.locks.remove(&target);
    }

    #[cfg(test)]
    fn lock_count(&self) -> usize {
        self.locks.len()
    }

    pub fn view_bindings(&self, view: ViewId) -> Vec<ViewBinding> {
        self.views.get(&view).map(|b| b.value().clone()).unwrap_or_default()
    }

    pub fn find_view_binding(&self, view: ViewId, class: &Arc<ViewClassEntry>) -> Option<ViewBinding> {
        self.views
            .get(&view)?
            .iter()
            .find(|b| Arc::ptr_eq(&b.class, class))
            .cloned()
    }

    pub fn buffer_bindings(&self, buffer: BufferId) -> Vec<BufferBinding> {
        self.buffers.get(&buffer).map(|b| b.value().clone()).unwrap_or_default()
    }

    fn set_view(&self, view: ViewId, bindings: Vec<ViewBinding>) {
        self.views.insert(view, bindings);
    }

    fn set_buffer(&self, buffer: BufferId, bindings: Vec<BufferBinding>) {
        self.buffers.insert(buffer, bindings);
    }

    fn remove_view(&self, view: ViewId) -> bool {
        self.views.remove(&view).is_some()
    }

    fn remove_buffer(&self, buffer: BufferId) -> Vec<BufferBinding> {
        self.buffers.remove(&buffer).map(|(_, b)| b).unwrap_or_default()
    }

    pub fn has_view(&self, view: ViewId) -> bool {
        self.views.contains_key(&view)
    }

    /// Drop every instance of a module's classes. Returns the buffer
    /// listeners that must be detached.
    pub fn remove_module(&self, module: &str) -> Vec<BufferBinding> {
        self.views.alter_all(|_, mut bindings| {
            bindings.retain(|b| b.class.module != module);
            bindings
        });
        let mut removed = Vec::new();
        self.buffers.alter_all(|_, bindings| {
            let (gone, kept): (Vec<_>, Vec<_>) = bindings.into_iter().partition(|b| b.class.module == module);
            removed.extend(gone);
            kept
        });
        removed
    }

    /// Claim the pending sweep. `false` if one is already scheduled.
    fn claim_sweep(&self) -> bool {
        !self.sweep_scheduled.swap(true, Ordering::AcqRel)
    }

    fn finish_sweep(&self) {
        self.sweep_scheduled.store(false, Ordering::Release);
    }

    pub fn fill_snapshot(&self, snapshot: &mut RegistrySnapshot) {
        for entry in self.views.iter() {
            if !entry.value().is_empty() {
                let names = entry
                    .value()
                    .iter()
                    .map(|b| format!("{}.{}", b.class.module, b.class.class_name))
                    .collect();
                snapshot.view_listeners.insert(entry.key().id(), names);
            }
        }
        for entry in self.buffers.iter() {
            if !entry.value().is_empty() {
                let names = entry
                    .value()
                    .iter()
                    .map(|b| format!("{}.{}", b.class.module, b.class.class_name))
                    .collect();
                snapshot.buffer_listeners.insert(entry.key().id(), names);
            }
        }
    }
}

impl PluginHost {
    /// Start tracking a view and create its applicable listeners.
    pub fn attach_view(&self, view: ViewId) {
        self.check_view_listeners(view);
    }

    /// Re-evaluate a view after its settings changed.
    pub fn on_settings_changed(&self, view: ViewId) {
        if self.affinity.has_view(view) {
            self.check_view_listeners(view);
        }
    }

    /// Re-evaluate every open view.
    pub fn check_all_view_listeners(&self) {
        for view in self.api.all_views() {
            self.check_view_listeners(view);
        }
    }

    pub(crate) fn check_view_listeners(&self, view: ViewId) {
        let lock = self.affinity.handle_lock(view.into());
        let _guard = lock.lock();

        let classes = self.registry.read().view_classes();
        let current = self.affinity.view_bindings(view);
        if classes.is_empty() && current.is_empty() {
            if !self.affinity.has_view(view) {
                self.affinity.set_view(view, Vec::new());
            }
            return;
        }

        let settings = self.host.view_settings(view);
        let primary = self.host.view_is_primary(view);
        let applicable = |entry: &ViewClassEntry| {
            let site = CallSite {
                entry: "check_view_listeners",
                method: "is_applicable",
                module: &entry.module,
                class: &entry.class_name,
            };
            self.fault
                .call(Guard::FaultIsolated, &site, || Ok(entry.class.is_applicable(&settings)))
                .unwrap_or(false)
                && (primary || !entry.class.applies_to_primary_view_only())
        };

        let mut next: Vec<ViewBinding> = Vec::with_capacity(classes.len());
        for binding in current {
            let registered = classes.iter().any(|c| Arc::ptr_eq(c, &binding.class));
            if registered && applicable(&binding.class) {
                next.push(binding);
            } else {
                tracing::debug!(
                    target: "plughost::registry",
                    "Dropping {}.{} from {}",
                    binding.class.module,
                    binding.class.class_name,
                    view
                );
            }
        }
        for class in &classes {
            if next.iter().any(|b| Arc::ptr_eq(&b.class, class)) || !applicable(class) {
                continue;
            }
            let made = self
                .fault
                .instantiate(&class.module, &class.class_name, || class.class.instantiate(view));
            if let Some(instance) = made {
                next.push(ViewBinding {
                    class: Arc::clone(class),
                    instance: Arc::from(instance),
                });
            }
        }
        self.affinity.set_view(view, next);
    }

    /// Forget a view and schedule one re-evaluation of the others, since
    /// closing may have changed which view is primary.
    pub(crate) fn detach_view(&self, view: ViewId) {
        self.affinity.remove_view(view);
        self.schedule_view_sweep();
    }

    fn schedule_view_sweep(&self) {
        if !self.affinity.claim_sweep() {
            return;
        }
        let me = self.me.clone();
        self.host.set_timeout(Box::new(move || {
            if let Some(me) = me.upgrade() {
                me.affinity.finish_sweep();
                me.check_all_view_listeners();
            }
        }));
    }

    /// Attach applicable text-change listeners and detach ones that no
    /// longer apply.
    pub(crate) fn check_text_change_listeners(&self, buffer: BufferId) {
        let lock = self.affinity.handle_lock(buffer.into());
        let _guard = lock.lock();

        let classes = self.registry.read().text_change_classes();
        let current = self.affinity.buffer_bindings(buffer);
        if classes.is_empty() && current.is_empty() {
            return;
        }
        let Some(info) = self.host.buffer_info(buffer) else {
            return;
        };
        let applicable = |entry: &TextChangeClassEntry| {
            let site = CallSite {
                entry: "check_text_change_listeners",
                method: "is_applicable",
                module: &entry.module,
                class: &entry.class_name,
            };
            self.fault
                .call(Guard::FaultIsolated, &site, || Ok(entry.class.is_applicable(&info)))
                .unwrap_or(false)
        };

        let mut next: Vec<BufferBinding> = Vec::with_capacity(classes.len());
        for binding in current {
            let registered = classes.iter().any(|c| Arc::ptr_eq(c, &binding.class));
            if registered && applicable(&binding.class) {
                next.push(binding);
            } else if let Err(err) = binding.listener.detach() {
                tracing::warn!(target: "plughost::registry", "{}", err);
            }
        }
        for class in &classes {
            if next.iter().any(|b| Arc::ptr_eq(&b.class, class)) || !applicable(class) {
                continue;
            }
            let Some(instance) = self
                .fault
                .instantiate(&class.module, &class.class_name, || class.class.instantiate())
            else {
                continue;
            };
            let listener = Arc::new(AttachedListener::new(class.class_name.clone(), instance));
            match listener.attach(buffer) {
                Ok(()) => next.push(BufferBinding {
                    class: Arc::clone(class),
                    listener,
                }),
                Err(err) => tracing::warn!(target: "plughost::registry", "{}", err),
            }
        }
        self.affinity.set_buffer(buffer, next);
    }

    /// Detach and drop every listener of a buffer.
    pub(crate) fn detach_buffer(&self, buffer: BufferId) {
        for binding in self.affinity.remove_buffer(buffer) {
            if let Err(err) = binding.listener.detach() {
                tracing::warn!(target: "plughost::registry", "{}", err);
            }
        }
    }
}
