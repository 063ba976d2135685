//! Inbound event entry points.
//!
//! Each entry point takes the per-handle lock of its target, snapshots the
//! receivers, and calls each one through the fault wrapper. Global
//! listeners run before per-view listeners except at the command
//! interception points.

use std::io;
use std::path::Path;
use std::sync::Arc;

use plughost_core::{
    AutoCompleteFlags, BufferId, ExtResult, HoverZone, Point, QueryOperator, Target, TextChange, Value, ViewId,
    WindowId,
};

use crate::affinity::{BufferBinding, ViewBinding};
use crate::completions::{CompletionJoin, CompletionList, CompletionRequest};
use crate::fault::{CallSite, Guard};
use crate::hooks::{CommandRewrite, Event, EventArgs, EventKind, Reply};
use crate::registry::Callback;
use crate::runtime::PluginHost;
use crate::types::PluginResult;

/// Anything that can receive an event.
#[derive(Clone)]
pub(crate) enum Receiver {
    Global(Callback),
    View(ViewBinding),
    Buffer(BufferBinding),
}

impl Receiver {
    fn module(&self) -> &str {
        match self {
            Self::Global(cb) => &cb.listener.module,
            Self::View(b) => &b.class.module,
            Self::Buffer(b) => &b.class.module,
        }
    }

    fn class(&self) -> &str {
        match self {
            Self::Global(cb) => &cb.listener.class,
            Self::View(b) => &b.class.class_name,
            Self::Buffer(b) => &b.class.class_name,
        }
    }

    fn guard(&self, kind: EventKind) -> Guard {
        match self {
            Self::Global(cb) => cb.guard,
            _ => Guard::for_kind(kind),
        }
    }

    fn call(&self, host: &PluginHost, event: &Event) -> ExtResult<Reply> {
        match self {
            Self::Global(cb) => cb.listener.listener().on_event(&host.api, event),
            Self::View(b) => b.instance.on_event(&host.api, event),
            Self::Buffer(b) => b.listener.listener().on_event(&host.api, event),
        }
    }
}

macro_rules! view_events {
    ($($(#[$meta:meta])* $name:ident => $kind:ident),* $(,)?) => {
        impl PluginHost {
            $(
                $(#[$meta])*
                pub fn $name(&self, view: ViewId) {
                    self.view_event(EventKind::$kind, view, EventArgs::None);
                }
            )*
        }
    };
}

macro_rules! window_events {
    ($($name:ident => $kind:ident),* $(,)?) => {
        impl PluginHost {
            $(
                pub fn $name(&self, window: WindowId) {
                    self.window_event(EventKind::$kind, window, EventArgs::None);
                }
            )*
        }
    };
}

macro_rules! buffer_events {
    ($($name:ident => $kind:ident),* $(,)?) => {
        impl PluginHost {
            $(
                pub fn $name(&self, buffer: BufferId) {
                    self.buffer_event(EventKind::$kind, buffer, EventArgs::None);
                }
            )*
        }
    };
}

view_events! {
    /// Global listeners only; re-evaluates the view's listeners first.
    on_new => New,
    on_new_async => NewAsync,
    /// Global listeners only; re-evaluates the view's listeners first.
    on_clone => Clone,
    on_clone_async => CloneAsync,
    on_load => Load,
    on_load_async => LoadAsync,
    on_revert => Revert,
    on_revert_async => RevertAsync,
    on_reload => Reload,
    on_reload_async => ReloadAsync,
    on_pre_close => PreClose,
    on_pre_save => PreSave,
    on_pre_save_async => PreSaveAsync,
    on_post_save => PostSave,
    on_post_save_async => PostSaveAsync,
    on_pre_move => PreMove,
    on_post_move => PostMove,
    on_post_move_async => PostMoveAsync,
    on_modified => Modified,
    on_modified_async => ModifiedAsync,
    on_selection_modified => SelectionModified,
    on_selection_modified_async => SelectionModifiedAsync,
    on_activated => Activated,
    on_activated_async => ActivatedAsync,
    on_deactivated => Deactivated,
    on_deactivated_async => DeactivatedAsync,
}

window_events! {
    on_new_window => NewWindow,
    on_new_window_async => NewWindowAsync,
    on_new_project => NewProject,
    on_new_project_async => NewProjectAsync,
    on_load_project => LoadProject,
    on_load_project_async => LoadProjectAsync,
    on_pre_save_project => PreSaveProject,
    on_post_save_project => PostSaveProject,
    on_post_save_project_async => PostSaveProjectAsync,
    on_pre_close_project => PreCloseProject,
}

buffer_events! {
    on_new_buffer_async => NewBufferAsync,
    on_associate_buffer_async => AssociateBufferAsync,
    on_close_buffer_async => CloseBufferAsync,
}

impl PluginHost {
    pub(crate) fn deliver(&self, entry: &str, receiver: &Receiver, event: &Event) -> Option<Reply> {
        let method = event.kind.method_name();
        let site = CallSite {
            entry,
            method: &method,
            module: receiver.module(),
            class: receiver.class(),
        };
        self.fault
            .call(receiver.guard(event.kind), &site, || receiver.call(self, event))
    }

    pub(crate) fn global_receivers(&self, kind: EventKind) -> Vec<Receiver> {
        self.registry
            .read()
            .callbacks(kind)
            .into_iter()
            .map(Receiver::Global)
            .collect()
    }

    fn view_receivers(&self, kind: EventKind, view: ViewId) -> Vec<Receiver> {
        let globals = self.global_receivers(kind);
        if !kind.for_view_listener() {
            return globals;
        }
        let locals = self
            .affinity
            .view_bindings(view)
            .into_iter()
            .filter(|b| b.class.events.contains(kind))
            .map(Receiver::View);
        if kind.is_view_first() {
            locals.chain(globals).collect()
        } else {
            globals.into_iter().chain(locals).collect()
        }
    }

    fn buffer_receivers(&self, kind: EventKind, buffer: BufferId) -> Vec<Receiver> {
        self.affinity
            .buffer_bindings(buffer)
            .into_iter()
            .filter(|b| b.class.events.contains(kind))
            .map(Receiver::Buffer)
            .collect()
    }

    /// Deliver a view event to global, then per-view listeners.
    pub fn view_event(&self, kind: EventKind, view: ViewId, args: EventArgs) {
        let lock = self.affinity.handle_lock(view.into());
        let _guard = lock.lock();

        if kind.attaches_view() {
            self.attach_view(view);
        }
        let event = Event::new(kind, view).with_args(args);
        for receiver in self.view_receivers(kind, view) {
            self.deliver(kind.name(), &receiver, &event);
        }
    }

    /// Deliver a window event to global listeners.
    pub fn window_event(&self, kind: EventKind, window: WindowId, args: EventArgs) {
        let lock = self.affinity.handle_lock(window.into());
        let _guard = lock.lock();

        let event = Event::new(kind, window).with_args(args);
        for receiver in self.global_receivers(kind) {
            self.deliver(kind.name(), &receiver, &event);
        }
    }

    /// Deliver a buffer event to global listeners.
    pub fn buffer_event(&self, kind: EventKind, buffer: BufferId, args: EventArgs) {
        let lock = self.affinity.handle_lock(buffer.into());
        let _guard = lock.lock();

        let event = Event::new(kind, buffer).with_args(args);
        for receiver in self.global_receivers(kind) {
            self.deliver(kind.name(), &receiver, &event);
        }
    }

    /// Deliver to the text-change listeners attached to a buffer.
    pub fn text_change_event(&self, kind: EventKind, buffer: BufferId, args: EventArgs) {
        let lock = self.affinity.handle_lock(buffer.into());
        let _guard = lock.lock();

        let event = Event::new(kind, buffer).with_args(args);
        for receiver in self.buffer_receivers(kind, buffer) {
            self.deliver(kind.name(), &receiver, &event);
        }
    }

    /// Per-view listeners, then teardown of the view's listeners, then
    /// global listeners (which may still look the view up).
    pub fn on_close(&self, view: ViewId) {
        let target = Target::from(view);
        {
            let lock = self.affinity.handle_lock(target);
            let _guard = lock.lock();

            let event = Event::new(EventKind::Close, view);
            for binding in self.affinity.view_bindings(view) {
                if binding.class.events.contains(EventKind::Close) {
                    self.deliver("close", &Receiver::View(binding), &event);
                }
            }
            self.detach_view(view);
            for receiver in self.global_receivers(EventKind::Close) {
                self.deliver("close", &receiver, &event);
            }
        }
        self.affinity.forget_lock(target);
    }

    pub fn on_hover(&self, view: ViewId, point: Point, zone: HoverZone) {
        self.view_event(EventKind::Hover, view, EventArgs::Hover { point, zone });
    }

    /// Key-binding context query. The first truthy answer wins.
    pub fn on_query_context(
        &self,
        view: ViewId,
        key: &str,
        operator: QueryOperator,
        operand: Value,
        match_all: bool,
    ) -> bool {
        let lock = self.affinity.handle_lock(view.into());
        let _guard = lock.lock();

        let event = Event::new(EventKind::QueryContext, view).with_args(EventArgs::Context {
            key: key.to_string(),
            operator,
            operand,
            match_all,
        });
        self.view_receivers(EventKind::QueryContext, view)
            .iter()
            .any(|r| self.deliver("query_context", r, &event).is_some_and(|reply| reply.is_truthy()))
    }

    /// Ask every listener for completions. The host's `set_completions` is
    /// called once all sources, including pending lists, have reported.
    pub fn on_query_completions(
        &self,
        view: ViewId,
        request: u64,
        prefix: &str,
        locations: Vec<Point>,
    ) -> CompletionRequest {
        let lock = self.affinity.handle_lock(view.into());
        let _guard = lock.lock();

        let event = Event::new(EventKind::QueryCompletions, view).with_args(EventArgs::Completions {
            prefix: prefix.to_string(),
            locations,
        });
        let mut sources = Vec::new();
        for receiver in self.view_receivers(EventKind::QueryCompletions, view) {
            match self.deliver("query_completions", &receiver, &event) {
                Some(Reply::Completions(items)) => sources.push(CompletionList::ready(items, AutoCompleteFlags::NONE)),
                Some(Reply::CompletionsWithFlags(items, flags)) => sources.push(CompletionList::ready(items, flags)),
                Some(Reply::CompletionList(list)) => sources.push(list),
                Some(Reply::None) | None => {}
                Some(other) => tracing::debug!(
                    target: "plughost::dispatch",
                    "Ignoring completion reply from {}.{}: {:?}",
                    receiver.module(),
                    receiver.class(),
                    other
                ),
            }
        }
        if sources.is_empty() {
            sources.push(CompletionList::ready(Vec::new(), AutoCompleteFlags::NONE));
        }

        let (join, handle) = CompletionJoin::new(sources.len(), view, request, Arc::clone(&self.host));
        for source in sources {
            source.set_target(Arc::clone(&join));
        }
        handle
    }

    /// Last event for a window; its dispatch lock is released afterwards.
    pub fn on_pre_close_window(&self, window: WindowId) {
        self.window_event(EventKind::PreCloseWindow, window, EventArgs::None);
        self.affinity.forget_lock(window.into());
    }

    /// Pre-run hook for text commands. Per-view listeners are asked first.
    pub fn on_text_command(&self, view: ViewId, name: &str, args: Value) -> CommandRewrite {
        let lock = self.affinity.handle_lock(view.into());
        let _guard = lock.lock();

        let receivers = self.view_receivers(EventKind::TextCommand, view);
        self.intercept(EventKind::TextCommand, view.into(), receivers, name, args)
    }

    /// Pre-run hook for window commands.
    pub fn on_window_command(&self, window: WindowId, name: &str, args: Value) -> CommandRewrite {
        let lock = self.affinity.handle_lock(window.into());
        let _guard = lock.lock();

        let receivers = self.global_receivers(EventKind::WindowCommand);
        self.intercept(EventKind::WindowCommand, window.into(), receivers, name, args)
    }

    fn intercept(
        &self,
        kind: EventKind,
        target: Target,
        receivers: Vec<Receiver>,
        name: &str,
        args: Value,
    ) -> CommandRewrite {
        let event = Event::new(kind, target).with_args(EventArgs::Command {
            name: name.to_string(),
            args: args.clone(),
        });
        for receiver in receivers {
            let Some(reply) = self.deliver(kind.name(), &receiver, &event) else {
                continue;
            };
            match reply {
                Reply::Command { name, args } => return CommandRewrite::new(name, args),
                Reply::Value(Value::String(other)) if !other.is_empty() => return CommandRewrite::new(other, None),
                reply if reply.is_truthy() => return CommandRewrite::new(name, Some(args)),
                _ => {}
            }
        }
        CommandRewrite::default()
    }

    pub fn on_post_text_command(&self, view: ViewId, name: &str, args: Value) {
        let args = EventArgs::Command {
            name: name.to_string(),
            args,
        };
        self.view_event(EventKind::PostTextCommand, view, args);
    }

    pub fn on_post_window_command(&self, window: WindowId, name: &str, args: Value) {
        let args = EventArgs::Command {
            name: name.to_string(),
            args,
        };
        self.window_event(EventKind::PostWindowCommand, window, args);
    }

    /// Attach text-change listeners, then notify global listeners.
    pub fn on_new_buffer(&self, buffer: BufferId) {
        let lock = self.affinity.handle_lock(buffer.into());
        let _guard = lock.lock();

        self.check_text_change_listeners(buffer);
        self.buffer_event(EventKind::NewBuffer, buffer, EventArgs::None);
    }

    /// The buffer got a file name; re-check text-change listeners.
    pub fn on_associate_buffer(&self, buffer: BufferId) {
        let lock = self.affinity.handle_lock(buffer.into());
        let _guard = lock.lock();

        self.check_text_change_listeners(buffer);
        self.buffer_event(EventKind::AssociateBuffer, buffer, EventArgs::None);
    }

    /// Detach text-change listeners, then notify global listeners.
    pub fn on_close_buffer(&self, buffer: BufferId) {
        let target = Target::from(buffer);
        {
            let lock = self.affinity.handle_lock(target);
            let _guard = lock.lock();

            self.detach_buffer(buffer);
            self.buffer_event(EventKind::CloseBuffer, buffer, EventArgs::None);
        }
        self.affinity.forget_lock(target);
    }

    pub fn on_text_changed(&self, buffer: BufferId, changes: Vec<TextChange>) {
        self.text_change_event(EventKind::TextChanged, buffer, EventArgs::Changes(changes));
    }

    pub fn on_text_changed_async(&self, buffer: BufferId, changes: Vec<TextChange>) {
        self.text_change_event(EventKind::TextChangedAsync, buffer, EventArgs::Changes(changes));
    }

    pub fn on_buffer_revert(&self, buffer: BufferId) {
        self.text_change_event(EventKind::Revert, buffer, EventArgs::None);
    }

    pub fn on_buffer_revert_async(&self, buffer: BufferId) {
        self.text_change_event(EventKind::RevertAsync, buffer, EventArgs::None);
    }

    pub fn on_buffer_reload(&self, buffer: BufferId) {
        self.text_change_event(EventKind::Reload, buffer, EventArgs::None);
    }

    pub fn on_buffer_reload_async(&self, buffer: BufferId) {
        self.text_change_event(EventKind::ReloadAsync, buffer, EventArgs::None);
    }

    /// Run exit listeners with console output captured. Non-empty output
    /// is written to `log_path`; otherwise no file is left there.
    pub fn on_exit(&self, log_path: &Path) -> PluginResult<()> {
        self.console.begin_capture();
        let event = Event::application(EventKind::Exit);
        for receiver in self.global_receivers(EventKind::Exit) {
            self.deliver("exit", &receiver, &event);
        }
        let output = self.console.end_capture();

        if output.is_empty() {
            match std::fs::remove_file(log_path) {
                Err(err) if err.kind() != io::ErrorKind::NotFound => return Err(err.into()),
                _ => {}
            }
        } else {
            std::fs::write(log_path, output)?;
        }
        Ok(())
    }

    /// Initial notifications, for all modules or just one.
    ///
    /// Global `new_buffer` handlers see every open buffer (the async half is
    /// scheduled on the worker), global `init` handlers get every view that
    /// has finished loading, and per-view `init` handlers run on those views.
    pub fn on_init(&self, module: Option<&str>) {
        let owned = |m: &str| module.is_none_or(|wanted| wanted == m);
        let buffers = self.host.buffers();

        for receiver in self.global_receivers(EventKind::NewBuffer) {
            if !owned(receiver.module()) {
                continue;
            }
            for buffer in &buffers {
                self.deliver("init", &receiver, &Event::new(EventKind::NewBuffer, *buffer));
            }
        }

        for receiver in self.global_receivers(EventKind::NewBufferAsync) {
            if !owned(receiver.module()) {
                continue;
            }
            for buffer in &buffers {
                let me = self.me.clone();
                let receiver = receiver.clone();
                let buffer = *buffer;
                self.host.set_timeout_async(Box::new(move || {
                    if let Some(me) = me.upgrade() {
                        me.deliver("init", &receiver, &Event::new(EventKind::NewBufferAsync, buffer));
                    }
                }));
            }
        }

        let views: Vec<ViewId> = self
            .api
            .all_views()
            .into_iter()
            .filter(|v| !self.host.view_is_loading(*v))
            .collect();

        let init = Event::application(EventKind::Init).with_args(EventArgs::Views(views.clone()));
        for receiver in self.global_receivers(EventKind::Init) {
            if owned(receiver.module()) {
                self.deliver("init", &receiver, &init);
            }
        }

        for view in views {
            let event = Event::new(EventKind::Init, view);
            for binding in self.affinity.view_bindings(view) {
                if binding.class.events.contains(EventKind::Init) && owned(&binding.class.module) {
                    self.deliver("init", &Receiver::View(binding), &event);
                }
            }
        }
    }

    /// Replay `activated_async` on the focused view for listeners queued at
    /// load time. The queue is drained even when no view is focused.
    pub fn synthesize_on_activated_async(&self) {
        if !self.is_api_ready() {
            return;
        }
        let (listeners, view_classes) = self.pending.drain();
        let Some(view) = self.api.active_view() else {
            return;
        };
        let event = Event::new(EventKind::ActivatedAsync, view);
        for listener in listeners {
            let receiver = Receiver::Global(Callback {
                listener,
                guard: Guard::FaultIsolated,
            });
            self.deliver("activated_async", &receiver, &event);
        }
        for class in view_classes {
            if let Some(binding) = self.affinity.find_view_binding(view, &class) {
                self.deliver("activated_async", &Receiver::View(binding), &event);
            }
        }
    }
}
