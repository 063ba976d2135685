//! The bridge toward the host application.
//!
//! Everything the runtime needs to know about windows, views and buffers is
//! asked through [`Host`]. [`HeadlessHost`] is an in-memory implementation
//! for tests and tooling.

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexMap;
use parking_lot::Mutex;
use plughost_core::{BufferId, Point, Region, Settings, Value, ViewId, WindowId};

use crate::completions::CompletionResponse;

/// A unit of work handed to one of the host's schedulers.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// What the runtime can learn about a buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct BufferInfo {
    pub id: BufferId,
    pub file_name: Option<PathBuf>,
    pub primary_view: ViewId,
}

/// Calls from the runtime into the host application.
pub trait Host: Send + Sync {
    /// Open windows, in host order.
    fn windows(&self) -> Vec<WindowId>;

    /// Views of a window, including transient ones.
    fn views(&self, window: WindowId) -> Vec<ViewId>;

    fn active_window(&self) -> Option<WindowId>;

    fn active_view(&self, window: WindowId) -> Option<ViewId>;

    /// Snapshot of a view's settings.
    fn view_settings(&self, view: ViewId) -> Settings;

    /// Whether the view is the primary view of its buffer.
    fn view_is_primary(&self, view: ViewId) -> bool;

    /// Whether the view's file is still being loaded.
    fn view_is_loading(&self, view: ViewId) -> bool;

    fn view_buffer(&self, view: ViewId) -> Option<BufferId>;

    /// Open buffers, in host order.
    fn buffers(&self) -> Vec<BufferId>;

    fn buffer_info(&self, buffer: BufferId) -> Option<BufferInfo>;

    /// Deliver the merged result of a completion query.
    fn set_completions(&self, view: ViewId, request: u64, response: CompletionResponse);

    /// Open an edit scope for a text command.
    fn begin_edit(&self, view: ViewId, token: u64, command: &str, args: &Value);

    /// Close an edit scope.
    fn end_edit(&self, view: ViewId, token: u64);

    /// Insert text, returning the number of characters inserted.
    fn insert(&self, view: ViewId, token: u64, point: Point, text: &str) -> usize;

    fn erase(&self, view: ViewId, token: u64, region: Region);

    fn replace(&self, view: ViewId, token: u64, region: Region, text: &str);

    /// Text of a region of a view.
    fn substr(&self, view: ViewId, region: Region) -> String;

    /// Run a task on the main thread later.
    fn set_timeout(&self, task: Task);

    /// Run a task on the worker context.
    fn set_timeout_async(&self, task: Task);

    /// Sink for extension console output.
    fn log(&self, text: &str) {
        tracing::info!(target: "plughost::console", "{}", text.trim_end());
    }
}

#[derive(Debug, Clone)]
struct ViewState {
    window: WindowId,
    buffer: BufferId,
    settings: Settings,
    loading: bool,
}

#[derive(Debug, Clone, Default)]
struct BufferState {
    file_name: Option<PathBuf>,
    text: String,
    views: Vec<ViewId>,
}

#[derive(Debug, Clone, Default)]
struct WindowState {
    views: Vec<ViewId>,
    active: Option<ViewId>,
}

#[derive(Default)]
struct World {
    windows: IndexMap<WindowId, WindowState>,
    views: HashMap<ViewId, ViewState>,
    buffers: IndexMap<BufferId, BufferState>,
    active_window: Option<WindowId>,
    open_edits: HashSet<(ViewId, u64)>,
    edits: Vec<(ViewId, String)>,
    completions: Vec<(ViewId, u64, CompletionResponse)>,
    log: Vec<String>,
}

impl World {
    fn view_buffer_mut(&mut self, view: ViewId) -> Option<&mut BufferState> {
        let buffer = self.views.get(&view)?.buffer;
        self.buffers.get_mut(&buffer)
    }
}

/// In-memory host with manual task queues.
///
/// Nothing runs until [`HeadlessHost::run_main`] or
/// [`HeadlessHost::run_async`] is called, which makes scheduling order
/// observable from tests.
#[derive(Default)]
pub struct HeadlessHost {
    world: Mutex<World>,
    main: Mutex<VecDeque<Task>>,
    worker: Mutex<VecDeque<Task>>,
    next_id: AtomicU64,
}

impl HeadlessHost {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Open a window. The first window becomes active.
    pub fn add_window(&self) -> WindowId {
        let id = WindowId::new(self.next_id());
        let mut world = self.world.lock();
        world.windows.insert(id, WindowState::default());
        world.active_window.get_or_insert(id);
        id
    }

    /// Open a view onto a new, empty buffer.
    pub fn add_view(&self, window: WindowId) -> ViewId {
        let buffer = BufferId::new(self.next_id());
        let view = ViewId::new(self.next_id());
        let mut world = self.world.lock();
        world.buffers.insert(
            buffer,
            BufferState {
                views: vec![view],
                ..Default::default()
            },
        );
        Self::place_view(&mut world, window, view, buffer);
        view
    }

    /// Open a second view onto the buffer of `view`.
    pub fn add_clone(&self, view: ViewId) -> Option<ViewId> {
        let clone = ViewId::new(self.next_id());
        let mut world = self.world.lock();
        let state = world.views.get(&view)?.clone();
        world.buffers.get_mut(&state.buffer)?.views.push(clone);
        Self::place_view(&mut world, state.window, clone, state.buffer);
        if let Some(settings) = world.views.get_mut(&clone) {
            settings.settings = state.settings;
        }
        Some(clone)
    }

    fn place_view(world: &mut World, window: WindowId, view: ViewId, buffer: BufferId) {
        world.views.insert(
            view,
            ViewState {
                window,
                buffer,
                settings: Settings::new(),
                loading: false,
            },
        );
        let window = world.windows.entry(window).or_default();
        window.views.push(view);
        window.active = Some(view);
    }

    /// Close a view. The next view on the same buffer becomes primary; the
    /// buffer goes away with its last view.
    pub fn close_view(&self, view: ViewId) {
        let mut world = self.world.lock();
        let Some(state) = world.views.remove(&view) else {
            return;
        };
        if let Some(window) = world.windows.get_mut(&state.window) {
            window.views.retain(|v| *v != view);
            if window.active == Some(view) {
                window.active = window.views.last().copied();
            }
        }
        let empty = match world.buffers.get_mut(&state.buffer) {
            Some(buffer) => {
                buffer.views.retain(|v| *v != view);
                buffer.views.is_empty()
            }
            None => false,
        };
        if empty {
            world.buffers.shift_remove(&state.buffer);
        }
    }

    pub fn set_active_window(&self, window: WindowId) {
        self.world.lock().active_window = Some(window);
    }

    pub fn set_active_view(&self, view: ViewId) {
        let mut world = self.world.lock();
        let Some(window) = world.views.get(&view).map(|s| s.window) else {
            return;
        };
        if let Some(state) = world.windows.get_mut(&window) {
            state.active = Some(view);
        }
        world.active_window = Some(window);
    }

    /// Replace a view's settings. The runtime is not notified; call
    /// `PluginHost::on_settings_changed` to re-evaluate listeners.
    pub fn set_settings(&self, view: ViewId, settings: Settings) {
        if let Some(state) = self.world.lock().views.get_mut(&view) {
            state.settings = settings;
        }
    }

    pub fn set_loading(&self, view: ViewId, loading: bool) {
        if let Some(state) = self.world.lock().views.get_mut(&view) {
            state.loading = loading;
        }
    }

    pub fn set_file_name(&self, buffer: BufferId, path: impl Into<PathBuf>) {
        if let Some(state) = self.world.lock().buffers.get_mut(&buffer) {
            state.file_name = Some(path.into());
        }
    }

    /// Full text of the view's buffer.
    pub fn text(&self, view: ViewId) -> String {
        let mut world = self.world.lock();
        world.view_buffer_mut(view).map(|b| b.text.clone()).unwrap_or_default()
    }

    /// Completion responses delivered so far.
    pub fn completions(&self) -> Vec<(ViewId, u64, CompletionResponse)> {
        self.world.lock().completions.clone()
    }

    /// Text commands that opened an edit scope, in order.
    pub fn edits(&self) -> Vec<(ViewId, String)> {
        self.world.lock().edits.clone()
    }

    /// Console lines received through [`Host::log`].
    pub fn log_lines(&self) -> Vec<String> {
        self.world.lock().log.clone()
    }

    pub fn pending_main(&self) -> usize {
        self.main.lock().len()
    }

    pub fn pending_async(&self) -> usize {
        self.worker.lock().len()
    }

    /// Run main-thread tasks until the queue is empty, including tasks
    /// scheduled while running. Returns how many ran.
    pub fn run_main(&self) -> usize {
        Self::drain(&self.main)
    }

    /// Run worker tasks until the queue is empty.
    pub fn run_async(&self) -> usize {
        Self::drain(&self.worker)
    }

    fn drain(queue: &Mutex<VecDeque<Task>>) -> usize {
        let mut ran = 0;
        loop {
            let Some(task) = queue.lock().pop_front() else {
                return ran;
            };
            task();
            ran += 1;
        }
    }

    fn char_to_byte(text: &str, point: Point) -> usize {
        let point = point.max(0) as usize;
        text.char_indices().nth(point).map_or(text.len(), |(i, _)| i)
    }
}

impl Host for HeadlessHost {
    fn windows(&self) -> Vec<WindowId> {
        self.world.lock().windows.keys().copied().collect()
    }

    fn views(&self, window: WindowId) -> Vec<ViewId> {
        self.world
            .lock()
            .windows
            .get(&window)
            .map(|w| w.views.clone())
            .unwrap_or_default()
    }

    fn active_window(&self) -> Option<WindowId> {
        self.world.lock().active_window
    }

    fn active_view(&self, window: WindowId) -> Option<ViewId> {
        self.world.lock().windows.get(&window).and_then(|w| w.active)
    }

    fn view_settings(&self, view: ViewId) -> Settings {
        self.world
            .lock()
            .views
            .get(&view)
            .map(|s| s.settings.clone())
            .unwrap_or_default()
    }

    fn view_is_primary(&self, view: ViewId) -> bool {
        let world = self.world.lock();
        let Some(state) = world.views.get(&view) else {
            return false;
        };
        world
            .buffers
            .get(&state.buffer)
            .and_then(|b| b.views.first())
            .is_some_and(|first| *first == view)
    }

    fn view_is_loading(&self, view: ViewId) -> bool {
        self.world.lock().views.get(&view).is_some_and(|s| s.loading)
    }

    fn view_buffer(&self, view: ViewId) -> Option<BufferId> {
        self.world.lock().views.get(&view).map(|s| s.buffer)
    }

    fn buffers(&self) -> Vec<BufferId> {
        self.world.lock().buffers.keys().copied().collect()
    }

    fn buffer_info(&self, buffer: BufferId) -> Option<BufferInfo> {
        let world = self.world.lock();
        let state = world.buffers.get(&buffer)?;
        Some(BufferInfo {
            id: buffer,
            file_name: state.file_name.clone(),
            primary_view: state.views.first().copied().unwrap_or(ViewId::NONE),
        })
    }

    fn set_completions(&self, view: ViewId, request: u64, response: CompletionResponse) {
        self.world.lock().completions.push((view, request, response));
    }

    fn begin_edit(&self, view: ViewId, token: u64, command: &str, _args: &Value) {
        let mut world = self.world.lock();
        world.open_edits.insert((view, token));
        world.edits.push((view, command.to_string()));
    }

    fn end_edit(&self, view: ViewId, token: u64) {
        self.world.lock().open_edits.remove(&(view, token));
    }

    fn insert(&self, view: ViewId, token: u64, point: Point, text: &str) -> usize {
        let mut world = self.world.lock();
        if !world.open_edits.contains(&(view, token)) {
            return 0;
        }
        let Some(buffer) = world.view_buffer_mut(view) else {
            return 0;
        };
        let at = Self::char_to_byte(&buffer.text, point);
        buffer.text.insert_str(at, text);
        text.chars().count()
    }

    fn erase(&self, view: ViewId, token: u64, region: Region) {
        self.replace(view, token, region, "");
    }

    fn replace(&self, view: ViewId, token: u64, region: Region, text: &str) {
        let mut world = self.world.lock();
        if !world.open_edits.contains(&(view, token)) {
            return;
        }
        if let Some(buffer) = world.view_buffer_mut(view) {
            let begin = Self::char_to_byte(&buffer.text, region.begin());
            let end = Self::char_to_byte(&buffer.text, region.end());
            buffer.text.replace_range(begin..end, text);
        }
    }

    fn substr(&self, view: ViewId, region: Region) -> String {
        let mut world = self.world.lock();
        let Some(buffer) = world.view_buffer_mut(view) else {
            return String::new();
        };
        let begin = Self::char_to_byte(&buffer.text, region.begin());
        let end = Self::char_to_byte(&buffer.text, region.end());
        buffer.text[begin..end].to_string()
    }

    fn set_timeout(&self, task: Task) {
        self.main.lock().push_back(task);
    }

    fn set_timeout_async(&self, task: Task) {
        self.worker.lock().push_back(task);
    }

    fn log(&self, text: &str) {
        tracing::info!(target: "plughost::console", "{}", text.trim_end());
        self.world.lock().log.push(text.to_string());
    }
}
