//! The surface extension code calls back into.

use std::fmt;
use std::sync::Arc;

use plughost_core::{BufferId, Point, Region, Settings, ViewId, WindowId};

use crate::console::Console;
use crate::edit::Edit;
use crate::host::{BufferInfo, Host, Task};
use crate::types::PluginResult;

/// Handle given to every extension callback.
///
/// Buffer mutations take an [`Edit`] and fail once the owning text command
/// has returned.
#[derive(Clone)]
pub struct Api {
    host: Arc<dyn Host>,
    console: Console,
}

impl Api {
    pub fn new(host: Arc<dyn Host>, console: Console) -> Self {
        Self { host, console }
    }

    pub fn host(&self) -> &dyn Host {
        self.host.as_ref()
    }

    pub fn console(&self) -> &Console {
        &self.console
    }

    /// Write to the extension console.
    pub fn print(&self, text: &str) {
        self.console.print(text);
    }

    pub fn windows(&self) -> Vec<WindowId> {
        self.host.windows()
    }

    pub fn views(&self, window: WindowId) -> Vec<ViewId> {
        self.host.views(window)
    }

    /// Every view of every window.
    pub fn all_views(&self) -> Vec<ViewId> {
        self.host
            .windows()
            .into_iter()
            .flat_map(|w| self.host.views(w))
            .collect()
    }

    pub fn active_window(&self) -> Option<WindowId> {
        self.host.active_window().filter(|w| w.is_valid())
    }

    /// The focused view of the active window.
    pub fn active_view(&self) -> Option<ViewId> {
        self.active_window()
            .and_then(|w| self.host.active_view(w))
            .filter(|v| v.is_valid())
    }

    pub fn settings(&self, view: ViewId) -> Settings {
        self.host.view_settings(view)
    }

    pub fn buffer(&self, view: ViewId) -> Option<BufferId> {
        self.host.view_buffer(view)
    }

    pub fn buffer_info(&self, buffer: BufferId) -> Option<BufferInfo> {
        self.host.buffer_info(buffer)
    }

    pub fn substr(&self, view: ViewId, region: Region) -> String {
        self.host.substr(view, region)
    }

    /// Insert `text` at `point`; returns the number of characters inserted.
    pub fn insert(&self, edit: &Edit, view: ViewId, point: Point, text: &str) -> PluginResult<usize> {
        let token = edit.token_for(view)?;
        Ok(self.host.insert(view, token, point, text))
    }

    pub fn erase(&self, edit: &Edit, view: ViewId, region: Region) -> PluginResult<()> {
        let token = edit.token_for(view)?;
        self.host.erase(view, token, region);
        Ok(())
    }

    pub fn replace(&self, edit: &Edit, view: ViewId, region: Region, text: &str) -> PluginResult<()> {
        let token = edit.token_for(view)?;
        self.host.replace(view, token, region, text);
        Ok(())
    }

    pub fn set_timeout(&self, task: Task) {
        self.host.set_timeout(task);
    }

    pub fn set_timeout_async(&self, task: Task) {
        self.host.set_timeout_async(task);
    }
}

impl fmt::Debug for Api {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Api").field("console", &self.console).finish_non_exhaustive()
    }
}
