//! Capability traits implemented by extension classes.
//!
//! A class is described by a `*Class` trait object (name, implemented
//! events, constructor); the runtime creates instances from it when and
//! where the capability calls for them.

use std::fmt;
use std::sync::Arc;

use plughost_core::{command_name_for_type, ExtResult, Settings, Target, Value, ViewId};

use crate::api::Api;
use crate::edit::Edit;
use crate::hooks::{Event, EventSet, Reply};
use crate::host::BufferInfo;
use crate::types::{Capability, CommandKind};

/// A command instance bound to its window or view.
pub trait Command: Send + Sync {
    /// Run the command. Text commands receive an [`Edit`] that is only
    /// valid until this returns.
    fn run(&self, api: &Api, edit: Option<&Edit>, args: &Value) -> ExtResult<()>;

    fn is_enabled(&self, _api: &Api, _args: &Value) -> ExtResult<bool> {
        Ok(true)
    }

    fn is_visible(&self, _api: &Api, _args: &Value) -> ExtResult<bool> {
        Ok(true)
    }

    fn is_checked(&self, _api: &Api, _args: &Value) -> ExtResult<bool> {
        Ok(false)
    }

    /// Menu caption override.
    fn description(&self, _api: &Api, _args: &Value) -> ExtResult<Option<String>> {
        Ok(None)
    }
}

/// A command class.
pub trait CommandClass: Send + Sync {
    /// Type name, e.g. `InsertDateCommand`.
    fn type_name(&self) -> &str;

    /// Declared command name; derived from the type name by default.
    fn name(&self) -> String {
        command_name_for_type(self.type_name())
    }

    /// Create an instance for `target` (the application, a window or a view).
    fn instantiate(&self, target: Target) -> ExtResult<Box<dyn Command>>;
}

/// A global listener, instantiated once per module load.
pub trait EventListener: Send + Sync {
    fn on_event(&self, api: &Api, event: &Event) -> ExtResult<Reply>;
}

pub trait EventListenerClass: Send + Sync {
    fn type_name(&self) -> &str;

    /// Kinds this class handles.
    fn events(&self) -> EventSet;

    fn instantiate(&self) -> ExtResult<Box<dyn EventListener>>;
}

/// A listener bound to a single view.
pub trait ViewEventListener: Send + Sync {
    fn on_event(&self, api: &Api, event: &Event) -> ExtResult<Reply>;
}

pub trait ViewListenerClass: Send + Sync {
    fn type_name(&self) -> &str;

    fn events(&self) -> EventSet;

    /// Whether an instance should exist for a view with these settings.
    fn is_applicable(&self, _settings: &Settings) -> bool {
        true
    }

    /// Restrict instances to the primary view of each buffer.
    fn applies_to_primary_view_only(&self) -> bool {
        true
    }

    fn instantiate(&self, view: ViewId) -> ExtResult<Box<dyn ViewEventListener>>;
}

/// A listener bound to a single buffer, receiving its text changes.
pub trait TextChangeListener: Send + Sync {
    fn on_event(&self, api: &Api, event: &Event) -> ExtResult<Reply>;
}

pub trait TextChangeListenerClass: Send + Sync {
    fn type_name(&self) -> &str;

    fn events(&self) -> EventSet;

    fn is_applicable(&self, _buffer: &BufferInfo) -> bool {
        true
    }

    fn instantiate(&self) -> ExtResult<Box<dyn TextChangeListener>>;
}

/// One exported class.
#[derive(Clone)]
pub enum Export {
    Command(CommandKind, Arc<dyn CommandClass>),
    EventListener(Arc<dyn EventListenerClass>),
    ViewListener(Arc<dyn ViewListenerClass>),
    TextChangeListener(Arc<dyn TextChangeListenerClass>),
}

impl Export {
    pub fn capability(&self) -> Capability {
        match self {
            Self::Command(kind, _) => (*kind).into(),
            Self::EventListener(_) => Capability::EventListener,
            Self::ViewListener(_) => Capability::ViewEventListener,
            Self::TextChangeListener(_) => Capability::TextChangeListener,
        }
    }

    pub fn type_name(&self) -> &str {
        match self {
            Self::Command(_, class) => class.type_name(),
            Self::EventListener(class) => class.type_name(),
            Self::ViewListener(class) => class.type_name(),
            Self::TextChangeListener(class) => class.type_name(),
        }
    }
}

impl fmt::Debug for Export {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.capability(), self.type_name())
    }
}

/// The table a module fills when it is loaded.
///
/// Entries keep declaration order. Names starting with `_` are private
/// unless an allow-list is set, in which case exactly the allow-listed
/// names are public, in allow-list order.
#[derive(Debug, Clone)]
pub struct Exports {
    module: String,
    entries: Vec<(String, Export)>,
    allow: Option<Vec<String>>,
}

impl Exports {
    pub fn new(module: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            entries: Vec::new(),
            allow: None,
        }
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    /// Export under `name`. Re-exporting a name replaces the earlier entry
    /// in place.
    pub fn export(&mut self, name: impl Into<String>, export: Export) -> &mut Self {
        let name = name.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = export,
            None => self.entries.push((name, export)),
        }
        self
    }

    pub fn application_command(&mut self, class: impl CommandClass + 'static) -> &mut Self {
        self.command(CommandKind::Application, Arc::new(class))
    }

    pub fn window_command(&mut self, class: impl CommandClass + 'static) -> &mut Self {
        self.command(CommandKind::Window, Arc::new(class))
    }

    pub fn text_command(&mut self, class: impl CommandClass + 'static) -> &mut Self {
        self.command(CommandKind::Text, Arc::new(class))
    }

    pub fn command(&mut self, kind: CommandKind, class: Arc<dyn CommandClass>) -> &mut Self {
        let name = class.type_name().to_string();
        self.export(name, Export::Command(kind, class))
    }

    pub fn event_listener(&mut self, class: impl EventListenerClass + 'static) -> &mut Self {
        let name = class.type_name().to_string();
        self.export(name, Export::EventListener(Arc::new(class)))
    }

    pub fn view_listener(&mut self, class: impl ViewListenerClass + 'static) -> &mut Self {
        let name = class.type_name().to_string();
        self.export(name, Export::ViewListener(Arc::new(class)))
    }

    pub fn text_change_listener(&mut self, class: impl TextChangeListenerClass + 'static) -> &mut Self {
        let name = class.type_name().to_string();
        self.export(name, Export::TextChangeListener(Arc::new(class)))
    }

    /// Restrict the public names.
    pub fn allow<I, S>(&mut self, names: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allow = Some(names.into_iter().map(Into::into).collect());
        self
    }

    /// Public exports in registration order.
    pub fn public(&self) -> Vec<(&str, &Export)> {
        match &self.allow {
            Some(allow) => allow
                .iter()
                .filter_map(|name| {
                    self.entries
                        .iter()
                        .find(|(n, _)| n == name)
                        .map(|(n, e)| (n.as_str(), e))
                })
                .collect(),
            None => self
                .entries
                .iter()
                .filter(|(n, _)| !n.starts_with('_'))
                .map(|(n, e)| (n.as_str(), e))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Named(&'static str);

    impl CommandClass for Named {
        fn type_name(&self) -> &str {
            self.0
        }

        fn instantiate(&self, _target: Target) -> ExtResult<Box<dyn Command>> {
            Err("not runnable".into())
        }
    }

    fn names(exports: &Exports) -> Vec<&str> {
        exports.public().into_iter().map(|(n, _)| n).collect()
    }

    #[test]
    fn test_private_names_are_hidden() {
        let mut exports = Exports::new("Pkg.mod");
        exports
            .window_command(Named("FooCommand"))
            .text_command(Named("_HelperCommand"))
            .application_command(Named("BarCommand"));

        assert_eq!(names(&exports), vec!["FooCommand", "BarCommand"]);
        assert_eq!(exports.len(), 3);
    }

    #[test]
    fn test_allow_list_orders_and_filters() {
        let mut exports = Exports::new("Pkg.mod");
        exports
            .window_command(Named("FooCommand"))
            .text_command(Named("_HelperCommand"))
            .allow(["_HelperCommand", "Missing"]);

        assert_eq!(names(&exports), vec!["_HelperCommand"]);
    }

    #[test]
    fn test_reexport_replaces_in_place() {
        let mut exports = Exports::new("Pkg.mod");
        exports.window_command(Named("FooCommand"));
        exports.text_command(Named("FooCommand"));

        let public = exports.public();
        assert_eq!(public.len(), 1);
        assert_eq!(public[0].1.capability(), Capability::TextCommand);
        assert_eq!(
            match public[0].1 {
                Export::Command(_, class) => class.name(),
                _ => String::new(),
            },
            "foo"
        );
    }
}
