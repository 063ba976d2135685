//! Capability and callback registries.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use plughost_archive::ModuleSpec;
use strum::IntoEnumIterator;

use crate::capability::{CommandClass, EventListener, TextChangeListenerClass, ViewListenerClass};
use crate::fault::Guard;
use crate::hooks::{EventKind, EventSet};
use crate::module::ExtensionModule;
use crate::types::CommandKind;

/// A registered command class.
#[derive(Clone)]
pub(crate) struct CommandEntry {
    pub module: String,
    pub name: String,
    pub class: Arc<dyn CommandClass>,
}

/// A live global listener.
pub(crate) struct ListenerEntry {
    pub module: String,
    pub class: String,
    pub events: EventSet,
    pub instance: Box<dyn EventListener>,
}

impl ListenerEntry {
    pub fn listener(&self) -> &dyn EventListener {
        self.instance.as_ref()
    }
}

/// One wrapped entry of a callback list.
#[derive(Clone)]
pub(crate) struct Callback {
    pub listener: Arc<ListenerEntry>,
    pub guard: Guard,
}

/// A registered per-view listener class.
pub(crate) struct ViewClassEntry {
    pub module: String,
    pub class_name: String,
    pub events: EventSet,
    pub class: Arc<dyn ViewListenerClass>,
}

/// A registered per-buffer listener class.
pub(crate) struct TextChangeClassEntry {
    pub module: String,
    pub class_name: String,
    pub events: EventSet,
    pub class: Arc<dyn TextChangeListenerClass>,
}

pub(crate) struct LoadedModule {
    pub module: Arc<dyn ExtensionModule>,
    pub spec: Option<ModuleSpec>,
}

/// Everything one module contributes, staged before it is applied.
#[derive(Default)]
pub(crate) struct Contribution {
    pub commands: Vec<(CommandKind, CommandEntry)>,
    pub listeners: Vec<Arc<ListenerEntry>>,
    pub view_classes: Vec<Arc<ViewClassEntry>>,
    pub text_change_classes: Vec<Arc<TextChangeClassEntry>>,
}

/// Commands, callback lists and listener classes of all loaded modules.
#[derive(Default)]
pub(crate) struct Registry {
    commands: [Vec<CommandEntry>; 3],
    callbacks: HashMap<EventKind, Vec<Callback>>,
    view_classes: Vec<Arc<ViewClassEntry>>,
    text_change_classes: Vec<Arc<TextChangeClassEntry>>,
    modules: IndexMap<String, LoadedModule>,
}

impl Registry {
    /// Apply a module's contribution. Lists keep load order.
    pub fn apply(&mut self, name: &str, module: LoadedModule, contribution: &Contribution) {
        for (kind, entry) in &contribution.commands {
            self.commands[kind.index()].push(entry.clone());
        }
        for listener in &contribution.listeners {
            for kind in listener.events.iter() {
                self.callbacks.entry(kind).or_default().push(Callback {
                    listener: Arc::clone(listener),
                    guard: Guard::for_kind(kind),
                });
            }
        }
        self.view_classes.extend(contribution.view_classes.iter().cloned());
        self.text_change_classes
            .extend(contribution.text_change_classes.iter().cloned());
        self.modules.insert(name.to_string(), module);
    }

    /// Remove every trace of a module.
    pub fn remove_module(&mut self, name: &str) -> Option<LoadedModule> {
        for list in &mut self.commands {
            list.retain(|c| c.module != name);
        }
        for list in self.callbacks.values_mut() {
            list.retain(|c| c.listener.module != name);
        }
        self.callbacks.retain(|_, list| !list.is_empty());
        self.view_classes.retain(|c| c.module != name);
        self.text_change_classes.retain(|c| c.module != name);
        self.modules.shift_remove(name)
    }

    pub fn module(&self, name: &str) -> Option<&LoadedModule> {
        self.modules.get(name)
    }

    pub fn module_names(&self) -> Vec<String> {
        self.modules.keys().cloned().collect()
    }

    pub fn commands(&self, kind: CommandKind) -> &[CommandEntry] {
        &self.commands[kind.index()]
    }

    /// Latest registration wins.
    pub fn find_command(&self, kind: CommandKind, name: &str) -> Option<CommandEntry> {
        self.commands(kind).iter().rev().find(|c| c.name == name).cloned()
    }

    /// Snapshot of the callback list for `kind`.
    pub fn callbacks(&self, kind: EventKind) -> Vec<Callback> {
        self.callbacks.get(&kind).cloned().unwrap_or_default()
    }

    pub fn view_classes(&self) -> Vec<Arc<ViewClassEntry>> {
        self.view_classes.clone()
    }

    pub fn text_change_classes(&self) -> Vec<Arc<TextChangeClassEntry>> {
        self.text_change_classes.clone()
    }

    pub fn snapshot(&self) -> RegistrySnapshot {
        let commands = CommandKind::ALL
            .iter()
            .map(|kind| {
                (
                    *kind,
                    self.commands(*kind)
                        .iter()
                        .map(|c| format!("{}:{}", c.module, c.name))
                        .collect(),
                )
            })
            .collect();
        let callbacks = EventKind::iter()
            .filter_map(|kind| {
                let list = self.callbacks.get(&kind)?;
                let names = list
                    .iter()
                    .map(|c| format!("{}.{}", c.listener.module, c.listener.class))
                    .collect();
                Some((kind.name().to_string(), names))
            })
            .collect();
        RegistrySnapshot {
            modules: self.module_names(),
            commands,
            callbacks,
            view_classes: self
                .view_classes
                .iter()
                .map(|c| format!("{}.{}", c.module, c.class_name))
                .collect(),
            text_change_classes: self
                .text_change_classes
                .iter()
                .map(|c| format!("{}.{}", c.module, c.class_name))
                .collect(),
            view_listeners: BTreeMap::new(),
            buffer_listeners: BTreeMap::new(),
        }
    }
}

/// Comparable picture of registry and affinity state.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RegistrySnapshot {
    pub modules: Vec<String>,
    /// `module:name` per command kind.
    pub commands: Vec<(CommandKind, Vec<String>)>,
    /// `module.Class` per event name; empty lists are omitted.
    pub callbacks: BTreeMap<String, Vec<String>>,
    pub view_classes: Vec<String>,
    pub text_change_classes: Vec<String>,
    /// Live per-view instances by view id; views without any are omitted.
    pub view_listeners: BTreeMap<u64, Vec<String>>,
    /// Attached text-change listeners by buffer id.
    pub buffer_listeners: BTreeMap<u64, Vec<String>>,
}

impl RegistrySnapshot {
    /// Command names of one kind, without module prefixes.
    pub fn command_names(&self, kind: CommandKind) -> Vec<&str> {
        self.commands
            .iter()
            .filter(|(k, _)| *k == kind)
            .flat_map(|(_, names)| names.iter())
            .map(|n| n.rsplit(':').next().unwrap_or(n))
            .collect()
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("modules", &self.module_names())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use plughost_core::{ExtResult, Target};

    use super::*;
    use crate::api::Api;
    use crate::capability::Command;
    use crate::hooks::{Event, Reply};

    struct Cls(&'static str);

    impl CommandClass for Cls {
        fn type_name(&self) -> &str {
            self.0
        }

        fn instantiate(&self, _target: Target) -> ExtResult<Box<dyn Command>> {
            Err("unused".into())
        }
    }

    struct Quiet;

    impl EventListener for Quiet {
        fn on_event(&self, _api: &Api, _event: &Event) -> ExtResult<Reply> {
            Ok(Reply::None)
        }
    }

    struct NoModule;

    impl ExtensionModule for NoModule {
        fn name(&self) -> &str {
            "none"
        }

        fn register(&self, _exports: &mut crate::capability::Exports) -> ExtResult<()> {
            Ok(())
        }
    }

    fn command(module: &str, type_name: &'static str) -> CommandEntry {
        let class: Arc<dyn CommandClass> = Arc::new(Cls(type_name));
        CommandEntry {
            module: module.to_string(),
            name: class.name(),
            class,
        }
    }

    fn loaded() -> LoadedModule {
        LoadedModule {
            module: Arc::new(NoModule),
            spec: None,
        }
    }

    #[test]
    fn test_latest_command_wins() {
        let mut registry = Registry::default();
        let mut first = Contribution::default();
        first.commands.push((CommandKind::Window, command("A.one", "FooCommand")));
        let mut second = Contribution::default();
        second.commands.push((CommandKind::Window, command("B.two", "FooCommand")));

        registry.apply("A.one", loaded(), &first);
        registry.apply("B.two", loaded(), &second);
        assert_eq!(registry.find_command(CommandKind::Window, "foo").unwrap().module, "B.two");
        assert_eq!(registry.commands(CommandKind::Window).len(), 2);

        registry.remove_module("B.two");
        assert_eq!(registry.find_command(CommandKind::Window, "foo").unwrap().module, "A.one");
        assert!(registry.find_command(CommandKind::Text, "foo").is_none());
    }

    #[test]
    fn test_callbacks_follow_event_set() {
        let mut registry = Registry::default();
        let mut contribution = Contribution::default();
        contribution.listeners.push(Arc::new(ListenerEntry {
            module: "A.one".into(),
            class: "L".into(),
            events: EventSet::from([EventKind::Modified, EventKind::ModifiedAsync]),
            instance: Box::new(Quiet),
        }));
        registry.apply("A.one", loaded(), &contribution);

        let sync = registry.callbacks(EventKind::Modified);
        let async_ = registry.callbacks(EventKind::ModifiedAsync);
        assert_eq!(sync.len(), 1);
        assert_eq!(sync[0].guard, Guard::TimedFaultIsolated);
        assert_eq!(async_[0].guard, Guard::FaultIsolated);
        assert!(registry.callbacks(EventKind::Load).is_empty());

        let before = Registry::default().snapshot();
        registry.remove_module("A.one");
        assert_eq!(registry.snapshot(), before);
    }
}
