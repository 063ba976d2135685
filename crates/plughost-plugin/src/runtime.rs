//! The extension runtime.
//!
//! [`PluginHost`] owns the importer, the module compiler and every registry.
//! Hosts create one per process, feed it archive paths, load modules by
//! name and forward editor events to the entry points in `dispatch`.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use plughost_archive::{ArchiveError, Importer, ModuleSpec};
use plughost_core::{RuntimeConfig, Target, Value, ViewId, WindowId};

use crate::activation::PendingActivations;
use crate::affinity::Affinity;
use crate::api::Api;
use crate::capability::{Command, Export, Exports};
use crate::console::Console;
use crate::dispatch::Receiver;
use crate::edit::Edit;
use crate::fault::{trap, CallSite, FaultWrapper, Guard};
use crate::hooks::{Event, EventKind};
use crate::host::Host;
use crate::module::{ExtensionModule, ModuleCompiler};
use crate::registry::{
    Callback, CommandEntry, Contribution, ListenerEntry, LoadedModule, Registry, RegistrySnapshot,
    TextChangeClassEntry, ViewClassEntry,
};
use crate::rhai::RhaiInterpreter;
use crate::types::{CommandKind, PluginError, PluginResult, ProfileEntry};

/// The extension runtime bound to one host.
pub struct PluginHost {
    pub(crate) me: Weak<PluginHost>,
    pub(crate) host: Arc<dyn Host>,
    config: RuntimeConfig,
    importer: Importer,
    compiler: RwLock<Arc<dyn ModuleCompiler>>,
    pub(crate) registry: RwLock<Registry>,
    pub(crate) affinity: Affinity,
    pub(crate) pending: PendingActivations,
    /// Modules loaded before the API was ready, awaiting `plugin_loaded`.
    deferred: Mutex<Vec<Arc<dyn ExtensionModule>>>,
    api_ready: AtomicBool,
    pub(crate) fault: FaultWrapper,
    pub(crate) api: Api,
    pub(crate) console: Console,
    edit_tokens: AtomicU64,
}

impl PluginHost {
    /// Create a runtime using the Rhai interpreter and register the
    /// configured archives.
    pub fn new(host: Arc<dyn Host>, config: RuntimeConfig) -> PluginResult<Arc<Self>> {
        let console = Console::new(Arc::clone(&host));
        let api = Api::new(Arc::clone(&host), console.clone());
        let compiler: Arc<dyn ModuleCompiler> = Arc::new(RhaiInterpreter::new(&config.script_limits, api.clone()));
        let importer = Importer::from_config(&config);

        let runtime = Arc::new_cyclic(|me| Self {
            me: me.clone(),
            api,
            fault: FaultWrapper::new(console.clone(), config.profiling),
            host,
            importer,
            compiler: RwLock::new(compiler),
            registry: RwLock::new(Registry::default()),
            affinity: Affinity::default(),
            pending: PendingActivations::default(),
            deferred: Mutex::new(Vec::new()),
            api_ready: AtomicBool::new(false),
            console,
            config,
            edit_tokens: AtomicU64::new(0),
        });
        tracing::debug!(
            target: "plughost::registry",
            compiler = runtime.compiler.read().name(),
            "Plugin host created"
        );
        Ok(runtime)
    }

    /// Replace the module compiler used for subsequent loads.
    pub fn set_compiler(&self, compiler: Arc<dyn ModuleCompiler>) {
        *self.compiler.write() = compiler;
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn api(&self) -> &Api {
        &self.api
    }

    pub fn console(&self) -> &Console {
        &self.console
    }

    pub fn importer(&self) -> &Importer {
        &self.importer
    }

    /// Register the archives at `paths`. Failures are logged and returned;
    /// the other archives are still registered.
    pub fn update_compressed_packages(&self, paths: &[PathBuf]) -> Vec<ArchiveError> {
        let errors = self.importer.update_compressed_packages(paths);
        for err in &errors {
            tracing::warn!(target: "plughost::archive", "{}", err);
        }
        errors
    }

    pub fn set_override_path(&self, path: Option<PathBuf>) {
        self.importer.set_override_path(path);
    }

    pub fn is_api_ready(&self) -> bool {
        self.api_ready.load(Ordering::Acquire)
    }

    pub(crate) fn set_api_ready(&self) -> bool {
        !self.api_ready.swap(true, Ordering::AcqRel)
    }

    /// Resolve and compile a module without registering it.
    pub fn import(&self, name: &str) -> PluginResult<(ModuleSpec, Arc<dyn ExtensionModule>)> {
        let (spec, code) = self.importer.import(name).map_err(|err| {
            if err.is_not_found() {
                PluginError::ModuleNotFound { name: name.to_string() }
            } else {
                err.into()
            }
        })?;
        let module = self.compiler.read().compile(&spec, &code)?;
        Ok((spec, module))
    }

    /// Load a module by dotted name. An already loaded module is reloaded;
    /// disabled modules are skipped.
    pub fn load_plugin(&self, name: &str) -> PluginResult<()> {
        if self.config.is_disabled(name) {
            tracing::info!(target: "plughost::registry", "Skipping disabled plugin {}", name);
            return Ok(());
        }
        if self.registry.read().module(name).is_some() {
            return self.reload_plugin(name);
        }
        let (spec, module) = self.import(name)?;
        self.load_module(module, Some(spec))
    }

    /// Unload a module if loaded, then resolve and load it again. If it no
    /// longer resolves (its archive was removed and nothing overrides it),
    /// the module stays unloaded and `ModuleNotFound` is returned.
    pub fn reload_plugin(&self, name: &str) -> PluginResult<()> {
        if self.registry.read().module(name).is_some() {
            self.unload_module(name)?;
        }
        let (spec, module) = self.import(name)?;
        self.load_module(module, Some(spec))
    }

    /// Register an already compiled module.
    /// A module of the same name is unloaded first.
    pub fn load_module(&self, module: Arc<dyn ExtensionModule>, spec: Option<ModuleSpec>) -> PluginResult<()> {
        let name = module.name().to_string();
        if self.registry.read().module(&name).is_some() {
            self.unload_module(&name)?;
        }
        let mut exports = Exports::new(name.clone());
        trap(|| module.register(&mut exports)).map_err(|source| PluginError::Registration {
            module: name.clone(),
            source,
        })?;

        let contribution = self.stage(&name, &exports);
        let activated_listeners: Vec<Arc<ListenerEntry>> = contribution
            .listeners
            .iter()
            .filter(|l| l.events.contains(EventKind::ActivatedAsync))
            .cloned()
            .collect();
        let activated_views: Vec<Arc<ViewClassEntry>> = contribution
            .view_classes
            .iter()
            .filter(|c| c.events.contains(EventKind::ActivatedAsync))
            .cloned()
            .collect();

        self.registry.write().apply(
            &name,
            LoadedModule {
                module: Arc::clone(&module),
                spec,
            },
            &contribution,
        );
        self.pending.push(activated_listeners, activated_views);
        tracing::info!(
            target: "plughost::registry",
            module = %name,
            exports = exports.public().len(),
            "Loaded plugin"
        );

        if !self.is_api_ready() {
            self.deferred.lock().push(module);
            return Ok(());
        }

        self.run_module_hook("plugin_loaded", &name, || module.plugin_loaded(&self.api));
        if !contribution.view_classes.is_empty() {
            self.check_all_view_listeners();
        }
        if !contribution.text_change_classes.is_empty() {
            for buffer in self.host.buffers() {
                self.check_text_change_listeners(buffer);
            }
        }
        self.on_init(Some(&name));
        self.activate_module(&contribution);
        self.schedule_activation();
        Ok(())
    }

    /// Turn a module's public exports into registry entries, creating its
    /// global listeners.
    fn stage(&self, module: &str, exports: &Exports) -> Contribution {
        let mut contribution = Contribution::default();
        for (name, export) in exports.public() {
            match export {
                Export::Command(kind, class) => contribution.commands.push((
                    *kind,
                    CommandEntry {
                        module: module.to_string(),
                        name: class.name(),
                        class: Arc::clone(class),
                    },
                )),
                Export::EventListener(class) => {
                    let events = class.events().filter(EventKind::for_event_listener);
                    let made = self.fault.instantiate(module, name, || class.instantiate());
                    if let Some(instance) = made {
                        contribution.listeners.push(Arc::new(ListenerEntry {
                            module: module.to_string(),
                            class: name.to_string(),
                            events,
                            instance,
                        }));
                    }
                }
                Export::ViewListener(class) => contribution.view_classes.push(Arc::new(ViewClassEntry {
                    module: module.to_string(),
                    class_name: name.to_string(),
                    events: class.events().filter(EventKind::for_view_listener),
                    class: Arc::clone(class),
                })),
                Export::TextChangeListener(class) => {
                    contribution.text_change_classes.push(Arc::new(TextChangeClassEntry {
                        module: module.to_string(),
                        class_name: name.to_string(),
                        events: class.events().filter(EventKind::for_text_change_listener),
                        class: Arc::clone(class),
                    }))
                }
            }
        }
        contribution
    }

    /// Deliver a synthetic `activated` to a freshly loaded module's
    /// listeners on the focused view.
    fn activate_module(&self, contribution: &Contribution) {
        let Some(view) = self.api.active_view() else {
            return;
        };
        let event = Event::new(EventKind::Activated, view);
        for listener in &contribution.listeners {
            if listener.events.contains(EventKind::Activated) {
                let receiver = Receiver::Global(Callback {
                    listener: Arc::clone(listener),
                    guard: Guard::TimedFaultIsolated,
                });
                self.deliver("activated", &receiver, &event);
            }
        }
        for class in &contribution.view_classes {
            if !class.events.contains(EventKind::Activated) {
                continue;
            }
            if let Some(binding) = self.affinity.find_view_binding(view, class) {
                self.deliver("activated", &Receiver::View(binding), &event);
            }
        }
    }

    pub(crate) fn schedule_activation(&self) {
        let me = self.me.clone();
        self.host.set_timeout_async(Box::new(move || {
            if let Some(me) = me.upgrade() {
                me.synthesize_on_activated_async();
            }
        }));
    }

    pub(crate) fn run_module_hook(
        &self,
        method: &str,
        module: &str,
        f: impl FnOnce() -> plughost_core::ExtResult<()>,
    ) {
        let site = CallSite::module_hook("load_module", module, method);
        self.fault.call(Guard::FaultIsolated, &site, f);
    }

    /// Remove a module and everything it registered.
    pub fn unload_module(&self, name: &str) -> PluginResult<()> {
        let module = match self.registry.read().module(name) {
            Some(loaded) => Arc::clone(&loaded.module),
            None => {
                return Err(PluginError::ModuleNotFound { name: name.to_string() });
            }
        };

        let site = CallSite::module_hook("unload_module", name, "plugin_unloaded");
        self.fault
            .call(Guard::FaultIsolated, &site, || module.plugin_unloaded(&self.api));

        for binding in self.affinity.remove_module(name) {
            if let Err(err) = binding.listener.detach() {
                tracing::warn!(target: "plughost::registry", "{}", err);
            }
        }
        self.registry.write().remove_module(name);
        self.pending.remove_module(name);
        self.deferred.lock().retain(|m| m.name() != name);
        tracing::info!(target: "plughost::registry", module = %name, "Unloaded plugin");
        Ok(())
    }

    /// Run deferred `plugin_loaded` hooks.
    pub(crate) fn run_deferred_hooks(&self) {
        let deferred = std::mem::take(&mut *self.deferred.lock());
        for module in deferred {
            self.run_module_hook("plugin_loaded", module.name(), || module.plugin_loaded(&self.api));
        }
    }

    /// The host API is usable: run deferred hooks, attach listeners to
    /// everything already open and schedule the initial notifications.
    pub fn on_api_ready(&self) {
        if !self.set_api_ready() {
            return;
        }
        self.run_deferred_hooks();
        self.check_all_view_listeners();
        for buffer in self.host.buffers() {
            self.check_text_change_listeners(buffer);
        }

        let me = self.me.clone();
        self.host.set_timeout(Box::new(move || {
            if let Some(me) = me.upgrade() {
                me.on_init(None);
                if let Some(view) = me.api.active_view() {
                    me.on_activated(view);
                }
            }
        }));
        self.schedule_activation();
    }

    /// Loaded module names in load order.
    pub fn loaded_modules(&self) -> Vec<String> {
        self.registry.read().module_names()
    }

    /// Registry and affinity state, for inspection and comparison.
    pub fn snapshot(&self) -> RegistrySnapshot {
        let mut snapshot = self.registry.read().snapshot();
        self.affinity.fill_snapshot(&mut snapshot);
        snapshot
    }

    /// Call counts and durations of blocking callbacks as
    /// `(event, module, entry)`.
    pub fn profiling_data(&self) -> Vec<(String, String, ProfileEntry)> {
        self.fault.profiler().entries()
    }

    pub fn find_command(&self, kind: CommandKind, name: &str) -> Option<String> {
        self.registry.read().find_command(kind, name).map(|c| c.module)
    }

    fn create_commands(&self, kind: CommandKind, target: Target) -> Vec<(Box<dyn Command>, String)> {
        let entries = self.registry.read().commands(kind).to_vec();
        entries
            .into_iter()
            .filter_map(|entry| {
                let class = entry.class.type_name().to_string();
                self.fault
                    .instantiate(&entry.module, &class, || entry.class.instantiate(target))
                    .map(|command| (command, entry.name))
            })
            .collect()
    }

    /// Fresh instances of every application command, with their names.
    pub fn create_application_commands(&self) -> Vec<(Box<dyn Command>, String)> {
        self.create_commands(CommandKind::Application, Target::Application)
    }

    pub fn create_window_commands(&self, window: WindowId) -> Vec<(Box<dyn Command>, String)> {
        self.create_commands(CommandKind::Window, window.into())
    }

    pub fn create_text_commands(&self, view: ViewId) -> Vec<(Box<dyn Command>, String)> {
        self.create_commands(CommandKind::Text, view.into())
    }

    fn instantiate_command(
        &self,
        kind: CommandKind,
        name: &str,
        target: Target,
    ) -> PluginResult<Option<(Box<dyn Command>, CommandEntry)>> {
        let entry = self
            .registry
            .read()
            .find_command(kind, name)
            .ok_or_else(|| PluginError::CommandNotFound {
                kind,
                name: name.to_string(),
            })?;
        let class = entry.class.type_name().to_string();
        Ok(self
            .fault
            .instantiate(&entry.module, &class, || entry.class.instantiate(target))
            .map(|command| (command, entry)))
    }

    fn run_command(
        &self,
        kind: CommandKind,
        name: &str,
        target: Target,
        args: &Value,
        edit: Option<&Edit>,
    ) -> PluginResult<bool> {
        let Some((command, entry)) = self.instantiate_command(kind, name, target)? else {
            return Ok(false);
        };
        let class = entry.class.type_name();
        let site = CallSite {
            entry: "run_command",
            method: "run",
            module: &entry.module,
            class,
        };
        Ok(self
            .fault
            .call(Guard::FaultIsolated, &site, || command.run(&self.api, edit, args))
            .is_some())
    }

    /// Run an application command. Returns whether it completed without
    /// faulting.
    pub fn run_application_command(&self, name: &str, args: &Value) -> PluginResult<bool> {
        self.run_command(CommandKind::Application, name, Target::Application, args, None)
    }

    pub fn run_window_command(&self, window: WindowId, name: &str, args: &Value) -> PluginResult<bool> {
        self.run_command(CommandKind::Window, name, window.into(), args, None)
    }

    /// Run a text command inside a fresh edit scope. The edit expires when
    /// the command returns.
    pub fn run_text_command(&self, view: ViewId, name: &str, args: &Value) -> PluginResult<bool> {
        let lock = self.affinity.handle_lock(view.into());
        let _guard = lock.lock();

        let token = self.edit_tokens.fetch_add(1, Ordering::Relaxed) + 1;
        self.host.begin_edit(view, token, name, args);
        let edit = Edit::new(view, token);
        let result = self.run_command(CommandKind::Text, name, view.into(), args, Some(&edit));
        edit.expire();
        self.host.end_edit(view, token);
        result
    }
}
