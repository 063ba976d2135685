//! Script-backed modules, classes and instances.

use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;
use plughost_core::{command_name_for_type, ExtResult, ExtensionError, Settings, Target, Value, ViewId};
use rhai::{CallFnOptions, Dynamic, Engine, FnPtr, Map, Scope, AST};

use super::convert::{buffer_to_dynamic, event_to_dynamic, reply_for, script_error, settings_to_dynamic, value_to_dynamic};
use crate::api::Api;
use crate::capability::{
    Command, CommandClass, EventListener, EventListenerClass, Export, Exports, TextChangeListener,
    TextChangeListenerClass, ViewEventListener, ViewListenerClass,
};
use crate::edit::Edit;
use crate::hooks::{Event, EventSet, Reply};
use crate::host::BufferInfo;
use crate::module::ExtensionModule;
use crate::types::CommandKind;

/// Handler name to script function.
pub(crate) type Handlers = IndexMap<String, FnPtr>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DeclKind {
    Command(CommandKind),
    EventListener,
    ViewListener { primary_only: bool },
    TextChangeListener,
}

#[derive(Debug, Clone)]
pub(crate) struct Declaration {
    pub name: String,
    pub kind: DeclKind,
    pub events: EventSet,
    pub handlers: Handlers,
}

/// What a script declared while its top level ran.
#[derive(Debug, Default)]
pub(crate) struct Declarations {
    pub items: Vec<Declaration>,
    pub allow: Option<Vec<String>>,
}

impl Declarations {
    /// Re-declaring a name replaces the earlier declaration.
    pub fn declare(&mut self, declaration: Declaration) {
        match self.items.iter_mut().find(|d| d.name == declaration.name) {
            Some(slot) => *slot = declaration,
            None => self.items.push(declaration),
        }
    }
}

/// A compiled script with the engine that runs it.
pub(crate) struct Script {
    pub module: String,
    pub engine: Engine,
    pub ast: AST,
}

impl Script {
    /// Call a script function with `this` bound.
    pub fn call(&self, this: &mut Dynamic, label: &str, handler: &FnPtr, args: Vec<Dynamic>) -> ExtResult<Dynamic> {
        let mut all: Vec<Dynamic> = handler.curry().to_vec();
        all.extend(args);
        let options = CallFnOptions::new()
            .eval_ast(false)
            .rewind_scope(true)
            .bind_this_ptr(this);
        self.engine
            .call_fn_with_options::<Dynamic>(options, &mut Scope::new(), &self.ast, handler.fn_name(), all)
            .map_err(|err| script_error(&self.module, label, err))
    }

    pub fn has_function(&self, name: &str) -> bool {
        self.ast.iter_functions().any(|f| f.name == name && f.params.is_empty())
    }

    fn call_top_level(&self, name: &str) -> ExtResult<()> {
        let options = CallFnOptions::new().eval_ast(false).rewind_scope(true);
        self.engine
            .call_fn_with_options::<Dynamic>(options, &mut Scope::new(), &self.ast, name, ())
            .map(|_| ())
            .map_err(|err| script_error(&self.module, name, err))
    }
}

/// A script module.
pub(crate) struct ScriptModule {
    script: Arc<Script>,
    declarations: Declarations,
    has_loaded: bool,
    has_unloaded: bool,
}

impl ScriptModule {
    pub fn new(script: Script, declarations: Declarations) -> Self {
        Self {
            has_loaded: script.has_function("plugin_loaded"),
            has_unloaded: script.has_function("plugin_unloaded"),
            script: Arc::new(script),
            declarations,
        }
    }
}

impl ExtensionModule for ScriptModule {
    fn name(&self) -> &str {
        &self.script.module
    }

    fn register(&self, exports: &mut Exports) -> ExtResult<()> {
        for declaration in &self.declarations.items {
            let class = Arc::new(ScriptClass {
                script: Arc::clone(&self.script),
                name: declaration.name.clone(),
                events: declaration.events,
                handlers: Arc::new(declaration.handlers.clone()),
                primary_only: matches!(declaration.kind, DeclKind::ViewListener { primary_only: true }),
            });
            let export = match declaration.kind {
                DeclKind::Command(kind) => Export::Command(kind, class),
                DeclKind::EventListener => Export::EventListener(class),
                DeclKind::ViewListener { .. } => Export::ViewListener(class),
                DeclKind::TextChangeListener => Export::TextChangeListener(class),
            };
            exports.export(declaration.name.clone(), export);
        }
        if let Some(allow) = &self.declarations.allow {
            exports.allow(allow.iter().cloned());
        }
        Ok(())
    }

    fn plugin_loaded(&self, _api: &Api) -> ExtResult<()> {
        if self.has_loaded {
            self.script.call_top_level("plugin_loaded")?;
        }
        Ok(())
    }

    fn plugin_unloaded(&self, _api: &Api) -> ExtResult<()> {
        if self.has_unloaded {
            self.script.call_top_level("plugin_unloaded")?;
        }
        Ok(())
    }
}

/// One declared class. Implements whichever class trait its declaration
/// exported it as.
struct ScriptClass {
    script: Arc<Script>,
    name: String,
    events: EventSet,
    handlers: Arc<Handlers>,
    primary_only: bool,
}

impl ScriptClass {
    fn construct(&self, this: Map, args: Vec<Dynamic>) -> ExtResult<ScriptInstance> {
        let mut this = Dynamic::from(this);
        if let Some(constructor) = self.handlers.get("constructor") {
            self.script.call(&mut this, "constructor", constructor, args)?;
        }
        Ok(ScriptInstance {
            script: Arc::clone(&self.script),
            handlers: Arc::clone(&self.handlers),
            this: Mutex::new(this),
        })
    }

    fn applicable(&self, arg: Dynamic) -> bool {
        let Some(handler) = self.handlers.get("is_applicable") else {
            return true;
        };
        let mut this = Dynamic::UNIT;
        match self.script.call(&mut this, "is_applicable", handler, vec![arg]) {
            Ok(result) => result.as_bool().unwrap_or(false),
            Err(err) => {
                tracing::warn!(
                    target: "plughost::script",
                    "{}.{}.is_applicable failed: {}",
                    self.script.module,
                    self.name,
                    err
                );
                false
            }
        }
    }
}

fn target_map(target: Target) -> Map {
    let mut map = Map::new();
    match target {
        Target::Application => {}
        Target::View(view) => {
            map.insert("view".into(), Dynamic::from(view.id() as i64));
        }
        Target::Window(window) => {
            map.insert("window".into(), Dynamic::from(window.id() as i64));
        }
        Target::Buffer(buffer) => {
            map.insert("buffer".into(), Dynamic::from(buffer.id() as i64));
        }
    }
    map
}

impl CommandClass for ScriptClass {
    fn type_name(&self) -> &str {
        &self.name
    }

    fn name(&self) -> String {
        command_name_for_type(&self.name)
    }

    fn instantiate(&self, target: Target) -> ExtResult<Box<dyn Command>> {
        Ok(Box::new(self.construct(target_map(target), Vec::new())?))
    }
}

impl EventListenerClass for ScriptClass {
    fn type_name(&self) -> &str {
        &self.name
    }

    fn events(&self) -> EventSet {
        self.events
    }

    fn instantiate(&self) -> ExtResult<Box<dyn EventListener>> {
        Ok(Box::new(self.construct(Map::new(), Vec::new())?))
    }
}

impl ViewListenerClass for ScriptClass {
    fn type_name(&self) -> &str {
        &self.name
    }

    fn events(&self) -> EventSet {
        self.events
    }

    fn is_applicable(&self, settings: &Settings) -> bool {
        self.applicable(settings_to_dynamic(settings))
    }

    fn applies_to_primary_view_only(&self) -> bool {
        self.primary_only
    }

    fn instantiate(&self, view: ViewId) -> ExtResult<Box<dyn ViewEventListener>> {
        let view_id = Dynamic::from(view.id() as i64);
        Ok(Box::new(self.construct(target_map(view.into()), vec![view_id])?))
    }
}

impl TextChangeListenerClass for ScriptClass {
    fn type_name(&self) -> &str {
        &self.name
    }

    fn events(&self) -> EventSet {
        self.events
    }

    fn is_applicable(&self, buffer: &BufferInfo) -> bool {
        self.applicable(buffer_to_dynamic(buffer))
    }

    fn instantiate(&self) -> ExtResult<Box<dyn TextChangeListener>> {
        Ok(Box::new(self.construct(Map::new(), Vec::new())?))
    }
}

/// A live script object with its own `this` map.
struct ScriptInstance {
    script: Arc<Script>,
    handlers: Arc<Handlers>,
    this: Mutex<Dynamic>,
}

impl ScriptInstance {
    fn invoke(&self, method: &str, args: Vec<Dynamic>) -> ExtResult<Option<Dynamic>> {
        let Some(handler) = self.handlers.get(method) else {
            return Ok(None);
        };
        let mut this = self.this.lock();
        self.script.call(&mut this, method, handler, args).map(Some)
    }

    fn handle(&self, event: &Event) -> ExtResult<Reply> {
        let method = event.kind.method_name();
        match self.invoke(&method, vec![event_to_dynamic(event)])? {
            Some(result) => Ok(reply_for(event.kind, result)),
            None => Ok(Reply::None),
        }
    }

    fn flag(&self, method: &str, args: &Value, default: bool) -> ExtResult<bool> {
        Ok(self
            .invoke(method, vec![value_to_dynamic(args)])?
            .and_then(|r| r.as_bool().ok())
            .unwrap_or(default))
    }
}

impl Command for ScriptInstance {
    fn run(&self, _api: &Api, edit: Option<&Edit>, args: &Value) -> ExtResult<()> {
        let mut call_args = Vec::with_capacity(2);
        if let Some(edit) = edit {
            call_args.push(Dynamic::from(edit.clone()));
        }
        call_args.push(value_to_dynamic(args));
        match self.invoke("run", call_args)? {
            Some(_) => Ok(()),
            None => Err(ExtensionError::new("command has no run handler")),
        }
    }

    fn is_enabled(&self, _api: &Api, args: &Value) -> ExtResult<bool> {
        self.flag("is_enabled", args, true)
    }

    fn is_visible(&self, _api: &Api, args: &Value) -> ExtResult<bool> {
        self.flag("is_visible", args, true)
    }

    fn is_checked(&self, _api: &Api, args: &Value) -> ExtResult<bool> {
        self.flag("is_checked", args, false)
    }

    fn description(&self, _api: &Api, args: &Value) -> ExtResult<Option<String>> {
        Ok(self
            .invoke("description", vec![value_to_dynamic(args)])?
            .filter(|d| !d.is_unit())
            .map(|d| d.to_string()))
    }
}

impl EventListener for ScriptInstance {
    fn on_event(&self, _api: &Api, event: &Event) -> ExtResult<Reply> {
        self.handle(event)
    }
}

impl ViewEventListener for ScriptInstance {
    fn on_event(&self, _api: &Api, event: &Event) -> ExtResult<Reply> {
        self.handle(event)
    }
}

impl TextChangeListener for ScriptInstance {
    fn on_event(&self, _api: &Api, event: &Event) -> ExtResult<Reply> {
        self.handle(event)
    }
}
