//! Rhai interpreter: engine setup, host API and module compilation.

use std::sync::Arc;

use parking_lot::Mutex;
use plughost_archive::{ModuleCode, ModuleSpec};
use plughost_core::{BufferId, Region, ScriptLimits, ViewId, WindowId};
use rhai::{Array, Dynamic, Engine, EvalAltResult, FnPtr, Map, Scope};

use super::convert::{buffer_to_dynamic, script_error, settings_to_dynamic};
use super::module::{DeclKind, Declaration, Declarations, Handlers, Script, ScriptModule};
use crate::api::Api;
use crate::edit::Edit;
use crate::hooks::{EventKind, EventSet};
use crate::module::{ExtensionModule, ModuleCompiler};
use crate::types::{CommandKind, PluginError, PluginResult};

type ScriptResult<T> = Result<T, Box<EvalAltResult>>;

/// Compiles `.rhai` modules. Every module gets its own engine.
pub struct RhaiInterpreter {
    limits: ScriptLimits,
    api: Api,
}

impl RhaiInterpreter {
    pub fn new(limits: &ScriptLimits, api: Api) -> Self {
        Self {
            limits: limits.clone(),
            api,
        }
    }

    fn engine(&self, sink: Arc<Mutex<Declarations>>) -> Engine {
        let mut engine = Engine::new();

        // Configure safety limits
        engine.set_max_expr_depths(self.limits.max_expr_depth, self.limits.max_expr_depth);
        engine.set_max_call_levels(self.limits.max_call_levels);
        engine.set_max_operations(self.limits.max_operations);
        engine.set_max_string_size(self.limits.max_string_size);
        engine.set_max_array_size(self.limits.max_array_size);
        engine.set_max_map_size(self.limits.max_map_size);
        engine.disable_symbol("eval");

        let console = self.api.console().clone();
        engine.on_print(move |text| console.print(text));
        let console = self.api.console().clone();
        engine.on_debug(move |text, source, pos| match source {
            Some(source) => console.print(&format!("{source} {pos:?} | {text}")),
            None => console.print(text),
        });

        register_exports(&mut engine, &sink);
        register_api(&mut engine, &self.api);
        engine
    }
}

impl ModuleCompiler for RhaiInterpreter {
    fn name(&self) -> &'static str {
        "rhai"
    }

    fn compile(&self, spec: &ModuleSpec, code: &ModuleCode) -> PluginResult<Arc<dyn ExtensionModule>> {
        let source = code.text(&spec.name)?;
        let compile_error = |message: String| PluginError::Compile {
            module: spec.name.clone(),
            message,
        };

        let sink = Arc::new(Mutex::new(Declarations::default()));
        let engine = self.engine(Arc::clone(&sink));
        let mut ast = engine.compile(source).map_err(|e| compile_error(e.to_string()))?;
        ast.set_source(spec.name.as_str());
        engine
            .run_ast_with_scope(&mut Scope::new(), &ast)
            .map_err(|e| compile_error(script_error(&spec.name, "<module>", e).to_string()))?;

        let declarations = std::mem::take(&mut *sink.lock());
        tracing::debug!(
            target: "plughost::script",
            module = %spec.name,
            origin = %spec.origin,
            classes = declarations.items.len(),
            "Compiled script module"
        );
        let script = Script {
            module: spec.name.clone(),
            engine,
            ast,
        };
        Ok(Arc::new(ScriptModule::new(script, declarations)))
    }
}

fn to_fn_ptr(value: Dynamic, what: &str) -> ScriptResult<FnPtr> {
    if value.is::<FnPtr>() {
        return Ok(value.cast::<FnPtr>());
    }
    if value.is_string() {
        let name = value.into_string().unwrap_or_default();
        return FnPtr::new(name);
    }
    Err(format!("{what} must be a function or a function name").into())
}

fn declare_command(kind: CommandKind, name: &str, handler: Dynamic) -> ScriptResult<Declaration> {
    let mut handlers = Handlers::new();
    if handler.is_map() {
        for (key, value) in handler.cast::<Map>() {
            let fn_ptr = to_fn_ptr(value, &format!("{name}.{key}"))?;
            handlers.insert(key.to_string(), fn_ptr);
        }
        if !handlers.contains_key("run") {
            return Err(format!("command '{name}' has no run handler").into());
        }
    } else {
        handlers.insert("run".to_string(), to_fn_ptr(handler, name)?);
    }
    Ok(Declaration {
        name: name.to_string(),
        kind: DeclKind::Command(kind),
        events: EventSet::empty(),
        handlers,
    })
}

fn declare_listener(
    kind: DeclKind,
    name: &str,
    handlers: Map,
    accepts: fn(EventKind) -> bool,
) -> ScriptResult<Declaration> {
    let mut kind = kind;
    let mut events = EventSet::empty();
    let mut table = Handlers::new();
    for (key, value) in handlers {
        match key.as_str() {
            "primary_only" => {
                if let DeclKind::ViewListener { primary_only } = &mut kind {
                    *primary_only = value.as_bool().map_err(|_| format!("{name}.primary_only must be a bool"))?;
                    continue;
                }
                return Err(format!("unknown handler '{key}' in {name}").into());
            }
            "constructor" | "is_applicable" => {
                table.insert(key.to_string(), to_fn_ptr(value, &format!("{name}.{key}"))?);
            }
            other => {
                let event = EventKind::from_method_name(other)
                    .or_else(|| other.parse::<EventKind>().ok())
                    .filter(|kind| accepts(*kind))
                    .ok_or_else(|| format!("unknown handler '{other}' in {name}"))?;
                events.insert(event);
                table.insert(event.method_name(), to_fn_ptr(value, &format!("{name}.{other}"))?);
            }
        }
    }
    Ok(Declaration {
        name: name.to_string(),
        kind,
        events,
        handlers: table,
    })
}

fn register_exports(engine: &mut Engine, sink: &Arc<Mutex<Declarations>>) {
    let commands = [
        ("export_application_command", CommandKind::Application),
        ("export_window_command", CommandKind::Window),
        ("export_text_command", CommandKind::Text),
    ];
    for (fn_name, kind) in commands {
        let sink = Arc::clone(sink);
        engine.register_fn(fn_name, move |name: &str, handler: Dynamic| -> ScriptResult<()> {
            sink.lock().declare(declare_command(kind, name, handler)?);
            Ok(())
        });
    }

    let listeners: [(&str, DeclKind, fn(EventKind) -> bool); 3] = [
        ("export_event_listener", DeclKind::EventListener, EventKind::for_event_listener),
        (
            "export_view_listener",
            DeclKind::ViewListener { primary_only: true },
            EventKind::for_view_listener,
        ),
        (
            "export_text_change_listener",
            DeclKind::TextChangeListener,
            EventKind::for_text_change_listener,
        ),
    ];
    for (fn_name, kind, accepts) in listeners {
        let sink = Arc::clone(sink);
        engine.register_fn(fn_name, move |name: &str, handlers: Map| -> ScriptResult<()> {
            sink.lock().declare(declare_listener(kind, name, handlers, accepts)?);
            Ok(())
        });
    }

    let sink = Arc::clone(sink);
    engine.register_fn("allow_exports", move |names: Array| {
        sink.lock().allow = Some(names.iter().map(|n| n.to_string()).collect());
    });
}

fn edit_error(err: PluginError) -> Box<EvalAltResult> {
    err.to_string().into()
}


fn register_api(engine: &mut Engine, api: &Api) {
    engine
        .register_type_with_name::<Edit>("Edit")
        .register_get("view", |edit: &mut Edit| edit.view().id() as i64)
        .register_get("is_valid", |edit: &mut Edit| edit.is_valid());

    engine.register_fn("log_info", |msg: &str| {
        tracing::info!(target: "plughost::script", "{}", msg);
    });
    engine.register_fn("log_warn", |msg: &str| {
        tracing::warn!(target: "plughost::script", "{}", msg);
    });
    engine.register_fn("log_error", |msg: &str| {
        tracing::error!(target: "plughost::script", "{}", msg);
    });

    let a = api.clone();
    engine.register_fn("windows", move || -> Array {
        a.windows().into_iter().map(|w| Dynamic::from(w.id() as i64)).collect()
    });
    let a = api.clone();
    engine.register_fn("views", move |window: i64| -> Array {
        a.views(WindowId::new(window as u64))
            .into_iter()
            .map(|v| Dynamic::from(v.id() as i64))
            .collect()
    });
    let a = api.clone();
    engine.register_fn("active_window", move || -> i64 {
        a.active_window().map_or(0, |w| w.id() as i64)
    });
    let a = api.clone();
    engine.register_fn("active_view", move || -> i64 {
        a.active_view().map_or(0, |v| v.id() as i64)
    });
    let a = api.clone();
    engine.register_fn("settings", move |view: i64| -> Dynamic {
        settings_to_dynamic(&a.settings(ViewId::new(view as u64)))
    });
    let a = api.clone();
    engine.register_fn("buffer_of", move |view: i64| -> i64 {
        a.buffer(ViewId::new(view as u64)).map_or(0, |b| b.id() as i64)
    });
    let a = api.clone();
    engine.register_fn("buffer_info", move |buffer: i64| -> Dynamic {
        a.buffer_info(BufferId::new(buffer as u64))
            .map_or(Dynamic::UNIT, |info| buffer_to_dynamic(&info))
    });
    let a = api.clone();
    engine.register_fn("substr", move |view: i64, begin: i64, end: i64| -> String {
        a.substr(ViewId::new(view as u64), Region::new(begin, end))
    });

    let a = api.clone();
    engine.register_fn(
        "insert",
        move |edit: &mut Edit, point: i64, text: &str| -> ScriptResult<i64> {
            a.insert(edit, edit.view(), point, text)
                .map(|n| n as i64)
                .map_err(edit_error)
        },
    );
    let a = api.clone();
    engine.register_fn("erase", move |edit: &mut Edit, begin: i64, end: i64| -> ScriptResult<()> {
        a.erase(edit, edit.view(), Region::new(begin, end)).map_err(edit_error)
    });
    let a = api.clone();
    engine.register_fn(
        "replace",
        move |edit: &mut Edit, begin: i64, end: i64, text: &str| -> ScriptResult<()> {
            a.replace(edit, edit.view(), Region::new(begin, end), text)
                .map_err(edit_error)
        },
    );
}
