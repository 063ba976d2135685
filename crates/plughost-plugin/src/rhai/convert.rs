//! Conversions between script values and runtime types.

use plughost_core::{
    AutoCompleteFlags, CompletionItem, CompletionValue, ExtensionError, Frame, Settings, Target, Value,
};
use rhai::{Array, Dynamic, EvalAltResult, Map, Position};

use crate::hooks::{Event, EventArgs, EventKind, Reply};
use crate::host::BufferInfo;

/// Convert a Rhai Dynamic to a [`Value`].
pub(crate) fn dynamic_to_value(val: &Dynamic) -> Value {
    if val.is_unit() {
        Value::Null
    } else if val.is_bool() {
        Value::Bool(val.as_bool().unwrap_or(false))
    } else if val.is_int() {
        Value::Integer(val.as_int().unwrap_or(0))
    } else if val.is_float() {
        Value::Float(val.as_float().unwrap_or(0.0))
    } else if val.is_string() {
        Value::String(val.clone().into_string().unwrap_or_default())
    } else if val.is_array() {
        let arr = val.clone().into_array().unwrap_or_default();
        Value::Array(arr.iter().map(dynamic_to_value).collect())
    } else if val.is_map() {
        let map = val.clone().cast::<Map>();
        Value::Object(
            map.into_iter()
                .map(|(k, v)| (k.to_string(), dynamic_to_value(&v)))
                .collect(),
        )
    } else {
        Value::Null
    }
}

/// Convert a [`Value`] to a Rhai Dynamic.
pub(crate) fn value_to_dynamic(val: &Value) -> Dynamic {
    match val {
        Value::Null => Dynamic::UNIT,
        Value::Bool(b) => Dynamic::from(*b),
        Value::Integer(i) => Dynamic::from(*i),
        Value::Float(f) => Dynamic::from(*f),
        Value::String(s) => Dynamic::from(s.clone()),
        Value::Array(arr) => {
            let rhai_arr: Array = arr.iter().map(value_to_dynamic).collect();
            Dynamic::from(rhai_arr)
        }
        Value::Object(obj) => {
            let mut map = Map::new();
            for (k, v) in obj {
                map.insert(k.as_str().into(), value_to_dynamic(v));
            }
            Dynamic::from(map)
        }
    }
}

fn id(raw: u64) -> Dynamic {
    Dynamic::from(raw as i64)
}

pub(crate) fn settings_to_dynamic(settings: &Settings) -> Dynamic {
    value_to_dynamic(&settings.to_value())
}

pub(crate) fn buffer_to_dynamic(info: &BufferInfo) -> Dynamic {
    let mut map = Map::new();
    map.insert("id".into(), id(info.id.id()));
    map.insert(
        "file_name".into(),
        info.file_name
            .as_ref()
            .map(|p| Dynamic::from(p.display().to_string()))
            .unwrap_or(Dynamic::UNIT),
    );
    map.insert("primary_view".into(), id(info.primary_view.id()));
    Dynamic::from(map)
}

/// The map a listener handler receives.
pub(crate) fn event_to_dynamic(event: &Event) -> Dynamic {
    let mut map = Map::new();
    map.insert("kind".into(), Dynamic::from(event.kind.name().to_string()));
    match event.target {
        Target::Application => {}
        Target::View(view) => {
            map.insert("view".into(), id(view.id()));
        }
        Target::Window(window) => {
            map.insert("window".into(), id(window.id()));
        }
        Target::Buffer(buffer) => {
            map.insert("buffer".into(), id(buffer.id()));
        }
    }

    match &event.args {
        EventArgs::None => {}
        EventArgs::Views(views) => {
            let views: Array = views.iter().map(|v| id(v.id())).collect();
            map.insert("views".into(), Dynamic::from(views));
        }
        EventArgs::Hover { point, zone } => {
            map.insert("point".into(), Dynamic::from(*point));
            map.insert("zone".into(), Dynamic::from(*zone as i64));
        }
        EventArgs::Context {
            key,
            operator,
            operand,
            match_all,
        } => {
            map.insert("key".into(), Dynamic::from(key.clone()));
            map.insert("operator".into(), Dynamic::from(*operator as i64));
            map.insert("operand".into(), value_to_dynamic(operand));
            map.insert("match_all".into(), Dynamic::from(*match_all));
        }
        EventArgs::Completions { prefix, locations } => {
            let locations: Array = locations.iter().map(|p| Dynamic::from(*p)).collect();
            map.insert("prefix".into(), Dynamic::from(prefix.clone()));
            map.insert("locations".into(), Dynamic::from(locations));
        }
        EventArgs::Command { name, args } => {
            map.insert("command".into(), Dynamic::from(name.clone()));
            map.insert("args".into(), value_to_dynamic(args));
        }
        EventArgs::Changes(changes) => {
            let changes: Array = changes
                .iter()
                .map(|c| {
                    let mut change = Map::new();
                    change.insert("a".into(), Dynamic::from(c.a.pt));
                    change.insert("b".into(), Dynamic::from(c.b.pt));
                    change.insert("len_utf8".into(), Dynamic::from(c.len_utf8));
                    change.insert("text".into(), Dynamic::from(c.text.clone()));
                    Dynamic::from(change)
                })
                .collect();
            map.insert("changes".into(), Dynamic::from(changes));
        }
    }
    Dynamic::from(map)
}

fn completion_value(val: &Dynamic) -> Option<CompletionValue> {
    if val.is_string() {
        return val.clone().into_string().ok().map(CompletionValue::Text);
    }
    if val.is_array() {
        let parts: Vec<String> = val
            .clone()
            .into_array()
            .ok()?
            .into_iter()
            .map(|p| p.to_string())
            .collect();
        return match parts.as_slice() {
            [trigger, completion] => Some(CompletionValue::Pair(trigger.clone(), completion.clone())),
            [trigger, hint, completion] => Some(CompletionValue::Triple(
                trigger.clone(),
                hint.clone(),
                completion.clone(),
            )),
            _ => None,
        };
    }
    if val.is_map() {
        let map = val.clone().cast::<Map>();
        let field = |key: &str| map.get(key).map(|v| v.to_string()).unwrap_or_default();
        let mut item = CompletionItem::new(field("trigger")).with_annotation(field("annotation"));
        item.completion = field("completion");
        item.details = field("details");
        return Some(CompletionValue::Item(item));
    }
    None
}

fn completion_values(val: &Dynamic) -> Vec<CompletionValue> {
    val.clone()
        .into_array()
        .unwrap_or_default()
        .iter()
        .filter_map(completion_value)
        .collect()
}

/// Interpret a handler's return value for the event it handled.
pub(crate) fn reply_for(kind: EventKind, val: Dynamic) -> Reply {
    if val.is_unit() {
        return Reply::None;
    }
    match kind {
        EventKind::QueryCompletions if val.is_array() => Reply::Completions(completion_values(&val)),
        EventKind::QueryCompletions if val.is_map() => {
            let map = val.cast::<Map>();
            let items = map.get("items").map(completion_values).unwrap_or_default();
            let flags = map.get("flags").and_then(|f| f.as_int().ok()).unwrap_or(0);
            Reply::CompletionsWithFlags(items, AutoCompleteFlags(flags as u32))
        }
        EventKind::TextCommand | EventKind::WindowCommand if val.is_array() => {
            let parts = val.into_array().unwrap_or_default();
            match parts.as_slice() {
                [name] => Reply::Command {
                    name: name.to_string(),
                    args: None,
                },
                [name, args] => Reply::Command {
                    name: name.to_string(),
                    args: Some(dynamic_to_value(args)),
                },
                _ => Reply::None,
            }
        }
        EventKind::TextCommand | EventKind::WindowCommand if val.is_map() => {
            let map = val.cast::<Map>();
            match map.get("command") {
                Some(name) => Reply::Command {
                    name: name.to_string(),
                    args: map.get("args").map(dynamic_to_value),
                },
                None => Reply::None,
            }
        }
        _ => Reply::Value(dynamic_to_value(&val)),
    }
}

fn location(source: &str, pos: Position) -> String {
    match (pos.line(), pos.position()) {
        (Some(line), Some(col)) => format!("{source} {line}:{col}"),
        (Some(line), None) => format!("{source} {line}"),
        _ => source.to_string(),
    }
}

/// Flatten a Rhai error chain into an extension fault, outermost call first.
pub(crate) fn script_error(module: &str, function: &str, err: Box<EvalAltResult>) -> ExtensionError {
    let mut frames = vec![Frame::new(function.to_string())];
    let mut current = *err;
    loop {
        match current {
            EvalAltResult::ErrorInFunctionCall(name, source, inner, pos) => {
                let source = if source.is_empty() { module } else { source.as_str() };
                frames.push(Frame::new(name).at(location(source, pos)));
                current = *inner;
            }
            EvalAltResult::ErrorRuntime(value, pos) => {
                if let Some(frame) = frames.last_mut() {
                    frame.location.get_or_insert_with(|| location(module, pos));
                }
                let message = if value.is_string() {
                    value.into_string().unwrap_or_default()
                } else {
                    value.to_string()
                };
                return ExtensionError { message, frames };
            }
            other => {
                if let Some(frame) = frames.last_mut() {
                    frame
                        .location
                        .get_or_insert_with(|| location(module, other.position()));
                }
                return ExtensionError {
                    message: other.to_string(),
                    frames,
                };
            }
        }
    }
}
