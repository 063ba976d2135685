use std::io::Write;

use plughost_core::{
    command_name_for_type, normalize_completion, AutoCompleteFlags, CompletionValue, ConfigError,
    ExtensionError, Frame, RuntimeConfig, Settings, Target, Value, ViewId,
};

#[test]
fn test_handles_as_targets() {
    let view = ViewId::new(12);
    let target: Target = view.into();

    assert_eq!(target, Target::View(ViewId::new(12)));
    assert_ne!(target, Target::Application);
    assert!(!ViewId::default().is_valid());
}

#[test]
fn test_value_serde_round_trip_keeps_shape() {
    let json = r#"{"name":"foo","args":{"count":3,"flag":true},"items":[1,2.5,null]}"#;
    let value: Value = serde_json::from_str(json).unwrap();

    assert_eq!(value.get("name").and_then(Value::as_str), Some("foo"));
    let args = value.get("args").unwrap();
    assert_eq!(args.get("count"), Some(&Value::Integer(3)));
    assert_eq!(args.get("flag"), Some(&Value::Bool(true)));

    let items = value.get("items").and_then(Value::as_array).unwrap();
    assert_eq!(items[1].as_f64(), Some(2.5));
    assert!(items[2].is_null());

    assert_eq!(serde_json::to_string(&value).unwrap(), json);
}

#[test]
fn test_settings_snapshot_to_value() {
    let settings = Settings::new().with("syntax", "Rust").with("is_widget", false);
    let value = settings.to_value();

    assert_eq!(value.get("syntax"), Some(&Value::from("Rust")));
    assert!(!settings.get_bool("is_widget", true));
}

#[test]
fn test_completion_normalization_shapes() {
    let plain = normalize_completion(CompletionValue::from("alpha"));
    assert_eq!(plain.trigger, "alpha");
    assert!(plain.annotation.is_empty());

    let multi_tab = normalize_completion(CompletionValue::from("a\tb\tc"));
    assert_eq!(multi_tab.trigger, "a");
    assert_eq!(multi_tab.annotation, "b\tc");

    let flags = AutoCompleteFlags::INHIBIT_WORD_COMPLETIONS
        | AutoCompleteFlags::INHIBIT_EXPLICIT_COMPLETIONS;
    assert_eq!(flags.bits(), 24);
}

#[test]
fn test_command_names() {
    assert_eq!(command_name_for_type("InsertSnippetCommand"), "insert_snippet");
    assert_eq!(command_name_for_type("Command"), "");
}

#[test]
fn test_extension_error_frames() {
    let err: ExtensionError = "bad input".into();
    let err = err.with_frame(Frame::new("run").at("Pkg.cmd 4:9"));

    assert_eq!(err.message, "bad input");
    assert_eq!(err.frames.len(), 1);
}

#[test]
fn test_config_load_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "profiling = false").unwrap();
    writeln!(file, "packages = [\"/srv/Default.zip\", \"/srv/Extra.zip\"]").unwrap();

    let config = RuntimeConfig::load(file.path()).unwrap();
    assert!(!config.profiling);
    assert_eq!(config.packages.len(), 2);
    assert_eq!(config.compiled_extension, "rhaic");
}

#[test]
fn test_config_load_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let err = RuntimeConfig::load(&dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, ConfigError::Io { .. }));
}

#[test]
fn test_config_rejects_bad_toml() {
    let err = RuntimeConfig::from_toml_str("profiling = [", std::path::Path::new("bad.toml"));
    assert!(matches!(err, Err(ConfigError::Parse { .. })));
}
