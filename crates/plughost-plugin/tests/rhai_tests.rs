use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use plughost_core::{RuntimeConfig, Settings, Value};
use plughost_plugin::{CommandKind, HeadlessHost, PluginError, PluginHost};
use tempfile::TempDir;
use zip::write::SimpleFileOptions;

fn write_archive(dir: &Path, file_name: &str, entries: &[(&str, &str)]) -> PathBuf {
    let path = dir.join(file_name);
    let file = fs::File::create(&path).unwrap();
    let mut zip = zip::ZipWriter::new(file);
    for (name, data) in entries {
        zip.start_file(*name, SimpleFileOptions::default()).unwrap();
        zip.write_all(data.as_bytes()).unwrap();
    }
    zip.finish().unwrap();
    path
}

fn write_file(path: &Path, contents: &str) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, contents).unwrap();
}

/// A runtime with the given archives and override root.
fn runtime(packages: Vec<PathBuf>, overrides: Option<PathBuf>) -> (Arc<HeadlessHost>, Arc<PluginHost>) {
    let config = RuntimeConfig::builder()
        .packages(packages)
        .override_path(overrides)
        .build()
        .unwrap();
    let host = Arc::new(HeadlessHost::new());
    let runtime = PluginHost::new(host.clone(), config).unwrap();
    (host, runtime)
}

/// A runtime that resolves modules from loose files only.
fn loose(tmp: &TempDir, modules: &[(&str, &str)]) -> (Arc<HeadlessHost>, Arc<PluginHost>) {
    let root = tmp.path().join("Packages");
    for (path, source) in modules {
        write_file(&root.join(path), source);
    }
    runtime(Vec::new(), Some(root))
}

const FOO_SOURCE: &str = r#"
fn run(args) { }
export_window_command("foo", run);
"#;

const BAR_SOURCE: &str = r#"
fn run(args) { }
export_window_command("bar", run);
"#;

#[test]
fn test_archive_window_command() {
    let tmp = TempDir::new().unwrap();
    let archive = write_archive(
        tmp.path(),
        "Pkg.zip",
        &[("Pkg/__init__.rhai", ""), ("Pkg/cmd.rhai", FOO_SOURCE)],
    );
    let (_host, runtime) = runtime(vec![archive], None);

    runtime.load_plugin("Pkg.cmd").unwrap();
    let snapshot = runtime.snapshot();
    assert_eq!(snapshot.command_names(CommandKind::Window), vec!["foo"]);
    assert_eq!(runtime.find_command(CommandKind::Window, "foo").as_deref(), Some("Pkg.cmd"));
    assert!(runtime.run_window_command(plughost_core::WindowId::new(1), "foo", &Value::Null).unwrap());
}

#[test]
fn test_override_file_replaces_archive_module() {
    let tmp = TempDir::new().unwrap();
    let archive = write_archive(
        tmp.path(),
        "Pkg.zip",
        &[("Pkg/__init__.rhai", ""), ("Pkg/cmd.rhai", FOO_SOURCE)],
    );
    let overrides = tmp.path().join("Packages");
    write_file(&overrides.join("Pkg").join("cmd.rhai"), BAR_SOURCE);
    let (_host, runtime) = runtime(vec![archive], Some(overrides));

    runtime.load_plugin("Pkg.cmd").unwrap();
    assert_eq!(runtime.snapshot().command_names(CommandKind::Window), vec!["bar"]);

    // Dropping the archive leaves the loose file to resolve from.
    assert!(runtime.update_compressed_packages(&[]).is_empty());
    runtime.reload_plugin("Pkg.cmd").unwrap();
    assert_eq!(runtime.loaded_modules(), vec!["Pkg.cmd"]);
    assert_eq!(runtime.snapshot().command_names(CommandKind::Window), vec!["bar"]);
}

#[test]
fn test_reload_after_archive_removed_unloads() {
    let tmp = TempDir::new().unwrap();
    let archive = write_archive(
        tmp.path(),
        "Pkg.zip",
        &[("Pkg/__init__.rhai", ""), ("Pkg/cmd.rhai", FOO_SOURCE)],
    );
    let (_host, runtime) = runtime(vec![archive], None);
    runtime.load_plugin("Pkg.cmd").unwrap();

    assert!(runtime.update_compressed_packages(&[]).is_empty());
    assert!(matches!(
        runtime.reload_plugin("Pkg.cmd"),
        Err(PluginError::ModuleNotFound { name }) if name == "Pkg.cmd"
    ));
    assert!(runtime.loaded_modules().is_empty());
    assert!(runtime.find_command(CommandKind::Window, "foo").is_none());
}

#[test]
fn test_missing_module() {
    let tmp = TempDir::new().unwrap();
    let (_host, runtime) = loose(&tmp, &[]);
    assert!(matches!(
        runtime.load_plugin("Pkg.nothing"),
        Err(PluginError::ModuleNotFound { name }) if name == "Pkg.nothing"
    ));
}

#[test]
fn test_compile_error_is_reported() {
    let tmp = TempDir::new().unwrap();
    let (_host, runtime) = loose(&tmp, &[("Pkg/bad.rhai", "fn broken( {")]);

    match runtime.load_plugin("Pkg.bad") {
        Err(PluginError::Compile { module, .. }) => assert_eq!(module, "Pkg.bad"),
        other => panic!("expected a compile error, got {other:?}"),
    }
    assert!(runtime.loaded_modules().is_empty());
}

#[test]
fn test_unknown_handler_fails_compile() {
    let tmp = TempDir::new().unwrap();
    let source = r#"
        export_event_listener("Typo", #{ on_modifed: |event| {} });
    "#;
    let (_host, runtime) = loose(&tmp, &[("Pkg/typo.rhai", source)]);

    assert!(matches!(
        runtime.load_plugin("Pkg.typo"),
        Err(PluginError::Compile { .. })
    ));
}

#[test]
fn test_text_command_edits_buffer() {
    let tmp = TempDir::new().unwrap();
    let source = r#"
        fn greet(edit, args) {
            insert(edit, 0, "hello " + args.name);
        }
        export_text_command("GreetCommand", greet);
    "#;
    let (host, runtime) = loose(&tmp, &[("Pkg/greet.rhai", source)]);
    let window = host.add_window();
    let view = host.add_view(window);

    runtime.load_plugin("Pkg.greet").unwrap();
    let args: Value = serde_json::json!({ "name": "bob" }).into();
    assert!(runtime.run_text_command(view, "greet", &args).unwrap());
    assert_eq!(host.text(view), "hello bob");
}

#[test]
fn test_listener_keeps_instance_state() {
    let tmp = TempDir::new().unwrap();
    let source = r#"
        export_event_listener("Counter", #{
            constructor: || { this.saves = 0; },
            on_post_save: |event| {
                this.saves += 1;
                print(`saves: ${this.saves}`);
            },
        });
    "#;
    let (host, runtime) = loose(&tmp, &[("Pkg/counter.rhai", source)]);
    let window = host.add_window();
    let view = host.add_view(window);

    runtime.load_plugin("Pkg.counter").unwrap();
    runtime.on_post_save(view);
    runtime.on_post_save(view);

    assert_eq!(host.log_lines(), vec!["saves: 1", "saves: 2"]);
}

#[test]
fn test_script_error_prints_traceback() {
    let tmp = TempDir::new().unwrap();
    let source = r#"
        fn check(event) {
            throw "bad state";
        }
        export_event_listener("Checker", #{ on_modified: check });
    "#;
    let (host, runtime) = loose(&tmp, &[("Pkg/check.rhai", source)]);
    let window = host.add_window();
    let view = host.add_view(window);

    runtime.load_plugin("Pkg.check").unwrap();
    runtime.on_modified(view);

    let console = host.log_lines().join("\n");
    assert!(console.contains("Traceback (most recent call last):"));
    assert!(console.contains("Pkg.check.Checker.on_modified"));
    assert!(console.contains("Error: bad state"));
}

#[test]
fn test_view_listener_respects_is_applicable() {
    let tmp = TempDir::new().unwrap();
    let source = r#"
        export_view_listener("RustView", #{
            is_applicable: |settings| settings.syntax == "Rust",
            on_modified: |event| { print("rust " + event.view); },
        });
    "#;
    let (host, runtime) = loose(&tmp, &[("Pkg/rust.rhai", source)]);
    let window = host.add_window();
    let plain = host.add_view(window);
    let rust = host.add_view(window);
    host.set_settings(rust, Settings::new().with("syntax", "Rust"));

    runtime.load_plugin("Pkg.rust").unwrap();
    runtime.on_api_ready();
    host.run_main();

    runtime.on_modified(plain);
    runtime.on_modified(rust);
    assert_eq!(host.log_lines(), vec![format!("rust {}", rust.id())]);
}

#[test]
fn test_script_completions() {
    let tmp = TempDir::new().unwrap();
    let source = r#"
        export_event_listener("Words", #{
            on_query_completions: |event| [event.prefix + "lpha", ["for\tloop", "for $1"]],
        });
    "#;
    let (host, runtime) = loose(&tmp, &[("Pkg/words.rhai", source)]);
    let window = host.add_window();
    let view = host.add_view(window);

    runtime.load_plugin("Pkg.words").unwrap();
    let mut request = runtime.on_query_completions(view, 3, "a", vec![1]);
    let response = request.try_response().unwrap();

    let triggers: Vec<&str> = response.items.iter().map(|i| i.trigger.as_str()).collect();
    assert_eq!(triggers, vec!["alpha", "for"]);
    assert_eq!(response.items[1].annotation, "loop");
    assert_eq!(response.items[1].completion, "for $1");
}

#[test]
fn test_allow_exports_limits_public_classes() {
    let tmp = TempDir::new().unwrap();
    let source = r#"
        fn run(args) { }
        export_application_command("ShowCommand", run);
        export_application_command("_HiddenCommand", run);
        export_application_command("ExtraCommand", run);
        allow_exports(["ExtraCommand", "_HiddenCommand"]);
    "#;
    let (_host, runtime) = loose(&tmp, &[("Pkg/cmds.rhai", source)]);

    runtime.load_plugin("Pkg.cmds").unwrap();
    assert_eq!(
        runtime.snapshot().command_names(CommandKind::Application),
        vec!["extra", "__hidden"]
    );
    assert!(matches!(
        runtime.run_application_command("show", &Value::Null),
        Err(PluginError::CommandNotFound { .. })
    ));
}

#[test]
fn test_module_hooks_run_after_api_ready() {
    let tmp = TempDir::new().unwrap();
    let source = r#"
        fn plugin_loaded() { print("loaded"); }
        fn plugin_unloaded() { print("unloaded"); }
    "#;
    let (host, runtime) = loose(&tmp, &[("Pkg/hooks.rhai", source)]);

    runtime.load_plugin("Pkg.hooks").unwrap();
    assert!(host.log_lines().is_empty());

    runtime.on_api_ready();
    assert_eq!(host.log_lines(), vec!["loaded"]);

    runtime.unload_module("Pkg.hooks").unwrap();
    assert_eq!(host.log_lines(), vec!["loaded", "unloaded"]);
}

#[test]
fn test_disabled_plugin_is_skipped() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().join("Packages");
    write_file(&root.join("Pkg").join("cmd.rhai"), FOO_SOURCE);
    let config = RuntimeConfig::builder()
        .override_path(Some(root))
        .disabled_plugins(vec!["Pkg.cmd".to_string()])
        .build()
        .unwrap();
    let runtime = PluginHost::new(Arc::new(HeadlessHost::new()), config).unwrap();

    runtime.load_plugin("Pkg.cmd").unwrap();
    assert!(runtime.loaded_modules().is_empty());
}
