use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use plughost_archive::{
    ArchiveError, CompiledUnit, Importer, ModuleCode, ModuleOrigin, SpecLoader, WarningKind,
};
use tempfile::TempDir;
use zip::write::SimpleFileOptions;

fn write_archive(dir: &Path, file_name: &str, entries: &[(&str, &[u8])]) -> PathBuf {
    let path = dir.join(file_name);
    let file = fs::File::create(&path).unwrap();
    let mut zip = zip::ZipWriter::new(file);
    for (name, data) in entries {
        zip.start_file(*name, SimpleFileOptions::default()).unwrap();
        zip.write_all(data).unwrap();
    }
    zip.finish().unwrap();
    path
}

fn write_file(path: &Path, contents: &str) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, contents).unwrap();
}

const CMD_SOURCE: &str = r#"
fn run(args) { }
export_window_command("foo", run);
"#;

fn pkg_archive(dir: &Path) -> PathBuf {
    write_archive(
        dir,
        "Pkg.zip",
        &[
            ("Pkg/__init__.rhai", b""),
            ("Pkg/cmd.rhai", CMD_SOURCE.as_bytes()),
        ],
    )
}

#[test]
fn test_archive_source_without_override() {
    let tmp = TempDir::new().unwrap();
    let archive = pkg_archive(tmp.path());

    let importer = Importer::default();
    importer.set_override_path(None);
    assert!(importer.update_compressed_packages(&[&archive]).is_empty());

    let spec = importer.find_spec("Pkg.cmd").unwrap();
    assert!(!spec.is_package);
    assert_eq!(
        spec.origin,
        ModuleOrigin::Archive {
            archive: archive.clone(),
            entry: "Pkg/cmd.rhai".into()
        }
    );
    assert!(matches!(spec.loader, SpecLoader::Archive(_)));
    assert_eq!(spec.load_code().unwrap(), ModuleCode::Source(CMD_SOURCE.into()));

    let root = importer.find_spec("Pkg").unwrap();
    assert!(root.is_package);
    assert_eq!(root.search_locations, vec![archive]);
}

#[test]
fn test_override_file_wins_over_archive() {
    let tmp = TempDir::new().unwrap();
    let archive = pkg_archive(tmp.path());
    let overrides = tmp.path().join("Packages");
    write_file(&overrides.join("Pkg").join("cmd.rhai"), "// overridden");

    let importer = Importer::default();
    importer.update_compressed_packages(&[&archive]);
    importer.set_override_path(Some(overrides.clone()));

    let (spec, code) = importer.import("Pkg.cmd").unwrap();
    assert_eq!(spec.origin, ModuleOrigin::OverrideFile(overrides.join("Pkg").join("cmd.rhai")));
    assert_eq!(code.text("Pkg.cmd").unwrap(), "// overridden");

    let loader = importer.loader_for_archive(&archive).unwrap();
    assert_eq!(loader.get_source("Pkg.cmd").unwrap().as_deref(), Some("// overridden"));
}

#[test]
fn test_override_initializer_beats_archive_initializer() {
    let tmp = TempDir::new().unwrap();
    let archive = pkg_archive(tmp.path());
    let overrides = tmp.path().join("Packages");
    write_file(&overrides.join("Pkg").join("__init__.rhai"), "let loose = true;");

    let importer = Importer::default();
    importer.update_compressed_packages(&[&archive]);
    importer.set_override_path(Some(overrides.clone()));

    let spec = importer.find_spec("Pkg").unwrap();
    assert!(spec.is_package);
    assert_eq!(
        spec.origin,
        ModuleOrigin::OverrideFile(overrides.join("Pkg").join("__init__.rhai"))
    );

    // Non-initializer entries still come from the archive.
    let cmd = importer.find_spec("Pkg.cmd").unwrap();
    assert!(cmd.origin.is_archive());
}

#[test]
fn test_bare_override_directory_is_package() {
    let tmp = TempDir::new().unwrap();
    let archive = pkg_archive(tmp.path());
    let overrides = tmp.path().join("Packages");
    fs::create_dir_all(overrides.join("Pkg").join("extra")).unwrap();

    let importer = Importer::default();
    importer.update_compressed_packages(&[&archive]);
    importer.set_override_path(Some(overrides.clone()));

    let spec = importer.find_spec("Pkg.extra").unwrap();
    assert!(spec.is_package);
    assert_eq!(spec.origin, ModuleOrigin::OverrideDir(overrides.join("Pkg").join("extra")));
    assert_eq!(spec.load_code().unwrap(), ModuleCode::Source(String::new()));
}

#[test]
fn test_synthetic_parent_packages() {
    let tmp = TempDir::new().unwrap();
    let archive = write_archive(tmp.path(), "Deep.zip", &[("Deep/a/b/c.rhai", b"let c = 3;")]);

    let importer = Importer::default();
    importer.set_override_path(None);
    importer.update_compressed_packages(&[&archive]);

    for name in ["Deep.a", "Deep.a.b"] {
        let spec = importer.find_spec(name).unwrap();
        assert!(spec.is_package, "{name} should be a package");
        assert_eq!(spec.load_code().unwrap(), ModuleCode::Source(String::new()));
    }
    let leaf = importer.find_spec("Deep.a.b.c").unwrap();
    assert!(!leaf.is_package);
}

#[test]
fn test_entries_without_package_prefix() {
    let tmp = TempDir::new().unwrap();
    let archive = write_archive(tmp.path(), "Flat.zip", &[("tools.rhai", b"let t = 1;")]);

    let importer = Importer::default();
    importer.set_override_path(None);
    importer.update_compressed_packages(&[&archive]);

    let (_, code) = importer.import("Flat.tools").unwrap();
    assert_eq!(code.text("Flat.tools").unwrap(), "let t = 1;");
}

#[test]
fn test_resolution_independent_of_registration_order() {
    let tmp = TempDir::new().unwrap();
    let a = write_archive(tmp.path(), "Alpha.zip", &[("Alpha/x.rhai", b"alpha")]);
    let b = write_archive(tmp.path(), "Beta.zip", &[("Beta/x.rhai", b"beta")]);
    let overrides = tmp.path().join("Packages");
    write_file(&overrides.join("Beta").join("x.rhai"), "beta-override");

    let forward = Importer::default();
    forward.set_override_path(Some(overrides.clone()));
    forward.update_compressed_packages(&[&a, &b]);

    let reverse = Importer::default();
    reverse.set_override_path(Some(overrides.clone()));
    reverse.update_compressed_packages(&[&b, &a]);

    for name in ["Alpha.x", "Beta.x", "Alpha", "Beta"] {
        let lhs = forward.find_spec(name).unwrap();
        let rhs = reverse.find_spec(name).unwrap();
        assert_eq!(lhs.origin, rhs.origin, "origin of {name}");
        assert_eq!(lhs.is_package, rhs.is_package, "package flag of {name}");
    }
}

#[test]
fn test_compiled_entries() {
    let tmp = TempDir::new().unwrap();
    let good = CompiledUnit::from_source("let fast = 1;", 1_700_000_000)
        .encode()
        .unwrap();
    let archive = write_archive(
        tmp.path(),
        "Pkg.zip",
        &[
            ("Pkg/cmd.rhai", CMD_SOURCE.as_bytes()),
            ("Pkg/fast.rhaic", good.as_slice()),
            ("Pkg/stale.rhaic", b"XXXX\0\0\0\0\0\0\0\0\0\0\0\0payload"),
        ],
    );

    let importer = Importer::default();
    importer.set_override_path(None);
    importer.update_compressed_packages(&[&archive]);
    let loader = importer.loader_for_archive(&archive).unwrap();

    assert_eq!(loader.get_source("Pkg.fast").unwrap(), None);
    match loader.get_code("Pkg.fast").unwrap() {
        ModuleCode::Compiled(unit) => {
            assert_eq!(unit.mtime, 1_700_000_000);
            assert_eq!(unit.source("Pkg.fast").unwrap(), "let fast = 1;");
        }
        other => panic!("expected compiled code, got {other:?}"),
    }

    let err = loader.get_code("Pkg.stale").unwrap_err();
    assert!(matches!(err, ArchiveError::BadMagic { .. }));

    // The bad entry does not affect its siblings.
    assert!(loader.get_code("Pkg.cmd").is_ok());
}

#[test]
fn test_bad_archive_is_skipped() {
    let tmp = TempDir::new().unwrap();
    let good = pkg_archive(tmp.path());
    let broken = tmp.path().join("Broken.zip");
    fs::write(&broken, b"this is not a zip file").unwrap();
    let missing = tmp.path().join("Missing.zip");

    let importer = Importer::default();
    let failures = importer.update_compressed_packages(&[&broken, &good, &missing]);

    assert_eq!(failures.len(), 2);
    assert!(matches!(failures[0], ArchiveError::BadArchive { .. }));
    assert!(matches!(failures[1], ArchiveError::Io { .. }));
    assert_eq!(importer.loaders().len(), 1);
    assert!(importer.find_spec("Pkg.cmd").is_some());
}

#[test]
fn test_undecodable_source_is_skipped() {
    let tmp = TempDir::new().unwrap();
    let archive = write_archive(
        tmp.path(),
        "Pkg.zip",
        &[("Pkg/bad.rhai", &[0xff, 0xfe, 0xfd]), ("Pkg/good.rhai", b"let ok = 1;")],
    );

    let importer = Importer::default();
    importer.set_override_path(None);
    importer.update_compressed_packages(&[&archive]);
    let loader = importer.loader_for_archive(&archive).unwrap();

    let warnings = loader.package().warnings();
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].kind, WarningKind::Undecodable);
    assert_eq!(warnings[0].entry, "Pkg/bad.rhai");

    assert!(importer.find_spec("Pkg.bad").is_none());
    assert!(importer.find_spec("Pkg.good").is_some());
}

#[test]
fn test_resources() {
    let tmp = TempDir::new().unwrap();
    let archive = write_archive(
        tmp.path(),
        "Pkg.zip",
        &[
            ("Pkg/__init__.rhai", b""),
            ("Pkg/README.md", b"# Pkg"),
            ("Pkg/data/__init__.rhai", b""),
            ("Pkg/data/zeta.json", b"{}"),
            ("Pkg/data/alpha.txt", b"alpha"),
        ],
    );

    let importer = Importer::default();
    importer.set_override_path(None);
    importer.update_compressed_packages(&[&archive]);
    let loader = importer.loader_for_archive(&archive).unwrap();

    let top = loader.resource_reader("Pkg").unwrap();
    assert_eq!(top.contents(), vec!["README.md"]);

    let data = loader.resource_reader("Pkg.data").unwrap();
    assert_eq!(data.contents(), vec!["alpha.txt", "zeta.json"]);
    assert!(data.is_resource("alpha.txt"));
    assert!(!data.is_resource("README.md"));
    assert_eq!(data.open_resource("alpha.txt").unwrap(), b"alpha");
    assert!(matches!(
        data.open_resource("missing.txt"),
        Err(ArchiveError::ResourceNotFound { .. })
    ));
    assert!(data.resource_path("alpha.txt").is_err());
}

#[test]
fn test_plain_module_has_no_resource_reader() {
    let tmp = TempDir::new().unwrap();
    let archive = pkg_archive(tmp.path());

    let importer = Importer::default();
    importer.set_override_path(None);
    importer.update_compressed_packages(&[&archive]);
    let loader = importer.loader_for_archive(&archive).unwrap();

    assert!(loader.resource_reader("Pkg.cmd").is_none());
    assert!(loader.resource_reader("Pkg").is_some());
}

#[test]
fn test_loose_override_without_archive() {
    let tmp = TempDir::new().unwrap();
    let overrides = tmp.path().join("Packages");
    write_file(&overrides.join("User").join("mine.rhai"), "let mine = 1;");

    let importer = Importer::default();
    importer.set_override_path(Some(overrides.clone()));

    let spec = importer.find_spec("User.mine").unwrap();
    assert!(matches!(spec.loader, SpecLoader::Loose));
    assert_eq!(spec.load_code().unwrap(), ModuleCode::Source("let mine = 1;".into()));

    let pkg = importer.find_spec("User").unwrap();
    assert!(pkg.is_package);
    assert_eq!(pkg.search_locations, vec![overrides.join("User")]);
}

#[test]
fn test_loose_lookup_appends_suffix() {
    let tmp = TempDir::new().unwrap();
    let overrides = tmp.path().join("Packages");
    write_file(&overrides.join("User.rhai"), "let top = 1;");
    write_file(&overrides.join("Tools").join("fmt.rhai"), "let fmt = 1;");

    let importer = Importer::default();
    importer.set_override_path(Some(overrides.clone()));

    // A trailing dot must not swap in the suffix on the parent path.
    assert!(importer.find_spec("User.").is_none());

    let spec = importer.find_spec("Tools.fmt").unwrap();
    assert_eq!(
        spec.origin,
        ModuleOrigin::OverrideFile(overrides.join("Tools").join("fmt.rhai"))
    );
}

#[test]
fn test_missing_module() {
    let importer = Importer::default();
    importer.set_override_path(None);

    let err = importer.import("Nowhere.thing").unwrap_err();
    assert!(err.is_not_found());
}

#[test]
fn test_package_set_is_replaced_wholesale() {
    let tmp = TempDir::new().unwrap();
    let first = pkg_archive(tmp.path());
    let second = write_archive(tmp.path(), "Other.zip", &[("Other/x.rhai", b"")]);

    let importer = Importer::default();
    importer.set_override_path(None);
    importer.update_compressed_packages(&[&first]);
    assert!(importer.loader_for_archive(&first).is_some());

    importer.update_compressed_packages(&[&second]);
    assert!(importer.loader_for_archive(&first).is_none());
    assert!(importer.find_spec("Pkg.cmd").is_none());
    assert!(importer.find_spec("Other.x").is_some());
}
