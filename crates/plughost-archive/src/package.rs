//! Scanning of a single archive package.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use plughost_core::RuntimeConfig;

use crate::error::{ArchiveError, ArchiveResult, ArchiveWarning, WarningKind};

/// Base name marking a package initializer.
pub const INIT_MODULE: &str = "__init__";

/// File extensions recognized as module code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleExtensions {
    /// Script source, without the dot.
    pub source: String,
    /// Compiled unit, without the dot.
    pub compiled: String,
}

impl ModuleExtensions {
    /// Take the extensions from a runtime config.
    pub fn from_config(config: &RuntimeConfig) -> Self {
        Self {
            source: config.source_extension.clone(),
            compiled: config.compiled_extension.clone(),
        }
    }

    /// The source file for a module path, `base` plus the source suffix.
    /// Appended rather than swapped in, so dots already in `base` survive.
    pub fn source_path(&self, base: &Path) -> PathBuf {
        let mut os = base.as_os_str().to_owned();
        os.push(".");
        os.push(&self.source);
        PathBuf::from(os)
    }

    fn classify(&self, ext: Option<&str>) -> Option<CodeKind> {
        match ext {
            Some(ext) if ext == self.source => Some(CodeKind::Source),
            Some(ext) if ext == self.compiled => Some(CodeKind::Compiled),
            _ => None,
        }
    }
}

impl Default for ModuleExtensions {
    fn default() -> Self {
        Self::from_config(&RuntimeConfig::default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CodeKind {
    Source,
    Compiled,
}

/// Contents of a code entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryData {
    /// Decoded script text.
    Source(String),
    /// Raw compiled unit, header not yet validated.
    Compiled(Vec<u8>),
    /// Placeholder for a directory implied by a nested entry.
    Synthetic,
}

/// A module-bearing entry of an archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    /// Entry name as stored in the archive. Synthetic parents use their
    /// dotted key instead.
    pub filename: String,
    pub data: EntryData,
}

impl ArchiveEntry {
    fn synthetic(filename: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            data: EntryData::Synthetic,
        }
    }

    /// Whether the entry's file is a package initializer.
    pub fn is_initializer(&self) -> bool {
        let base = self.filename.rsplit('/').next().unwrap_or(&self.filename);
        let (stem, _) = split_extension(base);
        stem == INIT_MODULE
    }
}

/// Immutable view over one archive file, built by [`ArchivePackage::scan`].
///
/// Keys are dotted module paths relative to the package: `""` is the
/// package itself, `"sub.mod"` is `sub/mod.<ext>`.
#[derive(Debug, Clone)]
pub struct ArchivePackage {
    path: PathBuf,
    name: String,
    entries: HashMap<String, ArchiveEntry>,
    packages: HashSet<String>,
    resources: HashMap<String, BTreeMap<String, String>>,
    warnings: Vec<ArchiveWarning>,
}

impl ArchivePackage {
    /// Scan an archive. Fails only if the container itself is unreadable;
    /// problems with single entries become warnings.
    pub fn scan(path: impl Into<PathBuf>, extensions: &ModuleExtensions) -> ArchiveResult<Self> {
        let path = path.into();
        let name = package_name(&path);

        let file = File::open(&path).map_err(|e| ArchiveError::io(&path, e))?;
        let mut archive = zip::ZipArchive::new(file).map_err(|e| ArchiveError::zip(&path, e))?;

        let mut package = Self {
            path,
            name,
            entries: HashMap::new(),
            packages: HashSet::new(),
            resources: HashMap::new(),
            warnings: Vec::new(),
        };
        package.entries.insert(String::new(), ArchiveEntry::synthetic(""));
        package.packages.insert(String::new());

        // Sorted so the result does not depend on the archive's entry order.
        let mut names: Vec<String> = archive
            .file_names()
            .filter(|n| !n.ends_with('/'))
            .map(str::to_owned)
            .collect();
        names.sort();

        let prefix = format!("{}/", package.name);
        for raw in names {
            let rel = raw.strip_prefix(&prefix).unwrap_or(&raw).to_string();
            let (base, ext) = split_extension(&rel);

            let Some(kind) = extensions.classify(ext) else {
                package.add_resource(&rel, &raw);
                continue;
            };

            let bytes = match read_entry(&mut archive, &raw) {
                Ok(bytes) => bytes,
                Err(e) => {
                    tracing::warn!(target: "plughost::archive", "Error reading {}/{}: {}", package.path.display(), raw, e);
                    package.warnings.push(ArchiveWarning::new(&raw, e.to_string(), WarningKind::ReadError));
                    continue;
                }
            };

            let mut parts: Vec<&str> = base.split('/').collect();
            let is_init = parts.last() == Some(&INIT_MODULE);
            if is_init {
                parts.pop();
            }
            let key = parts.join(".");

            let data = match kind {
                CodeKind::Compiled => EntryData::Compiled(bytes),
                CodeKind::Source => match String::from_utf8(bytes) {
                    Ok(text) => EntryData::Source(text),
                    Err(_) => {
                        let err = ArchiveError::Undecodable {
                            path: package.path.join(&raw),
                        };
                        tracing::warn!(target: "plughost::archive", "{}", err);
                        package.warnings.push(ArchiveWarning::new(&raw, err.to_string(), WarningKind::Undecodable));
                        continue;
                    }
                },
            };

            if is_init {
                package.packages.insert(key.clone());
            }
            package.entries.insert(
                key,
                ArchiveEntry {
                    filename: raw.clone(),
                    data,
                },
            );

            while parts.len() > 1 {
                parts.pop();
                let parent = parts.join(".");
                if !package.entries.contains_key(&parent) {
                    package.entries.insert(parent.clone(), ArchiveEntry::synthetic(parent.clone()));
                    package.packages.insert(parent);
                }
            }
        }

        tracing::debug!(
            target: "plughost::archive",
            "Scanned {} ({} modules, {} resource dirs)",
            package.path.display(),
            package.entries.len(),
            package.resources.len()
        );

        Ok(package)
    }

    fn add_resource(&mut self, rel: &str, raw: &str) {
        let (dir, file) = match rel.rsplit_once('/') {
            Some((dir, file)) => (dir, file),
            None => ("", rel),
        };
        let dotted = dir.replace(['/', '\\'], ".");
        let module = format!("{}.{}", self.name, dotted).trim_end_matches('.').to_string();
        self.resources
            .entry(module)
            .or_default()
            .insert(file.to_string(), raw.to_string());
    }

    /// Filesystem path of the archive.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Logical package name (the archive's file stem).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Look up a module entry by key.
    pub fn entry(&self, key: &str) -> Option<&ArchiveEntry> {
        self.entries.get(key)
    }

    /// Whether the key names a package.
    pub fn is_package_key(&self, key: &str) -> bool {
        self.packages.contains(key)
    }

    /// All module keys, sorted.
    pub fn module_keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }

    /// Resource files for a dotted module name, keyed by file name.
    pub fn resources_for(&self, module: &str) -> Option<&BTreeMap<String, String>> {
        self.resources.get(module)
    }

    /// Non-fatal problems found while scanning.
    pub fn warnings(&self) -> &[ArchiveWarning] {
        &self.warnings
    }

    /// Read a raw entry from the archive on disk.
    pub fn read_raw(&self, entry: &str) -> ArchiveResult<Vec<u8>> {
        let file = File::open(&self.path).map_err(|e| ArchiveError::io(&self.path, e))?;
        let mut archive = zip::ZipArchive::new(file).map_err(|e| ArchiveError::zip(&self.path, e))?;
        read_entry(&mut archive, entry).map_err(|e| ArchiveError::zip(&self.path, e))
    }
}

fn read_entry(archive: &mut zip::ZipArchive<File>, name: &str) -> Result<Vec<u8>, zip::result::ZipError> {
    let mut entry = archive.by_name(name)?;
    let mut bytes = Vec::with_capacity(entry.size() as usize);
    entry.read_to_end(&mut bytes)?;
    Ok(bytes)
}

/// The logical package name of an archive path.
pub fn package_name(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Split `dir/file.ext` into `("dir/file", Some("ext"))`. Leading dots of
/// the file name do not start an extension.
pub(crate) fn split_extension(path: &str) -> (&str, Option<&str>) {
    let file_start = path.rfind('/').map_or(0, |i| i + 1);
    match path[file_start..].rfind('.') {
        Some(0) | None => (path, None),
        Some(dot) => {
            let dot = file_start + dot;
            (&path[..dot], Some(&path[dot + 1..]))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_extension() {
        assert_eq!(split_extension("a/b/c.rhai"), ("a/b/c", Some("rhai")));
        assert_eq!(split_extension("a.b/c"), ("a.b/c", None));
        assert_eq!(split_extension("dir/.hidden"), ("dir/.hidden", None));
        assert_eq!(split_extension("x.tar.gz"), ("x.tar", Some("gz")));
    }

    #[test]
    fn test_package_name() {
        assert_eq!(package_name(Path::new("/opt/Default.sublime-package")), "Default");
        assert_eq!(package_name(Path::new("Pkg.zip")), "Pkg");
    }

    #[test]
    fn test_initializer_detection() {
        let entry = ArchiveEntry {
            filename: "Pkg/sub/__init__.rhai".into(),
            data: EntryData::Source(String::new()),
        };
        assert!(entry.is_initializer());
        assert!(!ArchiveEntry::synthetic("sub").is_initializer());
    }
}
