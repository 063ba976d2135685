//! Per-archive module loader with loose-file override support.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::compiled::CompiledUnit;
use crate::error::{ArchiveError, ArchiveResult};
use crate::package::{ArchivePackage, EntryData, ModuleExtensions, INIT_MODULE};
use crate::resources::ResourceReader;

/// Shared, mutable override root.
///
/// Every loader reads the current value at lookup time, so changing it
/// takes effect without rescanning archives.
#[derive(Debug, Clone, Default)]
pub struct OverrideRoot(Arc<RwLock<Option<PathBuf>>>);

impl OverrideRoot {
    /// Create a root pointing at `path`.
    pub fn new(path: Option<PathBuf>) -> Self {
        Self(Arc::new(RwLock::new(path)))
    }

    /// Replace the root.
    pub fn set(&self, path: Option<PathBuf>) {
        *self.0.write() = path;
    }

    /// Current root, if any.
    pub fn get(&self) -> Option<PathBuf> {
        self.0.read().clone()
    }
}

/// Where a resolved module comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleOrigin {
    /// A loose source file under the override root.
    OverrideFile(PathBuf),
    /// A bare directory under the override root; an implicit package.
    OverrideDir(PathBuf),
    /// An entry inside an archive.
    Archive { archive: PathBuf, entry: String },
}

impl ModuleOrigin {
    /// Display path: the file, the directory, or `archive/entry`.
    pub fn path(&self) -> PathBuf {
        match self {
            Self::OverrideFile(path) | Self::OverrideDir(path) => path.clone(),
            Self::Archive { archive, entry } if entry.is_empty() => archive.clone(),
            Self::Archive { archive, entry } => archive.join(entry),
        }
    }

    /// Whether the module is served from an archive.
    pub fn is_archive(&self) -> bool {
        matches!(self, Self::Archive { .. })
    }
}

impl fmt::Display for ModuleOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path().display())
    }
}

/// Origin and package status of a resolvable module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecInfo {
    pub origin: ModuleOrigin,
    pub is_package: bool,
}

/// Loaded module code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleCode {
    Source(String),
    Compiled(CompiledUnit),
}

impl ModuleCode {
    /// Script text, whichever form the code was stored in.
    pub fn text(&self, name: &str) -> ArchiveResult<&str> {
        match self {
            Self::Source(text) => Ok(text.as_str()),
            Self::Compiled(unit) => unit.source(name),
        }
    }
}

/// Resolves module names for one archive package.
#[derive(Debug)]
pub struct ArchiveLoader {
    package: Arc<ArchivePackage>,
    overrides: OverrideRoot,
    extensions: ModuleExtensions,
}

impl ArchiveLoader {
    /// Create a loader over a scanned package.
    pub fn new(package: ArchivePackage, overrides: OverrideRoot, extensions: ModuleExtensions) -> Self {
        Self {
            package: Arc::new(package),
            overrides,
            extensions,
        }
    }

    /// Scan `path` and create a loader for it.
    pub fn open(path: impl Into<PathBuf>, overrides: OverrideRoot, extensions: ModuleExtensions) -> ArchiveResult<Self> {
        let package = ArchivePackage::scan(path, &extensions)?;
        Ok(Self::new(package, overrides, extensions))
    }

    /// The scanned package.
    pub fn package(&self) -> &ArchivePackage {
        &self.package
    }

    /// Logical package name.
    pub fn name(&self) -> &str {
        self.package.name()
    }

    /// Path of the archive file.
    pub fn archive_path(&self) -> &Path {
        self.package.path()
    }

    /// Split a module name into the key inside this package, or `None` if
    /// the name belongs to another package.
    fn key_for<'a>(&self, fullname: &'a str) -> Option<&'a str> {
        match fullname.split_once('.') {
            None if fullname == self.name() => Some(""),
            Some((head, key)) if head == self.name() => Some(key),
            _ => None,
        }
    }

    fn override_base(&self, fullname: &str) -> Option<PathBuf> {
        let root = self.overrides.get()?;
        Some(fullname.split('.').fold(root, |path, part| path.join(part)))
    }

    fn source_file(&self, base: &Path) -> PathBuf {
        self.extensions.source_path(base)
    }

    /// Whether this loader handles the module.
    pub fn has(&self, fullname: &str) -> bool {
        let Some(key) = self.key_for(fullname) else {
            return false;
        };
        if self.package.entry(key).is_some() {
            return true;
        }
        match self.override_base(fullname) {
            Some(base) => self.source_file(&base).is_file() || base.is_dir(),
            None => false,
        }
    }

    /// Resolve the origin and package status of a module.
    ///
    /// Precedence: override file, archive entry (non-initializer), override
    /// initializer, archive initializer, bare override directory.
    pub fn spec_info(&self, fullname: &str) -> Option<SpecInfo> {
        let key = self.key_for(fullname)?;
        let base = self.override_base(fullname);

        if let Some(base) = base.as_ref().filter(|_| !key.is_empty()) {
            let file = self.source_file(base);
            if file.is_file() {
                return Some(SpecInfo {
                    origin: ModuleOrigin::OverrideFile(file),
                    is_package: false,
                });
            }
        }

        let entry = self.package.entry(key);
        let archive_info = |filename: &str| SpecInfo {
            origin: ModuleOrigin::Archive {
                archive: self.archive_path().to_path_buf(),
                entry: filename.to_string(),
            },
            is_package: self.package.is_package_key(key),
        };

        // Initializers are held back so an override initializer can win.
        if let Some(entry) = entry.filter(|e| !e.is_initializer()) {
            return Some(archive_info(&entry.filename));
        }

        if let Some(base) = &base {
            let init = self.source_file(&base.join(INIT_MODULE));
            if init.is_file() {
                return Some(SpecInfo {
                    origin: ModuleOrigin::OverrideFile(init),
                    is_package: true,
                });
            }
        }

        if let Some(entry) = entry {
            return Some(archive_info(&entry.filename));
        }

        if let Some(base) = base.filter(|b| b.is_dir()) {
            return Some(SpecInfo {
                origin: ModuleOrigin::OverrideDir(base),
                is_package: true,
            });
        }

        None
    }

    fn require(&self, fullname: &str) -> ArchiveResult<SpecInfo> {
        self.spec_info(fullname).ok_or_else(|| ArchiveError::ModuleNotFound {
            name: fullname.to_string(),
        })
    }

    /// Path of the module's origin.
    pub fn filename(&self, fullname: &str) -> ArchiveResult<PathBuf> {
        Ok(self.require(fullname)?.origin.path())
    }

    /// Whether the module is a package.
    pub fn is_package(&self, fullname: &str) -> ArchiveResult<bool> {
        Ok(self.require(fullname)?.is_package)
    }

    /// Source text, or `None` if the module only exists in compiled form.
    pub fn get_source(&self, fullname: &str) -> ArchiveResult<Option<String>> {
        let info = self.require(fullname)?;
        match self.load(fullname, &info.origin)? {
            ModuleCode::Source(text) => Ok(Some(text)),
            ModuleCode::Compiled(_) => Ok(None),
        }
    }

    /// Load the module's code, validating compiled headers.
    pub fn get_code(&self, fullname: &str) -> ArchiveResult<ModuleCode> {
        let info = self.require(fullname)?;
        self.load(fullname, &info.origin)
    }

    pub(crate) fn load(&self, fullname: &str, origin: &ModuleOrigin) -> ArchiveResult<ModuleCode> {
        match origin {
            ModuleOrigin::OverrideDir(_) => Ok(ModuleCode::Source(String::new())),
            ModuleOrigin::OverrideFile(path) => read_source_file(fullname, path),
            ModuleOrigin::Archive { .. } => {
                let key = self.key_for(fullname).unwrap_or_default();
                let entry = self.package.entry(key).ok_or_else(|| ArchiveError::ModuleNotFound {
                    name: fullname.to_string(),
                })?;
                match &entry.data {
                    EntryData::Source(text) => Ok(ModuleCode::Source(text.clone())),
                    EntryData::Synthetic => Ok(ModuleCode::Source(String::new())),
                    EntryData::Compiled(bytes) => Ok(ModuleCode::Compiled(CompiledUnit::decode(fullname, bytes)?)),
                }
            }
        }
    }

    /// Resource reader for a package, or `None` for plain modules.
    pub fn resource_reader(&self, fullname: &str) -> Option<ResourceReader> {
        match self.is_package(fullname) {
            Ok(true) => Some(ResourceReader::new(Arc::clone(&self.package), fullname)),
            _ => None,
        }
    }
}

/// Read a loose source file.
pub(crate) fn read_source_file(fullname: &str, path: &Path) -> ArchiveResult<ModuleCode> {
    if path.is_dir() {
        return Ok(ModuleCode::Source(String::new()));
    }
    let bytes = std::fs::read(path).map_err(|e| {
        tracing::error!(target: "plughost::archive", "Error reading {}: {} (module '{}')", path.display(), e, fullname);
        ArchiveError::io(path, e)
    })?;
    String::from_utf8(bytes)
        .map(ModuleCode::Source)
        .map_err(|_| ArchiveError::Undecodable { path: path.to_path_buf() })
}
