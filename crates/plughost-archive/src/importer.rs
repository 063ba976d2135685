//! Module resolution across all registered archives.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use plughost_core::RuntimeConfig;

use crate::error::{ArchiveError, ArchiveResult};
use crate::loader::{read_source_file, ArchiveLoader, ModuleCode, ModuleOrigin, OverrideRoot, SpecInfo};
use crate::package::{ModuleExtensions, INIT_MODULE};

/// Which side serves a resolved module.
#[derive(Debug, Clone)]
pub enum SpecLoader {
    /// One of the registered archives.
    Archive(Arc<ArchiveLoader>),
    /// The override root, with no archive involved.
    Loose,
}

/// Everything needed to load a module.
#[derive(Debug, Clone)]
pub struct ModuleSpec {
    /// Fully qualified dotted name.
    pub name: String,
    pub origin: ModuleOrigin,
    pub is_package: bool,
    /// For packages, where submodules are looked up.
    pub search_locations: Vec<PathBuf>,
    pub loader: SpecLoader,
}

impl ModuleSpec {
    /// Top-level package name.
    pub fn package(&self) -> &str {
        self.name.split('.').next().unwrap_or(&self.name)
    }

    /// Load the module's code.
    pub fn load_code(&self) -> ArchiveResult<ModuleCode> {
        match &self.loader {
            SpecLoader::Archive(loader) => loader.load(&self.name, &self.origin),
            SpecLoader::Loose => match &self.origin {
                ModuleOrigin::OverrideFile(path) | ModuleOrigin::OverrideDir(path) => {
                    read_source_file(&self.name, path)
                }
                ModuleOrigin::Archive { .. } => Err(ArchiveError::ModuleNotFound {
                    name: self.name.clone(),
                }),
            },
        }
    }
}

/// Resolves dotted module names against archives and the override root.
#[derive(Debug)]
pub struct Importer {
    loaders: RwLock<Vec<Arc<ArchiveLoader>>>,
    overrides: OverrideRoot,
    extensions: ModuleExtensions,
}

impl Importer {
    /// Create an importer with no archives.
    pub fn new(extensions: ModuleExtensions) -> Self {
        Self {
            loaders: RwLock::new(Vec::new()),
            overrides: OverrideRoot::default(),
            extensions,
        }
    }

    /// Create an importer and register the configured archives.
    pub fn from_config(config: &RuntimeConfig) -> Self {
        let importer = Self::new(ModuleExtensions::from_config(config));
        importer.set_override_path(config.override_path.clone());
        importer.update_compressed_packages(&config.packages);
        importer
    }

    /// Replace the set of archives wholesale.
    ///
    /// Archives that cannot be opened are skipped and logged; the returned
    /// errors describe them.
    pub fn update_compressed_packages<P: AsRef<Path>>(&self, paths: &[P]) -> Vec<ArchiveError> {
        let mut loaders = Vec::with_capacity(paths.len());
        let mut failures = Vec::new();

        for path in paths {
            let path = path.as_ref();
            match ArchiveLoader::open(path, self.overrides.clone(), self.extensions.clone()) {
                Ok(loader) => loaders.push(Arc::new(loader)),
                Err(e) => {
                    tracing::error!(target: "plughost::archive", "error loading {}: {}", path.display(), e);
                    failures.push(e);
                }
            }
        }

        tracing::info!(target: "plughost::archive", "Registered {} archive packages", loaders.len());
        *self.loaders.write() = loaders;
        failures
    }

    /// Set the root whose loose files override archive contents.
    pub fn set_override_path(&self, path: Option<PathBuf>) {
        self.overrides.set(path);
    }

    /// Current override root.
    pub fn override_path(&self) -> Option<PathBuf> {
        self.overrides.get()
    }

    /// Registered loaders in registration order.
    pub fn loaders(&self) -> Vec<Arc<ArchiveLoader>> {
        self.loaders.read().clone()
    }

    /// The loader for an archive path, if it is still registered.
    pub fn loader_for_archive(&self, path: &Path) -> Option<Arc<ArchiveLoader>> {
        self.loaders
            .read()
            .iter()
            .find(|l| l.archive_path() == path)
            .cloned()
    }

    /// Resolve a module. Archives are consulted in registration order; a
    /// name no archive claims falls back to the override root alone.
    pub fn find_spec(&self, fullname: &str) -> Option<ModuleSpec> {
        let claimed = self.loaders.read().iter().find(|l| l.has(fullname)).cloned();

        if let Some(loader) = claimed {
            let info = loader.spec_info(fullname)?;
            let search_locations = if info.is_package {
                vec![loader.archive_path().to_path_buf()]
            } else {
                Vec::new()
            };
            return Some(ModuleSpec {
                name: fullname.to_string(),
                origin: info.origin,
                is_package: info.is_package,
                search_locations,
                loader: SpecLoader::Archive(loader),
            });
        }

        let info = self.loose_spec_info(fullname)?;
        let search_locations = match &info.origin {
            ModuleOrigin::OverrideDir(dir) => vec![dir.clone()],
            ModuleOrigin::OverrideFile(file) if info.is_package => {
                file.parent().map(Path::to_path_buf).into_iter().collect()
            }
            _ => Vec::new(),
        };
        Some(ModuleSpec {
            name: fullname.to_string(),
            origin: info.origin,
            is_package: info.is_package,
            search_locations,
            loader: SpecLoader::Loose,
        })
    }

    fn loose_spec_info(&self, fullname: &str) -> Option<SpecInfo> {
        let root = self.overrides.get()?;
        let base = fullname.split('.').fold(root, |path, part| path.join(part));
        let file = self.extensions.source_path(&base);
        if file.is_file() {
            return Some(SpecInfo {
                origin: ModuleOrigin::OverrideFile(file),
                is_package: false,
            });
        }
        let init = self.extensions.source_path(&base.join(INIT_MODULE));
        if init.is_file() {
            return Some(SpecInfo {
                origin: ModuleOrigin::OverrideFile(init),
                is_package: true,
            });
        }
        if base.is_dir() {
            return Some(SpecInfo {
                origin: ModuleOrigin::OverrideDir(base),
                is_package: true,
            });
        }
        None
    }

    /// Resolve and load a module in one step.
    pub fn import(&self, fullname: &str) -> ArchiveResult<(ModuleSpec, ModuleCode)> {
        let spec = self.find_spec(fullname).ok_or_else(|| ArchiveError::ModuleNotFound {
            name: fullname.to_string(),
        })?;
        let code = spec.load_code()?;
        Ok((spec, code))
    }
}

impl Default for Importer {
    fn default() -> Self {
        Self::new(ModuleExtensions::default())
    }
}
