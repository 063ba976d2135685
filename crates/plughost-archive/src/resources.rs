//! Resource access for archive packages.

use std::path::PathBuf;
use std::sync::Arc;

use crate::error::{ArchiveError, ArchiveResult};
use crate::package::ArchivePackage;

/// Lists and opens the non-code files of one package directory.
#[derive(Debug, Clone)]
pub struct ResourceReader {
    package: Arc<ArchivePackage>,
    fullname: String,
}

impl ResourceReader {
    pub(crate) fn new(package: Arc<ArchivePackage>, fullname: impl Into<String>) -> Self {
        Self {
            package,
            fullname: fullname.into(),
        }
    }

    /// Dotted name of the package this reader serves.
    pub fn module(&self) -> &str {
        &self.fullname
    }

    /// Resource file names, sorted.
    pub fn contents(&self) -> Vec<String> {
        self.package
            .resources_for(&self.fullname)
            .map(|files| files.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Whether `name` is a resource of this package.
    pub fn is_resource(&self, name: &str) -> bool {
        self.package
            .resources_for(&self.fullname)
            .is_some_and(|files| files.contains_key(name))
    }

    /// Read a resource. The archive is reopened on every call.
    pub fn open_resource(&self, name: &str) -> ArchiveResult<Vec<u8>> {
        let entry = self
            .package
            .resources_for(&self.fullname)
            .and_then(|files| files.get(name))
            .ok_or_else(|| self.not_found(name))?;
        self.package.read_raw(entry)
    }

    /// Resources never live on the plain filesystem.
    pub fn resource_path(&self, name: &str) -> ArchiveResult<PathBuf> {
        Err(self.not_found(name))
    }

    fn not_found(&self, name: &str) -> ArchiveError {
        ArchiveError::ResourceNotFound {
            package: self.fullname.clone(),
            resource: name.to_string(),
        }
    }
}
