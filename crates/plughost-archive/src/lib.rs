//! Archive package scanning and module resolution.
//!
//! Extension code ships either as loose files under an override root or
//! packed into zip archives. [`Importer`] resolves dotted module names
//! across both, with loose files taking precedence over archive entries.
//!
//! # Example
//!
//! ```ignore
//! use plughost_archive::Importer;
//!
//! let importer = Importer::default();
//! importer.update_compressed_packages(&["/opt/host/Packages/Default.zip"]);
//! importer.set_override_path(Some("/home/me/.config/host/Packages".into()));
//!
//! let (spec, code) = importer.import("Default.indentation")?;
//! ```

mod compiled;
mod error;
mod importer;
mod loader;
mod package;
mod resources;

pub use compiled::{CompiledUnit, HEADER_LEN, MAGIC};
pub use error::{ArchiveError, ArchiveResult, ArchiveWarning, WarningKind};
pub use importer::{Importer, ModuleSpec, SpecLoader};
pub use loader::{ArchiveLoader, ModuleCode, ModuleOrigin, OverrideRoot, SpecInfo};
pub use package::{package_name, ArchiveEntry, ArchivePackage, EntryData, ModuleExtensions, INIT_MODULE};
pub use resources::ResourceReader;
