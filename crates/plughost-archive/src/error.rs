//! Error types for archive scanning and module resolution.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type for archive operations.
pub type ArchiveResult<T> = Result<T, ArchiveError>;

/// Errors that can occur while scanning archives or resolving modules.
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// No loader knows about the module.
    #[error("No module named '{name}'")]
    ModuleNotFound { name: String },

    /// The archive could not be opened or read as a zip container.
    #[error("Error loading {path}: {source}")]
    BadArchive {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },

    /// A compiled entry does not start with the expected header.
    #[error("Bad magic number in '{name}': {magic:?}")]
    BadMagic { name: String, magic: [u8; 4] },

    /// A compiled entry is shorter than its header.
    #[error("Compiled unit '{name}' is truncated ({len} bytes)")]
    Truncated { name: String, len: usize },

    /// The size field of a compiled entry disagrees with its payload.
    #[error("Compiled unit '{name}' declares {declared} payload bytes but has {actual}")]
    SizeMismatch { name: String, declared: u32, actual: usize },

    /// A payload does not fit the 32-bit size field.
    #[error("Compiled unit payload of {len} bytes is too large")]
    PayloadTooLarge { len: usize },

    /// A source entry or file is not valid UTF-8.
    #[error("{path} is not utf-8 encoded, unable to load plugin")]
    Undecodable { path: PathBuf },

    /// The resource does not exist in the package.
    #[error("Resource '{resource}' not found in '{package}'")]
    ResourceNotFound { package: String, resource: String },

    /// Generic I/O error.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ArchiveError {
    /// Create an I/O error with path context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a zip error with path context.
    pub fn zip(path: impl Into<PathBuf>, source: zip::result::ZipError) -> Self {
        Self::BadArchive {
            path: path.into(),
            source,
        }
    }

    /// Whether this is a "module not found" outcome rather than a load error.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::ModuleNotFound { .. })
    }
}

/// Kind of scan warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WarningKind {
    /// A source entry is not valid UTF-8.
    Undecodable,
    /// An entry could not be read from the archive.
    ReadError,
}

/// Non-fatal problem with a single archive entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveWarning {
    /// Entry name inside the archive.
    pub entry: String,
    /// Human-readable message.
    pub message: String,
    /// Warning kind.
    pub kind: WarningKind,
}

impl ArchiveWarning {
    /// Create a new warning.
    pub fn new(entry: impl Into<String>, message: impl Into<String>, kind: WarningKind) -> Self {
        Self {
            entry: entry.into(),
            message: message.into(),
            kind,
        }
    }
}
