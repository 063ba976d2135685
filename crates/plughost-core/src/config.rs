//! Runtime configuration types.

use std::path::{Path, PathBuf};

use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while loading a configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("I/O error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid TOML for this schema.
    #[error("Invalid configuration in {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// The values are inconsistent.
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },
}

/// Resource limits applied to the script engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScriptLimits {
    /// Maximum operations per call (0 = unlimited).
    pub max_operations: u64,
    /// Maximum function call depth.
    pub max_call_levels: usize,
    /// Maximum expression nesting depth.
    pub max_expr_depth: usize,
    /// Maximum string length in bytes.
    pub max_string_size: usize,
    /// Maximum array length.
    pub max_array_size: usize,
    /// Maximum object map size.
    pub max_map_size: usize,
}

impl Default for ScriptLimits {
    fn default() -> Self {
        Self {
            max_operations: 1_000_000,
            max_call_levels: 64,
            max_expr_depth: 64,
            max_string_size: 1024 * 1024,
            max_array_size: 10_000,
            max_map_size: 10_000,
        }
    }
}

/// Configuration for a runtime instance.
#[derive(Debug, Clone, Builder, Serialize, Deserialize)]
#[builder(setter(into), build_fn(validate = "Self::validate"))]
pub struct RuntimeConfig {
    /// Directory whose loose files override archive contents.
    #[builder(default = "default_override_path()")]
    #[serde(default = "default_override_path")]
    pub override_path: Option<PathBuf>,

    /// Archive packages to register at startup.
    #[builder(default)]
    #[serde(default)]
    pub packages: Vec<PathBuf>,

    /// File extension of source modules (without the dot).
    #[builder(default = "default_source_extension()")]
    #[serde(default = "default_source_extension")]
    pub source_extension: String,

    /// File extension of compiled modules (without the dot).
    #[builder(default = "default_compiled_extension()")]
    #[serde(default = "default_compiled_extension")]
    pub compiled_extension: String,

    /// Record timing for blocking callbacks.
    #[builder(default = "true")]
    #[serde(default = "default_true")]
    pub profiling: bool,

    /// Modules that are never loaded.
    #[builder(default)]
    #[serde(default)]
    pub disabled_plugins: Vec<String>,

    /// Script engine limits.
    #[builder(default)]
    #[serde(default)]
    pub script_limits: ScriptLimits,
}

fn default_override_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("plughost").join("Packages"))
}

fn default_source_extension() -> String {
    "rhai".to_string()
}

fn default_compiled_extension() -> String {
    "rhaic".to_string()
}

fn default_true() -> bool {
    true
}

impl RuntimeConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        let source = self.source_extension.as_deref().unwrap_or("rhai");
        let compiled = self.compiled_extension.as_deref().unwrap_or("rhaic");
        validate_extensions(source, compiled)
    }
}

fn validate_extensions(source: &str, compiled: &str) -> Result<(), String> {
    if source.is_empty() || compiled.is_empty() {
        return Err("Module extensions cannot be empty".to_string());
    }
    if source == compiled {
        return Err("Source and compiled extensions must differ".to_string());
    }
    if source.starts_with('.') || compiled.starts_with('.') {
        return Err("Module extensions are given without a leading dot".to_string());
    }
    Ok(())
}

impl RuntimeConfig {
    /// Create a new config builder.
    pub fn builder() -> RuntimeConfigBuilder {
        RuntimeConfigBuilder::default()
    }

    /// Parse a config from TOML text. `origin` is only used in errors.
    pub fn from_toml_str(text: &str, origin: &Path) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: origin.to_path_buf(),
            source,
        })?;
        validate_extensions(&config.source_extension, &config.compiled_extension)
            .map_err(|message| ConfigError::Invalid { message })?;
        Ok(config)
    }

    /// Load a config from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text, path)
    }

    /// Set the override root.
    pub fn with_override_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.override_path = Some(path.into());
        self
    }

    /// Check if a plugin module is disabled.
    pub fn is_disabled(&self, module: &str) -> bool {
        self.disabled_plugins.iter().any(|name| name == module)
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            override_path: default_override_path(),
            packages: Vec::new(),
            source_extension: default_source_extension(),
            compiled_extension: default_compiled_extension(),
            profiling: true,
            disabled_plugins: Vec::new(),
            script_limits: ScriptLimits::default(),
        }
    }
}
