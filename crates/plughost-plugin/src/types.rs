//! Core types for the extension runtime.

use std::fmt;

use plughost_archive::ArchiveError;
use plughost_core::{ConfigError, ExtensionError, ViewId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type for runtime operations.
pub type PluginResult<T> = Result<T, PluginError>;

/// Errors that can occur in the extension runtime.
#[derive(Debug, Error)]
pub enum PluginError {
    /// No loader or override can resolve the module.
    #[error("No module named '{name}'")]
    ModuleNotFound { name: String },

    /// Resolving or reading the module failed.
    #[error(transparent)]
    Archive(#[from] ArchiveError),

    /// The module's code could not be compiled or evaluated.
    #[error("Failed to compile module '{module}': {message}")]
    Compile { module: String, message: String },

    /// A module failed while filling its exports table.
    #[error("Failed to register module '{module}': {source}")]
    Registration {
        module: String,
        #[source]
        source: ExtensionError,
    },

    /// A class constructor failed.
    #[error("unable to instantiate '{class}'")]
    Instantiation {
        class: String,
        #[source]
        source: ExtensionError,
    },

    /// An edit token was used outside its text command.
    #[error("Edit objects may not be used after the TextCommand's run method has returned")]
    InvalidEdit,

    /// Detaching a text-change listener that is not attached.
    #[error("{class} is not attached")]
    NotAttached { class: String },

    /// Attaching a text-change listener twice.
    #[error("{class} is already attached")]
    AlreadyAttached { class: String },

    /// A completion list was completed more than once.
    #[error("Completions have already been set")]
    CompletionsAlreadySet,

    /// An edit token was used on a view it does not belong to.
    #[error("Edit for {expected} used on {found}")]
    WrongScope { expected: ViewId, found: ViewId },

    /// No command with that name is registered for the scope.
    #[error("No {kind} named '{name}'")]
    CommandNotFound { kind: CommandKind, name: String },

    /// Invalid runtime configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// The three command capabilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    /// Runs without a window or view.
    Application,
    /// Runs against one window.
    Window,
    /// Runs against one view, inside an edit scope.
    Text,
}

impl CommandKind {
    /// All kinds, in registry order.
    pub const ALL: [CommandKind; 3] = [Self::Application, Self::Window, Self::Text];

    pub(crate) fn index(self) -> usize {
        match self {
            Self::Application => 0,
            Self::Window => 1,
            Self::Text => 2,
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Application => write!(f, "application command"),
            Self::Window => write!(f, "window command"),
            Self::Text => write!(f, "text command"),
        }
    }
}

/// The six capabilities a class can provide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    ApplicationCommand,
    WindowCommand,
    TextCommand,
    EventListener,
    ViewEventListener,
    TextChangeListener,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ApplicationCommand => write!(f, "ApplicationCommand"),
            Self::WindowCommand => write!(f, "WindowCommand"),
            Self::TextCommand => write!(f, "TextCommand"),
            Self::EventListener => write!(f, "EventListener"),
            Self::ViewEventListener => write!(f, "ViewEventListener"),
            Self::TextChangeListener => write!(f, "TextChangeListener"),
        }
    }
}

impl From<CommandKind> for Capability {
    fn from(kind: CommandKind) -> Self {
        match kind {
            CommandKind::Application => Self::ApplicationCommand,
            CommandKind::Window => Self::WindowCommand,
            CommandKind::Text => Self::TextCommand,
        }
    }
}

/// Timing summary for one (event, module) pair.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ProfileEntry {
    pub count: u64,
    /// Seconds.
    pub max: f64,
    /// Seconds.
    pub sum: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = PluginError::Instantiation {
            class: "Pkg.mod.Listener".into(),
            source: ExtensionError::new("boom"),
        };
        assert_eq!(err.to_string(), "unable to instantiate 'Pkg.mod.Listener'");

        let err = PluginError::CommandNotFound {
            kind: CommandKind::Window,
            name: "foo".into(),
        };
        assert_eq!(err.to_string(), "No window command named 'foo'");
    }

    #[test]
    fn test_command_kind_capability() {
        assert_eq!(Capability::from(CommandKind::Text), Capability::TextCommand);
        assert_eq!(CommandKind::ALL.map(CommandKind::index), [0, 1, 2]);
    }
}
