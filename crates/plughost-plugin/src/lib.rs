//! Extension runtime for plughost.
//!
//! The runtime sits between a host application and extension modules:
//!
//! - [`PluginHost`] loads modules through the archive importer, registers
//!   the classes they export and routes host events to them
//! - [`Host`] is the bridge the runtime calls back into; [`HeadlessHost`]
//!   is an in-memory implementation for tests and tooling
//! - extension code implements the capability traits in [`capability`],
//!   either natively or through the bundled Rhai interpreter
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use plughost_core::RuntimeConfig;
//! use plughost_plugin::{HeadlessHost, PluginHost};
//!
//! let host = Arc::new(HeadlessHost::new());
//! let runtime = PluginHost::new(host.clone(), RuntimeConfig::default())?;
//! runtime.load_plugin("Default.indentation")?;
//! runtime.on_api_ready();
//! host.run_main();
//! ```

mod activation;
mod affinity;
pub mod api;
pub mod capability;
mod completions;
mod console;
mod dispatch;
mod edit;
pub mod fault;
pub mod hooks;
pub mod host;
pub mod module;
mod registry;
pub mod rhai;
mod runtime;
pub mod types;

pub use api::Api;
pub use capability::{
    Command, CommandClass, EventListener, EventListenerClass, Export, Exports, TextChangeListener,
    TextChangeListenerClass, ViewEventListener, ViewListenerClass,
};
pub use completions::{CompletionList, CompletionRequest, CompletionResponse};
pub use console::Console;
pub use edit::Edit;
pub use fault::{CallSite, Guard, traceback};
pub use hooks::{CommandRewrite, Event, EventArgs, EventKind, EventScope, EventSet, Reply};
pub use host::{BufferInfo, HeadlessHost, Host, Task};
pub use module::{ExtensionModule, ModuleCompiler};
pub use registry::RegistrySnapshot;
pub use crate::rhai::RhaiInterpreter;
pub use runtime::PluginHost;
pub use types::{Capability, CommandKind, PluginError, PluginResult, ProfileEntry};
