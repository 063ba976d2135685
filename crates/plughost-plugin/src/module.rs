//! Extension modules and the compilers that produce them.

use std::sync::Arc;

use plughost_archive::{ModuleCode, ModuleSpec};
use plughost_core::ExtResult;

use crate::api::Api;
use crate::capability::Exports;
use crate::types::PluginResult;

/// A loaded unit of extension code.
pub trait ExtensionModule: Send + Sync {
    /// Fully qualified dotted name.
    fn name(&self) -> &str;

    /// Declare the module's classes.
    fn register(&self, exports: &mut Exports) -> ExtResult<()>;

    /// Called once the host API is ready, either right after load or from
    /// `on_api_ready` if the module was loaded earlier.
    fn plugin_loaded(&self, _api: &Api) -> ExtResult<()> {
        Ok(())
    }

    /// Called before the module's registrations are removed.
    fn plugin_unloaded(&self, _api: &Api) -> ExtResult<()> {
        Ok(())
    }
}

/// Turns resolved module code into an [`ExtensionModule`].
pub trait ModuleCompiler: Send + Sync {
    /// Interpreter name, for logs.
    fn name(&self) -> &'static str;

    fn compile(&self, spec: &ModuleSpec, code: &ModuleCode) -> PluginResult<Arc<dyn ExtensionModule>>;
}
