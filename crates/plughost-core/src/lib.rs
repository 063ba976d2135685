//! Core types shared by the plughost extension runtime.
//!
//! Everything here is host-agnostic: opaque handles for host-owned objects,
//! the dynamic [`Value`] exchanged across the bridge, settings snapshots,
//! completion items, and the error type extension callbacks return.

mod completion;
mod config;
mod error;
mod handle;
mod naming;
mod settings;
mod text;
mod value;

pub use completion::{
    normalize_completion, AutoCompleteFlags, CompletionFormat, CompletionItem,
    CompletionItemFlags, CompletionValue, Kind, KindId,
};
pub use config::{ConfigError, RuntimeConfig, RuntimeConfigBuilder, ScriptLimits};
pub use error::{ExtResult, ExtensionError, Frame};
pub use handle::{BufferId, SheetId, Target, ViewId, WindowId};
pub use naming::command_name_for_type;
pub use settings::Settings;
pub use text::{HistoricPosition, HoverZone, Point, QueryOperator, Region, TextChange};
pub use value::Value;
