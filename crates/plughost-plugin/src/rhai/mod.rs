//! Rhai script modules.
//!
//! A script declares its classes with registration calls evaluated when the
//! module is compiled:
//!
//! ```rhai
//! fn duplicate(edit, args) {
//!     let view = edit.view;
//!     insert(edit, 0, substr(view, 0, 5));
//! }
//!
//! export_text_command("duplicate", "duplicate");
//! export_event_listener("Saver", #{
//!     constructor: || { this.saved = 0; },
//!     on_post_save: |event| { this.saved += 1; },
//! });
//! ```
//!
//! Commands take `(args)`, text commands `(edit, args)`. Listener handlers
//! take one event map and run with the instance's `this` map bound.

mod convert;
mod module;
mod runtime;

pub use runtime::RhaiInterpreter;
