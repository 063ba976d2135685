//! Opaque handles for host-owned objects.
//!
//! The real state behind a handle lives in the host application. The
//! runtime only ever passes these identifiers back across the bridge.

use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! handle {
    ($(#[$meta:meta])* $name:ident, $label:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl $name {
            /// The handle value the host uses for "no object".
            pub const NONE: Self = Self(0);

            /// Create a new handle.
            pub const fn new(id: u64) -> Self {
                Self(id)
            }

            /// Get the raw ID.
            pub const fn id(self) -> u64 {
                self.0
            }

            /// Whether this handle refers to an object at all.
            pub const fn is_valid(self) -> bool {
                self.0 != 0
            }
        }

        impl From<u64> for $name {
            fn from(id: u64) -> Self {
                Self(id)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($label, "#{}"), self.0)
            }
        }
    };
}

handle!(
    /// A text view (one editing surface onto a buffer).
    ViewId,
    "view"
);
handle!(
    /// A top-level host window.
    WindowId,
    "window"
);
handle!(
    /// A text buffer, possibly shared by several views.
    BufferId,
    "buffer"
);
handle!(
    /// A sheet (tab) inside a window.
    SheetId,
    "sheet"
);

/// Any handle an event can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum Target {
    /// No particular target (application-wide events).
    Application,
    View(ViewId),
    Window(WindowId),
    Buffer(BufferId),
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Application => write!(f, "application"),
            Self::View(id) => id.fmt(f),
            Self::Window(id) => id.fmt(f),
            Self::Buffer(id) => id.fmt(f),
        }
    }
}

impl From<ViewId> for Target {
    fn from(id: ViewId) -> Self {
        Self::View(id)
    }
}

impl From<WindowId> for Target {
    fn from(id: WindowId) -> Self {
        Self::Window(id)
    }
}

impl From<BufferId> for Target {
    fn from(id: BufferId) -> Self {
        Self::Buffer(id)
    }
}
