//! Event catalog and payloads delivered to listeners.
//!
//! Every kind exists as a blocking half (run on the host's main thread) and,
//! for most kinds, an `_async` half run from the host's worker context. The
//! name of a kind is the listener method name without its `on_` prefix.

use std::fmt;
use std::str::FromStr;

use plughost_core::{
    AutoCompleteFlags, BufferId, CompletionValue, HoverZone, Point, QueryOperator, Target, TextChange, Value, ViewId,
    WindowId,
};
use strum::{AsRefStr, Display, EnumCount, EnumIter, EnumString, IntoEnumIterator, IntoStaticStr};

use crate::completions::CompletionList;

/// Event kinds the host can deliver.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, EnumString, IntoStaticStr, AsRefStr, EnumIter,
    EnumCount,
)]
#[strum(serialize_all = "snake_case")]
#[repr(u8)]
pub enum EventKind {
    Init,
    New,
    NewAsync,
    Clone,
    CloneAsync,
    Load,
    LoadAsync,
    Revert,
    RevertAsync,
    Reload,
    ReloadAsync,
    PreClose,
    Close,
    PreSave,
    PreSaveAsync,
    PostSave,
    PostSaveAsync,
    PreMove,
    PostMove,
    PostMoveAsync,
    Modified,
    ModifiedAsync,
    SelectionModified,
    SelectionModifiedAsync,
    Activated,
    ActivatedAsync,
    Deactivated,
    DeactivatedAsync,
    QueryContext,
    QueryCompletions,
    Hover,
    TextCommand,
    WindowCommand,
    PostTextCommand,
    PostWindowCommand,
    NewBuffer,
    NewBufferAsync,
    AssociateBuffer,
    AssociateBufferAsync,
    CloseBuffer,
    CloseBufferAsync,
    NewProject,
    NewProjectAsync,
    LoadProject,
    LoadProjectAsync,
    PreSaveProject,
    PostSaveProject,
    PostSaveProjectAsync,
    PreCloseProject,
    NewWindow,
    NewWindowAsync,
    PreCloseWindow,
    Exit,
    TextChanged,
    TextChangedAsync,
}

/// What kind of handle an event targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventScope {
    Application,
    View,
    Window,
    Buffer,
}

impl EventKind {
    /// The kind's name, e.g. `"modified_async"`.
    pub fn name(self) -> &'static str {
        self.into()
    }

    /// The listener method name, e.g. `"on_modified_async"`.
    pub fn method_name(self) -> String {
        format!("on_{}", self.name())
    }

    /// Parse either form, `"modified"` or `"on_modified"`.
    pub fn from_method_name(name: &str) -> Option<Self> {
        let bare = name.strip_prefix("on_").unwrap_or(name);
        Self::from_str(bare).ok()
    }

    /// Whether this is the non-blocking half of its pair.
    pub fn is_async(self) -> bool {
        self.name().ends_with("_async")
    }

    /// The handle kind this event targets.
    pub fn scope(self) -> EventScope {
        use EventKind::*;
        match self {
            Init | Exit => EventScope::Application,
            WindowCommand | PostWindowCommand | NewProject | NewProjectAsync | LoadProject | LoadProjectAsync
            | PreSaveProject | PostSaveProject | PostSaveProjectAsync | PreCloseProject | NewWindow
            | NewWindowAsync | PreCloseWindow => EventScope::Window,
            NewBuffer | NewBufferAsync | AssociateBuffer | AssociateBufferAsync | CloseBuffer | CloseBufferAsync
            | TextChanged | TextChangedAsync => EventScope::Buffer,
            _ => EventScope::View,
        }
    }

    /// Whether global listeners may implement this kind.
    pub fn for_event_listener(self) -> bool {
        !matches!(self, Self::TextChanged | Self::TextChangedAsync)
    }

    /// Whether per-view listeners may implement this kind.
    pub fn for_view_listener(self) -> bool {
        match self {
            Self::Init => true,
            Self::New | Self::NewAsync | Self::Clone | Self::CloneAsync => false,
            kind => kind.scope() == EventScope::View,
        }
    }

    /// Whether per-buffer text-change listeners may implement this kind.
    pub fn for_text_change_listener(self) -> bool {
        matches!(
            self,
            Self::TextChanged
                | Self::TextChangedAsync
                | Self::Revert
                | Self::RevertAsync
                | Self::Reload
                | Self::ReloadAsync
        )
    }

    /// View events whose blocking half re-evaluates the view's listeners
    /// before anything runs.
    pub fn attaches_view(self) -> bool {
        matches!(self, Self::New | Self::Clone | Self::Load | Self::Revert | Self::Reload)
    }

    /// Kinds where per-view listeners are consulted before global ones.
    /// Only the text command pre-run hook; its post-run hook runs globals
    /// first like every other view event.
    pub fn is_view_first(self) -> bool {
        matches!(self, Self::TextCommand)
    }

    fn bit(self) -> u64 {
        1u64 << (self as u8)
    }
}

/// A set of event kinds, the capability query of a listener class.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct EventSet(u64);

impl EventSet {
    /// The empty set.
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Every kind in the catalog.
    pub fn all() -> Self {
        EventKind::iter().collect()
    }

    pub fn insert(&mut self, kind: EventKind) {
        self.0 |= kind.bit();
    }

    pub fn remove(&mut self, kind: EventKind) {
        self.0 &= !kind.bit();
    }

    pub fn contains(&self, kind: EventKind) -> bool {
        self.0 & kind.bit() != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn len(&self) -> usize {
        self.0.count_ones() as usize
    }

    /// Keep only the kinds matching `pred`.
    pub fn filter(self, pred: impl Fn(EventKind) -> bool) -> Self {
        self.iter().filter(|k| pred(*k)).collect()
    }

    /// Iterate in catalog order.
    pub fn iter(&self) -> impl Iterator<Item = EventKind> + '_ {
        EventKind::iter().filter(|k| self.contains(*k))
    }
}

impl FromIterator<EventKind> for EventSet {
    fn from_iter<I: IntoIterator<Item = EventKind>>(iter: I) -> Self {
        let mut set = Self::empty();
        for kind in iter {
            set.insert(kind);
        }
        set
    }
}

impl<const N: usize> From<[EventKind; N]> for EventSet {
    fn from(kinds: [EventKind; N]) -> Self {
        kinds.into_iter().collect()
    }
}

impl fmt::Debug for EventSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

/// Event-specific arguments.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum EventArgs {
    #[default]
    None,
    /// Views passed to a global `init`.
    Views(Vec<ViewId>),
    Hover {
        point: Point,
        zone: HoverZone,
    },
    Context {
        key: String,
        operator: QueryOperator,
        operand: Value,
        match_all: bool,
    },
    Completions {
        prefix: String,
        locations: Vec<Point>,
    },
    Command {
        name: String,
        args: Value,
    },
    Changes(Vec<TextChange>),
}

/// One delivery to a listener.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub kind: EventKind,
    pub target: Target,
    pub args: EventArgs,
}

impl Event {
    pub fn new(kind: EventKind, target: impl Into<Target>) -> Self {
        Self {
            kind,
            target: target.into(),
            args: EventArgs::None,
        }
    }

    /// An application-wide event.
    pub fn application(kind: EventKind) -> Self {
        Self::new(kind, Target::Application)
    }

    pub fn with_args(mut self, args: EventArgs) -> Self {
        self.args = args;
        self
    }

    /// The targeted view, if any.
    pub fn view(&self) -> Option<ViewId> {
        match self.target {
            Target::View(id) => Some(id),
            _ => None,
        }
    }

    /// The targeted window, if any.
    pub fn window(&self) -> Option<WindowId> {
        match self.target {
            Target::Window(id) => Some(id),
            _ => None,
        }
    }

    /// The targeted buffer, if any.
    pub fn buffer(&self) -> Option<BufferId> {
        match self.target {
            Target::Buffer(id) => Some(id),
            _ => None,
        }
    }
}

/// What a listener returns.
#[derive(Debug, Clone, Default)]
pub enum Reply {
    /// Nothing to report.
    #[default]
    None,
    /// A plain value; only its truthiness matters to the dispatcher.
    Value(Value),
    /// A flat completion list.
    Completions(Vec<CompletionValue>),
    /// Completions plus flags.
    CompletionsWithFlags(Vec<CompletionValue>, AutoCompleteFlags),
    /// A completion list that may be filled later.
    CompletionList(CompletionList),
    /// Run a different command instead.
    Command { name: String, args: Option<Value> },
}

impl Reply {
    /// Whether the reply counts as a non-empty response.
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::None => false,
            Self::Value(value) => value.is_truthy(),
            Self::Completions(items) => !items.is_empty(),
            Self::CompletionsWithFlags(..) | Self::CompletionList(_) | Self::Command { .. } => true,
        }
    }
}

impl From<bool> for Reply {
    fn from(b: bool) -> Self {
        Self::Value(Value::Bool(b))
    }
}

impl From<Value> for Reply {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

/// Result of a command interception: the command to run instead.
///
/// An empty name means "no change".
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CommandRewrite {
    pub name: String,
    pub args: Option<Value>,
}

impl CommandRewrite {
    pub fn new(name: impl Into<String>, args: Option<Value>) -> Self {
        Self {
            name: name.into(),
            args,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_size_and_names() {
        assert_eq!(EventKind::COUNT, 55);
        assert_eq!(EventKind::SelectionModifiedAsync.name(), "selection_modified_async");
        assert_eq!(EventKind::PostTextCommand.method_name(), "on_post_text_command");
        assert_eq!(EventKind::from_method_name("on_query_context"), Some(EventKind::QueryContext));
        assert_eq!(EventKind::from_method_name("close_buffer"), Some(EventKind::CloseBuffer));
        assert_eq!(EventKind::from_method_name("on_nothing"), None);
    }

    #[test]
    fn test_async_detection() {
        assert!(EventKind::ModifiedAsync.is_async());
        assert!(!EventKind::Modified.is_async());
        assert!(!EventKind::Exit.is_async());
    }

    #[test]
    fn test_view_listener_exclusions() {
        for kind in [
            EventKind::New,
            EventKind::CloneAsync,
            EventKind::Exit,
            EventKind::NewBuffer,
            EventKind::WindowCommand,
            EventKind::NewProject,
            EventKind::PreCloseWindow,
            EventKind::TextChanged,
        ] {
            assert!(!kind.for_view_listener(), "{kind}");
        }
        assert!(EventKind::Init.for_view_listener());
        assert!(EventKind::QueryCompletions.for_view_listener());
        assert!(EventKind::TextCommand.for_view_listener());
    }

    #[test]
    fn test_text_change_kinds() {
        let kinds: Vec<_> = EventKind::iter().filter(|k| k.for_text_change_listener()).collect();
        assert_eq!(kinds.len(), 6);
        assert!(!EventKind::TextChanged.for_event_listener());
    }

    #[test]
    fn test_event_set() {
        let mut set = EventSet::from([EventKind::Load, EventKind::Modified]);
        assert!(set.contains(EventKind::Load));
        assert!(!set.contains(EventKind::LoadAsync));
        set.insert(EventKind::TextChangedAsync);
        assert_eq!(set.len(), 3);
        set.remove(EventKind::Load);
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![EventKind::Modified, EventKind::TextChangedAsync]);
        assert_eq!(EventSet::all().len(), EventKind::COUNT);
    }

    #[test]
    fn test_reply_truthiness() {
        assert!(!Reply::None.is_truthy());
        assert!(!Reply::from(false).is_truthy());
        assert!(Reply::from(true).is_truthy());
        assert!(!Reply::Completions(vec![]).is_truthy());
        assert!(Reply::Command { name: "x".into(), args: None }.is_truthy());
    }
}
