//! Completion items, flags and normalization.

use std::ops::{BitOr, BitOrAssign};

use serde::{Deserialize, Serialize};

/// Category of a completion item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KindId {
    #[default]
    Ambiguous = 0,
    Keyword = 1,
    Type = 2,
    Function = 3,
    Namespace = 4,
    Navigation = 5,
    Markup = 6,
    Variable = 7,
    Snippet = 8,
}

/// A completion kind: category, single-letter badge and display name.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Kind {
    pub id: KindId,
    pub letter: String,
    pub name: String,
}

impl Kind {
    /// The kind used when nothing more specific is known.
    pub fn ambiguous() -> Self {
        Self::default()
    }

    /// Snippet kind, as used by `CompletionItem::snippet`.
    pub fn snippet() -> Self {
        Self {
            id: KindId::Snippet,
            letter: "s".into(),
            name: "Snippet".into(),
        }
    }

    /// The badge letter as a code point, or 0 when there is none.
    pub fn letter_code(&self) -> u32 {
        self.letter.chars().next().map(u32::from).unwrap_or(0)
    }
}

/// How the `completion` text of an item is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionFormat {
    /// Inserted verbatim.
    #[default]
    Text = 0,
    /// A snippet with `$` fields.
    Snippet = 1,
    /// A command string.
    Command = 2,
}

/// Flags controlling how a completion response behaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AutoCompleteFlags(pub u32);

impl AutoCompleteFlags {
    pub const NONE: Self = Self(0);
    /// Suppress completions based on the contents of the view.
    pub const INHIBIT_WORD_COMPLETIONS: Self = Self(8);
    /// Suppress completions from completion files.
    pub const INHIBIT_EXPLICIT_COMPLETIONS: Self = Self(16);
    /// Re-query as the user types.
    pub const DYNAMIC_COMPLETIONS: Self = Self(32);
    /// Keep the given order.
    pub const INHIBIT_REORDER: Self = Self(128);

    /// Raw bit value.
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Whether all bits of `other` are set.
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for AutoCompleteFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for AutoCompleteFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// Per-item flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CompletionItemFlags(pub u32);

impl CompletionItemFlags {
    pub const NONE: Self = Self(0);
    pub const KEEP_PREFIX: Self = Self(1);
}

/// A fully-specified completion entry.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CompletionItem {
    /// Text matched against the user's input.
    pub trigger: String,
    /// Hint drawn to the right of the trigger.
    pub annotation: String,
    /// Text to insert; the trigger is inserted when empty.
    pub completion: String,
    pub completion_format: CompletionFormat,
    pub kind: Kind,
    /// Optional minihtml description.
    pub details: String,
    pub flags: CompletionItemFlags,
}

impl CompletionItem {
    /// A plain-text completion.
    pub fn new(trigger: impl Into<String>) -> Self {
        Self {
            trigger: trigger.into(),
            ..Default::default()
        }
    }

    /// A snippet completion.
    pub fn snippet(
        trigger: impl Into<String>,
        snippet: impl Into<String>,
        annotation: impl Into<String>,
        kind: Kind,
    ) -> Self {
        Self {
            trigger: trigger.into(),
            annotation: annotation.into(),
            completion: snippet.into(),
            completion_format: CompletionFormat::Snippet,
            kind,
            ..Default::default()
        }
    }

    /// Set the annotation.
    pub fn with_annotation(mut self, annotation: impl Into<String>) -> Self {
        self.annotation = annotation.into();
        self
    }
}

/// The shapes a listener may use for a single completion.
#[derive(Debug, Clone, PartialEq)]
pub enum CompletionValue {
    /// `"trigger\tannotation"`.
    Text(String),
    /// `["trigger\tannotation", "completion"]`.
    Pair(String, String),
    /// `["trigger\tannotation", <ignored>, "completion"]`.
    Triple(String, String, String),
    /// Already a full item.
    Item(CompletionItem),
}

impl From<&str> for CompletionValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for CompletionValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<CompletionItem> for CompletionValue {
    fn from(item: CompletionItem) -> Self {
        Self::Item(item)
    }
}

/// Split a legacy trigger at its first tab into (trigger, annotation).
fn split_trigger(trigger: &str) -> (String, String) {
    match trigger.split_once('\t') {
        Some((t, a)) => (t.to_string(), a.to_string()),
        None => (trigger.to_string(), String::new()),
    }
}

/// Normalize any completion shape into a [`CompletionItem`].
///
/// Legacy pairs and triples become snippet completions with the ambiguous
/// kind.
pub fn normalize_completion(value: CompletionValue) -> CompletionItem {
    match value {
        CompletionValue::Item(item) => item,
        CompletionValue::Text(text) => {
            let (trigger, annotation) = split_trigger(&text);
            CompletionItem::new(trigger).with_annotation(annotation)
        }
        CompletionValue::Pair(trigger, completion) | CompletionValue::Triple(trigger, _, completion) => {
            let (trigger, annotation) = split_trigger(&trigger);
            CompletionItem::snippet(trigger, completion, annotation, Kind::ambiguous())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_trigger_annotation() {
        let item = normalize_completion("fn\tfunction".into());
        assert_eq!(item.trigger, "fn");
        assert_eq!(item.annotation, "function");
        assert_eq!(item.completion_format, CompletionFormat::Text);
    }

    #[test]
    fn test_pair_becomes_snippet() {
        let item = normalize_completion(CompletionValue::Pair("for\tloop".into(), "for $1 {}".into()));
        assert_eq!(item.trigger, "for");
        assert_eq!(item.completion, "for $1 {}");
        assert_eq!(item.completion_format, CompletionFormat::Snippet);
        assert_eq!(item.kind.id, KindId::Ambiguous);
    }

    #[test]
    fn test_triple_uses_last_field() {
        let item = normalize_completion(CompletionValue::Triple("a".into(), "ignored".into(), "b".into()));
        assert_eq!(item.completion, "b");
    }

    #[test]
    fn test_flags_union() {
        let flags = AutoCompleteFlags::INHIBIT_WORD_COMPLETIONS | AutoCompleteFlags::INHIBIT_REORDER;
        assert_eq!(flags.bits(), 136);
        assert!(flags.contains(AutoCompleteFlags::INHIBIT_REORDER));
        assert!(!flags.contains(AutoCompleteFlags::DYNAMIC_COMPLETIONS));
    }
}
