//! Text positions, changes and the query vocabulary used by listeners.

use serde::{Deserialize, Serialize};

/// A character offset into a buffer.
pub type Point = i64;

/// A span of text between two points. `a` may be greater than `b`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Region {
    pub a: Point,
    pub b: Point,
}

impl Region {
    /// Create a region.
    pub const fn new(a: Point, b: Point) -> Self {
        Self { a, b }
    }

    /// Smallest point in the region.
    pub fn begin(&self) -> Point {
        self.a.min(self.b)
    }

    /// Largest point in the region.
    pub fn end(&self) -> Point {
        self.a.max(self.b)
    }

    /// Number of characters spanned.
    pub fn len(&self) -> usize {
        (self.end() - self.begin()) as usize
    }

    /// Whether the region spans no characters.
    pub fn is_empty(&self) -> bool {
        self.a == self.b
    }
}

/// A point as it was at a specific change count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct HistoricPosition {
    pub pt: Point,
    pub row: i64,
    pub col: i64,
    pub col_utf16: i64,
    pub col_utf8: i64,
}

/// One change made to a buffer's text.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TextChange {
    /// Start of the modified region.
    pub a: HistoricPosition,
    /// End of the modified region.
    pub b: HistoricPosition,
    /// Length of the old contents in UTF-16 code units.
    pub len_utf16: i64,
    /// Length of the old contents in UTF-8 code units.
    pub len_utf8: i64,
    /// The new contents of the region.
    pub text: String,
}

/// Where in a text sheet the mouse is hovering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HoverZone {
    Text = 1,
    Gutter = 2,
    Margin = 3,
}

impl HoverZone {
    /// Decode the host's integer representation.
    pub fn from_i64(value: i64) -> Option<Self> {
        match value {
            1 => Some(Self::Text),
            2 => Some(Self::Gutter),
            3 => Some(Self::Margin),
            _ => None,
        }
    }
}

/// Operators used by context queries in key bindings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryOperator {
    Equal = 0,
    NotEqual = 1,
    RegexMatch = 2,
    NotRegexMatch = 3,
    RegexContains = 4,
    NotRegexContains = 5,
}

impl QueryOperator {
    /// Decode the host's integer representation.
    pub fn from_i64(value: i64) -> Option<Self> {
        match value {
            0 => Some(Self::Equal),
            1 => Some(Self::NotEqual),
            2 => Some(Self::RegexMatch),
            3 => Some(Self::NotRegexMatch),
            4 => Some(Self::RegexContains),
            5 => Some(Self::NotRegexContains),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_region_bounds() {
        let r = Region::new(10, 4);
        assert_eq!(r.begin(), 4);
        assert_eq!(r.end(), 10);
        assert_eq!(r.len(), 6);
        assert!(Region::new(3, 3).is_empty());
    }

    #[test]
    fn test_enum_decoding() {
        assert_eq!(HoverZone::from_i64(2), Some(HoverZone::Gutter));
        assert_eq!(HoverZone::from_i64(0), None);
        assert_eq!(QueryOperator::from_i64(4), Some(QueryOperator::RegexContains));
    }
}
