//! Error type for faults raised inside extension code.

use std::fmt;

use thiserror::Error;

/// Result type returned by extension callbacks.
pub type ExtResult<T> = Result<T, ExtensionError>;

/// One frame of a call stack, either inside extension code or on the
/// dispatcher's side of the boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Function or method name.
    pub function: String,
    /// Source location (module path, `line:col`), if known.
    pub location: Option<String>,
}

impl Frame {
    /// Create a frame without a location.
    pub fn new(function: impl Into<String>) -> Self {
        Self {
            function: function.into(),
            location: None,
        }
    }

    /// Attach a source location.
    pub fn at(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.location {
            Some(location) => write!(f, "  at {} ({location})", self.function),
            None => write!(f, "  at {}", self.function),
        }
    }
}

/// A fault raised by extension code.
///
/// `frames` is ordered outermost first and only covers the extension side
/// of the call; the fault wrapper prepends the dispatcher's own frames when
/// it reports the error.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ExtensionError {
    pub message: String,
    pub frames: Vec<Frame>,
}

impl ExtensionError {
    /// Create an error with no frame information.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            frames: Vec::new(),
        }
    }

    /// Append an inner frame.
    pub fn with_frame(mut self, frame: Frame) -> Self {
        self.frames.push(frame);
        self
    }

    /// Wrap any error as an extension fault.
    pub fn from_error(err: &dyn std::error::Error) -> Self {
        Self::new(err.to_string())
    }
}

impl From<String> for ExtensionError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl From<&str> for ExtensionError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frames_are_kept_in_order() {
        let err = ExtensionError::new("boom")
            .with_frame(Frame::new("outer").at("pkg.mod 3:1"))
            .with_frame(Frame::new("inner"));

        assert_eq!(err.to_string(), "boom");
        assert_eq!(err.frames[0].to_string(), "  at outer (pkg.mod 3:1)");
        assert_eq!(err.frames[1].to_string(), "  at inner");
    }
}
