//! Call-site capture attached to every host error.

use std::fmt;
use std::panic::Location;

use serde::Serialize;

/// Source position of the code that raised an error.
///
/// Built from [`Location::caller`], so functions constructing errors should be
/// `#[track_caller]` when the interesting position is their caller's.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ErrorLocation {
    pub file: &'static str,
    pub line: u32,
    pub column: u32,
}

impl ErrorLocation {
    pub const fn from(location: &'static Location<'static>) -> Self {
        Self {
            file: location.file(),
            line: location.line(),
            column: location.column(),
        }
    }

    /// Location of whoever called this (through any `#[track_caller]` frames).
    #[track_caller]
    pub fn here() -> Self {
        Self::from(Location::caller())
    }
}

impl fmt::Display for ErrorLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}:{}:{}]", self.file, self.line, self.column)
    }
}
