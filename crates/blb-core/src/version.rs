#![forbid(unsafe_code)]

//! Version identifiers for manual saves and their autosave branches.
//!
//! A [`Version`] is a `(manual, auto)` pair. `auto == 0` marks a manual save
//! on the main chain; any other value is an autosave hanging off manual
//! save `manual`.
//!
//! # Ordering
//!
//! `Ord` treats "greater" as "newer":
//!
//! ```text
//! (2,0) > (2,3) > (2,1) > (1,0) > (1,7) > (0,1)
//! ```
//!
//! 1. Higher `manual` is newer.
//! 2. Sharing a `manual`, the manual save outranks every autosave.
//! 3. Among autosaves of the same manual, higher `auto` is newer.
//!
//! Display lists are sorted descending (newest first).

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Identifier of one saved version inside a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Version {
    /// Manual chain number (1-based once a manual save exists).
    pub manual: u32,
    /// Autosave number under `manual`, or 0 for the manual save itself.
    pub auto: u32,
}

impl Version {
    /// The version before anything has been loaded or saved.
    pub const NONE: Self = Self { manual: 0, auto: 0 };

    #[must_use]
    pub const fn new(manual: u32, auto: u32) -> Self {
        Self { manual, auto }
    }

    /// A manual version on the main chain.
    #[must_use]
    pub const fn manual(manual: u32) -> Self {
        Self { manual, auto: 0 }
    }

    /// True iff this names a manual save.
    #[inline]
    #[must_use]
    pub const fn is_manual(self) -> bool {
        self.auto == 0
    }

    /// True iff this names an autosave.
    #[inline]
    #[must_use]
    pub const fn is_auto(self) -> bool {
        self.auto != 0
    }

    /// The manual save this version belongs to (itself for manual saves).
    #[must_use]
    pub const fn branch(self) -> Self {
        Self::manual(self.manual)
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.manual
            .cmp(&other.manual)
            .then_with(|| match (self.is_manual(), other.is_manual()) {
                (true, true) => Ordering::Equal,
                (true, false) => Ordering::Greater,
                (false, true) => Ordering::Less,
                (false, false) => self.auto.cmp(&other.auto),
            })
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.manual, self.auto)
    }
}

/// Error parsing a `"manual.auto"` version string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseVersionError(String);

impl fmt::Display for ParseVersionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid version '{}': expected MANUAL or MANUAL.AUTO", self.0)
    }
}

impl std::error::Error for ParseVersionError {}

impl FromStr for Version {
    type Err = ParseVersionError;

    /// Accepts `"3"` (manual 3) and `"3.2"` (autosave 2 of manual 3).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseVersionError(s.to_string());
        let (manual, auto) = match s.trim().split_once('.') {
            Some((m, a)) => (m, a),
            None => (s.trim(), "0"),
        };
        let manual = manual.parse().map_err(|_| err())?;
        let auto = auto.parse().map_err(|_| err())?;
        Ok(Self { manual, auto })
    }
}
