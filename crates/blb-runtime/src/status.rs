#![forbid(unsafe_code)]

//! User-visible status messages.
//!
//! Every save, export, load, graph edit, drop, cancellation and no-op ends
//! in exactly one [`Status`], delivered on the owning thread.

use std::fmt;

use blb_core::{BlbError, ErrorKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum StatusLevel {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    pub level: StatusLevel,
    pub message: String,
}

impl Status {
    #[must_use]
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: StatusLevel::Info,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            level: StatusLevel::Warning,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: StatusLevel::Error,
            message: message.into(),
        }
    }

    /// Status for a failed operation. Empty-level rejections are warnings,
    /// everything else is an error.
    #[must_use]
    pub fn from_error(context: &str, err: &BlbError) -> Self {
        match err.kind() {
            ErrorKind::EmptyLevel => Self::warning(format!("{context}: {err}")),
            _ => Self::error(format!("{context}: {err}")),
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.level {
            StatusLevel::Info => "info",
            StatusLevel::Warning => "warning",
            StatusLevel::Error => "error",
        };
        write!(f, "[{tag}] {}", self.message)
    }
}

/// Receives status messages. Implemented for any `FnMut(Status)`.
pub trait StatusSink {
    fn notify(&mut self, status: Status);
}

impl<F: FnMut(Status)> StatusSink for F {
    fn notify(&mut self, status: Status) {
        self(status);
    }
}
