#![forbid(unsafe_code)]

use std::path::PathBuf;

use thiserror::Error;

use crate::version::Version;

pub type Result<T> = std::result::Result<T, BlbError>;

/// Coarse category of a [`BlbError`], used for status reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Format,
    Io,
    State,
    EmptyLevel,
}

#[derive(Debug, Error)]
pub enum BlbError {
    #[error("version {version} not found")]
    VersionNotFound { version: Version },

    #[error("file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("format error: {0}")]
    Format(#[from] FormatError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid state: {message}")]
    State { message: String },

    #[error("cannot save an empty level")]
    EmptyLevel,
}

impl BlbError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::VersionNotFound { .. } | Self::FileNotFound { .. } => ErrorKind::NotFound,
            Self::Format(_) => ErrorKind::Format,
            Self::Io(_) => ErrorKind::Io,
            Self::State { .. } => ErrorKind::State,
            Self::EmptyLevel => ErrorKind::EmptyLevel,
        }
    }

    #[must_use]
    pub fn not_found(version: Version) -> Self {
        Self::VersionNotFound { version }
    }

    #[must_use]
    pub fn state(message: impl Into<String>) -> Self {
        Self::State {
            message: message.into(),
        }
    }
}

/// Structural problems decoding a `.blb` byte stream.
#[derive(Debug, Error)]
pub enum FormatError {
    #[error("missing newline between header and body")]
    MissingSeparator,

    #[error("invalid header: {0}")]
    InvalidHeader(#[source] serde_json::Error),

    #[error("invalid body: {0}")]
    InvalidBody(#[source] serde_json::Error),

    #[error("body is not valid gzip: {0}")]
    Compression(#[source] std::io::Error),
}
