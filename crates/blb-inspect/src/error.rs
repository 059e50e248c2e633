use std::path::PathBuf;

use thiserror::Error;

use blb_core::{BlbError, ErrorKind};

pub type Result<T> = std::result::Result<T, InspectError>;

#[derive(Debug, Error)]
pub enum InspectError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Level(#[from] BlbError),

    #[error("invalid argument: {message}")]
    InvalidArgument { message: String },

    #[error("output exists: {path} (pass --force to overwrite)")]
    OutputExists { path: PathBuf },

    #[error("{count} problem(s) found in the version graph")]
    Inconsistent { count: usize },
}

impl InspectError {
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::InvalidArgument { .. } | Self::OutputExists { .. } => 2,
            Self::Level(e) => match e.kind() {
                ErrorKind::NotFound => 3,
                ErrorKind::Format => 4,
                _ => 1,
            },
            Self::Inconsistent { .. } => 5,
            _ => 1,
        }
    }

    #[must_use]
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::InspectError;
    use blb_core::{BlbError, FormatError, Version};

    #[test]
    fn exit_codes_follow_error_kind() {
        assert_eq!(InspectError::invalid("x").exit_code(), 2);
        assert_eq!(
            InspectError::from(BlbError::not_found(Version::manual(2))).exit_code(),
            3
        );
        assert_eq!(
            InspectError::from(BlbError::from(FormatError::MissingSeparator)).exit_code(),
            4
        );
        assert_eq!(InspectError::Inconsistent { count: 2 }.exit_code(), 5);
    }

    #[test]
    fn level_errors_display_transparently() {
        let error = InspectError::from(BlbError::not_found(Version::new(1, 3)));
        assert_eq!(error.to_string(), "version 1.3 not found");
    }
}
