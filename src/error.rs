//! Error types for the dirsync CLI.
//!
//! Provides structured error handling with:
//! - Machine-readable error codes (`ErrorCode`)
//! - Category-based exit codes (2=context, 3=journal, 4=engine, etc.)
//! - Context-aware recovery hints
//! - Structured JSON output for piped / non-TTY consumers

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for dirsync operations.
pub type Result<T> = std::result::Result<T, Error>;

// ── Error Code ────────────────────────────────────────────────

/// Machine-readable error codes grouped by category.
///
/// Each code maps to a SCREAMING_SNAKE string and a category-based
/// exit code. Scripts match on the string or the exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // Sync context (exit 2)
    ContextCreateFailed,
    ContextInitFailed,
    SourceDirMissing,

    // Journal (exit 3)
    JournalLoadFailed,

    // Engine (exit 4)
    EngineStartupFailed,

    // Credentials (exit 5)
    CredentialsFailed,

    // Configuration (exit 6)
    InvalidServerUrl,

    // I/O (exit 8)
    DatabaseError,
    IoError,
    JsonError,

    // Internal (exit 1)
    InternalError,
}

impl ErrorCode {
    /// Machine-readable SCREAMING_SNAKE code string.
    #[must_use]
    pub const fn as_str(&self) -> &str {
        match self {
            Self::ContextCreateFailed => "CONTEXT_CREATE_FAILED",
            Self::ContextInitFailed => "CONTEXT_INIT_FAILED",
            Self::SourceDirMissing => "SOURCE_DIR_MISSING",
            Self::JournalLoadFailed => "JOURNAL_LOAD_FAILED",
            Self::EngineStartupFailed => "ENGINE_STARTUP_FAILED",
            Self::CredentialsFailed => "CREDENTIALS_FAILED",
            Self::InvalidServerUrl => "INVALID_SERVER_URL",
            Self::DatabaseError => "DATABASE_ERROR",
            Self::IoError => "IO_ERROR",
            Self::JsonError => "JSON_ERROR",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }

    /// Category-based exit code (1-8).
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::InternalError => 1,
            Self::ContextCreateFailed | Self::ContextInitFailed | Self::SourceDirMissing => 2,
            Self::JournalLoadFailed => 3,
            Self::EngineStartupFailed => 4,
            Self::CredentialsFailed => 5,
            Self::InvalidServerUrl => 6,
            Self::DatabaseError | Self::IoError | Self::JsonError => 8,
        }
    }
}

// ── Error Enum ────────────────────────────────────────────────

/// Errors that can occur while running a sync session.
///
/// Every variant here is process-fatal: the session cannot proceed and the
/// process exits with the category code. Per-statement journal failures are
/// soft and live in [`crate::journal::QueryError`] instead.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Unable to create sync context for {path}: {reason}")]
    ContextCreate { path: PathBuf, reason: String },

    #[error("Could not initialize sync context: {0}")]
    ContextInit(String),

    #[error("Source directory does not exist: {path}")]
    SourceDirMissing { path: PathBuf },

    #[error("Failed to copy journal {path} to its working copy: {source}")]
    JournalCopy {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to open journal working copy {path}: {source}")]
    JournalOpen {
        path: PathBuf,
        source: rusqlite::Error,
    },

    #[error("Transport startup failed: {0}")]
    EngineStartup(String),

    #[error("Credential setup failed: {0}")]
    Credentials(String),

    #[error("Invalid server URL '{url}': {reason}")]
    InvalidServerUrl { url: String, reason: String },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Map this error to its structured `ErrorCode`.
    #[must_use]
    pub const fn error_code(&self) -> ErrorCode {
        match self {
            Self::ContextCreate { .. } => ErrorCode::ContextCreateFailed,
            Self::ContextInit(_) => ErrorCode::ContextInitFailed,
            Self::SourceDirMissing { .. } => ErrorCode::SourceDirMissing,
            Self::JournalCopy { .. } | Self::JournalOpen { .. } => ErrorCode::JournalLoadFailed,
            Self::EngineStartup(_) => ErrorCode::EngineStartupFailed,
            Self::Credentials(_) => ErrorCode::CredentialsFailed,
            Self::InvalidServerUrl { .. } => ErrorCode::InvalidServerUrl,
            Self::Database(_) => ErrorCode::DatabaseError,
            Self::Io(_) => ErrorCode::IoError,
            Self::Json(_) => ErrorCode::JsonError,
            Self::Other(_) => ErrorCode::InternalError,
        }
    }

    /// Category-based exit code, delegating to the `ErrorCode`.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        self.error_code().exit_code()
    }

    /// Context-aware recovery hint for humans and scripts.
    ///
    /// Returns `None` if no actionable suggestion exists.
    #[must_use]
    pub fn hint(&self) -> Option<String> {
        match self {
            Self::SourceDirMissing { path } => Some(format!(
                "Create {} or check the path for typos.",
                path.display()
            )),

            Self::InvalidServerUrl { .. } => {
                Some("Expected a URL of the form scheme://host[:port][/path].".to_string())
            }

            Self::Credentials(_) => Some(
                "Pass --user and --password, embed them in the URL, or use -n \
                 to read login data from ~/.netrc."
                    .to_string(),
            ),

            Self::JournalCopy { path, .. } | Self::JournalOpen { path, .. } => {
                path.parent().map(|dir| {
                    format!(
                        "Check free space and write permissions in {}.",
                        dir.display()
                    )
                })
            }

            Self::ContextCreate { .. }
            | Self::ContextInit(_)
            | Self::EngineStartup(_)
            | Self::Database(_)
            | Self::Io(_)
            | Self::Json(_)
            | Self::Other(_) => None,
        }
    }

    /// Structured JSON representation for machine consumption.
    ///
    /// Includes error code, message, exit code, and optional recovery hint.
    /// Non-TTY consumers parse this instead of stderr text.
    #[must_use]
    pub fn to_structured_json(&self) -> serde_json::Value {
        let code = self.error_code();
        let mut obj = serde_json::json!({
            "error": {
                "code": code.as_str(),
                "message": self.to_string(),
                "exit_code": code.exit_code(),
            }
        });

        if let Some(hint) = self.hint() {
            obj["error"]["hint"] = serde_json::Value::String(hint);
        }

        obj
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_by_category() {
        let err = Error::SourceDirMissing {
            path: PathBuf::from("/nope"),
        };
        assert_eq!(err.exit_code(), 2);

        let err = Error::JournalCopy {
            path: PathBuf::from("/tmp/j.db"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        assert_eq!(err.exit_code(), 3);

        let err = Error::EngineStartup("no transport".into());
        assert_eq!(err.exit_code(), 4);

        let err = Error::Other("boom".into());
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn structured_json_includes_code_and_hint() {
        let err = Error::SourceDirMissing {
            path: PathBuf::from("/data/photos"),
        };
        let json = err.to_structured_json();
        assert_eq!(json["error"]["code"], "SOURCE_DIR_MISSING");
        assert_eq!(json["error"]["exit_code"], 2);
        assert!(json["error"]["hint"].as_str().unwrap().contains("/data/photos"));
    }

    #[test]
    fn hint_absent_for_internal_errors() {
        assert!(Error::Other("boom".into()).hint().is_none());
    }
}
