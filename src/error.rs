use serde::Serialize;

use crate::action::ActionType;

/// Failures of the SQLite storage collaborator.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("sqlite: {0}")]
    Sql(#[from] rusqlite::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("database {0} is closed")]
    Closed(String),
    #[error("no project found in {0}")]
    NoProject(String),
    #[error("schema version {found} is newer than supported version {supported}")]
    FutureSchema { found: u32, supported: u32 },
    #[error("{0}")]
    Invalid(String),
}

/// Failures while probing an image file on disk.
#[derive(Debug, thiserror::Error)]
pub enum ImageError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("{path} is empty")]
    Empty { path: String },
    #[error("{path} is not a supported image")]
    Unsupported { path: String },
}

/// Registry misconfiguration. Detected at startup, never recovered.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("command {0} already registered")]
    Duplicate(ActionType),
    #[error("no command registered for {0}")]
    Unregistered(ActionType),
    #[error("{0} is not a command action")]
    NotCommand(ActionType),
    #[error("command registry not initialized")]
    Uninitialized,
}

/// A failure captured into a completed command. Cloneable so the frozen
/// outcome can be shared by history, activity and logging consumers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    #[error("cancelled")]
    Cancelled,
    #[error("invalid payload for {kind}: {message}")]
    Payload { kind: ActionType, message: String },
    #[error("{what} not found")]
    NotFound { what: String },
    #[error("storage: {0}")]
    Storage(String),
    #[error("{0}")]
    Validation(String),
    #[error("configuration: {0}")]
    Config(#[from] ConfigError),
}

impl CommandError {
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }
}

impl From<DbError> for CommandError {
    fn from(e: DbError) -> Self {
        Self::Storage(e.to_string())
    }
}

impl From<ImageError> for CommandError {
    fn from(e: ImageError) -> Self {
        Self::Validation(e.to_string())
    }
}

impl Serialize for CommandError {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

/// Top-level error for the orchestrator, settings and the CLI.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Db(#[from] DbError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Command(#[from] CommandError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("no project open")]
    NoProject,
    #[error("orchestrator is not running")]
    Stopped,
    #[error("{0}")]
    Validation(String),
}

impl From<String> for AppError {
    fn from(s: String) -> Self {
        AppError::Validation(s)
    }
}

impl From<&str> for AppError {
    fn from(s: &str) -> Self {
        AppError::Validation(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_error_serializes_as_message() {
        let err = CommandError::not_found("photo 7");
        let json = serde_json::to_value(&err).unwrap_or_default();
        assert_eq!(json, serde_json::json!("photo 7 not found"));
    }

    #[test]
    fn only_cancelled_is_cancellation() {
        assert!(CommandError::Cancelled.is_cancellation());
        assert!(!CommandError::Validation("x".into()).is_cancellation());
    }
}
