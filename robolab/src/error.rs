use std::path::{Path, PathBuf};

use thiserror::Error;

/// Failures while reading configuration files and level packs.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse {location}: {message}")]
    Parse { location: String, message: String },
    #[error("failed to serialize: {0}")]
    Serialize(String),
    #[error("invalid content: {0}")]
    Invalid(String),
}

impl LoadError {
    pub(crate) fn parse(message: impl ToString) -> Self {
        Self::Parse {
            location: "<inline>".to_string(),
            message: message.to_string(),
        }
    }

    /// Attach the file a parse failure came from.
    pub(crate) fn with_path(self, path: &Path) -> Self {
        match self {
            Self::Parse { message, .. } => Self::Parse {
                location: path.display().to_string(),
                message,
            },
            other => other,
        }
    }
}

/// Rejected robot commands. The message doubles as the user-facing status.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RobotError {
    #[error("Invalid direction '{0}'. Use: north, south, east, west")]
    InvalidDirection(String),
    #[error("{what} must be a finite number, got {value}")]
    NonFinite { what: &'static str, value: f32 },
}

/// Reasons a level cannot be started.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("Level {0} does not exist")]
    UnknownLevel(u32),
    #[error("Level {0} is locked. Complete the previous level first")]
    LevelLocked(u32),
    #[error("No level is active")]
    NoActiveLevel,
}

/// A student program failed. Always caught at the console boundary.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ScriptError {
    #[error("Syntax error: {0}")]
    Parse(String),
    #[error("{0}")]
    Runtime(String),
    #[error("Script stopped: {0}")]
    LimitExceeded(String),
}
