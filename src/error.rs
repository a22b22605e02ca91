use thiserror::Error;

use crate::turtle::TurtleError;

/// Main error type for Graph Explorer
#[derive(Error, Debug)]
pub enum GraphError {
    /// File system I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Source file does not exist
    #[error("Source not found: {0}")]
    NotFound(String),

    /// Remote source could not be fetched
    #[error("Failed to fetch {url}: {message}")]
    Fetch { url: String, message: String },

    /// Source content is not valid for its format
    #[error("Malformed {format} source: {message}")]
    MalformedSource { format: &'static str, message: String },

    /// Turtle syntax errors
    #[error("Turtle error: {0}")]
    Turtle(#[from] TurtleError),

    /// Data source options could not be interpreted
    #[error("Invalid options: {0}")]
    InvalidOptions(String),

    /// No data source can handle the given source
    #[error("Unsupported source: {0}")]
    UnsupportedSource(String),

    /// A filter compared a numeric attribute against a non-numeric value
    #[error("Cannot compare numeric attribute '{attribute}' with '{value}'")]
    TypeMismatch { attribute: String, value: String },

    /// Workspace not found
    #[error("Workspace not found: {0}")]
    WorkspaceNotFound(String),

    /// Command shell errors
    #[error("Command error: {0}")]
    Command(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl GraphError {
    pub(crate) fn malformed(format: &'static str, message: impl ToString) -> Self {
        Self::MalformedSource {
            format,
            message: message.to_string(),
        }
    }
}

/// Convenient Result type using GraphError
pub type Result<T> = std::result::Result<T, GraphError>;
