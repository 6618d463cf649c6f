//! Error types for the migration library.

use thiserror::Error;

/// Main error type for migration operations.
#[derive(Error, Debug)]
pub enum MigrateError {
    /// Configuration error (invalid YAML, missing fields, conflicting options)
    #[error("Configuration error: {0}")]
    Config(String),

    /// The source connection dropped mid-operation
    #[error("Lost connection to MySQL server while {context}: {message}")]
    ConnectionLost { context: String, message: String },

    /// The configured source database does not exist
    #[error("MySQL Database does not exist: {0}")]
    UnknownDatabase(String),

    /// Source database query error
    #[error("Source database error while {context}: {source}")]
    Source {
        context: String,
        #[source]
        source: sqlx::Error,
    },

    /// Target database statement error
    #[error("Target database error while {context}: {source}")]
    Target {
        context: String,
        #[source]
        source: sqlx::Error,
    },

    /// Schema extraction failed
    #[error("Schema extraction failed: {0}")]
    SchemaExtraction(String),

    /// Column type string could not be parsed
    #[error("Invalid column type: {0:?}")]
    InvalidColumnType(String),

    /// Data transfer failed for a specific table
    #[error("Transfer failed for table {table}: {message}")]
    Transfer { table: String, message: String },

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Migration was cancelled (SIGINT, etc.)
    #[error("Migration cancelled")]
    Cancelled,
}

impl MigrateError {
    /// Create a ConnectionLost error.
    pub fn connection_lost(context: impl Into<String>, message: impl Into<String>) -> Self {
        MigrateError::ConnectionLost {
            context: context.into(),
            message: message.into(),
        }
    }

    /// Wrap a SQLite error with context about where it occurred.
    pub fn target(source: sqlx::Error, context: impl Into<String>) -> Self {
        MigrateError::Target {
            context: context.into(),
            source,
        }
    }

    /// Create a Transfer error
    pub fn transfer(table: impl Into<String>, message: impl Into<String>) -> Self {
        MigrateError::Transfer {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Whether this error is the transient "connection lost" kind that
    /// warrants a single reconnect-and-retry.
    pub fn is_connection_lost(&self) -> bool {
        matches!(self, MigrateError::ConnectionLost { .. })
    }

    /// Process exit code for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            MigrateError::Config(_) | MigrateError::Yaml(_) => 1,
            MigrateError::ConnectionLost { .. }
            | MigrateError::UnknownDatabase(_)
            | MigrateError::Source { .. } => 2,
            MigrateError::Target { .. } => 3,
            MigrateError::Transfer { .. } => 4,
            MigrateError::SchemaExtraction(_) | MigrateError::InvalidColumnType(_) => 5,
            MigrateError::Json(_) => 6,
            MigrateError::Io(_) => 7,
            MigrateError::Cancelled => 130,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for migration operations.
pub type Result<T> = std::result::Result<T, MigrateError>;
