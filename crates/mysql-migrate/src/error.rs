//! Error types for the migration library.

use thiserror::Error;

/// Main error type for migration operations.
#[derive(Error, Debug)]
pub enum MigrateError {
    /// Configuration error (malformed pattern, unknown table, bad lookup projection, ...)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Source or target database unreachable
    #[error("Connection error ({database}): {message}")]
    Connection { database: String, message: String },

    /// Schema problem scoped to one table (missing source table, DDL failure)
    #[error("Schema error for table {table}: {message}")]
    Schema { table: String, message: String },

    /// Data transfer failed for a specific table
    #[error("Transfer failed for table {table}: {message}")]
    Transfer { table: String, message: String },

    /// Target database creation was refused
    #[error("Creation of target database '{0}' was declined")]
    ConfirmationDeclined(String),

    /// Source driver error
    #[error("Source database error: {0}")]
    Source(#[from] sqlx::Error),

    /// Target driver error
    #[error("Target database error: {0}")]
    Target(#[from] mysql_async::Error),

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl MigrateError {
    /// Create a Connection error for a database.
    pub fn connection(database: impl Into<String>, message: impl ToString) -> Self {
        MigrateError::Connection {
            database: database.into(),
            message: message.to_string(),
        }
    }

    /// Create a Schema error for a table.
    pub fn schema(table: impl Into<String>, message: impl ToString) -> Self {
        MigrateError::Schema {
            table: table.into(),
            message: message.to_string(),
        }
    }

    /// Create a Transfer error
    pub fn transfer(table: impl Into<String>, message: impl ToString) -> Self {
        MigrateError::Transfer {
            table: table.into(),
            message: message.to_string(),
        }
    }

    /// Whether this error must stop the whole run rather than one database.
    pub fn is_config(&self) -> bool {
        matches!(self, MigrateError::Config(_))
    }

    /// Short category name used in reports.
    pub fn kind(&self) -> &'static str {
        match self {
            MigrateError::Config(_) | MigrateError::Yaml(_) => "config",
            MigrateError::Connection { .. } => "connection",
            MigrateError::Schema { .. } => "schema",
            MigrateError::Transfer { .. } => "transfer",
            MigrateError::ConfirmationDeclined(_) => "confirmation_declined",
            MigrateError::Source(_) => "source",
            MigrateError::Target(_) => "target",
            MigrateError::Io(_) => "io",
            MigrateError::Json(_) => "json",
        }
    }

    /// Process exit code for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            MigrateError::Config(_) | MigrateError::Yaml(_) => 2,
            _ => 1,
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
