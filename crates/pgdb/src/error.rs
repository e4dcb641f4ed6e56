//! Error types for pgdb

use thiserror::Error;

/// Result type alias for pgdb operations
pub type DbResult<T> = Result<T, DbError>;

/// Error types for database operations
#[derive(Debug, Error)]
pub enum DbError {
    /// Invalid or incomplete configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Database connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// A bound value has a shape that cannot be stored
    #[error("{} has unsupported type {type_name}", display_param(.name))]
    InvalidArgument {
        name: Option<String>,
        type_name: &'static str,
    },

    /// A bound name is not a placeholder of the query
    #[error("Unknown parameter: {0}")]
    UnknownParameter(String),

    /// Prepare or execute failed; carries the full query text
    #[error("{kind}: {message}; query was: {query}")]
    Statement {
        kind: String,
        message: String,
        query: String,
        #[source]
        source: Option<tokio_postgres::Error>,
    },

    /// Requested column not present in the result
    #[error("Not found: {0}")]
    NotFound(String),

    /// Operation called in a state where it has no meaningful answer
    #[error("Logic error: {0}")]
    Logic(String),

    /// Transaction control used in the wrong state
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// Row decode error
    #[error("Decode error on column '{column}': {message}")]
    Decode { column: String, message: String },

    /// Native driver error outside statement execution
    #[error("Query error: {0}")]
    Query(#[from] tokio_postgres::Error),
}

fn display_param(name: &Option<String>) -> String {
    match name {
        Some(name) => format!("`{name}`"),
        None => "value".to_string(),
    }
}

impl DbError {
    /// Create a decode error for a specific column
    pub fn decode(column: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Decode {
            column: column.into(),
            message: message.into(),
        }
    }

    /// Create a not found error
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    /// Wrap a native failure together with the query that caused it.
    pub fn statement(err: tokio_postgres::Error, query: impl Into<String>) -> Self {
        let kind = match err.code() {
            Some(state) => format!("SQLSTATE {}", state.code()),
            None if err.is_closed() => "ConnectionClosed".to_string(),
            None => "ClientError".to_string(),
        };
        let message = match err.as_db_error() {
            Some(db_err) => db_err.message().to_string(),
            None => err.to_string(),
        };
        Self::Statement {
            kind,
            message,
            query: query.into(),
            source: Some(err),
        }
    }

    /// Check if this is a not found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Check if this is a logic error
    pub fn is_logic(&self) -> bool {
        matches!(self, Self::Logic(_))
    }

    /// Check if this is an unsupported-type binding error
    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, Self::InvalidArgument { .. })
    }

    /// SQLSTATE code when the server rejected the statement.
    pub fn sql_state(&self) -> Option<&str> {
        let err = match self {
            Self::Statement {
                source: Some(err), ..
            } => err,
            Self::Query(err) => err,
            _ => return None,
        };
        err.code().map(|state| state.code())
    }
}
