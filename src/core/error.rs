//! Error types for the access layer
//!
//! Every failure surfaces as a [`DatabaseError`]. [`DatabaseError::kind`] groups the
//! variants into the four categories callers usually branch on: bad composition,
//! driver execution failures, invalid input, and connection resources.

/// Result type alias for database operations
pub type Result<T> = std::result::Result<T, DatabaseError>;

/// Coarse classification of a [`DatabaseError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A query or clause could not be composed; nothing reached the driver
    Composition,
    /// The driver rejected or failed a statement
    Execution,
    /// Caller input was rejected before any work was done
    Validation,
    /// A connection could not be obtained
    Resource,
    /// A lookup on a result missed
    Other,
}

/// Error types for database operations
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    /// Connection error (generic)
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// Connection pool exhausted
    #[error("Connection pool exhausted: {active}/{max} connections in use")]
    PoolExhausted { active: usize, max: usize },

    /// Query execution error
    #[error("Query execution error: {0}")]
    QueryError(String),

    /// Invalid query or clause composition
    #[error("Composition error: {0}")]
    Composition(String),

    /// Rejected input
    #[error("Validation error: {0}")]
    Validation(String),

    /// Invalid or incomplete configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Column not found
    #[error("Column not found: {0}")]
    ColumnNotFound(String),

    /// Unsupported operation
    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// SQLite error
    #[cfg(feature = "sqlite")]
    #[error("SQLite error: {0}")]
    SqliteError(#[from] rusqlite::Error),
}

impl DatabaseError {
    /// Create a new connection error (generic)
    pub fn connection<S: Into<String>>(msg: S) -> Self {
        DatabaseError::ConnectionError(msg.into())
    }

    /// Create a pool exhausted error
    pub fn pool_exhausted(active: usize, max: usize) -> Self {
        DatabaseError::PoolExhausted { active, max }
    }

    /// Create a new query error
    pub fn query<S: Into<String>>(msg: S) -> Self {
        DatabaseError::QueryError(msg.into())
    }

    /// Create a new composition error
    pub fn composition<S: Into<String>>(msg: S) -> Self {
        DatabaseError::Composition(msg.into())
    }

    /// Create a new validation error
    pub fn validation<S: Into<String>>(msg: S) -> Self {
        DatabaseError::Validation(msg.into())
    }

    /// Create a new configuration error
    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        DatabaseError::InvalidConfig(msg.into())
    }

    /// Create a new unsupported operation error
    pub fn unsupported<S: Into<String>>(msg: S) -> Self {
        DatabaseError::UnsupportedOperation(msg.into())
    }

    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            DatabaseError::Composition(_) | DatabaseError::UnsupportedOperation(_) => {
                ErrorKind::Composition
            }
            DatabaseError::QueryError(_) => ErrorKind::Execution,
            #[cfg(feature = "sqlite")]
            DatabaseError::SqliteError(_) => ErrorKind::Execution,
            DatabaseError::Validation(_) | DatabaseError::InvalidConfig(_) => {
                ErrorKind::Validation
            }
            DatabaseError::ConnectionError(_) | DatabaseError::PoolExhausted { .. } => {
                ErrorKind::Resource
            }
            DatabaseError::ColumnNotFound(_) => ErrorKind::Other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = DatabaseError::connection("Failed to connect");
        assert!(matches!(err, DatabaseError::ConnectionError(_)));

        let err = DatabaseError::composition("unsupported operator: xyz");
        assert!(matches!(err, DatabaseError::Composition(_)));

        let err = DatabaseError::validation("empty batch");
        assert!(matches!(err, DatabaseError::Validation(_)));
    }

    #[test]
    fn test_error_display() {
        let err = DatabaseError::connection("Connection refused");
        assert_eq!(err.to_string(), "Connection error: Connection refused");

        let err = DatabaseError::pool_exhausted(4, 4);
        assert_eq!(
            err.to_string(),
            "Connection pool exhausted: 4/4 connections in use"
        );
    }

    #[test]
    fn test_error_kind() {
        assert_eq!(
            DatabaseError::composition("x").kind(),
            ErrorKind::Composition
        );
        assert_eq!(DatabaseError::query("x").kind(), ErrorKind::Execution);
        assert_eq!(
            DatabaseError::invalid_config("port").kind(),
            ErrorKind::Validation
        );
        assert_eq!(DatabaseError::pool_exhausted(1, 1).kind(), ErrorKind::Resource);
        assert_eq!(
            DatabaseError::ColumnNotFound("id".into()).kind(),
            ErrorKind::Other
        );
    }
}
