//! Error types for lazylink operations.

use std::fmt;

/// The primary error type for all lazylink operations.
#[derive(Debug)]
pub enum Error {
    /// Connection-level errors (open, close)
    Connection(ConnectionError),
    /// Query execution errors
    Query(QueryError),
    /// Type conversion errors when decoding rows
    Type(TypeError),
    /// No entity matched a `find_one_or_fail` lookup
    NotFound(NotFoundError),
    /// Incompatible load-option combination
    UnsupportedOption(UnsupportedOptionError),
    /// Invalid entity/relation metadata at registry construction
    Metadata(MetadataError),
    /// I/O errors
    Io(std::io::Error),
    /// Custom error with message
    Custom(String),
}

#[derive(Debug)]
pub struct ConnectionError {
    pub kind: ConnectionErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionErrorKind {
    /// Failed to open the database
    Open,
    /// Connection lost or closed during an operation
    Closed,
}

#[derive(Debug)]
pub struct QueryError {
    pub kind: QueryErrorKind,
    pub sql: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryErrorKind {
    /// Syntax error in SQL
    Syntax,
    /// Constraint violation (unique, foreign key)
    Constraint,
    /// Parameter binding failed
    Bind,
    /// Other database error
    Database,
}

#[derive(Debug)]
pub struct TypeError {
    pub expected: &'static str,
    pub actual: String,
    pub column: Option<String>,
}

/// No row matched the lookup criteria.
#[derive(Debug)]
pub struct NotFoundError {
    /// Entity name ("Product")
    pub entity: &'static str,
    /// Rendered criteria ("{ name: 'Product 1' }")
    pub criteria: String,
}

/// A load option was requested in a combination the loader does not support.
#[derive(Debug)]
pub struct UnsupportedOptionError {
    /// Name of the entity on the side being loaded
    pub entity: &'static str,
    /// The offending option, rendered as a property path (":ref")
    pub option: &'static str,
}

#[derive(Debug)]
pub struct MetadataError {
    pub message: String,
}

impl Error {
    /// Shorthand for a custom error.
    pub fn custom(message: impl Into<String>) -> Self {
        Error::Custom(message.into())
    }

    /// Shorthand for a not-found error.
    pub fn not_found(entity: &'static str, criteria: impl Into<String>) -> Self {
        Error::NotFound(NotFoundError {
            entity,
            criteria: criteria.into(),
        })
    }

    /// Shorthand for an unsupported load-option error.
    pub fn unsupported_option(entity: &'static str, option: &'static str) -> Self {
        Error::UnsupportedOption(UnsupportedOptionError { entity, option })
    }

    /// Shorthand for a metadata validation error.
    pub fn metadata(message: impl Into<String>) -> Self {
        Error::Metadata(MetadataError {
            message: message.into(),
        })
    }

    /// Is this a storage-level constraint violation (unique/foreign key)?
    pub fn is_constraint_violation(&self) -> bool {
        matches!(
            self,
            Error::Query(QueryError {
                kind: QueryErrorKind::Constraint,
                ..
            })
        )
    }

    /// Get the SQL that caused this error, if available.
    pub fn sql(&self) -> Option<&str> {
        match self {
            Error::Query(q) => q.sql.as_deref(),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Connection(e) => write!(f, "Connection error: {}", e.message),
            Error::Query(e) => write!(f, "Query error: {}", e.message),
            Error::Type(e) => {
                if let Some(col) = &e.column {
                    write!(
                        f,
                        "Type error in column '{}': expected {}, found {}",
                        col, e.expected, e.actual
                    )
                } else {
                    write!(f, "Type error: expected {}, found {}", e.expected, e.actual)
                }
            }
            Error::NotFound(e) => write!(f, "{} not found ({})", e.entity, e.criteria),
            Error::UnsupportedOption(e) => write!(
                f,
                "Entity '{}' does not have property '{}'",
                e.entity, e.option
            ),
            Error::Metadata(e) => write!(f, "Metadata error: {}", e.message),
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::Custom(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<ConnectionError> for Error {
    fn from(err: ConnectionError) -> Self {
        Error::Connection(err)
    }
}

impl From<QueryError> for Error {
    fn from(err: QueryError) -> Self {
        Error::Query(err)
    }
}

impl From<TypeError> for Error {
    fn from(err: TypeError) -> Self {
        Error::Type(err)
    }
}

/// Result type alias for lazylink operations.
pub type Result<T> = std::result::Result<T, Error>;
