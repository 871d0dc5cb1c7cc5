//! Custom error types for the common library
//!
//! `DatabaseError` describes failures talking to PostgreSQL, while
//! `RepositoryError` is what the repository traits of every service return.

use sqlx::{Error as SqlxError, migrate::MigrateError};
use thiserror::Error;

/// Custom error type for database operations
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Error occurred during database connection
    #[error("Database connection error: {0}")]
    Connection(#[source] SqlxError),

    /// Error occurred during database query execution
    #[error("Database query error: {0}")]
    Query(#[source] SqlxError),

    /// Error occurred during database migration
    #[error("Database migration error: {0}")]
    Migration(#[source] MigrateError),

    /// Configuration error
    #[error("Database configuration error: {0}")]
    Configuration(String),
}

/// Type alias for Result with DatabaseError
pub type DatabaseResult<T> = Result<T, DatabaseError>;

/// Errors reported by repository implementations, whatever their backend.
#[derive(Error, Debug)]
pub enum RepositoryError {
    /// A unique constraint was violated (duplicate email, duplicate url...)
    #[error("record already exists: {0}")]
    Conflict(String),

    /// The record addressed by the operation does not exist
    #[error("record not found")]
    NotFound,

    /// The underlying database failed
    #[error(transparent)]
    Database(#[from] DatabaseError),
}

impl RepositoryError {
    /// Classify a query error, turning unique violations into `Conflict`.
    pub fn from_query(err: SqlxError) -> Self {
        match &err {
            SqlxError::Database(db) if db.is_unique_violation() => {
                let constraint = db.constraint().unwrap_or("unique").to_string();
                RepositoryError::Conflict(constraint)
            }
            SqlxError::RowNotFound => RepositoryError::NotFound,
            _ => RepositoryError::Database(DatabaseError::Query(err)),
        }
    }
}

/// Type alias for repository results
pub type RepositoryResult<T> = Result<T, RepositoryError>;
