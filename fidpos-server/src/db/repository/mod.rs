//! Repository Module
//!
//! CRUD and transactional operations over the SQLite tables. Repositories
//! are plain modules of functions taking a pool (or an open transaction's
//! connection, where the caller controls atomicity).

pub mod category;
pub mod item;
pub mod transaction;

use thiserror::Error;

/// Repository error types
#[derive(Debug, Error)]
pub enum RepoError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Duplicate: {0}")]
    Duplicate(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Validation error: {0}")]
    Validation(String),
}

impl From<sqlx::Error> for RepoError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err
            && db_err.is_unique_violation()
        {
            return RepoError::Duplicate(db_err.message().to_string());
        }
        RepoError::Database(err.to_string())
    }
}

/// Result type for repository operations
pub type RepoResult<T> = Result<T, RepoError>;
