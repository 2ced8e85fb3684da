use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Non-2xx response from the GraphQL endpoint.
    #[error("Linear API error: {status} {reason}")]
    Transport { status: u16, reason: String },

    /// The response carried a GraphQL `errors` list.
    #[error("{0}")]
    Remote(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unexpected response: {0}")]
    Decode(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid date: {0}")]
    InvalidDate(String),

    #[error("Entity not found: {0}")]
    NotFound(String),
}

impl From<rusqlite::Error> for Error {
    fn from(e: rusqlite::Error) -> Self {
        Error::Database(e.to_string())
    }
}

impl From<rusqlite_migration::Error> for Error {
    fn from(e: rusqlite_migration::Error) -> Self {
        Error::Migration(e.to_string())
    }
}

impl<E: fmt::Display> From<tokio_rusqlite::Error<E>> for Error {
    fn from(e: tokio_rusqlite::Error<E>) -> Self {
        Error::Database(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
