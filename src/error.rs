//! Error types for athanor.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Malformed caller input. Never retried.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// The adjustment would take a material below zero.
    #[error("insufficient stock: {available} available, adjustment of {requested}")]
    InsufficientStock { available: f64, requested: f64 },

    /// Lock, connection or transaction failure. Safe to retry.
    #[error("storage error: {0}")]
    TransientStorage(#[from] sqlx::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether retrying the same operation can never succeed.
    ///
    /// The worker pool dead-letters jobs that fail permanently and leaves
    /// everything else unacknowledged for redelivery.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            Error::InvalidArgument(_) | Error::NotFound(_) | Error::Serialization(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
