//! Error taxonomy shared by the repository and the HTTP layer.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChoreError {
    /// Missing or invalid caller input (empty title, no uploaded file, bad enum value).
    #[error("{0}")]
    Validation(String),

    /// The chore does not exist or belongs to another user.
    #[error("Chore not found")]
    NotFound,

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("filesystem error: {0}")]
    Io(#[from] std::io::Error),
}

impl ChoreError {
    pub fn validation(message: impl Into<String>) -> Self {
        ChoreError::Validation(message.into())
    }
}

pub type Result<T> = std::result::Result<T, ChoreError>;
