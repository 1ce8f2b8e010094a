use thiserror::Error;

use tokenbot_core::errors::StoreError;

pub mod grant;
pub mod memory;

pub use grant::SqlGrantRepository;
pub use memory::InMemoryGrantRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("unique constraint violated: {0}")]
    Conflict(String),
}

impl RepositoryError {
    /// Unique-index violations become `Conflict`; everything else stays as is.
    pub fn classify(error: sqlx::Error) -> Self {
        match &error {
            sqlx::Error::Database(db_error) if db_error.is_unique_violation() => {
                Self::Conflict(db_error.message().to_string())
            }
            _ => Self::Database(error),
        }
    }
}

impl From<RepositoryError> for StoreError {
    fn from(value: RepositoryError) -> Self {
        match value {
            RepositoryError::Conflict(detail) => StoreError::Conflict(detail),
            other => StoreError::Backend(other.to_string()),
        }
    }
}
