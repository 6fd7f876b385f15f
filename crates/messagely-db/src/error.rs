use thiserror::Error;

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("user '{0}' already exists")]
    DuplicateUser(String),

    #[error("user '{0}' cannot be found")]
    UserNotFound(String),

    #[error("message {0} cannot be found")]
    MessageNotFound(i64),

    /// A row references a user that no longer exists. Never expected while
    /// foreign keys are enforced.
    #[error("data integrity fault: {0}")]
    Integrity(String),

    #[error("database lock poisoned: {0}")]
    LockPoisoned(String),

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}
