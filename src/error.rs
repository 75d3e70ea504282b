use thiserror::Error;

#[derive(Debug, Error)]
pub enum GridError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("invalid timestamp in {column}: {value}")]
    BadTimestamp { column: &'static str, value: String },
    #[error("student not found: {0}")]
    UnknownStudent(String),
    #[error("subject not found: {0}")]
    UnknownSubject(String),
    #[error("cell out of range: row {row}, col {col}")]
    OutOfRange { row: usize, col: usize },
}

pub type Result<T> = std::result::Result<T, GridError>;

/// A batch upsert that did not reach the backing store.
///
/// Reported once per failed flush, never per cell. Cells in the batch stay
/// dirty and are retried by the next debounce cycle or explicit save.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("failed to save {rows} grade(s): {message}")]
pub struct PersistenceFailure {
    pub message: String,
    pub rows: usize,
}

impl PersistenceFailure {
    pub fn new(message: impl Into<String>, rows: usize) -> Self {
        Self {
            message: message.into(),
            rows,
        }
    }
}
