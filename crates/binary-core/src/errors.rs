pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The requested range does not fit inside the current content.
    #[error("range {offset}+{length} is outside content of length {total}")]
    OutOfRange { offset: u64, length: u64, total: u64 },

    #[error("invalid search pattern: {0}")]
    InvalidPattern(String),

    #[error("search cancelled")]
    Cancelled,

    #[error("I/O failure: {0}")]
    Io(#[from] std::io::Error),

    #[error("session has been disposed")]
    Disposed,

    #[error("no content loaded")]
    NotLoaded,

    /// A 64-bit offset did not fit the platform's address width.
    #[error("integer conversion failed: {0}")]
    Conversion(#[from] std::num::TryFromIntError),
}

impl EngineError {
    pub fn out_of_range(offset: u64, length: u64, total: u64) -> Self {
        EngineError::OutOfRange {
            offset,
            length,
            total,
        }
    }
}
