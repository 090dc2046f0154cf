use thiserror::Error;

pub type StreamResult<T> = Result<T, StreamError>;

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("Format Error: {0}")]
    Format(#[from] FormatError),
    #[error("Record length mismatch: expected {expected} samples, got {got}")]
    LengthMismatch { expected: usize, got: usize },
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum FormatError {
    #[error("Header truncated: expected {expected} bytes, got {got}")]
    TruncatedHeader { expected: usize, got: usize },
    #[error("Number of cells {0} is not a valid record length")]
    InvalidNumberOfCells(i64),
}
