//! Error types for I/O operations

use std::io::ErrorKind;

use thiserror::Error;

/// Errors that can occur during I/O operations
///
/// Every variant converts into [`pointkit_core::Error::Io`], so loading and
/// saving only ever fail with the I/O error kind.
#[derive(Error, Debug)]
pub enum IoError {
    #[error("File not found: {path}")]
    FileNotFound { path: String },
    
    #[error("Invalid file format: {format}")]
    InvalidFormat { format: String },
    
    #[error("Parse error on line {line}: {message}")]
    ParseError { line: usize, message: String },
    
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl IoError {
    pub(crate) fn parse(line: usize, message: impl Into<String>) -> Self {
        IoError::ParseError { line, message: message.into() }
    }

    pub(crate) fn format(format: impl Into<String>) -> Self {
        IoError::InvalidFormat { format: format.into() }
    }
}

impl From<IoError> for pointkit_core::Error {
    fn from(err: IoError) -> Self {
        let kind = match &err {
            IoError::Io(inner) => inner.kind(),
            IoError::FileNotFound { .. } => ErrorKind::NotFound,
            IoError::InvalidFormat { .. } | IoError::ParseError { .. } => ErrorKind::InvalidData,
        };
        match err {
            IoError::Io(inner) => pointkit_core::Error::Io(inner),
            other => pointkit_core::Error::Io(std::io::Error::new(kind, other.to_string())),
        }
    }
}

/// Open a file, reporting a missing path as [`IoError::FileNotFound`]
pub(crate) fn open(path: &std::path::Path) -> Result<std::fs::File, IoError> {
    std::fs::File::open(path).map_err(|e| match e.kind() {
        ErrorKind::NotFound => IoError::FileNotFound { path: path.display().to_string() },
        _ => IoError::Io(e),
    })
}
