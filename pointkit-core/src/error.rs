//! Error types for pointkit

use thiserror::Error;

/// Main error type for pointkit operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    
    #[error("Invalid data: {0}")]
    InvalidData(String),
    
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    
    #[error("Degenerate neighborhood at point {index}: {neighbors} usable neighbors")]
    DegenerateNeighborhood { index: usize, neighbors: usize },
    
    #[error("Spatial index construction failed: {0}")]
    IndexBuildFailure(String),
    
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
}

/// Result type alias for pointkit operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Shorthand for [`Error::InvalidConfig`]
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Error::InvalidConfig(message.into())
    }

    /// Shorthand for [`Error::InvalidData`]
    pub fn invalid_data(message: impl Into<String>) -> Self {
        Error::InvalidData(message.into())
    }
}
