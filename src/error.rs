use std::path::PathBuf;
use thiserror::Error;

/// Exploration error types
#[derive(Error, Debug)]
pub enum ExploreError {
    #[error("Mesh has no geometry to query")]
    EmptyMesh,

    #[error("Ray does not intersect the mesh")]
    NoIntersection,

    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("Parse error on line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Invalid mesh: {0}")]
    InvalidMesh(String),

    #[error("Log key already written: {group}/{key}")]
    DuplicateLogKey { group: String, key: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ExploreError {
    /// Recoverable errors are swallowed per sample by the simulation loop,
    /// everything else terminates the run.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, ExploreError::NoIntersection)
    }
}

/// Result type for library operations
pub type Result<T> = std::result::Result<T, ExploreError>;
