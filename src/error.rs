//! Error types for one-epoch SOM training.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for epoch operations.
#[derive(Error, Debug)]
pub enum SomError {
    /// Invalid or missing configuration, including a weight source that does
    /// not match the configured shape.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Malformed input record or wire value.
    #[error("Parse error: {0}")]
    Parse(String),

    /// A neuron received zero total activation and the policy forbids a fallback.
    #[error("Degenerate reduce: neuron {neuron} received zero total activation")]
    DegenerateReduce {
        /// The neuron whose activation sum was zero.
        neuron: usize,
    },

    /// A vector does not have the configured attribute dimension.
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// The configured attribute dimension.
        expected: usize,
        /// The dimension that was found.
        actual: usize,
    },

    /// Neuron index outside the grid.
    #[error("Neuron index out of bounds: {index} >= {max}")]
    NeuronOutOfBounds {
        /// The offending index.
        index: usize,
        /// The number of neurons.
        max: usize,
    },

    /// File not found.
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    /// Illegal epoch phase transition.
    #[error("Epoch state error: {0}")]
    State(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result type alias for epoch operations.
pub type Result<T> = std::result::Result<T, SomError>;

impl From<serde_json::Error> for SomError {
    fn from(err: serde_json::Error) -> Self {
        SomError::Serialization(err.to_string())
    }
}
