//! Error type shared by every part of the simulation.

use thiserror::Error;

/// Main error type for simulation operations
#[derive(Error, Debug)]
pub enum SimError {
    /// A value of the wrong kind was passed to a node, e.g. a bare `Values`
    /// given to a combine node, or haplotype copies with different shapes.
    #[error("Type error: {message}")]
    Type { message: String },

    /// Unsupported parameter value, dimensionality mismatch or a shape that
    /// cannot be broadcast.
    #[error("Value error: {message}")]
    Value { message: String },

    /// A step names a node type that is not registered with the builder.
    #[error("No node type registered with name {name}")]
    UnknownNodeType { name: String },

    /// A custom node entry was rejected by the builder.
    #[error("Invalid custom node {name}: {reason}")]
    InvalidCustomNode { name: String, reason: String },

    /// A node's `inputs` wiring is not none, an alias, a list of aliases or a
    /// name to alias mapping.
    #[error("Node {alias} has invalid inputs {found}: must be null, a string, a list or an object")]
    InvalidInputs { alias: String, found: String },

    /// A node asked for an alias that is not (yet) in the values map.
    #[error("Alias {alias} required by node {node} is not in the values map")]
    MissingAlias { alias: String, node: String },

    /// Malformed simulation configuration.
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Column names or shapes that cannot be turned back into values.
    #[error("Table error: {message}")]
    Table { message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Type alias for Results using SimError
pub type Result<T, E = SimError> = std::result::Result<T, E>;

impl SimError {
    pub fn type_error(message: impl Into<String>) -> Self {
        Self::Type {
            message: message.into(),
        }
    }

    pub fn value(message: impl Into<String>) -> Self {
        Self::Value {
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn table(message: impl Into<String>) -> Self {
        Self::Table {
            message: message.into(),
        }
    }
}
