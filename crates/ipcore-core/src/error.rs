//! Error types for IPCore.

use thiserror::Error;

/// Main error type for graph construction and evaluation.
#[derive(Error, Debug)]
pub enum IpError {
    /// A required input failed or returned nothing. The message names the node.
    #[error("{0}")]
    EvaluationFailed(String),

    #[error("{0}")]
    ReadFailed(String),

    #[error("bad property type match for {name}: expected {expected}, found {found}")]
    BadPropertyTypeMatch {
        name: String,
        expected: String,
        found: String,
    },

    #[error("no such property: {0}")]
    NoSuchProperty(String),

    #[error("graph error: {0}")]
    Graph(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("{0}")]
    Internal(String),
}

impl IpError {
    /// Short stable name of the variant, used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::EvaluationFailed(_) => "EvaluationFailed",
            Self::ReadFailed(_) => "ReadFailed",
            Self::BadPropertyTypeMatch { .. } => "BadPropertyTypeMatch",
            Self::NoSuchProperty(_) => "NoSuchProperty",
            Self::Graph(_) => "Graph",
            Self::Io(_) => "Io",
            Self::Serialization(_) => "Serialization",
            Self::Internal(_) => "Internal",
        }
    }
}

/// Result type alias for IPCore operations.
pub type Result<T> = std::result::Result<T, IpError>;
