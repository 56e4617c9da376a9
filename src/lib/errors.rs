//! Custom error types for zmwalign operations.

use thiserror::Error;

/// Result type alias for zmwalign operations
pub type Result<T> = std::result::Result<T, ZmwAlignError>;

/// Error type for zmwalign operations
#[derive(Error, Debug)]
pub enum ZmwAlignError {
    /// The inputs do not form a valid subreads/consensus pair
    #[error("Invalid input: {reason}")]
    InputShape {
        /// Explanation of what is wrong with the inputs
        reason: String,
    },

    /// Invalid chunk or well filter configuration
    #[error("Invalid filter: {reason}")]
    Filter {
        /// Explanation of why the configuration is invalid
        reason: String,
    },

    /// Invalid parameter value provided
    #[error("Invalid parameter '{parameter}': {reason}")]
    InvalidParameter {
        /// The parameter name
        parameter: String,
        /// Explanation of why it's invalid
        reason: String,
    },

    /// A CIGAR contained an operation that cannot be rendered
    #[error("Malformed CIGAR: unsupported operation '{op}'")]
    MalformedCigar {
        /// The offending operation character
        op: char,
    },

    /// Underlying I/O error
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ZmwAlignError {
    /// Shorthand for an [`ZmwAlignError::InputShape`] error.
    pub fn input_shape(reason: impl Into<String>) -> Self {
        Self::InputShape { reason: reason.into() }
    }

    /// Shorthand for a [`ZmwAlignError::Filter`] error.
    pub fn filter(reason: impl Into<String>) -> Self {
        Self::Filter { reason: reason.into() }
    }
}
