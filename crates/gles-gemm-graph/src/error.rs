//! Error types for function configuration.

use gles_gemm::{DataType, GemmError};
use thiserror::Error;

/// Errors reported while configuring a backend function.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BackendError {
    /// A kernel rejected its operands.
    #[error(transparent)]
    Kernel(#[from] GemmError),

    /// Operand shapes do not line up.
    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),

    /// The function has no implementation for this data type.
    #[error("Unsupported data type: {0}")]
    UnsupportedDataType(DataType),

    /// Layer parameters outside what the function supports.
    #[error("Unsupported configuration: {0}")]
    Unsupported(String),
}

/// Result type for backend functions.
pub type Result<T> = std::result::Result<T, BackendError>;
