//! Error types for kernel configuration.

use thiserror::Error;

use crate::types::DataType;

/// Errors reported while configuring a kernel.
///
/// Kernels validate their operands once, at configure time. Launching a
/// configured kernel cannot fail.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GemmError {
    /// Operand shapes do not line up.
    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),

    /// The kernel has no variant for this data type.
    #[error("Unsupported data type: {0}")]
    UnsupportedDataType(DataType),

    /// Two operands that must share a data type do not.
    #[error("Data type mismatch: {0} vs {1}")]
    DataTypeMismatch(DataType, DataType),

    /// Tuning parameters outside the supported range.
    #[error("Invalid kernel configuration: {0}")]
    InvalidConfig(String),
}

/// Result type for kernel configuration.
pub type Result<T> = std::result::Result<T, GemmError>;
