use thiserror::Error;

/// Failure reported by a [`crate::driver::ShaderDriver`] implementation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("shader driver error: {message}")]
pub struct DriverError {
    pub message: String,
}

impl DriverError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ShaderError {
    #[error("cannot {action}: shader code is frozen")]
    Frozen { action: &'static str },
    #[error("cannot {action}: shader code is not frozen")]
    NotFrozen { action: &'static str },
    #[error("shader code has been disposed")]
    Disposed,
    #[error("constant buffer layout builder was already finalized")]
    BuilderFinalized,
    #[error("'{name}' is already defined")]
    DuplicateDefinition { name: String },
    #[error("incompatible operands: {0}")]
    IncompatibleOperands(String),
    #[error("out of range: {0}")]
    OutOfRange(String),
    #[error("parameter '{name}' is missing or invalid: expected {expected}, found {actual}")]
    MissingOrInvalidParameter {
        name: String,
        expected: String,
        actual: String,
    },
    #[error("unsupported operation: {0}")]
    Unsupported(String),
    #[error("invalid pin binding for '{slot}': {reason}")]
    InvalidPin { slot: String, reason: String },
    #[error("invalid shader graph: {0}")]
    InvalidGraph(String),
    #[error("invalid control flow: {0}")]
    InvalidControlFlow(String),
    #[error("fixed parameters belong to a different shader code")]
    ForeignParameters,
    #[error(transparent)]
    Driver(#[from] DriverError),
}

impl ShaderError {
    /// Errors raised when mutating something that no longer accepts mutation.
    pub fn is_structural_mutation(&self) -> bool {
        matches!(
            self,
            Self::Frozen { .. } | Self::NotFrozen { .. } | Self::Disposed | Self::BuilderFinalized
        )
    }

    pub(crate) fn incompatible(msg: impl Into<String>) -> Self {
        Self::IncompatibleOperands(msg.into())
    }

    pub(crate) fn missing(
        name: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self::MissingOrInvalidParameter {
            name: name.into(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }
}

pub type Result<T, E = ShaderError> = std::result::Result<T, E>;
