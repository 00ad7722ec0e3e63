use thiserror::Error;

#[derive(Debug, Error)]
pub enum MarshalError {
    #[error("expected {expected} arguments, got {got}")]
    ArityMismatch { expected: usize, got: usize },

    #[error("argument {index} ({name}): expected a contiguous array for pointer parameter of type {expected_ctype:?}")]
    NotAnArray { index: usize, name: String, expected_ctype: String },

    #[error("argument {index} ({name}): array dtype does not match parameter type {expected_ctype} (array element is {got_width} bytes wide, expected {expected_width})")]
    TypeMismatch {
        index: usize,
        name: String,
        expected_ctype: String,
        got_width: usize,
        expected_width: usize,
    },

    #[error("argument {index} ({name}): expected a scalar value for a by-value parameter")]
    NotAScalar { index: usize, name: String },

    #[error(transparent)]
    Device(#[from] p4jit_session::DeviceError),
}

pub type Result<T> = std::result::Result<T, MarshalError>;
