use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Build(#[from] p4jit_build::BuildError),

    #[error(transparent)]
    Device(#[from] p4jit_session::DeviceError),

    #[error(transparent)]
    Marshal(#[from] p4jit_marshal::MarshalError),

    #[error("pass-2 artifact grew by {grew} bytes, more than the {margin}-byte safety margin reserved on the code allocation")]
    SafetyMarginExceeded { grew: u32, margin: u32 },

    #[error("this function's handle was already released")]
    FunctionReleased,
}

pub type Result<T> = std::result::Result<T, RuntimeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn safety_margin_exceeded_names_both_numbers() {
        let err = RuntimeError::SafetyMarginExceeded {
            grew: 96,
            margin: 64,
        };
        let message = err.to_string();
        assert!(message.contains("96"));
        assert!(message.contains("64"));
    }
}
