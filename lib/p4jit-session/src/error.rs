use p4jit_transport::TransportError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DeviceError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("device firmware speaks protocol {found_major}.{found_minor}, this host requires {required_major}.x")]
    IncompatibleProtocol {
        required_major: u8,
        found_major: u8,
        found_minor: u8,
    },

    #[error("device has no free memory satisfying the request (size={size}, caps={caps:#x})")]
    OutOfDeviceMemory { size: u32, caps: u32 },

    #[error("address {0:#010x} does not correspond to a live allocation")]
    UnknownAllocation(u32),

    #[error("access at {addr:#010x}, length {len}, falls outside allocation [{base:#010x}, {base_plus_size:#010x})")]
    BoundsViolation {
        addr: u32,
        len: u32,
        base: u32,
        base_plus_size: u32,
    },

    #[error("allocation {0:#010x} was already freed")]
    FunctionReleased(u32),

    #[error("no serial port matched the requested selector")]
    NoMatchingPort,
}

pub type Result<T> = std::result::Result<T, DeviceError>;
