use std::time::Duration;

use log::info;
use p4jit_proto::{CommandId, DeviceInfo};
use p4jit_transport::{Transport, DEFAULT_BAUD, DEFAULT_TIMEOUT};

use crate::error::{DeviceError, Result};

/// Protocol major version this host build understands. A device
/// reporting a different major version is rejected outright rather
/// than negotiated with, since the frame layout itself may differ.
pub const SUPPORTED_PROTOCOL_MAJOR: u8 = 1;

/// Lists serial ports that look like they could be the device, in the
/// order `serialport` enumerates them. Callers needing a specific port
/// should skip this and connect directly.
pub fn candidate_ports() -> Result<Vec<String>> {
    let ports = serialport::available_ports().map_err(|source| {
        DeviceError::Transport(p4jit_transport::TransportError::Open {
            path: "(enumeration)".to_string(),
            source,
        })
    })?;
    Ok(ports.into_iter().map(|p| p.port_name).collect())
}

/// Opens `port`, exchanges `PING` and `GET_INFO`, and checks the
/// reported protocol major version, returning the live transport and
/// device info on success so the caller can build a [`crate::DeviceSession`].
pub fn handshake(
    port: &str,
    baud: u32,
    timeout: Duration,
) -> Result<(Transport<Box<dyn serialport::SerialPort>>, DeviceInfo)> {
    let mut transport = Transport::open(port, baud, timeout)?;
    transport.exchange(CommandId::Ping, &[])?;
    let (_, payload) = transport.exchange(CommandId::GetInfo, &[])?;
    let info = DeviceInfo::parse(&payload).ok_or_else(|| {
        DeviceError::Transport(p4jit_transport::TransportError::PayloadTooLarge {
            len: payload.len(),
            max: p4jit_proto::DEVICE_INFO_WIRE_LEN,
        })
    })?;
    if info.protocol_major != SUPPORTED_PROTOCOL_MAJOR {
        return Err(DeviceError::IncompatibleProtocol {
            required_major: SUPPORTED_PROTOCOL_MAJOR,
            found_major: info.protocol_major,
            found_minor: info.protocol_minor,
        });
    }
    transport.set_max_payload(info.max_payload as usize);
    info!(
        "connected to {port}: protocol {}.{}, firmware {}",
        info.protocol_major, info.protocol_minor, info.firmware_version
    );
    Ok((transport, info))
}

/// Tries every candidate port in turn and returns the first that
/// answers the handshake, for callers that didn't pin a specific path.
pub fn auto_detect(
    baud: u32,
    timeout: Duration,
) -> Result<(String, Transport<Box<dyn serialport::SerialPort>>, DeviceInfo)> {
    for port in candidate_ports()? {
        if let Ok((transport, info)) = handshake(&port, baud, timeout) {
            return Ok((port, transport, info));
        }
    }
    Err(DeviceError::NoMatchingPort)
}

/// [`auto_detect`] with the transport's default baud rate and timeout.
pub fn auto_detect_default() -> Result<(String, Transport<Box<dyn serialport::SerialPort>>, DeviceInfo)> {
    auto_detect(DEFAULT_BAUD, DEFAULT_TIMEOUT)
}
