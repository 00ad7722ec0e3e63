//! Framed, checksummed request/response exchange over a byte stream.
//!
//! [`Transport`] is generic over anything that is [`Read`] + [`Write`]
//! so the framing logic can be exercised without a physical device;
//! [`Transport::open`] wires it up to a real `serialport` handle.

use std::io::{self, Read, Write};
use std::time::Duration;

use log::{debug, trace, warn};
use p4jit_proto::{checksum, encode_frame, CommandId, FLAGS_ERROR, FLAGS_OK, MAGIC};
use thiserror::Error;

pub const DEFAULT_BAUD: u32 = 921_600;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(2_000);

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to open serial port {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: serialport::Error,
    },
    #[error("operation timed out waiting for a response")]
    Timeout,
    #[error("device disconnected or serial I/O failed: {0}")]
    Disconnected(io::Error),
    #[error("expected frame magic {expected:02x?}, found {found:02x?}")]
    BadMagic { expected: [u8; 2], found: [u8; 2] },
    #[error("expected response to command {expected:#04x}, got {found:#04x}")]
    CommandMismatch { expected: u8, found: u8 },
    #[error("checksum mismatch: computed {expected:#06x}, frame carried {found:#06x}")]
    ChecksumMismatch { expected: u16, found: u16 },
    #[error("device reported error code {0:#x}")]
    DeviceError(u32),
    #[error("response payload of {len} bytes exceeds negotiated max payload {max}")]
    PayloadTooLarge { len: usize, max: usize },
}

/// One request/response round trip over a framed byte stream.
///
/// `T` is almost always a `Box<dyn serialport::SerialPort>` in
/// production; tests use an in-memory double instead.
pub struct Transport<T> {
    io: T,
    max_payload: usize,
}

impl Transport<Box<dyn serialport::SerialPort>> {
    /// Opens `path` at `baud` with `timeout` applied to every read.
    pub fn open(path: &str, baud: u32, timeout: Duration) -> Result<Self, TransportError> {
        let port = serialport::new(path, baud)
            .timeout(timeout)
            .open()
            .map_err(|source| TransportError::Open {
                path: path.to_string(),
                source,
            })?;
        debug!("opened {path} at {baud} baud");
        Ok(Self {
            io: port,
            max_payload: p4jit_proto::DEFAULT_MAX_PAYLOAD as usize,
        })
    }
}

impl<T: Read + Write> Transport<T> {
    /// Wraps an already-open stream. Used by tests and by callers that
    /// manage the serial handle themselves.
    pub fn new(io: T) -> Self {
        Self {
            io,
            max_payload: p4jit_proto::DEFAULT_MAX_PAYLOAD as usize,
        }
    }

    /// Narrows the accepted response payload size to whatever the
    /// device reported in `GET_INFO`.
    pub fn set_max_payload(&mut self, max_payload: usize) {
        self.max_payload = max_payload;
    }

    /// Sends `command` with `payload` and returns the response's flags
    /// and payload once a matching, checksum-valid frame arrives.
    pub fn exchange(
        &mut self,
        command: CommandId,
        payload: &[u8],
    ) -> Result<(u8, Vec<u8>), TransportError> {
        let frame = encode_frame(command, FLAGS_OK, payload);
        trace!("-> {command:?} ({} byte payload)", payload.len());
        self.io
            .write_all(&frame)
            .map_err(TransportError::Disconnected)?;
        self.io.flush().map_err(TransportError::Disconnected)?;
        self.read_frame(command)
    }

    fn read_frame(&mut self, expected: CommandId) -> Result<(u8, Vec<u8>), TransportError> {
        let mut magic = [0u8; 2];
        self.read_exact_mapped(&mut magic)?;
        if magic != MAGIC {
            warn!("bad frame magic {magic:02x?}");
            return Err(TransportError::BadMagic {
                expected: MAGIC,
                found: magic,
            });
        }

        let mut header = [0u8; 6];
        self.read_exact_mapped(&mut header)?;
        let cmd_byte = header[0];
        let flags = header[1];
        let len = u32::from_le_bytes(header[2..6].try_into().unwrap()) as usize;
        if len > self.max_payload {
            return Err(TransportError::PayloadTooLarge {
                len,
                max: self.max_payload,
            });
        }

        let mut payload = vec![0u8; len];
        self.read_exact_mapped(&mut payload)?;

        let mut cksum_bytes = [0u8; 2];
        self.read_exact_mapped(&mut cksum_bytes)?;
        let found_cksum = u16::from_le_bytes(cksum_bytes);

        let mut region = Vec::with_capacity(2 + 6 + len);
        region.extend_from_slice(&MAGIC);
        region.extend_from_slice(&header);
        region.extend_from_slice(&payload);
        let expected_cksum = checksum(&region);
        if expected_cksum != found_cksum {
            return Err(TransportError::ChecksumMismatch {
                expected: expected_cksum,
                found: found_cksum,
            });
        }

        if cmd_byte != expected as u8 {
            return Err(TransportError::CommandMismatch {
                expected: expected as u8,
                found: cmd_byte,
            });
        }

        if flags & FLAGS_ERROR != 0 {
            let code = if payload.len() >= 4 {
                u32::from_le_bytes(payload[0..4].try_into().unwrap())
            } else {
                0
            };
            return Err(TransportError::DeviceError(code));
        }

        trace!("<- {expected:?} ({} byte payload)", payload.len());
        Ok((flags, payload))
    }

    fn read_exact_mapped(&mut self, buf: &mut [u8]) -> Result<(), TransportError> {
        self.io.read_exact(buf).map_err(|e| {
            if e.kind() == io::ErrorKind::TimedOut || e.kind() == io::ErrorKind::WouldBlock {
                TransportError::Timeout
            } else {
                TransportError::Disconnected(e)
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::io::ErrorKind;

    use proptest::prelude::*;

    /// In-memory stand-in for a serial port: reads come from a
    /// pre-loaded queue, writes land in a buffer the test can inspect.
    struct FakeLink {
        inbound: VecDeque<u8>,
        outbound: Vec<u8>,
    }

    impl FakeLink {
        fn with_inbound(bytes: Vec<u8>) -> Self {
            Self {
                inbound: bytes.into(),
                outbound: Vec::new(),
            }
        }
    }

    impl Read for FakeLink {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.inbound.is_empty() {
                return Err(io::Error::new(ErrorKind::TimedOut, "no more bytes"));
            }
            let mut n = 0;
            while n < buf.len() {
                match self.inbound.pop_front() {
                    Some(b) => {
                        buf[n] = b;
                        n += 1;
                    }
                    None => break,
                }
            }
            Ok(n)
        }
    }

    impl Write for FakeLink {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.outbound.extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn exchange_round_trip_succeeds() {
        let response = encode_frame(CommandId::Ping, FLAGS_OK, &[0xAB]);
        let link = FakeLink::with_inbound(response);
        let mut transport = Transport::new(link);
        let (flags, payload) = transport.exchange(CommandId::Ping, &[]).unwrap();
        assert_eq!(flags, FLAGS_OK);
        assert_eq!(payload, vec![0xAB]);
    }

    #[test]
    fn exchange_detects_command_mismatch() {
        let response = encode_frame(CommandId::GetInfo, FLAGS_OK, &[]);
        let link = FakeLink::with_inbound(response);
        let mut transport = Transport::new(link);
        let err = transport.exchange(CommandId::Ping, &[]).unwrap_err();
        assert!(matches!(err, TransportError::CommandMismatch { .. }));
    }

    #[test]
    fn exchange_detects_checksum_mismatch() {
        let mut response = encode_frame(CommandId::Ping, FLAGS_OK, &[1, 2, 3]);
        let last = response.len() - 1;
        response[last] ^= 0xFF;
        let link = FakeLink::with_inbound(response);
        let mut transport = Transport::new(link);
        let err = transport.exchange(CommandId::Ping, &[]).unwrap_err();
        assert!(matches!(err, TransportError::ChecksumMismatch { .. }));
    }

    #[test]
    fn exchange_detects_bad_magic() {
        let link = FakeLink::with_inbound(vec![0x00, 0x00, 0x01, 0x00, 0, 0, 0, 0, 0, 0]);
        let mut transport = Transport::new(link);
        let err = transport.exchange(CommandId::Ping, &[]).unwrap_err();
        assert!(matches!(err, TransportError::BadMagic { .. }));
    }

    #[test]
    fn exchange_surfaces_device_error_flag() {
        let code: u32 = 7;
        let mut payload = code.to_le_bytes().to_vec();
        payload.extend_from_slice(b"oops");
        let response = encode_frame(CommandId::Alloc, FLAGS_ERROR, &payload);
        let link = FakeLink::with_inbound(response);
        let mut transport = Transport::new(link);
        let err = transport.exchange(CommandId::Alloc, &[]).unwrap_err();
        assert!(matches!(err, TransportError::DeviceError(7)));
    }

    #[test]
    fn exchange_times_out_on_short_read() {
        let link = FakeLink::with_inbound(vec![0xA5]);
        let mut transport = Transport::new(link);
        let err = transport.exchange(CommandId::Ping, &[]).unwrap_err();
        assert!(matches!(err, TransportError::Timeout));
    }

    #[test]
    fn exchange_rejects_oversized_payload() {
        let mut response = encode_frame(CommandId::ReadMem, FLAGS_OK, &[]);
        response[4..8].copy_from_slice(&1_000_000u32.to_le_bytes());
        let link = FakeLink::with_inbound(response);
        let mut transport = Transport::new(link);
        transport.set_max_payload(4096);
        let err = transport.exchange(CommandId::ReadMem, &[]).unwrap_err();
        assert!(matches!(err, TransportError::PayloadTooLarge { .. }));
    }

    proptest! {
        /// Any payload round-trips through `exchange` unchanged, and a
        /// one-bit flip anywhere in the frame is always caught by the
        /// checksum before the payload reaches the caller.
        #[test]
        fn framing_round_trips_any_payload(payload in proptest::collection::vec(any::<u8>(), 0..256)) {
            let response = encode_frame(CommandId::ReadMem, FLAGS_OK, &payload);
            let link = FakeLink::with_inbound(response);
            let mut transport = Transport::new(link);
            let (flags, got) = transport.exchange(CommandId::ReadMem, &[]).unwrap();
            prop_assert_eq!(flags, FLAGS_OK);
            prop_assert_eq!(got, payload);
        }

        #[test]
        fn framing_detects_any_single_bit_flip(
            payload in proptest::collection::vec(any::<u8>(), 1..64),
            flip_byte in 0usize..64,
            flip_bit in 0u8..8,
        ) {
            let mut response = encode_frame(CommandId::ReadMem, FLAGS_OK, &payload);
            let idx = flip_byte % response.len();
            response[idx] ^= 1 << flip_bit;
            let link = FakeLink::with_inbound(response);
            let mut transport = Transport::new(link);
            prop_assert!(transport.exchange(CommandId::ReadMem, &[]).is_err());
        }
    }
}
