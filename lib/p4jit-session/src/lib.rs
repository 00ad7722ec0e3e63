//! Device-side session management: connecting, enumerating candidate
//! ports, bounds-checked allocation tracking, and the chunked
//! memory/execute primitives everything else in the loader is built on.

mod allocation;
mod discovery;
mod error;
mod registry;

pub use allocation::{Allocation, AllocationTable};
pub use discovery::{auto_detect, auto_detect_default, candidate_ports, handshake, SUPPORTED_PROTOCOL_MAJOR};
pub use error::{DeviceError, Result};
pub use p4jit_proto::{caps, DeviceInfo, HeapInfo};
pub use p4jit_transport::{TransportError, DEFAULT_BAUD, DEFAULT_TIMEOUT};

use std::time::Duration;

use log::debug;
use p4jit_proto::CommandId;
use p4jit_transport::Transport;

/// Largest single `WRITE_MEM`/`READ_MEM` chunk we ask for, independent
/// of the device's negotiated max payload — mirrors the host runtime's
/// own chunk size so a single call never blocks the link for long.
pub const CHUNK_SIZE: usize = 64 * 1024 - 8;

/// A connected device: owns the framed transport, the allocation
/// table, and the registry lease that gets revoked if another session
/// opens the same port.
pub struct DeviceSession {
    port: String,
    transport: Transport<Box<dyn serialport::SerialPort>>,
    info: DeviceInfo,
    allocations: AllocationTable,
    lease: registry::ConnectionLease,
}

impl DeviceSession {
    /// Connects to a specific port path.
    pub fn connect(port: &str, baud: u32, timeout: Duration) -> Result<Self> {
        let (transport, info) = handshake(port, baud, timeout)?;
        let lease = registry::register(port);
        Ok(Self {
            port: port.to_string(),
            transport,
            info,
            allocations: AllocationTable::new(),
            lease,
        })
    }

    /// Connects using the default baud/timeout.
    pub fn connect_default(port: &str) -> Result<Self> {
        Self::connect(port, DEFAULT_BAUD, DEFAULT_TIMEOUT)
    }

    /// Probes every enumerated serial port and connects to the first
    /// that answers the handshake.
    pub fn connect_auto() -> Result<Self> {
        let (port, transport, info) = auto_detect_default()?;
        let lease = registry::register(&port);
        Ok(Self {
            port,
            transport,
            info,
            allocations: AllocationTable::new(),
            lease,
        })
    }

    pub fn info(&self) -> &DeviceInfo {
        &self.info
    }

    pub fn port(&self) -> &str {
        &self.port
    }

    fn check_alive(&self) -> Result<()> {
        if self.lease.is_alive() {
            Ok(())
        } else {
            Err(DeviceError::Transport(TransportError::Disconnected(
                std::io::Error::new(std::io::ErrorKind::NotConnected, "session superseded"),
            )))
        }
    }

    /// Requests a device allocation of at least `size` bytes satisfying
    /// `caps`, aligned to `alignment`.
    pub fn allocate(&mut self, size: u32, caps: u32, alignment: u32) -> Result<u32> {
        self.check_alive()?;
        let mut payload = Vec::with_capacity(12);
        payload.extend_from_slice(&size.to_le_bytes());
        payload.extend_from_slice(&caps.to_le_bytes());
        payload.extend_from_slice(&alignment.to_le_bytes());
        let (_, response) = self.transport.exchange(CommandId::Alloc, &payload)?;
        if response.len() < 4 {
            return Err(DeviceError::OutOfDeviceMemory { size, caps });
        }
        let addr = u32::from_le_bytes(response[0..4].try_into().unwrap());
        if addr == 0 {
            return Err(DeviceError::OutOfDeviceMemory { size, caps });
        }
        self.allocations.insert(Allocation {
            base: addr,
            size,
            caps,
        });
        debug!("allocated {size} bytes (caps {caps:#x}) at {addr:#010x}");
        Ok(addr)
    }

    /// Frees a previously returned allocation. Idempotent. The table
    /// record is dropped only after the device confirms the free, so a
    /// FREE failure leaves the allocation recorded as still live.
    pub fn free(&mut self, addr: u32) -> Result<()> {
        self.check_alive()?;
        let payload = addr.to_le_bytes();
        self.transport.exchange(CommandId::Free, &payload)?;
        self.allocations.release(addr)?;
        Ok(())
    }

    /// Writes `data` to `addr`, chunked to [`CHUNK_SIZE`] per frame.
    /// `skip_bounds` bypasses the allocation-table containment check,
    /// for callers (the marshaller's argument packing) that already
    /// know the address came straight back from `allocate`.
    pub fn write_memory(&mut self, addr: u32, data: &[u8], skip_bounds: bool) -> Result<()> {
        self.check_alive()?;
        if !skip_bounds {
            self.allocations.check_bounds(addr, data.len() as u32)?;
        }
        for (offset, chunk) in data.chunks(CHUNK_SIZE).enumerate() {
            let chunk_addr = addr + (offset * CHUNK_SIZE) as u32;
            let mut payload = Vec::with_capacity(4 + chunk.len());
            payload.extend_from_slice(&chunk_addr.to_le_bytes());
            payload.extend_from_slice(chunk);
            self.transport.exchange(CommandId::WriteMem, &payload)?;
        }
        Ok(())
    }

    /// Reads `len` bytes from `addr` in a single READ_MEM exchange.
    /// `len` is assumed to fit the device's payload budget; large
    /// reads are not chunked here — callers iterate themselves.
    pub fn read_memory(&mut self, addr: u32, len: u32, skip_bounds: bool) -> Result<Vec<u8>> {
        self.check_alive()?;
        if !skip_bounds {
            self.allocations.check_bounds(addr, len)?;
        }
        let mut payload = Vec::with_capacity(8);
        payload.extend_from_slice(&addr.to_le_bytes());
        payload.extend_from_slice(&len.to_le_bytes());
        let (_, bytes) = self.transport.exchange(CommandId::ReadMem, &payload)?;
        Ok(bytes)
    }

    /// Triggers execution at `addr`, returning the device's 32-bit
    /// return slot verbatim (callers interpret it per the function's
    /// return type).
    pub fn execute(&mut self, addr: u32) -> Result<u32> {
        self.check_alive()?;
        self.allocations.check_bounds(addr, 0)?;
        let payload = addr.to_le_bytes();
        let (_, response) = self.transport.exchange(CommandId::Exec, &payload)?;
        if response.len() < 4 {
            return Ok(0);
        }
        Ok(u32::from_le_bytes(response[0..4].try_into().unwrap()))
    }

    pub fn heap_info(&mut self) -> Result<HeapInfo> {
        self.check_alive()?;
        let (_, response) = self.transport.exchange(CommandId::HeapInfo, &[])?;
        HeapInfo::parse(&response).ok_or_else(|| {
            DeviceError::Transport(TransportError::PayloadTooLarge {
                len: response.len(),
                max: 16,
            })
        })
    }

    pub fn live_allocation_count(&self) -> usize {
        self.allocations.live_count()
    }
}

impl Drop for DeviceSession {
    fn drop(&mut self) {
        registry::unregister(&self.port, &self.lease);
    }
}
