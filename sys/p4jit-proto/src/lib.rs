//! Wire protocol definitions shared between the transport and the
//! device session, and the C-type model shared between the signature
//! extractor, the metadata builder, and the argument marshaller.
//!
//! This crate has no I/O of its own: it only encodes/decodes bytes and
//! defines the types both ends of the link agree on.

use serde::{Deserialize, Serialize};

mod typemap;
pub use typemap::TypeMap;

/// Two-byte tag that opens every frame, host-to-device and back.
pub const MAGIC: [u8; 2] = [0xA5, 0x5A];

/// Largest payload chunk we will ever ask the device to swallow in one
/// `WRITE_MEM`, absent a smaller figure from `DeviceInfo::max_payload`.
pub const DEFAULT_MAX_PAYLOAD: u32 = 64 * 1024 - 8;

/// Flags byte values used in response frames.
pub const FLAGS_OK: u8 = 0x00;
pub const FLAGS_ERROR: u8 = 0x02;

/// The command set in spec.md §4.1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CommandId {
    Ping = 0x01,
    GetInfo = 0x02,
    Alloc = 0x10,
    Free = 0x11,
    WriteMem = 0x20,
    ReadMem = 0x21,
    Exec = 0x30,
    HeapInfo = 0x40,
}

impl CommandId {
    pub fn from_u8(v: u8) -> Option<Self> {
        Some(match v {
            0x01 => Self::Ping,
            0x02 => Self::GetInfo,
            0x10 => Self::Alloc,
            0x11 => Self::Free,
            0x20 => Self::WriteMem,
            0x21 => Self::ReadMem,
            0x30 => Self::Exec,
            0x40 => Self::HeapInfo,
            _ => return None,
        })
    }
}

/// Computes the 16-bit truncated unsigned byte sum used as the frame
/// checksum (spec.md §4.1 and §6: "sum-mod-2^16 of every pre-checksum
/// byte of the frame").
pub fn checksum(bytes: &[u8]) -> u16 {
    let mut sum: u32 = 0;
    for &b in bytes {
        sum = sum.wrapping_add(b as u32);
    }
    (sum & 0xFFFF) as u16
}

/// Builds the bytes of one frame: magic, header, payload, checksum.
///
/// `flags` is normally [`FLAGS_OK`]; callers constructing request
/// frames never need anything else, since only the device emits
/// [`FLAGS_ERROR`].
pub fn encode_frame(command_id: CommandId, flags: u8, payload: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(2 + 6 + payload.len() + 2);
    frame.extend_from_slice(&MAGIC);
    frame.push(command_id as u8);
    frame.push(flags);
    frame.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    frame.extend_from_slice(payload);
    let cksum = checksum(&frame);
    frame.extend_from_slice(&cksum.to_le_bytes());
    frame
}

/// Device information returned by `GET_INFO`, fetched once per connect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub protocol_major: u8,
    pub protocol_minor: u8,
    pub max_payload: u32,
    pub cache_line: u32,
    pub max_allocations: u32,
    pub firmware_version: String,
}

/// Wire size of the `GET_INFO` response payload.
pub const DEVICE_INFO_WIRE_LEN: usize = 32;

impl DeviceInfo {
    /// Parses the `GET_INFO` response payload (spec.md §4.1 table).
    ///
    /// Layout: proto_major(1), proto_minor(1), reserved(2),
    /// max_payload(4), cache_line(4), max_allocations(4),
    /// firmware_version(16, NUL-padded UTF-8).
    pub fn parse(payload: &[u8]) -> Option<Self> {
        if payload.len() < DEVICE_INFO_WIRE_LEN {
            return None;
        }
        let protocol_major = payload[0];
        let protocol_minor = payload[1];
        let max_payload = u32::from_le_bytes(payload[4..8].try_into().ok()?);
        let cache_line = u32::from_le_bytes(payload[8..12].try_into().ok()?);
        let max_allocations = u32::from_le_bytes(payload[12..16].try_into().ok()?);
        let raw_version = &payload[16..32];
        let end = raw_version.iter().position(|&b| b == 0).unwrap_or(raw_version.len());
        let firmware_version =
            String::from_utf8_lossy(&raw_version[..end]).into_owned();
        Some(Self {
            protocol_major,
            protocol_minor,
            max_payload,
            cache_line,
            max_allocations,
            firmware_version,
        })
    }
}

/// Heap statistics returned by `HEAP_INFO`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeapInfo {
    pub free_spiram: u32,
    pub total_spiram: u32,
    pub free_internal: u32,
    pub total_internal: u32,
}

impl HeapInfo {
    pub fn parse(payload: &[u8]) -> Option<Self> {
        if payload.len() < 16 {
            return None;
        }
        Some(Self {
            free_spiram: u32::from_le_bytes(payload[0..4].try_into().ok()?),
            total_spiram: u32::from_le_bytes(payload[4..8].try_into().ok()?),
            free_internal: u32::from_le_bytes(payload[8..12].try_into().ok()?),
            total_internal: u32::from_le_bytes(payload[12..16].try_into().ok()?),
        })
    }
}

/// Memory capability bitmask, mirroring the device firmware's
/// `MALLOC_CAP_*` constants (see `original_source/p4_jit/memory_caps.py`).
pub mod caps {
    pub const EXEC: u32 = 1 << 0;
    pub const BIT32: u32 = 1 << 1;
    pub const BIT8: u32 = 1 << 2;
    pub const DMA: u32 = 1 << 3;
    pub const SPIRAM: u32 = 1 << 10;
    pub const INTERNAL: u32 = 1 << 11;
    pub const DEFAULT: u32 = 1 << 12;
    pub const CACHE_ALIGNED: u32 = 1 << 19;

    /// Default caps for a marshalled array with no explicit override:
    /// SPI-RAM, byte-addressable.
    pub const DEFAULT_ARRAY: u32 = SPIRAM | BIT8;
}

/// Closed variant over the C-like types the signature extractor,
/// metadata builder, and marshaller all need to agree on (Design
/// Notes §9 redesign: "runtime reflection over C types -> explicit
/// Signature + type map").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CType {
    Void,
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
    F32,
    F64,
    Pointer(Box<CType>),
}

impl CType {
    /// Number of 32-bit slots this type occupies when passed by value
    /// or returned (pointers and 32-bit scalars: 1; 64-bit scalars: 2).
    pub fn slot_count(&self) -> u32 {
        match self {
            CType::I64 | CType::U64 | CType::F64 => 2,
            _ => 1,
        }
    }

    /// Byte width of the underlying element (used for dtype
    /// compatibility checks on pointer arguments).
    pub fn byte_width(&self) -> usize {
        match self {
            CType::Void => 0,
            CType::I8 | CType::U8 => 1,
            CType::I16 | CType::U16 => 2,
            CType::I32 | CType::U32 | CType::F32 => 4,
            CType::I64 | CType::U64 | CType::F64 => 8,
            CType::Pointer(_) => 4,
        }
    }

    pub fn is_pointer(&self) -> bool {
        matches!(self, CType::Pointer(_))
    }
}

/// How a parameter's slot is used when the argument marshaller packs
/// and later unpacks it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParamCategory {
    /// Passed by value: the raw bits go straight into its slot(s).
    Value,
    /// A pointer the marshaller must back with a device allocation
    /// before the call and may copy out of after it.
    Pointer,
}

/// One parameter of an extracted function signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub ty: CType,
    pub category: ParamCategory,
}

/// The extracted shape of a target function: enough to synthesize a
/// wrapper and to marshal arguments against it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    pub name: String,
    pub return_type: CType,
    pub parameters: Vec<Parameter>,
}

impl Signature {
    /// Total argument slots the parameters occupy, not counting the
    /// return slot(s).
    pub fn argument_slot_count(&self) -> u32 {
        self.parameters.iter().map(|p| p.ty.slot_count()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checksum_is_byte_sum_mod_65536() {
        let bytes = [0xFFu8; 300];
        let expected = (0xFFu32 * 300) & 0xFFFF;
        assert_eq!(checksum(&bytes) as u32, expected);
    }

    #[test]
    fn encode_frame_layout() {
        let frame = encode_frame(CommandId::Ping, FLAGS_OK, &[1, 2, 3]);
        assert_eq!(&frame[0..2], &MAGIC);
        assert_eq!(frame[2], CommandId::Ping as u8);
        assert_eq!(frame[3], FLAGS_OK);
        assert_eq!(&frame[4..8], &3u32.to_le_bytes());
        assert_eq!(&frame[8..11], &[1, 2, 3]);
        let cksum = u16::from_le_bytes(frame[11..13].try_into().unwrap());
        assert_eq!(cksum, checksum(&frame[..11]));
    }

    #[test]
    fn device_info_round_trip_fields() {
        let mut payload = vec![0u8; 32];
        payload[0] = 1;
        payload[1] = 2;
        payload[4..8].copy_from_slice(&4096u32.to_le_bytes());
        payload[8..12].copy_from_slice(&32u32.to_le_bytes());
        payload[12..16].copy_from_slice(&64u32.to_le_bytes());
        payload[16..20].copy_from_slice(b"1.2\0");
        let info = DeviceInfo::parse(&payload).unwrap();
        assert_eq!(info.protocol_major, 1);
        assert_eq!(info.protocol_minor, 2);
        assert_eq!(info.max_payload, 4096);
        assert_eq!(info.cache_line, 32);
        assert_eq!(info.max_allocations, 64);
        assert_eq!(info.firmware_version, "1.2");
    }

    #[test]
    fn slot_counts_match_spec() {
        assert_eq!(CType::I32.slot_count(), 1);
        assert_eq!(CType::Pointer(Box::new(CType::I8)).slot_count(), 1);
        assert_eq!(CType::I64.slot_count(), 2);
        assert_eq!(CType::F64.slot_count(), 2);
    }
}
