//! Conversions between host integers and the little-endian wire order used by
//! every multi-byte UBX field.
//!
//! The free functions act for the host this crate was compiled for. The same
//! conversions are available on [Endianness] so that a host of the opposite
//! byte order can be simulated.

/// Byte order of a host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endianness {
    Little,
    Big,
}

impl Endianness {
    pub const fn native() -> Self {
        if cfg!(target_endian = "little") {
            Self::Little
        } else {
            Self::Big
        }
    }

    pub const fn is_little(self) -> bool {
        matches!(self, Self::Little)
    }

    /// Converts `value` so that its in-memory representation on this host is
    /// in wire order: a no-op on a little-endian host, a byte swap otherwise.
    pub const fn encode_u16(self, value: u16) -> u16 {
        match self {
            Self::Little => value,
            Self::Big => value.swap_bytes(),
        }
    }

    pub const fn encode_u32(self, value: u32) -> u32 {
        match self {
            Self::Little => value,
            Self::Big => value.swap_bytes(),
        }
    }

    pub const fn encode_u64(self, value: u64) -> u64 {
        match self {
            Self::Little => value,
            Self::Big => value.swap_bytes(),
        }
    }

    /// In-memory bytes of `value` as laid out on this host.
    pub const fn memory_u16(self, value: u16) -> [u8; 2] {
        match self {
            Self::Little => value.to_le_bytes(),
            Self::Big => value.to_be_bytes(),
        }
    }

    pub const fn memory_u32(self, value: u32) -> [u8; 4] {
        match self {
            Self::Little => value.to_le_bytes(),
            Self::Big => value.to_be_bytes(),
        }
    }

    pub const fn memory_u64(self, value: u64) -> [u8; 8] {
        match self {
            Self::Little => value.to_le_bytes(),
            Self::Big => value.to_be_bytes(),
        }
    }
}

pub const fn is_little_endian() -> bool {
    Endianness::native().is_little()
}

/// Reads a little-endian `u16` from the start of `bytes`.
///
/// # Panics
///
/// Panics if `bytes` is shorter than 2 bytes.
pub fn decode_u16(bytes: &[u8]) -> u16 {
    u16::from_le_bytes([bytes[0], bytes[1]])
}

/// Reads a little-endian `u32` from the start of `bytes`.
///
/// # Panics
///
/// Panics if `bytes` is shorter than 4 bytes.
pub fn decode_u32(bytes: &[u8]) -> u32 {
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

/// Reads a little-endian `u64` from the start of `bytes`.
///
/// # Panics
///
/// Panics if `bytes` is shorter than 8 bytes.
pub fn decode_u64(bytes: &[u8]) -> u64 {
    let mut le = [0; 8];
    le.copy_from_slice(&bytes[..8]);
    u64::from_le_bytes(le)
}

pub const fn encode_u16(value: u16) -> u16 {
    Endianness::native().encode_u16(value)
}

pub const fn encode_u32(value: u32) -> u32 {
    Endianness::native().encode_u32(value)
}

pub const fn encode_u64(value: u64) -> u64 {
    Endianness::native().encode_u64(value)
}
