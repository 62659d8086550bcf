use crate::error::{Error, Result};

/// UBX [Fletcher-16 checksum](https://en.wikipedia.org/wiki/Fletcher%27s_checksum) calculator supporting both streaming and single-shot validation
#[derive(Debug, Default, Clone, Copy)]
pub struct UbxChecksum {
    ck_a: u8,
    ck_b: u8,
}

impl UbxChecksum {
    pub const fn new() -> Self {
        Self { ck_a: 0, ck_b: 0 }
    }

    /// Update checksum with new bytes
    pub const fn update(&mut self, bytes: &[u8]) {
        let mut i = 0;
        while i < bytes.len() {
            self.update_byte(bytes[i]);
            i += 1;
        }
    }

    /// Update checksum with a single byte
    pub const fn update_byte(&mut self, byte: u8) {
        self.ck_a = self.ck_a.wrapping_add(byte);
        self.ck_b = self.ck_b.wrapping_add(self.ck_a);
    }

    /// Get the current checksum result
    pub const fn result(self) -> (u8, u8) {
        (self.ck_a, self.ck_b)
    }

    pub const fn is_valid(&self, received_ck_a: u8, received_ck_b: u8) -> bool {
        self.ck_a == received_ck_a && self.ck_b == received_ck_b
    }

    /// Validate checksum and return result
    pub fn validate(self, received_ck_a: u8, received_ck_b: u8) -> Result<()> {
        if self.is_valid(received_ck_a, received_ck_b) {
            return Ok(());
        }
        let (calculated_ck_a, calculated_ck_b) = self.result();
        Err(Error::InvalidChecksum {
            expect: u16::from_le_bytes([received_ck_a, received_ck_b]),
            got: u16::from_le_bytes([calculated_ck_a, calculated_ck_b]),
        })
    }
}

/// Single-shot UBX checksum over `bytes` (class through end of body).
pub const fn ubx_checksum(bytes: &[u8]) -> (u8, u8) {
    let mut calc = UbxChecksum::new();
    calc.update(bytes);
    calc.result()
}

/// NMEA checksum: XOR of every character between `$` and `*`.
pub fn nmea_checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0, |acc, b| acc ^ b)
}
