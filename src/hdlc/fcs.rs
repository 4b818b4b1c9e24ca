//! Frame Check Sequence - RFC 1662 appendix C
//!
//! Reflected CRC-16 with polynomial 0x8408, table-driven. The FCS runs over
//! address, control, protocol and payload; the complemented result trails
//! the frame low byte first. A receiver folding the trailer into the
//! running FCS lands on the residue constant `FCS_GOOD`.

/// Initial FCS value
pub const FCS_INIT: u16 = 0xffff;

/// Residue of a frame whose trailing FCS is included in the computation
pub const FCS_GOOD: u16 = 0xf0b8;

const fn generate_fcstab() -> [u16; 256] {
    let mut table = [0u16; 256];
    let mut i = 0;
    while i < 256 {
        let mut v = i as u16;
        let mut j = 0;
        while j < 8 {
            v = (v >> 1) ^ (if v & 1 != 0 { 0x8408 } else { 0 });
            j += 1;
        }
        table[i] = v;
        i += 1;
    }
    table
}

const FCSTAB: [u16; 256] = generate_fcstab();

/// Running FCS accumulator.
#[derive(Debug, Clone, Copy)]
pub struct Fcs {
    value: u16,
}

impl Fcs {
    /// Start a new FCS at the standard initial value.
    pub fn new() -> Self {
        Self { value: FCS_INIT }
    }

    /// Fold one byte into the FCS.
    pub fn push(&mut self, byte: u8) {
        let key = ((self.value as u8) ^ byte) as usize;
        self.value = (self.value >> 8) ^ FCSTAB[key];
    }

    /// Fold a byte slice into the FCS.
    pub fn update(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.push(byte);
        }
    }

    /// Current accumulator value.
    pub fn value(&self) -> u16 {
        self.value
    }

    /// Complemented FCS trailer, low byte first as transmitted.
    pub fn trailer(&self) -> [u8; 2] {
        let fcs = !self.value;
        [fcs as u8, (fcs >> 8) as u8]
    }

    /// True when the trailing FCS bytes have been folded in and match.
    pub fn is_good(&self) -> bool {
        self.value == FCS_GOOD
    }
}

impl Default for Fcs {
    fn default() -> Self {
        Self::new()
    }
}

/// Compute the FCS of a complete byte slice.
pub fn fcs16(bytes: &[u8]) -> u16 {
    let mut fcs = Fcs::new();
    fcs.update(bytes);
    fcs.value()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Bit-at-a-time reference, independent of the lookup table.
    fn fcs16_reference(bytes: &[u8]) -> u16 {
        let mut fcs = FCS_INIT;
        for &byte in bytes {
            fcs ^= byte as u16;
            for _ in 0..8 {
                fcs = (fcs >> 1) ^ (if fcs & 1 != 0 { 0x8408 } else { 0 });
            }
        }
        fcs
    }

    #[test]
    fn test_table_matches_bitwise_reference() {
        let samples: [&[u8]; 5] = [
            b"",
            b"\x00",
            b"123456789",
            b"\xff\x03\xc0\x21\x01\x01\x00\x04",
            &[0x7e, 0x7d, 0x20, 0x00, 0xff],
        ];
        for sample in samples {
            assert_eq!(fcs16(sample), fcs16_reference(sample));
        }
    }

    #[test]
    fn test_good_residue_after_trailer() {
        let payload = b"\xff\x03\xc0\x21\x05\x02\x00\x04";
        let mut fcs = Fcs::new();
        fcs.update(payload);
        let trailer = fcs.trailer();

        let mut check = Fcs::new();
        check.update(payload);
        check.update(&trailer);
        assert!(check.is_good());
    }

    #[test]
    fn test_corruption_breaks_residue() {
        let payload = b"hello fcs";
        let mut fcs = Fcs::new();
        fcs.update(payload);
        let trailer = fcs.trailer();

        let mut check = Fcs::new();
        check.update(b"hellp fcs");
        check.update(&trailer);
        assert!(!check.is_good());
    }
}
