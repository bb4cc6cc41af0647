//! SAX (shift-add-xor) hash used to place autonomous cells.

use crate::core::constants::{SAX_H0, SAX_L_BIT, SAX_R_BIT};

/// Parameters of the SAX hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SaxParams {
    /// Initial hash value.
    pub h0: u16,
    /// Left shift applied per byte.
    pub l_bit: u32,
    /// Right shift applied per byte.
    pub r_bit: u32,
}

impl Default for SaxParams {
    fn default() -> Self {
        Self {
            h0: SAX_H0,
            l_bit: SAX_L_BIT,
            r_bit: SAX_R_BIT,
        }
    }
}

impl SaxParams {
    /// Hash `input` into `0..table_size` with these parameters.
    pub fn hash(&self, table_size: u16, input: &[u8]) -> u16 {
        sax(table_size, input, self.h0, self.l_bit, self.r_bit)
    }
}

/// SAX hash of `input`, reduced modulo `table_size`.
///
/// Each byte `c` updates the state as `h ^= (h << l) + (h >> r) + c` in
/// wrapping 16-bit arithmetic. A `table_size` of zero yields zero.
pub fn sax(table_size: u16, input: &[u8], h0: u16, l_bit: u32, r_bit: u32) -> u16 {
    let h = input.iter().fold(h0, |h, &c| {
        h ^ h
            .wrapping_shl(l_bit)
            .wrapping_add(h.wrapping_shr(r_bit))
            .wrapping_add(u16::from(c))
    });
    if table_size == 0 { 0 } else { h % table_size }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(hex_str: &str) -> Vec<u8> {
        hex::decode(hex_str).unwrap()
    }

    #[test]
    fn test_sax_reference_vectors() {
        let p = SaxParams::default();
        let eui = addr("00124b00060d9ed3");
        assert_eq!(p.hash(u16::MAX, &eui), 3480);
        assert_eq!(p.hash(100, &eui), 80);
        assert_eq!(p.hash(16, &eui), 8);

        let seq = addr("0102030405060708");
        assert_eq!(p.hash(u16::MAX, &seq), 185);
        assert_eq!(p.hash(100, &seq), 85);
        assert_eq!(p.hash(16, &seq), 9);

        let ones = addr("ffffffffffffffff");
        assert_eq!(p.hash(u16::MAX, &ones), 49732);
        assert_eq!(p.hash(100, &ones), 32);
        assert_eq!(p.hash(8, &ones), 4);
    }

    #[test]
    fn test_sax_small_node_ids() {
        let p = SaxParams::default();
        assert_eq!(p.hash(100, &addr("0000000000000001")), 1);
        assert_eq!(p.hash(16, &addr("0000000000000002")), 2);
        assert_eq!(p.hash(100, &addr("0000000000000101")), 3);
    }

    #[test]
    fn test_sax_deterministic() {
        let input = addr("00124b00060d9ed3");
        let a = sax(101, &input, 0, 0, 1);
        let b = sax(101, &input, 0, 0, 1);
        assert_eq!(a, b);
        assert!(a < 101);
    }

    #[test]
    fn test_sax_zero_table() {
        assert_eq!(sax(0, b"abc", 0, 0, 1), 0);
    }

    #[test]
    fn test_sax_h0_changes_result() {
        let input = addr("0102030405060708");
        assert_ne!(sax(u16::MAX, &input, 0, 0, 1), sax(u16::MAX, &input, 7, 0, 1));
    }
}
