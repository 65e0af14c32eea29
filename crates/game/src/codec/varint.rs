//! Self-describing unsigned integer encoding.
//!
//! The two high bits of the first byte select the width:
//! `00` one byte, `01` two bytes, `10` four bytes. `11` marks an
//! out-of-range value and always carries four bytes.

use super::stream::{ByteReader, ByteWriter, CodecError};

/// Written in place of values that do not fit in 30 bits.
pub const PACKED_UINT_SENTINEL: u32 = u32::MAX;

pub const PACKED_UINT_MAX: u32 = (1 << 30) - 1;

const ONE_BYTE_LIMIT: u32 = 1 << 6;
const TWO_BYTE_LIMIT: u32 = 1 << 14;

const PREFIX_SHIFT: u32 = 6;
const PREFIX_TWO: u8 = 0b01;
const PREFIX_FOUR: u8 = 0b10;
const PREFIX_INVALID: u8 = 0b11;

pub fn packed_uint_len(v: u32) -> usize {
    if v < ONE_BYTE_LIMIT {
        1
    } else if v < TWO_BYTE_LIMIT {
        2
    } else {
        4
    }
}

impl ByteWriter {
    pub fn write_packed_uint(&mut self, v: u32) {
        if v < ONE_BYTE_LIMIT {
            self.write_u8(v as u8);
        } else if v < TWO_BYTE_LIMIT {
            self.write_u16(0x4000 | v as u16);
        } else if v <= PACKED_UINT_MAX {
            self.write_u32(0x8000_0000 | v);
        } else {
            log::warn!("packed uint {v} exceeds 30 bits, writing sentinel");
            self.write_u32(PACKED_UINT_SENTINEL);
        }
    }
}

impl ByteReader<'_> {
    pub fn read_packed_uint(&mut self) -> Result<u32, CodecError> {
        let first = self.peek_u8()?;
        match first >> PREFIX_SHIFT {
            0 => Ok(u32::from(self.read_u8()?)),
            PREFIX_TWO => Ok(u32::from(self.read_u16()? & 0x3FFF)),
            PREFIX_FOUR => Ok(self.read_u32()? & PACKED_UINT_MAX),
            _ => {
                debug_assert_eq!(first >> PREFIX_SHIFT, PREFIX_INVALID);
                self.read_u32()?;
                log::warn!("read out-of-range packed uint");
                Ok(PACKED_UINT_SENTINEL)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn encode(v: u32) -> Vec<u8> {
        let mut w = ByteWriter::new();
        w.write_packed_uint(v);
        w.finish()
    }

    #[test]
    fn test_width_boundaries() {
        assert_eq!(encode(0), vec![0x00]);
        assert_eq!(encode(63), vec![0x3F]);
        assert_eq!(encode(64), vec![0x40, 0x40]);
        assert_eq!(encode(16383), vec![0x7F, 0xFF]);
        assert_eq!(encode(16384), vec![0x80, 0x00, 0x40, 0x00]);
        assert_eq!(encode(PACKED_UINT_MAX), vec![0xBF, 0xFF, 0xFF, 0xFF]);
    }

    #[test]
    fn test_overflow_writes_sentinel() {
        let bytes = encode(1 << 30);
        assert_eq!(bytes, vec![0xFF; 4]);

        let mut r = ByteReader::new(&bytes);
        assert_eq!(r.read_packed_uint().unwrap(), PACKED_UINT_SENTINEL);
        assert_eq!(r.remaining(), 0);
    }

    #[test]
    fn test_truncated_input() {
        let mut r = ByteReader::new(&[0x80, 0x00]);
        assert!(matches!(
            r.read_packed_uint(),
            Err(CodecError::UnexpectedEnd { needed: 4, .. })
        ));
        assert!(ByteReader::new(&[]).read_packed_uint().is_err());
    }

    #[test]
    fn test_sequence_decodes_in_order() {
        let mut w = ByteWriter::new();
        for v in [5u32, 300, 70_000, 2] {
            w.write_packed_uint(v);
        }
        let bytes = w.finish();
        assert_eq!(bytes.len(), 1 + 2 + 4 + 1);

        let mut r = ByteReader::new(&bytes);
        for v in [5u32, 300, 70_000, 2] {
            assert_eq!(r.read_packed_uint().unwrap(), v);
        }
    }

    proptest! {
        #[test]
        fn round_trip(v in 0u32..=PACKED_UINT_MAX) {
            let bytes = encode(v);
            prop_assert_eq!(bytes.len(), packed_uint_len(v));
            let mut r = ByteReader::new(&bytes);
            prop_assert_eq!(r.read_packed_uint().unwrap(), v);
        }

        #[test]
        fn oversized_values_collapse(v in (PACKED_UINT_MAX + 1)..=u32::MAX) {
            let bytes = encode(v);
            let mut r = ByteReader::new(&bytes);
            prop_assert_eq!(r.read_packed_uint().unwrap(), PACKED_UINT_SENTINEL);
        }
    }
}
