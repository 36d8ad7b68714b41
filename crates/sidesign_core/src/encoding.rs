//! Consensus-style wire encoding: little-endian integers plus
//! compact-size-prefixed vectors, byte-exact on round-trip.
//!
//! Decoding is strict: compact sizes must be canonical and reads past the
//! end of the buffer fail instead of zero-filling.

use crate::error::{CoreError, Result};

/// Sequential reader over a byte buffer.
///
/// Tracks its position so a caller can decode several records from one
/// buffer and then check [`Reader::remaining`] for trailing garbage.
pub struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Reader { bytes, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    pub fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.remaining() < n {
            return Err(CoreError::Decode(format!(
                "unexpected end of data (wanted {n} bytes, {} left)",
                self.remaining()
            )));
        }
        let out = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        Ok(self.read_u32()? as i32)
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        let b = self.take(8)?;
        Ok(u64::from_le_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }

    pub fn read_i64(&mut self) -> Result<i64> {
        Ok(self.read_u64()? as i64)
    }

    pub fn read_array_32(&mut self) -> Result<[u8; 32]> {
        let mut out = [0u8; 32];
        out.copy_from_slice(self.take(32)?);
        Ok(out)
    }

    /// Canonical compact size: the shortest form is required.
    pub fn read_compact_size(&mut self) -> Result<u64> {
        let tag = self.read_u8()?;
        let value = match tag {
            0..=0xfc => u64::from(tag),
            0xfd => {
                let v = u64::from(self.read_u16()?);
                if v < 0xfd {
                    return Err(CoreError::Decode("non-canonical compact size".into()));
                }
                v
            }
            0xfe => {
                let v = u64::from(self.read_u32()?);
                if v <= u64::from(u16::MAX) {
                    return Err(CoreError::Decode("non-canonical compact size".into()));
                }
                v
            }
            0xff => {
                let v = self.read_u64()?;
                if v <= u64::from(u32::MAX) {
                    return Err(CoreError::Decode("non-canonical compact size".into()));
                }
                v
            }
        };
        Ok(value)
    }

    /// Compact-size-prefixed byte vector.
    pub fn read_var_bytes(&mut self) -> Result<Vec<u8>> {
        let len = self.read_compact_size()?;
        if len > self.remaining() as u64 {
            return Err(CoreError::Decode(format!(
                "declared length {len} exceeds remaining {} bytes",
                self.remaining()
            )));
        }
        Ok(self.take(len as usize)?.to_vec())
    }
}

pub fn write_compact_size(buf: &mut Vec<u8>, n: u64) {
    match n {
        0..=0xfc => buf.push(n as u8),
        0xfd..=0xffff => {
            buf.push(0xfd);
            buf.extend((n as u16).to_le_bytes());
        }
        0x1_0000..=0xffff_ffff => {
            buf.push(0xfe);
            buf.extend((n as u32).to_le_bytes());
        }
        _ => {
            buf.push(0xff);
            buf.extend(n.to_le_bytes());
        }
    }
}

pub fn write_var_bytes(buf: &mut Vec<u8>, bytes: &[u8]) {
    write_compact_size(buf, bytes.len() as u64);
    buf.extend_from_slice(bytes);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compact_size_round_trip() {
        for n in [0u64, 1, 0xfc, 0xfd, 0xffff, 0x1_0000, 0xffff_ffff, u64::MAX] {
            let mut buf = Vec::new();
            write_compact_size(&mut buf, n);
            let mut r = Reader::new(&buf);
            assert_eq!(r.read_compact_size().unwrap(), n);
            assert!(r.is_empty());
        }
    }

    #[test]
    fn non_canonical_compact_size_rejected() {
        // 0xfd prefix encoding a value that fits in one byte
        let mut r = Reader::new(&[0xfd, 0x10, 0x00]);
        assert!(r.read_compact_size().is_err());

        let mut r = Reader::new(&[0xfe, 0x10, 0x00, 0x00, 0x00]);
        assert!(r.read_compact_size().is_err());
    }

    #[test]
    fn short_read_fails() {
        let mut r = Reader::new(&[0x01, 0x02]);
        assert!(r.read_u32().is_err());
    }

    #[test]
    fn var_bytes_length_overflow_rejected() {
        // declares 200 bytes but only 2 follow
        let mut r = Reader::new(&[0xc8, 0xaa, 0xbb]);
        assert!(r.read_var_bytes().is_err());
    }
}
