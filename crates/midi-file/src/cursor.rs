//! Bounds-checked big-endian reads over an immutable byte buffer.
//!
//! Every read is a pure function of `(buffer, position)` and returns the
//! value together with the position just past it. Nothing here allocates.

/// A read ran past the end of the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("read of {wanted} bytes at offset {offset} exceeds buffer of {available} bytes")]
pub struct CursorError {
    pub offset: usize,
    pub wanted: usize,
    pub available: usize,
}

pub type CursorResult<T> = std::result::Result<(T, usize), CursorError>;

/// Read-only view used by the decoder.
///
/// Track decoding builds a cursor over the (clamped) track slice, so a
/// track can never read into the next chunk.
#[derive(Debug, Clone, Copy)]
pub struct ByteCursor<'a> {
    data: &'a [u8],
}

impl<'a> ByteCursor<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Borrow `len` bytes starting at `pos`.
    pub fn bytes(&self, pos: usize, len: usize) -> CursorResult<&'a [u8]> {
        let end = pos.checked_add(len).ok_or(self.oob(pos, len))?;
        match self.data.get(pos..end) {
            Some(slice) => Ok((slice, end)),
            None => Err(self.oob(pos, len)),
        }
    }

    pub fn read_u8(&self, pos: usize) -> CursorResult<u8> {
        match self.data.get(pos) {
            Some(&b) => Ok((b, pos + 1)),
            None => Err(self.oob(pos, 1)),
        }
    }

    pub fn read_u16_be(&self, pos: usize) -> CursorResult<u16> {
        let (b, next) = self.bytes(pos, 2)?;
        Ok((u16::from_be_bytes([b[0], b[1]]), next))
    }

    /// 24-bit big-endian value, as used by the Set Tempo meta payload.
    pub fn read_u24_be(&self, pos: usize) -> CursorResult<u32> {
        let (b, next) = self.bytes(pos, 3)?;
        Ok((u32::from_be_bytes([0, b[0], b[1], b[2]]), next))
    }

    pub fn read_u32_be(&self, pos: usize) -> CursorResult<u32> {
        let (b, next) = self.bytes(pos, 4)?;
        Ok((u32::from_be_bytes([b[0], b[1], b[2], b[3]]), next))
    }

    /// Variable-length quantity: 7 bits per byte, top bit set means "more".
    ///
    /// A tail made only of continuation bytes is `Truncated`; the loop is
    /// bounded by the buffer, never by the encoded value.
    pub fn read_vlq(&self, pos: usize) -> CursorResult<u64> {
        let mut value: u64 = 0;
        let mut at = pos;
        loop {
            let Some(&byte) = self.data.get(at) else {
                return Err(self.oob(pos, at - pos + 1));
            };
            at += 1;
            value = (value << 7) | u64::from(byte & 0x7F);
            if byte & 0x80 == 0 {
                return Ok((value, at));
            }
        }
    }

    /// Four-byte chunk tag at `pos`, if the buffer holds one.
    pub fn tag_at(&self, pos: usize) -> Option<[u8; 4]> {
        let (b, _) = self.bytes(pos, 4).ok()?;
        Some([b[0], b[1], b[2], b[3]])
    }

    fn oob(&self, offset: usize, wanted: usize) -> CursorError {
        CursorError {
            offset,
            wanted,
            available: self.data.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_width_reads_are_big_endian() {
        let data = [0x12, 0x34, 0x56, 0x78, 0x9A];
        let cursor = ByteCursor::new(&data);

        assert_eq!(cursor.read_u8(0), Ok((0x12, 1)));
        assert_eq!(cursor.read_u16_be(1), Ok((0x3456, 3)));
        assert_eq!(cursor.read_u24_be(0), Ok((0x123456, 3)));
        assert_eq!(cursor.read_u32_be(1), Ok((0x3456789A, 5)));
    }

    #[test]
    fn reads_past_end_are_truncated() {
        let data = [0x00, 0x01, 0x02];
        let cursor = ByteCursor::new(&data);

        assert!(cursor.read_u8(3).is_err());
        assert!(cursor.read_u16_be(2).is_err());
        let err = cursor.read_u32_be(0).unwrap_err();
        assert_eq!(err.offset, 0);
        assert_eq!(err.wanted, 4);
        assert_eq!(err.available, 3);
    }

    #[test]
    fn bytes_rejects_overflowing_length() {
        let data = [0u8; 4];
        let cursor = ByteCursor::new(&data);
        assert!(cursor.bytes(2, usize::MAX).is_err());
    }

    #[test]
    fn vlq_known_values() {
        let cases: &[(&[u8], u64)] = &[
            (&[0x00], 0),
            (&[0x40], 0x40),
            (&[0x7F], 0x7F),
            (&[0x81, 0x00], 0x80),
            (&[0xC0, 0x00], 0x2000),
            (&[0xFF, 0x7F], 0x3FFF),
            (&[0x81, 0x80, 0x00], 0x4000),
            (&[0xFF, 0xFF, 0xFF, 0x7F], 0x0FFF_FFFF),
        ];
        for (bytes, expected) in cases {
            let cursor = ByteCursor::new(bytes);
            assert_eq!(cursor.read_vlq(0), Ok((*expected, bytes.len())), "{:02X?}", bytes);
        }
    }

    #[test]
    fn vlq_stops_at_first_clear_top_bit() {
        let data = [0x83, 0x60, 0x90];
        let cursor = ByteCursor::new(&data);
        assert_eq!(cursor.read_vlq(0), Ok((480, 2)));
    }

    #[test]
    fn vlq_of_only_continuation_bytes_is_truncated() {
        let data = [0x80, 0xFF, 0x81];
        let cursor = ByteCursor::new(&data);
        let err = cursor.read_vlq(0).unwrap_err();
        assert_eq!(err.offset, 0);
        assert_eq!(err.available, 3);

        let empty = ByteCursor::new(&[]);
        assert!(empty.read_vlq(0).is_err());
    }

    #[test]
    fn tag_at_reads_four_bytes() {
        let data = *b"MThdxx";
        let cursor = ByteCursor::new(&data);
        assert_eq!(cursor.tag_at(0), Some(*b"MThd"));
        assert_eq!(cursor.tag_at(3), None);
    }
}
