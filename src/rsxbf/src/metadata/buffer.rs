
use super::*;

pub(crate) type Buffer = Cursor<Vec<u8>>;

/// XBF-specific reads on top of [`byteorder::ReadBytesExt`].
///
/// All multi-byte primitives in an XBF file are little-endian; those go
/// straight through `read_u16::<LittleEndian>()` and friends. The format
/// additionally uses UTF-16 character runs and 7-bit variable-length
/// integers, which this trait provides.
pub(crate) trait BufferExt {
    /// Reads `count` UTF-16 code units and decodes them into a string.
    fn read_chars(&mut self, count: usize) -> Result<String>;

    /// Reads a length-prefixed string: an i32 character count followed by
    /// that many UTF-16 code units.
    fn read_len_string(&mut self) -> Result<String>;

    /// Reads a little-endian base-128 variable-length integer, at most five
    /// bytes long.
    fn read_7bit_varint(&mut self) -> Result<u32>;

    /// Reads `count` raw bytes.
    fn read_raw(&mut self, count: usize) -> Result<Vec<u8>>;
}

impl BufferExt for Buffer {
    fn read_chars(&mut self, count: usize) -> Result<String> {
        let mut units = Vec::new();
        for _ in 0..count {
            units.push(self.read_u16::<LittleEndian>()?);
        }
        String::from_utf16(&units).map_err(|_| XbfError::UnexpectedByte {
            position: self.position(),
        })
    }

    fn read_len_string(&mut self) -> Result<String> {
        let position = self.position();
        let count = self.read_i32::<LittleEndian>()?;
        if count < 0 {
            return Err(XbfError::UnexpectedByte { position });
        }
        self.read_chars(count as usize)
    }

    fn read_7bit_varint(&mut self) -> Result<u32> {
        let mut value = 0u32;
        let mut shift = 0;
        loop {
            let byte = self.read_u8()?;
            value |= ((byte & 0x7F) as u32) << shift;
            if byte & 0x80 == 0 {
                return Ok(value);
            }
            shift += 7;
            // Five bytes encode up to 35 bits, more than a u32 can carry.
            if shift >= 35 {
                return Err(XbfError::UnexpectedByte {
                    position: self.position(),
                });
            }
        }
    }

    fn read_raw(&mut self, count: usize) -> Result<Vec<u8>> {
        let mut bytes = vec![0u8; count];
        self.read_exact(&mut bytes)?;
        Ok(bytes)
    }
}
