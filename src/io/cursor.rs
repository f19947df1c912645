use crate::error::{Error, Result};

/// A read position over a borrowed, immutable byte buffer.
///
/// Every read is bounds-checked: asking for more bytes than remain returns
/// [`Error::UnexpectedEof`] and leaves the position unchanged. Extracted
/// slices borrow from the underlying buffer, nothing is copied.
#[derive(Debug, Clone)]
pub struct ByteCursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteCursor<'a> {
    #[inline]
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Current read offset from the start of the buffer.
    #[inline]
    pub fn position(&self) -> usize {
        self.pos
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Unread tail of the buffer.
    #[inline]
    pub fn rest(&self) -> &'a [u8] {
        &self.data[self.pos..]
    }

    fn check(&self, n: usize) -> Result<()> {
        if n > self.remaining() {
            return Err(Error::UnexpectedEof {
                needed: n,
                remaining: self.remaining(),
            });
        }
        Ok(())
    }

    /// Skip `n` bytes.
    pub fn advance(&mut self, n: usize) -> Result<()> {
        self.check(n)?;
        self.pos += n;
        Ok(())
    }

    /// Return the next `n` bytes without moving the position.
    pub fn peek(&self, n: usize) -> Result<&'a [u8]> {
        self.check(n)?;
        Ok(&self.data[self.pos..self.pos + n])
    }

    /// Return the next `n` bytes and move past them.
    pub fn extract(&mut self, n: usize) -> Result<&'a [u8]> {
        let bytes = self.peek(n)?;
        self.pos += n;
        Ok(bytes)
    }

    /// Read a fixed-size array, e.g. a magic number.
    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.extract(N)?);
        Ok(out)
    }

    #[inline]
    pub fn peek_u8(&self) -> Result<u8> {
        Ok(self.peek(1)?[0])
    }

    #[inline]
    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.extract(1)?[0])
    }

    pub fn read_u16_be(&mut self) -> Result<u16> {
        self.read_array().map(u16::from_be_bytes)
    }

    pub fn read_u32_be(&mut self) -> Result<u32> {
        self.read_array().map(u32::from_be_bytes)
    }

    pub fn read_u64_be(&mut self) -> Result<u64> {
        self.read_array().map(u64::from_be_bytes)
    }

    pub fn read_f64_be(&mut self) -> Result<f64> {
        self.read_array().map(f64::from_be_bytes)
    }

    // Container and entity headers are little-endian.

    pub fn read_u16_le(&mut self) -> Result<u16> {
        self.read_array().map(u16::from_le_bytes)
    }

    pub fn read_u32_le(&mut self) -> Result<u32> {
        self.read_array().map(u32::from_le_bytes)
    }

    pub fn read_u64_le(&mut self) -> Result<u64> {
        self.read_array().map(u64::from_le_bytes)
    }

    /// Read `len` bytes as an unsigned big-endian integer (at most 8 bytes).
    pub fn read_uint_be(&mut self, len: usize) -> Result<u64> {
        if len > 8 {
            return Err(Error::UnsupportedEncoding(format!(
                "{len}-byte integer does not fit in 64 bits"
            )));
        }
        let bytes = self.extract(len)?;
        Ok(bytes.iter().fold(0u64, |acc, &b| (acc << 8) | b as u64))
    }
}

/// Borrow `data[offset..offset + len]`, failing instead of panicking when the
/// range falls outside the buffer.
pub fn slice_at(data: &[u8], offset: usize, len: usize) -> Result<&[u8]> {
    let mut cursor = ByteCursor::new(data);
    cursor.advance(offset)?;
    cursor.extract(len)
}
