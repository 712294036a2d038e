//! Width-parameterized field reader shared by every payload version.

/// Width of a length prefix, in bytes. Multi-byte prefixes are
/// little-endian on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Width {
    One,
    Two,
    Four,
}

impl Width {
    /// Number of bytes the prefix occupies.
    pub fn size(self) -> usize {
        match self {
            Width::One => 1,
            Width::Two => 2,
            Width::Four => 4,
        }
    }

    /// Largest value the prefix can carry.
    pub fn max_value(self) -> usize {
        match self {
            Width::One => u8::MAX as usize,
            Width::Two => u16::MAX as usize,
            Width::Four => u32::MAX as usize,
        }
    }
}

/// Raised when the buffer runs out before a read completes. Call sites map
/// this onto the public error taxonomy (truncated header vs. bad declared
/// length).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Truncated;

/// Cursor over a borrowed payload buffer.
pub struct FieldReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> FieldReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Read a little-endian length prefix of the given width.
    pub fn read_len(&mut self, width: Width) -> Result<usize, Truncated> {
        let bytes = self.take(width.size())?;
        let mut value = 0usize;
        for (i, b) in bytes.iter().enumerate() {
            value |= (*b as usize) << (8 * i);
        }
        Ok(value)
    }

    /// Read a single raw byte.
    pub fn read_u8(&mut self) -> Result<u8, Truncated> {
        Ok(self.take(1)?[0])
    }

    /// Consume exactly `n` bytes.
    pub fn take(&mut self, n: usize) -> Result<&'a [u8], Truncated> {
        if self.remaining() < n {
            return Err(Truncated);
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    /// Consume everything left in the buffer.
    pub fn take_rest(&mut self) -> &'a [u8] {
        let slice = &self.buf[self.pos..];
        self.pos = self.buf.len();
        slice
    }
}

/// Append a little-endian length prefix of the given width. Returns false
/// when the value does not fit the width.
pub fn write_len(out: &mut Vec<u8>, width: Width, value: usize) -> bool {
    if value > width.max_value() {
        return false;
    }
    for i in 0..width.size() {
        out.push(((value >> (8 * i)) & 0xff) as u8);
    }
    true
}
