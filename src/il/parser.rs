//! Low-level byte cursor for instruction stream decoding.
//!
//! [`Parser`] provides bounds-checked, little-endian reads over a borrowed
//! byte slice, maintaining a position cursor for sequential decoding. It
//! never mutates its input.

use crate::Result;

/// Primitive types readable from a little-endian byte stream.
pub trait IlRead: Sized {
    /// Encoded width in bytes.
    const SIZE: usize;
    /// Decode from exactly `SIZE` little-endian bytes.
    fn from_le(bytes: &[u8]) -> Self;
}

macro_rules! impl_il_read {
    ($($ty:ty),*) => {
        $(impl IlRead for $ty {
            const SIZE: usize = std::mem::size_of::<$ty>();
            fn from_le(bytes: &[u8]) -> Self {
                let mut buffer = [0u8; std::mem::size_of::<$ty>()];
                buffer.copy_from_slice(&bytes[..std::mem::size_of::<$ty>()]);
                <$ty>::from_le_bytes(buffer)
            }
        })*
    };
}

impl_il_read!(u8, i8, u16, i16, u32, i32, u64, i64, f32, f64);

/// A cursor-based reader over an instruction stream.
pub struct Parser<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> Parser<'a> {
    /// Create a new [`Parser`] from a byte slice.
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        Parser { data, position: 0 }
    }

    /// Length of the underlying buffer.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True if the buffer is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Current cursor position.
    #[must_use]
    pub fn pos(&self) -> usize {
        self.position
    }

    /// True if the cursor has not reached the end of the buffer.
    #[must_use]
    pub fn has_more_data(&self) -> bool {
        self.position < self.data.len()
    }

    /// Move the cursor to an absolute position. Positioning at the end of
    /// the buffer is permitted; beyond it is not.
    ///
    /// # Errors
    /// [`crate::Error::OutOfBounds`] if `pos` exceeds the buffer length.
    pub fn seek(&mut self, pos: usize) -> Result<()> {
        if pos > self.data.len() {
            return Err(crate::Error::OutOfBounds);
        }

        self.position = pos;
        Ok(())
    }

    /// Read one value of type `T` at the cursor, little-endian, and advance.
    ///
    /// # Errors
    /// [`crate::Error::OutOfBounds`] if fewer than `T::SIZE` bytes remain.
    pub fn read_le<T: IlRead>(&mut self) -> Result<T> {
        let end = self
            .position
            .checked_add(T::SIZE)
            .ok_or(crate::Error::OutOfBounds)?;
        if end > self.data.len() {
            return Err(crate::Error::OutOfBounds);
        }

        let value = T::from_le(&self.data[self.position..end]);
        self.position = end;
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_le_sequence() {
        let data = [0x01, 0x02, 0x03, 0x04, 0x05];
        let mut parser = Parser::new(&data);

        assert_eq!(parser.read_le::<u8>().unwrap(), 0x01);
        assert_eq!(parser.read_le::<u32>().unwrap(), 0x0504_0302);
        assert!(!parser.has_more_data());
        assert!(parser.read_le::<u8>().is_err());
    }

    #[test]
    fn read_le_signed() {
        let data = [0xFF, 0xFF, 0xFF, 0xFF];
        let mut parser = Parser::new(&data);
        assert_eq!(parser.read_le::<i32>().unwrap(), -1);
    }

    #[test]
    fn seek_allows_rewind() {
        let data = [0x10, 0x20, 0x30, 0x40];
        let mut parser = Parser::new(&data);

        let _ = parser.read_le::<u32>().unwrap();
        parser.seek(parser.pos() - 4).unwrap();
        assert_eq!(parser.read_le::<u8>().unwrap(), 0x10);

        assert!(parser.seek(4).is_ok());
        assert!(parser.seek(5).is_err());
    }
}
