//! A fixed-size buffered window over an opaque byte source: a 1 KiB window,
//! lazily refilled, with endianness-typed integer readers built on top.

use crate::error::{GidError, GidResult};

const BUFFER_SIZE: usize = 1024;

/// An opaque byte source. The only capability a decoder needs from whatever
/// the caller is reading from — a file, a socket, an in-memory slice.
pub trait ByteSource {
    /// Reads up to `buf.len()` bytes, returning the number actually read.
    /// A return of 0 signals end of stream.
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize>;
}

impl<R: std::io::Read> ByteSource for R {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        std::io::Read::read(self, buf)
    }
}

/// 1 KiB-buffered cursor over a [`ByteSource`].
///
/// The initial state forces a refill on the first read: `valid_count` starts
/// at 0 and `next_read_index` starts one past it, so the first
/// `next_read_index == valid_count + 1` check always trips.
pub struct BufferedInput<'s> {
    source: &'s mut dyn ByteSource,
    data: [u8; BUFFER_SIZE],
    /// Index of the next byte to hand out. The initial value equals
    /// `valid_count + 1` (both start at their defaults of 1 and 0) so the
    /// very first read forces a refill.
    next_read_index: usize,
    valid_count: usize,
    eof: bool,
    total_read: u64,
}

impl<'s> BufferedInput<'s> {
    pub fn new(source: &'s mut dyn ByteSource) -> Self {
        BufferedInput {
            source,
            data: [0; BUFFER_SIZE],
            next_read_index: 1,
            valid_count: 0,
            eof: false,
            total_read: 0,
        }
    }

    /// Total number of bytes handed out so far, counting from the first
    /// byte read after construction. For formats dispatched through
    /// [`crate::format::load_header`], that constructor call happens before
    /// the signature byte is read, so this total *does* include it.
    pub fn total_read(&self) -> u64 {
        self.total_read
    }

    fn refill(&mut self) -> GidResult<()> {
        let n = self.source.read(&mut self.data)?;
        if n < BUFFER_SIZE {
            self.eof = true;
        }
        self.valid_count = n;
        self.next_read_index = 0;
        Ok(())
    }

    /// Reads a single byte, refilling the window as needed.
    pub fn read_u8(&mut self) -> GidResult<u8> {
        if self.next_read_index >= self.valid_count {
            if self.eof {
                return Err(GidError::UnexpectedEof);
            }
            self.refill()?;
            if self.valid_count == 0 {
                return Err(GidError::UnexpectedEof);
            }
        }
        let byte = self.data[self.next_read_index];
        self.next_read_index += 1;
        self.total_read += 1;
        Ok(byte)
    }

    /// Reads `buf.len()` bytes, failing with [`GidError::UnexpectedEof`] on
    /// truncation.
    pub fn read_exact(&mut self, buf: &mut [u8]) -> GidResult<()> {
        for b in buf.iter_mut() {
            *b = self.read_u8()?;
        }
        Ok(())
    }

    /// Reads and discards `n` bytes.
    pub fn skip(&mut self, n: usize) -> GidResult<()> {
        for _ in 0..n {
            self.read_u8()?;
        }
        Ok(())
    }

    pub fn read_u16_le(&mut self) -> GidResult<u16> {
        let mut b = [0u8; 2];
        self.read_exact(&mut b)?;
        Ok(byteorder_lite::LittleEndian::read_u16(&b))
    }

    pub fn read_u16_be(&mut self) -> GidResult<u16> {
        let mut b = [0u8; 2];
        self.read_exact(&mut b)?;
        Ok(byteorder_lite::BigEndian::read_u16(&b))
    }

    pub fn read_i16_le(&mut self) -> GidResult<i16> {
        Ok(self.read_u16_le()? as i16)
    }

    pub fn read_u32_le(&mut self) -> GidResult<u32> {
        let mut b = [0u8; 4];
        self.read_exact(&mut b)?;
        Ok(byteorder_lite::LittleEndian::read_u32(&b))
    }

    pub fn read_u32_be(&mut self) -> GidResult<u32> {
        let mut b = [0u8; 4];
        self.read_exact(&mut b)?;
        Ok(byteorder_lite::BigEndian::read_u32(&b))
    }

    pub fn read_i32_le(&mut self) -> GidResult<i32> {
        Ok(self.read_u32_le()? as i32)
    }

    pub fn at_eof(&self) -> bool {
        self.eof && self.next_read_index >= self.valid_count
    }
}

use byteorder_lite::ByteOrder;
