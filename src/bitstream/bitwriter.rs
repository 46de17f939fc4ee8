use std::io::{self, Write};

/// Writes fields of any width from 1 to 64 bits, MSB first, to any sink that supports write().
/// This is the write half of the variable width bit I/O: it keeps the byte being filled and a
/// count of the bits already placed in it, and hands each byte to the sink once it is full.
pub struct BitWriter<W: Write> {
    /// Handle to the output stream
    writer: W,
    /// Byte currently being filled, from the top down.
    current: u8,
    /// Count of valid bits in `current`.
    used: u32,
    /// Bytes handed to the writer so far.
    bytes_out: u64,
}

impl<W: Write> BitWriter<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            current: 0,
            used: 0,
            bytes_out: 0,
        }
    }

    /// Put the low `width` bits (1..=64) of `value` on the stream.
    pub fn write(&mut self, width: u8, value: u64) -> io::Result<()> {
        debug_assert!((1..=64).contains(&width));
        let mut left = width as u32;
        while left > 0 {
            let room = 8 - self.used;
            let take = left.min(room);
            let chunk = ((value >> (left - take)) as u8) & (0xFF_u8 >> (8 - take));
            self.current |= chunk << (room - take);
            self.used += take;
            left -= take;
            if self.used == 8 {
                self.push_byte()?;
            }
        }
        Ok(())
    }

    fn push_byte(&mut self) -> io::Result<()> {
        self.writer.write_all(&[self.current])?;
        self.bytes_out += 1;
        self.current = 0;
        self.used = 0;
        Ok(())
    }

    /// Flushes the remaining bits (1-7), padding with 0s in the least significant bits, and
    /// returns the writer. Finish MUST be called or the last partial byte is lost.
    pub fn finish(mut self) -> io::Result<W> {
        if self.used > 0 {
            self.push_byte()?;
        }
        self.writer.flush()?;
        Ok(self.writer)
    }

    /// Bytes handed to the writer so far, not counting a partial byte.
    pub fn bytes_out(&self) -> u64 {
        self.bytes_out
    }

    /// Debugging function to return the number of bytes.bits output so far
    pub fn loc(&self) -> String {
        format!("[{}.{}]", self.bytes_out, self.used)
    }
}
