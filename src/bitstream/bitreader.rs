//! BitReader: the read half of the variable width bit I/O.
//!
//! Reads fields of any width from 1 to 64 bits, MSB first, from any source that supports read().
//! The reader keeps one byte of lookahead plus a count of how many of its bits are used, and only
//! fetches the next source byte once the current one is exhausted. Fragment headers, run counts
//! and keys are all read through it.

use std::io::{self, BufReader, ErrorKind, Read};

#[derive(Debug)]
pub struct BitReader<R> {
    source: BufReader<R>,
    current: u8,
    /// Bits of `current` already handed out. 8 means we need a new byte.
    used: u32,
    bytes_in: u64,
}

impl<R: Read> BitReader<R> {
    pub fn new(source: R) -> Self {
        Self {
            source: BufReader::new(source),
            current: 0,
            used: 8,
            bytes_in: 0,
        }
    }

    /// Pull the next byte into `current`. Returns false at end of input.
    fn fetch(&mut self) -> io::Result<bool> {
        let mut byte = [0_u8; 1];
        loop {
            match self.source.read(&mut byte) {
                Ok(0) => return Ok(false),
                Ok(_) => break,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        self.current = byte[0];
        self.used = 0;
        self.bytes_in += 1;
        Ok(true)
    }

    /// Return the next `width` bits (1..=64) right-aligned in a u64. Running out of input part way
    /// through is an UnexpectedEof error.
    pub fn read(&mut self, width: u8) -> io::Result<u64> {
        debug_assert!((1..=64).contains(&width));
        let mut needed = width as u32;
        let mut result = 0_u64;
        while needed > 0 {
            if self.used == 8 && !self.fetch()? {
                return Err(io::Error::new(
                    ErrorKind::UnexpectedEof,
                    format!("needed {} more bits", needed),
                ));
            }
            let avail = 8 - self.used;
            let take = needed.min(avail);
            let chunk = (self.current >> (avail - take)) & (0xFF_u8 >> (8 - take));
            // A shift by 8 is fine on u64, so this also covers the 64 bit case.
            result = result << take | chunk as u64;
            self.used += take;
            needed -= take;
        }
        Ok(result)
    }

    /// Return a byte, or None if the input ends exactly here.
    pub fn try_byte(&mut self) -> io::Result<Option<u8>> {
        if self.used == 8 && !self.fetch()? {
            return Ok(None);
        }
        self.read(8).map(|b| Some(b as u8))
    }

    /// Drop whatever is left of a partly used byte so the next read starts on a byte boundary.
    pub fn align(&mut self) {
        self.used = 8;
    }

    /// Debugging function. Report current position as [bytes.bits].
    pub fn loc(&self) -> String {
        if self.used == 8 {
            format!("[{}.0]", self.bytes_in)
        } else {
            format!("[{}.{}]", self.bytes_in - 1, self.used)
        }
    }
}
