use std::io::{self, Write};

use log::trace;

/// Packs fixed width values into a bitstream. Bits are queued MSB first in a 64 bit word, and
/// every full word goes out to the sink as 8 big-endian bytes. Call finish() to flush the partial
/// word and get the sink back.
pub struct BitPacker<W: Write> {
    sink: W,
    width: u32,
    mask: u64,
    queue: u64,
    q_bits: u32,
    bytes_out: u64,
}

impl<W: Write> BitPacker<W> {
    /// Create a new BitPacker writing `width` bits per value. Panics unless 1 <= width <= 64.
    pub fn new(sink: W, width: u8) -> Self {
        assert!((1..=64).contains(&width), "pack width {} outside [1, 64]", width);
        let width = width as u32;
        Self {
            sink,
            width,
            mask: u64::MAX >> (64 - width),
            queue: 0,
            q_bits: 0,
            bytes_out: 0,
        }
    }

    /// Append the low `width` bits of `value`.
    pub fn push(&mut self, value: u64) -> io::Result<()> {
        let value = value & self.mask;
        let free = 64 - self.q_bits; // always 1..=64
        if self.width < free {
            self.queue |= value << (free - self.width);
            self.q_bits += self.width;
            return Ok(());
        }
        // The value fills the word. Put the top `free` bits in, ship the word, keep the rest.
        let spill = self.width - free;
        self.queue |= value >> spill;
        self.write_word()?;
        self.queue = if spill == 0 { 0 } else { value << (64 - spill) };
        self.q_bits = spill;
        Ok(())
    }

    fn write_word(&mut self) -> io::Result<()> {
        self.sink.write_all(&self.queue.to_be_bytes())?;
        self.bytes_out += 8;
        Ok(())
    }

    /// Flushes the remaining bits, padding with 0s up to the next byte, and returns the sink.
    pub fn finish(mut self) -> io::Result<W> {
        let tail = ((self.q_bits + 7) / 8) as usize;
        if tail > 0 {
            let bytes = self.queue.to_be_bytes();
            self.sink.write_all(&bytes[..tail])?;
            self.bytes_out += tail as u64;
        }
        trace!("BitPacker closed at {}", self.loc());
        self.sink.flush()?;
        Ok(self.sink)
    }

    /// Bytes handed to the sink so far.
    pub fn bytes_out(&self) -> u64 {
        self.bytes_out
    }

    /// Debugging function to return the number of bytes.bits output so far
    pub fn loc(&self) -> String {
        let bits = self.bytes_out * 8 + self.q_bits as u64;
        format!("[{}.{}]", bits / 8, bits % 8)
    }
}

#[cfg(test)]
mod test {
    use super::BitPacker;

    fn pack(width: u8, values: &[u64]) -> Vec<u8> {
        let mut bp = BitPacker::new(Vec::new(), width);
        for &v in values {
            bp.push(v).unwrap();
        }
        bp.finish().unwrap()
    }

    #[test]
    fn two_bit_counts() {
        assert_eq!(pack(2, &[2, 2, 1]), vec![0b1010_0100]);
    }

    #[test]
    fn bytes_pass_through() {
        assert_eq!(pack(8, &[255, 0, 171]), vec![255, 0, 171]);
    }

    #[test]
    fn only_low_bits_are_kept() {
        assert_eq!(pack(4, &[0xFFF1, 0x2]), vec![0x12]);
    }

    #[test]
    fn full_words_are_big_endian() {
        let out = pack(64, &[0x0102_0304_0506_0708, 0xFFFF_FFFF_FFFF_FFFF]);
        assert_eq!(out, vec![1, 2, 3, 4, 5, 6, 7, 8, 255, 255, 255, 255, 255, 255, 255, 255]);
    }

    #[test]
    fn values_straddle_word_boundaries() {
        // 13 values of 5 bits = 65 bits: one full word plus one bit.
        let out = pack(5, &[0b11111; 13]);
        assert_eq!(out.len(), 9);
        assert!(out[..8].iter().all(|&b| b == 0xFF));
        assert_eq!(out[8], 0b1000_0000);
    }

    #[test]
    fn odd_width_across_words() {
        let out = pack(63, &[u64::MAX >> 1, 0, 1]);
        // 189 bits: 63 ones, 63 zeros, 62 zeros and a one, then 3 pad bits.
        assert_eq!(out.len(), 24);
        assert_eq!(&out[..7], &[0xFF; 7]);
        assert_eq!(out[7], 0xFE);
        assert!(out[8..23].iter().all(|&b| b == 0));
        assert_eq!(out[23], 0b0000_1000);
    }

    #[test]
    fn nothing_pushed_writes_nothing() {
        assert!(pack(7, &[]).is_empty());
    }

    #[test]
    fn loc_tracks_bits() {
        let mut bp = BitPacker::new(Vec::new(), 3);
        bp.push(1).unwrap();
        bp.push(1).unwrap();
        bp.push(1).unwrap();
        assert_eq!(bp.loc(), "[1.1]");
        assert_eq!(bp.bytes_out(), 0);
    }
}
