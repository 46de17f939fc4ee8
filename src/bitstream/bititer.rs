//! BitIterator: steps through a byte buffer in fixed width bit groups (keys).
//!
//! Each group is returned left-justified in a u64: the top `step` bits hold the key, MSB first
//! across byte boundaries, and the unused low bits are zero. When the buffer's bit length is not a
//! multiple of the step, the last group is completed with virtual zero bits. Nothing past the end
//! of the slice is ever read.

/// Largest number of source bytes a single group can touch (7 bits of offset + 64 bits of key).
const WINDOW_BYTES: usize = 9;

#[derive(Debug, Clone)]
pub struct BitIterator<'a> {
    buffer: &'a [u8],
    bit_len: u64,
    step: u32,
    cursor: u64,
}

impl<'a> BitIterator<'a> {
    /// Create an iterator over `buffer` returning `step` bits at a time. Panics unless
    /// 1 <= step <= 64; callers validate key widths before they get here.
    pub fn new(buffer: &'a [u8], step: u8) -> Self {
        assert!((1..=64).contains(&step), "bit step {} outside [1, 64]", step);
        Self {
            buffer,
            bit_len: buffer.len() as u64 * 8,
            step: step as u32,
            cursor: 0,
        }
    }

    /// True while at least one real bit remains in front of the cursor.
    pub fn has_next(&self) -> bool {
        self.cursor < self.bit_len
    }

    /// Return the next group, left-justified, or None once the buffer is used up.
    pub fn advance(&mut self) -> Option<u64> {
        if !self.has_next() {
            return None;
        }
        let first = (self.cursor / 8) as usize;
        let offset = (self.cursor % 8) as u32;

        // Load a 72 bit window starting at the cursor's byte, zero filled past the end.
        let window = (first..first + WINDOW_BYTES).fold(0_u128, |acc, i| {
            acc << 8 | self.buffer.get(i).copied().unwrap_or(0) as u128
        });
        // Move the window to the top of the u128, drop the bits already consumed and keep 64.
        let top = ((window << (128 - WINDOW_BYTES as u32 * 8 + offset)) >> 64) as u64;
        let key = top & (u64::MAX << (64 - self.step));

        self.cursor += self.step as u64;
        Some(key)
    }

    /// Real bits that have not been consumed yet.
    pub fn unused_bits(&self) -> u64 {
        self.bit_len.saturating_sub(self.cursor)
    }

    /// Virtual zero bits the groups returned so far have used past the end of the buffer.
    /// Only the last group can contain any, so this is always less than the step.
    pub fn padding_bits(&self) -> u8 {
        self.cursor.saturating_sub(self.bit_len) as u8
    }

    /// Number of groups the whole buffer splits into.
    pub fn group_count(&self) -> u64 {
        (self.bit_len + self.step as u64 - 1) / self.step as u64
    }

    /// Debugging function to report the cursor as [bytes.bits].
    pub fn loc(&self) -> String {
        format!("[{}.{}]", self.cursor / 8, self.cursor % 8)
    }
}

impl Iterator for BitIterator<'_> {
    type Item = u64;

    fn next(&mut self) -> Option<u64> {
        self.advance()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = (self.unused_bits() + self.step as u64 - 1) / self.step as u64;
        (left as usize, Some(left as usize))
    }
}

impl ExactSizeIterator for BitIterator<'_> {}
