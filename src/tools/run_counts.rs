/// Run counts in the order the runs were found, plus the largest count seen so far. The largest
/// count decides how many bits each count takes in the .meta file.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunCounts {
    counts: Vec<u64>,
    max_count: u64,
}

impl RunCounts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, count: u64) {
        self.max_count = self.max_count.max(count);
        self.counts.push(count);
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn max_count(&self) -> u64 {
        self.max_count
    }

    /// Smallest width w (at least 1) with max_count < 2^w.
    pub fn run_width(&self) -> u8 {
        min_bits(self.max_count)
    }

    pub fn iter(&self) -> impl Iterator<Item = u64> + '_ {
        self.counts.iter().copied()
    }

    pub fn as_slice(&self) -> &[u64] {
        &self.counts
    }
}

/// Bits needed to hold `value`, never less than 1.
pub fn min_bits(value: u64) -> u8 {
    (64 - value.leading_zeros()).max(1) as u8
}
