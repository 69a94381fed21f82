use alloy::primitives::BlockNumber;

use crate::types::BlockRange;

/// Splits `[start, end]` into ascending, gap-free [`BlockRange`]s of a fixed width.
///
/// The last chunk is truncated at `end`. An inverted span (`start > end`) yields nothing.
#[derive(Debug, Clone)]
pub struct ChunkIterator {
    next_from: BlockNumber,
    end: BlockNumber,
    width: u64,
    remaining: u64,
}

impl ChunkIterator {
    /// # Panics
    ///
    /// Panics if `width` is 0.
    #[must_use]
    pub const fn new(start: BlockNumber, end: BlockNumber, width: u64) -> Self {
        assert!(width >= 1, "chunk width must be at least 1");
        let remaining = if start > end { 0 } else { (end - start) / width + 1 };
        Self { next_from: start, end, width, remaining }
    }

    /// Number of chunks not yet yielded.
    #[must_use]
    pub const fn remaining(&self) -> u64 {
        self.remaining
    }
}

impl Iterator for ChunkIterator {
    type Item = BlockRange;

    fn next(&mut self) -> Option<BlockRange> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;

        let from = self.next_from;
        let to = from.saturating_add(self.width - 1).min(self.end);
        self.next_from = to.saturating_add(1);
        Some(BlockRange::new(from, to))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match usize::try_from(self.remaining) {
            Ok(remaining) => (remaining, Some(remaining)),
            Err(_) => (usize::MAX, None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunks(start: u64, end: u64, width: u64) -> Vec<(u64, u64)> {
        ChunkIterator::new(start, end, width).map(|range| (range.from, range.to)).collect()
    }

    #[test]
    fn last_chunk_is_truncated() {
        assert_eq!(chunks(100, 2500, 1000), vec![(100, 1099), (1100, 2099), (2100, 2500)]);
    }

    #[test]
    fn exact_multiple_has_no_short_tail() {
        assert_eq!(chunks(100, 199, 50), vec![(100, 149), (150, 199)]);
    }

    #[test]
    fn single_block_span() {
        assert_eq!(chunks(7, 7, 1000), vec![(7, 7)]);
    }

    #[test]
    fn width_one_yields_every_block() {
        assert_eq!(chunks(0, 3, 1), vec![(0, 0), (1, 1), (2, 2), (3, 3)]);
    }

    #[test]
    fn inverted_span_is_empty() {
        assert!(chunks(2501, 2500, 1000).is_empty());
    }

    #[test]
    fn chunks_cover_the_span_exactly() {
        for (start, end, width) in [(0, 9_999, 7), (13, 1_013, 1_000), (5, 5_000, 333)] {
            let ranges = chunks(start, end, width);
            assert_eq!(ranges.first().map(|r| r.0), Some(start));
            assert_eq!(ranges.last().map(|r| r.1), Some(end));
            for pair in ranges.windows(2) {
                assert_eq!(pair[0].1 + 1, pair[1].0);
            }
            assert!(ranges.iter().all(|(from, to)| to - from < width));
        }
    }

    #[test]
    fn end_at_u64_max_does_not_overflow() {
        let ranges = chunks(u64::MAX - 2, u64::MAX, 2);
        assert_eq!(ranges, vec![(u64::MAX - 2, u64::MAX - 1), (u64::MAX, u64::MAX)]);
    }

    #[test]
    fn remaining_counts_down() {
        let mut iter = ChunkIterator::new(100, 300, 50);
        assert_eq!(iter.remaining(), 5);
        iter.next();
        assert_eq!(iter.remaining(), 4);
        assert_eq!(iter.size_hint(), (4, Some(4)));
    }

    #[test]
    #[should_panic(expected = "chunk width must be at least 1")]
    fn zero_width_panics() {
        let _ = ChunkIterator::new(0, 10, 0);
    }
}
