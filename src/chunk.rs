use std::ops::RangeInclusive;

use crate::error::HistoryError;

/// Splits `[from, to]` into provider-safe sub-windows.
///
/// Produces a lazy ascending sequence of contiguous, non-overlapping
/// inclusive ranges that exactly cover `[from, to]`, each at most
/// `max_width` blocks wide. The iterator is `Clone`, so a caller can
/// restart the walk from the beginning.
///
/// # Errors
///
/// Returns [`HistoryError::InvalidRange`] if `from > to`.
pub fn chunks(from: u64, to: u64, max_width: u64) -> Result<BlockChunks, HistoryError> {
    if from > to {
        return Err(HistoryError::InvalidRange { from, to });
    }
    Ok(BlockChunks { next: from, to, width: max_width.max(1), exhausted: false })
}

#[derive(Clone, Debug)]
pub struct BlockChunks {
    next: u64,
    to: u64,
    width: u64,
    exhausted: bool,
}

impl Iterator for BlockChunks {
    type Item = RangeInclusive<u64>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.exhausted {
            return None;
        }

        let end = self.next.saturating_add(self.width - 1).min(self.to);
        let range = self.next..=end;

        if end == self.to {
            self.exhausted = true;
        } else {
            self.next = end + 1;
        }

        Some(range)
    }
}
