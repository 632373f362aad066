//! Batch splitter: a lazy, exhaustive partition of a source slice into fixed-size batches.

use crate::Result;
use crate::error::EngineError;

/// One disjoint slice of the source, tagged with its position.
#[derive(Debug)]
pub struct Batch<'a, S> {
    /// Batch position; submission follows this order.
    pub index: usize,
    /// Offset of `items[0]` in the source slice.
    pub offset: usize,
    pub items: &'a [S],
}

impl<S> Clone for Batch<'_, S> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<S> Copy for Batch<'_, S> {}

impl<S> Batch<'_, S> {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Source offsets covered by this batch.
    pub fn range(&self) -> std::ops::Range<usize> {
        self.offset..self.offset + self.items.len()
    }
}

/// Reject a zero batch size before anything is dispatched.
pub fn validate_batch_size(batch_size: usize) -> Result<()> {
    if batch_size == 0 {
        return Err(EngineError::invalid("batch size must be positive"));
    }
    Ok(())
}

/// Iterator over the batches of a slice. Batch `i` holds `[i*B, min((i+1)*B, N))`.
/// Purely structural: no per-element work happens here.
#[derive(Debug)]
pub struct BatchSplitter<'a, S> {
    source: &'a [S],
    batch_size: usize,
    next_index: usize,
}

impl<'a, S> BatchSplitter<'a, S> {
    pub fn new(source: &'a [S], batch_size: usize) -> Result<Self> {
        validate_batch_size(batch_size)?;
        Ok(Self {
            source,
            batch_size,
            next_index: 0,
        })
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Number of batches the whole source splits into (independent of progress).
    pub fn batch_count(&self) -> usize {
        self.source.len().div_ceil(self.batch_size)
    }
}

impl<'a, S> Iterator for BatchSplitter<'a, S> {
    type Item = Batch<'a, S>;

    fn next(&mut self) -> Option<Self::Item> {
        let offset = self.next_index.checked_mul(self.batch_size)?;
        if offset >= self.source.len() {
            return None;
        }
        let end = (offset + self.batch_size).min(self.source.len());
        let batch = Batch {
            index: self.next_index,
            offset,
            items: &self.source[offset..end],
        };
        self.next_index += 1;
        Some(batch)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.batch_count().saturating_sub(self.next_index);
        (left, Some(left))
    }
}

impl<S> ExactSizeIterator for BatchSplitter<'_, S> {}

impl<S> std::iter::FusedIterator for BatchSplitter<'_, S> {}

/// Capability: anything that can hand out a [`BatchSplitter`] over its elements.
pub trait Splittable<S> {
    fn split_batches(&self, batch_size: usize) -> Result<BatchSplitter<'_, S>>;
}

impl<S> Splittable<S> for [S] {
    fn split_batches(&self, batch_size: usize) -> Result<BatchSplitter<'_, S>> {
        BatchSplitter::new(self, batch_size)
    }
}

impl<S> Splittable<S> for Vec<S> {
    fn split_batches(&self, batch_size: usize) -> Result<BatchSplitter<'_, S>> {
        BatchSplitter::new(self.as_slice(), batch_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_source_yields_no_batches() {
        let src: Vec<u32> = Vec::new();
        assert_eq!(src.split_batches(3).unwrap().count(), 0);
    }

    #[test]
    fn undersized_source_yields_one_batch() {
        let src = [1, 2];
        let batches: Vec<_> = src.split_batches(5).unwrap().collect();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].items, &[1, 2]);
        assert_eq!(batches[0].index, 0);
    }

    #[test]
    fn last_batch_may_be_short() {
        let src: Vec<u32> = (0..10).collect();
        let batches: Vec<_> = src.split_batches(4).unwrap().collect();
        let lens: Vec<_> = batches.iter().map(|b| b.len()).collect();
        assert_eq!(lens, vec![4, 4, 2]);
        assert_eq!(batches[2].range(), 8..10);
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        let src = [1];
        assert!(matches!(
            src.split_batches(0),
            Err(EngineError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn size_hint_tracks_progress() {
        let src: Vec<u32> = (0..7).collect();
        let mut it = src.split_batches(3).unwrap();
        assert_eq!(it.len(), 3);
        it.next();
        assert_eq!(it.len(), 2);
        it.next();
        it.next();
        assert_eq!(it.len(), 0);
        assert!(it.next().is_none());
    }
}
