//! Order-preserving grouping of a document stream into bounded batches.

use std::num::NonZeroUsize;

/// Groups the items of `iter` into `Vec`s of exactly `size` items, with the
/// final batch possibly shorter. Purely mechanical: no reordering, no
/// failure modes.
pub fn batched<I>(iter: I, size: NonZeroUsize) -> Batches<I::IntoIter>
where
    I: IntoIterator,
{
    Batches {
        inner: iter.into_iter(),
        size,
    }
}

pub struct Batches<I> {
    inner: I,
    size: NonZeroUsize,
}

impl<I> Iterator for Batches<I>
where
    I: Iterator,
{
    type Item = Vec<I::Item>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut batch = Vec::with_capacity(self.size.get());
        while batch.len() < self.size.get() {
            match self.inner.next() {
                Some(item) => batch.push(item),
                None => break,
            }
        }
        if batch.is_empty() {
            None
        } else {
            Some(batch)
        }
    }
}
