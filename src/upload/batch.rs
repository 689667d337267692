//! Contiguous batching of results.

/// Splits `items` into contiguous batches of at most `size` items.
///
/// Order is preserved within and across batches. A `size` of zero is
/// treated as one.
pub fn partition<T>(items: Vec<T>, size: usize) -> Vec<Vec<T>> {
    let size = size.max(1);
    let mut batches = Vec::with_capacity(items.len().div_ceil(size));
    let mut iter = items.into_iter().peekable();
    while iter.peek().is_some() {
        batches.push(iter.by_ref().take(size).collect());
    }
    batches
}
