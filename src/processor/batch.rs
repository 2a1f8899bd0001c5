//! Fixed-size wave scheduling: each chunk runs concurrently and must finish
//! completely before the next one starts.

use futures::future::join_all;
use std::future::Future;

/// Drives `items` through `operation` in contiguous chunks of `batch_size`.
///
/// At most `batch_size` operations are in flight at once. Results come back in
/// input order. A `batch_size` of zero is treated as one.
pub async fn run_in_batches<T, F, Fut>(items: Vec<T>, batch_size: usize, operation: F) -> Vec<Fut::Output>
where
    F: Fn(T) -> Fut,
    Fut: Future,
{
    let batch_size = batch_size.max(1);
    let mut results = Vec::with_capacity(items.len());
    let mut remaining = items.into_iter().peekable();

    while remaining.peek().is_some() {
        let wave: Vec<Fut> = remaining.by_ref().take(batch_size).map(&operation).collect();
        results.extend(join_all(wave).await);
    }

    results
}
