//! Contiguous near-equal sharding of a symbol list.
//!
//! Shard `i` of `n` covers `[floor(i*len/n), floor((i+1)*len/n))`, so sizes
//! differ by at most one and the list is covered exactly once. Shards may be
//! empty when there are more workers than symbols.

use super::Shard;

/// Boundaries `floor(i * len / workers)` for `i in 0..=workers`.
pub fn bounds(len: usize, workers: usize) -> Vec<usize> {
    let workers = workers.max(1);
    (0..=workers).map(|i| i * len / workers).collect()
}

/// Split `symbols` into `workers` shards for `round`.
pub fn partition(symbols: &[String], workers: usize, round: usize) -> Vec<Shard> {
    bounds(symbols.len(), workers)
        .windows(2)
        .enumerate()
        .map(|(index, w)| Shard {
            round,
            index,
            offset: w[0],
            symbols: symbols[w[0]..w[1]].to_vec(),
        })
        .collect()
}
