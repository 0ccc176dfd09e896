// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Round-robin partitioning of an ordered batch of items.
//!
//! Item `i` always lands in partition `i % parts`, in ascending index order,
//! so partition sizes differ by at most one and the layout depends only on
//! the batch length and the number of parts.

use crate::error::{PoolError, Result};

/// Splits `items` into exactly `parts` round-robin subsequences.
///
/// Trailing partitions are empty (not omitted) when there are fewer items
/// than parts.
///
/// ```
/// use session_pool_core::split_items;
///
/// let parts = split_items((1..=10).collect(), 3).unwrap();
/// assert_eq!(parts, vec![vec![1, 4, 7, 10], vec![2, 5, 8], vec![3, 6, 9]]);
/// ```
pub fn split_items<T>(items: Vec<T>, parts: usize) -> Result<Vec<Vec<T>>> {
    if parts == 0 {
        return Err(PoolError::InvalidPartitionCount(parts));
    }

    let sizes = partition_sizes(items.len(), parts);
    let mut partitions: Vec<Vec<T>> = sizes.into_iter().map(Vec::with_capacity).collect();

    for (index, item) in items.into_iter().enumerate() {
        partitions[index % parts].push(item);
    }

    Ok(partitions)
}

/// Number of items each of the `parts` partitions receives for a batch of `len`
pub fn partition_sizes(len: usize, parts: usize) -> Vec<usize> {
    if parts == 0 {
        return Vec::new();
    }
    (0..parts)
        .map(|k| if k < len { (len - k).div_ceil(parts) } else { 0 })
        .collect()
}

/// Original indices in the order a flattened result presents them.
///
/// Partition 0's indices come first, then partition 1's, and so on. This is
/// the identity only when `parts == 1`.
pub fn interleave_order(len: usize, parts: usize) -> Vec<usize> {
    if parts == 0 {
        return Vec::new();
    }
    (0..parts)
        .flat_map(|k| (k..len).step_by(parts))
        .collect()
}
