// Copyright (c) Walrus Foundation
// SPDX-License-Identifier: Apache-2.0

//! Small helpers shared across the client.

use core::fmt::Display;

use rand::seq::SliceRandom;

/// A result carrying the shard weight of the storage node that produced it.
pub trait WeightedResult {
    /// The success type of the result.
    type Inner;
    /// The error type of the result.
    type Error;

    /// The shard weight of the result.
    fn weight(&self) -> usize;

    /// A reference to the inner result.
    fn inner_result(&self) -> &Result<Self::Inner, Self::Error>;

    /// Consumes `self` and returns the inner result.
    fn take_inner_result(self) -> Result<Self::Inner, Self::Error>;
}

/// Returns the first eight characters of the display representation, used to identify keys in
/// logs without flooding them.
pub fn string_prefix<T: Display>(value: &T) -> String {
    let mut string = value.to_string();
    string.truncate(8);
    string
}

/// Shuffles `items` such that items with a larger weight are more likely to appear early.
///
/// This is a weighted sampling without replacement: high-weight storage nodes are preferred,
/// while every node still appears exactly once.
pub fn weighted_shuffle<T>(items: Vec<T>, weight: impl Fn(&T) -> usize) -> Vec<T> {
    let mut rng = rand::thread_rng();
    // Fall back to a plain shuffle if all weights are zero or sampling fails.
    let total_weight: usize = items.iter().map(&weight).sum();
    if total_weight == 0 {
        let mut items = items;
        items.shuffle(&mut rng);
        return items;
    }

    let mut indices: Vec<usize> = (0..items.len()).collect();
    let sampled: Vec<usize> = match indices
        .clone()
        .choose_multiple_weighted(&mut rng, items.len(), |index| weight(&items[*index]) as f64)
    {
        Ok(iter) => iter.copied().collect(),
        Err(_) => {
            indices.shuffle(&mut rng);
            indices
        }
    };

    let mut slots: Vec<Option<T>> = items.into_iter().map(Some).collect();
    sampled
        .into_iter()
        .map(|index| slots[index].take().expect("each index is sampled once"))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_prefix_truncates_long_values() {
        assert_eq!(string_prefix(&"abcdefghijkl"), "abcdefgh");
        assert_eq!(string_prefix(&"abc"), "abc");
    }

    #[test]
    fn weighted_shuffle_is_a_permutation() {
        let items: Vec<u32> = (0..20).collect();
        let mut shuffled = weighted_shuffle(items.clone(), |i| (*i as usize) + 1);
        shuffled.sort_unstable();
        assert_eq!(shuffled, items);
    }

    #[test]
    fn weighted_shuffle_prefers_heavy_items() {
        // One item carries almost all the weight; it should be first most of the time.
        let mut first_counts = 0;
        for _ in 0..200 {
            let items = vec![1usize, 1, 1, 10_000];
            let shuffled = weighted_shuffle(items, |w| *w);
            if shuffled[0] == 10_000 {
                first_counts += 1;
            }
        }
        assert!(first_counts > 150, "heavy item was first {first_counts}/200 times");
    }

    #[test]
    fn zero_weights_still_shuffle() {
        let items: Vec<u32> = (0..5).collect();
        let mut shuffled = weighted_shuffle(items.clone(), |_| 0);
        shuffled.sort_unstable();
        assert_eq!(shuffled, items);
    }
}
