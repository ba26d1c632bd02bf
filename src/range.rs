// Copyright 2025 The parabench developers
//
// Licensed under the Apache License, Version 2.0
// <https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <https://opensource.org/licenses/MIT>, at your option. This file may not
// be copied, modified, or distributed except according to those terms.

//! Partitioning of the input into one contiguous slice per worker thread.

/// A contiguous range of the input, handed to one worker thread.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Slice {
    /// Index of the worker thread that owns this slice.
    pub id: usize,
    /// Index of the first element.
    pub offset: usize,
    /// Number of elements.
    pub len: usize,
}

impl Slice {
    /// Returns the range of indices covered by this slice.
    pub fn range(&self) -> std::ops::Range<usize> {
        self.offset..self.offset + self.len
    }
}

/// Splits `0..num_elements` into `num_threads` fixed, non-overlapping ranges.
///
/// The ranges are contiguous and ordered by thread index. When `num_threads`
/// divides `num_elements` all the ranges have the same length, otherwise their
/// lengths differ by at most one.
pub fn partition(num_elements: usize, num_threads: usize) -> Vec<Slice> {
    let len = num_elements / num_threads;
    let remainder = num_elements % num_threads;
    (0..num_threads)
        .map(|id| {
            if remainder == 0 {
                return Slice {
                    id,
                    offset: id * len,
                    len,
                };
            }
            // Equivalent to `id * num_elements / num_threads`, without
            // overflowing the intermediate product.
            let start = id * len + (id * remainder) / num_threads;
            let end = (id + 1) * len + ((id + 1) * remainder) / num_threads;
            Slice {
                id,
                offset: start,
                len: end - start,
            }
        })
        .collect()
}
