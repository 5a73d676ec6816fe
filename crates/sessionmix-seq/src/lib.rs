// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! In-place sequence reconciliation helpers.
//!
//! The session list never rebuilds its rendered rows from scratch. Every
//! change is expressed as "compute where things should go" followed by
//! "move only what must move", using the three primitives in this crate:
//!
//! - [`sorted_permutation`] computes the target order of a sequence.
//! - [`apply_permutation`] walks the permutation cycles and reports each
//!   transposition, so a caller can mirror it on several parallel
//!   collections (items and rendered rows) at once.
//! - [`remove_indices`] compacts a sequence over a sorted set of deleted
//!   slots in one left-to-right pass.
//!
//! # Example
//!
//! ```
//! use sessionmix_seq::{apply_permutation, sorted_permutation};
//!
//! let mut names = vec!["mpv", "firefox", "discord"];
//! let permutation = sorted_permutation(&names, |a, b| a.cmp(b));
//! apply_permutation(permutation, |a, b| names.swap(a, b));
//! assert_eq!(names, ["discord", "firefox", "mpv"]);
//! ```

use std::cmp::Ordering;

/// Compute the permutation that sorts `items` under `compare`.
///
/// Returns `p` such that `items[p[i]]` is the i-th smallest element. The
/// sort is not stable; ties end up in whatever order the comparison sort
/// leaves them. `items` is not modified.
pub fn sorted_permutation<T, F>(items: &[T], mut compare: F) -> Vec<usize>
where
    F: FnMut(&T, &T) -> Ordering,
{
    let mut permutation: Vec<usize> = (0..items.len()).collect();
    permutation.sort_unstable_by(|&a, &b| compare(&items[a], &items[b]));
    permutation
}

/// Rearrange an external collection so that the element originally at
/// `permutation[i]` ends up at position `i`.
///
/// `swap(a, b)` is called once per transposition along each cycle of the
/// permutation (at most `n - 1` calls in total). The permutation vector is
/// used as scratch space, which is why it is taken by value.
///
/// `permutation` must be a permutation of `0..permutation.len()`.
pub fn apply_permutation<F>(mut permutation: Vec<usize>, mut swap: F)
where
    F: FnMut(usize, usize),
{
    for start in 0..permutation.len() {
        let mut offset = start;
        while permutation[offset] != start {
            let next = permutation[offset];
            swap(offset, next);
            permutation[offset] = offset;
            offset = next;
        }
        permutation[offset] = offset;
    }
}

/// Apply `permutation` to a single slice.
pub fn permute<T>(items: &mut [T], permutation: Vec<usize>) {
    debug_assert_eq!(items.len(), permutation.len());
    apply_permutation(permutation, |a, b| items.swap(a, b));
}

/// Split a permutation into the positions that actually move.
///
/// Returns `(from, to)` where the element at `from[k]` moves to `to[k]`.
/// Fixed points are left out, so an already sorted sequence yields two
/// empty vectors.
pub fn moved_positions(permutation: &[usize]) -> (Vec<usize>, Vec<usize>) {
    permutation
        .iter()
        .enumerate()
        .filter(|&(to, &from)| to != from)
        .map(|(to, &from)| (from, to))
        .unzip()
}

/// Remove the elements at `sorted_indices` by compacting the survivors to
/// the front of `items`, preserving their relative order.
///
/// Returns the new logical length. The removed elements are left in
/// `items[new_len..]` in unspecified order so the caller can truncate or
/// drain them. Each survivor is moved at most once.
///
/// `sorted_indices` must be strictly ascending and in bounds; this is not
/// checked in release builds.
pub fn remove_indices<T>(items: &mut [T], sorted_indices: &[usize]) -> usize {
    let Some(&first) = sorted_indices.first() else {
        return items.len();
    };
    debug_assert!(sorted_indices.windows(2).all(|w| w[0] < w[1]));
    debug_assert!(sorted_indices.last().is_some_and(|&last| last < items.len()));

    let len = items.len();
    let mut write = first;
    for (k, &index) in sorted_indices.iter().enumerate() {
        let run_end = sorted_indices.get(k + 1).copied().unwrap_or(len);
        for read in index + 1..run_end {
            items.swap(write, read);
            write += 1;
        }
    }
    write
}

/// Check that `items` is sorted under `compare`.
pub fn is_sorted_by<T, F>(items: &[T], mut compare: F) -> bool
where
    F: FnMut(&T, &T) -> Ordering,
{
    items
        .windows(2)
        .all(|w| compare(&w[0], &w[1]) != Ordering::Greater)
}
