//! Posting-list set algebra
//!
//! Intersection and union over sorted identifier slices. Both produce
//! ascending, duplicate-free output.
//!
//! # Intersection
//!
//! ```text
//! heap of (head, list):   [3:a] [5:b] [9:c]
//!   pop every list whose head == min (3)
//!   matched 1 of 3 → min cannot be in the result
//!   gallop list a forward to the next smallest head (5)
//! ```
//!
//! Galloping (doubling bound, then binary search) makes skipping through a
//! long list cheap when it is intersected with a short one.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

/// Cursor over one sorted posting list
#[derive(Debug, Clone)]
pub struct PostingIter<'a, T> {
    list: &'a [T],
    pos: usize,
}

impl<'a, T: Ord + Copy> PostingIter<'a, T> {
    pub fn new(list: &'a [T]) -> Self {
        Self { list, pos: 0 }
    }

    /// Element under the cursor, `None` once exhausted
    #[inline]
    pub fn current(&self) -> Option<T> {
        self.list.get(self.pos).copied()
    }

    #[inline]
    pub fn is_exhausted(&self) -> bool {
        self.pos >= self.list.len()
    }

    /// Move to the first element `>= target`
    pub fn advance_to(&mut self, target: T) {
        self.gallop(|x| *x < target);
    }

    /// Move to the first element `> value`, skipping duplicates
    pub fn advance_past(&mut self, value: T) {
        self.gallop(|x| *x <= value);
    }

    /// Skip the prefix of elements satisfying `below` (which must be monotone)
    fn gallop<F: Fn(&T) -> bool>(&mut self, below: F) {
        let len = self.list.len();
        if self.pos >= len || !below(&self.list[self.pos]) {
            return;
        }

        let mut lo = self.pos;
        let mut step = 1;
        while lo + step < len && below(&self.list[lo + step]) {
            lo += step;
            step *= 2;
        }

        let hi = (lo + step).min(len);
        self.pos = lo + 1 + self.list[lo + 1..hi].partition_point(|x| below(x));
    }
}

/// Elements present in every input set
///
/// Empty input, or any empty member, yields an empty result.
pub fn intersect<T: Ord + Copy>(sets: &[&[T]]) -> Vec<T> {
    if sets.is_empty() || sets.iter().any(|s| s.is_empty()) {
        return Vec::new();
    }

    let n = sets.len();
    let mut iters: Vec<PostingIter<'_, T>> = sets.iter().map(|s| PostingIter::new(s)).collect();
    let mut heap: BinaryHeap<Reverse<(T, usize)>> = BinaryHeap::with_capacity(n);
    for (i, it) in iters.iter().enumerate() {
        if let Some(head) = it.current() {
            heap.push(Reverse((head, i)));
        }
    }

    let mut out = Vec::new();
    let mut matched = Vec::with_capacity(n);

    while let Some(&Reverse((min, _))) = heap.peek() {
        matched.clear();
        while let Some(&Reverse((head, i))) = heap.peek() {
            if head != min {
                break;
            }
            heap.pop();
            matched.push(i);
        }

        let next_min = heap.peek().map(|Reverse((head, _))| *head);
        if matched.len() == n {
            out.push(min);
        }

        for &i in &matched {
            let it = &mut iters[i];
            match next_min {
                // Nothing below the smallest remaining head can be common
                Some(target) => it.advance_to(target),
                None => it.advance_past(min),
            }
            match it.current() {
                Some(head) => heap.push(Reverse((head, i))),
                None => return out,
            }
        }
    }

    out
}

/// Deduplicated merge of all input sets
pub fn union<T: Ord + Copy>(sets: &[&[T]]) -> Vec<T> {
    let mut iters: Vec<PostingIter<'_, T>> = sets.iter().map(|s| PostingIter::new(s)).collect();
    let mut heap: BinaryHeap<Reverse<(T, usize)>> = BinaryHeap::with_capacity(sets.len());
    for (i, it) in iters.iter().enumerate() {
        if let Some(head) = it.current() {
            heap.push(Reverse((head, i)));
        }
    }

    let mut out: Vec<T> = Vec::with_capacity(sets.iter().map(|s| s.len()).max().unwrap_or(0));
    while let Some(Reverse((head, i))) = heap.pop() {
        if out.last() != Some(&head) {
            out.push(head);
        }
        let it = &mut iters[i];
        it.advance_past(head);
        if let Some(next) = it.current() {
            heap.push(Reverse((next, i)));
        }
    }

    out
}

/// Sort and deduplicate a posting list in place
pub fn normalize<T: Ord>(list: &mut Vec<T>) {
    list.sort_unstable();
    list.dedup();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn naive_intersect(sets: &[Vec<u64>]) -> Vec<u64> {
        let mut iter = sets.iter().map(|s| s.iter().copied().collect::<BTreeSet<_>>());
        let first = match iter.next() {
            Some(first) => first,
            None => return Vec::new(),
        };
        iter.fold(first, |acc, s| acc.intersection(&s).copied().collect())
            .into_iter()
            .collect()
    }

    /// Small deterministic generator so tests stay reproducible
    fn pseudo_random_set(seed: u64, len: usize, modulus: u64) -> Vec<u64> {
        let mut state = seed;
        let mut out: Vec<u64> = (0..len)
            .map(|_| {
                state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                (state >> 33) % modulus
            })
            .collect();
        out.sort_unstable();
        out
    }

    #[test]
    fn test_intersect_basic() {
        let a = [1u64, 3, 5, 7, 9];
        let b = [3u64, 4, 5, 9, 10];
        let c = [0u64, 3, 9, 11];
        assert_eq!(intersect(&[&a[..], &b[..], &c[..]]), vec![3, 9]);
    }

    #[test]
    fn test_intersect_order_independent() {
        let a = [1u64, 3, 5, 7, 9];
        let b = [3u64, 4, 5, 9, 10];
        let c = [0u64, 3, 5, 9, 11];
        let expected = vec![3, 5, 9];
        assert_eq!(intersect(&[&a[..], &b[..], &c[..]]), expected);
        assert_eq!(intersect(&[&c[..], &a[..], &b[..]]), expected);
        assert_eq!(intersect(&[&b[..], &c[..], &a[..]]), expected);
    }

    #[test]
    fn test_intersect_empty_cases() {
        let a = [1u64, 2, 3];
        let empty: [u64; 0] = [];
        assert!(intersect::<u64>(&[]).is_empty());
        assert!(intersect(&[&a[..], &empty[..]]).is_empty());
        assert!(intersect(&[&[1u64, 2][..], &[3u64, 4][..]]).is_empty());
    }

    #[test]
    fn test_intersect_single_set_dedups() {
        let a = [1u64, 1, 2, 2, 2, 5];
        assert_eq!(intersect(&[&a[..]]), vec![1, 2, 5]);
    }

    #[test]
    fn test_intersect_with_duplicates() {
        let a = [1u64, 1, 4, 4, 4, 8];
        let b = [1u64, 4, 4, 8, 8];
        assert_eq!(intersect(&[&a[..], &b[..]]), vec![1, 4, 8]);
    }

    #[test]
    fn test_intersect_skewed_sizes() {
        let long: Vec<u64> = (0..10_000).collect();
        let short = [17u64, 4_096, 9_999, 20_000];
        assert_eq!(intersect(&[&long[..], &short[..]]), vec![17, 4_096, 9_999]);
    }

    #[test]
    fn test_intersect_matches_naive() {
        for seed in 1..20u64 {
            let sets = vec![
                pseudo_random_set(seed, 200, 300),
                pseudo_random_set(seed * 31, 50, 300),
                pseudo_random_set(seed * 977, 400, 300),
            ];
            let slices: Vec<&[u64]> = sets.iter().map(|s| s.as_slice()).collect();
            assert_eq!(intersect(&slices), naive_intersect(&sets), "seed {}", seed);
        }
    }

    #[test]
    fn test_union_basic() {
        let a = [1u64, 3, 5];
        let b = [2u64, 3, 6];
        let c = [5u64, 5, 7];
        assert_eq!(union(&[&a[..], &b[..], &c[..]]), vec![1, 2, 3, 5, 6, 7]);
        assert_eq!(union(&[&c[..], &b[..], &a[..]]), vec![1, 2, 3, 5, 6, 7]);
    }

    #[test]
    fn test_union_empty_cases() {
        let empty: [u64; 0] = [];
        assert!(union::<u64>(&[]).is_empty());
        assert_eq!(union(&[&empty[..], &[4u64][..]]), vec![4]);
    }

    #[test]
    fn test_union_matches_naive() {
        for seed in 1..10u64 {
            let sets = vec![
                pseudo_random_set(seed, 100, 150),
                pseudo_random_set(seed * 7, 30, 150),
            ];
            let slices: Vec<&[u64]> = sets.iter().map(|s| s.as_slice()).collect();
            let expected: Vec<u64> = sets
                .iter()
                .flatten()
                .copied()
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect();
            assert_eq!(union(&slices), expected);
        }
    }

    #[test]
    fn test_posting_iter_gallop() {
        let list = [1u64, 2, 4, 8, 16, 32, 64];
        let mut it = PostingIter::new(&list);
        it.advance_to(9);
        assert_eq!(it.current(), Some(16));
        it.advance_past(16);
        assert_eq!(it.current(), Some(32));
        it.advance_to(1);
        assert_eq!(it.current(), Some(32));
        it.advance_past(64);
        assert!(it.is_exhausted());
        assert_eq!(it.current(), None);
    }
}
