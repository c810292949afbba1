//! # Treap Index
//!
//! A randomized size-balanced binary search tree with rank selection.
//! Each node carries a subtree-size counter and a random priority; the
//! tree is a BST over keys and a max-heap over priorities, which keeps
//! the expected depth logarithmic with no rebalancing bookkeeping.
//!
//! Used to pick the most-recent-K messages by recency rank without
//! sorting the whole store, and sized for future range queries.

use std::cmp::Ordering;

type Link<K, V> = Option<Box<Node<K, V>>>;

#[derive(Debug)]
struct Node<K, V> {
    key: K,
    value: V,
    priority: u64,
    size: usize,
    left: Link<K, V>,
    right: Link<K, V>,
}

impl<K, V> Node<K, V> {
    fn new(key: K, value: V) -> Self {
        Self {
            key,
            value,
            priority: rand::random(),
            size: 1,
            left: None,
            right: None,
        }
    }

    fn update(&mut self) {
        self.size = 1 + size(&self.left) + size(&self.right);
    }
}

fn size<K, V>(link: &Link<K, V>) -> usize {
    link.as_ref().map_or(0, |n| n.size)
}

fn merge<K, V>(a: Link<K, V>, b: Link<K, V>) -> Link<K, V> {
    match (a, b) {
        (None, b) => b,
        (a, None) => a,
        (Some(mut u), Some(mut v)) => {
            if u.priority > v.priority {
                u.right = merge(u.right.take(), Some(v));
                u.update();
                Some(u)
            } else {
                v.left = merge(Some(u), v.left.take());
                v.update();
                Some(v)
            }
        }
    }
}

/// Split into the `n` smallest elements and the remainder.
fn split_at<K, V>(link: Link<K, V>, n: usize) -> (Link<K, V>, Link<K, V>) {
    match link {
        None => (None, None),
        Some(mut u) => {
            if size(&u.left) >= n {
                let (l, r) = split_at(u.left.take(), n);
                u.left = r;
                u.update();
                (l, Some(u))
            } else {
                let rest = n - size(&u.left) - 1;
                let (l, r) = split_at(u.right.take(), rest);
                u.right = l;
                u.update();
                (Some(u), r)
            }
        }
    }
}

/// Split into keys strictly below `key` and the rest.
fn split_lt<K: Ord, V>(link: Link<K, V>, key: &K) -> (Link<K, V>, Link<K, V>) {
    match link {
        None => (None, None),
        Some(mut u) => {
            if u.key < *key {
                let (l, r) = split_lt(u.right.take(), key);
                u.right = l;
                u.update();
                (Some(u), r)
            } else {
                let (l, r) = split_lt(u.left.take(), key);
                u.left = r;
                u.update();
                (l, Some(u))
            }
        }
    }
}

/// Ordered, rank-indexed key/value storage. Duplicate keys are allowed;
/// their relative order is unspecified.
#[derive(Debug, Default)]
pub struct TreapIndex<K, V> {
    root: Link<K, V>,
}

impl<K: Ord, V> TreapIndex<K, V> {
    pub fn new() -> Self {
        Self { root: None }
    }

    pub fn len(&self) -> usize {
        size(&self.root)
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    /// Insert a key/value pair. Expected O(log n).
    pub fn insert(&mut self, key: K, value: V) {
        let (below, rest) = split_lt(self.root.take(), &key);
        let node = Some(Box::new(Node::new(key, value)));
        self.root = merge(merge(below, node), rest);
    }

    /// The `i`-th smallest element (0-based). Expected O(log n).
    pub fn rank_select(&self, mut i: usize) -> Option<(&K, &V)> {
        let mut cur = self.root.as_deref()?;
        if i >= cur.size {
            return None;
        }
        loop {
            let left_size = size(&cur.left);
            match i.cmp(&left_size) {
                Ordering::Less => match cur.left.as_deref() {
                    Some(next) => cur = next,
                    None => return None,
                },
                Ordering::Equal => return Some((&cur.key, &cur.value)),
                Ordering::Greater => {
                    i -= left_size + 1;
                    match cur.right.as_deref() {
                        Some(next) => cur = next,
                        None => return None,
                    }
                }
            }
        }
    }

    /// Partition into the `n` smallest elements and the remainder. If the
    /// tree holds fewer than `n` elements the remainder is empty.
    pub fn split(self, n: usize) -> (Self, Self) {
        let (l, r) = split_at(self.root, n);
        (Self { root: l }, Self { root: r })
    }

    /// Join two treaps. Every key in `left` must be `<=` every key in
    /// `right`; the merge preserves the search-tree and heap invariants.
    pub fn merge(left: Self, right: Self) -> Self {
        Self {
            root: merge(left.root, right.root),
        }
    }

    /// In-order (ascending key) iteration.
    pub fn iter(&self) -> Iter<'_, K, V> {
        let mut iter = Iter { stack: Vec::new() };
        iter.push_left(self.root.as_deref());
        iter
    }
}

pub struct Iter<'a, K, V> {
    stack: Vec<&'a Node<K, V>>,
}

impl<'a, K, V> Iter<'a, K, V> {
    fn push_left(&mut self, mut link: Option<&'a Node<K, V>>) {
        while let Some(node) = link {
            self.stack.push(node);
            link = node.left.as_deref();
        }
    }
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        self.push_left(node.right.as_deref());
        Some((&node.key, &node.value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(keys: &[i64]) -> TreapIndex<i64, usize> {
        let mut treap = TreapIndex::new();
        for (pos, &key) in keys.iter().enumerate() {
            treap.insert(key, pos);
        }
        treap
    }

    #[test]
    fn test_empty() {
        let treap: TreapIndex<i64, ()> = TreapIndex::new();
        assert!(treap.is_empty());
        assert_eq!(treap.len(), 0);
        assert_eq!(treap.rank_select(0), None);
        assert_eq!(treap.iter().count(), 0);
    }

    #[test]
    fn test_rank_select_matches_sorted_reference() {
        let keys = [41, 7, 23, 0, -5, 99, 12, 3, 8, 77, 7];
        let treap = build(&keys);
        let mut sorted = keys.to_vec();
        sorted.sort();

        assert_eq!(treap.len(), keys.len());
        for (i, expected) in sorted.iter().enumerate() {
            let (key, _) = treap.rank_select(i).unwrap();
            assert_eq!(key, expected, "rank {i}");
        }
        assert_eq!(treap.rank_select(keys.len()), None);
    }

    #[test]
    fn test_iter_is_sorted() {
        let keys = [5, 1, 4, 1, 3, 9, 2, 6];
        let treap = build(&keys);
        let collected: Vec<i64> = treap.iter().map(|(&k, _)| k).collect();
        let mut sorted = keys.to_vec();
        sorted.sort();
        assert_eq!(collected, sorted);
    }

    #[test]
    fn test_split_then_merge_reconstructs() {
        let keys: Vec<i64> = (0i64..200).map(|i| (i * 37) % 101).collect();
        for cut in [0, 1, 50, 199, 200, 500] {
            let treap = build(&keys);
            let (left, right) = treap.split(cut);
            assert_eq!(left.len(), cut.min(keys.len()));
            assert_eq!(left.len() + right.len(), keys.len());

            // Left part holds the smallest elements.
            let boundary = left.iter().map(|(&k, _)| k).max();
            let rest_min = right.iter().map(|(&k, _)| k).min();
            if let (Some(hi), Some(lo)) = (boundary, rest_min) {
                assert!(hi <= lo);
            }

            let rejoined = TreapIndex::merge(left, right);
            let collected: Vec<i64> = rejoined.iter().map(|(&k, _)| k).collect();
            let mut sorted = keys.clone();
            sorted.sort();
            assert_eq!(collected, sorted);
        }
    }

    #[test]
    fn test_split_sizes_are_exact() {
        let treap = build(&[10, 20, 30, 40, 50]);
        let (left, right) = treap.split(2);
        let left_keys: Vec<i64> = left.iter().map(|(&k, _)| k).collect();
        let right_keys: Vec<i64> = right.iter().map(|(&k, _)| k).collect();
        assert_eq!(left_keys, vec![10, 20]);
        assert_eq!(right_keys, vec![30, 40, 50]);
    }

    #[test]
    fn test_duplicate_keys_all_retained() {
        let treap = build(&[7, 7, 7, 7]);
        assert_eq!(treap.len(), 4);
        for i in 0..4 {
            assert_eq!(treap.rank_select(i).map(|(&k, _)| k), Some(7));
        }
    }

    #[test]
    fn test_values_follow_keys() {
        let mut treap = TreapIndex::new();
        treap.insert(30, "c");
        treap.insert(10, "a");
        treap.insert(20, "b");
        assert_eq!(treap.rank_select(0), Some((&10, &"a")));
        assert_eq!(treap.rank_select(1), Some((&20, &"b")));
        assert_eq!(treap.rank_select(2), Some((&30, &"c")));
    }
}
