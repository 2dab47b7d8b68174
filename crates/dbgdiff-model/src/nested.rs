//! Nested tables and the common-prefix walk over two of them.

use std::collections::BTreeMap;

/// A tree of ordered maps with values at the leaves.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Nested<K, V> {
    Leaf(V),
    Branch(BTreeMap<K, Self>),
}

impl<K: Ord, V> Default for Nested<K, V> {
    fn default() -> Self {
        Self::Branch(BTreeMap::new())
    }
}

impl<K: Ord, V> Nested<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Leaf value at `path`, created with `V::default()` when missing.
    ///
    /// All paths inserted into one tree are expected to have the same length;
    /// a shorter path replaces the subtree it lands on.
    pub fn entry<I>(&mut self, path: I) -> &mut V
    where
        I: IntoIterator<Item = K>,
        V: Default,
    {
        let mut node = self;
        for key in path {
            if matches!(node, Self::Leaf(_)) {
                *node = Self::default();
            }
            node = match node {
                Self::Branch(children) => children.entry(key).or_default(),
                Self::Leaf(_) => unreachable!("leaf replaced by branch"),
            };
        }
        if !matches!(node, Self::Leaf(_)) {
            *node = Self::Leaf(V::default());
        }
        match node {
            Self::Leaf(value) => value,
            Self::Branch(_) => unreachable!("branch replaced by leaf"),
        }
    }

    /// Subtree at `path`.
    pub fn get(&self, path: &[K]) -> Option<&Self> {
        path.iter().try_fold(self, |node, key| match node {
            Self::Branch(children) => children.get(key),
            Self::Leaf(_) => None,
        })
    }

    /// The leaf reached by always taking the first child.
    pub fn first_leaf(&self) -> Option<&V> {
        match self {
            Self::Leaf(value) => Some(value),
            Self::Branch(children) => children.values().next()?.first_leaf(),
        }
    }

    /// Every leaf with its key path.
    pub fn leaves(&self) -> Vec<(Vec<&K>, &V)> {
        let mut out = Vec::new();
        let mut path = Vec::new();
        collect_leaves(self, &mut path, &mut out);
        out
    }
}

fn collect_leaves<'a, K, V>(node: &'a Nested<K, V>, path: &mut Vec<&'a K>, out: &mut Vec<(Vec<&'a K>, &'a V)>) {
    match node {
        Nested::Leaf(value) => out.push((path.clone(), value)),
        Nested::Branch(children) => {
            for (key, child) in children {
                path.push(key);
                collect_leaves(child, path, out);
                path.pop();
            }
        }
    }
}

/// Key paths present in both trees down to `depth`, with one leaf from each side.
///
/// When `depth` stops above the leaves, the first leaf beneath each side is
/// reported. When `depth` exceeds the nesting, the walk stops at the leaves.
pub fn common_prefix<'a, K: Ord, V>(
    a: &'a Nested<K, V>,
    b: &'a Nested<K, V>,
    depth: usize,
) -> Vec<(Vec<&'a K>, &'a V, &'a V)> {
    let mut out = Vec::new();
    let mut path = Vec::new();
    walk_common(a, b, depth, &mut path, &mut out);
    out
}

fn walk_common<'a, K: Ord, V>(
    a: &'a Nested<K, V>,
    b: &'a Nested<K, V>,
    depth: usize,
    path: &mut Vec<&'a K>,
    out: &mut Vec<(Vec<&'a K>, &'a V, &'a V)>,
) {
    match (a, b) {
        (Nested::Branch(left), Nested::Branch(right)) if depth > 0 => {
            for (key, child) in left {
                if let Some(other) = right.get(key) {
                    path.push(key);
                    walk_common(child, other, depth - 1, path, out);
                    path.pop();
                }
            }
        }
        _ => {
            if let (Some(x), Some(y)) = (a.first_leaf(), b.first_leaf()) {
                out.push((path.clone(), x, y));
            }
        }
    }
}

/// Leaf-level keys shared by both trees, ignoring every level above them.
///
/// Each side is flattened to `last key → value`; when a key occurs under
/// several prefixes the first one in key order wins.
pub fn common_addresses<'a, K: Ord, V>(a: &'a Nested<K, V>, b: &'a Nested<K, V>) -> Vec<(&'a K, &'a V, &'a V)> {
    let flatten = |tree: &'a Nested<K, V>| {
        let mut flat: BTreeMap<&'a K, &'a V> = BTreeMap::new();
        for (path, value) in tree.leaves() {
            if let Some(last) = path.last() {
                flat.entry(*last).or_insert(value);
            }
        }
        flat
    };
    let right = flatten(b);
    flatten(a)
        .into_iter()
        .filter_map(|(key, x)| right.get(key).map(|y| (key, x, *y)))
        .collect()
}
