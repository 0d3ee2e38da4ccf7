//! Indices over attribute sets that have already been classified, used to skip partition
//! computations whose outcome is implied.
//!
//! Every superset of a dependency is a dependency, and every subset of a non-dependency is a
//! non-dependency. So once some sets are classified, many others follow for free, provided we
//! can quickly answer "is some stored set a subset of this one?". [`SubsetIndex`] answers exactly
//! that, and the two pruning indices are thin wrappers around it.

use crate::Vertical;
use log::debug;
use std::collections::{HashMap, HashSet};

/// The default number of entries a bucket may hold before it gets split.
pub const DEFAULT_BUCKET_THRESHOLD: usize = 1000;

#[derive(Clone, Debug)]
enum Bucket {
    /// Every entry filed here is a superset of the bucket's key.
    Leaf(Vec<Vertical>),
    /// Entries were moved to the buckets one column larger. `exact` records whether the key
    /// itself is an entry.
    Split { exact: bool },
}

/// A set of attribute sets, supporting the query "does any stored set lie inside this one?".
///
/// Entries are filed into buckets keyed by attribute sets, starting with one bucket per column:
/// an entry goes into the bucket of every column it contains. Once a bucket holds more entries
/// than the threshold, it's rebalanced: each entry moves to the buckets keyed by the old key plus
/// one more of the entry's columns, and the old bucket only remembers that it was split. Queries
/// follow the same paths, restricted to the columns of the query, so they never need to look at
/// an entry with a column outside the query.
#[derive(Clone, Debug)]
pub struct SubsetIndex {
    arity: usize,
    threshold: usize,
    buckets: HashMap<Vertical, Bucket>,
    entries: HashSet<Vertical>,
}

impl SubsetIndex {
    /// Creates an empty index over attribute sets of the given arity.
    ///
    /// # Panics
    ///
    /// Panics if `threshold` is zero.
    pub fn new(arity: usize, threshold: usize) -> Self {
        assert!(threshold > 0, "bucket threshold must be positive");
        SubsetIndex {
            arity,
            threshold,
            buckets: HashMap::new(),
            entries: HashSet::new(),
        }
    }

    /// The number of stored sets.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no sets are stored.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns `true` if `set` itself is stored.
    pub fn contains(&self, set: &Vertical) -> bool {
        self.entries.contains(set)
    }

    /// The number of buckets, including ones that have been split.
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// Stores `set`. Returns `false` if it was already stored.
    ///
    /// ```
    /// use dfd::{SubsetIndex, Vertical};
    ///
    /// let mut index = SubsetIndex::new(4, 1000);
    /// index.add(&Vertical::new(4, &[0, 2]));
    /// assert!(index.contains_subset_of(&Vertical::new(4, &[0, 1, 2])));
    /// assert!(!index.contains_subset_of(&Vertical::new(4, &[0, 1, 3])));
    /// ```
    pub fn add(&mut self, set: &Vertical) -> bool {
        assert_eq!(set.arity(), self.arity, "attribute set has the wrong arity");
        if !self.entries.insert(set.clone()) {
            return false;
        }
        for key in self.keys_for(set) {
            self.file(key, set);
        }
        true
    }

    /// Removes `set`. Returns `false` if it wasn't stored.
    pub fn remove(&mut self, set: &Vertical) -> bool {
        if !self.entries.remove(set) {
            return false;
        }
        for key in self.keys_for(set) {
            let mut pending = vec![key];
            let mut seen = HashSet::new();
            while let Some(key) = pending.pop() {
                if !seen.insert(key.clone()) {
                    continue;
                }
                match self.buckets.get_mut(&key) {
                    None => {}
                    Some(Bucket::Leaf(entries)) => {
                        entries.retain(|entry| entry != set);
                        if entries.is_empty() {
                            self.buckets.remove(&key);
                        }
                    }
                    Some(Bucket::Split { exact }) if key == *set => *exact = false,
                    Some(Bucket::Split { .. }) => {
                        pending.extend(set.difference(&key).iter().map(|c| key.with_column(c)))
                    }
                }
            }
        }
        true
    }

    /// Returns `true` if some stored set is a subset of `query`.
    pub fn contains_subset_of(&self, query: &Vertical) -> bool {
        if self.entries.contains(&Vertical::empty(self.arity)) {
            return true;
        }

        let mut pending: Vec<Vertical> = query
            .iter()
            .map(|column| Vertical::single(self.arity, column))
            .collect();
        let mut seen = HashSet::new();
        while let Some(key) = pending.pop() {
            match self.buckets.get(&key) {
                None => {}
                Some(Bucket::Leaf(entries)) => {
                    if entries.iter().any(|entry| entry.is_subset(query)) {
                        return true;
                    }
                }
                Some(Bucket::Split { exact: true }) => return true,
                Some(Bucket::Split { exact: false }) => {
                    for column in query.difference(&key).iter() {
                        let child = key.with_column(column);
                        if seen.insert(child.clone()) {
                            pending.push(child);
                        }
                    }
                }
            }
        }
        false
    }

    /// Splits the bucket for `key` into buckets one column larger.
    ///
    /// This never changes the answer to any query; it only keeps buckets small. Rebalancing a
    /// bucket that was already split, or doesn't exist, does nothing.
    pub fn rebalance(&mut self, key: &Vertical) {
        let entries = match self.buckets.get_mut(key) {
            Some(Bucket::Leaf(entries)) => std::mem::take(entries),
            _ => return,
        };
        self.buckets
            .insert(key.clone(), Bucket::Split { exact: false });
        debug!(
            "rebalancing pruning bucket {:?} with {} entries",
            key,
            entries.len()
        );

        for entry in entries {
            if entry == *key {
                self.buckets
                    .insert(key.clone(), Bucket::Split { exact: true });
            } else {
                for column in entry.difference(key).iter() {
                    self.file(key.with_column(column), &entry);
                }
            }
        }
    }

    // The empty set has no columns, so it isn't filed anywhere; `contains_subset_of` checks for
    // it directly.
    fn keys_for(&self, set: &Vertical) -> Vec<Vertical> {
        set.iter()
            .map(|column| Vertical::single(self.arity, column))
            .collect()
    }

    // Files `entry` under `key`, descending through buckets that have been split.
    fn file(&mut self, key: Vertical, entry: &Vertical) {
        debug_assert!(key.is_subset(entry));
        let mut pending = vec![key];
        let mut seen = HashSet::new();
        while let Some(key) = pending.pop() {
            if !seen.insert(key.clone()) {
                continue;
            }
            match self.buckets.get_mut(&key) {
                None => {
                    self.buckets.insert(key, Bucket::Leaf(vec![entry.clone()]));
                }
                Some(Bucket::Leaf(entries)) => {
                    if !entries.contains(entry) {
                        entries.push(entry.clone());
                    }
                    if entries.len() > self.threshold {
                        self.rebalance(&key);
                    }
                }
                Some(Bucket::Split { exact }) if key == *entry => *exact = true,
                Some(Bucket::Split { .. }) => {
                    pending.extend(entry.difference(&key).iter().map(|c| key.with_column(c)))
                }
            }
        }
    }
}

/// Known dependencies for one right-hand side. Any superset of one of them is a dependency too.
#[derive(Clone, Debug)]
pub struct DependencyIndex {
    index: SubsetIndex,
}

impl DependencyIndex {
    /// Creates an empty index for attribute sets of the given arity.
    pub fn new(arity: usize, threshold: usize) -> Self {
        DependencyIndex {
            index: SubsetIndex::new(arity, threshold),
        }
    }

    /// The number of stored dependencies.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Returns `true` if no dependencies are stored.
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Records a dependency. Returns `false` without storing anything if it was already implied.
    pub fn add(&mut self, dependency: &Vertical) -> bool {
        !self.implies(dependency) && self.index.add(dependency)
    }

    /// Forgets a previously recorded dependency.
    pub fn remove(&mut self, dependency: &Vertical) -> bool {
        self.index.remove(dependency)
    }

    /// Returns `true` if `node` contains a recorded dependency, so it must be a dependency itself.
    pub fn implies(&self, node: &Vertical) -> bool {
        self.index.contains_subset_of(node)
    }

    /// Returns the members of `candidates` this index implies are dependencies.
    pub fn implied<'a>(&self, candidates: &'a [Vertical]) -> Vec<&'a Vertical> {
        candidates.iter().filter(|c| self.implies(c)).collect()
    }
}

/// Known non-dependencies for one right-hand side. Any subset of one of them is a non-dependency
/// too.
///
/// `N ⊇ X` exactly when the columns missing from `N` are a subset of the columns missing from
/// `X`, so this stores complements in a [`SubsetIndex`]. Complements are taken within the columns
/// other than the right-hand side, which no candidate contains.
#[derive(Clone, Debug)]
pub struct NonDependencyIndex {
    index: SubsetIndex,
    universe: Vertical,
}

impl NonDependencyIndex {
    /// Creates an empty index for the given arity and right-hand-side column.
    pub fn new(arity: usize, rhs: usize, threshold: usize) -> Self {
        NonDependencyIndex {
            index: SubsetIndex::new(arity, threshold),
            universe: Vertical::single(arity, rhs).complement(),
        }
    }

    /// The number of stored non-dependencies.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Returns `true` if no non-dependencies are stored.
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    fn missing(&self, node: &Vertical) -> Vertical {
        debug_assert!(node.is_subset(&self.universe));
        self.universe.difference(node)
    }

    /// Records a non-dependency. Returns `false` without storing anything if it was already
    /// implied.
    pub fn add(&mut self, non_dependency: &Vertical) -> bool {
        !self.implies(non_dependency) && self.index.add(&self.missing(non_dependency))
    }

    /// Forgets a previously recorded non-dependency.
    pub fn remove(&mut self, non_dependency: &Vertical) -> bool {
        let missing = self.missing(non_dependency);
        self.index.remove(&missing)
    }

    /// Returns `true` if `node` is contained in a recorded non-dependency, so it can't be a
    /// dependency.
    pub fn implies(&self, node: &Vertical) -> bool {
        self.index.contains_subset_of(&self.missing(node))
    }

    /// Returns the members of `candidates` this index implies are non-dependencies.
    pub fn implied<'a>(&self, candidates: &'a [Vertical]) -> Vec<&'a Vertical> {
        candidates.iter().filter(|c| self.implies(c)).collect()
    }
}
