use crate::{Partition, Relation, Vertical};
use log::{debug, trace};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

/// A memo table from attribute sets to their partitions, shared by every traversal of one run.
///
/// Partitions of single columns and of the empty set are available from the start. Any other
/// partition is computed the first time it's requested, by intersecting the partition of the set
/// minus one column with the partition of that column. Intermediate results are cached as well, so
/// requests for overlapping attribute sets share work.
///
/// Several threads may compute the same partition at once. Computation is deterministic, so
/// whichever result is stored first is equal to the others, and every caller gets that one.
pub struct PartitionCache {
    arity: usize,
    columns: Vec<Arc<Partition>>,
    index: RwLock<HashMap<Vertical, Arc<Partition>>>,
    hits: AtomicUsize,
    misses: AtomicUsize,
}

impl PartitionCache {
    /// Creates a cache seeded with the column partitions of `relation`.
    pub fn new(relation: &Relation) -> Self {
        let arity = relation.arity();
        let mut index = HashMap::with_capacity(2 * arity + 1);
        index.insert(
            Vertical::empty(arity),
            Arc::new(Partition::full(relation.row_count())),
        );
        for (column, partition) in relation.column_partitions().iter().enumerate() {
            index.insert(Vertical::single(arity, column), partition.clone());
        }

        PartitionCache {
            arity,
            columns: relation.column_partitions().to_vec(),
            index: RwLock::new(index),
            hits: AtomicUsize::new(0),
            misses: AtomicUsize::new(0),
        }
    }

    /// Get the number of requests served without computing anything.
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::Relaxed)
    }

    /// Get the number of partitions computed.
    pub fn misses(&self) -> usize {
        self.misses.load(Ordering::Relaxed)
    }

    /// The number of cached partitions.
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Returns `true` if nothing is cached. The empty set is always cached, so this is always
    /// `false`.
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Returns the cached partition for `vertical`, if there is one.
    pub fn get(&self, vertical: &Vertical) -> Option<Arc<Partition>> {
        self.read().get(vertical).cloned()
    }

    /// Returns the partition for `vertical`, computing and caching it if needed.
    ///
    /// # Panics
    ///
    /// Panics if `vertical` belongs to a schema of different arity.
    pub fn get_or_compute(&self, vertical: &Vertical) -> Arc<Partition> {
        assert_eq!(
            vertical.arity(),
            self.arity,
            "attribute set does not belong to this relation"
        );

        // Pick the column to split off while holding the read lock only once: prefer a column
        // whose removal leaves an already-cached set.
        let split = {
            let index = self.read();
            if let Some(partition) = index.get(vertical) {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return partition.clone();
            }
            vertical
                .iter()
                .find(|&column| index.contains_key(&vertical.without_column(column)))
        };
        // The empty set and every single column are seeded, so anything missing has at least two
        // columns.
        let column = match split.or_else(|| vertical.last()) {
            Some(column) => column,
            None => unreachable!("the empty attribute set is always cached"),
        };

        let parent = self.get_or_compute(&vertical.without_column(column));
        self.misses.fetch_add(1, Ordering::Relaxed);
        trace!(
            "computing partition for {:?} from {:?} and column {}",
            vertical,
            vertical.without_column(column),
            column
        );
        let partition = Arc::new(parent.intersect(&self.columns[column]));

        let mut index = self.index.write().unwrap_or_else(PoisonError::into_inner);
        index
            .entry(vertical.clone())
            .or_insert(partition)
            .clone()
    }

    /// Tests whether `lhs` functionally determines the column `rhs`.
    ///
    /// Both the partition of `lhs` and the partition of `lhs` plus `rhs` end up cached, since the
    /// latter is a likely parent of sets visited later.
    pub fn determines(&self, lhs: &Vertical, rhs: usize) -> bool {
        let lhs_partition = self.get_or_compute(lhs);
        if lhs_partition.is_unique() {
            return true;
        }
        let refined = self.get_or_compute(&lhs.with_column(rhs));
        refined.key_error() == lhs_partition.key_error()
    }

    /// Logs hit and miss counts.
    pub fn log_statistics(&self) {
        debug!(
            "partition cache: {} entries, {} hits, {} misses",
            self.len(),
            self.hits(),
            self.misses()
        );
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<Vertical, Arc<Partition>>> {
        // Entries are inserted whole, so a writer that panicked can't have left the map
        // inconsistent.
        self.index.read().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for PartitionCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PartitionCache")
            .field("entries", &self.len())
            .field("hits", &self.hits())
            .field("misses", &self.misses())
            .finish()
    }
}
