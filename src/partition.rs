use std::collections::HashMap;
use std::hash::Hash;
use std::sync::OnceLock;

/// Row positions are stored as `u32` to halve the memory of large partitions. A
/// [`Relation`][crate::Relation] refuses to load more rows than that can index.
pub type RowIndex = u32;

/// Probing tables use this id for rows which are not in any cluster.
const SINGLETON: u32 = 0;

/// A stripped partition, also known as a position list index: the rows of a relation grouped into
/// clusters which agree on the values of some attribute set.
///
/// Rows which share their value with no other row would form singleton clusters. Those carry no
/// information for dependency checks, so they are left out, and a partition only stores clusters
/// of at least two rows.
///
/// Partitions are kept in a canonical form: rows within a cluster are ascending and clusters are
/// ordered by their first row. Two partitions describing the same grouping therefore compare
/// equal no matter how they were computed.
#[derive(Clone, Debug)]
pub struct Partition {
    clusters: Vec<Vec<RowIndex>>,
    /// Total number of rows across all clusters.
    size: usize,
    row_count: usize,
    // Maps every row to its cluster id plus one, or to `SINGLETON`. Built the first time this
    // partition is probed during an intersection.
    probing_table: OnceLock<Box<[u32]>>,
}

impl PartialEq for Partition {
    fn eq(&self, other: &Self) -> bool {
        self.row_count == other.row_count && self.clusters == other.clusters
    }
}

impl Eq for Partition {}

impl Partition {
    /// Groups rows by value.
    ///
    /// Each element of `values` is one row's value, with `None` standing for null. When
    /// `null_equals_null` is set, all null rows fall into one cluster; otherwise every null is
    /// distinct from everything, including other nulls.
    ///
    /// ```
    /// use dfd::Partition;
    ///
    /// let p = Partition::build(&[Some("x"), Some("y"), Some("x"), None, None], true);
    /// assert_eq!(p.clusters().collect::<Vec<_>>(), vec![&[0, 2][..], &[3, 4][..]]);
    ///
    /// let p = Partition::build(&[Some("x"), Some("y"), Some("x"), None, None], false);
    /// assert_eq!(p.clusters().collect::<Vec<_>>(), vec![&[0, 2][..]]);
    /// ```
    ///
    /// # Panics
    ///
    /// Panics if there are more rows than a [`RowIndex`] can address.
    pub fn build<K: Hash + Eq>(values: &[Option<K>], null_equals_null: bool) -> Self {
        assert!(
            values.len() <= RowIndex::MAX as usize,
            "too many rows for a partition"
        );

        let mut groups: HashMap<&K, Vec<RowIndex>> = HashMap::new();
        let mut nulls = Vec::new();
        for (row, value) in values.iter().enumerate() {
            let row = row as RowIndex;
            match value {
                Some(value) => groups.entry(value).or_insert_with(Vec::new).push(row),
                None if null_equals_null => nulls.push(row),
                None => {}
            }
        }

        let clusters = groups
            .into_values()
            .chain(std::iter::once(nulls))
            .filter(|rows| rows.len() > 1)
            .collect();
        Partition::from_clusters(clusters, values.len())
    }

    /// The partition of the empty attribute set: every row agrees with every other.
    pub fn full(row_count: usize) -> Self {
        assert!(
            row_count <= RowIndex::MAX as usize,
            "too many rows for a partition"
        );
        let clusters = if row_count > 1 {
            vec![(0..row_count as RowIndex).collect()]
        } else {
            Vec::new()
        };
        Partition::from_clusters(clusters, row_count)
    }

    // Every constructor funnels through here so the canonical form holds. Rows inside each
    // cluster must already be ascending.
    fn from_clusters(mut clusters: Vec<Vec<RowIndex>>, row_count: usize) -> Self {
        debug_assert!(clusters
            .iter()
            .all(|c| c.len() > 1 && c.windows(2).all(|w| w[0] < w[1])));
        clusters.sort_unstable_by_key(|cluster| cluster[0]);
        let size = clusters.iter().map(Vec::len).sum();
        Partition {
            clusters,
            size,
            row_count,
            probing_table: OnceLock::new(),
        }
    }

    /// Returns an iterator over the clusters, each a sorted slice of row positions.
    pub fn clusters(&self) -> impl ExactSizeIterator<Item = &[RowIndex]> + '_ {
        self.clusters.iter().map(Vec::as_slice)
    }

    /// The number of clusters with at least two rows.
    pub fn cluster_count(&self) -> usize {
        self.clusters.len()
    }

    /// The number of rows which belong to some cluster.
    pub fn size(&self) -> usize {
        self.size
    }

    /// The number of rows in the relation this partition describes.
    pub fn row_count(&self) -> usize {
        self.row_count
    }

    /// The number of distinct values, counting every stripped singleton as its own value.
    pub fn distinct_count(&self) -> usize {
        self.row_count - self.size + self.clusters.len()
    }

    /// The minimum number of rows which would have to be removed to make the attribute set a key.
    ///
    /// Refining a partition leaves this unchanged exactly when no cluster gets split, which is
    /// what [`determines`][Partition::determines] relies on.
    pub fn key_error(&self) -> usize {
        self.size - self.clusters.len()
    }

    /// The number of unordered row pairs that agree on this attribute set.
    pub fn equal_pairs(&self) -> u64 {
        self.clusters
            .iter()
            .map(|c| {
                let k = c.len() as u64;
                k * (k - 1) / 2
            })
            .sum()
    }

    /// Returns `true` if every row has a distinct value.
    pub fn is_unique(&self) -> bool {
        self.clusters.is_empty()
    }

    /// Returns `true` if every row has the same value.
    ///
    /// A relation with fewer than two rows has no pair of rows which disagree, so every partition
    /// of it is constant (and unique).
    pub fn is_constant(&self) -> bool {
        self.row_count < 2 || (self.clusters.len() == 1 && self.size == self.row_count)
    }

    fn probing_table(&self) -> &[u32] {
        self.probing_table.get_or_init(|| {
            let mut table = vec![SINGLETON; self.row_count].into_boxed_slice();
            for (id, cluster) in self.clusters.iter().enumerate() {
                for &row in cluster {
                    table[row as usize] = id as u32 + 1;
                }
            }
            table
        })
    }

    /// Computes the partition of the union of the two attribute sets these partitions describe.
    ///
    /// Rows of whichever operand covers fewer rows are looked up in the other operand's probing
    /// table, and each of its clusters is split by the other operand's cluster ids. The result is
    /// canonical, so intersection is commutative and associative.
    ///
    /// ```
    /// use dfd::Partition;
    ///
    /// let a = Partition::build(&[Some(1), Some(1), Some(1), Some(2), Some(2)], true);
    /// let b = Partition::build(&[Some(7), Some(7), Some(8), Some(8), Some(8)], true);
    /// let ab = a.intersect(&b);
    /// assert_eq!(ab.clusters().collect::<Vec<_>>(), vec![&[0, 1][..], &[3, 4][..]]);
    /// assert_eq!(ab, b.intersect(&a));
    /// ```
    ///
    /// # Panics
    ///
    /// Panics if the partitions describe relations with different numbers of rows.
    pub fn intersect(&self, other: &Partition) -> Partition {
        assert_eq!(
            self.row_count, other.row_count,
            "intersecting partitions of different relations"
        );

        let (probe, indexed) = if self.size <= other.size {
            (self, other)
        } else {
            (other, self)
        };
        let table = indexed.probing_table();

        let mut clusters = Vec::new();
        // Reused for every probed cluster.
        let mut keyed: Vec<(u32, RowIndex)> = Vec::new();
        for cluster in probe.clusters.iter() {
            keyed.extend(cluster.iter().filter_map(|&row| {
                let id = table[row as usize];
                (id != SINGLETON).then_some((id, row))
            }));
            // Sorting by (id, row) keeps rows ascending within every new cluster.
            keyed.sort_unstable();
            for group in keyed.chunk_by(|a, b| a.0 == b.0) {
                if group.len() > 1 {
                    clusters.push(group.iter().map(|&(_, row)| row).collect());
                }
            }
            keyed.clear();
        }

        Partition::from_clusters(clusters, self.row_count)
    }

    /// Tests whether the attribute set of `self` functionally determines the attribute set of
    /// `rhs`, where both partitions come from the same relation.
    ///
    /// That holds exactly when refining `self` by `rhs` splits none of its clusters.
    ///
    /// ```
    /// use dfd::Partition;
    ///
    /// let a = Partition::build(&[Some(1), Some(1), Some(2), Some(2)], true);
    /// let b = Partition::build(&[Some(5), Some(5), Some(6), Some(6)], true);
    /// let c = Partition::build(&[Some(0), Some(1), Some(0), Some(0)], true);
    /// assert!(a.determines(&b));
    /// assert!(!a.determines(&c));
    /// ```
    pub fn determines(&self, rhs: &Partition) -> bool {
        if self.is_unique() {
            assert_eq!(self.row_count, rhs.row_count);
            return true;
        }
        self.intersect(rhs).key_error() == self.key_error()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    fn column(values: &[u8]) -> Partition {
        let values: Vec<_> = values.iter().map(|&v| Some(v)).collect();
        Partition::build(&values, true)
    }

    #[test]
    fn test_build_strips_singletons() {
        let p = column(&[1, 2, 3, 1, 4, 1, 2]);
        assert_eq!(p.cluster_count(), 2);
        assert_eq!(p.size(), 5);
        assert_eq!(p.row_count(), 7);
        assert_eq!(p.distinct_count(), 4);
        assert_eq!(p.key_error(), 3);
        assert_eq!(p.equal_pairs(), 3 + 1);
        assert_eq!(
            p.clusters().collect::<Vec<_>>(),
            vec![&[0, 3, 5][..], &[1, 6][..]]
        );
    }

    #[test]
    fn test_empty_input() {
        let p = Partition::build::<u8>(&[], true);
        assert!(p.is_unique());
        assert_eq!(p.size(), 0);
        assert_eq!(p.row_count(), 0);
    }

    #[test]
    fn test_unique_and_constant() {
        assert!(column(&[1, 2, 3]).is_unique());
        assert!(!column(&[1, 2, 3]).is_constant());
        assert!(column(&[4, 4, 4]).is_constant());
        assert!(!column(&[4, 4, 4]).is_unique());
        assert!(!column(&[4, 4, 5]).is_constant());
        assert!(column(&[9]).is_constant());
        assert!(column(&[9]).is_unique());
        assert_eq!(Partition::full(3), column(&[0, 0, 0]));
        assert!(Partition::full(3).is_constant());
    }

    #[test]
    fn test_nulls_are_distinct_unless_configured() {
        let values = [None, None, Some(1)];
        assert!(Partition::build(&values, false).is_unique());
        assert_eq!(Partition::build(&values, true).cluster_count(), 1);
    }

    #[test]
    fn test_intersection_laws() {
        let a = column(&[1, 1, 1, 2, 2, 2, 3, 3]);
        let b = column(&[1, 2, 1, 2, 1, 2, 1, 1]);
        let c = column(&[5, 5, 5, 5, 6, 6, 6, 6]);

        assert_eq!(a.intersect(&b), b.intersect(&a));
        assert_eq!(
            a.intersect(&b).intersect(&c),
            a.intersect(&b.intersect(&c))
        );
        assert_eq!(a.intersect(&a), a);
        assert_eq!(a.intersect(&Partition::full(8)), a);
    }

    #[test]
    fn test_refinement_matches_direct_construction() {
        let a = [1u8, 1, 1, 2, 2, 2, 3, 3, 3, 3];
        let b = [1u8, 2, 1, 2, 2, 1, 1, 1, 2, 1];
        let pairs: Vec<_> = a.iter().zip(b.iter()).map(Some).collect();
        assert_eq!(
            column(&a).intersect(&column(&b)),
            Partition::build(&pairs, true)
        );
    }

    #[test]
    fn test_determines() {
        let a = column(&[1, 1, 2, 2, 3, 3]);
        let b = column(&[1, 1, 1, 1, 2, 2]);
        assert!(a.determines(&b));
        assert!(!b.determines(&a));
        assert!(a.determines(&a));
        assert!(column(&[1, 2, 3, 4, 5, 6]).determines(&b));
        assert!(Partition::full(6).determines(&column(&[7; 6])));
        assert!(!Partition::full(6).determines(&b));
    }

    #[test]
    fn test_split_without_losing_rows_is_detected() {
        // Refining a 4-row cluster into two pairs keeps the covered row count but adds a cluster.
        let a = column(&[1, 1, 1, 1]);
        let b = column(&[1, 1, 2, 2]);
        assert_eq!(a.intersect(&b).size(), a.size());
        assert!(!a.determines(&b));
    }

    #[test]
    #[should_panic(expected = "different relations")]
    fn test_row_count_mismatch_panics() {
        column(&[1, 1]).intersect(&column(&[1, 1, 1]));
    }
}
