use crate::{Relation, Vertical};

/// Which end of the [`ColumnOrder`] to start from.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Direction {
    /// Columns with the most distinct values first.
    HighDistinctCount,
    /// Columns with the fewest distinct values first.
    LowDistinctCount,
}

/// A fixed ranking of the columns of one relation by their number of distinct values.
///
/// Columns with many distinct values are the likeliest to determine others, so the traversal
/// tries them first. Ties are broken by column index, which makes the order total and the search
/// reproducible.
#[derive(Clone, Debug)]
pub struct ColumnOrder {
    // Highest distinct count first.
    order: Vec<usize>,
}

impl ColumnOrder {
    /// Ranks the columns of `relation`.
    pub fn new(relation: &Relation) -> Self {
        let counts: Vec<usize> = relation
            .column_partitions()
            .iter()
            .map(|partition| partition.distinct_count())
            .collect();
        ColumnOrder::from_distinct_counts(&counts)
    }

    /// Ranks columns given the distinct count of each.
    ///
    /// ```
    /// use dfd::{ColumnOrder, Direction, Vertical};
    ///
    /// let order = ColumnOrder::from_distinct_counts(&[3, 10, 3, 7]);
    /// let all = Vertical::full(4);
    /// assert_eq!(order.project(&all, Direction::HighDistinctCount), vec![1, 3, 0, 2]);
    /// assert_eq!(order.project(&all, Direction::LowDistinctCount), vec![2, 0, 3, 1]);
    /// ```
    pub fn from_distinct_counts(counts: &[usize]) -> Self {
        let mut order: Vec<usize> = (0..counts.len()).collect();
        order.sort_by(|&a, &b| counts[b].cmp(&counts[a]).then(a.cmp(&b)));
        ColumnOrder { order }
    }

    /// Lists the columns of `columns` in ranking order.
    pub fn project(&self, columns: &Vertical, direction: Direction) -> Vec<usize> {
        let keep = |&column: &usize| columns.contains_column(column);
        match direction {
            Direction::HighDistinctCount => self.order.iter().copied().filter(keep).collect(),
            Direction::LowDistinctCount => self.order.iter().rev().copied().filter(keep).collect(),
        }
    }
}
